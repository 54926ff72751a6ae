//! Search provider trait for the external classification/search API.
//!
//! The provider is a black box: one web-search-enabled prompt in, free text
//! out. The worker cares about exactly two failure modes beyond "it broke":
//! HTTP 429 (rate limited) and HTTP 402 (credits exhausted), which abort the
//! whole batch rather than the current item.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{SearchError, SearchResult};

/// An API key that never appears in logs.
pub struct ApiKey(String);

impl ApiKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("ApiKey(***)")
    }
}

/// Web-search-enabled classification provider.
#[async_trait]
pub trait Searcher: Send + Sync {
    /// Run one prompt against the provider with its web search tool enabled
    /// and return the textual answer.
    async fn search(&self, prompt: &str) -> SearchResult<String>;
}

/// Live provider client.
///
/// Posts `{model, prompt, web_search}` and reads back `{text}`, mapping the
/// two quota statuses onto their batch-fatal error variants.
pub struct HttpSearcher {
    api_key: ApiKey,
    base_url: String,
    model: String,
    client: reqwest::Client,
}

impl HttpSearcher {
    pub fn new(api_key: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            api_key: ApiKey::new(api_key),
            base_url: base_url.into(),
            model: "sonar-medium".to_string(),
            client: reqwest::Client::new(),
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }
}

#[derive(Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    web_search: bool,
}

#[derive(Deserialize)]
struct CompletionResponse {
    text: String,
}

#[async_trait]
impl Searcher for HttpSearcher {
    async fn search(&self, prompt: &str) -> SearchResult<String> {
        let request = CompletionRequest {
            model: &self.model,
            prompt,
            web_search: true,
        };

        let response = self
            .client
            .post(format!("{}/v1/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key.expose()))
            .json(&request)
            .send()
            .await
            .map_err(|e| SearchError::Provider(Box::new(e)))?;

        match response.status().as_u16() {
            429 => return Err(SearchError::RateLimited),
            402 => return Err(SearchError::CreditsExhausted),
            status if !response.status().is_success() => {
                return Err(SearchError::Provider(
                    format!("provider returned HTTP {}", status).into(),
                ));
            }
            _ => {}
        }

        let body: CompletionResponse = response
            .json()
            .await
            .map_err(|e| SearchError::Provider(Box::new(e)))?;

        Ok(body.text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_key_debug_is_redacted() {
        let key = ApiKey::new("sk-secret");
        assert_eq!(format!("{:?}", key), "ApiKey(***)");
        assert_eq!(key.expose(), "sk-secret");
    }
}
