//! Testing utilities including a scripted mock search provider.
//!
//! Useful for exercising the worker without real provider calls: responses
//! are matched by substring against the rendered prompt, failures can be
//! injected per prompt, and every call is recorded for assertions about
//! stage ordering.

use std::sync::RwLock;

use async_trait::async_trait;

use crate::error::{SearchError, SearchResult};
use crate::traits::searcher::Searcher;

/// Failure kinds the mock can inject. Mirrors `SearchError` but clonable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockFailure {
    RateLimited,
    CreditsExhausted,
    Provider,
}

impl MockFailure {
    fn into_error(self) -> SearchError {
        match self {
            MockFailure::RateLimited => SearchError::RateLimited,
            MockFailure::CreditsExhausted => SearchError::CreditsExhausted,
            MockFailure::Provider => SearchError::Provider("injected provider error".into()),
        }
    }
}

enum Rule {
    Respond { needle: String, text: String },
    Fail { needle: String, failure: MockFailure },
}

/// A scripted mock search provider.
///
/// Rules are checked in registration order; the first whose needle appears
/// in the prompt wins. Unmatched prompts get the default response
/// (`NOT_FOUND` unless overridden).
#[derive(Default)]
pub struct MockSearcher {
    rules: RwLock<Vec<Rule>>,
    default_response: RwLock<Option<String>>,
    calls: RwLock<Vec<String>>,
}

impl MockSearcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Respond with `text` to any prompt containing `needle`.
    pub fn with_response(self, needle: &str, text: &str) -> Self {
        self.rules.write().unwrap().push(Rule::Respond {
            needle: needle.to_string(),
            text: text.to_string(),
        });
        self
    }

    /// Fail any prompt containing `needle`.
    pub fn with_failure(self, needle: &str, failure: MockFailure) -> Self {
        self.rules.write().unwrap().push(Rule::Fail {
            needle: needle.to_string(),
            failure,
        });
        self
    }

    /// Override the default response for unmatched prompts.
    pub fn with_default(self, text: &str) -> Self {
        *self.default_response.write().unwrap() = Some(text.to_string());
        self
    }

    /// Every prompt seen so far, in call order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.read().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.read().unwrap().len()
    }
}

#[async_trait]
impl Searcher for MockSearcher {
    async fn search(&self, prompt: &str) -> SearchResult<String> {
        self.calls.write().unwrap().push(prompt.to_string());

        for rule in self.rules.read().unwrap().iter() {
            match rule {
                Rule::Respond { needle, text } if prompt.contains(needle.as_str()) => {
                    return Ok(text.clone());
                }
                Rule::Fail { needle, failure } if prompt.contains(needle.as_str()) => {
                    return Err(failure.into_error());
                }
                _ => {}
            }
        }

        Ok(self
            .default_response
            .read()
            .unwrap()
            .clone()
            .unwrap_or_else(|| "NOT_FOUND".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn first_matching_rule_wins() {
        let mock = MockSearcher::new()
            .with_response("email address of Jane Doe", "jane@acme.com")
            .with_response("owner", "Jane Doe");

        let text = mock
            .search("Who is the owner of the business at acme.com?")
            .await
            .unwrap();
        assert_eq!(text, "Jane Doe");

        let text = mock
            .search("What is the email address of Jane Doe at Acme?")
            .await
            .unwrap();
        assert_eq!(text, "jane@acme.com");

        let text = mock.search("unrelated prompt").await.unwrap();
        assert_eq!(text, "NOT_FOUND");

        assert_eq!(mock.call_count(), 3);
    }

    #[tokio::test]
    async fn injected_failures_surface() {
        let mock = MockSearcher::new().with_failure("acme.com", MockFailure::RateLimited);
        let err = mock.search("anything about acme.com").await.unwrap_err();
        assert!(matches!(err, SearchError::RateLimited));
    }
}
