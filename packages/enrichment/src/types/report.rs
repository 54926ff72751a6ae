//! Report model - the parent record a prospect belongs to.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Parent report: the domain under investigation plus cached metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "postgres", derive(sqlx::FromRow))]
pub struct Report {
    pub id: Uuid,
    pub domain: String,
    pub company_name: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Report {
    pub fn new(domain: impl Into<String>, company_name: Option<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            domain: domain.into(),
            company_name,
            created_at: Utc::now(),
        }
    }

    /// Company name for prompt interpolation, falling back to the domain.
    pub fn company_or_domain(&self) -> &str {
        self.company_name.as_deref().unwrap_or(&self.domain)
    }
}
