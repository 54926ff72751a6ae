//! Contact model - extracted result records, append-only.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// An extracted contact, produced by the enrichment worker.
///
/// Never mutated after insert. A prospect may have several; the first
/// inserted per enrichment is flagged primary.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "postgres", derive(sqlx::FromRow))]
pub struct Contact {
    pub id: Uuid,
    pub prospect_id: Uuid,
    pub report_id: Uuid,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub source_note: Option<String>,
    pub is_primary: bool,
    pub created_at: DateTime<Utc>,
}

/// Insert payload for a contact record.
#[derive(Debug, Clone)]
pub struct NewContact {
    pub prospect_id: Uuid,
    pub report_id: Uuid,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub source_note: Option<String>,
    pub is_primary: bool,
}
