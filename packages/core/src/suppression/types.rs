//! Core data types for suppression lookups

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// A single entry on the provider's suppression list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct SuppressionEntry {
    /// Opaque provider-assigned identifier.
    pub id: String,
    pub email_address: String,
    /// Provider reason code, e.g. `HARDBOUNCE`, `COMPLAINT`, `MANUAL`.
    #[schema(example = "HARDBOUNCE")]
    pub reason: String,
    #[schema(example = "2024-03-01T10:15:30Z")]
    pub time_created: DateTime<Utc>,
}

/// Outcome of a lookup. Built per request and never stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SuppressionQueryResult {
    pub found: bool,
    pub entry: Option<SuppressionEntry>,
}

impl SuppressionQueryResult {
    pub fn found(entry: SuppressionEntry) -> Self {
        Self {
            found: true,
            entry: Some(entry),
        }
    }

    pub fn not_found() -> Self {
        Self {
            found: false,
            entry: None,
        }
    }
}

/// Outcome of a removal.
///
/// `removed` is true only when this call issued a delete that took effect.
/// An address that was never suppressed, or whose entry vanished between
/// lookup and delete, yields `removed = false` and is still a success.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemovalResult {
    pub removed: bool,
    /// The entry that was present when the lookup ran.
    pub entry: Option<SuppressionEntry>,
}

impl RemovalResult {
    pub fn was_suppressed(&self) -> bool {
        self.entry.is_some()
    }
}
