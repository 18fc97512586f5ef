//! Suppression Provider Interface
//!
//! The narrow capability the client needs from the provider: list entries
//! for an address and delete one entry by id.

use async_trait::async_trait;

use crate::suppression::{error::ProviderResult, types::SuppressionEntry, EmailAddress};

/// What a single delete call did on the provider side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    Deleted,
    /// The entry was already gone when the delete arrived.
    AlreadyAbsent,
}

#[async_trait]
pub trait SuppressionProvider {
    /// List suppression entries recorded for `email`.
    async fn list_suppressions(&self, email: &EmailAddress) -> ProviderResult<Vec<SuppressionEntry>>;

    /// Delete the entry with the given provider identifier.
    async fn delete_suppression(&self, suppression_id: &str) -> ProviderResult<DeleteOutcome>;

    /// Name of this provider for logging/debugging
    fn provider_name(&self) -> &str;
}
