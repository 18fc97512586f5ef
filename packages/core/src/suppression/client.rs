//! Suppression client: `find` and `remove` on top of a provider, with the
//! bounded retry policy applied to every provider call.

use std::sync::Arc;

use async_trait::async_trait;

use crate::metrics::AppMetrics;
use crate::suppression::{
    error::ProviderResult,
    provider::{DeleteOutcome, SuppressionProvider},
    retry::RetryPolicy,
    types::{RemovalResult, SuppressionEntry, SuppressionQueryResult},
    EmailAddress,
};

/// The two operations the HTTP layer needs.
#[async_trait]
pub trait SuppressionLookup {
    /// Report whether `email` is on the suppression list.
    async fn find(&self, email: &EmailAddress) -> ProviderResult<SuppressionQueryResult>;

    /// Ensure `email` is not on the suppression list.
    async fn remove(&self, email: &EmailAddress) -> ProviderResult<RemovalResult>;
}

#[derive(Clone)]
pub struct SuppressionClient {
    provider: Arc<dyn SuppressionProvider + Send + Sync>,
    retry: RetryPolicy,
    metrics: Option<Arc<AppMetrics>>,
}

impl SuppressionClient {
    pub fn new(provider: Arc<dyn SuppressionProvider + Send + Sync>, retry: RetryPolicy) -> Self {
        Self {
            provider,
            retry,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<AppMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    fn record_call<T>(&self, operation: &str, result: &ProviderResult<T>) {
        if let Some(metrics) = &self.metrics {
            let outcome = match result {
                Ok(_) => "ok",
                Err(err) => err.kind(),
            };
            metrics
                .provider_calls_total
                .with_label_values(&[operation, outcome])
                .inc();
        }
    }

    fn record_retry(&self, operation: &str) {
        if let Some(metrics) = &self.metrics {
            metrics
                .provider_retries_total
                .with_label_values(&[operation])
                .inc();
        }
    }

    async fn list(&self, email: &EmailAddress) -> ProviderResult<Vec<SuppressionEntry>> {
        const OP: &str = "list_suppressions";
        self.retry
            .run(
                OP,
                move || async move {
                    let result = self.provider.list_suppressions(email).await;
                    self.record_call(OP, &result);
                    result
                },
                move |_, _| self.record_retry(OP),
            )
            .await
    }

    async fn delete(&self, suppression_id: &str) -> ProviderResult<DeleteOutcome> {
        const OP: &str = "delete_suppression";
        self.retry
            .run(
                OP,
                move || async move {
                    let result = self.provider.delete_suppression(suppression_id).await;
                    self.record_call(OP, &result);
                    result
                },
                move |_, _| self.record_retry(OP),
            )
            .await
    }
}

#[async_trait]
impl SuppressionLookup for SuppressionClient {
    async fn find(&self, email: &EmailAddress) -> ProviderResult<SuppressionQueryResult> {
        let entries = self.list(email).await?;

        let result = match entries.into_iter().next() {
            Some(entry) => SuppressionQueryResult::found(entry),
            None => SuppressionQueryResult::not_found(),
        };

        tracing::debug!(
            email = %email.redacted(),
            found = result.found,
            provider = self.provider.provider_name(),
            "Suppression lookup complete"
        );
        Ok(result)
    }

    async fn remove(&self, email: &EmailAddress) -> ProviderResult<RemovalResult> {
        let entries = self.list(email).await?;

        let Some(first) = entries.first().cloned() else {
            tracing::info!(email = %email.redacted(), "Address not suppressed, nothing to remove");
            return Ok(RemovalResult {
                removed: false,
                entry: None,
            });
        };

        let mut removed = false;
        for entry in &entries {
            match self.delete(&entry.id).await? {
                DeleteOutcome::Deleted => {
                    removed = true;
                    tracing::info!(
                        email = %email.redacted(),
                        suppression_id = %entry.id,
                        reason = %entry.reason,
                        "Suppression removed"
                    );
                }
                DeleteOutcome::AlreadyAbsent => {
                    tracing::info!(
                        email = %email.redacted(),
                        suppression_id = %entry.id,
                        "Suppression already gone at delete time"
                    );
                }
            }
        }

        Ok(RemovalResult {
            removed,
            entry: Some(first),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::suppression::error::ProviderError;
    use crate::suppression::memory::{InMemorySuppressionProvider, Operation};

    fn email(s: &str) -> EmailAddress {
        EmailAddress::parse(s).unwrap()
    }

    fn policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            initial_backoff: Duration::from_millis(200),
            jitter: false,
            ..RetryPolicy::default()
        }
    }

    fn client_with(provider: Arc<InMemorySuppressionProvider>, max_attempts: u32) -> SuppressionClient {
        SuppressionClient::new(provider, policy(max_attempts))
    }

    #[tokio::test]
    async fn find_reports_existing_entry() {
        let provider = Arc::new(InMemorySuppressionProvider::new());
        let seeded = provider.suppress("user@example.com", "HARDBOUNCE");
        let client = client_with(provider.clone(), 3);

        let result = client.find(&email("user@example.com")).await.unwrap();

        assert!(result.found);
        assert_eq!(result.entry, Some(seeded));
        assert_eq!(provider.list_calls(), 1);
    }

    #[tokio::test]
    async fn find_reports_absent_address() {
        let provider = Arc::new(InMemorySuppressionProvider::new());
        let client = client_with(provider, 3);

        let result = client.find(&email("nobody@example.com")).await.unwrap();

        assert_eq!(result, SuppressionQueryResult::not_found());
    }

    #[tokio::test]
    async fn remove_is_idempotent() {
        let provider = Arc::new(InMemorySuppressionProvider::new());
        provider.suppress("user@example.com", "COMPLAINT");
        let client = client_with(provider.clone(), 3);
        let address = email("user@example.com");

        let first = client.remove(&address).await.unwrap();
        let second = client.remove(&address).await.unwrap();

        assert!(first.removed);
        assert!(first.was_suppressed());
        assert!(!second.removed);
        assert!(!second.was_suppressed());
        assert_eq!(provider.deletes_applied(), 1);
        assert!(!provider.contains("user@example.com"));
    }

    #[tokio::test]
    async fn remove_then_find_reports_not_found() {
        let provider = Arc::new(InMemorySuppressionProvider::new());
        provider.suppress("user@example.com", "MANUAL");
        let client = client_with(provider, 3);
        let address = email("user@example.com");

        assert!(client.find(&address).await.unwrap().found);
        client.remove(&address).await.unwrap();
        assert!(!client.find(&address).await.unwrap().found);
    }

    #[tokio::test]
    async fn remove_treats_concurrent_delete_as_success() {
        let provider = Arc::new(InMemorySuppressionProvider::new());
        provider.suppress("user@example.com", "HARDBOUNCE");
        provider.simulate_concurrent_delete();
        let client = client_with(provider.clone(), 3);

        let result = client.remove(&email("user@example.com")).await.unwrap();

        assert!(!result.removed);
        assert!(result.was_suppressed());
        assert_eq!(provider.delete_calls(), 1);
        assert!(!provider.contains("user@example.com"));
    }

    #[tokio::test]
    async fn remove_deletes_every_listed_entry() {
        let provider = Arc::new(InMemorySuppressionProvider::new());
        provider.suppress("user@example.com", "HARDBOUNCE");
        provider.suppress("USER@example.com", "COMPLAINT");
        let client = client_with(provider.clone(), 3);

        let result = client.remove(&email("user@example.com")).await.unwrap();

        assert!(result.removed);
        assert_eq!(provider.deletes_applied(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn find_succeeds_after_transient_failures_within_cap() {
        let provider = Arc::new(InMemorySuppressionProvider::new());
        provider.suppress("user@example.com", "HARDBOUNCE");
        provider.fail_next(Operation::List, 2, ProviderError::transient("timeout"));
        let client = client_with(provider.clone(), 3);

        let result = client.find(&email("user@example.com")).await.unwrap();

        assert!(result.found);
        assert_eq!(provider.list_calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn find_surfaces_transient_error_past_cap() {
        let provider = Arc::new(InMemorySuppressionProvider::new());
        provider.fail_next(Operation::List, 3, ProviderError::transient("timeout"));
        let client = client_with(provider.clone(), 3);

        let err = client.find(&email("user@example.com")).await.unwrap_err();

        assert!(matches!(err, ProviderError::Transient { .. }));
        assert_eq!(provider.list_calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn auth_failure_is_not_retried() {
        let provider = Arc::new(InMemorySuppressionProvider::new());
        provider.fail_next(Operation::List, 1, ProviderError::auth("NotAuthenticated"));
        let client = client_with(provider.clone(), 3);

        let err = client.find(&email("user@example.com")).await.unwrap_err();

        assert!(matches!(err, ProviderError::Auth { .. }));
        assert_eq!(provider.list_calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn remove_retries_transient_delete_failure() {
        let provider = Arc::new(InMemorySuppressionProvider::new());
        provider.suppress("user@example.com", "HARDBOUNCE");
        provider.fail_next(Operation::Delete, 1, ProviderError::transient("503"));
        let client = client_with(provider.clone(), 3);

        let result = client.remove(&email("user@example.com")).await.unwrap();

        assert!(result.removed);
        assert_eq!(provider.delete_calls(), 2);
        assert_eq!(provider.deletes_applied(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn metrics_count_calls_and_retries() {
        let provider = Arc::new(InMemorySuppressionProvider::new());
        provider.fail_next(Operation::List, 1, ProviderError::transient("timeout"));
        let metrics = Arc::new(AppMetrics::new().unwrap());
        let client = client_with(provider, 3).with_metrics(metrics.clone());

        client.find(&email("user@example.com")).await.unwrap();

        let calls = &metrics.provider_calls_total;
        assert_eq!(calls.with_label_values(&["list_suppressions", "ok"]).get(), 1.0);
        assert_eq!(calls.with_label_values(&["list_suppressions", "transient"]).get(), 1.0);
        assert_eq!(
            metrics
                .provider_retries_total
                .with_label_values(&["list_suppressions"])
                .get(),
            1.0
        );
    }
}
