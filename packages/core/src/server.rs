//! Wiring from a [`Config`] to a running HTTP server.

use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::signal;

use crate::api::{self, AppState, ServiceInfo};
use crate::config::{AuthConfig, Config};
use crate::error::AppError;
use crate::metrics::AppMetrics;
use crate::services::email_delivery::EmailDeliveryClient;
use crate::services::instance_principal::InstancePrincipalAuth;
use crate::services::signer::{RequestAuthorizer, RequestSigner};
use crate::suppression::SuppressionClient;

/// Build the shared state: provider client, retrying suppression client,
/// metrics and service metadata.
pub fn build_state(config: &Config) -> Result<AppState, AppError> {
    let authorizer: Option<Arc<dyn RequestAuthorizer>> = match &config.auth {
        AuthConfig::ApiKey {
            user_ocid,
            fingerprint,
            private_key_pem,
        } => Some(Arc::new(RequestSigner::new(
            &config.tenancy_ocid,
            user_ocid,
            fingerprint,
            private_key_pem,
        )?)),
        AuthConfig::InstancePrincipal {
            metadata_endpoint,
            federation_endpoint,
        } => Some(Arc::new(InstancePrincipalAuth::new(
            metadata_endpoint.clone(),
            federation_endpoint.clone(),
            config.tenancy_ocid.clone(),
            config.request_timeout,
        )?)),
        AuthConfig::None => {
            tracing::warn!("OCI_AUTH_MODE=none: provider requests will not be signed");
            None
        }
    };

    let provider = EmailDeliveryClient::new(
        config.endpoint.clone(),
        config.compartment_ocid.clone(),
        config.request_timeout,
        authorizer,
    )?;

    let metrics = Arc::new(
        AppMetrics::new().map_err(|e| AppError::Config(format!("Failed to register metrics: {}", e)))?,
    );

    let client = SuppressionClient::new(Arc::new(provider), config.retry.clone())
        .with_metrics(metrics.clone());

    Ok(AppState {
        suppressions: Arc::new(client),
        service: Arc::new(ServiceInfo {
            title: config.api_title.clone(),
            version: config.api_version.clone(),
            region: config.region.clone(),
        }),
        metrics,
    })
}

/// Serve until Ctrl+C (SIGINT) is received.
pub async fn run(config: Config) -> Result<(), AppError> {
    let state = build_state(&config)?;
    let app = api::router(state);

    let address = config.bind_address();
    let listener = TcpListener::bind(&address)
        .await
        .map_err(|e| AppError::Config(format!("Cannot bind {}: {}", address, e)))?;

    tracing::info!(
        service = %config.api_title,
        version = %config.api_version,
        region = %config.region,
        endpoint = %config.endpoint,
        "Listening on http://{}",
        address
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| AppError::Config(format!("Server error: {}", e)))?;

    tracing::info!("Server stopped cleanly");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", err);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received. Draining connections.");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_with(auth: AuthConfig) -> Config {
        let mut config = Config::from_lookup(|key| match key {
            "OCI_TENANCY_OCID" => Some("ocid1.tenancy.oc1..aaa".to_string()),
            "OCI_AUTH_MODE" => Some("none".to_string()),
            _ => None,
        })
        .unwrap();
        config.auth = auth;
        config
    }

    #[test]
    fn builds_state_without_signing() {
        let state = build_state(&config_with(AuthConfig::None)).unwrap();
        assert_eq!(state.service.region, "ap-mumbai-1");
    }

    #[test]
    fn builds_state_with_api_key() {
        let config = config_with(AuthConfig::ApiKey {
            user_ocid: "ocid1.user.oc1..bbb".to_string(),
            fingerprint: "aa:bb".to_string(),
            private_key_pem: include_str!("../tests/fixtures/test_api_key.pem").to_string(),
        });
        assert!(build_state(&config).is_ok());
    }

    #[test]
    fn builds_state_with_instance_principal_without_contacting_metadata() {
        let config = config_with(AuthConfig::InstancePrincipal {
            metadata_endpoint: "http://127.0.0.1:1/opc/v2".to_string(),
            federation_endpoint: "http://127.0.0.1:1".to_string(),
        });
        assert!(build_state(&config).is_ok());
    }

    #[test]
    fn bad_private_key_is_a_config_error() {
        let config = config_with(AuthConfig::ApiKey {
            user_ocid: "ocid1.user.oc1..bbb".to_string(),
            fingerprint: "aa:bb".to_string(),
            private_key_pem: "garbage".to_string(),
        });
        assert!(matches!(build_state(&config), Err(AppError::Config(_))));
    }
}
