//! OCI Email Delivery control-plane client.
//!
//! Talks to the suppression endpoints of API version `20170907`:
//! `GET /suppressions?compartmentId=..&emailAddress=..` and
//! `DELETE /suppressions/{id}`.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::Deserialize;

use crate::error::AppError;
use crate::services::signer::RequestAuthorizer;
use crate::suppression::{
    error::ProviderResult, DeleteOutcome, EmailAddress, ProviderError, SuppressionEntry,
    SuppressionProvider,
};

pub const API_VERSION: &str = "20170907";
const NEXT_PAGE_HEADER: &str = "opc-next-page";
const REQUEST_ID_HEADER: &str = "opc-request-id";
const MAX_PAGES: usize = 20;

/// Control-plane endpoint for a region.
pub fn endpoint_for_region(region: &str) -> String {
    format!("https://ctrl.email.{}.oci.oraclecloud.com", region)
}

#[derive(Clone)]
pub struct EmailDeliveryClient {
    base_url: String,
    compartment_id: String,
    http: Client,
    authorizer: Option<Arc<dyn RequestAuthorizer>>,
}

impl EmailDeliveryClient {
    pub fn new(
        base_url: String,
        compartment_id: String,
        timeout: Duration,
        authorizer: Option<Arc<dyn RequestAuthorizer>>,
    ) -> Result<Self, AppError> {
        let http = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("email-suppression-service/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|err| AppError::Config(format!("Failed to build HTTP client: {}", err)))?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            compartment_id,
            http,
            authorizer,
        })
    }

    async fn send(&self, builder: RequestBuilder) -> ProviderResult<Response> {
        let mut request = builder
            .build()
            .map_err(|err| ProviderError::protocol(format!("Failed to build request: {}", err)))?;

        if let Some(authorizer) = &self.authorizer {
            authorizer.authorize(&mut request).await?;
        }

        tracing::debug!(method = %request.method(), path = request.url().path(), "Calling Email Delivery API");

        self.http
            .execute(request)
            .await
            .map_err(|err| ProviderError::transient(format!("Email Delivery request failed: {}", err)))
    }
}

/// Suppression record as returned by the list endpoint.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SuppressionSummary {
    id: String,
    email_address: String,
    #[serde(default)]
    reason: Option<String>,
    time_created: DateTime<Utc>,
}

impl From<SuppressionSummary> for SuppressionEntry {
    fn from(summary: SuppressionSummary) -> Self {
        Self {
            id: summary.id,
            email_address: summary.email_address,
            reason: summary.reason.unwrap_or_else(|| "UNKNOWN".to_string()),
            time_created: summary.time_created,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct ServiceErrorBody {
    code: Option<String>,
    message: Option<String>,
}

/// Turn a non-success response into the matching error kind.
async fn error_from_response(response: Response, operation: &str) -> ProviderError {
    let status = response.status();
    let detail = error_detail(response, operation).await;

    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ProviderError::auth(detail),
        StatusCode::REQUEST_TIMEOUT | StatusCode::TOO_MANY_REQUESTS => ProviderError::transient(detail),
        s if s.is_server_error() => ProviderError::transient(detail),
        _ => ProviderError::protocol(detail),
    }
}

/// Status, service error code and message, and the request id for support.
async fn error_detail(response: Response, operation: &str) -> String {
    let status = response.status();
    let request_id = response
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("-")
        .to_string();
    let body: ServiceErrorBody = response
        .text()
        .await
        .ok()
        .and_then(|text| serde_json::from_str(&text).ok())
        .unwrap_or_default();

    format!(
        "{} returned HTTP {} ({}: {}) [opc-request-id {}]",
        operation,
        status.as_u16(),
        body.code.as_deref().unwrap_or("Unknown"),
        body.message.as_deref().unwrap_or("no message"),
        request_id
    )
}

#[async_trait]
impl SuppressionProvider for EmailDeliveryClient {
    async fn list_suppressions(&self, email: &EmailAddress) -> ProviderResult<Vec<SuppressionEntry>> {
        let url = format!("{}/{}/suppressions", self.base_url, API_VERSION);
        let mut entries = Vec::new();
        let mut page: Option<String> = None;

        for _ in 0..MAX_PAGES {
            let mut builder = self.http.get(&url).query(&[
                ("compartmentId", self.compartment_id.as_str()),
                ("emailAddress", email.as_str()),
            ]);
            if let Some(token) = &page {
                builder = builder.query(&[("page", token.as_str())]);
            }

            let response = self.send(builder).await?;
            let status = response.status();

            // The list endpoint answers 404 NotAuthorizedOrNotFound for
            // compartments the caller cannot see.
            if status == StatusCode::NOT_FOUND {
                return Err(ProviderError::auth(error_detail(response, "ListSuppressions").await));
            }
            if !status.is_success() {
                return Err(error_from_response(response, "ListSuppressions").await);
            }

            page = response
                .headers()
                .get(NEXT_PAGE_HEADER)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);

            let body = response
                .text()
                .await
                .map_err(|err| ProviderError::transient(format!("Failed to read response body: {}", err)))?;
            let summaries: Vec<SuppressionSummary> = serde_json::from_str(&body)
                .map_err(|err| ProviderError::protocol(format!("Failed to parse suppression list: {}", err)))?;
            entries.extend(summaries.into_iter().map(SuppressionEntry::from));

            if page.is_none() {
                return Ok(entries);
            }
        }

        Err(ProviderError::protocol(format!(
            "Suppression list did not end after {} pages",
            MAX_PAGES
        )))
    }

    async fn delete_suppression(&self, suppression_id: &str) -> ProviderResult<DeleteOutcome> {
        let url = format!("{}/{}/suppressions/{}", self.base_url, API_VERSION, suppression_id);
        let response = self.send(self.http.delete(&url)).await?;

        match response.status() {
            s if s.is_success() => Ok(DeleteOutcome::Deleted),
            StatusCode::NOT_FOUND => Ok(DeleteOutcome::AlreadyAbsent),
            _ => Err(error_from_response(response, "DeleteSuppression").await),
        }
    }

    fn provider_name(&self) -> &str {
        "oci-email-delivery"
    }
}
