//! Check and remove endpoints for the email suppression list.
//!
//! Routes:
//! - `GET    /api/v1/email-suppression/:email` — is the address suppressed?
//! - `DELETE /api/v1/email-suppression/:email` — make sure it is not
//!
//! Both validate the address before the provider is contacted. Removal
//! answers `removed: true` whether or not an entry existed.

use axum::{
    extract::{rejection::PathRejection, Path, State},
    Json,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use utoipa::ToSchema;

use super::AppState;
use crate::error::{ApiError, ErrorResponse};
use crate::suppression::{email::InvalidEmail, EmailAddress, SuppressionEntry};

// ---- Response shapes ----

#[derive(Debug, Serialize, ToSchema)]
pub struct CheckSuppressionResponse {
    pub email: String,
    pub found: bool,
    pub entry: Option<SuppressionEntry>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct RemoveSuppressionResponse {
    pub email: String,
    pub removed: bool,
    pub previously_suppressed: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suppression_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous_reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous_time_created: Option<DateTime<Utc>>,
}

// ---- Helpers ----

fn parse_address(path: Result<Path<String>, PathRejection>) -> Result<EmailAddress, ApiError> {
    let Path(raw) = path.map_err(|rejection| {
        tracing::debug!("Rejected path segment: {}", rejection);
        ApiError::from(crate::error::AppError::from(InvalidEmail {
            input: String::new(),
            reason: "path segment could not be decoded",
        }))
    })?;

    EmailAddress::parse(&raw).map_err(|err| ApiError::new(err, raw.clone()))
}

// ---- Handlers ----

/// Check whether an address is on the suppression list
#[utoipa::path(
    get,
    path = "/api/v1/email-suppression/{email}",
    params(
        ("email" = String, Path, description = "Email address to look up")
    ),
    responses(
        (status = 200, description = "Suppression status", body = CheckSuppressionResponse),
        (status = 400, description = "Malformed email address", body = ErrorResponse),
        (status = 403, description = "Provider rejected the service credentials", body = ErrorResponse),
        (status = 502, description = "Provider returned an unexpected response", body = ErrorResponse),
        (status = 503, description = "Provider unavailable after retries", body = ErrorResponse)
    ),
    tag = "Email Suppression"
)]
pub async fn check_suppression(
    State(state): State<AppState>,
    path: Result<Path<String>, PathRejection>,
) -> Result<Json<CheckSuppressionResponse>, ApiError> {
    let email = parse_address(path)?;

    let result = state
        .suppressions
        .find(&email)
        .await
        .map_err(|err| ApiError::new(err, email.as_str()))?;

    tracing::info!(email = %email.redacted(), found = result.found, "Suppression checked");

    Ok(Json(CheckSuppressionResponse {
        email: email.to_string(),
        found: result.found,
        entry: result.entry,
    }))
}

/// Remove an address from the suppression list if present
#[utoipa::path(
    delete,
    path = "/api/v1/email-suppression/{email}",
    params(
        ("email" = String, Path, description = "Email address to remove")
    ),
    responses(
        (status = 200, description = "Address is no longer suppressed", body = RemoveSuppressionResponse),
        (status = 400, description = "Malformed email address", body = ErrorResponse),
        (status = 403, description = "Provider rejected the service credentials", body = ErrorResponse),
        (status = 502, description = "Provider returned an unexpected response", body = ErrorResponse),
        (status = 503, description = "Provider unavailable after retries", body = ErrorResponse)
    ),
    tag = "Email Suppression"
)]
pub async fn remove_suppression(
    State(state): State<AppState>,
    path: Result<Path<String>, PathRejection>,
) -> Result<Json<RemoveSuppressionResponse>, ApiError> {
    let email = parse_address(path)?;

    let removal = state
        .suppressions
        .remove(&email)
        .await
        .map_err(|err| ApiError::new(err, email.as_str()))?;

    tracing::info!(
        email = %email.redacted(),
        previously_suppressed = removal.was_suppressed(),
        deleted = removal.removed,
        "Suppression removal complete"
    );

    let message = if removal.was_suppressed() {
        format!("Email '{}' has been removed from the suppression list", email)
    } else {
        format!("Email '{}' is not on the suppression list", email)
    };

    Ok(Json(RemoveSuppressionResponse {
        email: email.to_string(),
        removed: true,
        previously_suppressed: removal.was_suppressed(),
        message,
        suppression_id: removal.entry.as_ref().map(|e| e.id.clone()),
        previous_reason: removal.entry.as_ref().map(|e| e.reason.clone()),
        previous_time_created: removal.entry.as_ref().map(|e| e.time_created),
    }))
}
