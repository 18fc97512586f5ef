use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;
use utoipa::ToSchema;

use crate::suppression::{email::InvalidEmail, ProviderError};

/// Unified application error.
///
/// Every failure reaching the HTTP layer is one of these kinds, and each
/// kind maps to one fixed status code.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Config error: {0}")]
    Config(String),

    #[error("{0}")]
    InvalidInput(#[from] InvalidEmail),

    #[error("Provider authentication failed: {0}")]
    AuthFailure(String),

    #[error("Provider unavailable: {0}")]
    TransientProvider(String),

    #[error("Provider returned an unexpected response: {0}")]
    ProviderProtocol(String),
}

impl From<ProviderError> for AppError {
    fn from(err: ProviderError) -> Self {
        match err {
            ProviderError::Auth { message } => Self::AuthFailure(message),
            ProviderError::Transient { message } => Self::TransientProvider(message),
            ProviderError::Protocol { message } => Self::ProviderProtocol(message),
        }
    }
}

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidInput(_) => StatusCode::BAD_REQUEST,
            Self::AuthFailure(_) => StatusCode::FORBIDDEN,
            Self::TransientProvider(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::ProviderProtocol(_) => StatusCode::BAD_GATEWAY,
            Self::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Stable machine-readable kind for response bodies.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidInput(_) => "invalid_input",
            Self::AuthFailure(_) => "auth_failure",
            Self::TransientProvider(_) => "transient_provider_error",
            Self::ProviderProtocol(_) => "provider_protocol_error",
            Self::Config(_) => "internal_error",
        }
    }
}

/// Error body returned to HTTP clients.
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorResponse {
    #[schema(value_type = String, example = "invalid_input")]
    pub error: &'static str,
    pub detail: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

/// An [`AppError`] tied to the address the request was about.
#[derive(Debug)]
pub struct ApiError {
    pub error: AppError,
    pub email: Option<String>,
}

impl ApiError {
    pub fn new(error: impl Into<AppError>, email: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            email: Some(email.into()),
        }
    }
}

impl From<AppError> for ApiError {
    fn from(error: AppError) -> Self {
        Self { error, email: None }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.error.status_code();
        if status.is_server_error() || status == StatusCode::FORBIDDEN {
            tracing::error!(kind = self.error.kind(), "Request failed: {}", self.error);
        } else {
            tracing::debug!(kind = self.error.kind(), "Request rejected: {}", self.error);
        }

        let body = ErrorResponse {
            error: self.error.kind(),
            detail: self.error.to_string(),
            email: self.email,
        };
        (status, Json(body)).into_response()
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        ApiError::from(self).into_response()
    }
}
