//! Error types for suppression list operations

use thiserror::Error;

/// Errors surfaced by a suppression provider.
///
/// Only [`ProviderError::Transient`] is ever retried.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProviderError {
    #[error("Authentication error: {message}")]
    Auth { message: String },

    #[error("Transient provider error: {message}")]
    Transient { message: String },

    #[error("Unexpected provider response: {message}")]
    Protocol { message: String },
}

impl ProviderError {
    pub fn auth(message: impl Into<String>) -> Self {
        Self::Auth { message: message.into() }
    }

    pub fn transient(message: impl Into<String>) -> Self {
        Self::Transient { message: message.into() }
    }

    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol { message: message.into() }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient { .. })
    }

    /// Short label used for metrics and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Auth { .. } => "auth",
            Self::Transient { .. } => "transient",
            Self::Protocol { .. } => "protocol",
        }
    }
}

/// Result type for provider operations
pub type ProviderResult<T> = Result<T, ProviderError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_transient_errors_are_retryable() {
        assert!(ProviderError::transient("timeout").is_retryable());
        assert!(!ProviderError::auth("bad key").is_retryable());
        assert!(!ProviderError::protocol("not json").is_retryable());
    }

    #[test]
    fn display_includes_message() {
        let err = ProviderError::auth("NotAuthenticated");
        assert_eq!(err.to_string(), "Authentication error: NotAuthenticated");
    }
}
