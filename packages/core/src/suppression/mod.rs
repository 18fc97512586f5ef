//! Suppression List Module
//!
//! Looks up and removes addresses on the provider's email suppression list.
//! The provider is the system of record; nothing here keeps state between
//! calls beyond the read-only retry policy.

pub mod client;
pub mod email;
pub mod error;
pub mod memory;
pub mod provider;
pub mod retry;
pub mod types;

pub use client::{SuppressionClient, SuppressionLookup};
pub use email::EmailAddress;
pub use error::ProviderError;
pub use provider::{DeleteOutcome, SuppressionProvider};
pub use retry::RetryPolicy;
pub use types::*;
