//! Error types for msal-authcode
//!
//! This module defines all error types used throughout the crate, using
//! `thiserror` for ergonomic error handling.
//!
//! Errors fall into five families:
//!
//! - protocol state errors (missing or mismatched flow state at callback time)
//! - provider errors (the identity provider answered with `error`)
//! - validation errors (decode failure or a non-valid [`TokenStatus`])
//! - storage errors (session writes without an initialized session id)
//! - transport errors (network failures talking to the provider)
//!
//! Protocol and provider errors are collapsed into
//! [`MsalAuthError::Unauthorized`] before they reach the caller.

use thiserror::Error;

use crate::validation::TokenStatus;

/// Main error type for msal-authcode operations
#[derive(Error, Debug)]
pub enum MsalAuthError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Uniform authentication failure surfaced to callers.
    ///
    /// Carries no detail on purpose; the reason is only written to the logs.
    #[error("Authentication Error")]
    Unauthorized,

    /// The ID token decoded but its claims did not validate
    #[error("Invalid token: {0}")]
    InvalidToken(TokenStatus),

    /// The ID token could not be decoded
    #[error("Token decode error: {0}")]
    TokenDecode(String),

    /// The `state` returned by the provider does not match the stored flow
    #[error("State mismatch: {0}")]
    StateMismatch(String),

    /// A session write was attempted before `init_session`
    #[error("No session id, make sure the session was initialized by calling init_session")]
    NoSession,

    /// Session store errors
    #[error("Storage error: {0}")]
    Storage(String),

    /// HTTP request errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// YAML parsing errors
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl MsalAuthError {
    /// Returns `true` for transport-level failures the caller may retry.
    ///
    /// Nothing inside this crate retries; the flag only informs the
    /// surrounding layer.
    pub fn is_retryable(&self) -> bool {
        matches!(self, MsalAuthError::Http(_) | MsalAuthError::Io(_))
    }
}

/// Returns `true` when `err` carries a retryable [`MsalAuthError`] or a raw
/// transport error anywhere in its chain.
pub fn is_retryable(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| {
        if let Some(e) = cause.downcast_ref::<MsalAuthError>() {
            return e.is_retryable();
        }
        cause.downcast_ref::<reqwest::Error>().is_some()
            || cause.downcast_ref::<std::io::Error>().is_some()
    })
}

/// Returns `true` when `err` is the uniform unauthorized signal.
pub fn is_unauthorized(err: &anyhow::Error) -> bool {
    matches!(
        err.downcast_ref::<MsalAuthError>(),
        Some(MsalAuthError::Unauthorized)
    )
}

/// Result type alias for msal-authcode operations
///
/// This is a convenience alias that uses `anyhow::Error` as the error type,
/// allowing for rich error context and easy error propagation.
pub type Result<T> = anyhow::Result<T>;
