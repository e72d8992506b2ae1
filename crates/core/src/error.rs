//! Error types for the LoopGuard domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error variant.
//!
//! Stopping is not an error: budget exhaustion and convergence are ordinary
//! decisions returned by the controller.

use thiserror::Error;

/// The top-level error type for all LoopGuard operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Construction-time validation ---
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    // --- Serialization ---
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // --- Generic ---
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

/// Invalid construction input. Fatal to the call that produced it.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("response content must not be empty")]
    EmptyContent,

    #[error("confidence must be within [0, 1], got {0}")]
    ConfidenceOutOfRange(f64),

    #[error("invalid {field}: {reason}")]
    InvalidConfig { field: &'static str, reason: String },
}

impl ValidationError {
    /// Shorthand for an [`ValidationError::InvalidConfig`].
    pub fn config(field: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            field,
            reason: reason.into(),
        }
    }
}

/// Failures of the semantic-similarity oracle.
///
/// These never escape the convergence detector; they only trigger the
/// lexical fallback.
#[derive(Debug, Clone, Error)]
pub enum OracleError {
    #[error("oracle unavailable: {0}")]
    Unavailable(String),

    #[error("oracle timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("oracle returned an unusable response: {0}")]
    InvalidResponse(String),

    #[error("oracle provider failed: {0}")]
    Provider(#[from] ProviderError),
}

#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError {
        status_code: u16,
        message: String,
    },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),
}
