//! Schwab-specific error types.

use thiserror::Error;

use crate::application::ports::{CredentialError, ProviderError};

/// Errors from the Schwab adapter.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SchwabError {
    /// Adapter could not be configured.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Network error (retryable).
    #[error("network error: {0}")]
    Network(String),

    /// API returned an error status.
    #[error("API error ({status}): {message}")]
    Api {
        /// HTTP status.
        status: u16,
        /// Error message from the API.
        message: String,
    },

    /// Credential rejected (401/403).
    #[error("unauthorized ({status})")]
    Unauthorized {
        /// HTTP status.
        status: u16,
    },

    /// Rate limited.
    #[error("rate limited, retry after {retry_after_secs}s")]
    RateLimited {
        /// Suggested retry delay in seconds.
        retry_after_secs: u64,
    },

    /// Symbol unknown to the API.
    #[error("symbol not found: {0}")]
    NotFound(String),

    /// JSON parsing error.
    #[error("JSON parsing error: {0}")]
    JsonParse(String),

    /// Max retries exceeded.
    #[error("max retries exceeded after {attempts} attempts")]
    MaxRetriesExceeded {
        /// Attempts made before giving up.
        attempts: u32,
    },

    /// No bearer credential available.
    #[error(transparent)]
    Credentials(#[from] CredentialError),
}

impl SchwabError {
    /// Short label for metrics.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::InvalidConfig(_) => "config",
            Self::Network(_) | Self::MaxRetriesExceeded { .. } => "transport",
            Self::Api { .. } => "api",
            Self::Unauthorized { .. } => "unauthorized",
            Self::RateLimited { .. } => "rate_limited",
            Self::NotFound(_) => "not_found",
            Self::JsonParse(_) => "decode",
            Self::Credentials(_) => "credentials",
        }
    }

    /// Map a token endpoint failure. `rejected` builds the error used when
    /// the endpoint answers with a non-success status.
    pub(super) fn into_credential_error(
        self,
        rejected: impl FnOnce(u16, String) -> CredentialError,
    ) -> CredentialError {
        match self {
            Self::Api { status, message } => rejected(status, message),
            Self::Unauthorized { status } => rejected(status, "unauthorized".to_string()),
            Self::RateLimited { retry_after_secs } => CredentialError::Transport {
                message: format!("rate limited, retry after {retry_after_secs}s"),
            },
            Self::NotFound(what) => rejected(404, what),
            Self::JsonParse(message) => CredentialError::InvalidResponse { message },
            Self::Credentials(err) => err,
            err @ (Self::InvalidConfig(_)
            | Self::Network(_)
            | Self::MaxRetriesExceeded { .. }) => CredentialError::Transport {
                message: err.to_string(),
            },
        }
    }
}

impl From<SchwabError> for ProviderError {
    fn from(err: SchwabError) -> Self {
        match err {
            SchwabError::Network(message) | SchwabError::InvalidConfig(message) => {
                Self::Transport { message }
            }
            err @ SchwabError::MaxRetriesExceeded { .. } => Self::Transport {
                message: err.to_string(),
            },
            SchwabError::Api { status, message } => Self::Api { status, message },
            SchwabError::Unauthorized { .. } => Self::Unauthorized { provider: "schwab" },
            SchwabError::RateLimited { retry_after_secs } => Self::RateLimited { retry_after_secs },
            SchwabError::NotFound(symbol) => Self::NotFound { symbol },
            SchwabError::JsonParse(message) => Self::Decode { message },
            SchwabError::Credentials(err) => Self::Credentials(err),
        }
    }
}
