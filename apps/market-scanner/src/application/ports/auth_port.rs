//! Authentication Ports (Driven Ports)
//!
//! [`TokenEndpoint`] and [`ConsentPrompt`] are consumed by the credential
//! manager; [`CredentialSource`] is what the manager offers to adapters
//! that need a bearer token.

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::{Credential, TokenGrant};

/// Errors raised while acquiring a credential.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CredentialError {
    /// Interactive authorization is required but no channel is available.
    #[error("interactive authorization unavailable: {reason}")]
    ConsentUnavailable {
        /// Why the channel is unavailable.
        reason: String,
    },

    /// The authorization code exchange was rejected.
    #[error("authorization rejected ({status}): {message}")]
    AuthorizationRejected {
        /// HTTP status.
        status: u16,
        /// Response body or reason.
        message: String,
    },

    /// The refresh-token exchange was rejected.
    #[error("refresh rejected ({status}): {message}")]
    RefreshRejected {
        /// HTTP status.
        status: u16,
        /// Response body or reason.
        message: String,
    },

    /// Token endpoint could not be reached.
    #[error("token endpoint unreachable: {message}")]
    Transport {
        /// Underlying error.
        message: String,
    },

    /// Token endpoint answered with an unexpected payload.
    #[error("invalid token response: {message}")]
    InvalidResponse {
        /// Decoding error.
        message: String,
    },

    /// Credential log could not be read.
    #[error("credential store error: {message}")]
    Store {
        /// Underlying store error.
        message: String,
    },
}

impl CredentialError {
    /// Whether no further acquisition can succeed without operator action.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::ConsentUnavailable { .. } | Self::AuthorizationRejected { .. }
        )
    }
}

/// OAuth token endpoint of the market data provider.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TokenEndpoint: Send + Sync {
    /// URL the operator opens to grant access.
    fn authorization_url(&self) -> String;

    /// Lightweight authenticated request. `Ok(false)` means the token was
    /// rejected.
    async fn probe(&self, access_token: &str) -> Result<bool, CredentialError>;

    /// Exchange a refresh token for a new grant.
    async fn refresh(&self, refresh_token: &str) -> Result<TokenGrant, CredentialError>;

    /// Exchange an authorization code for a new grant.
    async fn exchange_code(&self, code: &str) -> Result<TokenGrant, CredentialError>;
}

/// Out-of-band channel that turns an authorization URL into a code.
#[async_trait]
pub trait ConsentPrompt: Send + Sync {
    /// Present `authorization_url` and wait for the resulting code.
    async fn authorization_code(&self, authorization_url: &str) -> Result<String, CredentialError>;
}

/// Source of the shared bearer credential.
#[async_trait]
pub trait CredentialSource: Send + Sync {
    /// A credential that is valid to the best of the source's knowledge.
    async fn acquire(&self) -> Result<Credential, CredentialError>;

    /// Report that the last acquired credential was rejected upstream.
    fn invalidate(&self);
}
