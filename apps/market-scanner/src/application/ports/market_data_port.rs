//! Market Data Port (Driven Port)
//!
//! Quotes, fundamentals and movers from the bearer-authenticated market
//! data provider.

use async_trait::async_trait;
use thiserror::Error;

use super::auth_port::CredentialError;
use crate::domain::{Fundamentals, Quote, Symbol};

/// Errors from upstream data providers.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProviderError {
    /// Network failure or timeout.
    #[error("transport error: {message}")]
    Transport {
        /// Underlying error.
        message: String,
    },

    /// Provider rejected the credential.
    #[error("unauthorized by {provider}")]
    Unauthorized {
        /// Provider name.
        provider: &'static str,
    },

    /// Provider throttled the request.
    #[error("rate limited, retry after {retry_after_secs}s")]
    RateLimited {
        /// Suggested retry delay in seconds.
        retry_after_secs: u64,
    },

    /// Provider answered with an error status.
    #[error("API error ({status}): {message}")]
    Api {
        /// HTTP status.
        status: u16,
        /// Error body.
        message: String,
    },

    /// Payload did not have the expected shape.
    #[error("unexpected payload: {message}")]
    Decode {
        /// Decoding error.
        message: String,
    },

    /// Provider has no data for the symbol.
    #[error("no data for {symbol}")]
    NotFound {
        /// Requested symbol.
        symbol: String,
    },

    /// No credential could be acquired.
    #[error("credential unavailable: {0}")]
    Credentials(#[from] CredentialError),
}

impl ProviderError {
    /// Whether the failure stops every worker sharing the credential.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        match self {
            Self::Credentials(err) => err.is_terminal(),
            _ => false,
        }
    }

    /// Short label for metrics.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Transport { .. } => "transport",
            Self::Unauthorized { .. } => "unauthorized",
            Self::RateLimited { .. } => "rate_limited",
            Self::Api { .. } => "api",
            Self::Decode { .. } => "decode",
            Self::NotFound { .. } => "not_found",
            Self::Credentials(_) => "credentials",
        }
    }
}

/// Sort order for movers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MoversSort {
    /// Largest percentage gain first.
    #[default]
    PercentChangeUp,
    /// Largest percentage loss first.
    PercentChangeDown,
    /// Highest volume first.
    Volume,
    /// Most trades first.
    Trades,
}

impl MoversSort {
    /// Provider query value.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::PercentChangeUp => "PERCENT_CHANGE_UP",
            Self::PercentChangeDown => "PERCENT_CHANGE_DOWN",
            Self::Volume => "VOLUME",
            Self::Trades => "TRADES",
        }
    }
}

/// Movers query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MoversFilter {
    /// Index or universe to rank, e.g. `EQUITY_ALL` or `$SPX`.
    pub index: String,
    /// Ranking order.
    pub sort: MoversSort,
    /// Minimum percent-change bucket (0, 1, 5, 10, 30, 60).
    pub frequency: u8,
}

impl Default for MoversFilter {
    fn default() -> Self {
        Self {
            index: "EQUITY_ALL".to_string(),
            sort: MoversSort::default(),
            frequency: 0,
        }
    }
}

/// Bearer-authenticated market data provider.
#[async_trait]
pub trait MarketDataPort: Send + Sync {
    /// Latest quote.
    async fn quote(&self, symbol: &Symbol) -> Result<Quote, ProviderError>;

    /// Market cap and average volumes.
    async fn fundamentals(&self, symbol: &Symbol) -> Result<Fundamentals, ProviderError>;

    /// Ranked movers in provider order.
    async fn movers(&self, filter: &MoversFilter) -> Result<Vec<Symbol>, ProviderError>;
}
