use thiserror::Error;

/// Validation errors raised while constructing domain values.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DomainError {
    /// Ticker symbol was empty or contained whitespace.
    #[error("invalid ticker symbol: {0:?}")]
    InvalidSymbol(String),

    /// Session name does not map to a supported trading session.
    #[error("unknown market session: {0}")]
    UnknownSession(String),
}
