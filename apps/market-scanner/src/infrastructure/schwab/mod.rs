//! Schwab Adapter
//!
//! OAuth token endpoint and market data client for the Schwab API.
//!
//! # Components
//!
//! - [`SchwabHttpClient`]: `reqwest` client with exponential backoff on
//!   408/429/5xx and network errors
//! - [`SchwabTokenEndpoint`]: refresh, code exchange and validity probe
//! - [`SchwabMarketData`]: quotes, fundamentals and movers using the
//!   shared bearer credential

mod api_types;
mod config;
mod error;
mod http_client;
mod market_data;
mod oauth;

pub use config::RetryConfig;
pub use error::SchwabError;
pub use http_client::SchwabHttpClient;
pub use market_data::SchwabMarketData;
pub use oauth::SchwabTokenEndpoint;
