//! Yahoo Finance Adapter
//!
//! Company profile, short interest and news through the public Yahoo
//! Finance endpoints. No key is required; quoteSummary needs the
//! cookie and crumb handshake performed by [`YahooFinanceClient`].

mod api_types;
mod client;

pub use client::{DEFAULT_API_BASE_URL, DEFAULT_COOKIE_URL, YahooFinanceClient};
