//! Schwab market data adapter.
//!
//! Implements [`MarketDataPort`] against `/marketdata/v1`. Every request
//! carries the shared bearer credential; a 401/403 marks it invalid so the
//! next acquisition refreshes or re-authorizes.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;

use super::api_types::{InstrumentsResponse, MoversResponse, QuoteEnvelope, to_decimal};
use super::error::SchwabError;
use super::http_client::SchwabHttpClient;
use crate::application::ports::{CredentialSource, MarketDataPort, MoversFilter, ProviderError};
use crate::domain::{Fundamentals, Quote, Symbol, datetime_from_epoch};

const MARKET_DATA_PATH: &str = "/marketdata/v1";

/// Market data from the Schwab API.
pub struct SchwabMarketData {
    http: SchwabHttpClient,
    credentials: Arc<dyn CredentialSource>,
}

impl SchwabMarketData {
    /// Create the adapter.
    #[must_use]
    pub fn new(http: SchwabHttpClient, credentials: Arc<dyn CredentialSource>) -> Self {
        Self { http, credentials }
    }

    async fn get<T: DeserializeOwned>(
        &self,
        endpoint: &'static str,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<T, SchwabError> {
        let credential = self.credentials.acquire().await?;
        let result = self
            .http
            .get_bearer(
                endpoint,
                &format!("{MARKET_DATA_PATH}{path}"),
                query,
                credential.access_token(),
            )
            .await;

        if let Err(SchwabError::Unauthorized { status }) = &result {
            tracing::warn!(endpoint, status, "Bearer credential rejected, invalidating");
            self.credentials.invalidate();
        }
        result
    }
}

#[async_trait]
impl MarketDataPort for SchwabMarketData {
    async fn quote(&self, symbol: &Symbol) -> Result<Quote, ProviderError> {
        let mut quotes: HashMap<String, QuoteEnvelope> = self
            .get("quotes", &format!("/{symbol}/quotes"), &[])
            .await?;

        let envelope = quotes
            .remove(symbol.as_str())
            .ok_or_else(|| SchwabError::NotFound(symbol.to_string()))?;
        let block = envelope
            .quote
            .ok_or_else(|| SchwabError::NotFound(symbol.to_string()))?;

        let quote_time = block
            .quote_time
            .and_then(datetime_from_epoch)
            .ok_or_else(|| {
                SchwabError::JsonParse(format!(
                    "quoteTime missing or not an epoch timestamp for {symbol}"
                ))
            })?;

        Ok(Quote {
            symbol: symbol.clone(),
            description: envelope.reference.and_then(|r| r.description),
            last_price: block.last_price.and_then(to_decimal),
            change_percent: block.net_percent_change.and_then(to_decimal),
            volume: block.total_volume,
            quote_time,
        })
    }

    async fn fundamentals(&self, symbol: &Symbol) -> Result<Fundamentals, ProviderError> {
        let response: InstrumentsResponse = self
            .get(
                "instruments",
                "/instruments",
                &[("symbol", symbol.as_str()), ("projection", "fundamental")],
            )
            .await?;

        let instrument = response
            .instruments
            .into_iter()
            .find(|i| i.symbol.as_deref().is_none_or(|s| s == symbol.as_str()))
            .ok_or_else(|| SchwabError::NotFound(symbol.to_string()))?;

        Ok(instrument.fundamental.map(Fundamentals::from).unwrap_or_default())
    }

    async fn movers(&self, filter: &MoversFilter) -> Result<Vec<Symbol>, ProviderError> {
        let frequency = filter.frequency.to_string();
        let response: MoversResponse = self
            .get(
                "movers",
                &format!("/movers/{}", filter.index),
                &[("sort", filter.sort.as_str()), ("frequency", frequency.as_str())],
            )
            .await?;

        let symbols = response
            .screeners
            .into_iter()
            .filter_map(|screener| screener.symbol)
            .filter_map(|raw| match Symbol::new(&raw) {
                Ok(symbol) => Some(symbol),
                Err(e) => {
                    tracing::debug!(symbol = %raw, error = %e, "Skipping unusable mover");
                    None
                }
            })
            .collect();
        Ok(symbols)
    }
}

impl std::fmt::Debug for SchwabMarketData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SchwabMarketData")
            .field("base_url", &self.http.base_url())
            .finish_non_exhaustive()
    }
}
