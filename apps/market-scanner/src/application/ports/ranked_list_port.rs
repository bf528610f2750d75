//! Ranked List Port (Driven Port)
//!
//! Ticker rankings published by a third-party screener page.

use async_trait::async_trait;

use super::market_data_port::ProviderError;
use crate::domain::{MarketSession, Symbol};

/// Screener list to read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RankedCategory {
    /// Top pre-market gainers.
    PremarketGainers,
    /// Top gainers of the regular session.
    Gainers,
    /// Most active by volume.
    MostActive,
}

impl RankedCategory {
    /// Label for logs.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::PremarketGainers => "premarket_gainers",
            Self::Gainers => "gainers",
            Self::MostActive => "most_active",
        }
    }
}

/// Ranked ticker lists.
#[async_trait]
pub trait RankedListPort: Send + Sync {
    /// Tickers in ranking order.
    async fn ranked_tickers(
        &self,
        session: MarketSession,
        category: RankedCategory,
    ) -> Result<Vec<Symbol>, ProviderError>;

    /// Number of tickers currently listed.
    async fn length(
        &self,
        session: MarketSession,
        category: RankedCategory,
    ) -> Result<usize, ProviderError> {
        Ok(self.ranked_tickers(session, category).await?.len())
    }
}
