//! Trading sessions.
//!
//! Only the pre-market and regular-market sessions exist. Each one owns
//! its own scan records and its own ordered list of data sources.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::error::DomainError;

/// Trading period a worker polls for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarketSession {
    /// Before the opening bell.
    PreMarket,
    /// Regular trading hours.
    RegularMarket,
}

impl MarketSession {
    /// Every supported session, in start order.
    pub const ALL: [Self; 2] = [Self::PreMarket, Self::RegularMarket];

    /// Stable snake_case name used in config, logs and storage.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::PreMarket => "pre_market",
            Self::RegularMarket => "regular_market",
        }
    }

    /// Human readable label for log lines.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::PreMarket => "Pre-Market",
            Self::RegularMarket => "Regular Market",
        }
    }

    /// Source operation names polled by default, in order.
    #[must_use]
    pub const fn default_sources(&self) -> &'static [&'static str] {
        match self {
            Self::PreMarket => &["charles_schwab_pre_market_movers", "stock_analysis"],
            Self::RegularMarket => &[
                "charles_schwab_regular_market_movers",
                "stock_analysis_regular_market_gainers",
                "stock_analysis_regular_market_active",
            ],
        }
    }
}

impl fmt::Display for MarketSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MarketSession {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "pre_market" | "premarket" => Ok(Self::PreMarket),
            "regular_market" | "regular" => Ok(Self::RegularMarket),
            _ => Err(DomainError::UnknownSession(s.to_string())),
        }
    }
}
