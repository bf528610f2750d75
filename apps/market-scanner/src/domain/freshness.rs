//! Reconciliation branch selection.

use chrono::NaiveDate;

use super::ticker::TrackedTicker;

/// Branch taken when reconciling a ticker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReconcilePath {
    /// Ticker unknown to the store: full ingestion.
    Onboarding,
    /// Ticker refreshed today: quote-only update.
    QuoteRefresh,
    /// Ticker last refreshed on another day: full re-fetch.
    StaleRefresh,
}

impl ReconcilePath {
    /// Label for logs and metrics.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Onboarding => "onboarding",
            Self::QuoteRefresh => "quote_refresh",
            Self::StaleRefresh => "stale_refresh",
        }
    }
}

/// Select the branch for a ticker. Only calendar dates are compared.
#[must_use]
pub fn select_path(tracked: Option<&TrackedTicker>, today: NaiveDate) -> ReconcilePath {
    match tracked {
        None => ReconcilePath::Onboarding,
        Some(ticker) if ticker.last_quote_date() == Some(today) => ReconcilePath::QuoteRefresh,
        Some(_) => ReconcilePath::StaleRefresh,
    }
}
