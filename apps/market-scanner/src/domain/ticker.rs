//! Tracked tickers and the records derived from them.
//!
//! A [`TrackedTicker`] is created once when a symbol is first surfaced and
//! is never deleted. Its generated [`EntityId`] keys every derived record:
//! scan records per session and day, daily history entries and news items.

use std::fmt;

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::error::DomainError;
use super::session::MarketSession;

// =============================================================================
// Identity
// =============================================================================

/// Normalized ticker symbol (trimmed, upper-case).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Symbol(String);

impl Symbol {
    /// Normalize and validate a raw ticker.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::InvalidSymbol`] for empty input or input with
    /// inner whitespace.
    pub fn new(raw: &str) -> Result<Self, DomainError> {
        let normalized = raw.trim().to_uppercase();
        if normalized.is_empty() || normalized.chars().any(char::is_whitespace) {
            return Err(DomainError::InvalidSymbol(raw.to_string()));
        }
        Ok(Self(normalized))
    }

    /// The symbol text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Stable identifier of a tracked ticker, generated at onboarding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(Uuid);

impl EntityId {
    /// Generate a fresh identifier.
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    /// Wrap an identifier loaded from storage.
    #[must_use]
    pub const fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }

    /// The underlying UUID.
    #[must_use]
    pub const fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

// =============================================================================
// Provider values
// =============================================================================

/// Latest quote for a symbol.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Quote {
    /// Quoted symbol.
    pub symbol: Symbol,
    /// Company description reported alongside the quote.
    pub description: Option<String>,
    /// Last traded price.
    pub last_price: Option<Decimal>,
    /// Net change in percent.
    pub change_percent: Option<Decimal>,
    /// Cumulative session volume.
    pub volume: Option<i64>,
    /// Time of the quote as reported by the provider.
    pub quote_time: DateTime<Utc>,
}

impl Quote {
    /// Quote used when the provider call failed: every value is null and
    /// the quote time is the moment of the failed attempt.
    #[must_use]
    pub const fn unavailable(symbol: Symbol, now: DateTime<Utc>) -> Self {
        Self {
            symbol,
            description: None,
            last_price: None,
            change_percent: None,
            volume: None,
            quote_time: now,
        }
    }
}

/// Size and liquidity figures.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Fundamentals {
    /// Market capitalization.
    pub market_cap: Option<Decimal>,
    /// Average volume over the last day.
    pub avg_volume_1d: Option<i64>,
    /// Average volume over the last ten days.
    pub avg_volume_10d: Option<i64>,
    /// Average volume over the last three months.
    pub avg_volume_3m: Option<i64>,
}

/// Company description and ownership structure.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompanyProfile {
    /// Country of incorporation.
    pub country: Option<String>,
    /// Company website.
    pub website: Option<String>,
    /// Long business summary.
    pub summary: Option<String>,
    /// Sector.
    pub sector: Option<String>,
    /// Industry.
    pub industry: Option<String>,
    /// Float shares.
    pub float_shares: Option<i64>,
    /// Fraction of shares held by insiders.
    pub insider_ownership_pct: Option<Decimal>,
    /// Fraction of shares held by institutions.
    pub institutional_ownership_pct: Option<Decimal>,
    /// Trailing operating cash flow.
    pub operating_cash_flow: Option<Decimal>,
}

/// Short-interest figures for a ticker.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShortInterest {
    /// Days to cover.
    pub short_ratio: Option<Decimal>,
    /// Shares sold short.
    pub shares_short: Option<i64>,
    /// Short interest as a fraction of float.
    pub short_percent_of_float: Option<Decimal>,
    /// Short interest as a fraction of shares outstanding.
    pub shares_short_percent_outstanding: Option<Decimal>,
    /// Shares sold short in the prior report.
    pub shares_short_prior_month: Option<i64>,
    /// Date of the prior report.
    pub prior_month_date: Option<NaiveDate>,
    /// Date of the current report.
    pub report_date: Option<NaiveDate>,
}

/// Profile and short interest fetched together from the company data source.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompanyReport {
    /// Company profile.
    pub profile: CompanyProfile,
    /// Short-interest figures.
    pub short_interest: ShortInterest,
}

// =============================================================================
// Stored entities
// =============================================================================

/// A ticker known to the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackedTicker {
    /// Stable identifier.
    pub entity_id: EntityId,
    /// Ticker symbol.
    pub symbol: Symbol,
    /// Company name.
    pub company_name: Option<String>,
    /// Latest fundamentals.
    pub fundamentals: Fundamentals,
    /// Latest profile.
    pub profile: CompanyProfile,
    /// Quote time recorded by the last full refresh.
    pub last_quote_time: Option<DateTime<Utc>>,
}

impl TrackedTicker {
    /// Build a ticker from its first full fetch.
    #[must_use]
    pub fn onboard(quote: &Quote, fundamentals: Fundamentals, profile: CompanyProfile) -> Self {
        Self {
            entity_id: EntityId::generate(),
            symbol: quote.symbol.clone(),
            company_name: quote.description.clone(),
            fundamentals,
            profile,
            last_quote_time: Some(quote.quote_time),
        }
    }

    /// Apply a full re-fetch. The company name survives a quote without one.
    pub fn apply_refresh(&mut self, quote: &Quote, fundamentals: Fundamentals, profile: CompanyProfile) {
        if quote.description.is_some() {
            self.company_name.clone_from(&quote.description);
        }
        self.fundamentals = fundamentals;
        self.profile = profile;
        self.last_quote_time = Some(quote.quote_time);
    }

    /// Calendar date of the last recorded quote.
    #[must_use]
    pub fn last_quote_date(&self) -> Option<NaiveDate> {
        self.last_quote_time.map(|t| t.date_naive())
    }
}

/// Per-session quote snapshot of a ticker for one calendar day.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanRecord {
    /// Owning ticker.
    pub entity_id: EntityId,
    /// Ticker symbol.
    pub symbol: Symbol,
    /// Session the ticker was surfaced in.
    pub session: MarketSession,
    /// Day the record belongs to.
    pub scan_date: NaiveDate,
    /// Quote time.
    pub quote_time: DateTime<Utc>,
    /// Last price.
    pub last_price: Option<Decimal>,
    /// Net change in percent.
    pub change_percent: Option<Decimal>,
    /// Session volume.
    pub volume: Option<i64>,
}

impl ScanRecord {
    /// Snapshot `quote` for `ticker` in `session` on `scan_date`.
    #[must_use]
    pub fn from_quote(
        entity_id: EntityId,
        session: MarketSession,
        scan_date: NaiveDate,
        quote: &Quote,
    ) -> Self {
        Self {
            entity_id,
            symbol: quote.symbol.clone(),
            session,
            scan_date,
            quote_time: quote.quote_time,
            last_price: quote.last_price,
            change_percent: quote.change_percent,
            volume: quote.volume,
        }
    }
}

/// "This ticker was observed on this date."
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryEntry {
    /// Owning ticker.
    pub entity_id: EntityId,
    /// Ticker symbol.
    pub symbol: Symbol,
    /// Observation date.
    pub date: NaiveDate,
    /// ISO week number of `date`.
    pub iso_week: u32,
}

impl HistoryEntry {
    /// Entry for `date`.
    #[must_use]
    pub fn observed(entity_id: EntityId, symbol: Symbol, date: NaiveDate) -> Self {
        Self {
            entity_id,
            symbol,
            date,
            iso_week: date.iso_week().week(),
        }
    }
}
