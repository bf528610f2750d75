//! Domain Layer - Tracked entities, sessions and freshness rules.
//!
//! Pure types with no I/O. Everything the store persists and every value
//! the providers return is modeled here; the only decision logic is the
//! freshness branch selection used by reconciliation.

/// Credential value object and token grants.
pub mod credential;

/// Domain validation errors.
pub mod error;

/// Reconciliation branch selection.
pub mod freshness;

/// News articles and stored news items.
pub mod news;

/// Trading sessions.
pub mod session;

/// Tickers, quotes, fundamentals and derived records.
pub mod ticker;

/// Clock abstraction and epoch conversions.
pub mod time;

pub use credential::{Credential, CredentialOrigin, TokenGrant};
pub use error::DomainError;
pub use freshness::{ReconcilePath, select_path};
pub use news::{NewsArticle, NewsItem};
pub use session::MarketSession;
pub use ticker::{
    CompanyProfile, CompanyReport, EntityId, Fundamentals, HistoryEntry, Quote, ScanRecord,
    ShortInterest, Symbol, TrackedTicker,
};
pub use time::{Clock, ManualClock, SystemClock, datetime_from_epoch};
