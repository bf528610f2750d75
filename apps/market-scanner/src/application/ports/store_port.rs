//! Store Port (Driven Port)
//!
//! Typed persistence contract for tracked tickers, their derived records
//! and issued credentials. Every call is atomic from the caller's point of
//! view and safe under concurrent callers; existence checks are expected
//! to be indexed lookups.

use std::collections::HashSet;

use async_trait::async_trait;
use chrono::NaiveDate;
use thiserror::Error;

use crate::domain::{
    Credential, EntityId, HistoryEntry, MarketSession, NewsItem, ScanRecord, ShortInterest,
    Symbol, TrackedTicker,
};

/// Errors surfaced by store implementations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// Connection could not be established or was lost.
    #[error("store connection error: {0}")]
    Connection(String),

    /// Statement failed.
    #[error("store query error: {0}")]
    Query(String),

    /// Update targeted a row that does not exist.
    #[error("{kind} not found: {key}")]
    NotFound {
        /// Entity kind.
        kind: &'static str,
        /// Key that was looked up.
        key: String,
    },

    /// Stored data violates an invariant.
    #[error("data integrity error: {0}")]
    Integrity(String),

    /// Value could not be encoded or decoded.
    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Persistence of tracked tickers and everything keyed by their entity id.
#[async_trait]
pub trait TickerStore: Send + Sync {
    /// Look up a ticker by symbol.
    async fn find_ticker(&self, symbol: &Symbol) -> Result<Option<TrackedTicker>, StoreError>;

    /// Insert a newly onboarded ticker.
    async fn insert_ticker(&self, ticker: &TrackedTicker) -> Result<(), StoreError>;

    /// Replace the mutable attributes of an existing ticker.
    async fn update_ticker(&self, ticker: &TrackedTicker) -> Result<(), StoreError>;

    /// Insert the short-interest record of a ticker.
    async fn insert_short_interest(
        &self,
        entity_id: EntityId,
        short_interest: &ShortInterest,
    ) -> Result<(), StoreError>;

    /// Replace the short-interest record of a ticker.
    async fn update_short_interest(
        &self,
        entity_id: EntityId,
        short_interest: &ShortInterest,
    ) -> Result<(), StoreError>;

    /// Scan record of a ticker for a session and day.
    async fn find_scan_record(
        &self,
        session: MarketSession,
        entity_id: EntityId,
        scan_date: NaiveDate,
    ) -> Result<Option<ScanRecord>, StoreError>;

    /// Insert a scan record.
    async fn insert_scan_record(&self, record: &ScanRecord) -> Result<(), StoreError>;

    /// Update the scan record with the same `(session, entity, date)` key.
    async fn update_scan_record(&self, record: &ScanRecord) -> Result<(), StoreError>;

    /// Whether a history entry exists for a ticker on a date.
    async fn history_exists(&self, entity_id: EntityId, date: NaiveDate)
    -> Result<bool, StoreError>;

    /// Insert a history entry. Returns `false` when the `(entity, date)` row
    /// already existed and nothing was written.
    async fn insert_history(&self, entry: &HistoryEntry) -> Result<bool, StoreError>;

    /// Provider news ids already stored for a ticker.
    async fn news_ids(&self, entity_id: EntityId) -> Result<HashSet<String>, StoreError>;

    /// Insert a news item. Returns `false` when the id was already stored.
    async fn insert_news(&self, item: &NewsItem) -> Result<bool, StoreError>;
}

/// Append-only credential log.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Most recently issued credential.
    async fn latest_credential(&self) -> Result<Option<Credential>, StoreError>;

    /// Append a newly issued credential.
    async fn append_credential(&self, credential: &Credential) -> Result<(), StoreError>;
}
