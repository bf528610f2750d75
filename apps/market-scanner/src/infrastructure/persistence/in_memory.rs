//! In-memory store for tests and local runs without a database.

use std::collections::hash_map::Entry;
use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use chrono::NaiveDate;
use parking_lot::RwLock;

use crate::application::ports::{CredentialStore, StoreError, TickerStore};
use crate::domain::{
    Credential, EntityId, HistoryEntry, MarketSession, NewsItem, ScanRecord, ShortInterest,
    Symbol, TrackedTicker,
};

type ScanKey = (MarketSession, EntityId, NaiveDate);

/// In-memory implementation of [`TickerStore`] and [`CredentialStore`].
///
/// Keys and conflict behavior mirror the Postgres schema: duplicate
/// tickers and scan records are integrity errors, duplicate history and
/// news rows are ignored. Data is lost on restart.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    tickers: RwLock<HashMap<Symbol, TrackedTicker>>,
    short_interest: RwLock<HashMap<EntityId, ShortInterest>>,
    scans: RwLock<HashMap<ScanKey, ScanRecord>>,
    history: RwLock<HashMap<(EntityId, NaiveDate), HistoryEntry>>,
    news: RwLock<HashMap<EntityId, Vec<NewsItem>>>,
    credentials: RwLock<Vec<Credential>>,
}

impl InMemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of tracked tickers.
    #[must_use]
    pub fn ticker_count(&self) -> usize {
        self.tickers.read().len()
    }

    /// Tracked ticker by symbol.
    #[must_use]
    pub fn ticker(&self, symbol: &str) -> Option<TrackedTicker> {
        let symbol = Symbol::new(symbol).ok()?;
        self.tickers.read().get(&symbol).cloned()
    }

    /// Short-interest record of a ticker.
    #[must_use]
    pub fn short_interest(&self, entity_id: EntityId) -> Option<ShortInterest> {
        self.short_interest.read().get(&entity_id).cloned()
    }

    /// Scan records of a session, any day.
    #[must_use]
    pub fn scan_records(&self, session: MarketSession) -> Vec<ScanRecord> {
        self.scans
            .read()
            .values()
            .filter(|record| record.session == session)
            .cloned()
            .collect()
    }

    /// History entries of a ticker.
    #[must_use]
    pub fn history(&self, entity_id: EntityId) -> Vec<HistoryEntry> {
        let mut entries: Vec<_> = self
            .history
            .read()
            .values()
            .filter(|entry| entry.entity_id == entity_id)
            .cloned()
            .collect();
        entries.sort_by_key(|entry| entry.date);
        entries
    }

    /// News items of a ticker in insertion order.
    #[must_use]
    pub fn news(&self, entity_id: EntityId) -> Vec<NewsItem> {
        self.news.read().get(&entity_id).cloned().unwrap_or_default()
    }

    /// Number of credentials ever appended.
    #[must_use]
    pub fn credential_count(&self) -> usize {
        self.credentials.read().len()
    }

    /// Seed a ticker (test setup).
    pub fn add_ticker(&self, ticker: TrackedTicker) {
        self.tickers.write().insert(ticker.symbol.clone(), ticker);
    }

    /// Seed a scan record (test setup).
    pub fn add_scan_record(&self, record: ScanRecord) {
        self.scans
            .write()
            .insert((record.session, record.entity_id, record.scan_date), record);
    }
}

#[async_trait]
impl TickerStore for InMemoryStore {
    async fn find_ticker(&self, symbol: &Symbol) -> Result<Option<TrackedTicker>, StoreError> {
        Ok(self.tickers.read().get(symbol).cloned())
    }

    async fn insert_ticker(&self, ticker: &TrackedTicker) -> Result<(), StoreError> {
        let mut tickers = self.tickers.write();
        if tickers.contains_key(&ticker.symbol) {
            return Err(StoreError::Integrity(format!(
                "ticker {} already exists",
                ticker.symbol
            )));
        }
        tickers.insert(ticker.symbol.clone(), ticker.clone());
        Ok(())
    }

    async fn update_ticker(&self, ticker: &TrackedTicker) -> Result<(), StoreError> {
        let mut tickers = self.tickers.write();
        match tickers.get_mut(&ticker.symbol) {
            Some(existing) if existing.entity_id == ticker.entity_id => {
                *existing = ticker.clone();
                Ok(())
            }
            _ => Err(StoreError::NotFound {
                kind: "ticker",
                key: ticker.entity_id.to_string(),
            }),
        }
    }

    async fn insert_short_interest(
        &self,
        entity_id: EntityId,
        short_interest: &ShortInterest,
    ) -> Result<(), StoreError> {
        let mut records = self.short_interest.write();
        if records.contains_key(&entity_id) {
            return Err(StoreError::Integrity(format!(
                "short interest for {entity_id} already exists"
            )));
        }
        records.insert(entity_id, short_interest.clone());
        Ok(())
    }

    async fn update_short_interest(
        &self,
        entity_id: EntityId,
        short_interest: &ShortInterest,
    ) -> Result<(), StoreError> {
        match self.short_interest.write().get_mut(&entity_id) {
            Some(existing) => {
                *existing = short_interest.clone();
                Ok(())
            }
            None => Err(StoreError::NotFound {
                kind: "short_interest",
                key: entity_id.to_string(),
            }),
        }
    }

    async fn find_scan_record(
        &self,
        session: MarketSession,
        entity_id: EntityId,
        scan_date: NaiveDate,
    ) -> Result<Option<ScanRecord>, StoreError> {
        Ok(self
            .scans
            .read()
            .get(&(session, entity_id, scan_date))
            .cloned())
    }

    async fn insert_scan_record(&self, record: &ScanRecord) -> Result<(), StoreError> {
        let key = (record.session, record.entity_id, record.scan_date);
        let mut scans = self.scans.write();
        if scans.contains_key(&key) {
            return Err(StoreError::Integrity(format!(
                "{} scan record for {} on {} already exists",
                record.session, record.symbol, record.scan_date
            )));
        }
        scans.insert(key, record.clone());
        Ok(())
    }

    async fn update_scan_record(&self, record: &ScanRecord) -> Result<(), StoreError> {
        let key = (record.session, record.entity_id, record.scan_date);
        match self.scans.write().get_mut(&key) {
            Some(existing) => {
                *existing = record.clone();
                Ok(())
            }
            None => Err(StoreError::NotFound {
                kind: "scan_record",
                key: format!("{}/{}/{}", record.session, record.entity_id, record.scan_date),
            }),
        }
    }

    async fn history_exists(
        &self,
        entity_id: EntityId,
        date: NaiveDate,
    ) -> Result<bool, StoreError> {
        Ok(self.history.read().contains_key(&(entity_id, date)))
    }

    async fn insert_history(&self, entry: &HistoryEntry) -> Result<bool, StoreError> {
        match self.history.write().entry((entry.entity_id, entry.date)) {
            Entry::Occupied(_) => Ok(false),
            Entry::Vacant(slot) => {
                slot.insert(entry.clone());
                Ok(true)
            }
        }
    }

    async fn news_ids(&self, entity_id: EntityId) -> Result<HashSet<String>, StoreError> {
        Ok(self
            .news
            .read()
            .get(&entity_id)
            .map(|items| items.iter().map(|item| item.news_id.clone()).collect())
            .unwrap_or_default())
    }

    async fn insert_news(&self, item: &NewsItem) -> Result<bool, StoreError> {
        let mut news = self.news.write();
        let items = news.entry(item.entity_id).or_default();
        if items.iter().any(|existing| existing.news_id == item.news_id) {
            return Ok(false);
        }
        items.push(item.clone());
        Ok(true)
    }
}

#[async_trait]
impl CredentialStore for InMemoryStore {
    async fn latest_credential(&self) -> Result<Option<Credential>, StoreError> {
        Ok(self
            .credentials
            .read()
            .iter()
            .max_by_key(|credential| credential.issued_at())
            .cloned())
    }

    async fn append_credential(&self, credential: &Credential) -> Result<(), StoreError> {
        self.credentials.write().push(credential.clone());
        Ok(())
    }
}
