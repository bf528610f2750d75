//! Reconciliation Engine
//!
//! Brings the stored state of one ticker up to date for one session. The
//! branch is chosen once per call from the ticker's last recorded quote
//! date (see [`select_path`]):
//!
//! - **Onboarding**: quote, fundamentals and company data are fetched, the
//!   ticker and its short interest are created, then the session's scan
//!   record, today's history entry and unseen news are written.
//! - **Quote refresh**: only the quote is fetched. An existing scan record
//!   for today is updated in place; otherwise it is inserted and the
//!   history and news bookkeeping runs as a first sighting.
//! - **Stale refresh**: everything is re-fetched, the ticker and its short
//!   interest are updated, then the same writes as onboarding follow.
//!
//! Provider failures degrade to null fields and store failures lose the
//! affected write; both are logged and reported as warnings. A call never
//! fails as a whole.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;
use tracing::{debug, info, warn};

use crate::application::ports::{
    CompanyDataPort, MarketDataPort, ProviderError, StoreError, TickerStore,
};
use crate::domain::{
    Clock, CompanyReport, Fundamentals, HistoryEntry, MarketSession, NewsItem, Quote,
    ReconcilePath, ScanRecord, Symbol, TrackedTicker, select_path,
};

/// How the session's scan record was written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanWrite {
    /// First record for this ticker, session and day.
    Inserted,
    /// Today's record was updated in place.
    Updated,
}

/// Outcome of reconciling one ticker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcileReport {
    /// Reconciled ticker.
    pub symbol: Symbol,
    /// Session the ticker was surfaced in.
    pub session: MarketSession,
    /// Branch taken; `None` if the ticker could not even be looked up.
    pub path: Option<ReconcilePath>,
    /// Scan record write, if it succeeded.
    pub scan_write: Option<ScanWrite>,
    /// Whether a history entry was created.
    pub history_inserted: bool,
    /// Number of news items inserted.
    pub news_inserted: usize,
    /// Degraded fields and lost writes.
    pub warnings: Vec<String>,
    /// Unrecoverable provider failure seen while fetching, if any.
    pub fatal: Option<ProviderError>,
}

impl ReconcileReport {
    fn new(symbol: Symbol, session: MarketSession) -> Self {
        Self {
            symbol,
            session,
            path: None,
            scan_write: None,
            history_inserted: false,
            news_inserted: 0,
            warnings: Vec::new(),
            fatal: None,
        }
    }

    /// Whether every fetch and write succeeded.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.path.is_some() && self.warnings.is_empty()
    }

    fn warn(&mut self, message: String) {
        warn!(
            symbol = %self.symbol,
            session = %self.session,
            "{message}"
        );
        self.warnings.push(message);
    }

    fn provider_failure(&mut self, what: &str, err: ProviderError) {
        self.warn(format!("{what} unavailable: {err}"));
        if err.is_fatal() && self.fatal.is_none() {
            self.fatal = Some(err);
        }
    }
}

/// Reconciles a single ticker for a session.
#[async_trait]
pub trait Reconciler: Send + Sync {
    /// Reconcile `symbol` for `session`. Never fails; problems are reported
    /// as warnings on the returned report.
    async fn reconcile(&self, symbol: &Symbol, session: MarketSession) -> ReconcileReport;
}

/// Reconciliation engine over the provider and store ports.
pub struct ReconciliationEngine {
    market_data: Arc<dyn MarketDataPort>,
    company_data: Arc<dyn CompanyDataPort>,
    store: Arc<dyn TickerStore>,
    clock: Arc<dyn Clock>,
}

impl ReconciliationEngine {
    /// Create a new engine.
    #[must_use]
    pub fn new(
        market_data: Arc<dyn MarketDataPort>,
        company_data: Arc<dyn CompanyDataPort>,
        store: Arc<dyn TickerStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            market_data,
            company_data,
            store,
            clock,
        }
    }

    /// Reconcile `symbol` for `session`.
    pub async fn reconcile(&self, symbol: &Symbol, session: MarketSession) -> ReconcileReport {
        let mut report = ReconcileReport::new(symbol.clone(), session);

        let tracked = match self.store.find_ticker(symbol).await {
            Ok(tracked) => tracked,
            Err(e) => {
                report.warn(format!("ticker lookup failed: {e}"));
                return report;
            }
        };

        let today = self.clock.today();
        let path = select_path(tracked.as_ref(), today);
        report.path = Some(path);
        debug!(symbol = %symbol, session = %session, path = path.as_str(), "Reconciling ticker");

        match tracked {
            None => self.onboard(symbol, session, today, &mut report).await,
            Some(ticker) if path == ReconcilePath::QuoteRefresh => {
                self.refresh_quote(&ticker, session, today, &mut report).await;
            }
            Some(ticker) => self.refresh_stale(ticker, session, today, &mut report).await,
        }

        report
    }

    async fn onboard(
        &self,
        symbol: &Symbol,
        session: MarketSession,
        today: NaiveDate,
        report: &mut ReconcileReport,
    ) {
        let quote = self.fetch_quote(symbol, report).await;
        let fundamentals = self.fetch_fundamentals(symbol, report).await;
        let company = self.fetch_company(symbol, report).await;

        let ticker = TrackedTicker::onboard(&quote, fundamentals, company.profile);
        if let Err(e) = self.store.insert_ticker(&ticker).await {
            report.warn(format!("ticker insert failed, onboarding aborted: {e}"));
            return;
        }
        info!(
            symbol = %symbol,
            entity_id = %ticker.entity_id,
            session = %session,
            "Onboarded new ticker"
        );

        if let Err(e) = self
            .store
            .insert_short_interest(ticker.entity_id, &company.short_interest)
            .await
        {
            report.warn(format!("short interest insert failed: {e}"));
        }

        self.first_sighting(&ticker, session, today, &quote, report).await;
    }

    async fn refresh_quote(
        &self,
        ticker: &TrackedTicker,
        session: MarketSession,
        today: NaiveDate,
        report: &mut ReconcileReport,
    ) {
        let quote = self.fetch_quote(&ticker.symbol, report).await;
        let record = ScanRecord::from_quote(ticker.entity_id, session, today, &quote);

        match self
            .store
            .find_scan_record(session, ticker.entity_id, today)
            .await
        {
            Ok(Some(_)) => match self.store.update_scan_record(&record).await {
                Ok(()) => report.scan_write = Some(ScanWrite::Updated),
                Err(e) => report.warn(format!("scan record update failed: {e}")),
            },
            Ok(None) => self.first_sighting(ticker, session, today, &quote, report).await,
            Err(e) => report.warn(format!("scan record lookup failed: {e}")),
        }
    }

    async fn refresh_stale(
        &self,
        mut ticker: TrackedTicker,
        session: MarketSession,
        today: NaiveDate,
        report: &mut ReconcileReport,
    ) {
        let quote = self.fetch_quote(&ticker.symbol, report).await;
        let fundamentals = self.fetch_fundamentals(&ticker.symbol, report).await;
        let company = self.fetch_company(&ticker.symbol, report).await;

        ticker.apply_refresh(&quote, fundamentals, company.profile);
        if let Err(e) = self.store.update_ticker(&ticker).await {
            report.warn(format!("ticker update failed: {e}"));
        }

        match self
            .store
            .update_short_interest(ticker.entity_id, &company.short_interest)
            .await
        {
            Ok(()) => {}
            Err(StoreError::NotFound { .. }) => {
                if let Err(e) = self
                    .store
                    .insert_short_interest(ticker.entity_id, &company.short_interest)
                    .await
                {
                    report.warn(format!("short interest insert failed: {e}"));
                }
            }
            Err(e) => report.warn(format!("short interest update failed: {e}")),
        }

        self.first_sighting(&ticker, session, today, &quote, report).await;
    }

    /// Scan record, history entry and news for a ticker seen for the first
    /// time in this session today.
    async fn first_sighting(
        &self,
        ticker: &TrackedTicker,
        session: MarketSession,
        today: NaiveDate,
        quote: &Quote,
        report: &mut ReconcileReport,
    ) {
        self.write_scan_record(ticker, session, today, quote, report).await;
        self.record_history(ticker, today, report).await;
        self.record_news(ticker, report).await;
    }

    /// Insert the scan record, or update it if another writer got there first.
    async fn write_scan_record(
        &self,
        ticker: &TrackedTicker,
        session: MarketSession,
        today: NaiveDate,
        quote: &Quote,
        report: &mut ReconcileReport,
    ) {
        let record = ScanRecord::from_quote(ticker.entity_id, session, today, quote);
        let existing = match self
            .store
            .find_scan_record(session, ticker.entity_id, today)
            .await
        {
            Ok(existing) => existing,
            Err(e) => {
                report.warn(format!("scan record lookup failed: {e}"));
                return;
            }
        };

        let (result, write) = if existing.is_some() {
            (self.store.update_scan_record(&record).await, ScanWrite::Updated)
        } else {
            (self.store.insert_scan_record(&record).await, ScanWrite::Inserted)
        };
        match result {
            Ok(()) => report.scan_write = Some(write),
            Err(e) => report.warn(format!("scan record write failed: {e}")),
        }
    }

    async fn record_history(
        &self,
        ticker: &TrackedTicker,
        today: NaiveDate,
        report: &mut ReconcileReport,
    ) {
        match self.store.history_exists(ticker.entity_id, today).await {
            Ok(true) => {}
            Ok(false) => {
                let entry = HistoryEntry::observed(ticker.entity_id, ticker.symbol.clone(), today);
                match self.store.insert_history(&entry).await {
                    Ok(inserted) => report.history_inserted = inserted,
                    Err(e) => report.warn(format!("history insert failed: {e}")),
                }
            }
            Err(e) => report.warn(format!("history lookup failed: {e}")),
        }
    }

    async fn record_news(&self, ticker: &TrackedTicker, report: &mut ReconcileReport) {
        let articles = match self.company_data.news(&ticker.symbol).await {
            Ok(articles) => articles,
            Err(e) => {
                report.provider_failure("news", e);
                return;
            }
        };
        if articles.is_empty() {
            return;
        }

        let mut known: HashSet<String> = match self.store.news_ids(ticker.entity_id).await {
            Ok(ids) => ids,
            Err(e) => {
                report.warn(format!("news id lookup failed: {e}"));
                return;
            }
        };

        for article in articles {
            if known.contains(&article.id) {
                continue;
            }
            let id = article.id.clone();
            match self
                .store
                .insert_news(&NewsItem::attach(ticker.entity_id, article))
                .await
            {
                Ok(inserted) => {
                    if inserted {
                        report.news_inserted += 1;
                    }
                    known.insert(id);
                }
                Err(e) => report.warn(format!("news insert failed for {id}: {e}")),
            }
        }
    }

    async fn fetch_quote(&self, symbol: &Symbol, report: &mut ReconcileReport) -> Quote {
        match self.market_data.quote(symbol).await {
            Ok(quote) => quote,
            Err(e) => {
                report.provider_failure("quote", e);
                Quote::unavailable(symbol.clone(), self.clock.now())
            }
        }
    }

    async fn fetch_fundamentals(&self, symbol: &Symbol, report: &mut ReconcileReport) -> Fundamentals {
        match self.market_data.fundamentals(symbol).await {
            Ok(fundamentals) => fundamentals,
            Err(e) => {
                report.provider_failure("fundamentals", e);
                Fundamentals::default()
            }
        }
    }

    async fn fetch_company(&self, symbol: &Symbol, report: &mut ReconcileReport) -> CompanyReport {
        match self.company_data.company(symbol).await {
            Ok(company) => company,
            Err(e) => {
                report.provider_failure("company data", e);
                CompanyReport::default()
            }
        }
    }
}

#[async_trait]
impl Reconciler for ReconciliationEngine {
    async fn reconcile(&self, symbol: &Symbol, session: MarketSession) -> ReconcileReport {
        Self::reconcile(self, symbol, session).await
    }
}

impl std::fmt::Debug for ReconciliationEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReconciliationEngine").finish_non_exhaustive()
    }
}
