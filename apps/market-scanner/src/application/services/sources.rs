//! Source Operations
//!
//! A source operation lists the tickers one upstream source currently
//! reports for a session. Operations are registered under stable names and
//! resolved into per-session plans when the scheduler is built, so an
//! unknown name fails at startup rather than mid-cycle.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use super::scheduler::SchedulerError;
use crate::application::ports::{
    MarketDataPort, MoversFilter, ProviderError, RankedCategory, RankedListPort,
};
use crate::domain::{MarketSession, Symbol};

/// Lists the tickers of one source, in source order.
#[async_trait]
pub trait SourceOperation: Send + Sync {
    /// Registered name.
    fn name(&self) -> &str;

    /// Tickers currently reported for `session`.
    async fn tickers(&self, session: MarketSession) -> Result<Vec<Symbol>, ProviderError>;
}

/// Movers from the market data provider.
pub struct MoversOperation {
    name: String,
    market_data: Arc<dyn MarketDataPort>,
    filter: MoversFilter,
}

impl MoversOperation {
    /// Create a movers operation.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        market_data: Arc<dyn MarketDataPort>,
        filter: MoversFilter,
    ) -> Self {
        Self {
            name: name.into(),
            market_data,
            filter,
        }
    }
}

#[async_trait]
impl SourceOperation for MoversOperation {
    fn name(&self) -> &str {
        &self.name
    }

    async fn tickers(&self, _session: MarketSession) -> Result<Vec<Symbol>, ProviderError> {
        self.market_data.movers(&self.filter).await
    }
}

/// Tickers from a ranked screener list.
pub struct RankedListOperation {
    name: String,
    ranked: Arc<dyn RankedListPort>,
    category: RankedCategory,
}

impl RankedListOperation {
    /// Create a ranked list operation.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        ranked: Arc<dyn RankedListPort>,
        category: RankedCategory,
    ) -> Self {
        Self {
            name: name.into(),
            ranked,
            category,
        }
    }
}

#[async_trait]
impl SourceOperation for RankedListOperation {
    fn name(&self) -> &str {
        &self.name
    }

    async fn tickers(&self, session: MarketSession) -> Result<Vec<Symbol>, ProviderError> {
        self.ranked.ranked_tickers(session, self.category).await
    }
}

/// Ordered operations polled by one session's worker.
#[derive(Clone)]
pub struct SessionPlan {
    session: MarketSession,
    operations: Vec<Arc<dyn SourceOperation>>,
}

impl SessionPlan {
    /// Plan for `session` running `operations` in order.
    #[must_use]
    pub fn new(session: MarketSession, operations: Vec<Arc<dyn SourceOperation>>) -> Self {
        Self {
            session,
            operations,
        }
    }

    /// Session the plan belongs to.
    #[must_use]
    pub const fn session(&self) -> MarketSession {
        self.session
    }

    /// Operations in order.
    #[must_use]
    pub fn operations(&self) -> &[Arc<dyn SourceOperation>] {
        &self.operations
    }

    /// Operation names in order.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        self.operations.iter().map(|op| op.name()).collect()
    }
}

impl std::fmt::Debug for SessionPlan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionPlan")
            .field("session", &self.session)
            .field("operations", &self.names())
            .finish()
    }
}

/// Name to operation registry.
#[derive(Default)]
pub struct OperationRegistry {
    operations: HashMap<String, Arc<dyn SourceOperation>>,
}

impl OperationRegistry {
    /// Empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding the five built-in operations.
    #[must_use]
    pub fn standard(
        market_data: Arc<dyn MarketDataPort>,
        ranked: Arc<dyn RankedListPort>,
        movers_index: &str,
    ) -> Self {
        let movers = MoversFilter {
            index: movers_index.to_string(),
            ..MoversFilter::default()
        };

        let mut registry = Self::new();
        registry
            .register(Arc::new(MoversOperation::new(
                "charles_schwab_pre_market_movers",
                Arc::clone(&market_data),
                movers.clone(),
            )))
            .register(Arc::new(MoversOperation::new(
                "charles_schwab_regular_market_movers",
                market_data,
                movers,
            )))
            .register(Arc::new(RankedListOperation::new(
                "stock_analysis",
                Arc::clone(&ranked),
                RankedCategory::PremarketGainers,
            )))
            .register(Arc::new(RankedListOperation::new(
                "stock_analysis_regular_market_gainers",
                Arc::clone(&ranked),
                RankedCategory::Gainers,
            )))
            .register(Arc::new(RankedListOperation::new(
                "stock_analysis_regular_market_active",
                ranked,
                RankedCategory::MostActive,
            )));
        registry
    }

    /// Register `operation` under its name, replacing any previous one.
    pub fn register(&mut self, operation: Arc<dyn SourceOperation>) -> &mut Self {
        self.operations
            .insert(operation.name().to_string(), operation);
        self
    }

    /// Registered names, sorted.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<_> = self.operations.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Build the plan for `session` from operation names.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::UnknownOperation`] for the first name that
    /// is not registered, or [`SchedulerError::EmptyPlan`] if `names` is empty.
    pub fn resolve<S: AsRef<str>>(
        &self,
        session: MarketSession,
        names: &[S],
    ) -> Result<SessionPlan, SchedulerError> {
        if names.is_empty() {
            return Err(SchedulerError::EmptyPlan(session));
        }
        let operations = names
            .iter()
            .map(|name| {
                let name = name.as_ref();
                self.operations
                    .get(name)
                    .cloned()
                    .ok_or_else(|| SchedulerError::UnknownOperation {
                        session,
                        name: name.to_string(),
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(SessionPlan::new(session, operations))
    }
}

impl std::fmt::Debug for OperationRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OperationRegistry")
            .field("operations", &self.names())
            .finish()
    }
}
