#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::float_cmp,
        clippy::significant_drop_tightening,
        clippy::too_many_lines,
        clippy::needless_pass_by_value,
        clippy::items_after_statements,
        clippy::default_trait_access
    )
)]

//! Market Scanner - Session-aware Ticker Universe Tracker
//!
//! Polls market movers and ranked screener lists once per trading session,
//! reconciles every surfaced ticker against the store and keeps a single
//! OAuth bearer credential alive for every poller.
//!
//! # Layers (inside → outside)
//!
//! - **Domain**: Tickers, sessions, credentials and the freshness rule
//!   - `ticker`: Symbols, quotes, fundamentals, scan records, history
//!   - `credential`: Immutable bearer credentials and token grants
//!   - `freshness`: Reconciliation branch selection
//!
//! - **Application**: Use cases and port definitions
//!   - `ports`: Market data, company data, ranked lists, stores, OAuth
//!   - `services`: Credential manager, reconciliation engine, scheduler
//!
//! - **Infrastructure**: Adapters and external integrations
//!   - `schwab`: OAuth token endpoint and market data client
//!   - `yahoo`: Company profile, short interest and news
//!   - `stockanalysis`: Ranked list scraper
//!   - `persistence`: PostgreSQL and in-memory stores
//!   - `config`, `telemetry`, `metrics`, `health`: process plumbing
//!
//! # Data Flow
//!
//! ```text
//! movers / ranked lists ──► SessionWorker ──► ReconciliationEngine ──► Store
//!                                                  │
//!                         CredentialManager ◄──────┘ (bearer for quotes)
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

// =============================================================================
// Module Declarations
// =============================================================================

/// Domain layer - Core types with no I/O.
pub mod domain;

/// Application layer - Use cases and port definitions.
pub mod application;

/// Infrastructure layer - Adapters and external integrations.
pub mod infrastructure;

// =============================================================================
// Re-exports
// =============================================================================

// Domain types
pub use domain::{
    Clock, Credential, EntityId, MarketSession, ManualClock, ReconcilePath, Symbol, SystemClock,
    TrackedTicker,
};

// Services
pub use application::services::{
    CredentialManager, CredentialPolicy, OperationRegistry, PollingScheduler, ReconcileReport,
    Reconciler, ReconciliationEngine, SchedulerError, SessionPlan,
};

// Infrastructure config
pub use infrastructure::config::{ConfigError, Environment, ScannerConfig, StoreBackend};

// Health server
pub use infrastructure::health::{HealthServer, HealthServerError, HealthServerState};

// Metrics
pub use infrastructure::metrics::{MeteredReconciler, init_metrics};

// Telemetry
pub use infrastructure::telemetry::{TelemetryConfig, TelemetryGuard, init as init_telemetry};
