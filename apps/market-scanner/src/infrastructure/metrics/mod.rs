//! Prometheus Metrics Module
//!
//! Exposes scanner metrics via Prometheus format for monitoring.
//!
//! # Metrics Categories
//!
//! - **Reconciliation**: Tickers reconciled by session and branch, warnings
//! - **Scheduler**: Completed cycles, failed operations, running workers
//! - **Providers**: Upstream requests and errors by provider
//! - **Credentials**: Acquisitions by outcome
//!
//! # Integration
//!
//! Metrics are exposed at `/metrics` on the health server port.

use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};

use crate::application::services::{ReconcileReport, Reconciler};
use crate::domain::{MarketSession, ReconcilePath, Symbol};

// =============================================================================
// Global Metrics Handle
// =============================================================================

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Initialize the Prometheus metrics recorder.
///
/// Subsequent calls return the handle installed by the first one.
///
/// # Errors
///
/// Returns an error if the global recorder cannot be installed.
pub fn init_metrics() -> Result<PrometheusHandle, BuildError> {
    if let Some(handle) = PROMETHEUS_HANDLE.get() {
        return Ok(handle.clone());
    }

    let handle = PrometheusBuilder::new().install_recorder()?;
    register_metrics();
    Ok(PROMETHEUS_HANDLE.get_or_init(|| handle).clone())
}

/// Get the Prometheus handle for rendering metrics.
///
/// Returns `None` if metrics have not been initialized.
#[must_use]
pub fn get_metrics_handle() -> Option<PrometheusHandle> {
    PROMETHEUS_HANDLE.get().cloned()
}

// =============================================================================
// Metric Registration
// =============================================================================

fn register_metrics() {
    describe_counter!(
        "market_scanner_reconciliations_total",
        "Tickers reconciled by session and branch"
    );
    describe_counter!(
        "market_scanner_reconcile_warnings_total",
        "Degraded fields and lost writes during reconciliation"
    );
    describe_histogram!(
        "market_scanner_reconcile_seconds",
        "Time to reconcile one ticker"
    );

    describe_counter!(
        "market_scanner_cycles_total",
        "Completed polling cycles per session"
    );
    describe_counter!(
        "market_scanner_operation_failures_total",
        "Source operations that failed to list tickers"
    );
    describe_histogram!(
        "market_scanner_cycle_seconds",
        "Duration of a full polling cycle"
    );
    describe_gauge!(
        "market_scanner_running_workers",
        "Session workers currently running"
    );

    describe_counter!(
        "market_scanner_provider_requests_total",
        "Requests sent to upstream providers"
    );
    describe_counter!(
        "market_scanner_provider_errors_total",
        "Failed upstream requests by error kind"
    );

    describe_counter!(
        "market_scanner_credential_acquisitions_total",
        "Credential acquisitions by outcome"
    );
}

// =============================================================================
// Metric Labels
// =============================================================================

/// Upstream provider label.
#[derive(Debug, Clone, Copy)]
pub enum Provider {
    /// Bearer-authenticated market data API.
    Schwab,
    /// Company profile and news API.
    Yahoo,
    /// Screener pages.
    StockAnalysis,
}

impl Provider {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Schwab => "schwab",
            Self::Yahoo => "yahoo",
            Self::StockAnalysis => "stockanalysis",
        }
    }
}

/// How a credential acquisition was satisfied.
#[derive(Debug, Clone, Copy)]
pub enum AcquisitionOutcome {
    /// Served from the in-process cache.
    Cached,
    /// Latest stored credential reused without validation.
    Stored,
    /// Latest stored credential passed the validity probe.
    Probed,
    /// New credential from a refresh-token exchange.
    Refreshed,
    /// New credential from interactive authorization.
    Authorized,
    /// Acquisition failed.
    Failed,
}

impl AcquisitionOutcome {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Cached => "cached",
            Self::Stored => "stored",
            Self::Probed => "probed",
            Self::Refreshed => "refreshed",
            Self::Authorized => "authorized",
            Self::Failed => "failed",
        }
    }
}

// =============================================================================
// Metric Recording Functions
// =============================================================================

/// Record one reconciled ticker.
pub fn record_reconciliation(session: MarketSession, path: Option<ReconcilePath>, duration: Duration) {
    let path = path.map_or("skipped", |p| p.as_str());
    counter!(
        "market_scanner_reconciliations_total",
        "session" => session.as_str(),
        "path" => path
    )
    .increment(1);
    histogram!(
        "market_scanner_reconcile_seconds",
        "session" => session.as_str()
    )
    .record(duration.as_secs_f64());
}

/// Record warnings produced while reconciling one ticker.
pub fn record_reconcile_warnings(session: MarketSession, count: usize) {
    if count == 0 {
        return;
    }
    counter!(
        "market_scanner_reconcile_warnings_total",
        "session" => session.as_str()
    )
    .increment(count as u64);
}

/// Record a completed polling cycle.
pub fn record_cycle(session: MarketSession, duration: Duration) {
    counter!("market_scanner_cycles_total", "session" => session.as_str()).increment(1);
    histogram!("market_scanner_cycle_seconds", "session" => session.as_str())
        .record(duration.as_secs_f64());
}

/// Record a source operation that failed.
pub fn record_operation_failure(session: MarketSession, operation: &str) {
    counter!(
        "market_scanner_operation_failures_total",
        "session" => session.as_str(),
        "operation" => operation.to_string()
    )
    .increment(1);
}

/// Update the running worker count.
pub fn set_running_workers(count: usize) {
    gauge!("market_scanner_running_workers").set(count as f64);
}

/// Record a request sent to a provider.
pub fn record_provider_request(provider: Provider, endpoint: &'static str) {
    counter!(
        "market_scanner_provider_requests_total",
        "provider" => provider.as_str(),
        "endpoint" => endpoint
    )
    .increment(1);
}

/// Record a failed provider request.
pub fn record_provider_error(provider: Provider, kind: &'static str) {
    counter!(
        "market_scanner_provider_errors_total",
        "provider" => provider.as_str(),
        "kind" => kind
    )
    .increment(1);
}

/// Record a credential acquisition.
pub fn record_credential_acquisition(outcome: AcquisitionOutcome) {
    counter!(
        "market_scanner_credential_acquisitions_total",
        "outcome" => outcome.as_str()
    )
    .increment(1);
}

// =============================================================================
// Instrumented Reconciler
// =============================================================================

/// [`Reconciler`] decorator recording duration, branch and warnings.
pub struct MeteredReconciler {
    inner: Arc<dyn Reconciler>,
}

impl MeteredReconciler {
    /// Wrap `inner`.
    #[must_use]
    pub fn new(inner: Arc<dyn Reconciler>) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl Reconciler for MeteredReconciler {
    async fn reconcile(&self, symbol: &Symbol, session: MarketSession) -> ReconcileReport {
        let started = Instant::now();
        let report = self.inner.reconcile(symbol, session).await;
        record_reconciliation(session, report.path, started.elapsed());
        record_reconcile_warnings(session, report.warnings.len());
        report
    }
}

// =============================================================================
// Tests
// =============================================================================
