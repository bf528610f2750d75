//! Market Scanner Binary
//!
//! Starts one polling worker per configured trading session.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin market-scanner
//! ```
//!
//! # Environment Variables
//!
//! ## Required
//! - `APP_KEY_SCHWAB`: OAuth client id
//! - `CLIENT_SECRET_SCHWAB`: OAuth client secret
//! - `DB_NAME`, `DB_USER`, `DB_PASSWORD`: when `STORE_BACKEND=postgres`
//!
//! ## Optional
//! - `ENVIRONMENT`: development | testing | production (default: development)
//! - `STORE_BACKEND`: postgres | memory (default: postgres)
//! - `DB_HOST` / `DB_PORT`: database address (default: localhost:5432)
//! - `SCANNER_SLEEP_TIME`: seconds between polling cycles (default: 10)
//! - `SCANNER_SESSIONS`: comma-separated sessions to start (default: all)
//! - `SCANNER_PRE_MARKET_SOURCES` / `SCANNER_REGULAR_MARKET_SOURCES`: source names per session
//! - `SCHWAB_INTERACTIVE_AUTH`: read the consent redirect from stdin (default: true)
//! - `SCANNER_HEALTH_PORT`: health check HTTP port (default: 8083)
//! - `LOG_LEVEL`, `LOG_FORMAT`, `OTEL_ENABLED`, `RUST_LOG`: see telemetry

use std::sync::Arc;

use anyhow::Context;
use market_scanner::application::ports::{
    CompanyDataPort, ConsentPrompt, CredentialStore, MarketDataPort, RankedListPort, TickerStore,
};
use market_scanner::application::services::StopOutcome;
use market_scanner::infrastructure::config::{SchedulerSettings, StoreBackend};
use market_scanner::infrastructure::consent::{DisabledConsentPrompt, StdinConsentPrompt};
use market_scanner::infrastructure::persistence::{InMemoryStore, PostgresStore};
use market_scanner::infrastructure::schwab::{
    RetryConfig, SchwabHttpClient, SchwabMarketData, SchwabTokenEndpoint,
};
use market_scanner::infrastructure::stockanalysis::StockAnalysisScraper;
use market_scanner::infrastructure::yahoo::YahooFinanceClient;
use market_scanner::{
    Clock, CredentialManager, HealthServer, HealthServerState, MeteredReconciler,
    OperationRegistry, PollingScheduler, Reconciler, ReconciliationEngine, ScannerConfig,
    SessionPlan, SystemClock, init_metrics, init_telemetry,
};
use tokio::signal;
use tokio_util::sync::CancellationToken;

/// Why the main loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ShutdownReason {
    Signal,
    Fatal,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    load_dotenv();

    let _telemetry_guard = init_telemetry().context("failed to initialize telemetry")?;

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "Starting Market Scanner");

    let _metrics_handle = init_metrics().context("failed to install Prometheus recorder")?;

    let config = ScannerConfig::from_env().context("invalid configuration")?;
    log_config(&config);
    for warning in config.warnings() {
        tracing::warn!(%warning, "Configuration warning");
    }

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let (tickers, credentials) = open_store(&config).await?;

    // Credential manager shared by every Schwab call
    let schwab_http = SchwabHttpClient::new(
        &config.schwab.base_url,
        config.http_timeout,
        RetryConfig::default(),
    )?;
    let token_endpoint = Arc::new(SchwabTokenEndpoint::new(
        &config.schwab,
        schwab_http.clone(),
    )?);
    let consent: Arc<dyn ConsentPrompt> = if config.schwab.interactive_auth {
        Arc::new(StdinConsentPrompt::new())
    } else {
        Arc::new(DisabledConsentPrompt)
    };
    let credential_manager = Arc::new(CredentialManager::new(
        token_endpoint,
        consent,
        credentials,
        Arc::clone(&clock),
    ));

    // Providers
    let market_data: Arc<dyn MarketDataPort> =
        Arc::new(SchwabMarketData::new(schwab_http, credential_manager));
    let company_data: Arc<dyn CompanyDataPort> =
        Arc::new(YahooFinanceClient::new(config.http_timeout)?);
    let ranked: Arc<dyn RankedListPort> =
        Arc::new(StockAnalysisScraper::new(config.http_timeout)?);

    let registry = OperationRegistry::standard(
        Arc::clone(&market_data),
        ranked,
        &config.schwab.movers_index,
    );
    let plans = build_plans(&registry, &config.scheduler)?;

    let engine = ReconciliationEngine::new(market_data, company_data, tickers, clock);
    let reconciler: Arc<dyn Reconciler> = Arc::new(MeteredReconciler::new(Arc::new(engine)));
    let scheduler = Arc::new(
        PollingScheduler::new(reconciler, plans).with_stop_timeout(config.scheduler.stop_timeout),
    );

    // Health server
    let health_token = CancellationToken::new();
    let health_state = Arc::new(HealthServerState::new(
        env!("CARGO_PKG_VERSION").to_string(),
        Arc::clone(&scheduler),
        config.scheduler.sessions.clone(),
    ));
    let health_server = HealthServer::new(
        config.server.health_port,
        health_state,
        health_token.clone(),
    );
    let health_handle = tokio::spawn(async move {
        if let Err(e) = health_server.run().await {
            tracing::error!(error = %e, "Health server failed");
        }
    });

    for session in &config.scheduler.sessions {
        let outcome = scheduler.start(*session, config.scheduler.sleep_time)?;
        tracing::info!(session = session.as_str(), ?outcome, "Session worker started");
    }

    let reason = await_shutdown(scheduler.shutdown_token()).await;

    for (session, outcome) in scheduler.stop_all().await {
        match outcome {
            StopOutcome::TimedOut => tracing::warn!(
                session = session.as_str(),
                "Worker did not stop in time and was detached"
            ),
            _ => tracing::info!(session = session.as_str(), ?outcome, "Worker stopped"),
        }
    }

    health_token.cancel();
    if let Err(e) = health_handle.await {
        tracing::warn!(error = %e, "Health server task ended abnormally");
    }

    tracing::info!("Market Scanner stopped");

    match reason {
        ShutdownReason::Signal => Ok(()),
        ShutdownReason::Fatal => {
            anyhow::bail!("scanner stopped after an unrecoverable credential failure")
        }
    }
}

/// Open the configured store, exposed through both store ports.
async fn open_store(
    config: &ScannerConfig,
) -> anyhow::Result<(Arc<dyn TickerStore>, Arc<dyn CredentialStore>)> {
    match config.store_backend {
        StoreBackend::Postgres => {
            let settings = config
                .database
                .as_ref()
                .context("postgres backend selected without database settings")?;
            let store = Arc::new(PostgresStore::connect(settings).await?);
            store.ensure_schema().await?;
            tracing::info!(host = %settings.host, database = %settings.name, "Connected to Postgres");
            let tickers: Arc<dyn TickerStore> = Arc::clone(&store) as _;
            let credentials: Arc<dyn CredentialStore> = store;
            Ok((tickers, credentials))
        }
        StoreBackend::Memory => {
            tracing::warn!("Using in-memory store; nothing survives a restart");
            let store = Arc::new(InMemoryStore::new());
            let tickers: Arc<dyn TickerStore> = Arc::clone(&store) as _;
            let credentials: Arc<dyn CredentialStore> = store;
            Ok((tickers, credentials))
        }
    }
}

/// Resolve the operation names of every configured session.
fn build_plans(
    registry: &OperationRegistry,
    settings: &SchedulerSettings,
) -> anyhow::Result<Vec<SessionPlan>> {
    settings
        .sessions
        .iter()
        .map(|session| {
            let plan = match settings.sources.get(session) {
                Some(names) => registry.resolve(*session, names.as_slice()),
                None => registry.resolve(*session, session.default_sources()),
            }?;
            tracing::info!(
                session = session.as_str(),
                sources = ?plan.names(),
                "Session plan resolved"
            );
            Ok(plan)
        })
        .collect()
}

/// Load .env file from current directory, falling back to ancestors.
fn load_dotenv() {
    if dotenvy::dotenv().is_err() {
        load_dotenv_from_ancestors();
    }
}

/// Log the parsed configuration.
fn log_config(config: &ScannerConfig) {
    tracing::info!(
        environment = config.environment.as_str(),
        store = config.store_backend.as_str(),
        health_port = config.server.health_port,
        sleep_secs = config.scheduler.sleep_time.as_secs(),
        http_timeout_secs = config.http_timeout.as_secs(),
        "Configuration loaded"
    );
    tracing::debug!(
        schwab_base_url = %config.schwab.base_url,
        interactive_auth = config.schwab.interactive_auth,
        movers_index = %config.schwab.movers_index,
        "Provider endpoints"
    );
}

/// Load .env file from any ancestor directory.
fn load_dotenv_from_ancestors() {
    if let Ok(cwd) = std::env::current_dir() {
        let mut dir = cwd.as_path();
        while let Some(parent) = dir.parent() {
            let env_path = parent.join(".env");
            if env_path.exists() {
                let _ = dotenvy::from_path(&env_path);
                return;
            }
            dir = parent;
        }
    }
}

/// Wait for SIGTERM, SIGINT, or a fatal stop of the scheduler.
async fn await_shutdown(scheduler_shutdown: CancellationToken) -> ShutdownReason {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating shutdown");
            ShutdownReason::Signal
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, initiating shutdown");
            ShutdownReason::Signal
        }
        () = scheduler_shutdown.cancelled() => {
            tracing::error!("Scheduler shut down after a fatal failure");
            ShutdownReason::Fatal
        }
    }
}
