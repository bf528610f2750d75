//! Health and Metrics HTTP Surface
//!
//! Reports whether the session workers are polling and exposes the
//! Prometheus recorder.
//!
//! - `GET /health`: JSON report with one entry per configured session
//! - `GET /healthz`: liveness, always 200
//! - `GET /readyz`: 200 once at least one worker is polling
//! - `GET /metrics`: Prometheus text exposition

use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Instant;

use axum::extract::State;
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::application::services::{PollingScheduler, WorkerStatus};
use crate::domain::MarketSession;
use crate::infrastructure::metrics::get_metrics_handle;

const PROMETHEUS_CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

/// Body of `GET /health`.
#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    /// Aggregate status.
    pub status: HealthStatus,
    /// Crate version.
    pub version: String,
    /// Seconds since the server state was created.
    pub uptime_secs: u64,
    /// When the report was produced.
    pub checked_at: DateTime<Utc>,
    /// Whether a fatal failure stopped the scheduler.
    pub shut_down: bool,
    /// One entry per configured session, in configuration order.
    pub sessions: Vec<SessionHealth>,
}

/// Aggregate status over the configured sessions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// Every configured session is polling.
    Healthy,
    /// Some sessions are polling.
    Degraded,
    /// No session is polling.
    Unhealthy,
}

impl HealthStatus {
    /// Status for `running` live workers out of `configured` sessions.
    #[must_use]
    pub const fn from_counts(running: usize, configured: usize) -> Self {
        if running == 0 {
            Self::Unhealthy
        } else if running >= configured {
            Self::Healthy
        } else {
            Self::Degraded
        }
    }

    const fn http_status(self) -> StatusCode {
        match self {
            Self::Healthy | Self::Degraded => StatusCode::OK,
            Self::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

/// Worker state of one session.
#[derive(Debug, Clone, Serialize)]
pub struct SessionHealth {
    /// Session name.
    pub session: &'static str,
    /// Whether a live worker polls the session.
    pub running: bool,
    /// Worker start time.
    pub started_at: Option<DateTime<Utc>>,
    /// Completed cycles.
    pub cycles: u64,
    /// Pause between cycles in seconds.
    pub interval_secs: Option<u64>,
}

impl SessionHealth {
    fn new(session: MarketSession, worker: Option<&WorkerStatus>) -> Self {
        Self {
            session: session.as_str(),
            running: worker.is_some_and(|w| w.alive),
            started_at: worker.map(|w| w.started_at),
            cycles: worker.map_or(0, |w| w.cycles),
            interval_secs: worker.map(|w| w.interval.as_secs()),
        }
    }
}

/// State shared by the handlers.
pub struct HealthServerState {
    version: String,
    booted: Instant,
    scheduler: Arc<PollingScheduler>,
    sessions: Vec<MarketSession>,
}

impl HealthServerState {
    /// State reporting on the workers of `sessions`.
    #[must_use]
    pub fn new(
        version: String,
        scheduler: Arc<PollingScheduler>,
        sessions: Vec<MarketSession>,
    ) -> Self {
        Self {
            version,
            booted: Instant::now(),
            scheduler,
            sessions,
        }
    }

    fn report(&self) -> HealthReport {
        let workers = self.scheduler.status();
        let sessions: Vec<_> = self
            .sessions
            .iter()
            .map(|session| {
                SessionHealth::new(*session, workers.iter().find(|w| w.session == *session))
            })
            .collect();
        let running = sessions.iter().filter(|s| s.running).count();

        HealthReport {
            status: HealthStatus::from_counts(running, sessions.len()),
            version: self.version.clone(),
            uptime_secs: self.booted.elapsed().as_secs(),
            checked_at: Utc::now(),
            shut_down: self.scheduler.shutdown_token().is_cancelled(),
            sessions,
        }
    }
}

/// HTTP server for the health routes.
pub struct HealthServer {
    port: u16,
    state: Arc<HealthServerState>,
    cancel: CancellationToken,
}

impl HealthServer {
    /// Server on `port` that stops when `cancel` fires.
    #[must_use]
    pub const fn new(port: u16, state: Arc<HealthServerState>, cancel: CancellationToken) -> Self {
        Self {
            port,
            state,
            cancel,
        }
    }

    /// Serve until the cancellation token fires.
    ///
    /// # Errors
    ///
    /// Returns [`HealthServerError::Bind`] if the port is unavailable and
    /// [`HealthServerError::Serve`] if the listener fails while serving.
    pub async fn run(self) -> Result<(), HealthServerError> {
        let listener = TcpListener::bind((Ipv4Addr::UNSPECIFIED, self.port))
            .await
            .map_err(|source| HealthServerError::Bind {
                port: self.port,
                source,
            })?;
        tracing::info!(port = self.port, "Health endpoint listening");

        axum::serve(listener, router(self.state))
            .with_graceful_shutdown(self.cancel.cancelled_owned())
            .await
            .map_err(HealthServerError::Serve)?;

        tracing::info!(port = self.port, "Health endpoint closed");
        Ok(())
    }
}

/// Routes served by [`HealthServer`].
#[must_use]
pub fn router(state: Arc<HealthServerState>) -> Router {
    Router::new()
        .route("/health", get(report))
        .route("/healthz", get(live))
        .route("/readyz", get(ready))
        .route("/metrics", get(prometheus))
        .with_state(state)
}

async fn report(State(state): State<Arc<HealthServerState>>) -> Response {
    let report = state.report();
    (report.status.http_status(), Json(report)).into_response()
}

async fn live() -> &'static str {
    "OK"
}

async fn ready(State(state): State<Arc<HealthServerState>>) -> (StatusCode, &'static str) {
    if state.report().sessions.iter().any(|s| s.running) {
        (StatusCode::OK, "ready")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "no session polling")
    }
}

async fn prometheus() -> Response {
    match get_metrics_handle() {
        Some(handle) => (
            [(header::CONTENT_TYPE, PROMETHEUS_CONTENT_TYPE)],
            handle.render(),
        )
            .into_response(),
        None => (
            StatusCode::SERVICE_UNAVAILABLE,
            "metrics recorder not installed",
        )
            .into_response(),
    }
}

/// Health server errors.
#[derive(Debug, thiserror::Error)]
pub enum HealthServerError {
    /// The port could not be bound.
    #[error("cannot bind health port {port}")]
    Bind {
        /// Requested port.
        port: u16,
        /// Bind failure.
        #[source]
        source: std::io::Error,
    },

    /// The listener failed while serving.
    #[error("health server failed")]
    Serve(#[source] std::io::Error),
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use test_case::test_case;

    use super::*;

    #[test_case(0, 2 => HealthStatus::Unhealthy ; "nothing polling")]
    #[test_case(1, 2 => HealthStatus::Degraded ; "one of two")]
    #[test_case(2, 2 => HealthStatus::Healthy ; "all polling")]
    #[test_case(0, 0 => HealthStatus::Unhealthy ; "no sessions configured")]
    fn status_from_counts(running: usize, configured: usize) -> HealthStatus {
        HealthStatus::from_counts(running, configured)
    }

    #[test_case(HealthStatus::Healthy, "\"healthy\"" ; "healthy")]
    #[test_case(HealthStatus::Degraded, "\"degraded\"" ; "degraded")]
    #[test_case(HealthStatus::Unhealthy, "\"unhealthy\"" ; "unhealthy")]
    fn status_serializes_lowercase(status: HealthStatus, json: &str) {
        assert_eq!(serde_json::to_string(&status).unwrap(), json);
    }

    #[test]
    fn degraded_still_answers_ok() {
        assert_eq!(HealthStatus::Degraded.http_status(), StatusCode::OK);
        assert_eq!(
            HealthStatus::Unhealthy.http_status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[test]
    fn session_without_worker_is_idle() {
        let health = SessionHealth::new(MarketSession::RegularMarket, None);
        assert_eq!(health.session, "regular_market");
        assert!(!health.running);
        assert_eq!(health.cycles, 0);
        assert!(health.started_at.is_none());
        assert!(health.interval_secs.is_none());
    }

    #[test]
    fn session_reports_worker_fields() {
        let started_at = Utc::now();
        let worker = WorkerStatus {
            session: MarketSession::PreMarket,
            alive: true,
            started_at,
            cycles: 7,
            interval: Duration::from_secs(10),
        };
        let health = SessionHealth::new(MarketSession::PreMarket, Some(&worker));
        assert!(health.running);
        assert_eq!(health.cycles, 7);
        assert_eq!(health.interval_secs, Some(10));
        assert_eq!(health.started_at, Some(started_at));
    }
}
