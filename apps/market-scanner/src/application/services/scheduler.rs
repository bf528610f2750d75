//! Polling Scheduler
//!
//! One worker task per active market session. Each cycle a worker walks
//! its session plan in order, lists the tickers of every source operation
//! and reconciles them one by one, then sleeps for the configured interval.
//!
//! Cancellation is cooperative: every worker holds a child of the
//! scheduler-wide shutdown token and checks it before each operation and
//! while sleeping. A fatal credential failure cancels the scheduler-wide
//! token, which stops every worker.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use super::reconciler::Reconciler;
use super::sources::{SessionPlan, SourceOperation};
use crate::application::ports::ProviderError;
use crate::domain::MarketSession;
use crate::infrastructure::metrics::{record_cycle, record_operation_failure, set_running_workers};

/// Default grace period granted to a stopping worker.
pub const DEFAULT_STOP_TIMEOUT: Duration = Duration::from_secs(5);

/// Scheduler errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchedulerError {
    /// No plan is configured for the session.
    #[error("no source plan configured for {0}")]
    NoPlan(MarketSession),

    /// A plan names an operation that is not registered.
    #[error("unknown source operation {name:?} for {session}")]
    UnknownOperation {
        /// Session whose plan named the operation.
        session: MarketSession,
        /// Unregistered name.
        name: String,
    },

    /// A plan has no operations.
    #[error("source plan for {0} is empty")]
    EmptyPlan(MarketSession),

    /// The scheduler-wide shutdown token was cancelled.
    #[error("scheduler is shut down")]
    ShutDown,
}

/// Result of [`PollingScheduler::start`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    /// A new worker was spawned.
    Started,
    /// A worker for the session was already running.
    AlreadyRunning,
}

/// Result of [`PollingScheduler::stop`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    /// The worker exited within the grace period.
    Stopped,
    /// The worker did not exit in time and was detached.
    TimedOut,
    /// No worker was running for the session.
    NotRunning,
}

/// Snapshot of one worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerStatus {
    /// Session polled by the worker.
    pub session: MarketSession,
    /// Whether the worker task is still running.
    pub alive: bool,
    /// Start time.
    pub started_at: DateTime<Utc>,
    /// Completed cycles.
    pub cycles: u64,
    /// Pause between cycles.
    pub interval: Duration,
}

struct Worker {
    token: CancellationToken,
    handle: JoinHandle<()>,
    started_at: DateTime<Utc>,
    cycles: Arc<AtomicU64>,
    interval: Duration,
}

/// Runs one polling worker per market session.
pub struct PollingScheduler {
    reconciler: Arc<dyn Reconciler>,
    plans: HashMap<MarketSession, SessionPlan>,
    stop_timeout: Duration,
    shutdown: CancellationToken,
    workers: Mutex<HashMap<MarketSession, Worker>>,
}

impl PollingScheduler {
    /// Create a scheduler over resolved session plans.
    #[must_use]
    pub fn new(reconciler: Arc<dyn Reconciler>, plans: Vec<SessionPlan>) -> Self {
        Self {
            reconciler,
            plans: plans.into_iter().map(|plan| (plan.session(), plan)).collect(),
            stop_timeout: DEFAULT_STOP_TIMEOUT,
            shutdown: CancellationToken::new(),
            workers: Mutex::new(HashMap::new()),
        }
    }

    /// Override the stop grace period.
    #[must_use]
    pub const fn with_stop_timeout(mut self, stop_timeout: Duration) -> Self {
        self.stop_timeout = stop_timeout;
        self
    }

    /// Scheduler-wide token; cancelled on a fatal failure.
    #[must_use]
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Sessions with a configured plan.
    #[must_use]
    pub fn planned_sessions(&self) -> Vec<MarketSession> {
        let mut sessions: Vec<_> = self.plans.keys().copied().collect();
        sessions.sort();
        sessions
    }

    /// Start polling `session` every `interval`.
    ///
    /// Must be called from within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::NoPlan`] if no plan is configured for the
    /// session, or [`SchedulerError::ShutDown`] after a fatal failure.
    pub fn start(
        &self,
        session: MarketSession,
        interval: Duration,
    ) -> Result<StartOutcome, SchedulerError> {
        if self.shutdown.is_cancelled() {
            return Err(SchedulerError::ShutDown);
        }

        let mut workers = self.workers.lock();
        if let Some(worker) = workers.get(&session) {
            if !worker.handle.is_finished() {
                info!(session = %session, "Worker already running");
                return Ok(StartOutcome::AlreadyRunning);
            }
            workers.remove(&session);
        }

        let plan = self
            .plans
            .get(&session)
            .cloned()
            .ok_or(SchedulerError::NoPlan(session))?;

        let token = self.shutdown.child_token();
        let cycles = Arc::new(AtomicU64::new(0));
        let handle = tokio::spawn(run_worker(WorkerContext {
            plan,
            reconciler: Arc::clone(&self.reconciler),
            interval,
            token: token.clone(),
            shutdown: self.shutdown.clone(),
            cycles: Arc::clone(&cycles),
        }));

        workers.insert(
            session,
            Worker {
                token,
                handle,
                started_at: Utc::now(),
                cycles,
                interval,
            },
        );
        set_running_workers(workers.len());

        info!(
            session = %session,
            interval_secs = interval.as_secs(),
            "Worker started"
        );
        Ok(StartOutcome::Started)
    }

    /// Stop the worker for `session`, waiting up to the grace period.
    ///
    /// The worker is removed from the active set whatever the outcome.
    pub async fn stop(&self, session: MarketSession) -> StopOutcome {
        let worker = {
            let mut workers = self.workers.lock();
            let worker = workers.remove(&session);
            set_running_workers(workers.len());
            worker
        };
        let Some(worker) = worker else {
            return StopOutcome::NotRunning;
        };

        worker.token.cancel();
        match tokio::time::timeout(self.stop_timeout, worker.handle).await {
            Ok(Ok(())) => {
                info!(session = %session, "Worker stopped");
                StopOutcome::Stopped
            }
            Ok(Err(e)) => {
                error!(session = %session, error = %e, "Worker terminated abnormally");
                StopOutcome::Stopped
            }
            Err(_) => {
                warn!(
                    session = %session,
                    timeout_secs = self.stop_timeout.as_secs(),
                    "Worker did not stop in time, detaching"
                );
                StopOutcome::TimedOut
            }
        }
    }

    /// Stop every worker.
    pub async fn stop_all(&self) -> Vec<(MarketSession, StopOutcome)> {
        let mut sessions: Vec<_> = self.workers.lock().keys().copied().collect();
        sessions.sort();

        let mut outcomes = Vec::with_capacity(sessions.len());
        for session in sessions {
            outcomes.push((session, self.stop(session).await));
        }
        outcomes
    }

    /// Whether a live worker exists for `session`.
    #[must_use]
    pub fn is_running(&self, session: MarketSession) -> bool {
        self.workers
            .lock()
            .get(&session)
            .is_some_and(|worker| !worker.handle.is_finished())
    }

    /// Status of every worker in the active set.
    #[must_use]
    pub fn status(&self) -> Vec<WorkerStatus> {
        let mut statuses: Vec<_> = self
            .workers
            .lock()
            .iter()
            .map(|(session, worker)| WorkerStatus {
                session: *session,
                alive: !worker.handle.is_finished(),
                started_at: worker.started_at,
                cycles: worker.cycles.load(Ordering::Relaxed),
                interval: worker.interval,
            })
            .collect();
        statuses.sort_by_key(|status| status.session);
        statuses
    }
}

impl std::fmt::Debug for PollingScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PollingScheduler")
            .field("sessions", &self.planned_sessions())
            .field("stop_timeout", &self.stop_timeout)
            .field("running", &self.workers.lock().len())
            .finish_non_exhaustive()
    }
}

// =============================================================================
// Worker loop
// =============================================================================

struct WorkerContext {
    plan: SessionPlan,
    reconciler: Arc<dyn Reconciler>,
    interval: Duration,
    token: CancellationToken,
    shutdown: CancellationToken,
    cycles: Arc<AtomicU64>,
}

async fn run_worker(ctx: WorkerContext) {
    let session = ctx.plan.session();
    info!(
        session = %session,
        operations = ?ctx.plan.names(),
        "{} worker polling",
        session.label()
    );

    'cycles: loop {
        let cycle_started = Instant::now();

        for operation in ctx.plan.operations() {
            if ctx.token.is_cancelled() {
                break 'cycles;
            }
            match run_operation(operation.as_ref(), session, ctx.reconciler.as_ref()).await {
                Ok(count) => {
                    info!(
                        session = %session,
                        operation = operation.name(),
                        tickers = count,
                        "Operation completed"
                    );
                }
                Err(e) if e.is_fatal() => {
                    error!(
                        session = %session,
                        operation = operation.name(),
                        error = %e,
                        "Fatal provider failure, shutting down all workers"
                    );
                    record_operation_failure(session, operation.name());
                    ctx.shutdown.cancel();
                    break 'cycles;
                }
                Err(e) => {
                    warn!(
                        session = %session,
                        operation = operation.name(),
                        error = %e,
                        "Operation failed, continuing with next"
                    );
                    record_operation_failure(session, operation.name());
                }
            }
        }

        ctx.cycles.fetch_add(1, Ordering::Relaxed);
        record_cycle(session, cycle_started.elapsed());

        tokio::select! {
            () = ctx.token.cancelled() => break,
            () = tokio::time::sleep(ctx.interval) => {}
        }
    }

    info!(session = %session, "Worker exiting");
}

async fn run_operation(
    operation: &dyn SourceOperation,
    session: MarketSession,
    reconciler: &dyn Reconciler,
) -> Result<usize, ProviderError> {
    let tickers = operation.tickers(session).await?;
    let total = tickers.len();

    for (index, symbol) in tickers.iter().enumerate() {
        info!(
            session = %session,
            operation = operation.name(),
            position = index + 1,
            total,
            symbol = %symbol,
            "Reconciling"
        );
        let report = reconciler.reconcile(symbol, session).await;
        if let Some(fatal) = report.fatal {
            return Err(fatal);
        }
    }

    Ok(total)
}
