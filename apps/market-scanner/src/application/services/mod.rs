//! Application Services
//!
//! Orchestration over the ports: credential acquisition, per-ticker
//! reconciliation and per-session polling.

mod credential_manager;
mod reconciler;
mod scheduler;
mod sources;

pub use credential_manager::{CredentialManager, CredentialPolicy};
pub use reconciler::{ReconcileReport, Reconciler, ReconciliationEngine, ScanWrite};
pub use scheduler::{
    DEFAULT_STOP_TIMEOUT, PollingScheduler, SchedulerError, StartOutcome, StopOutcome,
    WorkerStatus,
};
pub use sources::{
    MoversOperation, OperationRegistry, RankedListOperation, SessionPlan, SourceOperation,
};
