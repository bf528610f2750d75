//! Configuration Module
//!
//! Configuration loading for the scanner service.

mod settings;

pub use settings::{
    ConfigError, DatabaseSettings, Environment, ScannerConfig, SchedulerSettings, SchwabSettings,
    ServerSettings, StoreBackend,
};
