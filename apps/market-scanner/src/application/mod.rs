//! Application Layer - Ports and services.
//!
//! Ports are the traits the services depend on; infrastructure provides
//! the implementations. Services hold the three core behaviors: credential
//! acquisition, ticker reconciliation and per-session polling.

/// Port interfaces for stores and upstream providers.
pub mod ports;

/// Credential manager, reconciliation engine, source operations and scheduler.
pub mod services;
