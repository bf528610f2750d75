//! Infrastructure Layer - Adapters and external integrations.
//!
//! This layer contains the concrete implementations of the port interfaces
//! defined in the application layer, plus the process plumbing around them.

/// Configuration loaded from the environment.
pub mod config;

/// Interactive authorization channels.
pub mod consent;

/// Health check HTTP endpoint.
pub mod health;

/// Prometheus metrics instrumentation.
pub mod metrics;

/// PostgreSQL and in-memory stores.
pub mod persistence;

/// Schwab OAuth and market data adapters.
pub mod schwab;

/// StockAnalysis ranked list scraper.
pub mod stockanalysis;

/// Logging and OpenTelemetry tracing integration.
pub mod telemetry;

/// Yahoo Finance company data adapter.
pub mod yahoo;
