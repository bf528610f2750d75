//! Logging and OpenTelemetry Tracing
//!
//! Installs the global `tracing` subscriber: an `EnvFilter`, a text or JSON
//! formatter and, when enabled, an OTLP span exporter.
//!
//! # Environment Variables
//!
//! - `RUST_LOG`: filter directives; overrides `LOG_LEVEL` when set
//! - `LOG_LEVEL`: default level for the scanner (default: info)
//! - `LOG_FORMAT`: `text` or `json` (default: text)
//! - `OTEL_ENABLED`: set to "true" to export spans (default: false)
//! - `OTEL_EXPORTER_OTLP_ENDPOINT`: OTLP endpoint (default: http://localhost:4317)
//! - `OTEL_SERVICE_NAME`: service name for traces (default: market-scanner)

use opentelemetry::trace::TracerProvider as _;
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::trace::SdkTracerProvider;
use thiserror::Error;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

const DEFAULT_SERVICE_NAME: &str = "market-scanner";
const DEFAULT_OTLP_ENDPOINT: &str = "http://localhost:4317";
const DEFAULT_LOG_LEVEL: &str = "info";

/// Noisy dependencies capped below the scanner's own level.
const QUIET_TARGETS: [&str; 4] = ["hyper=warn", "h2=warn", "reqwest=warn", "sqlx=warn"];

/// Errors while installing the subscriber.
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// Filter directive did not parse.
    #[error("invalid log filter '{directive}': {message}")]
    InvalidFilter {
        /// Offending directive.
        directive: String,
        /// Parser message.
        message: String,
    },

    /// OTLP exporter could not be built.
    #[error("failed to create OTLP exporter: {0}")]
    Exporter(String),

    /// A global subscriber is already installed.
    #[error("failed to install subscriber: {0}")]
    Install(String),
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Text,
    /// One JSON object per event.
    Json,
}

/// Guard that shuts down OpenTelemetry when dropped.
pub struct TelemetryGuard {
    tracer_provider: Option<SdkTracerProvider>,
}

impl Drop for TelemetryGuard {
    fn drop(&mut self) {
        if let Some(provider) = self.tracer_provider.take()
            && let Err(e) = provider.shutdown()
        {
            eprintln!("Failed to shutdown OpenTelemetry tracer provider: {e}");
        }
    }
}

/// Telemetry configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TelemetryConfig {
    /// Default level for scanner targets.
    pub log_level: String,
    /// Output format.
    pub log_format: LogFormat,
    /// Whether spans are exported over OTLP.
    pub otel_enabled: bool,
    /// OTLP exporter endpoint.
    pub otlp_endpoint: String,
    /// Service name for traces.
    pub service_name: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: DEFAULT_LOG_LEVEL.to_string(),
            log_format: LogFormat::Text,
            otel_enabled: false,
            otlp_endpoint: DEFAULT_OTLP_ENDPOINT.to_string(),
            service_name: DEFAULT_SERVICE_NAME.to_string(),
        }
    }
}

impl TelemetryConfig {
    /// Create configuration from environment variables.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create configuration from an arbitrary variable source.
    #[must_use]
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        Self {
            log_level: get("LOG_LEVEL")
                .map(|v| v.to_lowercase())
                .unwrap_or(defaults.log_level),
            log_format: match get("LOG_FORMAT").map(|v| v.to_lowercase()).as_deref() {
                Some("json") => LogFormat::Json,
                _ => LogFormat::Text,
            },
            otel_enabled: get("OTEL_ENABLED")
                .is_some_and(|v| matches!(v.to_lowercase().as_str(), "true" | "1" | "yes")),
            otlp_endpoint: get("OTEL_EXPORTER_OTLP_ENDPOINT").unwrap_or(defaults.otlp_endpoint),
            service_name: get("OTEL_SERVICE_NAME").unwrap_or(defaults.service_name),
        }
    }

    /// Filter used when `RUST_LOG` is not set.
    fn default_filter(&self) -> Result<EnvFilter, TelemetryError> {
        let mut filter = EnvFilter::new(DEFAULT_LOG_LEVEL);
        let own = format!("market_scanner={}", self.log_level);
        for directive in std::iter::once(own.as_str()).chain(QUIET_TARGETS) {
            let parsed = directive
                .parse()
                .map_err(|e: tracing_subscriber::filter::ParseError| {
                    TelemetryError::InvalidFilter {
                        directive: directive.to_string(),
                        message: e.to_string(),
                    }
                })?;
            filter = filter.add_directive(parsed);
        }
        Ok(filter)
    }
}

/// Initialize telemetry from the environment.
///
/// Returns a guard that must be kept alive for the duration of the program.
pub fn init() -> Result<TelemetryGuard, TelemetryError> {
    init_with_config(&TelemetryConfig::from_env())
}

/// Initialize telemetry with custom configuration.
pub fn init_with_config(config: &TelemetryConfig) -> Result<TelemetryGuard, TelemetryError> {
    let env_filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => config.default_filter()?,
    };

    let json = config.log_format == LogFormat::Json;
    let json_layer = json.then(|| {
        tracing_subscriber::fmt::layer()
            .json()
            .with_target(true)
            .with_current_span(true)
    });
    let text_layer = (!json).then(|| {
        tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_thread_ids(false)
            .with_file(false)
            .with_line_number(false)
    });

    let tracer_provider = if config.otel_enabled {
        let exporter = opentelemetry_otlp::SpanExporter::builder()
            .with_tonic()
            .with_endpoint(&config.otlp_endpoint)
            .build()
            .map_err(|e| TelemetryError::Exporter(e.to_string()))?;

        Some(
            SdkTracerProvider::builder()
                .with_batch_exporter(exporter)
                .with_resource(
                    opentelemetry_sdk::Resource::builder()
                        .with_service_name(config.service_name.clone())
                        .build(),
                )
                .build(),
        )
    } else {
        None
    };

    let otel_layer = tracer_provider.as_ref().map(|provider| {
        tracing_opentelemetry::layer().with_tracer(provider.tracer(config.service_name.clone()))
    });

    tracing_subscriber::registry()
        .with(env_filter)
        .with(json_layer)
        .with(text_layer)
        .with(otel_layer)
        .try_init()
        .map_err(|e| TelemetryError::Install(e.to_string()))?;

    Ok(TelemetryGuard { tracer_provider })
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn defaults_keep_otel_off() {
        let config = TelemetryConfig::from_lookup(lookup(&[]));
        assert_eq!(config, TelemetryConfig::default());
        assert!(!config.otel_enabled);
        assert_eq!(config.log_format, LogFormat::Text);
    }

    #[test]
    fn environment_overrides() {
        let config = TelemetryConfig::from_lookup(lookup(&[
            ("LOG_LEVEL", "DEBUG"),
            ("LOG_FORMAT", "json"),
            ("OTEL_ENABLED", "true"),
            ("OTEL_SERVICE_NAME", "scanner-staging"),
        ]));
        assert_eq!(config.log_level, "debug");
        assert_eq!(config.log_format, LogFormat::Json);
        assert!(config.otel_enabled);
        assert_eq!(config.service_name, "scanner-staging");
        assert_eq!(config.otlp_endpoint, DEFAULT_OTLP_ENDPOINT);
    }

    #[test]
    fn unknown_format_falls_back_to_text() {
        let config = TelemetryConfig::from_lookup(lookup(&[("LOG_FORMAT", "xml")]));
        assert_eq!(config.log_format, LogFormat::Text);
    }

    #[test]
    fn default_filter_rejects_bad_level() {
        let config = TelemetryConfig {
            log_level: "loud".to_string(),
            ..TelemetryConfig::default()
        };
        assert!(matches!(
            config.default_filter(),
            Err(TelemetryError::InvalidFilter { .. })
        ));
        assert!(TelemetryConfig::default().default_filter().is_ok());
    }
}
