//! Scanner Configuration Settings
//!
//! Configuration types for the scanner, loaded from environment variables.

use std::collections::HashMap;
use std::time::Duration;

use crate::domain::MarketSession;

/// Deployment environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Environment {
    /// Local development.
    #[default]
    Development,
    /// Automated test runs.
    Testing,
    /// Production deployment.
    Production,
}

impl Environment {
    /// Parse environment from string. Unknown values fall back to development.
    #[must_use]
    pub fn from_str_case_insensitive(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "production" | "prod" => Self::Production,
            "testing" | "test" => Self::Testing,
            _ => Self::Development,
        }
    }

    /// Check if this is the production environment.
    #[must_use]
    pub const fn is_production(&self) -> bool {
        matches!(self, Self::Production)
    }

    /// Get the environment name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Development => "development",
            Self::Testing => "testing",
            Self::Production => "production",
        }
    }
}

/// Which store implementation backs the scanner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StoreBackend {
    /// PostgreSQL via sqlx.
    #[default]
    Postgres,
    /// Process-local maps; nothing survives a restart.
    Memory,
}

impl StoreBackend {
    fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "postgres" | "postgresql" => Some(Self::Postgres),
            "memory" | "in_memory" => Some(Self::Memory),
            _ => None,
        }
    }

    /// Backend name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Postgres => "postgres",
            Self::Memory => "memory",
        }
    }
}

/// PostgreSQL connection settings.
#[derive(Clone)]
pub struct DatabaseSettings {
    /// Server host.
    pub host: String,
    /// Server port.
    pub port: u16,
    /// Database name.
    pub name: String,
    /// User name.
    pub user: String,
    password: String,
    /// Minimum pooled connections.
    pub min_connections: u32,
    /// Maximum pooled connections.
    pub max_connections: u32,
}

impl DatabaseSettings {
    /// Connection URL including the password.
    #[must_use]
    pub fn url(&self) -> String {
        format!(
            "postgres://{}:{}@{}:{}/{}",
            self.user, self.password, self.host, self.port, self.name
        )
    }
}

impl std::fmt::Debug for DatabaseSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatabaseSettings")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("name", &self.name)
            .field("user", &self.user)
            .field("password", &"[REDACTED]")
            .field("min_connections", &self.min_connections)
            .field("max_connections", &self.max_connections)
            .finish()
    }
}

/// Market data provider settings.
#[derive(Clone)]
pub struct SchwabSettings {
    app_key: String,
    app_secret: String,
    /// Redirect URI registered for the application.
    pub redirect_uri: String,
    /// API base URL.
    pub base_url: String,
    /// Symbol used to probe whether a credential is still accepted.
    pub probe_symbol: String,
    /// Whether interactive authorization may be requested on stdin.
    pub interactive_auth: bool,
    /// Index queried by the movers operations.
    pub movers_index: String,
}

impl SchwabSettings {
    /// Default API base URL.
    pub const DEFAULT_BASE_URL: &'static str = "https://api.schwabapi.com";
    /// Default redirect URI.
    pub const DEFAULT_REDIRECT_URI: &'static str = "https://127.0.0.1";

    /// Settings with defaults for everything but the application keys.
    #[must_use]
    pub fn new(app_key: String, app_secret: String) -> Self {
        Self {
            app_key,
            app_secret,
            redirect_uri: Self::DEFAULT_REDIRECT_URI.to_string(),
            base_url: Self::DEFAULT_BASE_URL.to_string(),
            probe_symbol: "AAPL".to_string(),
            interactive_auth: true,
            movers_index: "EQUITY_ALL".to_string(),
        }
    }

    /// Application key (OAuth client id).
    #[must_use]
    pub fn app_key(&self) -> &str {
        &self.app_key
    }

    /// Application secret.
    #[must_use]
    pub fn app_secret(&self) -> &str {
        &self.app_secret
    }
}

impl std::fmt::Debug for SchwabSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SchwabSettings")
            .field("app_key", &"[REDACTED]")
            .field("app_secret", &"[REDACTED]")
            .field("redirect_uri", &self.redirect_uri)
            .field("base_url", &self.base_url)
            .field("probe_symbol", &self.probe_symbol)
            .field("interactive_auth", &self.interactive_auth)
            .field("movers_index", &self.movers_index)
            .finish()
    }
}

/// Polling scheduler settings.
#[derive(Debug, Clone)]
pub struct SchedulerSettings {
    /// Pause between polling cycles.
    pub sleep_time: Duration,
    /// Sessions started at boot, in order.
    pub sessions: Vec<MarketSession>,
    /// Source operation names per session.
    pub sources: HashMap<MarketSession, Vec<String>>,
    /// Grace period for a worker to stop.
    pub stop_timeout: Duration,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            sleep_time: Duration::from_secs(10),
            sessions: MarketSession::ALL.to_vec(),
            sources: MarketSession::ALL
                .iter()
                .map(|session| {
                    let names = session
                        .default_sources()
                        .iter()
                        .map(|name| (*name).to_string())
                        .collect();
                    (*session, names)
                })
                .collect(),
            stop_timeout: Duration::from_secs(5),
        }
    }
}

/// Server port settings.
#[derive(Debug, Clone)]
pub struct ServerSettings {
    /// Health check HTTP port.
    pub health_port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self { health_port: 8083 }
    }
}

/// Complete scanner configuration.
#[derive(Debug, Clone)]
pub struct ScannerConfig {
    /// Deployment environment.
    pub environment: Environment,
    /// Store implementation.
    pub store_backend: StoreBackend,
    /// Database settings; present when the backend is Postgres.
    pub database: Option<DatabaseSettings>,
    /// Market data provider settings.
    pub schwab: SchwabSettings,
    /// Scheduler settings.
    pub scheduler: SchedulerSettings,
    /// Timeout applied to every outbound HTTP request.
    pub http_timeout: Duration,
    /// Server port settings.
    pub server: ServerSettings,
}

impl ScannerConfig {
    /// Create configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if required environment variables are missing,
    /// empty or malformed.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create configuration from an arbitrary key lookup.
    ///
    /// # Errors
    ///
    /// Same as [`ScannerConfig::from_env`].
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Env(&lookup);

        let environment = env
            .get("ENVIRONMENT")
            .map(|s| Environment::from_str_case_insensitive(&s))
            .unwrap_or_default();

        let store_backend = match env.get("STORE_BACKEND") {
            Some(value) => StoreBackend::parse(&value).ok_or_else(|| {
                ConfigError::invalid("STORE_BACKEND", &value, "expected postgres or memory")
            })?,
            None => StoreBackend::default(),
        };

        let database = match store_backend {
            StoreBackend::Postgres => Some(DatabaseSettings {
                host: env.get("DB_HOST").unwrap_or_else(|| "localhost".to_string()),
                port: env.parse("DB_PORT", 5432)?,
                name: env.required("DB_NAME")?,
                user: env.required("DB_USER")?,
                password: env.required("DB_PASSWORD")?,
                min_connections: env.parse("DB_MIN_CONN", 5)?,
                max_connections: env.parse("DB_MAX_CONN", 20)?,
            }),
            StoreBackend::Memory => None,
        };
        if let Some(db) = &database
            && db.min_connections > db.max_connections
        {
            return Err(ConfigError::invalid(
                "DB_MIN_CONN",
                &db.min_connections.to_string(),
                "must not exceed DB_MAX_CONN",
            ));
        }

        let mut schwab = SchwabSettings::new(
            env.required("APP_KEY_SCHWAB")?,
            env.required("CLIENT_SECRET_SCHWAB")?,
        );
        if let Some(uri) = env.get("SCHWAB_REDIRECT_URI") {
            schwab.redirect_uri = uri;
        }
        if let Some(url) = env.get("SCHWAB_BASE_URL") {
            schwab.base_url = url.trim_end_matches('/').to_string();
        }
        if let Some(symbol) = env.get("SCHWAB_PROBE_SYMBOL") {
            schwab.probe_symbol = symbol.trim().to_uppercase();
        }
        if let Some(index) = env.get("SCHWAB_MOVERS_INDEX") {
            schwab.movers_index = index;
        }
        schwab.interactive_auth = env.flag("SCHWAB_INTERACTIVE_AUTH", true)?;

        let mut scheduler = SchedulerSettings::default();
        let sleep_secs: u64 = env.parse("SCANNER_SLEEP_TIME", 10)?;
        if sleep_secs == 0 {
            return Err(ConfigError::invalid(
                "SCANNER_SLEEP_TIME",
                "0",
                "must be at least 1 second",
            ));
        }
        scheduler.sleep_time = Duration::from_secs(sleep_secs);
        scheduler.stop_timeout = Duration::from_secs(env.parse("SCANNER_STOP_TIMEOUT_SECS", 5)?);
        if let Some(raw) = env.get("SCANNER_SESSIONS") {
            scheduler.sessions = parse_sessions(&raw)?;
        }
        for (key, session) in [
            ("SCANNER_PRE_MARKET_SOURCES", MarketSession::PreMarket),
            ("SCANNER_REGULAR_MARKET_SOURCES", MarketSession::RegularMarket),
        ] {
            if let Some(raw) = env.get(key) {
                let names = split_list(&raw);
                if names.is_empty() {
                    return Err(ConfigError::EmptyValue(key.to_string()));
                }
                scheduler.sources.insert(session, names);
            }
        }

        let http_timeout = Duration::from_secs(env.parse("HTTP_TIMEOUT_SECS", 30)?);

        let server = ServerSettings {
            health_port: env.parse("SCANNER_HEALTH_PORT", ServerSettings::default().health_port)?,
        };

        Ok(Self {
            environment,
            store_backend,
            database,
            schwab,
            scheduler,
            http_timeout,
            server,
        })
    }

    /// Non-fatal configuration concerns to log at startup.
    #[must_use]
    pub fn warnings(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        if self.scheduler.sleep_time < Duration::from_secs(10) {
            warnings.push(format!(
                "SCANNER_SLEEP_TIME of {}s is below 10s and may exhaust provider rate limits",
                self.scheduler.sleep_time.as_secs()
            ));
        }
        if self.environment.is_production() && self.store_backend == StoreBackend::Memory {
            warnings.push("memory store in production: tracked tickers are lost on restart".to_string());
        }
        if self.environment.is_production() && self.schwab.interactive_auth {
            warnings.push(
                "interactive authorization enabled in production: the scanner may block on stdin"
                    .to_string(),
            );
        }
        warnings
    }
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Required environment variable is missing.
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),
    /// Environment variable has empty value.
    #[error("environment variable {0} cannot be empty")]
    EmptyValue(String),
    /// Environment variable could not be parsed.
    #[error("invalid value {value:?} for {key}: {reason}")]
    InvalidValue {
        /// Variable name.
        key: String,
        /// Raw value.
        value: String,
        /// What was expected.
        reason: String,
    },
}

impl ConfigError {
    fn invalid(key: &str, value: &str, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            key: key.to_string(),
            value: value.to_string(),
            reason: reason.into(),
        }
    }
}

struct Env<'a, F: Fn(&str) -> Option<String>>(&'a F);

impl<F: Fn(&str) -> Option<String>> Env<'_, F> {
    fn get(&self, key: &str) -> Option<String> {
        (self.0)(key).filter(|value| !value.trim().is_empty())
    }

    fn required(&self, key: &str) -> Result<String, ConfigError> {
        let value = (self.0)(key).ok_or_else(|| ConfigError::MissingEnvVar(key.to_string()))?;
        if value.trim().is_empty() {
            return Err(ConfigError::EmptyValue(key.to_string()));
        }
        Ok(value)
    }

    fn parse<T>(&self, key: &str, default: T) -> Result<T, ConfigError>
    where
        T: std::str::FromStr,
        T::Err: std::fmt::Display,
    {
        self.get(key).map_or(Ok(default), |raw| {
            raw.trim()
                .parse()
                .map_err(|e: T::Err| ConfigError::invalid(key, &raw, e.to_string()))
        })
    }

    fn flag(&self, key: &str, default: bool) -> Result<bool, ConfigError> {
        self.get(key).map_or(Ok(default), |raw| {
            match raw.trim().to_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => Ok(true),
                "0" | "false" | "no" | "off" => Ok(false),
                _ => Err(ConfigError::invalid(key, &raw, "expected a boolean")),
            }
        })
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_sessions(raw: &str) -> Result<Vec<MarketSession>, ConfigError> {
    let mut sessions = Vec::new();
    for name in split_list(raw) {
        let session: MarketSession = name
            .parse()
            .map_err(|e: crate::domain::DomainError| {
                ConfigError::invalid("SCANNER_SESSIONS", &name, e.to_string())
            })?;
        if !sessions.contains(&session) {
            sessions.push(session);
        }
    }
    if sessions.is_empty() {
        return Err(ConfigError::EmptyValue("SCANNER_SESSIONS".to_string()));
    }
    Ok(sessions)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    const MEMORY_MINIMAL: &[(&str, &str)] = &[
        ("STORE_BACKEND", "memory"),
        ("APP_KEY_SCHWAB", "key123"),
        ("CLIENT_SECRET_SCHWAB", "secret456"),
    ];

    #[test]
    fn environment_parsing() {
        assert_eq!(
            Environment::from_str_case_insensitive("PRODUCTION"),
            Environment::Production
        );
        assert_eq!(
            Environment::from_str_case_insensitive("testing"),
            Environment::Testing
        );
        assert_eq!(
            Environment::from_str_case_insensitive("unknown"),
            Environment::Development
        );
    }

    #[test]
    fn defaults_with_memory_backend() {
        let config = ScannerConfig::from_lookup(lookup(MEMORY_MINIMAL)).unwrap();
        assert_eq!(config.store_backend, StoreBackend::Memory);
        assert!(config.database.is_none());
        assert_eq!(config.scheduler.sleep_time, Duration::from_secs(10));
        assert_eq!(config.scheduler.stop_timeout, Duration::from_secs(5));
        assert_eq!(config.scheduler.sessions, MarketSession::ALL.to_vec());
        assert_eq!(config.http_timeout, Duration::from_secs(30));
        assert_eq!(config.server.health_port, 8083);
        assert_eq!(config.schwab.base_url, SchwabSettings::DEFAULT_BASE_URL);
        assert!(config.schwab.interactive_auth);
        assert!(config.warnings().is_empty());
        assert_eq!(
            config.scheduler.sources[&MarketSession::PreMarket],
            vec!["charles_schwab_pre_market_movers", "stock_analysis"]
        );
    }

    #[test]
    fn postgres_backend_requires_database_credentials() {
        let err = ScannerConfig::from_lookup(lookup(&[
            ("APP_KEY_SCHWAB", "k"),
            ("CLIENT_SECRET_SCHWAB", "s"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::MissingEnvVar(ref key) if key == "DB_NAME"));

        let config = ScannerConfig::from_lookup(lookup(&[
            ("APP_KEY_SCHWAB", "k"),
            ("CLIENT_SECRET_SCHWAB", "s"),
            ("DB_NAME", "scanner"),
            ("DB_USER", "scan"),
            ("DB_PASSWORD", "pw"),
            ("DB_PORT", "6543"),
        ]))
        .unwrap();
        let db = config.database.unwrap();
        assert_eq!(db.url(), "postgres://scan:pw@localhost:6543/scanner");
        assert!(!format!("{db:?}").contains("pw"));
    }

    #[test]
    fn missing_and_empty_app_keys() {
        let err = ScannerConfig::from_lookup(lookup(&[("STORE_BACKEND", "memory")])).unwrap_err();
        assert!(matches!(err, ConfigError::MissingEnvVar(ref key) if key == "APP_KEY_SCHWAB"));

        let err = ScannerConfig::from_lookup(lookup(&[
            ("STORE_BACKEND", "memory"),
            ("APP_KEY_SCHWAB", "  "),
            ("CLIENT_SECRET_SCHWAB", "s"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::EmptyValue(_)));
    }

    #[test]
    fn zero_sleep_is_rejected_and_short_sleep_warns() {
        let mut pairs = MEMORY_MINIMAL.to_vec();
        pairs.push(("SCANNER_SLEEP_TIME", "0"));
        assert!(matches!(
            ScannerConfig::from_lookup(lookup(&pairs)),
            Err(ConfigError::InvalidValue { .. })
        ));

        let mut pairs = MEMORY_MINIMAL.to_vec();
        pairs.push(("SCANNER_SLEEP_TIME", "3"));
        let config = ScannerConfig::from_lookup(lookup(&pairs)).unwrap();
        assert_eq!(config.scheduler.sleep_time, Duration::from_secs(3));
        assert_eq!(config.warnings().len(), 1);
    }

    #[test]
    fn sessions_and_source_overrides() {
        let mut pairs = MEMORY_MINIMAL.to_vec();
        pairs.push(("SCANNER_SESSIONS", "regular-market, pre_market, regular_market"));
        pairs.push(("SCANNER_REGULAR_MARKET_SOURCES", "stock_analysis_regular_market_active"));
        let config = ScannerConfig::from_lookup(lookup(&pairs)).unwrap();
        assert_eq!(
            config.scheduler.sessions,
            vec![MarketSession::RegularMarket, MarketSession::PreMarket]
        );
        assert_eq!(
            config.scheduler.sources[&MarketSession::RegularMarket],
            vec!["stock_analysis_regular_market_active"]
        );
    }

    #[test]
    fn after_hours_session_is_a_configuration_error() {
        let mut pairs = MEMORY_MINIMAL.to_vec();
        pairs.push(("SCANNER_SESSIONS", "after_hours"));
        let err = ScannerConfig::from_lookup(lookup(&pairs)).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref key, .. } if key == "SCANNER_SESSIONS"));
    }

    #[test]
    fn malformed_numbers_and_flags() {
        let mut pairs = MEMORY_MINIMAL.to_vec();
        pairs.push(("SCANNER_HEALTH_PORT", "http"));
        assert!(ScannerConfig::from_lookup(lookup(&pairs)).is_err());

        let mut pairs = MEMORY_MINIMAL.to_vec();
        pairs.push(("SCHWAB_INTERACTIVE_AUTH", "false"));
        pairs.push(("SCHWAB_BASE_URL", "http://localhost:9000/"));
        let config = ScannerConfig::from_lookup(lookup(&pairs)).unwrap();
        assert!(!config.schwab.interactive_auth);
        assert_eq!(config.schwab.base_url, "http://localhost:9000");
    }

    #[test]
    fn schwab_settings_redacted_debug() {
        let settings = SchwabSettings::new("key123".to_string(), "secret456".to_string());
        let debug = format!("{settings:?}");
        assert!(!debug.contains("key123"));
        assert!(!debug.contains("secret456"));
        assert!(debug.contains("[REDACTED]"));
    }
}
