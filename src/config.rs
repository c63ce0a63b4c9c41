//! Console configuration loaded from environment variables.
//!
//! # Configuration Hierarchy
//!
//! All configuration is loaded from environment variables with sensible defaults
//! for development. An `.env` file in the working directory is honoured.
//!
//! # Session
//!
//! - `CONSOLE_TOKEN`: Pre-issued bearer token seeded into the session
//! - `CONSOLE_USERNAME` / `CONSOLE_PASSWORD`: Credentials for the login endpoint
//!
//! # Polling
//!
//! - `MINUTE_POLL_INTERVAL_SECS`: Minute bucket counters (default: 5)
//! - `TOTALS_POLL_INTERVAL_SECS`: Lifetime request counter (default: 10)
//! - `ROUTES_POLL_INTERVAL_SECS`: Route inventory (default: 30)
//! - `RATE_LIMIT_POLL_INTERVAL_SECS`: Per-route rate-limit snapshots (default: 5)

use std::env;
use std::time::Duration;

use crate::error::{ConsoleError, ConsoleResult};

/// Console configuration loaded from environment variables.
///
/// # Example
///
/// ```rust,ignore
/// let config = Config::from_env()?;
/// println!("Talking to {}", config.api_base_url);
/// ```
#[derive(Debug, Clone)]
pub struct Config {
    // =========================================================================
    // Remote API
    // =========================================================================
    /// Base URL of the gateway's Route/Metrics API (default: "http://localhost:8080")
    pub api_base_url: String,

    /// Timeout for a single request to the API (default: 30 seconds)
    pub request_timeout: Duration,

    // =========================================================================
    // Session
    // =========================================================================
    /// Bearer token to seed the session with
    pub api_token: Option<String>,

    /// Username for the login endpoint
    pub username: Option<String>,

    /// Password for the login endpoint
    pub password: Option<String>,

    /// API path of the login endpoint. A 401 from this path never evicts the session.
    pub login_endpoint: String,

    /// Navigation target after session eviction
    pub login_page: String,

    // =========================================================================
    // Polling
    // =========================================================================
    pub minute_poll_interval: Duration,

    pub totals_poll_interval: Duration,

    pub routes_poll_interval: Duration,

    pub rate_limit_poll_interval: Duration,

    /// How often the watcher binary logs the dashboard
    pub report_interval: Duration,

    /// Number of routes in the "top by traffic" ranking (default: 5)
    pub top_routes: usize,

    // =========================================================================
    // Observability
    // =========================================================================
    /// Log level (e.g., "info", "debug", "trace")
    pub log_level: String,

    /// Emit logs as JSON lines instead of text
    pub log_json: bool,

    /// Port for the Prometheus endpoint (default: 0 = disabled)
    pub metrics_port: u16,
}

impl Config {
    /// Load configuration from environment variables with sensible defaults.
    ///
    /// # Errors
    ///
    /// Returns `ConsoleError::ConfigError` if any value fails to parse or
    /// validation rejects the combination.
    pub fn from_env() -> ConsoleResult<Self> {
        // Load an .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let config = Self {
            api_base_url: env::var("CONSOLE_API_URL")
                .unwrap_or_else(|_| "http://localhost:8080".to_string()),
            request_timeout: Duration::from_secs(Self::parse_env("REQUEST_TIMEOUT_SECS", 30)?),

            api_token: Self::non_empty_env("CONSOLE_TOKEN"),
            username: Self::non_empty_env("CONSOLE_USERNAME"),
            password: Self::non_empty_env("CONSOLE_PASSWORD"),
            login_endpoint: env::var("LOGIN_ENDPOINT").unwrap_or_else(|_| "/auth/login".to_string()),
            login_page: env::var("LOGIN_PAGE").unwrap_or_else(|_| "/login".to_string()),

            minute_poll_interval: Duration::from_secs(Self::parse_env(
                "MINUTE_POLL_INTERVAL_SECS",
                5,
            )?),
            totals_poll_interval: Duration::from_secs(Self::parse_env(
                "TOTALS_POLL_INTERVAL_SECS",
                10,
            )?),
            routes_poll_interval: Duration::from_secs(Self::parse_env(
                "ROUTES_POLL_INTERVAL_SECS",
                30,
            )?),
            rate_limit_poll_interval: Duration::from_secs(Self::parse_env(
                "RATE_LIMIT_POLL_INTERVAL_SECS",
                5,
            )?),
            report_interval: Duration::from_secs(Self::parse_env("REPORT_INTERVAL_SECS", 15)?),
            top_routes: Self::parse_env("TOP_ROUTES", 5)?,

            log_level: env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
            log_json: Self::parse_log_format(env::var("LOG_FORMAT").ok().as_deref())?,
            metrics_port: Self::parse_env("METRICS_PORT", 0)?,
        };

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration values for consistency and correctness.
    ///
    /// # Errors
    ///
    /// Returns `ConsoleError::ConfigError` if validation fails.
    pub fn validate(&self) -> ConsoleResult<()> {
        let base = self.api_base_url.to_ascii_lowercase();
        if !(base.starts_with("http://") || base.starts_with("https://")) {
            return Err(ConsoleError::ConfigError(format!(
                "CONSOLE_API_URL must start with http:// or https:// (got '{}')",
                self.api_base_url
            )));
        }

        if self.request_timeout.is_zero() {
            return Err(ConsoleError::ConfigError(
                "REQUEST_TIMEOUT_SECS must be greater than 0".to_string(),
            ));
        }

        for (name, path) in [
            ("LOGIN_ENDPOINT", &self.login_endpoint),
            ("LOGIN_PAGE", &self.login_page),
        ] {
            if !path.starts_with('/') {
                return Err(ConsoleError::ConfigError(format!(
                    "{name} must start with '/' (got '{path}')"
                )));
            }
        }

        for (name, interval) in [
            ("MINUTE_POLL_INTERVAL_SECS", self.minute_poll_interval),
            ("TOTALS_POLL_INTERVAL_SECS", self.totals_poll_interval),
            ("ROUTES_POLL_INTERVAL_SECS", self.routes_poll_interval),
            ("RATE_LIMIT_POLL_INTERVAL_SECS", self.rate_limit_poll_interval),
            ("REPORT_INTERVAL_SECS", self.report_interval),
        ] {
            if interval.is_zero() {
                return Err(ConsoleError::ConfigError(format!(
                    "{name} must be greater than 0"
                )));
            }
        }

        if self.username.is_some() != self.password.is_some() {
            return Err(ConsoleError::ConfigError(
                "CONSOLE_USERNAME and CONSOLE_PASSWORD must be set together".to_string(),
            ));
        }

        Ok(())
    }

    /// Build the absolute URL for an API path.
    pub fn endpoint_url(&self, path: &str) -> String {
        format!("{}{}", self.api_base_url.trim_end_matches('/'), path)
    }

    /// Check if credentials for the login endpoint are configured.
    pub fn has_credentials(&self) -> bool {
        self.username.is_some() && self.password.is_some()
    }

    /// Check if Prometheus metrics export is enabled.
    pub fn metrics_enabled(&self) -> bool {
        self.metrics_port > 0
    }

    /// Get the metrics endpoint address.
    ///
    /// Returns `None` if metrics are disabled (port = 0).
    pub fn metrics_addr(&self) -> Option<std::net::SocketAddr> {
        self.metrics_enabled()
            .then(|| std::net::SocketAddr::from(([0, 0, 0, 0], self.metrics_port)))
    }

    /// Parse an environment variable into the specified type with a default value.
    fn parse_env<T>(name: &str, default: T) -> ConsoleResult<T>
    where
        T: std::str::FromStr,
        T::Err: std::fmt::Display,
    {
        match env::var(name) {
            Ok(val) => val
                .trim()
                .parse()
                .map_err(|e| ConsoleError::ConfigError(format!("Invalid {name}: {e}"))),
            Err(_) => Ok(default),
        }
    }

    /// `json` selects JSON lines, `text` (or unset) plain text.
    fn parse_log_format(raw: Option<&str>) -> ConsoleResult<bool> {
        match raw.map(str::trim) {
            None | Some("") => Ok(false),
            Some(f) if f.eq_ignore_ascii_case("json") => Ok(true),
            Some(f) if f.eq_ignore_ascii_case("text") => Ok(false),
            Some(other) => Err(ConsoleError::ConfigError(format!(
                "Invalid LOG_FORMAT: '{other}' (expected 'text' or 'json')"
            ))),
        }
    }

    fn non_empty_env(name: &str) -> Option<String> {
        env::var(name).ok().filter(|v| !v.trim().is_empty())
    }
}

/// Default configuration for testing and development.
///
/// Real deployments should use `Config::from_env()` instead.
impl Default for Config {
    fn default() -> Self {
        Self {
            api_base_url: "http://localhost:8080".to_string(),
            request_timeout: Duration::from_secs(30),
            api_token: None,
            username: None,
            password: None,
            login_endpoint: "/auth/login".to_string(),
            login_page: "/login".to_string(),
            minute_poll_interval: Duration::from_secs(5),
            totals_poll_interval: Duration::from_secs(10),
            routes_poll_interval: Duration::from_secs(30),
            rate_limit_poll_interval: Duration::from_secs(5),
            report_interval: Duration::from_secs(15),
            top_routes: 5,
            log_level: "info".to_string(),
            log_json: false,
            metrics_port: 0,
        }
    }
}
