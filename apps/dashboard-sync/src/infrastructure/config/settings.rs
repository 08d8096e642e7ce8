//! Dashboard Sync Configuration Settings
//!
//! Configuration types for the sync service, loaded from environment variables.

use std::collections::HashMap;
use std::time::Duration;

use reqwest::Url;

use crate::application::services::{DEFAULT_LINGER, EngineConfig};
use crate::domain::dashboard::{DEFAULT_EXCHANGE, Widget};

/// Backend base URL used when `STOCKMARU_API_URL` is unset.
pub const DEFAULT_API_URL: &str = "http://localhost:8000";

/// Prometheus listener port used when `SYNC_METRICS_PORT` is unset.
pub const DEFAULT_METRICS_PORT: u16 = 9091;

/// Per-widget refresh cadences.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshSettings {
    intervals: HashMap<Widget, Duration>,
}

impl Default for RefreshSettings {
    fn default() -> Self {
        Self {
            intervals: Widget::all()
                .iter()
                .map(|widget| (*widget, widget.default_refresh_interval()))
                .collect(),
        }
    }
}

impl RefreshSettings {
    /// Refresh cadence for `widget`. Zero disables polling.
    #[must_use]
    pub fn interval(&self, widget: Widget) -> Duration {
        self.intervals
            .get(&widget)
            .copied()
            .unwrap_or_else(|| widget.default_refresh_interval())
    }

    /// Override the cadence for `widget`.
    pub fn set_interval(&mut self, widget: Widget, interval: Duration) {
        self.intervals.insert(widget, interval);
    }
}

/// Complete sync service configuration.
#[derive(Debug, Clone)]
pub struct DashboardConfig {
    /// Trading backend base URL.
    pub api_url: Url,
    /// Engine tuning.
    pub engine: EngineConfig,
    /// Per-widget refresh cadences.
    pub refresh: RefreshSettings,
    /// Overseas exchange code for order queries.
    pub exchange_code: String,
    /// Prometheus metrics port (0 = disabled).
    pub metrics_port: u16,
}

impl DashboardConfig {
    /// Create configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if a variable is set to a value that cannot be parsed.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create configuration from an arbitrary variable source.
    ///
    /// # Errors
    ///
    /// Returns an error if a variable is set to a value that cannot be parsed.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Env { lookup };

        let raw_url = env
            .get("STOCKMARU_API_URL")
            .unwrap_or_else(|| DEFAULT_API_URL.to_string());
        let api_url = Url::parse(&raw_url).map_err(|e| ConfigError::InvalidUrl(format!("{raw_url}: {e}")))?;

        let engine = EngineConfig {
            linger: env.duration_millis("SYNC_LINGER_MS", DEFAULT_LINGER)?,
            evict_on_idle: env.bool("SYNC_EVICT_IDLE", true)?,
        };

        let mut refresh = RefreshSettings::default();
        for widget in Widget::all() {
            let key = format!("SYNC_REFRESH_{}_MS", widget.env_name());
            refresh.set_interval(
                *widget,
                env.duration_millis(&key, widget.default_refresh_interval())?,
            );
        }

        let exchange_code = env
            .get("SYNC_EXCHANGE_CODE")
            .unwrap_or_else(|| DEFAULT_EXCHANGE.to_string());
        if exchange_code.is_empty() {
            return Err(ConfigError::InvalidValue {
                key: "SYNC_EXCHANGE_CODE".to_string(),
                value: exchange_code,
            });
        }

        Ok(Self {
            api_url,
            engine,
            refresh,
            exchange_code,
            metrics_port: env.u16("SYNC_METRICS_PORT", DEFAULT_METRICS_PORT)?,
        })
    }
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Environment variable holds a value of the wrong shape.
    #[error("invalid value for {key}: {value:?}")]
    InvalidValue {
        /// Variable name.
        key: String,
        /// Rejected value.
        value: String,
    },
    /// Backend URL does not parse.
    #[error("invalid backend URL {0}")]
    InvalidUrl(String),
}

struct Env<F> {
    lookup: F,
}

impl<F: Fn(&str) -> Option<String>> Env<F> {
    fn get(&self, key: &str) -> Option<String> {
        (self.lookup)(key).map(|v| v.trim().to_string())
    }

    fn parse<T: std::str::FromStr>(&self, key: &str, default: T) -> Result<T, ConfigError> {
        match self.get(key) {
            None => Ok(default),
            Some(value) if value.is_empty() => Ok(default),
            Some(value) => value.parse().map_err(|_| ConfigError::InvalidValue {
                key: key.to_string(),
                value,
            }),
        }
    }

    fn u16(&self, key: &str, default: u16) -> Result<u16, ConfigError> {
        self.parse(key, default)
    }

    fn duration_millis(&self, key: &str, default: Duration) -> Result<Duration, ConfigError> {
        let default_ms = u64::try_from(default.as_millis()).unwrap_or(u64::MAX);
        self.parse(key, default_ms).map(Duration::from_millis)
    }

    fn bool(&self, key: &str, default: bool) -> Result<bool, ConfigError> {
        match self.get(key).map(|v| v.to_lowercase()) {
            None => Ok(default),
            Some(value) => match value.as_str() {
                "" => Ok(default),
                "1" | "true" | "yes" | "on" => Ok(true),
                "0" | "false" | "no" | "off" => Ok(false),
                _ => Err(ConfigError::InvalidValue {
                    key: key.to_string(),
                    value,
                }),
            },
        }
    }
}
