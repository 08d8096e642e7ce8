//! Configuration Module
//!
//! Configuration loading for the sync service.

mod settings;

pub use settings::{
    ConfigError, DEFAULT_API_URL, DEFAULT_METRICS_PORT, DashboardConfig, RefreshSettings,
};
