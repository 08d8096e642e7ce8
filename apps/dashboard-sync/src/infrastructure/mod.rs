//! Infrastructure Layer - Adapters and external integrations.
//!
//! This layer contains the concrete implementations of the port interfaces
//! defined in the application layer.

/// HTTP adapter for the trading backend.
pub mod backend;

/// Session clock driver.
pub mod clock;

/// Configuration loading.
pub mod config;

/// Prometheus metrics instrumentation.
pub mod metrics;

/// Notification sink adapters.
pub mod notify;

/// OpenTelemetry tracing integration.
pub mod telemetry;
