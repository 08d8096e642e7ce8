#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::significant_drop_tightening,
        clippy::too_many_lines,
        clippy::needless_pass_by_value,
        clippy::items_after_statements,
        clippy::panic
    )
)]

//! Dashboard Sync - Polling Cache Engine
//!
//! Keeps the trading dashboard's read models fresh by polling the trading
//! backend on per-widget cadences, with one shared cache entry and at most
//! one request in flight per resource.
//!
//! # Layers (inside → outside)
//!
//! - **Domain**: Cache model and dashboard vocabulary
//!   - `cache`: Keys, entries, and the change-notifying store
//!   - `subscription`: Per-key subscriber fan-out
//!   - `action`: Scheduler actions and the in-flight guard
//!   - `dashboard`: Endpoint and widget catalog
//!   - `session`: Market session clock
//!
//! - **Application**: Use cases and port definitions
//!   - `ports`: Fetcher, remote actions, notifications
//!   - `services`: Deduplication, revalidation, engine, scheduler control
//!
//! - **Infrastructure**: Adapters and external integrations
//!   - `backend`: HTTP client for the trading backend
//!   - `notify`: Log and channel notification sinks
//!   - `clock`: Session ticker
//!   - `config`: Environment configuration
//!   - `metrics`, `telemetry`: Observability
//!
//! # Data Flow
//!
//! ```text
//!  subscribe ──► CacheStore ◄── Deduplicator ◄── RevalidationScheduler
//!                   │               ▲                 (per-key timer)
//!                   ▼               │
//!          SubscriberRegistry    mutate / trigger
//!                   │
//!                   ▼
//!            widget callbacks
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

// =============================================================================
// Module Declarations
// =============================================================================

/// Domain layer - Cache model and dashboard types, no I/O.
pub mod domain;

/// Application layer - Use cases and port definitions.
pub mod application;

/// Infrastructure layer - Adapters and external integrations.
pub mod infrastructure;

// =============================================================================
// Re-exports
// =============================================================================

// Domain types
pub use domain::action::{ActionPermit, InFlightActions, SchedulerAction};
pub use domain::cache::{
    CacheEntry, CacheKey, CacheStore, CacheValue, EntryUpdate, FetchError, FetchErrorKind,
};
pub use domain::dashboard::{Endpoint, SchedulerStatus, Widget};
pub use domain::session::{SessionSnapshot, SessionState, session_state};
pub use domain::subscription::{SubscriberRegistry, SubscriptionId, SubscriptionStats};

// Ports
pub use application::ports::{
    Fetcher, Notification, NotificationKind, NotificationSink, RemoteActions,
};

// Services
pub use application::services::{
    CachedResource, ControlError, DailyResource, EngineConfig, ResourceState, ResourceView,
    SchedulerControl, Subscription, SyncEngine,
};

// Infrastructure
pub use infrastructure::backend::{BackendError, HttpBackend};
pub use infrastructure::clock::SessionTicker;
pub use infrastructure::config::{ConfigError, DashboardConfig, RefreshSettings};
pub use infrastructure::metrics::init_metrics;
pub use infrastructure::notify::{ChannelNotificationSink, TracingNotificationSink};

// Telemetry
pub use infrastructure::telemetry::{TelemetryConfig, TelemetryGuard, init as init_telemetry};
