//! Prometheus Metrics Module
//!
//! Exposes engine metrics via Prometheus format for monitoring.
//!
//! # Metrics Categories
//!
//! - **Fetches**: Fetches started, joined by deduplication, and failed by kind
//! - **Revalidation**: Timer ticks skipped because a fetch was in flight
//! - **Mutations**: Optimistic updates applied
//! - **Actions**: Scheduler actions performed or rejected
//! - **Cache**: Cached entries and active subscriptions
//!
//! # Integration
//!
//! Metrics are exposed at `/metrics` on the configured listener port. When
//! no recorder is installed every call below is a no-op.

use std::net::SocketAddr;
use std::sync::OnceLock;
use std::time::Duration;

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

use crate::domain::action::SchedulerAction;
use crate::domain::cache::FetchErrorKind;

// =============================================================================
// Exporter
// =============================================================================

static INSTALLED: OnceLock<SocketAddr> = OnceLock::new();

/// Install the Prometheus recorder with an HTTP listener on `port`.
///
/// A port of `0` leaves metrics disabled. Calling this again after a
/// successful install is a no-op. Must be called inside a Tokio runtime.
///
/// # Errors
///
/// Returns an error if the listener cannot be bound or a recorder is
/// already installed.
pub fn init_metrics(port: u16) -> Result<Option<SocketAddr>, BuildError> {
    if port == 0 {
        return Ok(None);
    }
    if let Some(addr) = INSTALLED.get() {
        return Ok(Some(*addr));
    }

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    register_metrics();

    Ok(Some(*INSTALLED.get_or_init(|| addr)))
}

// =============================================================================
// Metric Registration
// =============================================================================

fn register_metrics() {
    // Fetch counters
    describe_counter!(
        "dashboard_sync_fetches_started_total",
        "Fetches issued to the backend"
    );
    describe_counter!(
        "dashboard_sync_fetches_joined_total",
        "Requests satisfied by joining an in-flight fetch"
    );
    describe_counter!(
        "dashboard_sync_fetch_failures_total",
        "Failed fetches by error kind"
    );
    describe_histogram!(
        "dashboard_sync_fetch_duration_seconds",
        "Time from fetch start to settlement"
    );

    // Revalidation counters
    describe_counter!(
        "dashboard_sync_ticks_skipped_total",
        "Timer ticks skipped because a fetch was in flight"
    );
    describe_counter!(
        "dashboard_sync_ticks_overdue_total",
        "Skipped ticks whose entry was older than its interval"
    );

    // Mutation and action counters
    describe_counter!(
        "dashboard_sync_optimistic_updates_total",
        "Optimistic values written ahead of revalidation"
    );
    describe_counter!(
        "dashboard_sync_actions_total",
        "Scheduler actions performed by outcome"
    );
    describe_counter!(
        "dashboard_sync_actions_rejected_total",
        "Scheduler actions refused because one was already running"
    );

    // Cache gauges
    describe_gauge!("dashboard_sync_cached_entries", "Entries held in the cache");
    describe_gauge!(
        "dashboard_sync_active_subscriptions",
        "Subscriptions currently registered"
    );
}

// =============================================================================
// Metric Recording Functions
// =============================================================================

/// Record a fetch issued to the backend.
pub fn record_fetch_started(endpoint: &str) {
    counter!(
        "dashboard_sync_fetches_started_total",
        "endpoint" => endpoint.to_string()
    )
    .increment(1);
}

/// Record a request that joined an in-flight fetch.
pub fn record_fetch_joined() {
    counter!("dashboard_sync_fetches_joined_total").increment(1);
}

/// Record a failed fetch.
pub fn record_fetch_failed(kind: FetchErrorKind) {
    counter!(
        "dashboard_sync_fetch_failures_total",
        "kind" => kind.as_str()
    )
    .increment(1);
}

/// Record how long a fetch took to settle.
pub fn record_fetch_duration(duration: Duration) {
    histogram!("dashboard_sync_fetch_duration_seconds").record(duration.as_secs_f64());
}

/// Record a timer tick skipped because a fetch was in flight.
pub fn record_tick_skipped(overdue: bool) {
    counter!("dashboard_sync_ticks_skipped_total").increment(1);
    if overdue {
        counter!("dashboard_sync_ticks_overdue_total").increment(1);
    }
}

/// Record an optimistic update.
pub fn record_optimistic_update() {
    counter!("dashboard_sync_optimistic_updates_total").increment(1);
}

/// Record a completed scheduler action.
pub fn record_action(action: SchedulerAction, success: bool) {
    counter!(
        "dashboard_sync_actions_total",
        "action" => action.as_str(),
        "outcome" => if success { "success" } else { "failure" }
    )
    .increment(1);
}

/// Record a scheduler action refused while already in flight.
pub fn record_action_rejected(action: SchedulerAction) {
    counter!(
        "dashboard_sync_actions_rejected_total",
        "action" => action.as_str()
    )
    .increment(1);
}

/// Update the cached entry count.
#[allow(clippy::cast_precision_loss)]
pub fn set_cached_entries(count: usize) {
    gauge!("dashboard_sync_cached_entries").set(count as f64);
}

/// Update the active subscription count.
#[allow(clippy::cast_precision_loss)]
pub fn set_active_subscriptions(count: usize) {
    gauge!("dashboard_sync_active_subscriptions").set(count as f64);
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_port_disables_exporter() {
        assert_eq!(init_metrics(0).unwrap(), None);
    }

    #[test]
    fn recording_without_recorder_is_noop() {
        record_fetch_started("/balance/");
        record_fetch_joined();
        record_fetch_failed(FetchErrorKind::Transport);
        record_tick_skipped(true);
        record_action(SchedulerAction::BuyNow, false);
        set_cached_entries(3);
    }
}
