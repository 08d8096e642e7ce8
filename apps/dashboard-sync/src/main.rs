//! Dashboard Sync Binary
//!
//! Keeps every dashboard widget's data fresh against the trading backend and
//! logs what each widget would render.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin dashboard-sync
//! ```
//!
//! Scheduler actions (`buyNow`, `sellNow`, `startBuy`, `stopBuy`,
//! `startSell`, `stopSell`) can be typed on stdin, one per line.
//!
//! # Environment Variables
//!
//! - `STOCKMARU_API_URL`: Trading backend (default: <http://localhost:8000>)
//! - `SYNC_LINGER_MS`: Unsubscribe linger window (default: 2000)
//! - `SYNC_EVICT_IDLE`: Evict idle entries after linger (default: true)
//! - `SYNC_REFRESH_<WIDGET>_MS`: Per-widget cadence, 0 disables polling
//! - `SYNC_EXCHANGE_CODE`: Overseas exchange code (default: NASD)
//! - `SYNC_METRICS_PORT`: Prometheus metrics port (default: 9091, 0 disables)
//! - `OTEL_ENABLED`: Export spans over OTLP (default: false)
//! - `RUST_LOG`: Log level (default: info)

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use dashboard_sync::infrastructure::telemetry;
use dashboard_sync::{
    CachedResource, DailyResource, DashboardConfig, Endpoint, HttpBackend, ResourceView,
    SchedulerAction, SchedulerControl, SchedulerStatus, SessionSnapshot, SessionTicker, SyncEngine,
    TracingNotificationSink, Widget, init_metrics,
};
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::signal;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

/// Graceful shutdown timeout.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    load_dotenv();

    // Initialize telemetry (tracing + optional OTLP export)
    let _telemetry_guard = telemetry::init();

    tracing::info!("Starting dashboard sync");

    let config = DashboardConfig::from_env().context("invalid configuration")?;
    log_config(&config);

    // Initialize Prometheus metrics
    match init_metrics(config.metrics_port) {
        Ok(Some(addr)) => tracing::info!(%addr, "Metrics listener started"),
        Ok(None) => tracing::info!("Metrics disabled"),
        Err(e) => tracing::warn!(error = %e, "Metrics unavailable"),
    }

    let shutdown_token = CancellationToken::new();

    let backend = Arc::new(HttpBackend::new(&config.api_url)?);
    let engine = SyncEngine::<Value>::with_shutdown(
        backend.clone(),
        config.engine,
        shutdown_token.child_token(),
    );

    // Session ticker
    let (ticker, sessions) = SessionTicker::new(shutdown_token.clone());
    let today = sessions.borrow().utc_date();
    tokio::spawn(ticker.run());

    let mut watchers = Vec::with_capacity(Widget::all().len());
    for widget in Widget::all() {
        let interval = config.refresh.interval(*widget);
        let watcher = if *widget == Widget::ReservedOrders {
            let exchange = config.exchange_code.clone();
            let daily = DailyResource::new(engine.clone(), interval, today, move |day| {
                widget.key(&exchange, day)
            });
            tokio::spawn(watch_daily_widget(
                *widget,
                daily,
                sessions.clone(),
                shutdown_token.clone(),
            ))
        } else {
            let key = widget.key(&config.exchange_code, today);
            let resource = engine.use_cached_resource(key, interval);
            tokio::spawn(watch_widget(*widget, resource, shutdown_token.clone()))
        };
        watchers.push(watcher);
    }

    // Operator console
    let control = SchedulerControl::new(
        engine.clone(),
        backend,
        Arc::new(TracingNotificationSink),
        Endpoint::SchedulerStatus.key(),
    );
    tokio::spawn(read_actions(Arc::new(control), shutdown_token.clone()));

    tracing::info!(widgets = watchers.len(), "Dashboard sync ready");

    await_shutdown(shutdown_token).await;
    engine.shutdown();

    let drained = tokio::time::timeout(SHUTDOWN_TIMEOUT, async {
        for watcher in watchers {
            let _ = watcher.await;
        }
    })
    .await;
    if drained.is_err() {
        tracing::warn!("Widget watchers did not stop in time");
    }

    tracing::info!("Dashboard sync stopped");
    Ok(())
}

/// Log every render-relevant change of one widget.
async fn watch_widget(
    widget: Widget,
    mut resource: CachedResource<Value>,
    shutdown: CancellationToken,
) {
    loop {
        tokio::select! {
            () = shutdown.cancelled() => break,
            state = resource.changed() => {
                let Some(state) = state else { break };
                if !state.is_validating {
                    log_view(widget, &state.view());
                }
            }
        }
    }
}

/// Like [`watch_widget`], moving the subscription to the new key whenever
/// the UTC date rolls over.
async fn watch_daily_widget(
    widget: Widget,
    mut daily: DailyResource<Value>,
    mut sessions: watch::Receiver<SessionSnapshot>,
    shutdown: CancellationToken,
) {
    loop {
        tokio::select! {
            () = shutdown.cancelled() => break,
            changed = sessions.changed() => {
                if changed.is_err() {
                    break;
                }
                let today = sessions.borrow_and_update().utc_date();
                if daily.roll_to(today) {
                    tracing::info!(%widget, %today, "Switched to the new trading day");
                }
            }
            state = daily.resource_mut().changed() => {
                let Some(state) = state else { break };
                if !state.is_validating {
                    log_view(widget, &state.view());
                }
            }
        }
    }
}

fn log_view(widget: Widget, view: &ResourceView<Value>) {
    match view {
        ResourceView::Loading => tracing::debug!(%widget, "Loading"),
        ResourceView::Failed(error) => {
            tracing::warn!(%widget, kind = %error.kind(), error = %error, "Failed to load");
        }
        ResourceView::Ready {
            value,
            error: Some(error),
            ..
        } => tracing::warn!(
            %widget,
            summary = %summarize(widget, value),
            error = %error,
            "Showing last known data, refresh failed"
        ),
        ResourceView::Ready { value, .. } => {
            tracing::info!(%widget, summary = %summarize(widget, value), "Updated");
        }
    }
}

fn summarize(widget: Widget, value: &Value) -> String {
    if widget == Widget::SchedulerStatus {
        return match SchedulerStatus::from_value(value) {
            Ok(status) => format!(
                "buy {}, sell {}",
                if status.buy_running { "running" } else { "stopped" },
                if status.sell_running { "running" } else { "stopped" },
            ),
            Err(e) => format!("unreadable status: {e}"),
        };
    }

    match value {
        Value::Null => "empty".to_string(),
        Value::Array(items) => format!("{} items", items.len()),
        Value::Object(fields) => fields
            .iter()
            .find_map(|(name, field)| {
                field
                    .as_array()
                    .map(|items| format!("{name}: {} items", items.len()))
            })
            .unwrap_or_else(|| format!("{} fields", fields.len())),
        other => other.to_string(),
    }
}

/// Read scheduler actions from stdin, one identity per line.
async fn read_actions(control: Arc<SchedulerControl<Value>>, shutdown: CancellationToken) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        let line = tokio::select! {
            () = shutdown.cancelled() => break,
            line = lines.next_line() => line,
        };
        let line = match line {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                tracing::warn!(error = %e, "Operator console closed");
                break;
            }
        };

        let name = line.trim();
        if name.is_empty() {
            continue;
        }
        let Some(action) = SchedulerAction::all()
            .iter()
            .copied()
            .find(|a| a.as_str() == name)
        else {
            tracing::warn!(input = name, "Unknown action");
            continue;
        };

        let control = Arc::clone(&control);
        tokio::spawn(async move {
            // Outcomes are reported through the notification sink.
            let _ = control.run(action).await;
        });
    }
}

/// Load .env file from current or ancestor directories.
fn load_dotenv() {
    if dotenvy::dotenv().is_err() {
        load_dotenv_from_ancestors();
    }
}

/// Log the parsed configuration.
fn log_config(config: &DashboardConfig) {
    tracing::info!(
        api_url = %config.api_url,
        exchange = %config.exchange_code,
        linger_ms = config.engine.linger.as_millis(),
        evict_on_idle = config.engine.evict_on_idle,
        metrics_port = config.metrics_port,
        "Configuration loaded"
    );
    for widget in Widget::all() {
        tracing::debug!(
            %widget,
            interval_ms = config.refresh.interval(*widget).as_millis(),
            "Refresh cadence"
        );
    }
}

/// Load .env file from any ancestor directory.
fn load_dotenv_from_ancestors() {
    if let Ok(cwd) = std::env::current_dir() {
        let mut dir = cwd.as_path();
        while let Some(parent) = dir.parent() {
            let env_path = parent.join(".env");
            if env_path.exists() {
                let _ = dotenvy::from_path(&env_path);
                return;
            }
            dir = parent;
        }
    }
}

/// Wait for shutdown signal (SIGTERM or SIGINT).
#[allow(clippy::expect_used)]
async fn await_shutdown(shutdown_token: CancellationToken) {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("signal handler installation is critical for graceful shutdown");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("SIGTERM handler installation is critical for graceful shutdown")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, initiating shutdown");
        }
    }

    shutdown_token.cancel();

    tracing::info!(
        timeout_secs = SHUTDOWN_TIMEOUT.as_secs(),
        "Graceful shutdown started"
    );
}
