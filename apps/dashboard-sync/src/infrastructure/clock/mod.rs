//! Session Ticker
//!
//! Drives the market session clock once per second and publishes the latest
//! snapshot on a watch channel. Transitions between sessions are logged.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::domain::session::{SessionSnapshot, session_state};

/// Source of the current time.
pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// Default tick period.
pub const DEFAULT_TICK: Duration = Duration::from_secs(1);

/// Periodic driver of [`session_state`].
///
/// # Example
///
/// ```rust,no_run
/// use dashboard_sync::infrastructure::clock::SessionTicker;
/// use tokio_util::sync::CancellationToken;
///
/// async fn example() {
///     let cancel = CancellationToken::new();
///     let (ticker, mut sessions) = SessionTicker::new(cancel.clone());
///     tokio::spawn(ticker.run());
///
///     while sessions.changed().await.is_ok() {
///         let snapshot = *sessions.borrow_and_update();
///         println!("{} at {}", snapshot.state, snapshot.market_time);
///     }
/// }
/// ```
pub struct SessionTicker {
    clock: Clock,
    period: Duration,
    tx: watch::Sender<SessionSnapshot>,
    cancel: CancellationToken,
}

impl SessionTicker {
    /// Create a ticker on the system clock.
    #[must_use]
    pub fn new(cancel: CancellationToken) -> (Self, watch::Receiver<SessionSnapshot>) {
        Self::with_clock(Arc::new(Utc::now), DEFAULT_TICK, cancel)
    }

    /// Create a ticker reading `clock` every `period`.
    #[must_use]
    pub fn with_clock(
        clock: Clock,
        period: Duration,
        cancel: CancellationToken,
    ) -> (Self, watch::Receiver<SessionSnapshot>) {
        let (tx, rx) = watch::channel(session_state(clock()));
        (
            Self {
                clock,
                period,
                tx,
                cancel,
            },
            rx,
        )
    }

    /// Run until cancelled.
    pub async fn run(self) {
        let mut interval = tokio::time::interval(self.period);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        let initial = *self.tx.borrow();
        tracing::info!(
            session = %initial.state,
            market_time = %initial.market_time.format("%H:%M:%S %Z"),
            operator_time = %initial.operator_time.format("%H:%M:%S %Z"),
            "Market session"
        );

        loop {
            tokio::select! {
                () = self.cancel.cancelled() => {
                    tracing::debug!("Session ticker cancelled");
                    break;
                }
                _ = interval.tick() => self.tick(),
            }
        }
    }

    fn tick(&self) {
        let snapshot = session_state((self.clock)());
        let previous = self.tx.send_replace(snapshot);
        if previous.state != snapshot.state {
            tracing::info!(
                from = %previous.state,
                to = %snapshot.state,
                market_time = %snapshot.market_time.format("%H:%M:%S %Z"),
                "Market session changed"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use parking_lot::Mutex;

    use super::*;
    use crate::domain::session::SessionState;

    fn manual_clock(start: DateTime<Utc>) -> (Arc<Mutex<DateTime<Utc>>>, Clock) {
        let now = Arc::new(Mutex::new(start));
        let reader = Arc::clone(&now);
        (now, Arc::new(move || *reader.lock()))
    }

    #[test]
    fn initial_snapshot_is_published() {
        // 2025-03-11 13:00 UTC is 09:00 EDT.
        let start = Utc.with_ymd_and_hms(2025, 3, 11, 13, 0, 0).unwrap();
        let (_now, clock) = manual_clock(start);
        let (_ticker, rx) = SessionTicker::with_clock(clock, DEFAULT_TICK, CancellationToken::new());

        assert_eq!(rx.borrow().state, SessionState::PreMarket);
    }

    #[tokio::test(start_paused = true)]
    async fn publishes_transitions() {
        let start = Utc.with_ymd_and_hms(2025, 3, 11, 13, 29, 59).unwrap();
        let (now, clock) = manual_clock(start);
        let cancel = CancellationToken::new();
        let (ticker, mut rx) = SessionTicker::with_clock(clock, DEFAULT_TICK, cancel.clone());
        let handle = tokio::spawn(ticker.run());

        // 09:30:00 EDT
        *now.lock() = Utc.with_ymd_and_hms(2025, 3, 11, 13, 30, 0).unwrap();
        tokio::time::sleep(Duration::from_millis(1_500)).await;

        assert_eq!(rx.borrow_and_update().state, SessionState::Regular);

        cancel.cancel();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn stops_when_cancelled() {
        let cancel = CancellationToken::new();
        let (ticker, _rx) = SessionTicker::new(cancel.clone());
        let handle = tokio::spawn(ticker.run());

        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
