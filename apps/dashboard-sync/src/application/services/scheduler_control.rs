//! Scheduler Control
//!
//! Operator-facing wrapper around the remote buy/sell schedulers. Each
//! action identity runs at most once at a time; a successful action forces
//! the scheduler status to refresh, and every outcome is reported through
//! the notification sink.

use std::slice;
use std::sync::Arc;

use thiserror::Error;
use tracing::{info, warn};

use super::engine::SyncEngine;
use crate::application::ports::{NotificationKind, NotificationSink, RemoteActions};
use crate::domain::action::{InFlightActions, SchedulerAction};
use crate::domain::cache::{CacheKey, CacheValue, FetchError};
use crate::infrastructure::metrics;

/// Headline shown when an action fails.
pub const ACTION_FAILED_TEXT: &str = "Error while running the action";

/// Scheduler control errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ControlError {
    /// The same action is still outstanding.
    #[error("{0} is already in progress")]
    ActionInFlight(SchedulerAction),

    /// The backend rejected or failed the action.
    #[error("action failed: {0}")]
    Action(#[from] FetchError),
}

/// Runs scheduler actions with double-submission protection.
pub struct SchedulerControl<V: CacheValue> {
    engine: SyncEngine<V>,
    remote: Arc<dyn RemoteActions>,
    sink: Arc<dyn NotificationSink>,
    in_flight: InFlightActions,
    status_key: CacheKey,
}

impl<V: CacheValue> SchedulerControl<V> {
    /// Create a controller that refreshes `status_key` after each action.
    pub fn new(
        engine: SyncEngine<V>,
        remote: Arc<dyn RemoteActions>,
        sink: Arc<dyn NotificationSink>,
        status_key: CacheKey,
    ) -> Self {
        Self {
            engine,
            remote,
            sink,
            in_flight: InFlightActions::new(),
            status_key,
        }
    }

    /// Whether `action` is outstanding.
    #[must_use]
    pub fn is_busy(&self, action: SchedulerAction) -> bool {
        self.in_flight.is_busy(&action)
    }

    /// Actions currently outstanding.
    #[must_use]
    pub fn busy(&self) -> Vec<SchedulerAction> {
        self.in_flight.busy()
    }

    /// Perform `action` and refresh the scheduler status.
    ///
    /// # Errors
    ///
    /// Returns [`ControlError::ActionInFlight`] without contacting the
    /// backend if the same action is still running, or
    /// [`ControlError::Action`] if the backend call fails. A failed status
    /// refresh does not fail the action.
    pub async fn run(&self, action: SchedulerAction) -> Result<(), ControlError> {
        let Some(permit) = self.in_flight.try_begin(action) else {
            metrics::record_action_rejected(action);
            warn!(%action, "action already in progress, ignoring");
            return Err(ControlError::ActionInFlight(action));
        };

        info!(%action, "performing scheduler action");
        let result = self
            .engine
            .trigger(self.remote.perform(action), slice::from_ref(&self.status_key))
            .await;
        drop(permit);

        match result {
            Ok(()) => {
                metrics::record_action(action, true);
                info!(%action, "scheduler action succeeded");
                self.sink
                    .notify(NotificationKind::Success, action.success_message(), None);
                Ok(())
            }
            Err(error) => {
                metrics::record_action(action, false);
                warn!(%action, error = %error, "scheduler action failed");
                self.sink
                    .notify(NotificationKind::Error, ACTION_FAILED_TEXT, Some(error.message()));
                Err(ControlError::Action(error))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use mockall::predicate::eq;
    use parking_lot::Mutex;
    use tokio::sync::Semaphore;

    use super::*;
    use crate::application::ports::{Fetcher, MockRemoteActions, Notification};
    use crate::application::services::EngineConfig;

    struct StatusFetcher {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Fetcher<usize> for StatusFetcher {
        async fn fetch(&self, _key: &CacheKey) -> Result<usize, FetchError> {
            Ok(self.calls.fetch_add(1, Ordering::SeqCst) + 1)
        }
    }

    #[derive(Default)]
    struct RecordingSink {
        seen: Mutex<Vec<Notification>>,
    }

    impl NotificationSink for RecordingSink {
        fn notify(&self, kind: NotificationKind, text: &str, detail: Option<&str>) {
            self.seen.lock().push(Notification {
                kind,
                text: text.to_string(),
                detail: detail.map(str::to_string),
            });
        }
    }

    /// Holds every action until released.
    struct GatedRemote {
        gate: Semaphore,
    }

    #[async_trait]
    impl RemoteActions for GatedRemote {
        async fn perform(&self, _action: SchedulerAction) -> Result<(), FetchError> {
            let permit = self
                .gate
                .acquire()
                .await
                .map_err(|e| FetchError::Transport(e.to_string()))?;
            permit.forget();
            Ok(())
        }
    }

    fn status_key() -> CacheKey {
        CacheKey::new("/stocks/recommendations/scheduler/status")
    }

    fn setup(
        remote: Arc<dyn RemoteActions>,
    ) -> (Arc<StatusFetcher>, Arc<RecordingSink>, SchedulerControl<usize>) {
        let fetcher = Arc::new(StatusFetcher {
            calls: AtomicUsize::new(0),
        });
        let engine = SyncEngine::<usize>::new(fetcher.clone(), EngineConfig::default());
        let sink = Arc::new(RecordingSink::default());
        let control = SchedulerControl::new(engine, remote, sink.clone(), status_key());
        (fetcher, sink, control)
    }

    #[tokio::test]
    async fn success_refreshes_status_and_notifies() {
        let mut remote = MockRemoteActions::new();
        remote
            .expect_perform()
            .with(eq(SchedulerAction::StartBuy))
            .times(1)
            .returning(|_| Ok(()));
        let (fetcher, sink, control) = setup(Arc::new(remote));

        control.run(SchedulerAction::StartBuy).await.unwrap();

        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 1);
        assert_eq!(
            *sink.seen.lock(),
            vec![Notification {
                kind: NotificationKind::Success,
                text: "Buy scheduler started".into(),
                detail: None,
            }]
        );
        assert!(!control.is_busy(SchedulerAction::StartBuy));
    }

    #[tokio::test]
    async fn failure_propagates_and_skips_refresh() {
        let mut remote = MockRemoteActions::new();
        remote.expect_perform().times(1).returning(|_| {
            Err(FetchError::Protocol {
                status: 400,
                message: "scheduler already running".into(),
            })
        });
        let (fetcher, sink, control) = setup(Arc::new(remote));

        let err = control.run(SchedulerAction::StartSell).await.unwrap_err();

        assert!(matches!(err, ControlError::Action(FetchError::Protocol { status: 400, .. })));
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 0);
        let seen = sink.seen.lock();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].kind, NotificationKind::Error);
        assert_eq!(seen[0].detail.as_deref(), Some("scheduler already running"));
        drop(seen);
        assert!(!control.is_busy(SchedulerAction::StartSell));
    }

    #[tokio::test]
    async fn same_action_is_not_submitted_twice() {
        let remote = Arc::new(GatedRemote { gate: Semaphore::new(0) });
        let (_fetcher, sink, control) = setup(remote.clone());
        let control = Arc::new(control);

        let first = tokio::spawn({
            let control = Arc::clone(&control);
            async move { control.run(SchedulerAction::BuyNow).await }
        });
        while !control.is_busy(SchedulerAction::BuyNow) {
            tokio::task::yield_now().await;
        }

        assert_eq!(
            control.run(SchedulerAction::BuyNow).await,
            Err(ControlError::ActionInFlight(SchedulerAction::BuyNow))
        );
        assert_eq!(control.busy(), vec![SchedulerAction::BuyNow]);

        remote.gate.add_permits(1);
        tokio::time::timeout(Duration::from_secs(5), first)
            .await
            .unwrap()
            .unwrap()
            .unwrap();

        assert!(!control.is_busy(SchedulerAction::BuyNow));
        assert_eq!(sink.seen.lock().len(), 1);
    }

    #[tokio::test]
    async fn different_actions_run_concurrently() {
        let remote = Arc::new(GatedRemote { gate: Semaphore::new(0) });
        let (_fetcher, _sink, control) = setup(remote.clone());
        let control = Arc::new(control);

        let buy = tokio::spawn({
            let control = Arc::clone(&control);
            async move { control.run(SchedulerAction::StartBuy).await }
        });
        let sell = tokio::spawn({
            let control = Arc::clone(&control);
            async move { control.run(SchedulerAction::StartSell).await }
        });
        while control.busy().len() < 2 {
            tokio::task::yield_now().await;
        }

        remote.gate.add_permits(2);
        buy.await.unwrap().unwrap();
        sell.await.unwrap().unwrap();
    }
}
