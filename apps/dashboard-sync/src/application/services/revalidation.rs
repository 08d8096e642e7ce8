//! Revalidation Scheduling
//!
//! One repeating timer per key, firing at the fastest interval any current
//! subscriber asked for. A tick that finds a fetch already in flight is
//! dropped rather than queued.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use super::dedup::Deduplicator;
use crate::domain::cache::{CacheKey, CacheStore, CacheValue};
use crate::domain::subscription::SubscriptionId;
use crate::infrastructure::metrics;

#[derive(Default)]
struct KeySchedule {
    requests: HashMap<SubscriptionId, Duration>,
    armed: Option<ArmedTimer>,
}

impl KeySchedule {
    /// Fastest requested interval. Zero means "no polling" and never wins.
    fn effective_interval(&self) -> Option<Duration> {
        self.requests
            .values()
            .copied()
            .filter(|interval| !interval.is_zero())
            .min()
    }
}

struct ArmedTimer {
    interval: Duration,
    cancel: CancellationToken,
}

/// Per-key interval timers driving the deduplicator.
pub struct RevalidationScheduler<V> {
    dedup: Deduplicator<V>,
    store: Arc<CacheStore<V>>,
    shutdown: CancellationToken,
    schedules: Mutex<HashMap<CacheKey, KeySchedule>>,
}

impl<V: CacheValue> RevalidationScheduler<V> {
    /// Create a scheduler whose timers stop when `shutdown` is cancelled.
    pub fn new(
        dedup: Deduplicator<V>,
        store: Arc<CacheStore<V>>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            dedup,
            store,
            shutdown,
            schedules: Mutex::new(HashMap::new()),
        }
    }

    /// Record that subscription `id` wants `key` refreshed every `interval`,
    /// and re-arm the key's timer if the effective interval changed.
    ///
    /// A zero interval registers interest without polling.
    pub fn schedule(&self, key: &CacheKey, id: SubscriptionId, interval: Duration) {
        let mut schedules = self.schedules.lock();
        let schedule = schedules.entry(key.clone()).or_default();
        schedule.requests.insert(id, interval);
        self.rearm(key, schedule);
    }

    /// Withdraw the interval requested by `id`. The timer is disarmed once
    /// no requests remain for `key`.
    pub fn unschedule(&self, key: &CacheKey, id: SubscriptionId) {
        let mut schedules = self.schedules.lock();
        let Some(schedule) = schedules.get_mut(key) else {
            return;
        };
        schedule.requests.remove(&id);

        if schedule.requests.is_empty() {
            if let Some(timer) = schedules.remove(key).and_then(|s| s.armed) {
                timer.cancel.cancel();
                debug!(%key, "revalidation timer disarmed");
            }
        } else {
            self.rearm(key, schedule);
        }
    }

    /// Interval the key's timer is currently armed with.
    #[must_use]
    pub fn effective_interval(&self, key: &CacheKey) -> Option<Duration> {
        self.schedules
            .lock()
            .get(key)
            .and_then(|schedule| schedule.armed.as_ref())
            .map(|timer| timer.interval)
    }

    /// Number of keys with an armed timer.
    #[must_use]
    pub fn armed_count(&self) -> usize {
        self.schedules
            .lock()
            .values()
            .filter(|schedule| schedule.armed.is_some())
            .count()
    }

    fn rearm(&self, key: &CacheKey, schedule: &mut KeySchedule) {
        let wanted = schedule.effective_interval();
        if schedule.armed.as_ref().map(|timer| timer.interval) == wanted {
            return;
        }

        if let Some(previous) = schedule.armed.take() {
            previous.cancel.cancel();
        }

        let Some(interval) = wanted else {
            return;
        };
        let Ok(runtime) = Handle::try_current() else {
            warn!(%key, "no runtime available, revalidation timer not armed");
            return;
        };

        debug!(%key, interval_ms = interval.as_millis(), "revalidation timer armed");
        let cancel = self.shutdown.child_token();
        runtime.spawn(run_timer(
            self.dedup.clone(),
            Arc::clone(&self.store),
            key.clone(),
            interval,
            cancel.clone(),
        ));
        schedule.armed = Some(ArmedTimer { interval, cancel });
    }
}

impl<V> Drop for RevalidationScheduler<V> {
    fn drop(&mut self) {
        for schedule in self.schedules.get_mut().values() {
            if let Some(timer) = &schedule.armed {
                timer.cancel.cancel();
            }
        }
    }
}

async fn run_timer<V: CacheValue>(
    dedup: Deduplicator<V>,
    store: Arc<CacheStore<V>>,
    key: CacheKey,
    period: Duration,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            () = cancel.cancelled() => break,
            _ = ticker.tick() => {
                if dedup.is_in_flight(&key) {
                    let overdue = store
                        .get(&key)
                        .is_some_and(|entry| entry.is_overdue(period, Utc::now()));
                    if overdue {
                        debug!(%key, "revalidation overdue, fetch still in flight");
                    } else {
                        trace!(%key, "tick skipped, fetch in flight");
                    }
                    metrics::record_tick_skipped(overdue);
                } else {
                    trace!(%key, "revalidating");
                    drop(dedup.request(&key));
                }
            }
        }
    }
}
