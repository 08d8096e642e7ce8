//! Day-Scoped Resources
//!
//! Some resources are parameterised by today's date, such as the reserved
//! order list. A [`DailyResource`] holds the subscription for one day and
//! moves it to the next day's key when the date rolls over.

use std::fmt;
use std::time::Duration;

use chrono::NaiveDate;
use tracing::info;

use super::engine::{CachedResource, SyncEngine};
use crate::domain::cache::{CacheKey, CacheValue};

type KeyForDay = Box<dyn Fn(NaiveDate) -> CacheKey + Send + Sync>;

/// Cached resource whose key follows the calendar date.
pub struct DailyResource<V: CacheValue> {
    engine: SyncEngine<V>,
    key_for: KeyForDay,
    interval: Duration,
    day: NaiveDate,
    resource: CachedResource<V>,
}

impl<V: CacheValue> DailyResource<V> {
    /// Subscribe to the key `key_for(day)` every `interval`.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new<F>(engine: SyncEngine<V>, interval: Duration, day: NaiveDate, key_for: F) -> Self
    where
        F: Fn(NaiveDate) -> CacheKey + Send + Sync + 'static,
    {
        let resource = engine.use_cached_resource(key_for(day), interval);
        Self {
            engine,
            key_for: Box::new(key_for),
            interval,
            day,
            resource,
        }
    }

    /// Day currently subscribed.
    #[must_use]
    pub const fn day(&self) -> NaiveDate {
        self.day
    }

    /// Subscription for the current day.
    #[must_use]
    pub const fn resource(&self) -> &CachedResource<V> {
        &self.resource
    }

    /// Mutable access, for awaiting [`CachedResource::changed`].
    pub const fn resource_mut(&mut self) -> &mut CachedResource<V> {
        &mut self.resource
    }

    /// Follow the calendar to `day`.
    ///
    /// The new day's key is subscribed before the old one is released.
    /// Returns `true` if the key changed.
    pub fn roll_to(&mut self, day: NaiveDate) -> bool {
        if day == self.day {
            return false;
        }
        let next = self
            .engine
            .use_cached_resource((self.key_for)(day), self.interval);
        info!(from = %self.day, to = %day, key = %next.key(), "daily resource rolled over");
        drop(std::mem::replace(&mut self.resource, next));
        self.day = day;
        true
    }
}

impl<V: CacheValue> fmt::Debug for DailyResource<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DailyResource")
            .field("day", &self.day)
            .field("key", self.resource.key())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Arc;

    use async_trait::async_trait;
    use parking_lot::Mutex;

    use super::*;
    use crate::application::ports::Fetcher;
    use crate::application::services::EngineConfig;
    use crate::domain::cache::FetchError;
    use crate::domain::dashboard::reserved_orders_for_day;

    #[derive(Default)]
    struct CallsByKey {
        calls: Mutex<HashMap<CacheKey, usize>>,
    }

    #[async_trait]
    impl Fetcher<usize> for CallsByKey {
        async fn fetch(&self, key: &CacheKey) -> Result<usize, FetchError> {
            let mut calls = self.calls.lock();
            let count = calls.entry(key.clone()).or_default();
            *count += 1;
            Ok(*count)
        }
    }

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 3, d).unwrap()
    }

    fn setup() -> (Arc<CallsByKey>, SyncEngine<usize>) {
        let fetcher = Arc::new(CallsByKey::default());
        let engine = SyncEngine::<usize>::new(
            fetcher.clone(),
            EngineConfig {
                linger: Duration::ZERO,
                evict_on_idle: true,
            },
        );
        (fetcher, engine)
    }

    #[tokio::test(start_paused = true)]
    async fn same_day_keeps_the_subscription() {
        let (fetcher, engine) = setup();
        let mut daily = DailyResource::new(engine.clone(), Duration::from_secs(30), day(11), |d| {
            reserved_orders_for_day("NASD", d)
        });
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert!(!daily.roll_to(day(11)));
        assert_eq!(daily.resource().key(), &reserved_orders_for_day("NASD", day(11)));
        assert_eq!(fetcher.calls.lock().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn rollover_moves_to_the_new_day() {
        let (fetcher, engine) = setup();
        let mut daily = DailyResource::new(engine.clone(), Duration::from_secs(30), day(11), |d| {
            reserved_orders_for_day("NASD", d)
        });
        let yesterday = reserved_orders_for_day("NASD", day(11));
        let today = reserved_orders_for_day("NASD", day(12));
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert!(daily.roll_to(day(12)));
        assert_eq!(daily.day(), day(12));
        assert_eq!(daily.resource().key(), &today);
        assert_eq!(engine.subscriber_count(&yesterday), 0);
        assert_eq!(engine.subscriber_count(&today), 1);
        assert_eq!(engine.effective_interval(&yesterday), None);
        assert_eq!(engine.effective_interval(&today), Some(Duration::from_secs(30)));

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(daily.resource().state().value, Some(1));
        assert_eq!(fetcher.calls.lock().get(&today), Some(&1));
    }
}
