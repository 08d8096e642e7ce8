//! Synchronization Engine
//!
//! Ties the cache store, subscriber registry, deduplicator, and revalidation
//! scheduler together behind the consumer-facing API:
//!
//! - [`SyncEngine::subscribe`] registers a change callback for a key
//! - [`SyncEngine::use_cached_resource`] wraps a subscription in a watchable
//!   handle with a render-ready [`ResourceView`]
//! - [`SyncEngine::mutate`] and [`SyncEngine::mutate_with`] force a refresh,
//!   optionally after writing an optimistic value
//! - [`SyncEngine::trigger`] performs a remote action and refreshes the keys
//!   that depend on it
//!
//! # Lifecycle
//!
//! Entries are created lazily by the first subscription. When the last
//! subscriber leaves, the key keeps polling for the configured linger window
//! so a quick re-subscription finds warm data; after that the timer is
//! disarmed and, if eviction is enabled, the entry is dropped.

use std::future::Future;
use std::sync::Arc;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::FutureExt;
use futures::future::{BoxFuture, join_all};
use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::dedup::{Deduplicator, SharedFetch};
use super::revalidation::RevalidationScheduler;
use crate::application::ports::Fetcher;
use crate::domain::cache::{CacheEntry, CacheKey, CacheStore, CacheValue, EntryUpdate, FetchError};
use crate::domain::subscription::{ChangeCallback, SubscriberRegistry, SubscriptionId};
use crate::infrastructure::metrics;

/// Default unsubscribe linger window.
pub const DEFAULT_LINGER: Duration = Duration::from_secs(2);

// =============================================================================
// Configuration
// =============================================================================

/// Engine tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineConfig {
    /// How long a key keeps polling after its last subscriber leaves.
    pub linger: Duration,
    /// Whether to drop the entry once the linger window ends.
    pub evict_on_idle: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            linger: DEFAULT_LINGER,
            evict_on_idle: true,
        }
    }
}

// =============================================================================
// Engine
// =============================================================================

struct EngineInner<V> {
    config: EngineConfig,
    store: Arc<CacheStore<V>>,
    registry: Arc<SubscriberRegistry<V>>,
    dedup: Deduplicator<V>,
    scheduler: RevalidationScheduler<V>,
    shutdown: CancellationToken,
    /// Latest release per idle key; only that release may evict.
    releases: Mutex<HashMap<CacheKey, u64>>,
    next_release: AtomicU64,
}

/// Polling cache engine. Cheap to clone; clones share all state.
pub struct SyncEngine<V> {
    inner: Arc<EngineInner<V>>,
}

impl<V> Clone for SyncEngine<V> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<V: CacheValue> SyncEngine<V> {
    /// Create an engine reading through `fetcher`.
    pub fn new(fetcher: Arc<dyn Fetcher<V>>, config: EngineConfig) -> Self {
        Self::with_shutdown(fetcher, config, CancellationToken::new())
    }

    /// Create an engine whose timers stop when `shutdown` is cancelled.
    pub fn with_shutdown(
        fetcher: Arc<dyn Fetcher<V>>,
        config: EngineConfig,
        shutdown: CancellationToken,
    ) -> Self {
        let store = Arc::new(CacheStore::new());
        let registry = Arc::new(SubscriberRegistry::new());
        store.add_listener(Arc::clone(&registry) as _);

        let dedup = Deduplicator::new(Arc::clone(&store), fetcher);
        let scheduler = RevalidationScheduler::new(dedup.clone(), Arc::clone(&store), shutdown.clone());

        Self {
            inner: Arc::new(EngineInner {
                config,
                store,
                registry,
                dedup,
                scheduler,
                shutdown,
                releases: Mutex::new(HashMap::new()),
                next_release: AtomicU64::new(0),
            }),
        }
    }

    /// Subscribe to changes of `key`, refreshing it every `interval`.
    ///
    /// `on_change` runs synchronously for every subsequent change to the
    /// entry, in the order the changes were applied. If no value has been
    /// cached yet a fetch starts immediately. A zero interval subscribes
    /// without polling.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn subscribe<F>(&self, key: CacheKey, interval: Duration, on_change: F) -> Subscription<V>
    where
        F: Fn(&CacheEntry<V>) + Send + Sync + 'static,
    {
        let callback: ChangeCallback<V> = Arc::new(on_change);
        self.attach(key, interval, |_| (callback, ())).0
    }

    /// Subscribe to `key` and expose its state as a watchable resource.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn use_cached_resource(&self, key: CacheKey, interval: Duration) -> CachedResource<V> {
        let (subscription, state) = self.attach(key, interval, |initial| {
            let (tx, rx) = watch::channel(ResourceState::from(initial));
            let callback: ChangeCallback<V> = Arc::new(move |entry: &CacheEntry<V>| {
                tx.send_replace(ResourceState::from(entry));
            });
            (callback, rx)
        });
        CachedResource {
            subscription,
            state,
        }
    }

    /// Refresh `key` now, bypassing its interval timer.
    ///
    /// Joins the fetch already in flight if there is one. The fetch runs
    /// whether or not the returned future is awaited; the outcome is also
    /// written to the entry.
    pub fn mutate(&self, key: &CacheKey) -> BoxFuture<'static, Result<(), FetchError>> {
        self.inner.dedup.request(key).map(|outcome| outcome.map(|_| ())).boxed()
    }

    /// Write `updater(current)` to `key` immediately, then refresh it.
    ///
    /// Subscribers see the optimistic value before the refresh is issued.
    /// A fetch already in flight started before the write, so its result is
    /// discarded and fetched again. If the refresh fails the optimistic value
    /// stays in place with the error set; only a successful fetch replaces
    /// it. Keys without an entry are only refreshed.
    pub fn mutate_with<F>(&self, key: &CacheKey, updater: F) -> BoxFuture<'static, Result<(), FetchError>>
    where
        F: FnOnce(Option<&V>) -> V,
    {
        let inner = &self.inner;
        inner.store.exclusive(|| {
            if let Some(entry) = inner.store.get(key) {
                let optimistic = updater(entry.value.as_ref());
                inner.store.update(key, EntryUpdate::optimistic(optimistic));
            }
            inner.dedup.supersede(key);
        });
        metrics::record_optimistic_update();
        debug!(%key, "optimistic update applied");
        self.mutate(key)
    }

    /// Refresh `key` now and return the fetched value.
    pub fn revalidate(&self, key: &CacheKey) -> SharedFetch<V> {
        self.inner.dedup.request(key)
    }

    /// Perform `action`, then refresh every key in `related`.
    ///
    /// Refreshes start only after the action succeeded, and a fetch that was
    /// already in flight when the action finished is not reused. Refresh
    /// failures are recorded on their entries and do not fail the trigger.
    ///
    /// # Errors
    ///
    /// Returns the action's error unchanged; nothing is refreshed in that case.
    pub async fn trigger<T, Fut>(&self, action: Fut, related: &[CacheKey]) -> Result<T, FetchError>
    where
        Fut: Future<Output = Result<T, FetchError>>,
    {
        let outcome = action.await?;

        let refreshes = join_all(related.iter().map(|key| self.refresh_after_action(key))).await;
        for (key, result) in related.iter().zip(refreshes) {
            if let Err(error) = result {
                warn!(%key, error = %error, "refresh after action failed");
            }
        }

        Ok(outcome)
    }

    /// Snapshot of the entry for `key`.
    #[must_use]
    pub fn entry(&self, key: &CacheKey) -> Option<CacheEntry<V>> {
        self.inner.store.get(key)
    }

    /// Interval the key's revalidation timer is armed with.
    #[must_use]
    pub fn effective_interval(&self, key: &CacheKey) -> Option<Duration> {
        self.inner.scheduler.effective_interval(key)
    }

    /// Whether a fetch for `key` is in flight.
    #[must_use]
    pub fn is_in_flight(&self, key: &CacheKey) -> bool {
        self.inner.dedup.is_in_flight(key)
    }

    /// Number of active subscriptions to `key`.
    #[must_use]
    pub fn subscriber_count(&self, key: &CacheKey) -> usize {
        self.inner.registry.subscriber_count(key)
    }

    /// Number of cached entries.
    #[must_use]
    pub fn cached_entries(&self) -> usize {
        self.inner.store.len()
    }

    /// Configuration the engine was built with.
    #[must_use]
    pub fn config(&self) -> EngineConfig {
        self.inner.config
    }

    /// Stop every revalidation timer and pending linger.
    pub fn shutdown(&self) {
        self.inner.shutdown.cancel();
    }

    fn attach<T>(
        &self,
        key: CacheKey,
        interval: Duration,
        make_callback: impl FnOnce(&CacheEntry<V>) -> (ChangeCallback<V>, T),
    ) -> (Subscription<V>, T) {
        let inner = &self.inner;

        // Registration and the initial snapshot happen with delivery held
        // off, so the subscriber neither misses nor double-sees a change.
        let (id, initial, extra) = inner.store.exclusive(|| {
            inner.store.acquire(&key);
            let initial = inner.store.get(&key).unwrap_or_default();
            let (callback, extra) = make_callback(&initial);
            let id = inner.registry.register(&key, callback);
            (id, initial, extra)
        });

        debug!(%key, id, interval_ms = interval.as_millis(), "subscribed");

        if !initial.has_value() {
            drop(inner.dedup.request(&key));
        }
        inner.scheduler.schedule(&key, id, interval);
        self.record_gauges();

        let subscription = Subscription {
            engine: self.clone(),
            key,
            id,
            active: AtomicBool::new(true),
            initial,
        };
        (subscription, extra)
    }

    fn release(&self, key: &CacheKey, id: SubscriptionId) {
        let inner = &self.inner;
        inner.registry.unregister(key, id);
        let remaining = inner.store.release(key);
        debug!(%key, id, remaining, "unsubscribed");

        if remaining > 0 {
            inner.scheduler.unschedule(key, id);
            self.record_gauges();
            return;
        }

        let release = inner.next_release.fetch_add(1, Ordering::Relaxed);
        inner.releases.lock().insert(key.clone(), release);

        let linger = inner.config.linger;
        match Handle::try_current() {
            Ok(runtime) if !linger.is_zero() => {
                let engine = self.clone();
                let key = key.clone();
                runtime.spawn(async move {
                    tokio::select! {
                        () = engine.inner.shutdown.cancelled() => {}
                        () = tokio::time::sleep(linger) => {}
                    }
                    engine.finish_release(&key, id, release);
                });
            }
            _ => self.finish_release(key, id, release),
        }
    }

    fn finish_release(&self, key: &CacheKey, id: SubscriptionId, release: u64) {
        let inner = &self.inner;
        inner.scheduler.unschedule(key, id);

        let latest = {
            let mut releases = inner.releases.lock();
            let latest = releases.get(key) == Some(&release);
            if latest {
                releases.remove(key);
            }
            latest
        };
        // A later release owns the rest of the linger window.
        if latest && inner.config.evict_on_idle && inner.store.remove_idle(key) {
            debug!(%key, "idle entry evicted");
        }
        self.record_gauges();
    }

    async fn refresh_after_action(&self, key: &CacheKey) -> Result<V, FetchError> {
        // A fetch in flight started before the action completed.
        self.inner.dedup.supersede(key);
        self.inner.dedup.request(key).await
    }

    fn record_gauges(&self) {
        metrics::set_active_subscriptions(self.inner.registry.stats().subscription_count);
        metrics::set_cached_entries(self.inner.store.len());
    }
}

// =============================================================================
// Subscription
// =============================================================================

/// Handle to an active subscription. Dropping it unsubscribes.
pub struct Subscription<V: CacheValue> {
    engine: SyncEngine<V>,
    key: CacheKey,
    id: SubscriptionId,
    active: AtomicBool,
    initial: CacheEntry<V>,
}

impl<V: CacheValue> Subscription<V> {
    /// Subscribed key.
    #[must_use]
    pub const fn key(&self) -> &CacheKey {
        &self.key
    }

    /// Subscription id.
    #[must_use]
    pub const fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Entry as it was when the subscription was registered.
    #[must_use]
    pub const fn initial(&self) -> &CacheEntry<V> {
        &self.initial
    }

    /// Whether the subscription is still registered.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Stop receiving changes. Calling this more than once has no effect.
    pub fn unsubscribe(&self) {
        if self.active.swap(false, Ordering::AcqRel) {
            self.engine.release(&self.key, self.id);
        }
    }
}

impl<V: CacheValue> Drop for Subscription<V> {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

impl<V: CacheValue> std::fmt::Debug for Subscription<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("key", &self.key)
            .field("id", &self.id)
            .field("active", &self.is_active())
            .finish_non_exhaustive()
    }
}

// =============================================================================
// Cached Resource
// =============================================================================

/// Consumer-facing snapshot of a cached resource.
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceState<V> {
    /// Last known value.
    pub value: Option<V>,
    /// Last fetch failure.
    pub error: Option<FetchError>,
    /// Whether a fetch is in flight.
    pub is_validating: bool,
    /// Time of the last successful fetch.
    pub updated_at: Option<DateTime<Utc>>,
}

impl<V: Clone> From<&CacheEntry<V>> for ResourceState<V> {
    fn from(entry: &CacheEntry<V>) -> Self {
        Self {
            value: entry.value.clone(),
            error: entry.error.clone(),
            is_validating: entry.is_validating,
            updated_at: entry.updated_at,
        }
    }
}

impl<V: Clone> ResourceState<V> {
    /// What a widget should render.
    ///
    /// A first-load failure is [`ResourceView::Failed`], never an empty
    /// value, and a failed refresh keeps showing the last good value.
    #[must_use]
    pub fn view(&self) -> ResourceView<V> {
        match (&self.value, &self.error) {
            (Some(value), error) => ResourceView::Ready {
                value: value.clone(),
                error: error.clone(),
                validating: self.is_validating,
            },
            (None, Some(error)) => ResourceView::Failed(error.clone()),
            (None, None) => ResourceView::Loading,
        }
    }
}

/// Render state of a cached resource.
#[derive(Debug, Clone, PartialEq)]
pub enum ResourceView<V> {
    /// Nothing fetched yet.
    Loading,
    /// The first fetch failed and there is no value to show.
    Failed(FetchError),
    /// A value is available, possibly stale.
    Ready {
        /// Last known value.
        value: V,
        /// Error from the most recent refresh, if it failed.
        error: Option<FetchError>,
        /// Whether a refresh is in flight.
        validating: bool,
    },
}

/// Watchable handle to a subscribed key. Dropping it unsubscribes.
pub struct CachedResource<V: CacheValue> {
    subscription: Subscription<V>,
    state: watch::Receiver<ResourceState<V>>,
}

impl<V: CacheValue> CachedResource<V> {
    /// Subscribed key.
    #[must_use]
    pub const fn key(&self) -> &CacheKey {
        self.subscription.key()
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> ResourceState<V> {
        self.state.borrow().clone()
    }

    /// Current render state.
    #[must_use]
    pub fn view(&self) -> ResourceView<V> {
        self.state.borrow().view()
    }

    /// Wait for the next change and return the new state.
    ///
    /// Returns `None` once the subscription has ended.
    pub async fn changed(&mut self) -> Option<ResourceState<V>> {
        self.state.changed().await.ok()?;
        Some(self.state.borrow_and_update().clone())
    }

    /// Refresh now, bypassing the interval.
    pub fn revalidate(&self) -> SharedFetch<V> {
        self.subscription.engine.revalidate(self.key())
    }

    /// Apply an optimistic value, then refresh.
    pub fn mutate_with<F>(&self, updater: F) -> BoxFuture<'static, Result<(), FetchError>>
    where
        F: FnOnce(Option<&V>) -> V,
    {
        self.subscription.engine.mutate_with(self.key(), updater)
    }

    /// End the subscription.
    pub fn unsubscribe(&self) {
        self.subscription.unsubscribe();
    }
}
