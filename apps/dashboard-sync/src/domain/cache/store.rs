//! Cache Store
//!
//! Key-addressed map of cache entries with a change feed. The store never
//! performs I/O; fetches are driven from the application layer.
//!
//! # Ordering
//!
//! Every [`CacheStore::set`] merges the update and then delivers the new
//! entry to all registered listeners while holding a reentrant ordering
//! lock. Writers on other threads wait for delivery to finish, so listeners
//! observe changes in exactly the order they were applied. A listener may
//! write back into the store from its callback (same thread, nested
//! delivery). Listeners must not block on work that itself needs to write
//! to the store from another thread.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::{Mutex, ReentrantMutex, RwLock};

use super::{CacheEntry, CacheKey, EntryUpdate};

/// Consumer of the store's change feed.
pub trait ChangeListener<V>: Send + Sync {
    /// Called once for every applied change, in application order.
    fn on_change(&self, key: &CacheKey, entry: &CacheEntry<V>);
}

/// Thread-safe map from [`CacheKey`] to [`CacheEntry`].
pub struct CacheStore<V> {
    entries: Mutex<HashMap<CacheKey, CacheEntry<V>>>,
    listeners: RwLock<Vec<Arc<dyn ChangeListener<V>>>>,
    ordering: ReentrantMutex<()>,
}

impl<V> Default for CacheStore<V> {
    fn default() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            listeners: RwLock::new(Vec::new()),
            ordering: ReentrantMutex::new(()),
        }
    }
}

impl<V: Clone> CacheStore<V> {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a change feed consumer.
    pub fn add_listener(&self, listener: Arc<dyn ChangeListener<V>>) {
        self.listeners.write().push(listener);
    }

    /// Snapshot of the entry for `key`.
    #[must_use]
    pub fn get(&self, key: &CacheKey) -> Option<CacheEntry<V>> {
        self.entries.lock().get(key).cloned()
    }

    /// Merge `update` into the entry for `key`, creating it if absent, and
    /// emit the resulting entry on the change feed.
    pub fn set(&self, key: &CacheKey, update: EntryUpdate<V>) -> CacheEntry<V> {
        let _order = self.ordering.lock();
        let snapshot = {
            let mut entries = self.entries.lock();
            let entry = entries.entry(key.clone()).or_default();
            entry.apply(update);
            entry.clone()
        };
        self.emit(key, &snapshot);
        snapshot
    }

    /// Like [`set`](Self::set) but only if an entry already exists.
    ///
    /// Used by fetch completions so that a result arriving after eviction
    /// does not resurrect an entry nobody is watching.
    pub fn update(&self, key: &CacheKey, update: EntryUpdate<V>) -> Option<CacheEntry<V>> {
        let _order = self.ordering.lock();
        let snapshot = {
            let mut entries = self.entries.lock();
            let entry = entries.get_mut(key)?;
            entry.apply(update);
            entry.clone()
        };
        self.emit(key, &snapshot);
        Some(snapshot)
    }

    /// Remove the entry for `key`.
    pub fn delete(&self, key: &CacheKey) -> Option<CacheEntry<V>> {
        self.entries.lock().remove(key)
    }

    /// Remove the entry only if it has no subscribers.
    ///
    /// Returns `true` if an entry was removed.
    pub fn remove_idle(&self, key: &CacheKey) -> bool {
        let mut entries = self.entries.lock();
        if entries.get(key).is_some_and(|entry| entry.subscriber_count == 0) {
            entries.remove(key);
            return true;
        }
        false
    }

    /// Increment the subscriber count, creating the entry lazily.
    ///
    /// Subscriber bookkeeping is not a data change and is not emitted.
    pub fn acquire(&self, key: &CacheKey) -> usize {
        let mut entries = self.entries.lock();
        let entry = entries.entry(key.clone()).or_default();
        entry.subscriber_count += 1;
        entry.subscriber_count
    }

    /// Decrement the subscriber count. Returns the remaining count.
    pub fn release(&self, key: &CacheKey) -> usize {
        let mut entries = self.entries.lock();
        entries.get_mut(key).map_or(0, |entry| {
            entry.subscriber_count = entry.subscriber_count.saturating_sub(1);
            entry.subscriber_count
        })
    }

    /// Current subscriber count for `key` (zero if absent).
    #[must_use]
    pub fn subscriber_count(&self, key: &CacheKey) -> usize {
        self.entries
            .lock()
            .get(key)
            .map_or(0, |entry| entry.subscriber_count)
    }

    /// Run `f` with change delivery held off.
    ///
    /// No change event is delivered to listeners while `f` runs, which lets
    /// a caller register interest and read a snapshot without missing or
    /// double-seeing an event in between.
    pub fn exclusive<R>(&self, f: impl FnOnce() -> R) -> R {
        let _order = self.ordering.lock();
        f()
    }

    /// Number of cached entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Whether the store is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// All keys currently cached.
    #[must_use]
    pub fn keys(&self) -> Vec<CacheKey> {
        self.entries.lock().keys().cloned().collect()
    }

    fn emit(&self, key: &CacheKey, entry: &CacheEntry<V>) {
        let listeners = self.listeners.read().clone();
        for listener in &listeners {
            listener.on_change(key, entry);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use chrono::Utc;

    use super::*;
    use crate::domain::cache::FetchError;

    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<(CacheKey, CacheEntry<i32>)>>,
    }

    impl ChangeListener<i32> for Recorder {
        fn on_change(&self, key: &CacheKey, entry: &CacheEntry<i32>) {
            self.events.lock().push((key.clone(), entry.clone()));
        }
    }

    fn key(name: &str) -> CacheKey {
        CacheKey::new(name)
    }

    #[test]
    fn get_absent_returns_none() {
        let store: CacheStore<i32> = CacheStore::new();
        assert!(store.get(&key("/a")).is_none());
        assert!(store.is_empty());
    }

    #[test]
    fn set_creates_and_merges() {
        let store = CacheStore::new();
        store.set(&key("/a"), EntryUpdate::fetch_started());
        let entry = store.set(&key("/a"), EntryUpdate::fetch_succeeded(10, Utc::now()));

        assert_eq!(entry.value, Some(10));
        assert!(!entry.is_validating);
        assert_eq!(store.get(&key("/a")), Some(entry));
    }

    #[test]
    fn every_set_is_emitted_in_order() {
        let store = CacheStore::new();
        let recorder = Arc::new(Recorder::default());
        store.add_listener(recorder.clone());

        store.set(&key("/a"), EntryUpdate::fetch_started());
        store.set(&key("/a"), EntryUpdate::fetch_succeeded(1, Utc::now()));
        store.set(
            &key("/a"),
            EntryUpdate::fetch_failed(FetchError::Decode("bad".to_string())),
        );

        let events = recorder.events.lock();
        assert_eq!(events.len(), 3);
        assert!(events[0].1.is_validating);
        assert_eq!(events[1].1.value, Some(1));
        assert!(events[2].1.error.is_some());
        assert_eq!(events[2].1.value, Some(1));
    }

    #[test]
    fn update_skips_missing_entries() {
        let store = CacheStore::new();
        let recorder = Arc::new(Recorder::default());
        store.add_listener(recorder.clone());

        assert!(store.update(&key("/gone"), EntryUpdate::optimistic(3)).is_none());
        assert!(store.get(&key("/gone")).is_none());
        assert!(recorder.events.lock().is_empty());
    }

    #[test]
    fn subscriber_counting_is_not_emitted() {
        let store: CacheStore<i32> = CacheStore::new();
        let recorder = Arc::new(Recorder::default());
        store.add_listener(recorder.clone());

        assert_eq!(store.acquire(&key("/a")), 1);
        assert_eq!(store.acquire(&key("/a")), 2);
        assert_eq!(store.release(&key("/a")), 1);
        assert_eq!(store.subscriber_count(&key("/a")), 1);
        assert!(recorder.events.lock().is_empty());
    }

    #[test]
    fn release_unknown_key_is_zero() {
        let store: CacheStore<i32> = CacheStore::new();
        assert_eq!(store.release(&key("/nope")), 0);
    }

    #[test]
    fn remove_idle_respects_subscribers() {
        let store: CacheStore<i32> = CacheStore::new();
        store.acquire(&key("/a"));

        assert!(!store.remove_idle(&key("/a")));
        store.release(&key("/a"));
        assert!(store.remove_idle(&key("/a")));
        assert!(store.get(&key("/a")).is_none());
    }

    #[test]
    fn delete_removes_entry() {
        let store = CacheStore::new();
        store.set(&key("/a"), EntryUpdate::optimistic(1));
        assert_eq!(store.delete(&key("/a")).and_then(|e| e.value), Some(1));
        assert_eq!(store.len(), 0);
    }

    #[test]
    fn listener_may_write_back_reentrantly() {
        struct Echo {
            store: Arc<CacheStore<i32>>,
        }

        impl ChangeListener<i32> for Echo {
            fn on_change(&self, key: &CacheKey, entry: &CacheEntry<i32>) {
                if key.endpoint() == "/source" {
                    if let Some(value) = entry.value {
                        self.store
                            .set(&CacheKey::new("/mirror"), EntryUpdate::optimistic(value));
                    }
                }
            }
        }

        let store = Arc::new(CacheStore::new());
        store.add_listener(Arc::new(Echo {
            store: Arc::clone(&store),
        }));

        store.set(&key("/source"), EntryUpdate::optimistic(9));

        assert_eq!(store.get(&key("/mirror")).and_then(|e| e.value), Some(9));
    }

    #[test]
    fn concurrent_writers_lose_no_updates() {
        let store = Arc::new(CacheStore::new());
        let recorder = Arc::new(Recorder::default());
        store.add_listener(recorder.clone());

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let store = Arc::clone(&store);
                thread::spawn(move || {
                    for j in 0..50 {
                        store.set(&key("/shared"), EntryUpdate::optimistic(i * 100 + j));
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        let events = recorder.events.lock();
        assert_eq!(events.len(), 400);
        // The last delivered event matches the final stored state.
        assert_eq!(
            events.last().and_then(|(_, e)| e.value),
            store.get(&key("/shared")).and_then(|e| e.value)
        );
    }
}
