//! Subscription Registry
//!
//! Tracks which consumers are interested in which cache key and fans the
//! store's change feed out to them.
//!
//! # Design
//!
//! The registry tracks:
//! - Per-key subscriber callbacks, kept in registration order
//! - Per-key subscriber counts for statistics
//!
//! Many consumers may watch the same key; each change to that key is
//! delivered to every current subscriber exactly once, in the order the
//! store applied the changes.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;

use super::cache::{CacheEntry, CacheKey, ChangeListener};

// =============================================================================
// Types
// =============================================================================

/// Unique identifier for a subscription.
pub type SubscriptionId = u64;

/// Callback invoked with the new entry after every change to a key.
pub type ChangeCallback<V> = Arc<dyn Fn(&CacheEntry<V>) + Send + Sync>;

// =============================================================================
// Subscriber Registry
// =============================================================================

/// Registry of change callbacks keyed by cache key.
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
/// use std::sync::atomic::{AtomicUsize, Ordering};
///
/// use dashboard_sync::domain::cache::{CacheEntry, CacheKey, ChangeListener};
/// use dashboard_sync::domain::subscription::SubscriberRegistry;
///
/// let registry = SubscriberRegistry::<u32>::new();
/// let key = CacheKey::new("/balance/overseas");
/// let seen = Arc::new(AtomicUsize::new(0));
///
/// let counter = Arc::clone(&seen);
/// let id = registry.register(&key, Arc::new(move |_: &CacheEntry<u32>| {
///     counter.fetch_add(1, Ordering::SeqCst);
/// }));
///
/// registry.on_change(&key, &CacheEntry::default());
/// assert_eq!(seen.load(Ordering::SeqCst), 1);
///
/// registry.unregister(&key, id);
/// registry.on_change(&key, &CacheEntry::default());
/// assert_eq!(seen.load(Ordering::SeqCst), 1);
/// ```
pub struct SubscriberRegistry<V> {
    next_id: AtomicU64,
    subscribers: RwLock<HashMap<CacheKey, BTreeMap<SubscriptionId, ChangeCallback<V>>>>,
}

impl<V> Default for SubscriberRegistry<V> {
    fn default() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            subscribers: RwLock::new(HashMap::new()),
        }
    }
}

impl<V> SubscriberRegistry<V> {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a callback for `key`.
    ///
    /// Ids increase monotonically, so iteration order is registration order.
    pub fn register(&self, key: &CacheKey, callback: ChangeCallback<V>) -> SubscriptionId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.subscribers
            .write()
            .entry(key.clone())
            .or_default()
            .insert(id, callback);
        id
    }

    /// Remove a callback.
    ///
    /// Returns the number of subscribers left on `key`, or `None` if the
    /// subscription was not registered.
    pub fn unregister(&self, key: &CacheKey, id: SubscriptionId) -> Option<usize> {
        let mut subscribers = self.subscribers.write();
        let callbacks = subscribers.get_mut(key)?;
        callbacks.remove(&id)?;

        let remaining = callbacks.len();
        if remaining == 0 {
            subscribers.remove(key);
        }
        Some(remaining)
    }

    /// Number of subscribers on `key`.
    #[must_use]
    pub fn subscriber_count(&self, key: &CacheKey) -> usize {
        self.subscribers.read().get(key).map_or(0, BTreeMap::len)
    }

    /// Keys with at least one subscriber.
    #[must_use]
    pub fn active_keys(&self) -> Vec<CacheKey> {
        self.subscribers.read().keys().cloned().collect()
    }

    /// Registry statistics.
    #[must_use]
    pub fn stats(&self) -> SubscriptionStats {
        let subscribers = self.subscribers.read();
        SubscriptionStats {
            key_count: subscribers.len(),
            subscription_count: subscribers.values().map(BTreeMap::len).sum(),
        }
    }

    fn callbacks(&self, key: &CacheKey) -> Vec<ChangeCallback<V>> {
        self.subscribers
            .read()
            .get(key)
            .map(|callbacks| callbacks.values().cloned().collect())
            .unwrap_or_default()
    }
}

impl<V: Send + Sync> ChangeListener<V> for SubscriberRegistry<V> {
    fn on_change(&self, key: &CacheKey, entry: &CacheEntry<V>) {
        // Callbacks run without the registry lock so they may subscribe or
        // unsubscribe from inside the callback.
        for callback in self.callbacks(key) {
            callback(entry);
        }
    }
}

// =============================================================================
// Statistics
// =============================================================================

/// Subscription statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SubscriptionStats {
    /// Number of keys with subscribers.
    pub key_count: usize,
    /// Number of subscriptions across all keys.
    pub subscription_count: usize,
}

// =============================================================================
// Tests
// =============================================================================
