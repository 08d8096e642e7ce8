//! Cache Entries
//!
//! The cached state for one key and the partial updates merged into it.

use std::time::Duration;

use chrono::{DateTime, Utc};

use super::FetchError;

/// Cached state for one key.
///
/// `value` and `error` may both be present: that is "last known good value,
/// followed by a failed refresh".
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry<V> {
    /// Last successfully fetched (or optimistically applied) payload.
    pub value: Option<V>,
    /// Last fetch failure, cleared by the next successful fetch.
    pub error: Option<FetchError>,
    /// True while a fetch for this key is in flight.
    pub is_validating: bool,
    /// Time of the last successful fetch.
    pub updated_at: Option<DateTime<Utc>>,
    /// Number of active subscribers.
    pub subscriber_count: usize,
}

impl<V> Default for CacheEntry<V> {
    fn default() -> Self {
        Self {
            value: None,
            error: None,
            is_validating: false,
            updated_at: None,
            subscriber_count: 0,
        }
    }
}

impl<V> CacheEntry<V> {
    /// Merge a partial update. Only the fields present in `update` change.
    pub fn apply(&mut self, update: EntryUpdate<V>) {
        if let Some(value) = update.value {
            self.value = Some(value);
        }
        if let Some(error) = update.error {
            self.error = error;
        }
        if let Some(is_validating) = update.is_validating {
            self.is_validating = is_validating;
        }
        if let Some(updated_at) = update.updated_at {
            self.updated_at = Some(updated_at);
        }
    }

    /// Whether a value has ever been cached.
    #[must_use]
    pub const fn has_value(&self) -> bool {
        self.value.is_some()
    }

    /// Whether a revalidation at `interval` is overdue at `now`.
    ///
    /// Entries that were never fetched successfully are always overdue.
    #[must_use]
    pub fn is_overdue(&self, interval: Duration, now: DateTime<Utc>) -> bool {
        let Some(updated_at) = self.updated_at else {
            return true;
        };
        let Ok(interval) = chrono::Duration::from_std(interval) else {
            return false;
        };
        now.signed_duration_since(updated_at) > interval
    }
}

/// Partial update merged into a [`CacheEntry`].
///
/// `error` is doubly optional: `None` leaves the field untouched,
/// `Some(None)` clears it.
#[derive(Debug, Clone, PartialEq)]
pub struct EntryUpdate<V> {
    /// New value.
    pub value: Option<V>,
    /// New error state.
    pub error: Option<Option<FetchError>>,
    /// New validating flag.
    pub is_validating: Option<bool>,
    /// New success timestamp.
    pub updated_at: Option<DateTime<Utc>>,
}

impl<V> Default for EntryUpdate<V> {
    fn default() -> Self {
        Self {
            value: None,
            error: None,
            is_validating: None,
            updated_at: None,
        }
    }
}

impl<V> EntryUpdate<V> {
    /// An update that changes nothing.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A fetch for the key has started.
    #[must_use]
    pub fn fetch_started() -> Self {
        Self::new().validating(true)
    }

    /// A fetch succeeded: store the value and clear any previous error.
    #[must_use]
    pub fn fetch_succeeded(value: V, at: DateTime<Utc>) -> Self {
        Self {
            value: Some(value),
            error: Some(None),
            is_validating: Some(false),
            updated_at: Some(at),
        }
    }

    /// A fetch failed: record the error and keep the previous value.
    #[must_use]
    pub fn fetch_failed(error: FetchError) -> Self {
        Self::new().error(error).validating(false)
    }

    /// Optimistic value applied ahead of the network.
    #[must_use]
    pub fn optimistic(value: V) -> Self {
        Self::new().value(value)
    }

    /// Set the value.
    #[must_use]
    pub fn value(mut self, value: V) -> Self {
        self.value = Some(value);
        self
    }

    /// Set the error.
    #[must_use]
    pub fn error(mut self, error: FetchError) -> Self {
        self.error = Some(Some(error));
        self
    }

    /// Clear the error.
    #[must_use]
    pub fn clear_error(mut self) -> Self {
        self.error = Some(None);
        self
    }

    /// Set the validating flag.
    #[must_use]
    pub const fn validating(mut self, is_validating: bool) -> Self {
        self.is_validating = Some(is_validating);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn failure() -> FetchError {
        FetchError::Transport("offline".to_string())
    }

    #[test]
    fn merge_only_touches_provided_fields() {
        let mut entry = CacheEntry {
            value: Some(1),
            error: None,
            is_validating: false,
            updated_at: None,
            subscriber_count: 3,
        };

        entry.apply(EntryUpdate::fetch_started());

        assert_eq!(entry.value, Some(1));
        assert!(entry.is_validating);
        assert_eq!(entry.subscriber_count, 3);
    }

    #[test]
    fn failure_keeps_previous_value() {
        let now = Utc::now();
        let mut entry = CacheEntry::default();

        entry.apply(EntryUpdate::fetch_succeeded(42, now));
        entry.apply(EntryUpdate::fetch_failed(failure()));

        assert_eq!(entry.value, Some(42));
        assert_eq!(entry.error, Some(failure()));
        assert_eq!(entry.updated_at, Some(now));
        assert!(!entry.is_validating);
    }

    #[test]
    fn success_clears_error() {
        let mut entry = CacheEntry::default();
        entry.apply(EntryUpdate::fetch_failed(failure()));
        assert!(entry.error.is_some());
        assert!(!entry.has_value());

        entry.apply(EntryUpdate::fetch_succeeded(7, Utc::now()));
        assert!(entry.error.is_none());
        assert!(entry.has_value());
    }

    #[test]
    fn optimistic_does_not_touch_timestamp_or_error() {
        let mut entry = CacheEntry::default();
        entry.apply(EntryUpdate::fetch_failed(failure()));
        entry.apply(EntryUpdate::optimistic(5));

        assert_eq!(entry.value, Some(5));
        assert!(entry.error.is_some());
        assert!(entry.updated_at.is_none());
    }

    #[test]
    fn never_fetched_entry_is_overdue() {
        let entry: CacheEntry<u8> = CacheEntry::default();
        assert!(entry.is_overdue(Duration::from_secs(30), Utc::now()));
    }

    #[test]
    fn overdue_after_interval_elapses() {
        let fetched = Utc::now();
        let mut entry = CacheEntry::default();
        entry.apply(EntryUpdate::fetch_succeeded("x", fetched));

        let interval = Duration::from_secs(10);
        assert!(!entry.is_overdue(interval, fetched + chrono::Duration::seconds(5)));
        assert!(entry.is_overdue(interval, fetched + chrono::Duration::seconds(11)));
    }
}
