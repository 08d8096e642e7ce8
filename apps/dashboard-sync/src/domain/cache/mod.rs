//! Cache Domain Types
//!
//! Keys, entries, the fetch error taxonomy, and the key-addressed store
//! with its change feed.

mod entry;
mod error;
mod key;
mod store;

pub use entry::{CacheEntry, EntryUpdate};
pub use error::{FetchError, FetchErrorKind};
pub use key::{CacheKey, CacheKeyBuilder};
pub use store::{CacheStore, ChangeListener};

/// Bound for payloads held in the cache.
///
/// Values are cloned into every subscriber notification and shared across
/// tasks, so they must be cheap enough to clone and thread-safe.
pub trait CacheValue: Clone + Send + Sync + 'static {}

impl<T: Clone + Send + Sync + 'static> CacheValue for T {}
