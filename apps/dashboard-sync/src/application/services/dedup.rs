//! Fetch Deduplication
//!
//! Collapses concurrent requests for one key into a single backend call.
//! The first requester spawns the fetch and publishes a shared handle; later
//! requesters receive a clone of that handle until the fetch settles.
//!
//! A fetch can be superseded while it is in flight, when a local write makes
//! its eventual result out of date. The superseded result is discarded and
//! the same task fetches again, so everyone who joined receives a result
//! that started after the write.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use parking_lot::Mutex;
use tokio::sync::oneshot;
use tokio::time::Instant;
use tracing::{Instrument, debug, debug_span, warn};

use crate::application::ports::Fetcher;
use crate::domain::cache::{CacheKey, CacheStore, CacheValue, EntryUpdate, FetchError};
use crate::infrastructure::metrics;

/// Pending outcome of a fetch, shared by every requester that joined it.
pub type SharedFetch<V> = Shared<BoxFuture<'static, Result<V, FetchError>>>;

struct Pending<V> {
    fetch: SharedFetch<V>,
    superseded: bool,
}

type InFlight<V> = Arc<Mutex<HashMap<CacheKey, Pending<V>>>>;

/// At-most-one-fetch-per-key coordinator.
///
/// Outcomes are only written to entries that exist; a fetch for a key
/// nobody subscribed to returns its result without caching it.
pub struct Deduplicator<V> {
    store: Arc<CacheStore<V>>,
    fetcher: Arc<dyn Fetcher<V>>,
    in_flight: InFlight<V>,
}

impl<V> Clone for Deduplicator<V> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            fetcher: Arc::clone(&self.fetcher),
            in_flight: Arc::clone(&self.in_flight),
        }
    }
}

impl<V: CacheValue> Deduplicator<V> {
    /// Create a deduplicator writing outcomes into `store`.
    pub fn new(store: Arc<CacheStore<V>>, fetcher: Arc<dyn Fetcher<V>>) -> Self {
        Self {
            store,
            fetcher,
            in_flight: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Request the resource for `key`.
    ///
    /// Returns the pending fetch if one is in flight, otherwise starts one in
    /// a background task and marks the entry as validating. The fetch runs to
    /// completion whether or not the returned handle is awaited.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn request(&self, key: &CacheKey) -> SharedFetch<V> {
        let (tx, shared) = {
            let mut in_flight = self.in_flight.lock();
            if let Some(pending) = in_flight.get(key) {
                let joined = pending.fetch.clone();
                drop(in_flight);
                metrics::record_fetch_joined();
                debug!(%key, "joined in-flight fetch");
                self.mark_validating(key);
                return joined;
            }

            let (tx, rx) = oneshot::channel::<Result<V, FetchError>>();
            let shared = rx
                .map(|received| {
                    received
                        .unwrap_or_else(|_| Err(FetchError::Transport("fetch task aborted".into())))
                })
                .boxed()
                .shared();
            in_flight.insert(
                key.clone(),
                Pending {
                    fetch: shared.clone(),
                    superseded: false,
                },
            );
            (tx, shared)
        };

        metrics::record_fetch_started(key.endpoint());
        self.store.update(key, EntryUpdate::fetch_started());

        let mut settle = Settle {
            store: Arc::clone(&self.store),
            in_flight: Arc::clone(&self.in_flight),
            key: key.clone(),
            settled: false,
        };
        let fetcher = Arc::clone(&self.fetcher);
        let span = debug_span!("fetch", key = %key);

        tokio::spawn(
            async move {
                let outcome = loop {
                    let started = Instant::now();
                    let outcome = fetcher.fetch(&settle.key).await;
                    metrics::record_fetch_duration(started.elapsed());

                    match &outcome {
                        Ok(_) => debug!("fetch succeeded"),
                        Err(error) => {
                            metrics::record_fetch_failed(error.kind());
                            warn!(kind = %error.kind(), error = %error, "fetch failed");
                        }
                    }
                    if settle.complete(&outcome) {
                        break outcome;
                    }
                    debug!("result predates a local write, fetching again");
                    metrics::record_fetch_started(settle.key.endpoint());
                };
                // Every joined requester may already be gone.
                let _ = tx.send(outcome);
            }
            .instrument(span),
        );

        shared
    }

    /// Mark the in-flight fetch for `key` as out of date.
    ///
    /// Its result will be discarded and fetched again; requesters joining
    /// it receive the refetched result. Returns `false` if nothing is in
    /// flight.
    pub fn supersede(&self, key: &CacheKey) -> bool {
        let superseded = match self.in_flight.lock().get_mut(key) {
            Some(pending) => {
                pending.superseded = true;
                true
            }
            None => false,
        };
        if superseded {
            debug!(%key, "in-flight fetch superseded");
        }
        superseded
    }

    /// Whether a fetch for `key` is currently in flight.
    #[must_use]
    pub fn is_in_flight(&self, key: &CacheKey) -> bool {
        self.in_flight.lock().contains_key(key)
    }

    /// Number of keys with a fetch in flight.
    #[must_use]
    pub fn in_flight_count(&self) -> usize {
        self.in_flight.lock().len()
    }

    /// Flag a joined entry as validating, e.g. one recreated while its
    /// fetch was already running.
    fn mark_validating(&self, key: &CacheKey) {
        self.store.exclusive(|| {
            let stale = self.store.get(key).is_some_and(|entry| !entry.is_validating);
            if stale && self.is_in_flight(key) {
                self.store.update(key, EntryUpdate::fetch_started());
            }
        });
    }
}

/// Writes a fetch outcome into the store and clears the in-flight marker.
///
/// If the fetch task unwinds before completing, the drop path records a
/// transport failure so the key does not stay validating forever.
struct Settle<V: CacheValue> {
    store: Arc<CacheStore<V>>,
    in_flight: InFlight<V>,
    key: CacheKey,
    settled: bool,
}

impl<V: CacheValue> Settle<V> {
    /// Apply `outcome` unless the fetch was superseded. Returns whether the
    /// fetch settled.
    fn complete(&mut self, outcome: &Result<V, FetchError>) -> bool {
        self.finish(outcome, false)
    }

    fn finish(&mut self, outcome: &Result<V, FetchError>, force: bool) -> bool {
        let update = match outcome {
            Ok(value) => EntryUpdate::fetch_succeeded(value.clone(), Utc::now()),
            Err(error) => EntryUpdate::fetch_failed(error.clone()),
        };
        let (store, in_flight, key) = (&self.store, &self.in_flight, &self.key);

        // Local writes that supersede a fetch hold the same ordering lock.
        let settled = store.exclusive(|| {
            if let Some(pending) = in_flight.lock().get_mut(key) {
                if pending.superseded && !force {
                    pending.superseded = false;
                    return false;
                }
            }
            // An evicted entry is not recreated by a late completion.
            store.update(key, update);
            in_flight.lock().remove(key);
            true
        });
        self.settled = settled;
        settled
    }
}

impl<V: CacheValue> Drop for Settle<V> {
    fn drop(&mut self) {
        if !self.settled {
            let aborted = Err(FetchError::Transport("fetch task aborted".into()));
            self.finish(&aborted, true);
        }
    }
}
