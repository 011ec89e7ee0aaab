// Copyright 2025 Cowboy AI, LLC.

//! Identity cache
//!
//! Keeps at most one outstanding fetch per `(model, id)` key. A caller that
//! asks for a key already being fetched awaits the same shared future
//! instead of issuing a second adapter call. Completed records are kept in a
//! bounded LRU until the key is evicted by a write.
//!
//! Each fetch is issued a ticket. When it settles it only publishes its
//! record if its ticket is still the current one for the key, so a fetch
//! that was overtaken by an eviction never repopulates the cache with data
//! read before the write.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use futures::future::{BoxFuture, FutureExt, Shared};
use lru::LruCache;
use tracing::trace;

use super::adapter::Record;
use crate::errors::OdmResult;

type Fetch = Shared<BoxFuture<'static, OdmResult<Record>>>;

/// Cache key: model name and identity
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    /// Model name
    pub model: String,
    /// Identity value
    pub id: String,
}

impl CacheKey {
    /// Create a key
    pub fn new(model: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            id: id.into(),
        }
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.model, self.id)
    }
}

struct CacheState {
    in_flight: HashMap<CacheKey, (u64, Fetch)>,
    completed: LruCache<CacheKey, Record>,
    next_ticket: u64,
}

/// Deduplicating, evictable cache of fetched records
pub struct IdentityCache {
    state: Arc<Mutex<CacheState>>,
}

impl IdentityCache {
    /// Create a cache holding up to `capacity` completed records
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            state: Arc::new(Mutex::new(CacheState {
                in_flight: HashMap::new(),
                completed: LruCache::new(capacity),
                next_ticket: 0,
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, CacheState> {
        lock(&self.state)
    }

    /// Return the cached record for `key`, join the fetch in flight for it,
    /// or start a new fetch with `fetch`.
    ///
    /// Failures are shared with every waiter and are not cached.
    pub async fn get_or_fetch<F, Fut>(&self, key: CacheKey, fetch: F) -> OdmResult<Record>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = OdmResult<Record>> + Send + 'static,
    {
        let pending = {
            let mut state = self.lock();
            if let Some(record) = state.completed.get(&key) {
                trace!(%key, "identity cache hit");
                return Ok(record.clone());
            }
            match state.in_flight.get(&key) {
                Some((_, pending)) => {
                    trace!(%key, "joined fetch in flight");
                    pending.clone()
                }
                None => {
                    trace!(%key, "identity cache miss");
                    let ticket = state.next_ticket;
                    state.next_ticket += 1;
                    let pending = settle_on_completion(
                        Arc::downgrade(&self.state),
                        key.clone(),
                        ticket,
                        fetch(),
                    );
                    state.in_flight.insert(key, (ticket, pending.clone()));
                    pending
                }
            }
        };
        pending.await
    }

    /// Forget `key`, both a completed record and a fetch in flight
    pub fn evict(&self, key: &CacheKey) {
        let mut state = self.lock();
        let in_flight = state.in_flight.remove(key).is_some();
        let completed = state.completed.pop(key).is_some();
        if in_flight || completed {
            trace!(%key, "evicted from identity cache");
        }
    }

    /// Forget everything
    pub fn clear(&self) {
        let mut state = self.lock();
        state.in_flight.clear();
        state.completed.clear();
    }

    /// Number of completed records held
    pub fn len(&self) -> usize {
        self.lock().completed.len()
    }

    /// Whether no completed records are held
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of fetches in flight
    pub fn in_flight(&self) -> usize {
        self.lock().in_flight.len()
    }

    /// Whether a completed record is held for `key`
    pub fn contains(&self, key: &CacheKey) -> bool {
        self.lock().completed.contains(key)
    }
}

fn lock(state: &Mutex<CacheState>) -> MutexGuard<'_, CacheState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

fn settle_on_completion<Fut>(
    state: Weak<Mutex<CacheState>>,
    key: CacheKey,
    ticket: u64,
    fetch: Fut,
) -> Fetch
where
    Fut: Future<Output = OdmResult<Record>> + Send + 'static,
{
    async move {
        let result = fetch.await;
        if let Some(state) = state.upgrade() {
            let mut state = lock(&state);
            let current = state.in_flight.get(&key).map(|(t, _)| *t) == Some(ticket);
            if current {
                state.in_flight.remove(&key);
                if let Ok(record) = &result {
                    state.completed.put(key, record.clone());
                }
            }
        }
        result
    }
    .boxed()
    .shared()
}

impl fmt::Debug for IdentityCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.lock();
        f.debug_struct("IdentityCache")
            .field("completed", &state.completed.len())
            .field("capacity", &state.completed.cap())
            .field("in_flight", &state.in_flight.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::OdmError;
    use crate::persistence::Cas;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn record(cas: u64) -> Record {
        Record {
            cas: Cas(cas),
            value: json!({"$id": "a"}),
        }
    }

    fn counted(
        calls: &Arc<AtomicUsize>,
        cas: u64,
    ) -> impl FnOnce() -> BoxFuture<'static, OdmResult<Record>> {
        let calls = calls.clone();
        move || {
            calls.fetch_add(1, Ordering::SeqCst);
            async move {
                tokio::time::sleep(Duration::from_millis(20)).await;
                Ok(record(cas))
            }
            .boxed()
        }
    }

    #[tokio::test]
    async fn test_concurrent_fetches_share_one_call() {
        let cache = IdentityCache::new(8);
        let calls = Arc::new(AtomicUsize::new(0));
        let key = CacheKey::new("User", "a");

        let (first, second) = tokio::join!(
            cache.get_or_fetch(key.clone(), counted(&calls, 1)),
            cache.get_or_fetch(key.clone(), counted(&calls, 2)),
        );

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(first.unwrap().cas, Cas(1));
        assert_eq!(second.unwrap().cas, Cas(1));
        assert!(cache.contains(&key));
        assert_eq!(cache.in_flight(), 0);

        // Served from the completed entry
        let third = cache.get_or_fetch(key, counted(&calls, 3)).await.unwrap();
        assert_eq!(third.cas, Cas(1));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_eviction_during_fetch_discards_the_stale_result() {
        let cache = IdentityCache::new(8);
        let calls = Arc::new(AtomicUsize::new(0));
        let key = CacheKey::new("User", "a");

        let stale = cache.get_or_fetch(key.clone(), counted(&calls, 1));
        let evict = async {
            tokio::time::sleep(Duration::from_millis(5)).await;
            cache.evict(&key);
        };
        let (stale, ()) = tokio::join!(stale, evict);
        assert_eq!(stale.unwrap().cas, Cas(1));
        assert!(!cache.contains(&key));

        let fresh = cache.get_or_fetch(key, counted(&calls, 2)).await.unwrap();
        assert_eq!(fresh.cas, Cas(2));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_failures_are_shared_but_not_cached() {
        let cache = IdentityCache::new(8);
        let key = CacheKey::new("User", "missing");
        let not_found = || async {
            Err::<Record, _>(OdmError::NotFound {
                model: "User".to_string(),
                id: "missing".to_string(),
            })
        };

        assert!(cache.get_or_fetch(key.clone(), not_found).await.unwrap_err().is_not_found());
        assert!(cache.is_empty());
        assert_eq!(cache.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_capacity_bounds_completed_entries() {
        let cache = IdentityCache::new(2);
        let calls = Arc::new(AtomicUsize::new(0));
        for id in ["a", "b", "c"] {
            cache
                .get_or_fetch(CacheKey::new("User", id), counted(&calls, 1))
                .await
                .unwrap();
        }
        assert_eq!(cache.len(), 2);
        assert!(!cache.contains(&CacheKey::new("User", "a")));

        cache.clear();
        assert!(cache.is_empty());
    }
}
