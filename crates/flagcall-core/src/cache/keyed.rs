use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures::future::{BoxFuture, FutureExt, Shared};
use serde::de::DeserializeOwned;
use tracing::{debug, trace, warn};

use crate::error::{DataError, DataResult};
use crate::storage::KeyValueStore;

type SharedLoad<T> = Shared<BoxFuture<'static, DataResult<T>>>;

enum CacheEntry<T: Clone> {
    Loading { generation: u64, handle: SharedLoad<T> },
    Ready(T),
    Failed(DataError),
}

enum Lookup<T: Clone> {
    Hit(T),
    Join((u64, SharedLoad<T>)),
    Miss,
}

/// Observable state of one key. `Empty` means no entry exists yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryStatus {
    Empty,
    Loading,
    Ready,
    Failed(DataError),
}

/// Per-key memoized async loads with single-flight semantics.
///
/// Concurrent `ensure` calls for the same key share one execution of the
/// loader. Failures are remembered only until the next `ensure`, which
/// retries. The entry map is never locked across an `.await`.
pub struct KeyedAsyncCache<T: Clone> {
    entries: Mutex<HashMap<String, CacheEntry<T>>>,
    next_generation: AtomicU64,
}

impl<T> Default for KeyedAsyncCache<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T> KeyedAsyncCache<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            next_generation: AtomicU64::new(0),
        }
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<String, CacheEntry<T>>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Return the value for `key`, loading it with `loader` if needed.
    ///
    /// - `Ready`: the stored value, without suspending
    /// - `Loading`: joins the in-flight load; `loader` is not called
    /// - `Empty`/`Failed`: calls `loader` and becomes `Loading`
    pub async fn ensure<F, Fut>(&self, key: &str, loader: F) -> DataResult<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = DataResult<T>> + Send + 'static,
    {
        match self.lookup(key) {
            Lookup::Hit(value) => return Ok(value),
            Lookup::Join(joined) => return self.wait(key, joined).await,
            Lookup::Miss => {}
        }

        // The loader runs with the map unlocked so it may use this cache.
        let handle = loader().boxed().shared();

        // Another caller may have started or finished a load meanwhile
        let joined = {
            let mut entries = self.entries();
            match lookup_in(&entries, key) {
                Lookup::Hit(value) => return Ok(value),
                Lookup::Join(joined) => joined,
                Lookup::Miss => {
                    let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
                    debug!(key, generation, "Starting load");
                    entries.insert(
                        key.to_string(),
                        CacheEntry::Loading {
                            generation,
                            handle: handle.clone(),
                        },
                    );
                    (generation, handle)
                }
            }
        };

        self.wait(key, joined).await
    }

    fn lookup(&self, key: &str) -> Lookup<T> {
        lookup_in(&self.entries(), key)
    }

    async fn wait(&self, key: &str, (generation, handle): (u64, SharedLoad<T>)) -> DataResult<T> {
        let result = handle.await;
        self.settle(key, generation, &result);
        result
    }

    /// Record the outcome of a load, unless the entry has since been
    /// invalidated or replaced by a newer load.
    fn settle(&self, key: &str, generation: u64, result: &DataResult<T>) {
        let mut entries = self.entries();
        let current = matches!(
            entries.get(key),
            Some(CacheEntry::Loading { generation: g, .. }) if *g == generation
        );
        if !current {
            return;
        }
        match result {
            Ok(value) => {
                entries.insert(key.to_string(), CacheEntry::Ready(value.clone()));
            }
            Err(e) => {
                warn!(key, error = %e, "Load failed");
                entries.insert(key.to_string(), CacheEntry::Failed(e.clone()));
            }
        }
    }

    /// Drop the entry for `key`. A load still in flight keeps running for
    /// its waiters but its result is not stored.
    pub fn invalidate(&self, key: &str) {
        if self.entries().remove(key).is_some() {
            debug!(key, "Invalidated cache entry");
        }
    }

    /// Invalidate `key` and load it again.
    pub async fn refresh<F, Fut>(&self, key: &str, loader: F) -> DataResult<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = DataResult<T>> + Send + 'static,
    {
        self.invalidate(key);
        self.ensure(key, loader).await
    }

    /// Apply `f` to the stored value if `key` is `Ready`.
    /// Any other state is invalidated so the next `ensure` reloads.
    /// Returns whether the value was updated in place.
    pub fn update(&self, key: &str, f: impl FnOnce(&mut T)) -> bool {
        let mut entries = self.entries();
        match entries.get_mut(key) {
            Some(CacheEntry::Ready(value)) => {
                f(value);
                return true;
            }
            Some(_) => {}
            None => return false,
        }
        entries.remove(key);
        false
    }

    pub fn status(&self, key: &str) -> EntryStatus {
        match self.entries().get(key) {
            None => EntryStatus::Empty,
            Some(CacheEntry::Loading { .. }) => EntryStatus::Loading,
            Some(CacheEntry::Ready(_)) => EntryStatus::Ready,
            Some(CacheEntry::Failed(e)) => EntryStatus::Failed(e.clone()),
        }
    }

    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries().is_empty()
    }
}

fn lookup_in<T: Clone>(entries: &HashMap<String, CacheEntry<T>>, key: &str) -> Lookup<T> {
    match entries.get(key) {
        Some(CacheEntry::Ready(value)) => {
            trace!(key, "Cache hit");
            Lookup::Hit(value.clone())
        }
        Some(CacheEntry::Loading { generation, handle }) => {
            debug!(key, "Joining in-flight load");
            Lookup::Join((*generation, handle.clone()))
        }
        _ => Lookup::Miss,
    }
}

/// Default loader: read `key` from `store` and parse it as JSON.
/// A missing value yields `T::default()`.
pub fn json_loader<T>(
    store: Arc<dyn KeyValueStore>,
    key: &str,
) -> impl Future<Output = DataResult<T>> + Send + 'static
where
    T: DeserializeOwned + Default + Send + 'static,
{
    let key = key.to_string();
    async move {
        let raw = store
            .get_item(&key)
            .await
            .map_err(|e| DataError::load(&key, e))?;
        match raw {
            Some(text) => serde_json::from_str(&text)
                .map_err(|e| DataError::load(&key, format!("invalid JSON: {}", e))),
            None => Ok(T::default()),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
