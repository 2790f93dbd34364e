use std::sync::Arc;

use futures::FutureExt;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use super::keyed::{json_loader, EntryStatus, KeyedAsyncCache};
use super::writer::{merge_patch, CoalescingWriter, WriteHandle, WriteScope};
use crate::error::{DataError, DataResult};
use crate::storage::KeyValueStore;

/// Cached reads and coalesced writes over one storage adapter.
///
/// Saves are applied to an already loaded value right away, so a `load`
/// after a `save` sees the patch even before the write has landed.
pub struct LocalStore {
    store: Arc<dyn KeyValueStore>,
    cache: KeyedAsyncCache<Value>,
    writer: CoalescingWriter,
}

impl LocalStore {
    pub fn new(store: Arc<dyn KeyValueStore>, scope: WriteScope) -> Self {
        Self {
            writer: CoalescingWriter::new(store.clone(), scope),
            cache: KeyedAsyncCache::new(),
            store,
        }
    }

    /// Load the JSON value stored under `key`; absent keys read as `{}`.
    ///
    /// Unless the value is already cached, queued saves to `key` land first
    /// so the load never caches a value older than them.
    pub async fn load(&self, key: &str) -> DataResult<Value> {
        if self.cache.status(key) != EntryStatus::Ready {
            self.writer.settled(key).await;
        }
        let store = self.store.clone();
        self.cache
            .ensure(key, move || {
                json_loader::<Value>(store, key).map(|result| result.map(empty_if_null))
            })
            .await
    }

    /// Load `key` and deserialize it into `T`.
    pub async fn load_as<T: DeserializeOwned>(&self, key: &str) -> DataResult<T> {
        let value = self.load(key).await?;
        serde_json::from_value(value).map_err(|e| DataError::load(key, e))
    }

    /// Re-read `key` from storage, bypassing the cached value.
    pub async fn reload(&self, key: &str) -> DataResult<Value> {
        self.cache.invalidate(key);
        self.load(key).await
    }

    /// Shallow-merge `patch` into `key`.
    pub fn save(&self, key: &str, patch: Map<String, Value>) -> WriteHandle {
        let updated = self.cache.update(key, |value| {
            let base = match std::mem::take(value) {
                Value::Object(map) => map,
                _ => Map::new(),
            };
            *value = Value::Object(merge_patch(base, patch.clone()));
        });
        debug!(key, updated, "Queued save");
        self.writer.save(key, patch)
    }

    /// Serialize `value` and save its fields as a patch. `value` must
    /// serialize to a JSON object.
    pub fn save_as<T: Serialize>(&self, key: &str, value: &T) -> DataResult<WriteHandle> {
        match serde_json::to_value(value).map_err(|e| DataError::write(key, e))? {
            Value::Object(patch) => Ok(self.save(key, patch)),
            other => Err(DataError::write(
                key,
                format!("expected a JSON object, got {}", json_kind(&other)),
            )),
        }
    }

    /// Delete `key` from storage and from the cache.
    pub async fn remove(&self, key: &str) -> DataResult<()> {
        self.cache.invalidate(key);
        self.store
            .remove_item(key)
            .await
            .map_err(|e| DataError::write(key, e))
    }

    /// Wait for all queued saves to settle.
    pub async fn flush(&self) {
        self.writer.flush().await;
    }

    pub fn cache(&self) -> &KeyedAsyncCache<Value> {
        &self.cache
    }
}

fn empty_if_null(value: Value) -> Value {
    if value.is_null() {
        Value::Object(Map::new())
    } else {
        value
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
