use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures::future::{BoxFuture, FutureExt, Shared};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::error::{DataError, DataResult};
use crate::storage::KeyValueStore;

/// Slot name used when every key shares one pending write.
const GLOBAL_SLOT: &str = "*";

/// How far one save's cancellation reaches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WriteScope {
    /// A save only supersedes earlier saves to the same key.
    #[default]
    PerKey,
    /// A save supersedes the previous save whatever key it targeted.
    Global,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    Written,
    Superseded,
}

#[derive(Debug, Clone, Default)]
struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Resolves once a write task has settled, however it ended.
type Finished = Shared<BoxFuture<'static, ()>>;

struct PendingWrite {
    cancel: CancelFlag,
    finished: Finished,
}

/// Handle to one issued save. Dropping it does not stop the write.
pub struct WriteHandle {
    key: String,
    task: JoinHandle<DataResult<WriteOutcome>>,
}

impl WriteHandle {
    /// Wait for the write to settle. Only callers that wait see a
    /// `WriteFailure`; otherwise it is just logged.
    pub async fn wait(self) -> DataResult<WriteOutcome> {
        match self.task.await {
            Ok(result) => result,
            Err(e) => Err(DataError::write(&self.key, format!("write task died: {}", e))),
        }
    }
}

/// Serializes read-merge-write saves and cancels superseded ones.
///
/// Cancellation is cooperative and the store is not transactional, so a
/// superseded save may still have landed. Writes within one slot run one
/// after another, which keeps the newest save from being overwritten by an
/// older one.
pub struct CoalescingWriter {
    store: Arc<dyn KeyValueStore>,
    scope: WriteScope,
    pending: Mutex<HashMap<String, PendingWrite>>,
}

impl CoalescingWriter {
    pub fn new(store: Arc<dyn KeyValueStore>, scope: WriteScope) -> Self {
        Self {
            store,
            scope,
            pending: Mutex::new(HashMap::new()),
        }
    }

    fn pending(&self) -> MutexGuard<'_, HashMap<String, PendingWrite>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn slot<'a>(&self, key: &'a str) -> &'a str {
        match self.scope {
            WriteScope::PerKey => key,
            WriteScope::Global => GLOBAL_SLOT,
        }
    }

    /// Shallow-merge `patch` into the stored object for `key`.
    ///
    /// Must be called from within a tokio runtime.
    pub fn save(&self, key: &str, patch: Map<String, Value>) -> WriteHandle {
        let cancel = CancelFlag::default();
        let (done_tx, done_rx) = oneshot::channel::<()>();
        // The sender is dropped, never used, when the task ends
        let finished: Finished = done_rx.map(|_| ()).boxed().shared();

        let previous = self.pending().insert(
            self.slot(key).to_string(),
            PendingWrite {
                cancel: cancel.clone(),
                finished: finished.clone(),
            },
        );
        let previous = previous.map(|prev| {
            prev.cancel.cancel();
            prev.finished
        });

        let store = self.store.clone();
        let task_key = key.to_string();
        let task = tokio::spawn(async move {
            // Hold the sender until this write is over
            let _done = done_tx;
            if let Some(previous) = previous {
                previous.await;
            }
            let result = run_write(store.as_ref(), &task_key, patch, &cancel).await;
            match &result {
                Ok(WriteOutcome::Written) => debug!(key = %task_key, "Saved"),
                Ok(WriteOutcome::Superseded) => debug!(key = %task_key, "Save superseded"),
                Err(e) => warn!(key = %task_key, error = %e, "Save failed"),
            }
            result
        });

        WriteHandle {
            key: key.to_string(),
            task,
        }
    }

    /// Wait for the latest write to `key` (or, with `WriteScope::Global`,
    /// the latest write of any key) to settle. Earlier writes of the slot
    /// settle before it.
    pub async fn settled(&self, key: &str) {
        let finished = self
            .pending()
            .get(self.slot(key))
            .map(|write| write.finished.clone());
        if let Some(finished) = finished {
            finished.await;
        }
    }

    /// Wait until every write issued so far has settled.
    pub async fn flush(&self) {
        let waiting: Vec<(String, Finished)> = self
            .pending()
            .iter()
            .map(|(slot, write)| (slot.clone(), write.finished.clone()))
            .collect();
        for (slot, finished) in waiting {
            finished.await;
            debug!(slot = %slot, "Flushed");
        }
    }
}

async fn run_write(
    store: &dyn KeyValueStore,
    key: &str,
    patch: Map<String, Value>,
    cancel: &CancelFlag,
) -> DataResult<WriteOutcome> {
    if cancel.is_cancelled() {
        return Ok(WriteOutcome::Superseded);
    }
    let current = store
        .get_item(key)
        .await
        .map_err(|e| DataError::write(key, e))?;

    if cancel.is_cancelled() {
        return Ok(WriteOutcome::Superseded);
    }
    let merged = merge_patch(decode_object(key, current.as_deref()), patch);
    let text = serde_json::to_string(&Value::Object(merged)).map_err(|e| DataError::write(key, e))?;

    if cancel.is_cancelled() {
        return Ok(WriteOutcome::Superseded);
    }
    store
        .set_item(key, &text)
        .await
        .map_err(|e| DataError::write(key, e))?;
    Ok(WriteOutcome::Written)
}

/// Decode a stored payload as a JSON object. Absent, unparseable and
/// non-object payloads all start over from an empty object.
fn decode_object(key: &str, raw: Option<&str>) -> Map<String, Value> {
    let Some(raw) = raw else {
        return Map::new();
    };
    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Object(map)) => map,
        Ok(_) => {
            warn!(key, "Stored value is not an object, replacing it");
            Map::new()
        }
        Err(e) => {
            warn!(key, error = %e, "Stored value is not valid JSON, replacing it");
            Map::new()
        }
    }
}

/// Top-level fields of `patch` replace those of `base`; nested values are
/// replaced wholesale.
pub fn merge_patch(mut base: Map<String, Value>, patch: Map<String, Value>) -> Map<String, Value> {
    for (field, value) in patch {
        base.insert(field, value);
    }
    base
}

// ============================================================================
// Tests
// ============================================================================
