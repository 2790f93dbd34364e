//! Key-value storage adapters.
//!
//! The data layer only ever talks to storage through [`KeyValueStore`]:
//! string keys, string (JSON text) values, and "no value" is not an error.
//!
//! Two adapters are provided:
//! - `MemoryStore`: in-process map, for tests and throwaway sessions
//! - `FileStore`: one JSON file per key under a data directory

pub mod file;
pub mod memory;

use async_trait::async_trait;

use crate::error::StoreError;

pub use file::FileStore;
pub use memory::MemoryStore;

#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Returns `Ok(None)` when nothing is stored under `key`.
    async fn get_item(&self, key: &str) -> Result<Option<String>, StoreError>;

    async fn set_item(&self, key: &str, value: &str) -> Result<(), StoreError>;

    /// Removing a missing key succeeds.
    async fn remove_item(&self, key: &str) -> Result<(), StoreError>;
}
