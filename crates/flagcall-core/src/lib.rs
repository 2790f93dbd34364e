//! Local data layer for the flagcall reminder app.
//!
//! - `storage`: key-value adapters (`MemoryStore`, `FileStore`)
//! - `cache`: single-flight loads and coalesced writes over a store
//! - `reminder`: next-occurrence resolution and `.ics` export
//! - `config`: application configuration on disk

pub mod cache;
pub mod config;
pub mod error;
pub mod reminder;
pub mod storage;

pub use cache::{
    CoalescingWriter, EntryStatus, KeyedAsyncCache, LocalStore, WriteHandle, WriteOutcome,
    WriteScope,
};
pub use config::Config;
pub use error::{DataError, DataResult, StoreError};
pub use reminder::{CalendarEvent, Language, ReminderSettings};
pub use storage::{FileStore, KeyValueStore, MemoryStore};
