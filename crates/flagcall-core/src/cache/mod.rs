//! Local caching module for offline data access.
//!
//! This module provides:
//! - `KeyedAsyncCache`: per-key memoized loads with single-flight semantics
//! - `CoalescingWriter`: read-merge-write saves that cancel superseded ones
//! - `LocalStore`: the two combined over one storage adapter
//!
//! Values are JSON objects keyed by name. Nothing is evicted; entries live as
//! long as the cache instance.

pub mod keyed;
pub mod local;
pub mod writer;

pub use keyed::{json_loader, EntryStatus, KeyedAsyncCache};
pub use local::LocalStore;
pub use writer::{merge_patch, CoalescingWriter, WriteHandle, WriteOutcome, WriteScope};
