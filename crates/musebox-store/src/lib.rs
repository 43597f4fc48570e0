//! Persistent key-value storage for musebox
//!
//! Everything musebox remembers between runs - content packs, the rate-limit
//! window, the idea history - goes through the [`KvStore`] trait as string
//! blobs. The store is a cache, not a source of truth: callers treat every
//! failure as "empty state" and keep going, forfeiting only durability.

mod fs;
mod memory;

pub use fs::FsStore;
pub use memory::MemoryStore;

use thiserror::Error;

/// Errors raised by a key-value store backend.
///
/// Callers in this workspace never propagate these past the component
/// boundary; they log and fall back to in-memory state.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("storage I/O failure: {0}")]
    Io(#[from] std::io::Error),

    #[error("storage quota exceeded while writing '{key}'")]
    QuotaExceeded { key: String },

    #[error("storage backend disabled: {0}")]
    Disabled(String),
}

/// Capability surface for persistent string-blob storage.
///
/// Keys are flat strings; related entries share a dotted prefix
/// (e.g. `pack.<id>`). Values are opaque to the store - components encode
/// JSON before handing blobs over.
pub trait KvStore: Send + Sync {
    /// Fetch the blob stored under `key`, or `None` if absent.
    ///
    /// # Errors
    ///
    /// Returns `StoreError` when the backend cannot be read at all.
    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Write `value` under `key`, replacing any previous blob.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::QuotaExceeded` when the backend is full, or
    /// other variants for I/O and access failures.
    fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;

    /// Delete the entry under `key`. Removing an absent key is not an error.
    ///
    /// # Errors
    ///
    /// Returns `StoreError` when the backend cannot be written.
    fn remove(&self, key: &str) -> Result<(), StoreError>;

    /// All keys currently present in the store.
    ///
    /// # Errors
    ///
    /// Returns `StoreError` when the backend cannot be enumerated.
    fn keys(&self) -> Result<Vec<String>, StoreError>;
}
