//! Key/value contract for persisted device status.
//!
//! The lifecycle manager only needs three primitives from the storage
//! engine. Keys are device UIDs in their textual form.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use thiserror::Error;

/// Namespace under which the device status records are stored.
pub const STATUS_STORAGE_NAME: &str = "device_status_storage";

/// Value written for a disabled device. Only the presence of the key is
/// significant.
pub const DISABLED_MARKER: &str = "";

/// Errors surfaced by a status store.
#[derive(Debug, Error)]
#[error("status store '{store}' failed: {message}")]
pub struct StoreError {
    store: String,
    message: String,
    #[source]
    source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl StoreError {
    /// Builds an error without an underlying source.
    #[must_use]
    pub fn new(store: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            store: store.into(),
            message: message.into(),
            source: None,
        }
    }

    /// Builds an error that wraps an underlying source.
    #[must_use]
    pub fn with_source(
        store: impl Into<String>,
        message: impl Into<String>,
        source: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        Self {
            store: store.into(),
            message: message.into(),
            source: Some(source.into()),
        }
    }

    /// Name of the failing store.
    #[must_use]
    pub fn store(&self) -> &str {
        self.store.as_str()
    }

    /// Human-readable message describing the failure.
    #[must_use]
    pub fn message(&self) -> &str {
        self.message.as_str()
    }
}

/// Persistence consumed by the enablement logic. Implementations must be
/// safe for concurrent use.
pub trait StatusStore: Send + Sync {
    /// Reads the value stored under `key`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the store cannot be read.
    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Writes `value` under `key`, replacing any previous value.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the store cannot be written.
    fn put(&self, key: &str, value: &str) -> Result<(), StoreError>;

    /// Deletes the record under `key`. Deleting a missing key succeeds.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the store cannot be written.
    fn remove(&self, key: &str) -> Result<(), StoreError>;

    /// Returns `true` when a record exists under `key`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the store cannot be read.
    fn contains_key(&self, key: &str) -> Result<bool, StoreError> {
        Ok(self.get(key)?.is_some())
    }
}

/// Process-local store backed by a mutex-guarded map.
#[derive(Debug)]
pub struct MemoryStatusStore {
    name: String,
    records: Mutex<HashMap<String, String>>,
}

impl Default for MemoryStatusStore {
    fn default() -> Self {
        Self::named(STATUS_STORAGE_NAME)
    }
}

impl MemoryStatusStore {
    /// Creates an empty store under the default namespace.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty store under the given namespace.
    #[must_use]
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            records: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the storage namespace.
    #[must_use]
    pub fn name(&self) -> &str {
        self.name.as_str()
    }

    /// Returns the number of stored records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Returns `true` when no records are stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl StatusStore for MemoryStatusStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self
            .records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned())
    }

    fn put(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_owned(), value.to_owned());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
        Ok(())
    }
}
