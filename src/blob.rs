// Synchronous key/value blob storage

use eyre::{Result, eyre};
use std::collections::HashMap;

/// A synchronous string blob store.
///
/// Backends may be unavailable (disabled storage, headless environment) or
/// may reject individual writes. Callers that must never fail go through
/// [`crate::PersistentStore`], which absorbs these errors.
pub trait BlobStore {
    /// Whether the medium can currently be read and written
    fn is_available(&self) -> bool;

    /// Raw payload stored under `key`, if any
    fn get(&self, key: &str) -> Result<Option<String>>;

    /// Store `value` under `key`, replacing any previous payload
    fn set(&mut self, key: &str, value: &str) -> Result<()>;

    /// Store several entries as one snapshot.
    ///
    /// Backends with transactions override this so a reader never sees
    /// only part of the entries.
    fn set_many(&mut self, entries: &[(&str, String)]) -> Result<()> {
        for (key, value) in entries {
            self.set(key, value)?;
        }
        Ok(())
    }
}

impl<B: BlobStore + ?Sized> BlobStore for Box<B> {
    fn is_available(&self) -> bool {
        (**self).is_available()
    }

    fn get(&self, key: &str) -> Result<Option<String>> {
        (**self).get(key)
    }

    fn set(&mut self, key: &str, value: &str) -> Result<()> {
        (**self).set(key, value)
    }

    fn set_many(&mut self, entries: &[(&str, String)]) -> Result<()> {
        (**self).set_many(entries)
    }
}

/// In-process blob store.
///
/// Also used to exercise degraded storage: it can be switched to
/// unavailable, or told to reject writes as a full quota would.
#[derive(Debug, Clone)]
pub struct MemoryBlobStore {
    entries: HashMap<String, String>,
    available: bool,
    reject_writes: bool,
    snapshots: usize,
}

impl Default for MemoryBlobStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
            available: true,
            reject_writes: false,
            snapshots: 0,
        }
    }

    /// A store that behaves like disabled storage
    pub fn unavailable() -> Self {
        Self {
            available: false,
            ..Self::new()
        }
    }

    pub fn set_available(&mut self, available: bool) {
        self.available = available;
    }

    pub fn set_reject_writes(&mut self, reject: bool) {
        self.reject_writes = reject;
    }

    /// Seed a raw payload, bypassing availability checks
    pub fn insert_raw(&mut self, key: &str, value: &str) {
        self.entries.insert(key.to_string(), value.to_string());
    }

    pub fn raw(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    /// Number of committed write operations (one per `set` or `set_many`)
    pub fn snapshots(&self) -> usize {
        self.snapshots
    }

    fn check_writable(&self) -> Result<()> {
        if !self.available {
            return Err(eyre!("Storage is unavailable"));
        }
        if self.reject_writes {
            return Err(eyre!("Storage quota exceeded"));
        }
        Ok(())
    }
}

impl BlobStore for MemoryBlobStore {
    fn is_available(&self) -> bool {
        self.available
    }

    fn get(&self, key: &str) -> Result<Option<String>> {
        if !self.available {
            return Err(eyre!("Storage is unavailable"));
        }
        Ok(self.entries.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: &str) -> Result<()> {
        self.check_writable()?;
        validate_key(key)?;
        self.entries.insert(key.to_string(), value.to_string());
        self.snapshots += 1;
        Ok(())
    }

    fn set_many(&mut self, entries: &[(&str, String)]) -> Result<()> {
        self.check_writable()?;
        for (key, _) in entries {
            validate_key(key)?;
        }
        for (key, value) in entries {
            self.entries.insert(key.to_string(), value.clone());
        }
        self.snapshots += 1;
        Ok(())
    }
}

/// Validate a storage key
pub(crate) fn validate_key(key: &str) -> Result<()> {
    if key.is_empty() {
        return Err(eyre!("Storage key cannot be empty"));
    }
    if key.len() > 64 {
        return Err(eyre!("Storage key too long: {} (max 64 chars)", key));
    }
    if !key.chars().all(|c| c.is_alphanumeric() || c == '_' || c == '-') {
        return Err(eyre!("Invalid storage key: {} (must be alphanumeric with _/-)", key));
    }
    Ok(())
}
