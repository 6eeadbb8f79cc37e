//! Key/value persistence for user input.
//!
//! Writes are expected to be rare and small, so the file-backed store rewrites
//! the whole object on each change and re-reads it on each access.

use std::{
    cell::RefCell,
    collections::BTreeMap,
    io::ErrorKind,
    path::{Path, PathBuf},
};

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Storage is unavailable: {0}")]
    Unavailable(String),
    #[error("Storage I/O failed")]
    Io(#[from] std::io::Error),
    #[error("Stored data is malformed")]
    Malformed(#[from] serde_json::Error),
    #[error("Domain {domain} does not cover host {host}")]
    DomainMismatch { domain: String, host: String },
}

pub trait KeyValueStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;
    fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;
    fn remove(&self, key: &str) -> Result<(), StorageError>;
}

/// Values kept for the lifetime of the process.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RefCell<BTreeMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.entries.borrow().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.entries
            .borrow_mut()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.entries.borrow_mut().remove(key);
        Ok(())
    }
}

/// A flat JSON object of string values on disk.
///
/// A missing file reads as empty; it is created on the first write.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> Result<BTreeMap<String, String>, StorageError> {
        match std::fs::read_to_string(&self.path) {
            Ok(content) => Ok(serde_json::from_str(&content)?),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(e) => Err(e.into()),
        }
    }

    fn save(&self, entries: &BTreeMap<String, String>) -> Result<(), StorageError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&self.path, serde_json::to_string_pretty(entries)?)?;

        tracing::trace!(path = %self.path.display(), "Store saved");
        Ok(())
    }
}

impl KeyValueStore for JsonFileStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.load()?.remove(key))
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let mut entries = self.load()?;
        entries.insert(key.to_string(), value.to_string());
        self.save(&entries)
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        let mut entries = self.load()?;
        if entries.remove(key).is_some() {
            self.save(&entries)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::{JsonFileStore, KeyValueStore, MemoryStore, StorageError};

    #[test]
    fn memory_store_sets_and_removes() {
        let store = MemoryStore::new();
        store.set("totp-digits", "8").unwrap();
        assert_eq!(Some("8".to_string()), store.get("totp-digits").unwrap());

        store.remove("totp-digits").unwrap();
        assert_eq!(None, store.get("totp-digits").unwrap());
    }

    #[test]
    fn file_store_is_shared_between_handles() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("store.json");

        let writer = JsonFileStore::new(&path);
        let reader = JsonFileStore::new(&path);
        assert_eq!(None, reader.get("totp-period").unwrap());

        writer.set("totp-period", "60").unwrap();
        assert_eq!(Some("60".to_string()), reader.get("totp-period").unwrap());

        writer.remove("totp-period").unwrap();
        assert_eq!(None, reader.get("totp-period").unwrap());
    }

    #[test]
    fn file_store_reports_malformed_content() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");
        std::fs::write(&path, "not json").unwrap();

        let result = JsonFileStore::new(&path).get("totp-secret-key");
        assert!(matches!(result, Err(StorageError::Malformed(_))));
    }
}
