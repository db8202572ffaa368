use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use thiserror::Error;

pub const RECENT_PROMPTS_KEY: &str = "recent-prompts";
pub const ACTIVE_CHAIN_KEY: &str = "active-prompt-chain";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("storage I/O failed for key {key}: {source}")]
    Io {
        key: String,
        source: std::io::Error,
    },
    #[error("invalid storage key: {0}")]
    InvalidKey(String),
    #[error("storage is unavailable")]
    Unavailable,
}

/// Durable string key-value storage. Values are JSON documents.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;
    fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;
    fn remove(&self, key: &str) -> Result<(), StoreError>;
}

/// One file per key under a data directory.
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, StoreError> {
        let valid = !key.is_empty()
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !valid {
            return Err(StoreError::InvalidKey(key.to_string()));
        }
        Ok(self.dir.join(format!("{}.json", key)))
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let path = self.path_for(key)?;
        match fs::read_to_string(&path) {
            Ok(content) => Ok(Some(content)),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(source) => Err(StoreError::Io {
                key: key.to_string(),
                source,
            }),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let path = self.path_for(key)?;
        let io_err = |source: std::io::Error| StoreError::Io {
            key: key.to_string(),
            source,
        };
        fs::create_dir_all(&self.dir).map_err(io_err)?;
        let tmp_path = path.with_extension("json.tmp");
        fs::write(&tmp_path, value).map_err(io_err)?;
        fs::rename(&tmp_path, &path).map_err(io_err)?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        let path = self.path_for(key)?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(source) => Err(StoreError::Io {
                key: key.to_string(),
                source,
            }),
        }
    }
}

/// In-process store. Used when no data directory is available and in tests.
#[derive(Default)]
pub struct MemoryStore {
    values: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let guard = self.values.lock().map_err(|_| StoreError::Unavailable)?;
        Ok(guard.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let mut guard = self.values.lock().map_err(|_| StoreError::Unavailable)?;
        guard.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        let mut guard = self.values.lock().map_err(|_| StoreError::Unavailable)?;
        guard.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn file_store_set_get_remove() {
        let tmp = tempdir().unwrap();
        let store = FileStore::new(tmp.path().join("nested"));

        assert_eq!(store.get(RECENT_PROMPTS_KEY).unwrap(), None);
        store.set(RECENT_PROMPTS_KEY, "[1,2]").unwrap();
        assert_eq!(
            store.get(RECENT_PROMPTS_KEY).unwrap().as_deref(),
            Some("[1,2]")
        );
        assert!(!tmp
            .path()
            .join("nested")
            .join("recent-prompts.json.tmp")
            .exists());

        store.remove(RECENT_PROMPTS_KEY).unwrap();
        assert_eq!(store.get(RECENT_PROMPTS_KEY).unwrap(), None);
        store.remove(RECENT_PROMPTS_KEY).unwrap();
    }

    #[test]
    fn file_store_rejects_path_like_keys() {
        let tmp = tempdir().unwrap();
        let store = FileStore::new(tmp.path());
        assert!(matches!(
            store.set("../escape", "x"),
            Err(StoreError::InvalidKey(_))
        ));
    }

    #[test]
    fn memory_store_overwrites() {
        let store = MemoryStore::new();
        store.set(ACTIVE_CHAIN_KEY, "a").unwrap();
        store.set(ACTIVE_CHAIN_KEY, "b").unwrap();
        assert_eq!(store.get(ACTIVE_CHAIN_KEY).unwrap().as_deref(), Some("b"));
    }
}
