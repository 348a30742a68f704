//! Durable per-app key/value storage.
//!
//! `FileStore` keeps a flat JSON string map under
//! `dirs::data_dir()/<namespace>/prefs.json`, written via temp file + rename.
//! `MemoryStore` backs sessions where no data directory is available.

use crate::GatewayError;
use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;
use std::sync::Mutex;

/// Minimal string key/value store.
pub trait KeyValueStore: Send + Sync {
    /// Read a value.
    fn get(&self, key: &str) -> Result<Option<String>, GatewayError>;

    /// Write a value, replacing any previous one.
    fn set(&self, key: &str, value: &str) -> Result<(), GatewayError>;
}

/// File-backed store.
pub struct FileStore {
    /// Path of the JSON map.
    path: PathBuf,
    /// Serializes read-modify-write cycles within the process.
    write_lock: Mutex<()>,
}

impl FileStore {
    /// Create a store under `dirs::data_dir()/<namespace>/`.
    pub fn new(namespace: &str) -> Result<Self, GatewayError> {
        let base_dir = dirs::data_dir()
            .ok_or_else(|| GatewayError::StorageIO("Could not find data directory".to_string()))?;

        Self::with_dir(base_dir.join(namespace))
    }

    /// Create a store inside a specific directory.
    pub fn with_dir(dir: PathBuf) -> Result<Self, GatewayError> {
        fs::create_dir_all(&dir)
            .map_err(|e| GatewayError::StorageIO(format!("Failed to create store dir: {}", e)))?;

        Ok(Self {
            path: dir.join("prefs.json"),
            write_lock: Mutex::new(()),
        })
    }

    /// Path of the backing file.
    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    fn load(&self) -> Result<BTreeMap<String, String>, GatewayError> {
        if !self.path.exists() {
            return Ok(BTreeMap::new());
        }

        let json = fs::read_to_string(&self.path)
            .map_err(|e| GatewayError::StorageIO(format!("Failed to read store: {}", e)))?;

        serde_json::from_str(&json)
            .map_err(|e| GatewayError::StorageIO(format!("Failed to parse store: {}", e)))
    }

    fn save(&self, map: &BTreeMap<String, String>) -> Result<(), GatewayError> {
        let json = serde_json::to_string_pretty(map)
            .map_err(|e| GatewayError::StorageIO(format!("Failed to serialize store: {}", e)))?;

        let temp_path = self.path.with_extension("tmp");
        fs::write(&temp_path, &json)
            .map_err(|e| GatewayError::StorageIO(format!("Failed to write temp file: {}", e)))?;

        fs::rename(&temp_path, &self.path)
            .map_err(|e| GatewayError::StorageIO(format!("Failed to rename store file: {}", e)))?;

        Ok(())
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>, GatewayError> {
        Ok(self.load()?.remove(key))
    }

    fn set(&self, key: &str, value: &str) -> Result<(), GatewayError> {
        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());
        let mut map = self.load()?;
        map.insert(key.to_string(), value.to_string());
        self.save(&map)
    }
}

/// In-process store; contents die with the process.
#[derive(Debug, Default)]
pub struct MemoryStore {
    values: Mutex<BTreeMap<String, String>>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, GatewayError> {
        let values = self.values.lock().unwrap_or_else(|e| e.into_inner());
        Ok(values.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), GatewayError> {
        let mut values = self.values.lock().unwrap_or_else(|e| e.into_inner());
        values.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_file_store_roundtrip() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileStore::with_dir(temp_dir.path().to_path_buf()).unwrap();

        store.set("gateway_anon_id", "abc").unwrap();
        assert_eq!(store.get("gateway_anon_id").unwrap().as_deref(), Some("abc"));
    }

    #[test]
    fn test_file_store_missing_key() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileStore::with_dir(temp_dir.path().to_path_buf()).unwrap();

        assert!(store.get("nothing-here").unwrap().is_none());
    }

    #[test]
    fn test_file_store_survives_reopen() {
        let temp_dir = TempDir::new().unwrap();
        {
            let store = FileStore::with_dir(temp_dir.path().to_path_buf()).unwrap();
            store.set("a", "1").unwrap();
            store.set("b", "2").unwrap();
        }

        let store = FileStore::with_dir(temp_dir.path().to_path_buf()).unwrap();
        assert_eq!(store.get("a").unwrap().as_deref(), Some("1"));
        assert_eq!(store.get("b").unwrap().as_deref(), Some("2"));
        assert!(!store.path().with_extension("tmp").exists());
    }

    #[test]
    fn test_file_store_corrupt_file() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileStore::with_dir(temp_dir.path().to_path_buf()).unwrap();
        fs::write(store.path(), "not json").unwrap();

        assert!(matches!(store.get("a"), Err(GatewayError::StorageIO(_))));
    }

    #[test]
    fn test_memory_store_overwrites() {
        let store = MemoryStore::new();
        store.set("k", "v1").unwrap();
        store.set("k", "v2").unwrap();
        assert_eq!(store.get("k").unwrap().as_deref(), Some("v2"));
    }
}
