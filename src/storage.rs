//! Durable key/value storage for drafts and completion marks.
//!
//! Keys are flat strings such as `respuestas_docente`; values are opaque strings
//! (usually JSON). Each key maps to one file under the storage directory.

use crate::error::PortalResult;
#[cfg(test)]
use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;
#[cfg(test)]
use std::sync::Mutex;

pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> PortalResult<Option<String>>;
    fn set(&self, key: &str, value: &str) -> PortalResult<()>;
    fn remove(&self, key: &str) -> PortalResult<()>;
}

#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    pub fn open(root: impl Into<PathBuf>) -> PortalResult<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    /// Percent-encode the key so distinct keys never share a file.
    fn path_for(&self, key: &str) -> PathBuf {
        self.root.join(format!("{}.json", urlencoding::encode(key)))
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> PortalResult<Option<String>> {
        match fs::read_to_string(self.path_for(key)) {
            Ok(value) => Ok(Some(value)),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    fn set(&self, key: &str, value: &str) -> PortalResult<()> {
        // Replace atomically; readers never see a partial value.
        let path = self.path_for(key);
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, value)?;
        fs::rename(&tmp, &path)?;
        Ok(())
    }

    fn remove(&self, key: &str) -> PortalResult<()> {
        match fs::remove_file(self.path_for(key)) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}

/// In-process store, used by tests.
#[cfg(test)]
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

#[cfg(test)]
impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[cfg(test)]
impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> PortalResult<Option<String>> {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> PortalResult<()> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> PortalResult<()> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_file_store_set_get_remove() {
        let dir = TempDir::new().unwrap();
        let store = FileStore::open(dir.path()).unwrap();

        assert_eq!(store.get("respuestas_docente").unwrap(), None);
        store.set("respuestas_docente", "{\"1\":{\"g1\":9}}").unwrap();
        assert_eq!(
            store.get("respuestas_docente").unwrap().as_deref(),
            Some("{\"1\":{\"g1\":9}}")
        );

        store.remove("respuestas_docente").unwrap();
        assert_eq!(store.get("respuestas_docente").unwrap(), None);
        // Removing twice is fine.
        store.remove("respuestas_docente").unwrap();
    }

    #[test]
    fn test_file_store_survives_reopen() {
        let dir = TempDir::new().unwrap();
        {
            let store = FileStore::open(dir.path()).unwrap();
            store.set("actual_evaluar_docente_15", "\"4\"").unwrap();
        }
        let store = FileStore::open(dir.path()).unwrap();
        assert_eq!(
            store.get("actual_evaluar_docente_15").unwrap().as_deref(),
            Some("\"4\"")
        );
    }

    #[test]
    fn test_file_store_keeps_keys_inside_root() {
        let dir = TempDir::new().unwrap();
        let store = FileStore::open(dir.path()).unwrap();
        store.set("../escape", "x").unwrap();
        assert!(dir.path().join("..%2Fescape.json").exists());
        assert_eq!(store.get("../escape").unwrap().as_deref(), Some("x"));
    }

    #[test]
    fn test_file_store_distinct_keys_do_not_collide() {
        let dir = TempDir::new().unwrap();
        let store = FileStore::open(dir.path()).unwrap();
        store.set("respuestas_evaluar_docente_R/7", "slash").unwrap();
        store.set("respuestas_evaluar_docente_R_7", "underscore").unwrap();

        assert_eq!(
            store.get("respuestas_evaluar_docente_R/7").unwrap().as_deref(),
            Some("slash")
        );
        assert_eq!(
            store.get("respuestas_evaluar_docente_R_7").unwrap().as_deref(),
            Some("underscore")
        );
    }
}
