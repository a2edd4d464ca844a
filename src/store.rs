// file: src/store.rs
// description: durable string-keyed session store (credentials + simulator flag)

use crate::error::TelemetryError;
use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::Mutex;
use tracing::{debug, warn};

pub const ACCESS_TOKEN_KEY: &str = "accessToken";
pub const REFRESH_TOKEN_KEY: &str = "refreshToken";
pub const USER_KEY: &str = "user";

/// Flat string-keyed key/value file, the console's analogue of browser local
/// storage. No schema versioning; unknown keys round-trip untouched. Every
/// mutation writes through to disk.
pub struct StateStore {
    path: PathBuf,
    entries: Mutex<HashMap<String, String>>,
}

impl StateStore {
    /// Load is best-effort: a missing file yields an empty store, a corrupt
    /// one is logged and discarded.
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let entries = match fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str(&contents) {
                Ok(map) => map,
                Err(e) => {
                    warn!("Discarding corrupt state file {}: {}", path.display(), e);
                    HashMap::new()
                }
            },
            Err(_) => {
                debug!("No state file at {}, starting empty", path.display());
                HashMap::new()
            }
        };

        Self {
            path,
            entries: Mutex::new(entries),
        }
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.entries
            .lock()
            .expect("state store lock poisoned")
            .get(key)
            .cloned()
    }

    pub fn set(&self, key: &str, value: &str) -> Result<(), TelemetryError> {
        let mut entries = self.entries.lock().expect("state store lock poisoned");
        entries.insert(key.to_string(), value.to_string());
        self.persist(&entries)
    }

    pub fn remove(&self, key: &str) -> Result<(), TelemetryError> {
        let mut entries = self.entries.lock().expect("state store lock poisoned");
        entries.remove(key);
        self.persist(&entries)
    }

    fn persist(&self, entries: &HashMap<String, String>) -> Result<(), TelemetryError> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.path, serde_json::to_string_pretty(entries)?)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path() -> PathBuf {
        std::env::temp_dir().join(format!("machine-console-store-test-{}.json", uuid::Uuid::new_v4()))
    }

    #[test]
    fn set_get_remove_roundtrip() {
        let path = temp_path();
        let store = StateStore::load(&path);

        store.set(ACCESS_TOKEN_KEY, "tok-123").unwrap();
        assert_eq!(store.get(ACCESS_TOKEN_KEY).as_deref(), Some("tok-123"));

        // A fresh load sees the persisted value
        let reloaded = StateStore::load(&path);
        assert_eq!(reloaded.get(ACCESS_TOKEN_KEY).as_deref(), Some("tok-123"));

        store.remove(ACCESS_TOKEN_KEY).unwrap();
        assert_eq!(store.get(ACCESS_TOKEN_KEY), None);
        let reloaded = StateStore::load(&path);
        assert_eq!(reloaded.get(ACCESS_TOKEN_KEY), None);
    }

    #[test]
    fn corrupt_file_yields_empty_store() {
        let path = temp_path();
        fs::write(&path, "not json at all").unwrap();
        let store = StateStore::load(&path);
        assert_eq!(store.get(ACCESS_TOKEN_KEY), None);
    }
}
