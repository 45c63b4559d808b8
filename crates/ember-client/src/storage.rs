//! Durable key-value storage for one endpoint's local state.
//!
//! The contract is deliberately small — get/set/remove/clear over string
//! keys — because everything above it (sessions, contacts, ledger) treats
//! persistence as a dumb document. `FileStore` keeps the whole map as one
//! JSON object in the platform config directory, written atomically.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use tracing::warn;

use crate::error::ClientError;

/// Storage key for the local identity string.
pub const KEY_IDENTITY: &str = "identity";
/// Storage key for the hex-encoded private key.
pub const KEY_PRIV_KEY: &str = "priv_key";
/// Storage key for the hex-encoded public key.
pub const KEY_PUB_KEY: &str = "pub_key";
/// Storage key for the absolute session expiry (milliseconds since epoch).
pub const KEY_SESSION_EXPIRY: &str = "session_expiry";
/// Storage key for the contact book JSON document.
pub const KEY_CONTACTS: &str = "contacts";
/// Storage key for the message ledger JSON document.
pub const KEY_MESSAGES: &str = "messages";

pub trait Store: Send {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&mut self, key: &str, value: String);
    fn remove(&mut self, key: &str);
    /// Destroy every key. Must be idempotent.
    fn clear(&mut self);
}

/// In-memory store for tests and `--ephemeral` sessions.
#[derive(Default)]
pub struct MemoryStore {
    map: HashMap<String, String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Store for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        self.map.get(key).cloned()
    }

    fn set(&mut self, key: &str, value: String) {
        self.map.insert(key.to_string(), value);
    }

    fn remove(&mut self, key: &str) {
        self.map.remove(key);
    }

    fn clear(&mut self) {
        self.map.clear();
    }
}

/// File-backed store: one JSON object, written through on every mutation.
pub struct FileStore {
    path: PathBuf,
    map: HashMap<String, String>,
}

impl FileStore {
    /// Open (or create) the default store at `<config_dir>/ember/session.json`.
    pub fn open_default() -> Result<Self, ClientError> {
        let dir = dirs::config_dir()
            .ok_or_else(|| ClientError::Storage("no config directory on this platform".into()))?
            .join("ember");
        std::fs::create_dir_all(&dir)
            .map_err(|e| ClientError::Storage(format!("failed to create {}: {}", dir.display(), e)))?;
        Ok(Self::open(dir.join("session.json")))
    }

    /// Open a store at an explicit path. A missing or unparseable file
    /// starts empty (a torn write must not brick the endpoint).
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let map = match std::fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str(&contents) {
                Ok(map) => map,
                Err(e) => {
                    warn!("failed to parse {}: {} — starting empty", path.display(), e);
                    HashMap::new()
                }
            },
            Err(_) => HashMap::new(),
        };
        Self { path, map }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write to .tmp, then rename, so a crash never leaves a half-written file.
    fn persist(&self) {
        let tmp_path = self.path.with_extension("json.tmp");
        let json = match serde_json::to_string_pretty(&self.map) {
            Ok(json) => json,
            Err(e) => {
                warn!("failed to serialize session store: {}", e);
                return;
            }
        };
        if let Err(e) = std::fs::write(&tmp_path, json) {
            warn!("failed to write {}: {}", tmp_path.display(), e);
            return;
        }
        if let Err(e) = std::fs::rename(&tmp_path, &self.path) {
            warn!("failed to rename session store: {}", e);
        }
    }
}

impl Store for FileStore {
    fn get(&self, key: &str) -> Option<String> {
        self.map.get(key).cloned()
    }

    fn set(&mut self, key: &str, value: String) {
        self.map.insert(key.to_string(), value);
        self.persist();
    }

    fn remove(&mut self, key: &str) {
        if self.map.remove(key).is_some() {
            self.persist();
        }
    }

    fn clear(&mut self) {
        self.map.clear();
        let _ = std::fs::remove_file(&self.path);
        let _ = std::fs::remove_file(self.path.with_extension("json.tmp"));
    }
}
