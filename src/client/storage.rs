//! Persisted client auth snapshot.
//!
//! Works like browser local storage: string values under string keys. The
//! auth flow uses exactly two keys, [`TOKEN_KEY`] and [`USER_KEY`].

use anyhow::{Context, Result};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::auth::PublicUser;

/// Key holding the bearer token.
pub const TOKEN_KEY: &str = "auth_token";

/// Key holding the JSON-serialized user snapshot.
pub const USER_KEY: &str = "user_data";

/// Key/value persistence for the client.
pub trait SnapshotStorage: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: &str) -> Result<()>;
    fn remove(&self, key: &str) -> Result<()>;
}

/// Volatile storage, dropped with the process.
#[derive(Debug, Default)]
pub struct MemorySnapshotStorage {
    entries: Mutex<HashMap<String, String>>,
}

impl MemorySnapshotStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SnapshotStorage for MemorySnapshotStorage {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.lock().get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.entries.lock().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.entries.lock().remove(key);
        Ok(())
    }
}

/// One file per key under a directory.
#[derive(Debug, Clone)]
pub struct FileSnapshotStorage {
    dir: PathBuf,
}

impl FileSnapshotStorage {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        // Keys are fixed identifiers; strip anything that could escape the dir.
        let safe: String = key
            .chars()
            .filter(|c| c.is_ascii_alphanumeric() || *c == '_' || *c == '-')
            .collect();
        self.dir.join(safe)
    }
}

impl SnapshotStorage for FileSnapshotStorage {
    fn get(&self, key: &str) -> Option<String> {
        std::fs::read_to_string(self.path_for(key))
            .ok()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        std::fs::create_dir_all(&self.dir)
            .with_context(|| format!("Failed to create {}", self.dir.display()))?;
        let path = self.path_for(key);
        std::fs::write(&path, value)
            .with_context(|| format!("Failed to write {}", path.display()))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let _ = std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o600));
        }
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        let path = self.path_for(key);
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).with_context(|| format!("Failed to remove {}", path.display())),
        }
    }
}

/// Typed access to the two auth keys.
#[derive(Clone)]
pub struct AuthSnapshot<'a> {
    storage: &'a dyn SnapshotStorage,
}

impl<'a> AuthSnapshot<'a> {
    pub fn new(storage: &'a dyn SnapshotStorage) -> Self {
        Self { storage }
    }

    pub fn token(&self) -> Option<String> {
        self.storage.get(TOKEN_KEY)
    }

    /// The stored user. A corrupt snapshot reads as absent.
    pub fn user(&self) -> Option<PublicUser> {
        let raw = self.storage.get(USER_KEY)?;
        match serde_json::from_str(&raw) {
            Ok(user) => Some(user),
            Err(e) => {
                tracing::warn!("Discarding unreadable user snapshot: {e}");
                None
            }
        }
    }

    pub fn save(&self, token: &str, user: &PublicUser) -> Result<()> {
        self.storage.set(TOKEN_KEY, token)?;
        self.save_user(user)
    }

    pub fn save_user(&self, user: &PublicUser) -> Result<()> {
        let json = serde_json::to_string(user)?;
        self.storage.set(USER_KEY, &json)
    }

    /// Remove both keys. Both removals are attempted; the first error wins.
    pub fn clear(&self) -> Result<()> {
        let token = self.storage.remove(TOKEN_KEY);
        let user = self.storage.remove(USER_KEY);
        token.and(user)
    }
}
