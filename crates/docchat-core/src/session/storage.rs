//! Durable key-value storage backing the session store.
//!
//! `FileStorage` keeps one file per key under `<DOCCHAT_HOME>/storage/` with
//! restricted permissions (0600). `MemoryStorage` is an in-process map whose
//! clones share the same entries.

use std::collections::HashMap;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result, anyhow};

use crate::config::paths;

/// Durable key holding the raw bearer token.
pub const TOKEN_KEY: &str = "authToken";

/// Durable key holding the JSON session snapshot.
pub const SNAPSHOT_KEY: &str = "auth-storage";

/// A passive string key-value sink. Only the session store writes to it.
pub trait SessionStorage: Send {
    /// Reads a key. Missing keys are `Ok(None)`.
    ///
    /// # Errors
    /// Returns an error if the backing store cannot be read.
    fn get(&self, key: &str) -> Result<Option<String>>;

    /// Writes a key, replacing any previous value.
    ///
    /// # Errors
    /// Returns an error if the value was not durably written.
    fn set(&mut self, key: &str, value: &str) -> Result<()>;

    /// Removes a key. Removing a missing key is not an error.
    ///
    /// # Errors
    /// Returns an error if the key exists but could not be removed.
    fn remove(&mut self, key: &str) -> Result<()>;
}

/// File-per-key storage rooted at a directory.
#[derive(Debug, Clone)]
pub struct FileStorage {
    dir: PathBuf,
}

impl FileStorage {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Storage under `<DOCCHAT_HOME>/storage`.
    pub fn default_location() -> Self {
        Self::new(paths::storage_dir())
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn key_path(&self, key: &str) -> PathBuf {
        self.dir.join(key)
    }
}

impl SessionStorage for FileStorage {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let path = self.key_path(key);
        if !path.exists() {
            return Ok(None);
        }
        let contents = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        Ok(Some(contents))
    }

    fn set(&mut self, key: &str, value: &str) -> Result<()> {
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("Failed to create directory {}", self.dir.display()))?;

        let path = self.key_path(key);
        let tmp_path = path.with_extension("tmp");
        write_private(&tmp_path, value)?;
        fs::rename(&tmp_path, &path).with_context(|| {
            format!(
                "Failed to rename {} to {}",
                tmp_path.display(),
                path.display()
            )
        })?;
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<()> {
        let path = self.key_path(key);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => {
                Err(err).with_context(|| format!("Failed to remove {}", path.display()))
            }
        }
    }
}

fn write_private(path: &Path, contents: &str) -> Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o600)
            .open(path)
            .with_context(|| format!("Failed to open {} for writing", path.display()))?;
        file.write_all(contents.as_bytes())
            .with_context(|| format!("Failed to write to {}", path.display()))?;
        file.sync_all()
            .with_context(|| format!("Failed to sync {}", path.display()))?;
    }

    #[cfg(not(unix))]
    {
        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)
            .with_context(|| format!("Failed to open {} for writing", path.display()))?;
        file.write_all(contents.as_bytes())
            .with_context(|| format!("Failed to write to {}", path.display()))?;
    }

    Ok(())
}

/// In-memory storage. Clones share entries, so a caller can keep a handle to
/// inspect what the store persisted.
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    entries: Arc<Mutex<HashMap<String, String>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionStorage for MemoryStorage {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let entries = self
            .entries
            .lock()
            .map_err(|_| anyhow!("memory storage lock poisoned"))?;
        Ok(entries.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: &str) -> Result<()> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| anyhow!("memory storage lock poisoned"))?;
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<()> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| anyhow!("memory storage lock poisoned"))?;
        entries.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::*;

    #[test]
    fn test_file_storage_roundtrip_and_remove() {
        let dir = tempdir().unwrap();
        let mut storage = FileStorage::new(dir.path().join("storage"));

        assert_eq!(storage.get(TOKEN_KEY).unwrap(), None);

        storage.set(TOKEN_KEY, "tok-1").unwrap();
        storage.set(TOKEN_KEY, "tok-2").unwrap();
        assert_eq!(storage.get(TOKEN_KEY).unwrap().as_deref(), Some("tok-2"));

        storage.remove(TOKEN_KEY).unwrap();
        assert_eq!(storage.get(TOKEN_KEY).unwrap(), None);
        // Removing again is fine.
        storage.remove(TOKEN_KEY).unwrap();
    }

    #[cfg(unix)]
    #[test]
    fn test_file_storage_restricts_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempdir().unwrap();
        let mut storage = FileStorage::new(dir.path());
        storage.set(SNAPSHOT_KEY, "{}").unwrap();

        let mode = fs::metadata(dir.path().join(SNAPSHOT_KEY))
            .unwrap()
            .permissions()
            .mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn test_memory_storage_clones_share_entries() {
        let handle = MemoryStorage::new();
        let mut writer = handle.clone();
        writer.set("k", "v").unwrap();
        assert_eq!(handle.get("k").unwrap().as_deref(), Some("v"));
    }
}
