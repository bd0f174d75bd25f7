use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use anyhow::{Context, Result};
use tracing::{debug, warn};

use super::{Storage, SESSION_KEYS};

/// Storage file name inside the storage directory
const STORAGE_FILE: &str = "session.json";

/// Storage persisted as a flat JSON object on disk.
///
/// The whole file is rewritten on every mutation. Values are cached in memory
/// after the first successful read, so the file is only parsed once per process.
pub struct FileStorage {
    path: PathBuf,
    entries: Mutex<Option<BTreeMap<String, String>>>,
}

impl FileStorage {
    /// Create a storage that keeps its file inside `dir`
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self::at_path(dir.as_ref().join(STORAGE_FILE))
    }

    /// Create a storage backed by an explicit file path
    pub fn at_path(path: PathBuf) -> Self {
        Self {
            path,
            entries: Mutex::new(None),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_file(&self) -> Result<BTreeMap<String, String>> {
        if !self.path.exists() {
            return Ok(BTreeMap::new());
        }
        let contents = std::fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read storage file {}", self.path.display()))?;
        if contents.trim().is_empty() {
            return Ok(BTreeMap::new());
        }
        serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse storage file {}", self.path.display()))
    }

    fn write_file(&self, entries: &BTreeMap<String, String>) -> Result<()> {
        if entries.is_empty() {
            return self.discard_file();
        }
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create storage directory")?;
        }
        let contents = serde_json::to_string_pretty(entries)?;
        std::fs::write(&self.path, contents).context("Failed to write storage file")?;
        debug!(path = %self.path.display(), keys = entries.len(), "Storage file written");
        Ok(())
    }

    fn discard_file(&self) -> Result<()> {
        if self.path.exists() {
            std::fs::remove_file(&self.path).context("Failed to remove storage file")?;
        }
        Ok(())
    }

    /// Run `f` against a copy of the loaded entries.
    ///
    /// When `f` reports a change the copy is written out and only then
    /// replaces the cached entries, so a failed write leaves the cache
    /// matching the file.
    fn with_entries<T>(
        &self,
        f: impl FnOnce(&mut BTreeMap<String, String>) -> (T, bool),
    ) -> Result<T> {
        let mut guard = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        let mut entries = match guard.as_ref() {
            Some(cached) => cached.clone(),
            None => self.read_file()?,
        };
        let (out, dirty) = f(&mut entries);
        if dirty {
            self.write_file(&entries)?;
        }
        *guard = Some(entries);
        Ok(out)
    }
}

impl Storage for FileStorage {
    fn get(&self, key: &str) -> Result<Option<String>> {
        self.with_entries(|entries| (entries.get(key).cloned(), false))
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.with_entries(|entries| {
            let changed = entries.get(key).map(String::as_str) != Some(value);
            entries.insert(key.to_string(), value.to_string());
            ((), changed)
        })
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.with_entries(|entries| ((), entries.remove(key).is_some()))
    }

    /// Remove the session keys, discarding a file that cannot be parsed
    fn clear_session(&self) -> Result<()> {
        let mut guard = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        let mut entries = match guard.as_ref() {
            Some(cached) => cached.clone(),
            None => match self.read_file() {
                Ok(entries) => entries,
                Err(e) => {
                    warn!(error = %e, "Discarding unreadable storage file");
                    self.discard_file()?;
                    BTreeMap::new()
                }
            },
        };
        for key in SESSION_KEYS {
            entries.remove(key);
        }
        self.write_file(&entries)?;
        *guard = Some(entries);
        Ok(())
    }
}
