use std::collections::HashMap;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::{lock_api::ArcMutexGuard, Mutex, RawMutex};
use tempfile::NamedTempFile;

use crate::errors::{EnhanceError, Result};

/// The two sibling directories holding uploads and their generated counterparts, keyed by
/// sanitized filename. Last write wins.
pub struct ImageStore {
    upload_dir: PathBuf,
    generated_dir: PathBuf,
    locks: FileLocks,
}

impl ImageStore {
    pub fn new(upload_dir: impl Into<PathBuf>, generated_dir: impl Into<PathBuf>) -> Self {
        Self {
            upload_dir: upload_dir.into(),
            generated_dir: generated_dir.into(),
            locks: FileLocks::default(),
        }
    }

    pub fn create_dirs(&self) -> Result<()> {
        for dir in [&self.upload_dir, &self.generated_dir] {
            fs::create_dir_all(dir).map_err(|e| EnhanceError::FileSystem {
                path: dir.clone(),
                operation: "create directory".to_string(),
                source: e,
            })?;
        }
        Ok(())
    }

    pub fn upload_dir(&self) -> &Path {
        &self.upload_dir
    }

    pub fn generated_dir(&self) -> &Path {
        &self.generated_dir
    }

    pub fn upload_path(&self, filename: &str) -> PathBuf {
        self.upload_dir.join(filename)
    }

    pub fn generated_path(&self, filename: &str) -> PathBuf {
        self.generated_dir.join(filename)
    }

    /// Serializes work on one filename across concurrent requests.
    pub fn lock(&self, filename: &str) -> FileLockGuard<'_> {
        self.locks.acquire(filename)
    }
}

#[derive(Default)]
struct FileLocks {
    entries: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl FileLocks {
    fn acquire(&self, key: &str) -> FileLockGuard<'_> {
        let entry = Arc::clone(self.entries.lock().entry(key.to_string()).or_default());
        FileLockGuard {
            locks: self,
            key: key.to_string(),
            guard: Some(entry.lock_arc()),
        }
    }

    fn release(&self, key: &str) {
        let mut entries = self.entries.lock();
        // Only the map's own reference left: nobody holds or waits on this key.
        if entries.get(key).is_some_and(|entry| Arc::strong_count(entry) == 1) {
            entries.remove(key);
        }
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.entries.lock().len()
    }
}

pub struct FileLockGuard<'a> {
    locks: &'a FileLocks,
    key: String,
    guard: Option<ArcMutexGuard<RawMutex, ()>>,
}

impl Drop for FileLockGuard<'_> {
    fn drop(&mut self) {
        drop(self.guard.take());
        self.locks.release(&self.key);
    }
}

/// Writes `bytes` to a temporary file beside `path`, then renames it into place.
///
/// On failure the temporary file is removed and `path` is left as it was.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let mut file = NamedTempFile::new_in(dir)?;
    file.write_all(bytes)?;
    file.flush()?;
    file.persist(path).map_err(|e| e.error)?;
    Ok(())
}

/// Reduces a client-supplied filename to a flat, ASCII-only name that is safe to join
/// onto a storage directory. Returns `None` when nothing usable remains.
pub fn secure_filename(filename: &str) -> Option<String> {
    let ascii: String = filename
        .chars()
        .filter(char::is_ascii)
        .map(|c| if c == '/' || c == '\\' { ' ' } else { c })
        .collect();

    let joined = ascii.split_whitespace().collect::<Vec<_>>().join("_");
    let kept: String = joined
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
        .collect();
    let trimmed = kept.trim_matches(|c| c == '.' || c == '_');

    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}
