//! Filesystem-backed store: one `<key>.json` file per entry.

use std::fs;
use std::io::{ErrorKind, Write};

use camino::{Utf8Path, Utf8PathBuf};
use tempfile::NamedTempFile;
use tracing::warn;

use crate::{KvStore, StoreError};

/// Extension for entry files; anything else in the directory (including
/// in-flight temp files) is ignored by [`KvStore::keys`].
const ENTRY_EXT: &str = "json";

/// Key-value store that keeps each entry in its own file under a data
/// directory, written atomically (temp file, then rename) so a crashed
/// process never leaves a half-written blob behind.
#[derive(Debug)]
pub struct FsStore {
    dir: Utf8PathBuf,
}

impl FsStore {
    /// Open (creating if needed) a store rooted at `dir`.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Disabled` when the directory cannot be created,
    /// which callers treat as "no persistence available".
    pub fn open(dir: impl Into<Utf8PathBuf>) -> Result<Self, StoreError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)
            .map_err(|err| StoreError::Disabled(format!("cannot create {dir}: {err}")))?;
        Ok(Self { dir })
    }

    fn entry_path(&self, key: &str) -> Utf8PathBuf {
        self.dir.join(format!("{}.{ENTRY_EXT}", sanitize_key(key)))
    }

    fn map_write_err(key: &str, err: std::io::Error) -> StoreError {
        match err.kind() {
            ErrorKind::StorageFull | ErrorKind::QuotaExceeded => StoreError::QuotaExceeded {
                key: key.to_string(),
            },
            ErrorKind::PermissionDenied => StoreError::Disabled(err.to_string()),
            _ => StoreError::Io(err),
        }
    }
}

impl KvStore for FsStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        match fs::read_to_string(self.entry_path(key)) {
            Ok(value) => Ok(Some(value)),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(StoreError::Io(err)),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let path = self.entry_path(key);
        let mut tmp =
            NamedTempFile::new_in(&self.dir).map_err(|err| Self::map_write_err(key, err))?;
        tmp.write_all(value.as_bytes())
            .map_err(|err| Self::map_write_err(key, err))?;
        tmp.as_file()
            .sync_all()
            .map_err(|err| Self::map_write_err(key, err))?;
        tmp.persist(path.as_std_path())
            .map_err(|err| Self::map_write_err(key, err.error))?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        match fs::remove_file(self.entry_path(key)) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(StoreError::Io(err)),
        }
    }

    fn keys(&self) -> Result<Vec<String>, StoreError> {
        let mut keys = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            let Ok(name) = entry.file_name().into_string() else {
                warn!(dir = %self.dir, "skipping non-UTF-8 entry in store directory");
                continue;
            };
            let path = Utf8Path::new(&name);
            if path.extension() == Some(ENTRY_EXT) {
                if let Some(stem) = path.file_stem() {
                    keys.push(stem.to_string());
                }
            }
        }
        keys.sort();
        Ok(keys)
    }
}

/// Map a key to a safe file stem. Keys in this workspace are already plain
/// (`pack.<id>`, `rate_limit`, `history`); anything exotic degrades to `_`.
fn sanitize_key(key: &str) -> String {
    key.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect()
}
