//! Shared-state store.
//!
//! All inter-agent coordination flows through JSON files in one shared
//! directory. Writes are write-temp-then-rename under an exclusive
//! advisory lock, so a reader can never observe a partial file; reads take
//! a shared lock and treat empty or malformed content as "not yet
//! written". Locks are held only for the duration of one operation.

use fs2::FileExt;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("shared directory {0} is not usable: {1}")]
    Directory(String, std::io::Error),

    #[error("io error on {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("serialization failed for {path}: {source}")]
    Serialize {
        path: String,
        source: serde_json::Error,
    },
}

/// Handle bound to the shared coordination directory.
#[derive(Debug, Clone)]
pub struct SharedStore {
    dir: PathBuf,
}

impl SharedStore {
    /// Bind to `dir`, creating it if needed.
    pub fn new(dir: &Path) -> Result<Self, StoreError> {
        fs::create_dir_all(dir)
            .map_err(|e| StoreError::Directory(dir.display().to_string(), e))?;
        Ok(Self {
            dir: dir.to_path_buf(),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_of(&self, filename: &str) -> PathBuf {
        self.dir.join(filename)
    }

    /// Atomically replace `filename` with the serialized value.
    ///
    /// The payload goes to a temp file in the same directory (same
    /// filesystem, so the rename is atomic), is flushed, then renamed over
    /// the target while an exclusive lock is held on the target path.
    pub fn write<T: Serialize>(&self, filename: &str, value: &T) -> Result<(), StoreError> {
        let target = self.path_of(filename);
        let tmp = self.dir.join(format!(".{}.tmp", filename));

        let json = serde_json::to_string_pretty(value).map_err(|e| StoreError::Serialize {
            path: target.display().to_string(),
            source: e,
        })?;

        let lock = self.lock_target(&target)?;
        FileExt::lock_exclusive(&lock).map_err(|e| self.io_err(&target, e))?;

        let result = (|| {
            let mut file = File::create(&tmp).map_err(|e| self.io_err(&tmp, e))?;
            file.write_all(json.as_bytes())
                .map_err(|e| self.io_err(&tmp, e))?;
            file.sync_all().map_err(|e| self.io_err(&tmp, e))?;
            fs::rename(&tmp, &target).map_err(|e| self.io_err(&target, e))
        })();

        let _ = FileExt::unlock(&lock);
        if result.is_err() {
            let _ = fs::remove_file(&tmp);
        }
        result
    }

    /// Read and parse `filename`. Absent, empty, or malformed files come
    /// back as `None`; the owner's next atomic write repairs them.
    pub fn read<T: DeserializeOwned>(&self, filename: &str) -> Result<Option<T>, StoreError> {
        let target = self.path_of(filename);
        if !target.exists() {
            return Ok(None);
        }

        let mut file = match File::open(&target) {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(self.io_err(&target, e)),
        };
        FileExt::lock_shared(&file).map_err(|e| self.io_err(&target, e))?;

        let mut content = String::new();
        let read_result = file.read_to_string(&mut content);
        let _ = FileExt::unlock(&file);
        read_result.map_err(|e| self.io_err(&target, e))?;

        if content.trim().is_empty() {
            return Ok(None);
        }
        match serde_json::from_str(&content) {
            Ok(value) => Ok(Some(value)),
            Err(e) => {
                log::warn!(
                    "treating malformed shared file {} as absent: {}",
                    target.display(),
                    e
                );
                Ok(None)
            }
        }
    }

    /// Append one element to a JSON list file, under the exclusive lock
    /// for the whole load-modify-write. Missing or damaged files start
    /// over as an empty list.
    pub fn append_list<T: Serialize>(&self, filename: &str, element: &T) -> Result<(), StoreError> {
        let target = self.path_of(filename);
        let tmp = self.dir.join(format!(".{}.tmp", filename));

        let lock = self.lock_target(&target)?;
        FileExt::lock_exclusive(&lock).map_err(|e| self.io_err(&target, e))?;

        let result = (|| {
            let mut list: Vec<Value> = match fs::read_to_string(&target) {
                Ok(content) if !content.trim().is_empty() => {
                    serde_json::from_str(&content).unwrap_or_else(|e| {
                        log::warn!(
                            "resetting malformed list {}: {}",
                            target.display(),
                            e
                        );
                        Vec::new()
                    })
                }
                _ => Vec::new(),
            };

            let element = serde_json::to_value(element).map_err(|e| StoreError::Serialize {
                path: target.display().to_string(),
                source: e,
            })?;
            list.push(element);

            let json =
                serde_json::to_string_pretty(&list).map_err(|e| StoreError::Serialize {
                    path: target.display().to_string(),
                    source: e,
                })?;
            let mut file = File::create(&tmp).map_err(|e| self.io_err(&tmp, e))?;
            file.write_all(json.as_bytes())
                .map_err(|e| self.io_err(&tmp, e))?;
            file.sync_all().map_err(|e| self.io_err(&tmp, e))?;
            fs::rename(&tmp, &target).map_err(|e| self.io_err(&target, e))
        })();

        let _ = FileExt::unlock(&lock);
        if result.is_err() {
            let _ = fs::remove_file(&tmp);
        }
        result
    }

    /// Read a JSON list file, tolerating absence as an empty list.
    pub fn read_list<T: DeserializeOwned>(&self, filename: &str) -> Result<Vec<T>, StoreError> {
        Ok(self.read::<Vec<T>>(filename)?.unwrap_or_default())
    }

    /// Lock file handle for a target path. The target itself may not
    /// exist yet, so the lock lives on the real file opened for append.
    fn lock_target(&self, target: &Path) -> Result<File, StoreError> {
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(target)
            .map_err(|e| self.io_err(target, e))
    }

    fn io_err(&self, path: &Path, source: std::io::Error) -> StoreError {
        StoreError::Io {
            path: path.display().to_string(),
            source,
        }
    }
}
