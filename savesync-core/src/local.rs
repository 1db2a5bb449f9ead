//! The local save directory shared by the record store and the sync daemon.
//!
//! Every write replaces the target file atomically (temp file + rename), so a
//! reader never observes a half-written save. Temp files end in `.tmp` and
//! are never listed.

use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::record::SAVE_EXTENSION;

static TEMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// A save file found on disk.
#[derive(Debug, Clone, PartialEq)]
pub struct LocalFile {
    pub name: String,
    pub path: PathBuf,
    pub modified_at: DateTime<Utc>,
}

/// Errors from the local save directory.
#[derive(Error, Debug)]
pub enum LocalStoreError {
    #[error("I/O error for {}: {}", .0.display(), .1)]
    Io(PathBuf, #[source] io::Error),

    #[error("Invalid save file name: {0}")]
    InvalidFileName(String),
}

/// Directory holding one `.save` file per record.
#[derive(Debug, Clone)]
pub struct LocalSaveDir {
    dir: PathBuf,
}

impl LocalSaveDir {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path(&self, name: &str) -> PathBuf {
        self.dir.join(name)
    }

    /// Rejects names that could escape the directory or that are not saves.
    pub fn validate_name(name: &str) -> Result<(), LocalStoreError> {
        let has_extension = Path::new(name).extension().and_then(|e| e.to_str()) == Some(SAVE_EXTENSION);
        if name.is_empty()
            || name.contains('/')
            || name.contains('\\')
            || name.contains("..")
            || name.starts_with('.')
            || !has_extension
        {
            return Err(LocalStoreError::InvalidFileName(name.to_string()));
        }
        Ok(())
    }

    /// Lists save files in directory order.
    ///
    /// A missing directory lists as empty.
    pub fn list(&self) -> Result<Vec<LocalFile>, LocalStoreError> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(LocalStoreError::Io(self.dir.clone(), e)),
        };

        let mut files = Vec::new();

        for entry in entries {
            let entry = entry.map_err(|e| LocalStoreError::Io(self.dir.clone(), e))?;
            let path = entry.path();

            if !path.is_file() {
                continue;
            }
            if path.extension().and_then(|s| s.to_str()) != Some(SAVE_EXTENSION) {
                continue;
            }
            let Some(name) = path.file_name().and_then(|s| s.to_str()).map(str::to_string) else {
                continue;
            };

            let modified = entry
                .metadata()
                .and_then(|m| m.modified())
                .map_err(|e| LocalStoreError::Io(path.clone(), e))?;

            files.push(LocalFile {
                name,
                path,
                modified_at: DateTime::<Utc>::from(modified),
            });
        }

        Ok(files)
    }

    /// Reads a whole save file. Returns `Ok(None)` if it doesn't exist.
    pub fn read(&self, name: &str) -> Result<Option<Vec<u8>>, LocalStoreError> {
        Self::validate_name(name)?;
        let path = self.path(name);

        match fs::read(&path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(LocalStoreError::Io(path, e)),
        }
    }

    /// Creates or replaces a save file atomically.
    pub fn write_atomic(&self, name: &str, bytes: &[u8]) -> Result<(), LocalStoreError> {
        Self::validate_name(name)?;

        fs::create_dir_all(&self.dir).map_err(|e| LocalStoreError::Io(self.dir.clone(), e))?;

        let path = self.path(name);
        let temp_path = self.dir.join(format!(
            "{}.{}-{}.tmp",
            name,
            std::process::id(),
            TEMP_COUNTER.fetch_add(1, Ordering::Relaxed)
        ));

        let result = (|| {
            let mut file = File::create(&temp_path)?;
            file.write_all(bytes)?;
            file.sync_all()
        })();
        if let Err(e) = result {
            let _ = fs::remove_file(&temp_path);
            return Err(LocalStoreError::Io(temp_path, e));
        }

        fs::rename(&temp_path, &path).map_err(|e| {
            let _ = fs::remove_file(&temp_path);
            LocalStoreError::Io(path, e)
        })
    }

    /// Deletes a save file.
    ///
    /// Returns `Ok(true)` if the file was deleted, `Ok(false)` if it didn't exist.
    pub fn delete(&self, name: &str) -> Result<bool, LocalStoreError> {
        Self::validate_name(name)?;
        let path = self.path(name);

        match fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(LocalStoreError::Io(path, e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn test_dir() -> (LocalSaveDir, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let saves = LocalSaveDir::new(temp_dir.path());
        (saves, temp_dir)
    }

    #[test]
    fn test_validate_name() {
        assert!(LocalSaveDir::validate_name("save_1.save").is_ok());
        assert!(LocalSaveDir::validate_name("slot-a.save").is_ok());

        assert!(LocalSaveDir::validate_name("").is_err());
        assert!(LocalSaveDir::validate_name("../save_1.save").is_err());
        assert!(LocalSaveDir::validate_name("dir/save_1.save").is_err());
        assert!(LocalSaveDir::validate_name("dir\\save_1.save").is_err());
        assert!(LocalSaveDir::validate_name(".hidden.save").is_err());
        assert!(LocalSaveDir::validate_name("save_1.txt").is_err());
    }

    #[test]
    fn test_list_missing_dir_is_empty() {
        let temp_dir = TempDir::new().unwrap();
        let saves = LocalSaveDir::new(temp_dir.path().join("nope"));
        assert!(saves.list().unwrap().is_empty());
    }

    #[test]
    fn test_write_read_roundtrip() {
        let (saves, _temp) = test_dir();

        saves.write_atomic("save_1.save", b"first").unwrap();
        saves.write_atomic("save_1.save", b"second").unwrap();

        assert_eq!(saves.read("save_1.save").unwrap().unwrap(), b"second");
        assert!(saves.read("save_2.save").unwrap().is_none());
    }

    #[test]
    fn test_write_creates_directory() {
        let temp_dir = TempDir::new().unwrap();
        let nested = temp_dir.path().join("nested").join("saves");
        let saves = LocalSaveDir::new(&nested);

        saves.write_atomic("save_1.save", b"data").unwrap();
        assert!(nested.join("save_1.save").exists());
    }

    #[test]
    fn test_list_skips_temp_and_foreign_files() {
        let (saves, temp) = test_dir();

        saves.write_atomic("save_1.save", b"data").unwrap();
        fs::write(temp.path().join("save_2.save.123-0.tmp"), b"partial").unwrap();
        fs::write(temp.path().join("notes.txt"), b"x").unwrap();
        fs::create_dir(temp.path().join("dir.save")).unwrap();

        let names: Vec<_> = saves.list().unwrap().into_iter().map(|f| f.name).collect();
        assert_eq!(names, vec!["save_1.save".to_string()]);
    }

    #[test]
    fn test_no_temp_files_left_behind() {
        let (saves, temp) = test_dir();
        saves.write_atomic("save_3.save", b"data").unwrap();

        let leftovers = fs::read_dir(temp.path())
            .unwrap()
            .filter_map(Result::ok)
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .count();
        assert_eq!(leftovers, 0);
    }

    #[test]
    fn test_delete() {
        let (saves, _temp) = test_dir();
        saves.write_atomic("save_1.save", b"data").unwrap();

        assert!(saves.delete("save_1.save").unwrap());
        assert!(!saves.delete("save_1.save").unwrap());
    }
}
