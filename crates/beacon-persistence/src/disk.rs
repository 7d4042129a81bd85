//! On-disk storage handle
//!
//! Layout:
//!
//! ```text
//! {base}/
//! ├── current/{directory}/{name}   # live records
//! └── archive/{directory}_{ts}/    # archived directories
//! ```
//!
//! Every record is written to a temporary file, synced, and then renamed
//! over its final name, so readers never observe a partially written record.
//! The parent directory is synced after every rename so the new entry itself
//! survives a crash.

use crate::{validate_name, DataDescriptor, Handle, PersistenceError, Result};
use chrono::Utc;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::debug;

pub(crate) const TMP_SUFFIX: &str = ".tmp";

const CURRENT_DIR: &str = "current";
const ARCHIVE_DIR: &str = "archive";

/// Storage handle backed by the local filesystem
#[derive(Debug, Clone)]
pub struct DiskHandle {
    current: PathBuf,
    archive: PathBuf,
}

fn io_error(path: &Path, source: std::io::Error) -> PersistenceError {
    PersistenceError::Io {
        path: path.display().to_string(),
        source,
    }
}

/// Flush directory entries (creations, renames) to disk.
#[cfg(unix)]
fn sync_dir(dir: &Path) -> Result<()> {
    fs::File::open(dir)
        .and_then(|d| d.sync_all())
        .map_err(|e| io_error(dir, e))
}

/// Directory handles cannot be synced on this platform.
#[cfg(not(unix))]
fn sync_dir(_dir: &Path) -> Result<()> {
    Ok(())
}

impl DiskHandle {
    /// Open (and create if needed) a storage root at `base`
    pub fn new(base: impl AsRef<Path>) -> Result<Self> {
        let base = base.as_ref();
        let current = base.join(CURRENT_DIR);
        let archive = base.join(ARCHIVE_DIR);

        fs::create_dir_all(&current).map_err(|e| io_error(&current, e))?;
        fs::create_dir_all(&archive).map_err(|e| io_error(&archive, e))?;
        sync_dir(base)?;

        Ok(Self { current, archive })
    }

    fn read_directory(&self, dir: &Path, directory: &str) -> Result<Vec<DataDescriptor>> {
        let mut records = Vec::new();

        for entry in fs::read_dir(dir).map_err(|e| io_error(dir, e))? {
            let entry = entry.map_err(|e| io_error(dir, e))?;
            let path = entry.path();
            if !path.is_file() {
                continue;
            }

            let name = entry.file_name().to_string_lossy().into_owned();
            // Leftover from an interrupted save
            if name.ends_with(TMP_SUFFIX) {
                continue;
            }

            let content = fs::read(&path).map_err(|e| io_error(&path, e))?;
            records.push(DataDescriptor {
                directory: directory.to_string(),
                name,
                content,
            });
        }

        Ok(records)
    }
}

impl Handle for DiskHandle {
    fn save(&self, data: &[u8], directory: &str, name: &str) -> Result<()> {
        validate_name(directory)?;
        validate_name(name)?;

        let dir = self.current.join(directory);
        if !dir.is_dir() {
            fs::create_dir_all(&dir).map_err(|e| io_error(&dir, e))?;
            sync_dir(&self.current)?;
        }

        let target = dir.join(name);
        let tmp = dir.join(format!("{name}{TMP_SUFFIX}"));

        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&tmp)
            .map_err(|e| io_error(&tmp, e))?;
        file.write_all(data).map_err(|e| io_error(&tmp, e))?;
        file.flush().map_err(|e| io_error(&tmp, e))?;
        file.sync_all().map_err(|e| io_error(&tmp, e))?;
        drop(file);

        fs::rename(&tmp, &target).map_err(|e| io_error(&target, e))?;
        sync_dir(&dir)?;

        debug!(directory, name, bytes = data.len(), "Record saved");
        Ok(())
    }

    fn read_all(&self) -> Result<Vec<DataDescriptor>> {
        let mut records = Vec::new();

        for entry in fs::read_dir(&self.current).map_err(|e| io_error(&self.current, e))? {
            let entry = entry.map_err(|e| io_error(&self.current, e))?;
            let path = entry.path();
            if !path.is_dir() {
                continue;
            }

            let directory = entry.file_name().to_string_lossy().into_owned();
            records.extend(self.read_directory(&path, &directory)?);
        }

        records.sort_by(|a, b| (&a.directory, &a.name).cmp(&(&b.directory, &b.name)));
        Ok(records)
    }

    fn archive(&self, directory: &str) -> Result<()> {
        validate_name(directory)?;

        let source = self.current.join(directory);
        if !source.is_dir() {
            return Err(PersistenceError::NotFound(directory.to_string()));
        }

        let stamp = Utc::now().format("%Y%m%dT%H%M%S%.6f");
        let target = self.archive.join(format!("{directory}_{stamp}"));
        fs::rename(&source, &target).map_err(|e| io_error(&target, e))?;
        sync_dir(&self.current)?;
        sync_dir(&self.archive)?;

        debug!(directory, target = ?target, "Directory archived");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_save_and_reload() {
        let tmp = TempDir::new().unwrap();

        {
            let handle = DiskHandle::new(tmp.path()).unwrap();
            handle.save(b"first", "group_a", "membership_1").unwrap();
            handle.save(b"second", "group_a", "membership_2").unwrap();
            handle.save(b"third", "group_b", "membership_1").unwrap();
        }

        // A fresh handle on the same root sees everything saved before
        let handle = DiskHandle::new(tmp.path()).unwrap();
        let records = handle.read_all().unwrap();

        assert_eq!(records.len(), 3);
        assert_eq!(records[0].directory, "group_a");
        assert_eq!(records[0].name, "membership_1");
        assert_eq!(records[0].content, b"first".to_vec());
        assert_eq!(records[2].directory, "group_b");
    }

    #[test]
    fn test_save_leaves_no_temp_file() {
        let tmp = TempDir::new().unwrap();
        let handle = DiskHandle::new(tmp.path()).unwrap();

        handle.save(b"v1", "group", "membership_1").unwrap();
        handle.save(b"v2", "group", "membership_1").unwrap();

        let dir = tmp.path().join(CURRENT_DIR).join("group");
        let names: Vec<String> = fs::read_dir(&dir)
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["membership_1".to_string()]);
        assert_eq!(fs::read(dir.join("membership_1")).unwrap(), b"v2".to_vec());
    }

    #[test]
    fn test_sync_dir() {
        let tmp = TempDir::new().unwrap();

        sync_dir(tmp.path()).unwrap();
        #[cfg(unix)]
        assert!(matches!(
            sync_dir(&tmp.path().join("missing")),
            Err(PersistenceError::Io { .. })
        ));
    }

    #[test]
    fn test_ignores_interrupted_writes() {
        let tmp = TempDir::new().unwrap();
        let handle = DiskHandle::new(tmp.path()).unwrap();

        handle.save(b"ok", "group", "membership_1").unwrap();
        fs::write(
            tmp.path().join(CURRENT_DIR).join("group").join("membership_2.tmp"),
            b"partial",
        )
        .unwrap();

        let records = handle.read_all().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].name, "membership_1");
    }

    #[test]
    fn test_archive() {
        let tmp = TempDir::new().unwrap();
        let handle = DiskHandle::new(tmp.path()).unwrap();

        handle.save(b"stale", "stale_group", "membership_1").unwrap();
        handle.save(b"live", "live_group", "membership_1").unwrap();

        handle.archive("stale_group").unwrap();

        let records = handle.read_all().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].directory, "live_group");

        let archived = fs::read_dir(tmp.path().join(ARCHIVE_DIR)).unwrap().count();
        assert_eq!(archived, 1);

        assert!(matches!(
            handle.archive("stale_group"),
            Err(PersistenceError::NotFound(_))
        ));
    }
}
