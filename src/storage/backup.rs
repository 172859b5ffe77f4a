//! Cold backups of the economy store.
//!
//! A backup is one `tar.gz` of the store directory plus an entry in a JSON
//! index next to the archives, carrying a sha256 checksum that is re-checked
//! before any restore. The store must be closed while a backup is taken or
//! restored; sled files copied mid-write are not guaranteed consistent.

use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tar::{Archive, Builder};

use super::StoreError;

/// Name of the directory entry inside every archive. Restoring into `dest`
/// yields `dest/STORE_DIR_IN_ARCHIVE` as the new store path.
pub const STORE_DIR_IN_ARCHIVE: &str = "store";

const INDEX_FILE: &str = "index.json";

/// One recorded backup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupInfo {
    /// Timestamp-derived identifier, unique per manager.
    pub id: String,
    /// Optional label given at creation time.
    pub name: Option<String>,
    pub created_at: DateTime<Utc>,
    pub size_bytes: u64,
    pub kind: BackupKind,
    /// sha256 of the archive, hex encoded.
    pub checksum: String,
    /// Set once a verification pass has matched the checksum.
    pub verified: bool,
    /// Archive filename relative to the backup directory.
    pub path: PathBuf,
}

/// Who asked for the backup. Retention treats the two differently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackupKind {
    /// Operator-requested; exempt from retention while `keep_manual` is set.
    Manual,
    /// Produced by a timer or maintenance job.
    Scheduled,
}

/// How many archives survive [`BackupManager::apply_retention`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetentionPolicy {
    /// Scheduled backups kept, newest first.
    pub keep_last: usize,
    /// When set, manual backups are never trimmed automatically.
    pub keep_manual: bool,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self {
            keep_last: 7,
            keep_manual: true,
        }
    }
}

/// Creates, verifies, restores, and trims store backups under one directory.
pub struct BackupManager {
    store_path: PathBuf,
    backup_path: PathBuf,
    retention: RetentionPolicy,
    backups: HashMap<String, BackupInfo>,
}

impl BackupManager {
    /// Open a manager over `backup_path`, loading any existing index.
    pub fn new(
        store_path: PathBuf,
        backup_path: PathBuf,
        retention: RetentionPolicy,
    ) -> Result<Self, StoreError> {
        fs::create_dir_all(&backup_path)?;
        let mut manager = Self {
            store_path,
            backup_path,
            retention,
            backups: HashMap::new(),
        };
        manager.load_index()?;
        Ok(manager)
    }

    fn load_index(&mut self) -> Result<(), StoreError> {
        let index_path = self.backup_path.join(INDEX_FILE);
        if index_path.exists() {
            let contents = fs::read_to_string(&index_path)?;
            self.backups = serde_json::from_str(&contents)
                .map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err))?;
        }
        Ok(())
    }

    fn save_index(&self) -> Result<(), StoreError> {
        let index_path = self.backup_path.join(INDEX_FILE);
        let contents = serde_json::to_string_pretty(&self.backups)
            .map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err))?;
        fs::write(&index_path, contents)?;
        Ok(())
    }

    /// Archive the store directory. The store must be closed.
    pub fn create_backup(
        &mut self,
        name: Option<String>,
        kind: BackupKind,
    ) -> Result<BackupInfo, StoreError> {
        let timestamp = Utc::now();
        let id = format!("backup_{}", timestamp.format("%Y%m%d_%H%M%S_%3f"));
        let filename = format!("{}.tar.gz", id);
        let archive_path = self.backup_path.join(&filename);

        info!("backup: creating {} ({:?})", id, kind);

        let file = File::create(&archive_path)?;
        let encoder = GzEncoder::new(file, Compression::default());
        let mut builder = Builder::new(encoder);
        builder.append_dir_all(STORE_DIR_IN_ARCHIVE, &self.store_path)?;
        // finish the gzip stream before hashing the file
        let encoder = builder.into_inner()?;
        encoder.finish()?;

        let checksum = checksum_file(&archive_path)?;
        let size_bytes = fs::metadata(&archive_path)?.len();

        let backup = BackupInfo {
            id: id.clone(),
            name,
            created_at: timestamp,
            size_bytes,
            kind,
            checksum,
            verified: false,
            path: PathBuf::from(filename),
        };
        self.backups.insert(id.clone(), backup.clone());
        self.save_index()?;

        info!("backup: {} written ({} bytes)", id, size_bytes);
        Ok(backup)
    }

    /// Re-hash an archive against its recorded checksum. A match marks the
    /// entry verified; a mismatch leaves it untouched and returns false.
    pub fn verify_backup(&mut self, id: &str) -> Result<bool, StoreError> {
        let backup = self
            .backups
            .get(id)
            .ok_or_else(|| StoreError::NotFound(format!("backup: {}", id)))?;
        let archive_path = self.backup_path.join(&backup.path);
        if !archive_path.exists() {
            return Err(StoreError::NotFound(format!("backup archive: {}", id)));
        }

        let current = checksum_file(&archive_path)?;
        let valid = current == backup.checksum;
        if valid {
            if let Some(entry) = self.backups.get_mut(id) {
                entry.verified = true;
            }
            self.save_index()?;
            info!("backup: {} verified", id);
        } else {
            warn!("backup: {} failed verification (checksum mismatch)", id);
        }
        Ok(valid)
    }

    /// Unpack an archive into `dest` after re-checking its checksum. The
    /// restored store directory is `dest/STORE_DIR_IN_ARCHIVE`.
    pub fn restore_backup(&self, id: &str, dest: &Path) -> Result<(), StoreError> {
        let backup = self
            .backups
            .get(id)
            .ok_or_else(|| StoreError::NotFound(format!("backup: {}", id)))?;
        let archive_path = self.backup_path.join(&backup.path);
        if !archive_path.exists() {
            return Err(StoreError::NotFound(format!("backup archive: {}", id)));
        }

        let current = checksum_file(&archive_path)?;
        if current != backup.checksum {
            return Err(StoreError::Io(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("backup {} checksum mismatch", id),
            )));
        }

        fs::create_dir_all(dest)?;
        let file = File::open(&archive_path)?;
        let mut archive = Archive::new(GzDecoder::new(file));
        archive.unpack(dest)?;

        info!("backup: {} restored to {}", id, dest.display());
        Ok(())
    }

    /// Trim archives beyond the retention policy. Returns the ids deleted.
    /// Scheduled backups beyond `keep_last` go; manual backups join the pool
    /// only when `keep_manual` is off.
    pub fn apply_retention(&mut self) -> Result<Vec<String>, StoreError> {
        let mut candidates: Vec<&BackupInfo> = self
            .backups
            .values()
            .filter(|b| b.kind == BackupKind::Scheduled || !self.retention.keep_manual)
            .collect();
        candidates.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        let doomed: Vec<String> = candidates
            .iter()
            .skip(self.retention.keep_last)
            .map(|b| b.id.clone())
            .collect();

        for id in &doomed {
            if let Some(backup) = self.backups.remove(id) {
                let archive_path = self.backup_path.join(&backup.path);
                if archive_path.exists() {
                    fs::remove_file(&archive_path)?;
                }
                info!("backup: trimmed {}", id);
            }
        }
        if !doomed.is_empty() {
            self.save_index()?;
        }
        Ok(doomed)
    }

    /// All recorded backups, newest first.
    pub fn list_backups(&self) -> Vec<BackupInfo> {
        let mut backups: Vec<BackupInfo> = self.backups.values().cloned().collect();
        backups.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        backups
    }

    pub fn get_backup(&self, id: &str) -> Option<&BackupInfo> {
        self.backups.get(id)
    }

    /// Delete one backup. Manual backups are refused while `keep_manual` is
    /// set, so clearing the flag is an explicit operator decision.
    pub fn delete_backup(&mut self, id: &str) -> Result<(), StoreError> {
        let backup = self
            .backups
            .remove(id)
            .ok_or_else(|| StoreError::NotFound(format!("backup: {}", id)))?;

        if backup.kind == BackupKind::Manual && self.retention.keep_manual {
            self.backups.insert(id.to_string(), backup);
            return Err(StoreError::Io(io::Error::new(
                io::ErrorKind::PermissionDenied,
                "manual backups are kept by the retention policy",
            )));
        }

        let archive_path = self.backup_path.join(&backup.path);
        if archive_path.exists() {
            fs::remove_file(&archive_path)?;
        }
        self.save_index()?;
        info!("backup: deleted {}", id);
        Ok(())
    }
}

fn checksum_file(path: &Path) -> Result<String, StoreError> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; 8192];
    loop {
        let n = file.read(&mut buffer)?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
    }
    Ok(format!("{:x}", hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn seed_store_dir(path: &Path) {
        fs::create_dir_all(path).expect("store dir");
        fs::write(path.join("db"), b"not a real sled segment").expect("db file");
        fs::write(path.join("conf"), b"segment_size: 524288").expect("conf file");
    }

    fn manager(temp: &TempDir, retention: RetentionPolicy) -> BackupManager {
        let store_path = temp.path().join("store");
        seed_store_dir(&store_path);
        BackupManager::new(store_path, temp.path().join("backups"), retention).expect("manager")
    }

    #[test]
    fn test_create_and_verify_backup() {
        let temp = TempDir::new().expect("tempdir");
        let mut manager = manager(&temp, RetentionPolicy::default());

        let backup = manager
            .create_backup(Some("before migration".to_string()), BackupKind::Manual)
            .expect("create");
        assert!(backup.size_bytes > 0);
        assert!(!backup.checksum.is_empty());
        assert!(!backup.verified);

        assert!(manager.verify_backup(&backup.id).expect("verify"));
        assert!(manager.get_backup(&backup.id).expect("entry").verified);
    }

    #[test]
    fn test_verify_detects_tampering() {
        let temp = TempDir::new().expect("tempdir");
        let mut manager = manager(&temp, RetentionPolicy::default());
        let backup = manager.create_backup(None, BackupKind::Manual).expect("create");

        let archive_path = temp.path().join("backups").join(&backup.path);
        fs::write(&archive_path, b"scribbled over").expect("tamper");

        assert!(!manager.verify_backup(&backup.id).expect("verify"));
        assert!(!manager.get_backup(&backup.id).expect("entry").verified);
    }

    #[test]
    fn test_restore_round_trip() {
        let temp = TempDir::new().expect("tempdir");
        let mut manager = manager(&temp, RetentionPolicy::default());
        let backup = manager.create_backup(None, BackupKind::Manual).expect("create");

        let dest = temp.path().join("restored");
        manager.restore_backup(&backup.id, &dest).expect("restore");

        let restored_store = dest.join(STORE_DIR_IN_ARCHIVE);
        assert!(restored_store.join("db").exists());
        assert_eq!(
            fs::read(restored_store.join("conf")).expect("conf"),
            b"segment_size: 524288"
        );
    }

    #[test]
    fn test_retention_trims_scheduled_only() {
        let temp = TempDir::new().expect("tempdir");
        let mut manager = manager(
            &temp,
            RetentionPolicy {
                keep_last: 2,
                keep_manual: true,
            },
        );

        manager
            .create_backup(Some("keep me".to_string()), BackupKind::Manual)
            .expect("manual");
        std::thread::sleep(std::time::Duration::from_millis(5));
        for _ in 0..4 {
            manager.create_backup(None, BackupKind::Scheduled).expect("scheduled");
            std::thread::sleep(std::time::Duration::from_millis(5));
        }

        let deleted = manager.apply_retention().expect("retention");
        assert_eq!(deleted.len(), 2);

        let survivors = manager.list_backups();
        assert_eq!(survivors.len(), 3);
        assert!(survivors.iter().any(|b| b.kind == BackupKind::Manual));
    }

    #[test]
    fn test_manual_backups_resist_deletion() {
        let temp = TempDir::new().expect("tempdir");
        let mut manager = manager(&temp, RetentionPolicy::default());
        let backup = manager.create_backup(None, BackupKind::Manual).expect("create");

        assert!(manager.delete_backup(&backup.id).is_err());
        assert!(manager.get_backup(&backup.id).is_some());

        manager.retention.keep_manual = false;
        manager.delete_backup(&backup.id).expect("delete");
        assert!(manager.get_backup(&backup.id).is_none());
    }
}
