//! Backup records and restore.
//!
//! Before any mutation the source file is copied to a timestamped backup
//! and a [`BackupRecord`] sidecar is persisted beside it. Rollback is a
//! copy back from the backup plus removal of the staged output; the
//! record carries content digests so a restore can verify byte identity.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{Error, Result};

/// Persistent description of one backup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupRecord {
    /// Unique id of this backup
    pub backup_id: String,
    /// Path of the file that was backed up
    pub original_path: PathBuf,
    /// Path of the backup copy
    pub backup_path: PathBuf,
    /// ISO-8601 UTC creation timestamp
    pub created_at: String,
    /// Digest of the plan this backup belongs to
    pub plan_digest: String,
    /// SHA-256 of the source bytes at backup time
    pub source_digest: String,
}

impl BackupRecord {
    /// Copy `source` to `<stem>_backup.pdf` in `dir`, write the
    /// `<stem>_backup.json` sidecar, and fsync both.
    ///
    /// Any failure here means no mutation may be attempted.
    pub fn create(source: &Path, dir: &Path, plan_digest: &str) -> Result<Self> {
        let stem = source
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("document");
        let backup_path = dir.join(format!("{}_backup.pdf", stem));
        let record_path = dir.join(format!("{}_backup.json", stem));

        let make = || -> std::io::Result<(String, Self)> {
            let bytes = fs::read(source)?;
            let source_digest = sha256_hex(&bytes);

            let mut backup_file = fs::File::create(&backup_path)?;
            backup_file.write_all(&bytes)?;
            backup_file.sync_all()?;

            let record = BackupRecord {
                backup_id: uuid::Uuid::new_v4().to_string(),
                original_path: source.to_path_buf(),
                backup_path: backup_path.clone(),
                created_at: chrono::Utc::now().to_rfc3339(),
                plan_digest: plan_digest.to_string(),
                source_digest,
            };

            let json = serde_json::to_string_pretty(&record)
                .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;
            let mut record_file = fs::File::create(&record_path)?;
            record_file.write_all(json.as_bytes())?;
            record_file.sync_all()?;

            Ok((json, record))
        };

        match make() {
            Ok((_, record)) => {
                log::info!(
                    "Backup {} written to {}",
                    record.backup_id,
                    record.backup_path.display()
                );
                Ok(record)
            },
            Err(e) => Err(Error::BackupFailure(format!(
                "cannot back up {}: {}",
                source.display(),
                e
            ))),
        }
    }

    /// Path of the sidecar record file beside the backup.
    pub fn record_path(&self) -> PathBuf {
        self.backup_path.with_extension("json")
    }

    /// Load a record from its sidecar file.
    pub fn load(path: &Path) -> Result<Self> {
        let json = fs::read_to_string(path)?;
        serde_json::from_str(&json)
            .map_err(|e| Error::BackupFailure(format!("corrupt backup record: {}", e)))
    }

    /// Restore the original file from the backup.
    ///
    /// The source is rewritten only when its bytes no longer match the
    /// recorded digest; a pristine source is left untouched.
    pub fn restore(&self) -> Result<PathBuf> {
        let current_digest = fs::read(&self.original_path)
            .map(|bytes| sha256_hex(&bytes))
            .unwrap_or_default();

        if current_digest != self.source_digest {
            fs::copy(&self.backup_path, &self.original_path)?;
            log::warn!(
                "Restored {} from backup {}",
                self.original_path.display(),
                self.backup_id
            );
        } else {
            log::debug!("Source {} is pristine; nothing to restore", self.original_path.display());
        }
        Ok(self.original_path.clone())
    }

    /// Whether the original file currently matches the backed-up bytes.
    pub fn source_is_pristine(&self) -> bool {
        fs::read(&self.original_path)
            .map(|bytes| sha256_hex(&bytes) == self.source_digest)
            .unwrap_or(false)
    }
}

/// Find a backup record by id among the `*_backup.json` sidecars in `dir`.
pub fn find_record(dir: &Path, backup_id: &str) -> Result<BackupRecord> {
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
        if !name.ends_with("_backup.json") {
            continue;
        }
        if let Ok(record) = BackupRecord::load(&path) {
            if record.backup_id == backup_id {
                return Ok(record);
            }
        }
    }
    Err(Error::BackupFailure(format!(
        "no backup record with id {} in {}",
        backup_id,
        dir.display()
    )))
}

/// Hex SHA-256 of a byte slice.
pub fn sha256_hex(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    digest.iter().map(|b| format!("{:02x}", b)).collect()
}
