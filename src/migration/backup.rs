//! Backup manager
//!
//! Every backup lives in its own directory under the backup root:
//!
//! ```text
//! <root>/<YYYYmmdd_HHMMSS>_<backup_id>/
//!   backup.json     metadata record (MigrationBackup)
//!   payload/        copied source tree or the scoped sub-paths
//! ```
//!
//! The metadata file is written last and atomically, so a directory without
//! `backup.json` is never reported as a backup.

use chrono::{Duration, Utc};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, instrument, warn};

use super::detector::{LEGACY_CACHE_CANDIDATES, LEGACY_CONFIG_CANDIDATES, LEGACY_MARKER_DIR};
use super::fsutil::{copy_subpaths, copy_tree, dir_size, remove_path};
use super::types::{
    generate_id, BackupFilter, BackupType, CleanupSummary, MigrationBackup, MigrationError,
    MigrationOutcome,
};

/// Metadata record beside every payload
pub const BACKUP_METADATA_FILE: &str = "backup.json";

/// Directory holding the copied data
pub const BACKUP_PAYLOAD_DIR: &str = "payload";

/// Retention used when a cleanup does not name one
pub const DEFAULT_RETENTION_DAYS: u32 = 30;

/// Creates, lists, loads and prunes migration backups
#[derive(Debug, Clone)]
pub struct BackupManager {
    root: PathBuf,
}

impl BackupManager {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Sub-paths of a workspace covered by a partial backup type
    pub fn scope_paths(backup_type: BackupType) -> Vec<PathBuf> {
        match backup_type {
            BackupType::Full => Vec::new(),
            BackupType::Config => LEGACY_CONFIG_CANDIDATES.iter().map(PathBuf::from).collect(),
            BackupType::Cache => LEGACY_CACHE_CANDIDATES.iter().map(PathBuf::from).collect(),
            BackupType::Workspace => vec![PathBuf::from(LEGACY_MARKER_DIR)],
        }
    }

    /// Copy `source` into a fresh backup directory and record its metadata.
    ///
    /// On any failure the partially written directory is removed before the
    /// error is returned.
    #[instrument(skip(self))]
    pub async fn create_backup(
        &self,
        source: &Path,
        workspace_name: &str,
        migration_id: &str,
        backup_type: BackupType,
    ) -> MigrationOutcome<MigrationBackup> {
        if !source.exists() {
            return Err(MigrationError::SourceNotFound(source.to_path_buf()));
        }
        if source.is_dir() && self.root.starts_with(source) {
            return Err(MigrationError::BackupFailed(format!(
                "backup root {} lies inside the source {}",
                self.root.display(),
                source.display()
            )));
        }

        let created_at = Utc::now();
        let backup_id = generate_id("bk", migration_id);
        let backup_path = self.root.join(format!(
            "{}_{}",
            created_at.format("%Y%m%d_%H%M%S"),
            backup_id
        ));
        let source_is_file = source.is_file();

        let mut backup = MigrationBackup {
            backup_id,
            migration_id: migration_id.to_string(),
            workspace_name: workspace_name.to_string(),
            created_at,
            backup_path: backup_path.clone(),
            backup_type,
            size_bytes: 0,
            source_path: source.to_path_buf(),
            source_is_file,
            metadata: BTreeMap::new(),
        };

        let source = source.to_path_buf();
        let result = tokio::task::spawn_blocking(move || {
            let outcome = write_backup(&source, &mut backup);
            if outcome.is_err() {
                if let Err(e) = remove_path(&backup.backup_path) {
                    warn!(
                        "Failed to remove partial backup {}: {}",
                        backup.backup_path.display(),
                        e
                    );
                }
            }
            outcome.map(|_| backup)
        })
        .await?;

        match result {
            Ok(backup) => {
                info!(
                    "Created {} backup {} ({} bytes) at {}",
                    backup.backup_type,
                    backup.backup_id,
                    backup.size_bytes,
                    backup.backup_path.display()
                );
                Ok(backup)
            }
            Err(e) => Err(MigrationError::BackupFailed(e.to_string())),
        }
    }

    /// All readable backups matching `filter`, newest first
    pub fn list_backups(&self, filter: &BackupFilter) -> MigrationOutcome<Vec<MigrationBackup>> {
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut backups: Vec<MigrationBackup> = entries
            .filter_map(Result::ok)
            .map(|entry| entry.path())
            .filter(|path| path.join(BACKUP_METADATA_FILE).is_file())
            .filter_map(|path| match read_metadata(&path) {
                Ok(backup) => Some(backup),
                Err(e) => {
                    warn!("Ignoring unreadable backup {}: {}", path.display(), e);
                    None
                }
            })
            .filter(|backup| filter.matches(backup))
            .collect();

        backups.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| b.backup_path.cmp(&a.backup_path))
        });
        Ok(backups)
    }

    /// Load a backup by id or by the path of its directory
    pub fn load_backup(&self, id_or_path: &str) -> MigrationOutcome<MigrationBackup> {
        let as_path = Path::new(id_or_path);
        if as_path.join(BACKUP_METADATA_FILE).is_file() {
            return read_metadata(as_path);
        }
        self.list_backups(&BackupFilter::default())?
            .into_iter()
            .find(|backup| {
                backup.backup_id == id_or_path
                    || backup
                        .backup_path
                        .file_name()
                        .is_some_and(|name| name == id_or_path)
            })
            .ok_or_else(|| MigrationError::BackupNotFound(id_or_path.to_string()))
    }

    /// Remove backups older than `days_to_keep` days. Per-backup failures are
    /// counted, not raised.
    #[instrument(skip(self))]
    pub async fn cleanup_old_backups(&self, days_to_keep: u32) -> MigrationOutcome<CleanupSummary> {
        let cutoff = Utc::now() - Duration::days(i64::from(days_to_keep));
        let stale: Vec<MigrationBackup> = self
            .list_backups(&BackupFilter::default())?
            .into_iter()
            .filter(|backup| backup.created_at < cutoff)
            .collect();

        let summary = tokio::task::spawn_blocking(move || {
            let mut summary = CleanupSummary::default();
            for backup in stale {
                let size = dir_size(&backup.backup_path);
                match remove_path(&backup.backup_path) {
                    Ok(()) => {
                        debug!("Removed backup {}", backup.backup_id);
                        summary.removed += 1;
                        summary.freed_bytes += size;
                    }
                    Err(e) => {
                        warn!("Failed to remove backup {}: {}", backup.backup_id, e);
                        summary.failed += 1;
                    }
                }
            }
            summary
        })
        .await?;

        info!(
            "Backup cleanup removed {} backups ({} failed, {} bytes freed)",
            summary.removed, summary.failed, summary.freed_bytes
        );
        Ok(summary)
    }
}

/// Read the metadata record of a backup directory.
///
/// `backup_path` is taken from where the directory actually is, so a moved
/// backup root still resolves.
pub fn read_metadata(dir: &Path) -> MigrationOutcome<MigrationBackup> {
    let text = fs::read_to_string(dir.join(BACKUP_METADATA_FILE))?;
    let mut backup: MigrationBackup = serde_json::from_str(&text)?;
    backup.backup_path = dir.to_path_buf();
    Ok(backup)
}

fn write_backup(source: &Path, backup: &mut MigrationBackup) -> MigrationOutcome<()> {
    let payload = backup.payload_dir();
    fs::create_dir_all(&payload)?;

    let stats = if backup.source_is_file {
        let file_name = source
            .file_name()
            .ok_or_else(|| MigrationError::InvalidRequest(format!("{} has no file name", source.display())))?;
        copy_tree(source, &payload.join(file_name))?
    } else if backup.backup_type == BackupType::Full {
        copy_tree(source, &payload)?
    } else {
        let scope = BackupManager::scope_paths(backup.backup_type);
        backup.metadata.insert(
            "scope".to_string(),
            Value::from(
                scope
                    .iter()
                    .filter(|path| source.join(path).exists())
                    .map(|path| path.display().to_string())
                    .collect::<Vec<_>>(),
            ),
        );
        copy_subpaths(source, &scope, &payload)?
    };

    backup.size_bytes = stats.bytes;
    backup
        .metadata
        .insert("file_count".to_string(), Value::from(stats.files));
    backup.metadata.insert(
        "tool_version".to_string(),
        Value::from(env!("CARGO_PKG_VERSION")),
    );
    write_metadata(&backup.backup_path, backup)
}

fn write_metadata(dir: &Path, backup: &MigrationBackup) -> MigrationOutcome<()> {
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    serde_json::to_writer_pretty(&mut tmp, backup)?;
    tmp.as_file().sync_all()?;
    tmp.persist(dir.join(BACKUP_METADATA_FILE))
        .map_err(|e| MigrationError::Io(e.error))?;
    Ok(())
}
