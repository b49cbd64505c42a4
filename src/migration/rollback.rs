//! Rollback manager: restores a source tree from a recorded backup

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{info, instrument, warn};

use super::backup::BackupManager;
use super::detector::{LEGACY_MARKER_DIR, MIGRATION_MARKER_FILE};
use super::fsutil::{merge_tree, remove_path, resolved};
use super::types::{
    BackupFilter, BackupType, MigrationBackup, MigrationError, MigrationOutcome, RollbackRequest,
    RollbackResult,
};

#[derive(Debug, Clone)]
pub struct RollbackManager {
    backups: BackupManager,
    /// Directories a restore target may never equal or contain
    protected: Vec<PathBuf>,
}

impl RollbackManager {
    pub fn new(backups: BackupManager) -> Self {
        let protected = vec![backups.root().to_path_buf()];
        Self { backups, protected }
    }

    /// Also refuse restore targets that equal or contain `path`
    pub fn protect(mut self, path: impl Into<PathBuf>) -> Self {
        self.protected.push(path.into());
        self
    }

    pub fn backups(&self) -> &BackupManager {
        &self.backups
    }

    /// Resolve the backup for `request` and restore it.
    ///
    /// An explicit `backup_id` wins; otherwise the newest backup recorded for
    /// the migration id (and workspace, when given) is used. A backup that
    /// belongs to another workspace is refused.
    #[instrument(skip(self), fields(migration_id = %request.migration_id))]
    pub async fn rollback(&self, request: &RollbackRequest) -> MigrationOutcome<RollbackResult> {
        let backup = self.resolve(request)?;
        if let Some(expected) = &request.workspace_name {
            if *expected != backup.workspace_name {
                return Err(MigrationError::WorkspaceMismatch {
                    expected: expected.clone(),
                    found: backup.workspace_name,
                });
            }
        }
        self.restore(&backup, request.target_path.as_deref()).await
    }

    fn resolve(&self, request: &RollbackRequest) -> MigrationOutcome<MigrationBackup> {
        if let Some(id) = &request.backup_id {
            return self.backups.load_backup(id);
        }
        if request.migration_id.trim().is_empty() {
            return Err(MigrationError::InvalidRequest(
                "either a backup id or a migration id is required".to_string(),
            ));
        }
        let filter = BackupFilter {
            migration_id: Some(request.migration_id.clone()),
            workspace_name: request.workspace_name.clone(),
            backup_type: None,
        };
        self.backups
            .list_backups(&filter)?
            .into_iter()
            .next()
            .ok_or_else(|| {
                MigrationError::BackupNotFound(format!("no backup for migration {}", request.migration_id))
            })
    }

    /// Restore `backup` onto `target` (default: the path it was taken from).
    ///
    /// Full backups replace the target wholesale; partial backups merge their
    /// sub-paths over it. Per-item failures are collected, not raised.
    pub async fn restore(
        &self,
        backup: &MigrationBackup,
        target: Option<&Path>,
    ) -> MigrationOutcome<RollbackResult> {
        let payload = backup.payload_dir();
        if !payload.is_dir() {
            return Err(MigrationError::BackupNotFound(format!(
                "payload of backup {} is missing",
                backup.backup_id
            )));
        }
        let target = target
            .map(Path::to_path_buf)
            .unwrap_or_else(|| backup.source_path.clone());
        self.check_target(&target)?;

        let started = Instant::now();
        let owned = backup.clone();
        let restore_target = target.clone();
        let (rolled_back, errors) =
            tokio::task::spawn_blocking(move || restore_blocking(&owned, &payload, &restore_target))
                .await?;

        let success = errors.is_empty();
        let message = if success {
            format!("Restored backup {} to {}", backup.backup_id, target.display())
        } else {
            format!(
                "Restored backup {} to {} with {} errors",
                backup.backup_id,
                target.display(),
                errors.len()
            )
        };
        if success {
            info!("{}", message);
        } else {
            warn!("{}", message);
        }

        Ok(RollbackResult {
            success,
            message,
            backup_id: backup.backup_id.clone(),
            restored_path: target,
            rolled_back,
            errors,
            duration_ms: started.elapsed().as_millis() as u64,
        })
    }

    /// A full restore deletes its target first; refuse targets inside the
    /// backup store or containing a protected directory.
    fn check_target(&self, target: &Path) -> MigrationOutcome<()> {
        let target = resolved(target);
        let backups_root = resolved(self.backups.root());
        if target.starts_with(&backups_root) {
            return Err(MigrationError::InvalidRequest(format!(
                "rollback target {} lies inside the backup store",
                target.display()
            )));
        }
        for protected in &self.protected {
            if resolved(protected).starts_with(&target) {
                return Err(MigrationError::InvalidRequest(format!(
                    "rollback target {} would overwrite {}",
                    target.display(),
                    protected.display()
                )));
            }
        }
        Ok(())
    }
}

fn restore_blocking(
    backup: &MigrationBackup,
    payload: &Path,
    target: &Path,
) -> (BTreeMap<String, usize>, Vec<String>) {
    let mut rolled_back = BTreeMap::new();
    let mut errors = Vec::new();

    if backup.source_is_file {
        let Some(file_name) = backup.source_path.file_name() else {
            errors.push("backup of a file source has no file name".to_string());
            return (rolled_back, errors);
        };
        if let Err(e) = remove_path(target) {
            errors.push(format!("{}: {e}", target.display()));
        }
        let outcome = merge_tree(&payload.join(file_name), target);
        errors.extend(outcome.errors);
        rolled_back.insert("files".to_string(), outcome.stats.files);
        return (rolled_back, errors);
    }

    match backup.backup_type {
        BackupType::Full => {
            if let Err(e) = remove_path(target) {
                errors.push(format!("{}: {e}", target.display()));
            }
            let outcome = merge_tree(payload, target);
            errors.extend(outcome.errors);
            rolled_back.insert(BackupType::Full.as_str().to_string(), outcome.stats.files);
        }
        partial => {
            let mut restored = 0;
            for relative in BackupManager::scope_paths(partial) {
                let src = payload.join(&relative);
                if !src.exists() {
                    continue;
                }
                let outcome = merge_tree(&src, &target.join(&relative));
                restored += outcome.stats.files;
                errors.extend(outcome.errors);
            }
            rolled_back.insert(partial.as_str().to_string(), restored);
        }
    }

    // A marker written after the backup was taken is not part of the payload.
    let marker = marker_path(target);
    if marker.is_file() && !marker_path(payload).is_file() {
        match remove_path(&marker) {
            Ok(()) => {
                rolled_back.insert("markers".to_string(), 1);
            }
            Err(e) => errors.push(format!("{}: {e}", marker.display())),
        }
    }

    (rolled_back, errors)
}

fn marker_path(root: &Path) -> PathBuf {
    root.join(LEGACY_MARKER_DIR).join(MIGRATION_MARKER_FILE)
}
