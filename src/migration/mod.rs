//! Legacy workspace migration engine
//!
//! [`MigrationEngine`] ties the pieces together: it detects and analyzes
//! legacy workspaces, takes a backup of the source, runs the phase executors
//! in their fixed order, aggregates their results and records every run in
//! an in-memory history. Orchestrator-level failures (the backup, or
//! persisting the run report) trigger a best-effort rollback.

pub mod backup;
pub mod converters;
pub mod detector;
pub mod executors;
pub mod fsutil;
pub mod kv;
pub mod model;
pub mod report;
pub mod rollback;
pub mod types;

pub use backup::BackupManager;
pub use detector::LegacyFormatDetector;
pub use executors::{phases_for, MigrationPhase};
pub use report::{MigrationReport, ReportFormat, ValidationReport};
pub use rollback::RollbackManager;
pub use types::*;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, instrument, warn};

use crate::config::Settings;
use detector::{read_migration_marker, suggested_name};
use fsutil::{remove_path, resolved};
use model::{WorkspaceMetadata, REPORT_FILE, WORKSPACE_FILE};

/// Failed runs reported by the health check
const RECENT_FAILURE_WINDOW: usize = 20;

fn default_true() -> bool {
    true
}

/// Parameters of a single migration run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationRequest {
    pub source_path: PathBuf,
    /// Defaults to the source directory name
    #[serde(default)]
    pub workspace_name: Option<String>,
    /// Defaults to `<home>/workspaces/<workspace_name>`
    #[serde(default)]
    pub target_path: Option<PathBuf>,
    #[serde(default)]
    pub migration_type: MigrationType,
    #[serde(default)]
    pub dry_run: bool,
    #[serde(default = "default_true")]
    pub create_backup: bool,
}

impl MigrationRequest {
    pub fn new(source_path: impl Into<PathBuf>) -> Self {
        Self {
            source_path: source_path.into(),
            workspace_name: None,
            target_path: None,
            migration_type: MigrationType::Full,
            dry_run: false,
            create_backup: true,
        }
    }

    pub fn workspace_name(mut self, name: impl Into<String>) -> Self {
        self.workspace_name = Some(name.into());
        self
    }

    pub fn target_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.target_path = Some(path.into());
        self
    }

    pub fn migration_type(mut self, migration_type: MigrationType) -> Self {
        self.migration_type = migration_type;
        self
    }

    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn create_backup(mut self, create_backup: bool) -> Self {
        self.create_backup = create_backup;
        self
    }
}

/// A finished run and its id
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationRun {
    pub migration_id: String,
    pub result: MigrationResult,
}

/// A validated request with its context, ready to execute
#[derive(Debug, Clone)]
struct PreparedRun {
    ctx: MigrationContext,
    migration_type: MigrationType,
    create_backup: bool,
}

/// What is known about a migrated workspace
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkspaceStatus {
    pub workspace_name: String,
    pub target_path: PathBuf,
    pub migrated: bool,
    pub metadata: Option<WorkspaceMetadata>,
    pub validation: Option<ValidationReport>,
    pub last_run: Option<MigrationRecord>,
    pub backups: usize,
}

/// Engine health summary
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthReport {
    pub healthy: bool,
    pub home: PathBuf,
    pub home_writable: bool,
    pub backups_dir: PathBuf,
    pub backup_count: usize,
    pub active_migrations: usize,
    pub recent_failures: Vec<String>,
    pub checked_at: DateTime<Utc>,
}

/// Inputs of [`MigrationEngine::report`]
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReportRequest {
    pub source_path: PathBuf,
    #[serde(default)]
    pub workspace_name: Option<String>,
    #[serde(default)]
    pub target_path: Option<PathBuf>,
    #[serde(default)]
    pub migration_id: Option<String>,
}

#[derive(Debug)]
struct EngineInner {
    settings: Settings,
    detector: LegacyFormatDetector,
    rollback: RollbackManager,
    history: DashMap<String, MigrationRecord>,
}

/// Migration orchestrator; cheap to clone, clones share history
#[derive(Debug, Clone)]
pub struct MigrationEngine {
    inner: Arc<EngineInner>,
}

impl MigrationEngine {
    pub fn new(settings: Settings) -> Self {
        let backups = BackupManager::new(settings.backups_dir());
        let rollback = RollbackManager::new(backups).protect(settings.home.clone());
        Self {
            inner: Arc::new(EngineInner {
                settings,
                detector: LegacyFormatDetector::new(),
                rollback,
                history: DashMap::new(),
            }),
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.inner.settings
    }

    pub fn backups(&self) -> &BackupManager {
        self.inner.rollback.backups()
    }

    pub fn detector(&self) -> LegacyFormatDetector {
        self.inner.detector
    }

    /// Run a migration to completion.
    ///
    /// Failures are reported in the returned result; only a malformed
    /// request is an `Err`.
    pub async fn migrate(&self, request: MigrationRequest) -> MigrationOutcome<MigrationResult> {
        Ok(self.start(request).await?.result)
    }

    /// Like [`migrate`](Self::migrate), also returning the run id
    #[instrument(skip(self, request), fields(source = %request.source_path.display()))]
    pub async fn start(&self, request: MigrationRequest) -> MigrationOutcome<MigrationRun> {
        let prepared = self.prepare(request)?;
        let migration_id = prepared.ctx.migration_id.clone();
        self.track(&prepared, RunStatus::Running);
        let result = self.execute(prepared).await;
        Ok(MigrationRun {
            migration_id,
            result,
        })
    }

    /// Start a migration on a background task and return its id at once
    #[instrument(skip(self, request), fields(source = %request.source_path.display()))]
    pub fn schedule(&self, request: MigrationRequest) -> MigrationOutcome<String> {
        let prepared = self.prepare(request)?;
        let migration_id = prepared.ctx.migration_id.clone();
        self.track(&prepared, RunStatus::Scheduled);

        let engine = self.clone();
        tokio::spawn(async move {
            engine.set_status(&prepared.ctx.migration_id, RunStatus::Running);
            engine.execute(prepared).await;
        });
        info!("Scheduled migration {}", migration_id);
        Ok(migration_id)
    }

    /// Migrate several workspaces one after another
    #[instrument(skip_all, fields(count = requests.len()))]
    pub async fn bulk_migrate(
        &self,
        requests: Vec<MigrationRequest>,
    ) -> MigrationOutcome<Vec<MigrationResult>> {
        let prepared = requests
            .into_iter()
            .map(|request| self.prepare(request))
            .collect::<MigrationOutcome<Vec<_>>>()?;
        let mut results = Vec::with_capacity(prepared.len());
        for run in prepared {
            self.track(&run, RunStatus::Running);
            results.push(self.execute(run).await);
        }
        Ok(results)
    }

    /// Schedule several migrations to run sequentially on one background task
    #[instrument(skip_all, fields(count = requests.len()))]
    pub fn schedule_bulk(&self, requests: Vec<MigrationRequest>) -> MigrationOutcome<Vec<String>> {
        let prepared = requests
            .into_iter()
            .map(|request| self.prepare(request))
            .collect::<MigrationOutcome<Vec<_>>>()?;
        let ids: Vec<String> = prepared.iter().map(|run| run.ctx.migration_id.clone()).collect();
        for run in &prepared {
            self.track(run, RunStatus::Scheduled);
        }

        let engine = self.clone();
        tokio::spawn(async move {
            for run in prepared {
                engine.set_status(&run.ctx.migration_id, RunStatus::Running);
                engine.execute(run).await;
            }
        });
        info!("Scheduled {} migrations", ids.len());
        Ok(ids)
    }

    fn prepare(&self, request: MigrationRequest) -> MigrationOutcome<PreparedRun> {
        let workspace_name = request
            .workspace_name
            .map(|name| name.trim().to_string())
            .unwrap_or_else(|| suggested_name(&request.source_path));
        validate_workspace_name(&workspace_name)?;

        let target_path = request
            .target_path
            .unwrap_or_else(|| self.inner.settings.workspace_dir(&workspace_name));
        let ctx = MigrationContext::new(request.source_path, target_path, workspace_name)
            .with_dry_run(request.dry_run);
        Ok(PreparedRun {
            ctx,
            migration_type: request.migration_type,
            create_backup: request.create_backup,
        })
    }

    fn track(&self, run: &PreparedRun, status: RunStatus) {
        let record = MigrationRecord {
            migration_id: run.ctx.migration_id.clone(),
            workspace_name: run.ctx.workspace_name.clone(),
            source_path: run.ctx.source_path.clone(),
            target_path: run.ctx.target_path.clone(),
            migration_type: run.migration_type,
            dry_run: run.ctx.dry_run,
            status,
            phases: run
                .migration_type
                .phases()
                .into_iter()
                .map(|phase| PhaseProgress {
                    phase,
                    state: PhaseState::NotStarted,
                })
                .collect(),
            started_at: Utc::now(),
            finished_at: None,
            result: None,
        };
        self.inner.history.insert(record.migration_id.clone(), record);
    }

    fn set_status(&self, migration_id: &str, status: RunStatus) {
        if let Some(mut record) = self.inner.history.get_mut(migration_id) {
            record.status = status;
            if status == RunStatus::Running {
                record.started_at = Utc::now();
            }
        }
    }

    fn set_phase_state(&self, migration_id: &str, phase: PhaseKind, state: PhaseState) {
        if let Some(mut record) = self.inner.history.get_mut(migration_id) {
            if let Some(progress) = record.phases.iter_mut().find(|p| p.phase == phase) {
                progress.state = state;
            }
        }
    }

    fn finish(&self, migration_id: &str, result: &MigrationResult) {
        if let Some(mut record) = self.inner.history.get_mut(migration_id) {
            record.status = if result.success {
                RunStatus::Completed
            } else {
                RunStatus::Failed
            };
            record.finished_at = Some(Utc::now());
            record.result = Some(result.clone());
        }
    }

    async fn execute(&self, run: PreparedRun) -> MigrationResult {
        let started = Instant::now();
        let migration_id = run.ctx.migration_id.clone();
        let result = self.run_phases(run).await.with_duration(started.elapsed().as_millis() as u64);

        if result.success {
            info!(
                "Migration {} finished: {} items migrated, {} warnings",
                migration_id,
                result.migrated_count,
                result.warnings.len()
            );
        } else {
            warn!(
                "Migration {} failed: {} ({} errors)",
                migration_id, result.message, result.error_count
            );
        }
        self.finish(&migration_id, &result);
        result
    }

    async fn run_phases(&self, run: PreparedRun) -> MigrationResult {
        let PreparedRun {
            ctx,
            migration_type,
            create_backup,
        } = run;

        if !ctx.source_path.exists() {
            return MigrationResult::failed(
                MigrationError::SourceNotFound(ctx.source_path.clone()).to_string(),
            );
        }
        let source = resolved(&ctx.source_path);
        let target = resolved(&ctx.target_path);
        if target == source || target.starts_with(&source) {
            return MigrationResult::failed(
                MigrationError::InvalidRequest(format!(
                    "target {} lies inside the source {}",
                    ctx.target_path.display(),
                    ctx.source_path.display()
                ))
                .to_string(),
            );
        }
        let target_existed = ctx.target_path.exists();

        let mut backup = None;
        if create_backup && !ctx.dry_run {
            match self
                .backups()
                .create_backup(
                    &ctx.source_path,
                    &ctx.workspace_name,
                    &ctx.migration_id,
                    migration_type.backup_type(),
                )
                .await
            {
                Ok(created) => backup = Some(created),
                Err(e) => {
                    error!("Backup before migration {} failed: {}", ctx.migration_id, e);
                    let mut result = MigrationResult::failed(e.to_string());
                    result
                        .warnings
                        .extend(self.recover(&ctx, None, target_existed).await);
                    return result;
                }
            }
        }
        let ctx = ctx.with_backup_path(backup.as_ref().map(|b| b.backup_path.clone()));

        let mut phases = Vec::new();
        for phase in phases_for(migration_type) {
            let kind = phase.kind();
            debug!("Running {} phase of {}", kind, ctx.migration_id);
            self.set_phase_state(&ctx.migration_id, kind, PhaseState::Running);
            let result = match phase.run(&ctx).await {
                Ok(result) => result,
                Err(e) => {
                    error!("{} phase of {} failed: {}", kind, ctx.migration_id, e);
                    MigrationResult::failed(format!("{kind} phase failed: {e}"))
                        .with_backup_path(ctx.backup_path.clone())
                }
            };
            self.set_phase_state(&ctx.migration_id, kind, result.state());
            phases.push(PhaseReport {
                phase: kind,
                state: result.state(),
                result,
            });
        }

        let mut result = aggregate(&ctx, phases);
        if ctx.dry_run {
            return result;
        }

        if let Err(e) = write_report(&ctx.target_path, &result).await {
            error!("Failed to persist report for {}: {}", ctx.migration_id, e);
            result.success = false;
            result.error_count += 1;
            result.message = format!("Failed to persist migration report: {e}");
            let notes = self.recover(&ctx, backup.as_ref(), target_existed).await;
            result.warnings.extend(notes);
        }
        result
    }

    /// Best-effort undo of a failed run: restore the source from its backup
    /// and drop a target directory this run created. Failures are only logged.
    async fn recover(
        &self,
        ctx: &MigrationContext,
        backup: Option<&MigrationBackup>,
        target_existed: bool,
    ) -> Vec<String> {
        let mut notes = Vec::new();
        if let Some(backup) = backup {
            match self.inner.rollback.restore(backup, None).await {
                Ok(rollback) if rollback.success => {
                    notes.push(format!("Rolled back source from backup {}", backup.backup_id))
                }
                Ok(rollback) => {
                    warn!("Rollback of {} finished with errors: {:?}", ctx.migration_id, rollback.errors);
                    notes.push(format!(
                        "Rollback from backup {} finished with {} errors",
                        backup.backup_id,
                        rollback.errors.len()
                    ));
                }
                Err(e) => {
                    error!("Rollback of {} failed: {}", ctx.migration_id, e);
                    notes.push(format!("Rollback failed: {e}"));
                }
            }
        }
        if !ctx.dry_run && !target_existed && ctx.target_path.exists() {
            match remove_path(&ctx.target_path) {
                Ok(()) => notes.push(format!("Removed partial target {}", ctx.target_path.display())),
                Err(e) => {
                    error!("Failed to remove {}: {}", ctx.target_path.display(), e);
                    notes.push(format!("Could not remove partial target: {e}"));
                }
            }
        }
        notes
    }

    /// Legacy workspaces among `search_paths` (default: the working directory)
    #[instrument(skip(self))]
    pub async fn detect(&self, search_paths: Vec<PathBuf>) -> MigrationOutcome<Vec<LegacyWorkspaceData>> {
        let search_paths = if search_paths.is_empty() {
            vec![std::env::current_dir()?]
        } else {
            search_paths
        };
        let detector = self.inner.detector;
        let candidates =
            tokio::task::spawn_blocking(move || detector.find_legacy_workspaces(&search_paths)).await?;

        let analyses = join_all(candidates.iter().map(|path| detector.analyze_workspace(path))).await;
        let mut found = Vec::with_capacity(candidates.len());
        for (path, analysis) in candidates.iter().zip(analyses) {
            match analysis {
                Ok(data) => found.push(data),
                Err(e) => warn!("Skipping {}: {}", path.display(), e),
            }
        }
        info!("Detected {} legacy workspaces", found.len());
        Ok(found)
    }

    pub async fn analyze(&self, source: &Path) -> MigrationOutcome<LegacyWorkspaceData> {
        self.inner.detector.analyze_workspace(source).await
    }

    pub async fn validate_workspace(&self, target: &Path) -> MigrationOutcome<ValidationReport> {
        let target = target.to_path_buf();
        Ok(tokio::task::spawn_blocking(move || report::validate_workspace(&target)).await?)
    }

    #[instrument(skip(self))]
    pub async fn rollback(&self, request: &RollbackRequest) -> MigrationOutcome<RollbackResult> {
        self.inner.rollback.rollback(request).await
    }

    /// Restore a backup given by id or directory, checking it belongs to
    /// `workspace_name`
    #[instrument(skip(self))]
    pub async fn rollback_backup(
        &self,
        backup: &str,
        workspace_name: &str,
        target: Option<&Path>,
    ) -> MigrationOutcome<RollbackResult> {
        let backup = self.preview_rollback(backup, workspace_name)?;
        self.inner.rollback.restore(&backup, target).await
    }

    /// Load the backup a rollback would restore, without touching anything
    pub fn preview_rollback(&self, backup: &str, workspace_name: &str) -> MigrationOutcome<MigrationBackup> {
        let backup = self.backups().load_backup(backup)?;
        if backup.workspace_name != workspace_name {
            return Err(MigrationError::WorkspaceMismatch {
                expected: workspace_name.to_string(),
                found: backup.workspace_name,
            });
        }
        Ok(backup)
    }

    pub fn list_backups(&self, filter: &BackupFilter) -> MigrationOutcome<Vec<MigrationBackup>> {
        self.backups().list_backups(filter)
    }

    #[instrument(skip(self))]
    pub async fn cleanup_backups(&self, days_to_keep: u32) -> MigrationOutcome<CleanupSummary> {
        self.backups().cleanup_old_backups(days_to_keep).await
    }

    /// History record of one run
    pub fn status(&self, migration_id: &str) -> Option<MigrationRecord> {
        self.inner.history.get(migration_id).map(|r| r.value().clone())
    }

    /// Runs that are scheduled or in progress
    pub fn active(&self) -> Vec<MigrationRecord> {
        let mut active: Vec<MigrationRecord> = self
            .inner
            .history
            .iter()
            .filter(|r| matches!(r.status, RunStatus::Scheduled | RunStatus::Running))
            .map(|r| r.value().clone())
            .collect();
        active.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        active
    }

    /// Run history, newest first
    pub fn history(&self, limit: Option<usize>) -> Vec<MigrationRecord> {
        let mut records: Vec<MigrationRecord> =
            self.inner.history.iter().map(|r| r.value().clone()).collect();
        records.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        if let Some(limit) = limit {
            records.truncate(limit);
        }
        records
    }

    /// State of a migrated workspace, read from disk and the run history
    pub async fn workspace_status(&self, workspace_name: &str) -> MigrationOutcome<WorkspaceStatus> {
        validate_workspace_name(workspace_name)?;
        let target_path = self.inner.settings.workspace_dir(workspace_name);
        let metadata = tokio::fs::read_to_string(target_path.join(WORKSPACE_FILE))
            .await
            .ok()
            .and_then(|text| serde_yaml::from_str::<WorkspaceMetadata>(&text).ok());
        let validation = if target_path.is_dir() {
            Some(self.validate_workspace(&target_path).await?)
        } else {
            None
        };
        let last_run = self
            .history(None)
            .into_iter()
            .find(|r| r.workspace_name == workspace_name);
        let backups = self
            .list_backups(&BackupFilter {
                workspace_name: Some(workspace_name.to_string()),
                ..Default::default()
            })?
            .len();

        Ok(WorkspaceStatus {
            workspace_name: workspace_name.to_string(),
            migrated: metadata.is_some(),
            target_path,
            metadata,
            validation,
            last_run,
            backups,
        })
    }

    pub fn stats(&self) -> MigrationOutcome<MigrationStats> {
        let mut stats = MigrationStats::default();
        for record in self.inner.history.iter() {
            stats.total_runs += 1;
            match record.status {
                RunStatus::Completed => stats.completed += 1,
                RunStatus::Failed => stats.failed += 1,
                RunStatus::Scheduled | RunStatus::Running => stats.in_progress += 1,
            }
            if record.dry_run {
                stats.dry_runs += 1;
            }
            if let Some(result) = &record.result {
                if !record.dry_run {
                    stats.total_items_migrated += result.migrated_count;
                }
                stats.total_errors += result.error_count;
            }
        }
        stats.backups_on_disk = self.list_backups(&BackupFilter::default())?.len();
        Ok(stats)
    }

    pub async fn health(&self) -> HealthReport {
        let home = self.inner.settings.home.clone();
        let home_writable = {
            let home = home.clone();
            tokio::task::spawn_blocking(move || {
                std::fs::create_dir_all(&home).is_ok() && tempfile::NamedTempFile::new_in(&home).is_ok()
            })
            .await
            .unwrap_or(false)
        };
        let backup_count = match self.list_backups(&BackupFilter::default()) {
            Ok(backups) => backups.len(),
            Err(e) => {
                warn!("Health check could not list backups: {}", e);
                0
            }
        };
        let recent_failures = self
            .history(Some(RECENT_FAILURE_WINDOW))
            .into_iter()
            .filter(|r| r.status == RunStatus::Failed)
            .map(|r| {
                let reason = r.result.map(|res| res.message).unwrap_or_default();
                format!("{} ({}): {}", r.migration_id, r.workspace_name, reason)
            })
            .collect();

        HealthReport {
            healthy: home_writable,
            backups_dir: self.inner.settings.backups_dir(),
            home,
            home_writable,
            backup_count,
            active_migrations: self.active().len(),
            recent_failures,
            checked_at: Utc::now(),
        }
    }

    /// Report over the legacy source, a recorded run and the target workspace
    #[instrument(skip(self))]
    pub async fn report(&self, request: &ReportRequest) -> MigrationOutcome<MigrationReport> {
        let record = request.migration_id.as_deref().and_then(|id| self.status(id));
        if let (Some(id), None) = (&request.migration_id, &record) {
            return Err(MigrationError::InvalidRequest(format!("unknown migration id '{id}'")));
        }

        let workspace_name = request
            .workspace_name
            .clone()
            .or_else(|| record.as_ref().map(|r| r.workspace_name.clone()))
            .unwrap_or_else(|| suggested_name(&request.source_path));
        let target_path = request
            .target_path
            .clone()
            .or_else(|| record.as_ref().map(|r| r.target_path.clone()))
            .or_else(|| read_migration_marker(&request.source_path).map(|m| m.target_path));

        let analysis = if request.source_path.is_dir() {
            Some(self.analyze(&request.source_path).await?)
        } else {
            None
        };
        let validation = match &target_path {
            Some(target) if target.is_dir() => Some(self.validate_workspace(target).await?),
            _ => None,
        };
        let recommendations = analysis
            .as_ref()
            .map(MigrationReport::recommendations_for)
            .unwrap_or_default();

        Ok(MigrationReport {
            generated_at: Utc::now(),
            migration_id: record.as_ref().map(|r| r.migration_id.clone()),
            workspace_name,
            source_path: request.source_path.clone(),
            target_path,
            analysis,
            result: record.and_then(|r| r.result),
            validation,
            recommendations,
        })
    }
}

/// Sum phase results into the run result. The run succeeds only when every
/// phase succeeded and no phase counted an error.
fn aggregate(ctx: &MigrationContext, phases: Vec<PhaseReport>) -> MigrationResult {
    let migrated_count = phases.iter().map(|p| p.result.migrated_count).sum();
    let error_count: usize = phases.iter().map(|p| p.result.error_count).sum();
    let success = phases.iter().all(|p| p.result.success) && error_count == 0;

    let mut details = BTreeMap::new();
    let mut warnings = Vec::new();
    for phase in &phases {
        for (name, value) in &phase.result.details {
            *details.entry(name.clone()).or_insert(0) += value;
        }
        warnings.extend(phase.result.warnings.iter().cloned());
    }

    let prefix = if ctx.dry_run { "[dry run] " } else { "" };
    let message = if success {
        format!(
            "{prefix}Migrated workspace '{}': {migrated_count} items",
            ctx.workspace_name
        )
    } else {
        let failed: Vec<&str> = phases
            .iter()
            .filter(|p| p.state != PhaseState::Succeeded)
            .map(|p| p.phase.as_str())
            .collect();
        format!(
            "{prefix}Migration of '{}' completed with {error_count} errors (phases: {})",
            ctx.workspace_name,
            failed.join(", ")
        )
    };

    MigrationResult {
        success,
        message,
        migrated_count,
        error_count,
        warnings,
        backup_path: ctx.backup_path.clone(),
        duration_ms: 0,
        details,
        phases,
    }
}

async fn write_report(target: &Path, result: &MigrationResult) -> MigrationOutcome<()> {
    let bytes = serde_json::to_vec_pretty(result)?;
    tokio::fs::create_dir_all(target).await?;
    tokio::fs::write(target.join(REPORT_FILE), bytes).await?;
    Ok(())
}

fn validate_workspace_name(name: &str) -> MigrationOutcome<()> {
    if name.is_empty() || name == "." || name == ".." {
        return Err(MigrationError::InvalidRequest(format!(
            "invalid workspace name '{name}'"
        )));
    }
    if name.contains(['/', '\\']) {
        return Err(MigrationError::InvalidRequest(format!(
            "workspace name '{name}' must not contain path separators"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn legacy_source(root: &Path) -> PathBuf {
        let source = root.join("novel");
        fs::create_dir_all(source.join(".quill")).unwrap();
        fs::create_dir_all(source.join("pipelines")).unwrap();
        fs::write(
            source.join(".quill/config.yaml"),
            "workspace_name: novel\ncache_enabled: \"yes\"\n",
        )
        .unwrap();
        fs::write(
            source.join("pipelines/outline.yaml"),
            "name: Outline\nsteps:\n  - name: Draft\n    prompt: Write an outline\n",
        )
        .unwrap();
        source
    }

    #[test]
    fn test_workspace_name_validation() {
        assert!(validate_workspace_name("novel").is_ok());
        assert!(validate_workspace_name("").is_err());
        assert!(validate_workspace_name("..").is_err());
        assert!(validate_workspace_name("a/b").is_err());
    }

    #[test]
    fn test_aggregate_requires_zero_errors() {
        let ctx = MigrationContext::new("/src", "/dst", "ws");
        let mut partial = MigrationResult::succeeded("partial", 2);
        partial.error_count = 1;
        let phases = vec![
            PhaseReport {
                phase: PhaseKind::Workspace,
                state: PhaseState::Succeeded,
                result: MigrationResult::succeeded("ok", 4),
            },
            PhaseReport {
                phase: PhaseKind::Cache,
                state: partial.state(),
                result: partial,
            },
        ];
        let result = aggregate(&ctx, phases);
        assert!(!result.success);
        assert_eq!(result.migrated_count, 6);
        assert_eq!(result.error_count, 1);
        assert!(result.message.contains("cache"));
    }

    #[tokio::test]
    async fn test_missing_source_fails_without_backup() {
        let home = tempdir().unwrap();
        let engine = MigrationEngine::new(Settings::with_home(home.path()));
        let result = engine
            .migrate(MigrationRequest::new(home.path().join("nope")).workspace_name("ws"))
            .await
            .unwrap();
        assert!(!result.success);
        assert_eq!(result.error_count, 1);
        assert!(result.backup_path.is_none());
        assert!(engine.list_backups(&BackupFilter::default()).unwrap().is_empty());
        assert_eq!(engine.stats().unwrap().failed, 1);
    }

    #[tokio::test]
    async fn test_target_inside_source_is_rejected() {
        let home = tempdir().unwrap();
        let source = legacy_source(home.path());
        let engine = MigrationEngine::new(Settings::with_home(home.path().join("home")));
        let result = engine
            .migrate(MigrationRequest::new(&source).target_path(source.join("out")))
            .await
            .unwrap();
        assert!(!result.success);
        assert!(!source.join("out").exists());
    }

    #[tokio::test]
    async fn test_full_run_records_history_and_backup() {
        let root = tempdir().unwrap();
        let source = legacy_source(root.path());
        let engine = MigrationEngine::new(Settings::with_home(root.path().join("home")));

        let result = engine
            .migrate(MigrationRequest::new(&source).workspace_name("novel"))
            .await
            .unwrap();
        assert!(result.success, "{:?}", result.warnings);
        assert_eq!(result.phases.len(), 5);
        assert!(result.backup_path.as_ref().is_some_and(|p| p.is_dir()));

        let target = engine.settings().workspace_dir("novel");
        assert!(target.join(REPORT_FILE).is_file());
        assert!(target.join("pipelines/outline.yaml").is_file());

        let history = engine.history(None);
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].status, RunStatus::Completed);

        let status = engine.workspace_status("novel").await.unwrap();
        assert!(status.migrated);
        assert_eq!(status.backups, 1);
        assert!(status.validation.is_some_and(|v| v.valid));
    }

    #[tokio::test]
    async fn test_scheduled_run_completes() {
        let root = tempdir().unwrap();
        let source = legacy_source(root.path());
        let engine = MigrationEngine::new(Settings::with_home(root.path().join("home")));
        let id = engine
            .schedule(MigrationRequest::new(&source).dry_run(true))
            .unwrap();

        let mut status = None;
        for _ in 0..200 {
            status = engine.status(&id).map(|r| r.status);
            if status == Some(RunStatus::Completed) {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        assert_eq!(status, Some(RunStatus::Completed));
        assert!(!engine.settings().workspace_dir("novel").exists());
    }
}
