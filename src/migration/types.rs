//! Type definitions for the migration engine

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};

static ID_SEQUENCE: AtomicU64 = AtomicU64::new(0);

/// Generate a collision-resistant identifier of the form `<prefix>_<12 hex>`.
///
/// The digest mixes the seed with the current time in nanoseconds, the process
/// id and a process-local sequence number, so two calls in the same instant
/// still diverge.
pub fn generate_id(prefix: &str, seed: &str) -> String {
    let now = Utc::now();
    let sequence = ID_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    let mut hasher = Sha256::new();
    hasher.update(seed.as_bytes());
    hasher.update(now.timestamp_nanos_opt().unwrap_or_default().to_le_bytes());
    hasher.update(std::process::id().to_le_bytes());
    hasher.update(sequence.to_le_bytes());
    let digest = hex::encode(hasher.finalize());
    format!("{prefix}_{}", &digest[..12])
}

/// Storage format of a legacy artifact
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LegacyFormat {
    /// LMDB environment (`data.mdb`)
    EmbeddedKv,
    /// Flat `.cache` / `.json` files
    FlatFile,
    Unknown,
}

impl fmt::Display for LegacyFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LegacyFormat::EmbeddedKv => "embedded_kv",
            LegacyFormat::FlatFile => "flat_file",
            LegacyFormat::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

/// Estimated migration complexity derived from nesting depth and key count
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComplexityTier {
    Simple,
    Moderate,
    Complex,
}

impl ComplexityTier {
    /// Shallow, small structures are simple; deep or wide ones are complex.
    pub fn classify(nesting_depth: usize, key_count: usize) -> Self {
        if nesting_depth > 3 || key_count > 50 {
            ComplexityTier::Complex
        } else if nesting_depth <= 1 && key_count <= 10 {
            ComplexityTier::Simple
        } else {
            ComplexityTier::Moderate
        }
    }
}

/// Summary of one legacy cache store (LMDB environment or flat-file directory)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheAnalysis {
    pub path: PathBuf,
    pub format: LegacyFormat,
    pub total_entries: usize,
    pub valid_entries: usize,
    pub pickle_entries: usize,
    pub expired_entries: usize,
    pub estimated_size_bytes: u64,
    pub cache_age_days: f64,
    pub has_pickle: bool,
    pub has_expired: bool,
}

impl CacheAnalysis {
    pub fn empty(path: impl Into<PathBuf>, format: LegacyFormat) -> Self {
        Self {
            path: path.into(),
            format,
            total_entries: 0,
            valid_entries: 0,
            pickle_entries: 0,
            expired_entries: 0,
            estimated_size_bytes: 0,
            cache_age_days: 0.0,
            has_pickle: false,
            has_expired: false,
        }
    }
}

/// Serialization used by a legacy configuration file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfigSyntax {
    Yaml,
    Json,
}

impl ConfigSyntax {
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => ConfigSyntax::Json,
            _ => ConfigSyntax::Yaml,
        }
    }
}

/// Summary of a legacy configuration file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LegacyConfigAnalysis {
    pub path: PathBuf,
    pub syntax: ConfigSyntax,
    pub key_count: usize,
    pub nesting_depth: usize,
    pub complexity: ComplexityTier,
    pub mapped_keys: Vec<String>,
    pub unmapped_keys: Vec<String>,
    pub parse_error: Option<String>,
}

/// Marker left in a legacy workspace once it has been migrated
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationMarker {
    pub migration_id: String,
    pub workspace_name: String,
    pub target_path: PathBuf,
    pub migrated_at: DateTime<Utc>,
}

/// Read-only snapshot of a legacy workspace
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LegacyWorkspaceData {
    pub path: PathBuf,
    pub suggested_name: String,
    pub has_marker_dir: bool,
    pub config: Option<LegacyConfigAnalysis>,
    pub caches: Vec<CacheAnalysis>,
    pub pipeline_files: usize,
    pub style_files: usize,
    pub template_files: usize,
    pub content_files: usize,
    pub estimated_size_bytes: u64,
    pub complexity: ComplexityTier,
    pub migrated: Option<MigrationMarker>,
}

impl LegacyWorkspaceData {
    pub fn total_cache_entries(&self) -> usize {
        self.caches.iter().map(|c| c.total_entries).sum()
    }

    pub fn has_unsafe_payloads(&self) -> bool {
        self.caches.iter().any(|c| c.has_pickle)
    }
}

/// Immutable per-run context threaded through every phase
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationContext {
    pub migration_id: String,
    pub source_path: PathBuf,
    pub target_path: PathBuf,
    pub workspace_name: String,
    pub backup_path: Option<PathBuf>,
    pub dry_run: bool,
}

impl MigrationContext {
    pub fn new(
        source_path: impl Into<PathBuf>,
        target_path: impl Into<PathBuf>,
        workspace_name: impl Into<String>,
    ) -> Self {
        let workspace_name = workspace_name.into();
        Self {
            migration_id: generate_id("mig", &workspace_name),
            source_path: source_path.into(),
            target_path: target_path.into(),
            workspace_name,
            backup_path: None,
            dry_run: false,
        }
    }

    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn with_backup_path(mut self, backup_path: Option<PathBuf>) -> Self {
        self.backup_path = backup_path;
        self
    }
}

/// Individually recoverable unit of a migration run, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhaseKind {
    Workspace,
    Config,
    Cache,
    PipelineTemplates,
    StyleTemplates,
}

impl PhaseKind {
    /// Later phases assume earlier phases created the target directories.
    pub const ORDER: [PhaseKind; 5] = [
        PhaseKind::Workspace,
        PhaseKind::Config,
        PhaseKind::Cache,
        PhaseKind::PipelineTemplates,
        PhaseKind::StyleTemplates,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PhaseKind::Workspace => "workspace",
            PhaseKind::Config => "config",
            PhaseKind::Cache => "cache",
            PhaseKind::PipelineTemplates => "pipeline_templates",
            PhaseKind::StyleTemplates => "style_templates",
        }
    }
}

impl fmt::Display for PhaseKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Phase lifecycle: `NotStarted -> Running -> {Succeeded, PartiallyFailed, Failed}`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhaseState {
    NotStarted,
    Running,
    Succeeded,
    PartiallyFailed,
    Failed,
}

/// Which slice of a workspace a run migrates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MigrationType {
    #[default]
    Full,
    Workspace,
    Config,
    Cache,
    Templates,
}

impl MigrationType {
    pub fn phases(&self) -> Vec<PhaseKind> {
        match self {
            MigrationType::Full => PhaseKind::ORDER.to_vec(),
            MigrationType::Workspace => vec![PhaseKind::Workspace],
            MigrationType::Config => vec![PhaseKind::Config],
            MigrationType::Cache => vec![PhaseKind::Cache],
            MigrationType::Templates => {
                vec![PhaseKind::PipelineTemplates, PhaseKind::StyleTemplates]
            }
        }
    }

    /// Backup scope matching the phases this type runs
    pub fn backup_type(&self) -> BackupType {
        match self {
            MigrationType::Full | MigrationType::Templates => BackupType::Full,
            MigrationType::Workspace => BackupType::Workspace,
            MigrationType::Config => BackupType::Config,
            MigrationType::Cache => BackupType::Cache,
        }
    }
}

impl FromStr for MigrationType {
    type Err = MigrationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "full" | "all" => Ok(MigrationType::Full),
            "workspace" => Ok(MigrationType::Workspace),
            "config" | "configuration" => Ok(MigrationType::Config),
            "cache" => Ok(MigrationType::Cache),
            "templates" | "template" => Ok(MigrationType::Templates),
            other => Err(MigrationError::InvalidRequest(format!(
                "unknown migration type '{other}'"
            ))),
        }
    }
}

/// Outcome of one phase, or the aggregate of a whole run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationResult {
    pub success: bool,
    pub message: String,
    pub migrated_count: usize,
    pub error_count: usize,
    pub warnings: Vec<String>,
    pub backup_path: Option<PathBuf>,
    pub duration_ms: u64,
    /// Named item counters (e.g. `pickle_entries`, `migrated_keys`)
    #[serde(default)]
    pub details: BTreeMap<String, u64>,
    #[serde(default)]
    pub phases: Vec<PhaseReport>,
}

impl MigrationResult {
    pub fn succeeded(message: impl Into<String>, migrated_count: usize) -> Self {
        Self {
            success: true,
            message: message.into(),
            migrated_count,
            error_count: 0,
            warnings: Vec::new(),
            backup_path: None,
            duration_ms: 0,
            details: BTreeMap::new(),
            phases: Vec::new(),
        }
    }

    /// A failure always carries at least one error.
    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            migrated_count: 0,
            error_count: 1,
            warnings: Vec::new(),
            backup_path: None,
            duration_ms: 0,
            details: BTreeMap::new(),
            phases: Vec::new(),
        }
    }

    pub fn with_duration(mut self, duration_ms: u64) -> Self {
        self.duration_ms = duration_ms;
        self
    }

    pub fn with_backup_path(mut self, backup_path: Option<PathBuf>) -> Self {
        self.backup_path = backup_path;
        self
    }

    pub fn detail(&self, name: &str) -> u64 {
        self.details.get(name).copied().unwrap_or(0)
    }

    pub fn state(&self) -> PhaseState {
        match (self.success, self.error_count) {
            (true, 0) => PhaseState::Succeeded,
            (true, _) => PhaseState::PartiallyFailed,
            (false, _) => PhaseState::Failed,
        }
    }
}

/// Result of a single phase inside an orchestrated run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhaseReport {
    pub phase: PhaseKind,
    pub state: PhaseState,
    pub result: MigrationResult,
}

/// Scope of a backup
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackupType {
    Full,
    Config,
    Cache,
    Workspace,
}

impl BackupType {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackupType::Full => "full",
            BackupType::Config => "config",
            BackupType::Cache => "cache",
            BackupType::Workspace => "workspace",
        }
    }
}

impl fmt::Display for BackupType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackupType {
    type Err = MigrationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "full" => Ok(BackupType::Full),
            "config" => Ok(BackupType::Config),
            "cache" => Ok(BackupType::Cache),
            "workspace" => Ok(BackupType::Workspace),
            other => Err(MigrationError::InvalidRequest(format!(
                "unknown backup type '{other}'"
            ))),
        }
    }
}

/// Metadata record persisted beside every backup payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationBackup {
    pub backup_id: String,
    pub migration_id: String,
    pub workspace_name: String,
    pub created_at: DateTime<Utc>,
    pub backup_path: PathBuf,
    pub backup_type: BackupType,
    pub size_bytes: u64,
    pub source_path: PathBuf,
    #[serde(default)]
    pub source_is_file: bool,
    #[serde(default)]
    pub metadata: BTreeMap<String, Value>,
}

impl MigrationBackup {
    pub fn payload_dir(&self) -> PathBuf {
        self.backup_path.join(super::backup::BACKUP_PAYLOAD_DIR)
    }
}

/// Optional filters for listing backups
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BackupFilter {
    pub workspace_name: Option<String>,
    pub migration_id: Option<String>,
    pub backup_type: Option<BackupType>,
}

impl BackupFilter {
    pub fn matches(&self, backup: &MigrationBackup) -> bool {
        self.workspace_name
            .as_ref()
            .map_or(true, |name| *name == backup.workspace_name)
            && self
                .migration_id
                .as_ref()
                .map_or(true, |id| *id == backup.migration_id)
            && self.backup_type.map_or(true, |ty| ty == backup.backup_type)
    }
}

/// Outcome of a retention sweep over the backup directory
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CleanupSummary {
    pub removed: usize,
    pub failed: usize,
    pub freed_bytes: u64,
}

/// Rollback parameters
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RollbackRequest {
    #[serde(default)]
    pub migration_id: String,
    pub workspace_name: Option<String>,
    pub target_path: Option<PathBuf>,
    pub backup_id: Option<String>,
}

/// Rollback outcome; per-item failures are collected in `errors`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RollbackResult {
    pub success: bool,
    pub message: String,
    pub backup_id: String,
    pub restored_path: PathBuf,
    pub rolled_back: BTreeMap<String, usize>,
    pub errors: Vec<String>,
    pub duration_ms: u64,
}

/// Lifecycle of a tracked migration run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Scheduled,
    Running,
    Completed,
    Failed,
}

/// Where one phase of a tracked run currently stands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseProgress {
    pub phase: PhaseKind,
    pub state: PhaseState,
}

/// History entry kept by the engine for every run it started
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationRecord {
    pub migration_id: String,
    pub workspace_name: String,
    pub source_path: PathBuf,
    pub target_path: PathBuf,
    pub migration_type: MigrationType,
    pub dry_run: bool,
    pub status: RunStatus,
    pub phases: Vec<PhaseProgress>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub result: Option<MigrationResult>,
}

/// Aggregate counters over the run history
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MigrationStats {
    pub total_runs: usize,
    pub completed: usize,
    pub failed: usize,
    pub in_progress: usize,
    pub dry_runs: usize,
    pub total_items_migrated: usize,
    pub total_errors: usize,
    pub backups_on_disk: usize,
}

/// Error types for the migration engine
#[derive(Debug, thiserror::Error)]
pub enum MigrationError {
    #[error("Source path does not exist: {0}")]
    SourceNotFound(PathBuf),

    #[error("Workspace mismatch: backup belongs to '{found}', expected '{expected}'")]
    WorkspaceMismatch { expected: String, found: String },

    #[error("Backup not found: {0}")]
    BackupNotFound(String),

    #[error("Backup failed: {0}")]
    BackupFailed(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Key-value store error: {0}")]
    KvStore(String),

    #[error("Failed to parse JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Failed to parse YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Background task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Result type for the migration engine
pub type MigrationOutcome<T> = Result<T, MigrationError>;
