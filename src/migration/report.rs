//! Migration reports and post-migration validation

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use super::fsutil::{files_recursive, files_with_extensions};
use super::kv::is_unsafe_payload;
use super::model::{ContentTemplate, PipelineTemplate, WorkspaceConfig, CONFIG_FILE, WORKSPACE_DIRS};
use super::types::{ComplexityTier, LegacyWorkspaceData, MigrationError, MigrationResult};
use crate::cache_mgmt::types::CacheEntry;

/// Number of warnings printed before truncating
pub const WARNING_PREVIEW: usize = 5;

/// Output format of a report
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportFormat {
    #[default]
    Json,
    Markdown,
}

impl FromStr for ReportFormat {
    type Err = MigrationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(ReportFormat::Json),
            "markdown" | "md" => Ok(ReportFormat::Markdown),
            other => Err(MigrationError::InvalidRequest(format!(
                "unknown report format '{other}'"
            ))),
        }
    }
}

impl ReportFormat {
    /// Guess from an output file extension
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("md") | Some("markdown") => ReportFormat::Markdown,
            _ => ReportFormat::Json,
        }
    }
}

/// Result of checking a migrated workspace
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ValidationReport {
    pub target_path: PathBuf,
    pub valid: bool,
    pub checked_files: usize,
    pub pipelines: usize,
    pub templates: usize,
    pub cache_entries: usize,
    pub issues: Vec<String>,
    pub warnings: Vec<String>,
}

/// Check a target workspace: layout, parseable records, no unsafe payloads.
///
/// Blocking; reads every file of the workspace.
pub fn validate_workspace(target: &Path) -> ValidationReport {
    let mut report = ValidationReport {
        target_path: target.to_path_buf(),
        ..Default::default()
    };
    if !target.is_dir() {
        report
            .issues
            .push(format!("Workspace directory {} does not exist", target.display()));
        return report;
    }

    for dir in WORKSPACE_DIRS {
        if !target.join(dir).is_dir() {
            report.issues.push(format!("Missing directory '{dir}'"));
        }
    }

    match fs::read_to_string(target.join(CONFIG_FILE)) {
        Ok(text) => {
            report.checked_files += 1;
            if let Err(e) = serde_yaml::from_str::<WorkspaceConfig>(&text) {
                report.issues.push(format!("{CONFIG_FILE} is invalid: {e}"));
            }
        }
        Err(_) => report.issues.push(format!("Missing {CONFIG_FILE}")),
    }

    for file in files_with_extensions(&target.join("pipelines"), &["yaml", "yml"]) {
        report.checked_files += 1;
        match read_yaml::<PipelineTemplate>(&file) {
            Ok(_) => report.pipelines += 1,
            Err(e) => report.issues.push(format!("{}: {e}", file.display())),
        }
    }

    for file in files_with_extensions(&target.join("templates"), &["yaml", "yml"]) {
        report.checked_files += 1;
        match read_yaml::<ContentTemplate>(&file) {
            Ok(_) => report.templates += 1,
            Err(e) => report.issues.push(format!("{}: {e}", file.display())),
        }
    }

    for file in files_with_extensions(&target.join("cache"), &["json"]) {
        report.checked_files += 1;
        let parsed = fs::read(&file)
            .map_err(|e| e.to_string())
            .and_then(|bytes| serde_json::from_slice::<CacheEntry>(&bytes).map_err(|e| e.to_string()));
        match parsed {
            Ok(entry) if is_unsafe_payload(entry.content.as_bytes()) => report
                .issues
                .push(format!("{} holds an unsafe serialized payload", file.display())),
            Ok(_) => report.cache_entries += 1,
            Err(e) => report.issues.push(format!("{}: {e}", file.display())),
        }
    }

    for file in files_recursive(target) {
        let unsafe_file = fs::read(&file)
            .map(|bytes| is_unsafe_payload(&bytes))
            .unwrap_or(false);
        if unsafe_file {
            report
                .issues
                .push(format!("{} holds an unsafe serialized payload", file.display()));
        }
    }

    if report.pipelines == 0 && report.templates == 0 {
        report.warnings.push("Workspace has no pipelines or templates".to_string());
    }
    report.valid = report.issues.is_empty();
    report
}

fn read_yaml<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, String> {
    let text = fs::read_to_string(path).map_err(|e| e.to_string())?;
    serde_yaml::from_str(&text).map_err(|e| e.to_string())
}

/// Combined report over analysis, run result and validation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationReport {
    pub generated_at: DateTime<Utc>,
    pub migration_id: Option<String>,
    pub workspace_name: String,
    pub source_path: PathBuf,
    pub target_path: Option<PathBuf>,
    pub analysis: Option<LegacyWorkspaceData>,
    pub result: Option<MigrationResult>,
    pub validation: Option<ValidationReport>,
    pub recommendations: Vec<String>,
}

impl MigrationReport {
    /// Recommendations derived from a legacy analysis
    pub fn recommendations_for(analysis: &LegacyWorkspaceData) -> Vec<String> {
        let mut out = Vec::new();
        let pickled: usize = analysis.caches.iter().map(|c| c.pickle_entries).sum();
        if pickled > 0 {
            out.push(format!(
                "{pickled} cache entries use an unsafe serialization format and will be skipped"
            ));
        }
        let expired: usize = analysis.caches.iter().map(|c| c.expired_entries).sum();
        if expired > 0 {
            out.push(format!("{expired} expired cache entries will not be migrated"));
        }
        if let Some(config) = &analysis.config {
            if let Some(error) = &config.parse_error {
                out.push(format!("Configuration could not be parsed ({error}); defaults will be used"));
            } else if !config.unmapped_keys.is_empty() {
                out.push(format!(
                    "Configuration keys without a target will be dropped: {}",
                    config.unmapped_keys.join(", ")
                ));
            }
        } else {
            out.push("No legacy configuration found; a default config.yaml will be written".to_string());
        }
        if analysis.complexity == ComplexityTier::Complex {
            out.push("Complex workspace: run with --dry-run first and review the warnings".to_string());
        }
        if let Some(marker) = &analysis.migrated {
            out.push(format!(
                "Already migrated on {} (migration {})",
                marker.migrated_at.to_rfc3339(),
                marker.migration_id
            ));
        }
        out
    }

    pub fn render(&self, format: ReportFormat) -> Result<String, MigrationError> {
        match format {
            ReportFormat::Json => Ok(serde_json::to_string_pretty(self)?),
            ReportFormat::Markdown => Ok(self.to_markdown()),
        }
    }

    pub fn to_markdown(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "# Migration report: {}\n", self.workspace_name);
        let _ = writeln!(out, "- Generated: {}", self.generated_at.to_rfc3339());
        if let Some(id) = &self.migration_id {
            let _ = writeln!(out, "- Migration: `{id}`");
        }
        let _ = writeln!(out, "- Source: `{}`", self.source_path.display());
        if let Some(target) = &self.target_path {
            let _ = writeln!(out, "- Target: `{}`", target.display());
        }

        if let Some(analysis) = &self.analysis {
            let _ = writeln!(out, "\n## Legacy workspace\n");
            let _ = writeln!(out, "| Item | Count |\n|---|---|");
            let _ = writeln!(out, "| Pipelines | {} |", analysis.pipeline_files);
            let _ = writeln!(out, "| Style primers | {} |", analysis.style_files);
            let _ = writeln!(out, "| Templates | {} |", analysis.template_files);
            let _ = writeln!(out, "| Content files | {} |", analysis.content_files);
            let _ = writeln!(out, "| Cache entries | {} |", analysis.total_cache_entries());
            let _ = writeln!(out, "\nComplexity: {:?}", analysis.complexity);
        }

        if let Some(result) = &self.result {
            let _ = writeln!(out, "\n## Result\n");
            let status = if result.success { "succeeded" } else { "failed" };
            let _ = writeln!(
                out,
                "Migration {status}: {} items migrated, {} errors ({} ms)\n",
                result.migrated_count, result.error_count, result.duration_ms
            );
            if !result.phases.is_empty() {
                let _ = writeln!(out, "| Phase | State | Migrated | Errors |\n|---|---|---|---|");
                for phase in &result.phases {
                    let _ = writeln!(
                        out,
                        "| {} | {:?} | {} | {} |",
                        phase.phase, phase.state, phase.result.migrated_count, phase.result.error_count
                    );
                }
            }
            if !result.warnings.is_empty() {
                let _ = writeln!(out, "\n### Warnings\n");
                for warning in &result.warnings {
                    let _ = writeln!(out, "- {warning}");
                }
            }
        }

        if let Some(validation) = &self.validation {
            let _ = writeln!(out, "\n## Validation\n");
            let verdict = if validation.valid { "valid" } else { "invalid" };
            let _ = writeln!(
                out,
                "Workspace is {verdict} ({} files checked, {} pipelines, {} templates, {} cache entries)",
                validation.checked_files, validation.pipelines, validation.templates, validation.cache_entries
            );
            for issue in &validation.issues {
                let _ = writeln!(out, "- {issue}");
            }
        }

        if !self.recommendations.is_empty() {
            let _ = writeln!(out, "\n## Recommendations\n");
            for rec in &self.recommendations {
                let _ = writeln!(out, "- {rec}");
            }
        }
        out
    }
}
