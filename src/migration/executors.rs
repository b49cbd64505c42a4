//! Migration phases
//!
//! Each phase reads one slice of the legacy tree, converts it, and writes the
//! result into the target layout. Phases never abort on a bad item: per-item
//! outcomes go through a [`PhaseTally`] and only a failure that prevents the
//! phase from doing anything at all is returned as `Err`.
//!
//! A dry run walks exactly the same items and produces the same counts; it
//! only skips the writes.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

use super::converters::{
    convert_cache_entry, convert_config, convert_markdown_template, convert_pipeline_template,
    convert_template_document, CacheConversion, SkipReason,
};
use super::detector::{
    find_cache_stores, find_legacy_config, load_legacy_document, LegacyFormatDetector,
    CONTENT_DIRS, DOCUMENT_EXTENSIONS, LEGACY_MARKER_DIR, MIGRATION_MARKER_FILE, PIPELINE_DIR,
    STYLE_DIR, TEMPLATE_DIR,
};
use super::fsutil::{files_recursive, files_with_extensions};
use super::model::{
    slugify, TemplateKind, WorkspaceConfig, WorkspaceMetadata, CONFIG_FILE, WORKSPACE_DIRS,
    WORKSPACE_FILE,
};
use super::types::{
    MigrationContext, MigrationMarker, MigrationOutcome, MigrationResult, MigrationType, PhaseKind,
};
use crate::cache_mgmt::store::{CacheStore, FileCacheStore};

/// Version of the target layout written by this crate
pub const LAYOUT_VERSION: u32 = 2;

/// One individually recoverable unit of a migration run
#[async_trait]
pub trait MigrationPhase: Send + Sync {
    fn kind(&self) -> PhaseKind;

    async fn run(&self, ctx: &MigrationContext) -> MigrationOutcome<MigrationResult>;
}

/// Per-item outcome accumulator for a phase
#[derive(Debug, Default)]
pub struct PhaseTally {
    migrated: usize,
    errors: usize,
    warnings: Vec<String>,
    details: BTreeMap<String, u64>,
}

impl PhaseTally {
    pub fn migrated(&mut self, count: usize) {
        self.migrated += count;
    }

    /// Item skipped; processing continues
    pub fn warn(&mut self, message: impl Into<String>) {
        let message = message.into();
        debug!("{}", message);
        self.warnings.push(message);
    }

    /// Item that should have been migrated but could not be written
    pub fn error(&mut self, message: impl Into<String>) {
        let message = message.into();
        warn!("{}", message);
        self.errors += 1;
        self.warnings.push(message);
    }

    pub fn count(&mut self, name: &str, amount: u64) {
        *self.details.entry(name.to_string()).or_insert(0) += amount;
    }

    pub fn extend_warnings(&mut self, warnings: impl IntoIterator<Item = String>) {
        self.warnings.extend(warnings);
    }

    /// A phase in which every attempted item failed is a failed phase; any
    /// success makes it (at worst) partially failed.
    pub fn finish(self, kind: PhaseKind, ctx: &MigrationContext, started: Instant) -> MigrationResult {
        let success = self.errors == 0 || self.migrated > 0;
        let prefix = if ctx.dry_run { "[dry run] " } else { "" };
        let message = format!(
            "{prefix}{kind}: {} migrated, {} errors, {} warnings",
            self.migrated,
            self.errors,
            self.warnings.len()
        );
        MigrationResult {
            success,
            message,
            migrated_count: self.migrated,
            error_count: self.errors,
            warnings: self.warnings,
            backup_path: ctx.backup_path.clone(),
            duration_ms: started.elapsed().as_millis() as u64,
            details: self.details,
            phases: Vec::new(),
        }
    }
}

async fn write_yaml<T: Serialize>(path: &Path, value: &T) -> MigrationOutcome<()> {
    let text = serde_yaml::to_string(value)?;
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(path, text).await?;
    Ok(())
}

/// Pick a file stem not yet used in this run
fn unique_stem(base: &str, used: &mut BTreeSet<String>) -> String {
    let mut candidate = base.to_string();
    let mut suffix = 2;
    while used.contains(&candidate) {
        candidate = format!("{base}-{suffix}");
        suffix += 1;
    }
    used.insert(candidate.clone());
    candidate
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().to_string())
        .unwrap_or_default()
}

/// Creates the target directory layout, copies workspace content into
/// `storage/`, and records the migration on both sides.
#[derive(Debug, Default)]
pub struct WorkspaceMigrator;

#[async_trait]
impl MigrationPhase for WorkspaceMigrator {
    fn kind(&self) -> PhaseKind {
        PhaseKind::Workspace
    }

    async fn run(&self, ctx: &MigrationContext) -> MigrationOutcome<MigrationResult> {
        let started = Instant::now();
        let mut tally = PhaseTally::default();

        for dir in WORKSPACE_DIRS {
            let path = ctx.target_path.join(dir);
            if !ctx.dry_run {
                if let Err(e) = tokio::fs::create_dir_all(&path).await {
                    tally.error(format!("Failed to create {}: {e}", path.display()));
                    continue;
                }
            }
            tally.migrated(1);
            tally.count("directories", 1);
        }

        for content_dir in CONTENT_DIRS {
            let src_root = ctx.source_path.join(content_dir);
            let files = {
                let root = src_root.clone();
                tokio::task::spawn_blocking(move || files_recursive(&root)).await?
            };
            for file in files {
                let Ok(relative) = file.strip_prefix(&src_root) else {
                    continue;
                };
                let dest = ctx.target_path.join("storage").join(content_dir).join(relative);
                if !ctx.dry_run {
                    if let Some(parent) = dest.parent() {
                        if let Err(e) = tokio::fs::create_dir_all(parent).await {
                            tally.error(format!("Failed to create {}: {e}", parent.display()));
                            continue;
                        }
                    }
                    if let Err(e) = tokio::fs::copy(&file, &dest).await {
                        tally.error(format!("Failed to copy {}: {e}", file.display()));
                        continue;
                    }
                }
                tally.migrated(1);
                tally.count("content_files", 1);
            }
        }

        if !ctx.dry_run {
            let metadata = WorkspaceMetadata {
                name: ctx.workspace_name.clone(),
                created_at: Utc::now(),
                migrated_from: ctx.source_path.clone(),
                migration_id: ctx.migration_id.clone(),
                layout_version: LAYOUT_VERSION,
            };
            if let Err(e) = write_yaml(&ctx.target_path.join(WORKSPACE_FILE), &metadata).await {
                tally.error(format!("Failed to write {WORKSPACE_FILE}: {e}"));
            }
            write_source_marker(ctx, &mut tally).await;
        }

        Ok(tally.finish(self.kind(), ctx, started))
    }
}

/// Record the migration inside the legacy marker directory. Sources without a
/// marker directory are left untouched.
async fn write_source_marker(ctx: &MigrationContext, tally: &mut PhaseTally) {
    let marker_dir = ctx.source_path.join(LEGACY_MARKER_DIR);
    if !marker_dir.is_dir() {
        return;
    }
    let marker = MigrationMarker {
        migration_id: ctx.migration_id.clone(),
        workspace_name: ctx.workspace_name.clone(),
        target_path: ctx.target_path.clone(),
        migrated_at: Utc::now(),
    };
    let result = match serde_json::to_vec_pretty(&marker) {
        Ok(bytes) => tokio::fs::write(marker_dir.join(MIGRATION_MARKER_FILE), bytes)
            .await
            .map_err(|e| e.to_string()),
        Err(e) => Err(e.to_string()),
    };
    if let Err(e) = result {
        tally.warn(format!("Could not write migration marker: {e}"));
    }
}

/// Parse a legacy document off the async runtime
async fn load_document(path: PathBuf) -> MigrationOutcome<Value> {
    tokio::task::spawn_blocking(move || load_legacy_document(&path)).await?
}

/// Converts the legacy configuration into `config.yaml`
#[derive(Debug, Default)]
pub struct ConfigMigrator;

#[async_trait]
impl MigrationPhase for ConfigMigrator {
    fn kind(&self) -> PhaseKind {
        PhaseKind::Config
    }

    async fn run(&self, ctx: &MigrationContext) -> MigrationOutcome<MigrationResult> {
        let started = Instant::now();
        let mut tally = PhaseTally::default();
        let now = Utc::now();

        let conversion = match find_legacy_config(&ctx.source_path) {
            Some(path) => match load_document(path.clone()).await {
                Ok(value) => Some(convert_config(&value, &ctx.workspace_name, now)),
                Err(e) => {
                    tally.warn(format!(
                        "Skipping unparseable configuration {}: {e}",
                        path.display()
                    ));
                    None
                }
            },
            None => {
                tally.warn("No legacy configuration found; writing defaults");
                None
            }
        };

        let config = match conversion {
            Some(conversion) => {
                tally.migrated(conversion.migrated_keys);
                tally.count("migrated_keys", conversion.migrated_keys as u64);
                tally.count("dropped_keys", conversion.dropped_keys.len() as u64);
                tally.extend_warnings(conversion.warnings);
                conversion.config
            }
            None => WorkspaceConfig {
                name: ctx.workspace_name.clone(),
                ..Default::default()
            },
        };

        if !ctx.dry_run {
            let path = ctx.target_path.join(CONFIG_FILE);
            if let Err(e) = write_yaml(&path, &config).await {
                tally.error(format!("Failed to write {}: {e}", path.display()));
            }
        }

        Ok(tally.finish(self.kind(), ctx, started))
    }
}

/// Moves legacy cache records into the target cache store, dropping unsafe
/// and expired payloads.
#[derive(Debug, Default)]
pub struct CacheMigrator {
    store: Option<Arc<dyn CacheStore>>,
}

impl CacheMigrator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Write into `store` instead of the target's `cache/` directory
    pub fn with_store(store: Arc<dyn CacheStore>) -> Self {
        Self { store: Some(store) }
    }

    fn store_for(&self, ctx: &MigrationContext) -> Arc<dyn CacheStore> {
        match &self.store {
            Some(store) => Arc::clone(store),
            None => Arc::new(FileCacheStore::new(ctx.target_path.join("cache"))),
        }
    }
}

#[async_trait]
impl MigrationPhase for CacheMigrator {
    fn kind(&self) -> PhaseKind {
        PhaseKind::Cache
    }

    async fn run(&self, ctx: &MigrationContext) -> MigrationOutcome<MigrationResult> {
        let started = Instant::now();
        let mut tally = PhaseTally::default();
        let store = self.store_for(ctx);
        let now = Utc::now();

        for details in ["total_entries", "migrated_entries", "skipped_entries", "pickle_entries", "expired_entries"] {
            tally.count(details, 0);
        }

        for store_path in find_cache_stores(&ctx.source_path) {
            let path = store_path.clone();
            let read = tokio::task::spawn_blocking(move || {
                LegacyFormatDetector::new().read_cache_records(&path)
            })
            .await?;
            let records = match read {
                Ok(records) => records,
                Err(e) => {
                    tally.error(format!(
                        "Failed to read legacy cache {}: {e}",
                        store_path.display()
                    ));
                    continue;
                }
            };
            if records.unreadable > 0 {
                tally.warn(format!(
                    "Skipped {} unreadable entries in {}",
                    records.unreadable,
                    store_path.display()
                ));
            }

            let mut unsafe_skipped = 0u64;
            for record in records.records {
                tally.count("total_entries", 1);
                match convert_cache_entry(&record.key, &record.value, &ctx.workspace_name, now) {
                    CacheConversion::Converted(entry) => {
                        if !ctx.dry_run {
                            if let Err(e) = store.put(&entry).await {
                                tally.error(format!("Failed to store cache entry {}: {e}", entry.key));
                                continue;
                            }
                        }
                        tally.migrated(1);
                        tally.count("migrated_entries", 1);
                    }
                    CacheConversion::Skipped(reason) => {
                        tally.count("skipped_entries", 1);
                        match reason {
                            SkipReason::UnsafePayload => {
                                unsafe_skipped += 1;
                                tally.count("pickle_entries", 1);
                            }
                            SkipReason::Expired => tally.count("expired_entries", 1),
                            SkipReason::Malformed(why) => tally.warn(format!(
                                "Skipped cache entry {}: {why}",
                                String::from_utf8_lossy(&record.key)
                            )),
                        }
                    }
                }
            }
            if unsafe_skipped > 0 {
                tally.warn(format!(
                    "Skipped {unsafe_skipped} entries with unsafe serialized payloads in {}",
                    store_path.display()
                ));
            }
        }

        let result = tally.finish(self.kind(), ctx, started);
        info!(
            "Cache phase: {} of {} entries migrated ({} unsafe, {} expired)",
            result.detail("migrated_entries"),
            result.detail("total_entries"),
            result.detail("pickle_entries"),
            result.detail("expired_entries")
        );
        Ok(result)
    }
}

/// Converts `pipelines/*.yaml` into `pipelines/<id>.yaml`
#[derive(Debug, Default)]
pub struct PipelineTemplateMigrator;

#[async_trait]
impl MigrationPhase for PipelineTemplateMigrator {
    fn kind(&self) -> PhaseKind {
        PhaseKind::PipelineTemplates
    }

    async fn run(&self, ctx: &MigrationContext) -> MigrationOutcome<MigrationResult> {
        let started = Instant::now();
        let mut tally = PhaseTally::default();
        let now = Utc::now();
        let mut used = BTreeSet::new();

        for file in files_with_extensions(&ctx.source_path.join(PIPELINE_DIR), &DOCUMENT_EXTENSIONS) {
            let value = match load_document(file.clone()).await {
                Ok(value) => value,
                Err(e) => {
                    tally.warn(format!("Skipping pipeline {}: {e}", file.display()));
                    continue;
                }
            };
            let mut template = match convert_pipeline_template(&value, &file_stem(&file), now) {
                Ok(template) => template,
                Err(e) => {
                    tally.warn(format!("Skipping pipeline {}: {e}", file.display()));
                    continue;
                }
            };
            template.id = unique_stem(&template.id, &mut used);

            if !ctx.dry_run {
                let dest = ctx
                    .target_path
                    .join(PIPELINE_DIR)
                    .join(format!("{}.yaml", template.id));
                if let Err(e) = write_yaml(&dest, &template).await {
                    tally.error(format!("Failed to write {}: {e}", dest.display()));
                    continue;
                }
            }
            tally.migrated(1);
            tally.count("pipelines", 1);
        }

        Ok(tally.finish(self.kind(), ctx, started))
    }
}

/// Converts style primers (`styles/`) and content templates (`templates/`)
/// into `templates/<name>.yaml`
#[derive(Debug, Default)]
pub struct StyleTemplateMigrator;

impl StyleTemplateMigrator {
    fn sources(root: &Path) -> Vec<(PathBuf, TemplateKind)> {
        let mut sources: Vec<(PathBuf, TemplateKind)> =
            files_with_extensions(&root.join(STYLE_DIR), &DOCUMENT_EXTENSIONS)
                .into_iter()
                .map(|path| (path, TemplateKind::Style))
                .collect();
        sources.extend(
            files_with_extensions(&root.join(TEMPLATE_DIR), &["yaml", "yml", "json", "md"])
                .into_iter()
                .map(|path| (path, TemplateKind::Content)),
        );
        sources
    }
}

#[async_trait]
impl MigrationPhase for StyleTemplateMigrator {
    fn kind(&self) -> PhaseKind {
        PhaseKind::StyleTemplates
    }

    async fn run(&self, ctx: &MigrationContext) -> MigrationOutcome<MigrationResult> {
        let started = Instant::now();
        let mut tally = PhaseTally::default();
        let now: DateTime<Utc> = Utc::now();
        let mut used = BTreeSet::new();

        for (file, kind) in Self::sources(&ctx.source_path) {
            let stem = file_stem(&file);
            let is_markdown = file
                .extension()
                .is_some_and(|ext| ext.eq_ignore_ascii_case("md"));
            let converted = if is_markdown {
                tokio::fs::read_to_string(&file)
                    .await
                    .map(|text| convert_markdown_template(&text, &stem, now))
                    .map_err(|e| e.to_string())
            } else {
                load_document(file.clone())
                    .await
                    .map_err(|e| e.to_string())
                    .and_then(|value| convert_template_document(&value, &stem, kind, now))
            };
            let template = match converted {
                Ok(template) => template,
                Err(e) => {
                    tally.warn(format!("Skipping template {}: {e}", file.display()));
                    continue;
                }
            };

            let name = unique_stem(&slugify(&template.name), &mut used);
            if !ctx.dry_run {
                let dest = ctx.target_path.join(TEMPLATE_DIR).join(format!("{name}.yaml"));
                if let Err(e) = write_yaml(&dest, &template).await {
                    tally.error(format!("Failed to write {}: {e}", dest.display()));
                    continue;
                }
            }
            tally.migrated(1);
            tally.count(
                match kind {
                    TemplateKind::Style => "style_templates",
                    TemplateKind::Content => "content_templates",
                },
                1,
            );
        }

        Ok(tally.finish(self.kind(), ctx, started))
    }
}

/// Phase executors for a migration type, in execution order
pub fn phases_for(migration_type: MigrationType) -> Vec<Box<dyn MigrationPhase>> {
    migration_type
        .phases()
        .into_iter()
        .map(|kind| -> Box<dyn MigrationPhase> {
            match kind {
                PhaseKind::Workspace => Box::new(WorkspaceMigrator),
                PhaseKind::Config => Box::new(ConfigMigrator),
                PhaseKind::Cache => Box::new(CacheMigrator::new()),
                PhaseKind::PipelineTemplates => Box::new(PipelineTemplateMigrator),
                PhaseKind::StyleTemplates => Box::new(StyleTemplateMigrator),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache_mgmt::store::MemoryCacheStore;
    use crate::cache_mgmt::types::{CacheEntry, CacheError};
    use crate::migration::types::MigrationError;
    use std::fs;
    use tempfile::tempdir;

    #[derive(Debug)]
    struct ReadOnlyStore;

    #[async_trait]
    impl CacheStore for ReadOnlyStore {
        async fn get(&self, _key: &str) -> Result<Option<CacheEntry>, CacheError> {
            Ok(None)
        }
        async fn put(&self, _entry: &CacheEntry) -> Result<(), CacheError> {
            Err(CacheError::Storage("read-only".to_string()))
        }
        async fn delete(&self, _key: &str) -> Result<bool, CacheError> {
            Ok(false)
        }
        async fn entries(&self) -> Result<Vec<CacheEntry>, CacheError> {
            Ok(Vec::new())
        }
    }

    fn flat_cache_source(root: &Path) {
        let cache = root.join("cache");
        fs::create_dir_all(&cache).unwrap();
        fs::write(cache.join("a.json"), r#"{"response": "one", "model": "m"}"#).unwrap();
        fs::write(cache.join("b.json"), r#"{"response": "two", "model": "m"}"#).unwrap();
        fs::write(cache.join("c.cache"), b"\x80\x03pickle").unwrap();
    }

    #[tokio::test]
    async fn test_cache_phase_counts_and_security() {
        let dir = tempdir().unwrap();
        let source = dir.path().join("legacy");
        flat_cache_source(&source);
        let store = Arc::new(MemoryCacheStore::new());
        let ctx = MigrationContext::new(&source, dir.path().join("target"), "legacy");

        let result = CacheMigrator::with_store(store.clone()).run(&ctx).await.unwrap();
        assert!(result.success);
        assert_eq!(result.migrated_count, 2);
        assert_eq!(result.detail("pickle_entries"), 1);
        assert_eq!(result.detail("total_entries"), 3);
        assert_eq!(store.entries().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_write_failures_count_as_errors() {
        let dir = tempdir().unwrap();
        let source = dir.path().join("legacy");
        flat_cache_source(&source);
        let ctx = MigrationContext::new(&source, dir.path().join("target"), "legacy");

        let result = CacheMigrator::with_store(Arc::new(ReadOnlyStore))
            .run(&ctx)
            .await
            .unwrap();
        assert_eq!(result.error_count, 2);
        assert_eq!(result.migrated_count, 0);
        assert!(!result.success);
    }

    #[tokio::test]
    async fn test_config_phase_writes_target_config() {
        let dir = tempdir().unwrap();
        let source = dir.path().join("legacy");
        fs::create_dir_all(&source).unwrap();
        fs::write(source.join("config.yaml"), "cache_enabled: \"yes\"\nmax_cache_entries: 500\n")
            .unwrap();
        let target = dir.path().join("target");
        let ctx = MigrationContext::new(&source, &target, "legacy");

        let result = ConfigMigrator.run(&ctx).await.unwrap();
        assert_eq!(result.migrated_count, 1);
        assert!(result.warnings.iter().any(|w| w.contains("max_cache_entries")));

        let written: WorkspaceConfig =
            serde_yaml::from_str(&fs::read_to_string(target.join(CONFIG_FILE)).unwrap()).unwrap();
        assert!(written.enable_cache);
        assert_eq!(written.name, "legacy");
    }

    #[tokio::test]
    async fn test_config_phase_reads_json_off_the_runtime() {
        let dir = tempdir().unwrap();
        let source = dir.path().join("legacy");
        fs::create_dir_all(&source).unwrap();
        fs::write(source.join("config.json"), r#"{"cache_enabled": true}"#).unwrap();
        let target = dir.path().join("target");
        let ctx = MigrationContext::new(&source, &target, "legacy");

        let result = ConfigMigrator.run(&ctx).await.unwrap();
        assert_eq!(result.migrated_count, 1);
        assert!(target.join(CONFIG_FILE).is_file());

        let missing = load_document(source.join("absent.yaml")).await;
        assert!(matches!(missing, Err(MigrationError::Io(_))));
    }

    #[tokio::test]
    async fn test_template_phases_dedupe_names() {
        let dir = tempdir().unwrap();
        let source = dir.path().join("legacy");
        fs::create_dir_all(source.join("pipelines")).unwrap();
        fs::create_dir_all(source.join("styles")).unwrap();
        fs::create_dir_all(source.join("templates")).unwrap();
        fs::write(source.join("pipelines/a.yaml"), "name: Blog\nsteps:\n  intro: Write\n").unwrap();
        fs::write(source.join("pipelines/b.yaml"), "name: Blog\nsteps:\n  intro: Write\n").unwrap();
        fs::write(source.join("pipelines/broken.yaml"), "name: [").unwrap();
        fs::write(source.join("styles/formal.yaml"), "content: Be formal\n").unwrap();
        fs::write(source.join("templates/post.md"), "# Title\n").unwrap();
        let target = dir.path().join("target");
        let ctx = MigrationContext::new(&source, &target, "legacy");

        let pipelines = PipelineTemplateMigrator.run(&ctx).await.unwrap();
        assert_eq!(pipelines.migrated_count, 2);
        assert_eq!(pipelines.error_count, 0);
        assert_eq!(pipelines.warnings.len(), 1);
        assert!(target.join("pipelines/blog.yaml").is_file());
        assert!(target.join("pipelines/blog-2.yaml").is_file());

        let templates = StyleTemplateMigrator.run(&ctx).await.unwrap();
        assert_eq!(templates.migrated_count, 2);
        assert_eq!(templates.detail("style_templates"), 1);
        assert_eq!(templates.detail("content_templates"), 1);
    }

    #[tokio::test]
    async fn test_dry_run_counts_match_and_write_nothing() {
        let dir = tempdir().unwrap();
        let source = dir.path().join("legacy");
        fs::create_dir_all(source.join("articles/2024")).unwrap();
        fs::write(source.join("articles/2024/post.md"), "hello").unwrap();
        let target = dir.path().join("target");

        let dry = MigrationContext::new(&source, &target, "legacy").with_dry_run(true);
        let dry_result = WorkspaceMigrator.run(&dry).await.unwrap();
        assert!(!target.exists());

        let real = MigrationContext::new(&source, &target, "legacy");
        let real_result = WorkspaceMigrator.run(&real).await.unwrap();
        assert_eq!(dry_result.migrated_count, real_result.migrated_count);
        assert_eq!(real_result.migrated_count, 5);
        assert!(target.join("storage/articles/2024/post.md").is_file());
        assert!(target.join(WORKSPACE_FILE).is_file());
    }

    #[test]
    fn test_phase_order() {
        let kinds: Vec<PhaseKind> = phases_for(MigrationType::Full)
            .iter()
            .map(|phase| phase.kind())
            .collect();
        assert_eq!(kinds, PhaseKind::ORDER.to_vec());
    }
}
