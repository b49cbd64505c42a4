//! Legacy format detection and read-only analysis
//!
//! Nothing in this module writes to the legacy tree. Analysis never fails
//! because of a single bad record: unreadable entries are logged and left out
//! of the counts.

use chrono::{DateTime, Utc};
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::{debug, instrument, warn};

use super::converters::{
    decode_legacy_value, flatten_keys, lookup_config_mapping, nesting_depth, parse_timestamp,
    LegacyValue,
};
use super::fsutil::{dir_size, files_recursive, files_with_extensions};
use super::kv::{self, KvRecord, LMDB_DATA_FILE};
use super::model::WORKSPACE_FILE;
use super::types::{
    CacheAnalysis, ComplexityTier, ConfigSyntax, LegacyConfigAnalysis, LegacyFormat,
    LegacyWorkspaceData, MigrationError, MigrationMarker, MigrationOutcome,
};

/// Marker directory of a legacy workspace
pub const LEGACY_MARKER_DIR: &str = ".quill";

/// Source-side record of a completed migration, inside the marker directory
pub const MIGRATION_MARKER_FILE: &str = "migration.json";

/// Legacy configuration locations, in lookup order
pub const LEGACY_CONFIG_CANDIDATES: [&str; 4] =
    [".quill/config.yaml", "config.yaml", "quill.yaml", "config.json"];

/// Legacy cache locations
pub const LEGACY_CACHE_CANDIDATES: [&str; 2] = [".quill/cache", "cache"];

pub const PIPELINE_DIR: &str = "pipelines";
pub const STYLE_DIR: &str = "styles";
pub const TEMPLATE_DIR: &str = "templates";

/// Workspace content copied into the target `storage/` directory
pub const CONTENT_DIRS: [&str; 2] = ["articles", "drafts"];

pub const FLAT_CACHE_EXTENSIONS: [&str; 2] = ["cache", "json"];
/// Pipeline and style documents, in every format the converters accept
pub const DOCUMENT_EXTENSIONS: [&str; 3] = ["yaml", "yml", "json"];
pub const TEMPLATE_EXTENSIONS: [&str; 4] = ["yaml", "yml", "json", "md"];

const CONTENT_KEYS: [&str; 4] = ["response", "content", "value", "result"];
const SECONDS_PER_DAY: f64 = 86_400.0;

/// Raw records of one legacy cache store, whatever its format
#[derive(Debug, Default)]
pub struct CacheRecords {
    pub records: Vec<KvRecord>,
    pub unreadable: usize,
    pub size_bytes: u64,
}

/// Stateless detector over the legacy on-disk layout
#[derive(Debug, Clone, Copy, Default)]
pub struct LegacyFormatDetector;

impl LegacyFormatDetector {
    pub fn new() -> Self {
        Self
    }

    /// Classify the storage format of a file or directory.
    ///
    /// The extension is checked first; for anything else the LMDB meta-page
    /// signature decides.
    pub fn detect_format(&self, path: &Path) -> LegacyFormat {
        if path.is_dir() {
            if path.join(LMDB_DATA_FILE).is_file() {
                return LegacyFormat::EmbeddedKv;
            }
            if !files_with_extensions(path, &FLAT_CACHE_EXTENSIONS).is_empty() {
                return LegacyFormat::FlatFile;
            }
            return LegacyFormat::Unknown;
        }

        match extension(path).as_deref() {
            Some("mdb") => LegacyFormat::EmbeddedKv,
            Some("cache") | Some("json") => LegacyFormat::FlatFile,
            _ if kv::has_lmdb_signature(path) => LegacyFormat::EmbeddedKv,
            _ => LegacyFormat::Unknown,
        }
    }

    /// Summarize a legacy cache store. Never fails: an unopenable store is
    /// reported as empty with its on-disk size.
    #[instrument(skip(self))]
    pub async fn analyze_cache(&self, path: &Path) -> CacheAnalysis {
        let detector = *self;
        let owned = path.to_path_buf();
        let fallback = CacheAnalysis::empty(path, self.detect_format(path));
        match tokio::task::spawn_blocking(move || detector.analyze_cache_blocking(&owned)).await {
            Ok(analysis) => analysis,
            Err(e) => {
                warn!("Cache analysis task for {} failed: {}", path.display(), e);
                fallback
            }
        }
    }

    /// Blocking body of [`Self::analyze_cache`]
    pub fn analyze_cache_blocking(&self, path: &Path) -> CacheAnalysis {
        let format = self.detect_format(path);
        let mut analysis = CacheAnalysis::empty(path, format);
        analysis.cache_age_days = cache_age_days(path, SystemTime::now());

        let records = match self.read_cache_records(path) {
            Ok(records) => records,
            Err(e) => {
                warn!("Could not read legacy cache {}: {}", path.display(), e);
                analysis.estimated_size_bytes = dir_size(path);
                return analysis;
            }
        };
        analysis.estimated_size_bytes = records.size_bytes;

        let now = Utc::now();
        for record in &records.records {
            analysis.total_entries += 1;
            match decode_legacy_value(&record.value) {
                Ok(LegacyValue::Unsafe) => analysis.pickle_entries += 1,
                Ok(LegacyValue::Json(value)) => {
                    if is_expired(&value, now) {
                        analysis.expired_entries += 1;
                    } else {
                        analysis.valid_entries += 1;
                    }
                }
                Err(reason) => debug!(
                    "Undecodable cache record {} in {}: {}",
                    String::from_utf8_lossy(&record.key),
                    path.display(),
                    reason
                ),
            }
        }
        analysis.has_pickle = analysis.pickle_entries > 0;
        analysis.has_expired = analysis.expired_entries > 0;
        analysis
    }

    /// Read every record of a legacy cache store (blocking).
    pub fn read_cache_records(&self, path: &Path) -> MigrationOutcome<CacheRecords> {
        match self.detect_format(path) {
            LegacyFormat::EmbeddedKv => {
                let scan = kv::read_all(path)?;
                Ok(CacheRecords {
                    records: scan.records,
                    unreadable: scan.unreadable,
                    size_bytes: scan.file_size,
                })
            }
            LegacyFormat::FlatFile => Ok(read_flat_records(path)),
            LegacyFormat::Unknown => Err(MigrationError::KvStore(format!(
                "unrecognised cache format at {}",
                path.display()
            ))),
        }
    }

    /// Summarize a legacy configuration file.
    ///
    /// A file that cannot be read or parsed still yields an analysis, with
    /// `parse_error` set.
    pub fn analyze_config(&self, path: &Path) -> LegacyConfigAnalysis {
        let syntax = ConfigSyntax::from_path(path);
        let mut analysis = LegacyConfigAnalysis {
            path: path.to_path_buf(),
            syntax,
            key_count: 0,
            nesting_depth: 0,
            complexity: ComplexityTier::Simple,
            mapped_keys: Vec::new(),
            unmapped_keys: Vec::new(),
            parse_error: None,
        };

        let value = match load_legacy_document(path) {
            Ok(value) => value,
            Err(e) => {
                analysis.parse_error = Some(e.to_string());
                return analysis;
            }
        };

        for (key, _) in flatten_keys(&value) {
            if lookup_config_mapping(&key).is_some() {
                analysis.mapped_keys.push(key);
            } else {
                analysis.unmapped_keys.push(key);
            }
        }
        analysis.key_count = analysis.mapped_keys.len() + analysis.unmapped_keys.len();
        analysis.nesting_depth = nesting_depth(&value);
        analysis.complexity = ComplexityTier::classify(analysis.nesting_depth, analysis.key_count);
        analysis
    }

    /// Full read-only snapshot of a legacy workspace
    #[instrument(skip(self))]
    pub async fn analyze_workspace(&self, path: &Path) -> MigrationOutcome<LegacyWorkspaceData> {
        if !path.is_dir() {
            return Err(MigrationError::SourceNotFound(path.to_path_buf()));
        }

        let config = find_legacy_config(path).map(|config| self.analyze_config(&config));
        let mut caches = Vec::new();
        for store in find_cache_stores(path) {
            caches.push(self.analyze_cache(&store).await);
        }

        let root = path.to_path_buf();
        let (pipeline_files, style_files, template_files, content_files, estimated_size_bytes) =
            tokio::task::spawn_blocking(move || {
                (
                    files_with_extensions(&root.join(PIPELINE_DIR), &DOCUMENT_EXTENSIONS).len(),
                    files_with_extensions(&root.join(STYLE_DIR), &DOCUMENT_EXTENSIONS).len(),
                    files_with_extensions(&root.join(TEMPLATE_DIR), &TEMPLATE_EXTENSIONS).len(),
                    CONTENT_DIRS
                        .iter()
                        .map(|dir| files_recursive(&root.join(dir)).len())
                        .sum::<usize>(),
                    dir_size(&root),
                )
            })
            .await?;

        let (depth, keys) = config
            .as_ref()
            .map(|c| (c.nesting_depth, c.key_count))
            .unwrap_or((0, 0));
        let mut complexity = ComplexityTier::classify(depth, keys);
        // Cache payloads that need filtering push a simple workspace up a tier.
        if complexity == ComplexityTier::Simple
            && caches.iter().any(|c| c.has_pickle || c.has_expired)
        {
            complexity = ComplexityTier::Moderate;
        }

        Ok(LegacyWorkspaceData {
            suggested_name: suggested_name(path),
            has_marker_dir: path.join(LEGACY_MARKER_DIR).is_dir(),
            migrated: read_migration_marker(path),
            path: path.to_path_buf(),
            config,
            caches,
            pipeline_files,
            style_files,
            template_files,
            content_files,
            estimated_size_bytes,
            complexity,
        })
    }

    /// Candidate legacy workspaces among the search paths and their direct children
    pub fn find_legacy_workspaces(&self, search_paths: &[PathBuf]) -> Vec<PathBuf> {
        let mut found = Vec::new();
        for root in search_paths {
            if is_legacy_workspace(root) {
                found.push(root.clone());
            }
            let Ok(entries) = fs::read_dir(root) else {
                continue;
            };
            let mut children: Vec<PathBuf> = entries
                .filter_map(Result::ok)
                .map(|entry| entry.path())
                .filter(|child| is_legacy_workspace(child))
                .collect();
            children.sort();
            found.extend(children);
        }
        found.dedup();
        found
    }
}

/// True for directories carrying the legacy marker or a legacy config, and not
/// already laid out in the current format.
pub fn is_legacy_workspace(path: &Path) -> bool {
    path.is_dir()
        && !path.join(WORKSPACE_FILE).is_file()
        && (path.join(LEGACY_MARKER_DIR).is_dir() || find_legacy_config(path).is_some())
}

/// First legacy configuration file present under `root`
pub fn find_legacy_config(root: &Path) -> Option<PathBuf> {
    LEGACY_CONFIG_CANDIDATES
        .iter()
        .map(|candidate| root.join(candidate))
        .find(|path| path.is_file())
}

/// Legacy cache stores present under `root` in a recognised format
pub fn find_cache_stores(root: &Path) -> Vec<PathBuf> {
    let detector = LegacyFormatDetector;
    LEGACY_CACHE_CANDIDATES
        .iter()
        .map(|candidate| root.join(candidate))
        .filter(|path| path.exists() && detector.detect_format(path) != LegacyFormat::Unknown)
        .collect()
}

/// Parse a YAML or JSON document into an untyped value
pub fn load_legacy_document(path: &Path) -> MigrationOutcome<Value> {
    let text = fs::read_to_string(path)?;
    let value = match ConfigSyntax::from_path(path) {
        ConfigSyntax::Json => serde_json::from_str(&text)?,
        ConfigSyntax::Yaml if text.trim().is_empty() => Value::Null,
        ConfigSyntax::Yaml => serde_yaml::from_str(&text)?,
    };
    Ok(value)
}

/// Read the marker a previous migration left in the source, if any
pub fn read_migration_marker(source: &Path) -> Option<MigrationMarker> {
    let path = source.join(LEGACY_MARKER_DIR).join(MIGRATION_MARKER_FILE);
    let text = fs::read_to_string(path).ok()?;
    serde_json::from_str(&text).ok()
}

/// Workspace name derived from the directory name
pub fn suggested_name(path: &Path) -> String {
    path.file_name()
        .and_then(|name| name.to_str())
        .map(|name| name.trim_start_matches('.').to_string())
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| "workspace".to_string())
}

fn extension(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase)
}

fn is_expired(value: &Value, now: DateTime<Utc>) -> bool {
    value
        .get("expires_at")
        .and_then(parse_timestamp)
        .is_some_and(|expires| now > expires)
}

/// Flat caches hold one record per file; a JSON file whose top-level object
/// is itself a map of records is expanded into those records.
fn read_flat_records(path: &Path) -> CacheRecords {
    let files = if path.is_dir() {
        files_with_extensions(path, &FLAT_CACHE_EXTENSIONS)
    } else {
        vec![path.to_path_buf()]
    };

    let mut out = CacheRecords::default();
    for file in files {
        let bytes = match fs::read(&file) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!("Skipping unreadable cache file {}: {}", file.display(), e);
                out.unreadable += 1;
                continue;
            }
        };
        out.size_bytes += bytes.len() as u64;
        let stem = file
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default();

        if let Some(expanded) = expand_record_map(&bytes) {
            out.records.extend(expanded);
        } else {
            out.records.push(KvRecord {
                key: stem.into_bytes(),
                value: bytes,
            });
        }
    }
    out
}

fn expand_record_map(bytes: &[u8]) -> Option<Vec<KvRecord>> {
    let Ok(LegacyValue::Json(Value::Object(map))) = decode_legacy_value(bytes) else {
        return None;
    };
    let is_single_record = CONTENT_KEYS.iter().any(|key| map.contains_key(*key));
    if is_single_record || map.is_empty() || !map.values().all(Value::is_object) {
        return None;
    }
    let records = map
        .into_iter()
        .filter_map(|(key, value)| {
            serde_json::to_vec(&value).ok().map(|encoded| KvRecord {
                key: key.into_bytes(),
                value: encoded,
            })
        })
        .collect();
    Some(records)
}

/// Days since the oldest file of the store was written, floored at zero
fn cache_age_days(path: &Path, now: SystemTime) -> f64 {
    let oldest = if path.is_dir() {
        files_recursive(path)
            .iter()
            .filter_map(|file| fs::metadata(file).and_then(|m| m.modified()).ok())
            .min()
    } else {
        fs::metadata(path).and_then(|m| m.modified()).ok()
    };
    oldest
        .and_then(|mtime| now.duration_since(mtime).ok())
        .map(|age| (age.as_secs_f64() / SECONDS_PER_DAY).max(0.0))
        .unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::tempdir;

    #[test]
    fn test_detect_by_extension_and_dir_content() {
        let dir = tempdir().unwrap();
        let detector = LegacyFormatDetector::new();
        assert_eq!(
            detector.detect_format(&dir.path().join("store.mdb")),
            LegacyFormat::EmbeddedKv
        );
        assert_eq!(
            detector.detect_format(&dir.path().join("entry.cache")),
            LegacyFormat::FlatFile
        );
        let other = dir.path().join("notes.txt");
        fs::write(&other, "plain text that is long enough").unwrap();
        assert_eq!(detector.detect_format(&other), LegacyFormat::Unknown);

        let flat = dir.path().join("flat");
        fs::create_dir_all(&flat).unwrap();
        assert_eq!(detector.detect_format(&flat), LegacyFormat::Unknown);
        fs::write(flat.join("a.json"), "{}").unwrap();
        assert_eq!(detector.detect_format(&flat), LegacyFormat::FlatFile);
    }

    #[test]
    fn test_signature_detection_without_extension() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("blob");
        let mut bytes = vec![0u8; 64];
        bytes[16..20].copy_from_slice(&0xBEEF_C0DEu32.to_le_bytes());
        fs::write(&path, bytes).unwrap();
        assert_eq!(
            LegacyFormatDetector::new().detect_format(&path),
            LegacyFormat::EmbeddedKv
        );
    }

    #[test]
    fn test_flat_cache_analysis_counts() {
        let dir = tempdir().unwrap();
        let cache = dir.path().join("cache");
        fs::create_dir_all(&cache).unwrap();
        fs::write(cache.join("a.json"), r#"{"response": "fresh"}"#).unwrap();
        fs::write(
            cache.join("b.json"),
            r#"{"response": "stale", "expires_at": "2000-01-01T00:00:00Z"}"#,
        )
        .unwrap();
        fs::write(cache.join("c.cache"), b"\x80\x04\x95pickled").unwrap();
        fs::write(cache.join("d.cache"), b"garbage").unwrap();

        let analysis = LegacyFormatDetector::new().analyze_cache_blocking(&cache);
        assert_eq!(analysis.format, LegacyFormat::FlatFile);
        assert_eq!(analysis.total_entries, 4);
        assert_eq!(analysis.valid_entries, 1);
        assert_eq!(analysis.expired_entries, 1);
        assert_eq!(analysis.pickle_entries, 1);
        assert!(analysis.has_pickle);
        assert!(analysis.has_expired);
        assert!(analysis.cache_age_days >= 0.0);
    }

    #[test]
    fn test_record_map_expansion() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("bundle.json");
        fs::write(
            &file,
            r#"{"k1": {"response": "one"}, "k2": {"response": "two"}}"#,
        )
        .unwrap();
        let records = read_flat_records(&file);
        assert_eq!(records.records.len(), 2);
    }

    #[test]
    fn test_config_analysis() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        fs::write(
            &path,
            "cache_enabled: yes\nmax_cache_entries: 500\nllm:\n  default_model: gpt-4o\n",
        )
        .unwrap();
        let analysis = LegacyFormatDetector::new().analyze_config(&path);
        assert_eq!(analysis.key_count, 3);
        assert_eq!(analysis.nesting_depth, 2);
        assert_eq!(analysis.complexity, ComplexityTier::Moderate);
        assert!(analysis.unmapped_keys.contains(&"max_cache_entries".to_string()));
        assert!(analysis.parse_error.is_none());

        fs::write(&path, "key: [unclosed").unwrap();
        assert!(LegacyFormatDetector::new().analyze_config(&path).parse_error.is_some());
    }

    #[test]
    fn test_cache_age_is_never_negative() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("x.json");
        fs::write(&file, "{}").unwrap();
        let past = SystemTime::now() - Duration::from_secs(3600);
        assert_eq!(cache_age_days(&file, past), 0.0);
        assert_eq!(cache_age_days(&dir.path().join("missing"), SystemTime::now()), 0.0);
    }

    #[test]
    fn test_find_legacy_workspaces() {
        let dir = tempdir().unwrap();
        let legacy = dir.path().join("novel");
        fs::create_dir_all(legacy.join(LEGACY_MARKER_DIR)).unwrap();
        let plain = dir.path().join("photos");
        fs::create_dir_all(&plain).unwrap();
        let migrated = dir.path().join("done");
        fs::create_dir_all(&migrated).unwrap();
        fs::write(migrated.join("config.yaml"), "name: done").unwrap();
        fs::write(migrated.join(WORKSPACE_FILE), "name: done").unwrap();

        let found = LegacyFormatDetector::new().find_legacy_workspaces(&[dir.path().to_path_buf()]);
        assert_eq!(found, vec![legacy]);
    }
}
