//! Format converters: legacy untyped data → typed target records
//!
//! Every converter is a pure function. Legacy payloads enter as
//! `serde_json::Value` and leave as one of the records in [`super::model`] or
//! a [`CacheEntry`]; nothing untyped crosses this boundary.
//!
//! Coercion is driven by the declared type of the *target* field:
//!
//! | target      | accepted legacy values                                   |
//! |-------------|----------------------------------------------------------|
//! | `Str`       | any scalar, rendered with its display form               |
//! | `Bool`      | booleans, numbers (non-zero), `true/yes/1/on` (any case) |
//! | `UInt`      | non-negative integers, numeric strings                   |
//! | `Float`     | numbers, numeric strings                                 |
//! | `List`      | arrays of scalars, comma-separated strings               |

use chrono::{DateTime, TimeZone, Utc};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};

use super::kv::is_unsafe_payload;
use super::model::{
    slugify, ContentTemplate, PipelineInput, PipelineStep, PipelineTemplate, TemplateKind,
    WorkspaceConfig,
};
use crate::cache_mgmt::types::{fingerprint, generate_cache_key, is_fingerprint, CacheEntry, TokenUsage};

/// Fallback description for records that carried none
pub const DEFAULT_DESCRIPTION: &str = "Migrated from legacy format";
pub const DEFAULT_VERSION: &str = "1.0.0";
pub const DEFAULT_MODEL: &str = "unknown";
pub const DEFAULT_STEP_TYPE: &str = "llm_generate";
pub const DEFAULT_QUALITY_SCORE: f64 = 0.8;

/// Metadata key stamped on every converted record
pub const MIGRATED_FLAG: &str = "migrated_from_legacy";
pub const MIGRATED_AT: &str = "migrated_at";

/// Declared type of a target field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    Str,
    Bool,
    UInt,
    Float,
    List,
}

/// One row of a legacy-key → target-key mapping table
#[derive(Debug, Clone, Copy)]
pub struct FieldMapping {
    pub legacy_key: &'static str,
    pub target_key: &'static str,
    pub field_type: FieldType,
}

const fn map(legacy_key: &'static str, target_key: &'static str, field_type: FieldType) -> FieldMapping {
    FieldMapping {
        legacy_key,
        target_key,
        field_type,
    }
}

/// Legacy configuration keys (dotted for nested sections) and where they land.
/// Keys not listed here are dropped with a warning.
pub const CONFIG_FIELD_MAP: &[FieldMapping] = &[
    map("cache_enabled", "enable_cache", FieldType::Bool),
    map("enable_cache", "enable_cache", FieldType::Bool),
    map("cache.enabled", "enable_cache", FieldType::Bool),
    map("cache_ttl", "cache_ttl_hours", FieldType::UInt),
    map("cache_ttl_hours", "cache_ttl_hours", FieldType::UInt),
    map("cache.ttl_hours", "cache_ttl_hours", FieldType::UInt),
    map("default_model", "default_model", FieldType::Str),
    map("model", "default_model", FieldType::Str),
    map("llm.default_model", "default_model", FieldType::Str),
    map("llm.model", "default_model", FieldType::Str),
    map("temperature", "default_temperature", FieldType::Float),
    map("llm.temperature", "default_temperature", FieldType::Float),
    map("providers", "llm_providers", FieldType::List),
    map("llm_providers", "llm_providers", FieldType::List),
    map("llm.providers", "llm_providers", FieldType::List),
    map("default_pipeline", "default_pipeline", FieldType::Str),
    map("auto_save", "auto_save", FieldType::Bool),
    map("autosave", "auto_save", FieldType::Bool),
    map("max_history", "max_history", FieldType::UInt),
    map("history_size", "max_history", FieldType::UInt),
    map("log_level", "log_level", FieldType::Str),
    map("logging.level", "log_level", FieldType::Str),
    map("tags", "tags", FieldType::List),
    map("description", "description", FieldType::Str),
    map("theme", "ui_theme", FieldType::Str),
    map("ui.theme", "ui_theme", FieldType::Str),
];

pub fn lookup_config_mapping(legacy_key: &str) -> Option<&'static FieldMapping> {
    CONFIG_FIELD_MAP.iter().find(|m| m.legacy_key == legacy_key)
}

/// Coerce a legacy value into the representation of `field_type`
pub fn coerce(value: &Value, field_type: FieldType) -> Result<Value, String> {
    match field_type {
        FieldType::Str => coerce_string(value).map(Value::String),
        FieldType::Bool => coerce_bool(value).map(Value::Bool),
        FieldType::UInt => coerce_uint(value).map(Value::from),
        FieldType::Float => coerce_float(value).map(Value::from),
        FieldType::List => coerce_list(value).map(|items| {
            Value::Array(items.into_iter().map(Value::String).collect())
        }),
    }
}

pub fn coerce_string(value: &Value) -> Result<String, String> {
    match value {
        Value::String(s) => Ok(s.clone()),
        Value::Bool(b) => Ok(b.to_string()),
        Value::Number(n) => Ok(n.to_string()),
        Value::Null => Err("null is not a string".to_string()),
        other => Ok(other.to_string()),
    }
}

pub fn coerce_bool(value: &Value) -> Result<bool, String> {
    match value {
        Value::Bool(b) => Ok(*b),
        Value::Number(n) => Ok(n.as_f64().is_some_and(|f| f != 0.0)),
        Value::String(s) => {
            let lowered = s.trim().to_ascii_lowercase();
            Ok(matches!(lowered.as_str(), "true" | "yes" | "1" | "on"))
        }
        other => Err(format!("cannot read {other} as a boolean")),
    }
}

pub fn coerce_uint(value: &Value) -> Result<u64, String> {
    match value {
        Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| *f >= 0.0 && f.fract() == 0.0).map(|f| f as u64))
            .ok_or_else(|| format!("{n} is not a non-negative integer")),
        Value::String(s) => s
            .trim()
            .parse::<u64>()
            .map_err(|_| format!("'{s}' is not a non-negative integer")),
        other => Err(format!("cannot read {other} as an integer")),
    }
}

pub fn coerce_float(value: &Value) -> Result<f64, String> {
    match value {
        Value::Number(n) => n.as_f64().ok_or_else(|| format!("{n} is not a number")),
        Value::String(s) => s
            .trim()
            .parse::<f64>()
            .map_err(|_| format!("'{s}' is not a number")),
        other => Err(format!("cannot read {other} as a number")),
    }
}

pub fn coerce_list(value: &Value) -> Result<Vec<String>, String> {
    match value {
        Value::Array(items) => items.iter().filter(|v| !v.is_null()).map(coerce_string).collect(),
        Value::String(s) => Ok(s
            .split(',')
            .map(str::trim)
            .filter(|item| !item.is_empty())
            .map(str::to_string)
            .collect()),
        Value::Null => Ok(Vec::new()),
        other => Ok(vec![coerce_string(other)?]),
    }
}

/// Flatten nested objects into dotted keys; arrays and scalars are leaves.
pub fn flatten_keys(value: &Value) -> Vec<(String, Value)> {
    fn walk(prefix: &str, value: &Value, out: &mut Vec<(String, Value)>) {
        match value {
            Value::Object(map) if !map.is_empty() => {
                for (key, child) in map {
                    let path = if prefix.is_empty() {
                        key.clone()
                    } else {
                        format!("{prefix}.{key}")
                    };
                    walk(&path, child, out);
                }
            }
            _ if !prefix.is_empty() => out.push((prefix.to_string(), value.clone())),
            _ => {}
        }
    }
    let mut out = Vec::new();
    walk("", value, &mut out);
    out
}

/// Depth of nested containers (a flat object has depth 1)
pub fn nesting_depth(value: &Value) -> usize {
    match value {
        Value::Object(map) => 1 + map.values().map(nesting_depth).max().unwrap_or(0),
        Value::Array(items) => 1 + items.iter().map(nesting_depth).max().unwrap_or(0),
        _ => 0,
    }
}

/// Read a legacy timestamp: RFC 3339 / naive ISO strings or unix seconds
pub fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::Number(n) => {
            let secs = n.as_f64()?;
            if !secs.is_finite() {
                return None;
            }
            let whole = secs.trunc() as i64;
            let nanos = ((secs.fract()) * 1e9) as u32;
            Utc.timestamp_opt(whole, nanos).single()
        }
        Value::String(s) => {
            let trimmed = s.trim();
            DateTime::parse_from_rfc3339(trimmed)
                .map(|dt| dt.with_timezone(&Utc))
                .ok()
                .or_else(|| {
                    chrono::NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%dT%H:%M:%S%.f")
                        .or_else(|_| {
                            chrono::NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%d %H:%M:%S%.f")
                        })
                        .ok()
                        .map(|naive| naive.and_utc())
                })
                .or_else(|| trimmed.parse::<f64>().ok().and_then(|f| parse_timestamp(&Value::from(f))))
        }
        _ => None,
    }
}

fn migration_stamp(now: DateTime<Utc>) -> BTreeMap<String, Value> {
    let mut metadata = BTreeMap::new();
    metadata.insert(MIGRATED_FLAG.to_string(), Value::Bool(true));
    metadata.insert(MIGRATED_AT.to_string(), Value::String(now.to_rfc3339()));
    metadata
}

fn first_present<'a>(map: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a Value> {
    keys.iter()
        .find_map(|key| map.get(*key).filter(|value| !value.is_null()))
}

fn string_field(map: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    first_present(map, keys)
        .and_then(|value| coerce_string(value).ok())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn list_field(map: &Map<String, Value>, keys: &[&str]) -> Vec<String> {
    first_present(map, keys)
        .and_then(|value| coerce_list(value).ok())
        .unwrap_or_default()
}

fn bool_field(map: &Map<String, Value>, keys: &[&str], default: bool) -> bool {
    first_present(map, keys)
        .and_then(|value| coerce_bool(value).ok())
        .unwrap_or(default)
}

fn extra_metadata(map: &Map<String, Value>) -> BTreeMap<String, Value> {
    match map.get("metadata") {
        Some(Value::Object(meta)) => meta.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
        _ => BTreeMap::new(),
    }
}

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Converted configuration plus the per-key bookkeeping
#[derive(Debug, Clone)]
pub struct ConfigConversion {
    pub config: WorkspaceConfig,
    pub migrated_keys: usize,
    pub dropped_keys: Vec<String>,
    pub warnings: Vec<String>,
}

/// Convert a legacy configuration document into a [`WorkspaceConfig`].
///
/// Nested sections are addressed by dotted keys. When several legacy keys map
/// to the same target, the first one encountered wins and the others are
/// reported as shadowed.
pub fn convert_config(legacy: &Value, workspace_name: &str, now: DateTime<Utc>) -> ConfigConversion {
    let mut warnings = Vec::new();
    let mut dropped_keys = Vec::new();
    let mut migrated_keys = 0;
    let mut target = Map::new();
    let mut assigned: BTreeSet<&'static str> = BTreeSet::new();

    if !legacy.is_object() && !legacy.is_null() {
        warnings.push("Legacy configuration is not a mapping; using defaults".to_string());
    }

    for (key, value) in flatten_keys(legacy) {
        let Some(mapping) = lookup_config_mapping(&key) else {
            warnings.push(format!("Dropped unmapped configuration key '{key}'"));
            dropped_keys.push(key);
            continue;
        };
        if assigned.contains(mapping.target_key) {
            warnings.push(format!(
                "Configuration key '{key}' shadowed by an earlier value for '{}'",
                mapping.target_key
            ));
            dropped_keys.push(key);
            continue;
        }
        match coerce(&value, mapping.field_type) {
            Ok(coerced) => {
                target.insert(mapping.target_key.to_string(), coerced);
                assigned.insert(mapping.target_key);
                migrated_keys += 1;
            }
            Err(reason) => {
                warnings.push(format!(
                    "Dropped configuration key '{key}': {reason}"
                ));
                dropped_keys.push(key);
            }
        }
    }

    target.insert("name".to_string(), Value::String(workspace_name.to_string()));
    let description_missing = target
        .get("description")
        .and_then(Value::as_str)
        .map_or(true, |d| d.trim().is_empty());
    if description_missing {
        target.insert(
            "description".to_string(),
            Value::String(DEFAULT_DESCRIPTION.to_string()),
        );
    }

    let mut config = match serde_json::from_value::<WorkspaceConfig>(Value::Object(target)) {
        Ok(config) => config,
        Err(e) => {
            warnings.push(format!("Falling back to default configuration: {e}"));
            WorkspaceConfig {
                name: workspace_name.to_string(),
                ..Default::default()
            }
        }
    };
    config.metadata.extend(migration_stamp(now));
    config
        .metadata
        .insert("migrated_keys".to_string(), Value::from(migrated_keys));

    ConfigConversion {
        config,
        migrated_keys,
        dropped_keys,
        warnings,
    }
}

// ---------------------------------------------------------------------------
// Cache entries
// ---------------------------------------------------------------------------

/// Decoded legacy cache value
#[derive(Debug, Clone)]
pub enum LegacyValue {
    /// Pickled payload, never decoded
    Unsafe,
    Json(Value),
}

/// Classify raw value bytes without executing anything
pub fn decode_legacy_value(bytes: &[u8]) -> Result<LegacyValue, String> {
    if is_unsafe_payload(bytes) {
        return Ok(LegacyValue::Unsafe);
    }
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Err("empty value".to_string());
    }
    serde_json::from_slice::<Value>(bytes)
        .map(LegacyValue::Json)
        .map_err(|e| format!("undecodable value: {e}"))
}

/// Why a cache record was not migrated
#[derive(Debug, Clone, PartialEq)]
pub enum SkipReason {
    UnsafePayload,
    Expired,
    Malformed(String),
}

/// Outcome of converting one cache record
#[derive(Debug, Clone)]
pub enum CacheConversion {
    Converted(Box<CacheEntry>),
    Skipped(SkipReason),
}

/// Convert one legacy cache record.
///
/// Unsafe payloads are skipped unconditionally. Expired entries are skipped
/// as well: migrating them would only hand the new cache work to evict.
pub fn convert_cache_entry(
    key: &[u8],
    value: &[u8],
    workspace: &str,
    now: DateTime<Utc>,
) -> CacheConversion {
    let decoded = match decode_legacy_value(value) {
        Ok(LegacyValue::Unsafe) => return CacheConversion::Skipped(SkipReason::UnsafePayload),
        Ok(LegacyValue::Json(json)) => json,
        Err(reason) => return CacheConversion::Skipped(SkipReason::Malformed(reason)),
    };

    let legacy_key = String::from_utf8_lossy(key).to_string();
    let map = match decoded {
        Value::Object(map) => map,
        // Bare strings were stored by the oldest releases: the value is the response.
        Value::String(content) => {
            let mut map = Map::new();
            map.insert("response".to_string(), Value::String(content));
            map
        }
        other => {
            return CacheConversion::Skipped(SkipReason::Malformed(format!(
                "expected an object, found {}",
                json_kind(&other)
            )))
        }
    };

    let expires_at = map.get("expires_at").and_then(parse_timestamp);
    if expires_at.is_some_and(|expires| now > expires) {
        return CacheConversion::Skipped(SkipReason::Expired);
    }

    let Some(content) = first_present(&map, &["response", "content", "value", "result"])
        .and_then(|v| coerce_string(v).ok())
    else {
        return CacheConversion::Skipped(SkipReason::Malformed(
            "record has no response content".to_string(),
        ));
    };

    let model = string_field(&map, &["model", "model_name"]).unwrap_or_else(|| DEFAULT_MODEL.to_string());
    let key = if is_fingerprint(&legacy_key) {
        legacy_key.to_ascii_lowercase()
    } else if let Some(prompt) = string_field(&map, &["prompt"]) {
        generate_cache_key(&prompt, &model, &BTreeMap::new())
    } else {
        fingerprint(legacy_key.as_bytes())
    };

    let usage = token_usage(&map);
    let created_at = map
        .get("created_at")
        .and_then(parse_timestamp)
        .unwrap_or(now);
    let last_accessed = map
        .get("last_accessed")
        .and_then(parse_timestamp)
        .unwrap_or(created_at);
    let access_count = map
        .get("access_count")
        .and_then(|v| coerce_uint(v).ok())
        .unwrap_or(0);
    let cost = map
        .get("cost")
        .and_then(|v| coerce_float(v).ok())
        .filter(|c| *c >= 0.0)
        .unwrap_or(0.0);
    let quality_score = map
        .get("quality_score")
        .and_then(|v| coerce_float(v).ok())
        .filter(|q| (0.0..=1.0).contains(q))
        .unwrap_or(DEFAULT_QUALITY_SCORE);

    let mut metadata = extra_metadata(&map);
    metadata.extend(migration_stamp(now));
    metadata.insert("legacy_key".to_string(), Value::String(legacy_key));
    if let Some(latency) = map.get("response_time_ms").and_then(|v| coerce_uint(v).ok()) {
        metadata.insert(
            crate::cache_mgmt::types::RESPONSE_TIME_KEY.to_string(),
            Value::from(latency),
        );
    }

    let size_bytes = content.len() as u64;
    CacheConversion::Converted(Box::new(CacheEntry {
        key,
        content,
        workspace: string_field(&map, &["workspace"]).unwrap_or_else(|| workspace.to_string()),
        model,
        usage,
        cost,
        quality_score,
        created_at,
        last_accessed,
        access_count,
        expires_at,
        size_bytes,
        metadata,
    }))
}

fn token_usage(map: &Map<String, Value>) -> TokenUsage {
    let read = |obj: &Map<String, Value>, key: &str| {
        obj.get(key).and_then(|v| coerce_uint(v).ok()).unwrap_or(0)
    };
    match map.get("usage").or_else(|| map.get("tokens_used")) {
        Some(Value::Object(usage)) => {
            let prompt = read(usage, "prompt_tokens");
            let completion = read(usage, "completion_tokens");
            let total = read(usage, "total_tokens");
            TokenUsage {
                prompt_tokens: prompt,
                completion_tokens: completion,
                total_tokens: if total > 0 { total } else { prompt + completion },
            }
        }
        Some(scalar) => TokenUsage {
            total_tokens: coerce_uint(scalar).unwrap_or(0),
            ..Default::default()
        },
        None => TokenUsage::default(),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

// ---------------------------------------------------------------------------
// Pipeline templates
// ---------------------------------------------------------------------------

/// Convert a legacy pipeline document.
///
/// `steps` and `inputs` may be either mappings keyed by step/input key or
/// lists; list items without a key get a positional one.
pub fn convert_pipeline_template(
    legacy: &Value,
    fallback_name: &str,
    now: DateTime<Utc>,
) -> Result<PipelineTemplate, String> {
    let Value::Object(map) = legacy else {
        return Err(format!("expected a mapping, found {}", json_kind(legacy)));
    };

    let name = string_field(map, &["name", "title"]).unwrap_or_else(|| fallback_name.to_string());
    let description =
        string_field(map, &["description"]).unwrap_or_else(|| DEFAULT_DESCRIPTION.to_string());
    let version = string_field(map, &["version"]).unwrap_or_else(|| DEFAULT_VERSION.to_string());

    let inputs = keyed_items(map.get("inputs"), "input")
        .into_iter()
        .map(|(key, raw)| convert_input(key, &raw))
        .collect();

    let steps: Vec<PipelineStep> = keyed_items(map.get("steps"), "step")
        .into_iter()
        .map(|(key, raw)| convert_step(key, &raw))
        .collect();
    if steps.is_empty() {
        return Err(format!("pipeline '{name}' defines no steps"));
    }

    let mut metadata = extra_metadata(map);
    metadata.extend(migration_stamp(now));

    Ok(PipelineTemplate {
        id: slugify(&name),
        name,
        description,
        version,
        author: string_field(map, &["author"]),
        inputs,
        steps,
        tags: list_field(map, &["tags"]),
        metadata,
    })
}

fn keyed_items(value: Option<&Value>, prefix: &str) -> Vec<(String, Value)> {
    match value {
        Some(Value::Object(items)) => items
            .iter()
            .map(|(key, item)| (key.clone(), item.clone()))
            .collect(),
        Some(Value::Array(items)) => items
            .iter()
            .enumerate()
            .map(|(idx, item)| {
                let key = item
                    .get("key")
                    .and_then(|k| coerce_string(k).ok())
                    .unwrap_or_else(|| format!("{prefix}_{}", idx + 1));
                (key, item.clone())
            })
            .collect(),
        _ => Vec::new(),
    }
}

fn convert_input(key: String, raw: &Value) -> PipelineInput {
    let empty = Map::new();
    let map = raw.as_object().unwrap_or(&empty);
    PipelineInput {
        label: string_field(map, &["label", "name"]).unwrap_or_else(|| key.clone()),
        input_type: string_field(map, &["type", "input_type"]).unwrap_or_else(|| "text".to_string()),
        required: bool_field(map, &["required"], false),
        default: map.get("default").cloned().filter(|v| !v.is_null()),
        placeholder: string_field(map, &["placeholder"]),
        options: list_field(map, &["options", "choices"]),
        key,
    }
}

fn convert_step(key: String, raw: &Value) -> PipelineStep {
    // A bare string step is just its prompt.
    if let Value::String(prompt) = raw {
        return PipelineStep {
            name: key.clone(),
            key,
            description: String::new(),
            step_type: DEFAULT_STEP_TYPE.to_string(),
            prompt_template: prompt.clone(),
            model_preference: Vec::new(),
            depends_on: Vec::new(),
            parallel: false,
        };
    }
    let empty = Map::new();
    let map = raw.as_object().unwrap_or(&empty);
    PipelineStep {
        name: string_field(map, &["name"]).unwrap_or_else(|| key.clone()),
        description: string_field(map, &["description"]).unwrap_or_default(),
        step_type: string_field(map, &["type", "step_type"])
            .unwrap_or_else(|| DEFAULT_STEP_TYPE.to_string()),
        prompt_template: string_field(map, &["prompt_template", "prompt", "template"])
            .unwrap_or_default(),
        model_preference: list_field(map, &["model_preference", "models", "model"]),
        depends_on: list_field(map, &["depends_on", "dependencies"]),
        parallel: bool_field(map, &["parallel"], false),
        key,
    }
}

// ---------------------------------------------------------------------------
// Style and content templates
// ---------------------------------------------------------------------------

/// Convert a YAML/JSON style primer or content template
pub fn convert_template_document(
    legacy: &Value,
    fallback_name: &str,
    kind: TemplateKind,
    now: DateTime<Utc>,
) -> Result<ContentTemplate, String> {
    let Value::Object(map) = legacy else {
        return Err(format!("expected a mapping, found {}", json_kind(legacy)));
    };

    let content = match first_present(map, &["content", "template", "style", "guidelines", "body"]) {
        Some(Value::String(text)) => text.clone(),
        // Structured style primers (voice/tone/rules sections) are kept as YAML text.
        Some(structured) => serde_yaml::to_string(structured).map_err(|e| e.to_string())?,
        None => return Err("template has no content".to_string()),
    };

    let mut metadata = extra_metadata(map);
    metadata.extend(migration_stamp(now));
    Ok(ContentTemplate {
        name: string_field(map, &["name", "title"]).unwrap_or_else(|| fallback_name.to_string()),
        kind,
        description: string_field(map, &["description"])
            .unwrap_or_else(|| DEFAULT_DESCRIPTION.to_string()),
        content,
        tags: list_field(map, &["tags"]),
        metadata,
    })
}

/// Convert a Markdown content template with optional YAML front matter
pub fn convert_markdown_template(text: &str, fallback_name: &str, now: DateTime<Utc>) -> ContentTemplate {
    let (front, body) = split_front_matter(text);
    let front_map = front
        .and_then(|yaml| serde_yaml::from_str::<Value>(yaml).ok())
        .and_then(|value| match value {
            Value::Object(map) => Some(map),
            _ => None,
        })
        .unwrap_or_default();

    let mut metadata = extra_metadata(&front_map);
    metadata.extend(migration_stamp(now));
    ContentTemplate {
        name: string_field(&front_map, &["name", "title"]).unwrap_or_else(|| fallback_name.to_string()),
        kind: TemplateKind::Content,
        description: string_field(&front_map, &["description"])
            .unwrap_or_else(|| DEFAULT_DESCRIPTION.to_string()),
        content: body.trim_start_matches('\n').to_string(),
        tags: list_field(&front_map, &["tags"]),
        metadata,
    }
}

fn split_front_matter(text: &str) -> (Option<&str>, &str) {
    let Some(rest) = text.strip_prefix("---\n").or_else(|| text.strip_prefix("---\r\n")) else {
        return (None, text);
    };
    match rest.find("\n---") {
        Some(end) => {
            let front = &rest[..end];
            let after = &rest[end + 4..];
            let body = after.strip_prefix('\r').unwrap_or(after);
            (Some(front), body.strip_prefix('\n').unwrap_or(body))
        }
        None => (None, text),
    }
}
