//! Target workspace records written by a migration
//!
//! These mirror the structured entity model of the current application. They
//! are plain validated records; all conversion logic lives in
//! [`super::converters`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Subdirectories every migrated workspace carries
pub const WORKSPACE_DIRS: [&str; 4] = ["templates", "pipelines", "cache", "storage"];

/// Root configuration file of a migrated workspace
pub const CONFIG_FILE: &str = "config.yaml";

/// Workspace metadata file
pub const WORKSPACE_FILE: &str = "workspace.yaml";

/// Run report persisted after a successful aggregation
pub const REPORT_FILE: &str = "migration_report.json";

/// `config.yaml` of a migrated workspace
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkspaceConfig {
    pub name: String,
    pub description: String,
    pub default_model: Option<String>,
    pub default_pipeline: Option<String>,
    pub default_temperature: Option<f64>,
    pub enable_cache: bool,
    pub cache_ttl_hours: u64,
    pub auto_save: bool,
    pub max_history: u64,
    pub log_level: String,
    pub llm_providers: Vec<String>,
    pub tags: Vec<String>,
    pub ui_theme: Option<String>,
    pub metadata: BTreeMap<String, Value>,
}

impl Default for WorkspaceConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            description: super::converters::DEFAULT_DESCRIPTION.to_string(),
            default_model: None,
            default_pipeline: None,
            default_temperature: None,
            enable_cache: true,
            cache_ttl_hours: 168,
            auto_save: true,
            max_history: 100,
            log_level: "info".to_string(),
            llm_providers: Vec::new(),
            tags: Vec::new(),
            ui_theme: None,
            metadata: BTreeMap::new(),
        }
    }
}

/// `workspace.yaml` of a migrated workspace
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkspaceMetadata {
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub migrated_from: PathBuf,
    pub migration_id: String,
    pub layout_version: u32,
}

/// Declared user input of a pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineInput {
    pub key: String,
    pub input_type: String,
    pub label: String,
    pub required: bool,
    pub default: Option<Value>,
    pub placeholder: Option<String>,
    pub options: Vec<String>,
}

/// One LLM step of a pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineStep {
    pub key: String,
    pub name: String,
    pub description: String,
    pub step_type: String,
    pub prompt_template: String,
    pub model_preference: Vec<String>,
    pub depends_on: Vec<String>,
    pub parallel: bool,
}

/// Pipeline template in the current layout (`pipelines/<id>.yaml`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineTemplate {
    pub id: String,
    pub name: String,
    pub description: String,
    pub version: String,
    pub author: Option<String>,
    pub inputs: Vec<PipelineInput>,
    pub steps: Vec<PipelineStep>,
    pub tags: Vec<String>,
    pub metadata: BTreeMap<String, Value>,
}

/// Kind of a non-pipeline template
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TemplateKind {
    Style,
    Content,
}

/// Style primer or content template (`templates/<name>.yaml`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentTemplate {
    pub name: String,
    pub kind: TemplateKind,
    pub description: String,
    pub content: String,
    pub tags: Vec<String>,
    pub metadata: BTreeMap<String, Value>,
}

/// Filesystem-safe slug for a record name
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    let mut last_dash = true;
    for c in name.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
            last_dash = false;
        } else if !last_dash {
            slug.push('-');
            last_dash = true;
        }
    }
    while slug.ends_with('-') {
        slug.pop();
    }
    if slug.is_empty() {
        "untitled".to_string()
    } else {
        slug
    }
}
