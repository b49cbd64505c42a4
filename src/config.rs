//! Runtime settings
//!
//! The home root is resolved with this precedence:
//!   1. explicit path (`--home` flag)
//!   2. `QUILL_HOME` env var
//!   3. `~/.quill` via the dirs crate
//!   4. Fallback: `./.quill`
//!
//! An optional `settings.yaml` in the home root overrides the cache TTL and
//! the model cost table; `QUILL_CACHE_TTL_HOURS` overrides both.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::cache_mgmt::{default_cost_table, CachePolicy};

pub const HOME_ENV: &str = "QUILL_HOME";
pub const CACHE_TTL_ENV: &str = "QUILL_CACHE_TTL_HOURS";
pub const SETTINGS_FILE: &str = "settings.yaml";

/// Optional on-disk overrides (`<home>/settings.yaml`)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SettingsFile {
    pub cache_ttl_hours: Option<u64>,
    pub model_costs: BTreeMap<String, f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Settings {
    pub home: PathBuf,
    pub cache_ttl_hours: u64,
    pub model_costs: BTreeMap<String, f64>,
}

impl Settings {
    /// Resolve settings from the flag, the environment and `settings.yaml`
    pub fn resolve(home_flag: Option<&Path>) -> Result<Self> {
        let home = resolve_home(home_flag, std::env::var_os(HOME_ENV).map(PathBuf::from));
        let mut settings = Self::with_home(&home);

        let file = home.join(SETTINGS_FILE);
        if file.is_file() {
            let text = std::fs::read_to_string(&file)
                .with_context(|| format!("Failed to read {}", file.display()))?;
            let overrides: SettingsFile = serde_yaml::from_str(&text)
                .with_context(|| format!("Invalid settings file {}", file.display()))?;
            settings.apply(overrides);
            debug!("Loaded settings overrides from {}", file.display());
        }

        if let Ok(raw) = std::env::var(CACHE_TTL_ENV) {
            settings.cache_ttl_hours = raw
                .trim()
                .parse()
                .with_context(|| format!("{CACHE_TTL_ENV} must be a positive integer, got '{raw}'"))?;
        }
        Ok(settings)
    }

    /// Defaults rooted at `home`, ignoring the environment
    pub fn with_home(home: impl Into<PathBuf>) -> Self {
        Self {
            home: home.into(),
            cache_ttl_hours: CachePolicy::default().default_ttl_hours,
            model_costs: default_cost_table(),
        }
    }

    fn apply(&mut self, overrides: SettingsFile) {
        if let Some(ttl) = overrides.cache_ttl_hours {
            self.cache_ttl_hours = ttl;
        }
        self.model_costs.extend(overrides.model_costs);
    }

    pub fn workspaces_dir(&self) -> PathBuf {
        self.home.join("workspaces")
    }

    /// Default target directory for a migrated workspace
    pub fn workspace_dir(&self, name: &str) -> PathBuf {
        self.workspaces_dir().join(name)
    }

    pub fn backups_dir(&self) -> PathBuf {
        self.home.join("backups")
    }

    /// Shared response cache served by `quill-migrate serve`
    pub fn cache_dir(&self) -> PathBuf {
        self.home.join("cache")
    }

    /// Cache policy with the configured TTL
    pub fn default_cache_policy(&self) -> CachePolicy {
        CachePolicy {
            default_ttl_hours: self.cache_ttl_hours,
            ..Default::default()
        }
    }
}

fn resolve_home(flag: Option<&Path>, env: Option<PathBuf>) -> PathBuf {
    if let Some(dir) = flag {
        return dir.to_path_buf();
    }
    if let Some(dir) = env.filter(|dir| !dir.as_os_str().is_empty()) {
        return dir;
    }
    if let Some(base) = dirs::home_dir() {
        return base.join(".quill");
    }
    PathBuf::from(".").join(".quill")
}
