//! Type definitions for the cache management service

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Latency assumed for a regenerated response when the entry did not record one
pub const DEFAULT_RESPONSE_LATENCY_MS: u64 = 1_500;

/// Metadata key holding the observed generation latency of a response
pub const RESPONSE_TIME_KEY: &str = "response_time_ms";

/// Deterministic fingerprint for a prompt/model/context triple.
///
/// Context pairs are hashed in key order (`BTreeMap`), so the same logical
/// request always yields the same key.
pub fn generate_cache_key(prompt: &str, model: &str, context: &BTreeMap<String, String>) -> String {
    let mut hasher = Sha256::new();
    hasher.update(b"prompt\0");
    hasher.update(prompt.as_bytes());
    hasher.update(b"\0model\0");
    hasher.update(model.as_bytes());
    for (key, value) in context {
        hasher.update(b"\0");
        hasher.update(key.as_bytes());
        hasher.update(b"=");
        hasher.update(value.as_bytes());
    }
    hex::encode(hasher.finalize())
}

/// Fingerprint of an arbitrary legacy key
pub fn fingerprint(raw: &[u8]) -> String {
    hex::encode(Sha256::digest(raw))
}

/// True for keys that already look like a SHA-256 fingerprint
pub fn is_fingerprint(key: &str) -> bool {
    key.len() == 64 && key.bytes().all(|b| b.is_ascii_hexdigit())
}

/// Token accounting for one LLM response
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
}

impl TokenUsage {
    pub fn new(prompt_tokens: u64, completion_tokens: u64) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens + completion_tokens,
        }
    }

    /// `total_tokens` when recorded, otherwise the sum of both halves
    pub fn total(&self) -> u64 {
        if self.total_tokens > 0 {
            self.total_tokens
        } else {
            self.prompt_tokens + self.completion_tokens
        }
    }
}

/// Where a response was produced
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CacheContext {
    pub workspace: String,
    pub model: String,
    pub pipeline_id: Option<String>,
    pub step_key: Option<String>,
}

/// One cached LLM response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub key: String,
    pub content: String,
    pub workspace: String,
    pub model: String,
    pub usage: TokenUsage,
    pub cost: f64,
    pub quality_score: f64,
    pub created_at: DateTime<Utc>,
    pub last_accessed: DateTime<Utc>,
    pub access_count: u64,
    pub expires_at: Option<DateTime<Utc>>,
    pub size_bytes: u64,
    #[serde(default)]
    pub metadata: BTreeMap<String, Value>,
}

impl CacheEntry {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|expires| now > expires)
    }

    /// Generation latency recorded in metadata, if any
    pub fn response_time_ms(&self) -> Option<u64> {
        self.metadata.get(RESPONSE_TIME_KEY).and_then(Value::as_u64)
    }
}

/// Eviction algorithm selected by the active policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvictionStrategy {
    Lru,
    Lfu,
    Ttl,
    CostAware,
    QualityAware,
    #[default]
    Adaptive,
}

impl fmt::Display for EvictionStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EvictionStrategy::Lru => "lru",
            EvictionStrategy::Lfu => "lfu",
            EvictionStrategy::Ttl => "ttl",
            EvictionStrategy::CostAware => "cost_aware",
            EvictionStrategy::QualityAware => "quality_aware",
            EvictionStrategy::Adaptive => "adaptive",
        };
        f.write_str(name)
    }
}

/// Cache policy options
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachePolicy {
    pub strategy: EvictionStrategy,
    pub max_entries: usize,
    pub max_size_bytes: u64,
    pub default_ttl_hours: u64,
    pub min_hit_count: u64,
    pub quality_threshold: f64,
    pub cost_threshold: f64,
    pub enable_compression: bool,
    pub enable_warming: bool,
}

impl Default for CachePolicy {
    fn default() -> Self {
        Self {
            strategy: EvictionStrategy::Adaptive,
            max_entries: 10_000,
            max_size_bytes: 100 * 1024 * 1024, // 100MB
            default_ttl_hours: 168,            // 1 week
            min_hit_count: 1,
            quality_threshold: 0.0,
            cost_threshold: 0.0,
            enable_compression: false,
            enable_warming: true,
        }
    }
}

impl CachePolicy {
    /// Reject policies whose bounds would make the cache unusable
    pub fn validate(&self) -> Result<(), CacheError> {
        if self.max_entries == 0 {
            return Err(CacheError::InvalidPolicy(
                "max_entries must be positive".to_string(),
            ));
        }
        if self.max_size_bytes == 0 {
            return Err(CacheError::InvalidPolicy(
                "max_size_bytes must be positive".to_string(),
            ));
        }
        if self.default_ttl_hours == 0 {
            return Err(CacheError::InvalidPolicy(
                "default_ttl_hours must be positive".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.quality_threshold) {
            return Err(CacheError::InvalidPolicy(format!(
                "quality_threshold must be within [0, 1], got {}",
                self.quality_threshold
            )));
        }
        if self.cost_threshold < 0.0 || !self.cost_threshold.is_finite() {
            return Err(CacheError::InvalidPolicy(format!(
                "cost_threshold must be a non-negative number, got {}",
                self.cost_threshold
            )));
        }
        Ok(())
    }

    /// TTL as a duration, capped at 1000 years
    pub fn ttl(&self) -> Duration {
        const MAX_TTL_HOURS: u64 = 24 * 365 * 1000;
        Duration::hours(self.default_ttl_hours.min(MAX_TTL_HOURS) as i64)
    }
}

/// Running cache counters
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CacheStatistics {
    pub total_requests: u64,
    pub hits: u64,
    pub misses: u64,
    pub entries: u64,
    pub total_bytes: u64,
    pub evictions: u64,
    pub cost_saved: f64,
    pub latency_saved_ms: u64,
}

impl CacheStatistics {
    pub fn hit_rate(&self) -> f64 {
        if self.total_requests > 0 {
            self.hits as f64 / self.total_requests as f64
        } else {
            0.0
        }
    }

    pub fn miss_rate(&self) -> f64 {
        if self.total_requests > 0 {
            self.misses as f64 / self.total_requests as f64
        } else {
            0.0
        }
    }

    pub fn record_hit(&mut self, cost_saved: f64, latency_saved_ms: u64) {
        self.total_requests += 1;
        self.hits += 1;
        self.cost_saved += cost_saved;
        self.latency_saved_ms += latency_saved_ms;
    }

    pub fn record_miss(&mut self) {
        self.total_requests += 1;
        self.misses += 1;
    }

    pub fn record_store(&mut self, size_bytes: u64) {
        self.entries += 1;
        self.total_bytes += size_bytes;
    }

    pub fn record_removal(&mut self, size_bytes: u64) {
        self.entries = self.entries.saturating_sub(1);
        self.total_bytes = self.total_bytes.saturating_sub(size_bytes);
    }
}

/// Snapshot of statistics with the derived rates filled in
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatisticsReport {
    #[serde(flatten)]
    pub counters: CacheStatistics,
    pub hit_rate: f64,
    pub miss_rate: f64,
}

impl From<&CacheStatistics> for StatisticsReport {
    fn from(stats: &CacheStatistics) -> Self {
        Self {
            counters: stats.clone(),
            hit_rate: stats.hit_rate(),
            miss_rate: stats.miss_rate(),
        }
    }
}

/// Result of an eviction pass
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EvictionSummary {
    pub evicted: usize,
    pub freed_bytes: u64,
    pub keys: Vec<String>,
}

/// Result of a warming pass
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WarmingSummary {
    pub indexed: usize,
    pub expired_dropped: usize,
    pub total_bytes: u64,
}

/// What an optimization plan tries to improve
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OptimizationGoal {
    HitRate,
    CostReduction,
    LatencyReduction,
    StorageEfficiency,
    #[default]
    Balanced,
}

impl OptimizationGoal {
    pub fn recommended_strategy(&self) -> EvictionStrategy {
        match self {
            OptimizationGoal::HitRate => EvictionStrategy::Lfu,
            OptimizationGoal::CostReduction => EvictionStrategy::CostAware,
            OptimizationGoal::LatencyReduction => EvictionStrategy::Lru,
            OptimizationGoal::StorageEfficiency => EvictionStrategy::QualityAware,
            OptimizationGoal::Balanced => EvictionStrategy::Adaptive,
        }
    }
}

impl FromStr for OptimizationGoal {
    type Err = CacheError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "hit_rate" => Ok(OptimizationGoal::HitRate),
            "cost_reduction" | "cost" => Ok(OptimizationGoal::CostReduction),
            "latency_reduction" | "latency" => Ok(OptimizationGoal::LatencyReduction),
            "storage_efficiency" | "storage" => Ok(OptimizationGoal::StorageEfficiency),
            "balanced" => Ok(OptimizationGoal::Balanced),
            other => Err(CacheError::InvalidPolicy(format!(
                "unknown optimization goal '{other}'"
            ))),
        }
    }
}

/// Structured plan an operator or automation can apply
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimizationPlan {
    pub goal: OptimizationGoal,
    pub recommended_strategy: EvictionStrategy,
    pub recommended_policy: CachePolicy,
    pub current_hit_rate: f64,
    pub target_hit_rate: f64,
    pub eviction_candidates: Vec<String>,
    pub estimated_bytes_reclaimed: u64,
    pub actions: Vec<String>,
    pub generated_at: DateTime<Utc>,
}

/// Result of applying an optimization plan
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanOutcome {
    pub applied_strategy: EvictionStrategy,
    pub evicted: usize,
    pub freed_bytes: u64,
    pub missing_candidates: usize,
}

/// Per-model usage breakdown
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModelUsage {
    pub entries: usize,
    pub total_bytes: u64,
    pub total_tokens: u64,
    pub hits: u64,
    pub average_quality: f64,
}

/// Cache analytics snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheAnalytics {
    pub statistics: StatisticsReport,
    pub strategy: EvictionStrategy,
    pub models: BTreeMap<String, ModelUsage>,
    pub size_distribution: BTreeMap<String, usize>,
    pub top_entries: Vec<(String, u64)>,
    pub utilization: f64,
    pub recommendations: Vec<String>,
}

/// Error types for the cache management service
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("Invalid cache policy: {0}")]
    InvalidPolicy(String),

    #[error("Cache storage error: {0}")]
    Storage(String),

    #[error("Failed to encode cache entry: {0}")]
    Encoding(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_key_is_deterministic() {
        let mut ctx = BTreeMap::new();
        ctx.insert("workspace".to_string(), "novel".to_string());
        ctx.insert("step".to_string(), "outline".to_string());
        let a = generate_cache_key("Write a haiku", "gpt-4o", &ctx);
        let b = generate_cache_key("Write a haiku", "gpt-4o", &ctx.clone());
        assert_eq!(a, b);
        assert!(is_fingerprint(&a));
        assert_ne!(a, generate_cache_key("Write a haiku", "gpt-4o-mini", &ctx));
    }

    #[test]
    fn test_policy_validation() {
        assert!(CachePolicy::default().validate().is_ok());
        let policy = CachePolicy {
            max_entries: 0,
            ..Default::default()
        };
        assert!(policy.validate().is_err());
        let policy = CachePolicy {
            quality_threshold: 1.5,
            ..Default::default()
        };
        assert!(policy.validate().is_err());
    }

    #[test]
    fn test_statistics_rates() {
        let mut stats = CacheStatistics::default();
        assert_eq!(stats.hit_rate(), 0.0);
        stats.record_hit(0.02, 1000);
        stats.record_miss();
        stats.record_miss();
        stats.record_hit(0.01, 500);
        assert_eq!(stats.total_requests, 4);
        assert!((stats.hit_rate() - 0.5).abs() < f64::EPSILON);
        assert!((stats.miss_rate() - 0.5).abs() < f64::EPSILON);
        assert_eq!(stats.latency_saved_ms, 1500);
    }

    #[test]
    fn test_goal_strategy_mapping() {
        assert_eq!(
            "hit-rate".parse::<OptimizationGoal>().unwrap().recommended_strategy(),
            EvictionStrategy::Lfu
        );
        assert_eq!(
            OptimizationGoal::StorageEfficiency.recommended_strategy(),
            EvictionStrategy::QualityAware
        );
    }
}
