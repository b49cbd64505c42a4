//! Cache management service
//!
//! Tracks statistics and per-entry access metadata for a [`CacheStore`],
//! enforces the active [`CachePolicy`], and dispatches eviction to the
//! strategy the policy selects. The service has no internal locking; share it
//! through `Arc<tokio::sync::Mutex<_>>` when several tasks need it (see
//! [`maintenance::CacheMaintenance`]).

pub mod eviction;
pub mod maintenance;
pub mod store;
pub mod types;

use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use eviction::{select_victims, EvictionCandidate};
use store::CacheStore;
pub use types::*;

use crate::config::Settings;

/// Cost per 1000 tokens assumed for models missing from the cost table
pub const DEFAULT_COST_PER_1K: f64 = 0.002;

/// Target hit rate of every optimization plan
pub const TARGET_HIT_RATE: f64 = 0.8;

/// Entries below this quality are optimization candidates
pub const LOW_QUALITY_THRESHOLD: f64 = 0.5;

/// Entries larger than this multiple of the mean size are optimization candidates
pub const LARGE_ENTRY_FACTOR: f64 = 2.0;

/// An entry may use at most this fraction of the total byte budget
const MAX_ENTRY_FRACTION: u64 = 100;

const TOP_ENTRIES: usize = 10;

/// Built-in cost table (USD per 1000 tokens); overridable through settings
pub fn default_cost_table() -> BTreeMap<String, f64> {
    [
        ("gpt-4", 0.03),
        ("gpt-4-turbo", 0.01),
        ("gpt-4o", 0.005),
        ("gpt-4o-mini", 0.000_15),
        ("gpt-3.5-turbo", 0.0015),
        ("claude-3-opus", 0.015),
        ("claude-3-sonnet", 0.003),
        ("claude-3-haiku", 0.000_25),
    ]
    .into_iter()
    .map(|(model, cost)| (model.to_string(), cost))
    .collect()
}

/// Access metadata tracked for every entry the service knows about
#[derive(Debug, Clone)]
struct TrackedEntry {
    workspace: String,
    model: String,
    last_accessed: DateTime<Utc>,
    hits: u64,
    cost: f64,
    quality: f64,
    size_bytes: u64,
    tokens: u64,
    expires_at: Option<DateTime<Utc>>,
}

impl TrackedEntry {
    fn from_entry(entry: &CacheEntry) -> Self {
        Self {
            workspace: entry.workspace.clone(),
            model: entry.model.clone(),
            last_accessed: entry.last_accessed,
            hits: entry.access_count,
            cost: entry.cost,
            quality: entry.quality_score,
            size_bytes: entry.size_bytes,
            tokens: entry.usage.total(),
            expires_at: entry.expires_at,
        }
    }

    fn candidate(&self, key: &str) -> EvictionCandidate {
        EvictionCandidate {
            key: key.to_string(),
            last_accessed: self.last_accessed,
            hits: self.hits,
            cost: self.cost,
            quality: self.quality,
            size_bytes: self.size_bytes,
        }
    }
}

/// Cache management service
#[derive(Debug)]
pub struct CacheManagementService {
    store: Arc<dyn CacheStore>,
    policy: CachePolicy,
    stats: CacheStatistics,
    workspace_stats: HashMap<String, CacheStatistics>,
    tracked: HashMap<String, TrackedEntry>,
    cost_table: BTreeMap<String, f64>,
}

impl CacheManagementService {
    /// Create a service over `store`; the policy is validated first.
    pub fn new(store: Arc<dyn CacheStore>, policy: CachePolicy) -> Result<Self, CacheError> {
        policy.validate()?;
        Ok(Self {
            store,
            policy,
            stats: CacheStatistics::default(),
            workspace_stats: HashMap::new(),
            tracked: HashMap::new(),
            cost_table: default_cost_table(),
        })
    }

    /// Create a service using the configured TTL and cost table
    pub fn from_settings(store: Arc<dyn CacheStore>, settings: &Settings) -> Result<Self, CacheError> {
        Ok(Self::new(store, settings.default_cache_policy())?.with_cost_table(settings.model_costs.clone()))
    }

    pub fn with_cost_table(mut self, cost_table: BTreeMap<String, f64>) -> Self {
        self.cost_table = cost_table;
        self
    }

    pub fn policy(&self) -> &CachePolicy {
        &self.policy
    }

    pub fn store(&self) -> &Arc<dyn CacheStore> {
        &self.store
    }

    /// Number of entries the service is tracking
    pub fn tracked_entries(&self) -> usize {
        self.tracked.len()
    }

    /// Bytes of all tracked entries
    pub fn tracked_bytes(&self) -> u64 {
        self.tracked.values().map(|t| t.size_bytes).sum()
    }

    /// Cost per 1000 tokens for `model`, matching the longest known prefix
    pub fn cost_per_1k(&self, model: &str) -> f64 {
        if let Some(cost) = self.cost_table.get(model) {
            return *cost;
        }
        self.cost_table
            .iter()
            .filter(|(known, _)| model.starts_with(known.as_str()))
            .max_by_key(|(known, _)| known.len())
            .map(|(_, cost)| *cost)
            .unwrap_or(DEFAULT_COST_PER_1K)
    }

    fn estimate_cost(&self, model: &str, tokens: u64) -> f64 {
        tokens as f64 / 1000.0 * self.cost_per_1k(model)
    }

    fn workspace_stats_mut(&mut self, workspace: &str) -> &mut CacheStatistics {
        self.workspace_stats.entry(workspace.to_string()).or_default()
    }

    fn track(&mut self, key: &str, entry: &CacheEntry) {
        if let Some(previous) = self.tracked.insert(key.to_string(), TrackedEntry::from_entry(entry)) {
            self.stats.record_removal(previous.size_bytes);
            self.workspace_stats_mut(&previous.workspace)
                .record_removal(previous.size_bytes);
        }
        self.stats.record_store(entry.size_bytes);
        self.workspace_stats_mut(&entry.workspace)
            .record_store(entry.size_bytes);
    }

    fn untrack(&mut self, key: &str) -> Option<TrackedEntry> {
        let tracked = self.tracked.remove(key)?;
        self.stats.record_removal(tracked.size_bytes);
        self.workspace_stats_mut(&tracked.workspace)
            .record_removal(tracked.size_bytes);
        Some(tracked)
    }

    fn record_miss(&mut self, workspace: Option<&str>) {
        self.stats.record_miss();
        if let Some(workspace) = workspace {
            self.workspace_stats_mut(workspace).record_miss();
        }
    }

    /// Look up a cached response.
    ///
    /// Expired entries are deleted and reported as a miss. A hit refreshes the
    /// entry's access time and count and credits the estimated savings.
    #[instrument(skip(self))]
    pub async fn get_cached_response(
        &mut self,
        key: &str,
        workspace: Option<&str>,
    ) -> Result<Option<CacheEntry>, CacheError> {
        let now = Utc::now();
        let Some(mut entry) = self.store.get(key).await? else {
            self.untrack(key);
            self.record_miss(workspace);
            return Ok(None);
        };

        if entry.is_expired(now) {
            debug!("Cache entry {} expired at {:?}", key, entry.expires_at);
            self.store.delete(key).await?;
            self.untrack(key);
            self.record_miss(workspace.or(Some(entry.workspace.as_str())));
            return Ok(None);
        }

        entry.last_accessed = now;
        entry.access_count += 1;
        self.store.put(&entry).await?;

        if !self.tracked.contains_key(key) {
            self.track(key, &entry);
        }
        if let Some(tracked) = self.tracked.get_mut(key) {
            tracked.last_accessed = now;
            tracked.hits = entry.access_count;
        }

        let cost_saved = if entry.cost > 0.0 {
            entry.cost
        } else {
            self.estimate_cost(&entry.model, entry.usage.total())
        };
        let latency_saved = entry
            .response_time_ms()
            .unwrap_or(DEFAULT_RESPONSE_LATENCY_MS);
        self.stats.record_hit(cost_saved, latency_saved);
        let workspace = workspace.unwrap_or(entry.workspace.as_str()).to_string();
        self.workspace_stats_mut(&workspace)
            .record_hit(cost_saved, latency_saved);

        Ok(Some(entry))
    }

    /// Store a response if the policy allows it.
    ///
    /// Returns `Ok(false)` when the response is below the cost or quality
    /// threshold or too large for the cache. Evicts first when the new entry
    /// would exceed the entry or byte budget.
    #[instrument(skip(self, content, context), fields(workspace = %context.workspace))]
    pub async fn cache_response(
        &mut self,
        key: &str,
        content: &str,
        context: &CacheContext,
        usage: TokenUsage,
        cost: f64,
        quality_score: f64,
    ) -> Result<bool, CacheError> {
        let now = Utc::now();
        let mut metadata = BTreeMap::new();
        if let Some(pipeline) = &context.pipeline_id {
            metadata.insert("pipeline_id".to_string(), serde_json::Value::from(pipeline.as_str()));
        }
        if let Some(step) = &context.step_key {
            metadata.insert("step_key".to_string(), serde_json::Value::from(step.as_str()));
        }

        let mut entry = CacheEntry {
            key: key.to_string(),
            content: content.to_string(),
            workspace: context.workspace.clone(),
            model: context.model.clone(),
            usage,
            cost,
            quality_score,
            created_at: now,
            last_accessed: now,
            access_count: 0,
            expires_at: Some(now + self.policy.ttl()),
            size_bytes: 0,
            metadata,
        };
        entry.size_bytes = serde_json::to_vec(&entry)?.len() as u64;

        if cost < self.policy.cost_threshold
            || quality_score < self.policy.quality_threshold
            || entry.size_bytes > self.policy.max_size_bytes / MAX_ENTRY_FRACTION
        {
            debug!(
                "Not caching {} (cost {}, quality {}, {} bytes)",
                key, cost, quality_score, entry.size_bytes
            );
            return Ok(false);
        }

        self.ensure_capacity(key, entry.size_bytes).await?;
        self.store.put(&entry).await?;
        self.track(key, &entry);
        Ok(true)
    }

    /// Make room for an entry of `incoming_bytes` under `key`
    async fn ensure_capacity(&mut self, key: &str, incoming_bytes: u64) -> Result<(), CacheError> {
        let replaced = self.tracked.get(key).map(|t| t.size_bytes);
        let entries_after = self.tracked.len() + usize::from(replaced.is_none());
        let bytes_after = self.tracked_bytes() - replaced.unwrap_or(0) + incoming_bytes;

        let entries_needed = entries_after.saturating_sub(self.policy.max_entries);
        let bytes_needed = bytes_after.saturating_sub(self.policy.max_size_bytes);
        if entries_needed > 0 || bytes_needed > 0 {
            self.evict_excluding(bytes_needed, entries_needed, Some(key))
                .await?;
        }
        Ok(())
    }

    /// Evict with the active strategy until `bytes_needed` bytes and
    /// `entries_needed` entries are freed.
    pub async fn evict(
        &mut self,
        bytes_needed: u64,
        entries_needed: usize,
    ) -> Result<EvictionSummary, CacheError> {
        self.evict_excluding(bytes_needed, entries_needed, None).await
    }

    async fn evict_excluding(
        &mut self,
        bytes_needed: u64,
        entries_needed: usize,
        protected: Option<&str>,
    ) -> Result<EvictionSummary, CacheError> {
        let now = Utc::now();
        let candidates: Vec<EvictionCandidate> = self
            .tracked
            .iter()
            .filter(|(key, _)| Some(key.as_str()) != protected)
            .map(|(key, tracked)| tracked.candidate(key))
            .collect();
        let victims = select_victims(
            self.policy.strategy,
            candidates,
            bytes_needed,
            entries_needed,
            self.policy.min_hit_count,
            now,
        );
        self.remove_victims(victims.into_iter().map(|v| v.key)).await
    }

    async fn remove_victims(
        &mut self,
        keys: impl IntoIterator<Item = String>,
    ) -> Result<EvictionSummary, CacheError> {
        let mut summary = EvictionSummary::default();
        for key in keys {
            if let Err(e) = self.store.delete(&key).await {
                warn!("Failed to evict cache entry {}: {}", key, e);
                continue;
            }
            if let Some(tracked) = self.untrack(&key) {
                summary.freed_bytes += tracked.size_bytes;
                self.stats.evictions += 1;
                self.workspace_stats_mut(&tracked.workspace).evictions += 1;
            }
            summary.evicted += 1;
            summary.keys.push(key);
        }
        if summary.evicted > 0 {
            info!(
                "Evicted {} cache entries ({} bytes) using {} strategy",
                summary.evicted, summary.freed_bytes, self.policy.strategy
            );
        }
        Ok(summary)
    }

    /// Evict until tracked bytes are at or below `target_bytes`
    #[instrument(skip(self))]
    pub async fn optimize_cache_size(&mut self, target_bytes: u64) -> Result<EvictionSummary, CacheError> {
        let current = self.tracked_bytes();
        if current <= target_bytes {
            return Ok(EvictionSummary::default());
        }
        self.evict(current - target_bytes, 0).await
    }

    /// Delete every expired entry from the store; returns how many were removed.
    #[instrument(skip(self))]
    pub async fn cleanup_expired(&mut self) -> Result<usize, CacheError> {
        let now = Utc::now();
        let mut expired: Vec<String> = self
            .store
            .entries()
            .await?
            .into_iter()
            .filter(|entry| entry.is_expired(now))
            .map(|entry| entry.key)
            .collect();
        expired.extend(
            self.tracked
                .iter()
                .filter(|(_, t)| t.expires_at.is_some_and(|at| now > at))
                .map(|(key, _)| key.clone()),
        );
        expired.sort();
        expired.dedup();

        let mut removed = 0;
        for key in expired {
            match self.store.delete(&key).await {
                Ok(deleted) => {
                    let was_tracked = self.untrack(&key).is_some();
                    if deleted || was_tracked {
                        removed += 1;
                    }
                }
                Err(e) => warn!("Failed to delete expired entry {}: {}", key, e),
            }
        }
        if removed > 0 {
            info!("Removed {} expired cache entries", removed);
        }
        Ok(removed)
    }

    /// Replace the active policy after validating it
    pub fn update_policy(&mut self, policy: CachePolicy) -> Result<(), CacheError> {
        policy.validate()?;
        info!("Cache policy updated (strategy: {})", policy.strategy);
        self.policy = policy;
        Ok(())
    }

    /// Global statistics, or those of one workspace
    pub fn statistics(&self, workspace: Option<&str>) -> StatisticsReport {
        match workspace {
            Some(name) => self
                .workspace_stats
                .get(name)
                .map(StatisticsReport::from)
                .unwrap_or_else(|| StatisticsReport::from(&CacheStatistics::default())),
            None => StatisticsReport::from(&self.stats),
        }
    }

    /// Index every live entry of the store so eviction and analytics see it.
    /// Expired entries found along the way are deleted.
    #[instrument(skip(self))]
    pub async fn warm_cache(&mut self) -> Result<WarmingSummary, CacheError> {
        let mut summary = WarmingSummary::default();
        if !self.policy.enable_warming {
            debug!("Cache warming disabled by policy");
            return Ok(summary);
        }

        let now = Utc::now();
        for entry in self.store.entries().await? {
            if entry.is_expired(now) {
                self.store.delete(&entry.key).await?;
                self.untrack(&entry.key);
                summary.expired_dropped += 1;
                continue;
            }
            summary.total_bytes += entry.size_bytes;
            summary.indexed += 1;
            let key = entry.key.clone();
            self.track(&key, &entry);
        }
        debug!(
            "Warmed cache index with {} entries ({} expired dropped)",
            summary.indexed, summary.expired_dropped
        );
        Ok(summary)
    }

    /// Usage breakdown and recommendations over the tracked entries
    pub fn analytics(&self) -> CacheAnalytics {
        let mut models: BTreeMap<String, ModelUsage> = BTreeMap::new();
        let mut size_distribution: BTreeMap<String, usize> = BTreeMap::new();
        for tracked in self.tracked.values() {
            let usage = models.entry(tracked.model.clone()).or_default();
            usage.entries += 1;
            usage.total_bytes += tracked.size_bytes;
            usage.total_tokens += tracked.tokens;
            usage.hits += tracked.hits;
            usage.average_quality += tracked.quality;
            *size_distribution
                .entry(size_bucket(tracked.size_bytes).to_string())
                .or_insert(0) += 1;
        }
        for usage in models.values_mut() {
            if usage.entries > 0 {
                usage.average_quality /= usage.entries as f64;
            }
        }

        let mut top_entries: Vec<(String, u64)> = self
            .tracked
            .iter()
            .map(|(key, tracked)| (key.clone(), tracked.hits))
            .collect();
        top_entries.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        top_entries.truncate(TOP_ENTRIES);

        let utilization = self.tracked_bytes() as f64 / self.policy.max_size_bytes as f64;
        let recommendations = self.recommendations(utilization);

        CacheAnalytics {
            statistics: StatisticsReport::from(&self.stats),
            strategy: self.policy.strategy,
            models,
            size_distribution,
            top_entries,
            utilization,
            recommendations,
        }
    }

    fn recommendations(&self, utilization: f64) -> Vec<String> {
        let mut out = Vec::new();
        if self.stats.total_requests >= 10 && self.stats.hit_rate() < 0.5 {
            out.push(format!(
                "Hit rate is {:.0}%; consider the LFU strategy or a longer TTL",
                self.stats.hit_rate() * 100.0
            ));
        }
        if utilization > 0.9 {
            out.push("Cache is above 90% of its byte budget; run a size optimization".to_string());
        }
        let low_quality = self
            .tracked
            .values()
            .filter(|t| t.quality < LOW_QUALITY_THRESHOLD)
            .count();
        if low_quality > 0 {
            out.push(format!(
                "{low_quality} entries are below quality {LOW_QUALITY_THRESHOLD}; consider the quality-aware strategy"
            ));
        }
        if self.stats.evictions > self.stats.hits && self.stats.evictions > 0 {
            out.push("More evictions than hits; the cache may be too small".to_string());
        }
        out
    }

    /// Build a plan for `goal` from the current statistics and entries.
    ///
    /// Candidates are entries larger than twice the mean size or below the
    /// low-quality threshold.
    pub fn generate_optimization_plan(&self, goal: OptimizationGoal) -> OptimizationPlan {
        let strategy = goal.recommended_strategy();
        let mean_size = if self.tracked.is_empty() {
            0.0
        } else {
            self.tracked_bytes() as f64 / self.tracked.len() as f64
        };

        let mut candidates: Vec<(&String, &TrackedEntry)> = self
            .tracked
            .iter()
            .filter(|(_, t)| {
                t.size_bytes as f64 > LARGE_ENTRY_FACTOR * mean_size
                    || t.quality < LOW_QUALITY_THRESHOLD
            })
            .collect();
        candidates.sort_by(|a, b| a.0.cmp(b.0));

        let mut recommended_policy = CachePolicy {
            strategy,
            ..self.policy.clone()
        };
        let mut actions = vec![format!("Switch eviction strategy to {strategy}")];
        match goal {
            OptimizationGoal::HitRate => {
                recommended_policy.enable_warming = true;
                actions.push("Enable cache warming".to_string());
            }
            OptimizationGoal::StorageEfficiency => {
                recommended_policy.enable_compression = true;
                actions.push("Enable compression".to_string());
            }
            OptimizationGoal::CostReduction
            | OptimizationGoal::LatencyReduction
            | OptimizationGoal::Balanced => {}
        }
        if !candidates.is_empty() {
            actions.push(format!(
                "Evict {} oversized or low-quality entries",
                candidates.len()
            ));
        }

        OptimizationPlan {
            goal,
            recommended_strategy: strategy,
            recommended_policy,
            current_hit_rate: self.stats.hit_rate(),
            target_hit_rate: TARGET_HIT_RATE,
            estimated_bytes_reclaimed: candidates.iter().map(|(_, t)| t.size_bytes).sum(),
            eviction_candidates: candidates.into_iter().map(|(key, _)| key.clone()).collect(),
            actions,
            generated_at: Utc::now(),
        }
    }

    /// Apply a plan: adopt its policy, then evict its candidates. Candidates
    /// that disappeared since the plan was generated are counted, not errors.
    #[instrument(skip(self, plan), fields(goal = ?plan.goal))]
    pub async fn implement_optimization_plan(
        &mut self,
        plan: &OptimizationPlan,
    ) -> Result<PlanOutcome, CacheError> {
        self.update_policy(plan.recommended_policy.clone())?;

        let (present, missing): (Vec<String>, Vec<String>) = plan
            .eviction_candidates
            .iter()
            .cloned()
            .partition(|key| self.tracked.contains_key(key));
        let summary = self.remove_victims(present).await?;

        Ok(PlanOutcome {
            applied_strategy: self.policy.strategy,
            evicted: summary.evicted,
            freed_bytes: summary.freed_bytes,
            missing_candidates: missing.len(),
        })
    }
}

fn size_bucket(size_bytes: u64) -> &'static str {
    match size_bytes {
        0..=1_023 => "<1KB",
        1_024..=10_239 => "1-10KB",
        10_240..=102_399 => "10-100KB",
        _ => ">100KB",
    }
}

#[cfg(test)]
mod tests {
    use super::store::MemoryCacheStore;
    use super::*;

    fn service(policy: CachePolicy) -> CacheManagementService {
        CacheManagementService::new(Arc::new(MemoryCacheStore::new()), policy).unwrap()
    }

    fn context() -> CacheContext {
        CacheContext {
            workspace: "novel".to_string(),
            model: "gpt-4o".to_string(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_store_and_hit() {
        let mut svc = service(CachePolicy::default());
        let stored = svc
            .cache_response("k1", "hello", &context(), TokenUsage::new(10, 5), 0.01, 0.9)
            .await
            .unwrap();
        assert!(stored);

        let hit = svc.get_cached_response("k1", None).await.unwrap().unwrap();
        assert_eq!(hit.access_count, 1);
        let again = svc.get_cached_response("k1", Some("novel")).await.unwrap().unwrap();
        assert_eq!(again.access_count, 2);

        let stats = svc.statistics(None);
        assert_eq!(stats.counters.hits, 2);
        assert!((stats.counters.cost_saved - 0.02).abs() < 1e-9);
        assert_eq!(stats.counters.latency_saved_ms, 2 * DEFAULT_RESPONSE_LATENCY_MS);
        assert_eq!(svc.statistics(Some("novel")).counters.hits, 2);
    }

    #[tokio::test]
    async fn test_threshold_rejections() {
        let mut svc = service(CachePolicy {
            quality_threshold: 0.5,
            cost_threshold: 0.001,
            max_size_bytes: 10_000,
            ..Default::default()
        });
        let ctx = context();
        assert!(!svc.cache_response("low-q", "x", &ctx, TokenUsage::default(), 0.01, 0.2).await.unwrap());
        assert!(!svc.cache_response("cheap", "x", &ctx, TokenUsage::default(), 0.0, 0.9).await.unwrap());
        let big = "x".repeat(200);
        assert!(!svc.cache_response("big", &big, &ctx, TokenUsage::default(), 0.01, 0.9).await.unwrap());
        assert_eq!(svc.tracked_entries(), 0);
    }

    #[tokio::test]
    async fn test_entry_budget_triggers_eviction() {
        let mut svc = service(CachePolicy {
            max_entries: 2,
            strategy: EvictionStrategy::Lru,
            ..Default::default()
        });
        for key in ["a", "b", "c"] {
            svc.cache_response(key, "body", &context(), TokenUsage::default(), 0.01, 0.9)
                .await
                .unwrap();
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }
        assert_eq!(svc.tracked_entries(), 2);
        assert!(svc.get_cached_response("a", None).await.unwrap().is_none());
        assert_eq!(svc.statistics(None).counters.evictions, 1);
    }

    #[tokio::test]
    async fn test_optimization_plan_candidates() {
        let mut svc = service(CachePolicy::default());
        let ctx = context();
        for key in ["a", "b", "c", "d"] {
            svc.cache_response(key, "small", &ctx, TokenUsage::default(), 0.01, 0.9)
                .await
                .unwrap();
        }
        svc.cache_response("poor", "small", &ctx, TokenUsage::default(), 0.01, 0.1)
            .await
            .unwrap();
        svc.cache_response("huge", &"y".repeat(5_000), &ctx, TokenUsage::default(), 0.01, 0.9)
            .await
            .unwrap();

        let plan = svc.generate_optimization_plan(OptimizationGoal::StorageEfficiency);
        assert_eq!(plan.recommended_strategy, EvictionStrategy::QualityAware);
        assert_eq!(plan.target_hit_rate, TARGET_HIT_RATE);
        assert_eq!(plan.eviction_candidates, vec!["huge".to_string(), "poor".to_string()]);

        let outcome = svc.implement_optimization_plan(&plan).await.unwrap();
        assert_eq!(outcome.evicted, 2);
        assert_eq!(outcome.missing_candidates, 0);
        assert_eq!(svc.policy().strategy, EvictionStrategy::QualityAware);
        assert_eq!(svc.tracked_entries(), 4);
    }

    #[tokio::test]
    async fn test_update_policy_rejects_invalid() {
        let mut svc = service(CachePolicy::default());
        let bad = CachePolicy {
            max_size_bytes: 0,
            ..Default::default()
        };
        assert!(svc.update_policy(bad).is_err());
        assert_eq!(svc.policy(), &CachePolicy::default());
    }

    #[test]
    fn test_cost_table_prefix_lookup() {
        let svc = service(CachePolicy::default());
        assert_eq!(svc.cost_per_1k("gpt-4o"), 0.005);
        assert_eq!(svc.cost_per_1k("gpt-4o-2024-08-06"), 0.005);
        assert_eq!(svc.cost_per_1k("mystery-model"), DEFAULT_COST_PER_1K);
    }

    #[test]
    fn test_size_buckets() {
        assert_eq!(size_bucket(10), "<1KB");
        assert_eq!(size_bucket(4_096), "1-10KB");
        assert_eq!(size_bucket(1_000_000), ">100KB");
    }
}
