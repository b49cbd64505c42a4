//! Cache management service over file-backed and in-memory stores

mod common;

use chrono::{Duration, Utc};
use common::legacy_workspace;
use quill_migrate::cache_mgmt::store::{CacheStore, FileCacheStore, MemoryCacheStore};
use quill_migrate::cache_mgmt::{
    generate_cache_key, CacheContext, CacheEntry, CacheManagementService, CachePolicy,
    EvictionStrategy, OptimizationGoal, TokenUsage,
};
use quill_migrate::config::SETTINGS_FILE;
use quill_migrate::{MigrationRequest, Settings};
use std::collections::BTreeMap;
use std::sync::Arc;

fn context(workspace: &str) -> CacheContext {
    CacheContext {
        workspace: workspace.to_string(),
        model: "gpt-4o".to_string(),
        pipeline_id: Some("outline".to_string()),
        step_key: Some("step_1".to_string()),
    }
}

fn entry(key: &str, workspace: &str, expires_in: Duration) -> CacheEntry {
    let now = Utc::now();
    CacheEntry {
        key: key.to_string(),
        content: format!("response for {key}"),
        workspace: workspace.to_string(),
        model: "gpt-4o".to_string(),
        usage: TokenUsage::new(40, 60),
        cost: 0.0,
        quality_score: 0.8,
        created_at: now - Duration::hours(1),
        last_accessed: now - Duration::hours(1),
        access_count: 0,
        expires_at: Some(now + expires_in),
        size_bytes: 20,
        metadata: BTreeMap::new(),
    }
}

#[tokio::test]
async fn test_expired_lookup_is_a_miss_and_deletes_the_entry() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(FileCacheStore::new(dir.path().join("cache")));
    store
        .put(&entry("stale", "novel", Duration::hours(-2)))
        .await
        .unwrap();

    let mut svc = CacheManagementService::new(store.clone(), CachePolicy::default()).unwrap();
    assert!(svc.get_cached_response("stale", None).await.unwrap().is_none());
    assert!(store.get("stale").await.unwrap().is_none());

    let stats = svc.statistics(None);
    assert_eq!(stats.counters.misses, 1);
    assert_eq!(stats.counters.hits, 0);
    assert_eq!(svc.statistics(Some("novel")).counters.misses, 1);
}

#[tokio::test]
async fn test_hits_persist_access_metadata() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(FileCacheStore::new(dir.path()));
    let mut svc = CacheManagementService::new(store.clone(), CachePolicy::default()).unwrap();

    let key = generate_cache_key("Outline the heist", "gpt-4o", &BTreeMap::new());
    let stored = svc
        .cache_response(&key, "1. Plan", &context("novel"), TokenUsage::new(12, 30), 0.02, 0.9)
        .await
        .unwrap();
    assert!(stored);

    for expected in 1..=3 {
        let hit = svc.get_cached_response(&key, None).await.unwrap().unwrap();
        assert_eq!(hit.access_count, expected);
    }
    let on_disk = store.get(&key).await.unwrap().unwrap();
    assert_eq!(on_disk.access_count, 3);
    assert_eq!(on_disk.metadata["pipeline_id"], "outline");
    assert!(on_disk.expires_at.is_some());

    let report = svc.statistics(Some("novel"));
    assert_eq!(report.counters.hits, 3);
    assert_eq!(report.counters.entries, 1);
    assert!((report.hit_rate - 1.0).abs() < f64::EPSILON);
    assert_eq!(svc.statistics(Some("poetry")).counters.total_requests, 0);
}

#[tokio::test]
async fn test_threshold_rejection_is_not_an_error() {
    let mut svc = CacheManagementService::new(
        Arc::new(MemoryCacheStore::new()),
        CachePolicy {
            quality_threshold: 0.7,
            cost_threshold: 0.005,
            ..Default::default()
        },
    )
    .unwrap();
    let ctx = context("novel");

    assert!(!svc
        .cache_response("weak", "meh", &ctx, TokenUsage::default(), 0.01, 0.4)
        .await
        .unwrap());
    assert!(!svc
        .cache_response("cheap", "fine", &ctx, TokenUsage::default(), 0.001, 0.9)
        .await
        .unwrap());
    assert!(svc
        .cache_response("keeper", "good", &ctx, TokenUsage::default(), 0.01, 0.9)
        .await
        .unwrap());
    assert_eq!(svc.tracked_entries(), 1);
}

#[tokio::test]
async fn test_entry_limit_holds_for_every_strategy() {
    for strategy in [
        EvictionStrategy::Lru,
        EvictionStrategy::Lfu,
        EvictionStrategy::Ttl,
        EvictionStrategy::CostAware,
        EvictionStrategy::QualityAware,
        EvictionStrategy::Adaptive,
    ] {
        let mut svc = CacheManagementService::new(
            Arc::new(MemoryCacheStore::new()),
            CachePolicy {
                strategy,
                max_entries: 3,
                ..Default::default()
            },
        )
        .unwrap();
        for i in 0..8 {
            let stored = svc
                .cache_response(
                    &format!("key-{i}"),
                    "body",
                    &context("novel"),
                    TokenUsage::new(5, 5),
                    0.01 * (i + 1) as f64,
                    0.5 + 0.05 * i as f64,
                )
                .await
                .unwrap();
            assert!(stored, "{strategy}: key-{i} rejected");
            assert!(svc.tracked_entries() <= 3, "{strategy}: entry bound broken");
        }
        // The entry just written is never its own victim.
        assert!(svc.get_cached_response("key-7", None).await.unwrap().is_some());
        assert_eq!(svc.statistics(None).counters.evictions, 5, "{strategy}");
    }
}

#[tokio::test]
async fn test_optimize_cache_size_reaches_the_target() {
    let dir = tempfile::tempdir().unwrap();
    let mut svc =
        CacheManagementService::new(Arc::new(FileCacheStore::new(dir.path())), CachePolicy::default())
            .unwrap();
    for i in 0..10 {
        svc.cache_response(
            &format!("chunk-{i}"),
            &"z".repeat(200 + i * 50),
            &context("novel"),
            TokenUsage::new(100, 100),
            0.01,
            0.9,
        )
        .await
        .unwrap();
    }
    let before = svc.tracked_bytes();
    let target = before / 2;

    let summary = svc.optimize_cache_size(target).await.unwrap();
    assert!(summary.evicted > 0);
    assert!(svc.tracked_bytes() <= target);
    assert_eq!(before - svc.tracked_bytes(), summary.freed_bytes);
    for key in &summary.keys {
        assert!(!dir.path().join(format!("{key}.json")).exists());
    }

    // Already within budget: nothing to do.
    let noop = svc.optimize_cache_size(before).await.unwrap();
    assert_eq!(noop.evicted, 0);
}

#[tokio::test]
async fn test_cleanup_expired_removes_untracked_files_too() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(FileCacheStore::new(dir.path()));
    store.put(&entry("old-1", "novel", Duration::hours(-1))).await.unwrap();
    store.put(&entry("old-2", "novel", Duration::days(-3))).await.unwrap();
    store.put(&entry("live", "novel", Duration::days(1))).await.unwrap();

    let mut svc = CacheManagementService::new(store.clone(), CachePolicy::default()).unwrap();
    assert_eq!(svc.cleanup_expired().await.unwrap(), 2);
    assert_eq!(store.entries().await.unwrap().len(), 1);
    assert_eq!(svc.cleanup_expired().await.unwrap(), 0);
}

#[tokio::test]
async fn test_warming_indexes_a_migrated_cache() {
    let fixture = legacy_workspace();
    let engine = fixture.engine();
    let result = engine
        .migrate(MigrationRequest::new(&fixture.source).workspace_name("novel"))
        .await
        .unwrap();
    assert!(result.success, "{:?}", result.warnings);

    let store = Arc::new(FileCacheStore::new(fixture.target("novel").join("cache")));
    let mut svc = CacheManagementService::new(store, CachePolicy::default()).unwrap();
    let warmed = svc.warm_cache().await.unwrap();
    assert_eq!(warmed.indexed, 1);
    assert_eq!(warmed.expired_dropped, 0);
    assert_eq!(svc.tracked_entries(), 1);

    let key = generate_cache_key("Start a story", "gpt-4o", &BTreeMap::new());
    let hit = svc.get_cached_response(&key, None).await.unwrap().unwrap();
    assert_eq!(hit.content, "Once upon a time");
    assert_eq!(hit.workspace, "novel");
    assert_eq!(svc.statistics(Some("novel")).counters.hits, 1);
    assert!(svc.statistics(None).counters.cost_saved > 0.0);
}

#[tokio::test]
async fn test_warming_respects_the_policy_switch() {
    let store = Arc::new(MemoryCacheStore::new());
    store.put(&entry("a", "novel", Duration::days(1))).await.unwrap();
    let mut svc = CacheManagementService::new(
        store,
        CachePolicy {
            enable_warming: false,
            ..Default::default()
        },
    )
    .unwrap();

    assert_eq!(svc.warm_cache().await.unwrap().indexed, 0);
    assert_eq!(svc.tracked_entries(), 0);
}

#[tokio::test]
async fn test_optimization_plans_follow_their_goal() {
    let expected = [
        (OptimizationGoal::HitRate, EvictionStrategy::Lfu),
        (OptimizationGoal::CostReduction, EvictionStrategy::CostAware),
        (OptimizationGoal::LatencyReduction, EvictionStrategy::Lru),
        (OptimizationGoal::StorageEfficiency, EvictionStrategy::QualityAware),
        (OptimizationGoal::Balanced, EvictionStrategy::Adaptive),
    ];
    let mut svc =
        CacheManagementService::new(Arc::new(MemoryCacheStore::new()), CachePolicy::default())
            .unwrap();
    for (goal, strategy) in expected {
        let plan = svc.generate_optimization_plan(goal);
        assert_eq!(plan.recommended_strategy, strategy);
        assert_eq!(plan.recommended_policy.strategy, strategy);
        assert!(plan.eviction_candidates.is_empty());
    }

    let plan = svc.generate_optimization_plan("hit-rate".parse().unwrap());
    assert!(plan.recommended_policy.enable_warming);
    let outcome = svc.implement_optimization_plan(&plan).await.unwrap();
    assert_eq!(outcome.applied_strategy, EvictionStrategy::Lfu);
    assert_eq!(outcome.evicted, 0);
    assert_eq!(svc.policy().strategy, EvictionStrategy::Lfu);
}

#[tokio::test]
async fn test_stale_plan_candidates_are_counted_as_missing() {
    let mut svc =
        CacheManagementService::new(Arc::new(MemoryCacheStore::new()), CachePolicy::default())
            .unwrap();
    let ctx = context("novel");
    for key in ["a", "b", "c"] {
        svc.cache_response(key, "ok", &ctx, TokenUsage::default(), 0.01, 0.9)
            .await
            .unwrap();
    }
    svc.cache_response("poor", "ok", &ctx, TokenUsage::default(), 0.01, 0.2)
        .await
        .unwrap();

    let plan = svc.generate_optimization_plan(OptimizationGoal::Balanced);
    assert_eq!(plan.eviction_candidates, vec!["poor".to_string()]);
    svc.evict(0, 4).await.unwrap();

    let outcome = svc.implement_optimization_plan(&plan).await.unwrap();
    assert_eq!(outcome.evicted, 0);
    assert_eq!(outcome.missing_candidates, 1);
}

#[tokio::test]
async fn test_analytics_break_down_usage_by_model() {
    let mut svc =
        CacheManagementService::new(Arc::new(MemoryCacheStore::new()), CachePolicy::default())
            .unwrap();
    let mut ctx = context("novel");
    svc.cache_response("a", "alpha", &ctx, TokenUsage::new(10, 10), 0.01, 0.9)
        .await
        .unwrap();
    ctx.model = "claude-3-haiku".to_string();
    svc.cache_response("b", "beta", &ctx, TokenUsage::new(5, 5), 0.01, 0.3)
        .await
        .unwrap();
    svc.get_cached_response("a", None).await.unwrap();

    let analytics = svc.analytics();
    assert_eq!(analytics.models.len(), 2);
    assert_eq!(analytics.models["gpt-4o"].total_tokens, 20);
    assert_eq!(analytics.models["gpt-4o"].hits, 1);
    assert_eq!(analytics.top_entries[0], ("a".to_string(), 1));
    assert_eq!(analytics.size_distribution["<1KB"], 2);
    assert!(analytics
        .recommendations
        .iter()
        .any(|r| r.contains("quality-aware")));
}

#[tokio::test]
async fn test_settings_file_configures_the_service() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join(SETTINGS_FILE),
        "cache_ttl_hours: 12\nmodel_costs:\n  local-llama: 0.0\n",
    )
    .unwrap();
    let settings = Settings::resolve(Some(dir.path())).unwrap();

    let store = Arc::new(MemoryCacheStore::new());
    let mut svc = CacheManagementService::from_settings(store.clone(), &settings).unwrap();
    assert_eq!(svc.policy().default_ttl_hours, 12);
    assert_eq!(svc.cost_per_1k("local-llama-3-8b"), 0.0);
    assert_eq!(svc.cost_per_1k("gpt-4o-2024-08-06"), 0.005);

    svc.cache_response("story", "ok", &context("novel"), TokenUsage::default(), 0.01, 0.9)
        .await
        .unwrap();
    let stored = store.get("story").await.unwrap().unwrap();
    assert_eq!(stored.expires_at, Some(stored.created_at + Duration::hours(12)));
}

#[tokio::test]
async fn test_frequently_read_entries_outlive_cheaper_ones() {
    let mut svc = CacheManagementService::new(
        Arc::new(MemoryCacheStore::new()),
        CachePolicy {
            strategy: EvictionStrategy::CostAware,
            max_entries: 2,
            min_hit_count: 2,
            ..Default::default()
        },
    )
    .unwrap();
    let ctx = context("novel");
    svc.cache_response("cheap-popular", "ok", &ctx, TokenUsage::default(), 0.01, 0.9)
        .await
        .unwrap();
    svc.cache_response("pricey-unread", "ok", &ctx, TokenUsage::default(), 0.05, 0.9)
        .await
        .unwrap();
    for _ in 0..2 {
        svc.get_cached_response("cheap-popular", None).await.unwrap();
    }

    svc.cache_response("newcomer", "ok", &ctx, TokenUsage::default(), 0.02, 0.9)
        .await
        .unwrap();
    assert!(svc.get_cached_response("cheap-popular", None).await.unwrap().is_some());
    assert!(svc.get_cached_response("pricey-unread", None).await.unwrap().is_none());
}
