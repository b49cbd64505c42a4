//! Eviction strategies
//!
//! Every strategy reduces to an ordering of candidates; victims are taken from
//! the front of that ordering until both the byte and the entry requirement
//! are met. Entries with at least `min_hit_count` hits are retained: they are
//! only taken once every other candidate is gone.

use chrono::{DateTime, Utc};
use std::cmp::Ordering;

use super::types::EvictionStrategy;

/// Weight of seconds since last access in the adaptive score
pub const RECENCY_WEIGHT: f64 = 0.3;
/// Weight of inverse hit count
pub const FREQUENCY_WEIGHT: f64 = 0.3;
/// Weight of inverse cost
pub const COST_WEIGHT: f64 = 0.2;
/// Weight of inverse quality
pub const QUALITY_WEIGHT: f64 = 0.2;

/// Floor for cost and quality so free or zero-quality entries stay finite
const MIN_DIVISOR: f64 = 1e-3;

/// What the eviction algorithms need to know about an entry
#[derive(Debug, Clone, PartialEq)]
pub struct EvictionCandidate {
    pub key: String,
    pub last_accessed: DateTime<Utc>,
    pub hits: u64,
    pub cost: f64,
    pub quality: f64,
    pub size_bytes: u64,
}

/// Composite "evictability": grows with staleness and shrinks with hits,
/// cost and quality. The highest score goes first.
pub fn adaptive_score(candidate: &EvictionCandidate, now: DateTime<Utc>) -> f64 {
    let recency_secs = (now - candidate.last_accessed).num_milliseconds().max(0) as f64 / 1000.0;
    RECENCY_WEIGHT * recency_secs
        + FREQUENCY_WEIGHT / candidate.hits.max(1) as f64
        + COST_WEIGHT / candidate.cost.max(MIN_DIVISOR)
        + QUALITY_WEIGHT / candidate.quality.max(MIN_DIVISOR)
}

fn by_f64(a: f64, b: f64) -> Ordering {
    a.partial_cmp(&b).unwrap_or(Ordering::Equal)
}

/// Sort candidates so the first one is the first to evict
pub fn order_for_eviction(
    strategy: EvictionStrategy,
    candidates: &mut [EvictionCandidate],
    now: DateTime<Utc>,
) {
    match strategy {
        EvictionStrategy::Lru => candidates.sort_by(|a, b| {
            a.last_accessed
                .cmp(&b.last_accessed)
                .then_with(|| a.key.cmp(&b.key))
        }),
        EvictionStrategy::Lfu => candidates.sort_by(|a, b| {
            a.hits
                .cmp(&b.hits)
                .then_with(|| a.last_accessed.cmp(&b.last_accessed))
                .then_with(|| a.key.cmp(&b.key))
        }),
        EvictionStrategy::CostAware => candidates.sort_by(|a, b| {
            by_f64(a.cost, b.cost).then_with(|| a.key.cmp(&b.key))
        }),
        EvictionStrategy::QualityAware => candidates.sort_by(|a, b| {
            by_f64(a.quality, b.quality).then_with(|| a.key.cmp(&b.key))
        }),
        EvictionStrategy::Adaptive | EvictionStrategy::Ttl => {
            candidates.sort_by(|a, b| {
                by_f64(adaptive_score(b, now), adaptive_score(a, now)).then_with(|| a.key.cmp(&b.key))
            })
        }
    }
}

/// Choose victims until at least `bytes_needed` bytes and `entries_needed`
/// entries are covered, or the candidates run out.
///
/// Candidates below `min_hit_count` hits go first, in strategy order; the
/// retained ones follow in the same order. A `min_hit_count` of zero retains
/// nothing.
pub fn select_victims(
    strategy: EvictionStrategy,
    mut candidates: Vec<EvictionCandidate>,
    bytes_needed: u64,
    entries_needed: usize,
    min_hit_count: u64,
    now: DateTime<Utc>,
) -> Vec<EvictionCandidate> {
    if bytes_needed == 0 && entries_needed == 0 {
        return Vec::new();
    }
    order_for_eviction(strategy, &mut candidates, now);
    if min_hit_count > 0 {
        // Stable: each tier keeps the strategy order.
        candidates.sort_by_key(|c| c.hits >= min_hit_count);
    }

    let mut freed = 0u64;
    let mut victims = Vec::new();
    for candidate in candidates {
        if freed >= bytes_needed && victims.len() >= entries_needed {
            break;
        }
        freed += candidate.size_bytes;
        victims.push(candidate);
    }
    victims
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn candidate(key: &str, age_secs: i64, hits: u64, cost: f64, quality: f64, size: u64) -> EvictionCandidate {
        EvictionCandidate {
            key: key.to_string(),
            last_accessed: Utc::now() - Duration::seconds(age_secs),
            hits,
            cost,
            quality,
            size_bytes: size,
        }
    }

    fn keys(victims: &[EvictionCandidate]) -> Vec<&str> {
        victims.iter().map(|v| v.key.as_str()).collect()
    }

    fn sample() -> Vec<EvictionCandidate> {
        vec![
            candidate("recent-popular", 10, 50, 0.05, 0.9, 100),
            candidate("stale-cheap", 7200, 1, 0.001, 0.4, 100),
            candidate("mid", 600, 5, 0.02, 0.7, 100),
        ]
    }

    #[test]
    fn test_lru_and_lfu_order() {
        let now = Utc::now();
        let lru = select_victims(EvictionStrategy::Lru, sample(), 100, 0, 0, now);
        assert_eq!(keys(&lru), vec!["stale-cheap"]);
        let lfu = select_victims(EvictionStrategy::Lfu, sample(), 200, 0, 0, now);
        assert_eq!(keys(&lfu), vec!["stale-cheap", "mid"]);
    }

    #[test]
    fn test_cost_and_quality_order() {
        let now = Utc::now();
        let cost = select_victims(EvictionStrategy::CostAware, sample(), 0, 1, 0, now);
        assert_eq!(keys(&cost), vec!["stale-cheap"]);
        let quality = select_victims(EvictionStrategy::QualityAware, sample(), 0, 3, 0, now);
        assert_eq!(keys(&quality), vec!["stale-cheap", "mid", "recent-popular"]);
    }

    #[test]
    fn test_adaptive_prefers_stale_rare_cheap_low_quality() {
        let now = Utc::now();
        let samples = sample();
        let stale = adaptive_score(&samples[1], now);
        let popular = adaptive_score(&samples[0], now);
        assert!(stale > popular);
        let victims = select_victims(EvictionStrategy::Adaptive, samples, 1, 0, 0, now);
        assert_eq!(keys(&victims), vec!["stale-cheap"]);
    }

    #[test]
    fn test_zero_cost_and_hits_stay_finite() {
        let score = adaptive_score(&candidate("free", 0, 0, 0.0, 0.0, 1), Utc::now());
        assert!(score.is_finite());
    }

    #[test]
    fn test_selection_stops_once_enough_is_freed() {
        let victims = select_victims(EvictionStrategy::Lru, sample(), 150, 0, 0, Utc::now());
        assert_eq!(victims.len(), 2);
        assert!(select_victims(EvictionStrategy::Lru, sample(), 0, 0, 0, Utc::now()).is_empty());
        let all = select_victims(EvictionStrategy::Lru, sample(), 10_000, 0, 0, Utc::now());
        assert_eq!(all.len(), 3);
    }

    #[test]
    fn test_min_hit_count_retains_popular_entries() {
        let now = Utc::now();
        // Under LRU alone the popular entry is the older one and would go first.
        let candidates = vec![
            candidate("old-popular", 7200, 9, 0.01, 0.8, 100),
            candidate("new-unread", 10, 0, 0.01, 0.8, 100),
        ];
        let plain = select_victims(EvictionStrategy::Lru, candidates.clone(), 0, 1, 0, now);
        assert_eq!(keys(&plain), vec!["old-popular"]);

        let retained = select_victims(EvictionStrategy::Lru, candidates.clone(), 0, 1, 3, now);
        assert_eq!(keys(&retained), vec!["new-unread"]);

        // Retained entries are still taken when nothing else can satisfy the bound.
        let both = select_victims(EvictionStrategy::Lru, candidates, 0, 2, 3, now);
        assert_eq!(keys(&both), vec!["new-unread", "old-popular"]);
    }
}
