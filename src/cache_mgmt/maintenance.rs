//! Background cache maintenance
//!
//! Three cooperative tasks share one service: expired-entry cleanup, index
//! warming and size optimization. They sleep between runs and exit when the
//! shutdown signal fires.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::CacheManagementService;

/// Size optimization keeps the cache at this share of its byte budget
const OPTIMIZATION_TARGET_RATIO: f64 = 0.8;

/// How often each maintenance task runs
#[derive(Debug, Clone, Copy)]
pub struct MaintenanceIntervals {
    pub cleanup: Duration,
    pub warming: Duration,
    pub optimization: Duration,
}

impl Default for MaintenanceIntervals {
    fn default() -> Self {
        Self {
            cleanup: Duration::from_secs(60 * 60),
            warming: Duration::from_secs(2 * 60 * 60),
            optimization: Duration::from_secs(24 * 60 * 60),
        }
    }
}

/// Handle to the running maintenance tasks
#[derive(Debug)]
pub struct CacheMaintenance {
    shutdown: watch::Sender<bool>,
    handles: Vec<JoinHandle<()>>,
}

impl CacheMaintenance {
    /// Spawn the maintenance tasks onto the current runtime
    pub fn spawn(service: Arc<Mutex<CacheManagementService>>, intervals: MaintenanceIntervals) -> Self {
        let (shutdown, rx) = watch::channel(false);

        let cleanup = spawn_loop("cleanup", intervals.cleanup, rx.clone(), {
            let service = Arc::clone(&service);
            move || {
                let service = Arc::clone(&service);
                async move {
                    match service.lock().await.cleanup_expired().await {
                        Ok(removed) => debug!("Maintenance cleanup removed {} entries", removed),
                        Err(e) => warn!("Maintenance cleanup failed: {}", e),
                    }
                }
            }
        });

        let warming = spawn_loop("warming", intervals.warming, rx.clone(), {
            let service = Arc::clone(&service);
            move || {
                let service = Arc::clone(&service);
                async move {
                    if let Err(e) = service.lock().await.warm_cache().await {
                        warn!("Maintenance warming failed: {}", e);
                    }
                }
            }
        });

        let optimization = spawn_loop("optimization", intervals.optimization, rx, {
            let service = Arc::clone(&service);
            move || {
                let service = Arc::clone(&service);
                async move {
                    let mut guard = service.lock().await;
                    let target =
                        (guard.policy().max_size_bytes as f64 * OPTIMIZATION_TARGET_RATIO) as u64;
                    if let Err(e) = guard.optimize_cache_size(target).await {
                        warn!("Maintenance optimization failed: {}", e);
                    }
                }
            }
        });

        info!(
            "Cache maintenance started (cleanup every {:?}, warming every {:?}, optimization every {:?})",
            intervals.cleanup, intervals.warming, intervals.optimization
        );
        Self {
            shutdown,
            handles: vec![cleanup, warming, optimization],
        }
    }

    /// Signal every task and wait for them to finish
    pub async fn shutdown(self) {
        // Fails only when every task has already exited.
        let _ = self.shutdown.send(true);
        for handle in self.handles {
            if let Err(e) = handle.await {
                warn!("Maintenance task ended abnormally: {}", e);
            }
        }
        info!("Cache maintenance stopped");
    }
}

fn spawn_loop<F, Fut>(
    name: &'static str,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
    mut job: F,
) -> JoinHandle<()>
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = tokio::time::sleep(interval) => job().await,
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        debug!("Maintenance task '{}' stopping", name);
                        break;
                    }
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache_mgmt::store::{CacheStore, MemoryCacheStore};
    use crate::cache_mgmt::types::{CacheEntry, CachePolicy, TokenUsage};
    use chrono::Utc;
    use std::collections::BTreeMap;

    #[tokio::test]
    async fn test_cleanup_runs_and_shutdown_is_prompt() {
        let store = Arc::new(MemoryCacheStore::new());
        let now = Utc::now();
        store
            .put(&CacheEntry {
                key: "old".to_string(),
                content: "stale".to_string(),
                workspace: "ws".to_string(),
                model: "m".to_string(),
                usage: TokenUsage::default(),
                cost: 0.0,
                quality_score: 0.8,
                created_at: now,
                last_accessed: now,
                access_count: 0,
                expires_at: Some(now - chrono::Duration::hours(1)),
                size_bytes: 5,
                metadata: BTreeMap::new(),
            })
            .await
            .unwrap();

        let service = CacheManagementService::new(store.clone(), CachePolicy::default()).unwrap();
        let shared = Arc::new(Mutex::new(service));
        let maintenance = CacheMaintenance::spawn(
            Arc::clone(&shared),
            MaintenanceIntervals {
                cleanup: Duration::from_millis(10),
                warming: Duration::from_secs(3600),
                optimization: Duration::from_secs(3600),
            },
        );

        tokio::time::sleep(Duration::from_millis(100)).await;
        tokio::time::timeout(Duration::from_secs(5), maintenance.shutdown())
            .await
            .expect("maintenance did not stop");
        assert!(store.entries().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_shutdown_after_every_task_exited() {
        let service =
            CacheManagementService::new(Arc::new(MemoryCacheStore::new()), CachePolicy::default()).unwrap();
        let maintenance =
            CacheMaintenance::spawn(Arc::new(Mutex::new(service)), MaintenanceIntervals::default());
        for handle in &maintenance.handles {
            handle.abort();
        }
        while !maintenance.handles.iter().all(JoinHandle::is_finished) {
            tokio::task::yield_now().await;
        }
        assert!(maintenance.shutdown.send(true).is_err());

        tokio::time::timeout(Duration::from_secs(5), maintenance.shutdown())
            .await
            .expect("shutdown hung without receivers");
    }
}
