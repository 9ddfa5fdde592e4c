use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use moka::future::Cache;
use sea_orm::DatabaseConnection;

use crate::config::CacheConfig;
use crate::models::poll::PollResults;
use crate::polls::PollService;

#[derive(Clone)]
pub struct AppState {
    pub database: DatabaseConnection,
    pub polls: PollService,
    pub cache: Arc<ApiCache>,
    pub start_time: Instant,
}

impl AppState {
    pub fn new(database: DatabaseConnection, polls: PollService, cache: Arc<ApiCache>) -> Self {
        assert!(
            cache.results_capacity >= 16,
            "Results cache capacity must be configured"
        );
        Self {
            database,
            polls,
            cache,
            start_time: Instant::now(),
        }
    }
}

pub struct ApiCache {
    /// Tallies keyed by poll id. Dropped whenever the poll's votes or options change.
    pub results: Cache<i32, Arc<PollResults>>,
    pub results_capacity: u64,
    /// Bumped on every invalidation. A tally computed under an older
    /// generation must not stay cached.
    results_generation: AtomicU64,
}

impl ApiCache {
    pub fn new(config: &CacheConfig) -> Self {
        assert!(
            config.results_max_capacity >= 16,
            "Results cache capacity threshold"
        );

        let results = Cache::builder()
            .max_capacity(config.results_max_capacity)
            .time_to_live(config.results_ttl())
            .time_to_idle(Duration::from_secs(config.results_ttl_seconds / 2 + 1))
            .build();

        Self {
            results,
            results_capacity: config.results_max_capacity,
            results_generation: AtomicU64::new(0),
        }
    }

    /// Read before computing a tally that will be passed to `store_results`.
    pub fn results_generation(&self) -> u64 {
        self.results_generation.load(Ordering::SeqCst)
    }

    /// Caches `results` computed under `generation`.
    ///
    /// The entry is dropped again when an invalidation raced with the
    /// computation; the next read then goes to the database.
    pub async fn store_results(&self, poll_id: i32, generation: u64, results: Arc<PollResults>) {
        if self.results_generation() != generation {
            return;
        }
        self.results.insert(poll_id, results).await;
        if self.results_generation() != generation {
            self.results.invalidate(&poll_id).await;
        }
    }

    pub async fn invalidate_results(&self, poll_id: i32) {
        self.results_generation.fetch_add(1, Ordering::SeqCst);
        self.results.invalidate(&poll_id).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cache() -> ApiCache {
        ApiCache::new(&CacheConfig {
            results_max_capacity: 64,
            results_ttl_seconds: 60,
        })
    }

    fn results(poll_id: i32, total_votes: i64) -> Arc<PollResults> {
        Arc::new(PollResults {
            poll_id,
            options: Vec::new(),
            total_votes,
        })
    }

    #[tokio::test]
    async fn results_from_current_generation_are_cached() {
        let cache = cache();
        let generation = cache.results_generation();
        cache.store_results(3, generation, results(3, 2)).await;

        let cached = cache.results.get(&3).await.expect("entry cached");
        assert_eq!(cached.total_votes, 2);
    }

    #[tokio::test]
    async fn invalidation_rejects_tallies_computed_earlier() {
        let cache = cache();
        let stale = cache.results_generation();

        cache.invalidate_results(3).await;
        let fresh = cache.results_generation();
        assert_ne!(stale, fresh);
        cache.store_results(3, fresh, results(3, 1)).await;
        cache.store_results(3, stale, results(3, 0)).await;

        let cached = cache.results.get(&3).await.expect("fresh entry kept");
        assert_eq!(cached.total_votes, 1);
    }
}
