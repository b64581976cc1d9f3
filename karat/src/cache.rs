//! Short-lived response cache for the hot read paths.
//!
//! Holds the current market rate and product listing pages. Entries expire after the configured
//! TTL and are dropped eagerly whenever the underlying data is written.
//!
//! Every invalidation bumps a generation counter. Loaders snapshot it with
//! [`AppCache::generation`] before reading the database and hand it back on insert, so a value
//! read before a concurrent write never outlives that write.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use moka::future::Cache;
use tracing::debug;

use crate::api::models::pagination::PaginatedResponse;
use crate::api::models::products::ProductResponse;
use crate::config::CacheConfig;
use crate::db::models::market_rates::MarketRateDBResponse;

pub type ProductPage = Arc<PaginatedResponse<ProductResponse>>;

#[derive(Clone)]
pub struct AppCache {
    current_rate: Cache<(), MarketRateDBResponse>,
    product_listings: Cache<String, ProductPage>,
    generation: Arc<AtomicU64>,
}

impl AppCache {
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            current_rate: Cache::builder().max_capacity(1).time_to_live(config.ttl).build(),
            product_listings: Cache::builder()
                .max_capacity(config.max_capacity)
                .time_to_live(config.ttl)
                .build(),
            generation: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    fn is_stale(&self, read_at: u64) -> bool {
        self.generation() != read_at
    }

    pub async fn current_rate(&self) -> Option<MarketRateDBResponse> {
        let hit = self.current_rate.get(&()).await;
        debug!(hit = hit.is_some(), "Current rate cache lookup");
        hit
    }

    /// Cache `rate`, read from the database at generation `read_at`.
    pub async fn set_current_rate(&self, rate: MarketRateDBResponse, read_at: u64) {
        self.current_rate.insert((), rate).await;
        if self.is_stale(read_at) {
            debug!("Discarding current rate loaded before an invalidation");
            self.current_rate.invalidate(&()).await;
        }
    }

    pub async fn product_listing(&self, key: &str) -> Option<ProductPage> {
        let hit = self.product_listings.get(key).await;
        debug!(key, hit = hit.is_some(), "Product listing cache lookup");
        hit
    }

    pub async fn set_product_listing(&self, key: String, page: ProductPage, read_at: u64) {
        self.product_listings.insert(key.clone(), page).await;
        if self.is_stale(read_at) {
            debug!(key, "Discarding product listing loaded before an invalidation");
            self.product_listings.invalidate(&key).await;
        }
    }

    /// Drop the cached rate. Listings embed prices computed from it, so they go too.
    pub async fn invalidate_rates(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.current_rate.invalidate_all();
        self.invalidate_products().await;
    }

    pub async fn invalidate_products(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.product_listings.invalidate_all();
        self.product_listings.run_pending_tasks().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rust_decimal::Decimal;
    use std::time::Duration;

    fn rate(id: i64) -> MarketRateDBResponse {
        MarketRateDBResponse {
            id,
            gold_24k: Decimal::from(7200),
            gold_22k: Decimal::from(6600),
            gold_18k: Decimal::from(5400),
            silver: Decimal::from(90),
            currency: "INR".to_string(),
            source: "test".to_string(),
            fetched_at: Utc::now(),
        }
    }

    fn page() -> ProductPage {
        Arc::new(PaginatedResponse::new(vec![], 0, 0, 10))
    }

    #[tokio::test]
    async fn test_rate_roundtrip_and_invalidation() {
        let cache = AppCache::new(&CacheConfig::default());
        assert!(cache.current_rate().await.is_none());

        cache.set_current_rate(rate(7), cache.generation()).await;
        assert_eq!(cache.current_rate().await.map(|r| r.id), Some(7));

        cache.set_product_listing("skip=0&limit=10".to_string(), page(), cache.generation()).await;
        cache.invalidate_rates().await;
        assert!(cache.current_rate().await.is_none());
        assert!(cache.product_listing("skip=0&limit=10").await.is_none());
    }

    #[tokio::test]
    async fn test_loads_that_race_an_invalidation_are_dropped() {
        let cache = AppCache::new(&CacheConfig::default());

        let read_at = cache.generation();
        // A rate refresh lands between the database read and the insert
        cache.invalidate_rates().await;
        cache.set_current_rate(rate(1), read_at).await;
        cache.set_product_listing("a".to_string(), page(), read_at).await;
        assert!(cache.current_rate().await.is_none());
        assert!(cache.product_listing("a").await.is_none());

        cache.set_current_rate(rate(2), cache.generation()).await;
        assert_eq!(cache.current_rate().await.map(|r| r.id), Some(2));

        let read_at = cache.generation();
        cache.invalidate_products().await;
        cache.set_product_listing("b".to_string(), page(), read_at).await;
        assert!(cache.product_listing("b").await.is_none());
    }

    #[tokio::test]
    async fn test_entries_expire() {
        let cache = AppCache::new(&CacheConfig {
            ttl: Duration::from_millis(50),
            max_capacity: 10,
        });

        cache.set_product_listing("a".to_string(), page(), cache.generation()).await;
        assert!(cache.product_listing("a").await.is_some());

        tokio::time::sleep(Duration::from_millis(120)).await;
        assert!(cache.product_listing("a").await.is_none());
    }
}
