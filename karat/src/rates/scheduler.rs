//! Background market rate refresh.

use std::sync::Arc;
use std::time::Duration;

use sqlx::PgPool;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use super::RateFetcher;
use crate::cache::AppCache;

/// Refresh market rates immediately and then every `interval` until `shutdown` fires.
///
/// A slow fetch delays the next tick rather than stacking up behind it.
pub async fn run_rate_fetch_loop(
    fetcher: Arc<RateFetcher>,
    pool: PgPool,
    interval: Duration,
    cache: AppCache,
    shutdown: CancellationToken,
) -> anyhow::Result<()> {
    info!(
        "Starting market rate fetcher with {:?} interval, providers: [{}]",
        interval,
        fetcher.provider_names().join(", ")
    );

    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                info!("Market rate fetcher shutting down");
                break;
            }
            _ = ticker.tick() => {
                match fetcher.update_rates(&pool).await {
                    Ok(_) => cache.invalidate_rates().await,
                    Err(e) => error!("Failed to persist market rates: {e:#}"),
                }
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CacheConfig, FallbackRates};
    use crate::rates::{FALLBACK_SOURCE, MetalRates};

    #[sqlx::test]
    #[test_log::test]
    async fn test_loop_fetches_on_start_and_shuts_down(pool: PgPool) {
        let fetcher = Arc::new(RateFetcher::new(vec![], MetalRates::from(&FallbackRates::default()), "INR"));
        let shutdown = CancellationToken::new();

        let handle = tokio::spawn(run_rate_fetch_loop(
            fetcher,
            pool.clone(),
            Duration::from_secs(3600),
            AppCache::new(&CacheConfig::default()),
            shutdown.clone(),
        ));

        // First tick fires immediately
        let mut rows = 0i64;
        for _ in 0..50 {
            rows = sqlx::query_scalar("SELECT COUNT(*) FROM market_rates").fetch_one(&pool).await.unwrap();
            if rows > 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert_eq!(rows, 1);

        shutdown.cancel();
        let result = tokio::time::timeout(Duration::from_secs(5), handle).await;
        assert!(result.is_ok(), "fetcher did not stop after cancellation");

        let source: String = sqlx::query_scalar("SELECT source FROM market_rates").fetch_one(&pool).await.unwrap();
        assert_eq!(source, FALLBACK_SOURCE);
    }
}
