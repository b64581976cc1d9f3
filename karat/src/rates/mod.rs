//! Market rate fetching.
//!
//! Gold and silver prices come from an ordered chain of [`RateProvider`]s. The chain is walked
//! front to back and the first provider that answers wins; a provider that errors is logged at
//! `warn` and skipped. When every provider fails the configured fallback constants are used, so
//! [`RateFetcher::update_rates`] always persists a row.
//!
//! All rates are per gram in the configured base currency (INR by default). Providers that only
//! publish 24k gold get 22k and 18k derived from fineness.
//!
//! - [`providers`]: the concrete upstream APIs
//! - [`scheduler`]: the background loop that refreshes rates on an interval

pub mod providers;
pub mod scheduler;

use async_trait::async_trait;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use tracing::{info, instrument, warn};
use utoipa::ToSchema;

use crate::config::{FallbackRates, RatesConfig};
use crate::db::errors::DbError;
use crate::db::handlers::MarketRates;
use crate::db::models::market_rates::{MarketRateCreateDBRequest, MarketRateDBResponse};
use crate::pricing::max_amount;

/// Source label persisted when no upstream provider answered.
pub const FALLBACK_SOURCE: &str = "Sample Data (Demo)";

/// Grams in one troy ounce.
pub fn grams_per_troy_ounce() -> Decimal {
    Decimal::new(311034768, 7)
}

/// Precious metal a price or savings plan is denominated in.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum Metal {
    #[default]
    Gold,
    Silver,
}

/// Per-gram prices for every purity the storefront sells.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct MetalRates {
    pub gold_24k: Decimal,
    pub gold_22k: Decimal,
    pub gold_18k: Decimal,
    pub silver: Decimal,
}

impl MetalRates {
    /// Build a full rate set from a pure gold price, deriving 22k and 18k by fineness.
    pub fn from_gold_24k(gold_24k: Decimal, silver: Decimal) -> Self {
        let per_karat = gold_24k / Decimal::from(24);
        Self {
            gold_24k,
            gold_22k: per_karat * Decimal::from(22),
            gold_18k: per_karat * Decimal::from(18),
            silver,
        }
    }

    /// Round every rate to paise for storage.
    pub fn rounded(self) -> Self {
        let round = |d: Decimal| d.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
        Self {
            gold_24k: round(self.gold_24k),
            gold_22k: round(self.gold_22k),
            gold_18k: round(self.gold_18k),
            silver: round(self.silver),
        }
    }

    /// Spot rate for a metal (24k for gold).
    pub fn spot(&self, metal: Metal) -> Decimal {
        match metal {
            Metal::Gold => self.gold_24k,
            Metal::Silver => self.silver,
        }
    }

    /// Every rate is positive and fits a stored money column.
    fn is_storable(&self) -> bool {
        [self.gold_24k, self.gold_22k, self.gold_18k, self.silver]
            .iter()
            .all(|rate| *rate > Decimal::ZERO && *rate <= max_amount())
    }
}

impl From<&FallbackRates> for MetalRates {
    fn from(fallback: &FallbackRates) -> Self {
        Self {
            gold_24k: fallback.gold_24k,
            gold_22k: fallback.gold_22k,
            gold_18k: fallback.gold_18k,
            silver: fallback.silver,
        }
    }
}

/// A successful answer from one provider.
#[derive(Debug, Clone, PartialEq)]
pub struct RateQuote {
    pub rates: MetalRates,
    pub source: String,
}

/// One upstream price API.
#[async_trait]
pub trait RateProvider: Send + Sync {
    /// Label persisted as the rate row's `source`.
    fn name(&self) -> &str;

    async fn fetch(&self) -> anyhow::Result<MetalRates>;
}

/// Walks the provider chain and persists the result.
pub struct RateFetcher {
    providers: Vec<Box<dyn RateProvider>>,
    fallback: MetalRates,
    currency: String,
}

impl RateFetcher {
    pub fn new(providers: Vec<Box<dyn RateProvider>>, fallback: MetalRates, currency: impl Into<String>) -> Self {
        Self {
            providers,
            fallback,
            currency: currency.into(),
        }
    }

    /// Build the chain described by configuration. Keyed providers are only included when their
    /// key is set.
    pub fn from_config(config: &RatesConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder().timeout(config.request_timeout).build()?;
        let providers = providers::build_chain(client, config);
        info!(
            "Market rate providers: [{}]",
            providers.iter().map(|p| p.name().to_string()).collect::<Vec<_>>().join(", ")
        );
        Ok(Self::new(providers, MetalRates::from(&config.fallback), config.base_currency.clone()))
    }

    pub fn provider_names(&self) -> Vec<&str> {
        self.providers.iter().map(|p| p.name()).collect()
    }

    /// First successful provider quote, or the fallback constants. Never fails.
    #[instrument(skip(self))]
    pub async fn fetch(&self) -> RateQuote {
        for provider in &self.providers {
            match provider.fetch().await {
                Ok(rates) if rates.is_storable() => {
                    info!(provider = provider.name(), gold_24k = %rates.gold_24k, silver = %rates.silver, "Fetched market rates");
                    return RateQuote {
                        rates: rates.rounded(),
                        source: provider.name().to_string(),
                    };
                }
                Ok(rates) => {
                    warn!(provider = provider.name(), ?rates, "Provider returned out-of-range rates, trying next");
                }
                Err(e) => {
                    warn!(provider = provider.name(), "Rate provider failed, trying next: {e:#}");
                }
            }
        }

        warn!("All market rate providers failed, using sample rates");
        RateQuote {
            rates: self.fallback.rounded(),
            source: FALLBACK_SOURCE.to_string(),
        }
    }

    /// Fetch a quote and persist it as the new current rate.
    #[instrument(skip(self, pool), err)]
    pub async fn update_rates(&self, pool: &PgPool) -> Result<MarketRateDBResponse, DbError> {
        let quote = self.fetch().await;

        let mut conn = pool.acquire().await?;
        let mut repo = MarketRates::new(&mut conn);
        let row = repo
            .create(&MarketRateCreateDBRequest {
                gold_24k: quote.rates.gold_24k,
                gold_22k: quote.rates.gold_22k,
                gold_18k: quote.rates.gold_18k,
                silver: quote.rates.silver,
                currency: self.currency.clone(),
                source: quote.source,
            })
            .await?;

        info!(rate_id = row.id, source = %row.source, "Persisted market rate snapshot");
        Ok(row)
    }
}
