//! API response models for market rates.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::db::models::market_rates::MarketRateDBResponse;
use crate::types::MarketRateId;

/// A rate snapshot. All prices are per gram in `currency`.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct MarketRateResponse {
    pub id: MarketRateId,
    #[schema(value_type = String, example = "7250.00")]
    pub gold_24k: Decimal,
    #[schema(value_type = String, example = "6650.00")]
    pub gold_22k: Decimal,
    #[schema(value_type = String, example = "5440.00")]
    pub gold_18k: Decimal,
    #[schema(value_type = String, example = "88.00")]
    pub silver: Decimal,
    pub currency: String,
    /// Upstream provider, or "Sample Data (Demo)" when every provider failed
    pub source: String,
    pub fetched_at: DateTime<Utc>,
}

impl From<MarketRateDBResponse> for MarketRateResponse {
    fn from(db: MarketRateDBResponse) -> Self {
        Self {
            id: db.id,
            gold_24k: db.gold_24k,
            gold_22k: db.gold_22k,
            gold_18k: db.gold_18k,
            silver: db.silver,
            currency: db.currency,
            source: db.source,
            fetched_at: db.fetched_at,
        }
    }
}
