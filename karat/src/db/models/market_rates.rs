//! Database models for market rate snapshots.

use crate::rates::MetalRates;
use crate::types::MarketRateId;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

#[derive(Debug, Clone)]
pub struct MarketRateCreateDBRequest {
    pub gold_24k: Decimal,
    pub gold_22k: Decimal,
    pub gold_18k: Decimal,
    pub silver: Decimal,
    pub currency: String,
    /// Provider that produced the quote
    pub source: String,
}

/// One immutable rate snapshot. Per-gram prices in `currency`.
#[derive(Debug, Clone, PartialEq)]
pub struct MarketRateDBResponse {
    pub id: MarketRateId,
    pub gold_24k: Decimal,
    pub gold_22k: Decimal,
    pub gold_18k: Decimal,
    pub silver: Decimal,
    pub currency: String,
    pub source: String,
    pub fetched_at: DateTime<Utc>,
}

impl MarketRateDBResponse {
    pub fn rates(&self) -> MetalRates {
        MetalRates {
            gold_24k: self.gold_24k,
            gold_22k: self.gold_22k,
            gold_18k: self.gold_18k,
            silver: self.silver,
        }
    }
}
