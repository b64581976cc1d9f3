//! API models for the price preview endpoint.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::pricing::PricingBreakdown;
use crate::types::MarketRateId;

/// Breakdown for an arbitrary input, and the rate snapshot it was computed against.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PricingPreviewResponse {
    pub breakdown: PricingBreakdown,
    pub market_rate_id: MarketRateId,
    pub currency: String,
}
