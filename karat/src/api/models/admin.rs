//! API response models for the admin dashboard.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::market_rates::MarketRateResponse;
use crate::db::models::gullak::GullakStats;
use crate::db::models::orders::OrderStats;

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct OrderSummary {
    pub total: i64,
    pub pending: i64,
    /// Sum of totals over orders that were not cancelled
    pub revenue: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct GullakSummary {
    pub active_accounts: i64,
    pub completed_accounts: i64,
    pub total_balance: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct DashboardStats {
    pub total_users: i64,
    pub total_products: i64,
    pub total_categories: i64,
    pub orders: OrderSummary,
    pub gullak: GullakSummary,
    pub current_rate: Option<MarketRateResponse>,
}

impl From<OrderStats> for OrderSummary {
    fn from(stats: OrderStats) -> Self {
        Self {
            total: stats.total_orders,
            pending: stats.pending_orders,
            revenue: stats.total_revenue,
        }
    }
}

impl From<GullakStats> for GullakSummary {
    fn from(stats: GullakStats) -> Self {
        Self {
            active_accounts: stats.active_accounts,
            completed_accounts: stats.completed_accounts,
            total_balance: stats.total_balance,
        }
    }
}
