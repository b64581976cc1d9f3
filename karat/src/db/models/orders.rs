//! Database models for orders and their line items.

use crate::types::{MarketRateId, OrderId, ProductId, UserId};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    #[default]
    Pending,
    Confirmed,
    Shipped,
    Delivered,
    Cancelled,
}

impl OrderStatus {
    /// Orders move forward through fulfilment, and can only be cancelled before they ship.
    pub fn can_transition_to(self, next: OrderStatus) -> bool {
        use OrderStatus::*;
        matches!(
            (self, next),
            (Pending, Confirmed) | (Pending, Cancelled) | (Confirmed, Shipped) | (Confirmed, Cancelled) | (Shipped, Delivered)
        )
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Confirmed => "confirmed",
            OrderStatus::Shipped => "shipped",
            OrderStatus::Delivered => "delivered",
            OrderStatus::Cancelled => "cancelled",
        };
        write!(f, "{s}")
    }
}

/// A priced order line, snapshotted at checkout.
#[derive(Debug, Clone)]
pub struct OrderItemCreateDBRequest {
    pub product_id: ProductId,
    pub product_name: String,
    pub quantity: i32,
    pub unit_price: Decimal,
    pub line_total: Decimal,
}

#[derive(Debug, Clone)]
pub struct OrderCreateDBRequest {
    pub user_id: UserId,
    pub subtotal: Decimal,
    pub gst_amount: Decimal,
    pub total_amount: Decimal,
    pub shipping_address: String,
    pub payment_method: String,
    pub market_rate_id: Option<MarketRateId>,
    pub items: Vec<OrderItemCreateDBRequest>,
}

#[derive(Debug, Clone)]
pub struct OrderUpdateDBRequest {
    pub status: OrderStatus,
}

#[derive(Debug, Clone)]
pub struct OrderDBResponse {
    pub id: OrderId,
    pub user_id: UserId,
    pub status: OrderStatus,
    pub subtotal: Decimal,
    pub gst_amount: Decimal,
    pub total_amount: Decimal,
    pub shipping_address: String,
    pub payment_method: String,
    pub market_rate_id: Option<MarketRateId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct OrderItemDBResponse {
    pub id: Uuid,
    pub order_id: OrderId,
    /// Unset once the product has been deleted from the catalog
    pub product_id: Option<ProductId>,
    pub product_name: String,
    pub quantity: i32,
    pub unit_price: Decimal,
    pub line_total: Decimal,
}

/// Aggregate order figures for the admin dashboard.
#[derive(Debug, Clone, Default)]
pub struct OrderStats {
    pub total_orders: i64,
    pub pending_orders: i64,
    /// Sum of totals over orders that were not cancelled
    pub total_revenue: Decimal,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_transitions() {
        use OrderStatus::*;

        assert!(Pending.can_transition_to(Confirmed));
        assert!(Pending.can_transition_to(Cancelled));
        assert!(Confirmed.can_transition_to(Shipped));
        assert!(Confirmed.can_transition_to(Cancelled));
        assert!(Shipped.can_transition_to(Delivered));

        assert!(!Pending.can_transition_to(Shipped));
        assert!(!Pending.can_transition_to(Pending));
        assert!(!Shipped.can_transition_to(Cancelled));
        assert!(!Delivered.can_transition_to(Cancelled));
        assert!(!Cancelled.can_transition_to(Pending));
        assert!(!Cancelled.can_transition_to(Confirmed));
    }
}
