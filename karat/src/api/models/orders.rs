//! API request/response models for orders and checkout.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use super::pagination::Pagination;
use crate::db::models::orders::{OrderDBResponse, OrderItemDBResponse, OrderStatus};
use crate::types::{MarketRateId, OrderId, ProductId, UserId};

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CheckoutRequest {
    pub shipping_address: String,
    #[serde(default = "default_payment_method")]
    pub payment_method: String,
}

fn default_payment_method() -> String {
    "cod".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct OrderStatusUpdate {
    pub status: OrderStatus,
}

/// Query parameters for listing orders
#[derive(Debug, Default, Deserialize, IntoParams, ToSchema)]
pub struct ListOrdersQuery {
    #[serde(flatten)]
    #[param(inline)]
    pub pagination: Pagination,

    pub status: Option<OrderStatus>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct OrderItemResponse {
    #[schema(value_type = String, format = "uuid")]
    pub id: Uuid,
    #[schema(value_type = Option<String>, format = "uuid")]
    pub product_id: Option<ProductId>,
    pub product_name: String,
    pub quantity: i32,
    pub unit_price: Decimal,
    pub line_total: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct OrderResponse {
    #[schema(value_type = String, format = "uuid")]
    pub id: OrderId,
    #[schema(value_type = String, format = "uuid")]
    pub user_id: UserId,
    pub status: OrderStatus,
    pub subtotal: Decimal,
    pub gst_amount: Decimal,
    pub total_amount: Decimal,
    pub shipping_address: String,
    pub payment_method: String,
    pub market_rate_id: Option<MarketRateId>,
    pub items: Vec<OrderItemResponse>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<OrderItemDBResponse> for OrderItemResponse {
    fn from(db: OrderItemDBResponse) -> Self {
        Self {
            id: db.id,
            product_id: db.product_id,
            product_name: db.product_name,
            quantity: db.quantity,
            unit_price: db.unit_price,
            line_total: db.line_total,
        }
    }
}

impl OrderResponse {
    pub fn new(order: OrderDBResponse, items: Vec<OrderItemDBResponse>) -> Self {
        Self {
            id: order.id,
            user_id: order.user_id,
            status: order.status,
            subtotal: order.subtotal,
            gst_amount: order.gst_amount,
            total_amount: order.total_amount,
            shipping_address: order.shipping_address,
            payment_method: order.payment_method,
            market_rate_id: order.market_rate_id,
            items: items.into_iter().map(Into::into).collect(),
            created_at: order.created_at,
            updated_at: order.updated_at,
        }
    }
}
