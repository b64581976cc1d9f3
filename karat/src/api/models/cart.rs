//! API request/response models for the shopping cart.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::pricing::JewelryType;
use crate::types::{CartItemId, MarketRateId, ProductId};

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CartItemCreate {
    #[schema(value_type = String, format = "uuid")]
    pub product_id: ProductId,
    #[serde(default = "default_quantity")]
    pub quantity: i32,
}

fn default_quantity() -> i32 {
    1
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CartItemUpdate {
    pub quantity: i32,
}

/// A cart line priced at the current rate.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CartItemResponse {
    #[schema(value_type = String, format = "uuid")]
    pub id: CartItemId,
    #[schema(value_type = String, format = "uuid")]
    pub product_id: ProductId,
    pub product_name: String,
    pub material: String,
    pub jewelry_type: JewelryType,
    pub image_url: Option<String>,
    pub quantity: i32,
    /// Units currently in stock
    pub stock: i32,
    pub unit_price: Decimal,
    pub subtotal: Decimal,
    pub gst_amount: Decimal,
    pub line_total: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CartResponse {
    pub items: Vec<CartItemResponse>,
    pub subtotal: Decimal,
    pub gst_amount: Decimal,
    pub total: Decimal,
    /// Rate snapshot the lines were priced against; absent when the cart is empty
    pub market_rate_id: Option<MarketRateId>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CartClearResponse {
    pub removed: u64,
}
