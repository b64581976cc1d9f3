//! Database models for shopping cart lines.

use crate::types::{CartItemId, ProductId, UserId};
use chrono::{DateTime, Utc};

/// Add `quantity` units of a product to a user's cart. Adding a product that is already in the
/// cart increases the existing line.
#[derive(Debug, Clone)]
pub struct CartItemCreateDBRequest {
    pub user_id: UserId,
    pub product_id: ProductId,
    pub quantity: i32,
}

#[derive(Debug, Clone)]
pub struct CartItemUpdateDBRequest {
    pub quantity: i32,
}

#[derive(Debug, Clone)]
pub struct CartItemDBResponse {
    pub id: CartItemId,
    pub user_id: UserId,
    pub product_id: ProductId,
    pub quantity: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
