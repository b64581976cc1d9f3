//! Database models for catalog products.

use crate::pricing::{BillingMode, JewelryType, PricingInput};
use crate::types::{CategoryId, ProductId};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

#[derive(Debug, Clone)]
pub struct ProductCreateDBRequest {
    pub category_id: Option<CategoryId>,
    pub name: String,
    pub description: Option<String>,
    pub material: String,
    pub jewelry_type: JewelryType,
    pub weight: Decimal,
    pub making_charges: Decimal,
    pub gemstones_cost: Decimal,
    pub diamonds_cost: Decimal,
    pub billing_mode: BillingMode,
    pub fixed_rate_per_gram: Option<Decimal>,
    pub flat_price: Option<Decimal>,
    pub stock: i32,
    pub image_url: Option<String>,
    pub is_featured: bool,
    pub is_active: bool,
}

/// `None` leaves a field unchanged.
#[derive(Debug, Clone, Default)]
pub struct ProductUpdateDBRequest {
    pub category_id: Option<CategoryId>,
    pub name: Option<String>,
    pub description: Option<String>,
    pub material: Option<String>,
    pub jewelry_type: Option<JewelryType>,
    pub weight: Option<Decimal>,
    pub making_charges: Option<Decimal>,
    pub gemstones_cost: Option<Decimal>,
    pub diamonds_cost: Option<Decimal>,
    pub billing_mode: Option<BillingMode>,
    pub fixed_rate_per_gram: Option<Decimal>,
    pub flat_price: Option<Decimal>,
    pub stock: Option<i32>,
    pub image_url: Option<String>,
    pub is_featured: Option<bool>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Clone)]
pub struct ProductDBResponse {
    pub id: ProductId,
    pub category_id: Option<CategoryId>,
    pub name: String,
    pub description: Option<String>,
    pub material: String,
    pub jewelry_type: JewelryType,
    pub weight: Decimal,
    pub making_charges: Decimal,
    pub gemstones_cost: Decimal,
    pub diamonds_cost: Decimal,
    pub billing_mode: BillingMode,
    pub fixed_rate_per_gram: Option<Decimal>,
    pub flat_price: Option<Decimal>,
    pub stock: i32,
    pub image_url: Option<String>,
    pub is_featured: bool,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ProductDBResponse {
    pub fn pricing_input(&self) -> PricingInput {
        PricingInput {
            weight: self.weight,
            material: self.material.clone(),
            jewelry_type: self.jewelry_type,
            billing_mode: self.billing_mode,
            fixed_rate_per_gram: self.fixed_rate_per_gram,
            making_charges: self.making_charges,
            gemstones_cost: self.gemstones_cost,
            diamonds_cost: self.diamonds_cost,
        }
    }
}
