//! API request/response models for catalog products.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_with::{DisplayFromStr, serde_as};
use utoipa::{IntoParams, ToSchema};

use super::pagination::Pagination;
use crate::db::models::products::{ProductCreateDBRequest, ProductDBResponse, ProductUpdateDBRequest};
use crate::pricing::{BillingMode, JewelryType, PriceCalculator, PricingBreakdown};
use crate::rates::MetalRates;
use crate::types::{CategoryId, ProductId, abbrev_uuid};

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ProductCreate {
    #[schema(value_type = Option<String>, format = "uuid")]
    pub category_id: Option<CategoryId>,
    pub name: String,
    pub description: Option<String>,
    /// Free text, e.g. "22K Gold" or "Sterling Silver"
    pub material: String,
    #[serde(default)]
    pub jewelry_type: JewelryType,
    /// Grams
    pub weight: Decimal,
    #[serde(default)]
    pub making_charges: Decimal,
    #[serde(default)]
    pub gemstones_cost: Decimal,
    #[serde(default)]
    pub diamonds_cost: Decimal,
    #[serde(default)]
    pub billing_mode: BillingMode,
    pub fixed_rate_per_gram: Option<Decimal>,
    /// Catalog price for imitation jewelry
    pub flat_price: Option<Decimal>,
    #[serde(default)]
    pub stock: i32,
    pub image_url: Option<String>,
    #[serde(default)]
    pub is_featured: bool,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct ProductUpdate {
    #[schema(value_type = Option<String>, format = "uuid")]
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

/// A product with its price at the current market rate.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ProductResponse {
    #[schema(value_type = String, format = "uuid")]
    pub id: ProductId,
    #[schema(value_type = Option<String>, format = "uuid")]
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
    /// Itemized price; absent until a market rate has been recorded
    pub pricing: Option<PricingBreakdown>,
    /// Price of one unit including GST, or the flat price for imitation jewelry
    pub price: Option<Decimal>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Query parameters for listing products
#[serde_as]
#[derive(Debug, Default, Deserialize, IntoParams, ToSchema)]
pub struct ListProductsQuery {
    #[serde(flatten)]
    #[param(inline)]
    pub pagination: Pagination,

    #[param(value_type = Option<String>, format = "uuid")]
    #[schema(value_type = Option<String>, format = "uuid")]
    pub category_id: Option<CategoryId>,

    /// Case-insensitive match on name, description or material
    pub search: Option<String>,

    #[serde_as(as = "Option<DisplayFromStr>")]
    pub featured: Option<bool>,

    /// Admins only: include deactivated products
    #[serde_as(as = "Option<DisplayFromStr>")]
    pub include_inactive: Option<bool>,
}

impl ListProductsQuery {
    /// Stable cache key for a public listing.
    pub fn cache_key(&self) -> String {
        let (skip, limit) = self.pagination.params();
        format!(
            "skip={skip}&limit={limit}&category={}&search={}&featured={}",
            self.category_id.map(|c| c.to_string()).unwrap_or_default(),
            self.search.as_deref().map(|s| s.trim().to_lowercase()).unwrap_or_default(),
            self.featured.map(|f| f.to_string()).unwrap_or_default(),
        )
    }
}

impl From<ProductCreate> for ProductCreateDBRequest {
    fn from(create: ProductCreate) -> Self {
        Self {
            category_id: create.category_id,
            name: create.name.trim().to_string(),
            description: create.description,
            material: create.material.trim().to_string(),
            jewelry_type: create.jewelry_type,
            weight: create.weight,
            making_charges: create.making_charges,
            gemstones_cost: create.gemstones_cost,
            diamonds_cost: create.diamonds_cost,
            billing_mode: create.billing_mode,
            fixed_rate_per_gram: create.fixed_rate_per_gram,
            flat_price: create.flat_price,
            stock: create.stock,
            image_url: create.image_url,
            is_featured: create.is_featured,
            is_active: create.is_active,
        }
    }
}

impl From<ProductUpdate> for ProductUpdateDBRequest {
    fn from(update: ProductUpdate) -> Self {
        Self {
            category_id: update.category_id,
            name: update.name.map(|n| n.trim().to_string()),
            description: update.description,
            material: update.material.map(|m| m.trim().to_string()),
            jewelry_type: update.jewelry_type,
            weight: update.weight,
            making_charges: update.making_charges,
            gemstones_cost: update.gemstones_cost,
            diamonds_cost: update.diamonds_cost,
            billing_mode: update.billing_mode,
            fixed_rate_per_gram: update.fixed_rate_per_gram,
            flat_price: update.flat_price,
            stock: update.stock,
            image_url: update.image_url,
            is_featured: update.is_featured,
            is_active: update.is_active,
        }
    }
}

impl From<ProductDBResponse> for ProductResponse {
    fn from(db: ProductDBResponse) -> Self {
        Self {
            id: db.id,
            category_id: db.category_id,
            name: db.name,
            description: db.description,
            material: db.material,
            jewelry_type: db.jewelry_type,
            weight: db.weight,
            making_charges: db.making_charges,
            gemstones_cost: db.gemstones_cost,
            diamonds_cost: db.diamonds_cost,
            billing_mode: db.billing_mode,
            fixed_rate_per_gram: db.fixed_rate_per_gram,
            flat_price: db.flat_price,
            stock: db.stock,
            image_url: db.image_url,
            is_featured: db.is_featured,
            is_active: db.is_active,
            pricing: None,
            price: None,
            created_at: db.created_at,
            updated_at: db.updated_at,
        }
    }
}

impl ProductResponse {
    /// Response with the breakdown at `rates` embedded.
    pub fn priced(db: ProductDBResponse, calculator: &PriceCalculator, rates: Option<&MetalRates>) -> Self {
        let Some(rates) = rates else {
            return Self::from(db);
        };

        let input = db.pricing_input();
        let priced = calculator
            .breakdown(&input, rates)
            .and_then(|breakdown| Ok((breakdown, calculator.quote_line(&input, db.flat_price, 1, rates)?)));

        match priced {
            Ok((breakdown, quote)) => Self {
                pricing: Some(breakdown),
                price: Some(quote.total),
                ..Self::from(db)
            },
            Err(err) => {
                tracing::warn!(product_id = %abbrev_uuid(&db.id), "Leaving product unpriced: {err}");
                Self::from(db)
            }
        }
    }
}
