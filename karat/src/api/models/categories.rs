//! API request/response models for catalog categories.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::db::models::categories::{CategoryCreateDBRequest, CategoryDBResponse, CategoryUpdateDBRequest};
use crate::types::CategoryId;

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CategoryCreate {
    pub name: String,
    /// Derived from the name when omitted
    pub slug: Option<String>,
    pub description: Option<String>,
    pub image_url: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct CategoryUpdate {
    pub name: Option<String>,
    pub slug: Option<String>,
    pub description: Option<String>,
    pub image_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CategoryResponse {
    #[schema(value_type = String, format = "uuid")]
    pub id: CategoryId,
    pub name: String,
    pub slug: String,
    pub description: Option<String>,
    pub image_url: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Lowercase ASCII alphanumerics joined by single dashes: "Bridal Sets & Rings" -> "bridal-sets-rings".
pub fn slugify(input: &str) -> String {
    input
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|part| !part.is_empty())
        .map(str::to_ascii_lowercase)
        .collect::<Vec<_>>()
        .join("-")
}

impl CategoryCreate {
    pub fn into_db_request(self) -> CategoryCreateDBRequest {
        let slug = slugify(self.slug.as_deref().unwrap_or(&self.name));
        CategoryCreateDBRequest {
            name: self.name.trim().to_string(),
            slug,
            description: self.description,
            image_url: self.image_url,
        }
    }
}

impl From<CategoryUpdate> for CategoryUpdateDBRequest {
    fn from(update: CategoryUpdate) -> Self {
        Self {
            name: update.name.map(|n| n.trim().to_string()),
            slug: update.slug.as_deref().map(slugify),
            description: update.description,
            image_url: update.image_url,
        }
    }
}

impl From<CategoryDBResponse> for CategoryResponse {
    fn from(db: CategoryDBResponse) -> Self {
        Self {
            id: db.id,
            name: db.name,
            slug: db.slug,
            description: db.description,
            image_url: db.image_url,
            created_at: db.created_at,
        }
    }
}
