//! Database repository for catalog products.

use crate::db::{
    errors::{DbError, Result},
    handlers::repository::Repository,
    models::products::{ProductCreateDBRequest, ProductDBResponse, ProductUpdateDBRequest},
};
use crate::pricing::{BillingMode, JewelryType};
use crate::types::{CategoryId, ProductId, abbrev_uuid};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{FromRow, PgConnection, Postgres, QueryBuilder};
use std::collections::HashMap;
use tracing::instrument;
use uuid::Uuid;

/// Filter for listing products
#[derive(Debug, Clone)]
pub struct ProductFilter {
    pub skip: i64,
    pub limit: i64,
    pub category_id: Option<CategoryId>,
    /// Case-insensitive substring match on name, description or material
    pub search: Option<String>,
    pub featured: Option<bool>,
    /// Admin listings also see deactivated products
    pub include_inactive: bool,
}

impl ProductFilter {
    pub fn new(skip: i64, limit: i64) -> Self {
        Self {
            skip,
            limit,
            category_id: None,
            search: None,
            featured: None,
            include_inactive: false,
        }
    }

    fn push_conditions<'a>(&'a self, query: &mut QueryBuilder<'a, Postgres>) {
        if !self.include_inactive {
            query.push(" AND is_active");
        }
        if let Some(category_id) = self.category_id {
            query.push(" AND category_id = ");
            query.push_bind(category_id);
        }
        if let Some(featured) = self.featured {
            query.push(" AND is_featured = ");
            query.push_bind(featured);
        }
        if let Some(search) = self.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            let pattern = format!("%{search}%");
            query.push(" AND (name ILIKE ");
            query.push_bind(pattern.clone());
            query.push(" OR description ILIKE ");
            query.push_bind(pattern.clone());
            query.push(" OR material ILIKE ");
            query.push_bind(pattern);
            query.push(")");
        }
    }
}

#[derive(Debug, Clone, FromRow)]
struct Product {
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

impl From<Product> for ProductDBResponse {
    fn from(p: Product) -> Self {
        Self {
            id: p.id,
            category_id: p.category_id,
            name: p.name,
            description: p.description,
            material: p.material,
            jewelry_type: p.jewelry_type,
            weight: p.weight,
            making_charges: p.making_charges,
            gemstones_cost: p.gemstones_cost,
            diamonds_cost: p.diamonds_cost,
            billing_mode: p.billing_mode,
            fixed_rate_per_gram: p.fixed_rate_per_gram,
            flat_price: p.flat_price,
            stock: p.stock,
            image_url: p.image_url,
            is_featured: p.is_featured,
            is_active: p.is_active,
            created_at: p.created_at,
            updated_at: p.updated_at,
        }
    }
}

pub struct Products<'c> {
    db: &'c mut PgConnection,
}

impl<'c> Products<'c> {
    pub fn new(db: &'c mut PgConnection) -> Self {
        Self { db }
    }

    #[instrument(skip(self, filter), err)]
    pub async fn count(&mut self, filter: &ProductFilter) -> Result<i64> {
        let mut query = QueryBuilder::new("SELECT COUNT(*) FROM products WHERE 1=1");
        filter.push_conditions(&mut query);

        let count = query.build_query_scalar::<i64>().fetch_one(&mut *self.db).await?;
        Ok(count)
    }

    /// Take `quantity` units out of stock. Returns false, without touching the row, when fewer
    /// than `quantity` units are left.
    #[instrument(skip(self), fields(product_id = %abbrev_uuid(&id)), err)]
    pub async fn decrement_stock(&mut self, id: ProductId, quantity: i32) -> Result<bool> {
        let result = sqlx::query("UPDATE products SET stock = stock - $2, updated_at = NOW() WHERE id = $1 AND stock >= $2")
            .bind(id)
            .bind(quantity)
            .execute(&mut *self.db)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Put units back, e.g. when an order is cancelled. Deleted products are ignored.
    #[instrument(skip(self), fields(product_id = %abbrev_uuid(&id)), err)]
    pub async fn restore_stock(&mut self, id: ProductId, quantity: i32) -> Result<()> {
        sqlx::query("UPDATE products SET stock = stock + $2, updated_at = NOW() WHERE id = $1")
            .bind(id)
            .bind(quantity)
            .execute(&mut *self.db)
            .await?;

        Ok(())
    }
}

#[async_trait::async_trait]
impl<'c> Repository for Products<'c> {
    type CreateRequest = ProductCreateDBRequest;
    type UpdateRequest = ProductUpdateDBRequest;
    type Response = ProductDBResponse;
    type Id = ProductId;
    type Filter = ProductFilter;

    #[instrument(skip(self, request), fields(name = %request.name), err)]
    async fn create(&mut self, request: &Self::CreateRequest) -> Result<Self::Response> {
        let product = sqlx::query_as::<_, Product>(
            r#"
            INSERT INTO products (
                id, category_id, name, description, material, jewelry_type, weight, making_charges,
                gemstones_cost, diamonds_cost, billing_mode, fixed_rate_per_gram, flat_price, stock,
                image_url, is_featured, is_active
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(request.category_id)
        .bind(&request.name)
        .bind(&request.description)
        .bind(&request.material)
        .bind(request.jewelry_type)
        .bind(request.weight)
        .bind(request.making_charges)
        .bind(request.gemstones_cost)
        .bind(request.diamonds_cost)
        .bind(request.billing_mode)
        .bind(request.fixed_rate_per_gram)
        .bind(request.flat_price)
        .bind(request.stock)
        .bind(&request.image_url)
        .bind(request.is_featured)
        .bind(request.is_active)
        .fetch_one(&mut *self.db)
        .await?;

        Ok(product.into())
    }

    #[instrument(skip(self), fields(product_id = %abbrev_uuid(&id)), err)]
    async fn get_by_id(&mut self, id: Self::Id) -> Result<Option<Self::Response>> {
        let product = sqlx::query_as::<_, Product>("SELECT * FROM products WHERE id = $1")
            .bind(id)
            .fetch_optional(&mut *self.db)
            .await?;

        Ok(product.map(Into::into))
    }

    #[instrument(skip(self, ids), fields(count = ids.len()), err)]
    async fn get_bulk(&mut self, ids: Vec<Self::Id>) -> Result<HashMap<Self::Id, Self::Response>> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }

        let products = sqlx::query_as::<_, Product>("SELECT * FROM products WHERE id = ANY($1)")
            .bind(&ids)
            .fetch_all(&mut *self.db)
            .await?;

        Ok(products.into_iter().map(|p| (p.id, p.into())).collect())
    }

    #[instrument(skip(self, filter), fields(limit = filter.limit, skip = filter.skip), err)]
    async fn list(&mut self, filter: &Self::Filter) -> Result<Vec<Self::Response>> {
        let mut query = QueryBuilder::new("SELECT * FROM products WHERE 1=1");
        filter.push_conditions(&mut query);
        query.push(" ORDER BY created_at DESC, id LIMIT ");
        query.push_bind(filter.limit);
        query.push(" OFFSET ");
        query.push_bind(filter.skip);

        let products = query.build_query_as::<Product>().fetch_all(&mut *self.db).await?;
        Ok(products.into_iter().map(Into::into).collect())
    }

    #[instrument(skip(self), fields(product_id = %abbrev_uuid(&id)), err)]
    async fn delete(&mut self, id: Self::Id) -> Result<bool> {
        let result = sqlx::query("DELETE FROM products WHERE id = $1")
            .bind(id)
            .execute(&mut *self.db)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self, request), fields(product_id = %abbrev_uuid(&id)), err)]
    async fn update(&mut self, id: Self::Id, request: &Self::UpdateRequest) -> Result<Self::Response> {
        let product = sqlx::query_as::<_, Product>(
            r#"
            UPDATE products SET
                category_id = COALESCE($2, category_id),
                name = COALESCE($3, name),
                description = COALESCE($4, description),
                material = COALESCE($5, material),
                jewelry_type = COALESCE($6, jewelry_type),
                weight = COALESCE($7, weight),
                making_charges = COALESCE($8, making_charges),
                gemstones_cost = COALESCE($9, gemstones_cost),
                diamonds_cost = COALESCE($10, diamonds_cost),
                billing_mode = COALESCE($11, billing_mode),
                fixed_rate_per_gram = COALESCE($12, fixed_rate_per_gram),
                flat_price = COALESCE($13, flat_price),
                stock = COALESCE($14, stock),
                image_url = COALESCE($15, image_url),
                is_featured = COALESCE($16, is_featured),
                is_active = COALESCE($17, is_active),
                updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(request.category_id)
        .bind(&request.name)
        .bind(&request.description)
        .bind(&request.material)
        .bind(request.jewelry_type)
        .bind(request.weight)
        .bind(request.making_charges)
        .bind(request.gemstones_cost)
        .bind(request.diamonds_cost)
        .bind(request.billing_mode)
        .bind(request.fixed_rate_per_gram)
        .bind(request.flat_price)
        .bind(request.stock)
        .bind(&request.image_url)
        .bind(request.is_featured)
        .bind(request.is_active)
        .fetch_optional(&mut *self.db)
        .await?
        .ok_or(DbError::NotFound)?;

        Ok(product.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{create_test_category, product_request};
    use sqlx::PgPool;

    #[sqlx::test]
    #[test_log::test]
    async fn test_create_and_fetch_product(pool: PgPool) {
        let category = create_test_category(&pool, "Rings").await;
        let mut conn = pool.acquire().await.unwrap();
        let mut repo = Products::new(&mut conn);

        let mut request = product_request("Solitaire Ring", "22K Gold");
        request.category_id = Some(category.id);
        request.weight = Decimal::new(4250, 3);
        let product = repo.create(&request).await.unwrap();

        let fetched = repo.get_by_id(product.id).await.unwrap().unwrap();
        assert_eq!(fetched.name, "Solitaire Ring");
        assert_eq!(fetched.category_id, Some(category.id));
        assert_eq!(fetched.weight, Decimal::new(4250, 3));
        assert_eq!(fetched.jewelry_type, JewelryType::Real);
        assert_eq!(fetched.billing_mode, BillingMode::LiveRate);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_list_filters(pool: PgPool) {
        let rings = create_test_category(&pool, "Rings").await;
        let mut conn = pool.acquire().await.unwrap();
        let mut repo = Products::new(&mut conn);

        let mut featured = product_request("Temple Necklace", "22K Gold");
        featured.is_featured = true;
        repo.create(&featured).await.unwrap();

        let mut ring = product_request("Silver Toe Ring", "Sterling Silver");
        ring.category_id = Some(rings.id);
        repo.create(&ring).await.unwrap();

        let mut hidden = product_request("Retired Ring", "18K Gold");
        hidden.category_id = Some(rings.id);
        hidden.is_active = false;
        repo.create(&hidden).await.unwrap();

        let all = ProductFilter::new(0, 10);
        assert_eq!(repo.count(&all).await.unwrap(), 2);

        let by_category = ProductFilter {
            category_id: Some(rings.id),
            ..ProductFilter::new(0, 10)
        };
        let listed = repo.list(&by_category).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].name, "Silver Toe Ring");

        let with_inactive = ProductFilter {
            include_inactive: true,
            ..by_category
        };
        assert_eq!(repo.count(&with_inactive).await.unwrap(), 2);

        let only_featured = ProductFilter {
            featured: Some(true),
            ..ProductFilter::new(0, 10)
        };
        assert_eq!(repo.list(&only_featured).await.unwrap()[0].name, "Temple Necklace");

        let search = ProductFilter {
            search: Some("sterling".to_string()),
            ..ProductFilter::new(0, 10)
        };
        assert_eq!(repo.count(&search).await.unwrap(), 1);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_stock_decrement_never_goes_negative(pool: PgPool) {
        let mut conn = pool.acquire().await.unwrap();
        let mut repo = Products::new(&mut conn);

        let mut request = product_request("Jhumka", "22K Gold");
        request.stock = 3;
        let product = repo.create(&request).await.unwrap();

        assert!(repo.decrement_stock(product.id, 2).await.unwrap());
        assert!(!repo.decrement_stock(product.id, 2).await.unwrap());
        assert_eq!(repo.get_by_id(product.id).await.unwrap().unwrap().stock, 1);

        repo.restore_stock(product.id, 2).await.unwrap();
        assert_eq!(repo.get_by_id(product.id).await.unwrap().unwrap().stock, 3);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_update_product(pool: PgPool) {
        let mut conn = pool.acquire().await.unwrap();
        let mut repo = Products::new(&mut conn);

        let product = repo.create(&product_request("Chain", "22K Gold")).await.unwrap();
        let updated = repo
            .update(
                product.id,
                &ProductUpdateDBRequest {
                    billing_mode: Some(BillingMode::FixedRate),
                    fixed_rate_per_gram: Some(Decimal::from(6100)),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(updated.billing_mode, BillingMode::FixedRate);
        assert_eq!(updated.fixed_rate_per_gram, Some(Decimal::from(6100)));
        assert_eq!(updated.name, "Chain");

        assert!(matches!(
            repo.update(Uuid::new_v4(), &ProductUpdateDBRequest::default()).await,
            Err(DbError::NotFound)
        ));
    }
}
