//! Database repository for shopping cart lines.

use crate::db::{
    errors::{DbError, Result},
    handlers::repository::Repository,
    models::cart::{CartItemCreateDBRequest, CartItemDBResponse, CartItemUpdateDBRequest},
};
use crate::types::{CartItemId, ProductId, UserId, abbrev_uuid};
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgConnection};
use std::collections::HashMap;
use tracing::instrument;
use uuid::Uuid;

/// Cart lines always belong to one user.
#[derive(Debug, Clone)]
pub struct CartFilter {
    pub user_id: UserId,
}

#[derive(Debug, Clone, FromRow)]
struct CartItem {
    pub id: CartItemId,
    pub user_id: UserId,
    pub product_id: ProductId,
    pub quantity: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<CartItem> for CartItemDBResponse {
    fn from(item: CartItem) -> Self {
        Self {
            id: item.id,
            user_id: item.user_id,
            product_id: item.product_id,
            quantity: item.quantity,
            created_at: item.created_at,
            updated_at: item.updated_at,
        }
    }
}

pub struct Cart<'c> {
    db: &'c mut PgConnection,
}

impl<'c> Cart<'c> {
    pub fn new(db: &'c mut PgConnection) -> Self {
        Self { db }
    }

    /// Empty a user's cart, returning the number of lines removed.
    #[instrument(skip(self), fields(user_id = %abbrev_uuid(&user_id)), err)]
    pub async fn clear(&mut self, user_id: UserId) -> Result<u64> {
        let result = sqlx::query("DELETE FROM cart_items WHERE user_id = $1")
            .bind(user_id)
            .execute(&mut *self.db)
            .await?;

        Ok(result.rows_affected())
    }
}

#[async_trait::async_trait]
impl<'c> Repository for Cart<'c> {
    type CreateRequest = CartItemCreateDBRequest;
    type UpdateRequest = CartItemUpdateDBRequest;
    type Response = CartItemDBResponse;
    type Id = CartItemId;
    type Filter = CartFilter;

    #[instrument(skip(self, request), fields(user_id = %abbrev_uuid(&request.user_id), product_id = %abbrev_uuid(&request.product_id)), err)]
    async fn create(&mut self, request: &Self::CreateRequest) -> Result<Self::Response> {
        let item = sqlx::query_as::<_, CartItem>(
            r#"
            INSERT INTO cart_items (id, user_id, product_id, quantity)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (user_id, product_id)
            DO UPDATE SET quantity = cart_items.quantity + EXCLUDED.quantity, updated_at = NOW()
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(request.user_id)
        .bind(request.product_id)
        .bind(request.quantity)
        .fetch_one(&mut *self.db)
        .await?;

        Ok(item.into())
    }

    #[instrument(skip(self), fields(item_id = %abbrev_uuid(&id)), err)]
    async fn get_by_id(&mut self, id: Self::Id) -> Result<Option<Self::Response>> {
        let item = sqlx::query_as::<_, CartItem>("SELECT * FROM cart_items WHERE id = $1")
            .bind(id)
            .fetch_optional(&mut *self.db)
            .await?;

        Ok(item.map(Into::into))
    }

    #[instrument(skip(self, ids), fields(count = ids.len()), err)]
    async fn get_bulk(&mut self, ids: Vec<Self::Id>) -> Result<HashMap<Self::Id, Self::Response>> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }

        let items = sqlx::query_as::<_, CartItem>("SELECT * FROM cart_items WHERE id = ANY($1)")
            .bind(&ids)
            .fetch_all(&mut *self.db)
            .await?;

        Ok(items.into_iter().map(|i| (i.id, i.into())).collect())
    }

    #[instrument(skip(self, filter), fields(user_id = %abbrev_uuid(&filter.user_id)), err)]
    async fn list(&mut self, filter: &Self::Filter) -> Result<Vec<Self::Response>> {
        let items = sqlx::query_as::<_, CartItem>("SELECT * FROM cart_items WHERE user_id = $1 ORDER BY created_at, id")
            .bind(filter.user_id)
            .fetch_all(&mut *self.db)
            .await?;

        Ok(items.into_iter().map(Into::into).collect())
    }

    #[instrument(skip(self), fields(item_id = %abbrev_uuid(&id)), err)]
    async fn delete(&mut self, id: Self::Id) -> Result<bool> {
        let result = sqlx::query("DELETE FROM cart_items WHERE id = $1")
            .bind(id)
            .execute(&mut *self.db)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self, request), fields(item_id = %abbrev_uuid(&id), quantity = request.quantity), err)]
    async fn update(&mut self, id: Self::Id, request: &Self::UpdateRequest) -> Result<Self::Response> {
        let item = sqlx::query_as::<_, CartItem>("UPDATE cart_items SET quantity = $2, updated_at = NOW() WHERE id = $1 RETURNING *")
            .bind(id)
            .bind(request.quantity)
            .fetch_optional(&mut *self.db)
            .await?
            .ok_or(DbError::NotFound)?;

        Ok(item.into())
    }
}
