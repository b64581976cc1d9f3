//! Database repository for orders.

use crate::db::{
    errors::{DbError, Result},
    handlers::repository::Repository,
    models::orders::{
        OrderCreateDBRequest, OrderDBResponse, OrderItemDBResponse, OrderStats, OrderStatus, OrderUpdateDBRequest,
    },
};
use crate::types::{MarketRateId, OrderId, ProductId, UserId, abbrev_uuid};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{Connection, FromRow, PgConnection, Postgres, QueryBuilder};
use std::collections::HashMap;
use tracing::instrument;
use uuid::Uuid;

/// Filter for listing orders
#[derive(Debug, Clone)]
pub struct OrderFilter {
    pub skip: i64,
    pub limit: i64,
    /// Restrict to one customer's orders
    pub user_id: Option<UserId>,
    pub status: Option<OrderStatus>,
}

impl OrderFilter {
    pub fn new(skip: i64, limit: i64) -> Self {
        Self {
            skip,
            limit,
            user_id: None,
            status: None,
        }
    }

    fn push_conditions<'a>(&'a self, query: &mut QueryBuilder<'a, Postgres>) {
        if let Some(user_id) = self.user_id {
            query.push(" AND user_id = ");
            query.push_bind(user_id);
        }
        if let Some(status) = self.status {
            query.push(" AND status = ");
            query.push_bind(status);
        }
    }
}

#[derive(Debug, Clone, FromRow)]
struct Order {
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

impl From<Order> for OrderDBResponse {
    fn from(o: Order) -> Self {
        Self {
            id: o.id,
            user_id: o.user_id,
            status: o.status,
            subtotal: o.subtotal,
            gst_amount: o.gst_amount,
            total_amount: o.total_amount,
            shipping_address: o.shipping_address,
            payment_method: o.payment_method,
            market_rate_id: o.market_rate_id,
            created_at: o.created_at,
            updated_at: o.updated_at,
        }
    }
}

#[derive(Debug, Clone, FromRow)]
struct OrderItem {
    pub id: Uuid,
    pub order_id: OrderId,
    pub product_id: Option<ProductId>,
    pub product_name: String,
    pub quantity: i32,
    pub unit_price: Decimal,
    pub line_total: Decimal,
}

impl From<OrderItem> for OrderItemDBResponse {
    fn from(i: OrderItem) -> Self {
        Self {
            id: i.id,
            order_id: i.order_id,
            product_id: i.product_id,
            product_name: i.product_name,
            quantity: i.quantity,
            unit_price: i.unit_price,
            line_total: i.line_total,
        }
    }
}

pub struct Orders<'c> {
    db: &'c mut PgConnection,
}

impl<'c> Orders<'c> {
    pub fn new(db: &'c mut PgConnection) -> Self {
        Self { db }
    }

    #[instrument(skip(self), fields(order_id = %abbrev_uuid(&order_id)), err)]
    pub async fn get_items(&mut self, order_id: OrderId) -> Result<Vec<OrderItemDBResponse>> {
        let items = sqlx::query_as::<_, OrderItem>("SELECT * FROM order_items WHERE order_id = $1 ORDER BY product_name, id")
            .bind(order_id)
            .fetch_all(&mut *self.db)
            .await?;

        Ok(items.into_iter().map(Into::into).collect())
    }

    /// Line items for many orders at once, keyed by order. Orders without items are absent.
    #[instrument(skip(self, order_ids), fields(count = order_ids.len()), err)]
    pub async fn get_items_bulk(&mut self, order_ids: &[OrderId]) -> Result<HashMap<OrderId, Vec<OrderItemDBResponse>>> {
        if order_ids.is_empty() {
            return Ok(HashMap::new());
        }

        let items = sqlx::query_as::<_, OrderItem>("SELECT * FROM order_items WHERE order_id = ANY($1) ORDER BY product_name, id")
            .bind(order_ids)
            .fetch_all(&mut *self.db)
            .await?;

        let mut grouped: HashMap<OrderId, Vec<OrderItemDBResponse>> = HashMap::new();
        for item in items {
            grouped.entry(item.order_id).or_default().push(item.into());
        }
        Ok(grouped)
    }

    /// Fetch an order and hold its row lock until the surrounding transaction ends.
    #[instrument(skip(self), fields(order_id = %abbrev_uuid(&id)), err)]
    pub async fn lock_for_update(&mut self, id: OrderId) -> Result<Option<OrderDBResponse>> {
        let order = sqlx::query_as::<_, Order>("SELECT * FROM orders WHERE id = $1 FOR UPDATE")
            .bind(id)
            .fetch_optional(&mut *self.db)
            .await?;

        Ok(order.map(Into::into))
    }

    #[instrument(skip(self, filter), err)]
    pub async fn count(&mut self, filter: &OrderFilter) -> Result<i64> {
        let mut query = QueryBuilder::new("SELECT COUNT(*) FROM orders WHERE 1=1");
        filter.push_conditions(&mut query);

        let count = query.build_query_scalar::<i64>().fetch_one(&mut *self.db).await?;
        Ok(count)
    }

    #[instrument(skip(self), err)]
    pub async fn stats(&mut self) -> Result<OrderStats> {
        let (total_orders, pending_orders, total_revenue) = sqlx::query_as::<_, (i64, i64, Decimal)>(
            r#"
            SELECT
                COUNT(*),
                COUNT(*) FILTER (WHERE status = 'pending'),
                COALESCE(SUM(total_amount) FILTER (WHERE status <> 'cancelled'), 0)
            FROM orders
            "#,
        )
        .fetch_one(&mut *self.db)
        .await?;

        Ok(OrderStats {
            total_orders,
            pending_orders,
            total_revenue,
        })
    }
}

#[async_trait::async_trait]
impl<'c> Repository for Orders<'c> {
    type CreateRequest = OrderCreateDBRequest;
    type UpdateRequest = OrderUpdateDBRequest;
    type Response = OrderDBResponse;
    type Id = OrderId;
    type Filter = OrderFilter;

    /// Insert an order together with its line items.
    #[instrument(skip(self, request), fields(user_id = %abbrev_uuid(&request.user_id), items = request.items.len()), err)]
    async fn create(&mut self, request: &Self::CreateRequest) -> Result<Self::Response> {
        let mut tx = self.db.begin().await?;

        let order = sqlx::query_as::<_, Order>(
            r#"
            INSERT INTO orders (id, user_id, subtotal, gst_amount, total_amount, shipping_address, payment_method, market_rate_id)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(request.user_id)
        .bind(request.subtotal)
        .bind(request.gst_amount)
        .bind(request.total_amount)
        .bind(&request.shipping_address)
        .bind(&request.payment_method)
        .bind(request.market_rate_id)
        .fetch_one(&mut *tx)
        .await?;

        for item in &request.items {
            sqlx::query(
                r#"
                INSERT INTO order_items (id, order_id, product_id, product_name, quantity, unit_price, line_total)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(order.id)
            .bind(item.product_id)
            .bind(&item.product_name)
            .bind(item.quantity)
            .bind(item.unit_price)
            .bind(item.line_total)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(order.into())
    }

    #[instrument(skip(self), fields(order_id = %abbrev_uuid(&id)), err)]
    async fn get_by_id(&mut self, id: Self::Id) -> Result<Option<Self::Response>> {
        let order = sqlx::query_as::<_, Order>("SELECT * FROM orders WHERE id = $1")
            .bind(id)
            .fetch_optional(&mut *self.db)
            .await?;

        Ok(order.map(Into::into))
    }

    #[instrument(skip(self, ids), fields(count = ids.len()), err)]
    async fn get_bulk(&mut self, ids: Vec<Self::Id>) -> Result<HashMap<Self::Id, Self::Response>> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }

        let orders = sqlx::query_as::<_, Order>("SELECT * FROM orders WHERE id = ANY($1)")
            .bind(&ids)
            .fetch_all(&mut *self.db)
            .await?;

        Ok(orders.into_iter().map(|o| (o.id, o.into())).collect())
    }

    #[instrument(skip(self, filter), fields(limit = filter.limit, skip = filter.skip), err)]
    async fn list(&mut self, filter: &Self::Filter) -> Result<Vec<Self::Response>> {
        let mut query = QueryBuilder::new("SELECT * FROM orders WHERE 1=1");
        filter.push_conditions(&mut query);
        query.push(" ORDER BY created_at DESC, id LIMIT ");
        query.push_bind(filter.limit);
        query.push(" OFFSET ");
        query.push_bind(filter.skip);

        let orders = query.build_query_as::<Order>().fetch_all(&mut *self.db).await?;
        Ok(orders.into_iter().map(Into::into).collect())
    }

    #[instrument(skip(self), fields(order_id = %abbrev_uuid(&id)), err)]
    async fn delete(&mut self, id: Self::Id) -> Result<bool> {
        let result = sqlx::query("DELETE FROM orders WHERE id = $1").bind(id).execute(&mut *self.db).await?;

        Ok(result.rows_affected() > 0)
    }

    /// Set the status. Transition rules are enforced by the caller.
    #[instrument(skip(self, request), fields(order_id = %abbrev_uuid(&id), status = %request.status), err)]
    async fn update(&mut self, id: Self::Id, request: &Self::UpdateRequest) -> Result<Self::Response> {
        let order = sqlx::query_as::<_, Order>("UPDATE orders SET status = $2, updated_at = NOW() WHERE id = $1 RETURNING *")
            .bind(id)
            .bind(request.status)
            .fetch_optional(&mut *self.db)
            .await?
            .ok_or(DbError::NotFound)?;

        Ok(order.into())
    }
}
