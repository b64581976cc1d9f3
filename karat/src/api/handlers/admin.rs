//! Back-office endpoints. Everything here is admin-only.

use axum::{
    Json,
    extract::{Path, Query, State},
};
use chrono::Utc;
use tracing::info;

use super::{market_rates::load_current_rate, orders::list_with_items};
use crate::{
    AppState,
    api::models::{
        admin::DashboardStats,
        gullak::{GullakAccountResponse, ListGullakAccountsQuery},
        market_rates::MarketRateResponse,
        orders::{ListOrdersQuery, OrderResponse, OrderStatusUpdate},
        pagination::PaginatedResponse,
        users::{ListUsersQuery, RoleUpdate, UserResponse},
    },
    auth::permissions::{RequiresPermission, operation, resource},
    db::{
        handlers::{
            Categories, GullakAccounts, Orders, Products, Repository, Users, gullak::GullakAccountFilter, orders::OrderFilter,
            products::ProductFilter, users::UserFilter,
        },
        models::{
            orders::{OrderStatus, OrderUpdateDBRequest},
            users::UserUpdateDBRequest,
        },
    },
    errors::{Error, Result},
    gullak::autopay::{SweepReport, run_autopay_sweep},
    types::{OrderId, UserId, abbrev_uuid},
};

#[utoipa::path(
    get,
    path = "/api/admin/stats",
    tag = "admin",
    summary = "Dashboard figures",
    responses(
        (status = 200, description = "Counts, revenue and the current rate", body = DashboardStats),
        (status = 403, description = "Admins only"),
    ),
    security(
        ("BearerAuth" = []),
        ("CookieAuth" = [])
    )
)]
#[tracing::instrument(skip_all)]
pub async fn get_stats(
    State(state): State<AppState>,
    _: RequiresPermission<resource::Dashboard, operation::ReadAll>,
) -> Result<Json<DashboardStats>> {
    let current_rate = load_current_rate(&state).await?;

    let mut pool_conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let total_users = Users::new(&mut pool_conn).count(&UserFilter::new(0, 0)).await?;
    let total_products = Products::new(&mut pool_conn)
        .count(&ProductFilter {
            include_inactive: true,
            ..ProductFilter::new(0, 0)
        })
        .await?;
    let total_categories = Categories::new(&mut pool_conn).count().await?;
    let orders = Orders::new(&mut pool_conn).stats().await?;
    let gullak = GullakAccounts::new(&mut pool_conn).stats().await?;

    Ok(Json(DashboardStats {
        total_users,
        total_products,
        total_categories,
        orders: orders.into(),
        gullak: gullak.into(),
        current_rate: current_rate.map(Into::into),
    }))
}

#[utoipa::path(
    get,
    path = "/api/admin/users",
    tag = "admin",
    summary = "List users",
    params(ListUsersQuery),
    responses(
        (status = 200, description = "Users, newest first", body = PaginatedResponse<UserResponse>),
        (status = 403, description = "Admins only"),
    ),
    security(
        ("BearerAuth" = []),
        ("CookieAuth" = [])
    )
)]
#[tracing::instrument(skip_all)]
pub async fn list_users(
    State(state): State<AppState>,
    Query(query): Query<ListUsersQuery>,
    _: RequiresPermission<resource::Users, operation::ReadAll>,
) -> Result<Json<PaginatedResponse<UserResponse>>> {
    let (skip, limit) = query.pagination.params();
    let filter = UserFilter::new(skip, limit).with_search(query.search).with_role(query.role);

    let mut pool_conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let mut repo = Users::new(&mut pool_conn);
    let users = repo.list(&filter).await?;
    let total_count = repo.count(&filter).await?;

    Ok(Json(PaginatedResponse::new(
        users.into_iter().map(Into::into).collect(),
        total_count,
        skip,
        limit,
    )))
}

#[utoipa::path(
    patch,
    path = "/api/admin/users/{user_id}/role",
    tag = "admin",
    summary = "Change role",
    request_body = RoleUpdate,
    responses(
        (status = 200, description = "User updated", body = UserResponse),
        (status = 403, description = "Admins only, or demoting the last admin"),
        (status = 404, description = "User not found"),
    ),
    params(
        ("user_id" = uuid::Uuid, Path, description = "User ID")
    ),
    security(
        ("BearerAuth" = []),
        ("CookieAuth" = [])
    )
)]
#[tracing::instrument(skip_all)]
pub async fn update_user_role(
    State(state): State<AppState>,
    Path(user_id): Path<UserId>,
    current_user: RequiresPermission<resource::Users, operation::UpdateAll>,
    Json(update): Json<RoleUpdate>,
) -> Result<Json<UserResponse>> {
    let mut pool_conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let user = Users::new(&mut pool_conn)
        .update(
            user_id,
            &UserUpdateDBRequest {
                role: Some(update.role),
                ..Default::default()
            },
        )
        .await?;

    info!(
        user_id = %abbrev_uuid(&user_id),
        role = ?update.role,
        by = %abbrev_uuid(&current_user.id),
        "User role changed"
    );

    Ok(Json(user.into()))
}

#[utoipa::path(
    get,
    path = "/api/admin/orders",
    tag = "admin",
    summary = "List all orders",
    params(ListOrdersQuery),
    responses(
        (status = 200, description = "Orders, newest first", body = PaginatedResponse<OrderResponse>),
        (status = 403, description = "Admins only"),
    ),
    security(
        ("BearerAuth" = []),
        ("CookieAuth" = [])
    )
)]
#[tracing::instrument(skip_all)]
pub async fn list_all_orders(
    State(state): State<AppState>,
    Query(query): Query<ListOrdersQuery>,
    _: RequiresPermission<resource::Orders, operation::ReadAll>,
) -> Result<Json<PaginatedResponse<OrderResponse>>> {
    let (skip, limit) = query.pagination.params();
    let filter = OrderFilter {
        status: query.status,
        ..OrderFilter::new(skip, limit)
    };

    let mut pool_conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    Ok(Json(list_with_items(&mut pool_conn, &filter).await?))
}

#[utoipa::path(
    patch,
    path = "/api/admin/orders/{order_id}/status",
    tag = "admin",
    summary = "Advance order status",
    description = "pending -> confirmed | cancelled, confirmed -> shipped | cancelled, shipped -> delivered. \
                   Cancelling returns the items to stock.",
    request_body = OrderStatusUpdate,
    responses(
        (status = 200, description = "Order updated", body = OrderResponse),
        (status = 400, description = "Transition not allowed"),
        (status = 404, description = "Order not found"),
    ),
    params(
        ("order_id" = uuid::Uuid, Path, description = "Order ID")
    ),
    security(
        ("BearerAuth" = []),
        ("CookieAuth" = [])
    )
)]
#[tracing::instrument(skip_all)]
pub async fn update_order_status(
    State(state): State<AppState>,
    Path(order_id): Path<OrderId>,
    _: RequiresPermission<resource::Orders, operation::UpdateAll>,
    Json(update): Json<OrderStatusUpdate>,
) -> Result<Json<OrderResponse>> {
    let mut tx = state.db.begin().await.map_err(|e| Error::Database(e.into()))?;

    let order = Orders::new(&mut tx).lock_for_update(order_id).await?.ok_or_else(|| Error::NotFound {
        resource: "Order".to_string(),
        id: order_id.to_string(),
    })?;

    if !order.status.can_transition_to(update.status) {
        return Err(Error::BadRequest {
            message: format!("Cannot move an order from {} to {}", order.status, update.status),
        });
    }

    let updated = Orders::new(&mut tx)
        .update(order_id, &OrderUpdateDBRequest { status: update.status })
        .await?;
    let items = Orders::new(&mut tx).get_items(order_id).await?;

    let restocked = updated.status == OrderStatus::Cancelled;
    if restocked {
        for item in &items {
            // Products deleted since checkout have nothing to restock
            if let Some(product_id) = item.product_id {
                Products::new(&mut tx).restore_stock(product_id, item.quantity).await?;
            }
        }
    }

    tx.commit().await.map_err(|e| Error::Database(e.into()))?;
    if restocked {
        state.cache.invalidate_products().await;
    }

    info!(order_id = %abbrev_uuid(&order_id), from = %order.status, to = %updated.status, "Order status changed");

    Ok(Json(OrderResponse::new(updated, items)))
}

#[utoipa::path(
    get,
    path = "/api/admin/gullak/accounts",
    tag = "admin",
    summary = "List all savings plans",
    params(ListGullakAccountsQuery),
    responses(
        (status = 200, description = "Plans, newest first", body = PaginatedResponse<GullakAccountResponse>),
        (status = 403, description = "Admins only"),
    ),
    security(
        ("BearerAuth" = []),
        ("CookieAuth" = [])
    )
)]
#[tracing::instrument(skip_all)]
pub async fn list_all_gullak_accounts(
    State(state): State<AppState>,
    Query(query): Query<ListGullakAccountsQuery>,
    _: RequiresPermission<resource::Gullak, operation::ReadAll>,
) -> Result<Json<PaginatedResponse<GullakAccountResponse>>> {
    let (skip, limit) = query.pagination.params();
    let filter = GullakAccountFilter {
        user_id: query.user_id,
        status: query.status,
        ..GullakAccountFilter::new(skip, limit)
    };

    let mut pool_conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let mut repo = GullakAccounts::new(&mut pool_conn);
    let accounts = repo.list(&filter).await?;
    let total_count = repo.count(&filter).await?;

    Ok(Json(PaginatedResponse::new(
        accounts.into_iter().map(Into::into).collect(),
        total_count,
        skip,
        limit,
    )))
}

#[utoipa::path(
    post,
    path = "/api/admin/gullak/autopay",
    tag = "admin",
    summary = "Run autopay now",
    description = "Charges every plan due today, exactly as the scheduled sweep does.",
    responses(
        (status = 200, description = "Sweep outcome", body = SweepReport),
        (status = 403, description = "Admins only"),
    ),
    security(
        ("BearerAuth" = []),
        ("CookieAuth" = [])
    )
)]
#[tracing::instrument(skip_all)]
pub async fn trigger_autopay(
    State(state): State<AppState>,
    _: RequiresPermission<resource::Gullak, operation::SystemAccess>,
) -> Result<Json<SweepReport>> {
    let report = run_autopay_sweep(&state.db, Utc::now().date_naive()).await?;
    Ok(Json(report))
}

#[utoipa::path(
    post,
    path = "/api/admin/market-rates/refresh",
    tag = "admin",
    summary = "Refresh market rates",
    description = "Queries the provider chain immediately and records a new snapshot.",
    responses(
        (status = 200, description = "The new snapshot", body = MarketRateResponse),
        (status = 403, description = "Admins only"),
    ),
    security(
        ("BearerAuth" = []),
        ("CookieAuth" = [])
    )
)]
#[tracing::instrument(skip_all)]
pub async fn refresh_rates(
    State(state): State<AppState>,
    _: RequiresPermission<resource::MarketRates, operation::SystemAccess>,
) -> Result<Json<MarketRateResponse>> {
    let rate = state.rate_fetcher.update_rates(&state.db).await?;
    state.cache.invalidate_rates().await;

    Ok(Json(rate.into()))
}
