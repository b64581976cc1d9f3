use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use tracing::info;

use super::cart::{load_cart_lines, price_cart};
use crate::{
    AppState,
    api::models::{
        orders::{CheckoutRequest, ListOrdersQuery, OrderResponse},
        pagination::PaginatedResponse,
        users::CurrentUser,
    },
    auth::permissions::{RequiresPermission, can_read_own_resource, operation, resource},
    db::{
        handlers::{Cart, MarketRates, Orders, Products, Repository, orders::OrderFilter},
        models::orders::{OrderCreateDBRequest, OrderItemCreateDBRequest},
    },
    errors::{Error, Result},
    types::{OrderId, Resource, abbrev_uuid},
};

#[utoipa::path(
    post,
    path = "/api/orders",
    tag = "orders",
    summary = "Checkout",
    description = "Prices the cart at the current market rate, reserves stock and empties the cart.",
    request_body = CheckoutRequest,
    responses(
        (status = 201, description = "Order placed", body = OrderResponse),
        (status = 400, description = "Empty cart or missing shipping address"),
        (status = 409, description = "Insufficient stock, inactive product or no market rate"),
    ),
    security(
        ("BearerAuth" = []),
        ("CookieAuth" = [])
    )
)]
#[tracing::instrument(skip_all)]
pub async fn checkout(
    State(state): State<AppState>,
    current_user: RequiresPermission<resource::Orders, operation::CreateOwn>,
    Json(request): Json<CheckoutRequest>,
) -> Result<(StatusCode, Json<OrderResponse>)> {
    let shipping_address = request.shipping_address.trim();
    if shipping_address.is_empty() {
        return Err(Error::BadRequest {
            message: "Shipping address is required".to_string(),
        });
    }

    let mut tx = state.db.begin().await.map_err(|e| Error::Database(e.into()))?;

    let lines = load_cart_lines(&mut tx, current_user.id).await?;
    if lines.is_empty() {
        return Err(Error::BadRequest {
            message: "Cart is empty".to_string(),
        });
    }
    if let Some((_, product)) = lines.iter().find(|(_, product)| !product.is_active) {
        return Err(Error::Conflict {
            message: format!("{} is no longer available", product.name),
        });
    }

    let rate = MarketRates::new(&mut tx).latest().await?;
    let cart = price_cart(&state.calculator, lines, rate.as_ref())?;

    for line in &cart.items {
        if !Products::new(&mut tx).decrement_stock(line.product_id, line.quantity).await? {
            return Err(Error::Conflict {
                message: format!("Not enough stock for {}", line.product_name),
            });
        }
    }

    let order = Orders::new(&mut tx)
        .create(&OrderCreateDBRequest {
            user_id: current_user.id,
            subtotal: cart.subtotal,
            gst_amount: cart.gst_amount,
            total_amount: cart.total,
            shipping_address: shipping_address.to_string(),
            payment_method: request.payment_method,
            market_rate_id: cart.market_rate_id,
            items: cart
                .items
                .iter()
                .map(|line| OrderItemCreateDBRequest {
                    product_id: line.product_id,
                    product_name: line.product_name.clone(),
                    quantity: line.quantity,
                    unit_price: line.unit_price,
                    line_total: line.line_total,
                })
                .collect(),
        })
        .await?;
    let items = Orders::new(&mut tx).get_items(order.id).await?;
    Cart::new(&mut tx).clear(current_user.id).await?;

    tx.commit().await.map_err(|e| Error::Database(e.into()))?;
    state.cache.invalidate_products().await;

    info!(
        order_id = %abbrev_uuid(&order.id),
        user_id = %abbrev_uuid(&current_user.id),
        total = %order.total_amount,
        "Order placed"
    );

    Ok((StatusCode::CREATED, Json(OrderResponse::new(order, items))))
}

#[utoipa::path(
    get,
    path = "/api/orders",
    tag = "orders",
    summary = "List my orders",
    params(ListOrdersQuery),
    responses(
        (status = 200, description = "The caller's orders, newest first", body = PaginatedResponse<OrderResponse>),
        (status = 401, description = "Unauthorized"),
    ),
    security(
        ("BearerAuth" = []),
        ("CookieAuth" = [])
    )
)]
#[tracing::instrument(skip_all)]
pub async fn list_orders(
    State(state): State<AppState>,
    Query(query): Query<ListOrdersQuery>,
    current_user: RequiresPermission<resource::Orders, operation::ReadOwn>,
) -> Result<Json<PaginatedResponse<OrderResponse>>> {
    let (skip, limit) = query.pagination.params();
    let filter = OrderFilter {
        user_id: Some(current_user.id),
        status: query.status,
        ..OrderFilter::new(skip, limit)
    };

    let mut pool_conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    Ok(Json(list_with_items(&mut pool_conn, &filter).await?))
}

/// A page of orders with their line items attached.
pub(crate) async fn list_with_items(conn: &mut sqlx::PgConnection, filter: &OrderFilter) -> Result<PaginatedResponse<OrderResponse>> {
    let mut repo = Orders::new(conn);
    let orders = repo.list(filter).await?;
    let total_count = repo.count(filter).await?;

    let ids: Vec<OrderId> = orders.iter().map(|o| o.id).collect();
    let mut items = repo.get_items_bulk(&ids).await?;

    let data = orders
        .into_iter()
        .map(|order| {
            let order_items = items.remove(&order.id).unwrap_or_default();
            OrderResponse::new(order, order_items)
        })
        .collect();

    Ok(PaginatedResponse::new(data, total_count, filter.skip, filter.limit))
}

#[utoipa::path(
    get,
    path = "/api/orders/{order_id}",
    tag = "orders",
    summary = "Get order",
    responses(
        (status = 200, description = "Order with its items", body = OrderResponse),
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
pub async fn get_order(State(state): State<AppState>, Path(order_id): Path<OrderId>, current_user: CurrentUser) -> Result<Json<OrderResponse>> {
    let mut pool_conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let mut repo = Orders::new(&mut pool_conn);

    // Other customers' orders are indistinguishable from missing ones
    let order = repo
        .get_by_id(order_id)
        .await?
        .filter(|order| can_read_own_resource(&current_user, Resource::Orders, order.user_id))
        .ok_or_else(|| Error::NotFound {
            resource: "Order".to_string(),
            id: order_id.to_string(),
        })?;
    let items = repo.get_items(order.id).await?;

    Ok(Json(OrderResponse::new(order, items)))
}

#[cfg(test)]
mod tests {
    use crate::{
        api::models::{
            cart::CartResponse,
            orders::OrderResponse,
            pagination::PaginatedResponse,
            products::ProductResponse,
            users::Role,
        },
        db::models::orders::OrderStatus,
        test_utils::*,
    };
    use axum::http::StatusCode;
    use rust_decimal::Decimal;
    use serde_json::json;
    use sqlx::PgPool;

    #[sqlx::test]
    #[test_log::test]
    async fn test_checkout_places_order_and_empties_cart(pool: PgPool) {
        let app = create_test_app(pool.clone()).await;
        let user = create_test_user(&pool, Role::Customer).await;
        create_test_rate(&pool, Decimal::from(7200), Decimal::from(90)).await;
        let ring = create_test_product(&pool, "Solitaire Ring", "22K Gold").await;
        let anklet = create_test_product(&pool, "Payal", "Sterling Silver").await;
        add_to_cart(&pool, user.id, ring.id, 2).await;
        add_to_cart(&pool, user.id, anklet.id, 1).await;

        let (name, value) = auth_header(&user);
        let response = app
            .post("/api/orders")
            .add_header(name.clone(), value.clone())
            .json(&json!({"shipping_address": "12 MG Road, Pune"}))
            .await;
        response.assert_status(StatusCode::CREATED);

        let order: OrderResponse = response.json();
        assert_eq!(order.status, OrderStatus::Pending);
        assert_eq!(order.payment_method, "cod");
        assert_eq!(order.items.len(), 2);
        // 2 x 66000 + 900, plus 3% GST
        assert_eq!(order.subtotal, Decimal::from(132_900));
        assert_eq!(order.gst_amount, Decimal::from(3987));
        assert_eq!(order.total_amount, Decimal::from(136_887));
        assert!(order.market_rate_id.is_some());

        let cart: CartResponse = app.get("/api/cart").add_header(name, value).await.json();
        assert!(cart.items.is_empty());

        let product: ProductResponse = app.get(&format!("/api/products/{}", ring.id)).await.json();
        assert_eq!(product.stock, 8);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_checkout_rejections(pool: PgPool) {
        let app = create_test_app(pool.clone()).await;
        let user = create_test_user(&pool, Role::Customer).await;
        let (name, value) = auth_header(&user);

        app.post("/api/orders")
            .add_header(name.clone(), value.clone())
            .json(&json!({"shipping_address": "12 MG Road, Pune"}))
            .await
            .assert_status(StatusCode::BAD_REQUEST);

        let ring = create_test_product(&pool, "Solitaire Ring", "22K Gold").await;
        add_to_cart(&pool, user.id, ring.id, 1).await;

        app.post("/api/orders")
            .add_header(name.clone(), value.clone())
            .json(&json!({"shipping_address": "  "}))
            .await
            .assert_status(StatusCode::BAD_REQUEST);

        // Priced carts need a rate
        app.post("/api/orders")
            .add_header(name, value)
            .json(&json!({"shipping_address": "12 MG Road, Pune"}))
            .await
            .assert_status(StatusCode::CONFLICT);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_checkout_rolls_back_when_stock_runs_out(pool: PgPool) {
        let app = create_test_app(pool.clone()).await;
        let user = create_test_user(&pool, Role::Customer).await;
        create_test_rate(&pool, Decimal::from(7200), Decimal::from(90)).await;
        let plenty = create_test_product(&pool, "Kada", "22K Gold").await;
        let scarce = create_test_product(&pool, "Jhumka", "18K Gold").await;
        add_to_cart(&pool, user.id, plenty.id, 1).await;
        add_to_cart(&pool, user.id, scarce.id, 11).await;

        let (name, value) = auth_header(&user);
        app.post("/api/orders")
            .add_header(name.clone(), value.clone())
            .json(&json!({"shipping_address": "12 MG Road, Pune"}))
            .await
            .assert_status(StatusCode::CONFLICT);

        let product: ProductResponse = app.get(&format!("/api/products/{}", plenty.id)).await.json();
        assert_eq!(product.stock, 10);
        let cart: CartResponse = app.get("/api/cart").add_header(name, value).await.json();
        assert_eq!(cart.items.len(), 2);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_orders_are_private(pool: PgPool) {
        let app = create_test_app(pool.clone()).await;
        let buyer = create_test_user(&pool, Role::Customer).await;
        let other = create_test_user(&pool, Role::Customer).await;
        let admin = create_test_admin_user(&pool).await;
        create_test_rate(&pool, Decimal::from(7200), Decimal::from(90)).await;
        let ring = create_test_product(&pool, "Solitaire Ring", "22K Gold").await;
        add_to_cart(&pool, buyer.id, ring.id, 1).await;

        let (name, value) = auth_header(&buyer);
        let order: OrderResponse = app
            .post("/api/orders")
            .add_header(name.clone(), value.clone())
            .json(&json!({"shipping_address": "12 MG Road, Pune", "payment_method": "upi"}))
            .await
            .json();
        assert_eq!(order.payment_method, "upi");

        let mine: PaginatedResponse<OrderResponse> = app.get("/api/orders").add_header(name.clone(), value.clone()).await.json();
        assert_eq!(mine.total_count, 1);
        assert_eq!(mine.data[0].items.len(), 1);

        app.get(&format!("/api/orders/{}", order.id))
            .add_header(name, value)
            .await
            .assert_status_ok();

        let (other_name, other_value) = auth_header(&other);
        let theirs: PaginatedResponse<OrderResponse> = app
            .get("/api/orders")
            .add_header(other_name.clone(), other_value.clone())
            .await
            .json();
        assert_eq!(theirs.total_count, 0);
        app.get(&format!("/api/orders/{}", order.id))
            .add_header(other_name, other_value)
            .await
            .assert_status(StatusCode::NOT_FOUND);

        let (admin_name, admin_value) = auth_header(&admin);
        app.get(&format!("/api/orders/{}", order.id))
            .add_header(admin_name, admin_value)
            .await
            .assert_status_ok();
    }
}
