use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use rust_decimal::Decimal;
use sqlx::PgConnection;

use crate::{
    AppState,
    api::models::cart::{CartClearResponse, CartItemCreate, CartItemResponse, CartItemUpdate, CartResponse},
    auth::permissions::{RequiresPermission, operation, resource},
    db::{
        handlers::{Cart, MarketRates, Products, Repository, cart::CartFilter},
        models::{
            cart::{CartItemCreateDBRequest, CartItemDBResponse, CartItemUpdateDBRequest},
            market_rates::MarketRateDBResponse,
            products::ProductDBResponse,
        },
    },
    errors::{Error, Result},
    pricing::{PriceCalculator, checked_sum},
    types::{CartItemId, UserId},
};

/// A user's cart lines joined with their products, in the order they were added.
pub(crate) async fn load_cart_lines(conn: &mut PgConnection, user_id: UserId) -> Result<Vec<(CartItemDBResponse, ProductDBResponse)>> {
    let items = Cart::new(conn).list(&CartFilter { user_id }).await?;
    let mut products = Products::new(conn)
        .get_bulk(items.iter().map(|item| item.product_id).collect())
        .await?;

    Ok(items
        .into_iter()
        .filter_map(|item| products.remove(&item.product_id).map(|product| (item, product)))
        .collect())
}

/// Price every line at `rate`. An empty cart needs no rate.
pub(crate) fn price_cart(
    calculator: &PriceCalculator,
    lines: Vec<(CartItemDBResponse, ProductDBResponse)>,
    rate: Option<&MarketRateDBResponse>,
) -> Result<CartResponse> {
    if lines.is_empty() {
        return Ok(CartResponse {
            items: Vec::new(),
            subtotal: Decimal::ZERO,
            gst_amount: Decimal::ZERO,
            total: Decimal::ZERO,
            market_rate_id: None,
        });
    }

    let rate = rate.ok_or_else(|| Error::Conflict {
        message: "Prices are unavailable until market rates have been fetched".to_string(),
    })?;
    let rates = rate.rates();

    let items = lines
        .into_iter()
        .map(|(item, product)| -> Result<CartItemResponse> {
            let quote = calculator.quote_line(&product.pricing_input(), product.flat_price, item.quantity, &rates)?;
            Ok(CartItemResponse {
                id: item.id,
                product_id: product.id,
                product_name: product.name,
                material: product.material,
                jewelry_type: product.jewelry_type,
                image_url: product.image_url,
                quantity: item.quantity,
                stock: product.stock,
                unit_price: quote.unit_price,
                subtotal: quote.subtotal,
                gst_amount: quote.gst_amount,
                line_total: quote.total,
            })
        })
        .collect::<Result<Vec<CartItemResponse>>>()?;

    Ok(CartResponse {
        subtotal: checked_sum(items.iter().map(|i| i.subtotal))?,
        gst_amount: checked_sum(items.iter().map(|i| i.gst_amount))?,
        total: checked_sum(items.iter().map(|i| i.line_total))?,
        market_rate_id: Some(rate.id),
        items,
    })
}

async fn current_cart(state: &AppState, user_id: UserId) -> Result<CartResponse> {
    let mut pool_conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let lines = load_cart_lines(&mut pool_conn, user_id).await?;
    let rate = if lines.is_empty() {
        None
    } else {
        MarketRates::new(&mut pool_conn).latest().await?
    };

    price_cart(&state.calculator, lines, rate.as_ref())
}

/// Fetch a line only if it belongs to `user_id`; anyone else's line looks missing.
async fn owned_item(conn: &mut PgConnection, item_id: CartItemId, user_id: UserId) -> Result<CartItemDBResponse> {
    Cart::new(conn)
        .get_by_id(item_id)
        .await?
        .filter(|item| item.user_id == user_id)
        .ok_or_else(|| Error::NotFound {
            resource: "CartItem".to_string(),
            id: item_id.to_string(),
        })
}

fn check_quantity(quantity: i32) -> Result<()> {
    if quantity < 1 {
        return Err(Error::BadRequest {
            message: "Quantity must be at least 1".to_string(),
        });
    }
    Ok(())
}

#[utoipa::path(
    get,
    path = "/api/cart",
    tag = "cart",
    summary = "Get cart",
    responses(
        (status = 200, description = "Cart priced at the current rate", body = CartResponse),
        (status = 401, description = "Unauthorized"),
        (status = 409, description = "No market rate recorded yet"),
    ),
    security(
        ("BearerAuth" = []),
        ("CookieAuth" = [])
    )
)]
#[tracing::instrument(skip_all)]
pub async fn get_cart(State(state): State<AppState>, current_user: RequiresPermission<resource::Cart, operation::ReadOwn>) -> Result<Json<CartResponse>> {
    Ok(Json(current_cart(&state, current_user.id).await?))
}

#[utoipa::path(
    post,
    path = "/api/cart",
    tag = "cart",
    summary = "Add to cart",
    description = "Adding a product that is already in the cart increases its quantity.",
    request_body = CartItemCreate,
    responses(
        (status = 201, description = "Updated cart", body = CartResponse),
        (status = 400, description = "Invalid quantity"),
        (status = 404, description = "Product not found"),
        (status = 409, description = "Not enough stock"),
    ),
    security(
        ("BearerAuth" = []),
        ("CookieAuth" = [])
    )
)]
#[tracing::instrument(skip_all)]
pub async fn add_to_cart(
    State(state): State<AppState>,
    current_user: RequiresPermission<resource::Cart, operation::CreateOwn>,
    Json(create): Json<CartItemCreate>,
) -> Result<(StatusCode, Json<CartResponse>)> {
    check_quantity(create.quantity)?;

    {
        let mut pool_conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
        let product = Products::new(&mut pool_conn)
            .get_by_id(create.product_id)
            .await?
            .filter(|p| p.is_active)
            .ok_or_else(|| Error::NotFound {
                resource: "Product".to_string(),
                id: create.product_id.to_string(),
            })?;

        if create.quantity > product.stock {
            return Err(Error::Conflict {
                message: format!("Only {} of {} left in stock", product.stock, product.name),
            });
        }

        Cart::new(&mut pool_conn)
            .create(&CartItemCreateDBRequest {
                user_id: current_user.id,
                product_id: create.product_id,
                quantity: create.quantity,
            })
            .await?;
    }

    Ok((StatusCode::CREATED, Json(current_cart(&state, current_user.id).await?)))
}

#[utoipa::path(
    patch,
    path = "/api/cart/{item_id}",
    tag = "cart",
    summary = "Change quantity",
    request_body = CartItemUpdate,
    responses(
        (status = 200, description = "Updated cart", body = CartResponse),
        (status = 400, description = "Invalid quantity"),
        (status = 404, description = "Cart line not found"),
    ),
    params(
        ("item_id" = uuid::Uuid, Path, description = "Cart line ID")
    ),
    security(
        ("BearerAuth" = []),
        ("CookieAuth" = [])
    )
)]
#[tracing::instrument(skip_all)]
pub async fn update_cart_item(
    State(state): State<AppState>,
    Path(item_id): Path<CartItemId>,
    current_user: RequiresPermission<resource::Cart, operation::UpdateOwn>,
    Json(update): Json<CartItemUpdate>,
) -> Result<Json<CartResponse>> {
    check_quantity(update.quantity)?;

    {
        let mut pool_conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
        owned_item(&mut pool_conn, item_id, current_user.id).await?;
        Cart::new(&mut pool_conn)
            .update(item_id, &CartItemUpdateDBRequest { quantity: update.quantity })
            .await?;
    }

    Ok(Json(current_cart(&state, current_user.id).await?))
}

#[utoipa::path(
    delete,
    path = "/api/cart/{item_id}",
    tag = "cart",
    summary = "Remove from cart",
    responses(
        (status = 204, description = "Line removed"),
        (status = 404, description = "Cart line not found"),
    ),
    params(
        ("item_id" = uuid::Uuid, Path, description = "Cart line ID")
    ),
    security(
        ("BearerAuth" = []),
        ("CookieAuth" = [])
    )
)]
#[tracing::instrument(skip_all)]
pub async fn remove_cart_item(
    State(state): State<AppState>,
    Path(item_id): Path<CartItemId>,
    current_user: RequiresPermission<resource::Cart, operation::DeleteOwn>,
) -> Result<StatusCode> {
    let mut pool_conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    owned_item(&mut pool_conn, item_id, current_user.id).await?;
    Cart::new(&mut pool_conn).delete(item_id).await?;

    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    delete,
    path = "/api/cart",
    tag = "cart",
    summary = "Empty cart",
    responses(
        (status = 200, description = "Number of lines removed", body = CartClearResponse),
    ),
    security(
        ("BearerAuth" = []),
        ("CookieAuth" = [])
    )
)]
#[tracing::instrument(skip_all)]
pub async fn clear_cart(
    State(state): State<AppState>,
    current_user: RequiresPermission<resource::Cart, operation::DeleteOwn>,
) -> Result<Json<CartClearResponse>> {
    let mut pool_conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let removed = Cart::new(&mut pool_conn).clear(current_user.id).await?;

    Ok(Json(CartClearResponse { removed }))
}
