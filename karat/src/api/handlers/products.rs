use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use rust_decimal::Decimal;

use super::market_rates::load_current_rate;
use crate::{
    AppState,
    api::models::{
        pagination::PaginatedResponse,
        products::{ListProductsQuery, ProductCreate, ProductResponse, ProductUpdate},
        users::CurrentUser,
    },
    auth::permissions::{RequiresPermission, operation, resource},
    db::{
        handlers::{Products, Repository, products::ProductFilter},
        models::products::{ProductCreateDBRequest, ProductDBResponse, ProductUpdateDBRequest},
    },
    errors::{Error, Result},
    rates::MetalRates,
    types::ProductId,
};

fn not_found(id: ProductId) -> Error {
    Error::NotFound {
        resource: "Product".to_string(),
        id: id.to_string(),
    }
}

/// Reject negative quantities before they reach the database.
fn check_amounts(amounts: &[(&str, Option<Decimal>)], stock: Option<i32>) -> Result<()> {
    if let Some((field, _)) = amounts.iter().find(|(_, v)| v.is_some_and(|v| v < Decimal::ZERO)) {
        return Err(Error::BadRequest {
            message: format!("{field} must not be negative"),
        });
    }
    if stock.is_some_and(|s| s < 0) {
        return Err(Error::BadRequest {
            message: "stock must not be negative".to_string(),
        });
    }
    Ok(())
}

async fn current_rates(state: &AppState) -> Result<Option<MetalRates>> {
    Ok(load_current_rate(state).await?.map(|rate| rate.rates()))
}

fn priced(state: &AppState, product: ProductDBResponse, rates: Option<&MetalRates>) -> ProductResponse {
    ProductResponse::priced(product, &state.calculator, rates)
}

#[utoipa::path(
    get,
    path = "/api/products",
    tag = "products",
    summary = "List products",
    description = "Active products priced at the current market rate. Admins may pass `include_inactive=true`.",
    params(ListProductsQuery),
    responses(
        (status = 200, description = "Paginated products", body = PaginatedResponse<ProductResponse>),
        (status = 500, description = "Internal server error")
    )
)]
#[tracing::instrument(skip_all)]
pub async fn list_products(
    State(state): State<AppState>,
    current_user: Option<CurrentUser>,
    Query(query): Query<ListProductsQuery>,
) -> Result<Json<PaginatedResponse<ProductResponse>>> {
    let include_inactive = query.include_inactive.unwrap_or(false) && current_user.as_ref().is_some_and(CurrentUser::is_admin);

    // Only the public view is cached
    let cache_key = (!include_inactive).then(|| query.cache_key());
    if let Some(key) = &cache_key
        && let Some(page) = state.cache.product_listing(key).await
    {
        return Ok(Json((*page).clone()));
    }

    let read_at = state.cache.generation();
    let (skip, limit) = query.pagination.params();
    let filter = ProductFilter {
        category_id: query.category_id,
        search: query.search.map(|s| s.trim().to_string()).filter(|s| !s.is_empty()),
        featured: query.featured,
        include_inactive,
        ..ProductFilter::new(skip, limit)
    };

    let (products, total_count) = {
        let mut pool_conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
        let mut repo = Products::new(&mut pool_conn);
        (repo.list(&filter).await?, repo.count(&filter).await?)
    };

    let rates = current_rates(&state).await?;
    let data = products.into_iter().map(|p| priced(&state, p, rates.as_ref())).collect();
    let page = PaginatedResponse::new(data, total_count, skip, limit);

    if let Some(key) = cache_key {
        state.cache.set_product_listing(key, Arc::new(page.clone()), read_at).await;
    }

    Ok(Json(page))
}

#[utoipa::path(
    get,
    path = "/api/products/{product_id}",
    tag = "products",
    summary = "Get product",
    responses(
        (status = 200, description = "Product with its price breakdown", body = ProductResponse),
        (status = 404, description = "Product not found or inactive"),
    ),
    params(
        ("product_id" = uuid::Uuid, Path, description = "Product ID")
    )
)]
#[tracing::instrument(skip_all)]
pub async fn get_product(
    State(state): State<AppState>,
    Path(product_id): Path<ProductId>,
    current_user: Option<CurrentUser>,
) -> Result<Json<ProductResponse>> {
    let product = {
        let mut pool_conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
        Products::new(&mut pool_conn).get_by_id(product_id).await?
    };

    let visible = |p: &ProductDBResponse| p.is_active || current_user.as_ref().is_some_and(CurrentUser::is_admin);
    let product = product.filter(visible).ok_or_else(|| not_found(product_id))?;

    let rates = current_rates(&state).await?;
    Ok(Json(priced(&state, product, rates.as_ref())))
}

#[utoipa::path(
    post,
    path = "/api/products",
    tag = "products",
    summary = "Create product",
    request_body = ProductCreate,
    responses(
        (status = 201, description = "Product created", body = ProductResponse),
        (status = 400, description = "Invalid request"),
        (status = 403, description = "Admins only"),
    ),
    security(
        ("BearerAuth" = []),
        ("CookieAuth" = [])
    )
)]
#[tracing::instrument(skip_all)]
pub async fn create_product(
    State(state): State<AppState>,
    _: RequiresPermission<resource::Products, operation::CreateAll>,
    Json(create): Json<ProductCreate>,
) -> Result<(StatusCode, Json<ProductResponse>)> {
    let request = ProductCreateDBRequest::from(create);
    if request.name.is_empty() || request.material.is_empty() {
        return Err(Error::BadRequest {
            message: "Name and material are required".to_string(),
        });
    }
    check_amounts(
        &[
            ("weight", Some(request.weight)),
            ("making_charges", Some(request.making_charges)),
            ("gemstones_cost", Some(request.gemstones_cost)),
            ("diamonds_cost", Some(request.diamonds_cost)),
            ("fixed_rate_per_gram", request.fixed_rate_per_gram),
            ("flat_price", request.flat_price),
        ],
        Some(request.stock),
    )?;

    let product = {
        let mut pool_conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
        Products::new(&mut pool_conn).create(&request).await?
    };
    state.cache.invalidate_products().await;

    let rates = current_rates(&state).await?;
    Ok((StatusCode::CREATED, Json(priced(&state, product, rates.as_ref()))))
}

#[utoipa::path(
    patch,
    path = "/api/products/{product_id}",
    tag = "products",
    summary = "Update product",
    request_body = ProductUpdate,
    responses(
        (status = 200, description = "Product updated", body = ProductResponse),
        (status = 400, description = "Invalid request"),
        (status = 403, description = "Admins only"),
        (status = 404, description = "Product not found"),
    ),
    params(
        ("product_id" = uuid::Uuid, Path, description = "Product ID")
    ),
    security(
        ("BearerAuth" = []),
        ("CookieAuth" = [])
    )
)]
#[tracing::instrument(skip_all)]
pub async fn update_product(
    State(state): State<AppState>,
    Path(product_id): Path<ProductId>,
    _: RequiresPermission<resource::Products, operation::UpdateAll>,
    Json(update): Json<ProductUpdate>,
) -> Result<Json<ProductResponse>> {
    let request = ProductUpdateDBRequest::from(update);
    if request.name.as_deref().is_some_and(str::is_empty) || request.material.as_deref().is_some_and(str::is_empty) {
        return Err(Error::BadRequest {
            message: "Name and material must not be empty".to_string(),
        });
    }
    check_amounts(
        &[
            ("weight", request.weight),
            ("making_charges", request.making_charges),
            ("gemstones_cost", request.gemstones_cost),
            ("diamonds_cost", request.diamonds_cost),
            ("fixed_rate_per_gram", request.fixed_rate_per_gram),
            ("flat_price", request.flat_price),
        ],
        request.stock,
    )?;

    let product = {
        let mut pool_conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
        Products::new(&mut pool_conn).update(product_id, &request).await?
    };
    state.cache.invalidate_products().await;

    let rates = current_rates(&state).await?;
    Ok(Json(priced(&state, product, rates.as_ref())))
}

#[utoipa::path(
    delete,
    path = "/api/products/{product_id}",
    tag = "products",
    summary = "Delete product",
    description = "Removes the product from carts. Past order lines keep their name and price.",
    responses(
        (status = 204, description = "Product deleted"),
        (status = 403, description = "Admins only"),
        (status = 404, description = "Product not found"),
    ),
    params(
        ("product_id" = uuid::Uuid, Path, description = "Product ID")
    ),
    security(
        ("BearerAuth" = []),
        ("CookieAuth" = [])
    )
)]
#[tracing::instrument(skip_all)]
pub async fn delete_product(
    State(state): State<AppState>,
    Path(product_id): Path<ProductId>,
    _: RequiresPermission<resource::Products, operation::DeleteAll>,
) -> Result<StatusCode> {
    let deleted = {
        let mut pool_conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
        Products::new(&mut pool_conn).delete(product_id).await?
    };

    if deleted {
        state.cache.invalidate_products().await;
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(not_found(product_id))
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        api::models::{pagination::PaginatedResponse, products::ProductResponse, users::Role},
        db::{
            handlers::{Products, Repository},
            models::products::ProductUpdateDBRequest,
        },
        test_utils::*,
    };
    use axum::http::StatusCode;
    use rust_decimal::Decimal;
    use serde_json::{Value, json};
    use sqlx::PgPool;

    #[sqlx::test]
    #[test_log::test]
    async fn test_list_embeds_live_prices(pool: PgPool) {
        let app = create_test_app(pool.clone()).await;
        create_test_rate(&pool, Decimal::from(7200), Decimal::from(90)).await;
        create_test_product(&pool, "Kada", "22K Gold").await;

        let response = app.get("/api/products").await;
        response.assert_status_ok();
        let page: PaginatedResponse<ProductResponse> = response.json();
        assert_eq!(page.total_count, 1);

        // 10 g at 6600 with no extras, plus 3% GST
        let product = &page.data[0];
        let pricing = product.pricing.unwrap();
        assert_eq!(pricing.subtotal, Decimal::from(66_000));
        assert_eq!(product.price, Some(Decimal::from(67_980)));
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_prices_absent_without_rate(pool: PgPool) {
        let app = create_test_app(pool.clone()).await;
        let product = create_test_product(&pool, "Anklet", "Sterling Silver").await;

        let fetched: ProductResponse = app.get(&format!("/api/products/{}", product.id)).await.json();
        assert!(fetched.pricing.is_none());
        assert!(fetched.price.is_none());
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_list_filters(pool: PgPool) {
        let app = create_test_app(pool.clone()).await;
        let rings = create_test_category(&pool, "Rings").await;
        create_test_product_in(&pool, "Solitaire Ring", "18K Gold", Some(rings.id)).await;
        create_test_product_in(&pool, "Band Ring", "22K Gold", Some(rings.id)).await;
        create_test_product(&pool, "Temple Necklace", "22K Gold").await;

        let body: Value = app.get(&format!("/api/products?category_id={}", rings.id)).await.json();
        assert_eq!(body["total_count"], 2);

        let body: Value = app.get("/api/products?search=necklace").await.json();
        assert_eq!(body["total_count"], 1);
        assert_eq!(body["data"][0]["name"], "Temple Necklace");

        let body: Value = app.get("/api/products?limit=1&skip=1").await.json();
        assert_eq!(body["total_count"], 3);
        assert_eq!(body["data"].as_array().unwrap().len(), 1);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_inactive_products_hidden_from_shoppers(pool: PgPool) {
        let app = create_test_app(pool.clone()).await;
        let admin = create_test_admin_user(&pool).await;
        let product = create_test_product(&pool, "Retired Bangle", "22K Gold").await;
        {
            let mut conn = pool.acquire().await.unwrap();
            Products::new(&mut conn)
                .update(
                    product.id,
                    &ProductUpdateDBRequest {
                        is_active: Some(false),
                        ..Default::default()
                    },
                )
                .await
                .unwrap();
        }

        app.get(&format!("/api/products/{}", product.id))
            .await
            .assert_status(StatusCode::NOT_FOUND);
        let body: Value = app.get("/api/products?include_inactive=true").await.json();
        assert_eq!(body["total_count"], 0);

        let (name, value) = auth_header(&admin);
        app.get(&format!("/api/products/{}", product.id))
            .add_header(name.clone(), value.clone())
            .await
            .assert_status_ok();
        let body: Value = app
            .get("/api/products?include_inactive=true")
            .add_header(name, value)
            .await
            .json();
        assert_eq!(body["total_count"], 1);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_admin_writes_invalidate_listing_cache(pool: PgPool) {
        let app = create_test_app(pool.clone()).await;
        let admin = create_test_admin_user(&pool).await;
        let (name, value) = auth_header(&admin);

        let body: Value = app.get("/api/products").await.json();
        assert_eq!(body["total_count"], 0);

        let response = app
            .post("/api/products")
            .add_header(name.clone(), value.clone())
            .json(&json!({
                "name": "Jhumka",
                "material": "22K Gold",
                "weight": "8.5",
                "making_charges": "1200",
                "stock": 4
            }))
            .await;
        response.assert_status(StatusCode::CREATED);
        let created: ProductResponse = response.json();

        let body: Value = app.get("/api/products").await.json();
        assert_eq!(body["total_count"], 1);

        let response = app
            .patch(&format!("/api/products/{}", created.id))
            .add_header(name.clone(), value.clone())
            .json(&json!({"stock": 9, "is_featured": true}))
            .await;
        response.assert_status_ok();
        let updated: ProductResponse = response.json();
        assert_eq!(updated.stock, 9);
        assert!(updated.is_featured);

        let body: Value = app.get("/api/products?featured=true").await.json();
        assert_eq!(body["total_count"], 1);

        app.delete(&format!("/api/products/{}", created.id))
            .add_header(name, value)
            .await
            .assert_status(StatusCode::NO_CONTENT);
        let body: Value = app.get("/api/products").await.json();
        assert_eq!(body["total_count"], 0);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_create_validation_and_permissions(pool: PgPool) {
        let app = create_test_app(pool.clone()).await;
        let admin = create_test_admin_user(&pool).await;
        let customer = create_test_user(&pool, Role::Customer).await;

        let (name, value) = auth_header(&customer);
        app.post("/api/products")
            .add_header(name, value)
            .json(&json!({"name": "Ring", "material": "22K Gold", "weight": "2"}))
            .await
            .assert_status(StatusCode::FORBIDDEN);

        let (name, value) = auth_header(&admin);
        app.post("/api/products")
            .add_header(name.clone(), value.clone())
            .json(&json!({"name": "Ring", "material": "22K Gold", "weight": "-2"}))
            .await
            .assert_status(StatusCode::BAD_REQUEST);
        app.post("/api/products")
            .add_header(name, value)
            .json(&json!({"name": "  ", "material": "22K Gold", "weight": "2"}))
            .await
            .assert_status(StatusCode::BAD_REQUEST);
    }
}
