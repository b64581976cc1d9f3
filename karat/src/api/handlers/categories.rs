use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};

use crate::{
    AppState,
    api::models::categories::{CategoryCreate, CategoryResponse, CategoryUpdate},
    auth::permissions::{RequiresPermission, operation, resource},
    db::{
        handlers::{Categories, Repository, categories::CategoryFilter},
        models::categories::CategoryUpdateDBRequest,
    },
    errors::{Error, Result},
    types::CategoryId,
};

fn not_found(id: CategoryId) -> Error {
    Error::NotFound {
        resource: "Category".to_string(),
        id: id.to_string(),
    }
}

#[utoipa::path(
    get,
    path = "/api/categories",
    tag = "categories",
    summary = "List categories",
    responses(
        (status = 200, description = "All categories, alphabetical", body = Vec<CategoryResponse>),
        (status = 500, description = "Internal server error")
    )
)]
#[tracing::instrument(skip_all)]
pub async fn list_categories(State(state): State<AppState>) -> Result<Json<Vec<CategoryResponse>>> {
    let mut pool_conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let categories = Categories::new(&mut pool_conn).list(&CategoryFilter::default()).await?;

    Ok(Json(categories.into_iter().map(Into::into).collect()))
}

#[utoipa::path(
    get,
    path = "/api/categories/{category_id}",
    tag = "categories",
    summary = "Get category",
    responses(
        (status = 200, description = "Category details", body = CategoryResponse),
        (status = 404, description = "Category not found"),
    ),
    params(
        ("category_id" = uuid::Uuid, Path, description = "Category ID")
    )
)]
#[tracing::instrument(skip_all)]
pub async fn get_category(State(state): State<AppState>, Path(category_id): Path<CategoryId>) -> Result<Json<CategoryResponse>> {
    let mut pool_conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;

    match Categories::new(&mut pool_conn).get_by_id(category_id).await? {
        Some(category) => Ok(Json(category.into())),
        None => Err(not_found(category_id)),
    }
}

#[utoipa::path(
    post,
    path = "/api/categories",
    tag = "categories",
    summary = "Create category",
    request_body = CategoryCreate,
    responses(
        (status = 201, description = "Category created", body = CategoryResponse),
        (status = 400, description = "Invalid request"),
        (status = 403, description = "Admins only"),
        (status = 409, description = "Name or slug already in use"),
    ),
    security(
        ("BearerAuth" = []),
        ("CookieAuth" = [])
    )
)]
#[tracing::instrument(skip_all)]
pub async fn create_category(
    State(state): State<AppState>,
    _: RequiresPermission<resource::Categories, operation::CreateAll>,
    Json(create): Json<CategoryCreate>,
) -> Result<(StatusCode, Json<CategoryResponse>)> {
    let request = create.into_db_request();
    if request.name.is_empty() || request.slug.is_empty() {
        return Err(Error::BadRequest {
            message: "Category name must contain letters or digits".to_string(),
        });
    }

    let mut pool_conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let category = Categories::new(&mut pool_conn).create(&request).await?;

    Ok((StatusCode::CREATED, Json(category.into())))
}

#[utoipa::path(
    patch,
    path = "/api/categories/{category_id}",
    tag = "categories",
    summary = "Update category",
    request_body = CategoryUpdate,
    responses(
        (status = 200, description = "Category updated", body = CategoryResponse),
        (status = 403, description = "Admins only"),
        (status = 404, description = "Category not found"),
    ),
    params(
        ("category_id" = uuid::Uuid, Path, description = "Category ID")
    ),
    security(
        ("BearerAuth" = []),
        ("CookieAuth" = [])
    )
)]
#[tracing::instrument(skip_all)]
pub async fn update_category(
    State(state): State<AppState>,
    Path(category_id): Path<CategoryId>,
    _: RequiresPermission<resource::Categories, operation::UpdateAll>,
    Json(update): Json<CategoryUpdate>,
) -> Result<Json<CategoryResponse>> {
    let request = CategoryUpdateDBRequest::from(update);
    if request.slug.as_deref().is_some_and(str::is_empty) {
        return Err(Error::BadRequest {
            message: "Slug must contain letters or digits".to_string(),
        });
    }

    let mut pool_conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let category = Categories::new(&mut pool_conn).update(category_id, &request).await?;

    Ok(Json(category.into()))
}

#[utoipa::path(
    delete,
    path = "/api/categories/{category_id}",
    tag = "categories",
    summary = "Delete category",
    description = "Products in the category are kept and become uncategorized.",
    responses(
        (status = 204, description = "Category deleted"),
        (status = 403, description = "Admins only"),
        (status = 404, description = "Category not found"),
    ),
    params(
        ("category_id" = uuid::Uuid, Path, description = "Category ID")
    ),
    security(
        ("BearerAuth" = []),
        ("CookieAuth" = [])
    )
)]
#[tracing::instrument(skip_all)]
pub async fn delete_category(
    State(state): State<AppState>,
    Path(category_id): Path<CategoryId>,
    _: RequiresPermission<resource::Categories, operation::DeleteAll>,
) -> Result<StatusCode> {
    let mut pool_conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;

    if Categories::new(&mut pool_conn).delete(category_id).await? {
        state.cache.invalidate_products().await;
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(not_found(category_id))
    }
}
