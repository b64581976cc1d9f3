use axum::{
    Json,
    extract::{Query, State},
};

use crate::{
    AppState,
    api::models::{
        market_rates::MarketRateResponse,
        pagination::{PaginatedResponse, Pagination},
    },
    db::{handlers::MarketRates, models::market_rates::MarketRateDBResponse},
    errors::{Error, Result},
};

/// Latest rate snapshot, served from the cache when warm.
pub(crate) async fn load_current_rate(state: &AppState) -> Result<Option<MarketRateDBResponse>> {
    if let Some(rate) = state.cache.current_rate().await {
        return Ok(Some(rate));
    }

    let read_at = state.cache.generation();
    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let latest = MarketRates::new(&mut conn).latest().await?;
    if let Some(rate) = &latest {
        state.cache.set_current_rate(rate.clone(), read_at).await;
    }
    Ok(latest)
}

/// Current per-gram gold and silver rates
#[utoipa::path(
    get,
    path = "/api/market-rates",
    tag = "market_rates",
    responses(
        (status = 200, description = "Most recent rate snapshot", body = MarketRateResponse),
        (status = 404, description = "No rate has been fetched yet"),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn get_current_rate(State(state): State<AppState>) -> Result<Json<MarketRateResponse>> {
    let rate = load_current_rate(&state).await?.ok_or_else(|| Error::NotFound {
        resource: "MarketRate".to_string(),
        id: "latest".to_string(),
    })?;

    Ok(Json(rate.into()))
}

/// Rate snapshots, newest first
#[utoipa::path(
    get,
    path = "/api/market-rates/history",
    tag = "market_rates",
    params(Pagination),
    responses(
        (status = 200, description = "Paginated rate history", body = PaginatedResponse<MarketRateResponse>),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn list_rate_history(
    State(state): State<AppState>,
    Query(pagination): Query<Pagination>,
) -> Result<Json<PaginatedResponse<MarketRateResponse>>> {
    let (skip, limit) = pagination.params();

    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let mut repo = MarketRates::new(&mut conn);
    let rates = repo.list(skip, limit).await?;
    let total_count = repo.count().await?;

    Ok(Json(PaginatedResponse::new(
        rates.into_iter().map(Into::into).collect(),
        total_count,
        skip,
        limit,
    )))
}

#[cfg(test)]
mod tests {
    use crate::{api::models::market_rates::MarketRateResponse, test_utils::*};
    use axum::http::StatusCode;
    use rust_decimal::Decimal;
    use serde_json::Value;
    use sqlx::PgPool;

    #[sqlx::test]
    #[test_log::test]
    async fn test_current_rate_404_until_first_fetch(pool: PgPool) {
        let app = create_test_app(pool.clone()).await;

        app.get("/api/market-rates").await.assert_status(StatusCode::NOT_FOUND);

        create_test_rate(&pool, Decimal::from(7200), Decimal::from(90)).await;

        let response = app.get("/api/market-rates").await;
        response.assert_status_ok();
        let rate: MarketRateResponse = response.json();
        assert_eq!(rate.gold_24k, Decimal::from(7200));
        assert_eq!(rate.silver, Decimal::from(90));
        assert_eq!(rate.currency, "INR");
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_rates_serialize_as_decimal_strings(pool: PgPool) {
        let app = create_test_app(pool.clone()).await;
        create_test_rate(&pool, Decimal::new(720050, 2), Decimal::from(90)).await;

        let body: Value = app.get("/api/market-rates").await.json();
        assert_eq!(body["gold_24k"], "7200.50");
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_history_is_paginated(pool: PgPool) {
        let app = create_test_app(pool.clone()).await;
        for i in 0..3 {
            create_test_rate(&pool, Decimal::from(7000 + i), Decimal::from(90)).await;
        }

        let response = app.get("/api/market-rates/history?limit=2").await;
        response.assert_status_ok();
        let body: Value = response.json();
        assert_eq!(body["total_count"], 3);
        assert_eq!(body["data"].as_array().unwrap().len(), 2);
        assert_eq!(body["data"][0]["gold_24k"], "7002.00");
    }
}
