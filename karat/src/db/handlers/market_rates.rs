//! Database repository for market rate snapshots.
//!
//! Snapshots are append-only, so this repository does not implement [`super::Repository`]: there
//! is nothing to update or delete. The current rate is the most recently inserted row.

use crate::db::{
    errors::Result,
    models::market_rates::{MarketRateCreateDBRequest, MarketRateDBResponse},
};
use crate::types::MarketRateId;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{FromRow, PgConnection};
use tracing::instrument;

#[derive(Debug, Clone, FromRow)]
struct MarketRate {
    pub id: MarketRateId,
    pub gold_24k: Decimal,
    pub gold_22k: Decimal,
    pub gold_18k: Decimal,
    pub silver: Decimal,
    pub currency: String,
    pub source: String,
    pub fetched_at: DateTime<Utc>,
}

impl From<MarketRate> for MarketRateDBResponse {
    fn from(r: MarketRate) -> Self {
        Self {
            id: r.id,
            gold_24k: r.gold_24k,
            gold_22k: r.gold_22k,
            gold_18k: r.gold_18k,
            silver: r.silver,
            currency: r.currency,
            source: r.source,
            fetched_at: r.fetched_at,
        }
    }
}

pub struct MarketRates<'c> {
    db: &'c mut PgConnection,
}

impl<'c> MarketRates<'c> {
    pub fn new(db: &'c mut PgConnection) -> Self {
        Self { db }
    }

    #[instrument(skip(self, request), fields(source = %request.source), err)]
    pub async fn create(&mut self, request: &MarketRateCreateDBRequest) -> Result<MarketRateDBResponse> {
        let rate = sqlx::query_as::<_, MarketRate>(
            r#"
            INSERT INTO market_rates (gold_24k, gold_22k, gold_18k, silver, currency, source)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING *
            "#,
        )
        .bind(request.gold_24k)
        .bind(request.gold_22k)
        .bind(request.gold_18k)
        .bind(request.silver)
        .bind(&request.currency)
        .bind(&request.source)
        .fetch_one(&mut *self.db)
        .await?;

        Ok(rate.into())
    }

    #[instrument(skip(self), err)]
    pub async fn get_by_id(&mut self, id: MarketRateId) -> Result<Option<MarketRateDBResponse>> {
        let rate = sqlx::query_as::<_, MarketRate>("SELECT * FROM market_rates WHERE id = $1")
            .bind(id)
            .fetch_optional(&mut *self.db)
            .await?;

        Ok(rate.map(Into::into))
    }

    /// The current rate, if one has ever been fetched.
    #[instrument(skip(self), err)]
    pub async fn latest(&mut self) -> Result<Option<MarketRateDBResponse>> {
        let rate = sqlx::query_as::<_, MarketRate>("SELECT * FROM market_rates ORDER BY fetched_at DESC, id DESC LIMIT 1")
            .fetch_optional(&mut *self.db)
            .await?;

        Ok(rate.map(Into::into))
    }

    /// Rate history, newest first.
    #[instrument(skip(self), err)]
    pub async fn list(&mut self, skip: i64, limit: i64) -> Result<Vec<MarketRateDBResponse>> {
        let rates = sqlx::query_as::<_, MarketRate>("SELECT * FROM market_rates ORDER BY fetched_at DESC, id DESC LIMIT $1 OFFSET $2")
            .bind(limit)
            .bind(skip)
            .fetch_all(&mut *self.db)
            .await?;

        Ok(rates.into_iter().map(Into::into).collect())
    }

    #[instrument(skip(self), err)]
    pub async fn count(&mut self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM market_rates")
            .fetch_one(&mut *self.db)
            .await?;
        Ok(count)
    }
}
