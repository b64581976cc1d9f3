//! Database repositories for Gullak accounts and transactions.
//!
//! Balances are only ever changed by [`GullakAccounts::apply_contribution`], a single atomic
//! increment that also applies the completion rule. Callers that need a consistent view across
//! several statements lock the row first with [`GullakAccounts::lock_for_update`].

use crate::db::{
    errors::{DbError, Result},
    handlers::repository::Repository,
    models::gullak::{
        GullakAccountCreateDBRequest, GullakAccountDBResponse, GullakAccountUpdateDBRequest, GullakStats, GullakStatus,
        GullakTransactionCreateDBRequest, GullakTransactionDBResponse, GullakTransactionStatus, GullakTransactionType,
        PaymentFrequency,
    },
};
use crate::rates::Metal;
use crate::types::{GullakAccountId, GullakTransactionId, MarketRateId, UserId, abbrev_uuid};
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use sqlx::{FromRow, PgConnection, Postgres, QueryBuilder};
use std::collections::HashMap;
use tracing::instrument;
use uuid::Uuid;

/// Filter for listing accounts
#[derive(Debug, Clone)]
pub struct GullakAccountFilter {
    pub skip: i64,
    pub limit: i64,
    pub user_id: Option<UserId>,
    pub status: Option<GullakStatus>,
}

impl GullakAccountFilter {
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
struct GullakAccount {
    pub id: GullakAccountId,
    pub user_id: UserId,
    pub name: String,
    pub metal: Metal,
    pub target_amount: Decimal,
    pub current_balance: Decimal,
    pub installment_amount: Decimal,
    pub payment_frequency: PaymentFrequency,
    pub payment_day_of_week: Option<i16>,
    pub payment_day_of_month: Option<i16>,
    pub next_payment_date: NaiveDate,
    pub auto_pay_enabled: bool,
    pub status: GullakStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<GullakAccount> for GullakAccountDBResponse {
    fn from(a: GullakAccount) -> Self {
        Self {
            id: a.id,
            user_id: a.user_id,
            name: a.name,
            metal: a.metal,
            target_amount: a.target_amount,
            current_balance: a.current_balance,
            installment_amount: a.installment_amount,
            payment_frequency: a.payment_frequency,
            payment_day_of_week: a.payment_day_of_week,
            payment_day_of_month: a.payment_day_of_month,
            next_payment_date: a.next_payment_date,
            auto_pay_enabled: a.auto_pay_enabled,
            status: a.status,
            created_at: a.created_at,
            updated_at: a.updated_at,
        }
    }
}

pub struct GullakAccounts<'c> {
    db: &'c mut PgConnection,
}

impl<'c> GullakAccounts<'c> {
    pub fn new(db: &'c mut PgConnection) -> Self {
        Self { db }
    }

    /// Accounts the scheduler should charge on `today`.
    #[instrument(skip(self), err)]
    pub async fn list_due_ids(&mut self, today: NaiveDate) -> Result<Vec<GullakAccountId>> {
        let ids = sqlx::query_scalar(
            r#"
            SELECT id FROM gullak_accounts
            WHERE status = 'active' AND auto_pay_enabled AND next_payment_date <= $1
            ORDER BY next_payment_date, id
            "#,
        )
        .bind(today)
        .fetch_all(&mut *self.db)
        .await?;

        Ok(ids)
    }

    /// Fetch an account and hold its row lock until the surrounding transaction ends.
    #[instrument(skip(self), fields(account_id = %abbrev_uuid(&id)), err)]
    pub async fn lock_for_update(&mut self, id: GullakAccountId) -> Result<Option<GullakAccountDBResponse>> {
        let account = sqlx::query_as::<_, GullakAccount>("SELECT * FROM gullak_accounts WHERE id = $1 FOR UPDATE")
            .bind(id)
            .fetch_optional(&mut *self.db)
            .await?;

        Ok(account.map(Into::into))
    }

    /// Add `amount` to the balance in one statement, optionally moving the next due date. The
    /// account completes when the new balance reaches its target.
    #[instrument(skip(self), fields(account_id = %abbrev_uuid(&id), amount = %amount), err)]
    pub async fn apply_contribution(
        &mut self,
        id: GullakAccountId,
        amount: Decimal,
        next_payment_date: Option<NaiveDate>,
    ) -> Result<GullakAccountDBResponse> {
        let account = sqlx::query_as::<_, GullakAccount>(
            r#"
            UPDATE gullak_accounts SET
                current_balance = current_balance + $2,
                next_payment_date = COALESCE($3, next_payment_date),
                status = CASE WHEN current_balance + $2 >= target_amount THEN 'completed' ELSE status END,
                updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(amount)
        .bind(next_payment_date)
        .fetch_optional(&mut *self.db)
        .await?
        .ok_or(DbError::NotFound)?;

        Ok(account.into())
    }

    #[instrument(skip(self), fields(account_id = %abbrev_uuid(&id)), err)]
    pub async fn mark_completed(&mut self, id: GullakAccountId) -> Result<GullakAccountDBResponse> {
        let account = sqlx::query_as::<_, GullakAccount>(
            "UPDATE gullak_accounts SET status = 'completed', updated_at = NOW() WHERE id = $1 RETURNING *",
        )
        .bind(id)
        .fetch_optional(&mut *self.db)
        .await?
        .ok_or(DbError::NotFound)?;

        Ok(account.into())
    }

    #[instrument(skip(self, filter), err)]
    pub async fn count(&mut self, filter: &GullakAccountFilter) -> Result<i64> {
        let mut query = QueryBuilder::new("SELECT COUNT(*) FROM gullak_accounts WHERE 1=1");
        filter.push_conditions(&mut query);

        let count = query.build_query_scalar::<i64>().fetch_one(&mut *self.db).await?;
        Ok(count)
    }

    #[instrument(skip(self), err)]
    pub async fn stats(&mut self) -> Result<GullakStats> {
        let (active_accounts, completed_accounts, total_balance) = sqlx::query_as::<_, (i64, i64, Decimal)>(
            r#"
            SELECT
                COUNT(*) FILTER (WHERE status = 'active'),
                COUNT(*) FILTER (WHERE status = 'completed'),
                COALESCE(SUM(current_balance), 0)
            FROM gullak_accounts
            "#,
        )
        .fetch_one(&mut *self.db)
        .await?;

        Ok(GullakStats {
            active_accounts,
            completed_accounts,
            total_balance,
        })
    }
}

#[async_trait::async_trait]
impl<'c> Repository for GullakAccounts<'c> {
    type CreateRequest = GullakAccountCreateDBRequest;
    type UpdateRequest = GullakAccountUpdateDBRequest;
    type Response = GullakAccountDBResponse;
    type Id = GullakAccountId;
    type Filter = GullakAccountFilter;

    #[instrument(skip(self, request), fields(user_id = %abbrev_uuid(&request.user_id), frequency = ?request.payment_frequency), err)]
    async fn create(&mut self, request: &Self::CreateRequest) -> Result<Self::Response> {
        let account = sqlx::query_as::<_, GullakAccount>(
            r#"
            INSERT INTO gullak_accounts (
                id, user_id, name, metal, target_amount, installment_amount, payment_frequency,
                payment_day_of_week, payment_day_of_month, next_payment_date, auto_pay_enabled
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(request.user_id)
        .bind(&request.name)
        .bind(request.metal)
        .bind(request.target_amount)
        .bind(request.installment_amount)
        .bind(request.payment_frequency)
        .bind(request.payment_day_of_week)
        .bind(request.payment_day_of_month)
        .bind(request.next_payment_date)
        .bind(request.auto_pay_enabled)
        .fetch_one(&mut *self.db)
        .await?;

        Ok(account.into())
    }

    #[instrument(skip(self), fields(account_id = %abbrev_uuid(&id)), err)]
    async fn get_by_id(&mut self, id: Self::Id) -> Result<Option<Self::Response>> {
        let account = sqlx::query_as::<_, GullakAccount>("SELECT * FROM gullak_accounts WHERE id = $1")
            .bind(id)
            .fetch_optional(&mut *self.db)
            .await?;

        Ok(account.map(Into::into))
    }

    #[instrument(skip(self, ids), fields(count = ids.len()), err)]
    async fn get_bulk(&mut self, ids: Vec<Self::Id>) -> Result<HashMap<Self::Id, Self::Response>> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }

        let accounts = sqlx::query_as::<_, GullakAccount>("SELECT * FROM gullak_accounts WHERE id = ANY($1)")
            .bind(&ids)
            .fetch_all(&mut *self.db)
            .await?;

        Ok(accounts.into_iter().map(|a| (a.id, a.into())).collect())
    }

    #[instrument(skip(self, filter), fields(limit = filter.limit, skip = filter.skip), err)]
    async fn list(&mut self, filter: &Self::Filter) -> Result<Vec<Self::Response>> {
        let mut query = QueryBuilder::new("SELECT * FROM gullak_accounts WHERE 1=1");
        filter.push_conditions(&mut query);
        query.push(" ORDER BY created_at DESC, id LIMIT ");
        query.push_bind(filter.limit);
        query.push(" OFFSET ");
        query.push_bind(filter.skip);

        let accounts = query.build_query_as::<GullakAccount>().fetch_all(&mut *self.db).await?;
        Ok(accounts.into_iter().map(Into::into).collect())
    }

    #[instrument(skip(self), fields(account_id = %abbrev_uuid(&id)), err)]
    async fn delete(&mut self, id: Self::Id) -> Result<bool> {
        let result = sqlx::query("DELETE FROM gullak_accounts WHERE id = $1")
            .bind(id)
            .execute(&mut *self.db)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self, request), fields(account_id = %abbrev_uuid(&id)), err)]
    async fn update(&mut self, id: Self::Id, request: &Self::UpdateRequest) -> Result<Self::Response> {
        let account = sqlx::query_as::<_, GullakAccount>(
            r#"
            UPDATE gullak_accounts SET
                name = COALESCE($2, name),
                auto_pay_enabled = COALESCE($3, auto_pay_enabled),
                next_payment_date = COALESCE($4, next_payment_date),
                status = COALESCE($5, status),
                updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(&request.name)
        .bind(request.auto_pay_enabled)
        .bind(request.next_payment_date)
        .bind(request.status)
        .fetch_optional(&mut *self.db)
        .await?
        .ok_or(DbError::NotFound)?;

        Ok(account.into())
    }
}

#[derive(Debug, Clone, FromRow)]
struct GullakTransaction {
    pub id: GullakTransactionId,
    pub account_id: GullakAccountId,
    pub user_id: UserId,
    pub amount: Decimal,
    pub gold_rate: Decimal,
    pub gold_value: Decimal,
    pub transaction_type: GullakTransactionType,
    pub status: GullakTransactionStatus,
    pub market_rate_id: Option<MarketRateId>,
    pub created_at: DateTime<Utc>,
}

impl From<GullakTransaction> for GullakTransactionDBResponse {
    fn from(t: GullakTransaction) -> Self {
        Self {
            id: t.id,
            account_id: t.account_id,
            user_id: t.user_id,
            amount: t.amount,
            gold_rate: t.gold_rate,
            gold_value: t.gold_value,
            transaction_type: t.transaction_type,
            status: t.status,
            market_rate_id: t.market_rate_id,
            created_at: t.created_at,
        }
    }
}

/// Append-only contribution ledger.
pub struct GullakTransactions<'c> {
    db: &'c mut PgConnection,
}

impl<'c> GullakTransactions<'c> {
    pub fn new(db: &'c mut PgConnection) -> Self {
        Self { db }
    }

    #[instrument(skip(self, request), fields(account_id = %abbrev_uuid(&request.account_id), kind = ?request.transaction_type), err)]
    pub async fn create(&mut self, request: &GullakTransactionCreateDBRequest) -> Result<GullakTransactionDBResponse> {
        let transaction = sqlx::query_as::<_, GullakTransaction>(
            r#"
            INSERT INTO gullak_transactions (
                id, account_id, user_id, amount, gold_rate, gold_value, transaction_type, status, market_rate_id
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(request.account_id)
        .bind(request.user_id)
        .bind(request.amount)
        .bind(request.gold_rate)
        .bind(request.gold_value)
        .bind(request.transaction_type)
        .bind(request.status)
        .bind(request.market_rate_id)
        .fetch_one(&mut *self.db)
        .await?;

        Ok(transaction.into())
    }

    /// Ledger for one account, newest first.
    #[instrument(skip(self), fields(account_id = %abbrev_uuid(&account_id)), err)]
    pub async fn list_for_account(
        &mut self,
        account_id: GullakAccountId,
        skip: i64,
        limit: i64,
    ) -> Result<Vec<GullakTransactionDBResponse>> {
        let transactions = sqlx::query_as::<_, GullakTransaction>(
            "SELECT * FROM gullak_transactions WHERE account_id = $1 ORDER BY created_at DESC, id LIMIT $2 OFFSET $3",
        )
        .bind(account_id)
        .bind(limit)
        .bind(skip)
        .fetch_all(&mut *self.db)
        .await?;

        Ok(transactions.into_iter().map(Into::into).collect())
    }

    #[instrument(skip(self), fields(account_id = %abbrev_uuid(&account_id)), err)]
    pub async fn count_for_account(&mut self, account_id: GullakAccountId) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM gullak_transactions WHERE account_id = $1")
            .bind(account_id)
            .fetch_one(&mut *self.db)
            .await?;
        Ok(count)
    }
}
