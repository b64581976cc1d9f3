//! Database models for Gullak savings accounts and their ledger.

use crate::rates::Metal;
use crate::types::{GullakAccountId, GullakTransactionId, MarketRateId, UserId};
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum PaymentFrequency {
    Daily,
    Weekly,
    Monthly,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum GullakStatus {
    #[default]
    Active,
    Paused,
    /// Terminal: the target has been reached
    Completed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum GullakTransactionType {
    AutoPay,
    ManualDeposit,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum GullakTransactionStatus {
    #[default]
    Completed,
    Failed,
}

#[derive(Debug, Clone)]
pub struct GullakAccountCreateDBRequest {
    pub user_id: UserId,
    pub name: String,
    pub metal: Metal,
    pub target_amount: Decimal,
    pub installment_amount: Decimal,
    pub payment_frequency: PaymentFrequency,
    /// 0 = Sunday .. 6 = Saturday, for weekly plans
    pub payment_day_of_week: Option<i16>,
    /// 1..=31, for monthly plans; clamped to short months
    pub payment_day_of_month: Option<i16>,
    pub next_payment_date: NaiveDate,
    pub auto_pay_enabled: bool,
}

/// `None` leaves a field unchanged.
#[derive(Debug, Clone, Default)]
pub struct GullakAccountUpdateDBRequest {
    pub name: Option<String>,
    pub auto_pay_enabled: Option<bool>,
    pub next_payment_date: Option<NaiveDate>,
    pub status: Option<GullakStatus>,
}

#[derive(Debug, Clone)]
pub struct GullakAccountDBResponse {
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

impl GullakAccountDBResponse {
    /// Whether the scheduler should take an installment on `today`.
    pub fn is_due(&self, today: NaiveDate) -> bool {
        self.status == GullakStatus::Active && self.auto_pay_enabled && self.next_payment_date <= today
    }

    pub fn target_reached(&self) -> bool {
        self.current_balance >= self.target_amount
    }
}

#[derive(Debug, Clone)]
pub struct GullakTransactionCreateDBRequest {
    pub account_id: GullakAccountId,
    pub user_id: UserId,
    pub amount: Decimal,
    /// Per-gram rate of the account's metal at the time of the contribution
    pub gold_rate: Decimal,
    /// Grams of metal the amount buys at `gold_rate`
    pub gold_value: Decimal,
    pub transaction_type: GullakTransactionType,
    pub status: GullakTransactionStatus,
    pub market_rate_id: Option<MarketRateId>,
}

#[derive(Debug, Clone)]
pub struct GullakTransactionDBResponse {
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

/// Aggregate savings figures for the admin dashboard.
#[derive(Debug, Clone, Default)]
pub struct GullakStats {
    pub active_accounts: i64,
    pub completed_accounts: i64,
    pub total_balance: Decimal,
}
