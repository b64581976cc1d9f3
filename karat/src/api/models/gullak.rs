//! API request/response models for Gullak savings plans.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use super::pagination::Pagination;
use crate::db::models::gullak::{
    GullakAccountDBResponse, GullakStatus, GullakTransactionDBResponse, GullakTransactionStatus, GullakTransactionType,
    PaymentFrequency,
};
use crate::pricing::{max_amount, money};
use crate::rates::Metal;
use crate::types::{GullakAccountId, GullakTransactionId, MarketRateId, UserId};

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct GullakAccountCreate {
    pub name: String,
    #[serde(default)]
    pub metal: Metal,
    pub target_amount: Decimal,
    pub installment_amount: Decimal,
    pub payment_frequency: PaymentFrequency,
    /// 0 = Sunday .. 6 = Saturday; weekly plans only
    pub payment_day_of_week: Option<i16>,
    /// 1..=31, clamped to short months; monthly plans only
    pub payment_day_of_month: Option<i16>,
    #[serde(default = "default_true")]
    pub auto_pay_enabled: bool,
}

fn default_true() -> bool {
    true
}

impl GullakAccountCreate {
    /// Check amounts and schedule fields, returning a user-facing message on failure.
    pub fn validate(&self) -> Result<(), String> {
        if self.name.trim().is_empty() {
            return Err("Name must not be empty".to_string());
        }
        if self.target_amount <= Decimal::ZERO || self.installment_amount <= Decimal::ZERO {
            return Err("Target and installment amounts must be positive".to_string());
        }
        if self.target_amount > max_amount() {
            return Err(format!("Target amount cannot exceed {}", max_amount()));
        }
        if self.installment_amount > self.target_amount {
            return Err("Installment amount cannot exceed the target amount".to_string());
        }
        match self.payment_frequency {
            PaymentFrequency::Weekly if !matches!(self.payment_day_of_week, Some(0..=6)) => {
                Err("Weekly plans need payment_day_of_week between 0 (Sunday) and 6 (Saturday)".to_string())
            }
            PaymentFrequency::Monthly if !matches!(self.payment_day_of_month, Some(1..=31)) => {
                Err("Monthly plans need payment_day_of_month between 1 and 31".to_string())
            }
            _ => Ok(()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct DepositRequest {
    pub amount: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AutopayUpdate {
    /// Pause (false) or resume (true) scheduled installments
    pub enabled: bool,
}

/// Query parameters for the admin account listing
#[derive(Debug, Default, Deserialize, IntoParams, ToSchema)]
pub struct ListGullakAccountsQuery {
    #[serde(flatten)]
    #[param(inline)]
    pub pagination: Pagination,

    pub status: Option<GullakStatus>,

    #[param(value_type = Option<String>, format = "uuid")]
    #[schema(value_type = Option<String>, format = "uuid")]
    pub user_id: Option<UserId>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct GullakAccountResponse {
    #[schema(value_type = String, format = "uuid")]
    pub id: GullakAccountId,
    #[schema(value_type = String, format = "uuid")]
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
    /// Share of the target saved so far, 0 to 100
    pub progress_percent: Decimal,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct GullakTransactionResponse {
    #[schema(value_type = String, format = "uuid")]
    pub id: GullakTransactionId,
    #[schema(value_type = String, format = "uuid")]
    pub account_id: GullakAccountId,
    pub amount: Decimal,
    /// Per-gram rate of the plan's metal when the contribution was made
    pub gold_rate: Decimal,
    /// Grams of metal the contribution bought
    pub gold_value: Decimal,
    pub transaction_type: GullakTransactionType,
    pub status: GullakTransactionStatus,
    pub market_rate_id: Option<MarketRateId>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct DepositResponse {
    pub account: GullakAccountResponse,
    pub transaction: GullakTransactionResponse,
}

fn progress_percent(balance: Decimal, target: Decimal) -> Decimal {
    if target <= Decimal::ZERO {
        return Decimal::ZERO;
    }
    money((balance / target * Decimal::ONE_HUNDRED).min(Decimal::ONE_HUNDRED))
}

impl From<GullakAccountDBResponse> for GullakAccountResponse {
    fn from(db: GullakAccountDBResponse) -> Self {
        Self {
            progress_percent: progress_percent(db.current_balance, db.target_amount),
            id: db.id,
            user_id: db.user_id,
            name: db.name,
            metal: db.metal,
            target_amount: db.target_amount,
            current_balance: db.current_balance,
            installment_amount: db.installment_amount,
            payment_frequency: db.payment_frequency,
            payment_day_of_week: db.payment_day_of_week,
            payment_day_of_month: db.payment_day_of_month,
            next_payment_date: db.next_payment_date,
            auto_pay_enabled: db.auto_pay_enabled,
            status: db.status,
            created_at: db.created_at,
            updated_at: db.updated_at,
        }
    }
}

impl From<GullakTransactionDBResponse> for GullakTransactionResponse {
    fn from(db: GullakTransactionDBResponse) -> Self {
        Self {
            id: db.id,
            account_id: db.account_id,
            amount: db.amount,
            gold_rate: db.gold_rate,
            gold_value: db.gold_value,
            transaction_type: db.transaction_type,
            status: db.status,
            market_rate_id: db.market_rate_id,
            created_at: db.created_at,
        }
    }
}
