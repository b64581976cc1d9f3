//! Gullak recurring savings.
//!
//! - [`schedule`]: installment date arithmetic
//! - [`autopay`]: the sweep that charges due accounts, and its background loop
//!
//! Scheduled installments and manual deposits both go through [`contribute`], which posts a ledger
//! entry and applies the balance change as a single SQL increment. The caller is expected to hold
//! the account's row lock.

pub mod autopay;
pub mod schedule;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use sqlx::PgConnection;

use crate::db::handlers::{GullakAccounts, GullakTransactions};
use crate::db::models::gullak::{
    GullakAccountDBResponse, GullakTransactionCreateDBRequest, GullakTransactionDBResponse, GullakTransactionStatus,
    GullakTransactionType,
};
use crate::db::models::market_rates::MarketRateDBResponse;
use crate::errors::Error;

/// Grams of metal an amount buys, to four decimals. `None` for a zero rate or an overflowing
/// quotient.
pub fn grams_for(amount: Decimal, rate_per_gram: Decimal) -> Option<Decimal> {
    amount.checked_div(rate_per_gram).map(|grams| grams.round_dp(4))
}

/// Post `amount` against `account` at the given market rate.
///
/// `next_payment_date` moves the schedule forward; deposits pass `None`. Returns the updated
/// account and the ledger entry.
pub async fn contribute(
    conn: &mut PgConnection,
    account: &GullakAccountDBResponse,
    amount: Decimal,
    rate: &MarketRateDBResponse,
    transaction_type: GullakTransactionType,
    next_payment_date: Option<NaiveDate>,
) -> Result<(GullakAccountDBResponse, GullakTransactionDBResponse), Error> {
    let per_gram = rate.rates().spot(account.metal);
    if per_gram <= Decimal::ZERO {
        return Err(Error::Internal {
            operation: format!("price {:?} contribution: market rate {} is not positive", account.metal, rate.id),
        });
    }

    let gold_value = grams_for(amount, per_gram).ok_or_else(|| Error::BadRequest {
        message: format!("{amount} is too large to convert at the current rate"),
    })?;

    let entry = GullakTransactions::new(conn)
        .create(&GullakTransactionCreateDBRequest {
            account_id: account.id,
            user_id: account.user_id,
            amount,
            gold_rate: per_gram,
            gold_value,
            transaction_type,
            status: GullakTransactionStatus::Completed,
            market_rate_id: Some(rate.id),
        })
        .await?;

    let updated = GullakAccounts::new(conn)
        .apply_contribution(account.id, amount, next_payment_date)
        .await?;

    Ok((updated, entry))
}
