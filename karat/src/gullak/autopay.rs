//! Scheduled Gullak installments.

use std::time::Duration;

use anyhow::Context;
use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument};
use utoipa::ToSchema;

use super::contribute;
use super::schedule::next_payment_after;
use crate::db::handlers::{GullakAccounts, MarketRates};
use crate::db::models::gullak::{GullakStatus, GullakTransactionType};
use crate::types::{GullakAccountId, abbrev_uuid};

/// Outcome counts for one sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct SweepReport {
    /// Installments posted
    pub processed: u32,
    /// Accounts that reached their target during the sweep
    pub completed: u32,
    /// Accounts that were no longer due once locked
    pub skipped: u32,
    pub failed: u32,
}

enum Outcome {
    Contributed { completed: bool },
    AlreadyComplete,
    Skipped,
}

/// Charge one installment on every account due on `today`.
///
/// Each account is handled in its own transaction holding the account's row lock. A failure is
/// logged and counted, and the sweep moves on to the next account.
#[instrument(skip(pool), err)]
pub async fn run_autopay_sweep(pool: &PgPool, today: NaiveDate) -> anyhow::Result<SweepReport> {
    let due = {
        let mut conn = pool.acquire().await?;
        GullakAccounts::new(&mut conn).list_due_ids(today).await?
    };
    debug!(count = due.len(), "Gullak accounts due");

    let mut report = SweepReport::default();
    for id in due {
        match process_account(pool, id, today).await {
            Ok(Outcome::Contributed { completed }) => {
                report.processed += 1;
                if completed {
                    report.completed += 1;
                }
            }
            Ok(Outcome::AlreadyComplete) => report.completed += 1,
            Ok(Outcome::Skipped) => report.skipped += 1,
            Err(e) => {
                error!(account_id = %abbrev_uuid(&id), "Gullak autopay failed: {e:#}");
                report.failed += 1;
            }
        }
    }

    info!(
        processed = report.processed,
        completed = report.completed,
        skipped = report.skipped,
        failed = report.failed,
        "Gullak autopay sweep finished"
    );
    Ok(report)
}

async fn process_account(pool: &PgPool, id: GullakAccountId, today: NaiveDate) -> anyhow::Result<Outcome> {
    let mut tx = pool.begin().await?;

    let Some(account) = GullakAccounts::new(&mut tx).lock_for_update(id).await? else {
        return Ok(Outcome::Skipped);
    };
    if !account.is_due(today) {
        return Ok(Outcome::Skipped);
    }

    if account.target_reached() {
        GullakAccounts::new(&mut tx).mark_completed(id).await?;
        tx.commit().await?;
        return Ok(Outcome::AlreadyComplete);
    }

    let rate = MarketRates::new(&mut tx)
        .latest()
        .await?
        .context("no market rate has been recorded yet")?;

    let next = next_payment_after(
        account.payment_frequency,
        account.next_payment_date,
        today,
        account.payment_day_of_week,
        account.payment_day_of_month,
    );
    let (updated, _) = contribute(
        &mut tx,
        &account,
        account.installment_amount,
        &rate,
        GullakTransactionType::AutoPay,
        Some(next),
    )
    .await?;

    tx.commit().await?;
    Ok(Outcome::Contributed {
        completed: updated.status == GullakStatus::Completed,
    })
}

/// Run a sweep immediately and then every `interval` until `shutdown` fires.
pub async fn run_autopay_loop(pool: PgPool, interval: Duration, shutdown: CancellationToken) -> anyhow::Result<()> {
    info!("Starting Gullak autopay scheduler with {:?} interval", interval);

    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                info!("Gullak autopay scheduler shutting down");
                break;
            }
            _ = ticker.tick() => {
                if let Err(e) = run_autopay_sweep(&pool, Utc::now().date_naive()).await {
                    error!("Gullak autopay sweep failed: {e:#}");
                }
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::models::users::Role;
    use crate::db::handlers::{GullakTransactions, Repository};
    use crate::db::models::gullak::PaymentFrequency;
    use crate::rates::Metal;
    use rust_decimal::Decimal;
    use crate::test_utils::{create_test_rate, create_test_user, gullak_request};

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_sweep_posts_installment_and_advances_date(pool: PgPool) {
        create_test_rate(&pool, Decimal::from(8000), Decimal::from(100)).await;
        let user = create_test_user(&pool, Role::Customer).await;
        let today = date(2025, 3, 10);

        let account = {
            let mut conn = pool.acquire().await.unwrap();
            GullakAccounts::new(&mut conn).create(&gullak_request(user.id, today)).await.unwrap()
        };

        let report = run_autopay_sweep(&pool, today).await.unwrap();
        assert_eq!(
            report,
            SweepReport {
                processed: 1,
                ..Default::default()
            }
        );

        let mut conn = pool.acquire().await.unwrap();
        let after = GullakAccounts::new(&mut conn).get_by_id(account.id).await.unwrap().unwrap();
        assert_eq!(after.current_balance, Decimal::from(400));
        assert_eq!(after.next_payment_date, date(2025, 3, 11));
        assert_eq!(after.status, GullakStatus::Active);

        let ledger = GullakTransactions::new(&mut conn).list_for_account(account.id, 0, 10).await.unwrap();
        assert_eq!(ledger.len(), 1);
        assert_eq!(ledger[0].transaction_type, GullakTransactionType::AutoPay);
        assert_eq!(ledger[0].gold_rate, Decimal::from(8000));
        // 400 / 8000 = 0.05 g
        assert_eq!(ledger[0].gold_value, Decimal::new(500, 4));

        // Running again the same day is a no-op
        let again = run_autopay_sweep(&pool, today).await.unwrap();
        assert_eq!(again, SweepReport::default());
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_account_at_target_completes_without_contribution(pool: PgPool) {
        create_test_rate(&pool, Decimal::from(8000), Decimal::from(100)).await;
        let user = create_test_user(&pool, Role::Customer).await;
        let today = date(2025, 3, 10);

        let mut conn = pool.acquire().await.unwrap();
        let mut accounts = GullakAccounts::new(&mut conn);
        let account = accounts.create(&gullak_request(user.id, date(2025, 3, 20))).await.unwrap();
        // Over target but still active
        sqlx::query("UPDATE gullak_accounts SET current_balance = 1500, next_payment_date = $2 WHERE id = $1")
            .bind(account.id)
            .bind(today)
            .execute(&pool)
            .await
            .unwrap();

        let report = run_autopay_sweep(&pool, today).await.unwrap();
        assert_eq!(report.completed, 1);
        assert_eq!(report.processed, 0);

        let mut conn = pool.acquire().await.unwrap();
        let after = GullakAccounts::new(&mut conn).get_by_id(account.id).await.unwrap().unwrap();
        assert_eq!(after.status, GullakStatus::Completed);
        assert_eq!(after.current_balance, Decimal::from(1500));
        assert_eq!(GullakTransactions::new(&mut conn).count_for_account(account.id).await.unwrap(), 0);

        // Completed accounts are never picked up again
        let later = run_autopay_sweep(&pool, date(2025, 4, 10)).await.unwrap();
        assert_eq!(later, SweepReport::default());
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_final_installment_completes_account(pool: PgPool) {
        create_test_rate(&pool, Decimal::from(8000), Decimal::from(100)).await;
        let user = create_test_user(&pool, Role::Customer).await;
        let today = date(2025, 3, 10);

        let mut conn = pool.acquire().await.unwrap();
        let account = GullakAccounts::new(&mut conn)
            .create(&gullak_request(user.id, today))
            .await
            .unwrap();
        GullakAccounts::new(&mut conn)
            .apply_contribution(account.id, Decimal::from(700), None)
            .await
            .unwrap();

        let report = run_autopay_sweep(&pool, today).await.unwrap();
        assert_eq!(report.processed, 1);
        assert_eq!(report.completed, 1);

        let after = GullakAccounts::new(&mut conn).get_by_id(account.id).await.unwrap().unwrap();
        assert_eq!(after.current_balance, Decimal::from(1100));
        assert_eq!(after.status, GullakStatus::Completed);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_silver_plan_uses_silver_rate_and_monthly_clamp(pool: PgPool) {
        create_test_rate(&pool, Decimal::from(8000), Decimal::from(100)).await;
        let user = create_test_user(&pool, Role::Customer).await;
        let today = date(2025, 3, 31);

        let mut request = gullak_request(user.id, today);
        request.metal = Metal::Silver;
        request.payment_frequency = PaymentFrequency::Monthly;
        request.payment_day_of_month = Some(31);

        let mut conn = pool.acquire().await.unwrap();
        let account = GullakAccounts::new(&mut conn).create(&request).await.unwrap();

        run_autopay_sweep(&pool, today).await.unwrap();

        let after = GullakAccounts::new(&mut conn).get_by_id(account.id).await.unwrap().unwrap();
        assert_eq!(after.next_payment_date, date(2025, 4, 30));

        let ledger = GullakTransactions::new(&mut conn).list_for_account(account.id, 0, 1).await.unwrap();
        assert_eq!(ledger[0].gold_rate, Decimal::from(100));
        assert_eq!(ledger[0].gold_value, Decimal::from(4));
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_missing_rate_fails_account_without_aborting(pool: PgPool) {
        let user = create_test_user(&pool, Role::Customer).await;
        let today = date(2025, 3, 10);

        let mut conn = pool.acquire().await.unwrap();
        let mut accounts = GullakAccounts::new(&mut conn);
        let pending = accounts.create(&gullak_request(user.id, today)).await.unwrap();
        let full = accounts.create(&gullak_request(user.id, today)).await.unwrap();
        accounts.apply_contribution(full.id, Decimal::from(999), None).await.unwrap();
        sqlx::query("UPDATE gullak_accounts SET current_balance = 1000, status = 'active' WHERE id = $1")
            .bind(full.id)
            .execute(&pool)
            .await
            .unwrap();

        let report = run_autopay_sweep(&pool, today).await.unwrap();
        assert_eq!(report.failed, 1);
        assert_eq!(report.completed, 1);

        let mut conn = pool.acquire().await.unwrap();
        let untouched = GullakAccounts::new(&mut conn).get_by_id(pending.id).await.unwrap().unwrap();
        assert_eq!(untouched.current_balance, Decimal::ZERO);
        assert_eq!(untouched.next_payment_date, today);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_loop_stops_on_cancel(pool: PgPool) {
        let shutdown = CancellationToken::new();
        let handle = tokio::spawn(run_autopay_loop(pool, Duration::from_secs(3600), shutdown.clone()));

        tokio::time::sleep(Duration::from_millis(50)).await;
        shutdown.cancel();

        let result = tokio::time::timeout(Duration::from_secs(5), handle).await;
        assert!(result.is_ok(), "autopay loop did not stop after cancellation");
    }
}
