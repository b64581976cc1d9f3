use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use chrono::Utc;
use rust_decimal::Decimal;
use sqlx::PgConnection;
use tracing::info;

use crate::{
    AppState,
    api::models::{
        gullak::{
            AutopayUpdate, DepositRequest, DepositResponse, GullakAccountCreate, GullakAccountResponse, GullakTransactionResponse,
        },
        pagination::{PaginatedResponse, Pagination},
        users::CurrentUser,
    },
    auth::permissions::{RequiresPermission, can_read_own_resource, operation, resource},
    db::{
        handlers::{GullakAccounts, GullakTransactions, MarketRates, Repository, gullak::GullakAccountFilter},
        models::gullak::{
            GullakAccountCreateDBRequest, GullakAccountDBResponse, GullakAccountUpdateDBRequest, GullakStatus, GullakTransactionType,
        },
    },
    errors::{Error, Result},
    gullak::{contribute, schedule::first_payment_date},
    pricing::max_amount,
    types::{GullakAccountId, Resource, UserId, abbrev_uuid},
};

fn not_found(id: GullakAccountId) -> Error {
    Error::NotFound {
        resource: "GullakAccount".to_string(),
        id: id.to_string(),
    }
}

/// Load an account the user may read. Admins can read every account; customers only their own.
async fn readable_account(conn: &mut PgConnection, id: GullakAccountId, user: &CurrentUser) -> Result<GullakAccountDBResponse> {
    GullakAccounts::new(conn)
        .get_by_id(id)
        .await?
        .filter(|account| can_read_own_resource(user, Resource::Gullak, account.user_id))
        .ok_or_else(|| not_found(id))
}

/// Lock an account for a write by its owner.
async fn lock_owned(conn: &mut PgConnection, id: GullakAccountId, user_id: UserId) -> Result<GullakAccountDBResponse> {
    GullakAccounts::new(conn)
        .lock_for_update(id)
        .await?
        .filter(|account| account.user_id == user_id)
        .ok_or_else(|| not_found(id))
}

#[utoipa::path(
    get,
    path = "/api/gullak/accounts",
    tag = "gullak",
    summary = "List my savings plans",
    params(Pagination),
    responses(
        (status = 200, description = "The caller's plans, newest first", body = PaginatedResponse<GullakAccountResponse>),
        (status = 401, description = "Unauthorized"),
    ),
    security(
        ("BearerAuth" = []),
        ("CookieAuth" = [])
    )
)]
#[tracing::instrument(skip_all)]
pub async fn list_accounts(
    State(state): State<AppState>,
    Query(pagination): Query<Pagination>,
    current_user: RequiresPermission<resource::Gullak, operation::ReadOwn>,
) -> Result<Json<PaginatedResponse<GullakAccountResponse>>> {
    let (skip, limit) = pagination.params();
    let filter = GullakAccountFilter {
        user_id: Some(current_user.id),
        ..GullakAccountFilter::new(skip, limit)
    };

    let mut pool_conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let mut repo = GullakAccounts::new(&mut pool_conn);
    let accounts = repo.list(&filter).await?;
    let total_count = repo.count(&filter).await?;

    Ok(Json(PaginatedResponse::new(
        accounts.into_iter().map(Into::into).collect(),
        total_count,
        skip,
        limit,
    )))
}

#[utoipa::path(
    post,
    path = "/api/gullak/accounts",
    tag = "gullak",
    summary = "Open a savings plan",
    request_body = GullakAccountCreate,
    responses(
        (status = 201, description = "Plan opened", body = GullakAccountResponse),
        (status = 400, description = "Invalid amounts or schedule"),
    ),
    security(
        ("BearerAuth" = []),
        ("CookieAuth" = [])
    )
)]
#[tracing::instrument(skip_all)]
pub async fn create_account(
    State(state): State<AppState>,
    current_user: RequiresPermission<resource::Gullak, operation::CreateOwn>,
    Json(create): Json<GullakAccountCreate>,
) -> Result<(StatusCode, Json<GullakAccountResponse>)> {
    create.validate().map_err(|message| Error::BadRequest { message })?;

    let today = Utc::now().date_naive();
    let next_payment_date = first_payment_date(
        create.payment_frequency,
        today,
        create.payment_day_of_week,
        create.payment_day_of_month,
    );

    let mut pool_conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let account = GullakAccounts::new(&mut pool_conn)
        .create(&GullakAccountCreateDBRequest {
            user_id: current_user.id,
            name: create.name.trim().to_string(),
            metal: create.metal,
            target_amount: create.target_amount,
            installment_amount: create.installment_amount,
            payment_frequency: create.payment_frequency,
            payment_day_of_week: create.payment_day_of_week,
            payment_day_of_month: create.payment_day_of_month,
            next_payment_date,
            auto_pay_enabled: create.auto_pay_enabled,
        })
        .await?;

    info!(account_id = %abbrev_uuid(&account.id), %next_payment_date, "Gullak plan opened");

    Ok((StatusCode::CREATED, Json(account.into())))
}

#[utoipa::path(
    get,
    path = "/api/gullak/accounts/{account_id}",
    tag = "gullak",
    summary = "Get savings plan",
    responses(
        (status = 200, description = "Plan details", body = GullakAccountResponse),
        (status = 404, description = "Plan not found"),
    ),
    params(
        ("account_id" = uuid::Uuid, Path, description = "Gullak account ID")
    ),
    security(
        ("BearerAuth" = []),
        ("CookieAuth" = [])
    )
)]
#[tracing::instrument(skip_all)]
pub async fn get_account(
    State(state): State<AppState>,
    Path(account_id): Path<GullakAccountId>,
    current_user: CurrentUser,
) -> Result<Json<GullakAccountResponse>> {
    let mut pool_conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let account = readable_account(&mut pool_conn, account_id, &current_user).await?;

    Ok(Json(account.into()))
}

#[utoipa::path(
    post,
    path = "/api/gullak/accounts/{account_id}/deposits",
    tag = "gullak",
    summary = "Deposit",
    description = "One-off contribution on top of the schedule. The next installment date is unchanged.",
    request_body = DepositRequest,
    responses(
        (status = 201, description = "Deposit posted", body = DepositResponse),
        (status = 400, description = "Non-positive or oversized amount, or completed plan"),
        (status = 404, description = "Plan not found"),
        (status = 409, description = "No market rate recorded yet"),
    ),
    params(
        ("account_id" = uuid::Uuid, Path, description = "Gullak account ID")
    ),
    security(
        ("BearerAuth" = []),
        ("CookieAuth" = [])
    )
)]
#[tracing::instrument(skip_all)]
pub async fn deposit(
    State(state): State<AppState>,
    Path(account_id): Path<GullakAccountId>,
    current_user: RequiresPermission<resource::Gullak, operation::UpdateOwn>,
    Json(request): Json<DepositRequest>,
) -> Result<(StatusCode, Json<DepositResponse>)> {
    if request.amount <= Decimal::ZERO {
        return Err(Error::BadRequest {
            message: "Deposit amount must be positive".to_string(),
        });
    }
    if request.amount > max_amount() {
        return Err(Error::BadRequest {
            message: format!("Deposit amount cannot exceed {}", max_amount()),
        });
    }

    let mut tx = state.db.begin().await.map_err(|e| Error::Database(e.into()))?;

    let account = lock_owned(&mut tx, account_id, current_user.id).await?;
    if account.status == GullakStatus::Completed {
        return Err(Error::BadRequest {
            message: "This plan has already reached its target".to_string(),
        });
    }

    let rate = MarketRates::new(&mut tx).latest().await?.ok_or_else(|| Error::Conflict {
        message: "Deposits are unavailable until market rates have been fetched".to_string(),
    })?;

    let (updated, transaction) = contribute(&mut tx, &account, request.amount, &rate, GullakTransactionType::ManualDeposit, None).await?;

    tx.commit().await.map_err(|e| Error::Database(e.into()))?;

    info!(
        account_id = %abbrev_uuid(&account_id),
        amount = %request.amount,
        completed = updated.status == GullakStatus::Completed,
        "Gullak deposit posted"
    );

    Ok((
        StatusCode::CREATED,
        Json(DepositResponse {
            account: updated.into(),
            transaction: transaction.into(),
        }),
    ))
}

#[utoipa::path(
    patch,
    path = "/api/gullak/accounts/{account_id}/autopay",
    tag = "gullak",
    summary = "Pause or resume autopay",
    description = "Resuming a plan whose installment date has passed restarts the schedule from today.",
    request_body = AutopayUpdate,
    responses(
        (status = 200, description = "Plan updated", body = GullakAccountResponse),
        (status = 400, description = "Completed plan"),
        (status = 404, description = "Plan not found"),
    ),
    params(
        ("account_id" = uuid::Uuid, Path, description = "Gullak account ID")
    ),
    security(
        ("BearerAuth" = []),
        ("CookieAuth" = [])
    )
)]
#[tracing::instrument(skip_all)]
pub async fn set_autopay(
    State(state): State<AppState>,
    Path(account_id): Path<GullakAccountId>,
    current_user: RequiresPermission<resource::Gullak, operation::UpdateOwn>,
    Json(update): Json<AutopayUpdate>,
) -> Result<Json<GullakAccountResponse>> {
    let mut tx = state.db.begin().await.map_err(|e| Error::Database(e.into()))?;

    let account = lock_owned(&mut tx, account_id, current_user.id).await?;
    if account.status == GullakStatus::Completed {
        return Err(Error::BadRequest {
            message: "This plan has already reached its target".to_string(),
        });
    }

    let today = Utc::now().date_naive();
    let next_payment_date = (update.enabled && account.next_payment_date < today).then(|| {
        first_payment_date(
            account.payment_frequency,
            today,
            account.payment_day_of_week,
            account.payment_day_of_month,
        )
    });

    let updated = GullakAccounts::new(&mut tx)
        .update(
            account_id,
            &GullakAccountUpdateDBRequest {
                auto_pay_enabled: Some(update.enabled),
                status: Some(if update.enabled { GullakStatus::Active } else { GullakStatus::Paused }),
                next_payment_date,
                ..Default::default()
            },
        )
        .await?;

    tx.commit().await.map_err(|e| Error::Database(e.into()))?;

    Ok(Json(updated.into()))
}

#[utoipa::path(
    get,
    path = "/api/gullak/accounts/{account_id}/transactions",
    tag = "gullak",
    summary = "Plan ledger",
    params(
        ("account_id" = uuid::Uuid, Path, description = "Gullak account ID"),
        Pagination
    ),
    responses(
        (status = 200, description = "Contributions, newest first", body = PaginatedResponse<GullakTransactionResponse>),
        (status = 404, description = "Plan not found"),
    ),
    security(
        ("BearerAuth" = []),
        ("CookieAuth" = [])
    )
)]
#[tracing::instrument(skip_all)]
pub async fn list_transactions(
    State(state): State<AppState>,
    Path(account_id): Path<GullakAccountId>,
    Query(pagination): Query<Pagination>,
    current_user: CurrentUser,
) -> Result<Json<PaginatedResponse<GullakTransactionResponse>>> {
    let (skip, limit) = pagination.params();

    let mut pool_conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    readable_account(&mut pool_conn, account_id, &current_user).await?;

    let mut repo = GullakTransactions::new(&mut pool_conn);
    let transactions = repo.list_for_account(account_id, skip, limit).await?;
    let total_count = repo.count_for_account(account_id).await?;

    Ok(Json(PaginatedResponse::new(
        transactions.into_iter().map(Into::into).collect(),
        total_count,
        skip,
        limit,
    )))
}
