use axum::{Json, extract::State};
use rust_decimal::Decimal;

use super::market_rates::load_current_rate;
use crate::{
    AppState,
    api::models::pricing::PricingPreviewResponse,
    errors::{Error, Result},
    pricing::PricingInput,
};

/// Price an arbitrary product description at the current rate
#[utoipa::path(
    post,
    path = "/api/pricing/calculate",
    request_body = PricingInput,
    tag = "pricing",
    responses(
        (status = 200, description = "Itemized price", body = PricingPreviewResponse),
        (status = 400, description = "Negative or oversized weight or cost"),
        (status = 404, description = "No rate has been fetched yet"),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn calculate_price(State(state): State<AppState>, Json(input): Json<PricingInput>) -> Result<Json<PricingPreviewResponse>> {
    let amounts = [input.weight, input.making_charges, input.gemstones_cost, input.diamonds_cost];
    if amounts.iter().any(|amount| *amount < Decimal::ZERO) || input.fixed_rate_per_gram.is_some_and(|r| r < Decimal::ZERO) {
        return Err(Error::BadRequest {
            message: "Weight, rates and costs must not be negative".to_string(),
        });
    }

    let rate = load_current_rate(&state).await?.ok_or_else(|| Error::NotFound {
        resource: "MarketRate".to_string(),
        id: "latest".to_string(),
    })?;

    let breakdown = state.calculator.breakdown(&input, &rate.rates())?;

    Ok(Json(PricingPreviewResponse {
        breakdown,
        market_rate_id: rate.id,
        currency: rate.currency,
    }))
}
