//! OpenAPI documentation for the `/api/*` surface, served at `/api-docs/openapi.json` and browsable
//! at `/docs`.

use utoipa::{
    Modify, OpenApi,
    openapi::security::{ApiKey, ApiKeyValue, HttpAuthScheme, HttpBuilder, SecurityScheme},
};

use crate::{api, db, gullak, pricing, rates};

/// Session token accepted either as a bearer header or as the session cookie.
struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.security_schemes.insert(
                "BearerAuth".to_string(),
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .description(Some(
                            "Session token returned by `POST /api/auth/login`:\n\n\
                            ```\nAuthorization: Bearer YOUR_TOKEN\n```",
                        ))
                        .build(),
                ),
            );
            components.security_schemes.insert(
                "CookieAuth".to_string(),
                SecurityScheme::ApiKey(ApiKey::Cookie(ApiKeyValue::with_description(
                    "karat_session",
                    "HTTP-only session cookie set on login and registration",
                ))),
            );
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Karat API",
        description = "Jewelry storefront, live metal rates and Gullak savings plans"
    ),
    modifiers(&SecurityAddon),
    paths(
        api::handlers::auth::register,
        api::handlers::auth::login,
        api::handlers::auth::logout,
        api::handlers::auth::me,
        api::handlers::market_rates::get_current_rate,
        api::handlers::market_rates::list_rate_history,
        api::handlers::pricing::calculate_price,
        api::handlers::categories::list_categories,
        api::handlers::categories::get_category,
        api::handlers::categories::create_category,
        api::handlers::categories::update_category,
        api::handlers::categories::delete_category,
        api::handlers::products::list_products,
        api::handlers::products::get_product,
        api::handlers::products::create_product,
        api::handlers::products::update_product,
        api::handlers::products::delete_product,
        api::handlers::cart::get_cart,
        api::handlers::cart::add_to_cart,
        api::handlers::cart::update_cart_item,
        api::handlers::cart::remove_cart_item,
        api::handlers::cart::clear_cart,
        api::handlers::orders::checkout,
        api::handlers::orders::list_orders,
        api::handlers::orders::get_order,
        api::handlers::gullak::list_accounts,
        api::handlers::gullak::create_account,
        api::handlers::gullak::get_account,
        api::handlers::gullak::deposit,
        api::handlers::gullak::set_autopay,
        api::handlers::gullak::list_transactions,
        api::handlers::admin::get_stats,
        api::handlers::admin::list_users,
        api::handlers::admin::update_user_role,
        api::handlers::admin::list_all_orders,
        api::handlers::admin::update_order_status,
        api::handlers::admin::list_all_gullak_accounts,
        api::handlers::admin::trigger_autopay,
        api::handlers::admin::refresh_rates,
    ),
    components(
        schemas(
            api::models::auth::RegisterRequest,
            api::models::auth::LoginRequest,
            api::models::auth::AuthResponse,
            api::models::auth::AuthSuccessResponse,
            api::models::users::Role,
            api::models::users::UserResponse,
            api::models::users::RoleUpdate,
            api::models::market_rates::MarketRateResponse,
            api::models::pricing::PricingPreviewResponse,
            api::models::categories::CategoryCreate,
            api::models::categories::CategoryUpdate,
            api::models::categories::CategoryResponse,
            api::models::products::ProductCreate,
            api::models::products::ProductUpdate,
            api::models::products::ProductResponse,
            api::models::cart::CartItemCreate,
            api::models::cart::CartItemUpdate,
            api::models::cart::CartItemResponse,
            api::models::cart::CartResponse,
            api::models::cart::CartClearResponse,
            api::models::orders::CheckoutRequest,
            api::models::orders::OrderStatusUpdate,
            api::models::orders::OrderItemResponse,
            api::models::orders::OrderResponse,
            api::models::gullak::GullakAccountCreate,
            api::models::gullak::DepositRequest,
            api::models::gullak::AutopayUpdate,
            api::models::gullak::GullakAccountResponse,
            api::models::gullak::GullakTransactionResponse,
            api::models::gullak::DepositResponse,
            api::models::admin::OrderSummary,
            api::models::admin::GullakSummary,
            api::models::admin::DashboardStats,
            db::models::orders::OrderStatus,
            db::models::gullak::PaymentFrequency,
            db::models::gullak::GullakStatus,
            db::models::gullak::GullakTransactionType,
            db::models::gullak::GullakTransactionStatus,
            pricing::JewelryType,
            pricing::BillingMode,
            pricing::PricingInput,
            pricing::PricingBreakdown,
            rates::Metal,
            rates::MetalRates,
            gullak::autopay::SweepReport,
        )
    ),
    tags(
        (name = "auth", description = "Registration, login and the current session"),
        (name = "market_rates", description = "Per-gram gold and silver rates"),
        (name = "pricing", description = "Price previews for arbitrary product inputs"),
        (name = "categories", description = "Catalog categories"),
        (name = "products", description = "Catalog products priced at the current rate"),
        (name = "cart", description = "The caller's shopping cart"),
        (name = "orders", description = "Checkout and order history"),
        (name = "gullak", description = "Recurring savings plans towards a gold or silver purchase"),
        (name = "admin", description = "Back-office dashboard and fulfilment"),
    )
)]
pub struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::ApiDoc;
    use utoipa::OpenApi;

    #[test]
    fn test_document_registers_security_schemes() {
        let doc = ApiDoc::openapi();
        let components = doc.components.expect("components should be present");
        assert!(components.security_schemes.contains_key("BearerAuth"));
        assert!(components.security_schemes.contains_key("CookieAuth"));
    }

    #[test]
    fn test_document_covers_every_area() {
        let doc = ApiDoc::openapi();
        for path in [
            "/api/auth/login",
            "/api/market-rates",
            "/api/pricing/calculate",
            "/api/products/{product_id}",
            "/api/cart/{item_id}",
            "/api/orders",
            "/api/gullak/accounts/{account_id}/deposits",
            "/api/admin/orders/{order_id}/status",
        ] {
            assert!(doc.paths.paths.contains_key(path), "missing {path}");
        }
    }

    #[test]
    fn test_id_filters_are_uuid_strings() {
        let doc = serde_json::to_value(ApiDoc::openapi()).unwrap();
        for (path, param) in [("/api/products", "category_id"), ("/api/admin/gullak/accounts", "user_id")] {
            let params = doc["paths"][path]["get"]["parameters"].as_array().unwrap();
            let found = params
                .iter()
                .find(|p| p["name"] == param)
                .unwrap_or_else(|| panic!("{path} should document {param}"));
            assert_eq!(found["in"], "query");
            assert_eq!(found["schema"]["format"], "uuid");
        }
    }
}
