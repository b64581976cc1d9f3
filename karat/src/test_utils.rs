//! Test utilities for integration testing (available with `test-utils` feature).

use std::sync::Arc;

use axum::http::{HeaderName, HeaderValue, header};
use axum_test::TestServer;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use sqlx::PgPool;
use uuid::Uuid;

use crate::config::{BackgroundServicesConfig, PasswordConfig, PoolSettings, ServiceToggle};
use crate::{
    AppState,
    api::models::users::{CurrentUser, Role, UserResponse},
    auth::session,
    cache::AppCache,
    db::{
        handlers::{Cart, Categories, GullakAccounts, MarketRates, Products, Repository, Users},
        models::{
            cart::CartItemCreateDBRequest,
            categories::{CategoryCreateDBRequest, CategoryDBResponse},
            gullak::{GullakAccountCreateDBRequest, GullakAccountDBResponse, PaymentFrequency},
            market_rates::{MarketRateCreateDBRequest, MarketRateDBResponse},
            products::{ProductCreateDBRequest, ProductDBResponse},
            users::UserCreateDBRequest,
        },
    },
    pricing::{BillingMode, JewelryType, PriceCalculator},
    rates::{Metal, MetalRates, RateFetcher},
    types::{CategoryId, ProductId, UserId},
};

pub async fn create_test_app(pool: PgPool) -> TestServer {
    let config = create_test_config();

    let app = crate::Application::new_with_pool(config, Some(pool))
        .await
        .expect("Failed to create application");

    app.into_test_server()
}

pub fn create_test_config() -> crate::config::Config {
    crate::config::Config {
        host: "127.0.0.1".to_string(),
        port: 0,
        database: crate::config::DatabaseConfig {
            pool: PoolSettings {
                max_connections: 4,
                min_connections: 0,
                ..Default::default()
            },
            // Will get overriden by the test pool
            url: "Something".to_string(),
            run_migrations: false,
        },
        admin_email: "admin@test.com".to_string(),
        secret_key: Some("test-secret-key-for-testing-only".to_string()),
        auth: crate::config::AuthConfig {
            password: PasswordConfig {
                // Cheap hashing keeps auth tests fast
                argon2_memory_kib: 128,
                argon2_iterations: 1,
                ..Default::default()
            },
            ..Default::default()
        },
        rates: crate::config::RatesConfig {
            providers: crate::config::ProvidersConfig {
                spot_url: None,
                ..Default::default()
            },
            ..Default::default()
        },
        background_services: BackgroundServicesConfig {
            rate_fetcher: ServiceToggle { enabled: false },
            gullak_autopay: ServiceToggle { enabled: false },
        },
        ..Default::default()
    }
}

/// State wired to `pool` without starting the application: no migrations, no background tasks.
pub fn create_test_state(pool: PgPool) -> AppState {
    let config = create_test_config();
    let rate_fetcher = RateFetcher::from_config(&config.rates).expect("Failed to build rate fetcher");

    AppState::builder()
        .db(pool)
        .cache(AppCache::new(&config.cache))
        .calculator(PriceCalculator::new(&config.pricing))
        .rate_fetcher(Arc::new(rate_fetcher))
        .config(config)
        .build()
}

async fn insert_user(pool: &PgPool, role: Role, prefix: &str) -> UserResponse {
    let mut conn = pool.acquire().await.expect("Failed to acquire connection");
    let mut users_repo = Users::new(&mut conn);
    let user_id = Uuid::new_v4();
    let username = format!("{prefix}_{}", user_id.simple());
    let email = format!("{username}@example.com");

    let user_create = UserCreateDBRequest {
        username,
        email,
        display_name: Some("Test User".to_string()),
        phone: None,
        role,
        password_hash: None,
    };

    let user = users_repo.create(&user_create).await.expect("Failed to create test user");
    UserResponse::from(user)
}

pub async fn create_test_user(pool: &PgPool, role: Role) -> UserResponse {
    insert_user(pool, role, "testuser").await
}

pub async fn create_test_admin_user(pool: &PgPool) -> UserResponse {
    insert_user(pool, Role::Admin, "testadmin").await
}

/// A bearer header carrying a session token for `user`, signed with the test secret.
pub fn auth_header(user: &UserResponse) -> (HeaderName, HeaderValue) {
    let current = CurrentUser::from(user.clone());
    let token = session::create_session_token(&current, &create_test_config()).expect("Failed to sign test token");
    let value = HeaderValue::from_str(&format!("Bearer {token}")).expect("Invalid header value");
    (header::AUTHORIZATION, value)
}

pub async fn create_test_category(pool: &PgPool, name: &str) -> CategoryDBResponse {
    let mut conn = pool.acquire().await.expect("Failed to acquire connection");
    Categories::new(&mut conn)
        .create(&CategoryCreateDBRequest {
            name: name.to_string(),
            slug: name.to_lowercase().replace(' ', "-"),
            description: None,
            image_url: None,
        })
        .await
        .expect("Failed to create test category")
}

/// 10 g of `material`, no extra charges, ten in stock.
pub fn product_request(name: &str, material: &str) -> ProductCreateDBRequest {
    ProductCreateDBRequest {
        category_id: None,
        name: name.to_string(),
        description: None,
        material: material.to_string(),
        jewelry_type: JewelryType::Real,
        weight: Decimal::from(10),
        making_charges: Decimal::ZERO,
        gemstones_cost: Decimal::ZERO,
        diamonds_cost: Decimal::ZERO,
        billing_mode: BillingMode::LiveRate,
        fixed_rate_per_gram: None,
        flat_price: None,
        stock: 10,
        image_url: None,
        is_featured: false,
        is_active: true,
    }
}

pub async fn create_test_product(pool: &PgPool, name: &str, material: &str) -> ProductDBResponse {
    create_test_product_in(pool, name, material, None).await
}

pub async fn create_test_product_in(pool: &PgPool, name: &str, material: &str, category_id: Option<CategoryId>) -> ProductDBResponse {
    let mut conn = pool.acquire().await.expect("Failed to acquire connection");
    let request = ProductCreateDBRequest {
        category_id,
        ..product_request(name, material)
    };
    Products::new(&mut conn)
        .create(&request)
        .await
        .expect("Failed to create test product")
}

pub async fn add_to_cart(pool: &PgPool, user_id: UserId, product_id: ProductId, quantity: i32) {
    let mut conn = pool.acquire().await.expect("Failed to acquire connection");
    Cart::new(&mut conn)
        .create(&CartItemCreateDBRequest {
            user_id,
            product_id,
            quantity,
        })
        .await
        .expect("Failed to add test cart item");
}

/// Persist a rate snapshot with 22k and 18k derived from `gold_24k`.
pub async fn create_test_rate(pool: &PgPool, gold_24k: Decimal, silver: Decimal) -> MarketRateDBResponse {
    let rates = MetalRates::from_gold_24k(gold_24k, silver).rounded();
    let mut conn = pool.acquire().await.expect("Failed to acquire connection");
    MarketRates::new(&mut conn)
        .create(&MarketRateCreateDBRequest {
            gold_24k: rates.gold_24k,
            gold_22k: rates.gold_22k,
            gold_18k: rates.gold_18k,
            silver: rates.silver,
            currency: "INR".to_string(),
            source: "test".to_string(),
        })
        .await
        .expect("Failed to create test rate")
}

/// A daily gold plan saving 400 a day towards 1000, first due on `next_payment_date`.
pub fn gullak_request(user_id: UserId, next_payment_date: NaiveDate) -> GullakAccountCreateDBRequest {
    GullakAccountCreateDBRequest {
        user_id,
        name: "Wedding fund".to_string(),
        metal: Metal::Gold,
        target_amount: Decimal::from(1000),
        installment_amount: Decimal::from(400),
        payment_frequency: PaymentFrequency::Daily,
        payment_day_of_week: None,
        payment_day_of_month: None,
        next_payment_date,
        auto_pay_enabled: true,
    }
}

pub async fn create_test_gullak_account(pool: &PgPool, request: GullakAccountCreateDBRequest) -> GullakAccountDBResponse {
    let mut conn = pool.acquire().await.expect("Failed to acquire connection");
    GullakAccounts::new(&mut conn)
        .create(&request)
        .await
        .expect("Failed to create test gullak account")
}
