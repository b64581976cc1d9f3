//! # karat: storefront and back office for a jewelry retailer
//!
//! `karat` serves a JSON API for a jewelry shop whose prices move with the bullion market. Gold
//! and silver rates are pulled from upstream price APIs on a schedule, and every product, cart and
//! order is priced from the latest snapshot at the moment it is read.
//!
//! ## What It Does
//!
//! - **Catalog**: categories and products, each priced from weight, purity, making charges and
//!   stones at the current per-gram rate, plus GST. Imitation pieces carry a flat price.
//! - **Shopping**: a per-user cart and a transactional checkout that snapshots prices, decrements
//!   stock and writes the order in one go.
//! - **Gullak savings**: recurring plans that accumulate money towards a gold or silver purchase.
//!   A background sweep charges due installments and converts each into grams at the day's rate.
//! - **Back office**: dashboard counters, user roles, order fulfilment and manual triggers for the
//!   rate refresh and the autopay sweep.
//!
//! ## Architecture
//!
//! The HTTP layer is [Axum](https://github.com/tokio-rs/axum) on top of PostgreSQL through sqlx.
//! Requests authenticate with a signed session token carried in an HTTP-only cookie or a bearer
//! header ([`auth`]), reach a handler in [`api::handlers`], and talk to the database through the
//! repositories in [`db`]. Pricing is pure arithmetic in [`pricing`]; rate acquisition lives in
//! [`rates`] and the savings ledger in [`gullak`].
//!
//! **Background services** run alongside the server: the market rate fetcher
//! ([`rates::scheduler`]) and the Gullak autopay sweep ([`gullak::autopay`]). Both stop through a
//! shared cancellation token when the server shuts down.
//!
//! ## Quick Start
//!
//! ```no_run
//! use clap::Parser;
//! use karat::{Application, Config};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let args = karat::config::Args::parse();
//!     let config = Config::load(&args)?;
//!
//!     karat::telemetry::init_telemetry(config.log_format)?;
//!
//!     let app = Application::new(config).await?;
//!     app.serve(async {
//!         tokio::signal::ctrl_c().await.expect("Failed to listen for Ctrl+C");
//!     })
//!     .await?;
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Database Setup
//!
//! Migrations run on startup when `database.run_migrations` is set. They can also be applied by
//! hand:
//!
//! ```no_run
//! # use sqlx::PgPool;
//! # async fn example(pool: PgPool) -> Result<(), sqlx::migrate::MigrateError> {
//! karat::migrator().run(&pool).await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Configuration
//!
//! See the [`config`] module for configuration options.

pub mod api;
pub mod auth;
pub mod cache;
pub mod config;
pub mod db;
pub mod errors;
pub mod gullak;
mod openapi;
pub mod pricing;
pub mod rates;
pub mod telemetry;
pub mod types;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

use std::sync::Arc;

use axum::http::{self, HeaderValue};
use axum::{
    Router,
    routing::{get, patch, post},
};
use axum_prometheus::PrometheusMetricLayer;
use bon::Builder;
use sqlx::{PgPool, postgres::PgPoolOptions};
use tokio::net::TcpListener;
use tokio_util::sync::{CancellationToken, DropGuard};
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::{Level, debug, error, info, instrument};
use utoipa::OpenApi;
use utoipa_rapidoc::RapiDoc;

use crate::{
    api::models::users::Role,
    auth::password,
    cache::AppCache,
    config::CorsOrigin,
    db::{
        handlers::{Repository, Users},
        models::users::{UserCreateDBRequest, UserUpdateDBRequest},
    },
    openapi::ApiDoc,
    pricing::PriceCalculator,
    rates::RateFetcher,
};

pub use config::Config;
pub use types::UserId;

/// Application state shared across all request handlers.
///
/// # Example
///
/// ```ignore
/// let state = AppState::builder()
///     .db(pool)
///     .cache(AppCache::new(&config.cache))
///     .calculator(PriceCalculator::new(&config.pricing))
///     .rate_fetcher(Arc::new(RateFetcher::from_config(&config.rates)?))
///     .config(config)
///     .build();
/// ```
#[derive(Clone, Builder)]
pub struct AppState {
    pub db: PgPool,
    pub config: Config,
    /// Current rate and product listing pages
    pub cache: AppCache,
    pub calculator: PriceCalculator,
    /// Shared with the background refresh loop so both use one HTTP client
    pub rate_fetcher: Arc<RateFetcher>,
}

/// Get the karat database migrator
pub fn migrator() -> sqlx::migrate::Migrator {
    sqlx::migrate!("./migrations")
}

/// Make sure `email` belongs to an admin account.
///
/// Creates the account when missing. An existing account is promoted to admin and, when
/// `password` is given, has its password replaced. Safe to call on every startup.
#[instrument(skip_all)]
pub async fn create_initial_admin_user(email: &str, password: Option<&str>, db: &PgPool) -> errors::Result<UserId> {
    let password_hash = password.map(password::hash_string).transpose()?;

    let mut tx = db.begin().await.map_err(|e| errors::Error::Database(e.into()))?;
    let mut user_repo = Users::new(&mut tx);

    let user_id = if let Some(existing_user) = user_repo.get_user_by_email(email).await? {
        user_repo
            .update(
                existing_user.id,
                &UserUpdateDBRequest {
                    display_name: None,
                    phone: None,
                    role: Some(Role::Admin),
                    password_hash,
                },
            )
            .await?;
        existing_user.id
    } else {
        let created = user_repo
            .create(&UserCreateDBRequest {
                username: email.to_string(),
                email: email.to_string(),
                display_name: None,
                phone: None,
                role: Role::Admin,
                password_hash,
            })
            .await?;
        info!("Created initial admin user {}", email);
        created.id
    };

    tx.commit().await.map_err(|e| errors::Error::Database(e.into()))?;
    Ok(user_id)
}

/// Connect to the configured database and apply migrations when enabled.
async fn setup_database(config: &Config) -> anyhow::Result<PgPool> {
    let settings = &config.database.pool;
    let pool = PgPoolOptions::new()
        .max_connections(settings.max_connections)
        .min_connections(settings.min_connections)
        .acquire_timeout(settings.acquire_timeout)
        .idle_timeout(settings.idle_timeout)
        .connect(&config.database.url)
        .await?;

    if config.database.run_migrations {
        info!("Applying database migrations");
        migrator().run(&pool).await?;
    }

    create_initial_admin_user(&config.admin_email, config.admin_password.as_deref(), &pool)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to create initial admin user: {}", e))?;

    Ok(pool)
}

/// Create CORS layer from configuration
fn create_cors_layer(config: &Config) -> anyhow::Result<CorsLayer> {
    let cors_config = &config.auth.security.cors;

    // `AllowOrigin::list` rejects `*`, so a wildcard anywhere means any origin
    let allow_origin = if cors_config.allowed_origins.iter().any(|o| matches!(o, CorsOrigin::Wildcard)) {
        AllowOrigin::any()
    } else {
        let mut origins = Vec::new();
        for origin in &cors_config.allowed_origins {
            if let CorsOrigin::Url(url) = origin {
                origins.push(url.as_str().trim_end_matches('/').parse::<HeaderValue>()?);
            }
        }
        AllowOrigin::list(origins)
    };

    let mut cors = CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([
            http::Method::GET,
            http::Method::POST,
            http::Method::PATCH,
            http::Method::DELETE,
        ])
        .allow_headers([http::header::CONTENT_TYPE, http::header::AUTHORIZATION])
        .allow_credentials(cors_config.allow_credentials)
        .expose_headers(vec![http::header::LOCATION]);

    if let Some(max_age) = cors_config.max_age {
        cors = cors.max_age(std::time::Duration::from_secs(max_age));
    }

    Ok(cors)
}

/// Build the main application router with all endpoints and middleware.
///
/// Besides the `/api` routes this mounts `/healthz`, the OpenAPI document at
/// `/api-docs/openapi.json` (browsable at `/docs`), and `/internal/metrics` when metrics are
/// enabled. CORS and request tracing wrap everything.
#[instrument(skip_all)]
pub fn build_router(state: &AppState) -> anyhow::Result<Router> {
    use crate::api::handlers;

    let api_routes = Router::new()
        // Session
        .route("/auth/register", post(handlers::auth::register))
        .route("/auth/login", post(handlers::auth::login))
        .route("/auth/logout", post(handlers::auth::logout))
        .route("/auth/me", get(handlers::auth::me))
        // Rates and pricing
        .route("/market-rates", get(handlers::market_rates::get_current_rate))
        .route("/market-rates/history", get(handlers::market_rates::list_rate_history))
        .route("/pricing/calculate", post(handlers::pricing::calculate_price))
        // Catalog
        .route(
            "/categories",
            get(handlers::categories::list_categories).post(handlers::categories::create_category),
        )
        .route(
            "/categories/{category_id}",
            get(handlers::categories::get_category)
                .patch(handlers::categories::update_category)
                .delete(handlers::categories::delete_category),
        )
        .route(
            "/products",
            get(handlers::products::list_products).post(handlers::products::create_product),
        )
        .route(
            "/products/{product_id}",
            get(handlers::products::get_product)
                .patch(handlers::products::update_product)
                .delete(handlers::products::delete_product),
        )
        // Cart and orders
        .route(
            "/cart",
            get(handlers::cart::get_cart)
                .post(handlers::cart::add_to_cart)
                .delete(handlers::cart::clear_cart),
        )
        .route(
            "/cart/{item_id}",
            patch(handlers::cart::update_cart_item).delete(handlers::cart::remove_cart_item),
        )
        .route("/orders", get(handlers::orders::list_orders).post(handlers::orders::checkout))
        .route("/orders/{order_id}", get(handlers::orders::get_order))
        // Gullak
        .route(
            "/gullak/accounts",
            get(handlers::gullak::list_accounts).post(handlers::gullak::create_account),
        )
        .route("/gullak/accounts/{account_id}", get(handlers::gullak::get_account))
        .route("/gullak/accounts/{account_id}/deposits", post(handlers::gullak::deposit))
        .route("/gullak/accounts/{account_id}/autopay", patch(handlers::gullak::set_autopay))
        .route(
            "/gullak/accounts/{account_id}/transactions",
            get(handlers::gullak::list_transactions),
        )
        // Back office
        .route("/admin/stats", get(handlers::admin::get_stats))
        .route("/admin/users", get(handlers::admin::list_users))
        .route("/admin/users/{user_id}/role", patch(handlers::admin::update_user_role))
        .route("/admin/orders", get(handlers::admin::list_all_orders))
        .route("/admin/orders/{order_id}/status", patch(handlers::admin::update_order_status))
        .route("/admin/gullak/accounts", get(handlers::admin::list_all_gullak_accounts))
        .route("/admin/gullak/autopay", post(handlers::admin::trigger_autopay))
        .route("/admin/market-rates/refresh", post(handlers::admin::refresh_rates))
        .with_state(state.clone());

    let router = Router::new()
        .route("/healthz", get(|| async { "OK" }))
        .nest("/api", api_routes)
        .merge(RapiDoc::with_openapi("/api-docs/openapi.json", ApiDoc::openapi()).path("/docs"));

    let cors_layer = create_cors_layer(&state.config)?;
    let mut router = router.layer(cors_layer);

    if state.config.enable_metrics {
        let (prometheus_layer, metric_handle) = PrometheusMetricLayer::pair();
        router = router
            .route("/internal/metrics", get(|| async move { metric_handle.render() }))
            .layer(prometheus_layer);
    }

    let router = router.layer(
        TraceLayer::new_for_http()
            .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
            .on_request(DefaultOnRequest::new().level(Level::INFO))
            .on_response(DefaultOnResponse::new().level(Level::INFO)),
    );

    Ok(router)
}

/// Background tasks running alongside the HTTP server: the market rate fetcher and the Gullak
/// autopay sweep, each gated by its toggle in `background_services`.
///
/// Dropping this struct cancels the shared token through `drop_guard`, so tasks never outlive the
/// application that spawned them.
pub struct BackgroundServices {
    background_tasks: Vec<tokio::task::JoinHandle<()>>,
    shutdown_token: CancellationToken,
    // Pub so that we can disarm it if we want to
    pub drop_guard: Option<DropGuard>,
}

impl BackgroundServices {
    /// Gracefully shutdown all background tasks
    pub async fn shutdown(self) {
        self.shutdown_token.cancel();

        for handle in self.background_tasks {
            let _ = handle.await;
        }
    }
}

fn setup_background_services(state: &AppState) -> BackgroundServices {
    let shutdown_token = CancellationToken::new();
    let drop_guard = shutdown_token.clone().drop_guard();
    let mut background_tasks = Vec::new();
    let config = &state.config;

    if config.background_services.rate_fetcher.enabled {
        let fetcher = state.rate_fetcher.clone();
        let pool = state.db.clone();
        let cache = state.cache.clone();
        let interval = config.rates.fetch_interval;
        let token = shutdown_token.clone();
        background_tasks.push(tokio::spawn(async move {
            if let Err(e) = rates::scheduler::run_rate_fetch_loop(fetcher, pool, interval, cache, token).await {
                error!("Market rate fetcher exited with error: {e:#}");
            }
        }));
    } else {
        info!("Market rate fetcher disabled");
    }

    if config.background_services.gullak_autopay.enabled {
        let pool = state.db.clone();
        let interval = config.gullak.sweep_interval;
        let token = shutdown_token.clone();
        background_tasks.push(tokio::spawn(async move {
            if let Err(e) = gullak::autopay::run_autopay_loop(pool, interval, token).await {
                error!("Gullak autopay scheduler exited with error: {e:#}");
            }
        }));
    } else {
        info!("Gullak autopay scheduler disabled");
    }

    BackgroundServices {
        background_tasks,
        shutdown_token,
        drop_guard: Some(drop_guard),
    }
}

/// Main application struct that owns all resources and lifecycle.
///
/// # Lifecycle
///
/// 1. **Create**: [`Application::new`] connects to the database, runs migrations, makes sure the
///    admin account exists and starts background services
/// 2. **Serve**: [`Application::serve`] binds to a TCP port and starts handling requests
/// 3. **Shutdown**: When the shutdown signal is received, stops background services and closes
///    the pool
pub struct Application {
    router: Router,
    config: Config,
    pool: PgPool,
    bg_services: BackgroundServices,
}

impl Application {
    /// Create a new application instance with all resources initialized
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        Self::new_with_pool(config, None).await
    }

    /// Create an application on an existing pool.
    ///
    /// A supplied pool is used as-is: the caller owns its schema, so neither migrations nor the
    /// admin bootstrap run against it.
    pub async fn new_with_pool(config: Config, pool: Option<PgPool>) -> anyhow::Result<Self> {
        debug!("Starting karat with configuration: {:#?}", config);

        let pool = match pool {
            Some(pool) => pool,
            None => setup_database(&config).await?,
        };

        let rate_fetcher = RateFetcher::from_config(&config.rates)?;
        let app_state = AppState::builder()
            .db(pool.clone())
            .cache(AppCache::new(&config.cache))
            .calculator(PriceCalculator::new(&config.pricing))
            .rate_fetcher(Arc::new(rate_fetcher))
            .config(config.clone())
            .build();

        let bg_services = setup_background_services(&app_state);
        let router = build_router(&app_state)?;

        Ok(Self {
            router,
            config,
            pool,
            bg_services,
        })
    }

    /// Convert application into a test server (for tests)
    ///
    /// Background services are stopped when the server is built; tests drive sweeps and
    /// refreshes explicitly.
    #[cfg(any(test, feature = "test-utils"))]
    pub fn into_test_server(self) -> axum_test::TestServer {
        drop(self.bg_services);
        axum_test::TestServer::new(self.router.into_make_service()).expect("Failed to create test server")
    }

    /// Start serving the application
    pub async fn serve<F>(self, shutdown: F) -> anyhow::Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let bind_addr = self.config.bind_address();
        let listener = TcpListener::bind(&bind_addr).await?;
        info!(
            "karat listening on http://{}, available at http://localhost:{}",
            bind_addr, self.config.port
        );

        axum::serve(listener, self.router.into_make_service())
            .with_graceful_shutdown(shutdown)
            .await?;

        // Shutdown background services and wait for tasks to complete
        self.bg_services.shutdown().await;

        info!("Closing database connections...");
        self.pool.close().await;

        Ok(())
    }
}
