//! API layer for HTTP request handling and data models.
//!
//! - **[`handlers`]**: Axum route handlers for all API endpoints
//! - **[`models`]**: Request/response data structures for API communication
//!
//! # API Structure
//!
//! Everything lives under `/api`:
//!
//! - **Authentication** (`/api/auth/*`): Registration, login, logout and the current session
//! - **Rates & pricing** (`/api/market-rates*`, `/api/pricing/calculate`): Public, no session needed
//! - **Catalog** (`/api/categories/*`, `/api/products/*`): Public reads, admin writes
//! - **Shopping** (`/api/cart/*`, `/api/orders/*`): The caller's own cart and orders
//! - **Gullak** (`/api/gullak/accounts/*`): The caller's savings plans
//! - **Back office** (`/api/admin/*`): Admin only
//!
//! # OpenAPI Documentation
//!
//! All endpoints are documented with `utoipa`. The document is served at `/api-docs/openapi.json`
//! and browsable at `/docs`.

pub mod handlers;
pub mod models;
