//! HTTP request handlers for all API endpoints.
//!
//! This module contains Axum route handlers organized by resource type.
//! Each handler is responsible for:
//! - Request validation and deserialization
//! - Authentication and authorization checks
//! - Business logic execution via database repositories
//! - Response serialization
//!
//! # Handler Modules
//!
//! - [`auth`]: Registration, login, logout and the current session
//! - [`market_rates`]: Current rate snapshot and rate history
//! - [`pricing`]: Price previews for arbitrary product inputs
//! - [`categories`]: Catalog categories
//! - [`products`]: Catalog products, priced at the current rate
//! - [`cart`]: The caller's shopping cart
//! - [`orders`]: Checkout and order history
//! - [`gullak`]: Recurring savings plans, deposits and their ledger
//! - [`admin`]: Back-office dashboard, user roles, order fulfilment and manual triggers
//!
//! # Authentication
//!
//! Handlers take a [`crate::api::models::users::CurrentUser`] or a
//! [`crate::auth::permissions::RequiresPermission`] extractor. Both accept the session cookie or
//! an `Authorization: Bearer` token.
//!
//! # Error Handling
//!
//! Handlers return [`crate::errors::Error`] which automatically converts to
//! appropriate HTTP status codes and JSON error responses.

pub mod admin;
pub mod auth;
pub mod cart;
pub mod categories;
pub mod gullak;
pub mod market_rates;
pub mod orders;
pub mod pricing;
pub mod products;
