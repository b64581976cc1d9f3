//! API request and response data models.
//!
//! These structures define the public JSON contract and are kept separate from the database
//! models in [`crate::db::models`], so storage and API can evolve independently. Every model is
//! annotated with `utoipa` for the generated OpenAPI document. Monetary amounts are serialized as
//! decimal strings.
//!
//! # Model Categories
//!
//! - [`auth`]: registration, login and logout payloads
//! - [`users`]: profiles and roles
//! - [`categories`], [`products`]: the catalog
//! - [`cart`], [`orders`]: shopping and checkout
//! - [`market_rates`], [`pricing`]: live rates and price previews
//! - [`gullak`]: recurring savings plans
//! - [`admin`]: dashboard figures and back-office actions
//! - [`pagination`]: shared list parameters and wrapper

pub mod admin;
pub mod auth;
pub mod cart;
pub mod categories;
pub mod gullak;
pub mod market_rates;
pub mod orders;
pub mod pagination;
pub mod pricing;
pub mod products;
pub mod users;
