//! Database record models matching table schemas.
//!
//! Each table has a create request, an optional update request (where `None` leaves a column
//! unchanged) and a response type. Row structs deriving `sqlx::FromRow` stay private to the
//! repositories in [`crate::db::handlers`] and are converted into these responses.
//!
//! Database models are distinct from the API models in [`crate::api::models`], which convert from
//! them with `From` impls.

pub mod cart;
pub mod categories;
pub mod gullak;
pub mod market_rates;
pub mod orders;
pub mod products;
pub mod users;
