//! Repository implementations for database access.
//!
//! This module provides repository structs for each table in the system. Most implement the
//! [`Repository`] trait; append-only tables ([`MarketRates`], [`GullakTransactions`]) only expose
//! the operations that make sense for them.
//!
//! # Design Pattern
//!
//! Each repository:
//! - Wraps a borrowed `PgConnection` (a pool connection or an open transaction)
//! - Provides strongly-typed CRUD operations
//! - Handles query construction and parameter binding
//! - Returns domain models from [`crate::db::models`]
//!
//! # Available Repositories
//!
//! - [`Users`]: accounts, roles and credentials
//! - [`Categories`]: catalog categories
//! - [`Products`]: catalog products and stock
//! - [`Cart`]: per-user cart lines
//! - [`Orders`]: orders and their line items
//! - [`MarketRates`]: rate snapshots
//! - [`GullakAccounts`] / [`GullakTransactions`]: recurring savings plans and their ledger
//!
//! # Common Pattern
//!
//! ```ignore
//! use karat::db::handlers::{Products, Repository};
//!
//! async fn example(pool: &sqlx::PgPool) -> Result<(), Box<dyn std::error::Error>> {
//!     let mut tx = pool.begin().await?;
//!     let mut repo = Products::new(&mut tx);
//!
//!     if !repo.decrement_stock(product_id, 2).await? {
//!         // not enough stock, tx rolls back on drop
//!         return Ok(());
//!     }
//!
//!     tx.commit().await?;
//!     Ok(())
//! }
//! ```

pub mod cart;
pub mod categories;
pub mod gullak;
pub mod market_rates;
pub mod orders;
pub mod products;
pub mod repository;
pub mod users;

pub use cart::Cart;
pub use categories::Categories;
pub use gullak::{GullakAccounts, GullakTransactions};
pub use market_rates::MarketRates;
pub use orders::Orders;
pub use products::Products;
pub use repository::Repository;
pub use users::Users;
