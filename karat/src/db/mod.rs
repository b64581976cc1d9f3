//! Database layer for data persistence and access.
//!
//! This module implements the data access layer using SQLx with PostgreSQL.
//! It follows the Repository pattern to provide clean abstractions over database operations.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────┐
//! │  Handlers   │  (API request handlers)
//! └──────┬──────┘
//!        │
//!        ↓
//! ┌─────────────┐
//! │ Repositories│  (db::handlers - business logic & queries)
//! └──────┬──────┘
//!        │
//!        ↓
//! ┌─────────────┐
//! │   Models    │  (db::models - database records)
//! └──────┬──────┘
//!        │
//!        ↓
//! ┌─────────────┐
//! │  PostgreSQL │
//! └─────────────┘
//! ```
//!
//! # Modules
//!
//! - [`handlers`]: Repository implementations for CRUD operations
//! - [`models`]: Database record structures matching table schemas
//! - [`errors`]: Database-specific error types
//!
//! # Repository Pattern
//!
//! The [`handlers`] module provides repository traits and implementations
//! for each database table. Repositories encapsulate all database access
//! for a specific entity type.
//!
//! ## Example Usage
//!
//! ```ignore
//! use karat::db::handlers::{Users, Repository};
//!
//! async fn example(pool: &sqlx::PgPool) -> Result<(), Box<dyn std::error::Error>> {
//!     let mut conn = pool.acquire().await?;
//!     let mut users = Users::new(&mut conn);
//!
//!     if let Some(user) = users.get_user_by_email("asha@example.com").await? {
//!         println!("Found user: {}", user.username);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! # Transactions
//!
//! Repositories borrow a `PgConnection`, so the caller decides the transaction boundary. Writes
//! spanning several tables (checkout, autopay, deposits) open a transaction and build each
//! repository from it; single reads use a plain pool connection.
//!
//! ```ignore
//! let mut tx = pool.begin().await?;
//! let account = GullakAccounts::new(&mut tx).lock_for_update(id).await?;
//! // ... insert the ledger row, apply the contribution ...
//! tx.commit().await?;
//! ```
//!
//! # Migrations
//!
//! Database migrations are managed by SQLx and located in the `migrations/` directory.
//! The [`crate::migrator`] function provides access to the migrator:
//!
//! ```ignore
//! karat::migrator().run(&pool).await?;
//! ```

pub mod errors;
pub mod handlers;
pub mod models;
