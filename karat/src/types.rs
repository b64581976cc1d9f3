//! Common type definitions and permission system types.
//!
//! # ID Types
//!
//! Entity IDs are UUIDs wrapped in type aliases so signatures say what they take. Market rate
//! snapshots are the exception: they are append-only rows keyed by a `BIGSERIAL`.
//!
//! # Permission System
//!
//! - [`Resource`]: What entity type is being accessed (Products, Orders, Gullak, ...)
//! - [`Operation`]: What action is being performed (Read, Create, Update, Delete)
//! - [`Permission`]: Authorization requirement combining resource and operation
//!
//! Operations come in two flavors:
//! - **All**: Unrestricted access to all entities (e.g., `ReadAll`, `UpdateAll`)
//! - **Own**: Restricted to user's own entities (e.g., `ReadOwn`, `CreateOwn`)

use std::fmt;
use uuid::Uuid;

pub type UserId = Uuid;
pub type CategoryId = Uuid;
pub type ProductId = Uuid;
pub type CartItemId = Uuid;
pub type OrderId = Uuid;
pub type GullakAccountId = Uuid;
pub type GullakTransactionId = Uuid;
pub type MarketRateId = i64;

/// Abbreviate a UUID to its first 8 characters for more readable logs and traces
/// Example: "550e8400-e29b-41d4-a716-446655440000" -> "550e8400"
pub fn abbrev_uuid(uuid: &Uuid) -> String {
    uuid.to_string().chars().take(8).collect()
}

// *-All means unrestricted access, *-Own means restricted to own resources
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    CreateAll,
    CreateOwn,
    ReadAll,
    ReadOwn,
    UpdateAll,
    UpdateOwn,
    DeleteAll,
    DeleteOwn,
    /// Triggering background jobs out of schedule
    SystemAccess,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Resource {
    Users,
    Categories,
    Products,
    Cart,
    Orders,
    MarketRates,
    Gullak,
    Dashboard,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Permission {
    /// Simple permission: (Resource, Operation)
    Allow(Resource, Operation),
    /// Any of the listed permissions suffices
    Any(Vec<Permission>),
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::CreateAll | Operation::CreateOwn => write!(f, "Create"),
            Operation::ReadAll | Operation::ReadOwn => write!(f, "Read"),
            Operation::UpdateAll | Operation::UpdateOwn => write!(f, "Update"),
            Operation::DeleteAll | Operation::DeleteOwn => write!(f, "Delete"),
            Operation::SystemAccess => write!(f, "Access"),
        }
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Resource::Users => "users",
            Resource::Categories => "categories",
            Resource::Products => "products",
            Resource::Cart => "cart",
            Resource::Orders => "orders",
            Resource::MarketRates => "market rates",
            Resource::Gullak => "gullak accounts",
            Resource::Dashboard => "dashboard",
        };
        f.write_str(name)
    }
}
