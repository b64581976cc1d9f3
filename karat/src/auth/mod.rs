//! Authentication and authorization.
//!
//! Users log in with email and password via `/api/auth/login`. On success the server issues a JWT
//! (signed with `secret_key`) in an HTTP-only session cookie; the same token is also accepted in an
//! `Authorization: Bearer` header for non-browser clients. Tokens carry the user's id and role and
//! expire after `auth.security.jwt_expiry`. There is no server-side session store, so logout only
//! clears the cookie.
//!
//! # Modules
//!
//! - [`current_user`]: the [`CurrentUser`](crate::api::models::users::CurrentUser) extractor
//! - [`password`]: Argon2 password hashing
//! - [`permissions`]: the role table and the [`RequiresPermission`](permissions::RequiresPermission) extractor
//! - [`session`]: token and cookie handling
//!
//! # Usage in Handlers
//!
//! ```ignore
//! use karat::auth::permissions::{RequiresPermission, operation, resource};
//!
//! async fn update_order_status(
//!     State(state): State<AppState>,
//!     _: RequiresPermission<resource::Orders, operation::UpdateAll>,
//! ) -> Result<Json<OrderResponse>, Error> {
//!     ...
//! }
//! ```

pub mod current_user;
pub mod password;
pub mod permissions;
pub mod session;
