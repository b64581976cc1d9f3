use crate::db::errors::DbError;
use crate::pricing::PricingError;
use crate::types::{Operation, Permission};
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error as ThisError;

#[derive(ThisError, Debug)]
pub enum Error {
    /// Authentication required but not provided
    #[error("Not authenticated")]
    Unauthenticated { message: Option<String> },

    /// User lacks required permissions for the operation
    #[error("Insufficient permissions to {action:?} {resource}")]
    InsufficientPermissions {
        required: Permission,
        action: Operation,
        resource: String,
    },

    /// Invalid request data or business rule violation
    #[error("{message}")]
    BadRequest { message: String },

    /// Requested resource not found
    #[error("{resource} with ID {id} not found")]
    NotFound { resource: String, id: String },

    /// Generic internal service error
    #[error("Failed to {operation}")]
    Internal { operation: String },

    /// Database operation error
    #[error(transparent)]
    Database(#[from] DbError),

    /// Unexpected error with full context chain
    #[error(transparent)]
    Other(#[from] anyhow::Error),

    /// Request conflicts with current state, e.g. not enough stock left
    #[error("Conflict: {message}")]
    Conflict { message: String },
}

impl Error {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::Unauthenticated { .. } => StatusCode::UNAUTHORIZED,
            Error::InsufficientPermissions { .. } => StatusCode::FORBIDDEN,
            Error::BadRequest { .. } => StatusCode::BAD_REQUEST,
            Error::NotFound { .. } => StatusCode::NOT_FOUND,
            Error::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            Error::Database(db_err) => match db_err {
                DbError::NotFound => StatusCode::NOT_FOUND,
                DbError::UniqueViolation { .. } => StatusCode::CONFLICT,
                DbError::ForeignKeyViolation { .. } => StatusCode::BAD_REQUEST,
                DbError::CheckViolation { .. } => StatusCode::BAD_REQUEST,
                DbError::ProtectedEntity { .. } => StatusCode::FORBIDDEN,
                DbError::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            Error::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Error::Conflict { .. } => StatusCode::CONFLICT,
        }
    }

    /// Returns a user-safe error message, without leaking internal implementation details
    pub fn user_message(&self) -> String {
        match self {
            Error::Unauthenticated { message } => message.clone().unwrap_or_else(|| "Authentication required".to_string()),
            Error::InsufficientPermissions { action, resource, .. } => {
                format!("Insufficient permissions to {action} {resource}")
            }
            Error::BadRequest { message } => message.clone(),
            Error::NotFound { resource, id } => {
                format!("{resource} with ID {id} not found")
            }
            Error::Internal { .. } => "Internal server error".to_string(),
            Error::Database(db_err) => match db_err {
                DbError::NotFound => "Resource not found".to_string(),
                DbError::UniqueViolation { constraint, table, .. } => unique_violation_message(table.as_deref(), constraint.as_deref()).0,
                DbError::ForeignKeyViolation { .. } => "Invalid reference to related resource".to_string(),
                DbError::CheckViolation { .. } => "Invalid data provided".to_string(),
                DbError::ProtectedEntity {
                    operation,
                    entity_type,
                    reason,
                    ..
                } => {
                    format!("Cannot {operation} {entity_type}: {reason}")
                }
                DbError::Other(_) => "Database error occurred".to_string(),
            },
            Error::Other(_) => "Internal server error".to_string(),
            Error::Conflict { message } => message.clone(),
        }
    }
}

/// Friendly message and resource name for the unique constraints the schema declares.
fn unique_violation_message(table: Option<&str>, constraint: Option<&str>) -> (String, &'static str) {
    match (table, constraint) {
        (Some("users"), Some(c)) if c.contains("email") => ("An account with this email address already exists".to_string(), "user"),
        (Some("users"), Some(c)) if c.contains("username") => ("This username is already taken".to_string(), "user"),
        (Some("categories"), Some(c)) if c.contains("slug") => ("A category with this slug already exists".to_string(), "category"),
        (Some("categories"), Some(c)) if c.contains("name") => ("A category with this name already exists".to_string(), "category"),
        (Some("cart_items"), _) => ("This product is already in the cart".to_string(), "cart_item"),
        _ => ("Resource already exists".to_string(), "unknown"),
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        match &self {
            Error::Database(DbError::Other(_)) | Error::Internal { .. } | Error::Other(_) => {
                tracing::error!("Internal service error: {:#}", self);
            }
            Error::Database(_) => {
                tracing::warn!("Database constraint error: {}", self);
            }
            Error::Unauthenticated { .. } | Error::InsufficientPermissions { .. } => {
                tracing::info!("Authorization error: {}", self);
            }
            Error::BadRequest { .. } | Error::NotFound { .. } => {
                tracing::debug!("Client error: {}", self);
            }
            Error::Conflict { .. } => {
                tracing::warn!("Conflict error: {}", self);
            }
        }

        let status = self.status_code();

        match &self {
            Error::Database(DbError::UniqueViolation { constraint, table, .. }) => {
                let (message, resource) = unique_violation_message(table.as_deref(), constraint.as_deref());
                (status, Json(json!({ "message": message, "resource": resource }))).into_response()
            }
            _ => (status, Json(json!({ "message": self.user_message() }))).into_response(),
        }
    }
}

impl From<PricingError> for Error {
    fn from(err: PricingError) -> Self {
        Error::BadRequest { message: err.to_string() }
    }
}

impl From<String> for Error {
    fn from(msg: String) -> Self {
        Error::Internal { operation: msg }
    }
}

/// Type alias for service operation results
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Resource;

    #[test]
    fn test_status_codes() {
        assert_eq!(Error::Unauthenticated { message: None }.status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            Error::InsufficientPermissions {
                required: Permission::Allow(Resource::Products, Operation::CreateAll),
                action: Operation::CreateAll,
                resource: "products".to_string(),
            }
            .status_code(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            Error::BadRequest {
                message: "nope".to_string()
            }
            .status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(Error::Database(DbError::NotFound).status_code(), StatusCode::NOT_FOUND);
        assert_eq!(
            Error::Database(DbError::UniqueViolation {
                constraint: Some("users_email_unique".to_string()),
                table: Some("users".to_string()),
                message: String::new(),
                conflicting_value: None,
            })
            .status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            Error::Internal {
                operation: "x".to_string()
            }
            .status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_internal_errors_do_not_leak_detail() {
        let err = Error::Other(anyhow::anyhow!("connection refused to 10.0.0.3"));
        assert_eq!(err.user_message(), "Internal server error");
    }

    #[test]
    fn test_unique_violation_messages() {
        let err = Error::Database(DbError::UniqueViolation {
            constraint: Some("users_username_unique".to_string()),
            table: Some("users".to_string()),
            message: String::new(),
            conflicting_value: None,
        });
        assert_eq!(err.user_message(), "This username is already taken");

        let err = Error::Database(DbError::UniqueViolation {
            constraint: Some("categories_slug_unique".to_string()),
            table: Some("categories".to_string()),
            message: String::new(),
            conflicting_value: None,
        });
        assert_eq!(err.user_message(), "A category with this slug already exists");
    }
}
