//! Error types for the permission service

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use common::error::DatabaseError;
use serde_json::json;
use thiserror::Error;
use tracing::error;

use crate::models::{FunctionId, RoleId, SectionId};

/// Failure of a permission repository operation
#[derive(Error, Debug)]
pub enum PermissionsError {
    #[error("a role named '{0}' already exists")]
    DuplicateRoleName(String),

    #[error("user '{user_name}' is already a member of role {role_id}")]
    DuplicateMembership { role_id: RoleId, user_name: String },

    #[error("role '{0}' not found")]
    RoleNotFound(String),

    #[error("user '{user_name}' is not a member of role {role_id}")]
    MembershipNotFound { role_id: RoleId, user_name: String },

    /// No role has been created yet
    #[error("no roles exist")]
    NoRoles,

    #[error("function {function_id} does not exist in section {section_id}")]
    InvalidGrant {
        section_id: SectionId,
        function_id: FunctionId,
    },

    #[error("{0}")]
    InvalidInput(String),

    #[error(transparent)]
    Store(#[from] DatabaseError),
}

impl From<sqlx::Error> for PermissionsError {
    fn from(err: sqlx::Error) -> Self {
        PermissionsError::Store(err.into())
    }
}

/// Type alias for repository results
pub type PermissionsResult<T> = Result<T, PermissionsError>;

/// Custom error type for the HTTP surface
#[derive(Error, Debug)]
pub enum ApiError {
    /// Missing or expired access cookie, or wrong access code
    #[error("Unauthorized")]
    Unauthorized,

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Internal server error")]
    InternalServerError,
}

impl From<PermissionsError> for ApiError {
    fn from(err: PermissionsError) -> Self {
        match err {
            PermissionsError::DuplicateRoleName(_)
            | PermissionsError::DuplicateMembership { .. } => ApiError::Conflict(err.to_string()),
            PermissionsError::RoleNotFound(_)
            | PermissionsError::MembershipNotFound { .. }
            | PermissionsError::NoRoles => ApiError::NotFound(err.to_string()),
            PermissionsError::InvalidGrant { .. } | PermissionsError::InvalidInput(_) => {
                ApiError::BadRequest(err.to_string())
            }
            PermissionsError::Store(e) => {
                error!("Permission store failure: {}", e);
                ApiError::InternalServerError
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            ApiError::Unauthorized => (StatusCode::UNAUTHORIZED, "Unauthorized".to_string()),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            ApiError::InternalServerError => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal server error".to_string(),
            ),
        };

        let body = Json(json!({
            "error": error_message,
        }));

        (status, body).into_response()
    }
}

/// Type alias for API results
pub type ApiResult<T> = Result<T, ApiError>;
