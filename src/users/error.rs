use axum::{
    extract::rejection::{JsonRejection, PathRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;
use uuid::Uuid;

use crate::users::dto::Envelope;

#[derive(Debug, Error)]
pub enum UserError {
    /// Caller input failed a precondition.
    #[error("{0}")]
    Validation(String),

    #[error("User already exists")]
    Conflict(String),

    #[error("User not found")]
    NotFound(Uuid),

    #[error("password hashing failed: {0}")]
    Hash(String),

    #[error(transparent)]
    Backend(#[from] sqlx::Error),

    #[error("{}", .0.body_text())]
    Body(#[from] JsonRejection),

    #[error("{}", .0.body_text())]
    Query(#[from] QueryRejection),

    #[error("{}", .0.body_text())]
    Path(#[from] PathRejection),
}

pub type UserResult<T> = Result<T, UserError>;

impl UserError {
    pub fn status(&self) -> StatusCode {
        match self {
            UserError::Validation(_)
            | UserError::Conflict(_)
            | UserError::Body(_)
            | UserError::Query(_)
            | UserError::Path(_) => StatusCode::BAD_REQUEST,
            UserError::NotFound(_) => StatusCode::NOT_FOUND,
            UserError::Hash(_) | UserError::Backend(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub(crate) fn missing(field: &str) -> Self {
        UserError::Validation(format!("Missing required field: {field}"))
    }
}

impl IntoResponse for UserError {
    fn into_response(self) -> Response {
        let status = self.status();
        match &self {
            UserError::Backend(e) => tracing::error!(error = %e, "backend error"),
            UserError::Hash(msg) => tracing::error!(error = %msg, "password hash error"),
            UserError::Conflict(email) => tracing::warn!(%email, "email already registered"),
            UserError::NotFound(id) => tracing::warn!(user_id = %id, "user not found"),
            UserError::Validation(msg) => tracing::warn!(reason = %msg, "validation failed"),
            UserError::Body(_) | UserError::Query(_) | UserError::Path(_) => {
                tracing::warn!(reason = %self, "request rejected")
            }
        }
        Envelope::new(status, self.to_string()).into_response()
    }
}
