use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// Uniform `{code, message}` wrapper returned by every operation.
#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct Envelope<T> {
    pub code: u16,
    pub message: T,
}

impl<T> Envelope<T> {
    pub fn new(status: StatusCode, message: T) -> Self {
        Self {
            code: status.as_u16(),
            message,
        }
    }

    pub fn ok(message: T) -> Self {
        Self::new(StatusCode::OK, message)
    }
}

impl<T: Serialize> IntoResponse for Envelope<T> {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(self)).into_response()
    }
}

/// Request body for user creation.
#[derive(Debug, Default, Deserialize)]
pub struct CreateUserRequest {
    pub name: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
    pub password_second: Option<String>,
    pub cellphone: Option<String>,
}

/// Request body for partial update. Absent fields are left untouched.
#[derive(Debug, Default, Deserialize)]
pub struct UpdateUserRequest {
    pub name: Option<String>,
    pub password: Option<String>,
    pub cellphone: Option<String>,
}

/// Query string of `GET /users/findUsers`.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FindUsersQuery {
    pub deleted: Option<String>,
    pub name: Option<String>,
    pub last_login_before: Option<String>,
    pub last_login_after: Option<String>,
}

/// Body of `POST /users/bulkCreate`. Entries are decoded one by one so a
/// malformed entry is reported instead of rejecting the whole batch.
#[derive(Debug, Deserialize)]
pub struct BulkCreateRequest {
    pub users: Vec<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkUserEntry {
    pub name: String,
    pub email: String,
    pub password: Option<String>,
    pub cellphone: Option<String>,
    pub status: Option<bool>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub last_login: Option<OffsetDateTime>,
}

#[derive(Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct BulkReport {
    pub success: usize,
    pub failure: usize,
    pub errors: Vec<BulkFailure>,
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct BulkFailure {
    pub user: serde_json::Value,
    pub error: String,
}
