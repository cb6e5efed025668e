//! Extractors whose rejections come back as `{code, message}` envelopes.

use axum::extract::{FromRequest, FromRequestParts};

use crate::users::error::UserError;

#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(UserError))]
pub struct JsonBody<T>(pub T);

#[derive(FromRequestParts)]
#[from_request(via(axum::extract::Query), rejection(UserError))]
pub struct QueryParams<T>(pub T);

#[derive(FromRequestParts)]
#[from_request(via(axum::extract::Path), rejection(UserError))]
pub struct PathParam<T>(pub T);
