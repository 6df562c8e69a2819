//! Request extractors with the agent's error shape.

use axum::extract::FromRequest;

use crate::error::AppError;

/// `axum::Json` whose rejection (missing content type, malformed body,
/// missing fields) is reported as a 400 `AppError` instead of axum's plain
/// text response.
#[derive(Debug, FromRequest)]
#[from_request(via(axum::Json), rejection(AppError))]
pub struct ApiJson<T>(pub T);
