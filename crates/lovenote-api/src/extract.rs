//! Request extractors
//!
//! Wrappers over axum's `Json` and `Query` whose rejections render as
//! [`AppError::BadRequest`], so a malformed body or query string gets the
//! same `{code, message}` 400 as a validation failure.
//!
//! Author: hephaex@gmail.com

use crate::error::AppError;
use axum::extract::{FromRequest, FromRequestParts};

/// JSON request body
#[derive(Debug, FromRequest)]
#[from_request(via(axum::Json), rejection(AppError))]
pub struct ApiJson<T>(pub T);

/// Query string
#[derive(Debug, FromRequestParts)]
#[from_request(via(axum::extract::Query), rejection(AppError))]
pub struct ApiQuery<T>(pub T);
