//! API handlers
//!
//! Author: hephaex@gmail.com

pub mod health;
pub mod invites;
pub mod notes;
pub mod relationships;
pub mod users;

use crate::auth::permissions::parse_id;
use crate::error::AppError;
use serde::Deserialize;
use utoipa::IntoParams;
use validator::Validate;

pub const DEFAULT_PAGE_SIZE: i64 = 10;
pub const MAX_PAGE_SIZE: i64 = 100;

/// `?limit=&page=` query; both optional, pages are 1-based
#[derive(Debug, Default, Deserialize, Validate, IntoParams)]
pub struct PageQuery {
    /// Items per page (1-100, default 10)
    #[validate(range(min = 1, max = 100))]
    pub limit: Option<i64>,
    /// Page number (default 1)
    #[validate(range(min = 1))]
    pub page: Option<i64>,
}

impl PageQuery {
    /// `(limit, offset)` for the store
    pub fn window(&self) -> (i64, i64) {
        let limit = self.limit.unwrap_or(DEFAULT_PAGE_SIZE);
        let page = self.page.unwrap_or(1);
        (limit, (page - 1).saturating_mul(limit))
    }
}

/// Parse an id taken from the URL path
///
/// Path ids are extracted as strings so a malformed id becomes our own 400
/// body rather than axum's plain-text rejection.
pub fn parse_path_id(raw: &str, what: &str) -> Result<i64, AppError> {
    parse_id(raw).ok_or_else(|| AppError::BadRequest(format!("Invalid {what}")))
}

/// A blank picture URL means "use the default"
pub fn or_default_picture(picture: String, default: &str) -> String {
    if picture.trim().is_empty() {
        default.to_string()
    } else {
        picture
    }
}
