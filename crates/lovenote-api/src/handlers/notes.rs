//! Note handlers
//!
//! Author: hephaex@gmail.com

use crate::auth::{NoteScope, RelationshipScope};
use crate::error::AppError;
use crate::extract::{ApiJson, ApiQuery};
use crate::state::AppState;
use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    Extension, Json,
};
use chrono::{Datelike, Utc};
use lovenote_core::{NewNote, Note, NoteUpdate};
use serde::Deserialize;
use std::sync::Arc;
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

pub const DEFAULT_NOTE_COLOR: &str = "yellow";

/// Note creation request
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreateNoteRequest {
    #[validate(length(max = 100))]
    pub title: String,
    #[validate(length(max = 500))]
    pub content: String,
    #[serde(default)]
    pub position_x: f32,
    #[serde(default)]
    pub position_y: f32,
    /// Defaults to "yellow"
    #[validate(length(min = 1, max = 32))]
    pub color: Option<String>,
}

/// Partial note update
#[derive(Debug, Default, Deserialize, Validate, ToSchema)]
pub struct UpdateNoteRequest {
    #[validate(length(max = 100))]
    pub title: Option<String>,
    #[validate(length(max = 500))]
    pub content: Option<String>,
    pub position_x: Option<f32>,
    pub position_y: Option<f32>,
    #[validate(length(min = 1, max = 32))]
    pub color: Option<String>,
}

/// `?month=&year=`; both default to the current UTC month
#[derive(Debug, Deserialize, Validate, IntoParams)]
pub struct MonthQuery {
    #[validate(range(min = 1, max = 12))]
    pub month: Option<u32>,
    #[validate(range(min = 1970, max = 9999))]
    pub year: Option<i32>,
}

/// Post a note to the relationship board
#[utoipa::path(
    post,
    path = "/api/relationships/{id}/notes",
    tag = "notes",
    params(("id" = i64, Path, description = "Relationship id")),
    request_body = CreateNoteRequest,
    responses(
        (status = 201, description = "Note created", body = Note),
        (status = 400, description = "Invalid input", body = crate::error::ApiError),
        (status = 401, description = "Not a member", body = crate::error::ApiError),
    ),
    security(("bearer_auth" = []))
)]
pub async fn create_note_handler(
    State(state): State<Arc<AppState>>,
    Extension(scope): Extension<RelationshipScope>,
    ApiJson(request): ApiJson<CreateNoteRequest>,
) -> Result<impl IntoResponse, AppError> {
    request.validate()?;

    let note = state
        .store
        .create_note(NewNote {
            relationship_id: scope.relationship_id,
            author_id: scope.user_id,
            title: request.title,
            content: request.content,
            position_x: request.position_x,
            position_y: request.position_y,
            color: request
                .color
                .unwrap_or_else(|| DEFAULT_NOTE_COLOR.to_string()),
        })
        .await?;

    Ok((StatusCode::CREATED, Json(note)))
}

/// Notes posted during one calendar month, oldest first
#[utoipa::path(
    get,
    path = "/api/relationships/{id}/notes",
    tag = "notes",
    params(("id" = i64, Path, description = "Relationship id"), MonthQuery),
    responses(
        (status = 200, description = "Notes for the month", body = Vec<Note>),
        (status = 400, description = "Invalid month or year", body = crate::error::ApiError),
        (status = 401, description = "Not a member", body = crate::error::ApiError),
    ),
    security(("bearer_auth" = []))
)]
pub async fn list_notes_handler(
    State(state): State<Arc<AppState>>,
    Extension(scope): Extension<RelationshipScope>,
    ApiQuery(query): ApiQuery<MonthQuery>,
) -> Result<Json<Vec<Note>>, AppError> {
    query.validate()?;

    let now = Utc::now();
    let month = query.month.unwrap_or_else(|| now.month());
    let year = query.year.unwrap_or_else(|| now.year());

    let notes = state
        .store
        .list_notes_for_month(scope.relationship_id, year, month)
        .await?;
    Ok(Json(notes))
}

/// Edit one of the caller's notes
#[utoipa::path(
    patch,
    path = "/api/relationships/{id}/notes/{note_id}",
    tag = "notes",
    params(
        ("id" = i64, Path, description = "Relationship id"),
        ("note_id" = i64, Path, description = "Note id"),
    ),
    request_body = UpdateNoteRequest,
    responses(
        (status = 200, description = "Updated note", body = Note),
        (status = 400, description = "Invalid input or note not in this relationship", body = crate::error::ApiError),
        (status = 401, description = "Not a member or not the author", body = crate::error::ApiError),
    ),
    security(("bearer_auth" = []))
)]
pub async fn update_note_handler(
    State(state): State<Arc<AppState>>,
    Extension(scope): Extension<NoteScope>,
    ApiJson(request): ApiJson<UpdateNoteRequest>,
) -> Result<Json<Note>, AppError> {
    request.validate()?;

    let note = state
        .store
        .update_note(
            scope.note_id,
            NoteUpdate {
                title: request.title,
                content: request.content,
                position_x: request.position_x,
                position_y: request.position_y,
                color: request.color,
            },
        )
        .await?;
    Ok(Json(note))
}

/// Delete one of the caller's notes
#[utoipa::path(
    delete,
    path = "/api/relationships/{id}/notes/{note_id}",
    tag = "notes",
    params(
        ("id" = i64, Path, description = "Relationship id"),
        ("note_id" = i64, Path, description = "Note id"),
    ),
    responses(
        (status = 204, description = "Note deleted"),
        (status = 400, description = "Note not in this relationship", body = crate::error::ApiError),
        (status = 401, description = "Not a member or not the author", body = crate::error::ApiError),
    ),
    security(("bearer_auth" = []))
)]
pub async fn delete_note_handler(
    State(state): State<Arc<AppState>>,
    Extension(scope): Extension<NoteScope>,
) -> Result<StatusCode, AppError> {
    if !state.store.delete_note(scope.note_id).await? {
        return Err(AppError::NotFound(format!("Note {} not found", scope.note_id)));
    }
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_note_length_bounds() {
        let request = CreateNoteRequest {
            title: "t".repeat(100),
            content: "c".repeat(500),
            position_x: 0.0,
            position_y: 0.0,
            color: None,
        };
        assert!(request.validate().is_ok());

        let request = CreateNoteRequest {
            title: "t".repeat(101),
            ..request
        };
        assert!(request.validate().is_err());
    }

    #[test]
    fn test_month_query_bounds() {
        let bad = MonthQuery {
            month: Some(13),
            year: None,
        };
        assert!(bad.validate().is_err());

        let ok = MonthQuery {
            month: Some(2),
            year: Some(2024),
        };
        assert!(ok.validate().is_ok());
    }

    #[test]
    fn test_update_defaults_to_no_change() {
        let update = UpdateNoteRequest::default();
        assert!(update.validate().is_ok());
        assert!(update.title.is_none() && update.color.is_none());
    }
}
