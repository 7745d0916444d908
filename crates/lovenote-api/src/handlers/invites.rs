//! Invite handlers
//!
//! Invites are created under `/relationships/{id}/invite` (see
//! [`super::relationships::invite_handler`]); these endpoints belong to the
//! invitee and the inviter.
//!
//! Author: hephaex@gmail.com

use super::{parse_path_id, PageQuery};
use crate::audit::{audit_log, AuditEvent, ClientInfo};
use crate::auth::AuthenticatedUser;
use crate::error::AppError;
use crate::extract::ApiQuery;
use crate::state::AppState;
use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Extension, Json,
};
use lovenote_core::Invite;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::ToSchema;
use validator::Validate;

/// One page of pending invites
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct InviteListResponse {
    /// Total pending invites for the caller
    pub count: i64,
    pub invites: Vec<Invite>,
}

/// Returned when an invite is accepted
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct AcceptInviteResponse {
    pub message: String,
    pub relationship_id: i64,
}

fn deny(headers: &HeaderMap, user_id: i64, invite_id: i64, reason: &str) -> AppError {
    audit_log(&AuditEvent::AccessDenied {
        user_id,
        resource: format!("invite:{invite_id}"),
        reason: reason.to_string(),
        client: ClientInfo::from_headers(headers),
    });
    AppError::Unauthorized("You cannot act on this invite".to_string())
}

/// Pending invites addressed to the caller, newest first
#[utoipa::path(
    get,
    path = "/api/invites",
    tag = "invites",
    params(PageQuery),
    responses(
        (status = 200, description = "One page of invites", body = InviteListResponse),
        (status = 401, description = "Unauthorized", body = crate::error::ApiError),
    ),
    security(("bearer_auth" = []))
)]
pub async fn list_invites_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthenticatedUser>,
    ApiQuery(query): ApiQuery<PageQuery>,
) -> Result<Json<InviteListResponse>, AppError> {
    query.validate()?;
    let (limit, offset) = query.window();

    let (invites, count) = state
        .store
        .list_invites_for(user.user_id, limit, offset)
        .await?;
    Ok(Json(InviteListResponse { count, invites }))
}

/// Accept an invite and join its relationship
///
/// Only the invitee may accept. The invite is consumed in the same step that
/// adds the membership, so accepting twice fails with 404.
#[utoipa::path(
    post,
    path = "/api/invites/{id}",
    tag = "invites",
    params(("id" = i64, Path, description = "Invite id")),
    responses(
        (status = 201, description = "Joined the relationship", body = AcceptInviteResponse),
        (status = 401, description = "Caller is not the invitee", body = crate::error::ApiError),
        (status = 404, description = "No such invite", body = crate::error::ApiError),
        (status = 409, description = "Caller is already in the maximum number of relationships", body = crate::error::ApiError),
    ),
    security(("bearer_auth" = []))
)]
pub async fn accept_invite_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthenticatedUser>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, AppError> {
    let invite_id = parse_path_id(&id, "invite id")?;

    let invite = state
        .store
        .find_invite(invite_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Invite {invite_id} not found")))?;
    if invite.invitee_id != user.user_id {
        return Err(deny(&headers, user.user_id, invite_id, "not the invitee"));
    }

    let relationship_id = state.store.accept_invite(invite_id, user.user_id).await?;

    tracing::info!(
        invite_id,
        relationship_id,
        user_id = user.user_id,
        "Invite accepted"
    );
    Ok((
        StatusCode::CREATED,
        Json(AcceptInviteResponse {
            message: "User added to relationship".to_string(),
            relationship_id,
        }),
    ))
}

/// Decline (invitee) or withdraw (inviter) an invite
#[utoipa::path(
    delete,
    path = "/api/invites/{id}",
    tag = "invites",
    params(("id" = i64, Path, description = "Invite id")),
    responses(
        (status = 204, description = "Invite deleted"),
        (status = 401, description = "Caller is neither inviter nor invitee", body = crate::error::ApiError),
        (status = 404, description = "No such invite", body = crate::error::ApiError),
    ),
    security(("bearer_auth" = []))
)]
pub async fn delete_invite_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthenticatedUser>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Result<StatusCode, AppError> {
    let invite_id = parse_path_id(&id, "invite id")?;

    let invite = state
        .store
        .find_invite(invite_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Invite {invite_id} not found")))?;
    if user.user_id != invite.invitee_id && user.user_id != invite.inviter.id {
        return Err(deny(&headers, user.user_id, invite_id, "not inviter or invitee"));
    }

    if !state.store.delete_invite(invite_id).await? {
        return Err(AppError::NotFound(format!("Invite {invite_id} not found")));
    }
    Ok(StatusCode::NO_CONTENT)
}
