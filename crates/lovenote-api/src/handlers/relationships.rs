//! Relationship handlers
//!
//! Routes under `/relationships/{id}` run behind `require_membership`, so
//! handlers here read the verified [`RelationshipScope`] instead of the path.
//!
//! Author: hephaex@gmail.com

use super::{or_default_picture, parse_path_id};
use crate::audit::{audit_log, AuditEvent, ClientInfo};
use crate::auth::{AuthenticatedUser, RelationshipScope};
use crate::error::AppError;
use crate::extract::ApiJson;
use crate::state::AppState;
use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Extension, Json,
};
use lovenote_core::{Invite, NewInvite, Relationship, RelationshipUpdate, StoreError, UserSummary};
use serde::Deserialize;
use std::sync::Arc;
use utoipa::ToSchema;
use validator::Validate;

/// Relationship creation request
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreateRelationshipRequest {
    #[validate(length(min = 1, max = 100))]
    pub name: String,
    /// Defaults to the configured picture when omitted or empty
    #[validate(length(max = 2048))]
    pub picture: Option<String>,
}

/// Partial relationship update
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct UpdateRelationshipRequest {
    #[validate(length(min = 1, max = 100))]
    pub name: Option<String>,
    #[validate(length(max = 2048))]
    pub picture: Option<String>,
}

/// Invitation request
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct InviteRequest {
    pub invitee_id: i64,
    #[validate(length(max = 255))]
    #[serde(default)]
    pub body: String,
}

/// Create a relationship with the caller as its first member
#[utoipa::path(
    post,
    path = "/api/relationships",
    tag = "relationships",
    request_body = CreateRelationshipRequest,
    responses(
        (status = 201, description = "Relationship created", body = Relationship),
        (status = 400, description = "Invalid input", body = crate::error::ApiError),
        (status = 409, description = "Caller is already in the maximum number of relationships", body = crate::error::ApiError),
    ),
    security(("bearer_auth" = []))
)]
pub async fn create_relationship_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthenticatedUser>,
    ApiJson(request): ApiJson<CreateRelationshipRequest>,
) -> Result<impl IntoResponse, AppError> {
    request.validate()?;

    let picture = or_default_picture(
        request.picture.unwrap_or_default(),
        &state.config.auth.default_relationship_picture,
    );

    let relationship = state
        .store
        .create_relationship(&request.name, &picture, user.user_id)
        .await?;

    tracing::info!(
        relationship_id = relationship.id,
        user_id = user.user_id,
        "Relationship created"
    );
    Ok((StatusCode::CREATED, Json(relationship)))
}

/// Relationships the caller belongs to
#[utoipa::path(
    get,
    path = "/api/relationships",
    tag = "relationships",
    responses(
        (status = 200, description = "Caller's relationships", body = Vec<Relationship>),
        (status = 401, description = "Unauthorized", body = crate::error::ApiError),
    ),
    security(("bearer_auth" = []))
)]
pub async fn list_relationships_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthenticatedUser>,
) -> Result<Json<Vec<Relationship>>, AppError> {
    Ok(Json(state.store.list_user_relationships(user.user_id).await?))
}

/// Public view of a relationship
#[utoipa::path(
    get,
    path = "/api/relationships/{id}",
    tag = "relationships",
    params(("id" = i64, Path, description = "Relationship id")),
    responses(
        (status = 200, description = "Relationship", body = Relationship),
        (status = 404, description = "No such relationship", body = crate::error::ApiError),
    )
)]
pub async fn get_relationship_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Relationship>, AppError> {
    let id = parse_path_id(&id, "relationship id")?;
    state
        .store
        .find_relationship(id)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("Relationship {id} not found")))
}

/// Members of a relationship
#[utoipa::path(
    get,
    path = "/api/relationships/{id}/members",
    tag = "relationships",
    params(("id" = i64, Path, description = "Relationship id")),
    responses(
        (status = 200, description = "Members", body = Vec<UserSummary>),
        (status = 401, description = "Not a member", body = crate::error::ApiError),
    ),
    security(("bearer_auth" = []))
)]
pub async fn list_members_handler(
    State(state): State<Arc<AppState>>,
    Extension(scope): Extension<RelationshipScope>,
) -> Result<Json<Vec<UserSummary>>, AppError> {
    Ok(Json(state.store.list_members(scope.relationship_id).await?))
}

/// Rename a relationship or change its picture
#[utoipa::path(
    patch,
    path = "/api/relationships/{id}",
    tag = "relationships",
    params(("id" = i64, Path, description = "Relationship id")),
    request_body = UpdateRelationshipRequest,
    responses(
        (status = 200, description = "Updated relationship", body = Relationship),
        (status = 400, description = "Invalid input", body = crate::error::ApiError),
        (status = 401, description = "Not a member", body = crate::error::ApiError),
    ),
    security(("bearer_auth" = []))
)]
pub async fn update_relationship_handler(
    State(state): State<Arc<AppState>>,
    Extension(scope): Extension<RelationshipScope>,
    ApiJson(request): ApiJson<UpdateRelationshipRequest>,
) -> Result<Json<Relationship>, AppError> {
    request.validate()?;

    let relationship = state
        .store
        .update_relationship(
            scope.relationship_id,
            RelationshipUpdate {
                name: request.name,
                picture: request.picture.map(|p| {
                    or_default_picture(p, &state.config.auth.default_relationship_picture)
                }),
            },
        )
        .await?;
    Ok(Json(relationship))
}

/// Delete a relationship; only allowed for its last remaining member
#[utoipa::path(
    delete,
    path = "/api/relationships/{id}",
    tag = "relationships",
    params(("id" = i64, Path, description = "Relationship id")),
    responses(
        (status = 204, description = "Relationship deleted"),
        (status = 401, description = "Not a member, or other members remain", body = crate::error::ApiError),
    ),
    security(("bearer_auth" = []))
)]
pub async fn delete_relationship_handler(
    State(state): State<Arc<AppState>>,
    Extension(scope): Extension<RelationshipScope>,
    headers: HeaderMap,
) -> Result<StatusCode, AppError> {
    let deleted = state
        .store
        .delete_relationship_if_sole_member(scope.relationship_id, scope.user_id)
        .await?;

    if !deleted {
        audit_log(&AuditEvent::AccessDenied {
            user_id: scope.user_id,
            resource: format!("relationship:{}", scope.relationship_id),
            reason: "other members remain".to_string(),
            client: ClientInfo::from_headers(&headers),
        });
        return Err(AppError::Unauthorized(
            "Only the last remaining member can delete a relationship".to_string(),
        ));
    }

    tracing::info!(
        relationship_id = scope.relationship_id,
        user_id = scope.user_id,
        "Relationship deleted"
    );
    Ok(StatusCode::NO_CONTENT)
}

/// Invite a user into the relationship
#[utoipa::path(
    post,
    path = "/api/relationships/{id}/invite",
    tag = "invites",
    params(("id" = i64, Path, description = "Relationship id")),
    request_body = InviteRequest,
    responses(
        (status = 201, description = "Invite created", body = Invite),
        (status = 400, description = "Invalid input or self-invite", body = crate::error::ApiError),
        (status = 401, description = "Not a member", body = crate::error::ApiError),
        (status = 404, description = "Invitee does not exist", body = crate::error::ApiError),
        (status = 409, description = "Already a member or already invited", body = crate::error::ApiError),
    ),
    security(("bearer_auth" = []))
)]
pub async fn invite_handler(
    State(state): State<Arc<AppState>>,
    Extension(scope): Extension<RelationshipScope>,
    ApiJson(request): ApiJson<InviteRequest>,
) -> Result<(StatusCode, Json<Invite>), AppError> {
    request.validate()?;

    if request.invitee_id == scope.user_id {
        return Err(AppError::BadRequest("You cannot invite yourself".to_string()));
    }
    if state
        .store
        .find_user_by_id(request.invitee_id)
        .await?
        .is_none()
    {
        return Err(AppError::NotFound(format!(
            "User {} not found",
            request.invitee_id
        )));
    }
    if state
        .store
        .is_member(scope.relationship_id, request.invitee_id)
        .await?
    {
        return Err(AppError::Conflict(
            "User is already a member of this relationship".to_string(),
        ));
    }

    let invite = state
        .store
        .create_invite(NewInvite {
            relationship_id: scope.relationship_id,
            inviter_id: scope.user_id,
            invitee_id: request.invitee_id,
            body: request.body,
        })
        .await
        .map_err(|e| match e {
            StoreError::Duplicate(_) => AppError::Conflict("Invite already exists".to_string()),
            other => other.into(),
        })?;

    Ok((StatusCode::CREATED, Json(invite)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relationship_name_bounds() {
        let empty = CreateRelationshipRequest {
            name: String::new(),
            picture: None,
        };
        assert!(empty.validate().is_err());

        let long = CreateRelationshipRequest {
            name: "x".repeat(101),
            picture: None,
        };
        assert!(long.validate().is_err());

        let ok = CreateRelationshipRequest {
            name: "x".repeat(100),
            picture: None,
        };
        assert!(ok.validate().is_ok());
    }

    #[test]
    fn test_invite_body_bound() {
        let ok = InviteRequest {
            invitee_id: 2,
            body: "b".repeat(255),
        };
        assert!(ok.validate().is_ok());

        let long = InviteRequest {
            invitee_id: 2,
            body: "b".repeat(256),
        };
        assert!(long.validate().is_err());
    }
}
