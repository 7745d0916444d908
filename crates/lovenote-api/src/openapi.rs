//! OpenAPI document served at `/api-docs/openapi.json`
//!
//! Author: hephaex@gmail.com

use crate::error::ApiError;
use crate::handlers::{health, invites, notes, relationships, users};
use lovenote_core::{Invite, Note, PublicUser, Relationship, UserProfile, UserSummary};
use utoipa::openapi::security::{Http, HttpAuthScheme, SecurityScheme};
use utoipa::{Modify, OpenApi};

#[derive(OpenApi)]
#[openapi(
    info(title = "LoveNote API", description = "Shared sticky notes for relationships"),
    paths(
        health::health_check,
        health::readiness_check,
        users::register_handler,
        users::login_handler,
        users::refresh_handler,
        users::logout_handler,
        users::search_users_handler,
        users::get_user_handler,
        users::me_handler,
        users::update_me_handler,
        users::delete_me_handler,
        relationships::create_relationship_handler,
        relationships::list_relationships_handler,
        relationships::get_relationship_handler,
        relationships::list_members_handler,
        relationships::update_relationship_handler,
        relationships::delete_relationship_handler,
        relationships::invite_handler,
        notes::create_note_handler,
        notes::list_notes_handler,
        notes::update_note_handler,
        notes::delete_note_handler,
        invites::list_invites_handler,
        invites::accept_invite_handler,
        invites::delete_invite_handler,
    ),
    components(schemas(
        ApiError,
        UserProfile,
        PublicUser,
        UserSummary,
        Relationship,
        Invite,
        Note,
        health::HealthResponse,
        health::ReadinessResponse,
        users::RegisterRequest,
        users::LoginRequest,
        users::AuthResponse,
        users::RefreshResponse,
        users::UpdateUserRequest,
        users::UserSearchResponse,
        relationships::CreateRelationshipRequest,
        relationships::UpdateRelationshipRequest,
        relationships::InviteRequest,
        notes::CreateNoteRequest,
        notes::UpdateNoteRequest,
        invites::InviteListResponse,
        invites::AcceptInviteResponse,
    )),
    modifiers(&BearerAuth),
    tags(
        (name = "health", description = "Liveness and readiness"),
        (name = "users", description = "Accounts, sessions and profiles"),
        (name = "relationships", description = "Relationship groups"),
        (name = "notes", description = "Notes on a relationship board"),
        (name = "invites", description = "Relationship invitations"),
    )
)]
pub struct ApiDoc;

/// Registers the `bearer_auth` scheme referenced by protected paths
struct BearerAuth;

impl Modify for BearerAuth {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(Http::new(HttpAuthScheme::Bearer)),
            );
        }
    }
}
