//! API route definitions
//!
//! Everything here is mounted under `/api`. Gates are attached with
//! `route_layer`, so the one added last runs first:
//! authenticate -> membership -> note ownership -> handler.
//!
//! Author: hephaex@gmail.com

use crate::auth::{auth_middleware, require_membership, require_note_ownership};
use crate::handlers::{invites, notes, relationships, users};
use crate::state::AppState;
use axum::{
    middleware,
    routing::{get, patch, post},
    Router,
};
use std::sync::Arc;

/// Create `/api` routes
pub fn api_routes(state: Arc<AppState>) -> Router<Arc<AppState>> {
    let authenticate = middleware::from_fn_with_state(state.clone(), auth_middleware);
    let membership = middleware::from_fn_with_state(state.clone(), require_membership);
    let ownership = middleware::from_fn_with_state(state, require_note_ownership);

    // Public routes (no authentication required)
    let public_routes = Router::new()
        .route(
            "/users",
            post(users::register_handler).get(users::search_users_handler),
        )
        .route("/users/login", post(users::login_handler))
        .route("/users/refresh", post(users::refresh_handler))
        .route("/users/:id", get(users::get_user_handler))
        .route(
            "/relationships/:id",
            get(relationships::get_relationship_handler),
        );

    // Any authenticated caller
    let authenticated_routes = Router::new()
        .route("/users/logout", post(users::logout_handler))
        .route(
            "/users/me",
            get(users::me_handler)
                .patch(users::update_me_handler)
                .delete(users::delete_me_handler),
        )
        .route(
            "/relationships",
            post(relationships::create_relationship_handler)
                .get(relationships::list_relationships_handler),
        )
        .route("/invites", get(invites::list_invites_handler))
        .route(
            "/invites/:id",
            post(invites::accept_invite_handler).delete(invites::delete_invite_handler),
        )
        .route_layer(authenticate.clone());

    // Members of relationship `:id`
    let member_routes = Router::new()
        .route(
            "/relationships/:id",
            patch(relationships::update_relationship_handler)
                .delete(relationships::delete_relationship_handler),
        )
        .route(
            "/relationships/:id/members",
            get(relationships::list_members_handler),
        )
        .route(
            "/relationships/:id/notes",
            post(notes::create_note_handler).get(notes::list_notes_handler),
        )
        .route(
            "/relationships/:id/invite",
            post(relationships::invite_handler),
        )
        .route_layer(membership.clone())
        .route_layer(authenticate.clone());

    // Author of note `:note_id` in relationship `:id`
    let author_routes = Router::new()
        .route(
            "/relationships/:id/notes/:note_id",
            patch(notes::update_note_handler).delete(notes::delete_note_handler),
        )
        .route_layer(ownership)
        .route_layer(membership)
        .route_layer(authenticate);

    Router::new()
        .merge(public_routes)
        .merge(authenticated_routes)
        .merge(member_routes)
        .merge(author_routes)
}
