//! Relationship and note permission gates
//!
//! Each gate reads the scope inserted by the gate before it, checks one
//! thing against the store and inserts a narrower scope. Route order is
//! fixed: `auth_middleware` -> `require_membership` -> `require_note_ownership`.
//! A gate that finds its predecessor's scope missing rejects the request.

use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    extract::{Path, Request, State},
    middleware::Next,
    response::Response,
};

use super::middleware::{AuthError, AuthenticatedUser};
use crate::audit::{audit_log, AuditEvent, ClientInfo};
use crate::state::AppState;

/// Caller verified as a member of `relationship_id`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelationshipScope {
    pub user_id: i64,
    pub relationship_id: i64,
}

/// Caller verified as the author of `note_id`, which lives in `relationship_id`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NoteScope {
    pub user_id: i64,
    pub relationship_id: i64,
    pub note_id: i64,
}

/// Positive integer id from a path segment
pub fn parse_id(raw: &str) -> Option<i64> {
    raw.parse::<i64>().ok().filter(|id| *id > 0)
}

fn path_id(params: &HashMap<String, String>, key: &str) -> Option<i64> {
    params.get(key).and_then(|raw| parse_id(raw))
}

fn deny(request: &Request, user_id: i64, resource: String, reason: &str) {
    audit_log(&AuditEvent::AccessDenied {
        user_id,
        resource,
        reason: reason.to_string(),
        client: ClientInfo::from_headers(request.headers()),
    });
}

/// Require the caller to be a member of the relationship in path param `id`
pub async fn require_membership(
    State(state): State<Arc<AppState>>,
    Path(params): Path<HashMap<String, String>>,
    mut request: Request,
    next: Next,
) -> Result<Response, AuthError> {
    let user = request
        .extensions()
        .get::<AuthenticatedUser>()
        .cloned()
        .ok_or(AuthError::MissingScope("authentication"))?;

    let relationship_id =
        path_id(&params, "id").ok_or(AuthError::InvalidPathParam("relationship id"))?;

    if !state.store.is_member(relationship_id, user.user_id).await? {
        deny(
            &request,
            user.user_id,
            format!("relationship:{relationship_id}"),
            "not a member",
        );
        return Err(AuthError::NotAMember(relationship_id));
    }

    request.extensions_mut().insert(RelationshipScope {
        user_id: user.user_id,
        relationship_id,
    });
    Ok(next.run(request).await)
}

/// Require the caller to have written the note in path param `note_id`
///
/// Must run after [`require_membership`]. A note that does not exist, or
/// exists in another relationship, is a bad request.
pub async fn require_note_ownership(
    State(state): State<Arc<AppState>>,
    Path(params): Path<HashMap<String, String>>,
    mut request: Request,
    next: Next,
) -> Result<Response, AuthError> {
    let scope = request
        .extensions()
        .get::<RelationshipScope>()
        .copied()
        .ok_or(AuthError::MissingScope("relationship"))?;

    let note_id = path_id(&params, "note_id").ok_or(AuthError::InvalidPathParam("note id"))?;

    let note = state
        .store
        .find_note(note_id)
        .await?
        .filter(|note| note.relationship_id == scope.relationship_id)
        .ok_or(AuthError::NoteNotInRelationship(note_id))?;

    if note.author.id != scope.user_id {
        deny(
            &request,
            scope.user_id,
            format!("note:{note_id}"),
            "not the author",
        );
        return Err(AuthError::NotAuthor(note_id));
    }

    request.extensions_mut().insert(NoteScope {
        user_id: scope.user_id,
        relationship_id: scope.relationship_id,
        note_id,
    });
    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_parse_id_accepts_positive_integers() {
        assert_eq!(parse_id("42"), Some(42));
        assert_eq!(path_id(&params(&[("note_id", "7")]), "note_id"), Some(7));
    }

    #[test]
    fn test_parse_id_rejects_garbage() {
        assert_eq!(parse_id("abc"), None);
        assert_eq!(parse_id("-3"), None);
        assert_eq!(parse_id("0"), None);
        assert_eq!(parse_id("1.5"), None);
        assert_eq!(path_id(&params(&[]), "id"), None);
    }
}
