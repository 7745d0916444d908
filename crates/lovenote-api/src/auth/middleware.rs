/// Authentication middleware for protecting routes
///
/// Extracts and validates the bearer access token from the Authorization
/// header. On success, adds [`AuthenticatedUser`] to request extensions.
/// The gate never touches the store.
use super::jwt::{Claims, TokenError};
use crate::audit::{audit_log, AuditEvent, ClientInfo};
use crate::error::{ApiError, AppError};
use crate::state::AppState;
use axum::{
    extract::{Request, State},
    http::{header, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use lovenote_core::StoreError;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

/// Authenticated caller, extracted in handlers with `Extension<AuthenticatedUser>`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthenticatedUser {
    pub user_id: i64,
    /// Token ID, for log correlation
    pub jti: String,
}

impl From<Claims> for AuthenticatedUser {
    fn from(claims: Claims) -> Self {
        Self {
            user_id: claims.user_id,
            jti: claims.jti,
        }
    }
}

/// Gate failures
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Missing Authorization header")]
    MissingAuthHeader,

    #[error("Invalid Authorization header format")]
    InvalidAuthHeader,

    #[error("Invalid token: {0}")]
    InvalidToken(#[from] TokenError),

    /// A gate ran without the scope an earlier gate should have inserted
    #[error("Missing {0} scope")]
    MissingScope(&'static str),

    #[error("Invalid path parameter: {0}")]
    InvalidPathParam(&'static str),

    #[error("Not a member of relationship {0}")]
    NotAMember(i64),

    #[error("Note {0} does not belong to this relationship")]
    NoteNotInRelationship(i64),

    #[error("Not the author of note {0}")]
    NotAuthor(i64),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AuthError::Store(err) => return AppError::from(err).into_response(),
            // Token problems share one body; expiry and bad signature look alike
            AuthError::MissingAuthHeader
            | AuthError::InvalidAuthHeader
            | AuthError::InvalidToken(_)
            | AuthError::MissingScope(_) => {
                (StatusCode::UNAUTHORIZED, "Invalid or expired token".to_string())
            }
            AuthError::InvalidPathParam(name) => {
                (StatusCode::BAD_REQUEST, format!("Invalid {name}"))
            }
            AuthError::NotAMember(_) => (
                StatusCode::UNAUTHORIZED,
                "You are not a member of this relationship".to_string(),
            ),
            AuthError::NoteNotInRelationship(_) => (
                StatusCode::BAD_REQUEST,
                "Note does not belong to this relationship".to_string(),
            ),
            AuthError::NotAuthor(_) => (
                StatusCode::UNAUTHORIZED,
                "You are not the author of this note".to_string(),
            ),
        };

        let code = if status == StatusCode::BAD_REQUEST {
            "BAD_REQUEST"
        } else {
            "UNAUTHORIZED"
        };
        (status, Json(ApiError::new(code, message))).into_response()
    }
}

/// Pull the token out of `Authorization: Bearer <token>`
pub fn bearer_token(headers: &axum::http::HeaderMap) -> Result<&str, AuthError> {
    let auth_header = headers
        .get(header::AUTHORIZATION)
        .ok_or(AuthError::MissingAuthHeader)?
        .to_str()
        .map_err(|_| AuthError::InvalidAuthHeader)?;

    auth_header
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or(AuthError::InvalidAuthHeader)
}

/// Authentication middleware that requires a valid access token
///
/// ```ignore
/// let app = Router::new()
///     .route("/protected", get(handler))
///     .route_layer(middleware::from_fn_with_state(state.clone(), auth_middleware));
/// ```
pub async fn auth_middleware(
    State(state): State<Arc<AppState>>,
    mut request: Request,
    next: Next,
) -> Result<Response, AuthError> {
    let claims = match bearer_token(request.headers())
        .and_then(|token| state.tokens.validate(token).map_err(AuthError::from))
    {
        Ok(claims) => claims,
        Err(e) => {
            audit_log(&AuditEvent::InvalidToken {
                reason: e.to_string(),
                client: ClientInfo::from_headers(request.headers()),
            });
            return Err(e);
        }
    };

    request
        .extensions_mut()
        .insert(AuthenticatedUser::from(claims));

    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderMap;

    #[test]
    fn test_bearer_token_extraction() {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, "Bearer abc.def.ghi".parse().unwrap());
        assert_eq!(bearer_token(&headers).unwrap(), "abc.def.ghi");
    }

    #[test]
    fn test_bearer_token_missing_header() {
        assert!(matches!(
            bearer_token(&HeaderMap::new()),
            Err(AuthError::MissingAuthHeader)
        ));
    }

    #[test]
    fn test_bearer_token_wrong_scheme() {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, "Basic dXNlcjpwYXNz".parse().unwrap());
        assert!(matches!(
            bearer_token(&headers),
            Err(AuthError::InvalidAuthHeader)
        ));

        headers.insert(header::AUTHORIZATION, "Bearer ".parse().unwrap());
        assert!(matches!(
            bearer_token(&headers),
            Err(AuthError::InvalidAuthHeader)
        ));
    }

    #[test]
    fn test_token_errors_share_status_and_body() {
        let expired = AuthError::InvalidToken(TokenError::Expired).into_response();
        let forged = AuthError::InvalidToken(TokenError::InvalidSignature).into_response();

        assert_eq!(expired.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(forged.status(), StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn test_gate_statuses() {
        assert_eq!(
            AuthError::InvalidPathParam("relationship id")
                .into_response()
                .status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AuthError::NotAMember(1).into_response().status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            AuthError::NoteNotInRelationship(1).into_response().status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AuthError::Store(StoreError::Database("down".into()))
                .into_response()
                .status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
