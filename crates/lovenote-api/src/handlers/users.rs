//! User account handlers
//!
//! Registration, login, refresh-token rotation, logout, profiles and search.
//! The refresh token never appears in a JSON body; it travels only in the
//! `refresh_token` cookie scoped to the refresh endpoint.
//!
//! Author: hephaex@gmail.com

use super::{or_default_picture, parse_path_id, PageQuery};
use crate::audit::{audit_log, AuditEvent, ClientInfo};
use crate::auth::{AuthenticatedUser, Registration, TokenPair};
use crate::error::AppError;
use crate::extract::{ApiJson, ApiQuery};
use crate::state::AppState;
use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Extension, Json,
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use cookie::time::Duration;
use lovenote_core::{PublicUser, StoreError, User, UserProfile, UserSummary, UserUpdate};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

pub const REFRESH_COOKIE: &str = "refresh_token";
pub const REFRESH_COOKIE_PATH: &str = "/api/users/refresh";

// =============================================================================
// Request / response types
// =============================================================================

/// Registration request
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct RegisterRequest {
    #[validate(length(min = 3, max = 50))]
    pub username: String,
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 8, max = 128))]
    pub password: String,
    /// Defaults to the configured avatar when omitted or empty
    #[validate(length(max = 2048))]
    pub profile_picture: Option<String>,
}

/// Login request
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct LoginRequest {
    #[validate(length(min = 1, max = 50))]
    pub username: String,
    #[validate(length(min = 1, max = 128))]
    pub password: String,
}

/// Returned by registration and login
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct AuthResponse {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub profile_picture: String,
    /// Bearer access token
    pub access: String,
}

impl AuthResponse {
    fn new(user: &User, tokens: &TokenPair) -> Self {
        Self {
            id: user.id,
            username: user.username.clone(),
            email: user.email.clone(),
            profile_picture: user.profile_picture.clone(),
            access: tokens.access_token.clone(),
        }
    }
}

/// Returned by the refresh endpoint
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct RefreshResponse {
    pub access: String,
}

/// Partial profile update; omitted fields are left unchanged
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct UpdateUserRequest {
    #[validate(length(min = 3, max = 50))]
    pub username: Option<String>,
    #[validate(length(max = 2048))]
    pub profile_picture: Option<String>,
    #[validate(length(max = 500))]
    pub bio: Option<String>,
}

/// `GET /users` query
#[derive(Debug, Deserialize, Validate, IntoParams)]
pub struct SearchQuery {
    /// Username substring (case-insensitive); empty matches everyone
    #[validate(length(max = 50))]
    pub username: Option<String>,
    #[validate(range(min = 1, max = 100))]
    pub limit: Option<i64>,
    #[validate(range(min = 1))]
    pub page: Option<i64>,
}

impl SearchQuery {
    /// `(limit, offset)` for the store
    pub fn window(&self) -> (i64, i64) {
        PageQuery {
            limit: self.limit,
            page: self.page,
        }
        .window()
    }
}

/// One page of search results
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct UserSearchResponse {
    /// Total matches across all pages
    pub count: i64,
    pub users: Vec<UserSummary>,
}

// =============================================================================
// Cookie helpers
// =============================================================================

fn session_cookie(value: String, max_age_secs: u64, secure: bool) -> Cookie<'static> {
    Cookie::build((REFRESH_COOKIE, value))
        .path(REFRESH_COOKIE_PATH)
        .http_only(true)
        .same_site(SameSite::Strict)
        .secure(secure)
        .max_age(Duration::seconds(
            i64::try_from(max_age_secs).unwrap_or(i64::MAX),
        ))
        .build()
}

/// Cookie carrying a freshly issued refresh token
pub fn refresh_cookie(state: &AppState, tokens: &TokenPair) -> Cookie<'static> {
    session_cookie(
        tokens.refresh_token.clone(),
        tokens.refresh_expires_in,
        state.config.auth.secure_cookies,
    )
}

/// Removal cookie that makes the browser drop the refresh token
///
/// Added unconditionally: the refresh cookie is path-scoped, so logout and
/// account deletion requests never carry it.
pub fn clear_refresh_cookie(state: &AppState) -> Cookie<'static> {
    let mut cookie = session_cookie(String::new(), 0, state.config.auth.secure_cookies);
    cookie.make_removal();
    cookie
}

/// Refresh token presented by the client, unquoted
pub fn presented_refresh_token(jar: &CookieJar) -> Option<String> {
    jar.get(REFRESH_COOKIE)
        .map(|cookie| cookie.value_trimmed())
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

// =============================================================================
// Session endpoints
// =============================================================================

/// Register a new account and sign in
#[utoipa::path(
    post,
    path = "/api/users",
    tag = "users",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "User registered", body = AuthResponse),
        (status = 400, description = "Invalid input", body = crate::error::ApiError),
        (status = 409, description = "Username or email taken", body = crate::error::ApiError),
    )
)]
pub async fn register_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    jar: CookieJar,
    ApiJson(request): ApiJson<RegisterRequest>,
) -> Result<impl IntoResponse, AppError> {
    request.validate()?;
    let username = request.username.clone();

    let result = state
        .auth
        .register(Registration {
            username: request.username,
            email: request.email,
            password: request.password,
            profile_picture: request.profile_picture,
        })
        .await;

    let (user, tokens) = match result {
        Ok(ok) => ok,
        Err(e) => {
            audit_log(&AuditEvent::RegistrationFailure {
                username,
                reason: e.status().to_string(),
                client: ClientInfo::from_headers(&headers),
            });
            return Err(e);
        }
    };

    audit_log(&AuditEvent::RegistrationSuccess {
        user_id: user.id,
        username: user.username.clone(),
        client: ClientInfo::from_headers(&headers),
    });

    Ok((
        StatusCode::CREATED,
        jar.add(refresh_cookie(&state, &tokens)),
        Json(AuthResponse::new(&user, &tokens)),
    ))
}

/// Log in with username and password
#[utoipa::path(
    post,
    path = "/api/users/login",
    tag = "users",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login successful", body = AuthResponse),
        (status = 401, description = "Invalid credentials", body = crate::error::ApiError),
    )
)]
pub async fn login_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    jar: CookieJar,
    ApiJson(request): ApiJson<LoginRequest>,
) -> Result<impl IntoResponse, AppError> {
    request.validate()?;

    let (user, tokens) = match state.auth.login(&request.username, request.password).await {
        Ok(ok) => ok,
        Err(e) => {
            audit_log(&AuditEvent::LoginFailure {
                username: request.username,
                reason: e.status().to_string(),
                client: ClientInfo::from_headers(&headers),
            });
            return Err(e);
        }
    };

    audit_log(&AuditEvent::LoginSuccess {
        user_id: user.id,
        username: user.username.clone(),
        client: ClientInfo::from_headers(&headers),
    });

    Ok((
        jar.add(refresh_cookie(&state, &tokens)),
        Json(AuthResponse::new(&user, &tokens)),
    ))
}

/// Exchange the refresh cookie for a new access token
///
/// The refresh token rotates on every use; the old one stops working.
#[utoipa::path(
    post,
    path = "/api/users/refresh",
    tag = "users",
    responses(
        (status = 200, description = "Token refreshed", body = RefreshResponse),
        (status = 401, description = "Missing, invalid or superseded refresh token", body = crate::error::ApiError),
    )
)]
pub async fn refresh_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    jar: CookieJar,
) -> Result<impl IntoResponse, AppError> {
    let presented = presented_refresh_token(&jar).ok_or_else(|| {
        audit_log(&AuditEvent::RefreshRejected {
            reason: "missing cookie".to_string(),
            client: ClientInfo::from_headers(&headers),
        });
        AppError::Unauthorized("Invalid or expired refresh token".to_string())
    })?;

    let (user_id, tokens) = match state.tokens.refresh(&presented).await {
        Ok(ok) => ok,
        Err(e) => {
            audit_log(&AuditEvent::RefreshRejected {
                reason: e.to_string(),
                client: ClientInfo::from_headers(&headers),
            });
            return Err(e.into());
        }
    };

    audit_log(&AuditEvent::TokenRefresh {
        user_id,
        client: ClientInfo::from_headers(&headers),
    });

    Ok((
        jar.add(refresh_cookie(&state, &tokens)),
        Json(RefreshResponse {
            access: tokens.access_token,
        }),
    ))
}

/// Log out: revoke the refresh token and clear the cookie
#[utoipa::path(
    post,
    path = "/api/users/logout",
    tag = "users",
    responses(
        (status = 204, description = "Logged out"),
        (status = 401, description = "Unauthorized", body = crate::error::ApiError),
    ),
    security(("bearer_auth" = []))
)]
pub async fn logout_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthenticatedUser>,
    headers: HeaderMap,
    jar: CookieJar,
) -> Result<impl IntoResponse, AppError> {
    state.tokens.revoke(user.user_id).await?;

    audit_log(&AuditEvent::Logout {
        user_id: user.user_id,
        client: ClientInfo::from_headers(&headers),
    });

    Ok((StatusCode::NO_CONTENT, jar.add(clear_refresh_cookie(&state))))
}

// =============================================================================
// Profiles
// =============================================================================

/// Search users by username
#[utoipa::path(
    get,
    path = "/api/users",
    tag = "users",
    params(SearchQuery),
    responses(
        (status = 200, description = "One page of matching users", body = UserSearchResponse),
        (status = 400, description = "Invalid query", body = crate::error::ApiError),
    )
)]
pub async fn search_users_handler(
    State(state): State<Arc<AppState>>,
    ApiQuery(query): ApiQuery<SearchQuery>,
) -> Result<Json<UserSearchResponse>, AppError> {
    query.validate()?;

    let (limit, offset) = query.window();
    let needle = query.username.as_deref().unwrap_or("").trim();

    let (users, count) = state.store.search_users(needle, limit, offset).await?;
    Ok(Json(UserSearchResponse { count, users }))
}

/// Public profile of any user
#[utoipa::path(
    get,
    path = "/api/users/{id}",
    tag = "users",
    params(("id" = i64, Path, description = "User id")),
    responses(
        (status = 200, description = "Public profile", body = PublicUser),
        (status = 400, description = "Invalid id", body = crate::error::ApiError),
        (status = 404, description = "No such user", body = crate::error::ApiError),
    )
)]
pub async fn get_user_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<PublicUser>, AppError> {
    let id = parse_path_id(&id, "user id")?;
    let user = state
        .store
        .find_user_by_id(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("User {id} not found")))?;
    Ok(Json(PublicUser::from(user)))
}

/// The caller's own profile
#[utoipa::path(
    get,
    path = "/api/users/me",
    tag = "users",
    responses(
        (status = 200, description = "Own profile", body = UserProfile),
        (status = 401, description = "Unauthorized", body = crate::error::ApiError),
    ),
    security(("bearer_auth" = []))
)]
pub async fn me_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthenticatedUser>,
) -> Result<Json<UserProfile>, AppError> {
    // The token can outlive the account
    let record = state
        .store
        .find_user_by_id(user.user_id)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;
    Ok(Json(UserProfile::from(record)))
}

/// Update the caller's username, picture or bio
#[utoipa::path(
    patch,
    path = "/api/users/me",
    tag = "users",
    request_body = UpdateUserRequest,
    responses(
        (status = 200, description = "Updated profile", body = UserProfile),
        (status = 400, description = "Invalid input", body = crate::error::ApiError),
        (status = 409, description = "Username taken", body = crate::error::ApiError),
    ),
    security(("bearer_auth" = []))
)]
pub async fn update_me_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthenticatedUser>,
    ApiJson(request): ApiJson<UpdateUserRequest>,
) -> Result<Json<UserProfile>, AppError> {
    request.validate()?;

    let updated = state
        .store
        .update_user(
            user.user_id,
            UserUpdate {
                username: request.username,
                profile_picture: request
                    .profile_picture
                    .map(|p| or_default_picture(p, &state.config.auth.default_profile_picture)),
                bio: request.bio,
            },
        )
        .await
        .map_err(|e| match e {
            StoreError::Duplicate(_) => AppError::Conflict("Username already taken".to_string()),
            other => other.into(),
        })?;
    Ok(Json(UserProfile::from(updated)))
}

/// Delete the caller's account
///
/// Memberships, authored notes, invites and the refresh token go with it.
/// Relationships left without members are deleted too.
#[utoipa::path(
    delete,
    path = "/api/users/me",
    tag = "users",
    responses(
        (status = 204, description = "Account deleted"),
        (status = 401, description = "Unauthorized", body = crate::error::ApiError),
        (status = 404, description = "Account already gone", body = crate::error::ApiError),
    ),
    security(("bearer_auth" = []))
)]
pub async fn delete_me_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthenticatedUser>,
    headers: HeaderMap,
    jar: CookieJar,
) -> Result<impl IntoResponse, AppError> {
    state.store.delete_user(user.user_id).await?;

    audit_log(&AuditEvent::AccountDeleted {
        user_id: user.user_id,
        client: ClientInfo::from_headers(&headers),
    });

    Ok((StatusCode::NO_CONTENT, jar.add(clear_refresh_cookie(&state))))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::header;

    fn jar(cookie_header: &str) -> CookieJar {
        let mut headers = HeaderMap::new();
        headers.insert(header::COOKIE, cookie_header.parse().unwrap());
        CookieJar::from_headers(&headers)
    }

    #[test]
    fn test_refresh_token_among_other_cookies() {
        let jar = jar("theme=dark; refresh_token=abc.def; lang=en");
        assert_eq!(presented_refresh_token(&jar).as_deref(), Some("abc.def"));
    }

    #[test]
    fn test_quoted_refresh_token_is_unquoted() {
        let jar = jar("refresh_token=\"abc.def.ghi\"");
        assert_eq!(presented_refresh_token(&jar).as_deref(), Some("abc.def.ghi"));
    }

    #[test]
    fn test_empty_refresh_token_is_absent() {
        assert_eq!(presented_refresh_token(&jar("refresh_token=")), None);
        assert_eq!(presented_refresh_token(&jar("theme=dark")), None);
    }

    #[test]
    fn test_session_cookie_attributes() {
        let cookie = session_cookie("tok".to_string(), 604_800, false);
        assert_eq!(cookie.name(), REFRESH_COOKIE);
        assert_eq!(cookie.value(), "tok");
        assert_eq!(cookie.path(), Some(REFRESH_COOKIE_PATH));
        assert_eq!(cookie.http_only(), Some(true));
        assert_eq!(cookie.same_site(), Some(SameSite::Strict));
        assert_eq!(cookie.max_age(), Some(Duration::seconds(604_800)));
        assert!(!cookie.to_string().contains("Secure"));

        let secure = session_cookie("tok".to_string(), 1, true);
        assert_eq!(secure.secure(), Some(true));
    }

    #[test]
    fn test_search_window_matches_page_query() {
        let query = SearchQuery {
            username: None,
            limit: Some(5),
            page: Some(3),
        };
        assert_eq!(query.window(), (5, 10));

        let defaults = SearchQuery {
            username: None,
            limit: None,
            page: None,
        };
        assert_eq!(defaults.window(), PageQuery::default().window());
    }

    #[test]
    fn test_register_request_validation() {
        let valid = RegisterRequest {
            username: "alice".to_string(),
            email: "alice@example.com".to_string(),
            password: "password123".to_string(),
            profile_picture: None,
        };
        assert!(valid.validate().is_ok());

        let bad_email = RegisterRequest {
            email: "not-an-email".to_string(),
            ..valid
        };
        assert!(bad_email.validate().is_err());
    }
}
