//! Authentication service layer
//!
//! [`TokenService`] owns the session-token lifecycle: issuing token pairs,
//! validating bearer tokens and rotating refresh tokens. [`AuthService`]
//! builds registration and login on top of it.

use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use lovenote_core::{NewUser, SessionStore, Store, StoreError, User};
use sha2::{Digest, Sha256};
use thiserror::Error;

use super::jwt::{generate_token, validate_token, Claims, JwtConfig, TokenError, TokenKind};
use super::password::Passwords;
use crate::error::AppError;

/// An access token with its companion refresh token
#[derive(Debug, Clone)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    /// Seconds until the access token expires
    pub access_expires_in: u64,
    /// Seconds until the refresh token expires
    pub refresh_expires_in: u64,
}

/// Refresh failures
///
/// `Invalid`, `Revoked` and `Expired` all reach the client as the same 401.
#[derive(Debug, Error)]
pub enum RefreshError {
    #[error("Invalid refresh token")]
    Invalid,

    #[error("Refresh token has been revoked or superseded")]
    Revoked,

    #[error("Refresh token has expired")]
    Expired,

    #[error("Refresh failed: {0}")]
    Internal(String),
}

impl From<RefreshError> for AppError {
    fn from(err: RefreshError) -> Self {
        match err {
            RefreshError::Internal(msg) => AppError::Internal(msg),
            _ => AppError::Unauthorized("Invalid or expired refresh token".to_string()),
        }
    }
}

/// SHA-256 hex digest; refresh tokens are only ever persisted in this form
pub fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    format!("{:x}", hasher.finalize())
}

fn expiry_instant(claims: &Claims) -> Result<DateTime<Utc>, String> {
    Utc.timestamp_opt(claims.exp as i64, 0)
        .single()
        .ok_or_else(|| format!("Token expiry out of range: {}", claims.exp))
}

/// Issues, validates, rotates and revokes session tokens
#[derive(Clone)]
pub struct TokenService {
    config: JwtConfig,
    sessions: Arc<dyn SessionStore>,
}

impl TokenService {
    pub fn new(config: JwtConfig, sessions: Arc<dyn SessionStore>) -> Self {
        Self { config, sessions }
    }

    pub fn config(&self) -> &JwtConfig {
        &self.config
    }

    fn sign_pair(&self, user_id: i64) -> Result<(TokenPair, Claims), TokenError> {
        let (access_token, _) = generate_token(&self.config, user_id, TokenKind::Access)?;
        let (refresh_token, refresh_claims) =
            generate_token(&self.config, user_id, TokenKind::Refresh)?;

        let pair = TokenPair {
            access_token,
            refresh_token,
            access_expires_in: self.config.access_expiration_secs,
            refresh_expires_in: self.config.refresh_expiration_secs,
        };
        Ok((pair, refresh_claims))
    }

    /// Issue a fresh pair, replacing whatever refresh token the user had
    pub async fn issue(&self, user_id: i64) -> Result<TokenPair, AppError> {
        let (pair, refresh_claims) = self
            .sign_pair(user_id)
            .map_err(|e| AppError::Internal(e.to_string()))?;
        let expires_at = expiry_instant(&refresh_claims).map_err(AppError::Internal)?;

        self.sessions
            .store_refresh_token(user_id, &hash_token(&pair.refresh_token), expires_at)
            .await?;

        Ok(pair)
    }

    /// Validate a bearer token; only access tokens are accepted
    pub fn validate(&self, token: &str) -> Result<Claims, TokenError> {
        let claims = validate_token(&self.config, token)?;
        if claims.kind != TokenKind::Access {
            return Err(TokenError::Malformed);
        }
        Ok(claims)
    }

    /// Exchange a refresh token for a new pair (rotation-on-use)
    ///
    /// The stored digest is swapped only if it still matches the presented
    /// token, so a superseded token fails as `Revoked` and two concurrent
    /// refreshes with the same token cannot both succeed.
    pub async fn refresh(&self, token: &str) -> Result<(i64, TokenPair), RefreshError> {
        let claims = validate_token(&self.config, token).map_err(|e| match e {
            TokenError::Expired => RefreshError::Expired,
            _ => RefreshError::Invalid,
        })?;
        if claims.kind != TokenKind::Refresh {
            return Err(RefreshError::Invalid);
        }

        let (pair, refresh_claims) = self
            .sign_pair(claims.user_id)
            .map_err(|e| RefreshError::Internal(e.to_string()))?;
        let expires_at = expiry_instant(&refresh_claims).map_err(RefreshError::Internal)?;

        let rotated = self
            .sessions
            .rotate_refresh_token(
                claims.user_id,
                &hash_token(token),
                &hash_token(&pair.refresh_token),
                expires_at,
            )
            .await
            .map_err(|e| RefreshError::Internal(e.to_string()))?;

        if !rotated {
            return Err(RefreshError::Revoked);
        }
        Ok((claims.user_id, pair))
    }

    /// Logout: forget the user's refresh token
    pub async fn revoke(&self, user_id: i64) -> Result<(), AppError> {
        self.sessions.revoke_refresh_token(user_id).await?;
        Ok(())
    }
}

/// Validated registration input
#[derive(Debug, Clone)]
pub struct Registration {
    pub username: String,
    pub email: String,
    pub password: String,
    pub profile_picture: Option<String>,
}

/// Registration and login
#[derive(Clone)]
pub struct AuthService {
    store: Arc<dyn Store>,
    passwords: Passwords,
    tokens: TokenService,
    default_profile_picture: String,
}

impl AuthService {
    pub fn new(
        store: Arc<dyn Store>,
        passwords: Passwords,
        tokens: TokenService,
        default_profile_picture: String,
    ) -> Self {
        Self {
            store,
            passwords,
            tokens,
            default_profile_picture,
        }
    }

    pub fn tokens(&self) -> &TokenService {
        &self.tokens
    }

    /// Runs on the blocking pool
    async fn hash_password(&self, password: String) -> Result<String, AppError> {
        let passwords = self.passwords.clone();
        tokio::task::spawn_blocking(move || passwords.hash(&password))
            .await
            .map_err(|e| AppError::Internal(format!("Password hashing task failed: {e}")))?
            .map_err(|e| AppError::Internal(e.to_string()))
    }

    async fn verify_password(
        &self,
        password: String,
        hash: Option<String>,
    ) -> Result<bool, AppError> {
        let passwords = self.passwords.clone();
        tokio::task::spawn_blocking(move || match hash {
            Some(hash) => passwords.verify(&password, &hash),
            None => {
                passwords.verify_dummy(&password);
                false
            }
        })
        .await
        .map_err(|e| AppError::Internal(format!("Password verification task failed: {e}")))
    }

    /// Create the account and sign the new user in
    pub async fn register(
        &self,
        registration: Registration,
    ) -> Result<(User, TokenPair), AppError> {
        let password_hash = self.hash_password(registration.password).await?;

        let profile_picture = registration
            .profile_picture
            .filter(|p| !p.trim().is_empty())
            .unwrap_or_else(|| self.default_profile_picture.clone());

        let user = self
            .store
            .create_user(NewUser {
                username: registration.username,
                email: registration.email,
                password_hash,
                profile_picture,
            })
            .await
            .map_err(|e| match e {
                StoreError::Duplicate(_) => {
                    AppError::Conflict("Username or email already taken".to_string())
                }
                other => other.into(),
            })?;

        let tokens = self.tokens.issue(user.id).await?;
        Ok((user, tokens))
    }

    /// Check credentials and sign in
    ///
    /// Unknown user and wrong password produce the same error and cost the
    /// same amount of hashing work.
    pub async fn login(
        &self,
        username: &str,
        password: String,
    ) -> Result<(User, TokenPair), AppError> {
        let user = self.store.find_user_by_username(username).await?;
        let hash = user.as_ref().map(|u| u.password_hash.clone());

        let valid = self.verify_password(password, hash).await?;
        let user = match user {
            Some(user) if valid => user,
            _ => {
                return Err(AppError::Unauthorized(
                    "Invalid username or password".to_string(),
                ))
            }
        };

        let tokens = self.tokens.issue(user.id).await?;
        Ok((user, tokens))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lovenote_core::{PasswordConfig, UserStore};
    use lovenote_store::MemoryStore;

    fn jwt_config() -> JwtConfig {
        JwtConfig {
            secret: "service-test-secret".to_string(),
            issuer: "lovenote-api".to_string(),
            access_expiration_secs: 900,
            refresh_expiration_secs: 604_800,
        }
    }

    async fn setup() -> (AuthService, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let tokens = TokenService::new(jwt_config(), store.clone());
        let passwords = Passwords::new(PasswordConfig::fast_insecure()).unwrap();
        let service = AuthService::new(store.clone(), passwords, tokens, "default.png".to_string());
        (service, store)
    }

    fn registration(username: &str) -> Registration {
        Registration {
            username: username.to_string(),
            email: format!("{username}@example.com"),
            password: "password123".to_string(),
            profile_picture: None,
        }
    }

    #[test]
    fn test_hash_token_is_hex_sha256() {
        let digest = hash_token("abc");
        assert_eq!(digest.len(), 64);
        assert_eq!(
            digest,
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[tokio::test]
    async fn test_register_then_login() {
        let (service, _) = setup().await;

        let (user, tokens) = service.register(registration("alice")).await.unwrap();
        assert_eq!(user.profile_picture, "default.png");
        assert!(service.tokens().validate(&tokens.access_token).is_ok());

        let (logged_in, _) = service
            .login("alice", "password123".to_string())
            .await
            .unwrap();
        assert_eq!(logged_in.id, user.id);
    }

    #[tokio::test]
    async fn test_login_failures_are_indistinguishable() {
        let (service, _) = setup().await;
        service.register(registration("alice")).await.unwrap();

        let wrong_password = service.login("alice", "nope-nope".to_string()).await;
        let unknown_user = service.login("nobody", "password123".to_string()).await;

        match (wrong_password, unknown_user) {
            (Err(AppError::Unauthorized(a)), Err(AppError::Unauthorized(b))) => assert_eq!(a, b),
            other => panic!("unexpected results: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_login_with_unusable_stored_hash_is_unauthorized() {
        let (service, store) = setup().await;
        store
            .create_user(NewUser {
                username: "legacy".to_string(),
                email: "legacy@example.com".to_string(),
                password_hash: "$argon2id$v=19$m=1,t=1,p=1$c2FsdHNhbHQ$aGFzaGhhc2hoYXNoaGFzaA"
                    .to_string(),
                profile_picture: "default.png".to_string(),
            })
            .await
            .unwrap();

        assert!(matches!(
            service.login("legacy", "password123".to_string()).await,
            Err(AppError::Unauthorized(_))
        ));
    }

    #[tokio::test]
    async fn test_duplicate_registration_conflicts() {
        let (service, _) = setup().await;
        service.register(registration("alice")).await.unwrap();

        assert!(matches!(
            service.register(registration("alice")).await,
            Err(AppError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn test_refresh_rotates_and_superseded_token_is_revoked() {
        let (service, _) = setup().await;
        let (_, first) = service.register(registration("alice")).await.unwrap();
        let tokens = service.tokens();

        let (_, second) = tokens.refresh(&first.refresh_token).await.unwrap();
        assert_ne!(first.refresh_token, second.refresh_token);

        assert!(matches!(
            tokens.refresh(&first.refresh_token).await,
            Err(RefreshError::Revoked)
        ));
        assert!(tokens.refresh(&second.refresh_token).await.is_ok());
    }

    #[tokio::test]
    async fn test_concurrent_refresh_single_winner() {
        let (service, _) = setup().await;
        let (_, pair) = service.register(registration("alice")).await.unwrap();
        let tokens = service.tokens();

        let (a, b) = tokio::join!(
            tokens.refresh(&pair.refresh_token),
            tokens.refresh(&pair.refresh_token)
        );
        assert_eq!([a.is_ok(), b.is_ok()].iter().filter(|ok| **ok).count(), 1);
    }

    #[tokio::test]
    async fn test_token_kinds_not_interchangeable() {
        let (service, _) = setup().await;
        let (_, pair) = service.register(registration("alice")).await.unwrap();
        let tokens = service.tokens();

        assert!(tokens.validate(&pair.refresh_token).is_err());
        assert!(matches!(
            tokens.refresh(&pair.access_token).await,
            Err(RefreshError::Invalid)
        ));
    }

    #[tokio::test]
    async fn test_revoke_blocks_refresh() {
        let (service, store) = setup().await;
        let (user, pair) = service.register(registration("alice")).await.unwrap();

        service.tokens().revoke(user.id).await.unwrap();
        assert!(matches!(
            service.tokens().refresh(&pair.refresh_token).await,
            Err(RefreshError::Revoked)
        ));
        assert!(store.find_user_by_id(user.id).await.unwrap().is_some());
    }
}
