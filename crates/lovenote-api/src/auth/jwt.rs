//! JWT token generation and validation
//!
//! HS256-signed access and refresh tokens. The two kinds share one claim
//! layout and are told apart by the `kind` claim, so a refresh token can never
//! stand in for an access token or vice versa.

use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use lovenote_core::AuthConfig;
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;
use uuid::Uuid;

/// Which of the two token lifetimes a JWT was issued for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    Access,
    Refresh,
}

/// JWT Claims structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Token issuer
    pub iss: String,
    /// Subject - user ID as a string
    pub sub: String,
    /// Numeric user ID
    pub user_id: i64,
    /// Unique token identifier; two tokens issued in the same second still differ
    pub jti: String,
    /// Issued at timestamp (Unix epoch)
    pub iat: u64,
    /// Expiration timestamp (Unix epoch)
    pub exp: u64,
    pub kind: TokenKind,
}

/// Token validation errors
///
/// Callers that talk to clients must collapse these into one generic
/// message; the distinction is for logs only.
#[derive(Debug, Error)]
pub enum TokenError {
    #[error("Invalid token signature")]
    InvalidSignature,

    #[error("Token has expired")]
    Expired,

    #[error("Malformed token")]
    Malformed,

    #[error("Failed to encode JWT: {0}")]
    Encoding(String),
}

/// JWT Configuration
#[derive(Debug, Clone)]
pub struct JwtConfig {
    /// Secret key for HMAC signing
    pub secret: String,
    /// Token issuer identifier
    pub issuer: String,
    /// Access token lifetime in seconds
    pub access_expiration_secs: u64,
    /// Refresh token lifetime in seconds
    pub refresh_expiration_secs: u64,
}

impl JwtConfig {
    pub fn from_auth_config(config: &AuthConfig) -> Self {
        Self {
            secret: config.jwt_secret.clone(),
            issuer: config.issuer.clone(),
            access_expiration_secs: config.access_token_ttl_secs,
            refresh_expiration_secs: config.refresh_token_ttl_secs,
        }
    }

    pub fn lifetime(&self, kind: TokenKind) -> u64 {
        match kind {
            TokenKind::Access => self.access_expiration_secs,
            TokenKind::Refresh => self.refresh_expiration_secs,
        }
    }
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}

/// Sign a token of the given kind for `user_id`
///
/// Returns the encoded token together with its claims so callers can read
/// the expiry without decoding again.
pub fn generate_token(
    config: &JwtConfig,
    user_id: i64,
    kind: TokenKind,
) -> Result<(String, Claims), TokenError> {
    let now = now_secs();

    let claims = Claims {
        iss: config.issuer.clone(),
        sub: user_id.to_string(),
        user_id,
        jti: Uuid::new_v4().to_string(),
        iat: now,
        exp: now + config.lifetime(kind),
        kind,
    };

    let token = encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(config.secret.as_bytes()),
    )
    .map_err(|e| TokenError::Encoding(e.to_string()))?;

    Ok((token, claims))
}

/// Validate a token and extract its claims
///
/// Only HS256 is accepted. Expiry is checked by the decoder and then once
/// more against the wall clock with zero leeway.
pub fn validate_token(config: &JwtConfig, token: &str) -> Result<Claims, TokenError> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.leeway = 0;
    validation.set_issuer(&[&config.issuer]);
    validation.set_required_spec_claims(&["exp", "iss", "sub"]);

    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(config.secret.as_bytes()),
        &validation,
    )
    .map_err(|e| match e.kind() {
        ErrorKind::ExpiredSignature => TokenError::Expired,
        ErrorKind::InvalidSignature | ErrorKind::InvalidAlgorithm => TokenError::InvalidSignature,
        _ => TokenError::Malformed,
    })?;

    let claims = token_data.claims;
    if now_secs() >= claims.exp {
        return Err(TokenError::Expired);
    }
    if claims.sub != claims.user_id.to_string() {
        return Err(TokenError::Malformed);
    }

    Ok(claims)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> JwtConfig {
        JwtConfig {
            secret: "test-secret".to_string(),
            issuer: "lovenote-api".to_string(),
            access_expiration_secs: 900,
            refresh_expiration_secs: 604_800,
        }
    }

    fn sign(claims: &Claims, algorithm: Algorithm, secret: &str) -> String {
        encode(
            &Header::new(algorithm),
            claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap()
    }

    #[test]
    fn test_generate_and_validate_token() {
        let config = config();
        let (token, issued) = generate_token(&config, 42, TokenKind::Access).unwrap();

        let claims = validate_token(&config, &token).unwrap();
        assert_eq!(claims.user_id, 42);
        assert_eq!(claims.sub, "42");
        assert_eq!(claims.kind, TokenKind::Access);
        assert_eq!(claims.iss, "lovenote-api");
        assert_eq!(claims.exp, issued.iat + 900);
    }

    #[test]
    fn test_refresh_token_lifetime() {
        let config = config();
        let (_, claims) = generate_token(&config, 1, TokenKind::Refresh).unwrap();
        assert_eq!(claims.exp - claims.iat, 604_800);
    }

    #[test]
    fn test_tokens_are_unique() {
        let config = config();
        let (a, _) = generate_token(&config, 1, TokenKind::Refresh).unwrap();
        let (b, _) = generate_token(&config, 1, TokenKind::Refresh).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_invalid_token() {
        let result = validate_token(&config(), "invalid.token.here");
        assert!(matches!(result, Err(TokenError::Malformed)));
    }

    #[test]
    fn test_wrong_secret() {
        let (token, _) = generate_token(&config(), 1, TokenKind::Access).unwrap();

        let other = JwtConfig {
            secret: "another-secret".to_string(),
            ..config()
        };
        assert!(matches!(
            validate_token(&other, &token),
            Err(TokenError::InvalidSignature)
        ));
    }

    #[test]
    fn test_expired_token() {
        let config = config();
        let now = now_secs();

        // Correctly signed, expired an hour ago
        let claims = Claims {
            iss: config.issuer.clone(),
            sub: "5".to_string(),
            user_id: 5,
            jti: Uuid::new_v4().to_string(),
            iat: now - 7200,
            exp: now - 3600,
            kind: TokenKind::Access,
        };
        let token = sign(&claims, Algorithm::HS256, &config.secret);

        assert!(matches!(
            validate_token(&config, &token),
            Err(TokenError::Expired)
        ));
    }

    #[test]
    fn test_other_algorithm_rejected() {
        let config = config();
        let now = now_secs();
        let claims = Claims {
            iss: config.issuer.clone(),
            sub: "5".to_string(),
            user_id: 5,
            jti: Uuid::new_v4().to_string(),
            iat: now,
            exp: now + 600,
            kind: TokenKind::Access,
        };
        let token = sign(&claims, Algorithm::HS512, &config.secret);

        assert!(matches!(
            validate_token(&config, &token),
            Err(TokenError::InvalidSignature)
        ));
    }

    #[test]
    fn test_wrong_issuer_rejected() {
        let config = config();
        let (token, _) = generate_token(
            &JwtConfig {
                issuer: "someone-else".to_string(),
                ..config.clone()
            },
            1,
            TokenKind::Access,
        )
        .unwrap();

        assert!(matches!(
            validate_token(&config, &token),
            Err(TokenError::Malformed)
        ));
    }
}
