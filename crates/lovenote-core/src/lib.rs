//! LoveNote Core - Domain models, store traits, and shared types
//!
//! This crate defines the core abstractions used throughout LoveNote:
//! - Identity, relationship, invite and note models
//! - Store error taxonomy
//! - Async store traits implemented by the persistence layer
//! - Configuration management

pub mod config;
pub mod store;

pub use config::{
    AppConfig, AuthConfig, ConfigError, DatabaseConfig, LoggingConfig, PasswordConfig,
    ServerConfig,
};
pub use store::{
    month_bounds, InviteStore, NoteStore, RelationshipStore, SessionStore, Store, StoreResult,
    UserStore,
};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

/// An identity may belong to at most this many relationships
pub const MAX_RELATIONSHIPS_PER_USER: i64 = 10;

// ============================================================================
// Error Types
// ============================================================================

/// Errors surfaced by store implementations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Already exists: {0}")]
    Duplicate(String),

    #[error("Relationship limit of {limit} reached")]
    RelationshipLimit { limit: i64 },

    #[error("Database error: {0}")]
    Database(String),
}

// ============================================================================
// Identity
// ============================================================================

/// Stored user record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub profile_picture: String,
    pub bio: String,
    pub created_at: DateTime<Utc>,
}

/// The caller's own profile, including private fields
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UserProfile {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub profile_picture: String,
    pub bio: String,
    pub created_at: DateTime<Utc>,
}

impl From<User> for UserProfile {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            username: user.username,
            email: user.email,
            profile_picture: user.profile_picture,
            bio: user.bio,
            created_at: user.created_at,
        }
    }
}

/// Profile as seen by other users
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PublicUser {
    pub id: i64,
    pub username: String,
    pub profile_picture: String,
    pub bio: String,
}

impl From<User> for PublicUser {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            username: user.username,
            profile_picture: user.profile_picture,
            bio: user.bio,
        }
    }
}

/// Compact user reference embedded in notes, invites and member lists
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct UserSummary {
    pub id: i64,
    pub username: String,
    pub profile_picture: String,
}

impl From<&User> for UserSummary {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            username: user.username.clone(),
            profile_picture: user.profile_picture.clone(),
        }
    }
}

/// Fields required to insert a user; the password is already hashed
#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub profile_picture: String,
}

/// Partial self-service profile update; `None` leaves a field untouched
#[derive(Debug, Clone, Default)]
pub struct UserUpdate {
    pub username: Option<String>,
    pub profile_picture: Option<String>,
    pub bio: Option<String>,
}

// ============================================================================
// Relationships
// ============================================================================

/// A group of users sharing a note board
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Relationship {
    pub id: i64,
    pub name: String,
    pub picture: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
pub struct RelationshipUpdate {
    pub name: Option<String>,
    pub picture: Option<String>,
}

// ============================================================================
// Invites
// ============================================================================

/// A pending invitation into a relationship
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Invite {
    pub id: i64,
    pub relationship_id: i64,
    pub relationship_name: String,
    pub inviter: UserSummary,
    pub invitee_id: i64,
    pub body: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewInvite {
    pub relationship_id: i64,
    pub inviter_id: i64,
    pub invitee_id: i64,
    pub body: String,
}

// ============================================================================
// Notes
// ============================================================================

/// A sticky note pinned to a relationship's board
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Note {
    pub id: i64,
    pub relationship_id: i64,
    pub author: UserSummary,
    pub title: String,
    pub content: String,
    pub position_x: f32,
    pub position_y: f32,
    pub color: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewNote {
    pub relationship_id: i64,
    pub author_id: i64,
    pub title: String,
    pub content: String,
    pub position_x: f32,
    pub position_y: f32,
    pub color: String,
}

#[derive(Debug, Clone, Default)]
pub struct NoteUpdate {
    pub title: Option<String>,
    pub content: Option<String>,
    pub position_x: Option<f32>,
    pub position_y: Option<f32>,
    pub color: Option<String>,
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_user() -> User {
        User {
            id: 7,
            username: "alice".to_string(),
            email: "alice@example.com".to_string(),
            password_hash: "$argon2id$v=19$secret".to_string(),
            profile_picture: "https://example.com/a.png".to_string(),
            bio: "hi".to_string(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_password_hash_never_serialized() {
        let json = serde_json::to_value(sample_user()).unwrap();
        assert!(json.get("password_hash").is_none());
        assert_eq!(json["username"], "alice");
    }

    #[test]
    fn test_public_user_hides_email() {
        let json = serde_json::to_value(PublicUser::from(sample_user())).unwrap();
        assert!(json.get("email").is_none());
        assert_eq!(json["id"], 7);
        assert_eq!(json["bio"], "hi");
    }

    #[test]
    fn test_summary_from_user() {
        let user = sample_user();
        let summary = UserSummary::from(&user);
        assert_eq!(summary.id, user.id);
        assert_eq!(summary.username, "alice");
    }

    #[test]
    fn test_store_error_display() {
        let err = StoreError::RelationshipLimit {
            limit: MAX_RELATIONSHIPS_PER_USER,
        };
        assert_eq!(err.to_string(), "Relationship limit of 10 reached");
    }
}
