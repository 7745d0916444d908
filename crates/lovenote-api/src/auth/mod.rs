//! Authentication and authorization module
//!
//! - Token generation and validation (HS256 JWT)
//! - Password hashing with Argon2id
//! - Authentication gate for bearer tokens
//! - Membership and ownership gates
//! - Registration, login and refresh-token rotation

pub mod jwt;
pub mod middleware;
pub mod password;
pub mod permissions;
pub mod service;

pub use jwt::{Claims, JwtConfig, TokenError, TokenKind};
pub use middleware::{auth_middleware, AuthError, AuthenticatedUser};
pub use password::{PasswordError, Passwords};
pub use permissions::{require_membership, require_note_ownership, NoteScope, RelationshipScope};
pub use service::{AuthService, RefreshError, Registration, TokenPair, TokenService};
