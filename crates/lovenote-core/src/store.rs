//! Store traits
//!
//! Persistence is split by aggregate. Every method is a single atomic unit:
//! implementations must either apply all of an operation's writes or none.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::{
    Invite, NewInvite, NewNote, NewUser, Note, NoteUpdate, Relationship, RelationshipUpdate,
    StoreError, User, UserSummary, UserUpdate,
};

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Identity records
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Insert a user. Fails with `Duplicate` when username or email is taken.
    async fn create_user(&self, user: NewUser) -> StoreResult<User>;

    async fn find_user_by_id(&self, id: i64) -> StoreResult<Option<User>>;

    async fn find_user_by_username(&self, username: &str) -> StoreResult<Option<User>>;

    /// Apply a partial update and return the new record
    async fn update_user(&self, id: i64, update: UserUpdate) -> StoreResult<User>;

    /// Delete a user with everything they own. Relationships left without
    /// members are removed in the same transaction.
    async fn delete_user(&self, id: i64) -> StoreResult<()>;

    /// Username substring search, returning one page and the total match count
    async fn search_users(
        &self,
        query: &str,
        limit: i64,
        offset: i64,
    ) -> StoreResult<(Vec<UserSummary>, i64)>;
}

/// Refresh token persistence. At most one live token per user.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Persist a token digest, overwriting any prior one
    async fn store_refresh_token(
        &self,
        user_id: i64,
        token_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> StoreResult<()>;

    /// Replace the stored digest only if it still equals `presented_hash`.
    /// Returns `false` when the presented token is not the live one.
    async fn rotate_refresh_token(
        &self,
        user_id: i64,
        presented_hash: &str,
        new_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> StoreResult<bool>;

    async fn revoke_refresh_token(&self, user_id: i64) -> StoreResult<()>;
}

/// Relationship groups and their membership
#[async_trait]
pub trait RelationshipStore: Send + Sync {
    /// Create a relationship with `creator_id` as its first member.
    /// Fails with `RelationshipLimit` when the creator is already in the maximum.
    async fn create_relationship(
        &self,
        name: &str,
        picture: &str,
        creator_id: i64,
    ) -> StoreResult<Relationship>;

    async fn find_relationship(&self, id: i64) -> StoreResult<Option<Relationship>>;

    async fn list_user_relationships(&self, user_id: i64) -> StoreResult<Vec<Relationship>>;

    async fn list_members(&self, relationship_id: i64) -> StoreResult<Vec<UserSummary>>;

    async fn is_member(&self, relationship_id: i64, user_id: i64) -> StoreResult<bool>;

    async fn update_relationship(
        &self,
        id: i64,
        update: RelationshipUpdate,
    ) -> StoreResult<Relationship>;

    /// Delete the relationship (and its notes and invites) only when
    /// `user_id` is its sole member. Returns `false` when others remain.
    async fn delete_relationship_if_sole_member(&self, id: i64, user_id: i64)
        -> StoreResult<bool>;
}

/// Pending invitations
#[async_trait]
pub trait InviteStore: Send + Sync {
    /// Fails with `Duplicate` when a pending invite for the same
    /// (relationship, invitee) exists, and `NotFound` for an unknown invitee.
    async fn create_invite(&self, invite: NewInvite) -> StoreResult<Invite>;

    async fn find_invite(&self, id: i64) -> StoreResult<Option<Invite>>;

    async fn list_invites_for(
        &self,
        invitee_id: i64,
        limit: i64,
        offset: i64,
    ) -> StoreResult<(Vec<Invite>, i64)>;

    /// Consume the invite and add the invitee as a member, atomically.
    /// Returns the joined relationship id. Fails with `NotFound` when the
    /// invite is gone and `RelationshipLimit` when the invitee is full.
    async fn accept_invite(&self, invite_id: i64, invitee_id: i64) -> StoreResult<i64>;

    /// Returns `false` when nothing was deleted
    async fn delete_invite(&self, id: i64) -> StoreResult<bool>;
}

/// Notes on relationship boards
#[async_trait]
pub trait NoteStore: Send + Sync {
    async fn create_note(&self, note: NewNote) -> StoreResult<Note>;

    async fn find_note(&self, id: i64) -> StoreResult<Option<Note>>;

    /// Notes created during the given calendar month (UTC), oldest first
    async fn list_notes_for_month(
        &self,
        relationship_id: i64,
        year: i32,
        month: u32,
    ) -> StoreResult<Vec<Note>>;

    async fn update_note(&self, id: i64, update: NoteUpdate) -> StoreResult<Note>;

    /// Returns `false` when nothing was deleted
    async fn delete_note(&self, id: i64) -> StoreResult<bool>;
}

/// Everything the API needs from persistence
#[async_trait]
pub trait Store:
    UserStore + SessionStore + RelationshipStore + InviteStore + NoteStore
{
    /// Cheap liveness probe used by the readiness endpoint
    async fn ping(&self) -> StoreResult<()>;
}

/// First instant of the given month and of the month after, in UTC
pub fn month_bounds(year: i32, month: u32) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
    use chrono::TimeZone;

    let start = Utc.with_ymd_and_hms(year, month, 1, 0, 0, 0).single()?;
    let (next_year, next_month) = if month == 12 {
        (year + 1, 1)
    } else {
        (year, month + 1)
    };
    let end = Utc
        .with_ymd_and_hms(next_year, next_month, 1, 0, 0, 0)
        .single()?;
    Some((start, end))
}
