//! PostgreSQL store
//!
//! Runtime-checked queries against the schema in `migrations/`. Operations
//! that touch more than one row run inside a transaction; an early return
//! drops the transaction, which rolls it back.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::FromRow;

use lovenote_core::{
    month_bounds, Invite, InviteStore, NewInvite, NewNote, NewUser, Note, NoteStore, NoteUpdate,
    Relationship, RelationshipStore, RelationshipUpdate, SessionStore, Store, StoreError,
    StoreResult, User, UserStore, UserSummary, UserUpdate, MAX_RELATIONSHIPS_PER_USER,
};

/// PostgreSQL-backed store
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Connect with a bounded pool
    pub async fn connect(database_url: &str, max_connections: u32) -> StoreResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .map_err(|e| StoreError::Database(format!("PostgreSQL connection failed: {e}")))?;

        tracing::info!(max_connections, "PostgreSQL pool ready");
        Ok(Self { pool })
    }

    /// Create from an existing pool
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Get the connection pool
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Apply embedded migrations
    pub async fn migrate(&self) -> StoreResult<()> {
        let migrator = sqlx::migrate!("./migrations");
        migrator
            .run(&self.pool)
            .await
            .map_err(|e| StoreError::Database(format!("Migration failed: {e}")))?;

        tracing::info!(migrations = migrator.iter().count(), "Schema up to date");
        Ok(())
    }
}

/// Classify a driver error. Constraint violations become domain errors so
/// callers never have to inspect SQLSTATE codes.
fn db_err(action: &str) -> impl FnOnce(sqlx::Error) -> StoreError + '_ {
    move |e| match &e {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            StoreError::Duplicate(format!("{action}: record already exists"))
        }
        sqlx::Error::Database(db) if db.is_foreign_key_violation() => {
            StoreError::NotFound(format!("{action}: referenced record does not exist"))
        }
        _ => StoreError::Database(format!("Failed to {action}: {e}")),
    }
}

/// Escape LIKE metacharacters so user input matches literally
fn like_pattern(query: &str) -> String {
    let mut escaped = String::with_capacity(query.len() + 2);
    escaped.push('%');
    for c in query.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped.push('%');
    escaped
}

// ============================================================================
// Row types
// ============================================================================

#[derive(Debug, FromRow)]
struct UserRecord {
    id: i64,
    username: String,
    email: String,
    password_hash: String,
    profile_picture: String,
    bio: String,
    created_at: DateTime<Utc>,
}

impl From<UserRecord> for User {
    fn from(row: UserRecord) -> Self {
        User {
            id: row.id,
            username: row.username,
            email: row.email,
            password_hash: row.password_hash,
            profile_picture: row.profile_picture,
            bio: row.bio,
            created_at: row.created_at,
        }
    }
}

#[derive(Debug, FromRow)]
struct SummaryRecord {
    id: i64,
    username: String,
    profile_picture: String,
}

impl From<SummaryRecord> for UserSummary {
    fn from(row: SummaryRecord) -> Self {
        UserSummary {
            id: row.id,
            username: row.username,
            profile_picture: row.profile_picture,
        }
    }
}

#[derive(Debug, FromRow)]
struct RelationshipRecord {
    id: i64,
    name: String,
    picture: String,
    created_at: DateTime<Utc>,
}

impl From<RelationshipRecord> for Relationship {
    fn from(row: RelationshipRecord) -> Self {
        Relationship {
            id: row.id,
            name: row.name,
            picture: row.picture,
            created_at: row.created_at,
        }
    }
}

#[derive(Debug, FromRow)]
struct InviteRecord {
    id: i64,
    relationship_id: i64,
    relationship_name: String,
    inviter_id: i64,
    inviter_username: String,
    inviter_picture: String,
    invitee_id: i64,
    body: String,
    created_at: DateTime<Utc>,
}

impl From<InviteRecord> for Invite {
    fn from(row: InviteRecord) -> Self {
        Invite {
            id: row.id,
            relationship_id: row.relationship_id,
            relationship_name: row.relationship_name,
            inviter: UserSummary {
                id: row.inviter_id,
                username: row.inviter_username,
                profile_picture: row.inviter_picture,
            },
            invitee_id: row.invitee_id,
            body: row.body,
            created_at: row.created_at,
        }
    }
}

#[derive(Debug, FromRow)]
struct NoteRecord {
    id: i64,
    relationship_id: i64,
    author_id: i64,
    author_username: String,
    author_picture: String,
    title: String,
    content: String,
    position_x: f32,
    position_y: f32,
    color: String,
    created_at: DateTime<Utc>,
}

impl From<NoteRecord> for Note {
    fn from(row: NoteRecord) -> Self {
        Note {
            id: row.id,
            relationship_id: row.relationship_id,
            author: UserSummary {
                id: row.author_id,
                username: row.author_username,
                profile_picture: row.author_picture,
            },
            title: row.title,
            content: row.content,
            position_x: row.position_x,
            position_y: row.position_y,
            color: row.color,
            created_at: row.created_at,
        }
    }
}

const USER_COLUMNS: &str = "id, username, email, password_hash, profile_picture, bio, created_at";

// `src` is the invites row alias, so the same projection serves plain
// selects and INSERT ... RETURNING CTEs.
const INVITE_PROJECTION: &str = r#"
    SELECT i.id, i.relationship_id, r.name AS relationship_name,
           u.id AS inviter_id, u.username AS inviter_username,
           u.profile_picture AS inviter_picture,
           i.invitee_id, i.body, i.created_at
    FROM src i
    JOIN relationships r ON r.id = i.relationship_id
    JOIN users u ON u.id = i.inviter_id
"#;

const NOTE_PROJECTION: &str = r#"
    SELECT n.id, n.relationship_id,
           u.id AS author_id, u.username AS author_username,
           u.profile_picture AS author_picture,
           n.title, n.content, n.position_x, n.position_y, n.color, n.created_at
    FROM src n
    JOIN users u ON u.id = n.author_id
"#;

/// Lock the user's row and check their membership count. Concurrent joins
/// for the same user serialize on the row lock.
async fn ensure_below_limit(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    user_id: i64,
) -> StoreResult<()> {
    let locked: Option<(i64,)> = sqlx::query_as("SELECT id FROM users WHERE id = $1 FOR UPDATE")
        .bind(user_id)
        .fetch_optional(&mut **tx)
        .await
        .map_err(db_err("lock user"))?;

    if locked.is_none() {
        return Err(StoreError::NotFound(format!("user {user_id}")));
    }

    let (count,): (i64,) =
        sqlx::query_as("SELECT COUNT(*) FROM relationship_members WHERE user_id = $1")
            .bind(user_id)
            .fetch_one(&mut **tx)
            .await
            .map_err(db_err("count memberships"))?;

    if count >= MAX_RELATIONSHIPS_PER_USER {
        tracing::debug!(user_id, count, "Relationship limit reached");
        return Err(StoreError::RelationshipLimit {
            limit: MAX_RELATIONSHIPS_PER_USER,
        });
    }
    Ok(())
}

// ============================================================================
// Users
// ============================================================================

#[async_trait]
impl UserStore for PgStore {
    async fn create_user(&self, user: NewUser) -> StoreResult<User> {
        let row: UserRecord = sqlx::query_as(&format!(
            r#"
            INSERT INTO users (username, email, password_hash, profile_picture)
            VALUES ($1, $2, $3, $4)
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(&user.username)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(&user.profile_picture)
        .fetch_one(&self.pool)
        .await
        .map_err(db_err("create user"))?;

        Ok(row.into())
    }

    async fn find_user_by_id(&self, id: i64) -> StoreResult<Option<User>> {
        let row: Option<UserRecord> =
            sqlx::query_as(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1"))
                .bind(id)
                .fetch_optional(&self.pool)
                .await
                .map_err(db_err("find user"))?;

        Ok(row.map(User::from))
    }

    async fn find_user_by_username(&self, username: &str) -> StoreResult<Option<User>> {
        let row: Option<UserRecord> =
            sqlx::query_as(&format!("SELECT {USER_COLUMNS} FROM users WHERE username = $1"))
                .bind(username)
                .fetch_optional(&self.pool)
                .await
                .map_err(db_err("find user"))?;

        Ok(row.map(User::from))
    }

    async fn update_user(&self, id: i64, update: UserUpdate) -> StoreResult<User> {
        let row: Option<UserRecord> = sqlx::query_as(&format!(
            r#"
            UPDATE users SET
                username = COALESCE($2, username),
                profile_picture = COALESCE($3, profile_picture),
                bio = COALESCE($4, bio)
            WHERE id = $1
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(&update.username)
        .bind(&update.profile_picture)
        .bind(&update.bio)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err("update user"))?;

        row.map(User::from)
            .ok_or_else(|| StoreError::NotFound(format!("user {id}")))
    }

    async fn delete_user(&self, id: i64) -> StoreResult<()> {
        let mut tx = self.pool.begin().await.map_err(db_err("begin transaction"))?;

        // Lock every relationship the user belongs to so a concurrent
        // departure cannot leave one of them empty and undetected.
        let relationship_ids: Vec<i64> = sqlx::query_scalar(
            r#"
            SELECT r.id FROM relationships r
            JOIN relationship_members m ON m.relationship_id = r.id
            WHERE m.user_id = $1
            ORDER BY r.id
            FOR UPDATE OF r
            "#,
        )
        .bind(id)
        .fetch_all(&mut *tx)
        .await
        .map_err(db_err("lock relationships"))?;

        let deleted = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(db_err("delete user"))?;

        if deleted.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("user {id}")));
        }

        let emptied = sqlx::query(
            r#"
            DELETE FROM relationships r
            WHERE r.id = ANY($1)
              AND NOT EXISTS (
                  SELECT 1 FROM relationship_members m WHERE m.relationship_id = r.id
              )
            "#,
        )
        .bind(&relationship_ids)
        .execute(&mut *tx)
        .await
        .map_err(db_err("remove empty relationships"))?;

        tracing::debug!(
            user_id = id,
            removed_relationships = emptied.rows_affected(),
            "User deleted"
        );

        tx.commit().await.map_err(db_err("commit user deletion"))?;
        Ok(())
    }

    async fn search_users(
        &self,
        query: &str,
        limit: i64,
        offset: i64,
    ) -> StoreResult<(Vec<UserSummary>, i64)> {
        let pattern = like_pattern(query);

        let (total,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM users WHERE username ILIKE $1")
                .bind(&pattern)
                .fetch_one(&self.pool)
                .await
                .map_err(db_err("count users"))?;

        let rows: Vec<SummaryRecord> = sqlx::query_as(
            r#"
            SELECT id, username, profile_picture
            FROM users
            WHERE username ILIKE $1
            ORDER BY username
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(&pattern)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err("search users"))?;

        Ok((rows.into_iter().map(UserSummary::from).collect(), total))
    }
}

// ============================================================================
// Sessions
// ============================================================================

#[async_trait]
impl SessionStore for PgStore {
    async fn store_refresh_token(
        &self,
        user_id: i64,
        token_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO refresh_tokens (user_id, token_hash, expires_at)
            VALUES ($1, $2, $3)
            ON CONFLICT (user_id) DO UPDATE
            SET token_hash = EXCLUDED.token_hash, expires_at = EXCLUDED.expires_at
            "#,
        )
        .bind(user_id)
        .bind(token_hash)
        .bind(expires_at)
        .execute(&self.pool)
        .await
        .map_err(db_err("store refresh token"))?;

        Ok(())
    }

    async fn rotate_refresh_token(
        &self,
        user_id: i64,
        presented_hash: &str,
        new_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> StoreResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE refresh_tokens
            SET token_hash = $3, expires_at = $4
            WHERE user_id = $1 AND token_hash = $2 AND expires_at > NOW()
            "#,
        )
        .bind(user_id)
        .bind(presented_hash)
        .bind(new_hash)
        .bind(expires_at)
        .execute(&self.pool)
        .await
        .map_err(db_err("rotate refresh token"))?;

        Ok(result.rows_affected() == 1)
    }

    async fn revoke_refresh_token(&self, user_id: i64) -> StoreResult<()> {
        sqlx::query("DELETE FROM refresh_tokens WHERE user_id = $1")
            .bind(user_id)
            .execute(&self.pool)
            .await
            .map_err(db_err("revoke refresh token"))?;

        Ok(())
    }
}

// ============================================================================
// Relationships
// ============================================================================

#[async_trait]
impl RelationshipStore for PgStore {
    async fn create_relationship(
        &self,
        name: &str,
        picture: &str,
        creator_id: i64,
    ) -> StoreResult<Relationship> {
        let mut tx = self.pool.begin().await.map_err(db_err("begin transaction"))?;

        ensure_below_limit(&mut tx, creator_id).await?;

        let row: RelationshipRecord = sqlx::query_as(
            r#"
            INSERT INTO relationships (name, picture)
            VALUES ($1, $2)
            RETURNING id, name, picture, created_at
            "#,
        )
        .bind(name)
        .bind(picture)
        .fetch_one(&mut *tx)
        .await
        .map_err(db_err("create relationship"))?;

        sqlx::query("INSERT INTO relationship_members (relationship_id, user_id) VALUES ($1, $2)")
            .bind(row.id)
            .bind(creator_id)
            .execute(&mut *tx)
            .await
            .map_err(db_err("add member"))?;

        tx.commit().await.map_err(db_err("commit relationship"))?;
        Ok(row.into())
    }

    async fn find_relationship(&self, id: i64) -> StoreResult<Option<Relationship>> {
        let row: Option<RelationshipRecord> = sqlx::query_as(
            "SELECT id, name, picture, created_at FROM relationships WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err("find relationship"))?;

        Ok(row.map(Relationship::from))
    }

    async fn list_user_relationships(&self, user_id: i64) -> StoreResult<Vec<Relationship>> {
        let rows: Vec<RelationshipRecord> = sqlx::query_as(
            r#"
            SELECT r.id, r.name, r.picture, r.created_at
            FROM relationships r
            JOIN relationship_members m ON m.relationship_id = r.id
            WHERE m.user_id = $1
            ORDER BY r.created_at, r.id
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err("list relationships"))?;

        Ok(rows.into_iter().map(Relationship::from).collect())
    }

    async fn list_members(&self, relationship_id: i64) -> StoreResult<Vec<UserSummary>> {
        let rows: Vec<SummaryRecord> = sqlx::query_as(
            r#"
            SELECT u.id, u.username, u.profile_picture
            FROM users u
            JOIN relationship_members m ON m.user_id = u.id
            WHERE m.relationship_id = $1
            ORDER BY m.joined_at, u.id
            "#,
        )
        .bind(relationship_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err("list members"))?;

        Ok(rows.into_iter().map(UserSummary::from).collect())
    }

    async fn is_member(&self, relationship_id: i64, user_id: i64) -> StoreResult<bool> {
        let (exists,): (bool,) = sqlx::query_as(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM relationship_members
                WHERE relationship_id = $1 AND user_id = $2
            )
            "#,
        )
        .bind(relationship_id)
        .bind(user_id)
        .fetch_one(&self.pool)
        .await
        .map_err(db_err("check membership"))?;

        Ok(exists)
    }

    async fn update_relationship(
        &self,
        id: i64,
        update: RelationshipUpdate,
    ) -> StoreResult<Relationship> {
        let row: Option<RelationshipRecord> = sqlx::query_as(
            r#"
            UPDATE relationships SET
                name = COALESCE($2, name),
                picture = COALESCE($3, picture)
            WHERE id = $1
            RETURNING id, name, picture, created_at
            "#,
        )
        .bind(id)
        .bind(&update.name)
        .bind(&update.picture)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err("update relationship"))?;

        row.map(Relationship::from)
            .ok_or_else(|| StoreError::NotFound(format!("relationship {id}")))
    }

    async fn delete_relationship_if_sole_member(
        &self,
        id: i64,
        user_id: i64,
    ) -> StoreResult<bool> {
        let mut tx = self.pool.begin().await.map_err(db_err("begin transaction"))?;

        let locked: Option<(i64,)> =
            sqlx::query_as("SELECT id FROM relationships WHERE id = $1 FOR UPDATE")
                .bind(id)
                .fetch_optional(&mut *tx)
                .await
                .map_err(db_err("lock relationship"))?;

        if locked.is_none() {
            return Err(StoreError::NotFound(format!("relationship {id}")));
        }

        let members: Vec<i64> = sqlx::query_scalar(
            "SELECT user_id FROM relationship_members WHERE relationship_id = $1",
        )
        .bind(id)
        .fetch_all(&mut *tx)
        .await
        .map_err(db_err("list members"))?;

        if members != [user_id] {
            return Ok(false);
        }

        // Notes, invites and the membership row cascade
        sqlx::query("DELETE FROM relationships WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(db_err("delete relationship"))?;

        tx.commit().await.map_err(db_err("commit relationship deletion"))?;
        Ok(true)
    }
}

// ============================================================================
// Invites
// ============================================================================

#[async_trait]
impl InviteStore for PgStore {
    async fn create_invite(&self, invite: NewInvite) -> StoreResult<Invite> {
        let row: InviteRecord = sqlx::query_as(&format!(
            r#"
            WITH src AS (
                INSERT INTO invites (relationship_id, inviter_id, invitee_id, body)
                VALUES ($1, $2, $3, $4)
                RETURNING *
            )
            {INVITE_PROJECTION}
            "#
        ))
        .bind(invite.relationship_id)
        .bind(invite.inviter_id)
        .bind(invite.invitee_id)
        .bind(&invite.body)
        .fetch_one(&self.pool)
        .await
        .map_err(db_err("create invite"))?;

        Ok(row.into())
    }

    async fn find_invite(&self, id: i64) -> StoreResult<Option<Invite>> {
        let row: Option<InviteRecord> = sqlx::query_as(&format!(
            "WITH src AS (SELECT * FROM invites WHERE id = $1) {INVITE_PROJECTION}"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err("find invite"))?;

        Ok(row.map(Invite::from))
    }

    async fn list_invites_for(
        &self,
        invitee_id: i64,
        limit: i64,
        offset: i64,
    ) -> StoreResult<(Vec<Invite>, i64)> {
        let (total,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM invites WHERE invitee_id = $1")
            .bind(invitee_id)
            .fetch_one(&self.pool)
            .await
            .map_err(db_err("count invites"))?;

        let rows: Vec<InviteRecord> = sqlx::query_as(&format!(
            r#"
            WITH src AS (SELECT * FROM invites WHERE invitee_id = $1)
            {INVITE_PROJECTION}
            ORDER BY i.created_at DESC, i.id DESC
            LIMIT $2 OFFSET $3
            "#
        ))
        .bind(invitee_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err("list invites"))?;

        Ok((rows.into_iter().map(Invite::from).collect(), total))
    }

    async fn accept_invite(&self, invite_id: i64, invitee_id: i64) -> StoreResult<i64> {
        let mut tx = self.pool.begin().await.map_err(db_err("begin transaction"))?;

        // A concurrent acceptance blocks on the row lock and then sees no row
        let relationship_id: Option<i64> = sqlx::query_scalar(
            "DELETE FROM invites WHERE id = $1 AND invitee_id = $2 RETURNING relationship_id",
        )
        .bind(invite_id)
        .bind(invitee_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(db_err("consume invite"))?;

        let relationship_id =
            relationship_id.ok_or_else(|| StoreError::NotFound(format!("invite {invite_id}")))?;

        ensure_below_limit(&mut tx, invitee_id).await?;

        sqlx::query(
            r#"
            INSERT INTO relationship_members (relationship_id, user_id)
            VALUES ($1, $2)
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(relationship_id)
        .bind(invitee_id)
        .execute(&mut *tx)
        .await
        .map_err(db_err("add member"))?;

        tx.commit().await.map_err(db_err("commit invite acceptance"))?;
        Ok(relationship_id)
    }

    async fn delete_invite(&self, id: i64) -> StoreResult<bool> {
        let result = sqlx::query("DELETE FROM invites WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(db_err("delete invite"))?;

        Ok(result.rows_affected() > 0)
    }
}

// ============================================================================
// Notes
// ============================================================================

#[async_trait]
impl NoteStore for PgStore {
    async fn create_note(&self, note: NewNote) -> StoreResult<Note> {
        let row: NoteRecord = sqlx::query_as(&format!(
            r#"
            WITH src AS (
                INSERT INTO notes (
                    relationship_id, author_id, title, content,
                    position_x, position_y, color
                ) VALUES ($1, $2, $3, $4, $5, $6, $7)
                RETURNING *
            )
            {NOTE_PROJECTION}
            "#
        ))
        .bind(note.relationship_id)
        .bind(note.author_id)
        .bind(&note.title)
        .bind(&note.content)
        .bind(note.position_x)
        .bind(note.position_y)
        .bind(&note.color)
        .fetch_one(&self.pool)
        .await
        .map_err(db_err("create note"))?;

        Ok(row.into())
    }

    async fn find_note(&self, id: i64) -> StoreResult<Option<Note>> {
        let row: Option<NoteRecord> = sqlx::query_as(&format!(
            "WITH src AS (SELECT * FROM notes WHERE id = $1) {NOTE_PROJECTION}"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err("find note"))?;

        Ok(row.map(Note::from))
    }

    async fn list_notes_for_month(
        &self,
        relationship_id: i64,
        year: i32,
        month: u32,
    ) -> StoreResult<Vec<Note>> {
        let Some((start, end)) = month_bounds(year, month) else {
            return Ok(Vec::new());
        };

        let rows: Vec<NoteRecord> = sqlx::query_as(&format!(
            r#"
            WITH src AS (
                SELECT * FROM notes
                WHERE relationship_id = $1 AND created_at >= $2 AND created_at < $3
            )
            {NOTE_PROJECTION}
            ORDER BY n.created_at, n.id
            "#
        ))
        .bind(relationship_id)
        .bind(start)
        .bind(end)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err("list notes"))?;

        Ok(rows.into_iter().map(Note::from).collect())
    }

    async fn update_note(&self, id: i64, update: NoteUpdate) -> StoreResult<Note> {
        let row: Option<NoteRecord> = sqlx::query_as(&format!(
            r#"
            WITH src AS (
                UPDATE notes SET
                    title = COALESCE($2, title),
                    content = COALESCE($3, content),
                    position_x = COALESCE($4, position_x),
                    position_y = COALESCE($5, position_y),
                    color = COALESCE($6, color)
                WHERE id = $1
                RETURNING *
            )
            {NOTE_PROJECTION}
            "#
        ))
        .bind(id)
        .bind(&update.title)
        .bind(&update.content)
        .bind(update.position_x)
        .bind(update.position_y)
        .bind(&update.color)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err("update note"))?;

        row.map(Note::from)
            .ok_or_else(|| StoreError::NotFound(format!("note {id}")))
    }

    async fn delete_note(&self, id: i64) -> StoreResult<bool> {
        let result = sqlx::query("DELETE FROM notes WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(db_err("delete note"))?;

        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl Store for PgStore {
    async fn ping(&self) -> StoreResult<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(db_err("ping database"))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_like_pattern_wraps_query() {
        assert_eq!(like_pattern("ali"), "%ali%");
        assert_eq!(like_pattern(""), "%%");
    }

    #[test]
    fn test_like_pattern_escapes_wildcards() {
        assert_eq!(like_pattern("a_b%"), "%a\\_b\\%%");
        assert_eq!(like_pattern("back\\slash"), "%back\\\\slash%");
    }

    #[test]
    fn test_non_database_error_maps_to_database() {
        let err = db_err("find user")(sqlx::Error::RowNotFound);
        assert!(matches!(err, StoreError::Database(msg) if msg.starts_with("Failed to find user")));
    }
}
