//! In-process store
//!
//! Backs the HTTP integration tests and local demos. All state sits behind
//! one async mutex, so every trait method is atomic just like the
//! transactional PostgreSQL implementation.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use lovenote_core::{
    month_bounds, Invite, InviteStore, NewInvite, NewNote, NewUser, Note, NoteStore, NoteUpdate,
    Relationship, RelationshipStore, RelationshipUpdate, SessionStore, Store, StoreError,
    StoreResult, User, UserStore, UserSummary, UserUpdate, MAX_RELATIONSHIPS_PER_USER,
};

#[derive(Debug, Clone)]
struct InviteRow {
    id: i64,
    relationship_id: i64,
    inviter_id: i64,
    invitee_id: i64,
    body: String,
    created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
struct NoteRow {
    id: i64,
    relationship_id: i64,
    author_id: i64,
    title: String,
    content: String,
    position_x: f32,
    position_y: f32,
    color: String,
    created_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct State {
    next_id: i64,
    users: BTreeMap<i64, User>,
    refresh_tokens: HashMap<i64, (String, DateTime<Utc>)>,
    relationships: BTreeMap<i64, Relationship>,
    /// relationship id -> member ids in join order
    members: BTreeMap<i64, Vec<i64>>,
    invites: BTreeMap<i64, InviteRow>,
    notes: BTreeMap<i64, NoteRow>,
}

impl State {
    fn allocate_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn membership_count(&self, user_id: i64) -> i64 {
        self.members
            .values()
            .filter(|ids| ids.contains(&user_id))
            .count() as i64
    }

    fn ensure_below_limit(&self, user_id: i64) -> StoreResult<()> {
        if !self.users.contains_key(&user_id) {
            return Err(StoreError::NotFound(format!("user {user_id}")));
        }
        if self.membership_count(user_id) >= MAX_RELATIONSHIPS_PER_USER {
            return Err(StoreError::RelationshipLimit {
                limit: MAX_RELATIONSHIPS_PER_USER,
            });
        }
        Ok(())
    }

    fn summary(&self, user_id: i64) -> StoreResult<UserSummary> {
        self.users
            .get(&user_id)
            .map(UserSummary::from)
            .ok_or_else(|| StoreError::NotFound(format!("user {user_id}")))
    }

    fn invite(&self, row: &InviteRow) -> StoreResult<Invite> {
        let relationship = self
            .relationships
            .get(&row.relationship_id)
            .ok_or_else(|| StoreError::NotFound(format!("relationship {}", row.relationship_id)))?;

        Ok(Invite {
            id: row.id,
            relationship_id: row.relationship_id,
            relationship_name: relationship.name.clone(),
            inviter: self.summary(row.inviter_id)?,
            invitee_id: row.invitee_id,
            body: row.body.clone(),
            created_at: row.created_at,
        })
    }

    fn note(&self, row: &NoteRow) -> StoreResult<Note> {
        Ok(Note {
            id: row.id,
            relationship_id: row.relationship_id,
            author: self.summary(row.author_id)?,
            title: row.title.clone(),
            content: row.content.clone(),
            position_x: row.position_x,
            position_y: row.position_y,
            color: row.color.clone(),
            created_at: row.created_at,
        })
    }

    fn remove_relationship(&mut self, id: i64) {
        self.relationships.remove(&id);
        self.members.remove(&id);
        self.invites.retain(|_, i| i.relationship_id != id);
        self.notes.retain(|_, n| n.relationship_id != id);
    }
}

/// In-memory store
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Backdate a note; used to exercise month filtering
    pub async fn set_note_created_at(&self, note_id: i64, created_at: DateTime<Utc>) -> bool {
        let mut state = self.state.lock().await;
        match state.notes.get_mut(&note_id) {
            Some(note) => {
                note.created_at = created_at;
                true
            }
            None => false,
        }
    }
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn create_user(&self, user: NewUser) -> StoreResult<User> {
        let mut state = self.state.lock().await;

        if state
            .users
            .values()
            .any(|u| u.username == user.username || u.email == user.email)
        {
            return Err(StoreError::Duplicate(
                "create user: record already exists".to_string(),
            ));
        }

        let id = state.allocate_id();
        let record = User {
            id,
            username: user.username,
            email: user.email,
            password_hash: user.password_hash,
            profile_picture: user.profile_picture,
            bio: String::new(),
            created_at: Utc::now(),
        };
        state.users.insert(id, record.clone());
        Ok(record)
    }

    async fn find_user_by_id(&self, id: i64) -> StoreResult<Option<User>> {
        Ok(self.state.lock().await.users.get(&id).cloned())
    }

    async fn find_user_by_username(&self, username: &str) -> StoreResult<Option<User>> {
        let state = self.state.lock().await;
        Ok(state.users.values().find(|u| u.username == username).cloned())
    }

    async fn update_user(&self, id: i64, update: UserUpdate) -> StoreResult<User> {
        let mut state = self.state.lock().await;

        if let Some(username) = &update.username {
            if state
                .users
                .values()
                .any(|u| u.id != id && &u.username == username)
            {
                return Err(StoreError::Duplicate(
                    "update user: record already exists".to_string(),
                ));
            }
        }

        let user = state
            .users
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound(format!("user {id}")))?;

        if let Some(username) = update.username {
            user.username = username;
        }
        if let Some(picture) = update.profile_picture {
            user.profile_picture = picture;
        }
        if let Some(bio) = update.bio {
            user.bio = bio;
        }
        Ok(user.clone())
    }

    async fn delete_user(&self, id: i64) -> StoreResult<()> {
        let mut state = self.state.lock().await;

        if state.users.remove(&id).is_none() {
            return Err(StoreError::NotFound(format!("user {id}")));
        }

        state.refresh_tokens.remove(&id);
        state
            .invites
            .retain(|_, i| i.inviter_id != id && i.invitee_id != id);
        state.notes.retain(|_, n| n.author_id != id);

        let mut emptied = Vec::new();
        for (relationship_id, ids) in state.members.iter_mut() {
            ids.retain(|member| *member != id);
            if ids.is_empty() {
                emptied.push(*relationship_id);
            }
        }
        for relationship_id in emptied {
            state.remove_relationship(relationship_id);
        }
        Ok(())
    }

    async fn search_users(
        &self,
        query: &str,
        limit: i64,
        offset: i64,
    ) -> StoreResult<(Vec<UserSummary>, i64)> {
        let state = self.state.lock().await;
        let needle = query.to_lowercase();

        let mut matches: Vec<&User> = state
            .users
            .values()
            .filter(|u| u.username.to_lowercase().contains(&needle))
            .collect();
        matches.sort_by(|a, b| a.username.cmp(&b.username));

        let total = matches.len() as i64;
        let page = matches
            .into_iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .map(UserSummary::from)
            .collect();
        Ok((page, total))
    }
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn store_refresh_token(
        &self,
        user_id: i64,
        token_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> StoreResult<()> {
        let mut state = self.state.lock().await;
        if !state.users.contains_key(&user_id) {
            return Err(StoreError::NotFound(format!("user {user_id}")));
        }
        state
            .refresh_tokens
            .insert(user_id, (token_hash.to_string(), expires_at));
        Ok(())
    }

    async fn rotate_refresh_token(
        &self,
        user_id: i64,
        presented_hash: &str,
        new_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> StoreResult<bool> {
        let mut state = self.state.lock().await;
        match state.refresh_tokens.get_mut(&user_id) {
            Some(entry) if entry.0 == presented_hash && entry.1 > Utc::now() => {
                *entry = (new_hash.to_string(), expires_at);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn revoke_refresh_token(&self, user_id: i64) -> StoreResult<()> {
        self.state.lock().await.refresh_tokens.remove(&user_id);
        Ok(())
    }
}

#[async_trait]
impl RelationshipStore for MemoryStore {
    async fn create_relationship(
        &self,
        name: &str,
        picture: &str,
        creator_id: i64,
    ) -> StoreResult<Relationship> {
        let mut state = self.state.lock().await;
        state.ensure_below_limit(creator_id)?;

        let id = state.allocate_id();
        let relationship = Relationship {
            id,
            name: name.to_string(),
            picture: picture.to_string(),
            created_at: Utc::now(),
        };
        state.relationships.insert(id, relationship.clone());
        state.members.insert(id, vec![creator_id]);
        Ok(relationship)
    }

    async fn find_relationship(&self, id: i64) -> StoreResult<Option<Relationship>> {
        Ok(self.state.lock().await.relationships.get(&id).cloned())
    }

    async fn list_user_relationships(&self, user_id: i64) -> StoreResult<Vec<Relationship>> {
        let state = self.state.lock().await;
        Ok(state
            .members
            .iter()
            .filter(|(_, ids)| ids.contains(&user_id))
            .filter_map(|(id, _)| state.relationships.get(id).cloned())
            .collect())
    }

    async fn list_members(&self, relationship_id: i64) -> StoreResult<Vec<UserSummary>> {
        let state = self.state.lock().await;
        let Some(ids) = state.members.get(&relationship_id) else {
            return Ok(Vec::new());
        };
        ids.iter().map(|id| state.summary(*id)).collect()
    }

    async fn is_member(&self, relationship_id: i64, user_id: i64) -> StoreResult<bool> {
        let state = self.state.lock().await;
        Ok(state
            .members
            .get(&relationship_id)
            .is_some_and(|ids| ids.contains(&user_id)))
    }

    async fn update_relationship(
        &self,
        id: i64,
        update: RelationshipUpdate,
    ) -> StoreResult<Relationship> {
        let mut state = self.state.lock().await;
        let relationship = state
            .relationships
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound(format!("relationship {id}")))?;

        if let Some(name) = update.name {
            relationship.name = name;
        }
        if let Some(picture) = update.picture {
            relationship.picture = picture;
        }
        Ok(relationship.clone())
    }

    async fn delete_relationship_if_sole_member(
        &self,
        id: i64,
        user_id: i64,
    ) -> StoreResult<bool> {
        let mut state = self.state.lock().await;
        let Some(members) = state.members.get(&id) else {
            return Err(StoreError::NotFound(format!("relationship {id}")));
        };

        if members.as_slice() != [user_id] {
            return Ok(false);
        }
        state.remove_relationship(id);
        Ok(true)
    }
}

#[async_trait]
impl InviteStore for MemoryStore {
    async fn create_invite(&self, invite: NewInvite) -> StoreResult<Invite> {
        let mut state = self.state.lock().await;

        if !state.relationships.contains_key(&invite.relationship_id)
            || !state.users.contains_key(&invite.inviter_id)
            || !state.users.contains_key(&invite.invitee_id)
        {
            return Err(StoreError::NotFound(
                "create invite: referenced record does not exist".to_string(),
            ));
        }
        if state.invites.values().any(|i| {
            i.relationship_id == invite.relationship_id && i.invitee_id == invite.invitee_id
        }) {
            return Err(StoreError::Duplicate(
                "create invite: record already exists".to_string(),
            ));
        }

        let id = state.allocate_id();
        let row = InviteRow {
            id,
            relationship_id: invite.relationship_id,
            inviter_id: invite.inviter_id,
            invitee_id: invite.invitee_id,
            body: invite.body,
            created_at: Utc::now(),
        };
        let view = state.invite(&row)?;
        state.invites.insert(id, row);
        Ok(view)
    }

    async fn find_invite(&self, id: i64) -> StoreResult<Option<Invite>> {
        let state = self.state.lock().await;
        state.invites.get(&id).map(|row| state.invite(row)).transpose()
    }

    async fn list_invites_for(
        &self,
        invitee_id: i64,
        limit: i64,
        offset: i64,
    ) -> StoreResult<(Vec<Invite>, i64)> {
        let state = self.state.lock().await;

        // Newest first, matching the SQL ordering
        let rows: Vec<&InviteRow> = state
            .invites
            .values()
            .rev()
            .filter(|i| i.invitee_id == invitee_id)
            .collect();
        let total = rows.len() as i64;

        let page = rows
            .into_iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .map(|row| state.invite(row))
            .collect::<StoreResult<Vec<_>>>()?;
        Ok((page, total))
    }

    async fn accept_invite(&self, invite_id: i64, invitee_id: i64) -> StoreResult<i64> {
        let mut state = self.state.lock().await;

        let relationship_id = match state.invites.get(&invite_id) {
            Some(row) if row.invitee_id == invitee_id => row.relationship_id,
            _ => return Err(StoreError::NotFound(format!("invite {invite_id}"))),
        };
        state.ensure_below_limit(invitee_id)?;

        state.invites.remove(&invite_id);
        let members = state.members.entry(relationship_id).or_default();
        if !members.contains(&invitee_id) {
            members.push(invitee_id);
        }
        Ok(relationship_id)
    }

    async fn delete_invite(&self, id: i64) -> StoreResult<bool> {
        Ok(self.state.lock().await.invites.remove(&id).is_some())
    }
}

#[async_trait]
impl NoteStore for MemoryStore {
    async fn create_note(&self, note: NewNote) -> StoreResult<Note> {
        let mut state = self.state.lock().await;

        if !state.relationships.contains_key(&note.relationship_id)
            || !state.users.contains_key(&note.author_id)
        {
            return Err(StoreError::NotFound(
                "create note: referenced record does not exist".to_string(),
            ));
        }

        let id = state.allocate_id();
        let row = NoteRow {
            id,
            relationship_id: note.relationship_id,
            author_id: note.author_id,
            title: note.title,
            content: note.content,
            position_x: note.position_x,
            position_y: note.position_y,
            color: note.color,
            created_at: Utc::now(),
        };
        let view = state.note(&row)?;
        state.notes.insert(id, row);
        Ok(view)
    }

    async fn find_note(&self, id: i64) -> StoreResult<Option<Note>> {
        let state = self.state.lock().await;
        state.notes.get(&id).map(|row| state.note(row)).transpose()
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

        let state = self.state.lock().await;
        let mut rows: Vec<&NoteRow> = state
            .notes
            .values()
            .filter(|n| {
                n.relationship_id == relationship_id && n.created_at >= start && n.created_at < end
            })
            .collect();
        rows.sort_by_key(|n| (n.created_at, n.id));

        rows.into_iter().map(|row| state.note(row)).collect()
    }

    async fn update_note(&self, id: i64, update: NoteUpdate) -> StoreResult<Note> {
        let mut state = self.state.lock().await;
        let row = state
            .notes
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound(format!("note {id}")))?;

        if let Some(title) = update.title {
            row.title = title;
        }
        if let Some(content) = update.content {
            row.content = content;
        }
        if let Some(x) = update.position_x {
            row.position_x = x;
        }
        if let Some(y) = update.position_y {
            row.position_y = y;
        }
        if let Some(color) = update.color {
            row.color = color;
        }

        let row = row.clone();
        state.note(&row)
    }

    async fn delete_note(&self, id: i64) -> StoreResult<bool> {
        Ok(self.state.lock().await.notes.remove(&id).is_some())
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn ping(&self) -> StoreResult<()> {
        Ok(())
    }
}
