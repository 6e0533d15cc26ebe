//! SQLite storage layer for quad.
//!
//! Owns the schema and CRUD operations for profiles, conversations,
//! participant membership, and the per-conversation message log. Both the
//! web server and the library components share one `Storage` handle.

use std::path::{Path, PathBuf};

use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub enum StorageError {
    Sqlite(rusqlite::Error),
    NotFound(String),
    AlreadyExists(String),
}

impl std::fmt::Display for StorageError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StorageError::Sqlite(e) => write!(f, "sqlite error: {e}"),
            StorageError::NotFound(msg) => write!(f, "not found: {msg}"),
            StorageError::AlreadyExists(msg) => write!(f, "already exists: {msg}"),
        }
    }
}

impl std::error::Error for StorageError {}

impl From<rusqlite::Error> for StorageError {
    fn from(e: rusqlite::Error) -> Self {
        StorageError::Sqlite(e)
    }
}

/// True when the underlying SQLite error is a uniqueness/constraint violation.
/// Used by the conversation resolver to detect a lost creation race.
pub fn is_constraint_violation(err: &StorageError) -> bool {
    matches!(
        err,
        StorageError::Sqlite(rusqlite::Error::SqliteFailure(e, _))
            if e.code == rusqlite::ErrorCode::ConstraintViolation
    )
}

// ---------------------------------------------------------------------------
// Row types
// ---------------------------------------------------------------------------

/// Profile row stored in the database. Owned by the identity platform;
/// this service only reads it (plus an upsert used for seeding).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileRow {
    pub user_id: String,
    pub name: String,
    pub avatar_url: Option<String>,
    pub major: Option<String>,
    pub year: Option<String>,
    pub updated_at: u64,
}

/// Conversation row stored in the database.
///
/// `pair_key` is the sorted `"a|b"` participant pair for direct
/// conversations and `None` for group/course channels. A UNIQUE index on it
/// is what makes direct-conversation creation race-safe.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationRow {
    pub conversation_id: String,
    /// "direct", "group", or "course_channel"
    pub kind: String,
    pub name: Option<String>,
    pub pair_key: Option<String>,
    pub created_at: u64,
}

/// Participant membership row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParticipantRow {
    pub conversation_id: String,
    pub user_id: String,
    pub joined_at: u64,
}

/// Message row stored in the database.
///
/// `seq` is the SQLite rowid assigned at insert; `(created_at, seq)` is the
/// stable total order of a conversation's messages.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageRow {
    pub seq: i64,
    pub message_id: String,
    pub conversation_id: String,
    pub sender_id: String,
    pub content: String,
    pub created_at: u64,
    pub is_read: bool,
}

/// Conversation summary for the conversations list view: the most recent
/// message plus the viewer's unread count.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationSummary {
    pub conversation_id: String,
    pub kind: String,
    pub name: Option<String>,
    pub created_at: u64,
    pub last_content: Option<String>,
    pub last_sender_id: Option<String>,
    pub last_timestamp: Option<u64>,
    pub unread_count: u32,
}

// ---------------------------------------------------------------------------
// Storage handle
// ---------------------------------------------------------------------------

/// Main storage handle wrapping a SQLite connection.
pub struct Storage {
    conn: Connection,
}

const MESSAGE_COLUMNS: &str =
    "seq, message_id, conversation_id, sender_id, content, created_at, is_read";

fn message_from_row(row: &rusqlite::Row<'_>) -> Result<MessageRow, rusqlite::Error> {
    Ok(MessageRow {
        seq: row.get(0)?,
        message_id: row.get(1)?,
        conversation_id: row.get(2)?,
        sender_id: row.get(3)?,
        content: row.get(4)?,
        created_at: row.get::<_, i64>(5)? as u64,
        is_read: row.get::<_, i32>(6)? != 0,
    })
}

fn conversation_from_row(row: &rusqlite::Row<'_>) -> Result<ConversationRow, rusqlite::Error> {
    Ok(ConversationRow {
        conversation_id: row.get(0)?,
        kind: row.get(1)?,
        name: row.get(2)?,
        pair_key: row.get(3)?,
        created_at: row.get::<_, i64>(4)? as u64,
    })
}

impl Storage {
    /// Open or create a database at the given path. Creates schema if needed.
    pub fn open(path: &Path) -> Result<Self, StorageError> {
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
        let storage = Self { conn };
        storage.create_schema()?;
        Ok(storage)
    }

    /// Create an in-memory database. Used by tests and anywhere a component
    /// needs a store without touching disk.
    pub fn open_in_memory() -> Result<Self, StorageError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        let storage = Self { conn };
        storage.create_schema()?;
        Ok(storage)
    }

    fn create_schema(&self) -> Result<(), StorageError> {
        self.conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS profiles (
                user_id     TEXT PRIMARY KEY,
                name        TEXT NOT NULL,
                avatar_url  TEXT,
                major       TEXT,
                year        TEXT,
                updated_at  INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS conversations (
                conversation_id TEXT PRIMARY KEY,
                kind            TEXT NOT NULL,
                name            TEXT,
                pair_key        TEXT,
                created_at      INTEGER NOT NULL
            );

            CREATE UNIQUE INDEX IF NOT EXISTS idx_conversations_pair
                ON conversations(pair_key) WHERE pair_key IS NOT NULL;

            CREATE TABLE IF NOT EXISTS participants (
                conversation_id TEXT NOT NULL REFERENCES conversations(conversation_id),
                user_id         TEXT NOT NULL,
                joined_at       INTEGER NOT NULL,
                PRIMARY KEY (conversation_id, user_id)
            );

            CREATE INDEX IF NOT EXISTS idx_participants_user
                ON participants(user_id);

            CREATE TABLE IF NOT EXISTS messages (
                seq             INTEGER PRIMARY KEY AUTOINCREMENT,
                message_id      TEXT NOT NULL UNIQUE,
                conversation_id TEXT NOT NULL REFERENCES conversations(conversation_id),
                sender_id       TEXT NOT NULL,
                content         TEXT NOT NULL,
                created_at      INTEGER NOT NULL,
                is_read         INTEGER NOT NULL DEFAULT 0
            );

            CREATE INDEX IF NOT EXISTS idx_messages_conversation
                ON messages(conversation_id, created_at, seq);
            CREATE INDEX IF NOT EXISTS idx_messages_unread
                ON messages(conversation_id, is_read, sender_id);
            ",
        )?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Profiles
    // -----------------------------------------------------------------------

    pub fn upsert_profile(&self, row: &ProfileRow) -> Result<(), StorageError> {
        self.conn.execute(
            "INSERT OR REPLACE INTO profiles (user_id, name, avatar_url, major, year, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                row.user_id,
                row.name,
                row.avatar_url,
                row.major,
                row.year,
                row.updated_at as i64,
            ],
        )?;
        Ok(())
    }

    pub fn get_profile(&self, user_id: &str) -> Result<Option<ProfileRow>, StorageError> {
        let mut stmt = self.conn.prepare(
            "SELECT user_id, name, avatar_url, major, year, updated_at
             FROM profiles WHERE user_id = ?1",
        )?;
        let row = stmt
            .query_row(params![user_id], |row| {
                Ok(ProfileRow {
                    user_id: row.get(0)?,
                    name: row.get(1)?,
                    avatar_url: row.get(2)?,
                    major: row.get(3)?,
                    year: row.get(4)?,
                    updated_at: row.get::<_, i64>(5)? as u64,
                })
            })
            .optional()?;
        Ok(row)
    }

    /// Case-insensitive name search, excluding one user (the caller).
    pub fn search_profiles(
        &self,
        query: &str,
        exclude_user_id: &str,
        limit: u32,
    ) -> Result<Vec<ProfileRow>, StorageError> {
        let mut stmt = self.conn.prepare(
            "SELECT user_id, name, avatar_url, major, year, updated_at
             FROM profiles
             WHERE user_id <> ?1 AND name LIKE '%' || ?2 || '%'
             ORDER BY name LIMIT ?3",
        )?;
        let rows = stmt.query_map(params![exclude_user_id, query, limit as i64], |row| {
            Ok(ProfileRow {
                user_id: row.get(0)?,
                name: row.get(1)?,
                avatar_url: row.get(2)?,
                major: row.get(3)?,
                year: row.get(4)?,
                updated_at: row.get::<_, i64>(5)? as u64,
            })
        })?;
        let mut result = Vec::new();
        for row in rows {
            result.push(row?);
        }
        Ok(result)
    }

    // -----------------------------------------------------------------------
    // Conversations
    // -----------------------------------------------------------------------

    /// Insert a conversation row. A violated pair-key uniqueness constraint
    /// is reported as `AlreadyExists` so the resolver can converge on the
    /// racing winner.
    pub fn insert_conversation(&self, row: &ConversationRow) -> Result<(), StorageError> {
        let result = self.conn.execute(
            "INSERT INTO conversations (conversation_id, kind, name, pair_key, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                row.conversation_id,
                row.kind,
                row.name,
                row.pair_key,
                row.created_at as i64,
            ],
        );
        match result {
            Ok(_) => Ok(()),
            Err(e) => {
                let err = StorageError::from(e);
                if is_constraint_violation(&err) {
                    if let Some(pair) = &row.pair_key {
                        return Err(StorageError::AlreadyExists(pair.clone()));
                    }
                }
                Err(err)
            }
        }
    }

    pub fn get_conversation(
        &self,
        conversation_id: &str,
    ) -> Result<Option<ConversationRow>, StorageError> {
        let mut stmt = self.conn.prepare(
            "SELECT conversation_id, kind, name, pair_key, created_at
             FROM conversations WHERE conversation_id = ?1",
        )?;
        let row = stmt
            .query_row(params![conversation_id], conversation_from_row)
            .optional()?;
        Ok(row)
    }

    /// Find a direct conversation both users participate in.
    pub fn find_direct_conversation(
        &self,
        user_a: &str,
        user_b: &str,
    ) -> Result<Option<ConversationRow>, StorageError> {
        let mut stmt = self.conn.prepare(
            "SELECT c.conversation_id, c.kind, c.name, c.pair_key, c.created_at
             FROM conversations c
             JOIN participants pa ON pa.conversation_id = c.conversation_id AND pa.user_id = ?1
             JOIN participants pb ON pb.conversation_id = c.conversation_id AND pb.user_id = ?2
             WHERE c.kind = 'direct'
             LIMIT 1",
        )?;
        let row = stmt
            .query_row(params![user_a, user_b], conversation_from_row)
            .optional()?;
        Ok(row)
    }

    /// Look a direct conversation up by its pair key. Reaches conversations
    /// whose participant links were never written (creation lost a race or
    /// failed partway), which the participant join above cannot see.
    pub fn get_conversation_by_pair(
        &self,
        pair_key: &str,
    ) -> Result<Option<ConversationRow>, StorageError> {
        let mut stmt = self.conn.prepare(
            "SELECT conversation_id, kind, name, pair_key, created_at
             FROM conversations WHERE pair_key = ?1",
        )?;
        let row = stmt
            .query_row(params![pair_key], conversation_from_row)
            .optional()?;
        Ok(row)
    }

    /// List every conversation a user participates in, newest first.
    pub fn list_user_conversations(
        &self,
        user_id: &str,
    ) -> Result<Vec<ConversationRow>, StorageError> {
        let mut stmt = self.conn.prepare(
            "SELECT c.conversation_id, c.kind, c.name, c.pair_key, c.created_at
             FROM conversations c
             JOIN participants p ON p.conversation_id = c.conversation_id
             WHERE p.user_id = ?1
             ORDER BY c.created_at DESC",
        )?;
        let rows = stmt.query_map(params![user_id], conversation_from_row)?;
        let mut result = Vec::new();
        for row in rows {
            result.push(row?);
        }
        Ok(result)
    }

    /// Conversation list view for one viewer: each conversation they
    /// participate in, with the latest message and their unread count,
    /// ordered by most recent activity.
    pub fn list_conversation_summaries(
        &self,
        user_id: &str,
    ) -> Result<Vec<ConversationSummary>, StorageError> {
        let sql = "
            SELECT
                c.conversation_id,
                c.kind,
                c.name,
                c.created_at,
                (SELECT content FROM messages m
                 WHERE m.conversation_id = c.conversation_id
                 ORDER BY m.created_at DESC, m.seq DESC LIMIT 1) as last_content,
                (SELECT sender_id FROM messages m
                 WHERE m.conversation_id = c.conversation_id
                 ORDER BY m.created_at DESC, m.seq DESC LIMIT 1) as last_sender_id,
                (SELECT created_at FROM messages m
                 WHERE m.conversation_id = c.conversation_id
                 ORDER BY m.created_at DESC, m.seq DESC LIMIT 1) as last_timestamp,
                (SELECT COUNT(*) FROM messages m
                 WHERE m.conversation_id = c.conversation_id
                   AND m.is_read = 0
                   AND m.sender_id <> ?1) as unread_count
            FROM conversations c
            JOIN participants p ON p.conversation_id = c.conversation_id
            WHERE p.user_id = ?1
            ORDER BY COALESCE(
                (SELECT created_at FROM messages m
                 WHERE m.conversation_id = c.conversation_id
                 ORDER BY m.created_at DESC, m.seq DESC LIMIT 1),
                c.created_at) DESC
        ";

        let mut stmt = self.conn.prepare(sql)?;
        let rows = stmt.query_map(params![user_id], |row| {
            Ok(ConversationSummary {
                conversation_id: row.get(0)?,
                kind: row.get(1)?,
                name: row.get(2)?,
                created_at: row.get::<_, i64>(3)? as u64,
                last_content: row.get(4)?,
                last_sender_id: row.get(5)?,
                last_timestamp: row.get::<_, Option<i64>>(6)?.map(|t| t as u64),
                unread_count: row.get::<_, i64>(7)? as u32,
            })
        })?;

        let mut result = Vec::new();
        for row in rows {
            result.push(row?);
        }
        Ok(result)
    }

    // -----------------------------------------------------------------------
    // Participants
    // -----------------------------------------------------------------------

    /// Insert participant links within one transaction. Inserts are
    /// idempotent, so re-running after a partial failure repairs the links
    /// rather than erroring.
    pub fn insert_participants(
        &self,
        conversation_id: &str,
        user_ids: &[String],
        joined_at: u64,
    ) -> Result<(), StorageError> {
        let tx = self.conn.unchecked_transaction()?;
        for user_id in user_ids {
            tx.execute(
                "INSERT OR IGNORE INTO participants (conversation_id, user_id, joined_at)
                 VALUES (?1, ?2, ?3)",
                params![conversation_id, user_id, joined_at as i64],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    pub fn list_participants(
        &self,
        conversation_id: &str,
    ) -> Result<Vec<ParticipantRow>, StorageError> {
        let mut stmt = self.conn.prepare(
            "SELECT conversation_id, user_id, joined_at
             FROM participants WHERE conversation_id = ?1
             ORDER BY joined_at, user_id",
        )?;
        let rows = stmt.query_map(params![conversation_id], |row| {
            Ok(ParticipantRow {
                conversation_id: row.get(0)?,
                user_id: row.get(1)?,
                joined_at: row.get::<_, i64>(2)? as u64,
            })
        })?;
        let mut result = Vec::new();
        for row in rows {
            result.push(row?);
        }
        Ok(result)
    }

    pub fn is_participant(
        &self,
        conversation_id: &str,
        user_id: &str,
    ) -> Result<bool, StorageError> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM participants WHERE conversation_id = ?1 AND user_id = ?2",
            params![conversation_id, user_id],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    // -----------------------------------------------------------------------
    // Messages
    // -----------------------------------------------------------------------

    /// Append a message and return its assigned sequence number.
    pub fn insert_message(
        &self,
        message_id: &str,
        conversation_id: &str,
        sender_id: &str,
        content: &str,
        created_at: u64,
    ) -> Result<i64, StorageError> {
        self.conn.execute(
            "INSERT INTO messages (message_id, conversation_id, sender_id, content, created_at, is_read)
             VALUES (?1, ?2, ?3, ?4, ?5, 0)",
            params![
                message_id,
                conversation_id,
                sender_id,
                content,
                created_at as i64,
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn get_message(&self, message_id: &str) -> Result<Option<MessageRow>, StorageError> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages WHERE message_id = ?1"
        ))?;
        let row = stmt
            .query_row(params![message_id], message_from_row)
            .optional()?;
        Ok(row)
    }

    /// List a page of a conversation's messages in ascending
    /// `(created_at, seq)` order. `before` is the ordering key of the oldest
    /// message already held; passing it fetches the previous page.
    pub fn list_conversation_messages(
        &self,
        conversation_id: &str,
        before: Option<(u64, i64)>,
        limit: u32,
    ) -> Result<Vec<MessageRow>, StorageError> {
        let mut sql = format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages WHERE conversation_id = ?"
        );
        let mut bind_values: Vec<Box<dyn rusqlite::types::ToSql>> =
            vec![Box::new(conversation_id.to_string())];

        if let Some((ts, seq)) = before {
            sql.push_str(" AND (created_at < ? OR (created_at = ? AND seq < ?))");
            bind_values.push(Box::new(ts as i64));
            bind_values.push(Box::new(ts as i64));
            bind_values.push(Box::new(seq));
        }
        sql.push_str(" ORDER BY created_at DESC, seq DESC LIMIT ?");
        bind_values.push(Box::new(limit as i64));

        let mut stmt = self.conn.prepare(&sql)?;
        let bind_refs: Vec<&dyn rusqlite::types::ToSql> =
            bind_values.iter().map(|b| b.as_ref()).collect();
        let rows = stmt.query_map(bind_refs.as_slice(), message_from_row)?;

        let mut result = Vec::new();
        for row in rows {
            result.push(row?);
        }
        // Fetched newest-first for the LIMIT; callers get oldest-first.
        result.reverse();
        Ok(result)
    }

    // -----------------------------------------------------------------------
    // Read state
    // -----------------------------------------------------------------------

    /// Advance the viewer's read boundary: every unread message from other
    /// senders becomes read. Returns the number of rows affected, so a
    /// repeat call with nothing new is a visible no-op.
    pub fn mark_conversation_read(
        &self,
        conversation_id: &str,
        viewer_id: &str,
    ) -> Result<u32, StorageError> {
        let affected = self.conn.execute(
            "UPDATE messages SET is_read = 1
             WHERE conversation_id = ?1 AND sender_id <> ?2 AND is_read = 0",
            params![conversation_id, viewer_id],
        )?;
        Ok(affected as u32)
    }

    pub fn count_unread(
        &self,
        conversation_id: &str,
        viewer_id: &str,
    ) -> Result<u32, StorageError> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM messages
             WHERE conversation_id = ?1 AND sender_id <> ?2 AND is_read = 0",
            params![conversation_id, viewer_id],
            |row| row.get(0),
        )?;
        Ok(count as u32)
    }
}

/// Build the canonical pair key for a direct conversation: both user ids,
/// sorted, joined with `|`. Order-insensitive by construction.
pub fn direct_pair_key(user_a: &str, user_b: &str) -> String {
    if user_a <= user_b {
        format!("{user_a}|{user_b}")
    } else {
        format!("{user_b}|{user_a}")
    }
}

/// Resolve the database path: `{data_dir}/quad.db`.
pub fn db_path(data_dir: &Path) -> PathBuf {
    data_dir.join("quad.db")
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn now_secs() -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_secs()
    }

    fn test_storage() -> Storage {
        Storage::open_in_memory().unwrap()
    }

    fn profile(user_id: &str, name: &str) -> ProfileRow {
        ProfileRow {
            user_id: user_id.to_string(),
            name: name.to_string(),
            avatar_url: None,
            major: None,
            year: None,
            updated_at: now_secs(),
        }
    }

    fn direct_conversation(id: &str, a: &str, b: &str) -> ConversationRow {
        ConversationRow {
            conversation_id: id.to_string(),
            kind: "direct".to_string(),
            name: None,
            pair_key: Some(direct_pair_key(a, b)),
            created_at: now_secs(),
        }
    }

    #[test]
    fn test_schema_creation() {
        let storage = test_storage();
        storage.upsert_profile(&profile("alice", "Alice Chen")).unwrap();
    }

    #[test]
    fn test_profile_crud() {
        let storage = test_storage();
        assert!(storage.get_profile("alice").unwrap().is_none());

        storage.upsert_profile(&profile("alice", "Alice Chen")).unwrap();
        let loaded = storage.get_profile("alice").unwrap().unwrap();
        assert_eq!(loaded.name, "Alice Chen");
        assert!(loaded.avatar_url.is_none());

        // Upsert replaces
        let mut updated = profile("alice", "Alice C.");
        updated.avatar_url = Some("https://cdn.example/a.png".to_string());
        storage.upsert_profile(&updated).unwrap();
        let loaded = storage.get_profile("alice").unwrap().unwrap();
        assert_eq!(loaded.name, "Alice C.");
        assert!(loaded.avatar_url.is_some());
    }

    #[test]
    fn test_search_profiles_excludes_caller() {
        let storage = test_storage();
        storage.upsert_profile(&profile("alice", "Alice Chen")).unwrap();
        storage.upsert_profile(&profile("alina", "Alina Park")).unwrap();
        storage.upsert_profile(&profile("bob", "Bob Diaz")).unwrap();

        let hits = storage.search_profiles("ali", "alice", 10).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].user_id, "alina");

        // Case-insensitive
        let hits = storage.search_profiles("ALI", "bob", 10).unwrap();
        assert_eq!(hits.len(), 2);
    }

    #[test]
    fn test_pair_key_is_order_insensitive() {
        assert_eq!(direct_pair_key("alice", "bob"), direct_pair_key("bob", "alice"));
        assert_eq!(direct_pair_key("alice", "bob"), "alice|bob");
    }

    #[test]
    fn test_conversation_insert_and_lookup() {
        let storage = test_storage();
        let conv = direct_conversation("conv-1", "alice", "bob");
        storage.insert_conversation(&conv).unwrap();
        storage
            .insert_participants("conv-1", &["alice".to_string(), "bob".to_string()], now_secs())
            .unwrap();

        let found = storage.find_direct_conversation("alice", "bob").unwrap().unwrap();
        assert_eq!(found.conversation_id, "conv-1");
        // Argument order must not matter
        let found = storage.find_direct_conversation("bob", "alice").unwrap().unwrap();
        assert_eq!(found.conversation_id, "conv-1");

        let by_pair = storage
            .get_conversation_by_pair(&direct_pair_key("bob", "alice"))
            .unwrap()
            .unwrap();
        assert_eq!(by_pair.conversation_id, "conv-1");
    }

    #[test]
    fn test_duplicate_pair_key_reports_already_exists() {
        let storage = test_storage();
        storage
            .insert_conversation(&direct_conversation("conv-1", "alice", "bob"))
            .unwrap();

        let err = storage
            .insert_conversation(&direct_conversation("conv-2", "bob", "alice"))
            .unwrap_err();
        assert!(matches!(err, StorageError::AlreadyExists(_)));
        // The loser's row must not exist
        assert!(storage.get_conversation("conv-2").unwrap().is_none());
    }

    #[test]
    fn test_participant_insert_is_idempotent() {
        let storage = test_storage();
        storage
            .insert_conversation(&direct_conversation("conv-1", "alice", "bob"))
            .unwrap();
        let members = vec!["alice".to_string(), "bob".to_string()];
        storage.insert_participants("conv-1", &members, 100).unwrap();
        storage.insert_participants("conv-1", &members, 200).unwrap();

        let participants = storage.list_participants("conv-1").unwrap();
        assert_eq!(participants.len(), 2);
        // First write wins; the repeat is ignored
        assert_eq!(participants[0].joined_at, 100);
        assert!(storage.is_participant("conv-1", "alice").unwrap());
        assert!(!storage.is_participant("conv-1", "carol").unwrap());
    }

    #[test]
    fn test_message_ordering_and_pagination() {
        let storage = test_storage();
        storage
            .insert_conversation(&direct_conversation("conv-1", "alice", "bob"))
            .unwrap();

        // Same timestamp: seq must break the tie in insert order
        for i in 0..5 {
            storage
                .insert_message(&format!("m{i}"), "conv-1", "alice", &format!("msg {i}"), 1000)
                .unwrap();
        }
        storage
            .insert_message("m5", "conv-1", "bob", "latest", 2000)
            .unwrap();

        let all = storage.list_conversation_messages("conv-1", None, 50).unwrap();
        assert_eq!(all.len(), 6);
        let ids: Vec<&str> = all.iter().map(|m| m.message_id.as_str()).collect();
        assert_eq!(ids, vec!["m0", "m1", "m2", "m3", "m4", "m5"]);

        // Page of 3 returns the newest three, oldest first
        let page = storage.list_conversation_messages("conv-1", None, 3).unwrap();
        let ids: Vec<&str> = page.iter().map(|m| m.message_id.as_str()).collect();
        assert_eq!(ids, vec!["m3", "m4", "m5"]);

        // Cursor walks back without overlap or gaps
        let oldest = &page[0];
        let prev = storage
            .list_conversation_messages("conv-1", Some((oldest.created_at, oldest.seq)), 3)
            .unwrap();
        let ids: Vec<&str> = prev.iter().map(|m| m.message_id.as_str()).collect();
        assert_eq!(ids, vec!["m0", "m1", "m2"]);
    }

    #[test]
    fn test_mark_read_and_unread_count() {
        let storage = test_storage();
        storage
            .insert_conversation(&direct_conversation("conv-1", "alice", "bob"))
            .unwrap();
        storage.insert_message("m1", "conv-1", "alice", "hi", 1000).unwrap();
        storage.insert_message("m2", "conv-1", "alice", "there", 1001).unwrap();
        storage.insert_message("m3", "conv-1", "bob", "hey", 1002).unwrap();

        assert_eq!(storage.count_unread("conv-1", "bob").unwrap(), 2);
        assert_eq!(storage.count_unread("conv-1", "alice").unwrap(), 1);

        // Bob reads: only alice's messages flip
        assert_eq!(storage.mark_conversation_read("conv-1", "bob").unwrap(), 2);
        assert_eq!(storage.count_unread("conv-1", "bob").unwrap(), 0);
        assert_eq!(storage.count_unread("conv-1", "alice").unwrap(), 1);

        // Idempotent
        assert_eq!(storage.mark_conversation_read("conv-1", "bob").unwrap(), 0);
    }

    #[test]
    fn test_conversation_summaries() {
        let storage = test_storage();
        let now = now_secs();
        storage
            .insert_conversation(&direct_conversation("conv-1", "alice", "bob"))
            .unwrap();
        storage
            .insert_participants("conv-1", &["alice".to_string(), "bob".to_string()], now)
            .unwrap();
        storage
            .insert_conversation(&ConversationRow {
                conversation_id: "conv-2".to_string(),
                kind: "group".to_string(),
                name: Some("Study Group".to_string()),
                pair_key: None,
                created_at: now,
            })
            .unwrap();
        storage
            .insert_participants(
                "conv-2",
                &["alice".to_string(), "bob".to_string(), "carol".to_string()],
                now,
            )
            .unwrap();

        storage.insert_message("m1", "conv-1", "bob", "hello alice", 1000).unwrap();
        storage.insert_message("m2", "conv-2", "carol", "meeting at 6", 2000).unwrap();

        let summaries = storage.list_conversation_summaries("alice").unwrap();
        assert_eq!(summaries.len(), 2);
        // Most recent activity first
        assert_eq!(summaries[0].conversation_id, "conv-2");
        assert_eq!(summaries[0].last_content.as_deref(), Some("meeting at 6"));
        assert_eq!(summaries[0].unread_count, 1);
        assert_eq!(summaries[1].conversation_id, "conv-1");
        assert_eq!(summaries[1].last_sender_id.as_deref(), Some("bob"));
        assert_eq!(summaries[1].unread_count, 1);

        // Carol is not in conv-1
        let summaries = storage.list_conversation_summaries("carol").unwrap();
        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries[0].conversation_id, "conv-2");
        // Carol sent the only message in conv-2, nothing unread for her
        assert_eq!(summaries[0].unread_count, 0);
    }
}
