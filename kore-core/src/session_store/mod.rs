//! Session Store (C9): SQLite-backed sessions and messages, single writer,
//! with optional AES-GCM-at-rest encryption of message content. Grounded on
//! the pack's `sprklai-mesoclaw` `database/{pool,schema}.rs` for the
//! single-connection + embedded-schema shape; the teacher carries no
//! persistence layer of its own (VT Code sessions are in-memory/JSON).

mod crypto;

pub use crypto::SessionCipher;

use std::path::Path;
use std::sync::Mutex;

use rusqlite::{Connection, OptionalExtension, params};
use serde::{Deserialize, Serialize};

use kore_commons::error::{KoreError, KoreResult};

use crate::data::{AgentMode, Message, Role, Session, SessionStatistics, SessionStatus};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS sessions (
    id          TEXT PRIMARY KEY,
    name        TEXT NOT NULL,
    agent_mode  TEXT NOT NULL,
    status      TEXT NOT NULL,
    created_at  TEXT NOT NULL,
    updated_at  TEXT NOT NULL,
    description TEXT NOT NULL DEFAULT '',
    tags        TEXT NOT NULL DEFAULT '[]',
    statistics  TEXT NOT NULL DEFAULT '{}',
    metadata    TEXT NOT NULL DEFAULT '{}'
);

CREATE TABLE IF NOT EXISTS messages (
    id         TEXT PRIMARY KEY,
    session_id TEXT NOT NULL REFERENCES sessions(id) ON DELETE CASCADE,
    role       TEXT NOT NULL,
    content    TEXT NOT NULL,
    timestamp  TEXT NOT NULL,
    metadata   TEXT NOT NULL DEFAULT '{}'
);

CREATE INDEX IF NOT EXISTS idx_messages_session_id ON messages(session_id);
CREATE INDEX IF NOT EXISTS idx_messages_timestamp ON messages(timestamp);
CREATE INDEX IF NOT EXISTS idx_sessions_created_at ON sessions(created_at);
"#;

/// Side-channel for a message's `tool_calls`/`tool_call_id` and the caller's
/// own `metadata` map, all folded into the single `metadata` JSON column the
/// schema allots per message.
#[derive(Serialize, Deserialize)]
struct StoredMessageMeta {
    #[serde(default)]
    metadata: std::collections::HashMap<String, serde_json::Value>,
    #[serde(default)]
    tool_calls: Option<Vec<crate::data::ToolCall>>,
    #[serde(default)]
    tool_call_id: Option<String>,
}

pub struct SessionStore {
    conn: Mutex<Connection>,
    cipher: Option<SessionCipher>,
}

impl SessionStore {
    pub fn open(path: &Path) -> KoreResult<Self> {
        let conn = Connection::open(path).map_err(|e| KoreError::Storage(e.to_string()))?;
        Self::from_connection(conn)
    }

    pub fn open_in_memory() -> KoreResult<Self> {
        let conn = Connection::open_in_memory().map_err(|e| KoreError::Storage(e.to_string()))?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> KoreResult<Self> {
        conn.pragma_update(None, "foreign_keys", "ON").map_err(|e| KoreError::Storage(e.to_string()))?;
        conn.execute_batch(SCHEMA).map_err(|e| KoreError::Storage(e.to_string()))?;
        Ok(Self { conn: Mutex::new(conn), cipher: None })
    }

    /// Enable AES-GCM-at-rest for message content (key of 16/24/32 bytes).
    pub fn with_encryption(mut self, key: &[u8]) -> KoreResult<Self> {
        self.cipher = Some(SessionCipher::new(key)?);
        Ok(self)
    }

    fn encode(&self, plaintext: &str) -> KoreResult<String> {
        match &self.cipher {
            Some(cipher) => cipher.encrypt_to_base64(plaintext),
            None => Ok(plaintext.to_string()),
        }
    }

    fn decode(&self, stored: &str) -> KoreResult<String> {
        match &self.cipher {
            Some(cipher) => cipher.decrypt_from_base64(stored),
            None => Ok(stored.to_string()),
        }
    }

    pub fn create_session(&self, session: &Session) -> KoreResult<()> {
        {
            let conn = self.conn.lock().unwrap();
            conn.execute(
                "INSERT INTO sessions (id, name, agent_mode, status, created_at, updated_at, description, tags, statistics, metadata)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                params![
                    session.id,
                    session.name,
                    agent_mode_str(session.agent_mode),
                    status_str(session.status),
                    session.created_at.to_rfc3339(),
                    session.updated_at.to_rfc3339(),
                    session.description,
                    json(&session.tags)?,
                    json(&session.statistics)?,
                    json(&session.metadata)?,
                ],
            )
            .map_err(|e| KoreError::Storage(e.to_string()))?;
        }
        if !session.messages.is_empty() {
            self.save_messages(&session.id, &session.messages)?;
        }
        Ok(())
    }

    /// Replaces the session's full message list within one transaction:
    /// delete the old rows, insert the new ones.
    pub fn save_messages(&self, session_id: &str, messages: &[Message]) -> KoreResult<()> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction().map_err(|e| KoreError::Storage(e.to_string()))?;
        tx.execute("DELETE FROM messages WHERE session_id = ?1", params![session_id])
            .map_err(|e| KoreError::Storage(e.to_string()))?;

        for message in messages {
            let content = self.encode(&message.content)?;
            let meta = StoredMessageMeta {
                metadata: message.metadata.clone(),
                tool_calls: message.tool_calls.clone(),
                tool_call_id: message.tool_call_id.clone(),
            };
            tx.execute(
                "INSERT INTO messages (id, session_id, role, content, timestamp, metadata) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    message.id,
                    session_id,
                    role_str(message.role),
                    content,
                    message.timestamp.to_rfc3339(),
                    json(&meta)?,
                ],
            )
            .map_err(|e| KoreError::Storage(e.to_string()))?;
        }
        tx.execute(
            "UPDATE sessions SET updated_at = ?1 WHERE id = ?2",
            params![chrono::Utc::now().to_rfc3339(), session_id],
        )
        .map_err(|e| KoreError::Storage(e.to_string()))?;
        tx.commit().map_err(|e| KoreError::Storage(e.to_string()))
    }

    /// Loads a session and its messages, ordered by timestamp.
    pub fn get_session(&self, id: &str) -> KoreResult<Session> {
        let conn = self.conn.lock().unwrap();
        let raw = conn
            .query_row(
                "SELECT id, name, agent_mode, status, created_at, updated_at, description, tags, statistics, metadata
                 FROM sessions WHERE id = ?1",
                params![id],
                row_to_raw_session,
            )
            .optional()
            .map_err(|e| KoreError::Storage(e.to_string()))?
            .ok_or_else(|| KoreError::not_found("session", id))?;
        let mut session = raw.into_session()?;

        let mut stmt = conn
            .prepare("SELECT id, session_id, role, content, timestamp, metadata FROM messages WHERE session_id = ?1 ORDER BY timestamp ASC")
            .map_err(|e| KoreError::Storage(e.to_string()))?;
        let rows = stmt
            .query_map(params![id], row_to_raw_message)
            .map_err(|e| KoreError::Storage(e.to_string()))?;
        for row in rows {
            let raw = row.map_err(|e| KoreError::Storage(e.to_string()))?;
            let message = self.decode_message(raw.into_message()?)?;
            session.messages.push(message);
        }
        Ok(session)
    }

    fn decode_message(&self, mut message: Message) -> KoreResult<Message> {
        message.content = self.decode(&message.content)?;
        Ok(message)
    }

    pub fn list_sessions(&self, limit: u32, offset: u32) -> KoreResult<Vec<Session>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn
            .prepare(
                "SELECT id, name, agent_mode, status, created_at, updated_at, description, tags, statistics, metadata
                 FROM sessions ORDER BY created_at DESC LIMIT ?1 OFFSET ?2",
            )
            .map_err(|e| KoreError::Storage(e.to_string()))?;
        let rows = stmt
            .query_map(params![limit, offset], row_to_raw_session)
            .map_err(|e| KoreError::Storage(e.to_string()))?;
        let mut sessions = Vec::new();
        for row in rows {
            let raw = row.map_err(|e| KoreError::Storage(e.to_string()))?;
            sessions.push(raw.into_session()?);
        }
        Ok(sessions)
    }

    pub fn update_status(&self, id: &str, status: SessionStatus) -> KoreResult<()> {
        let conn = self.conn.lock().unwrap();
        let changed = conn
            .execute(
                "UPDATE sessions SET status = ?1, updated_at = ?2 WHERE id = ?3",
                params![status_str(status), chrono::Utc::now().to_rfc3339(), id],
            )
            .map_err(|e| KoreError::Storage(e.to_string()))?;
        if changed == 0 {
            return Err(KoreError::not_found("session", id));
        }
        Ok(())
    }

    /// Destroys a session; `messages` cascade-delete via the foreign key.
    pub fn close_session(&self, id: &str) -> KoreResult<()> {
        let conn = self.conn.lock().unwrap();
        let changed = conn.execute("DELETE FROM sessions WHERE id = ?1", params![id]).map_err(|e| KoreError::Storage(e.to_string()))?;
        if changed == 0 {
            return Err(KoreError::not_found("session", id));
        }
        Ok(())
    }
}

fn json<T: Serialize>(value: &T) -> KoreResult<String> {
    serde_json::to_string(value).map_err(|e| KoreError::Storage(e.to_string()))
}

fn agent_mode_str(mode: AgentMode) -> &'static str {
    match mode {
        AgentMode::Standard => "standard",
        AgentMode::Plan => "plan",
        AgentMode::Build => "build",
    }
}

fn parse_agent_mode(s: &str) -> KoreResult<AgentMode> {
    match s {
        "standard" => Ok(AgentMode::Standard),
        "plan" => Ok(AgentMode::Plan),
        "build" => Ok(AgentMode::Build),
        other => Err(KoreError::Storage(format!("unknown agent_mode `{other}`"))),
    }
}

fn status_str(status: SessionStatus) -> &'static str {
    match status {
        SessionStatus::Active => "active",
        SessionStatus::Paused => "paused",
        SessionStatus::Closed => "closed",
    }
}

fn parse_status(s: &str) -> KoreResult<SessionStatus> {
    match s {
        "active" => Ok(SessionStatus::Active),
        "paused" => Ok(SessionStatus::Paused),
        "closed" => Ok(SessionStatus::Closed),
        other => Err(KoreError::Storage(format!("unknown status `{other}`"))),
    }
}

fn role_str(role: Role) -> &'static str {
    match role {
        Role::System => "system",
        Role::User => "user",
        Role::Assistant => "assistant",
        Role::Tool => "tool",
    }
}

fn parse_role(s: &str) -> KoreResult<Role> {
    match s {
        "system" => Ok(Role::System),
        "user" => Ok(Role::User),
        "assistant" => Ok(Role::Assistant),
        "tool" => Ok(Role::Tool),
        other => Err(KoreError::Storage(format!("unknown role `{other}`"))),
    }
}

fn parse_timestamp(s: &str) -> KoreResult<chrono::DateTime<chrono::Utc>> {
    chrono::DateTime::parse_from_rfc3339(s).map(|dt| dt.with_timezone(&chrono::Utc)).map_err(|e| KoreError::Storage(e.to_string()))
}

/// A message row as plain columns; `rusqlite::Row::get` is the only
/// fallible step here, so the `Try` conversion stays single-layered. Domain
/// parsing (role, timestamp, metadata JSON) happens in `into_message`.
struct RawMessageRow {
    id: String,
    session_id: String,
    role: String,
    content: String,
    timestamp: String,
    meta: String,
}

impl RawMessageRow {
    fn into_message(self) -> KoreResult<Message> {
        let meta: StoredMessageMeta = serde_json::from_str(&self.meta).map_err(|e| KoreError::Storage(e.to_string()))?;
        Ok(Message {
            id: self.id,
            session_id: self.session_id,
            role: parse_role(&self.role)?,
            content: self.content,
            tool_calls: meta.tool_calls,
            tool_call_id: meta.tool_call_id,
            timestamp: parse_timestamp(&self.timestamp)?,
            metadata: meta.metadata,
        })
    }
}

fn row_to_raw_message(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawMessageRow> {
    Ok(RawMessageRow {
        id: row.get(0)?,
        session_id: row.get(1)?,
        role: row.get(2)?,
        content: row.get(3)?,
        timestamp: row.get(4)?,
        meta: row.get(5)?,
    })
}

/// A session row as plain columns (see `RawMessageRow`); `messages` is
/// populated separately by the caller.
struct RawSessionRow {
    id: String,
    name: String,
    agent_mode: String,
    status: String,
    created_at: String,
    updated_at: String,
    description: String,
    tags: String,
    statistics: String,
    metadata: String,
}

impl RawSessionRow {
    fn into_session(self) -> KoreResult<Session> {
        Ok(Session {
            id: self.id,
            name: self.name,
            agent_mode: parse_agent_mode(&self.agent_mode)?,
            status: parse_status(&self.status)?,
            created_at: parse_timestamp(&self.created_at)?,
            updated_at: parse_timestamp(&self.updated_at)?,
            description: self.description,
            tags: serde_json::from_str(&self.tags).map_err(|e| KoreError::Storage(e.to_string()))?,
            statistics: serde_json::from_str::<SessionStatistics>(&self.statistics).map_err(|e| KoreError::Storage(e.to_string()))?,
            metadata: serde_json::from_str(&self.metadata).map_err(|e| KoreError::Storage(e.to_string()))?,
            messages: Vec::new(),
        })
    }
}

fn row_to_raw_session(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawSessionRow> {
    Ok(RawSessionRow {
        id: row.get(0)?,
        name: row.get(1)?,
        agent_mode: row.get(2)?,
        status: row.get(3)?,
        created_at: row.get(4)?,
        updated_at: row.get(5)?,
        description: row.get(6)?,
        tags: row.get(7)?,
        statistics: row.get(8)?,
        metadata: row.get(9)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::AgentMode;

    fn sample_session() -> Session {
        let mut session = Session::new("demo", AgentMode::Standard);
        session.append(Message::new(&session.id, Role::User, "hello"));
        session.append(Message::new(&session.id, Role::Assistant, "hi there"));
        session
    }

    #[test]
    fn save_then_load_round_trips_session_and_messages() {
        let store = SessionStore::open_in_memory().unwrap();
        let session = sample_session();
        store.create_session(&session).unwrap();

        let loaded = store.get_session(&session.id).unwrap();
        assert_eq!(loaded.id, session.id);
        assert_eq!(loaded.name, session.name);
        assert_eq!(loaded.agent_mode, session.agent_mode);
        assert_eq!(loaded.status, session.status);
        assert_eq!(loaded.messages.len(), 2);
        assert_eq!(loaded.messages[0].content, "hello");
        assert_eq!(loaded.messages[1].content, "hi there");
    }

    #[test]
    fn save_messages_replaces_prior_rows_within_one_transaction() {
        let store = SessionStore::open_in_memory().unwrap();
        let session = sample_session();
        store.create_session(&session).unwrap();

        let replacement = vec![Message::new(&session.id, Role::User, "only this one now")];
        store.save_messages(&session.id, &replacement).unwrap();

        let loaded = store.get_session(&session.id).unwrap();
        assert_eq!(loaded.messages.len(), 1);
        assert_eq!(loaded.messages[0].content, "only this one now");
    }

    #[test]
    fn encrypted_store_round_trips_message_content() {
        let store = SessionStore::open_in_memory().unwrap().with_encryption(&[0u8; 32]).unwrap();
        let session = sample_session();
        store.create_session(&session).unwrap();

        let loaded = store.get_session(&session.id).unwrap();
        assert_eq!(loaded.messages[0].content, "hello");
    }

    #[test]
    fn close_session_cascades_message_delete() {
        let store = SessionStore::open_in_memory().unwrap();
        let session = sample_session();
        store.create_session(&session).unwrap();

        store.close_session(&session.id).unwrap();
        assert!(store.get_session(&session.id).is_err());
    }

    #[test]
    fn list_sessions_orders_newest_first_and_respects_limit() {
        let store = SessionStore::open_in_memory().unwrap();
        for name in ["a", "b", "c"] {
            let session = Session::new(name, AgentMode::Standard);
            store.create_session(&session).unwrap();
            std::thread::sleep(std::time::Duration::from_millis(2));
        }
        let page = store.list_sessions(2, 0).unwrap();
        assert_eq!(page.len(), 2);
        assert_eq!(page[0].name, "c");
    }
}
