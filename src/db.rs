//! Database module for the math tutor
//!
//! Provides persistence for conversations and messages.

mod schema;

pub use schema::*;

use crate::graph::GraphReference;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Conversation not found: {0}")]
    ConversationNotFound(String),
    #[error("Database lock poisoned")]
    Poisoned,
}

pub type DbResult<T> = Result<T, DbError>;

/// Thread-safe database handle
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Open or create database at the given path
    pub fn open<P: AsRef<Path>>(path: P) -> DbResult<Self> {
        let conn = Connection::open(path)?;
        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.run_migrations()?;
        Ok(db)
    }

    /// Open an in-memory database (for testing)
    #[cfg(test)]
    pub fn open_in_memory() -> DbResult<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.run_migrations()?;
        Ok(db)
    }

    fn run_migrations(&self) -> DbResult<()> {
        self.lock()?.execute_batch(SCHEMA)?;
        Ok(())
    }

    fn lock(&self) -> DbResult<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| DbError::Poisoned)
    }

    // ==================== Conversation Operations ====================

    /// Create a new conversation
    pub fn create_conversation(&self, id: &str, owner_id: &str, title: &str) -> DbResult<Conversation> {
        let conn = self.lock()?;
        let now = Utc::now();

        conn.execute(
            "INSERT INTO conversations (id, owner_id, title, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?4)",
            params![id, owner_id, title, format_datetime(now)],
        )?;

        Ok(Conversation {
            id: id.to_string(),
            owner_id: owner_id.to_string(),
            title: title.to_string(),
            created_at: now,
            updated_at: now,
        })
    }

    /// Get a conversation owned by `owner_id`.
    ///
    /// Someone else's conversation reads as not found.
    pub fn get_conversation(&self, id: &str, owner_id: &str) -> DbResult<Conversation> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT id, owner_id, title, created_at, updated_at
             FROM conversations WHERE id = ?1 AND owner_id = ?2",
        )?;

        stmt.query_row(params![id, owner_id], |row| {
            Ok(Conversation {
                id: row.get(0)?,
                owner_id: row.get(1)?,
                title: row.get(2)?,
                created_at: parse_datetime(&row.get::<_, String>(3)?),
                updated_at: parse_datetime(&row.get::<_, String>(4)?),
            })
        })
        .map_err(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => DbError::ConversationNotFound(id.to_string()),
            other => DbError::Sqlite(other),
        })
    }

    /// List an owner's conversations, most recently active first
    pub fn list_conversations(&self, owner_id: &str) -> DbResult<Vec<ConversationSummary>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT c.id, c.title, c.updated_at,
                    (SELECT COUNT(*) FROM messages m WHERE m.conversation_id = c.id) as message_count
             FROM conversations c
             WHERE c.owner_id = ?1
             ORDER BY c.updated_at DESC",
        )?;

        let rows = stmt.query_map(params![owner_id], |row| {
            Ok(ConversationSummary {
                id: row.get(0)?,
                title: row.get(1)?,
                updated_at: parse_datetime(&row.get::<_, String>(2)?),
                message_count: row.get(3)?,
            })
        })?;

        rows.collect::<Result<Vec<_>, _>>().map_err(DbError::from)
    }

    /// Delete a conversation and its messages
    pub fn delete_conversation(&self, id: &str, owner_id: &str) -> DbResult<()> {
        let conn = self.lock()?;
        let deleted = conn.execute(
            "DELETE FROM conversations WHERE id = ?1 AND owner_id = ?2",
            params![id, owner_id],
        )?;
        if deleted == 0 {
            return Err(DbError::ConversationNotFound(id.to_string()));
        }
        Ok(())
    }

    // ==================== Message Operations ====================

    /// Append a message to a conversation and bump its `updated_at`
    pub fn add_message(
        &self,
        message_id: &str,
        conversation_id: &str,
        role: Role,
        content: &str,
        graph: Option<&GraphReference>,
        dialogue_state: DialogueState,
    ) -> DbResult<Message> {
        let conn = self.lock()?;
        let now = Utc::now();

        // Get next sequence ID
        let sequence_id: i64 = conn.query_row(
            "SELECT COALESCE(MAX(sequence_id), 0) + 1 FROM messages WHERE conversation_id = ?1",
            params![conversation_id],
            |row| row.get(0),
        )?;

        let graph_path = graph.map(|g| g.as_str().to_string());
        let state_json = serde_json::to_string(&dialogue_state).unwrap_or_default();

        conn.execute(
            "INSERT INTO messages (message_id, conversation_id, sequence_id, role, content, has_graph, graph_path, dialogue_state, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                message_id,
                conversation_id,
                sequence_id,
                role.as_str(),
                content,
                graph_path.is_some(),
                graph_path,
                state_json,
                format_datetime(now),
            ],
        )?;

        conn.execute(
            "UPDATE conversations SET updated_at = ?1 WHERE id = ?2",
            params![format_datetime(now), conversation_id],
        )?;

        Ok(Message {
            message_id: message_id.to_string(),
            conversation_id: conversation_id.to_string(),
            sequence_id,
            role,
            content: content.to_string(),
            has_graph: graph_path.is_some(),
            graph_path,
            dialogue_state,
            created_at: now,
        })
    }

    /// Get messages for a conversation in order
    pub fn get_messages(&self, conversation_id: &str) -> DbResult<Vec<Message>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT message_id, conversation_id, sequence_id, role, content, has_graph, graph_path, dialogue_state, created_at
             FROM messages WHERE conversation_id = ?1 ORDER BY sequence_id ASC",
        )?;

        let rows = stmt.query_map(params![conversation_id], parse_message_row)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(DbError::from)
    }
}

/// Parse a message row from the database
fn parse_message_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Message> {
    let state_json: String = row.get(7)?;
    Ok(Message {
        message_id: row.get(0)?,
        conversation_id: row.get(1)?,
        sequence_id: row.get(2)?,
        role: Role::parse(&row.get::<_, String>(3)?),
        content: row.get(4)?,
        has_graph: row.get(5)?,
        graph_path: row.get(6)?,
        dialogue_state: serde_json::from_str(&state_json).unwrap_or_default(),
        created_at: parse_datetime(&row.get::<_, String>(8)?),
    })
}

/// Fixed-width timestamps so `ORDER BY updated_at` sorts chronologically
fn format_datetime(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_datetime(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s).map_or_else(|_| Utc::now(), |dt| dt.with_timezone(&Utc))
}
