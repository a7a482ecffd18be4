//! SQLite session store.
//!
//! Uses a single SQLite database file with two tables:
//! - `conversations` — one row per chat session
//! - `messages` — the immutable transcript, keyed by conversation
//!
//! Each message carries a per-conversation `seq` assigned inside its INSERT,
//! so history ordering stays total even when timestamps collide.

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use spurchat_core::error::StoreError;
use spurchat_core::message::{Conversation, ConversationId, Message, Role};
use spurchat_core::store::SessionStore;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Row, SqlitePool};
use std::str::FromStr;
use tracing::{debug, info};
use uuid::Uuid;

/// A SQLite-backed session store.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (or create) the database at `path` and run migrations.
    ///
    /// Accepts a plain file path or a `sqlite:` URL. Pass `"sqlite::memory:"`
    /// for an ephemeral database; it is pinned to one connection so every
    /// query sees the same data.
    pub async fn new(path: &str) -> Result<Self, StoreError> {
        let ephemeral = path.contains(":memory:");

        let options = SqliteConnectOptions::from_str(path)
            .map_err(|e| StoreError::Storage(format!("Invalid SQLite path: {e}")))?
            .create_if_missing(true)
            .journal_mode(if ephemeral {
                SqliteJournalMode::Memory
            } else {
                SqliteJournalMode::Wal
            })
            .synchronous(SqliteSynchronous::Normal)
            .pragma("foreign_keys", "ON");

        let mut pool_options = SqlitePoolOptions::new().max_connections(4);
        if ephemeral {
            // Closing the only connection would drop the database.
            pool_options = pool_options
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None);
        }

        let pool = pool_options
            .connect_with(options)
            .await
            .map_err(|e| StoreError::Storage(format!("Failed to open SQLite: {e}")))?;

        let store = Self { pool };
        store.run_migrations().await?;
        info!("SQLite session store initialized at {path}");
        Ok(store)
    }

    /// Run schema migrations. Idempotent.
    async fn run_migrations(&self) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS conversations (
                id          TEXT PRIMARY KEY NOT NULL,
                title       TEXT NOT NULL,
                created_at  TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::MigrationFailed(format!("conversations table: {e}")))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS messages (
                id               TEXT PRIMARY KEY NOT NULL,
                conversation_id  TEXT NOT NULL REFERENCES conversations(id) ON DELETE CASCADE,
                role             TEXT NOT NULL CHECK (role IN ('user', 'assistant')),
                content          TEXT NOT NULL,
                created_at       TEXT NOT NULL,
                seq              INTEGER NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::MigrationFailed(format!("messages table: {e}")))?;

        sqlx::query(
            "CREATE UNIQUE INDEX IF NOT EXISTS idx_messages_conversation_seq ON messages(conversation_id, seq)",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::MigrationFailed(format!("seq index: {e}")))?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_messages_conversation_created ON messages(conversation_id, created_at)",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::MigrationFailed(format!("created_at index: {e}")))?;

        debug!("SQLite migrations complete");
        Ok(())
    }

    /// Parse a `Message` from a SQLite row.
    fn row_to_message(row: &sqlx::sqlite::SqliteRow) -> Result<Message, StoreError> {
        let id: String = row
            .try_get("id")
            .map_err(|e| StoreError::QueryFailed(format!("id column: {e}")))?;
        let conversation_id: String = row
            .try_get("conversation_id")
            .map_err(|e| StoreError::QueryFailed(format!("conversation_id column: {e}")))?;
        let role: String = row
            .try_get("role")
            .map_err(|e| StoreError::QueryFailed(format!("role column: {e}")))?;
        let content: String = row
            .try_get("content")
            .map_err(|e| StoreError::QueryFailed(format!("content column: {e}")))?;
        let created_at: String = row
            .try_get("created_at")
            .map_err(|e| StoreError::QueryFailed(format!("created_at column: {e}")))?;
        let seq: i64 = row
            .try_get("seq")
            .map_err(|e| StoreError::QueryFailed(format!("seq column: {e}")))?;

        Ok(Message {
            id,
            conversation_id: ConversationId(conversation_id),
            role: Role::from_str(&role).map_err(StoreError::QueryFailed)?,
            content,
            created_at: parse_timestamp(&created_at)?,
            seq,
        })
    }
}

/// Fixed-width RFC 3339 so lexical order equals chronological order.
fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StoreError::QueryFailed(format!("bad timestamp '{raw}': {e}")))
}

#[async_trait]
impl SessionStore for SqliteStore {
    fn name(&self) -> &str {
        "sqlite"
    }

    async fn create_conversation(&self, title: &str) -> Result<Conversation, StoreError> {
        let conversation = Conversation::new(title);

        sqlx::query("INSERT INTO conversations (id, title, created_at) VALUES (?1, ?2, ?3)")
            .bind(conversation.id.as_str())
            .bind(&conversation.title)
            .bind(format_timestamp(&conversation.created_at))
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::Storage(format!("Insert conversation failed: {e}")))?;

        debug!(conversation_id = %conversation.id, "Conversation created");
        Ok(conversation)
    }

    async fn conversation_exists(&self, id: &ConversationId) -> Result<bool, StoreError> {
        let row = sqlx::query("SELECT 1 FROM conversations WHERE id = ?1")
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StoreError::QueryFailed(format!("Conversation lookup failed: {e}")))?;
        Ok(row.is_some())
    }

    async fn get_conversation(
        &self,
        id: &ConversationId,
    ) -> Result<Option<Conversation>, StoreError> {
        let row = sqlx::query("SELECT id, title, created_at FROM conversations WHERE id = ?1")
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StoreError::QueryFailed(format!("Get conversation failed: {e}")))?;

        let Some(row) = row else {
            return Ok(None);
        };

        let title: String = row
            .try_get("title")
            .map_err(|e| StoreError::QueryFailed(format!("title column: {e}")))?;
        let created_at: String = row
            .try_get("created_at")
            .map_err(|e| StoreError::QueryFailed(format!("created_at column: {e}")))?;

        Ok(Some(Conversation {
            id: id.clone(),
            title,
            created_at: parse_timestamp(&created_at)?,
        }))
    }

    async fn append_message(
        &self,
        conversation_id: &ConversationId,
        role: Role,
        content: &str,
    ) -> Result<Message, StoreError> {
        if !role.is_persistable() {
            return Err(StoreError::UnsupportedRole(role.to_string()));
        }

        let id = Uuid::new_v4().to_string();
        let created_at = Utc::now();

        // Selecting from conversations makes a missing parent insert zero rows,
        // and the MAX(seq) subquery runs inside the same write.
        let row = sqlx::query(
            r#"
            INSERT INTO messages (id, conversation_id, role, content, created_at, seq)
            SELECT ?1, c.id, ?3, ?4, ?5,
                   COALESCE((SELECT MAX(m.seq) FROM messages m WHERE m.conversation_id = c.id), 0) + 1
            FROM conversations c
            WHERE c.id = ?2
            RETURNING seq
            "#,
        )
        .bind(&id)
        .bind(conversation_id.as_str())
        .bind(role.as_str())
        .bind(content)
        .bind(format_timestamp(&created_at))
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StoreError::Storage(format!("Insert message failed: {e}")))?;

        let Some(row) = row else {
            return Err(StoreError::ConversationNotFound(conversation_id.to_string()));
        };

        let seq: i64 = row
            .try_get("seq")
            .map_err(|e| StoreError::QueryFailed(format!("seq column: {e}")))?;

        Ok(Message {
            id,
            conversation_id: conversation_id.clone(),
            role,
            content: content.to_string(),
            created_at,
            seq,
        })
    }

    async fn list_messages(
        &self,
        conversation_id: &ConversationId,
    ) -> Result<Vec<Message>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT id, conversation_id, role, content, created_at, seq
            FROM messages
            WHERE conversation_id = ?1
            ORDER BY created_at ASC, seq ASC
            "#,
        )
        .bind(conversation_id.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StoreError::QueryFailed(format!("List messages failed: {e}")))?;

        rows.iter().map(Self::row_to_message).collect()
    }

    async fn recent_messages(
        &self,
        conversation_id: &ConversationId,
        limit: usize,
    ) -> Result<Vec<Message>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT id, conversation_id, role, content, created_at, seq FROM (
                SELECT id, conversation_id, role, content, created_at, seq
                FROM messages
                WHERE conversation_id = ?1
                ORDER BY created_at DESC, seq DESC
                LIMIT ?2
            )
            ORDER BY created_at ASC, seq ASC
            "#,
        )
        .bind(conversation_id.as_str())
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StoreError::QueryFailed(format!("Recent messages failed: {e}")))?;

        rows.iter().map(Self::row_to_message).collect()
    }
}
