//! SessionStore trait — persisted conversations and their messages.
//!
//! Two collections: conversations and messages. Every write is a single row;
//! there are no cross-row transactions. Messages within a conversation are
//! returned ascending by `(created_at, seq)`.

use async_trait::async_trait;
use crate::error::StoreError;
use crate::message::{Conversation, ConversationId, Message, Role};

/// The core SessionStore trait.
///
/// Implementations: SQLite, in-memory (for testing and ephemeral runs).
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// The backend name (e.g., "sqlite", "in_memory").
    fn name(&self) -> &str;

    /// Create a new conversation with a fresh ID.
    async fn create_conversation(&self, title: &str) -> std::result::Result<Conversation, StoreError>;

    /// Whether a conversation with this ID exists.
    async fn conversation_exists(&self, id: &ConversationId) -> std::result::Result<bool, StoreError>;

    /// Fetch a conversation by ID.
    async fn get_conversation(
        &self,
        id: &ConversationId,
    ) -> std::result::Result<Option<Conversation>, StoreError>;

    /// Append a message to an existing conversation.
    ///
    /// Fails with `ConversationNotFound` when the conversation does not exist
    /// and with `UnsupportedRole` for `Role::System`.
    async fn append_message(
        &self,
        conversation_id: &ConversationId,
        role: Role,
        content: &str,
    ) -> std::result::Result<Message, StoreError>;

    /// All messages of a conversation, oldest first. Unknown IDs yield an empty list.
    async fn list_messages(
        &self,
        conversation_id: &ConversationId,
    ) -> std::result::Result<Vec<Message>, StoreError>;

    /// The `limit` most recent messages, returned oldest first.
    async fn recent_messages(
        &self,
        conversation_id: &ConversationId,
        limit: usize,
    ) -> std::result::Result<Vec<Message>, StoreError>;
}
