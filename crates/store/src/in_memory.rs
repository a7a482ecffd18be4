//! In-memory store — useful for testing and ephemeral sessions.

use async_trait::async_trait;
use chrono::Utc;
use spurchat_core::error::StoreError;
use spurchat_core::message::{Conversation, ConversationId, Message, Role};
use spurchat_core::store::SessionStore;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

struct Thread {
    conversation: Conversation,
    messages: Vec<Message>,
}

/// A session store that keeps everything in a HashMap.
/// Nothing survives a restart.
pub struct InMemoryStore {
    threads: Arc<RwLock<HashMap<ConversationId, Thread>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            threads: Arc::new(RwLock::new(HashMap::new())),
        }
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SessionStore for InMemoryStore {
    fn name(&self) -> &str {
        "in_memory"
    }

    async fn create_conversation(&self, title: &str) -> Result<Conversation, StoreError> {
        let conversation = Conversation::new(title);
        self.threads.write().await.insert(
            conversation.id.clone(),
            Thread {
                conversation: conversation.clone(),
                messages: Vec::new(),
            },
        );
        Ok(conversation)
    }

    async fn conversation_exists(&self, id: &ConversationId) -> Result<bool, StoreError> {
        Ok(self.threads.read().await.contains_key(id))
    }

    async fn get_conversation(
        &self,
        id: &ConversationId,
    ) -> Result<Option<Conversation>, StoreError> {
        Ok(self
            .threads
            .read()
            .await
            .get(id)
            .map(|t| t.conversation.clone()))
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

        let mut threads = self.threads.write().await;
        let thread = threads
            .get_mut(conversation_id)
            .ok_or_else(|| StoreError::ConversationNotFound(conversation_id.to_string()))?;

        let message = Message {
            id: Uuid::new_v4().to_string(),
            conversation_id: conversation_id.clone(),
            role,
            content: content.to_string(),
            created_at: Utc::now(),
            seq: thread.messages.len() as i64 + 1,
        };
        thread.messages.push(message.clone());
        Ok(message)
    }

    async fn list_messages(
        &self,
        conversation_id: &ConversationId,
    ) -> Result<Vec<Message>, StoreError> {
        let threads = self.threads.read().await;
        let mut messages = threads
            .get(conversation_id)
            .map(|t| t.messages.clone())
            .unwrap_or_default();
        messages.sort_by(|a, b| (a.created_at, a.seq).cmp(&(b.created_at, b.seq)));
        Ok(messages)
    }

    async fn recent_messages(
        &self,
        conversation_id: &ConversationId,
        limit: usize,
    ) -> Result<Vec<Message>, StoreError> {
        let mut messages = self.list_messages(conversation_id).await?;
        let skip = messages.len().saturating_sub(limit);
        Ok(messages.split_off(skip))
    }
}
