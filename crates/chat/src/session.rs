//! ChatService — one customer message in, one persisted exchange out.

use crate::context::ContextAssembler;
use crate::prompt::SYSTEM_PROMPT;
use crate::reply::ReplyGenerator;
use crate::validation::validate_message;
use spurchat_config::AppConfig;
use spurchat_core::error::Result;
use spurchat_core::message::{ContextMessage, ConversationId, Message, Role};
use spurchat_core::provider::Provider;
use spurchat_core::store::SessionStore;
use std::sync::Arc;
use tracing::{debug, info};

/// Outcome of `ChatService::send_message`.
#[derive(Debug, Clone)]
pub struct ChatReply {
    /// The assistant's reply (possibly the fallback text)
    pub reply: String,

    /// The session the exchange was stored under
    pub session_id: ConversationId,

    /// True when a new conversation was created for this message,
    /// including when the supplied id was unknown.
    pub new_session: bool,
}

/// The chat session service.
pub struct ChatService {
    store: Arc<dyn SessionStore>,
    assembler: ContextAssembler,
    generator: ReplyGenerator,
    max_message_chars: usize,
    conversation_title: String,
}

impl ChatService {
    pub fn new(
        store: Arc<dyn SessionStore>,
        assembler: ContextAssembler,
        generator: ReplyGenerator,
    ) -> Self {
        Self {
            store,
            assembler,
            generator,
            max_message_chars: 2000,
            conversation_title: "New Chat".into(),
        }
    }

    /// Wire a service from the application config.
    pub fn from_config(
        config: &AppConfig,
        store: Arc<dyn SessionStore>,
        provider: Arc<dyn Provider>,
    ) -> Self {
        let system_prompt = config
            .chat
            .system_prompt_override
            .clone()
            .unwrap_or_else(|| SYSTEM_PROMPT.to_string());

        let generator = ReplyGenerator::new(provider, &config.default_model)
            .with_temperature(config.default_temperature)
            .with_max_tokens(config.default_max_tokens);

        Self::new(
            store,
            ContextAssembler::new(config.chat.history_window, system_prompt),
            generator,
        )
        .with_max_message_chars(config.chat.max_message_chars)
        .with_conversation_title(&config.chat.conversation_title)
    }

    pub fn with_max_message_chars(mut self, max: usize) -> Self {
        self.max_message_chars = max;
        self
    }

    pub fn with_conversation_title(mut self, title: impl Into<String>) -> Self {
        self.conversation_title = title.into();
        self
    }

    /// Handle one customer message.
    ///
    /// Validation failures return `Error::Validation` and persist nothing.
    /// Provider failures never surface here; the fallback reply is stored
    /// and returned like any other.
    pub async fn send_message(&self, message: &str, session_id: Option<&str>) -> Result<ChatReply> {
        validate_message(message, self.max_message_chars)?;

        let (conversation_id, new_session) = self.resolve_session(session_id).await?;

        // Context comes from prior turns only, so the new message appears once.
        let context = self.build_context(&conversation_id, message).await?;

        self.store
            .append_message(&conversation_id, Role::User, message)
            .await?;

        let reply = self.generator.generate(&context).await;

        self.store
            .append_message(&conversation_id, Role::Assistant, &reply)
            .await?;

        debug!(
            session = %conversation_id,
            context_len = context.len(),
            "Exchange persisted"
        );

        Ok(ChatReply {
            reply,
            session_id: conversation_id,
            new_session,
        })
    }

    /// Full transcript of a session, oldest first. Unknown ids yield nothing.
    pub async fn get_history(&self, session_id: &ConversationId) -> Result<Vec<Message>> {
        Ok(self.store.list_messages(session_id).await?)
    }

    /// Reuse an existing conversation or start a new one.
    ///
    /// A blank id counts as absent. An id the store does not know is
    /// replaced by a fresh conversation rather than rejected.
    pub async fn resolve_session(&self, session_id: Option<&str>) -> Result<(ConversationId, bool)> {
        let requested = session_id.map(str::trim).filter(|s| !s.is_empty());

        if let Some(raw) = requested {
            let id = ConversationId::from(raw);
            if self.store.conversation_exists(&id).await? {
                return Ok((id, false));
            }
            info!(requested = %raw, "Unknown session id, starting a new conversation");
        }

        let conversation = self
            .store
            .create_conversation(&self.conversation_title)
            .await?;
        info!(session = %conversation.id, "Conversation created");
        Ok((conversation.id, true))
    }

    /// Assemble the provider context for `new_user_text` from stored history.
    pub async fn build_context(
        &self,
        conversation_id: &ConversationId,
        new_user_text: &str,
    ) -> Result<Vec<ContextMessage>> {
        let history = self
            .store
            .recent_messages(conversation_id, self.assembler.window())
            .await?;
        Ok(self.assembler.build(&history, new_user_text))
    }
}
