//! Context assembly: what the provider sees for one reply.
//!
//! Layout is fixed and deterministic:
//!
//! 1. one system message (the support-agent instruction)
//! 2. the most recent prior turns, oldest first, at most `window` of them
//! 3. the new user message
//!
//! A brand-new conversation therefore yields `[system, user]`, and no
//! context ever exceeds `window + 2` entries.

use crate::prompt::SYSTEM_PROMPT;
use spurchat_core::message::{ContextMessage, Message};

/// How many prior messages are replayed by default.
pub const DEFAULT_HISTORY_WINDOW: usize = 10;

/// Builds the provider-facing message list.
#[derive(Debug, Clone)]
pub struct ContextAssembler {
    window: usize,
    system_prompt: String,
}

impl ContextAssembler {
    pub fn new(window: usize, system_prompt: impl Into<String>) -> Self {
        Self {
            window,
            system_prompt: system_prompt.into(),
        }
    }

    pub fn window(&self) -> usize {
        self.window
    }

    pub fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    /// Assemble context from `history` (ascending) and the new user text.
    ///
    /// Only the last `window` entries of `history` are used, even when the
    /// caller hands over more.
    pub fn build(&self, history: &[Message], new_user_text: &str) -> Vec<ContextMessage> {
        let skip = history.len().saturating_sub(self.window);
        let recent = &history[skip..];

        let mut context = Vec::with_capacity(recent.len() + 2);
        context.push(ContextMessage::system(&self.system_prompt));
        context.extend(recent.iter().map(ContextMessage::from));
        context.push(ContextMessage::user(new_user_text));
        context
    }
}

impl Default for ContextAssembler {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_WINDOW, SYSTEM_PROMPT)
    }
}
