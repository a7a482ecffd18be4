//! The SpurChat session service.
//!
//! Turns one customer message into a persisted exchange:
//! validate → resolve session → assemble context → persist user turn →
//! generate reply → persist assistant turn.

pub mod context;
pub mod prompt;
pub mod reply;
pub mod session;
pub mod validation;

pub use context::{ContextAssembler, DEFAULT_HISTORY_WINDOW};
pub use reply::{EMPTY_REPLY, FALLBACK_REPLY, ReplyGenerator};
pub use session::{ChatReply, ChatService};
pub use validation::validate_message;
