//! # SpurChat Core
//!
//! Domain types, traits, and error definitions for the SpurChat support
//! assistant. This crate has **no framework dependencies**: it defines the
//! session model that the store, provider, chat and gateway crates implement
//! against.
//!
//! ## Seams
//!
//! - [`SessionStore`]: persisted conversations and messages
//! - [`Provider`]: the outbound completion call
//!
//! Both are object-safe async traits so implementations can be swapped via
//! configuration and replaced by fakes in tests.

pub mod error;
pub mod message;
pub mod provider;
pub mod store;

// Re-export key types at crate root for ergonomics
pub use error::{Error, ProviderError, Result, StoreError};
pub use message::{ContextMessage, Conversation, ConversationId, Message, Role};
pub use provider::{Provider, ProviderRequest, ProviderResponse, Usage};
pub use store::SessionStore;
