//! Domain models for the chat history service.

pub mod chat;
pub mod stats;

pub use chat::{
    AppendOutcome, ChatMessage, ChatSession, Metadata, NewMessage, Role, MAX_MESSAGE_TOKENS,
};
pub use stats::ChatStats;
