//! chat-client: browser-style session/IP helpers and a typed HTTP client
//! for the chat history service.

pub mod client;
pub mod error;
pub mod ip;
pub mod session;
pub mod wire;

pub use client::ChatHistoryClient;
pub use error::{ClientError, Result};
pub use ip::{mock_ip_address, HttpIpResolver, IpResolver, StaticIpResolver};
pub use session::{FileStorage, MemoryStorage, SessionManager, SessionStorage};
pub use wire::{IpList, Message, SaveMessage, SaveMessageAck, Session, SessionStats, Stats};
