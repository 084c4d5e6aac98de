//! JSON bodies exchanged with the chat history service.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveMessage {
    pub session_id: String,
    pub role: String,
    pub content: String,
    pub ip_address: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tokens: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Map<String, Value>>,
}

impl SaveMessage {
    pub fn new(
        session_id: impl Into<String>,
        role: impl Into<String>,
        content: impl Into<String>,
        ip_address: impl Into<String>,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            role: role.into(),
            content: content.into(),
            ip_address: ip_address.into(),
            tokens: None,
            user_id: None,
            metadata: None,
        }
    }

    pub fn tokens(mut self, tokens: i64) -> Self {
        self.tokens = Some(tokens);
        self
    }

    pub fn user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn metadata(mut self, metadata: Map<String, Value>) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveMessageAck {
    pub success: bool,
    pub message: String,
    pub session_id: String,
    pub ip_address: String,
    pub created: bool,
    pub total_tokens: i64,
    pub message_count: usize,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub role: String,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub tokens: i64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    #[serde(rename = "_id", default)]
    pub id: Option<String>,
    pub session_id: String,
    pub ip_address: String,
    #[serde(default)]
    pub user_id: Option<String>,
    pub messages: Vec<Message>,
    pub total_tokens: i64,
    #[serde(default)]
    pub metadata: Option<Map<String, Value>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Session {
    pub fn stats(&self) -> SessionStats {
        let count = |role: &str| self.messages.iter().filter(|m| m.role == role).count() as u64;
        SessionStats {
            total_messages: self.messages.len() as u64,
            total_tokens: self.total_tokens,
            user_messages: count("user"),
            assistant_messages: count("assistant"),
            session_duration_ms: (self.updated_at - self.created_at).num_milliseconds(),
        }
    }
}

/// Totals for a single session, derived client-side.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionStats {
    pub total_messages: u64,
    pub total_tokens: i64,
    pub user_messages: u64,
    pub assistant_messages: u64,
    /// `updatedAt - createdAt`.
    pub session_duration_ms: i64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Stats {
    pub total_sessions: u64,
    pub total_messages: u64,
    pub total_tokens: i64,
    #[serde(default)]
    pub user_messages: u64,
    #[serde(default)]
    pub assistant_messages: u64,
    pub average_messages_per_session: f64,
    pub first_seen: Option<DateTime<Utc>>,
    pub last_seen: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IpList {
    pub data: Vec<String>,
    pub count: usize,
    pub total: usize,
}

#[derive(Debug, Deserialize)]
pub(crate) struct HealthStatus {
    pub status: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct Envelope<T> {
    pub data: T,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct DeleteAck {
    pub deleted_count: u64,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ErrorBody {
    pub error: String,
}
