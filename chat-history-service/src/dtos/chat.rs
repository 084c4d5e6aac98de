use crate::models::{
    ChatMessage, ChatSession, ChatStats, Metadata, NewMessage, Role, MAX_MESSAGE_TOKENS,
};
use crate::services::repository::clamp_limit;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use service_core::error::AppError;

const MISSING_FIELDS: &str = "Missing required fields: sessionId, role, content, ipAddress";

/// Body of `POST /api/chat/message`.
///
/// Everything is optional at the wire level so a missing field produces the
/// documented 400 message instead of a serde rejection.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveMessageRequest {
    pub session_id: Option<String>,
    pub role: Option<String>,
    pub content: Option<String>,
    pub ip_address: Option<String>,
    pub tokens: Option<Value>,
    pub user_id: Option<String>,
    pub metadata: Option<Metadata>,
}

impl TryFrom<SaveMessageRequest> for NewMessage {
    type Error = AppError;

    fn try_from(req: SaveMessageRequest) -> Result<Self, Self::Error> {
        let (Some(session_id), Some(role), Some(content), Some(ip_address)) = (
            present(req.session_id),
            present(req.role),
            present(req.content),
            present(req.ip_address),
        ) else {
            return Err(AppError::validation(MISSING_FIELDS));
        };

        let role: Role = role.parse().map_err(AppError::ValidationError)?;

        Ok(NewMessage::new(session_id, role, content, ip_address)
            .with_tokens(parse_tokens(req.tokens.as_ref())?)
            .with_user_id(req.user_id)
            .with_metadata(req.metadata))
    }
}

fn present(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// Lenient token count: absent, null and non-numeric values count as zero,
/// fractions truncate toward zero. Numbers outside `0..=MAX_MESSAGE_TOKENS`
/// are rejected rather than clamped.
pub fn parse_tokens(value: Option<&Value>) -> Result<i64, AppError> {
    let raw = match value {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    let Some(raw) = raw.filter(|f| !f.is_nan()) else {
        return Ok(0);
    };

    let tokens = raw.trunc();
    if !(0.0..=MAX_MESSAGE_TOKENS as f64).contains(&tokens) {
        return Err(AppError::validation(format!(
            "tokens must be between 0 and {}",
            MAX_MESSAGE_TOKENS
        )));
    }
    Ok(tokens as i64)
}

/// Missing or unparsable limits fall back to `default`.
pub fn parse_limit(raw: Option<&str>, default: i64) -> i64 {
    let parsed = raw
        .and_then(|r| r.trim().parse::<i64>().ok())
        .unwrap_or(default);
    clamp_limit(parsed, default)
}

#[derive(Debug, Default, Deserialize)]
pub struct LimitParams {
    pub limit: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchParams {
    pub query: Option<String>,
    pub ip_address: Option<String>,
    pub limit: Option<String>,
}

fn iso(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessageResponse {
    pub role: Role,
    pub content: String,
    pub timestamp: String,
    pub tokens: i64,
}

impl From<ChatMessage> for ChatMessageResponse {
    fn from(message: ChatMessage) -> Self {
        Self {
            role: message.role,
            content: message.content,
            timestamp: iso(message.timestamp),
            tokens: message.tokens,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatSessionResponse {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub session_id: String,
    pub ip_address: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    pub messages: Vec<ChatMessageResponse>,
    pub total_tokens: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Metadata>,
    pub created_at: String,
    pub updated_at: String,
}

impl From<ChatSession> for ChatSessionResponse {
    fn from(session: ChatSession) -> Self {
        Self {
            id: session.id.map(|id| id.to_hex()),
            session_id: session.session_id,
            ip_address: session.ip_address,
            user_id: session.user_id,
            messages: session.messages.into_iter().map(Into::into).collect(),
            total_tokens: session.total_tokens,
            metadata: session.metadata,
            created_at: iso(session.created_at),
            updated_at: iso(session.updated_at),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveMessageResponse {
    pub success: bool,
    pub message: &'static str,
    pub session_id: String,
    pub ip_address: String,
    pub created: bool,
    pub total_tokens: i64,
    pub message_count: usize,
}

impl SaveMessageResponse {
    pub fn new(session: &ChatSession, created: bool) -> Self {
        Self {
            success: true,
            message: if created {
                "New chat session created"
            } else {
                "Message added to existing chat session"
            },
            session_id: session.session_id.clone(),
            ip_address: session.ip_address.clone(),
            created,
            total_tokens: session.total_tokens,
            message_count: session.message_count(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct SessionResponse {
    pub success: bool,
    pub data: ChatSessionResponse,
}

#[derive(Debug, Serialize)]
pub struct SessionListResponse {
    pub success: bool,
    pub data: Vec<ChatSessionResponse>,
    pub count: usize,
}

impl From<Vec<ChatSession>> for SessionListResponse {
    fn from(sessions: Vec<ChatSession>) -> Self {
        let data: Vec<ChatSessionResponse> = sessions.into_iter().map(Into::into).collect();
        Self {
            success: true,
            count: data.len(),
            data,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct SearchResponse {
    pub success: bool,
    pub data: Vec<ChatSessionResponse>,
    pub count: usize,
    pub query: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatStatsResponse {
    pub total_sessions: u64,
    pub total_messages: u64,
    pub total_tokens: i64,
    pub user_messages: u64,
    pub assistant_messages: u64,
    pub average_messages_per_session: f64,
    pub first_seen: Option<String>,
    pub last_seen: Option<String>,
}

impl From<ChatStats> for ChatStatsResponse {
    fn from(stats: ChatStats) -> Self {
        Self {
            total_sessions: stats.total_sessions,
            total_messages: stats.total_messages,
            total_tokens: stats.total_tokens,
            user_messages: stats.user_messages,
            assistant_messages: stats.assistant_messages,
            average_messages_per_session: stats.average_messages_per_session,
            first_seen: stats.first_seen.map(iso),
            last_seen: stats.last_seen.map(iso),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub success: bool,
    pub data: ChatStatsResponse,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteResponse {
    pub success: bool,
    pub message: String,
    pub deleted_count: u64,
}

#[derive(Debug, Serialize)]
pub struct IpListResponse {
    pub success: bool,
    pub data: Vec<String>,
    pub count: usize,
    pub total: usize,
}
