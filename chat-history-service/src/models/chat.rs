//! Chat session documents as stored in the `Chat` collection.

use chrono::{DateTime, Utc};
use mongodb::bson::oid::ObjectId;
use mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime;
use serde::{Deserialize, Serialize};
use service_core::error::AppError;
use validator::{Validate, ValidationError};

/// Largest token count a single message may carry.
pub const MAX_MESSAGE_TOKENS: i64 = i32::MAX as i64;

/// Free-form client details (user agent, device, location, ...).
pub type Metadata = serde_json::Map<String, serde_json::Value>;

/// Who wrote a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "user" => Ok(Role::User),
            "assistant" => Ok(Role::Assistant),
            other => Err(format!(
                "Invalid role '{}': expected 'user' or 'assistant'",
                other
            )),
        }
    }
}

/// A single message embedded in a session. Never addressed on its own.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub tokens: i64,
}

/// One stored conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatSession {
    #[serde(rename = "_id", default, skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub session_id: String,
    /// Address of the most recent writer.
    pub ip_address: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default)]
    pub messages: Vec<ChatMessage>,
    /// Always equal to the sum of `messages[].tokens`.
    #[serde(default)]
    pub total_tokens: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Metadata>,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub updated_at: DateTime<Utc>,
}

impl ChatSession {
    /// A fresh session holding only `message`.
    pub fn start(message: &NewMessage, at: DateTime<Utc>) -> Self {
        let mut session = Self {
            id: Some(ObjectId::new()),
            session_id: message.session_id.clone(),
            ip_address: message.ip_address.clone(),
            user_id: None,
            messages: Vec::new(),
            total_tokens: 0,
            metadata: None,
            created_at: at,
            updated_at: at,
        };
        session.apply(message, at, message.tokens);
        session
    }

    /// Apply the same mutation the store performs atomically: push the
    /// message, bump the counter, merge metadata, move `updatedAt`.
    ///
    /// A counter overflow is rejected before anything changes.
    pub fn append(&mut self, message: &NewMessage, at: DateTime<Utc>) -> Result<(), AppError> {
        let total_tokens = self
            .total_tokens
            .checked_add(message.tokens)
            .ok_or_else(|| AppError::validation("totalTokens would overflow for this session"))?;
        self.apply(message, at, total_tokens);
        Ok(())
    }

    fn apply(&mut self, message: &NewMessage, at: DateTime<Utc>, total_tokens: i64) {
        self.messages.push(message.to_message(at));
        self.total_tokens = total_tokens;
        self.ip_address = message.ip_address.clone();
        if let Some(user_id) = &message.user_id {
            self.user_id = Some(user_id.clone());
        }
        if let Some(incoming) = &message.metadata {
            let merged = self.metadata.get_or_insert_with(Metadata::new);
            for (key, value) in incoming {
                merged.insert(key.clone(), value.clone());
            }
        }
        self.updated_at = at;
    }

    pub fn message_count(&self) -> usize {
        self.messages.len()
    }

    pub fn count_role(&self, role: Role) -> usize {
        self.messages.iter().filter(|m| m.role == role).count()
    }

    /// Case-insensitive literal match against any message body.
    pub fn mentions(&self, needle_lower: &str) -> bool {
        self.messages
            .iter()
            .any(|m| m.content.to_lowercase().contains(needle_lower))
    }
}

/// A validated request to append one message.
#[derive(Debug, Clone, Validate)]
#[validate(schema(function = "validate_metadata_keys"))]
pub struct NewMessage {
    #[validate(custom(function = "not_blank"))]
    pub session_id: String,
    pub role: Role,
    #[validate(custom(function = "not_blank"))]
    pub content: String,
    #[validate(custom(function = "not_blank"))]
    pub ip_address: String,
    #[validate(range(
        min = 0,
        max = 2147483647,
        message = "tokens must be between 0 and 2147483647"
    ))]
    pub tokens: i64,
    pub user_id: Option<String>,
    pub metadata: Option<Metadata>,
}

impl NewMessage {
    pub fn new(
        session_id: impl Into<String>,
        role: Role,
        content: impl Into<String>,
        ip_address: impl Into<String>,
    ) -> Self {
        Self {
            session_id: session_id.into().trim().to_string(),
            role,
            content: content.into(),
            ip_address: ip_address.into().trim().to_string(),
            tokens: 0,
            user_id: None,
            metadata: None,
        }
    }

    pub fn with_tokens(mut self, tokens: i64) -> Self {
        self.tokens = tokens;
        self
    }

    pub fn with_user_id(mut self, user_id: Option<String>) -> Self {
        self.user_id = user_id
            .map(|u| u.trim().to_string())
            .filter(|u| !u.is_empty());
        self
    }

    pub fn with_metadata(mut self, metadata: Option<Metadata>) -> Self {
        self.metadata = metadata.filter(|m| !m.is_empty());
        self
    }

    pub fn to_message(&self, at: DateTime<Utc>) -> ChatMessage {
        ChatMessage {
            role: self.role,
            content: self.content.clone(),
            timestamp: at,
            tokens: self.tokens,
        }
    }
}

fn not_blank(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        let mut err = ValidationError::new("blank");
        err.message = Some("must not be empty".into());
        return Err(err);
    }
    Ok(())
}

/// Keys become `metadata.<key>` update paths, so operators and dots are out.
fn validate_metadata_keys(message: &NewMessage) -> Result<(), ValidationError> {
    let Some(metadata) = &message.metadata else {
        return Ok(());
    };
    for key in metadata.keys() {
        if key.is_empty() || key.starts_with('$') || key.contains('.') {
            let mut err = ValidationError::new("metadata_key");
            err.message = Some(
                format!(
                    "metadata key '{}' is invalid: keys must be non-empty and contain no '$' prefix or '.'",
                    key
                )
                .into(),
            );
            return Err(err);
        }
    }
    Ok(())
}

/// Result of an append.
#[derive(Debug, Clone)]
pub struct AppendOutcome {
    pub session: ChatSession,
    pub created: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn message(content: &str, tokens: i64) -> NewMessage {
        NewMessage::new("session_a", Role::User, content, "10.0.0.1").with_tokens(tokens)
    }

    #[test]
    fn role_parses_known_values_only() {
        assert_eq!("user".parse::<Role>(), Ok(Role::User));
        assert_eq!(" Assistant ".parse::<Role>(), Ok(Role::Assistant));
        assert!("system".parse::<Role>().is_err());
    }

    #[test]
    fn append_keeps_counter_in_step_with_messages() {
        let now = Utc::now();
        let mut session = ChatSession::start(&message("hi", 3), now);
        session.append(&message("again", 4), now).unwrap();
        session.append(&message("and again", 0), now).unwrap();

        assert_eq!(session.message_count(), 3);
        assert_eq!(session.total_tokens, 7);
        assert_eq!(
            session.total_tokens,
            session.messages.iter().map(|m| m.tokens).sum::<i64>()
        );
    }

    #[test]
    fn metadata_merge_is_shallow() {
        let now = Utc::now();
        let first = message("hi", 0).with_metadata(
            json!({"userAgent": "firefox", "location": "Orlando"})
                .as_object()
                .cloned(),
        );
        let second = message("hi", 0).with_metadata(
            json!({"userAgent": "chrome", "deviceInfo": {"mobile": true}})
                .as_object()
                .cloned(),
        );

        let mut session = ChatSession::start(&first, now);
        session.append(&second, now).unwrap();

        let metadata = session.metadata.expect("metadata should be present");
        assert_eq!(metadata["userAgent"], "chrome");
        assert_eq!(metadata["location"], "Orlando");
        assert_eq!(metadata["deviceInfo"], json!({"mobile": true}));
    }

    #[test]
    fn blank_fields_fail_validation() {
        let blank_content = NewMessage::new("s", Role::User, "   ", "10.0.0.1");
        assert!(blank_content.validate().is_err());

        let missing_ip = NewMessage::new("s", Role::User, "hello", "");
        assert!(missing_ip.validate().is_err());

        let ok = NewMessage::new("s", Role::User, "hello", "10.0.0.1");
        assert!(ok.validate().is_ok());
    }

    #[test]
    fn token_bounds_are_validated() {
        assert!(message("hello", -1).validate().is_err());
        assert!(message("hello", MAX_MESSAGE_TOKENS).validate().is_ok());
        assert!(message("hello", MAX_MESSAGE_TOKENS + 1).validate().is_err());
    }

    #[test]
    fn counter_overflow_leaves_session_untouched() {
        let now = Utc::now();
        let mut session = ChatSession::start(&message("hi", 1), now);
        session.total_tokens = i64::MAX;
        let later = now + chrono::Duration::seconds(5);

        let err = session.append(&message("one more", 1), later).unwrap_err();
        assert!(matches!(err, AppError::ValidationError(_)));
        assert_eq!(session.message_count(), 1);
        assert_eq!(session.total_tokens, i64::MAX);
        assert_eq!(session.updated_at, now);
    }

    #[test]
    fn operator_metadata_keys_are_rejected() {
        let bad = message("hello", 0).with_metadata(json!({"$set": 1}).as_object().cloned());
        assert!(bad.validate().is_err());

        let dotted = message("hello", 0).with_metadata(json!({"a.b": 1}).as_object().cloned());
        assert!(dotted.validate().is_err());
    }

    #[test]
    fn session_round_trips_through_bson() {
        let session = ChatSession::start(&message("Tell me about projects", 12), Utc::now());
        let doc = mongodb::bson::to_document(&session).unwrap();
        assert!(doc.get_datetime("createdAt").is_ok());
        assert_eq!(doc.get_str("sessionId").unwrap(), "session_a");

        let back: ChatSession = mongodb::bson::from_document(doc).unwrap();
        assert_eq!(back.messages[0].content, "Tell me about projects");
        assert_eq!(back.messages[0].tokens, 12);
        assert_eq!(back.total_tokens, 12);
    }
}
