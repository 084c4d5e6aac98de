//! Chat history operations shared by every HTTP handler.
//!
//! The repository validates inputs and applies defaults. Storage primitives
//! live behind [`ChatStore`], so handlers never see MongoDB directly.

use super::metrics;
use super::store::{ChatStore, SessionOrder};
use crate::models::{AppendOutcome, ChatSession, ChatStats, NewMessage};
use chrono::{DateTime, DurationRound, Utc};
use service_core::error::AppError;
use std::sync::Arc;
use validator::Validate;

pub const DEFAULT_HISTORY_LIMIT: i64 = 50;
pub const DEFAULT_SEARCH_LIMIT: i64 = 20;
pub const DEFAULT_IP_LIST_LIMIT: i64 = 100;
pub const MAX_LIMIT: i64 = 500;

/// A page of distinct IPs together with the overall count.
#[derive(Debug, Clone, PartialEq)]
pub struct IpListing {
    pub ips: Vec<String>,
    pub total: usize,
}

#[derive(Clone)]
pub struct ChatRepository {
    store: Arc<dyn ChatStore>,
}

impl ChatRepository {
    pub fn new(store: Arc<dyn ChatStore>) -> Self {
        Self { store }
    }

    pub async fn append_message(&self, message: NewMessage) -> Result<AppendOutcome, AppError> {
        self.append_message_at(message, Utc::now()).await
    }

    /// Append with an explicit server timestamp.
    ///
    /// BSON dates carry milliseconds, so `at` is truncated first to keep
    /// in-memory and MongoDB results identical.
    pub async fn append_message_at(
        &self,
        message: NewMessage,
        at: DateTime<Utc>,
    ) -> Result<AppendOutcome, AppError> {
        message.validate()?;

        let at = at
            .duration_trunc(chrono::Duration::milliseconds(1))
            .unwrap_or(at);
        let session = self.store.append(&message, at).await?;
        let created = session.message_count() == 1;

        metrics::record_message_appended(created);
        tracing::info!(
            session_id = %session.session_id,
            ip_address = %session.ip_address,
            created,
            message_count = session.message_count(),
            total_tokens = session.total_tokens,
            "Chat message saved"
        );

        Ok(AppendOutcome { session, created })
    }

    pub async fn get_by_session(&self, session_id: &str) -> Result<ChatSession, AppError> {
        let session_id = required(session_id, "sessionId")?;
        self.store
            .find_by_session(session_id)
            .await?
            .ok_or_else(|| AppError::not_found("Chat session not found"))
    }

    pub async fn get_by_ip(&self, ip_address: &str, limit: i64) -> Result<Vec<ChatSession>, AppError> {
        let ip_address = required(ip_address, "ipAddress")?;
        self.store
            .find_by_ip(
                ip_address,
                SessionOrder::RecentlyUpdated,
                Some(clamp_limit(limit, DEFAULT_HISTORY_LIMIT)),
            )
            .await
    }

    pub async fn search_messages(
        &self,
        query: &str,
        ip_address: Option<&str>,
        limit: i64,
    ) -> Result<Vec<ChatSession>, AppError> {
        // Substring search: surrounding whitespace is part of the needle.
        if query.trim().is_empty() {
            return Err(AppError::validation("query is required"));
        }
        let ip_address = ip_address.map(str::trim).filter(|ip| !ip.is_empty());

        self.store
            .search(query, ip_address, clamp_limit(limit, DEFAULT_SEARCH_LIMIT))
            .await
    }

    pub async fn stats_by_ip(&self, ip_address: &str) -> Result<ChatStats, AppError> {
        let ip_address = required(ip_address, "ipAddress")?;
        let sessions = self
            .store
            .find_by_ip(ip_address, SessionOrder::OldestCreated, None)
            .await?;
        Ok(ChatStats::from_sessions(&sessions))
    }

    pub async fn delete_by_ip(&self, ip_address: &str) -> Result<u64, AppError> {
        let ip_address = required(ip_address, "ipAddress")?;
        let deleted = self.store.delete_by_ip(ip_address).await?;

        metrics::record_sessions_deleted(deleted);
        tracing::info!(ip_address = %ip_address, deleted, "Deleted chat sessions for IP");
        Ok(deleted)
    }

    pub async fn list_distinct_ips(&self, limit: i64) -> Result<IpListing, AppError> {
        let mut ips = self.store.distinct_ips().await?;
        let total = ips.len();
        ips.truncate(clamp_limit(limit, DEFAULT_IP_LIST_LIMIT) as usize);
        Ok(IpListing { ips, total })
    }

    pub async fn health_check(&self) -> Result<(), AppError> {
        self.store.health_check().await
    }

    pub async fn close(&self) {
        self.store.close().await;
    }
}

/// Non-positive limits fall back to `default`; everything is capped at [`MAX_LIMIT`].
pub fn clamp_limit(limit: i64, default: i64) -> i64 {
    if limit <= 0 {
        default
    } else {
        limit.min(MAX_LIMIT)
    }
}

fn required<'a>(value: &'a str, field: &str) -> Result<&'a str, AppError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(AppError::validation(format!("{} is required", field)));
    }
    Ok(trimmed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Role;
    use crate::services::memory::InMemoryChatStore;
    use chrono::Duration;

    fn repository() -> (ChatRepository, Arc<InMemoryChatStore>) {
        let store = Arc::new(InMemoryChatStore::new());
        (ChatRepository::new(store.clone()), store)
    }

    fn user(session: &str, ip: &str, content: &str, tokens: i64) -> NewMessage {
        NewMessage::new(session, Role::User, content, ip).with_tokens(tokens)
    }

    fn assistant(session: &str, ip: &str, content: &str, tokens: i64) -> NewMessage {
        NewMessage::new(session, Role::Assistant, content, ip).with_tokens(tokens)
    }

    #[tokio::test]
    async fn first_append_creates_and_second_appends() {
        let (repo, _) = repository();

        let first = repo
            .append_message(user("s1", "10.0.0.1", "hello", 5))
            .await
            .unwrap();
        assert!(first.created);
        assert_eq!(first.session.message_count(), 1);

        let second = repo
            .append_message(assistant("s1", "10.0.0.1", "hi there", 7))
            .await
            .unwrap();
        assert!(!second.created);
        assert_eq!(second.session.message_count(), 2);
        assert_eq!(second.session.total_tokens, 12);
        assert_eq!(second.session.created_at, first.session.created_at);
    }

    #[tokio::test]
    async fn concurrent_appends_keep_counter_consistent() {
        let (repo, _) = repository();

        let handles: Vec<_> = (0..50)
            .map(|i| {
                let repo = repo.clone();
                tokio::spawn(async move {
                    repo.append_message(user("busy", "10.0.0.2", &format!("msg {}", i), i))
                        .await
                })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let session = repo.get_by_session("busy").await.unwrap();
        assert_eq!(session.message_count(), 50);
        assert_eq!(session.total_tokens, (0..50).sum::<i64>());
        assert_eq!(
            session.total_tokens,
            session.messages.iter().map(|m| m.tokens).sum::<i64>()
        );
    }

    #[tokio::test]
    async fn appended_message_round_trips() {
        let (repo, _) = repository();
        let at = Utc::now();

        repo.append_message_at(user("rt", "10.0.0.3", "What projects have you built?", 9), at)
            .await
            .unwrap();

        let session = repo.get_by_session("rt").await.unwrap();
        let message = &session.messages[0];
        assert_eq!(message.role, Role::User);
        assert_eq!(message.content, "What projects have you built?");
        assert_eq!(message.tokens, 9);
        assert_eq!(message.timestamp.timestamp_millis(), at.timestamp_millis());
        assert_eq!(session.ip_address, "10.0.0.3");
    }

    #[tokio::test]
    async fn history_is_most_recently_updated_first() {
        let (repo, _) = repository();
        let base = Utc::now();

        repo.append_message_at(user("a", "10.0.0.4", "one", 0), base)
            .await
            .unwrap();
        repo.append_message_at(user("b", "10.0.0.4", "two", 0), base + Duration::seconds(1))
            .await
            .unwrap();
        repo.append_message_at(user("a", "10.0.0.4", "three", 0), base + Duration::seconds(2))
            .await
            .unwrap();

        let history = repo.get_by_ip("10.0.0.4", 50).await.unwrap();
        let order: Vec<_> = history.iter().map(|s| s.session_id.as_str()).collect();
        assert_eq!(order, vec!["a", "b"]);
        assert!(history[0].updated_at >= history[1].updated_at);

        let limited = repo.get_by_ip("10.0.0.4", 1).await.unwrap();
        assert_eq!(limited.len(), 1);
    }

    #[tokio::test]
    async fn stats_aggregate_sessions_for_ip() {
        let (repo, _) = repository();
        let ip = "192.168.1.100";
        let base = Utc::now();

        // [2, 4, 1] messages carrying [10, 40, 5] tokens.
        repo.append_message_at(user("s1", ip, "q", 4), base).await.unwrap();
        repo.append_message_at(assistant("s1", ip, "a", 6), base).await.unwrap();
        for (i, tokens) in [10, 10, 10, 10].into_iter().enumerate() {
            let message = if i % 2 == 0 {
                user("s2", ip, "q", tokens)
            } else {
                assistant("s2", ip, "a", tokens)
            };
            repo.append_message_at(message, base + Duration::seconds(1))
                .await
                .unwrap();
        }
        repo.append_message_at(user("s3", ip, "q", 5), base + Duration::seconds(2))
            .await
            .unwrap();

        let stats = repo.stats_by_ip(ip).await.unwrap();
        assert_eq!(stats.total_sessions, 3);
        assert_eq!(stats.total_messages, 7);
        assert_eq!(stats.total_tokens, 55);
        assert_eq!(stats.average_messages_per_session, 2.33);
        assert_eq!(stats.user_messages, 4);
        assert_eq!(stats.assistant_messages, 3);
        assert!(stats.first_seen.unwrap() <= stats.last_seen.unwrap());
    }

    #[tokio::test]
    async fn stats_for_unknown_ip_are_zero() {
        let (repo, _) = repository();
        let stats = repo.stats_by_ip("203.0.113.9").await.unwrap();

        assert_eq!(stats, ChatStats::default());
        assert!(stats.first_seen.is_none());
        assert!(stats.last_seen.is_none());
    }

    #[tokio::test]
    async fn invalid_messages_are_rejected_without_writes() {
        let (repo, store) = repository();

        let cases = vec![
            NewMessage::new("", Role::User, "hello", "10.0.0.5"),
            NewMessage::new("s", Role::User, "   ", "10.0.0.5"),
            NewMessage::new("s", Role::User, "hello", " "),
            user("s", "10.0.0.5", "hello", -3),
        ];
        for message in cases {
            let err = repo.append_message(message).await.unwrap_err();
            assert!(matches!(err, AppError::ValidationError(_)));
        }

        assert_eq!(store.write_count(), 0);
    }

    #[tokio::test]
    async fn delete_by_ip_removes_every_session() {
        let (repo, _) = repository();
        let ip = "192.168.1.50";
        for i in 0..5 {
            repo.append_message(user(&format!("del_{}", i), ip, "bye", 1))
                .await
                .unwrap();
        }
        repo.append_message(user("keep", "192.168.1.51", "stay", 1))
            .await
            .unwrap();

        assert_eq!(repo.delete_by_ip(ip).await.unwrap(), 5);
        assert!(repo.get_by_ip(ip, 50).await.unwrap().is_empty());
        assert_eq!(repo.get_by_ip("192.168.1.51", 50).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn search_is_case_insensitive_and_literal() {
        let (repo, _) = repository();
        repo.append_message(user("p", "10.0.0.6", "Tell me about your projects", 0))
            .await
            .unwrap();
        repo.append_message(user("q", "10.0.0.7", "What is (a+b)*?", 0))
            .await
            .unwrap();

        let found = repo.search_messages("PROJECTS", None, 20).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].session_id, "p");

        let scoped = repo
            .search_messages("projects", Some("10.0.0.7"), 20)
            .await
            .unwrap();
        assert!(scoped.is_empty());

        let literal = repo.search_messages("(a+b)*", None, 20).await.unwrap();
        assert_eq!(literal.len(), 1);

        let err = repo.search_messages("  ", None, 20).await.unwrap_err();
        assert!(matches!(err, AppError::ValidationError(_)));
    }

    #[tokio::test]
    async fn search_keeps_surrounding_whitespace() {
        let (repo, _) = repository();
        repo.append_message(user("bare", "10.0.0.8", "the", 0))
            .await
            .unwrap();
        repo.append_message(user("spaced", "10.0.0.8", "the end", 0))
            .await
            .unwrap();

        let found = repo.search_messages("the ", None, 20).await.unwrap();
        let ids: Vec<_> = found.iter().map(|s| s.session_id.as_str()).collect();
        assert_eq!(ids, vec!["spaced"]);
    }

    #[tokio::test]
    async fn missing_session_is_not_found() {
        let (repo, _) = repository();
        let err = repo.get_by_session("nope").await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn distinct_ips_are_sorted_and_limited() {
        let (repo, _) = repository();
        for ip in ["10.0.0.9", "10.0.0.1", "10.0.0.5", "10.0.0.1"] {
            repo.append_message(user(&format!("s_{}", ip), ip, "hi", 0))
                .await
                .unwrap();
        }

        let listing = repo.list_distinct_ips(2).await.unwrap();
        assert_eq!(listing.ips, vec!["10.0.0.1", "10.0.0.5"]);
        assert_eq!(listing.total, 3);
    }

    #[test]
    fn limits_default_and_cap() {
        assert_eq!(clamp_limit(0, 50), 50);
        assert_eq!(clamp_limit(-4, 20), 20);
        assert_eq!(clamp_limit(10, 50), 10);
        assert_eq!(clamp_limit(10_000, 50), MAX_LIMIT);
    }
}
