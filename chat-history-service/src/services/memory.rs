//! Process-local chat store for tests and local development.

use super::store::{ChatStore, SessionOrder};
use crate::models::{ChatSession, NewMessage};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use service_core::error::AppError;
use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::RwLock;

/// Sessions keyed by `sessionId`, guarded by one lock so every append is
/// atomic just like the MongoDB upsert.
#[derive(Default)]
pub struct InMemoryChatStore {
    sessions: RwLock<HashMap<String, ChatSession>>,
    writes: AtomicU64,
}

impl InMemoryChatStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of mutating calls that reached the store.
    pub fn write_count(&self) -> u64 {
        self.writes.load(Ordering::SeqCst)
    }
}

fn sort_sessions(sessions: &mut [ChatSession], order: SessionOrder) {
    match order {
        SessionOrder::RecentlyUpdated => sessions.sort_by(|a, b| {
            b.updated_at
                .cmp(&a.updated_at)
                .then_with(|| a.session_id.cmp(&b.session_id))
        }),
        SessionOrder::OldestCreated => sessions.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.session_id.cmp(&b.session_id))
        }),
    }
}

fn truncate(mut sessions: Vec<ChatSession>, limit: Option<i64>) -> Vec<ChatSession> {
    if let Some(limit) = limit.filter(|l| *l > 0) {
        sessions.truncate(limit as usize);
    }
    sessions
}

#[async_trait]
impl ChatStore for InMemoryChatStore {
    async fn append(
        &self,
        message: &NewMessage,
        at: DateTime<Utc>,
    ) -> Result<ChatSession, AppError> {
        let mut sessions = self.sessions.write().await;
        self.writes.fetch_add(1, Ordering::SeqCst);

        match sessions.get_mut(&message.session_id) {
            Some(existing) => {
                existing.append(message, at)?;
                Ok(existing.clone())
            }
            None => {
                let session = ChatSession::start(message, at);
                sessions.insert(message.session_id.clone(), session.clone());
                Ok(session)
            }
        }
    }

    async fn find_by_session(&self, session_id: &str) -> Result<Option<ChatSession>, AppError> {
        Ok(self.sessions.read().await.get(session_id).cloned())
    }

    async fn find_by_ip(
        &self,
        ip_address: &str,
        order: SessionOrder,
        limit: Option<i64>,
    ) -> Result<Vec<ChatSession>, AppError> {
        let mut matching: Vec<ChatSession> = self
            .sessions
            .read()
            .await
            .values()
            .filter(|s| s.ip_address == ip_address)
            .cloned()
            .collect();
        sort_sessions(&mut matching, order);
        Ok(truncate(matching, limit))
    }

    async fn search(
        &self,
        needle: &str,
        ip_address: Option<&str>,
        limit: i64,
    ) -> Result<Vec<ChatSession>, AppError> {
        let needle_lower = needle.to_lowercase();
        let mut matching: Vec<ChatSession> = self
            .sessions
            .read()
            .await
            .values()
            .filter(|s| ip_address.map_or(true, |ip| s.ip_address == ip))
            .filter(|s| s.mentions(&needle_lower))
            .cloned()
            .collect();
        sort_sessions(&mut matching, SessionOrder::RecentlyUpdated);
        Ok(truncate(matching, Some(limit)))
    }

    async fn delete_by_ip(&self, ip_address: &str) -> Result<u64, AppError> {
        let mut sessions = self.sessions.write().await;
        self.writes.fetch_add(1, Ordering::SeqCst);

        let before = sessions.len();
        sessions.retain(|_, s| s.ip_address != ip_address);
        Ok((before - sessions.len()) as u64)
    }

    async fn distinct_ips(&self) -> Result<Vec<String>, AppError> {
        let ips: BTreeSet<String> = self
            .sessions
            .read()
            .await
            .values()
            .map(|s| s.ip_address.clone())
            .collect();
        Ok(ips.into_iter().collect())
    }

    async fn health_check(&self) -> Result<(), AppError> {
        Ok(())
    }

    async fn close(&self) {
        tracing::debug!("In-memory chat store closed");
    }
}
