//! Storage seam for chat sessions.
//!
//! `ChatRepository` holds an `Arc<dyn ChatStore>`, so the same repository
//! logic runs against MongoDB in production and against the in-memory store
//! in tests and local development.

use crate::models::{ChatSession, NewMessage};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use service_core::error::AppError;

/// Sort order for sessions listed by IP.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionOrder {
    /// `updatedAt` descending: most recently active first.
    RecentlyUpdated,
    /// `createdAt` ascending: oldest first.
    OldestCreated,
}

#[async_trait]
pub trait ChatStore: Send + Sync {
    /// Atomically upsert on `sessionId`: push the message, increment
    /// `totalTokens`, set `ipAddress`/`updatedAt`/`userId`, shallow-merge
    /// `metadata`, and stamp `createdAt` only on insert. Exactly one write.
    async fn append(&self, message: &NewMessage, at: DateTime<Utc>)
        -> Result<ChatSession, AppError>;

    async fn find_by_session(&self, session_id: &str) -> Result<Option<ChatSession>, AppError>;

    async fn find_by_ip(
        &self,
        ip_address: &str,
        order: SessionOrder,
        limit: Option<i64>,
    ) -> Result<Vec<ChatSession>, AppError>;

    /// Sessions with any message containing `needle`, ignoring case,
    /// most recently updated first.
    async fn search(
        &self,
        needle: &str,
        ip_address: Option<&str>,
        limit: i64,
    ) -> Result<Vec<ChatSession>, AppError>;

    /// Returns the number of deleted sessions.
    async fn delete_by_ip(&self, ip_address: &str) -> Result<u64, AppError>;

    /// Every distinct IP, sorted ascending.
    async fn distinct_ips(&self) -> Result<Vec<String>, AppError>;

    async fn health_check(&self) -> Result<(), AppError>;

    /// Release pooled connections. Called once at shutdown.
    async fn close(&self);
}
