#![allow(dead_code)]

use async_trait::async_trait;
use axum::Router;
use chat_client::ChatHistoryClient;
use chat_history_service::config::ChatConfig;
use chat_history_service::models::{ChatSession, NewMessage};
use chat_history_service::services::{
    ChatRepository, ChatStore, InMemoryChatStore, SessionOrder,
};
use chat_history_service::startup::{router, AppState, Application};
use chrono::{DateTime, Utc};
use service_core::error::AppError;
use std::sync::Arc;

pub struct TestApp {
    pub address: String,
    pub port: u16,
    pub store: Arc<InMemoryChatStore>,
    pub client: ChatHistoryClient,
}

impl TestApp {
    /// Spawn the full server on a random port, backed by the in-memory store.
    pub async fn spawn() -> Self {
        let store = Arc::new(InMemoryChatStore::new());
        let config = ChatConfig::in_memory(0); // Random port for testing

        let app = Application::build_with_store(config, store.clone())
            .await
            .expect("Failed to build test application");

        let port = app.port();
        let address = format!("http://127.0.0.1:{}", port);

        tokio::spawn(async move {
            app.run_until_stopped().await.ok();
        });

        // Wait for the server to be ready by polling the health endpoint
        let http = reqwest::Client::new();
        let health_url = format!("{}/api/health", address);
        for _ in 0..50 {
            if http.get(&health_url).send().await.is_ok() {
                break;
            }
            tokio::time::sleep(tokio::time::Duration::from_millis(50)).await;
        }

        let client = ChatHistoryClient::new(address.clone()).expect("Failed to build client");

        TestApp {
            address,
            port,
            store,
            client,
        }
    }
}

/// Router over a fresh in-memory store, for `oneshot` tests.
pub fn test_router() -> (Router, Arc<InMemoryChatStore>) {
    let store = Arc::new(InMemoryChatStore::new());
    (router_with_store(store.clone()), store)
}

pub fn router_with_store(store: Arc<dyn ChatStore>) -> Router {
    router(AppState::new(ChatRepository::new(store)))
}

/// Detail that must never reach a response body.
pub const UNREACHABLE_DETAIL: &str = "connection refused by 10.1.1.1:27017";

/// A store whose backend is gone: every call fails the way the MongoDB
/// store does when the cluster is unreachable.
pub struct UnreachableChatStore;

fn unreachable() -> AppError {
    AppError::StorageUnavailable(anyhow::anyhow!(UNREACHABLE_DETAIL))
}

#[async_trait]
impl ChatStore for UnreachableChatStore {
    async fn append(&self, _: &NewMessage, _: DateTime<Utc>) -> Result<ChatSession, AppError> {
        Err(unreachable())
    }

    async fn find_by_session(&self, _: &str) -> Result<Option<ChatSession>, AppError> {
        Err(unreachable())
    }

    async fn find_by_ip(
        &self,
        _: &str,
        _: SessionOrder,
        _: Option<i64>,
    ) -> Result<Vec<ChatSession>, AppError> {
        Err(unreachable())
    }

    async fn search(
        &self,
        _: &str,
        _: Option<&str>,
        _: i64,
    ) -> Result<Vec<ChatSession>, AppError> {
        Err(unreachable())
    }

    async fn delete_by_ip(&self, _: &str) -> Result<u64, AppError> {
        Err(unreachable())
    }

    async fn distinct_ips(&self) -> Result<Vec<String>, AppError> {
        Err(unreachable())
    }

    async fn health_check(&self) -> Result<(), AppError> {
        Err(unreachable())
    }

    async fn close(&self) {}
}
