//! Load demo conversations into the configured store.

use chat_history_service::config::{ChatConfig, StoreBackend};
use chat_history_service::seed::seed_demo_sessions;
use chat_history_service::services::{ChatRepository, MongoChatStore};
use service_core::error::AppError;
use service_core::observability::init_tracing;
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<(), AppError> {
    init_tracing("chat-history-seed", "info", None);

    let config = ChatConfig::load()?;
    if config.store.backend != StoreBackend::Mongo {
        return Err(AppError::ConfigError(anyhow::anyhow!(
            "seeding needs CHAT_STORE_BACKEND=mongo; the in-memory store would discard the data"
        )));
    }

    let store = MongoChatStore::connect(&config.mongodb).await?;
    store.initialize_indexes().await?;
    let repository = ChatRepository::new(Arc::new(store));

    let summary = seed_demo_sessions(&repository, chrono::Utc::now()).await;
    repository.close().await;
    let summary = summary?;

    for (ip, totals) in &summary.by_ip {
        tracing::info!(
            ip_address = %ip,
            sessions = totals.sessions,
            messages = totals.messages,
            tokens = totals.tokens,
            "Seeded demo sessions"
        );
    }
    tracing::info!(
        inserted = summary.inserted,
        skipped = summary.skipped,
        "Demo seeding finished"
    );
    Ok(())
}
