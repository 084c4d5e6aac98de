//! Application startup and lifecycle management.

use crate::config::{ChatConfig, StoreBackend};
use crate::handlers;
use crate::services::{ChatRepository, ChatStore, InMemoryChatStore, MongoChatStore};
use axum::{
    middleware::from_fn,
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Router,
};
use service_core::error::AppError;
use service_core::middleware::{
    metrics_middleware, permissive_cors, preflight_middleware, request_id_middleware,
};
use std::any::Any;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpListener;
use tower_http::{catch_panic::CatchPanicLayer, trace::TraceLayer};

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub repository: ChatRepository,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(repository: ChatRepository) -> Self {
        Self {
            repository,
            started_at: Instant::now(),
        }
    }
}

/// The full HTTP surface: chat routes, health checks, metrics, fallbacks and
/// middleware.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route(
            "/api/chat/message",
            post(handlers::save_message).fallback(handlers::method_not_allowed),
        )
        .route(
            "/api/chat/session/:session_id",
            get(handlers::get_session).fallback(handlers::method_not_allowed),
        )
        .route(
            "/api/chat/history/:ip_address",
            get(handlers::get_history).fallback(handlers::method_not_allowed),
        )
        .route(
            "/api/chat/search",
            get(handlers::search_messages).fallback(handlers::method_not_allowed),
        )
        .route(
            "/api/chat/stats/:ip_address",
            get(handlers::get_stats).fallback(handlers::method_not_allowed),
        )
        .route(
            "/api/chat/ip/:ip_address",
            delete(handlers::delete_by_ip).fallback(handlers::method_not_allowed),
        )
        .route(
            "/api/chat/ips",
            get(handlers::list_ips).fallback(handlers::method_not_allowed),
        )
        .route(
            "/api/health",
            get(handlers::health_check).fallback(handlers::method_not_allowed),
        )
        .route(
            "/ready",
            get(handlers::readiness_check).fallback(handlers::method_not_allowed),
        )
        .route(
            "/metrics",
            get(handlers::metrics).fallback(handlers::method_not_allowed),
        )
        .fallback(handlers::route_not_found)
        .layer(from_fn(metrics_middleware))
        .layer(from_fn(preflight_middleware))
        .layer(permissive_cors())
        .layer(from_fn(request_id_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(CatchPanicLayer::custom(handle_panic))
        .with_state(state)
}

fn handle_panic(_: Box<dyn Any + Send + 'static>) -> Response {
    AppError::InternalError(anyhow::anyhow!("request handler panicked")).into_response()
}

/// Application container for managing server lifecycle.
pub struct Application {
    port: u16,
    listener: TcpListener,
    state: AppState,
}

impl Application {
    /// Build the application with the store selected by `config.store.backend`.
    pub async fn build(config: ChatConfig) -> Result<Self, AppError> {
        let store: Arc<dyn ChatStore> = match config.store.backend {
            StoreBackend::Mongo => {
                let store = MongoChatStore::connect(&config.mongodb).await.map_err(|e| {
                    tracing::error!("Failed to connect to MongoDB: {}", e);
                    e
                })?;
                store.initialize_indexes().await.map_err(|e| {
                    tracing::error!("Failed to initialize database indexes: {}", e);
                    e
                })?;
                Arc::new(store)
            }
            StoreBackend::Memory => {
                tracing::warn!("Using in-memory chat store; history is lost on restart");
                Arc::new(InMemoryChatStore::new())
            }
        };

        Self::build_with_store(config, store).await
    }

    /// Build the application around an already constructed store.
    pub async fn build_with_store(
        config: ChatConfig,
        store: Arc<dyn ChatStore>,
    ) -> Result<Self, AppError> {
        let state = AppState::new(ChatRepository::new(store));

        // Bind listener (port 0 = random port for testing)
        let addr = SocketAddr::from(([0, 0, 0, 0], config.common.port));
        let listener = TcpListener::bind(addr).await.map_err(|e| {
            tracing::error!("Failed to bind TCP listener to {}: {}", addr, e);
            AppError::from(e)
        })?;
        let port = listener.local_addr()?.port();

        tracing::info!(
            port,
            public_base_url = config.public_base_url.as_deref().unwrap_or("unset"),
            "Chat history service listening"
        );

        Ok(Self {
            port,
            listener,
            state,
        })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Serve until the process is killed.
    pub async fn run_until_stopped(self) -> std::io::Result<()> {
        axum::serve(self.listener, router(self.state)).await
    }

    /// Serve until `signal` resolves, drain in-flight requests, then close
    /// the store.
    pub async fn run_with_shutdown<F>(self, signal: F) -> std::io::Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let repository = self.state.repository.clone();

        let result = axum::serve(self.listener, router(self.state))
            .with_graceful_shutdown(signal)
            .await;

        repository.close().await;
        result
    }
}
