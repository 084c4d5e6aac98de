//! MongoDB-backed chat store.
//!
//! All sessions live in one collection (`Chat` in the `portfolio` database by
//! default). Appends are a single `findOneAndUpdate` upsert keyed on
//! `sessionId`, so the message push and the token increment can never drift.

use super::metrics;
use super::store::{ChatStore, SessionOrder};
use crate::config::MongoConfig;
use crate::models::{ChatSession, NewMessage};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::TryStreamExt;
use mongodb::{
    bson::{doc, Bson, DateTime as BsonDateTime, Document},
    error::{Error as MongoError, ErrorKind, WriteFailure},
    options::{ClientOptions, FindOneAndUpdateOptions, FindOptions, IndexOptions, ReturnDocument},
    Client as MongoClient, Collection, Database, IndexModel,
};
use service_core::error::AppError;
use std::future::Future;
use std::time::Duration;
use tokio::time::error::Elapsed;

const DUPLICATE_KEY: i32 = 11000;

#[derive(Clone)]
pub struct MongoChatStore {
    client: MongoClient,
    db: Database,
    collection: String,
    operation_timeout: Duration,
}

impl MongoChatStore {
    pub async fn connect(config: &MongoConfig) -> Result<Self, AppError> {
        tracing::info!(database = %config.database, "Connecting to MongoDB");

        let mut options = ClientOptions::parse(&config.uri).await.map_err(|e| {
            tracing::error!("Failed to parse MongoDB connection string: {}", e);
            AppError::from(e)
        })?;
        options.app_name = Some("chat-history-service".to_string());
        options.connect_timeout = Some(config.connect_timeout());
        options.server_selection_timeout = Some(config.connect_timeout());

        let client = MongoClient::with_options(options).map_err(|e| {
            tracing::error!("Failed to create MongoDB client: {}", e);
            AppError::from(e)
        })?;
        let db = client.database(&config.database);

        tracing::info!(
            database = %config.database,
            collection = %config.collection,
            "Successfully connected to MongoDB database"
        );

        Ok(Self {
            client,
            db,
            collection: config.collection.clone(),
            operation_timeout: config.operation_timeout(),
        })
    }

    pub async fn initialize_indexes(&self) -> Result<(), AppError> {
        tracing::info!("Creating MongoDB indexes for chat-history-service");

        // sessionId is the upsert key.
        if let Err(e) = self
            .create_index(doc! { "sessionId": 1 }, "session_id_unique", true)
            .await
        {
            // Collections written under the old (sessionId, ipAddress) key can
            // hold duplicate sessionIds; keep serving with a plain index.
            tracing::warn!(
                error = %e,
                "Could not create unique sessionId index; falling back to non-unique index"
            );
            self.create_index(doc! { "sessionId": 1 }, "session_id_lookup", false)
                .await?;
        }

        self.create_index(
            doc! { "ipAddress": 1, "updatedAt": -1 },
            "ip_recent_activity",
            false,
        )
        .await?;
        self.create_index(
            doc! { "ipAddress": 1, "createdAt": 1 },
            "ip_created",
            false,
        )
        .await?;
        self.create_index(
            doc! { "ipAddress": 1, "sessionId": 1 },
            "ip_session_lookup",
            false,
        )
        .await?;
        self.create_index(
            doc! { "userId": 1, "createdAt": -1 },
            "user_created",
            false,
        )
        .await?;

        tracing::info!("Successfully created all MongoDB indexes");
        Ok(())
    }

    async fn create_index(&self, keys: Document, name: &str, unique: bool) -> Result<(), AppError> {
        let index = IndexModel::builder()
            .keys(keys)
            .options(
                IndexOptions::builder()
                    .name(name.to_string())
                    .unique(unique)
                    .build(),
            )
            .build();

        self.sessions()
            .create_index(index, None)
            .await
            .map_err(|e| {
                tracing::error!("Failed to create {} index: {}", name, e);
                AppError::from(e)
            })?;
        tracing::info!(index = %name, "Created index on chat collection");
        Ok(())
    }

    pub fn sessions(&self) -> Collection<ChatSession> {
        self.db.collection(&self.collection)
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    /// Run one driver call under the operation timeout.
    async fn run<T, F>(&self, operation: &'static str, fut: F) -> Result<T, AppError>
    where
        F: Future<Output = mongodb::error::Result<T>> + Send,
    {
        let outcome = tokio::time::timeout(self.operation_timeout, fut).await;
        self.settle(operation, outcome)
    }

    fn settle<T>(
        &self,
        operation: &'static str,
        outcome: Result<mongodb::error::Result<T>, Elapsed>,
    ) -> Result<T, AppError> {
        match outcome {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => {
                metrics::record_storage_error(operation);
                tracing::error!(operation, "MongoDB operation failed: {}", e);
                Err(AppError::from(e))
            }
            Err(_) => {
                metrics::record_storage_error(operation);
                tracing::error!(
                    operation,
                    timeout_secs = self.operation_timeout.as_secs(),
                    "MongoDB operation timed out"
                );
                Err(AppError::StorageUnavailable(anyhow::anyhow!(
                    "{} timed out after {:?}",
                    operation,
                    self.operation_timeout
                )))
            }
        }
    }

    async fn upsert_once(
        &self,
        session_id: &str,
        update: Document,
    ) -> mongodb::error::Result<Option<ChatSession>> {
        let options = FindOneAndUpdateOptions::builder()
            .upsert(true)
            .return_document(ReturnDocument::After)
            .build();

        self.sessions()
            .find_one_and_update(doc! { "sessionId": session_id }, update, options)
            .await
    }
}

/// The single update document behind an append.
fn append_update(message: &NewMessage, at: DateTime<Utc>) -> Result<Document, AppError> {
    let now = BsonDateTime::from_chrono(at);

    let message_doc = mongodb::bson::to_document(&message.to_message(at)).map_err(|e| {
        tracing::error!("Failed to serialize message: {}", e);
        AppError::InternalError(anyhow::anyhow!(e.to_string()))
    })?;

    let mut set = doc! {
        "ipAddress": message.ip_address.as_str(),
        "updatedAt": now,
    };
    if let Some(user_id) = &message.user_id {
        set.insert("userId", user_id.as_str());
    }
    if let Some(metadata) = &message.metadata {
        for (key, value) in metadata {
            let value = mongodb::bson::to_bson(value).map_err(|e| {
                AppError::validation(format!("metadata value for '{}' is not storable: {}", key, e))
            })?;
            set.insert(format!("metadata.{}", key), value);
        }
    }

    Ok(doc! {
        "$push": { "messages": message_doc },
        "$inc": { "totalTokens": message.tokens },
        "$set": set,
        "$setOnInsert": { "createdAt": now },
    })
}

fn is_duplicate_key(err: &MongoError) -> bool {
    match err.kind.as_ref() {
        ErrorKind::Command(e) => e.code == DUPLICATE_KEY,
        ErrorKind::Write(WriteFailure::WriteError(e)) => e.code == DUPLICATE_KEY,
        _ => false,
    }
}

fn sort_for(order: SessionOrder) -> Document {
    match order {
        SessionOrder::RecentlyUpdated => doc! { "updatedAt": -1 },
        SessionOrder::OldestCreated => doc! { "createdAt": 1 },
    }
}

#[async_trait]
impl ChatStore for MongoChatStore {
    async fn append(
        &self,
        message: &NewMessage,
        at: DateTime<Utc>,
    ) -> Result<ChatSession, AppError> {
        let update = append_update(message, at)?;

        let mut retried = false;
        let result = loop {
            let attempt = tokio::time::timeout(
                self.operation_timeout,
                self.upsert_once(&message.session_id, update.clone()),
            )
            .await;

            match attempt {
                // Two first writes raced on the unique index; the loser retries as an update.
                Ok(Err(e)) if !retried && is_duplicate_key(&e) => {
                    tracing::debug!(
                        session_id = %message.session_id,
                        "Upsert lost insert race, retrying"
                    );
                    retried = true;
                }
                outcome => break self.settle("append", outcome)?,
            }
        };

        result.ok_or_else(|| {
            AppError::InternalError(anyhow::anyhow!(
                "upsert for session {} returned no document",
                message.session_id
            ))
        })
    }

    async fn find_by_session(&self, session_id: &str) -> Result<Option<ChatSession>, AppError> {
        self.run(
            "find_by_session",
            self.sessions()
                .find_one(doc! { "sessionId": session_id }, None),
        )
        .await
    }

    async fn find_by_ip(
        &self,
        ip_address: &str,
        order: SessionOrder,
        limit: Option<i64>,
    ) -> Result<Vec<ChatSession>, AppError> {
        let mut options = FindOptions::default();
        options.sort = Some(sort_for(order));
        options.limit = limit;
        let filter = doc! { "ipAddress": ip_address };

        self.run("find_by_ip", async {
            let cursor = self.sessions().find(filter, options).await?;
            cursor.try_collect::<Vec<_>>().await
        })
        .await
    }

    async fn search(
        &self,
        needle: &str,
        ip_address: Option<&str>,
        limit: i64,
    ) -> Result<Vec<ChatSession>, AppError> {
        // Literal match: user input never becomes a pattern.
        let mut filter = doc! {
            "messages.content": { "$regex": regex::escape(needle), "$options": "i" }
        };
        if let Some(ip) = ip_address {
            filter.insert("ipAddress", ip);
        }

        let mut options = FindOptions::default();
        options.sort = Some(sort_for(SessionOrder::RecentlyUpdated));
        options.limit = Some(limit);

        self.run("search", async {
            let cursor = self.sessions().find(filter, options).await?;
            cursor.try_collect::<Vec<_>>().await
        })
        .await
    }

    async fn delete_by_ip(&self, ip_address: &str) -> Result<u64, AppError> {
        let result = self
            .run(
                "delete_by_ip",
                self.sessions()
                    .delete_many(doc! { "ipAddress": ip_address }, None),
            )
            .await?;
        Ok(result.deleted_count)
    }

    async fn distinct_ips(&self) -> Result<Vec<String>, AppError> {
        let values = self
            .run(
                "distinct_ips",
                self.sessions().distinct("ipAddress", None, None),
            )
            .await?;

        let mut ips: Vec<String> = values
            .into_iter()
            .filter_map(|v| match v {
                Bson::String(s) => Some(s),
                _ => None,
            })
            .collect();
        ips.sort();
        ips.dedup();
        Ok(ips)
    }

    async fn health_check(&self) -> Result<(), AppError> {
        self.run(
            "ping",
            self.client
                .database("admin")
                .run_command(doc! { "ping": 1 }, None),
        )
        .await?;
        Ok(())
    }

    async fn close(&self) {
        tracing::info!("Closing MongoDB connection pool");
        self.client.clone().shutdown().await;
        tracing::info!("MongoDB connection closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ChatConfig;
    use crate::models::Role;
    use serde_json::json;

    #[tokio::test]
    async fn timed_out_operation_is_storage_unavailable() {
        // Parsing a plain mongodb:// URI does no I/O, so nothing needs to listen here.
        let config = MongoConfig {
            uri: "mongodb://127.0.0.1:1".to_string(),
            operation_timeout_secs: 0,
            ..ChatConfig::in_memory(0).mongodb
        };
        let store = MongoChatStore::connect(&config).await.unwrap();

        let err = store
            .run("find_by_session", std::future::pending::<mongodb::error::Result<()>>())
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::StorageUnavailable(_)));
        assert_eq!(err.status_code(), axum::http::StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn append_update_pushes_increments_and_merges() {
        let message = NewMessage::new("session_1", Role::User, "hello", "10.0.0.1")
            .with_tokens(7)
            .with_user_id(Some("visitor".to_string()))
            .with_metadata(json!({"userAgent": "curl"}).as_object().cloned());

        let update = append_update(&message, Utc::now()).unwrap();

        let push = update.get_document("$push").unwrap();
        let pushed = push.get_document("messages").unwrap();
        assert_eq!(pushed.get_str("role").unwrap(), "user");
        assert_eq!(pushed.get_str("content").unwrap(), "hello");
        assert_eq!(pushed.get_i64("tokens").unwrap(), 7);

        let inc = update.get_document("$inc").unwrap();
        assert_eq!(inc.get_i64("totalTokens").unwrap(), 7);

        let set = update.get_document("$set").unwrap();
        assert_eq!(set.get_str("ipAddress").unwrap(), "10.0.0.1");
        assert_eq!(set.get_str("userId").unwrap(), "visitor");
        assert_eq!(set.get_str("metadata.userAgent").unwrap(), "curl");
        assert!(set.get_datetime("updatedAt").is_ok());

        let on_insert = update.get_document("$setOnInsert").unwrap();
        assert!(on_insert.get_datetime("createdAt").is_ok());
        // sessionId comes from the filter on insert; it must not be $set.
        assert!(!set.contains_key("sessionId"));
    }

    #[test]
    fn sort_orders_match_query_contracts() {
        assert_eq!(
            sort_for(SessionOrder::RecentlyUpdated),
            doc! { "updatedAt": -1 }
        );
        assert_eq!(sort_for(SessionOrder::OldestCreated), doc! { "createdAt": 1 });
    }
}
