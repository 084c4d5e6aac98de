use service_core::config as core_config;
use service_core::error::AppError;
use std::env;
use std::time::Duration;

const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 5;
const DEFAULT_OPERATION_TIMEOUT_SECS: u64 = 45;

#[derive(Debug, Clone)]
pub struct ChatConfig {
    pub common: core_config::Config,
    pub store: StoreConfig,
    pub mongodb: MongoConfig,
    /// Public URL the frontend uses to reach this API, if known.
    pub public_base_url: Option<String>,
}

#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub backend: StoreBackend,
}

#[derive(Debug, Clone)]
pub struct MongoConfig {
    /// Empty only when the in-memory backend is selected.
    pub uri: String,
    pub database: String,
    pub collection: String,
    pub connect_timeout_secs: u64,
    pub operation_timeout_secs: u64,
}

impl MongoConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn operation_timeout(&self) -> Duration {
        Duration::from_secs(self.operation_timeout_secs)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Mongo,
    Memory,
}

impl ChatConfig {
    pub fn load() -> Result<Self, AppError> {
        // Load common config (handles .env, APP__ prefix and PORT)
        let common_config = core_config::Config::load()?;
        let is_prod = env::var("ENVIRONMENT").unwrap_or_else(|_| "dev".to_string()) == "prod";

        let backend: StoreBackend = get_env("CHAT_STORE_BACKEND", Some("mongo"), is_prod)?
            .parse()
            .map_err(|e: String| AppError::ConfigError(anyhow::anyhow!(e)))?;

        // The connection string is only mandatory when we actually talk to MongoDB.
        let uri = match backend {
            StoreBackend::Mongo => get_env("MONGODB_URI", None, is_prod)?,
            StoreBackend::Memory => env::var("MONGODB_URI").unwrap_or_default(),
        };

        Ok(ChatConfig {
            common: common_config,
            store: StoreConfig { backend },
            mongodb: MongoConfig {
                uri,
                database: get_env("MONGODB_DATABASE", Some("portfolio"), is_prod)?,
                collection: get_env("MONGODB_COLLECTION", Some("Chat"), is_prod)?,
                connect_timeout_secs: parse_secs(
                    "MONGODB_CONNECT_TIMEOUT_SECS",
                    DEFAULT_CONNECT_TIMEOUT_SECS,
                    is_prod,
                )?,
                operation_timeout_secs: parse_secs(
                    "MONGODB_OPERATION_TIMEOUT_SECS",
                    DEFAULT_OPERATION_TIMEOUT_SECS,
                    is_prod,
                )?,
            },
            public_base_url: env::var("PUBLIC_BASE_URL").ok().filter(|u| !u.is_empty()),
        })
    }

    /// Configuration for tests and local runs that never touch MongoDB.
    pub fn in_memory(port: u16) -> Self {
        ChatConfig {
            common: core_config::Config { port },
            store: StoreConfig {
                backend: StoreBackend::Memory,
            },
            mongodb: MongoConfig {
                uri: String::new(),
                database: "portfolio".to_string(),
                collection: "Chat".to_string(),
                connect_timeout_secs: DEFAULT_CONNECT_TIMEOUT_SECS,
                operation_timeout_secs: DEFAULT_OPERATION_TIMEOUT_SECS,
            },
            public_base_url: None,
        }
    }
}

impl std::str::FromStr for StoreBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "mongo" | "mongodb" => Ok(StoreBackend::Mongo),
            "memory" => Ok(StoreBackend::Memory),
            _ => Err(format!("Invalid chat store backend: {}", s)),
        }
    }
}

fn parse_secs(key: &str, default: u64, is_prod: bool) -> Result<u64, AppError> {
    let raw = get_env(key, Some(&default.to_string()), is_prod)?;
    raw.parse::<u64>()
        .ok()
        .filter(|secs| *secs > 0)
        .ok_or_else(|| {
            AppError::ConfigError(anyhow::anyhow!(
                "{} must be a positive number of seconds, got '{}'",
                key,
                raw
            ))
        })
}

fn get_env(key: &str, default: Option<&str>, is_prod: bool) -> Result<String, AppError> {
    match env::var(key) {
        Ok(val) => Ok(val),
        Err(_) => {
            if is_prod {
                Err(AppError::ConfigError(anyhow::anyhow!(
                    "{} is required in production but not set",
                    key
                )))
            } else if let Some(def) = default {
                Ok(def.to_string())
            } else {
                Err(AppError::ConfigError(anyhow::anyhow!(
                    "{} is required but not set",
                    key
                )))
            }
        }
    }
}
