//! Public IP discovery for chat clients.

use crate::error::{ClientError, Result};
use async_trait::async_trait;
use rand::Rng;
use serde::Deserialize;
use std::time::Duration;

pub const DEFAULT_IP_LOOKUP_URL: &str = "https://api.ipify.org?format=json";

#[async_trait]
pub trait IpResolver: Send + Sync {
    async fn resolve(&self) -> Result<String>;
}

#[derive(Debug, Deserialize)]
struct IpLookup {
    ip: String,
}

/// Asks a lookup service that answers `{"ip": "..."}`.
#[derive(Debug, Clone)]
pub struct HttpIpResolver {
    client: reqwest::Client,
    url: String,
}

impl HttpIpResolver {
    pub fn new(url: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(5))
            .build()?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl IpResolver for HttpIpResolver {
    async fn resolve(&self) -> Result<String> {
        let lookup: IpLookup = self
            .client
            .get(&self.url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let ip = lookup.ip.trim().to_string();
        if ip.is_empty() {
            return Err(ClientError::Resolve("lookup returned an empty address".to_string()));
        }
        Ok(ip)
    }
}

/// Always answers with a fixed address, or always fails.
#[derive(Debug, Clone, Default)]
pub struct StaticIpResolver {
    ip: Option<String>,
}

impl StaticIpResolver {
    pub fn new(ip: Option<&str>) -> Self {
        Self {
            ip: ip.map(str::to_string),
        }
    }
}

#[async_trait]
impl IpResolver for StaticIpResolver {
    async fn resolve(&self) -> Result<String> {
        self.ip
            .clone()
            .ok_or_else(|| ClientError::Resolve("no IP address configured".to_string()))
    }
}

/// A private-range stand-in, `192.168.x.y` with `x, y` in `1..=254`.
pub fn mock_ip_address() -> String {
    let mut rng = rand::thread_rng();
    format!(
        "192.168.{}.{}",
        rng.gen_range(1..=254u8),
        rng.gen_range(1..=254u8)
    )
}
