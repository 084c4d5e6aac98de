//! Client-side chat session bookkeeping.
//!
//! A [`SessionManager`] keeps the current session ID and the caller's IP in
//! two tiers: a short-lived one consulted first and a long-lived one that
//! survives restarts. Storage failures are logged and never surface.

use crate::error::{ClientError, Result};
use crate::ip::{mock_ip_address, IpResolver};
use rand::Rng;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

pub const SESSION_KEY: &str = "chat_session_id";
pub const IP_KEY: &str = "chat_ip_address";

const BASE36: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
const RANDOM_SUFFIX_LEN: usize = 13;

/// A string key/value store.
pub trait SessionStorage: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>>;
    fn set(&self, key: &str, value: &str) -> Result<()>;
    fn remove(&self, key: &str) -> Result<()>;
}

/// Process-lifetime storage.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, String>>> {
        self.entries
            .lock()
            .map_err(|_| ClientError::Storage("memory storage lock poisoned".to_string()))
    }
}

impl SessionStorage for MemoryStorage {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.lock()?.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.lock()?.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.lock()?.remove(key);
        Ok(())
    }
}

/// A JSON object persisted to a single file. A missing file reads as empty.
#[derive(Debug)]
pub struct FileStorage {
    path: PathBuf,
    guard: Mutex<()>,
}

impl FileStorage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            guard: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> Result<HashMap<String, String>> {
        match fs::read_to_string(&self.path) {
            Ok(raw) if raw.trim().is_empty() => Ok(HashMap::new()),
            Ok(raw) => Ok(serde_json::from_str(&raw)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(HashMap::new()),
            Err(e) => Err(e.into()),
        }
    }

    fn store(&self, entries: &HashMap<String, String>) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, serde_json::to_vec_pretty(entries)?)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    fn update(&self, apply: impl FnOnce(&mut HashMap<String, String>)) -> Result<()> {
        let _guard = self
            .guard
            .lock()
            .map_err(|_| ClientError::Storage("file storage lock poisoned".to_string()))?;
        let mut entries = self.load()?;
        apply(&mut entries);
        self.store(&entries)
    }
}

impl SessionStorage for FileStorage {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.load()?.remove(key))
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.update(|entries| {
            entries.insert(key.to_string(), value.to_string());
        })
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.update(|entries| {
            entries.remove(key);
        })
    }
}

/// Mint an ID of the form `session_<base36 millis>_<13 base36 chars>`.
pub fn new_session_id() -> String {
    let millis = chrono::Utc::now().timestamp_millis().max(0) as u64;
    let mut rng = rand::thread_rng();
    let suffix: String = (0..RANDOM_SUFFIX_LEN)
        .map(|_| BASE36[rng.gen_range(0..BASE36.len())] as char)
        .collect();
    format!("session_{}_{}", to_base36(millis), suffix)
}

fn to_base36(mut value: u64) -> String {
    if value == 0 {
        return "0".to_string();
    }
    let mut digits = Vec::new();
    while value > 0 {
        digits.push(BASE36[(value % 36) as usize]);
        value /= 36;
    }
    digits.reverse();
    String::from_utf8_lossy(&digits).into_owned()
}

pub struct SessionManager<S, L> {
    short_lived: S,
    long_lived: L,
}

impl<S: SessionStorage, L: SessionStorage> SessionManager<S, L> {
    pub fn new(short_lived: S, long_lived: L) -> Self {
        Self {
            short_lived,
            long_lived,
        }
    }

    /// Mint a new session ID and persist it to both tiers. A cached IP is kept.
    pub fn generate_session_id(&self) -> String {
        let session_id = new_session_id();
        self.write(SESSION_KEY, &session_id);
        tracing::debug!(session_id = %session_id, "Generated chat session");
        session_id
    }

    pub fn current_session_id(&self) -> Option<String> {
        self.read(SESSION_KEY)
    }

    pub fn ensure_session(&self) -> String {
        self.current_session_id()
            .unwrap_or_else(|| self.generate_session_id())
    }

    pub fn clear_session(&self) {
        self.erase(SESSION_KEY);
    }

    pub fn is_new_session(&self) -> bool {
        self.current_session_id().is_none()
    }

    pub fn ip_address(&self) -> Option<String> {
        self.read(IP_KEY)
    }

    pub fn set_ip_address(&self, ip_address: &str) {
        self.write(IP_KEY, ip_address);
    }

    /// The cached IP, else the resolver's answer, else a mock address.
    /// Whatever is returned gets cached.
    pub async fn resolve_ip_address<R>(&self, resolver: &R) -> String
    where
        R: IpResolver + ?Sized,
    {
        if let Some(cached) = self.ip_address() {
            return cached;
        }

        let ip_address = match resolver.resolve().await {
            Ok(ip) => ip,
            Err(e) => {
                let mock = mock_ip_address();
                tracing::warn!(error = %e, mock_ip = %mock, "Could not resolve IP address, using mock");
                mock
            }
        };

        self.set_ip_address(&ip_address);
        ip_address
    }

    fn read(&self, key: &str) -> Option<String> {
        match self.short_lived.get(key) {
            Ok(Some(value)) => return Some(value),
            Ok(None) => {}
            Err(e) => tracing::warn!(key, error = %e, "Could not read short-lived session storage"),
        }
        match self.long_lived.get(key) {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!(key, error = %e, "Could not read long-lived session storage");
                None
            }
        }
    }

    fn write(&self, key: &str, value: &str) {
        if let Err(e) = self.short_lived.set(key, value) {
            tracing::warn!(key, error = %e, "Could not write short-lived session storage");
        }
        if let Err(e) = self.long_lived.set(key, value) {
            tracing::warn!(key, error = %e, "Could not write long-lived session storage");
        }
    }

    fn erase(&self, key: &str) {
        if let Err(e) = self.short_lived.remove(key) {
            tracing::warn!(key, error = %e, "Could not clear short-lived session storage");
        }
        if let Err(e) = self.long_lived.remove(key) {
            tracing::warn!(key, error = %e, "Could not clear long-lived session storage");
        }
    }
}
