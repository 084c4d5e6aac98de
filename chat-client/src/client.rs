//! HTTP client for the chat history API.

use crate::error::{ClientError, Result};
use crate::wire::{
    DeleteAck, Envelope, ErrorBody, HealthStatus, IpList, SaveMessage, SaveMessageAck, Session,
    SessionStats, Stats,
};
use reqwest::{Response, StatusCode, Url};
use serde::de::DeserializeOwned;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct ChatHistoryClient {
    http: reqwest::Client,
    base_url: Url,
}

impl ChatHistoryClient {
    pub fn new(base_url: impl AsRef<str>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()?;
        Self::with_client(http, base_url)
    }

    pub fn with_client(http: reqwest::Client, base_url: impl AsRef<str>) -> Result<Self> {
        let base_url = Url::parse(base_url.as_ref())
            .map_err(|e| ClientError::InvalidUrl(format!("{}: {}", base_url.as_ref(), e)))?;
        if base_url.cannot_be_a_base() {
            return Err(ClientError::InvalidUrl(format!(
                "{} cannot carry a path",
                base_url
            )));
        }
        Ok(Self { http, base_url })
    }

    /// `<base>/api/<segments...>`, each segment percent-encoded on its own.
    fn url<const N: usize>(&self, segments: [&str; N]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().push("api").extend(segments);
        }
        url
    }

    pub async fn save_message(&self, message: &SaveMessage) -> Result<SaveMessageAck> {
        let response = self
            .http
            .post(self.url(["chat", "message"]))
            .json(message)
            .send()
            .await?;
        decode(response).await
    }

    /// `Ok(None)` when the session does not exist.
    pub async fn session(&self, session_id: &str) -> Result<Option<Session>> {
        let response = self
            .http
            .get(self.url(["chat", "session", session_id]))
            .send()
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let envelope: Envelope<Session> = decode(response).await?;
        Ok(Some(envelope.data))
    }

    /// Per-session totals computed from the stored session. A missing
    /// session yields all zeros.
    pub async fn session_stats(&self, session_id: &str) -> Result<SessionStats> {
        Ok(self
            .session(session_id)
            .await?
            .map(|session| session.stats())
            .unwrap_or_default())
    }

    pub async fn history(&self, ip_address: &str, limit: Option<u32>) -> Result<Vec<Session>> {
        let mut request = self.http.get(self.url(["chat", "history", ip_address]));
        if let Some(limit) = limit {
            request = request.query(&[("limit", limit)]);
        }
        let envelope: Envelope<Vec<Session>> = decode(request.send().await?).await?;
        Ok(envelope.data)
    }

    pub async fn search(
        &self,
        query: &str,
        ip_address: Option<&str>,
        limit: Option<u32>,
    ) -> Result<Vec<Session>> {
        let mut params: Vec<(&str, String)> = vec![("query", query.to_string())];
        if let Some(ip) = ip_address {
            params.push(("ipAddress", ip.to_string()));
        }
        if let Some(limit) = limit {
            params.push(("limit", limit.to_string()));
        }

        let response = self
            .http
            .get(self.url(["chat", "search"]))
            .query(&params)
            .send()
            .await?;
        let envelope: Envelope<Vec<Session>> = decode(response).await?;
        Ok(envelope.data)
    }

    pub async fn stats(&self, ip_address: &str) -> Result<Stats> {
        let response = self
            .http
            .get(self.url(["chat", "stats", ip_address]))
            .send()
            .await?;
        let envelope: Envelope<Stats> = decode(response).await?;
        Ok(envelope.data)
    }

    /// Returns the number of deleted sessions.
    pub async fn delete_by_ip(&self, ip_address: &str) -> Result<u64> {
        let response = self
            .http
            .delete(self.url(["chat", "ip", ip_address]))
            .send()
            .await?;
        let ack: DeleteAck = decode(response).await?;
        Ok(ack.deleted_count)
    }

    pub async fn ips(&self, limit: Option<u32>) -> Result<IpList> {
        let mut request = self.http.get(self.url(["chat", "ips"]));
        if let Some(limit) = limit {
            request = request.query(&[("limit", limit)]);
        }
        decode(request.send().await?).await
    }

    /// `true` only when the service reports `status: "OK"`. Transport
    /// failures and unhealthy answers are both `false`.
    pub async fn health(&self) -> bool {
        let response = match self.http.get(self.url(["health"])).send().await {
            Ok(response) => response,
            Err(e) => {
                tracing::debug!(error = %e, "Health check request failed");
                return false;
            }
        };
        match response.json::<HealthStatus>().await {
            Ok(body) => body.status == "OK",
            Err(e) => {
                tracing::debug!(error = %e, "Health check returned an unreadable body");
                false
            }
        }
    }
}

async fn decode<T: DeserializeOwned>(response: Response) -> Result<T> {
    let status = response.status();
    if status.is_success() {
        return Ok(response.json().await?);
    }

    let message = match response.json::<ErrorBody>().await {
        Ok(body) => body.error,
        Err(_) => status.canonical_reason().unwrap_or("unknown error").to_string(),
    };
    tracing::debug!(status = status.as_u16(), %message, "Chat history request failed");
    Err(ClientError::Api {
        status: status.as_u16(),
        message,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(base: &str) -> ChatHistoryClient {
        ChatHistoryClient::new(base).unwrap()
    }

    #[test]
    fn path_segments_are_encoded_one_by_one() {
        let api = client("http://localhost:3001");
        assert_eq!(
            api.url(["chat", "session", "team/alpha"]).as_str(),
            "http://localhost:3001/api/chat/session/team%2Falpha"
        );
        assert_eq!(
            api.url(["chat", "session", "q?x#y"]).as_str(),
            "http://localhost:3001/api/chat/session/q%3Fx%23y"
        );
    }

    #[test]
    fn base_path_is_kept_without_doubled_slashes() {
        let api = client("https://example.com/chat-history/");
        assert_eq!(
            api.url(["chat", "ips"]).as_str(),
            "https://example.com/chat-history/api/chat/ips"
        );
    }

    #[test]
    fn unusable_base_urls_are_rejected() {
        assert!(matches!(
            ChatHistoryClient::new("not a url"),
            Err(ClientError::InvalidUrl(_))
        ));
        assert!(matches!(
            ChatHistoryClient::new("mailto:someone@example.com"),
            Err(ClientError::InvalidUrl(_))
        ));
    }
}
