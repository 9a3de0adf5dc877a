use std::time::Duration;

use reqwest::{Client, RequestBuilder, Response, Url};
use scout_core::{Acknowledgement, Command, ControlPlaneError};
use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;
use tracing::{debug, warn};

use crate::wire::{BatchEnvelope, BotDescriptor, HeartbeatBody};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Connection settings for the control-plane server.
#[derive(Clone)]
pub struct ControlPlaneConfig {
    /// Base URL; every call fails with `NotConfigured` when unset.
    pub base_url: Option<String>,
    pub token: Option<SecretString>,
    pub user_agent: String,
    /// Timeout for batch and registration posts.
    pub batch_timeout: Duration,
    /// Timeout for heartbeat, command and health requests.
    pub request_timeout: Duration,
}

impl Default for ControlPlaneConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            token: None,
            user_agent: "ZhilianBot/1.0".to_string(),
            batch_timeout: Duration::from_secs(30),
            request_timeout: Duration::from_secs(10),
        }
    }
}

impl std::fmt::Debug for ControlPlaneConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ControlPlaneConfig")
            .field("base_url", &self.base_url)
            .field("token", &self.token.as_ref().map(|_| "***"))
            .field("user_agent", &self.user_agent)
            .field("batch_timeout", &self.batch_timeout)
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}

/// Thin HTTP client for the control-plane endpoints.
///
/// Every call makes exactly one attempt. Failures come back classified so
/// callers can decide between dropping and requeueing.
pub struct ControlPlaneClient {
    http: Client,
    config: ControlPlaneConfig,
}

impl ControlPlaneClient {
    pub fn new(config: ControlPlaneConfig) -> Self {
        let http = Client::builder()
            .user_agent(config.user_agent.clone())
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .unwrap_or_else(|e| {
                warn!(error = %e, "failed to build HTTP client, using defaults");
                Client::new()
            });
        Self { http, config }
    }

    pub fn is_configured(&self) -> bool {
        self.config.base_url.is_some()
    }

    pub fn base_url(&self) -> Option<&str> {
        self.config.base_url.as_deref()
    }

    pub fn has_auth_token(&self) -> bool {
        self.config.token.is_some()
    }

    /// `POST /messages/batch`.
    pub async fn post_batch(&self, batch: &BatchEnvelope<'_>) -> Result<(), ControlPlaneError> {
        let url = self.url(&["messages", "batch"])?;
        let _ = self
            .execute(self.http.post(url).json(batch), self.config.batch_timeout)
            .await?;
        Ok(())
    }

    /// `POST /heartbeat`.
    pub async fn heartbeat(&self, source: &str) -> Result<(), ControlPlaneError> {
        let url = self.url(&["heartbeat"])?;
        let body = HeartbeatBody::online(source);
        let _ = self
            .execute(self.http.post(url).json(&body), self.config.request_timeout)
            .await?;
        Ok(())
    }

    /// `POST /bots/register`.
    pub async fn register(&self, bot: &BotDescriptor) -> Result<(), ControlPlaneError> {
        let url = self.url(&["bots", "register"])?;
        let _ = self
            .execute(self.http.post(url).json(bot), self.config.batch_timeout)
            .await?;
        Ok(())
    }

    /// `GET /commands/pending`. Entries that do not parse as a command are
    /// skipped.
    pub async fn pending_commands(&self) -> Result<Vec<Command>, ControlPlaneError> {
        let url = self.url(&["commands", "pending"])?;
        let response = self
            .execute(self.http.get(url), self.config.request_timeout)
            .await?;
        let body: Value = response
            .json()
            .await
            .map_err(|e| ControlPlaneError::Decode(e.to_string()))?;
        Ok(parse_commands(body))
    }

    /// `POST /commands/{id}/ack`.
    pub async fn acknowledge(&self, ack: &Acknowledgement) -> Result<(), ControlPlaneError> {
        let url = self.url(&["commands", &ack.command_id.to_string(), "ack"])?;
        let _ = self
            .execute(self.http.post(url).json(ack), self.config.request_timeout)
            .await?;
        Ok(())
    }

    /// `GET /health`.
    pub async fn health(&self) -> Result<(), ControlPlaneError> {
        let url = self.url(&["health"])?;
        let _ = self
            .execute(self.http.get(url), self.config.request_timeout)
            .await?;
        Ok(())
    }

    /// Join path segments onto the base URL, percent-encoding each one.
    fn url(&self, segments: &[&str]) -> Result<Url, ControlPlaneError> {
        let base = self
            .config
            .base_url
            .as_deref()
            .ok_or(ControlPlaneError::NotConfigured)?;
        let mut url = Url::parse(base).map_err(|e| ControlPlaneError::InvalidUrl(format!("{base}: {e}")))?;
        url.path_segments_mut()
            .map_err(|()| ControlPlaneError::InvalidUrl(base.to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn execute(&self, mut req: RequestBuilder, timeout: Duration) -> Result<Response, ControlPlaneError> {
        if let Some(token) = &self.config.token {
            req = req.header("Authorization", format!("Bearer {}", token.expose_secret()));
        }
        let response = req.timeout(timeout).send().await.map_err(|e| {
            if e.is_timeout() {
                ControlPlaneError::Timeout(timeout)
            } else {
                ControlPlaneError::Network(e.to_string())
            }
        })?;

        let status = response.status();
        if status.is_success() {
            debug!(status = status.as_u16(), url = %response.url(), "control plane request ok");
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(ControlPlaneError::from_status(status.as_u16(), truncate(body)))
    }
}

fn parse_commands(body: Value) -> Vec<Command> {
    let entries = match body.get("commands") {
        Some(Value::Array(entries)) => entries.clone(),
        Some(Value::Null) | None => return Vec::new(),
        Some(other) => {
            warn!(kind = json_kind(other), "pending commands is not a list, ignoring");
            return Vec::new();
        }
    };
    entries
        .into_iter()
        .filter_map(|entry| match serde_json::from_value::<Command>(entry) {
            Ok(command) => Some(command),
            Err(e) => {
                warn!(error = %e, "skipping malformed command");
                None
            }
        })
        .collect()
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Keep error bodies short enough for a log line.
fn truncate(mut body: String) -> String {
    const MAX: usize = 512;
    if body.len() > MAX {
        let mut cut = MAX;
        while !body.is_char_boundary(cut) {
            cut -= 1;
        }
        body.truncate(cut);
    }
    body
}
