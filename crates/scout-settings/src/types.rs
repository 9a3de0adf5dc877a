//! Settings sections.
//!
//! Every section deserializes with `#[serde(default)]`, so a settings file only
//! needs the keys it overrides. Durations are stored in milliseconds.

use serde::{Deserialize, Serialize};

/// Root settings value.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ScoutSettings {
    /// Control-plane server connection.
    pub control_plane: ControlPlaneSettings,
    /// Outbound forwarding pipeline.
    pub forwarder: ForwarderSettings,
    /// Realtime (WebSocket) channel to the recruitment site.
    pub realtime: RealtimeSettings,
    /// Command dispatch.
    pub commands: CommandSettings,
    /// Chat monitoring loop.
    pub monitor: MonitorSettings,
    /// Identity reported on bot registration.
    pub bot: BotSettings,
    /// Site session and automation pacing.
    pub site: SiteSettings,
    /// Logging output and persistence.
    pub logging: LoggingSettings,
}

/// Control-plane HTTP settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ControlPlaneSettings {
    /// Base URL; forwarding is disabled when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Bearer token sent with every request.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    /// `User-Agent` header for control-plane requests.
    pub user_agent: String,
    /// Timeout for batch and registration posts.
    pub batch_timeout_ms: u64,
    /// Timeout for heartbeat, command and health requests.
    pub request_timeout_ms: u64,
    /// Period of the control-plane heartbeat timer; 0 disables it.
    pub heartbeat_interval_ms: u64,
}

impl Default for ControlPlaneSettings {
    fn default() -> Self {
        Self {
            url: None,
            token: None,
            user_agent: "ZhilianBot/1.0".to_string(),
            batch_timeout_ms: 30_000,
            request_timeout_ms: 10_000,
            heartbeat_interval_ms: 60_000,
        }
    }
}

/// Outbound forwarder settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ForwarderSettings {
    /// Maximum events per batch.
    pub batch_size: usize,
    /// Sleep between delivery cycles.
    pub poll_interval_ms: u64,
    /// How long `stop` waits for the worker before aborting it.
    pub stop_timeout_ms: u64,
    /// Optional cap on queued events; the oldest is evicted when full.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_queue_size: Option<usize>,
    /// `source` field on batch envelopes.
    pub source: String,
}

impl Default for ForwarderSettings {
    fn default() -> Self {
        Self {
            batch_size: 10,
            poll_interval_ms: 500,
            stop_timeout_ms: 5_000,
            max_queue_size: None,
            source: "zhilian_bot".to_string(),
        }
    }
}

/// Realtime channel settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RealtimeSettings {
    /// Explicit WebSocket endpoint; otherwise resolved by the site collaborator.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoint_url: Option<String>,
    /// Raw `Cookie` header used by the offline session provider.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cookie: Option<String>,
    pub user_agent: String,
    pub origin: String,
    pub referer: String,
    pub connect_timeout_ms: u64,
    pub heartbeat_interval_ms: u64,
    pub reconnect_interval_ms: u64,
    pub max_reconnect_attempts: u32,
    /// Capacity of the inbound message ring buffer.
    pub history_capacity: usize,
    /// Upper bound on a single inbound handler invocation.
    pub handler_timeout_ms: u64,
}

impl Default for RealtimeSettings {
    fn default() -> Self {
        Self {
            endpoint_url: None,
            cookie: None,
            user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
                         (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36"
                .to_string(),
            origin: "https://i.zhaopin.com".to_string(),
            referer: "https://i.zhaopin.com/chat".to_string(),
            connect_timeout_ms: 10_000,
            heartbeat_interval_ms: 30_000,
            reconnect_interval_ms: 5_000,
            max_reconnect_attempts: 10,
            history_capacity: 50,
            handler_timeout_ms: 5_000,
        }
    }
}

/// Command dispatch settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CommandSettings {
    /// Upper bound on a single command handler invocation.
    pub handler_timeout_ms: u64,
}

impl Default for CommandSettings {
    fn default() -> Self {
        Self {
            handler_timeout_ms: 120_000,
        }
    }
}

/// Chat monitoring loop settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MonitorSettings {
    pub interval_ms: u64,
    pub error_backoff_ms: u64,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            interval_ms: 5_000,
            error_backoff_ms: 10_000,
        }
    }
}

/// Identity reported to `/bots/register`.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BotSettings {
    /// Fixed bot id; defaults to `zhilian_bot_<epoch seconds>` at startup.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bot_id: Option<String>,
    pub name: String,
    pub version: String,
    pub capabilities: Vec<String>,
}

impl Default for BotSettings {
    fn default() -> Self {
        Self {
            bot_id: None,
            name: "Zhilian Recruitment Bot".to_string(),
            version: "1.0.0".to_string(),
            capabilities: [
                "candidate_search",
                "message_sending",
                "real_time_chat",
                "profile_extraction",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
        }
    }
}

/// How the site session is established.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoginType {
    /// SMS verification code.
    #[default]
    Sms,
    /// QR code scan.
    Qrcode,
}

/// Site session and pacing settings consumed by the collaborators.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SiteSettings {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    pub login_type: LoginType,
    pub headless: bool,
    pub browser_timeout_ms: u64,
    /// Pause between consecutive site requests.
    pub request_delay_ms: u64,
    pub max_retry_attempts: u32,
}

impl Default for SiteSettings {
    fn default() -> Self {
        Self {
            username: None,
            login_type: LoginType::Sms,
            headless: false,
            browser_timeout_ms: 30_000,
            request_delay_ms: 1_000,
            max_retry_attempts: 3,
        }
    }
}

/// Logging output settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Default filter level (`trace` .. `error`).
    pub level: String,
    /// Emit JSON lines instead of human-readable output.
    pub json: bool,
    /// SQLite file for persisted warn+ records; disabled when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub db_path: Option<String>,
    /// Persisted records older than this are pruned at startup.
    pub retention_days: u32,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
            db_path: None,
            retention_days: 7,
        }
    }
}
