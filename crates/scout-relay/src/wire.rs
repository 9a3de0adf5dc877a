//! Request bodies exchanged with the control plane.

use scout_core::{now_millis, BatchId, OutboundEvent};
use serde::Serialize;

/// Body of `POST /messages/batch`.
#[derive(Clone, Debug, Serialize)]
pub struct BatchEnvelope<'a> {
    pub messages: &'a [OutboundEvent],
    pub batch_id: BatchId,
    pub source: &'a str,
    pub timestamp: i64,
}

impl<'a> BatchEnvelope<'a> {
    pub fn new(messages: &'a [OutboundEvent], source: &'a str) -> Self {
        Self {
            messages,
            batch_id: BatchId::new(),
            source,
            timestamp: now_millis(),
        }
    }
}

/// Body of `POST /heartbeat`.
#[derive(Clone, Debug, Serialize)]
pub struct HeartbeatBody<'a> {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub source: &'a str,
    pub timestamp: i64,
    pub status: &'static str,
}

impl<'a> HeartbeatBody<'a> {
    pub fn online(source: &'a str) -> Self {
        Self {
            kind: "heartbeat",
            source,
            timestamp: now_millis(),
            status: "online",
        }
    }
}

/// Body of `POST /bots/register`.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct BotDescriptor {
    pub bot_type: String,
    pub bot_id: String,
    pub name: String,
    pub version: String,
    pub capabilities: Vec<String>,
    pub status: String,
    pub timestamp: i64,
}

impl BotDescriptor {
    /// A descriptor in the `online` state. Without an explicit id the bot is
    /// named `<bot_type>_bot_<epoch seconds>`.
    pub fn new(
        bot_type: &str,
        bot_id: Option<String>,
        name: impl Into<String>,
        version: impl Into<String>,
        capabilities: Vec<String>,
    ) -> Self {
        let bot_id = bot_id
            .filter(|id| !id.is_empty())
            .unwrap_or_else(|| format!("{bot_type}_bot_{}", chrono::Utc::now().timestamp()));
        Self {
            bot_type: bot_type.to_string(),
            bot_id,
            name: name.into(),
            version: version.into(),
            capabilities,
            status: "online".to_string(),
            timestamp: now_millis(),
        }
    }
}
