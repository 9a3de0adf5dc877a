use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::ids::EventId;
use crate::PLATFORM;

/// Default `source` tag on outbound events.
pub const DEFAULT_EVENT_SOURCE: &str = "zhilian";

/// Milliseconds since the Unix epoch, the timestamp unit of the control plane.
pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// What an outbound event describes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventCategory {
    ChatMessage,
    CandidateInfo,
    InteractionEvent,
    Heartbeat,
    WebsocketMessage,
}

impl EventCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ChatMessage => "chat_message",
            Self::CandidateInfo => "candidate_info",
            Self::InteractionEvent => "interaction_event",
            Self::Heartbeat => "heartbeat",
            Self::WebsocketMessage => "websocket_message",
        }
    }
}

impl std::fmt::Display for EventCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A structured event relayed to the control plane.
///
/// Fields are private: an event is immutable once built and moves through the
/// forwarder queue by value. The wire form keeps the control plane's historical
/// field names (`type`, `timestamp`, `data`).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OutboundEvent {
    #[serde(default)]
    id: EventId,
    #[serde(default = "default_source")]
    source: String,
    #[serde(rename = "type")]
    category: EventCategory,
    #[serde(rename = "timestamp", default = "Utc::now", with = "chrono::serde::ts_milliseconds")]
    created_at: DateTime<Utc>,
    #[serde(rename = "data", default)]
    payload: Value,
}

fn default_source() -> String {
    DEFAULT_EVENT_SOURCE.to_string()
}

impl OutboundEvent {
    pub fn new(category: EventCategory, payload: Value) -> Self {
        Self {
            id: EventId::new(),
            source: default_source(),
            category,
            created_at: Utc::now(),
            payload,
        }
    }

    pub fn with_id(mut self, id: EventId) -> Self {
        self.id = id;
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = source.into();
        self
    }

    /// A chat message seen on the site.
    pub fn chat_message(message: ChatMessage) -> Self {
        Self::new(EventCategory::ChatMessage, message.into_payload())
    }

    /// A candidate record as extracted by the scraping collaborator.
    pub fn candidate_info(candidate: Value) -> Self {
        Self::new(EventCategory::CandidateInfo, candidate)
    }

    /// An interaction performed against a candidate (greeting, resume view, ...).
    pub fn interaction(event_type: &str, candidate_id: &str, details: Option<Value>) -> Self {
        Self::new(
            EventCategory::InteractionEvent,
            json!({
                "event_type": event_type,
                "candidate_id": candidate_id,
                "platform": PLATFORM,
                "timestamp": now_millis(),
                "details": details.unwrap_or_else(|| json!({})),
            }),
        )
    }

    /// A frame received on the realtime channel, forwarded verbatim.
    pub fn websocket_message(frame: Value) -> Self {
        Self::new(EventCategory::WebsocketMessage, frame)
    }

    pub fn id(&self) -> &EventId {
        &self.id
    }

    pub fn category(&self) -> EventCategory {
        self.category
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn payload(&self) -> &Value {
        &self.payload
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

/// A chat message to forward. `message_id` falls back to a timestamped id.
#[derive(Clone, Debug, Default)]
pub struct ChatMessage {
    pub message_id: Option<String>,
    pub chat_id: Option<String>,
    pub sender_id: String,
    pub recipient_id: String,
    pub content: String,
}

impl ChatMessage {
    fn into_payload(self) -> Value {
        let now = now_millis();
        let message_id = self
            .message_id
            .filter(|id| !id.is_empty())
            .unwrap_or_else(|| format!("{PLATFORM}_{now}"));
        json!({
            "message_id": message_id,
            "chat_id": self.chat_id,
            "sender_id": self.sender_id,
            "recipient_id": self.recipient_id,
            "content": self.content,
            "platform": PLATFORM,
            "timestamp": now,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_form_uses_control_plane_names() {
        let event = OutboundEvent::new(EventCategory::CandidateInfo, json!({"name": "Li"}));
        let wire = serde_json::to_value(&event).unwrap();
        assert_eq!(wire["type"], "candidate_info");
        assert_eq!(wire["source"], "zhilian");
        assert_eq!(wire["data"]["name"], "Li");
        assert!(wire["timestamp"].is_i64());
        assert!(wire["id"].as_str().unwrap().starts_with("evt_"));
    }

    #[test]
    fn missing_id_is_generated_on_deserialize() {
        let event: OutboundEvent =
            serde_json::from_value(json!({"type": "heartbeat", "timestamp": 1_700_000_000_000_i64}))
                .unwrap();
        assert!(event.id().as_str().starts_with("evt_"));
        assert_eq!(event.category(), EventCategory::Heartbeat);
        assert_eq!(event.created_at().timestamp_millis(), 1_700_000_000_000);
        assert!(event.payload().is_null());
    }

    #[test]
    fn chat_message_defaults_message_id() {
        let event = OutboundEvent::chat_message(ChatMessage {
            sender_id: "alice".into(),
            recipient_id: "bot".into(),
            content: "hello".into(),
            ..Default::default()
        });
        let payload = event.payload();
        assert!(payload["message_id"].as_str().unwrap().starts_with("zhilian_"));
        assert_eq!(payload["platform"], "zhilian");
        assert!(payload["chat_id"].is_null());
        assert_eq!(event.category(), EventCategory::ChatMessage);
    }

    #[test]
    fn empty_message_id_is_replaced() {
        let event = OutboundEvent::chat_message(ChatMessage {
            message_id: Some(String::new()),
            chat_id: Some("c1".into()),
            ..Default::default()
        });
        assert_ne!(event.payload()["message_id"], "");
        assert_eq!(event.payload()["chat_id"], "c1");
    }

    #[test]
    fn interaction_defaults_details_to_empty_object() {
        let event = OutboundEvent::interaction("greeting", "cand-1", None);
        assert_eq!(event.payload()["event_type"], "greeting");
        assert_eq!(event.payload()["candidate_id"], "cand-1");
        assert_eq!(event.payload()["details"], json!({}));
    }

    #[test]
    fn builder_overrides_id_and_source() {
        let id = EventId::from_raw("evt_fixed");
        let event = OutboundEvent::websocket_message(json!({"type": "msg"}))
            .with_id(id.clone())
            .with_source("zhilian_bot");
        assert_eq!(event.id(), &id);
        assert_eq!(event.source(), "zhilian_bot");
    }

    #[test]
    fn category_strings_match_serde() {
        for category in [
            EventCategory::ChatMessage,
            EventCategory::CandidateInfo,
            EventCategory::InteractionEvent,
            EventCategory::Heartbeat,
            EventCategory::WebsocketMessage,
        ] {
            let json = serde_json::to_value(category).unwrap();
            assert_eq!(json, category.as_str());
        }
    }
}
