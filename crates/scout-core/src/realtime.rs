use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Lifecycle of the realtime connection. Written only by the channel itself.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum ConnectionState {
    Disconnected = 0,
    Connecting = 1,
    Connected = 2,
    Reconnecting = 3,
    /// Reconnect attempts exhausted. Only an explicit `connect` leaves this state.
    Failed = 4,
}

impl ConnectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Reconnecting => "reconnecting",
            Self::Failed => "failed",
        }
    }

    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// Inverse of [`as_u8`](Self::as_u8); unknown values read as `Disconnected`.
    pub fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Connecting,
            2 => Self::Connected,
            3 => Self::Reconnecting,
            4 => Self::Failed,
            _ => Self::Disconnected,
        }
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A parsed frame received on the realtime channel.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct InboundMessage {
    pub received_at: DateTime<Utc>,
    pub raw_payload: String,
    pub data: Value,
}

impl InboundMessage {
    pub fn new(raw_payload: impl Into<String>, data: Value) -> Self {
        Self {
            received_at: Utc::now(),
            raw_payload: raw_payload.into(),
            data,
        }
    }

    /// The frame's `type` discriminator, if present.
    pub fn message_type(&self) -> Option<&str> {
        self.data.get("type").and_then(Value::as_str)
    }
}

/// Realtime endpoint, resolved outside the core (configuration or the site collaborator).
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Endpoint {
    pub url: String,
}

impl Endpoint {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

impl std::fmt::Display for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.url)
    }
}

/// Opaque session material attached to the realtime handshake.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AuthContext {
    pub cookies: Vec<(String, String)>,
    pub headers: Vec<(String, String)>,
    pub user_agent: Option<String>,
    pub origin: Option<String>,
    pub referer: Option<String>,
}

impl AuthContext {
    /// Parse a raw `name=value; name2=value2` cookie string.
    pub fn from_cookie_header(raw: &str) -> Self {
        let cookies = raw
            .split(';')
            .filter_map(|pair| {
                let (name, value) = pair.trim().split_once('=')?;
                let name = name.trim();
                (!name.is_empty()).then(|| (name.to_string(), value.trim().to_string()))
            })
            .collect();
        Self {
            cookies,
            ..Default::default()
        }
    }

    /// `Cookie:` header value, or `None` when there are no cookies.
    pub fn cookie_header(&self) -> Option<String> {
        if self.cookies.is_empty() {
            return None;
        }
        Some(
            self.cookies
                .iter()
                .map(|(name, value)| format!("{name}={value}"))
                .collect::<Vec<_>>()
                .join("; "),
        )
    }

    /// All handshake headers in the order they should be sent.
    pub fn handshake_headers(&self) -> Vec<(String, String)> {
        let mut headers = Vec::new();
        if let Some(cookie) = self.cookie_header() {
            headers.push(("Cookie".to_string(), cookie));
        }
        if let Some(ua) = &self.user_agent {
            headers.push(("User-Agent".to_string(), ua.clone()));
        }
        if let Some(origin) = &self.origin {
            headers.push(("Origin".to_string(), origin.clone()));
        }
        if let Some(referer) = &self.referer {
            headers.push(("Referer".to_string(), referer.clone()));
        }
        headers.extend(self.headers.iter().cloned());
        headers
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn state_u8_roundtrip() {
        for state in [
            ConnectionState::Disconnected,
            ConnectionState::Connecting,
            ConnectionState::Connected,
            ConnectionState::Reconnecting,
            ConnectionState::Failed,
        ] {
            assert_eq!(ConnectionState::from_u8(state.as_u8()), state);
        }
        assert_eq!(ConnectionState::from_u8(200), ConnectionState::Disconnected);
    }

    #[test]
    fn state_serializes_snake_case() {
        assert_eq!(serde_json::to_value(ConnectionState::Reconnecting).unwrap(), "reconnecting");
    }

    #[test]
    fn inbound_message_type() {
        let msg = InboundMessage::new(r#"{"type":"chat"}"#, json!({"type": "chat"}));
        assert_eq!(msg.message_type(), Some("chat"));
        let untyped = InboundMessage::new("[1]", json!([1]));
        assert_eq!(untyped.message_type(), None);
    }

    #[test]
    fn cookie_header_parsing() {
        let auth = AuthContext::from_cookie_header("a=1; b=two ;; =bad; c=x=y");
        assert_eq!(auth.cookie_header().as_deref(), Some("a=1; b=two; c=x=y"));
    }

    #[test]
    fn no_cookies_no_header() {
        assert!(AuthContext::default().cookie_header().is_none());
        assert!(AuthContext::default().handshake_headers().is_empty());
    }

    #[test]
    fn handshake_headers_order() {
        let auth = AuthContext {
            cookies: vec![("sid".into(), "1".into())],
            headers: vec![("X-Extra".into(), "y".into())],
            user_agent: Some("ua".into()),
            origin: Some("https://example.test".into()),
            referer: None,
        };
        let names: Vec<_> = auth.handshake_headers().into_iter().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["Cookie", "User-Agent", "Origin", "X-Extra"]);
    }
}
