//! WebSocket channel to the site's live-update endpoint.
//!
//! One supervisor task owns the read half of the socket for the lifetime of a
//! `connect` call. It dispatches inbound frames and, when the transport is
//! lost, runs the reconnect loop inline and resumes reading. A separate task
//! sends application-level pings. Both tasks carry the generation number of the
//! `connect` that spawned them and exit once it is superseded.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use scout_core::{now_millis, AuthContext, ConnectionState, Endpoint, InboundMessage};
use serde::Serialize;
use serde_json::{json, Value};
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::{HeaderName, HeaderValue};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, info, warn};

use crate::error::RealtimeError;
use crate::handlers::{HandlerId, HandlerRegistry, MessageHandler};
use crate::history::MessageHistory;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, Message>;
type WsSource = SplitStream<WsStream>;

const CLOSE_TIMEOUT: Duration = Duration::from_secs(2);

/// Tunables for [`RealtimeChannel`].
#[derive(Clone, Debug)]
pub struct RealtimeConfig {
    pub connect_timeout: Duration,
    pub heartbeat_interval: Duration,
    pub reconnect_interval: Duration,
    pub max_reconnect_attempts: u32,
    pub history_capacity: usize,
    pub handler_timeout: Duration,
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            heartbeat_interval: Duration::from_secs(30),
            reconnect_interval: Duration::from_secs(5),
            max_reconnect_attempts: 10,
            history_capacity: 50,
            handler_timeout: Duration::from_secs(5),
        }
    }
}

/// Long-lived WebSocket client with heartbeat, bounded reconnect and
/// isolated handler dispatch. Cheap to clone; clones share one connection.
#[derive(Clone)]
pub struct RealtimeChannel {
    inner: Arc<Inner>,
}

struct Inner {
    config: RealtimeConfig,
    state: AtomicU8,
    running: AtomicBool,
    generation: AtomicU64,
    reconnect_attempts: AtomicU32,
    writer: tokio::sync::Mutex<Option<WsSink>>,
    target: parking_lot::Mutex<Option<(Endpoint, AuthContext)>>,
    tasks: parking_lot::Mutex<Vec<JoinHandle<()>>>,
    handlers: HandlerRegistry,
    history: MessageHistory,
}

impl RealtimeChannel {
    pub fn new(config: RealtimeConfig) -> Self {
        let handlers = HandlerRegistry::new(config.handler_timeout);
        let history = MessageHistory::new(config.history_capacity);
        Self {
            inner: Arc::new(Inner {
                config,
                state: AtomicU8::new(ConnectionState::Disconnected.as_u8()),
                running: AtomicBool::new(false),
                generation: AtomicU64::new(0),
                reconnect_attempts: AtomicU32::new(0),
                writer: tokio::sync::Mutex::new(None),
                target: parking_lot::Mutex::new(None),
                tasks: parking_lot::Mutex::new(Vec::new()),
                handlers,
                history,
            }),
        }
    }

    /// Open the connection. Replaces any existing connection.
    ///
    /// Returns `false` when the endpoint cannot be opened within the connect
    /// timeout; the channel is then left `Disconnected` and is not retried.
    pub async fn connect(&self, endpoint: Endpoint, auth: AuthContext) -> bool {
        let inner = &self.inner;
        inner.teardown().await;

        let generation = inner.generation.fetch_add(1, Ordering::SeqCst) + 1;
        inner.running.store(true, Ordering::SeqCst);
        inner.set_state(ConnectionState::Connecting);
        info!(endpoint = %endpoint, "connecting realtime channel");

        let ws = match open(&inner.config, &endpoint, &auth).await {
            Ok(ws) => ws,
            Err(e) => {
                warn!(endpoint = %endpoint, error = %e, kind = e.error_kind(), "realtime connect failed");
                inner.running.store(false, Ordering::SeqCst);
                inner.set_state(ConnectionState::Disconnected);
                return false;
            }
        };

        let (sink, source) = ws.split();
        *inner.writer.lock().await = Some(sink);
        *inner.target.lock() = Some((endpoint.clone(), auth));
        inner.reconnect_attempts.store(0, Ordering::SeqCst);
        inner.set_state(ConnectionState::Connected);

        let supervisor = spawn_supervisor(Arc::clone(inner), source, generation);
        let mut tasks = inner.tasks.lock();
        tasks.push(supervisor);
        if inner.config.heartbeat_interval.is_zero() {
            warn!("heartbeat interval is zero, heartbeat disabled");
        } else {
            tasks.push(spawn_heartbeat(Arc::clone(inner), generation));
        }
        drop(tasks);

        info!(endpoint = %endpoint, "realtime channel connected");
        true
    }

    /// Serialize and write one frame. Fails immediately unless connected.
    pub async fn try_send<T: Serialize + ?Sized>(&self, message: &T) -> Result<(), RealtimeError> {
        self.inner.write(message).await
    }

    /// Best-effort [`try_send`](Self::try_send); failures are logged.
    pub async fn send<T: Serialize + ?Sized>(&self, message: &T) -> bool {
        match self.try_send(message).await {
            Ok(()) => true,
            Err(RealtimeError::NotConnected) => {
                debug!(state = %self.state(), "realtime send skipped, not connected");
                false
            }
            Err(e) => {
                warn!(error = %e, kind = e.error_kind(), "realtime send failed");
                false
            }
        }
    }

    /// Send a chat message to a site user.
    pub async fn send_chat_message(&self, recipient_id: &str, content: &str, message_type: &str) -> bool {
        let frame = json!({
            "type": "chat_message",
            "recipient_id": recipient_id,
            "content": content,
            "message_type": message_type,
            "timestamp": now_millis(),
        });
        let sent = self.send(&frame).await;
        if sent {
            info!(recipient_id, "chat message sent");
        }
        sent
    }

    /// Close the connection and stop background tasks. Idempotent.
    ///
    /// A `Failed` channel stays `Failed`; only `connect` leaves that state.
    pub async fn disconnect(&self) {
        match self.state() {
            ConnectionState::Failed => {
                debug!("disconnect on failed channel ignored");
            }
            ConnectionState::Disconnected if !self.inner.running.load(Ordering::SeqCst) => {}
            _ => {
                self.inner.teardown().await;
                info!("realtime channel disconnected");
            }
        }
    }

    pub fn add_handler(&self, handler: Arc<dyn MessageHandler>) -> HandlerId {
        self.inner.handlers.add(handler)
    }

    pub fn remove_handler(&self, id: HandlerId) -> bool {
        self.inner.handlers.remove(id)
    }

    pub fn handler_count(&self) -> usize {
        self.inner.handlers.len()
    }

    pub fn state(&self) -> ConnectionState {
        self.inner.state()
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    pub fn reconnect_attempts(&self) -> u32 {
        self.inner.reconnect_attempts.load(Ordering::SeqCst)
    }

    /// The newest `limit` inbound messages, oldest first.
    pub fn recent_messages(&self, limit: usize) -> Vec<InboundMessage> {
        self.inner.history.recent(limit)
    }

    pub fn clear_history(&self) {
        self.inner.history.clear();
    }

    /// Endpoint of the last successful `connect`.
    pub fn endpoint(&self) -> Option<Endpoint> {
        self.inner.target.lock().as_ref().map(|(endpoint, _)| endpoint.clone())
    }
}

impl Inner {
    fn state(&self) -> ConnectionState {
        ConnectionState::from_u8(self.state.load(Ordering::SeqCst))
    }

    fn set_state(&self, state: ConnectionState) {
        let prev = ConnectionState::from_u8(self.state.swap(state.as_u8(), Ordering::SeqCst));
        if prev != state {
            debug!(from = %prev, to = %state, "realtime state changed");
        }
    }

    /// Whether tasks spawned for `generation` should keep going.
    fn is_current(&self, generation: u64) -> bool {
        self.running.load(Ordering::SeqCst) && self.generation.load(Ordering::SeqCst) == generation
    }

    async fn write<T: Serialize + ?Sized>(&self, message: &T) -> Result<(), RealtimeError> {
        if self.state() != ConnectionState::Connected {
            return Err(RealtimeError::NotConnected);
        }
        let text = serde_json::to_string(message)?;
        let mut writer = self.writer.lock().await;
        let sink = writer.as_mut().ok_or(RealtimeError::NotConnected)?;
        sink.send(Message::Text(text.into()))
            .await
            .map_err(|e| RealtimeError::Send(e.to_string()))
    }

    /// Stop tasks and close the transport, leaving the state `Disconnected`.
    async fn teardown(&self) {
        self.running.store(false, Ordering::SeqCst);
        let _ = self.generation.fetch_add(1, Ordering::SeqCst);

        let tasks: Vec<_> = self.tasks.lock().drain(..).collect();
        for task in tasks {
            task.abort();
        }

        let sink = self.writer.lock().await.take();
        if let Some(mut sink) = sink {
            if tokio::time::timeout(CLOSE_TIMEOUT, sink.close()).await.is_err() {
                debug!("realtime close handshake timed out");
            }
        }

        self.set_state(ConnectionState::Disconnected);
    }

    async fn on_frame(&self, text: &str) {
        let data: Value = match serde_json::from_str(text) {
            Ok(data) => data,
            Err(e) => {
                warn!(error = %e, len = text.len(), "dropping malformed realtime frame");
                return;
            }
        };
        let message = InboundMessage::new(text, data);
        debug!(message_type = message.message_type().unwrap_or("-"), "realtime frame received");
        self.history.push(message.clone());
        let _ = self.handlers.dispatch(&message).await;
    }

    /// Read frames until the transport closes or errors.
    async fn read_until_closed(&self, source: &mut WsSource) {
        while let Some(frame) = source.next().await {
            match frame {
                Ok(Message::Text(text)) => self.on_frame(text.as_str()).await,
                Ok(Message::Binary(data)) => match std::str::from_utf8(&data) {
                    Ok(text) => self.on_frame(text).await,
                    Err(_) => warn!(len = data.len(), "dropping non-UTF-8 binary frame"),
                },
                Ok(Message::Close(frame)) => {
                    info!(?frame, "realtime endpoint closed the connection");
                    return;
                }
                Ok(_) => {}
                Err(e) => {
                    warn!(error = %e, "realtime transport error");
                    return;
                }
            }
        }
    }

    /// Reopen the last endpoint until it succeeds, the attempt budget is spent,
    /// or this generation is superseded.
    async fn reconnect(&self, generation: u64) -> Option<WsSource> {
        let (endpoint, auth) = self.target.lock().clone()?;
        let max = self.config.max_reconnect_attempts;

        while self.is_current(generation) {
            let attempts = self.reconnect_attempts.load(Ordering::SeqCst);
            if attempts >= max {
                error!(attempts, "realtime reconnect attempts exhausted");
                self.running.store(false, Ordering::SeqCst);
                self.set_state(ConnectionState::Failed);
                return None;
            }

            let attempt = attempts + 1;
            self.reconnect_attempts.store(attempt, Ordering::SeqCst);
            info!(attempt, max, "reconnecting realtime channel");
            tokio::time::sleep(self.config.reconnect_interval).await;
            if !self.is_current(generation) {
                return None;
            }

            match open(&self.config, &endpoint, &auth).await {
                Ok(ws) => {
                    let (sink, source) = ws.split();
                    *self.writer.lock().await = Some(sink);
                    if !self.is_current(generation) {
                        return None;
                    }
                    self.reconnect_attempts.store(0, Ordering::SeqCst);
                    self.set_state(ConnectionState::Connected);
                    info!(attempt, "realtime channel reconnected");
                    return Some(source);
                }
                Err(e) => {
                    warn!(attempt, error = %e, kind = e.error_kind(), "realtime reconnect failed");
                }
            }
        }
        None
    }
}

fn spawn_supervisor(inner: Arc<Inner>, source: WsSource, generation: u64) -> JoinHandle<()> {
    tokio::spawn(supervise(inner, source, generation))
}

async fn supervise(inner: Arc<Inner>, mut source: WsSource, generation: u64) {
    loop {
        inner.read_until_closed(&mut source).await;
        if !inner.is_current(generation) {
            return;
        }

        inner.set_state(ConnectionState::Reconnecting);
        let stale = inner.writer.lock().await.take();
        drop(stale);

        match inner.reconnect(generation).await {
            Some(next) => source = next,
            None => return,
        }
    }
}

fn spawn_heartbeat(inner: Arc<Inner>, generation: u64) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(inner.config.heartbeat_interval);
        ticker.tick().await; // consume first immediate tick

        loop {
            ticker.tick().await;
            if !inner.is_current(generation) {
                break;
            }
            if inner.state() != ConnectionState::Connected {
                continue;
            }
            let ping = json!({"type": "ping", "timestamp": chrono::Utc::now().timestamp()});
            match inner.write(&ping).await {
                Ok(()) => tracing::trace!("realtime ping sent"),
                Err(e) => debug!(error = %e, "realtime ping failed"),
            }
        }
    })
}

async fn open(config: &RealtimeConfig, endpoint: &Endpoint, auth: &AuthContext) -> Result<WsStream, RealtimeError> {
    let mut request = endpoint
        .url
        .as_str()
        .into_client_request()
        .map_err(|e| RealtimeError::InvalidEndpoint {
            url: endpoint.url.clone(),
            reason: e.to_string(),
        })?;

    for (name, value) in auth.handshake_headers() {
        let header_name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|_| RealtimeError::InvalidHeader { name: name.clone() })?;
        let header_value =
            HeaderValue::from_str(&value).map_err(|_| RealtimeError::InvalidHeader { name })?;
        let _ = request.headers_mut().insert(header_name, header_value);
    }

    let (ws, _response) = tokio::time::timeout(config.connect_timeout, connect_async(request))
        .await
        .map_err(|_| RealtimeError::ConnectTimeout(config.connect_timeout))?
        .map_err(|e| RealtimeError::Handshake(e.to_string()))?;
    Ok(ws)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn send_fails_when_never_connected() {
        let channel = RealtimeChannel::new(RealtimeConfig::default());
        assert!(!channel.send(&json!({"type": "x"})).await);
        assert!(matches!(
            channel.try_send(&json!({})).await,
            Err(RealtimeError::NotConnected)
        ));
    }

    #[tokio::test]
    async fn disconnect_on_fresh_channel_is_noop() {
        let channel = RealtimeChannel::new(RealtimeConfig::default());
        channel.disconnect().await;
        channel.disconnect().await;
        assert_eq!(channel.state(), ConnectionState::Disconnected);
        assert!(channel.endpoint().is_none());
    }

    #[tokio::test]
    async fn invalid_endpoint_leaves_disconnected() {
        let channel = RealtimeChannel::new(RealtimeConfig::default());
        let ok = channel.connect(Endpoint::new("not a url"), AuthContext::default()).await;
        assert!(!ok);
        assert_eq!(channel.state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn invalid_header_is_rejected_before_dialing() {
        let auth = AuthContext {
            headers: vec![("bad header".into(), "x".into())],
            ..Default::default()
        };
        let err = open(&RealtimeConfig::default(), &Endpoint::new("ws://127.0.0.1:9"), &auth)
            .await
            .unwrap_err();
        assert!(matches!(err, RealtimeError::InvalidHeader { .. }));
    }

    #[test]
    fn default_config_values() {
        let config = RealtimeConfig::default();
        assert_eq!(config.connect_timeout, Duration::from_secs(10));
        assert_eq!(config.heartbeat_interval, Duration::from_secs(30));
        assert_eq!(config.reconnect_interval, Duration::from_secs(5));
        assert_eq!(config.max_reconnect_attempts, 10);
        assert_eq!(config.history_capacity, 50);
    }
}
