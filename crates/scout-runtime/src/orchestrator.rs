//! Orchestrator: wires the collaborators to the realtime channel, the
//! outbound forwarder and the command channel.
//!
//! `run` drives the whole lifecycle on the caller's task: login, forwarder and
//! registration, realtime connect, command handlers, control-plane heartbeat,
//! then the chat monitoring loop until `stop` is called.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use scout_core::{command_types, ChatMessage, CollaboratorError, ConnectionState, Endpoint};
use scout_realtime::{HandlerId, RealtimeChannel};
use scout_relay::{CommandChannel, ControlPlaneClient, ForwarderStatus, OutboundForwarder};
use scout_settings::ScoutSettings;
use serde::Serialize;
use serde_json::{json, Value};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::collaborators::{GreetingSummary, SearchQuery, SessionProvider, SiteAutomation};
use crate::config::RuntimeConfig;
use crate::error::RuntimeError;
use crate::handlers::{
    ChatListHandler, ForwardingHandler, SearchCandidatesHandler, SendGreetingHandler, SendMessageHandler,
};

/// Recipient recorded on chat messages read from the site.
const BOT_RECIPIENT: &str = "bot";

/// Snapshot returned by [`Orchestrator::status`].
#[derive(Clone, Debug, Serialize)]
pub struct OrchestratorStatus {
    pub is_running: bool,
    pub logged_in: bool,
    pub connection_state: ConnectionState,
    pub reconnect_attempts: u32,
    pub forwarder: ForwarderStatus,
}

pub struct Orchestrator {
    config: RuntimeConfig,
    session: Arc<dyn SessionProvider>,
    site: Arc<dyn SiteAutomation>,
    realtime: RealtimeChannel,
    forwarder: OutboundForwarder,
    commands: CommandChannel,
    running: AtomicBool,
    closed: AtomicBool,
    shutdown: Notify,
    heartbeat: Mutex<Option<JoinHandle<()>>>,
    forwarding_handler: Mutex<Option<HandlerId>>,
}

impl Orchestrator {
    /// Build every component from `settings`. Performs no I/O.
    pub fn initialize(
        settings: &ScoutSettings,
        session: Arc<dyn SessionProvider>,
        site: Arc<dyn SiteAutomation>,
    ) -> Self {
        Self::with_config(RuntimeConfig::from(settings), session, site)
    }

    pub fn with_config(
        config: RuntimeConfig,
        session: Arc<dyn SessionProvider>,
        site: Arc<dyn SiteAutomation>,
    ) -> Self {
        let client = Arc::new(ControlPlaneClient::new(config.control_plane.clone()));
        let forwarder = OutboundForwarder::new(Arc::clone(&client), config.forwarder.clone());
        let commands = CommandChannel::new(client, config.commands.clone());
        let realtime = RealtimeChannel::new(config.realtime.clone());
        Self {
            config,
            session,
            site,
            realtime,
            forwarder,
            commands,
            running: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            shutdown: Notify::new(),
            heartbeat: Mutex::new(None),
            forwarding_handler: Mutex::new(None),
        }
    }

    pub fn realtime(&self) -> &RealtimeChannel {
        &self.realtime
    }

    pub fn forwarder(&self) -> &OutboundForwarder {
        &self.forwarder
    }

    pub fn commands(&self) -> &CommandChannel {
        &self.commands
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Lifecycle
    // ─────────────────────────────────────────────────────────────────────────

    /// Run until [`stop`](Self::stop) is called. Only a login failure ends the
    /// run with an error; every later step degrades to a warning.
    pub async fn run(&self) -> Result<(), RuntimeError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(RuntimeError::Stopped);
        }
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(RuntimeError::AlreadyRunning);
        }
        info!("starting scout");

        if let Err(e) = self.login().await {
            error!(error = %e, "login failed, aborting run");
            self.stop().await;
            return Err(e);
        }

        let _ = self.start_forwarding().await;
        if !self.start_realtime().await {
            warn!("realtime channel unavailable, continuing without live updates");
        }
        self.register_command_handlers();
        self.start_control_plane_heartbeat();

        info!("scout started");
        self.monitor_chats().await;
        self.stop().await;
        Ok(())
    }

    /// Idempotent shutdown: realtime, forwarder, heartbeat timer, then the
    /// collaborators (closed once).
    pub async fn stop(&self) {
        let was_running = self.running.swap(false, Ordering::SeqCst);
        self.shutdown.notify_one();

        let heartbeat = self.heartbeat.lock().take();
        if let Some(handle) = heartbeat {
            handle.abort();
        }
        self.realtime.disconnect().await;
        self.forwarder.stop().await;

        if !self.closed.swap(true, Ordering::SeqCst) {
            self.site.close().await;
            self.session.close().await;
            info!(was_running, "scout stopped");
        }
    }

    pub fn status(&self) -> OrchestratorStatus {
        OrchestratorStatus {
            is_running: self.is_running(),
            logged_in: self.session.is_logged_in(),
            connection_state: self.realtime.state(),
            reconnect_attempts: self.realtime.reconnect_attempts(),
            forwarder: self.forwarder.status(),
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Startup steps
    // ─────────────────────────────────────────────────────────────────────────

    pub async fn login(&self) -> Result<(), RuntimeError> {
        self.session.login().await.map_err(RuntimeError::Login)?;
        info!("logged in");
        Ok(())
    }

    /// Probe the control plane, start the forwarder and register the bot.
    pub async fn start_forwarding(&self) -> bool {
        if !self.forwarder.test_connection().await {
            warn!("control plane health check failed, starting forwarder anyway");
        }
        if !self.forwarder.start() {
            return false;
        }
        let _ = self.forwarder.register(&self.config.bot.descriptor()).await;
        true
    }

    /// Resolve the endpoint, attach the forwarding handler and connect.
    pub async fn start_realtime(&self) -> bool {
        let Some(endpoint) = self.resolve_endpoint().await else {
            warn!("no realtime endpoint configured or discovered");
            return false;
        };
        let auth = match self.session.auth_context().await {
            Ok(auth) => self.config.browser_headers.apply(auth),
            Err(e) => {
                warn!(error = %e, "session has no handshake material");
                return false;
            }
        };

        {
            let mut slot = self.forwarding_handler.lock();
            if slot.is_none() {
                let handler = ForwardingHandler::new(self.forwarder.clone());
                *slot = Some(self.realtime.add_handler(Arc::new(handler)));
            }
        }

        self.realtime.connect(endpoint, auth).await
    }

    async fn resolve_endpoint(&self) -> Option<Endpoint> {
        if let Some(url) = &self.config.realtime_endpoint {
            return Some(Endpoint::new(url.clone()));
        }
        match self.site.realtime_endpoint().await {
            Ok(endpoint) => endpoint,
            Err(e) => {
                warn!(error = %e, "realtime endpoint discovery failed");
                None
            }
        }
    }

    pub fn register_command_handlers(&self) {
        let site = &self.site;
        self.commands.register(
            command_types::SEARCH_CANDIDATES,
            Arc::new(SearchCandidatesHandler::new(Arc::clone(site))),
        );
        self.commands.register(
            command_types::SEND_GREETING,
            Arc::new(SendGreetingHandler::new(Arc::clone(site))),
        );
        self.commands.register(
            command_types::GET_CHAT_LIST,
            Arc::new(ChatListHandler::new(Arc::clone(site))),
        );
        self.commands.register(
            command_types::SEND_MESSAGE,
            Arc::new(SendMessageHandler::new(self.realtime.clone())),
        );
    }

    fn start_control_plane_heartbeat(&self) {
        let Some(period) = self.config.control_plane_heartbeat else {
            debug!("control plane heartbeat disabled");
            return;
        };
        let mut slot = self.heartbeat.lock();
        if slot.is_some() {
            return;
        }
        let forwarder = self.forwarder.clone();
        *slot = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // First tick completes immediately
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let _ = forwarder.heartbeat().await;
            }
        }));
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Monitoring
    // ─────────────────────────────────────────────────────────────────────────

    /// Poll chats and commands until stopped.
    pub async fn monitor_chats(&self) {
        info!(interval_ms = self.config.monitor_interval.as_millis() as u64, "monitoring chats");
        while self.is_running() {
            let pause = match self.monitor_cycle().await {
                Ok(forwarded) => {
                    if forwarded > 0 {
                        debug!(forwarded, "chat messages queued");
                    }
                    self.config.monitor_interval
                }
                Err(e) => {
                    error!(error = %e, "chat monitoring cycle failed");
                    self.config.error_backoff
                }
            };
            if !self.is_running() {
                break;
            }
            tokio::select! {
                () = tokio::time::sleep(pause) => {}
                () = self.shutdown.notified() => {}
            }
        }
    }

    /// One pass: forward unread chat messages, then handle pending commands.
    /// Commands are polled even when the chat list cannot be read; that
    /// failure is still returned so the caller can back off.
    /// Returns the number of chat messages queued.
    pub async fn monitor_cycle(&self) -> Result<usize, CollaboratorError> {
        let forwarded = self.forward_unread_chats().await;
        let _ = self.commands.process_pending().await;
        forwarded
    }

    async fn forward_unread_chats(&self) -> Result<usize, CollaboratorError> {
        let chats = self.site.chat_list().await?;
        let mut forwarded = 0;

        for chat in chats.iter().filter(|chat| chat.unread_count > 0) {
            info!(chat_id = %chat.id, name = %chat.name, unread = chat.unread_count, "new chat messages");
            let messages = match self.site.chat_history(&chat.id, chat.unread_count as usize).await {
                Ok(messages) => messages,
                Err(e) => {
                    warn!(chat_id = %chat.id, error = %e, "chat history unavailable");
                    continue;
                }
            };
            for message in messages {
                let _ = self.forwarder.forward_chat_message(ChatMessage {
                    message_id: Some(message.id),
                    chat_id: Some(chat.id.clone()),
                    sender_id: message.sender,
                    recipient_id: BOT_RECIPIENT.to_string(),
                    content: message.content,
                });
                forwarded += 1;
            }
        }
        Ok(forwarded)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Site workflows
    // ─────────────────────────────────────────────────────────────────────────

    pub async fn search_candidates(&self, query: &SearchQuery) -> Result<Vec<Value>, CollaboratorError> {
        self.site.search_candidates(query).await
    }

    /// Search, greet up to `max_candidates`, and forward the candidates plus a
    /// `batch_greeting` interaction event. Failures yield an empty summary.
    pub async fn search_and_greet(
        &self,
        query: &SearchQuery,
        greeting: Option<&str>,
        max_candidates: usize,
    ) -> GreetingSummary {
        info!(keyword = %query.keyword, location = %query.location, max_candidates, "search and greet");

        let mut candidates = match self.site.search_candidates(query).await {
            Ok(candidates) => candidates,
            Err(e) => {
                error!(error = %e, "candidate search failed");
                return GreetingSummary::default();
            }
        };
        if candidates.is_empty() {
            warn!("no matching candidates");
            return GreetingSummary::default();
        }
        candidates.truncate(max_candidates);

        let summary = match self
            .site
            .batch_greeting(&candidates, greeting, max_candidates)
            .await
        {
            Ok(summary) => summary,
            Err(e) => {
                error!(error = %e, "batch greeting failed");
                return GreetingSummary::default();
            }
        };

        for candidate in candidates {
            let _ = self.forwarder.forward_candidate_info(candidate);
        }
        let details = serde_json::to_value(&summary).ok();
        let _ = self
            .forwarder
            .forward_interaction_event("batch_greeting", "batch", details);

        info!(total = summary.total, success = summary.success, failed = summary.failed, "greetings sent");
        summary
    }

    /// Fetch candidate profiles one by one. Empty URLs are skipped; a failed
    /// fetch is recorded as `{url, error, status: "error"}`.
    pub async fn candidate_details(&self, urls: &[String]) -> Vec<Value> {
        let total = urls.len();
        let pause: Duration = self.config.request_delay * 2;
        let mut details = Vec::new();

        for (i, url) in urls.iter().enumerate() {
            let index = i + 1;
            let url = url.trim();
            if url.is_empty() {
                warn!(index, total, "empty candidate url, skipping");
                continue;
            }

            match self.site.candidate_detail(url).await {
                Ok(Some(detail)) => {
                    match detail.get("error") {
                        Some(err) => warn!(index, total, url, error = %err, "candidate detail incomplete"),
                        None => debug!(index, total, url, "candidate detail fetched"),
                    }
                    let _ = self.forwarder.forward_candidate_info(detail.clone());
                    details.push(detail);
                }
                Ok(None) => warn!(index, total, url, "candidate detail empty"),
                Err(e) => {
                    error!(index, total, url, error = %e, "candidate detail failed");
                    details.push(json!({"url": url, "error": e.to_string(), "status": "error"}));
                    continue;
                }
            }

            tokio::time::sleep(pause).await;
        }

        let failed = details.iter().filter(|d| d.get("error").is_some()).count();
        info!(
            succeeded = details.len() - failed,
            failed,
            total = details.len(),
            "candidate details fetched"
        );
        details
    }

    /// `GET /health` against the control plane.
    pub async fn test_control_plane(&self) -> bool {
        self.forwarder.test_connection().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::offline::{ConfiguredSession, OfflineSite};

    fn offline() -> Orchestrator {
        Orchestrator::with_config(
            RuntimeConfig::default(),
            Arc::new(ConfiguredSession::new(None, None)),
            Arc::new(OfflineSite::default()),
        )
    }

    #[tokio::test]
    async fn status_before_run() {
        let orch = offline();
        let status = orch.status();
        assert!(!status.is_running);
        assert!(!status.logged_in);
        assert_eq!(status.connection_state, ConnectionState::Disconnected);
        assert_eq!(status.forwarder.queue_size, 0);
    }

    #[tokio::test]
    async fn command_handlers_cover_known_types() {
        let orch = offline();
        orch.register_command_handlers();
        let mut expected: Vec<_> = command_types::ALL.iter().map(|t| t.to_string()).collect();
        expected.sort();
        assert_eq!(orch.commands().handler_types(), expected);
    }

    #[tokio::test]
    async fn stop_without_run_is_harmless() {
        let orch = offline();
        orch.stop().await;
        orch.stop().await;
        assert!(matches!(orch.run().await, Err(RuntimeError::Stopped)));
    }

    #[tokio::test]
    async fn realtime_needs_an_endpoint() {
        let orch = offline();
        orch.login().await.unwrap();
        assert!(!orch.start_realtime().await);
        assert_eq!(orch.realtime().handler_count(), 0);
    }

    #[tokio::test]
    async fn search_failure_gives_empty_summary() {
        let orch = offline();
        let summary = orch.search_and_greet(&SearchQuery::keyword("rust"), None, 5).await;
        assert_eq!(summary, GreetingSummary::default());
        assert_eq!(orch.forwarder().queue_size(), 0);
    }
}
