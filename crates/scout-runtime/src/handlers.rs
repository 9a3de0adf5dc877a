//! Inbound-message and command handlers bound by the orchestrator.

use std::sync::Arc;

use async_trait::async_trait;
use scout_core::{CollaboratorError, CommandResult, HandlerError, InboundMessage};
use scout_realtime::{MessageHandler, RealtimeChannel};
use scout_relay::{CommandHandler, OutboundForwarder};
use serde_json::Value;

use crate::collaborators::{SearchQuery, SiteAutomation};

/// Relays every realtime frame to the control plane as a `websocket_message`.
pub struct ForwardingHandler {
    forwarder: OutboundForwarder,
}

impl ForwardingHandler {
    pub fn new(forwarder: OutboundForwarder) -> Self {
        Self { forwarder }
    }
}

#[async_trait]
impl MessageHandler for ForwardingHandler {
    fn name(&self) -> &str {
        "control-plane-forwarder"
    }

    async fn handle(&self, message: &InboundMessage) -> Result<(), HandlerError> {
        let _ = self.forwarder.forward_inbound(message);
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Command handlers
// ─────────────────────────────────────────────────────────────────────────────

pub struct SearchCandidatesHandler {
    site: Arc<dyn SiteAutomation>,
}

impl SearchCandidatesHandler {
    pub fn new(site: Arc<dyn SiteAutomation>) -> Self {
        Self { site }
    }
}

#[async_trait]
impl CommandHandler for SearchCandidatesHandler {
    async fn execute(&self, params: &Value) -> Result<CommandResult, HandlerError> {
        let query = SearchQuery::from_params(params)?;
        let candidates = self.site.search_candidates(&query).await?;
        Ok(CommandResult::with_items(candidates))
    }
}

pub struct SendGreetingHandler {
    site: Arc<dyn SiteAutomation>,
}

impl SendGreetingHandler {
    pub fn new(site: Arc<dyn SiteAutomation>) -> Self {
        Self { site }
    }
}

#[async_trait]
impl CommandHandler for SendGreetingHandler {
    async fn execute(&self, params: &Value) -> Result<CommandResult, HandlerError> {
        let sent = self.site.send_greeting(params).await?;
        Ok(CommandResult::from_outcome(sent, "greeting sent", "greeting failed"))
    }
}

pub struct ChatListHandler {
    site: Arc<dyn SiteAutomation>,
}

impl ChatListHandler {
    pub fn new(site: Arc<dyn SiteAutomation>) -> Self {
        Self { site }
    }
}

#[async_trait]
impl CommandHandler for ChatListHandler {
    async fn execute(&self, _params: &Value) -> Result<CommandResult, HandlerError> {
        let chats = self.site.chat_list().await?;
        let items = chats
            .iter()
            .map(serde_json::to_value)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| HandlerError::new(e.to_string()))?;
        Ok(CommandResult::with_items(items))
    }
}

/// Sends a chat message over the realtime channel.
pub struct SendMessageHandler {
    realtime: RealtimeChannel,
}

impl SendMessageHandler {
    pub fn new(realtime: RealtimeChannel) -> Self {
        Self { realtime }
    }
}

#[async_trait]
impl CommandHandler for SendMessageHandler {
    async fn execute(&self, params: &Value) -> Result<CommandResult, HandlerError> {
        let recipient_id = required_str(params, "recipient_id")?;
        let content = required_str(params, "content")?;
        let message_type = params
            .get("message_type")
            .and_then(Value::as_str)
            .unwrap_or("text");

        let sent = self
            .realtime
            .send_chat_message(recipient_id, content, message_type)
            .await;
        Ok(CommandResult::from_outcome(sent, "message sent", "message send failed"))
    }
}

fn required_str<'a>(params: &'a Value, key: &str) -> Result<&'a str, CollaboratorError> {
    params
        .get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| CollaboratorError::InvalidParams(format!("missing string parameter `{key}`")))
}
