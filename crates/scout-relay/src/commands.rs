use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::FutureExt;
use parking_lot::RwLock;
use scout_core::{Acknowledgement, Command, CommandId, CommandResult, HandlerError};
use serde_json::Value;
use tracing::{debug, info, info_span, warn, Instrument};

use crate::client::ControlPlaneClient;

/// Executes one command type.
#[async_trait]
pub trait CommandHandler: Send + Sync {
    async fn execute(&self, params: &Value) -> Result<CommandResult, HandlerError>;
}

#[derive(Clone, Debug)]
pub struct CommandConfig {
    /// Upper bound on a single handler invocation.
    pub handler_timeout: Duration,
}

impl Default for CommandConfig {
    fn default() -> Self {
        Self {
            handler_timeout: Duration::from_secs(120),
        }
    }
}

/// Poll/dispatch/acknowledge loop for operator commands.
pub struct CommandChannel {
    client: Arc<ControlPlaneClient>,
    config: CommandConfig,
    handlers: RwLock<HashMap<String, Arc<dyn CommandHandler>>>,
}

impl CommandChannel {
    pub fn new(client: Arc<ControlPlaneClient>, config: CommandConfig) -> Self {
        Self {
            client,
            config,
            handlers: RwLock::new(HashMap::new()),
        }
    }

    /// Bind a handler to a command type, replacing any previous one.
    pub fn register(&self, command_type: impl Into<String>, handler: Arc<dyn CommandHandler>) {
        let command_type = command_type.into();
        if self.handlers.write().insert(command_type.clone(), handler).is_some() {
            debug!(command_type, "replaced command handler");
        }
    }

    pub fn handler_types(&self) -> Vec<String> {
        let mut types: Vec<_> = self.handlers.read().keys().cloned().collect();
        types.sort();
        types
    }

    /// Fetch pending commands. Any failure yields an empty list.
    pub async fn poll(&self) -> Vec<Command> {
        match self.client.pending_commands().await {
            Ok(commands) => {
                if !commands.is_empty() {
                    debug!(count = commands.len(), "pending commands received");
                }
                commands
            }
            Err(e) => {
                debug!(error = %e, kind = e.error_kind(), "command poll failed");
                Vec::new()
            }
        }
    }

    /// Run the handler for `command.command_type`. Never fails; errors, panics
    /// and timeouts become a failed result.
    pub async fn dispatch(&self, command: &Command) -> CommandResult {
        let span = info_span!("command", command_id = %command.id, command_type = %command.command_type);
        self.dispatch_inner(command).instrument(span).await
    }

    async fn dispatch_inner(&self, command: &Command) -> CommandResult {
        let handler = self.handlers.read().get(&command.command_type).cloned();
        let Some(handler) = handler else {
            warn!(command_id = %command.id, command_type = %command.command_type, "unknown command type");
            return CommandResult::unknown_command();
        };

        info!("executing command");
        let call = AssertUnwindSafe(handler.execute(&command.params)).catch_unwind();
        match tokio::time::timeout(self.config.handler_timeout, call).await {
            Ok(Ok(Ok(result))) => {
                info!(success = result.success, "command finished");
                result
            }
            Ok(Ok(Err(e))) => {
                warn!(command_id = %command.id, error = %e, "command handler failed");
                CommandResult::failure(e.to_string())
            }
            Ok(Err(_panic)) => {
                warn!(command_id = %command.id, "command handler panicked");
                CommandResult::failure("command handler panicked")
            }
            Err(_timeout) => {
                let timeout_ms = self.config.handler_timeout.as_millis() as u64;
                warn!(command_id = %command.id, timeout_ms, "command handler timed out");
                CommandResult::failure(format!("command timed out after {timeout_ms} ms"))
            }
        }
    }

    /// Best-effort acknowledgement; not retried.
    pub async fn acknowledge(&self, command_id: &CommandId, result: CommandResult) -> bool {
        let ack = Acknowledgement::new(command_id.clone(), result);
        match self.client.acknowledge(&ack).await {
            Ok(()) => {
                debug!(command_id = %command_id, "command acknowledged");
                true
            }
            Err(e) => {
                warn!(command_id = %command_id, error = %e, kind = e.error_kind(), "command ack failed");
                false
            }
        }
    }

    /// Poll once, then dispatch and acknowledge each command in order.
    /// Returns how many commands were processed.
    pub async fn process_pending(&self) -> usize {
        let commands = self.poll().await;
        for command in &commands {
            let result = self.dispatch(command).await;
            let _ = self.acknowledge(&command.id, result).await;
        }
        commands.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::ControlPlaneConfig;
    use serde_json::json;

    struct Echo;

    #[async_trait]
    impl CommandHandler for Echo {
        async fn execute(&self, params: &Value) -> Result<CommandResult, HandlerError> {
            Ok(CommandResult::with_items(vec![params.clone()]))
        }
    }

    struct Failing;

    #[async_trait]
    impl CommandHandler for Failing {
        async fn execute(&self, _params: &Value) -> Result<CommandResult, HandlerError> {
            Err(HandlerError::new("not logged in"))
        }
    }

    struct Panicking;

    #[async_trait]
    impl CommandHandler for Panicking {
        async fn execute(&self, _params: &Value) -> Result<CommandResult, HandlerError> {
            panic!("selector missing");
        }
    }

    struct Stuck;

    #[async_trait]
    impl CommandHandler for Stuck {
        async fn execute(&self, _params: &Value) -> Result<CommandResult, HandlerError> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(CommandResult::success("late"))
        }
    }

    fn channel(timeout: Duration) -> CommandChannel {
        let client = Arc::new(ControlPlaneClient::new(ControlPlaneConfig::default()));
        CommandChannel::new(client, CommandConfig { handler_timeout: timeout })
    }

    fn command(kind: &str) -> Command {
        Command::new(CommandId::from_raw("c1"), kind, json!({"keyword": "rust"}))
    }

    #[tokio::test]
    async fn unknown_type_fails_without_handler() {
        let ch = channel(Duration::from_secs(1));
        let result = ch.dispatch(&command("reboot")).await;
        assert!(!result.success);
        assert_eq!(result.message.as_deref(), Some("unknown command type"));
    }

    #[tokio::test]
    async fn registered_handler_receives_params() {
        let ch = channel(Duration::from_secs(1));
        ch.register("search_candidates", Arc::new(Echo));
        let result = ch.dispatch(&command("search_candidates")).await;
        assert!(result.success);
        assert_eq!(result.count, Some(1));
        assert_eq!(result.data, Some(json!([{"keyword": "rust"}])));
    }

    #[tokio::test]
    async fn handler_error_becomes_failed_result() {
        let ch = channel(Duration::from_secs(1));
        ch.register("get_chat_list", Arc::new(Failing));
        let result = ch.dispatch(&command("get_chat_list")).await;
        assert!(!result.success);
        assert_eq!(result.message.as_deref(), Some("not logged in"));
    }

    #[tokio::test]
    async fn panic_is_contained() {
        let ch = channel(Duration::from_secs(1));
        ch.register("send_greeting", Arc::new(Panicking));
        let result = ch.dispatch(&command("send_greeting")).await;
        assert!(!result.success);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_handler_times_out() {
        let ch = channel(Duration::from_secs(5));
        ch.register("send_message", Arc::new(Stuck));
        let result = ch.dispatch(&command("send_message")).await;
        assert!(!result.success);
        assert!(result.message.unwrap_or_default().contains("timed out"));
    }

    #[test]
    fn handler_types_are_sorted() {
        let ch = channel(Duration::from_secs(1));
        ch.register("send_message", Arc::new(Echo));
        ch.register("get_chat_list", Arc::new(Echo));
        ch.register("send_message", Arc::new(Failing));
        assert_eq!(ch.handler_types(), vec!["get_chat_list", "send_message"]);
    }

    #[tokio::test]
    async fn poll_without_control_plane_is_empty() {
        let ch = channel(Duration::from_secs(1));
        assert!(ch.poll().await.is_empty());
        assert_eq!(ch.process_pending().await, 0);
    }
}
