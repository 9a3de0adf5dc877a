use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use scout_core::{CommandId, CommandResult, HandlerError};
use scout_relay::{CommandChannel, CommandConfig, CommandHandler, ControlPlaneClient, ControlPlaneConfig};
use serde_json::{json, Value};
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

struct CountingChats(Arc<AtomicUsize>);

#[async_trait]
impl CommandHandler for CountingChats {
    async fn execute(&self, _params: &Value) -> Result<CommandResult, HandlerError> {
        let _ = self.0.fetch_add(1, Ordering::SeqCst);
        Ok(CommandResult::with_items(vec![json!({"chat_id": "a"})]))
    }
}

fn channel_for(server: &MockServer) -> CommandChannel {
    let client = ControlPlaneClient::new(ControlPlaneConfig {
        base_url: Some(server.uri()),
        ..Default::default()
    });
    CommandChannel::new(
        Arc::new(client),
        CommandConfig {
            handler_timeout: Duration::from_secs(5),
        },
    )
}

#[tokio::test]
async fn unknown_command_is_acknowledged_exactly_once() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/commands/pending"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "commands": [{"id": "c-1", "type": "reboot", "params": {}}]
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/commands/c-1/ack"))
        .and(body_partial_json(json!({
            "command_id": "c-1",
            "result": {"success": false, "message": "unknown command type"}
        })))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let channel = channel_for(&server);
    assert_eq!(channel.process_pending().await, 1);
}

#[tokio::test]
async fn each_pending_command_is_dispatched_and_acked() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/commands/pending"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "commands": [
                {"id": 41, "type": "get_chat_list"},
                {"type": "get_chat_list"},
                {"id": "c-42", "type": "get_chat_list", "params": null}
            ]
        })))
        .mount(&server)
        .await;
    for id in ["41", "c-42"] {
        Mock::given(method("POST"))
            .and(path(format!("/commands/{id}/ack")))
            .and(body_partial_json(json!({"result": {"success": true, "count": 1}})))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;
    }

    let calls = Arc::new(AtomicUsize::new(0));
    let channel = channel_for(&server);
    channel.register("get_chat_list", Arc::new(CountingChats(calls.clone())));

    assert_eq!(channel.process_pending().await, 2);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn poll_failure_yields_no_commands() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/commands/pending"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let channel = channel_for(&server);
    assert!(channel.poll().await.is_empty());
    assert_eq!(channel.process_pending().await, 0);
}

#[tokio::test]
async fn failed_ack_is_reported() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/commands/c-9/ack"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    let channel = channel_for(&server);
    let acked = channel
        .acknowledge(&CommandId::from_raw("c-9"), CommandResult::success("done"))
        .await;
    assert!(!acked);
}

#[tokio::test]
async fn ack_encodes_reserved_characters_in_id() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/commands/batch%2F7%3Fx%23y/ack"))
        .and(body_partial_json(json!({"command_id": "batch/7?x#y"})))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let channel = channel_for(&server);
    let acked = channel
        .acknowledge(&CommandId::from_raw("batch/7?x#y"), CommandResult::success("done"))
        .await;
    assert!(acked);
}
