use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use scout_core::{EventCategory, OutboundEvent};
use scout_relay::{
    BotDescriptor, ControlPlaneClient, ControlPlaneConfig, DeliveryOutcome, ForwarderConfig,
    OutboundForwarder,
};
use secrecy::SecretString;
use serde_json::{json, Value};
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn forwarder_for(base_url: String, batch_size: usize) -> OutboundForwarder {
    let client = ControlPlaneClient::new(ControlPlaneConfig {
        base_url: Some(base_url),
        token: Some(SecretString::from("cp-token")),
        ..Default::default()
    });
    OutboundForwarder::new(
        Arc::new(client),
        ForwarderConfig {
            batch_size,
            poll_interval: Duration::from_millis(10),
            stop_timeout: Duration::from_secs(1),
            ..Default::default()
        },
    )
}

fn numbered(n: u64) -> OutboundEvent {
    OutboundEvent::new(EventCategory::CandidateInfo, json!({"n": n}))
}

/// Event ids of every posted batch, in request order.
async fn posted_batches(server: &MockServer) -> Vec<Vec<String>> {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .filter(|req| req.url.path() == "/messages/batch")
        .map(|req| {
            let body: Value = serde_json::from_slice(&req.body).unwrap();
            body["messages"]
                .as_array()
                .unwrap()
                .iter()
                .map(|m| m["id"].as_str().unwrap().to_string())
                .collect()
        })
        .collect()
}

#[tokio::test]
async fn fifteen_events_go_out_as_ten_then_five() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/messages/batch"))
        .and(header("Authorization", "Bearer cp-token"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let fwd = forwarder_for(server.uri(), 10);
    let mut expected = Vec::new();
    for n in 0..15 {
        let event = numbered(n);
        expected.push(event.id().to_string());
        assert!(fwd.enqueue(event));
    }

    assert_eq!(fwd.deliver_once().await, DeliveryOutcome::Delivered(10));
    assert_eq!(fwd.deliver_once().await, DeliveryOutcome::Delivered(5));
    assert_eq!(fwd.deliver_once().await, DeliveryOutcome::Idle);

    let batches = posted_batches(&server).await;
    assert_eq!(batches.len(), 2);
    assert_eq!(batches[0].len(), 10);
    assert_eq!(batches[1].len(), 5);
    assert_eq!(batches.concat(), expected);
    assert_eq!(fwd.status().delivered, 15);
}

#[tokio::test]
async fn server_error_requeues_batch_at_head() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/messages/batch"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/messages/batch"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let fwd = forwarder_for(server.uri(), 2);
    for n in 0..3 {
        let _ = fwd.enqueue(numbered(n));
    }

    assert_eq!(fwd.deliver_once().await, DeliveryOutcome::Requeued(2));
    assert_eq!(fwd.queue_size(), 3);
    assert_eq!(fwd.deliver_once().await, DeliveryOutcome::Delivered(2));
    assert_eq!(fwd.deliver_once().await, DeliveryOutcome::Delivered(1));

    let batches = posted_batches(&server).await;
    assert_eq!(batches.len(), 3);
    assert_eq!(batches[0], batches[1]);
    assert!(!batches[2].iter().any(|id| batches[1].contains(id)));

    let status = fwd.status();
    assert_eq!(status.requeued, 2);
    assert_eq!(status.delivered, 3);
}

#[tokio::test]
async fn client_error_discards_batch() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/messages/batch"))
        .respond_with(ResponseTemplate::new(400).set_body_string("bad payload"))
        .mount(&server)
        .await;

    let fwd = forwarder_for(server.uri(), 10);
    let _ = fwd.enqueue(numbered(1));
    let _ = fwd.enqueue(numbered(2));
    assert_eq!(fwd.deliver_once().await, DeliveryOutcome::Rejected(2));
    assert_eq!(fwd.queue_size(), 0);

    let _ = fwd.enqueue(numbered(3));
    assert_eq!(fwd.deliver_once().await, DeliveryOutcome::Rejected(1));

    let batches = posted_batches(&server).await;
    assert_eq!(batches.len(), 2);
    assert_eq!(batches[1].len(), 1);
    assert!(!batches[0].contains(&batches[1][0]));
    assert_eq!(fwd.status().rejected, 3);
}

#[tokio::test]
async fn unreachable_server_requeues() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let fwd = forwarder_for(format!("http://{addr}"), 10);
    let _ = fwd.enqueue(numbered(7));

    assert_eq!(fwd.deliver_once().await, DeliveryOutcome::Requeued(1));
    assert_eq!(fwd.queue_size(), 1);
    assert_eq!(fwd.status().requeued, 1);
}

#[tokio::test]
async fn worker_drains_queue_without_duplicates() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/messages/batch"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let fwd = forwarder_for(server.uri(), 4);
    assert!(fwd.start());
    assert!(!fwd.start());

    for n in 0..9 {
        let _ = fwd.forward_candidate_info(json!({"n": n}));
    }

    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while fwd.queue_size() > 0 || fwd.status().delivered < 9 {
        assert!(tokio::time::Instant::now() < deadline, "queue never drained");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    let status = fwd.status();
    assert!(status.is_running);
    assert!(status.worker_alive);
    assert!(status.has_auth_token);
    assert_eq!(status.control_plane_url.as_deref(), Some(server.uri().as_str()));

    fwd.stop().await;
    assert!(!fwd.is_running());
    assert!(!fwd.status().worker_alive);

    let ids = posted_batches(&server).await.concat();
    let unique: HashSet<_> = ids.iter().collect();
    assert_eq!(ids.len(), 9);
    assert_eq!(unique.len(), 9);
}

#[tokio::test]
async fn stop_leaves_undelivered_events_queued() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/messages/batch"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let fwd = forwarder_for(server.uri(), 10);
    let _ = fwd.enqueue(numbered(1));
    assert!(fwd.start());
    tokio::time::sleep(Duration::from_millis(50)).await;
    fwd.stop().await;

    assert_eq!(fwd.queue_size(), 1);
    assert!(!fwd.is_running());
}

#[tokio::test]
async fn heartbeat_and_registration_bodies() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/heartbeat"))
        .and(header("Authorization", "Bearer cp-token"))
        .and(header("User-Agent", "ZhilianBot/1.0"))
        .and(body_partial_json(json!({
            "type": "heartbeat",
            "source": "zhilian_bot",
            "status": "online"
        })))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/bots/register"))
        .and(body_partial_json(json!({
            "bot_type": "zhilian",
            "bot_id": "bot-1",
            "status": "online",
            "capabilities": ["candidate_search"]
        })))
        .respond_with(ResponseTemplate::new(201))
        .expect(1)
        .mount(&server)
        .await;

    let fwd = forwarder_for(server.uri(), 10);
    assert!(fwd.heartbeat().await);
    let bot = BotDescriptor::new(
        "zhilian",
        Some("bot-1".into()),
        "Zhilian Recruitment Bot",
        "1.0.0",
        vec!["candidate_search".into()],
    );
    assert!(fwd.register(&bot).await);
}

#[tokio::test]
async fn failed_heartbeat_is_reported_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/heartbeat"))
        .respond_with(ResponseTemplate::new(502))
        .expect(1)
        .mount(&server)
        .await;

    let fwd = forwarder_for(server.uri(), 10);
    assert!(!fwd.heartbeat().await);
}

#[tokio::test]
async fn health_check_reports_reachability() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/health"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "ok"})))
        .mount(&server)
        .await;

    assert!(forwarder_for(server.uri(), 10).test_connection().await);

    let down = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/health"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&down)
        .await;
    assert!(!forwarder_for(down.uri(), 10).test_connection().await);
}
