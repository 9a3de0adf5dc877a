//! Queue-and-batch relay of outbound events to the control plane.
//!
//! Producers call [`OutboundForwarder::enqueue`] from any task. A single worker
//! takes up to `batch_size` events from the head of the queue per cycle and
//! posts them as one batch. A transient failure puts the whole batch back at
//! the head in its original order; a 4xx drops it.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use scout_core::{ChatMessage, InboundMessage, OutboundEvent};
use serde::Serialize;
use serde_json::Value;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::client::ControlPlaneClient;
use crate::wire::{BatchEnvelope, BotDescriptor};

/// Tunables for [`OutboundForwarder`].
#[derive(Clone, Debug)]
pub struct ForwarderConfig {
    pub batch_size: usize,
    pub poll_interval: Duration,
    pub stop_timeout: Duration,
    /// When set, enqueueing into a full queue evicts the oldest event.
    pub max_queue_size: Option<usize>,
    pub source: String,
}

impl Default for ForwarderConfig {
    fn default() -> Self {
        Self {
            batch_size: 10,
            poll_interval: Duration::from_millis(500),
            stop_timeout: Duration::from_secs(5),
            max_queue_size: None,
            source: "zhilian_bot".to_string(),
        }
    }
}

/// Result of one delivery cycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// Queue was empty; nothing was sent.
    Idle,
    /// The batch was accepted (2xx).
    Delivered(usize),
    /// The batch was permanently rejected and discarded.
    Rejected(usize),
    /// The batch failed transiently and went back to the head of the queue.
    Requeued(usize),
}

/// Snapshot of forwarder health.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ForwarderStatus {
    pub is_running: bool,
    pub queue_size: usize,
    pub control_plane_url: Option<String>,
    pub has_auth_token: bool,
    pub worker_alive: bool,
    pub delivered: u64,
    pub rejected: u64,
    pub requeued: u64,
    pub dropped: u64,
}

#[derive(Default)]
struct Counters {
    delivered: AtomicU64,
    rejected: AtomicU64,
    requeued: AtomicU64,
    dropped: AtomicU64,
}

/// Reliable batching relay. Cheap to clone; clones share one queue.
#[derive(Clone)]
pub struct OutboundForwarder {
    inner: Arc<Inner>,
}

struct Inner {
    client: Arc<ControlPlaneClient>,
    config: ForwarderConfig,
    queue: Mutex<VecDeque<OutboundEvent>>,
    running: AtomicBool,
    worker: Mutex<Option<JoinHandle<()>>>,
    counters: Counters,
}

impl OutboundForwarder {
    pub fn new(client: Arc<ControlPlaneClient>, config: ForwarderConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                client,
                config,
                queue: Mutex::new(VecDeque::new()),
                running: AtomicBool::new(false),
                worker: Mutex::new(None),
                counters: Counters::default(),
            }),
        }
    }

    /// Append an event to the tail of the queue. Never blocks on I/O.
    pub fn enqueue(&self, event: OutboundEvent) -> bool {
        let evicted = {
            let mut queue = self.inner.queue.lock();
            let evicted = match self.inner.config.max_queue_size {
                Some(max) if queue.len() >= max => queue.pop_front(),
                _ => None,
            };
            queue.push_back(event);
            evicted
        };
        if let Some(old) = evicted {
            let _ = self.inner.counters.dropped.fetch_add(1, Ordering::Relaxed);
            warn!(event_id = %old.id(), category = %old.category(), "forward queue full, dropped oldest event");
        }
        true
    }

    pub fn forward_chat_message(&self, message: ChatMessage) -> bool {
        self.enqueue(OutboundEvent::chat_message(message))
    }

    pub fn forward_candidate_info(&self, candidate: Value) -> bool {
        self.enqueue(OutboundEvent::candidate_info(candidate))
    }

    pub fn forward_interaction_event(&self, event_type: &str, candidate_id: &str, details: Option<Value>) -> bool {
        self.enqueue(OutboundEvent::interaction(event_type, candidate_id, details))
    }

    /// Relay a realtime frame as a `websocket_message` event.
    pub fn forward_inbound(&self, message: &InboundMessage) -> bool {
        self.enqueue(OutboundEvent::websocket_message(message.data.clone()))
    }

    /// Run one delivery cycle: take a batch from the head and post it.
    pub async fn deliver_once(&self) -> DeliveryOutcome {
        self.inner.deliver_once().await
    }

    /// Spawn the delivery worker. Returns `false` when already running or when
    /// no control-plane URL is configured.
    pub fn start(&self) -> bool {
        if !self.inner.client.is_configured() {
            warn!("control plane URL not configured, forwarding disabled");
            return false;
        }
        if self.inner.running.swap(true, Ordering::SeqCst) {
            warn!("forwarder already running");
            return false;
        }
        let inner = Arc::clone(&self.inner);
        *self.inner.worker.lock() = Some(tokio::spawn(run_worker(inner)));
        info!(
            batch_size = self.inner.config.batch_size,
            url = self.inner.client.base_url().unwrap_or_default(),
            "forwarder started"
        );
        true
    }

    /// Stop the worker, waiting at most `stop_timeout` before aborting it.
    /// Events still queued are not flushed.
    pub async fn stop(&self) {
        let was_running = self.inner.running.swap(false, Ordering::SeqCst);
        let handle = self.inner.worker.lock().take();
        let Some(mut handle) = handle else {
            return;
        };

        if tokio::time::timeout(self.inner.config.stop_timeout, &mut handle)
            .await
            .is_err()
        {
            warn!(
                timeout_ms = self.inner.config.stop_timeout.as_millis() as u64,
                "forwarder worker did not stop in time, aborting"
            );
            handle.abort();
        }

        let remaining = self.queue_size();
        if was_running && remaining > 0 {
            warn!(remaining, "forwarder stopped with undelivered events");
        }
        info!("forwarder stopped");
    }

    /// Best-effort `POST /heartbeat`; not retried.
    pub async fn heartbeat(&self) -> bool {
        match self.inner.client.heartbeat(&self.inner.config.source).await {
            Ok(()) => {
                debug!("control plane heartbeat sent");
                true
            }
            Err(e) => {
                warn!(error = %e, kind = e.error_kind(), "control plane heartbeat failed");
                false
            }
        }
    }

    /// Best-effort bot registration.
    pub async fn register(&self, bot: &BotDescriptor) -> bool {
        match self.inner.client.register(bot).await {
            Ok(()) => {
                info!(bot_id = %bot.bot_id, "bot registered with control plane");
                true
            }
            Err(e) => {
                warn!(bot_id = %bot.bot_id, error = %e, kind = e.error_kind(), "bot registration failed");
                false
            }
        }
    }

    /// `GET /health` reachability check.
    pub async fn test_connection(&self) -> bool {
        match self.inner.client.health().await {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, kind = e.error_kind(), "control plane health check failed");
                false
            }
        }
    }

    pub fn queue_size(&self) -> usize {
        self.inner.queue.lock().len()
    }

    /// Drop every queued event. Returns how many were removed.
    pub fn clear_queue(&self) -> usize {
        let removed = {
            let mut queue = self.inner.queue.lock();
            let n = queue.len();
            queue.clear();
            n
        };
        if removed > 0 {
            info!(removed, "forward queue cleared");
        }
        removed
    }

    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::SeqCst)
    }

    pub fn status(&self) -> ForwarderStatus {
        let counters = &self.inner.counters;
        ForwarderStatus {
            is_running: self.is_running(),
            queue_size: self.queue_size(),
            control_plane_url: self.inner.client.base_url().map(String::from),
            has_auth_token: self.inner.client.has_auth_token(),
            worker_alive: self
                .inner
                .worker
                .lock()
                .as_ref()
                .is_some_and(|handle| !handle.is_finished()),
            delivered: counters.delivered.load(Ordering::Relaxed),
            rejected: counters.rejected.load(Ordering::Relaxed),
            requeued: counters.requeued.load(Ordering::Relaxed),
            dropped: counters.dropped.load(Ordering::Relaxed),
        }
    }
}

impl Inner {
    fn take_batch(&self) -> Vec<OutboundEvent> {
        let mut queue = self.queue.lock();
        let n = queue.len().min(self.config.batch_size.max(1));
        queue.drain(..n).collect()
    }

    /// Put a failed batch back at the head, preserving its order.
    fn requeue_front(&self, batch: Vec<OutboundEvent>) {
        let mut queue = self.queue.lock();
        for event in batch.into_iter().rev() {
            queue.push_front(event);
        }
    }

    async fn deliver_once(&self) -> DeliveryOutcome {
        let batch = self.take_batch();
        if batch.is_empty() {
            return DeliveryOutcome::Idle;
        }
        let count = batch.len();
        let envelope = BatchEnvelope::new(&batch, &self.config.source);
        let batch_id = envelope.batch_id.clone();

        match self.client.post_batch(&envelope).await {
            Ok(()) => {
                let _ = self.counters.delivered.fetch_add(count as u64, Ordering::Relaxed);
                debug!(batch_id = %batch_id, count, "batch delivered");
                DeliveryOutcome::Delivered(count)
            }
            Err(e) if e.is_permanent() => {
                let _ = self.counters.rejected.fetch_add(count as u64, Ordering::Relaxed);
                error!(
                    batch_id = %batch_id,
                    count,
                    status = e.status().unwrap_or_default(),
                    error = %e,
                    "control plane rejected batch, discarding"
                );
                DeliveryOutcome::Rejected(count)
            }
            Err(e) => {
                let _ = self.counters.requeued.fetch_add(count as u64, Ordering::Relaxed);
                warn!(
                    batch_id = %batch_id,
                    count,
                    error = %e,
                    kind = e.error_kind(),
                    "batch delivery failed, requeued at head"
                );
                self.requeue_front(batch);
                DeliveryOutcome::Requeued(count)
            }
        }
    }
}

async fn run_worker(inner: Arc<Inner>) {
    debug!("forwarder worker started");
    while inner.running.load(Ordering::SeqCst) {
        let _ = inner.deliver_once().await;
        tokio::time::sleep(inner.config.poll_interval).await;
    }
    debug!("forwarder worker exited");
}
