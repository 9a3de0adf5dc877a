use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;
use scout_core::{HandlerError, InboundMessage};
use tracing::warn;

/// Consumer of inbound realtime messages.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    fn name(&self) -> &str;
    async fn handle(&self, message: &InboundMessage) -> Result<(), HandlerError>;
}

/// Token returned by registration, used to remove the handler later.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HandlerId(u64);

impl fmt::Display for HandlerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "handler-{}", self.0)
    }
}

/// Adapter turning a synchronous closure into a [`MessageHandler`].
pub struct FnHandler<F> {
    name: String,
    f: F,
}

impl<F> FnHandler<F>
where
    F: Fn(&InboundMessage) -> Result<(), HandlerError> + Send + Sync,
{
    pub fn new(name: impl Into<String>, f: F) -> Self {
        Self {
            name: name.into(),
            f,
        }
    }
}

#[async_trait]
impl<F> MessageHandler for FnHandler<F>
where
    F: Fn(&InboundMessage) -> Result<(), HandlerError> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn handle(&self, message: &InboundMessage) -> Result<(), HandlerError> {
        (self.f)(message)
    }
}

/// Insertion-ordered handler table with per-call isolation.
///
/// Registration and removal are allowed while a dispatch is in progress; a
/// dispatch works on a snapshot taken when it starts.
pub struct HandlerRegistry {
    entries: RwLock<Vec<(HandlerId, Arc<dyn MessageHandler>)>>,
    next_id: AtomicU64,
    timeout: Duration,
}

impl HandlerRegistry {
    pub fn new(timeout: Duration) -> Self {
        Self {
            entries: RwLock::new(Vec::new()),
            next_id: AtomicU64::new(1),
            timeout,
        }
    }

    pub fn add(&self, handler: Arc<dyn MessageHandler>) -> HandlerId {
        let id = HandlerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.entries.write().push((id, handler));
        id
    }

    pub fn remove(&self, id: HandlerId) -> bool {
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|(entry_id, _)| *entry_id != id);
        entries.len() != before
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Invoke every handler in registration order. Returns how many succeeded.
    ///
    /// A handler that errors, panics or exceeds the timeout is logged and
    /// skipped.
    pub async fn dispatch(&self, message: &InboundMessage) -> usize {
        let snapshot: Vec<_> = self.entries.read().clone();
        let mut delivered = 0;

        for (id, handler) in snapshot {
            let name = handler.name().to_string();
            let call = std::panic::AssertUnwindSafe(handler.handle(message));
            match tokio::time::timeout(self.timeout, futures::FutureExt::catch_unwind(call)).await {
                Ok(Ok(Ok(()))) => delivered += 1,
                Ok(Ok(Err(e))) => {
                    warn!(handler = %name, handler_id = %id, error = %e, "message handler failed");
                }
                Ok(Err(_panic)) => {
                    warn!(handler = %name, handler_id = %id, "message handler panicked");
                }
                Err(_timeout) => {
                    warn!(
                        handler = %name,
                        handler_id = %id,
                        timeout_ms = self.timeout.as_millis() as u64,
                        "message handler timed out"
                    );
                }
            }
        }

        delivered
    }
}
