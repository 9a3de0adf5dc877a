use std::collections::VecDeque;

use parking_lot::Mutex;
use scout_core::InboundMessage;

/// Bounded ring buffer of recently received messages. Oldest entries are
/// evicted first.
pub struct MessageHistory {
    entries: Mutex<VecDeque<InboundMessage>>,
    capacity: usize,
}

impl MessageHistory {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
        }
    }

    pub fn push(&self, message: InboundMessage) {
        let mut entries = self.entries.lock();
        if entries.len() == self.capacity {
            let _ = entries.pop_front();
        }
        entries.push_back(message);
    }

    /// The newest `limit` messages, oldest first.
    pub fn recent(&self, limit: usize) -> Vec<InboundMessage> {
        let entries = self.entries.lock();
        let skip = entries.len().saturating_sub(limit);
        entries.iter().skip(skip).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
