//! # scout-realtime
//!
//! Bidirectional channel to the recruitment site's live-update endpoint:
//! WebSocket connect with session cookies and headers, application-level
//! heartbeat, bounded reconnect, a ring buffer of recent inbound messages and
//! an isolated handler registry.

mod channel;
mod error;
mod handlers;
mod history;

pub use channel::{RealtimeChannel, RealtimeConfig};
pub use error::RealtimeError;
pub use handlers::{FnHandler, HandlerId, HandlerRegistry, MessageHandler};
pub use history::MessageHistory;
