//! # scout-runtime
//!
//! Collaborator contracts ([`SessionProvider`], [`SiteAutomation`]), their
//! browser-free implementations, and the [`Orchestrator`] that binds them to
//! the realtime channel, the outbound forwarder and the command channel.

pub mod collaborators;
pub mod config;
mod error;
mod handlers;
pub mod offline;
mod orchestrator;

pub use collaborators::{
    ChatSummary, GreetingDetail, GreetingSummary, SearchQuery, SessionProvider, SiteAutomation, SiteMessage,
};
pub use config::{BotIdentity, BrowserHeaders, RuntimeConfig};
pub use error::RuntimeError;
pub use handlers::ForwardingHandler;
pub use offline::{ConfiguredSession, OfflineSite};
pub use orchestrator::{Orchestrator, OrchestratorStatus};
