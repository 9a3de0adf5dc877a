//! # scout-relay
//!
//! Everything that talks to the control-plane server: the HTTP client, the
//! batching [`OutboundForwarder`] and the [`CommandChannel`].

mod client;
mod commands;
mod forwarder;
mod wire;

pub use client::{ControlPlaneClient, ControlPlaneConfig};
pub use commands::{CommandChannel, CommandConfig, CommandHandler};
pub use forwarder::{DeliveryOutcome, ForwarderConfig, ForwarderStatus, OutboundForwarder};
pub use wire::{BatchEnvelope, BotDescriptor, HeartbeatBody};
