//! Shared data model for the Scout relay agent: identifiers, outbound events,
//! operator commands, realtime connection types and the transport error
//! taxonomy used by every other crate in the workspace.

pub mod commands;
pub mod errors;
pub mod events;
pub mod ids;
pub mod realtime;

pub use commands::{command_types, Acknowledgement, Command, CommandResult};
pub use errors::{CollaboratorError, ControlPlaneError, HandlerError};
pub use events::{now_millis, ChatMessage, EventCategory, OutboundEvent};
pub use ids::{BatchId, CommandId, EventId};
pub use realtime::{AuthContext, ConnectionState, Endpoint, InboundMessage};

/// Platform tag stamped on events that originate from the recruitment site.
pub const PLATFORM: &str = "zhilian";
