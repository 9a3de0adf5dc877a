//! # scout-settings
//!
//! Layered configuration for the Scout relay agent.
//!
//! Settings are loaded from four layers (lowest priority first):
//! 1. **Compiled defaults**: [`ScoutSettings::default()`]
//! 2. **Settings file**: `~/.scout/settings.json` or an explicit path, deep-merged
//! 3. **`.env`**: loaded from the working directory into the environment
//! 4. **Environment variables**: `CENTER_SERVER_URL`, `WS_RECONNECT_INTERVAL`, ...
//!
//! The loaded [`ScoutSettings`] is a plain value; the binary maps it into each
//! component's config and passes it to constructors.

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{deep_merge, load_settings, load_settings_from_path, settings_path, validate};
pub use types::*;
