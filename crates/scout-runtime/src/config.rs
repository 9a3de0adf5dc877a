//! Mapping from [`ScoutSettings`] to the per-component configuration values.
//!
//! Components never read settings themselves; the orchestrator hands each one
//! an explicit config built here.

use std::time::Duration;

use scout_core::{AuthContext, PLATFORM};
use scout_realtime::RealtimeConfig;
use scout_relay::{BotDescriptor, CommandConfig, ControlPlaneConfig, ForwarderConfig};
use scout_settings::ScoutSettings;
use secrecy::SecretString;

/// Identity sent on registration.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BotIdentity {
    pub bot_id: Option<String>,
    pub name: String,
    pub version: String,
    pub capabilities: Vec<String>,
}

impl BotIdentity {
    pub fn descriptor(&self) -> BotDescriptor {
        BotDescriptor::new(
            PLATFORM,
            self.bot_id.clone(),
            self.name.clone(),
            self.version.clone(),
            self.capabilities.clone(),
        )
    }
}

/// Handshake headers used when the session does not supply its own.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BrowserHeaders {
    pub user_agent: String,
    pub origin: String,
    pub referer: String,
}

impl BrowserHeaders {
    /// Fill the unset browser headers of `auth`.
    pub fn apply(&self, mut auth: AuthContext) -> AuthContext {
        auth.user_agent.get_or_insert_with(|| self.user_agent.clone());
        auth.origin.get_or_insert_with(|| self.origin.clone());
        auth.referer.get_or_insert_with(|| self.referer.clone());
        auth
    }
}

#[derive(Clone, Debug)]
pub struct RuntimeConfig {
    pub control_plane: ControlPlaneConfig,
    pub forwarder: ForwarderConfig,
    pub realtime: RealtimeConfig,
    pub commands: CommandConfig,
    /// Fixed realtime endpoint; when unset the site collaborator resolves it.
    pub realtime_endpoint: Option<String>,
    pub browser_headers: BrowserHeaders,
    /// `None` disables the control-plane heartbeat timer.
    pub control_plane_heartbeat: Option<Duration>,
    pub monitor_interval: Duration,
    pub error_backoff: Duration,
    pub request_delay: Duration,
    pub bot: BotIdentity,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self::from(&ScoutSettings::default())
    }
}

impl From<&ScoutSettings> for RuntimeConfig {
    fn from(s: &ScoutSettings) -> Self {
        let cp = &s.control_plane;
        let rt = &s.realtime;
        Self {
            control_plane: ControlPlaneConfig {
                base_url: cp.url.clone().filter(|u| !u.is_empty()),
                token: cp
                    .token
                    .clone()
                    .filter(|t| !t.is_empty())
                    .map(SecretString::from),
                user_agent: cp.user_agent.clone(),
                batch_timeout: ms(cp.batch_timeout_ms),
                request_timeout: ms(cp.request_timeout_ms),
            },
            forwarder: ForwarderConfig {
                batch_size: s.forwarder.batch_size,
                poll_interval: ms(s.forwarder.poll_interval_ms),
                stop_timeout: ms(s.forwarder.stop_timeout_ms),
                max_queue_size: s.forwarder.max_queue_size,
                source: s.forwarder.source.clone(),
            },
            realtime: RealtimeConfig {
                connect_timeout: ms(rt.connect_timeout_ms),
                heartbeat_interval: ms(rt.heartbeat_interval_ms),
                reconnect_interval: ms(rt.reconnect_interval_ms),
                max_reconnect_attempts: rt.max_reconnect_attempts,
                history_capacity: rt.history_capacity,
                handler_timeout: ms(rt.handler_timeout_ms),
            },
            commands: CommandConfig {
                handler_timeout: ms(s.commands.handler_timeout_ms),
            },
            realtime_endpoint: rt.endpoint_url.clone().filter(|u| !u.is_empty()),
            browser_headers: BrowserHeaders {
                user_agent: rt.user_agent.clone(),
                origin: rt.origin.clone(),
                referer: rt.referer.clone(),
            },
            control_plane_heartbeat: (cp.heartbeat_interval_ms > 0)
                .then(|| ms(cp.heartbeat_interval_ms)),
            monitor_interval: ms(s.monitor.interval_ms),
            error_backoff: ms(s.monitor.error_backoff_ms),
            request_delay: ms(s.site.request_delay_ms),
            bot: BotIdentity {
                bot_id: s.bot.bot_id.clone(),
                name: s.bot.name.clone(),
                version: s.bot.version.clone(),
                capabilities: s.bot.capabilities.clone(),
            },
        }
    }
}

fn ms(value: u64) -> Duration {
    Duration::from_millis(value)
}
