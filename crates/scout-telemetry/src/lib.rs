mod logging;

pub use logging::{LogQuery, LogRecord, SqliteLogLayer, SqliteLogSink};

use std::path::PathBuf;
use std::sync::Arc;

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Configuration for the telemetry subsystem.
#[derive(Clone, Debug)]
pub struct TelemetryConfig {
    /// Default log level. Overridden by RUST_LOG env var.
    pub log_level: Level,
    /// Per-module level overrides (e.g. "scout_realtime" => DEBUG).
    pub module_levels: Vec<(String, Level)>,
    /// Emit JSON lines instead of human-readable output.
    pub json: bool,
    /// Where to persist warn+ logs; `None` disables the SQLite sink.
    pub log_db_path: Option<PathBuf>,
    /// Persisted records older than this many days are pruned at startup.
    pub retention_days: u32,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: Level::INFO,
            module_levels: Vec::new(),
            json: false,
            log_db_path: None,
            retention_days: 7,
        }
    }
}

impl TelemetryConfig {
    /// Parse a level name, falling back to INFO for unknown names.
    pub fn parse_level(name: &str) -> Level {
        name.trim().parse().unwrap_or(Level::INFO)
    }

    /// The filter directive string built from the level and module overrides.
    pub fn filter_directives(&self) -> String {
        let mut filter_str = self.log_level.to_string().to_lowercase();
        for (module, level) in &self.module_levels {
            filter_str.push_str(&format!(",{}={}", module, level.to_string().to_lowercase()));
        }
        filter_str
    }
}

/// Keeps the persisted log sink reachable for the lifetime of the process.
pub struct TelemetryGuard {
    log_sink: Option<Arc<SqliteLogSink>>,
}

impl TelemetryGuard {
    /// Access the log sink for querying persisted logs.
    pub fn logs(&self) -> Option<&SqliteLogSink> {
        self.log_sink.as_deref()
    }
}

/// Initialize the telemetry subsystem. Call once at startup.
pub fn init_telemetry(config: TelemetryConfig) -> TelemetryGuard {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.filter_directives()));

    let fmt_layer = if config.json {
        tracing_subscriber::fmt::layer()
            .json()
            .with_target(true)
            .with_span_list(true)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer().with_target(true).boxed()
    };

    // Optional SQLite log sink for warn+ logs
    let (sqlite_layer, sqlite_sink) = match &config.log_db_path {
        Some(path) => match SqliteLogSink::new(path) {
            Ok(sink) => {
                let sink = Arc::new(sink);
                (Some(SqliteLogLayer::new(sink.clone())), Some(sink))
            }
            Err(e) => {
                eprintln!("scout-telemetry: failed to open log DB: {e}");
                (None, None)
            }
        },
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(fmt_layer.with_filter(env_filter))
        .with(sqlite_layer)
        .init();

    if let Some(sink) = &sqlite_sink {
        match sink.prune_older_than(config.retention_days) {
            Ok(0) => {}
            Ok(removed) => tracing::debug!(removed, "pruned persisted log records"),
            Err(e) => tracing::warn!(error = %e, "failed to prune persisted logs"),
        }
    }

    TelemetryGuard {
        log_sink: sqlite_sink,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filter_directives_include_module_overrides() {
        let config = TelemetryConfig {
            log_level: Level::WARN,
            module_levels: vec![("scout_realtime".into(), Level::DEBUG)],
            ..Default::default()
        };
        assert_eq!(config.filter_directives(), "warn,scout_realtime=debug");
    }

    #[test]
    fn parse_level_falls_back_to_info() {
        assert_eq!(TelemetryConfig::parse_level("DEBUG"), Level::DEBUG);
        assert_eq!(TelemetryConfig::parse_level("warn"), Level::WARN);
        assert_eq!(TelemetryConfig::parse_level("loud"), Level::INFO);
    }

    #[test]
    fn sqlite_disabled_by_default() {
        let config = TelemetryConfig::default();
        assert!(config.log_db_path.is_none());
        assert_eq!(config.retention_days, 7);
    }
}
