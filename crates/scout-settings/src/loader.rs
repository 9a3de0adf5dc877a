//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`ScoutSettings::default()`]
//! 2. If the settings file exists, deep-merge its values over the defaults
//! 3. Load `.env` from the working directory into the process environment
//! 4. Apply environment variable overrides (highest priority)
//! 5. Validate
//!
//! Deep merge rules:
//! - Objects are merged recursively (source overrides target per-key)
//! - Arrays and primitives are replaced entirely by source
//! - Null values in source are skipped (preserving target)

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::{debug, warn};

use crate::errors::{Result, SettingsError};
use crate::types::{LoginType, ScoutSettings};

/// Resolve the path to the settings file (`~/.scout/settings.json`).
pub fn settings_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".scout").join("settings.json")
}

/// Load settings from the default path with `.env` and env var overrides.
pub fn load_settings() -> Result<ScoutSettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific path with `.env` and env var overrides.
///
/// A missing file yields defaults. Invalid JSON or a value rejected by
/// [`validate`] is an error.
pub fn load_settings_from_path(path: &Path) -> Result<ScoutSettings> {
    load_dotenv();
    let mut settings = load_file_layer(path)?;
    apply_env_overrides(&mut settings);
    validate(&settings)?;
    Ok(settings)
}

/// Defaults merged with the settings file, without env overrides.
pub fn load_file_layer(path: &Path) -> Result<ScoutSettings> {
    let defaults = serde_json::to_value(ScoutSettings::default())?;

    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path)?;
        let user: Value = serde_json::from_str(&content)?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };

    Ok(serde_json::from_value(merged)?)
}

fn load_dotenv() {
    match dotenvy::dotenv() {
        Ok(path) => debug!(?path, "loaded .env"),
        Err(e) if e.not_found() => {}
        Err(e) => warn!(error = %e, "failed to load .env, ignoring"),
    }
}

/// Recursive deep merge of two JSON values.
pub fn deep_merge(target: Value, source: Value) -> Value {
    match (target, source) {
        (Value::Object(mut target_map), Value::Object(source_map)) => {
            for (key, source_val) in source_map {
                if source_val.is_null() {
                    continue;
                }
                let merged = if let Some(target_val) = target_map.remove(&key) {
                    deep_merge(target_val, source_val)
                } else {
                    source_val
                };
                let _ = target_map.insert(key, merged);
            }
            Value::Object(target_map)
        }
        (_, source) => source,
    }
}

/// Reject values the components cannot run with.
pub fn validate(settings: &ScoutSettings) -> Result<()> {
    if settings.forwarder.batch_size == 0 {
        return Err(SettingsError::InvalidValue(
            "forwarder.batchSize must be at least 1".into(),
        ));
    }
    if settings.realtime.history_capacity == 0 {
        return Err(SettingsError::InvalidValue(
            "realtime.historyCapacity must be at least 1".into(),
        ));
    }
    if settings.realtime.heartbeat_interval_ms == 0 {
        return Err(SettingsError::InvalidValue(
            "realtime.heartbeatIntervalMs must be at least 1".into(),
        ));
    }
    if settings.forwarder.max_queue_size == Some(0) {
        return Err(SettingsError::InvalidValue(
            "forwarder.maxQueueSize must be at least 1 when set".into(),
        ));
    }
    Ok(())
}

/// Apply environment variable overrides to loaded settings.
///
/// Variable names are the ones the deployment environment already uses.
/// Second-based variables are converted to milliseconds. Invalid values are
/// ignored with a warning.
pub fn apply_env_overrides(settings: &mut ScoutSettings) {
    // ── Control plane ───────────────────────────────────────────────
    if let Some(v) = read_env_string("CENTER_SERVER_URL") {
        settings.control_plane.url = Some(v);
    }
    if let Some(v) = read_env_string("CENTER_SERVER_TOKEN") {
        settings.control_plane.token = Some(v);
    }

    // ── Forwarder ───────────────────────────────────────────────────
    if let Some(v) = read_env_usize("FORWARD_BATCH_SIZE", 1, 1_000) {
        settings.forwarder.batch_size = v;
    }
    if let Some(v) = read_env_usize("MAX_QUEUE_SIZE", 1, 10_000_000) {
        settings.forwarder.max_queue_size = Some(v);
    }

    // ── Realtime ────────────────────────────────────────────────────
    if let Some(v) = read_env_secs_as_ms("WS_RECONNECT_INTERVAL", 0.0, 3_600.0) {
        settings.realtime.reconnect_interval_ms = v;
    }
    if let Some(v) = read_env_u64("WS_MAX_RECONNECT_ATTEMPTS", 0, 10_000) {
        settings.realtime.max_reconnect_attempts = v as u32;
    }
    if let Some(v) = read_env_string("WS_ENDPOINT_URL") {
        settings.realtime.endpoint_url = Some(v);
    }
    if let Some(v) = read_env_string("WS_COOKIE") {
        settings.realtime.cookie = Some(v);
    }

    // ── Site ────────────────────────────────────────────────────────
    if let Some(v) = read_env_string("ZHILIAN_USERNAME").or_else(|| read_env_string("USERNAME")) {
        settings.site.username = Some(v);
    }
    if let Some(v) = read_env_string("LOGIN_TYPE") {
        match parse_login_type(&v) {
            Some(t) => settings.site.login_type = t,
            None => warn!(key = "LOGIN_TYPE", value = %v, "invalid login type, ignoring"),
        }
    }
    if let Some(v) = read_env_bool("HEADLESS") {
        settings.site.headless = v;
    }
    if let Some(v) = read_env_secs_as_ms("BROWSER_TIMEOUT", 1.0, 3_600.0) {
        settings.site.browser_timeout_ms = v;
    }
    if let Some(v) = read_env_secs_as_ms("REQUEST_DELAY", 0.0, 600.0) {
        settings.site.request_delay_ms = v;
    }
    if let Some(v) = read_env_u64("MAX_RETRY_ATTEMPTS", 0, 100) {
        settings.site.max_retry_attempts = v as u32;
    }

    // ── Logging ─────────────────────────────────────────────────────
    if let Some(v) = read_env_string("LOG_LEVEL") {
        settings.logging.level = v.to_lowercase();
    }
    if let Some(v) = read_env_string("LOG_DB_PATH") {
        settings.logging.db_path = Some(v);
    }
}

// ── Pure parsing functions (testable without env vars) ──────────────────────

/// Parse a string as a boolean.
///
/// Accepts (case-insensitive): `true`/`1`/`yes`/`on` or `false`/`0`/`no`/`off`.
pub fn parse_bool(val: &str) -> Option<bool> {
    match val.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Parse a string as a `u64` within a range.
pub fn parse_u64_range(val: &str, min: u64, max: u64) -> Option<u64> {
    let n: u64 = val.trim().parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Parse a string as a `usize` within a range.
pub fn parse_usize_range(val: &str, min: usize, max: usize) -> Option<usize> {
    let n: usize = val.trim().parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Parse fractional seconds within a range, returned as milliseconds.
pub fn parse_secs_as_ms(val: &str, min: f64, max: f64) -> Option<u64> {
    let secs: f64 = val.trim().parse().ok()?;
    (secs.is_finite() && secs >= min && secs <= max).then(|| (secs * 1_000.0).round() as u64)
}

/// Parse a login type name.
pub fn parse_login_type(val: &str) -> Option<LoginType> {
    match val.trim().to_lowercase().as_str() {
        "sms" => Some(LoginType::Sms),
        "qrcode" => Some(LoginType::Qrcode),
        _ => None,
    }
}

// ── Env var readers (thin wrappers) ─────────────────────────────────────────

fn read_env_string(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

fn read_env_bool(name: &str) -> Option<bool> {
    let val = std::env::var(name).ok()?;
    let result = parse_bool(&val);
    if result.is_none() {
        warn!(key = name, value = %val, "invalid boolean env var, ignoring");
    }
    result
}

fn read_env_u64(name: &str, min: u64, max: u64) -> Option<u64> {
    let val = std::env::var(name).ok()?;
    let result = parse_u64_range(&val, min, max);
    if result.is_none() {
        warn!(key = name, value = %val, "invalid u64 env var, ignoring");
    }
    result
}

fn read_env_usize(name: &str, min: usize, max: usize) -> Option<usize> {
    let val = std::env::var(name).ok()?;
    let result = parse_usize_range(&val, min, max);
    if result.is_none() {
        warn!(key = name, value = %val, "invalid usize env var, ignoring");
    }
    result
}

fn read_env_secs_as_ms(name: &str, min: f64, max: f64) -> Option<u64> {
    let val = std::env::var(name).ok()?;
    let result = parse_secs_as_ms(&val, min, max);
    if result.is_none() {
        warn!(key = name, value = %val, "invalid seconds env var, ignoring");
    }
    result
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
