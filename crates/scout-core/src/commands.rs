use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::events::now_millis;
use crate::ids::CommandId;

/// Command types the control plane is known to issue.
pub mod command_types {
    pub const SEARCH_CANDIDATES: &str = "search_candidates";
    pub const SEND_GREETING: &str = "send_greeting";
    pub const GET_CHAT_LIST: &str = "get_chat_list";
    pub const SEND_MESSAGE: &str = "send_message";

    pub const ALL: [&str; 4] = [SEARCH_CANDIDATES, SEND_GREETING, GET_CHAT_LIST, SEND_MESSAGE];
}

/// Message reported for a command type with no registered handler.
pub const UNKNOWN_COMMAND_MESSAGE: &str = "unknown command type";

/// An operator command pulled from the control plane.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Command {
    #[serde(deserialize_with = "id_from_string_or_number")]
    pub id: CommandId,
    #[serde(rename = "type")]
    pub command_type: String,
    #[serde(default = "empty_params", deserialize_with = "params_or_empty")]
    pub params: Value,
}

fn id_from_string_or_number<'de, D>(deserializer: D) -> Result<CommandId, D::Error>
where
    D: serde::Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(s) if !s.is_empty() => Ok(CommandId::from_raw(s)),
        Value::Number(n) => Ok(CommandId::from_raw(n.to_string())),
        other => Err(serde::de::Error::custom(format!(
            "command id must be a non-empty string or number, got {other}"
        ))),
    }
}

fn empty_params() -> Value {
    Value::Object(Map::new())
}

fn params_or_empty<'de, D>(deserializer: D) -> Result<Value, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(if value.is_null() { empty_params() } else { value })
}

impl Command {
    pub fn new(id: CommandId, command_type: impl Into<String>, params: Value) -> Self {
        Self {
            id,
            command_type: command_type.into(),
            params,
        }
    }

    /// String parameter lookup.
    pub fn param_str(&self, key: &str) -> Option<&str> {
        self.params.get(key).and_then(Value::as_str)
    }
}

/// Outcome of executing a command, sent back in the acknowledgement.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CommandResult {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub count: Option<usize>,
}

impl CommandResult {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: Some(message.into()),
            ..Default::default()
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: Some(message.into()),
            ..Default::default()
        }
    }

    /// Successful result carrying a list, with `count` set to its length.
    pub fn with_items(items: Vec<Value>) -> Self {
        Self {
            success: true,
            count: Some(items.len()),
            data: Some(Value::Array(items)),
            ..Default::default()
        }
    }

    /// Success or failure with the matching message.
    pub fn from_outcome(ok: bool, ok_message: &str, failed_message: &str) -> Self {
        if ok {
            Self::success(ok_message)
        } else {
            Self::failure(failed_message)
        }
    }

    pub fn unknown_command() -> Self {
        Self::failure(UNKNOWN_COMMAND_MESSAGE)
    }
}

/// Body of `POST /commands/{id}/ack`.
#[derive(Clone, Debug, Serialize)]
pub struct Acknowledgement {
    pub command_id: CommandId,
    pub result: CommandResult,
    pub timestamp: i64,
}

impl Acknowledgement {
    pub fn new(command_id: CommandId, result: CommandResult) -> Self {
        Self {
            command_id,
            result,
            timestamp: now_millis(),
        }
    }
}
