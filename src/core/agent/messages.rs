//! Agent control events and function-call messages.
//!
//! The agent sends JSON text frames tagged by `type`. Only two tags drive the
//! relay; everything else is logged and dropped:
//!
//! ```json
//! {"type": "UserStartedSpeaking"}
//! {"type": "FunctionCallRequest", "functions": [
//!     {"id": "fc_1", "name": "get_menu", "arguments": "{\"category\":\"drinks\"}"}
//! ]}
//! ```
//!
//! Tags are accepted in both snake_case and PascalCase. Function arguments
//! may arrive either as a JSON-encoded string or as an object.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// Placeholder used when a request omits its id or name.
pub const UNKNOWN_FIELD: &str = "unknown";

/// Control events the relay reacts to.
#[derive(Debug, Clone, PartialEq)]
pub enum ControlEvent {
    /// The caller started talking over the agent
    UserStartedSpeaking,
    /// The agent wants one or more functions invoked
    FunctionCallRequest(Vec<FunctionCallRequest>),
    /// Anything else
    Other { event_type: Option<String> },
}

/// An agent text frame that could not be decoded.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EventError {
    #[error("Invalid agent event: {0}")]
    Decode(String),

    #[error("Agent event is not a JSON object")]
    NotAnObject,
}

#[derive(Deserialize)]
#[serde(tag = "type")]
enum KnownEvent {
    #[serde(rename = "user_started_speaking", alias = "UserStartedSpeaking")]
    UserStartedSpeaking,

    #[serde(rename = "function_call_request", alias = "FunctionCallRequest")]
    FunctionCallRequest {
        #[serde(default)]
        functions: Vec<Value>,
    },
}

const KNOWN_TAGS: [&str; 4] = [
    "user_started_speaking",
    "UserStartedSpeaking",
    "function_call_request",
    "FunctionCallRequest",
];

impl ControlEvent {
    /// Decode one agent text frame.
    pub fn parse(text: &str) -> Result<Self, EventError> {
        let value: Value =
            serde_json::from_str(text).map_err(|e| EventError::Decode(e.to_string()))?;
        if !value.is_object() {
            return Err(EventError::NotAnObject);
        }

        let event_type = value.get("type").and_then(Value::as_str).map(str::to_owned);
        let known = event_type
            .as_deref()
            .is_some_and(|tag| KNOWN_TAGS.contains(&tag));
        if !known {
            return Ok(ControlEvent::Other { event_type });
        }

        let event: KnownEvent =
            serde_json::from_value(value).map_err(|e| EventError::Decode(e.to_string()))?;
        Ok(match event {
            KnownEvent::UserStartedSpeaking => ControlEvent::UserStartedSpeaking,
            KnownEvent::FunctionCallRequest { functions } => ControlEvent::FunctionCallRequest(
                functions.iter().map(FunctionCallRequest::from_value).collect(),
            ),
        })
    }
}

/// One function the agent asked for.
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionCallRequest {
    /// Request id, echoed in the response
    pub id: String,
    /// Function name
    pub name: String,
    /// Arguments as sent: a JSON string, an object, or null
    pub arguments: Value,
    /// Set when the request itself is unusable
    pub problem: Option<String>,
}

impl FunctionCallRequest {
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: Value) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments,
            problem: None,
        }
    }

    /// Read one entry of a request's `functions` array.
    ///
    /// Never fails: missing ids and names become `"unknown"` and the entry is
    /// flagged so the dispatcher answers it with an error.
    pub fn from_value(value: &Value) -> Self {
        let Some(entry) = value.as_object() else {
            return Self {
                id: UNKNOWN_FIELD.to_string(),
                name: UNKNOWN_FIELD.to_string(),
                arguments: Value::Null,
                problem: Some("Function call entry is not an object".to_string()),
            };
        };

        let id = entry.get("id").and_then(Value::as_str);
        let name = entry.get("name").and_then(Value::as_str);
        let problem = match (id, name) {
            (Some(_), Some(_)) => None,
            (None, Some(_)) => Some("Function call is missing an id".to_string()),
            (_, None) => Some("Function call is missing a name".to_string()),
        };

        Self {
            id: id.unwrap_or(UNKNOWN_FIELD).to_string(),
            name: name.unwrap_or(UNKNOWN_FIELD).to_string(),
            arguments: entry.get("arguments").cloned().unwrap_or(Value::Null),
            problem,
        }
    }

    /// Arguments as a JSON object.
    ///
    /// Accepts an encoded string, an object, or nothing at all (no arguments).
    pub fn parse_arguments(&self) -> Result<Map<String, Value>, String> {
        match &self.arguments {
            Value::Null => Ok(Map::new()),
            Value::Object(map) => Ok(map.clone()),
            Value::String(encoded) if encoded.trim().is_empty() => Ok(Map::new()),
            Value::String(encoded) => match serde_json::from_str::<Value>(encoded) {
                Ok(Value::Object(map)) => Ok(map),
                Ok(_) => Err("arguments must be a JSON object".to_string()),
                Err(e) => Err(format!("arguments are not valid JSON: {e}")),
            },
            _ => Err("arguments must be a JSON object".to_string()),
        }
    }
}

/// Reply to one function call. `content` carries the JSON-encoded result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionCallResponse {
    #[serde(rename = "type")]
    pub message_type: String,
    pub id: String,
    pub name: String,
    pub content: String,
}

impl FunctionCallResponse {
    pub const MESSAGE_TYPE: &'static str = "function_call_response";

    pub fn new(id: impl Into<String>, name: impl Into<String>, content: &Value) -> Self {
        Self {
            message_type: Self::MESSAGE_TYPE.to_string(),
            id: id.into(),
            name: name.into(),
            content: content.to_string(),
        }
    }
}
