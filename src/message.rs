//! Actions and observations exchanged between the environment and the agent.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Reserved action name for replying to the user in free text.
pub const RESPOND_ACTION_NAME: &str = "respond";

/// A request to invoke one toolkit operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Operation name.
    pub name: String,
    /// Arguments object.
    #[serde(default = "empty_object")]
    pub arguments: Value,
}

fn empty_object() -> Value {
    Value::Object(serde_json::Map::new())
}

impl ToolCall {
    /// Creates a tool call.
    #[must_use]
    pub fn new(name: impl Into<String>, arguments: Value) -> Self {
        Self {
            name: name.into(),
            arguments,
        }
    }
}

/// One decoded agent action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Action {
    /// Free-text reply to the simulated user.
    Respond {
        /// Message text.
        content: String,
    },
    /// Operation invocation.
    ToolCall(ToolCall),
}

impl Action {
    /// Creates a respond action.
    #[must_use]
    pub fn respond(content: impl Into<String>) -> Self {
        Self::Respond {
            content: content.into(),
        }
    }

    /// Creates a tool-call action.
    #[must_use]
    pub fn tool_call(name: impl Into<String>, arguments: Value) -> Self {
        Self::ToolCall(ToolCall::new(name, arguments))
    }

    /// The operation name, or [`RESPOND_ACTION_NAME`].
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Respond { .. } => RESPOND_ACTION_NAME,
            Self::ToolCall(call) => &call.name,
        }
    }

    /// Returns true for a respond action.
    #[must_use]
    pub const fn is_respond(&self) -> bool {
        matches!(self, Self::Respond { .. })
    }
}

/// What an observation carries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ObservationKind {
    /// A message from the simulated user.
    UserMessage,
    /// The result of an operation invocation.
    ToolResult {
        /// Operation name.
        tool: String,
        /// True when the operation raised a precondition violation.
        error: bool,
    },
    /// A harness notice (run ended without a user message).
    Notice,
}

/// Text handed to the agent after each action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Observation {
    /// Origin of the content.
    #[serde(flatten)]
    pub kind: ObservationKind,
    /// Content relayed to the agent.
    pub content: String,
}

impl Observation {
    /// A user message.
    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            kind: ObservationKind::UserMessage,
            content: content.into(),
        }
    }

    /// A successful tool result.
    #[must_use]
    pub fn tool_result(tool: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            kind: ObservationKind::ToolResult {
                tool: tool.into(),
                error: false,
            },
            content: content.into(),
        }
    }

    /// A tool error.
    #[must_use]
    pub fn tool_error(tool: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            kind: ObservationKind::ToolResult {
                tool: tool.into(),
                error: true,
            },
            content: content.into(),
        }
    }

    /// A harness notice.
    #[must_use]
    pub fn notice(content: impl Into<String>) -> Self {
        Self {
            kind: ObservationKind::Notice,
            content: content.into(),
        }
    }

    /// Returns true for a tool error.
    #[must_use]
    pub const fn is_tool_error(&self) -> bool {
        matches!(self.kind, ObservationKind::ToolResult { error: true, .. })
    }
}

impl fmt::Display for Observation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn action_names() {
        assert_eq!(Action::respond("hi").name(), RESPOND_ACTION_NAME);
        assert_eq!(Action::tool_call("get_account_details", json!({})).name(), "get_account_details");
        assert!(Action::respond("hi").is_respond());
    }

    #[test]
    fn action_serialization_is_tagged() {
        let action = Action::tool_call("freeze_card", json!({"card_id": "card_1"}));
        let value = serde_json::to_value(&action).unwrap();
        assert_eq!(value["kind"], "tool_call");
        assert_eq!(value["name"], "freeze_card");
        let back: Action = serde_json::from_value(value).unwrap();
        assert_eq!(back, action);
    }

    #[test]
    fn tool_call_defaults_to_empty_arguments() {
        let call: ToolCall = serde_json::from_value(json!({"name": "list_all_destinations"})).unwrap();
        assert_eq!(call.arguments, json!({}));
    }

    #[test]
    fn tool_error_observation() {
        let obs = Observation::tool_error("freeze_card", "Error: Card not found: c9");
        assert!(obs.is_tool_error());
        assert!(!Observation::user("hello").is_tool_error());
        assert_eq!(obs.to_string(), "Error: Card not found: c9");
    }
}
