//! Action payload encoding.
//!
//! An agent reply is free text carrying exactly one JSON object between
//! `<json>` and `</json>`. The object has two required keys: `name` (an
//! operation name, or `respond`) and `arguments` (an object; for `respond`
//! it must hold a string `content`). Text outside the delimiters is ignored.

use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::ProtocolError;
use crate::message::{Action, RESPOND_ACTION_NAME};

/// Delimiter tag around the action payload.
pub const PAYLOAD_TAG: &str = "json";

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct Payload {
    name: String,
    arguments: Value,
}

fn payload_regex() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)<json>(.*?)</json>").ok())
        .as_ref()
}

/// Extracts and decodes the single action in `reply`.
pub fn decode_action(reply: &str) -> Result<Action, ProtocolError> {
    let re = payload_regex().ok_or_else(|| malformed("payload pattern failed to compile"))?;
    let payloads: Vec<&str> = re
        .captures_iter(reply)
        .filter_map(|c| c.get(1).map(|m| m.as_str()))
        .collect();
    let raw = match payloads.as_slice() {
        [] => return Err(ProtocolError::MissingPayload { tag: PAYLOAD_TAG }),
        [one] => *one,
        many => return Err(ProtocolError::MultiplePayloads { count: many.len() }),
    };

    let payload: Payload = serde_json::from_str(raw.trim()).map_err(|e| malformed(e.to_string()))?;
    if payload.name.trim().is_empty() {
        return Err(malformed("`name` is empty"));
    }
    let Value::Object(arguments) = payload.arguments else {
        return Err(malformed("`arguments` must be an object"));
    };
    if payload.name == RESPOND_ACTION_NAME {
        return match arguments.get("content") {
            Some(Value::String(content)) => Ok(Action::respond(content.clone())),
            _ => Err(malformed("`respond` needs a string `content` argument")),
        };
    }
    Ok(Action::tool_call(payload.name, Value::Object(arguments)))
}

/// Encodes an action the way an agent is expected to send it.
#[must_use]
pub fn encode_action(action: &Action) -> String {
    let payload = match action {
        Action::Respond { content } => json!({
            "name": RESPOND_ACTION_NAME,
            "arguments": {"content": content},
        }),
        Action::ToolCall(call) => json!({
            "name": call.name,
            "arguments": call.arguments,
        }),
    };
    let body = serde_json::to_string_pretty(&payload).unwrap_or_else(|_| payload.to_string());
    format!("<{PAYLOAD_TAG}>\n{body}\n</{PAYLOAD_TAG}>")
}

fn malformed(reason: impl Into<String>) -> ProtocolError {
    ProtocolError::MalformedPayload {
        reason: reason.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_tool_call_and_ignores_prose() {
        let reply = r#"Let me check that for you.
<json>
{"name": "get_account_details", "arguments": {"account_id": "acc_0001"}}
</json>
One moment."#;
        let action = decode_action(reply).unwrap();
        assert_eq!(
            action,
            Action::tool_call("get_account_details", json!({"account_id": "acc_0001"}))
        );
    }

    #[test]
    fn decodes_respond() {
        let action =
            decode_action(r#"<json>{"name": "respond", "arguments": {"content": "Hello!"}}</json>"#)
                .unwrap();
        assert_eq!(action, Action::respond("Hello!"));
    }

    #[test]
    fn two_payloads_are_a_violation() {
        let reply = r#"<json>{"name": "respond", "arguments": {"content": "a"}}</json>
<json>{"name": "freeze_card", "arguments": {"card_id": "c1", "reason": "lost"}}</json>"#;
        assert_eq!(
            decode_action(reply).unwrap_err(),
            ProtocolError::MultiplePayloads { count: 2 }
        );
    }

    #[test]
    fn missing_or_malformed_payloads_are_violations() {
        assert_eq!(
            decode_action("I will freeze the card now.").unwrap_err(),
            ProtocolError::MissingPayload { tag: "json" }
        );
        for bad in [
            r#"<json>{"name": "respond"}</json>"#,
            r#"<json>{"name": "respond", "arguments": {"text": "hi"}}</json>"#,
            r#"<json>{"name": "freeze_card", "arguments": [1]}</json>"#,
            r#"<json>{"name": "freeze_card", "arguments": {}, "extra": 1}</json>"#,
            r#"<json>{"name": "freeze_card", "arguments": {}</json>"#,
        ] {
            assert!(
                matches!(decode_action(bad), Err(ProtocolError::MalformedPayload { .. })),
                "{bad}"
            );
        }
    }

    #[test]
    fn encoded_actions_decode_back() {
        let action = Action::tool_call("cancel_booking", json!({"booking_id": "TAU001"}));
        assert_eq!(decode_action(&encode_action(&action)).unwrap(), action);
        let action = Action::respond("Your booking is cancelled.");
        assert_eq!(decode_action(&encode_action(&action)).unwrap(), action);
    }
}
