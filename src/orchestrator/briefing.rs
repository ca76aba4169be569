//! The first message sent to the agent under test.

use serde_json::{json, Value};

use crate::environment::ResetOutcome;
use crate::message::{Action, RESPOND_ACTION_NAME};
use crate::toolkit::ToolSpec;

use super::codec::{encode_action, PAYLOAD_TAG};

/// Formats the task briefing: policy, tool schema, reply format, examples
/// and the user's opening message.
#[must_use]
pub fn task_briefing(reset: &ResetOutcome) -> String {
    let opening = serde_json::to_string(&reset.observation.content).unwrap_or_default();
    format!(
        "{policy}\n\
         \nHere's a list of tools you can use (you can use at most one tool at a time):\n\
         {tools}\n\
         Please respond in the JSON format. Please wrap the JSON part with \
         <{PAYLOAD_TAG}>...</{PAYLOAD_TAG}> tags.\n\
         The JSON should contain:\n\
         - \"name\": the tool call function name, or \"{RESPOND_ACTION_NAME}\" if you want to respond directly.\n\
         - \"arguments\": the arguments for the tool call, or {{\"content\": \"your message here\"}} \
         if you want to respond directly.\n\
         You should only use one tool at a time!\n\
         You cannot respond to the user and use a tool at the same time!\n\
         \nExamples of responses:\n\
         {tool_example}\n\n\
         {respond_example}\n\n\
         Next, I'll provide you with the user message and tool call results.\n\
         User message: {opening}",
        policy = reset.info.policy.trim_end(),
        tools = tools_json(&reset.info.tools),
        tool_example = encode_action(&tool_example(&reset.info.tools)),
        respond_example = encode_action(&Action::respond("Hello, how can I help you today?")),
    )
}

/// The tool list in OpenAI function format, pretty-printed.
fn tools_json(tools: &[ToolSpec]) -> String {
    let schemas: Vec<Value> = tools.iter().map(ToolSpec::openai_schema).collect();
    serde_json::to_string_pretty(&schemas).unwrap_or_else(|_| "[]".to_string())
}

/// An example call of the first tool, with placeholder arguments.
fn tool_example(tools: &[ToolSpec]) -> Action {
    let Some(tool) = tools.first() else {
        return Action::tool_call("tool_name", json!({}));
    };
    let mut arguments = serde_json::Map::new();
    if let Some(properties) = tool.parameters.get("properties").and_then(Value::as_object) {
        let required: Vec<&str> = tool
            .parameters
            .get("required")
            .and_then(Value::as_array)
            .map(|r| r.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default();
        for (name, schema) in properties {
            if !required.contains(&name.as_str()) {
                continue;
            }
            let placeholder = match schema.get("type").and_then(Value::as_str) {
                Some("number" | "integer") => json!(1),
                Some("boolean") => json!(true),
                Some("array") => json!([]),
                Some("object") => json!({}),
                _ => json!(format!("<{name}>")),
            };
            arguments.insert(name.clone(), placeholder);
        }
    }
    Action::tool_call(tool.name.clone(), Value::Object(arguments))
}
