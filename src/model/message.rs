//! A single turn in a conversation.

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    #[serde(rename = "system")]
    System,
    #[serde(rename = "user")]
    User,
    #[serde(rename = "assistant")]
    Assistant,
    // "function" is the deprecated wire name for the same role
    #[serde(rename = "tool", alias = "function")]
    Tool,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::Tool => "tool",
        }
    }
}

/// A model's request to invoke a tool, attached to an assistant message.
/// Arguments are stored as a parsed JSON value; they are stringified
/// only at the request-payload boundary.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolCallData {
    pub name: String,
    pub arguments: Value,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    #[serde(default)]
    pub content: String,
    /// Present only on assistant messages. The persisted field name
    /// matches the OpenAI record shape.
    #[serde(
        rename = "function_call",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub tool_call: Option<ToolCallData>,
    /// For tool-role messages: the name of the tool call this message
    /// answers. Captured at creation time so deleting or reordering the
    /// preceding assistant message cannot orphan it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl Message {
    pub fn new(role: Role, content: &str) -> Self {
        Self {
            role,
            content: content.to_string(),
            tool_call: None,
            name: None,
        }
    }

    pub fn new_tool_call(content: &str, tool_call: ToolCallData) -> Self {
        Self {
            role: Role::Assistant,
            content: content.to_string(),
            tool_call: Some(tool_call),
            name: None,
        }
    }

    pub fn new_tool_response(content: &str, name: &str) -> Self {
        Self {
            role: Role::Tool,
            content: content.to_string(),
            tool_call: None,
            name: Some(name.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_role_serialization() {
        assert_eq!(serde_json::to_string(&Role::System).unwrap(), r#""system""#);
        assert_eq!(
            serde_json::to_string(&Role::Assistant).unwrap(),
            r#""assistant""#
        );
        assert_eq!(serde_json::to_string(&Role::User).unwrap(), r#""user""#);
        assert_eq!(serde_json::to_string(&Role::Tool).unwrap(), r#""tool""#);
    }

    #[test]
    fn test_role_accepts_legacy_function_name() {
        assert_eq!(
            serde_json::from_str::<Role>(r#""function""#).unwrap(),
            Role::Tool
        );
    }

    #[test]
    fn test_plain_message_round_trip() {
        let msg = Message::new(Role::User, "Hello");
        assert_eq!(
            serde_json::to_string(&msg).unwrap(),
            r#"{"role":"user","content":"Hello"}"#
        );
        let parsed: Message = serde_json::from_str(r#"{"role":"user","content":"Hello"}"#).unwrap();
        assert_eq!(parsed, msg);
    }

    #[test]
    fn test_tool_call_serialized_as_function_call() {
        let msg = Message::new_tool_call(
            "",
            ToolCallData {
                name: "get_weather".to_string(),
                arguments: json!({"city": "Paris"}),
            },
        );
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["function_call"]["name"], "get_weather");
        assert_eq!(value["function_call"]["arguments"]["city"], "Paris");
    }

    #[test]
    fn test_tool_response_keeps_name() {
        let msg = Message::new_tool_response("{\"temp\": 21}", "get_weather");
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["role"], "tool");
        assert_eq!(value["name"], "get_weather");
    }

    #[test]
    fn test_missing_content_backfilled() {
        let parsed: Message = serde_json::from_str(r#"{"role":"system"}"#).unwrap();
        assert_eq!(parsed.content, "");
    }
}
