//! An ordered conversation plus its registered tools and metadata.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::error::ModelError;
use crate::model::message::{Message, Role, ToolCallData};
use crate::model::tool::Tool;

pub const MAX_NAME_LEN: usize = 64;
pub const DEFAULT_NAME: &str = "New chat";

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Language {
    #[default]
    #[serde(rename = "en")]
    En,
    #[serde(rename = "ru")]
    Ru,
}

impl Language {
    pub fn as_str(&self) -> &'static str {
        match self {
            Language::En => "en",
            Language::Ru => "ru",
        }
    }
}

fn default_name() -> String {
    DEFAULT_NAME.to_string()
}

/// All mutation goes through the methods below; collections are never
/// handed out mutably. Missing keys are backfilled with defaults on
/// deserialization so older records keep loading as the schema grows.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Chat {
    #[serde(default = "default_name")]
    name: String,
    #[serde(rename = "lang", default)]
    language: Language,
    #[serde(default)]
    tags: Vec<String>,
    #[serde(default)]
    messages: Vec<Message>,
    #[serde(default)]
    tools: Vec<Tool>,
}

impl Default for Chat {
    fn default() -> Self {
        Self {
            name: default_name(),
            language: Language::En,
            tags: Vec::new(),
            messages: Vec::new(),
            tools: Vec::new(),
        }
    }
}

impl Chat {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a persisted chat record, backfilling missing keys and
    /// validating the invariants a hand-edited file could break.
    /// Pre-migration records using the `dialog`/`functions` key names
    /// are remapped to the current keys before parsing.
    pub fn from_value(mut value: Value) -> Result<Self, ModelError> {
        if let Some(record) = value.as_object_mut() {
            for (old, new) in [("dialog", "messages"), ("functions", "tools")] {
                if !record.contains_key(new)
                    && let Some(moved) = record.remove(old)
                {
                    record.insert(new.to_string(), moved);
                }
            }
        }

        let chat: Chat = serde_json::from_value(value)
            .map_err(|e| ModelError::SchemaValidation(format!("chat: {}", e)))?;
        let mut names = Vec::new();
        for tool in &chat.tools {
            if names.contains(&&tool.name) {
                return Err(ModelError::SchemaValidation(format!(
                    "chat `{}`: duplicate tool `{}`",
                    chat.name, tool.name
                )));
            }
            names.push(&tool.name);
        }
        for (i, msg) in chat.messages.iter().enumerate() {
            if msg.tool_call.is_some() && msg.role != Role::Assistant {
                return Err(ModelError::SchemaValidation(format!(
                    "chat `{}`: message {} has a tool call on a {} message",
                    chat.name,
                    i,
                    msg.role.as_str()
                )));
            }
        }
        Ok(chat)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_name(&mut self, name: &str) {
        self.name = name.chars().take(MAX_NAME_LEN).collect();
    }

    pub fn language(&self) -> Language {
        self.language
    }

    pub fn set_language(&mut self, language: Language) {
        self.language = language;
    }

    pub fn tags(&self) -> &[String] {
        &self.tags
    }

    /// Set semantics with insertion order preserved; adding an existing
    /// tag is a no-op.
    pub fn add_tag(&mut self, tag: &str) {
        if !self.tags.iter().any(|t| t == tag) {
            self.tags.push(tag.to_string());
        }
    }

    pub fn remove_tag(&mut self, tag: &str) -> Result<(), ModelError> {
        let index = self
            .tags
            .iter()
            .position(|t| t == tag)
            .ok_or_else(|| ModelError::NotFound {
                kind: "tag",
                name: tag.to_string(),
            })?;
        self.tags.remove(index);
        Ok(())
    }

    pub fn tools(&self) -> &[Tool] {
        &self.tools
    }

    pub fn add_tool(&mut self, tool: Tool) -> Result<(), ModelError> {
        if self.tools.iter().any(|t| t.name == tool.name) {
            return Err(ModelError::DuplicateTool { name: tool.name });
        }
        self.tools.push(tool);
        Ok(())
    }

    pub fn get_tool(&self, index: usize) -> Result<&Tool, ModelError> {
        self.tools.get(index).ok_or(ModelError::IndexOutOfRange {
            kind: "tools",
            index,
            len: self.tools.len(),
        })
    }

    pub fn edit_tool(&mut self, index: usize, tool: Tool) -> Result<(), ModelError> {
        if index >= self.tools.len() {
            return Err(ModelError::IndexOutOfRange {
                kind: "tools",
                index,
                len: self.tools.len(),
            });
        }
        if self
            .tools
            .iter()
            .enumerate()
            .any(|(i, t)| i != index && t.name == tool.name)
        {
            return Err(ModelError::DuplicateTool { name: tool.name });
        }
        self.tools[index] = tool;
        Ok(())
    }

    pub fn remove_tool(&mut self, index: usize) -> Result<Tool, ModelError> {
        if index >= self.tools.len() {
            return Err(ModelError::IndexOutOfRange {
                kind: "tools",
                index,
                len: self.tools.len(),
            });
        }
        Ok(self.tools.remove(index))
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn message_count(&self) -> usize {
        self.messages.len()
    }

    pub fn last_role(&self) -> Option<Role> {
        self.messages.last().map(|m| m.role)
    }

    /// Advisory default for "add next message": system opens, user and
    /// assistant alternate, and an assistant tool call is answered by a
    /// tool message. Callers may still set any role explicitly.
    pub fn next_role(&self) -> Role {
        match self.messages.last() {
            None => Role::System,
            Some(last) => match last.role {
                Role::System => Role::User,
                Role::User => Role::Assistant,
                Role::Assistant => {
                    if last.tool_call.is_some() {
                        Role::Tool
                    } else {
                        Role::User
                    }
                }
                Role::Tool => Role::Assistant,
            },
        }
    }

    /// Appends a message. A tool-role message captures the name of the
    /// tool call it answers from the immediately preceding message.
    pub fn add_message(&mut self, role: Role, content: &str) -> Result<(), ModelError> {
        let message = match role {
            Role::Tool => {
                let name = self.preceding_tool_call_name(self.messages.len())?;
                Message::new_tool_response(content, &name)
            }
            _ => Message::new(role, content),
        };
        self.messages.push(message);
        Ok(())
    }

    /// Replaces the message at `index`. `tool_call` is attached only for
    /// assistant messages; a tool-role message re-derives its name from
    /// the message before it.
    pub fn edit_message(
        &mut self,
        index: usize,
        role: Role,
        content: &str,
        tool_call: Option<ToolCallData>,
    ) -> Result<(), ModelError> {
        if index >= self.messages.len() {
            return Err(ModelError::IndexOutOfRange {
                kind: "messages",
                index,
                len: self.messages.len(),
            });
        }
        let message = match role {
            Role::Assistant => Message {
                role,
                content: content.to_string(),
                tool_call,
                name: None,
            },
            Role::Tool => {
                let name = self.preceding_tool_call_name(index)?;
                Message::new_tool_response(content, &name)
            }
            _ => Message::new(role, content),
        };
        self.messages[index] = message;
        Ok(())
    }

    /// Deletes a message. No fix-up is attempted for a tool message that
    /// answered the removed one; its captured name remains valid.
    pub fn remove_message(&mut self, index: usize) -> Result<Message, ModelError> {
        if index >= self.messages.len() {
            return Err(ModelError::IndexOutOfRange {
                kind: "messages",
                index,
                len: self.messages.len(),
            });
        }
        Ok(self.messages.remove(index))
    }

    fn preceding_tool_call_name(&self, index: usize) -> Result<String, ModelError> {
        if index == 0 {
            return Err(ModelError::PrecedingToolCallMissing);
        }
        self.messages[index - 1]
            .tool_call
            .as_ref()
            .map(|tc| tc.name.clone())
            .ok_or(ModelError::PrecedingToolCallMissing)
    }

    /// The prompt context for generating message `upto`: a deep copy of
    /// everything before it, never the target itself.
    pub fn conversation_history(&self, upto: usize) -> Vec<Message> {
        let upto = upto.min(self.messages.len());
        self.messages[..upto].to_vec()
    }

    /// Commits a finalized generation into the target slot, appending
    /// when the slot is one past the end.
    pub fn apply_generated(
        &mut self,
        index: usize,
        content: &str,
        tool_call: Option<ToolCallData>,
    ) -> Result<(), ModelError> {
        if index == self.messages.len() {
            self.messages.push(Message {
                role: Role::Assistant,
                content: content.to_string(),
                tool_call,
                name: None,
            });
            Ok(())
        } else {
            self.edit_message(index, Role::Assistant, content, tool_call)
        }
    }

    /// Human-readable dump of tool signatures and turns, used for token
    /// counting and debugging. Not a wire format.
    pub fn to_prompt_string(&self) -> String {
        let mut out = String::new();
        for tool in &self.tools {
            out.push_str(&tool.to_wire().to_string());
            out.push('\n');
        }
        for msg in &self.messages {
            out.push_str(&format!("{}: {}", msg.role.as_str(), msg.content));
            if let Some(tc) = &msg.tool_call {
                out.push_str(&format!(" <{}>", tc.name));
            }
            out.push('\n');
        }
        out
    }

    /// The OpenAI-compatible request payload. Messages keep their stored
    /// shape except that tool-call arguments are stringified here; the
    /// `tools` field is omitted when no tools are registered.
    pub fn to_openai_request(&self) -> Value {
        self.request_with_messages(&self.messages)
    }

    /// Like `to_openai_request` but restricted to the history before
    /// message `upto`, for building a generation prompt context.
    pub fn to_openai_request_upto(&self, upto: usize) -> Value {
        let upto = upto.min(self.messages.len());
        self.request_with_messages(&self.messages[..upto])
    }

    fn request_with_messages(&self, messages: &[Message]) -> Value {
        let messages: Vec<Value> = messages
            .iter()
            .map(|msg| {
                let mut value = json!(msg);
                if let Some(args) = value
                    .get("function_call")
                    .and_then(|fc| fc.get("arguments"))
                    .cloned()
                {
                    value["function_call"]["arguments"] = json!(args.to_string());
                }
                value
            })
            .collect();

        let mut payload = json!({ "messages": messages });
        if !self.tools.is_empty() {
            payload["tools"] = json!(
                self.tools.iter().map(Tool::to_wire).collect::<Vec<_>>()
            );
        }
        payload
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::tool::Parameter;

    fn chat_with_tool_call() -> Chat {
        let mut chat = Chat::new();
        let mut tool = Tool::create_empty("get_weather");
        let mut city = Parameter::new("city", "string");
        city.required = true;
        tool.add_param(city).unwrap();
        chat.add_tool(tool).unwrap();

        chat.add_message(Role::User, "Weather in Paris?").unwrap();
        chat.add_message(Role::Assistant, "").unwrap();
        chat.edit_message(
            1,
            Role::Assistant,
            "",
            Some(ToolCallData {
                name: "get_weather".to_string(),
                arguments: serde_json::json!({"city": "Paris"}),
            }),
        )
        .unwrap();
        chat
    }

    #[test]
    fn test_defaults() {
        let chat = Chat::new();
        assert_eq!(chat.name(), "New chat");
        assert_eq!(chat.language(), Language::En);
        assert!(chat.tags().is_empty());
        assert!(chat.tools().is_empty());
        assert_eq!(chat.message_count(), 0);
    }

    #[test]
    fn test_set_name_truncates() {
        let mut chat = Chat::new();
        chat.set_name(&"x".repeat(100));
        assert_eq!(chat.name().len(), MAX_NAME_LEN);
    }

    #[test]
    fn test_language_is_closed_set() {
        let err = Chat::from_value(serde_json::json!({"lang": "de"})).unwrap_err();
        assert!(matches!(err, ModelError::SchemaValidation(_)));
    }

    #[test]
    fn test_missing_keys_backfilled() {
        let chat = Chat::from_value(serde_json::json!({})).unwrap();
        assert_eq!(chat.name(), "New chat");
        assert_eq!(chat.language(), Language::En);
        assert!(chat.messages().is_empty());
    }

    #[test]
    fn test_legacy_keys_remapped() {
        let chat = Chat::from_value(serde_json::json!({
            "name": "old",
            "dialog": [{"role": "user", "content": "hi"}],
            "functions": [{"name": "lookup", "description": "", "parameters": {}}],
        }))
        .unwrap();
        assert_eq!(chat.message_count(), 1);
        assert_eq!(chat.messages()[0].content, "hi");
        assert_eq!(chat.tools()[0].name, "lookup");
    }

    #[test]
    fn test_legacy_keys_do_not_shadow_current_ones() {
        let chat = Chat::from_value(serde_json::json!({
            "messages": [{"role": "user", "content": "current"}],
            "dialog": [{"role": "user", "content": "stale"}],
        }))
        .unwrap();
        assert_eq!(chat.message_count(), 1);
        assert_eq!(chat.messages()[0].content, "current");
    }

    #[test]
    fn test_tool_call_rejected_on_non_assistant_message() {
        let err = Chat::from_value(serde_json::json!({
            "messages": [{
                "role": "user",
                "content": "hi",
                "function_call": {"name": "lookup", "arguments": {}},
            }],
        }))
        .unwrap_err();
        assert!(matches!(err, ModelError::SchemaValidation(_)));
    }

    #[test]
    fn test_add_tag_idempotent() {
        let mut chat = Chat::new();
        chat.add_tag("coding");
        chat.add_tag("logic");
        chat.add_tag("coding");
        assert_eq!(chat.tags(), ["coding", "logic"]);
    }

    #[test]
    fn test_remove_missing_tag() {
        let mut chat = Chat::new();
        let err = chat.remove_tag("nope").unwrap_err();
        assert!(matches!(err, ModelError::NotFound { kind: "tag", .. }));
    }

    #[test]
    fn test_duplicate_tool_rejected() {
        let mut chat = Chat::new();
        chat.add_tool(Tool::create_empty("search")).unwrap();
        let err = chat.add_tool(Tool::create_empty("search")).unwrap_err();
        assert!(matches!(err, ModelError::DuplicateTool { .. }));
    }

    #[test]
    fn test_next_role_convention() {
        let mut chat = Chat::new();
        assert_eq!(chat.next_role(), Role::System);
        chat.add_message(Role::System, "sys").unwrap();
        assert_eq!(chat.next_role(), Role::User);
        chat.add_message(Role::User, "hi").unwrap();
        assert_eq!(chat.next_role(), Role::Assistant);
        chat.add_message(Role::Assistant, "hello").unwrap();
        assert_eq!(chat.next_role(), Role::User);
    }

    #[test]
    fn test_next_role_after_tool_call() {
        let mut chat = chat_with_tool_call();
        assert_eq!(chat.next_role(), Role::Tool);
        chat.add_message(Role::Tool, "{\"temp\": 21}").unwrap();
        assert_eq!(chat.next_role(), Role::Assistant);
    }

    #[test]
    fn test_tool_message_requires_preceding_tool_call() {
        let mut chat = Chat::new();
        let err = chat.add_message(Role::Tool, "orphan").unwrap_err();
        assert!(matches!(err, ModelError::PrecedingToolCallMissing));

        chat.add_message(Role::User, "hi").unwrap();
        let err = chat.add_message(Role::Tool, "orphan").unwrap_err();
        assert!(matches!(err, ModelError::PrecedingToolCallMissing));
    }

    #[test]
    fn test_tool_message_captures_name() {
        let mut chat = chat_with_tool_call();
        chat.add_message(Role::Tool, "{\"temp\": 21}").unwrap();
        assert_eq!(chat.messages()[2].name.as_deref(), Some("get_weather"));

        // The captured name survives removal of the assistant message
        chat.remove_message(1).unwrap();
        assert_eq!(chat.messages()[1].name.as_deref(), Some("get_weather"));
    }

    #[test]
    fn test_edit_message_attaches_tool_call_only_for_assistant() {
        let mut chat = Chat::new();
        chat.add_message(Role::User, "hi").unwrap();
        chat.edit_message(
            0,
            Role::User,
            "hi",
            Some(ToolCallData {
                name: "noop".to_string(),
                arguments: serde_json::json!({}),
            }),
        )
        .unwrap();
        assert!(chat.messages()[0].tool_call.is_none());
    }

    #[test]
    fn test_conversation_history_excludes_target() {
        let chat = chat_with_tool_call();
        let history = chat.conversation_history(1);
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].content, "Weather in Paris?");
    }

    #[test]
    fn test_openai_request_stringifies_arguments() {
        let chat = chat_with_tool_call();
        let payload = chat.to_openai_request();
        let args = payload["messages"][1]["function_call"]["arguments"]
            .as_str()
            .expect("arguments should be a JSON string");
        assert_eq!(
            serde_json::from_str::<Value>(args).unwrap(),
            serde_json::json!({"city": "Paris"})
        );
        assert_eq!(payload["tools"][0]["function"]["name"], "get_weather");
    }

    #[test]
    fn test_openai_request_omits_empty_tools() {
        let mut chat = Chat::new();
        chat.add_message(Role::User, "hi").unwrap();
        let payload = chat.to_openai_request();
        assert!(payload.get("tools").is_none());
    }

    #[test]
    fn test_prompt_string_shape() {
        let mut chat = chat_with_tool_call();
        chat.add_message(Role::Tool, "{\"temp\": 21}").unwrap();
        let prompt = chat.to_prompt_string();
        assert!(prompt.contains("get_weather"));
        assert!(prompt.contains("user: Weather in Paris?"));
        assert!(prompt.contains("assistant:  <get_weather>"));
    }

    #[test]
    fn test_apply_generated_appends_or_replaces() {
        let mut chat = Chat::new();
        chat.add_message(Role::User, "hi").unwrap();

        chat.apply_generated(1, "hello", None).unwrap();
        assert_eq!(chat.message_count(), 2);
        assert_eq!(chat.messages()[1].role, Role::Assistant);

        chat.apply_generated(1, "hello again", None).unwrap();
        assert_eq!(chat.message_count(), 2);
        assert_eq!(chat.messages()[1].content, "hello again");
    }
}
