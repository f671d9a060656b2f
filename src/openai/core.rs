//! OpenAI-compatible completion provider.
//!
//! Both upstream API shapes (chat completions and the legacy prompt+
//! suffix completion endpoint) are exposed through one trait yielding a
//! normalized stream of deltas; assembly and coalescing live in the
//! `assembler` module.

use std::pin::Pin;
use std::time::Duration;

use anyhow::{Error, Result};
use async_stream::try_stream;
use async_trait::async_trait;
use futures::Stream;
use serde::Deserialize;
use serde_json::{Value, json};

use crate::core::AppConfig;
use crate::model::message::Message;

/// One incremental fragment of a streamed generation response.
#[derive(Clone, Debug, PartialEq)]
pub enum StreamEvent {
    Text(String),
    ToolCallName(String),
    ToolCallArguments(String),
}

pub type EventStream = Pin<Box<dyn Stream<Item = Result<StreamEvent, Error>> + Send>>;

/// The single capability the core needs from a remote completion
/// endpoint: turn a request into an incremental delta stream.
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    /// Chat-completions style: `request` is the `{messages, tools?}`
    /// payload produced by `Chat::to_openai_request`.
    async fn stream_chat(&self, request: Value) -> Result<EventStream>;

    /// Legacy completion style: a single role-tagged prompt string with
    /// an infill suffix.
    async fn stream_completion(&self, prompt: &str, suffix: &str) -> Result<EventStream>;
}

/// Synthesizes the legacy completion prompt from the prior conversation,
/// with the target position's left cursor context spliced in as the
/// generation seed.
pub fn completion_prompt(history: &[Message], before: &str) -> String {
    let mut prompt = String::new();
    for msg in history {
        prompt.push_str(&format!("<{}>\n{}<end>", msg.role.as_str(), msg.content));
    }
    prompt.push_str(&format!("<assistant>\n{}<end>", before));
    prompt
}

#[derive(Clone, Debug)]
pub struct OpenAiClient {
    api_hostname: String,
    api_key: String,
    model: String,
    temperature: f32,
    max_completion_tokens: u32,
}

impl OpenAiClient {
    pub fn new(api_hostname: &str, api_key: &str, model: &str) -> Self {
        Self {
            api_hostname: api_hostname.to_string(),
            api_key: api_key.to_string(),
            model: model.to_string(),
            temperature: 0.7,
            max_completion_tokens: 200,
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            api_hostname: config.openai_api_hostname.clone(),
            api_key: config.openai_api_key.clone(),
            model: config.openai_model.clone(),
            temperature: config.temperature,
            max_completion_tokens: config.max_completion_tokens,
        }
    }

    async fn post_stream(&self, endpoint: &str, payload: Value) -> Result<reqwest::Response> {
        let url = format!("{}{}", self.api_hostname.trim_end_matches('/'), endpoint);
        let response = reqwest::Client::new()
            .post(url)
            .bearer_auth(&self.api_key)
            .header("Content-Type", "application/json")
            .timeout(Duration::from_secs(60 * 5))
            .json(&payload)
            .send()
            .await?
            .error_for_status()?;
        Ok(response)
    }
}

#[async_trait]
impl CompletionProvider for OpenAiClient {
    async fn stream_chat(&self, request: Value) -> Result<EventStream> {
        let mut payload = request;
        payload["model"] = json!(self.model);
        payload["temperature"] = json!(self.temperature);
        payload["stream"] = json!(true);

        let response = self.post_stream("/v1/chat/completions", payload).await?;
        Ok(sse_events(response, classify_chat_data))
    }

    async fn stream_completion(&self, prompt: &str, suffix: &str) -> Result<EventStream> {
        let payload = json!({
            "model": self.model,
            "prompt": prompt,
            "suffix": suffix,
            "temperature": self.temperature,
            "max_tokens": self.max_completion_tokens,
            "stream": true,
        });

        let response = self.post_stream("/v1/completions", payload).await?;
        Ok(sse_events(response, classify_completion_data))
    }
}

// OpenAI streams two slightly different tool call deltas: an initial
// chunk carrying the id/name and subsequent chunks that only append to
// the arguments string.
#[derive(Debug, Deserialize)]
struct FunctionInitDelta {
    name: String,
    arguments: String,
}

#[derive(Debug, Deserialize)]
struct FunctionArgsDelta {
    arguments: String,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ToolCallChunk {
    Init {
        #[allow(dead_code)]
        id: String,
        index: usize,
        function: FunctionInitDelta,
    },
    ArgsDelta {
        index: usize,
        function: FunctionArgsDelta,
    },
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ChatDelta {
    Content { content: String },
    ToolCall { tool_calls: Vec<ToolCallChunk> },
    Stop {},
}

#[derive(Debug, Deserialize)]
struct ChatChunkChoice {
    delta: ChatDelta,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatChunk {
    choices: Vec<ChatChunkChoice>,
}

#[derive(Debug, Deserialize)]
struct CompletionChunkChoice {
    text: Option<String>,
    #[allow(dead_code)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CompletionChunk {
    choices: Vec<CompletionChunkChoice>,
}

/// Classifies one chat-completions SSE payload into zero or more
/// events. Returns `None` to signal end of stream.
fn classify_chat_data(data: &str) -> Result<Option<Vec<StreamEvent>>> {
    let chunk: ChatChunk = serde_json::from_str(data)
        .map_err(|e| anyhow::anyhow!("parsing completion chunk failed for {}: {}", data, e))?;
    let Some(choice) = chunk.choices.first() else {
        return Ok(Some(Vec::new()));
    };
    if choice.finish_reason.is_some() {
        return Ok(None);
    }

    let mut events = Vec::new();
    match &choice.delta {
        ChatDelta::Content { content } => {
            events.push(StreamEvent::Text(content.clone()));
        }
        ChatDelta::ToolCall { tool_calls } => {
            for tc in tool_calls {
                match tc {
                    ToolCallChunk::Init { index, function, .. } => {
                        if *index > 0 {
                            tracing::warn!("ignoring parallel tool call at index {}", index);
                            continue;
                        }
                        events.push(StreamEvent::ToolCallName(function.name.clone()));
                        if !function.arguments.is_empty() {
                            events.push(StreamEvent::ToolCallArguments(function.arguments.clone()));
                        }
                    }
                    ToolCallChunk::ArgsDelta { index, function } => {
                        if *index > 0 {
                            continue;
                        }
                        if !function.arguments.is_empty() {
                            events.push(StreamEvent::ToolCallArguments(function.arguments.clone()));
                        }
                    }
                }
            }
        }
        ChatDelta::Stop {} => return Ok(None),
    }
    Ok(Some(events))
}

fn classify_completion_data(data: &str) -> Result<Option<Vec<StreamEvent>>> {
    let chunk: CompletionChunk = serde_json::from_str(data)
        .map_err(|e| anyhow::anyhow!("parsing completion chunk failed for {}: {}", data, e))?;
    let Some(choice) = chunk.choices.first() else {
        return Ok(Some(Vec::new()));
    };
    match &choice.text {
        Some(text) if !text.is_empty() => Ok(Some(vec![StreamEvent::Text(text.clone())])),
        _ => Ok(Some(Vec::new())),
    }
}

/// Parses an SSE byte stream into delta events. A carry buffer handles
/// event fragmentation across HTTP/2 frames.
fn sse_events(
    response: reqwest::Response,
    classify: fn(&str) -> Result<Option<Vec<StreamEvent>>>,
) -> EventStream {
    use futures_util::StreamExt;

    Box::pin(try_stream! {
        let mut stream = response.bytes_stream();
        let mut buffer = String::new();

        'outer: while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            buffer.push_str(std::str::from_utf8(&chunk)?);

            // Process all complete SSE events in the buffer
            while let Some(event_end) = buffer.find("\n\n") {
                let event_data = buffer[..event_end].trim().to_string();
                buffer = buffer[event_end + 2..].to_string();

                if event_data.is_empty() {
                    continue;
                }
                let Some(data) = event_data.strip_prefix("data: ") else {
                    continue;
                };
                let data = data.trim();
                if data.is_empty() {
                    continue;
                }
                if data == "[DONE]" {
                    break 'outer;
                }

                match classify(data)? {
                    Some(events) => {
                        for event in events {
                            yield event;
                        }
                    }
                    None => break 'outer,
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::message::Role;
    use futures_util::StreamExt;

    #[test]
    fn test_chat_delta_content() {
        let events = classify_chat_data(
            r#"{"choices":[{"delta":{"content":"Hello"},"finish_reason":null}]}"#,
        )
        .unwrap()
        .unwrap();
        assert_eq!(events, vec![StreamEvent::Text("Hello".to_string())]);
    }

    #[test]
    fn test_chat_delta_finish_reason_ends_stream() {
        let result = classify_chat_data(
            r#"{"choices":[{"delta":{"content":"!"},"finish_reason":"stop"}]}"#,
        )
        .unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn test_chat_delta_tool_call_init_and_args() {
        let events = classify_chat_data(
            r#"{"choices":[{"delta":{"tool_calls":[{"id":"call_1","index":0,"function":{"name":"get_weather","arguments":"{\"city\":"},"type":"function"}]},"finish_reason":null}]}"#,
        )
        .unwrap()
        .unwrap();
        assert_eq!(
            events,
            vec![
                StreamEvent::ToolCallName("get_weather".to_string()),
                StreamEvent::ToolCallArguments("{\"city\":".to_string()),
            ]
        );

        let events = classify_chat_data(
            r#"{"choices":[{"delta":{"tool_calls":[{"index":0,"function":{"arguments":"\"Paris\"}"}}]},"finish_reason":null}]}"#,
        )
        .unwrap()
        .unwrap();
        assert_eq!(
            events,
            vec![StreamEvent::ToolCallArguments("\"Paris\"}".to_string())]
        );
    }

    #[test]
    fn test_chat_delta_empty_stop_object() {
        let result = classify_chat_data(r#"{"choices":[{"delta":{},"finish_reason":null}]}"#)
            .unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn test_completion_delta_text() {
        let events =
            classify_completion_data(r#"{"choices":[{"text":"Hi","finish_reason":null}]}"#)
                .unwrap()
                .unwrap();
        assert_eq!(events, vec![StreamEvent::Text("Hi".to_string())]);
    }

    #[test]
    fn test_completion_prompt_markup() {
        let history = vec![
            Message::new(Role::System, "Be terse."),
            Message::new(Role::User, "hi"),
        ];
        let prompt = completion_prompt(&history, "Hello, ");
        assert_eq!(
            prompt,
            "<system>\nBe terse.<end><user>\nhi<end><assistant>\nHello, <end>"
        );
    }

    #[tokio::test]
    async fn test_stream_chat_yields_events() {
        let mut server = mockito::Server::new_async().await;

        let sse_response = "data: {\"choices\":[{\"delta\":{\"content\":\"Hello\"},\"finish_reason\":null}]}\n\ndata: {\"choices\":[{\"delta\":{\"content\":\" World\"},\"finish_reason\":null}]}\n\ndata: [DONE]\n\n";

        let mock = server
            .mock("POST", "/v1/chat/completions")
            .with_status(200)
            .with_header("content-type", "text/event-stream")
            .with_body(sse_response)
            .create();

        let client = OpenAiClient::new(&server.url(), "test-key", "gpt-4");
        let mut stream = client
            .stream_chat(json!({"messages": [{"role": "user", "content": "Say hello"}]}))
            .await
            .unwrap();

        let mut events = Vec::new();
        while let Some(event) = stream.next().await {
            events.push(event.unwrap());
        }

        mock.assert();
        assert_eq!(
            events,
            vec![
                StreamEvent::Text("Hello".to_string()),
                StreamEvent::Text(" World".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_stream_chat_tool_call_events() {
        let mut server = mockito::Server::new_async().await;

        let sse_response = "data: {\"choices\":[{\"delta\":{\"tool_calls\":[{\"id\":\"call_1\",\"index\":0,\"function\":{\"name\":\"get_weather\",\"arguments\":\"{\\\"city\\\":\"},\"type\":\"function\"}]},\"finish_reason\":null}]}\n\ndata: {\"choices\":[{\"delta\":{\"tool_calls\":[{\"index\":0,\"function\":{\"arguments\":\"\\\"Paris\\\"}\"}}]},\"finish_reason\":null}]}\n\ndata: [DONE]\n\n";

        let mock = server
            .mock("POST", "/v1/chat/completions")
            .with_status(200)
            .with_header("content-type", "text/event-stream")
            .with_body(sse_response)
            .create();

        let client = OpenAiClient::new(&server.url(), "test-key", "gpt-4");
        let mut stream = client
            .stream_chat(json!({"messages": []}))
            .await
            .unwrap();

        let mut events = Vec::new();
        while let Some(event) = stream.next().await {
            events.push(event.unwrap());
        }

        mock.assert();
        assert_eq!(
            events,
            vec![
                StreamEvent::ToolCallName("get_weather".to_string()),
                StreamEvent::ToolCallArguments("{\"city\":".to_string()),
                StreamEvent::ToolCallArguments("\"Paris\"}".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_stream_completion_yields_text() {
        let mut server = mockito::Server::new_async().await;

        let sse_response = "data: {\"choices\":[{\"text\":\"Hel\",\"finish_reason\":null}]}\n\ndata: {\"choices\":[{\"text\":\"lo\",\"finish_reason\":null}]}\n\ndata: [DONE]\n\n";

        let mock = server
            .mock("POST", "/v1/completions")
            .with_status(200)
            .with_header("content-type", "text/event-stream")
            .with_body(sse_response)
            .create();

        let client = OpenAiClient::new(&server.url(), "test-key", "gpt-4");
        let mut stream = client
            .stream_completion("<user>\nhi<end><assistant>\n<end>", "")
            .await
            .unwrap();

        let mut events = Vec::new();
        while let Some(event) = stream.next().await {
            events.push(event.unwrap());
        }

        mock.assert();
        assert_eq!(
            events,
            vec![
                StreamEvent::Text("Hel".to_string()),
                StreamEvent::Text("lo".to_string()),
            ]
        );
    }
}
