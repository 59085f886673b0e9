//! OpenAI chat-completions request and response bodies

use std::sync::atomic::{AtomicU64, Ordering};

use codegate_core::{Message, ReviewerResponse, ToolCall, ToolDefinition};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

/// Request body
#[derive(Debug, Serialize)]
pub(crate) struct ChatRequest<'a> {
    pub model: &'a str,
    pub messages: Vec<WireMessage>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<WireTool<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    pub stream: bool,
}

impl<'a> ChatRequest<'a> {
    pub fn new(model: &'a str, messages: &[Message], tools: &'a [ToolDefinition]) -> Self {
        let tools: Vec<WireTool<'a>> = tools.iter().map(WireTool::from).collect();
        let tool_choice = (!tools.is_empty()).then_some("auto");
        Self {
            model,
            messages: messages.iter().map(WireMessage::from).collect(),
            tools,
            tool_choice,
            temperature: None,
            max_tokens: None,
            stream: false,
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct WireTool<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    function: &'a ToolDefinition,
}

impl<'a> From<&'a ToolDefinition> for WireTool<'a> {
    fn from(definition: &'a ToolDefinition) -> Self {
        Self {
            kind: "function",
            function: definition,
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct WireMessage {
    role: &'static str,
    content: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tool_calls: Vec<WireToolCall>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<String>,
}

impl From<&Message> for WireMessage {
    fn from(message: &Message) -> Self {
        let mut wire = WireMessage {
            role: message.role().name(),
            content: message.content().map(str::to_string),
            tool_calls: Vec::new(),
            tool_call_id: None,
            name: None,
        };
        match message {
            Message::Assistant { tool_calls, .. } => {
                wire.tool_calls = tool_calls.iter().map(WireToolCall::from).collect();
            }
            Message::Tool {
                tool_call_id, name, ..
            } => {
                wire.tool_call_id = Some(tool_call_id.clone());
                wire.name = Some(name.clone());
            }
            Message::System { .. } | Message::User { .. } => {}
        }
        wire
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct WireToolCall {
    #[serde(default)]
    id: String,
    #[serde(rename = "type", default = "function_kind")]
    kind: String,
    function: WireFunction,
}

fn function_kind() -> String {
    "function".to_string()
}

/// Arguments travel as a JSON-encoded string
#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct WireFunction {
    name: String,
    #[serde(default)]
    arguments: String,
}

impl From<&ToolCall> for WireToolCall {
    fn from(call: &ToolCall) -> Self {
        Self {
            id: call.id.clone(),
            kind: function_kind(),
            function: WireFunction {
                name: call.name.clone(),
                arguments: Value::Object(call.arguments.clone()).to_string(),
            },
        }
    }
}

/// Ids for calls sent without one; unique for the life of the process
static NEXT_CALL_ID: AtomicU64 = AtomicU64::new(0);

fn generated_call_id() -> String {
    format!("call_{}", NEXT_CALL_ID.fetch_add(1, Ordering::Relaxed))
}

impl WireToolCall {
    fn into_call(self) -> ToolCall {
        let id = if self.id.is_empty() {
            generated_call_id()
        } else {
            self.id
        };
        let arguments = parse_arguments(&self.function.arguments);
        ToolCall::new(id, self.function.name, arguments)
    }
}

/// Decode tool arguments; anything but a JSON object becomes an empty map
/// so the tool reports the missing arguments itself
pub(crate) fn parse_arguments(raw: &str) -> Map<String, Value> {
    if raw.trim().is_empty() {
        return Map::new();
    }
    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Object(map)) => map,
        Ok(other) => {
            debug!(arguments = %other, "Tool arguments are not an object");
            Map::new()
        }
        Err(e) => {
            debug!(error = %e, "Malformed tool arguments");
            Map::new()
        }
    }
}

/// Response body
#[derive(Debug, Deserialize)]
pub(crate) struct ChatResponse {
    #[serde(default)]
    pub choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct Choice {
    pub message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ResponseMessage {
    pub content: Option<String>,
    pub tool_calls: Option<Vec<WireToolCall>>,
}

impl From<ResponseMessage> for ReviewerResponse {
    fn from(message: ResponseMessage) -> Self {
        let tool_calls = message
            .tool_calls
            .unwrap_or_default()
            .into_iter()
            .map(WireToolCall::into_call)
            .collect();
        ReviewerResponse::with_calls(message.content, tool_calls)
    }
}

/// Error body as most providers send it
#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ErrorDetail {
    Object { message: String },
    Text(String),
}

/// Human-readable message from an error response body
pub(crate) fn error_message(body: &str) -> String {
    match serde_json::from_str::<ErrorBody>(body) {
        Ok(ErrorBody {
            error: ErrorDetail::Object { message } | ErrorDetail::Text(message),
        }) => message,
        Err(_) if body.trim().is_empty() => "empty response body".to_string(),
        Err(_) => body.trim().to_string(),
    }
}
