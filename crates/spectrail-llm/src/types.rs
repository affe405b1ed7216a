//! Wire types for the OpenAI-compatible chat-completions protocol.
//!
//! These mirror the request/response JSON shape exactly (role/content/tool_calls/
//! tool_call_id) rather than the internal `spectrail_core::Message` representation;
//! conversion between the two happens at the `ChatProvider` boundary.

use serde::{Deserialize, Serialize};
use spectrail_core::{Message, Role, ToolCall, ToolDefinition};

#[derive(Clone, Debug, Serialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<WireMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<WireTool>>,
    pub temperature: f32,
    pub max_tokens: u32,
    pub stream: bool,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WireMessage {
    pub role: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<WireToolCall>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl From<&Message> for WireMessage {
    fn from(m: &Message) -> Self {
        Self {
            role: match m.role {
                Role::System => "system",
                Role::User => "user",
                Role::Assistant => "assistant",
                Role::Tool => "tool",
            }
            .to_string(),
            content: Some(m.content.clone()),
            tool_calls: m
                .tool_calls
                .as_ref()
                .map(|calls| calls.iter().map(WireToolCall::from).collect()),
            tool_call_id: m.tool_call_id.clone(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WireToolCall {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub function: WireFunctionCall,
}

impl From<&ToolCall> for WireToolCall {
    fn from(tc: &ToolCall) -> Self {
        Self {
            id: tc.id.clone(),
            kind: "function".to_string(),
            function: WireFunctionCall { name: tc.name.clone(), arguments: tc.arguments.clone() },
        }
    }
}

impl From<&WireToolCall> for ToolCall {
    fn from(wc: &WireToolCall) -> Self {
        Self { id: wc.id.clone(), name: wc.function.name.clone(), arguments: wc.function.arguments.clone() }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WireFunctionCall {
    pub name: String,
    /// Raw JSON-encoded argument string, per the provider wire format.
    pub arguments: String,
}

#[derive(Clone, Debug, Serialize)]
pub struct WireTool {
    #[serde(rename = "type")]
    pub kind: String,
    pub function: WireFunctionDef,
}

#[derive(Clone, Debug, Serialize)]
pub struct WireFunctionDef {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

impl From<&ToolDefinition> for WireTool {
    fn from(d: &ToolDefinition) -> Self {
        Self {
            kind: "function".to_string(),
            function: WireFunctionDef {
                name: d.name.clone(),
                description: d.description.clone(),
                parameters: d.input_schema.clone(),
            },
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct ChatResponse {
    pub choices: Vec<ChatChoice>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct ChatChoice {
    pub message: WireMessage,
}

#[derive(Clone, Debug, Deserialize)]
pub struct ErrorEnvelope {
    pub error: ErrorDetail,
}

#[derive(Clone, Debug, Deserialize)]
pub struct ErrorDetail {
    pub message: String,
}
