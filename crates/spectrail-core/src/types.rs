//! Wire and data-model types shared across every crate in the workspace.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Message role, OpenAI chat-completions shape.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

/// A single message in the conversation persisted by RunLog and sent to the provider.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: Role::System, content: content.into(), tool_calls: None, tool_call_id: None }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: Role::User, content: content.into(), tool_calls: None, tool_call_id: None }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: Role::Assistant, content: content.into(), tool_calls: None, tool_call_id: None }
    }

    pub fn assistant_with_tool_calls(content: impl Into<String>, tool_calls: Vec<ToolCall>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            tool_calls: Some(tool_calls),
            tool_call_id: None,
        }
    }

    /// One `tool` message per executed call, matching OpenAI's 1:1 `tool_call_id` interleaving
    /// rather than Anthropic's single-message-with-multiple-blocks convention.
    pub fn tool_result(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: Role::Tool,
            content: content.into(),
            tool_calls: None,
            tool_call_id: Some(tool_call_id.into()),
        }
    }

    pub fn char_len(&self) -> usize {
        self.content.len()
    }
}

/// A tool call emitted by the assistant. `arguments` is the raw JSON-encoded argument string,
/// matching the provider wire format.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub arguments: String,
}

/// Tool declaration handed to the provider. The `{"type":"function","function":{...}}` wrapper
/// is applied at the wire boundary in spectrail-llm; this is the internal representation the
/// ToolRegistry and PromptBuilder work with.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub input_schema: serde_json::Value,
}

/// An assistant turn decoded from `choices[0].message`.
#[derive(Clone, Debug, Default)]
pub struct AssistantTurn {
    pub content: Option<String>,
    pub tool_calls: Vec<ToolCall>,
}

impl AssistantTurn {
    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RunType {
    Plan,
    Verify,
    Handoff,
    Review,
    Phases,
    Test,
}

impl RunType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Plan => "plan",
            Self::Verify => "verify",
            Self::Handoff => "handoff",
            Self::Review => "review",
            Self::Phases => "phases",
            Self::Test => "test",
        }
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TaskMode {
    Plan,
    Phases,
    Review,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Draft,
    Active,
    Done,
    Archived,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    PlanMd,
    PhaseList,
    VerificationReport,
    HandoffPrompt,
    Notes,
}

impl ArtifactKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PlanMd => "plan_md",
            Self::PhaseList => "phase_list",
            Self::VerificationReport => "verification_report",
            Self::HandoffPrompt => "handoff_prompt",
            Self::Notes => "notes",
        }
    }
}

/// Provider configuration snapshotted at run start (§9: "treat them as a snapshot...
/// do not re-read mid-run") and passed by value into the ChatProvider constructor.
#[derive(Clone, Debug)]
pub struct Settings {
    pub provider_name: String,
    pub base_url: String,
    pub model: String,
    pub api_key: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub extra_headers: HashMap<String, String>,
    pub dev_mode: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            provider_name: "openai".to_string(),
            base_url: "https://api.openai.com/v1".to_string(),
            model: "gpt-4o".to_string(),
            api_key: String::new(),
            temperature: 0.2,
            max_tokens: 4000,
            extra_headers: HashMap::new(),
            dev_mode: false,
        }
    }
}

impl Settings {
    /// Parse a flat string key/value map (the `settings` table's native shape) into a
    /// typed snapshot, applying the defaults from §6 for any missing key.
    pub fn from_map(map: &HashMap<String, String>) -> crate::Result<Self> {
        let mut settings = Self::default();

        if let Some(v) = map.get("provider_name") {
            settings.provider_name = v.clone();
        }
        if let Some(v) = map.get("base_url") {
            if !v.starts_with("http://") && !v.starts_with("https://") {
                return Err(crate::Error::InvalidArgs(format!(
                    "base_url must start with http:// or https://, got {v}"
                )));
            }
            settings.base_url = v.clone();
        }
        if let Some(v) = map.get("model") {
            settings.model = v.clone();
        }
        if let Some(v) = map.get("api_key") {
            settings.api_key = v.clone();
        }
        if settings.api_key.is_empty() {
            if let Ok(env_key) = std::env::var("SPECTRAIL_API_KEY") {
                settings.api_key = env_key;
            }
        }
        if let Some(v) = map.get("temperature") {
            let t: f32 = v
                .parse()
                .map_err(|_| crate::Error::InvalidArgs(format!("temperature not numeric: {v}")))?;
            if !(0.0..=2.0).contains(&t) {
                return Err(crate::Error::InvalidArgs(format!(
                    "temperature out of range [0,2]: {t}"
                )));
            }
            settings.temperature = t;
        }
        if let Some(v) = map.get("max_tokens") {
            let n: u32 = v
                .parse()
                .map_err(|_| crate::Error::InvalidArgs(format!("max_tokens not an integer: {v}")))?;
            if n == 0 {
                return Err(crate::Error::InvalidArgs("max_tokens must be positive".to_string()));
            }
            settings.max_tokens = n;
        }
        if let Some(v) = map.get("extra_headers_json") {
            let value: serde_json::Value = serde_json::from_str(v)?;
            let obj = value
                .as_object()
                .ok_or_else(|| crate::Error::InvalidArgs("extra_headers_json must be an object".to_string()))?;
            for (k, v) in obj {
                if let Some(s) = v.as_str() {
                    settings.extra_headers.insert(k.clone(), s.to_string());
                }
            }
        }
        if let Some(v) = map.get("dev_mode") {
            settings.dev_mode = v == "1" || v.eq_ignore_ascii_case("true");
        }

        Ok(settings)
    }
}
