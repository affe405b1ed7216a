//! A `ChatProvider` test double that replays a fixed sequence of `AssistantTurn`s, one per
//! `complete()` call. Mirrors how the corpus stubs its provider trait for agent-loop tests,
//! without pulling in an HTTP mocking crate the stack doesn't otherwise use.

use std::sync::Mutex;

use spectrail_core::{AssistantTurn, Error, Message, Result, ToolDefinition};
use spectrail_llm::ChatProvider;

pub struct StubChatProvider {
    turns: Mutex<Vec<AssistantTurn>>,
}

impl StubChatProvider {
    /// `turns` is consumed front-to-back, one per call to `complete`.
    pub fn new(turns: Vec<AssistantTurn>) -> Self {
        Self { turns: Mutex::new(turns) }
    }

    /// Always returns a fixed final-content turn, no tool calls — for scenario 3 (context cap).
    pub fn single_final(content: impl Into<String>) -> Self {
        Self::new(vec![AssistantTurn { content: Some(content.into()), tool_calls: vec![] }])
    }

    /// Returns a tool call on every turn — for scenario 2 (iteration cap).
    pub fn always_call(tool_name: impl Into<String>, arguments: impl Into<String>) -> RepeatingToolCallProvider {
        RepeatingToolCallProvider { tool_name: tool_name.into(), arguments: arguments.into() }
    }
}

#[async_trait::async_trait]
impl ChatProvider for StubChatProvider {
    async fn complete(&self, _messages: &[Message], _tools: &[ToolDefinition]) -> Result<AssistantTurn> {
        let mut turns = self.turns.lock().unwrap();
        if turns.is_empty() {
            return Err(Error::ProviderError { status: 500, message: "stub exhausted".to_string() });
        }
        Ok(turns.remove(0))
    }
}

/// Issues the same tool call forever; used to drive the iteration cap in tests.
pub struct RepeatingToolCallProvider {
    tool_name: String,
    arguments: String,
}

#[async_trait::async_trait]
impl ChatProvider for RepeatingToolCallProvider {
    async fn complete(&self, _messages: &[Message], _tools: &[ToolDefinition]) -> Result<AssistantTurn> {
        Ok(AssistantTurn {
            content: None,
            tool_calls: vec![spectrail_core::ToolCall {
                id: uuid::Uuid::new_v4().to_string(),
                name: self.tool_name.clone(),
                arguments: self.arguments.clone(),
            }],
        })
    }
}

/// An always-failing provider — for scenario 5 (invalid credentials).
pub struct FailingProvider(pub Error);

#[async_trait::async_trait]
impl ChatProvider for FailingProvider {
    async fn complete(&self, _messages: &[Message], _tools: &[ToolDefinition]) -> Result<AssistantTurn> {
        Err(match &self.0 {
            Error::InvalidCredentials => Error::InvalidCredentials,
            Error::RateLimited => Error::RateLimited,
            other => Error::ProviderError { status: 500, message: other.to_string() },
        })
    }
}
