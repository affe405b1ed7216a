//! `ChatProvider` trait — the narrow interface `AgentLoop` depends on (§9: "AgentLoop
//! depend[s] only on the narrow `ChatProvider` and `ToolRegistry` interfaces").

use spectrail_core::{AssistantTurn, Message, Result, ToolDefinition};

#[async_trait::async_trait]
pub trait ChatProvider: Send + Sync {
    /// Send the current transcript plus tool schemas and decode the assistant's next turn.
    /// Implementations own retrying transient failures; everything that reaches the caller
    /// here is terminal for the run.
    async fn complete(&self, messages: &[Message], tools: &[ToolDefinition]) -> Result<AssistantTurn>;
}
