//! The INIT -> AWAIT_ASSISTANT -> EXECUTE_TOOLS -> EMIT_ARTIFACT/ABORT state machine that
//! drives one run end to end. This is the heart of the workbench: everything else (facade,
//! prompt builder, tools, provider) exists to feed or be fed by this loop.

use serde_json::Value;
use spectrail_core::{AssistantTurn, Message, Result, ToolCall};
use spectrail_llm::ChatProvider;
use spectrail_runlog::{MessageRow, RunLog, ToolCallRow};
use spectrail_sandbox::bound_text;
use spectrail_tools::ToolRegistry;
use tokio_util::sync::CancellationToken;

const MAX_ASSISTANT_TURNS: usize = 12;
const CONTEXT_CAP_CHARS: usize = 100_000;
const CONTEXT_KEEP_LAST: usize = 6;
/// Per-tool-result message cap. Not spec-numbered ("a safe per-message cap") — chosen well
/// below the context cap so a single verbose tool result can't by itself force a prune.
const TOOL_RESULT_CAP_CHARS: usize = 20_000;
const TRUNCATION_NOTE: &str = "\n\n[truncated: assistant turn limit reached before a final answer was produced]";

pub struct LoopOutcome {
    pub final_content: String,
    pub tool_calls_count: usize,
    pub truncated: bool,
}

pub struct AgentLoop<'a> {
    provider: &'a dyn ChatProvider,
    registry: &'a ToolRegistry,
    run_log: &'a RunLog,
    run_id: String,
    task_id: String,
    project_id: String,
    artifact_kind: &'static str,
}

impl<'a> AgentLoop<'a> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        provider: &'a dyn ChatProvider,
        registry: &'a ToolRegistry,
        run_log: &'a RunLog,
        run_id: impl Into<String>,
        task_id: impl Into<String>,
        project_id: impl Into<String>,
        artifact_kind: &'static str,
    ) -> Self {
        Self {
            provider,
            registry,
            run_log,
            run_id: run_id.into(),
            task_id: task_id.into(),
            project_id: project_id.into(),
            artifact_kind,
        }
    }

    /// Runs to completion: either `DONE` (artifact emitted, run closed, `Ok`) or `ABORT`
    /// (run closed, `Err` propagated to the caller). Partial messages and tool calls from an
    /// aborted run remain visible in RunLog by design.
    pub async fn run(&self, seed: Vec<Message>, cancel: CancellationToken) -> Result<LoopOutcome> {
        // INIT: persist seed messages.
        for message in &seed {
            let role = role_str(message);
            self.run_log.append_message(&self.run_id, role, &message.content).await?;
        }

        let mut messages = seed;
        let mut tool_calls_count = 0usize;
        let mut truncated = false;
        let mut last_content = String::new();

        for _turn in 0..MAX_ASSISTANT_TURNS {
            if let Some(pruned) = prune_if_over_cap(&messages) {
                messages = pruned;
                truncated = true;
            }

            let tool_defs = self.registry_definitions();
            let turn_result = self.provider.complete(&messages, &tool_defs).await;
            let turn: AssistantTurn = match turn_result {
                Ok(turn) => turn,
                Err(err) => {
                    self.run_log.close_run(&self.run_id).await?;
                    return Err(err);
                }
            };

            if !turn.has_tool_calls() {
                last_content = turn.content.clone().unwrap_or_default();
                messages.push(Message::assistant(last_content.clone()));
                self.run_log.append_message(&self.run_id, "assistant", &last_content).await?;
                return self.emit_artifact(last_content, tool_calls_count, truncated).await;
            }

            // EXECUTE_TOOLS: dispatch every call sequentially, in returned order. The
            // assistant message announcing the tool_calls must land in the transcript
            // before any tool result does — providers reject a `tool` message that isn't
            // immediately preceded by the assistant turn that requested it (§4.9/§2: the
            // transcript "preserves the exact sequence the provider observed").
            let assistant_content = turn.content.clone().unwrap_or_default();
            messages.push(Message::assistant_with_tool_calls(assistant_content.clone(), turn.tool_calls.clone()));

            let mut step_rows = Vec::with_capacity(turn.tool_calls.len());
            for call in &turn.tool_calls {
                let (row, result_message, result_for_context) =
                    match self.execute_one(call, cancel.clone()).await {
                        Ok(triple) => triple,
                        Err(err) => {
                            self.run_log.close_run(&self.run_id).await?;
                            return Err(err);
                        }
                    };
                tool_calls_count += 1;
                messages.push(result_for_context);
                step_rows.push((row, result_message));
            }

            self.run_log.append_step(&self.run_id, &assistant_content, step_rows).await?;
        }

        // Iteration cap reached with no final answer: force EMIT_ARTIFACT.
        truncated = true;
        let content = format!("{last_content}{TRUNCATION_NOTE}");
        self.emit_artifact(content, tool_calls_count, truncated).await
    }

    async fn execute_one(
        &self,
        call: &ToolCall,
        cancel: CancellationToken,
    ) -> Result<(ToolCallRow, MessageRow, Message)> {
        let args: Value = serde_json::from_str(&call.arguments)
            .unwrap_or_else(|e| serde_json::json!({"error": format!("invalid tool arguments json: {e}")}));
        let result = self
            .registry
            .execute(&call.name, args.clone(), Some(self.project_id.as_str()), cancel)
            .await?;
        let result_json = serde_json::to_string(&result).unwrap_or_else(|_| "{}".to_string());
        let bounded = bound_text(&result_json, TOOL_RESULT_CAP_CHARS);
        let created_at = chrono::Utc::now().to_rfc3339();

        let tool_call_row = ToolCallRow {
            id: call.id.clone(),
            run_id: self.run_id.clone(),
            name: call.name.clone(),
            args_json: serde_json::to_string(&args).unwrap_or_default(),
            result_json: result_json.clone(),
            created_at: created_at.clone(),
        };
        let result_message_row = MessageRow {
            id: uuid::Uuid::new_v4().to_string(),
            run_id: self.run_id.clone(),
            role: "tool".to_string(),
            content: bounded.clipped.clone(),
            created_at,
        };
        let context_message = Message::tool_result(call.id.clone(), bounded.clipped);

        Ok((tool_call_row, result_message_row, context_message))
    }

    async fn emit_artifact(&self, content: String, tool_calls_count: usize, truncated: bool) -> Result<LoopOutcome> {
        self.run_log.upsert_artifact(&self.task_id, self.artifact_kind, &content).await?;
        self.run_log.close_run(&self.run_id).await?;
        Ok(LoopOutcome { final_content: content, tool_calls_count, truncated })
    }

    fn registry_definitions(&self) -> Vec<spectrail_core::ToolDefinition> {
        self.registry.get_definitions()
    }
}

fn role_str(message: &Message) -> &'static str {
    match message.role {
        spectrail_core::Role::System => "system",
        spectrail_core::Role::User => "user",
        spectrail_core::Role::Assistant => "assistant",
        spectrail_core::Role::Tool => "tool",
    }
}

/// Returns `Some(pruned)` when the total character count exceeds the cap; `None` when the
/// transcript is still under budget and no pruning occurred.
fn prune_if_over_cap(messages: &[Message]) -> Option<Vec<Message>> {
    let total: usize = messages.iter().map(Message::char_len).sum();
    if total <= CONTEXT_CAP_CHARS {
        return None;
    }

    let system_idx = messages.iter().position(|m| matches!(m.role, spectrail_core::Role::System));
    let tail_start = messages.len().saturating_sub(CONTEXT_KEEP_LAST);
    let mut pruned: Vec<Message> = Vec::new();
    // Only prepend the system message separately when the tail slice doesn't already cover
    // it, else it would appear twice.
    if let Some(idx) = system_idx {
        if idx < tail_start {
            pruned.push(messages[idx].clone());
        }
    }
    pruned.extend(messages[tail_start..].iter().cloned());
    Some(pruned)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stub_provider::{FailingProvider, StubChatProvider};
    use spectrail_core::{Error, ProjectResolver};
    use std::path::PathBuf;
    use std::sync::Arc;

    struct FixedResolver(PathBuf);

    impl ProjectResolver for FixedResolver {
        fn repo_path(&self, _project_id: &str) -> Result<PathBuf> {
            Ok(self.0.clone())
        }
    }

    async fn fixture() -> (RunLog, ToolRegistry, String, String, String) {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("README.md"), "hello").unwrap();
        let run_log = RunLog::in_memory().unwrap();
        let project = run_log.create_project("demo", tmp.path().to_str().unwrap()).await.unwrap();
        let task = run_log.create_task(&project.id, "Add caching", "plan", "active").await.unwrap();
        let run = run_log.open_run(&task.id, "plan", "openai", "gpt-4o").await.unwrap();
        let registry = ToolRegistry::new(Arc::new(FixedResolver(tmp.path().to_path_buf())));
        // leak tmp so the repo root stays alive for the duration of the test
        std::mem::forget(tmp);
        (run_log, registry, run.id, task.id, project.id)
    }

    fn tool_call(name: &str, args: &str) -> ToolCall {
        ToolCall { id: uuid::Uuid::new_v4().to_string(), name: name.to_string(), arguments: args.to_string() }
    }

    #[tokio::test]
    async fn plan_happy_path_produces_expected_messages_and_artifact() {
        let (run_log, mut registry, run_id, task_id, project_id) = fixture().await;
        registry.register(spectrail_tools::tools::list_files::ListFilesTool::new());
        registry.register(spectrail_tools::tools::read_file::ReadFileTool::new());

        let provider = StubChatProvider::new(vec![
            AssistantTurn { content: None, tool_calls: vec![tool_call("list_files", "{}")] },
            AssistantTurn {
                content: None,
                tool_calls: vec![tool_call("read_file", "{\"path\":\"README.md\"}")],
            },
            AssistantTurn {
                content: Some("# Implementation Plan: X\n## 1. Summary\n...".to_string()),
                tool_calls: vec![],
            },
        ]);

        let agent_loop = AgentLoop::new(&provider, &registry, &run_log, &run_id, &task_id, &project_id, "plan_md");
        let seed = vec![Message::system("system prompt"), Message::user("Task: Add caching")];
        let outcome = agent_loop.run(seed, CancellationToken::new()).await.unwrap();

        assert!(!outcome.truncated);
        assert_eq!(outcome.tool_calls_count, 2);
        assert_eq!(outcome.final_content, "# Implementation Plan: X\n## 1. Summary\n...");

        let messages = run_log.list_messages(&run_id).await.unwrap();
        assert_eq!(messages.len(), 7);
        let roles: Vec<&str> = messages.iter().map(|m| m.role.as_str()).collect();
        assert_eq!(
            roles,
            vec!["system", "user", "assistant", "tool", "assistant", "tool", "assistant"]
        );
        // final assistant message (turn 3) is persisted separately once no tool_calls remain
        let final_assistant = run_log.append_message(&run_id, "assistant", "noop").await;
        assert!(final_assistant.is_err(), "run should already be closed");

        let tool_calls = run_log.list_tool_calls(&run_id).await.unwrap();
        assert_eq!(tool_calls.len(), 2);
        for tc in &tool_calls {
            assert!(
                !tc.result_json.contains("\"error\""),
                "tool call {} should have succeeded, got {}",
                tc.name,
                tc.result_json
            );
        }

        let artifacts = run_log.list_artifacts(&task_id).await.unwrap();
        assert_eq!(artifacts.len(), 1);
        assert_eq!(artifacts[0].kind, "plan_md");
        assert_eq!(artifacts[0].content, outcome.final_content);
    }

    #[tokio::test]
    async fn iteration_cap_forces_artifact_after_twelve_turns() {
        let (run_log, mut registry, run_id, task_id, project_id) = fixture().await;
        registry.register(spectrail_tools::tools::list_files::ListFilesTool::new());

        let provider = StubChatProvider::always_call("list_files", "{}");
        let agent_loop = AgentLoop::new(&provider, &registry, &run_log, &run_id, &task_id, &project_id, "plan_md");
        let seed = vec![Message::system("sys"), Message::user("go")];
        let outcome = agent_loop.run(seed, CancellationToken::new()).await.unwrap();

        assert!(outcome.truncated);
        assert_eq!(outcome.tool_calls_count, 12);
        let tool_calls = run_log.list_tool_calls(&run_id).await.unwrap();
        assert_eq!(tool_calls.len(), 12);
        assert!(outcome.final_content.contains("truncated"));
    }

    #[tokio::test]
    async fn context_cap_prunes_to_system_plus_last_six_before_final_call() {
        let (run_log, registry, run_id, task_id, project_id) = fixture().await;
        let huge_user = Message::user("x".repeat(200_000));
        let provider = StubChatProvider::single_final("final answer");
        let agent_loop = AgentLoop::new(&provider, &registry, &run_log, &run_id, &task_id, &project_id, "plan_md");
        let seed = vec![Message::system("sys"), huge_user];
        let outcome = agent_loop.run(seed, CancellationToken::new()).await.unwrap();
        assert!(outcome.truncated);
        assert_eq!(outcome.final_content, "final answer");
    }

    #[tokio::test]
    async fn path_escape_is_recoverable_and_loop_continues() {
        let (run_log, mut registry, run_id, task_id, project_id) = fixture().await;
        registry.register(spectrail_tools::tools::read_file::ReadFileTool::new());

        let provider = StubChatProvider::new(vec![
            AssistantTurn {
                content: None,
                tool_calls: vec![tool_call("read_file", "{\"path\":\"../etc/passwd\"}")],
            },
            AssistantTurn { content: Some("done".to_string()), tool_calls: vec![] },
        ]);

        let agent_loop = AgentLoop::new(&provider, &registry, &run_log, &run_id, &task_id, &project_id, "plan_md");
        let seed = vec![Message::system("sys"), Message::user("go")];
        let outcome = agent_loop.run(seed, CancellationToken::new()).await.unwrap();

        assert_eq!(outcome.final_content, "done");
        let tool_calls = run_log.list_tool_calls(&run_id).await.unwrap();
        assert_eq!(tool_calls.len(), 1);
        assert!(tool_calls[0].result_json.contains("path escape") || tool_calls[0].result_json.contains("error"));
    }

    #[tokio::test]
    async fn provider_401_aborts_run_with_no_artifact() {
        let (run_log, registry, run_id, task_id, project_id) = fixture().await;
        let provider = FailingProvider(Error::InvalidCredentials);
        let agent_loop = AgentLoop::new(&provider, &registry, &run_log, &run_id, &task_id, &project_id, "plan_md");
        let seed = vec![Message::system("sys"), Message::user("go")];
        let err = agent_loop.run(seed, CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, Error::InvalidCredentials));

        let run = run_log.get_run(&run_id).await.unwrap();
        assert!(run.ended_at.is_some());
        let artifacts = run_log.list_artifacts(&task_id).await.unwrap();
        assert!(artifacts.is_empty());
        let messages = run_log.list_messages(&run_id).await.unwrap();
        assert_eq!(messages.len(), 2);
    }
}
