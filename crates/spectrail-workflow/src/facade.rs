//! `WorkflowFacade` — the two public entry points (`generate_plan`, `verify_task`) plus the
//! read queries the host shell uses to render a run's transcript. Orchestrates every other
//! component; depended on by nothing (§9: "never [make AgentLoop] depend on the facade").

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument};

use spectrail_agent::{AgentLoop, PromptBuilder};
use spectrail_core::{Error, Result, Settings};
use spectrail_llm::{ChatProvider, OpenAiCompatibleProvider};
use spectrail_runlog::{Artifact, MessageRow, RunLog, ToolCallRow};

use crate::resolver::StaticResolver;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PlanResult {
    pub run_id: String,
    pub plan_md: String,
    pub tool_calls_count: usize,
    pub truncated: bool,
}

#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize)]
pub struct VerifyOptions {
    #[serde(default)]
    pub run_tests: bool,
    #[serde(default)]
    pub run_lint: bool,
    #[serde(default)]
    pub run_build: bool,
    #[serde(default)]
    pub staged: bool,
}

#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize)]
pub struct RanChecks {
    pub tests: bool,
    pub lint: bool,
    pub build: bool,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct VerifyResult {
    pub run_id: String,
    pub report_md: String,
    pub ran_checks: RanChecks,
    pub truncated: bool,
}

/// The `{code, message}` envelope facade errors are mapped into before reaching the host shell.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ErrorEnvelope {
    pub code: String,
    pub message: String,
}

impl From<&Error> for ErrorEnvelope {
    fn from(err: &Error) -> Self {
        Self { code: err.code().to_string(), message: err.to_string() }
    }
}

/// Builds the `ChatProvider` for a run from a settings snapshot. Pluggable so tests can swap
/// in a `StubChatProvider` without touching the network; `WorkflowFacade::new` wires up the
/// real `OpenAiCompatibleProvider`.
pub type ProviderFactory = Arc<dyn Fn(Settings) -> Result<Arc<dyn ChatProvider>> + Send + Sync>;

pub struct WorkflowFacade {
    run_log: RunLog,
    provider_factory: ProviderFactory,
}

impl WorkflowFacade {
    /// Wires up the real OpenAI-compatible provider from the settings snapshot at run start.
    pub fn new(run_log: RunLog) -> Self {
        Self::with_provider_factory(
            run_log,
            Arc::new(|settings| {
                OpenAiCompatibleProvider::new(settings).map(|p| Arc::new(p) as Arc<dyn ChatProvider>)
            }),
        )
    }

    pub fn with_provider_factory(run_log: RunLog, provider_factory: ProviderFactory) -> Self {
        Self { run_log, provider_factory }
    }

    pub fn run_log(&self) -> &RunLog {
        &self.run_log
    }

    async fn load_settings(&self) -> Result<Settings> {
        let map = self.run_log.get_settings_map().await?;
        Settings::from_map(&map)
    }

    /// `generate_plan(project_id, task_id)` without caller-managed cancellation; equivalent to
    /// `generate_plan_cancellable` with a token that is never triggered.
    pub async fn generate_plan(&self, project_id: &str, task_id: &str) -> Result<PlanResult> {
        self.generate_plan_cancellable(project_id, task_id, CancellationToken::new()).await
    }

    #[instrument(skip(self, cancel), fields(project_id, task_id))]
    pub async fn generate_plan_cancellable(
        &self,
        project_id: &str,
        task_id: &str,
        cancel: CancellationToken,
    ) -> Result<PlanResult> {
        let project = self.run_log.get_project(project_id).await?;
        let task = self.run_log.get_task(task_id).await?;
        let settings = self.load_settings().await?;

        let provider = (self.provider_factory)(settings.clone())?;
        let resolver = Arc::new(StaticResolver::new(project_id, project.repo_path.clone()));
        let registry = spectrail_tools::build_registry(resolver);

        let run = self.run_log.open_run(&task.id, "plan", &settings.provider_name, &settings.model).await?;
        info!(run_id = %run.id, "plan run opened");

        let seed = PromptBuilder::plan_seed(&task.title, &project.repo_path);
        let agent_loop =
            AgentLoop::new(provider.as_ref(), &registry, &self.run_log, &run.id, &task.id, project_id, "plan_md");
        let outcome = agent_loop.run(seed, cancel).await?;

        Ok(PlanResult {
            run_id: run.id,
            plan_md: outcome.final_content,
            tool_calls_count: outcome.tool_calls_count,
            truncated: outcome.truncated,
        })
    }

    pub async fn verify_task(
        &self,
        project_id: &str,
        task_id: &str,
        options: VerifyOptions,
    ) -> Result<VerifyResult> {
        self.verify_task_cancellable(project_id, task_id, options, CancellationToken::new()).await
    }

    #[instrument(skip(self, cancel), fields(project_id, task_id))]
    pub async fn verify_task_cancellable(
        &self,
        project_id: &str,
        task_id: &str,
        options: VerifyOptions,
        cancel: CancellationToken,
    ) -> Result<VerifyResult> {
        let project = self.run_log.get_project(project_id).await?;
        let task = self.run_log.get_task(task_id).await?;
        let settings = self.load_settings().await?;

        let provider = (self.provider_factory)(settings.clone())?;
        let resolver = Arc::new(StaticResolver::new(project_id, project.repo_path.clone()));
        let registry = spectrail_tools::build_registry(resolver);

        // Open the run before the pre-run checks so each one has a real run to record a
        // ToolCall row against, rather than running unlogged ahead of the agent's own turns.
        let run = self.run_log.open_run(&task.id, "verify", &settings.provider_name, &settings.model).await?;
        info!(run_id = %run.id, "verify run opened");

        // Pre-run the requested checks through the same `run_command`/`git_diff` tools the
        // agent itself would call, so the facade and the agent observe identical behavior.
        let diff_args = serde_json::json!({"project_id": project_id, "staged": options.staged});
        let diff_result = registry.execute("git_diff", diff_args.clone(), Some(project_id), cancel.clone()).await?;
        self.run_log
            .append_tool_call(
                &run.id,
                "git_diff",
                serde_json::to_string(&diff_args).unwrap_or_default(),
                serde_json::to_string(&diff_result).unwrap_or_default(),
            )
            .await?;
        let diff = diff_result.get("diff").and_then(|v| v.as_str()).unwrap_or_default().to_string();

        let mut ran_checks = RanChecks::default();
        let mut check_output = String::new();
        for (flag, kind, mark) in [
            (options.run_tests, "tests", &mut ran_checks.tests),
            (options.run_lint, "lint", &mut ran_checks.lint),
            (options.run_build, "build", &mut ran_checks.build),
        ] {
            if !flag {
                continue;
            }
            let run_args = serde_json::json!({"project_id": project_id, "kind": kind});
            let result = registry.execute("run_command", run_args.clone(), Some(project_id), cancel.clone()).await?;
            self.run_log
                .append_tool_call(
                    &run.id,
                    "run_command",
                    serde_json::to_string(&run_args).unwrap_or_default(),
                    serde_json::to_string(&result).unwrap_or_default(),
                )
                .await?;
            check_output.push_str(&format!("\n--- {kind} ---\n{}\n", serde_json::to_string_pretty(&result).unwrap_or_default()));
            *mark = true;
        }

        let prior_plan = self
            .run_log
            .list_artifacts(&task.id)
            .await?
            .into_iter()
            .rev()
            .find(|a| a.kind == "plan_md")
            .map(|a| a.content);

        let seed = PromptBuilder::verify_seed(&task.title, &project.repo_path, &diff, prior_plan.as_deref(), &check_output);
        let agent_loop = AgentLoop::new(
            provider.as_ref(),
            &registry,
            &self.run_log,
            &run.id,
            &task.id,
            project_id,
            "verification_report",
        );
        let outcome = agent_loop.run(seed, cancel).await?;

        Ok(VerifyResult {
            run_id: run.id,
            report_md: outcome.final_content,
            ran_checks,
            truncated: outcome.truncated,
        })
    }

    // ---- read queries (§6: "plus read queries") ----

    pub async fn list_tool_calls(&self, run_id: &str) -> Result<Vec<ToolCallRow>> {
        self.run_log.list_tool_calls(run_id).await
    }

    pub async fn list_messages(&self, run_id: &str) -> Result<Vec<MessageRow>> {
        self.run_log.list_messages(run_id).await
    }

    pub async fn list_artifacts(&self, task_id: &str) -> Result<Vec<Artifact>> {
        self.run_log.list_artifacts(task_id).await
    }
}
