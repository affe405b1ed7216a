//! SpecTrail CLI — a minimal command-line demonstrator wiring the core workspace against a
//! real repository, for manual smoke-testing. Not part of the desktop shell.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use spectrail_runlog::RunLog;
use spectrail_workflow::{VerifyOptions, WorkflowFacade};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "spectrail", about = "SpecTrail core workbench — plan and verify over a repository")]
struct Cli {
    /// Path to the SQLite run log. Defaults to an in-memory database that disappears on exit.
    #[arg(long)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate an implementation plan for a task against a repository.
    Plan {
        /// Repository root to drive the agent over.
        repo: PathBuf,
        /// Task title shown to the model.
        #[arg(short, long, default_value = "Untitled task")]
        title: String,
    },
    /// Verify the current diff against an (optional) prior plan.
    Verify {
        repo: PathBuf,
        #[arg(short, long, default_value = "Untitled task")]
        title: String,
        #[arg(long)]
        run_tests: bool,
        #[arg(long)]
        run_lint: bool,
        #[arg(long)]
        run_build: bool,
        #[arg(long)]
        staged: bool,
    },
    /// Set a single provider configuration key (provider_name, base_url, model, api_key,
    /// temperature, max_tokens, extra_headers_json, dev_mode).
    Configure { key: String, value: String },
    /// Print the transcript (messages and tool calls) of a prior run.
    ShowRun { run_id: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "spectrail=info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let run_log = match &cli.db {
        Some(path) => RunLog::open(path)?,
        None => RunLog::in_memory()?,
    };

    match cli.command {
        Commands::Plan { repo, title } => {
            let facade = WorkflowFacade::new(run_log.clone());
            let (project, task) = seed_project_and_task(&run_log, &repo, &title, "plan").await?;
            let result = facade.generate_plan(&project, &task).await?;
            println!("--- plan_md (run {}) ---\n{}", result.run_id, result.plan_md);
            println!(
                "\ntool_calls={} truncated={}",
                result.tool_calls_count, result.truncated
            );
        }
        Commands::Verify { repo, title, run_tests, run_lint, run_build, staged } => {
            let facade = WorkflowFacade::new(run_log.clone());
            let (project, task) = seed_project_and_task(&run_log, &repo, &title, "review").await?;
            let options = VerifyOptions { run_tests, run_lint, run_build, staged };
            let result = facade.verify_task(&project, &task, options).await?;
            println!("--- verification_report (run {}) ---\n{}", result.run_id, result.report_md);
            println!(
                "\nran_checks={{tests:{}, lint:{}, build:{}}} truncated={}",
                result.ran_checks.tests, result.ran_checks.lint, result.ran_checks.build, result.truncated
            );
        }
        Commands::Configure { key, value } => {
            run_log.bulk_upsert_settings(vec![(key.clone(), value.clone())]).await?;
            println!("set {key} = {value}");
        }
        Commands::ShowRun { run_id } => {
            let messages = run_log.list_messages(&run_id).await?;
            let tool_calls = run_log.list_tool_calls(&run_id).await?;
            for m in &messages {
                println!("[{}] {}: {}", m.created_at, m.role, m.content);
            }
            println!("\n{} tool call(s):", tool_calls.len());
            for tc in &tool_calls {
                println!("  {} {} -> {}", tc.name, tc.args_json, tc.result_json);
            }
        }
    }

    Ok(())
}

/// The CLI demonstrator's own stand-in for project/task CRUD (§3 expansion note): creates a
/// throwaway project/task pair pointed at the given repo root so the facade has somewhere
/// real to point its foreign keys.
async fn seed_project_and_task(
    run_log: &RunLog,
    repo: &PathBuf,
    title: &str,
    mode: &str,
) -> anyhow::Result<(String, String)> {
    let repo_path = repo
        .canonicalize()
        .map_err(|e| anyhow::anyhow!("repo path {} does not exist: {e}", repo.display()))?;
    let project = run_log.create_project("cli-session", repo_path.to_string_lossy()).await?;
    let task = run_log.create_task(&project.id, title, mode, "active").await?;
    Ok((project.id, task.id))
}
