//! Builds the opening `system`+`user` message pair for each run mode.

use spectrail_core::Message;

const PLAN_SYSTEM_PROMPT: &str = "You are a senior engineer producing an implementation plan for a \
software change. Explore the repository with the tools available to you (list_files, read_file, \
grep, git_status, git_diff, git_log_short) before writing anything. When you have enough context, \
respond with no further tool calls and a single Markdown document using exactly these seven \
sections, in order:\n\
1. Summary\n\
2. Goals & Non-Goals\n\
3. Repo Context Assumptions\n\
4. File-by-File Changes\n\
5. Step-by-Step Checklist\n\
6. Risks + Mitigations\n\
7. Validation Steps\n";

const VERIFY_SYSTEM_PROMPT: &str = "You are a senior engineer reviewing a change for compliance, \
risk and quality before handoff. You will be given the current diff and, if available, the prior \
implementation plan, plus the output of any pre-run checks (tests/lint/build). Explore further with \
the available tools if needed, then respond with no further tool calls and a single Markdown \
document using exactly these four sections, in order:\n\
1. Compliance\n\
2. Risk\n\
3. Quality\n\
4. Recommendations\n";

pub struct PromptBuilder;

impl PromptBuilder {
    /// Seed messages for a `generate_plan` run.
    pub fn plan_seed(task_title: &str, repo_path: &str) -> Vec<Message> {
        vec![
            Message::system(PLAN_SYSTEM_PROMPT),
            Message::user(format!(
                "Task: {task_title}\nRepository path: {repo_path}\n\nProduce the implementation plan."
            )),
        ]
    }

    /// Seed messages for a `verify_task` run. `diff` and `check_output` are pre-gathered by the
    /// facade (via `git_diff`/`run_command`) and folded into the user message so the model can
    /// reason over them without spending a turn fetching them itself.
    pub fn verify_seed(
        task_title: &str,
        repo_path: &str,
        diff: &str,
        prior_plan: Option<&str>,
        check_output: &str,
    ) -> Vec<Message> {
        let mut user = format!("Task: {task_title}\nRepository path: {repo_path}\n\nCurrent diff:\n```diff\n{diff}\n```\n");
        if let Some(plan) = prior_plan {
            user.push_str(&format!("\nPrior implementation plan:\n{plan}\n"));
        }
        user.push_str(&format!("\nPre-run check output:\n{check_output}\n\nProduce the verification report."));
        vec![Message::system(VERIFY_SYSTEM_PROMPT), Message::user(user)]
    }
}
