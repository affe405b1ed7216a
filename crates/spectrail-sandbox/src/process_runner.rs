//! Child-process execution with a wall-clock timeout, cwd pinning, captured stdio and an
//! on-drop kill policy so an abandoned future can't leak a process.

use serde::Serialize;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

use crate::output_bounder::bound_bytes;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);
const PER_STREAM_CAP: usize = 100 * 1024;

#[derive(Clone, Debug, Serialize)]
pub struct ProcessOutput {
    pub success: bool,
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub timed_out: bool,
}

pub struct ProcessRunner {
    cwd: PathBuf,
}

impl ProcessRunner {
    pub fn new(cwd: impl AsRef<Path>) -> Self {
        Self { cwd: cwd.as_ref().to_path_buf() }
    }

    /// Run `argv` (already split — never a shell string) with the default 120s timeout.
    pub async fn run(&self, argv: &[String]) -> ProcessOutput {
        self.run_with_timeout(argv, DEFAULT_TIMEOUT, CancellationToken::new()).await
    }

    /// Run `argv` with a caller-supplied timeout (may only lower the default, per §4.3) and
    /// a cancellation token that, when triggered, kills the child immediately.
    pub async fn run_with_timeout(
        &self,
        argv: &[String],
        timeout: Duration,
        cancel: CancellationToken,
    ) -> ProcessOutput {
        let Some((program, args)) = argv.split_first() else {
            return ProcessOutput {
                success: false,
                exit_code: None,
                stdout: String::new(),
                stderr: "empty argv".to_string(),
                timed_out: false,
            };
        };

        let mut child = match Command::new(program)
            .args(args)
            .current_dir(&self.cwd)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
        {
            Ok(child) => child,
            Err(e) => {
                return ProcessOutput {
                    success: false,
                    exit_code: None,
                    stdout: String::new(),
                    stderr: format!("failed to spawn {program}: {e}"),
                    timed_out: false,
                }
            }
        };

        let stdout_pipe = child.stdout.take();
        let stderr_pipe = child.stderr.take();
        // Drain both pipes on their own tasks, concurrently with the wait/timeout/cancel race
        // below. A child that writes more than the OS pipe buffer before exiting would
        // otherwise block forever on `wait()` with nobody reading the other end.
        let stdout_reader = tokio::spawn(read_capped(stdout_pipe));
        let stderr_reader = tokio::spawn(read_capped(stderr_pipe));

        let (timed_out, cancelled, wait_result) = tokio::select! {
            status = child.wait() => (false, false, Some(status)),
            _ = tokio::time::sleep(timeout) => {
                let _ = child.start_kill();
                (true, false, None)
            }
            _ = cancel.cancelled() => {
                let _ = child.start_kill();
                (false, true, None)
            }
        };

        // Killing the child closes its ends of the pipes, so the reader tasks hit EOF and
        // return promptly even when the race above ended in a kill rather than a natural exit.
        let stdout = stdout_reader.await.unwrap_or_default();
        let stderr = stderr_reader.await.unwrap_or_default();

        if timed_out {
            return ProcessOutput { success: false, exit_code: None, stdout, stderr, timed_out: true };
        }
        if cancelled {
            return ProcessOutput { success: false, exit_code: None, stdout, stderr, timed_out: false };
        }

        match wait_result.expect("wait_result is Some on the non-timeout, non-cancelled path") {
            Ok(status) => {
                ProcessOutput { success: status.success(), exit_code: status.code(), stdout, stderr, timed_out: false }
            }
            Err(e) => ProcessOutput {
                success: false,
                exit_code: None,
                stdout,
                stderr: format!("wait failed: {e}"),
                timed_out: false,
            },
        }
    }
}

async fn read_capped(pipe: Option<impl tokio::io::AsyncRead + Unpin>) -> String {
    let Some(mut pipe) = pipe else { return String::new() };
    let mut buf = Vec::new();
    // Reads past the cap are simply dropped on the floor once collected; subprocess output
    // this large is already beyond what an agent turn can usefully reason over.
    let _ = pipe.take(PER_STREAM_CAP as u64 + 1).read_to_end(&mut buf).await;
    let bounded = bound_bytes(&buf, PER_STREAM_CAP);
    String::from_utf8_lossy(&bounded.clipped).into_owned()
}
