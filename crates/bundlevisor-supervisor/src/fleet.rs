//! Fleet Command Executor: one shell command per bundle directory.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, info, warn};

pub const NO_OUTPUT: &str = "(no output)";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FleetOutcome {
    Completed {
        exit_code: Option<i32>,
        output: String,
    },
    TimedOut,
    SpawnFailed(String),
}

impl FleetOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, FleetOutcome::Completed { exit_code: Some(0), .. })
    }

    /// Metric label for the outcome.
    pub fn label(&self) -> &'static str {
        match self {
            FleetOutcome::Completed {
                exit_code: Some(0), ..
            } => "completed",
            FleetOutcome::Completed { .. } => "failed",
            FleetOutcome::TimedOut => "timed_out",
            FleetOutcome::SpawnFailed(_) => "spawn_failed",
        }
    }

    pub fn render(&self, timeout: Duration) -> String {
        match self {
            FleetOutcome::Completed { exit_code, output } => {
                let mut text = if output.trim().is_empty() {
                    NO_OUTPUT.to_string()
                } else {
                    output.trim_end().to_string()
                };
                match exit_code {
                    Some(0) => {}
                    Some(code) => text.push_str(&format!("\n[exit code {code}]")),
                    None => text.push_str("\n[terminated by signal]"),
                }
                text
            }
            FleetOutcome::TimedOut => {
                format!("⏱ timed out after {}s", timeout.as_secs())
            }
            FleetOutcome::SpawnFailed(reason) => format!("❌ failed to run: {reason}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FleetResult {
    pub instance_id: String,
    pub outcome: FleetOutcome,
}

#[derive(Debug, Clone)]
pub struct FleetReport {
    pub results: Vec<FleetResult>,
    timeout: Duration,
}

impl FleetReport {
    /// Aggregate text in result order, truncated to `limit` bytes.
    pub fn render(&self, limit: usize) -> String {
        if self.results.is_empty() {
            return "No bundles found.".to_string();
        }

        let sections: Vec<String> = self
            .results
            .iter()
            .map(|result| {
                format!(
                    "==== {} ====\n{}",
                    result.instance_id,
                    result.outcome.render(self.timeout)
                )
            })
            .collect();
        truncate_output(&sections.join("\n\n"), limit)
    }
}

/// Cut `text` to at most `limit` bytes on a char boundary, marking the cut.
pub fn truncate_output(text: &str, limit: usize) -> String {
    if text.len() <= limit {
        return text.to_string();
    }

    let mut cut = limit;
    while cut > 0 && !text.is_char_boundary(cut) {
        cut -= 1;
    }
    format!(
        "{}\n... [truncated {} bytes]",
        &text[..cut],
        text.len() - cut
    )
}

#[derive(Debug, Clone)]
pub struct FleetExecutor {
    shell: String,
    shell_flag: String,
    timeout: Duration,
}

impl FleetExecutor {
    pub fn new(timeout: Duration) -> Self {
        let (shell, shell_flag) = if cfg!(windows) {
            ("cmd", "/C")
        } else {
            ("sh", "-c")
        };
        Self {
            shell: shell.to_string(),
            shell_flag: shell_flag.to_string(),
            timeout,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Run `command` once in `working_dir`, bounded by the timeout.
    pub async fn run_single(&self, working_dir: &Path, command: &str) -> FleetOutcome {
        let mut shell = Command::new(&self.shell);
        shell
            .arg(&self.shell_flag)
            .arg(command)
            .current_dir(working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        crate::new_session(&mut shell);

        let child = match shell.spawn() {
            Ok(child) => child,
            Err(e) => return FleetOutcome::SpawnFailed(e.to_string()),
        };
        let pid = child.id();

        match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => {
                let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
                text.push_str(&String::from_utf8_lossy(&output.stderr));
                FleetOutcome::Completed {
                    exit_code: output.status.code(),
                    output: text,
                }
            }
            Ok(Err(e)) => FleetOutcome::SpawnFailed(e.to_string()),
            Err(_) => {
                // The shell dies with the dropped future, anything it
                // started goes with the group.
                if let Some(pid) = pid {
                    kill_process_group(pid);
                }
                FleetOutcome::TimedOut
            }
        }
    }

    /// Run `command` against every target, sequentially and in order.
    ///
    /// Targets pointing at the same directory run once, under the first id.
    pub async fn run_across(&self, targets: &[(String, PathBuf)], command: &str) -> FleetReport {
        let mut seen = HashSet::new();
        let mut results = Vec::with_capacity(targets.len());

        for (instance_id, working_dir) in targets {
            let canonical = std::fs::canonicalize(working_dir).unwrap_or_else(|_| working_dir.clone());
            if !seen.insert(canonical) {
                debug!(instance_id = %instance_id, "Skipping duplicate bundle directory");
                continue;
            }

            let outcome = self.run_single(working_dir, command).await;
            match &outcome {
                FleetOutcome::TimedOut => {
                    warn!(instance_id = %instance_id, "Fleet command timed out")
                }
                FleetOutcome::SpawnFailed(reason) => {
                    warn!(instance_id = %instance_id, error = %reason, "Fleet command failed to spawn")
                }
                FleetOutcome::Completed { exit_code, .. } => {
                    debug!(instance_id = %instance_id, exit_code = ?exit_code, "Fleet command finished")
                }
            }
            results.push(FleetResult {
                instance_id: instance_id.clone(),
                outcome,
            });
        }

        info!(count = results.len(), "Fleet command completed across bundles");
        FleetReport {
            results,
            timeout: self.timeout,
        }
    }
}

#[cfg(unix)]
fn kill_process_group(pid: u32) {
    crate::signal_group(pid, libc::SIGKILL);
}

#[cfg(not(unix))]
fn kill_process_group(_pid: u32) {}
