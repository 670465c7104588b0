//! Bounded shell command execution.
//!
//! The caller-supplied timeout is validated by the bridge and enforced
//! here; a timed-out child is killed rather than orphaned.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::process::Command;

use quill_bridge::CommandRunner;
use quill_types::ShellOutput;

/// Captured stdout/stderr are truncated beyond this many characters.
const MAX_CAPTURED_OUTPUT: usize = 100_000;

pub struct HostShell {
    workspace_root: PathBuf,
}

impl HostShell {
    pub fn new(workspace_root: impl AsRef<Path>) -> Self {
        Self {
            workspace_root: workspace_root.as_ref().to_path_buf(),
        }
    }

    fn command(&self, command_line: &str) -> Command {
        let mut command = if cfg!(windows) {
            let mut c = Command::new("powershell");
            c.args(["-NoProfile", "-Command", command_line]);
            c
        } else {
            let mut c = Command::new("sh");
            c.args(["-c", command_line]);
            c
        };
        command
            .current_dir(&self.workspace_root)
            .stdin(std::process::Stdio::null())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .kill_on_drop(true);
        command
    }
}

#[async_trait]
impl CommandRunner for HostShell {
    async fn run(&self, command_line: &str, timeout_ms: u64) -> anyhow::Result<ShellOutput> {
        let started = Instant::now();
        let child = self.command(command_line).spawn()?;

        let waited = tokio::time::timeout(
            Duration::from_millis(timeout_ms),
            child.wait_with_output(),
        )
        .await;

        match waited {
            Ok(output) => {
                let output = output?;
                Ok(ShellOutput {
                    stdout: truncate_output(String::from_utf8_lossy(&output.stdout)),
                    stderr: truncate_output(String::from_utf8_lossy(&output.stderr)),
                    exit_code: output.status.code(),
                    duration_ms: started.elapsed().as_millis() as u64,
                })
            }
            // Dropping the wait future kills the child (kill_on_drop).
            Err(_) => anyhow::bail!("command timed out after {timeout_ms}ms"),
        }
    }
}

fn truncate_output(raw: std::borrow::Cow<'_, str>) -> String {
    if raw.chars().count() <= MAX_CAPTURED_OUTPUT {
        return raw.into_owned();
    }
    let mut out: String = raw.chars().take(MAX_CAPTURED_OUTPUT).collect();
    out.push_str("\n…output truncated");
    out
}
