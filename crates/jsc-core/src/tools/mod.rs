//! External tools run by the remote handlers.
//!
//! Tools run with captured output; the caller decides what a failure means.
//! Interactive commands go through [`crate::server::interactive`] instead.

pub mod git;
pub mod package;

use std::path::Path;
use std::process::Stdio;

use tracing::debug;

use crate::server::HandlerError;

/// Captured result of a finished tool.
#[derive(Debug, Clone)]
pub struct ToolOutput {
    /// Exit code, `-1` when killed by a signal.
    pub status: i32,
    pub stdout: String,
    pub stderr: String,
}

impl ToolOutput {
    pub fn success(&self) -> bool {
        self.status == 0
    }

    /// Text to surface when the tool failed: stderr, else stdout.
    pub fn failure_text(&self) -> &str {
        let err = self.stderr.trim();
        if err.is_empty() {
            self.stdout.trim()
        } else {
            err
        }
    }
}

/// Run `program args...` to completion with stdin closed.
pub async fn run_captured(
    program: &str,
    args: &[String],
    cwd: Option<&Path>,
    env: &[(&str, String)],
) -> Result<ToolOutput, HandlerError> {
    let mut cmd = tokio::process::Command::new(program);
    cmd.args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    if let Some(dir) = cwd {
        cmd.current_dir(dir);
    }
    for (key, value) in env {
        cmd.env(key, value);
    }

    debug!(program, ?args, "running tool");
    let output = cmd
        .output()
        .await
        .map_err(HandlerError::io(format!("failed to run {program}")))?;

    let result = ToolOutput {
        status: output.status.code().unwrap_or(-1),
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
    };
    debug!(program, status = result.status, "tool finished");
    Ok(result)
}
