//! Shell command execution utilities.
//!
//! Commands run under `/bin/sh -ce` so multi-statement hook strings stop at
//! the first failing statement. Arguments that come from configuration are
//! wrapped with [`shellquote`] before they are spliced into a command line.
//!
//! # Example
//!
//! ```ignore
//! use wgquick_common::shell::{self, IP_CMD, shellquote};
//!
//! let cmd = format!("{} link set dev {} up", IP_CMD, shellquote("wg0"));
//! shell::exec_or_throw(&cmd).await?;
//! ```

use once_cell::sync::Lazy;
use regex::Regex;
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use crate::error::{CommonError, CommonResult};

/// Shell used for every command.
pub const SH_CMD: &str = "/bin/sh";

/// Path to the `ip` command for link, address and route configuration.
pub const IP_CMD: &str = "/sbin/ip";

/// The `wg` tool, resolved through `PATH`.
pub const WG_CMD: &str = "wg";

/// The `resolvconf` tool, resolved through `PATH`.
pub const RESOLVCONF_CMD: &str = "resolvconf";

/// Regex for characters that need escaping in shell double-quotes.
/// Matches: $, `, ", \, and newline
static SHELL_ESCAPE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"([$`"\\\n])"#).expect("Invalid regex pattern"));

/// Quotes a string for safe use in shell commands.
///
/// Wraps the string in double quotes and escapes `$`, `` ` ``, `"`, `\` and
/// newline.
///
/// # Example
///
/// ```
/// use wgquick_common::shell::shellquote;
///
/// assert_eq!(shellquote("wg0"), "\"wg0\"");
/// assert_eq!(shellquote("with$var"), "\"with\\$var\"");
/// ```
pub fn shellquote(s: &str) -> String {
    let escaped = SHELL_ESCAPE_RE.replace_all(s, r"\$1");
    format!("\"{}\"", escaped)
}

/// Result of a shell command execution.
#[derive(Debug, Clone)]
pub struct ExecResult {
    /// The exit code of the command (0 = success, -1 = killed by signal).
    pub exit_code: i32,
    /// The stdout output, trimmed.
    pub stdout: String,
    /// The stderr output, trimmed.
    pub stderr: String,
}

impl ExecResult {
    /// Returns true if the command succeeded (exit code 0).
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Returns the combined output (stdout + stderr).
    pub fn combined_output(&self) -> String {
        if self.stderr.is_empty() {
            self.stdout.clone()
        } else if self.stdout.is_empty() {
            self.stderr.clone()
        } else {
            format!("{}\n{}", self.stdout, self.stderr)
        }
    }

    /// Converts a non-zero exit into [`CommonError::ShellCommandFailed`].
    pub fn into_checked(self, cmd: &str) -> CommonResult<ExecResult> {
        if self.success() {
            Ok(self)
        } else {
            Err(CommonError::ShellCommandFailed {
                command: cmd.to_string(),
                exit_code: self.exit_code,
                output: self.combined_output(),
            })
        }
    }
}

/// Executes a shell command.
///
/// Returns `Err` only when the shell cannot be spawned; a non-zero exit is
/// reported through [`ExecResult::exit_code`].
pub async fn exec(cmd: &str) -> CommonResult<ExecResult> {
    exec_with_stdin(cmd, None).await
}

/// Executes a shell command, writing `stdin` to its standard input.
///
/// With `stdin = None` the child inherits an empty standard input.
pub async fn exec_with_stdin(cmd: &str, stdin: Option<&str>) -> CommonResult<ExecResult> {
    tracing::debug!(command = %cmd, "Executing shell command");

    let spawn_err = |e| CommonError::ShellExec {
        command: cmd.to_string(),
        source: e,
    };

    let mut child = Command::new(SH_CMD)
        .arg("-ce")
        .arg(cmd)
        .stdin(if stdin.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(spawn_err)?;

    if let (Some(text), Some(mut pipe)) = (stdin, child.stdin.take()) {
        pipe.write_all(text.as_bytes()).await.map_err(spawn_err)?;
        // Closing the pipe delivers EOF to the child.
        drop(pipe);
    }

    let output = child.wait_with_output().await.map_err(spawn_err)?;

    let exit_code = output.status.code().unwrap_or(-1);
    let result = ExecResult {
        exit_code,
        stdout: String::from_utf8_lossy(&output.stdout).trim().to_string(),
        stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
    };

    if result.success() {
        tracing::trace!(command = %cmd, exit_code = exit_code, "Command succeeded");
    } else {
        tracing::debug!(
            command = %cmd,
            exit_code = exit_code,
            stderr = %result.stderr,
            "Command failed"
        );
    }

    Ok(result)
}

/// Executes a shell command and fails on non-zero exit.
///
/// Returns the stdout output on success.
pub async fn exec_or_throw(cmd: &str) -> CommonResult<String> {
    Ok(exec(cmd).await?.into_checked(cmd)?.stdout)
}

/// Like [`exec_or_throw`], piping `stdin` into the command.
pub async fn exec_or_throw_with_stdin(cmd: &str, stdin: &str) -> CommonResult<String> {
    Ok(exec_with_stdin(cmd, Some(stdin))
        .await?
        .into_checked(cmd)?
        .stdout)
}
