//! User hook commands and DNS registration.
//!
//! Hooks run under `sh -ce` after every `%i` is replaced with the interface
//! name. Their combined output is logged; a spawn failure or non-zero exit is
//! reported as [`WgQuickError::HookFailed`].

use std::fmt;
use std::net::IpAddr;

use tracing::{error, info, instrument};
use wgquick_common::defaults::IFACE_MARKER;
use wgquick_common::shell;

use crate::error::{Result, WgQuickError};

/// Lifecycle point at which a user hook runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookStage {
    PreUp,
    PostUp,
    PreDown,
    PostDown,
}

impl HookStage {
    pub const ALL: [HookStage; 4] = [
        HookStage::PreUp,
        HookStage::PostUp,
        HookStage::PreDown,
        HookStage::PostDown,
    ];

    /// Configuration file key.
    pub fn key(&self) -> &'static str {
        match self {
            HookStage::PreUp => "PreUp",
            HookStage::PostUp => "PostUp",
            HookStage::PreDown => "PreDown",
            HookStage::PostDown => "PostDown",
        }
    }
}

impl fmt::Display for HookStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// Replaces every interface marker in `command` with `iface`.
pub fn substitute_iface(command: &str, iface: &str) -> String {
    command.replace(IFACE_MARKER, iface)
}

/// Runs a hook command, optionally feeding `stdin` to it.
///
/// Returns the combined output.
#[instrument(skip(command, stdin))]
pub async fn run_hook(command: &str, iface: &str, stdin: Option<&str>) -> Result<String> {
    let command = substitute_iface(command, iface);

    let result = shell::exec_with_stdin(&command, stdin)
        .await
        .map_err(|source| WgQuickError::HookFailed {
            command: command.clone(),
            source,
        })?;
    let output = result.combined_output();

    match result.into_checked(&command) {
        Ok(_) => {
            info!(cmd = %command, output = %output, "Executed hook");
            Ok(output)
        }
        Err(source) => {
            error!(cmd = %command, output = %output, "Hook failed");
            Err(WgQuickError::HookFailed { command, source })
        }
    }
}

/// Runs the hook for `stage` unless it is unset or blank.
pub async fn run_optional_hook(stage: HookStage, command: Option<&str>, iface: &str) -> Result<()> {
    match command.map(str::trim) {
        Some(cmd) if !cmd.is_empty() => {
            info!(stage = %stage, "Running hook");
            run_hook(cmd, iface, None).await?;
        }
        _ => {}
    }
    Ok(())
}

fn resolvconf_record() -> String {
    format!("tun.{}", IFACE_MARKER)
}

/// Registers one name server for the interface through `resolvconf`.
///
/// `resolvconf` is the command to invoke, normally
/// [`RESOLVCONF_CMD`](wgquick_common::shell::RESOLVCONF_CMD).
pub async fn register_dns(resolvconf: &str, server: IpAddr, iface: &str) -> Result<()> {
    let cmd = format!("{} -a {} -m 0 -x", resolvconf, resolvconf_record());
    run_hook(&cmd, iface, Some(&format!("nameserver {}\n", server))).await?;
    Ok(())
}

/// Removes the interface's `resolvconf` record.
pub async fn deregister_dns(resolvconf: &str, iface: &str) -> Result<()> {
    let cmd = format!("{} -d {}", resolvconf, resolvconf_record());
    run_hook(&cmd, iface, None).await?;
    Ok(())
}
