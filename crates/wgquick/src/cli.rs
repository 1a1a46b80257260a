//! Command line interface.

use std::path::{Path, PathBuf};

use clap::{Parser, ValueEnum};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::config::Config;
use crate::error::{Result, WgQuickError};

/// Linux interface names: at most 15 bytes of a conservative character set.
static IFACE_NAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-zA-Z0-9_=+.-]{1,15}$").expect("Invalid regex pattern"));

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Action {
    /// Create the interface and bring it up.
    Up,
    /// Delete the interface.
    Down,
    /// Converge an existing or new interface to the configuration.
    Sync,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Up => "up",
            Action::Down => "down",
            Action::Sync => "sync",
        }
    }
}

/// Set up, tear down or sync a WireGuard interface from a wg-quick config.
#[derive(Debug, Parser)]
#[command(name = "wg-quick", version, about)]
pub struct Cli {
    /// Interface name, overriding the one derived from the argument.
    #[arg(long)]
    pub iface: Option<String>,

    /// Enable debug logging.
    #[arg(short, long)]
    pub verbose: bool,

    /// Route protocol tag to stamp on and own routes (0 keeps the config value).
    #[arg(long, default_value_t = 0)]
    pub route_protocol: u8,

    /// Metric for peer routes (0 keeps the config value).
    #[arg(long, default_value_t = 0)]
    pub route_metric: u32,

    #[arg(value_enum)]
    pub action: Action,

    /// Path to a config file, or an interface name under the config directory.
    pub target: String,
}

impl Cli {
    /// Applies the command line overrides to a loaded configuration.
    pub fn apply_overrides(&self, cfg: &mut Config) {
        if self.route_protocol != 0 {
            cfg.route_protocol = self.route_protocol;
        }
        if self.route_metric != 0 {
            cfg.route_metric = self.route_metric;
        }
    }
}

/// Interface name and configuration file an invocation refers to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub iface: String,
    pub config_path: PathBuf,
}

/// Resolves the positional argument into an interface and config file.
///
/// An argument naming an existing file is the config file itself and the
/// interface is `iface` or the file stem. Anything else is an interface name
/// whose config is `<config_dir>/<name>.conf`.
pub fn resolve_config_path(target: &str, iface: Option<&str>, config_dir: &Path) -> Result<Target> {
    let as_path = Path::new(target);

    let (name, config_path) = if as_path.is_file() {
        let stem = as_path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or_default();
        (iface.unwrap_or(stem).to_string(), as_path.to_path_buf())
    } else {
        let config_path = config_dir.join(format!("{}.conf", target));
        if !config_path.is_file() {
            return Err(WgQuickError::not_found(format!(
                "config file {}",
                config_path.display()
            )));
        }
        (iface.unwrap_or(target).to_string(), config_path)
    };

    if !IFACE_NAME_RE.is_match(&name) {
        return Err(WgQuickError::parse(format!(
            "invalid interface name '{}'",
            name
        )));
    }

    Ok(Target {
        iface: name,
        config_path,
    })
}
