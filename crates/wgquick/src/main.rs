//! wg-quick
//!
//! Sets up, tears down or syncs a WireGuard interface from a wg-quick
//! configuration file.

use std::path::Path;
use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;
use wgquick::cli::{resolve_config_path, Action, Cli};
use wgquick::config::load_config;
use wgquick::WgQuick;
use wgquick_common::defaults;

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(&cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(iface = %cli.iface.as_deref().unwrap_or(&cli.target), "{:#}", e);
            ExitCode::FAILURE
        }
    }
}

/// `RUST_LOG` wins over `-v`.
fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();
}

async fn run(cli: &Cli) -> anyhow::Result<()> {
    let target = resolve_config_path(
        &cli.target,
        cli.iface.as_deref(),
        Path::new(defaults::CONFIG_DIR),
    )?;
    debug!(iface = %target.iface, config = %target.config_path.display(), "Resolved target");

    let mut cfg = load_config(&target.config_path)?;
    cli.apply_overrides(&mut cfg);

    let mgr = WgQuick::system();
    let iface = target.iface.as_str();
    match cli.action {
        Action::Up => mgr.up(&cfg, iface).await,
        Action::Down => mgr.down(&cfg, iface).await,
        Action::Sync => mgr.sync(&cfg, iface).await.map(|_| ()),
    }
    .with_context(|| format!("{} {}", cli.action.as_str(), iface))?;

    info!(iface = %iface, action = cli.action.as_str(), "Done");
    Ok(())
}
