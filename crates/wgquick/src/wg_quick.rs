//! Interface lifecycle: up, down and sync.
//!
//! `sync` is the idempotent core. It runs the link, device, address and route
//! reconcilers in that order and stops at the first error. `up` and `down`
//! wrap it (or the link deletion) with DNS registration and the user hooks.
//! Nothing is rolled back; a failed step leaves the interface in whatever
//! state the earlier steps produced.

use tracing::{info, instrument};
use wgquick_common::shell::RESOLVCONF_CMD;
use wgquick_common::{IpRtnl, Link, Rtnl, WgControl, WgTool};

use crate::address::{sync_addresses, AddressChanges};
use crate::config::Config;
use crate::device::sync_device;
use crate::error::{Result, WgQuickError};
use crate::hooks::{self, HookStage};
use crate::link::sync_link;
use crate::route::{sync_routes, RouteChanges};

/// Outcome of one [`WgQuick::sync`] run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncReport {
    pub link: Link,
    pub addresses: AddressChanges,
    pub routes: RouteChanges,
}

/// Drives a tunnel interface through its lifecycle.
pub struct WgQuick<R, W> {
    rtnl: R,
    wg: W,
    resolvconf: String,
}

impl WgQuick<IpRtnl, WgTool> {
    /// Lifecycle manager backed by `ip(8)` and `wg(8)`.
    pub fn system() -> Self {
        Self::new(IpRtnl::new(), WgTool::new())
    }
}

impl<R: Rtnl, W: WgControl> WgQuick<R, W> {
    pub fn new(rtnl: R, wg: W) -> Self {
        Self {
            rtnl,
            wg,
            resolvconf: RESOLVCONF_CMD.to_string(),
        }
    }

    /// Overrides the `resolvconf` command used for DNS registration.
    pub fn with_resolvconf(mut self, cmd: impl Into<String>) -> Self {
        self.resolvconf = cmd.into();
        self
    }

    pub fn rtnl(&self) -> &R {
        &self.rtnl
    }

    pub fn wg(&self) -> &W {
        &self.wg
    }

    async fn find_link(&self, iface: &str) -> Result<Option<Link>> {
        self.rtnl
            .link_get(iface)
            .await
            .map_err(|e| WgQuickError::kernel("read link", e))
    }

    /// Brings up a new interface.
    ///
    /// Fails without touching anything if the interface already exists.
    #[instrument(name = "up", skip_all, fields(iface = %iface))]
    pub async fn up(&self, cfg: &Config, iface: &str) -> Result<()> {
        if self.find_link(iface).await?.is_some() {
            return Err(WgQuickError::AlreadyExists {
                iface: iface.to_string(),
            });
        }

        for server in &cfg.dns {
            hooks::register_dns(&self.resolvconf, *server, iface).await?;
            info!(dns = %server, "Registered name server");
        }

        hooks::run_optional_hook(HookStage::PreUp, cfg.hook(HookStage::PreUp), iface).await?;
        self.sync(cfg, iface).await?;
        hooks::run_optional_hook(HookStage::PostUp, cfg.hook(HookStage::PostUp), iface).await?;

        info!("Interface up");
        Ok(())
    }

    /// Tears down an existing interface.
    ///
    /// Fails without touching anything if the interface does not exist.
    #[instrument(name = "down", skip_all, fields(iface = %iface))]
    pub async fn down(&self, cfg: &Config, iface: &str) -> Result<()> {
        let link = self
            .find_link(iface)
            .await?
            .ok_or_else(|| WgQuickError::not_found(format!("interface {}", iface)))?;

        // Only multi-server records are removed; see DESIGN.md.
        if cfg.dns.len() > 1 {
            hooks::deregister_dns(&self.resolvconf, iface).await?;
            info!("Removed name server record");
        }

        hooks::run_optional_hook(HookStage::PreDown, cfg.hook(HookStage::PreDown), iface).await?;
        self.rtnl
            .link_del(&link)
            .await
            .map_err(|e| WgQuickError::kernel("delete link", e))?;
        info!("Link deleted");
        hooks::run_optional_hook(HookStage::PostDown, cfg.hook(HookStage::PostDown), iface)
            .await?;

        info!("Interface down");
        Ok(())
    }

    /// Converges link, device, addresses and routes to `cfg`.
    ///
    /// Safe to repeat: with unchanged state a second run changes nothing.
    #[instrument(name = "sync", skip_all, fields(iface = %iface))]
    pub async fn sync(&self, cfg: &Config, iface: &str) -> Result<SyncReport> {
        let link = sync_link(cfg, iface, &self.rtnl).await?;
        sync_device(cfg, &link, &self.wg).await?;
        let addresses = sync_addresses(cfg, &link, &self.rtnl).await?;
        let routes = sync_routes(cfg, &link, &self.rtnl).await?;

        info!(
            added_addresses = addresses.added.len(),
            removed_addresses = addresses.removed.len(),
            removed_routes = routes.removed.len(),
            "Interface synced"
        );
        Ok(SyncReport {
            link,
            addresses,
            routes,
        })
    }
}
