//! Route reconciler.
//!
//! Every allowed-IP of every peer becomes a route through the tunnel, stamped
//! with the configured table, protocol tag and metric. Only IPv4 routes on the
//! link are scanned for removal, and only those carrying our table and the
//! configured protocol tag are deleted. With no tag configured nothing is
//! deleted, so routes installed by the kernel or other daemons survive.

use std::collections::BTreeMap;

use tracing::{debug, error, info, instrument};
use wgquick_common::{Family, Link, Route, Rtnl};

use crate::config::Config;
use crate::error::{Result, WgQuickError};

/// Desired routes grouped by destination string.
pub type DesiredRoutes = BTreeMap<String, Vec<Route>>;

/// Routes touched by one [`sync_routes`] run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RouteChanges {
    pub replaced: Vec<Route>,
    pub removed: Vec<Route>,
}

/// Computes the routes the configuration asks for on `link`.
///
/// Duplicated allowed-IPs across peers are kept; the kernel collapses them on
/// replace.
pub fn desired_routes(cfg: &Config, link: &Link) -> DesiredRoutes {
    let mut desired = DesiredRoutes::new();
    for peer in cfg.peers() {
        for dst in &peer.allowed_ips {
            let route = Route::new(*dst, link.index)
                .with_table(cfg.table)
                .with_protocol(cfg.route_protocol)
                .with_metric(cfg.route_metric)
                .fill_defaults();
            desired.entry(route.key()).or_default().push(route);
        }
    }
    desired
}

/// Upserts every configured peer route, then deletes stale IPv4 routes that
/// carry our table and the configured protocol tag.
#[instrument(skip_all, fields(iface = %link.name))]
pub async fn sync_routes(cfg: &Config, link: &Link, rtnl: &dyn Rtnl) -> Result<RouteChanges> {
    let wanted = desired_routes(cfg, link);

    // Listed before the upserts so freshly replaced routes are not rescanned.
    let present = rtnl
        .route_list(link, Family::V4)
        .await
        .map_err(|e| WgQuickError::kernel("list routes", e))?;

    let mut changes = RouteChanges::default();

    for route in wanted.values().flatten() {
        rtnl.route_replace(link, route).await.map_err(|e| {
            error!(route = %route.dst, error = %e, "Cannot add route");
            WgQuickError::kernel(format!("replace route {}", route.dst), e)
        })?;
        info!(
            route = %route.dst,
            table = route.table,
            protocol = route.protocol,
            metric = route.metric,
            "Route added"
        );
        changes.replaced.push(route.clone());
    }

    for route in present {
        if route.table != cfg.effective_table() {
            debug!(route = %route.dst, table = route.table, "Wrong table, skipping");
            continue;
        }
        // An unset tag (0) owns nothing.
        if route.protocol != cfg.route_protocol {
            info!(
                route = %route.dst,
                protocol = route.protocol,
                "Foreign protocol, skipping"
            );
            continue;
        }
        if wanted
            .get(&route.key())
            .is_some_and(|routes| routes.contains(&route))
        {
            debug!(route = %route.dst, "Route wanted, keeping");
            continue;
        }

        rtnl.route_del(link, &route).await.map_err(|e| {
            error!(route = %route.dst, error = %e, "Cannot remove route");
            WgQuickError::kernel(format!("remove route {}", route.dst), e)
        })?;
        info!(route = %route.dst, metric = route.metric, "Route removed");
        changes.removed.push(route);
    }

    Ok(changes)
}
