//! Address reconciler.

use std::collections::{BTreeMap, BTreeSet};

use tracing::{debug, error, info, instrument};
use wgquick_common::{Address, Family, Link, Rtnl};

use crate::config::Config;
use crate::error::{Result, WgQuickError};

/// Addresses touched by one [`sync_addresses`] run, by normalized key.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AddressChanges {
    pub added: Vec<String>,
    pub removed: Vec<String>,
}

impl AddressChanges {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

/// Converges the link's addresses to the configured set.
///
/// Every configured address is wanted. Only IPv4 addresses are read back, so
/// IPv6 ones are added on every run (the kernel answers "already exists") and
/// never removed. IPv4 addresses present on both sides are left alone.
#[instrument(skip_all, fields(iface = %link.name))]
pub async fn sync_addresses(cfg: &Config, link: &Link, rtnl: &dyn Rtnl) -> Result<AddressChanges> {
    let actual = rtnl
        .addr_list(link, Family::V4)
        .await
        .map_err(|e| WgQuickError::kernel("list addresses", e))?;
    let mut present: BTreeMap<String, Address> =
        actual.into_iter().map(|a| (a.key(), a)).collect();

    let mut changes = AddressChanges::default();
    let mut wanted = BTreeSet::new();

    for net in &cfg.address {
        let addr = Address::new(*net).with_label(cfg.address_label.clone());
        let key = addr.key();
        if !wanted.insert(key.clone()) {
            continue;
        }
        if present.remove(&key).is_some() {
            debug!(addr = %key, "Address present");
            continue;
        }

        match rtnl.addr_add(link, &addr).await {
            Ok(()) => {
                info!(addr = %key, "Address added");
                changes.added.push(key);
            }
            Err(e) if e.is_already_exists() => {
                debug!(addr = %key, "Address already exists");
            }
            Err(e) => {
                error!(addr = %key, error = %e, "Cannot add address");
                return Err(WgQuickError::kernel(format!("add address {}", key), e));
            }
        }
    }

    for (key, addr) in present {
        rtnl.addr_del(link, &addr).await.map_err(|e| {
            error!(addr = %key, error = %e, "Cannot remove address");
            WgQuickError::kernel(format!("remove address {}", key), e)
        })?;
        info!(addr = %key, "Address removed");
        changes.removed.push(key);
    }

    Ok(changes)
}
