//! Link reconciler.

use tracing::{debug, info, instrument};
use wgquick_common::{Link, Rtnl};

use crate::config::Config;
use crate::error::{Result, WgQuickError};

/// Ensures a `wireguard` link named `iface` exists and is administratively up.
///
/// The returned handle is reused by the device, address and route steps.
#[instrument(skip_all, fields(iface = %iface))]
pub async fn sync_link(cfg: &Config, iface: &str, rtnl: &dyn Rtnl) -> Result<Link> {
    let existing = rtnl
        .link_get(iface)
        .await
        .map_err(|e| WgQuickError::kernel("read link", e))?;

    let mut link = match existing {
        Some(link) => {
            debug!(index = link.index, "Link exists");
            link
        }
        None => {
            info!(mtu = ?cfg.mtu, "Link not found, creating");
            rtnl.link_add_wireguard(iface, cfg.mtu)
                .await
                .map_err(|e| WgQuickError::kernel("create link", e))?;
            rtnl.link_get(iface)
                .await
                .map_err(|e| WgQuickError::kernel("read link", e))?
                .ok_or_else(|| WgQuickError::not_found(format!("link {} after creation", iface)))?
        }
    };

    rtnl.link_set_up(&link)
        .await
        .map_err(|e| WgQuickError::kernel("set link up", e))?;
    link.up = true;
    info!("Set device up");

    Ok(link)
}

#[cfg(test)]
mod tests {
    use super::*;
    use wgquick_test::{FakeKernel, Injected, JournalVerifier, KernelOp, OpKind};

    #[tokio::test]
    async fn test_creates_missing_link() {
        let kernel = FakeKernel::new();
        let cfg = Config {
            mtu: Some(1380),
            ..Config::default()
        };

        let link = sync_link(&cfg, "wg0", &kernel).await.unwrap();

        assert!(link.up);
        assert_eq!(link.name, "wg0");
        assert!(kernel.link("wg0").unwrap().up);
        assert!(kernel.journal().contains(&KernelOp::LinkAdd {
            name: "wg0".to_string(),
            mtu: Some(1380),
        }));
    }

    #[tokio::test]
    async fn test_existing_link_is_only_set_up() {
        let kernel = FakeKernel::new().with_link("wg0", false);

        let link = sync_link(&Config::default(), "wg0", &kernel).await.unwrap();

        let verifier = JournalVerifier::new(kernel.journal());
        verifier.assert_not_called(OpKind::LinkAdd).unwrap();
        verifier.assert_called(OpKind::LinkSetUp).unwrap();
        assert_eq!(link.index, kernel.link("wg0").unwrap().index);
    }

    #[tokio::test]
    async fn test_create_failure_is_reported() {
        let kernel = FakeKernel::new();
        kernel.inject(OpKind::LinkAdd, Injected::Fail);

        let err = sync_link(&Config::default(), "wg0", &kernel)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            WgQuickError::KernelOperationFailed { ref operation, .. } if operation == "create link"
        ));
        JournalVerifier::new(kernel.journal())
            .assert_not_called(OpKind::LinkSetUp)
            .unwrap();
    }
}
