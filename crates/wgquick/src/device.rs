//! Device reconciler.

use tracing::{info, instrument};
use wgquick_common::{Link, WgControl};

use crate::config::Config;
use crate::error::{Result, WgQuickError};

/// Pushes the full device configuration, replacing every peer.
#[instrument(skip_all, fields(iface = %link.name))]
pub async fn sync_device(cfg: &Config, link: &Link, wg: &dyn WgControl) -> Result<()> {
    let mut device = cfg.device.clone();
    device.replace_peers = true;

    wg.configure_device(&link.name, &device)
        .await
        .map_err(|e| WgQuickError::kernel("configure device", e))?;
    info!(peers = device.peers.len(), "Configured device");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use wgquick_test::{fixtures, FakeWgControl};

    fn link() -> Link {
        Link {
            index: 5,
            name: "wg0".to_string(),
            mtu: None,
            up: true,
        }
    }

    #[tokio::test]
    async fn test_pushes_full_replace() {
        let wg = FakeWgControl::new();
        let cfg = Config {
            device: wgquick_common::DeviceConfig {
                replace_peers: false,
                ..fixtures::device(vec![fixtures::peer(1, &["10.1.0.0/16"])])
            },
            ..Config::default()
        };

        sync_device(&cfg, &link(), &wg).await.unwrap();

        let pushes = wg.pushes();
        assert_eq!(pushes.len(), 1);
        assert_eq!(pushes[0].0, "wg0");
        assert!(pushes[0].1.replace_peers);
        assert_eq!(pushes[0].1.peers, cfg.device.peers);
    }

    #[tokio::test]
    async fn test_failure_maps_to_kernel_error() {
        let wg = FakeWgControl::new();
        wg.fail_next();

        let err = sync_device(&Config::default(), &link(), &wg)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            WgQuickError::KernelOperationFailed { ref operation, .. } if operation == "configure device"
        ));
    }
}
