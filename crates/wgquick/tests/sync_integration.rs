//! Sync convergence tests against the in-memory kernel.

use pretty_assertions::assert_eq;
use wgquick::{Config, WgQuick};
use wgquick_common::{defaults, DeviceConfig, Family};
use wgquick_test::{fixtures, FakeKernel, FakeWgControl, JournalVerifier, KernelOp, OpKind};

fn config() -> Config {
    Config {
        address: vec![fixtures::net("10.0.0.1/24")],
        device: fixtures::device(vec![
            fixtures::peer(1, &["10.1.0.0/16"]),
            fixtures::peer(2, &["10.2.0.0/16", "fd00:2::/64"]),
        ]),
        ..Config::default()
    }
}

#[tokio::test]
async fn test_second_sync_changes_nothing() {
    let mgr = WgQuick::new(FakeKernel::new(), FakeWgControl::new());
    let cfg = config();

    mgr.sync(&cfg, "wg0").await.unwrap();
    mgr.rtnl().clear_journal();

    let report = mgr.sync(&cfg, "wg0").await.unwrap();

    assert!(report.addresses.is_empty());
    assert!(report.routes.removed.is_empty());
    JournalVerifier::new(mgr.rtnl().journal())
        .assert_state_changes(0)
        .unwrap();
    // The device is pushed in full on every run.
    assert_eq!(mgr.wg().pushes().len(), 2);
}

#[tokio::test]
async fn test_address_set_converges() {
    let kernel = FakeKernel::new()
        .with_link("wg0", true)
        .with_address("wg0", fixtures::addr("10.0.0.1/24"))
        .with_address("wg0", fixtures::addr("10.0.0.2/24"));
    let mgr = WgQuick::new(kernel, FakeWgControl::new());
    let cfg = Config {
        address: vec![fixtures::net("10.0.0.2/24"), fixtures::net("10.0.0.3/24")],
        ..config()
    };

    mgr.sync(&cfg, "wg0").await.unwrap();

    assert_eq!(
        mgr.rtnl().address_keys("wg0"),
        vec!["10.0.0.2/24", "10.0.0.3/24"]
    );
    let journal = mgr.rtnl().journal();
    assert!(!journal.contains(&KernelOp::AddrAdd("10.0.0.2/24".to_string())));
    assert!(journal.contains(&KernelOp::AddrDel("10.0.0.1/24".to_string())));
}

#[tokio::test]
async fn test_foreign_route_on_conflicting_destination_survives() {
    let kernel = FakeKernel::new()
        .with_link("wg0", true)
        .with_route("wg0", fixtures::foreign_route("10.1.0.0/16", 42).with_metric(100))
        .with_route("wg0", fixtures::kernel_route("10.0.0.0/24"));
    let mgr = WgQuick::new(kernel, FakeWgControl::new());

    mgr.sync(&config(), "wg0").await.unwrap();

    let routes = mgr.rtnl().routes("wg0");
    assert!(routes.iter().any(|r| r.protocol == 42 && r.metric == 100));
    assert!(routes.iter().any(|r| r.protocol == 2));
    JournalVerifier::new(mgr.rtnl().journal())
        .assert_not_called(OpKind::RouteDel)
        .unwrap();
}

#[tokio::test]
async fn test_peer_routes_get_default_attributes() {
    let mgr = WgQuick::new(FakeKernel::new(), FakeWgControl::new());
    let cfg = Config {
        device: DeviceConfig {
            peers: vec![fixtures::peer(1, &["10.0.0.0/24"])],
            ..DeviceConfig::default()
        },
        ..Config::default()
    };

    let report = mgr.sync(&cfg, "wg0").await.unwrap();

    let routes = mgr.rtnl().routes("wg0");
    assert_eq!(routes.len(), 1);
    let rt = &routes[0];
    assert_eq!(rt.dst, fixtures::net("10.0.0.0/24"));
    assert_eq!(rt.table, defaults::RT_TABLE_MAIN);
    assert_eq!(rt.protocol, defaults::RTPROT_BOOT);
    assert_eq!(rt.kind, defaults::RTN_UNICAST);
    assert_eq!(rt.link_index, report.link.index);
}

#[tokio::test]
async fn test_removed_peer_routes_are_dropped() {
    let mgr = WgQuick::new(FakeKernel::new(), FakeWgControl::new());
    let mut cfg = Config {
        route_protocol: defaults::RTPROT_BOOT,
        ..config()
    };
    mgr.sync(&cfg, "wg0").await.unwrap();

    cfg.device.peers.truncate(1);
    let report = mgr.sync(&cfg, "wg0").await.unwrap();

    assert_eq!(report.routes.removed.len(), 1);
    assert_eq!(report.routes.removed[0].dst, fixtures::net("10.2.0.0/16"));
    let dsts: Vec<String> = mgr.rtnl().routes("wg0").iter().map(|r| r.key()).collect();
    // IPv6 routes are never scanned for removal.
    assert_eq!(dsts, vec!["10.1.0.0/16", "fd00:2::/64"]);
    assert_eq!(mgr.wg().pushes().last().unwrap().1.peers.len(), 1);
}

#[tokio::test]
async fn test_route_metric_change_has_no_gap() {
    let mgr = WgQuick::new(FakeKernel::new(), FakeWgControl::new());
    let mut cfg = Config {
        route_protocol: defaults::RTPROT_BOOT,
        ..config()
    };
    mgr.sync(&cfg, "wg0").await.unwrap();
    mgr.rtnl().clear_journal();

    cfg.route_metric = 50;
    mgr.sync(&cfg, "wg0").await.unwrap();

    let journal = mgr.rtnl().journal();
    let first_replace = journal
        .iter()
        .position(|op| op.kind() == OpKind::RouteReplace)
        .unwrap();
    let first_del = journal
        .iter()
        .position(|op| op.kind() == OpKind::RouteDel)
        .unwrap();
    assert!(first_replace < first_del);
    assert!(mgr
        .rtnl()
        .routes("wg0")
        .iter()
        .filter(|r| r.family() == Family::V4)
        .all(|r| r.metric == 50));
}

#[tokio::test]
async fn test_unset_route_protocol_leaves_stale_routes() {
    let mgr = WgQuick::new(FakeKernel::new(), FakeWgControl::new());
    let mut cfg = config();
    mgr.sync(&cfg, "wg0").await.unwrap();

    cfg.device.peers.truncate(1);
    let report = mgr.sync(&cfg, "wg0").await.unwrap();

    assert!(report.routes.removed.is_empty());
    assert_eq!(mgr.rtnl().routes("wg0").len(), 3);
    JournalVerifier::new(mgr.rtnl().journal())
        .assert_not_called(OpKind::RouteDel)
        .unwrap();
}

#[tokio::test]
async fn test_ipv6_addresses_and_routes_are_installed() {
    let mgr = WgQuick::new(FakeKernel::new(), FakeWgControl::new());
    let cfg = Config {
        address: vec![fixtures::net("10.0.0.1/24"), fixtures::net("fd00::1/64")],
        ..config()
    };

    let report = mgr.sync(&cfg, "wg0").await.unwrap();

    assert_eq!(report.addresses.added, vec!["10.0.0.1/24", "fd00::1/64"]);
    assert_eq!(
        mgr.rtnl().address_keys("wg0"),
        vec!["10.0.0.1/24", "fd00::1/64"]
    );
    assert!(mgr
        .rtnl()
        .routes("wg0")
        .iter()
        .any(|r| r.key() == "fd00:2::/64" && r.protocol == defaults::RTPROT_BOOT));

    // A repeat run re-adds the IPv6 address and tolerates "already exists".
    let again = mgr.sync(&cfg, "wg0").await.unwrap();
    assert!(again.addresses.is_empty());
}
