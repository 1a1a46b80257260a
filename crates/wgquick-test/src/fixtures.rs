//! Test fixtures for common reconciliation scenarios

use ipnet::IpNet;
use wgquick_common::{defaults, Address, DeviceConfig, Key, PeerConfig, Route};

/// Parses a network literal.
pub fn net(s: &str) -> IpNet {
    s.parse().expect("invalid network literal in fixture")
}

/// Deterministic key whose bytes are all `seed`.
pub fn key(seed: u8) -> Key {
    Key::from_bytes([seed; 32])
}

/// Peer with the given allowed IPs.
pub fn peer(seed: u8, allowed_ips: &[&str]) -> PeerConfig {
    PeerConfig::new(key(seed)).with_allowed_ips(allowed_ips.iter().map(|s| net(s)).collect())
}

/// Device config with a private key, listen port and `peers`.
pub fn device(peers: Vec<PeerConfig>) -> DeviceConfig {
    DeviceConfig {
        private_key: Some(key(0xaa)),
        listen_port: Some(51820),
        peers,
        ..DeviceConfig::default()
    }
}

/// Unlabelled address.
pub fn addr(s: &str) -> Address {
    Address::new(net(s))
}

/// Route as installed by this tool with default table/protocol/type.
pub fn owned_route(dst: &str) -> Route {
    Route::new(net(dst), 0).fill_defaults()
}

/// Route in the main table carrying another daemon's protocol tag.
pub fn foreign_route(dst: &str, protocol: u8) -> Route {
    Route::new(net(dst), 0)
        .with_protocol(protocol)
        .fill_defaults()
}

/// Connected route the kernel installs for an address.
pub fn kernel_route(dst: &str) -> Route {
    Route::new(net(dst), 0)
        .with_table(defaults::RT_TABLE_MAIN)
        .with_protocol(2)
        .fill_defaults()
}
