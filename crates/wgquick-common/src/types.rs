//! Kernel data model: links, addresses and routes.

use std::fmt;

use ipnet::IpNet;

/// Default values and rtnetlink identifiers.
pub mod defaults {
    /// `RT_TABLE_MAIN`
    pub const RT_TABLE_MAIN: u32 = 254;

    /// `RTPROT_BOOT`, the ownership tag stamped on managed routes by default.
    pub const RTPROT_BOOT: u8 = 3;

    /// `RTN_UNICAST`
    pub const RTN_UNICAST: u8 = 1;

    /// Link kind passed to the kernel when creating the tunnel interface.
    pub const WIREGUARD_LINK_KIND: &str = "wireguard";

    /// Directory holding `<iface>.conf` files.
    pub const CONFIG_DIR: &str = "/etc/wireguard";

    /// Interface-name marker substituted in hook commands.
    pub const IFACE_MARKER: &str = "%i";
}

/// Address family selector for list operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Family {
    V4,
    V6,
}

impl Family {
    /// Returns the `ip(8)` family flag.
    pub fn ip_flag(&self) -> &'static str {
        match self {
            Family::V4 => "-4",
            Family::V6 => "-6",
        }
    }

    /// Returns the family of a network.
    pub fn of(net: &IpNet) -> Self {
        match net {
            IpNet::V4(_) => Family::V4,
            IpNet::V6(_) => Family::V6,
        }
    }
}

/// Kernel handle for a network interface.
///
/// Obtained once by the link reconciler and handed to the later steps.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Link {
    /// Interface index.
    pub index: u32,
    /// Interface name.
    pub name: String,
    /// Current MTU, when reported.
    pub mtu: Option<u32>,
    /// Administrative `UP` flag.
    pub up: bool,
}

/// An IP network bound to a link.
///
/// The network keeps its host bits (`10.0.0.1/24`), which is what makes two
/// addresses in the same subnet distinct.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Address {
    pub net: IpNet,
    pub label: Option<String>,
}

impl Address {
    pub fn new(net: IpNet) -> Self {
        Self { net, label: None }
    }

    pub fn with_label(mut self, label: Option<String>) -> Self {
        self.label = label;
        self
    }

    /// Normalized network string used as the diff key.
    pub fn key(&self) -> String {
        self.net.to_string()
    }

    pub fn family(&self) -> Family {
        Family::of(&self.net)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.label {
            Some(label) => write!(f, "{} label {}", self.net, label),
            None => write!(f, "{}", self.net),
        }
    }
}

/// A route scoped to one link.
///
/// Equality is structural over every attribute; the route reconciler relies
/// on that to decide whether an owned kernel route is still wanted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    pub dst: IpNet,
    pub link_index: u32,
    pub table: u32,
    pub protocol: u8,
    pub metric: u32,
    pub kind: u8,
}

impl Route {
    /// Creates a route with every optional attribute left at zero.
    pub fn new(dst: IpNet, link_index: u32) -> Self {
        Self {
            dst,
            link_index,
            table: 0,
            protocol: 0,
            metric: 0,
            kind: 0,
        }
    }

    pub fn with_table(mut self, table: u32) -> Self {
        self.table = table;
        self
    }

    pub fn with_protocol(mut self, protocol: u8) -> Self {
        self.protocol = protocol;
        self
    }

    pub fn with_metric(mut self, metric: u32) -> Self {
        self.metric = metric;
        self
    }

    pub fn with_kind(mut self, kind: u8) -> Self {
        self.kind = kind;
        self
    }

    /// Replaces zero table, protocol and type with main, boot and unicast.
    pub fn fill_defaults(mut self) -> Self {
        if self.table == 0 {
            self.table = defaults::RT_TABLE_MAIN;
        }
        if self.protocol == 0 {
            self.protocol = defaults::RTPROT_BOOT;
        }
        if self.kind == 0 {
            self.kind = defaults::RTN_UNICAST;
        }
        self
    }

    /// Destination network string, the grouping key for desired routes.
    pub fn key(&self) -> String {
        self.dst.to_string()
    }

    pub fn family(&self) -> Family {
        Family::of(&self.dst)
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} dev #{} table {} proto {} metric {} type {}",
            self.dst, self.link_index, self.table, self.protocol, self.metric, self.kind
        )
    }
}

/// Maps an `ip(8)` routing table name to its id.
pub fn table_id(name: &str) -> Option<u32> {
    match name {
        "unspec" => Some(0),
        "default" => Some(253),
        "main" => Some(defaults::RT_TABLE_MAIN),
        "local" => Some(255),
        other => other.parse().ok(),
    }
}

/// Maps an `ip(8)` route protocol name to its id (`/etc/iproute2/rt_protos`).
pub fn protocol_id(name: &str) -> Option<u8> {
    match name {
        "unspec" => Some(0),
        "redirect" => Some(1),
        "kernel" => Some(2),
        "boot" => Some(defaults::RTPROT_BOOT),
        "static" => Some(4),
        "gated" => Some(8),
        "ra" => Some(9),
        "mrt" => Some(10),
        "zebra" => Some(11),
        "bird" => Some(12),
        "dnrouted" => Some(13),
        "xorp" => Some(14),
        "ntk" => Some(15),
        "dhcp" => Some(16),
        "keepalived" => Some(18),
        "babel" => Some(42),
        "bgp" => Some(186),
        "isis" => Some(187),
        "ospf" => Some(188),
        "rip" => Some(189),
        "eigrp" => Some(192),
        other => other.parse().ok(),
    }
}

/// Maps an `ip(8)` route type name to its id.
pub fn route_type_id(name: &str) -> Option<u8> {
    match name {
        "unspec" => Some(0),
        "unicast" => Some(defaults::RTN_UNICAST),
        "local" => Some(2),
        "broadcast" => Some(3),
        "anycast" => Some(4),
        "multicast" => Some(5),
        "blackhole" => Some(6),
        "unreachable" => Some(7),
        "prohibit" => Some(8),
        "throw" => Some(9),
        "nat" => Some(10),
        "xresolve" => Some(11),
        other => other.parse().ok(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn net(s: &str) -> IpNet {
        s.parse().unwrap()
    }

    #[test]
    fn test_fill_defaults() {
        let rt = Route::new(net("10.0.0.0/24"), 7).fill_defaults();
        assert_eq!(rt.table, defaults::RT_TABLE_MAIN);
        assert_eq!(rt.protocol, defaults::RTPROT_BOOT);
        assert_eq!(rt.kind, defaults::RTN_UNICAST);
        assert_eq!(rt.metric, 0);
    }

    #[test]
    fn test_fill_defaults_keeps_explicit_values() {
        let rt = Route::new(net("10.0.0.0/24"), 7)
            .with_table(100)
            .with_protocol(42)
            .with_metric(5)
            .fill_defaults();
        assert_eq!(rt.table, 100);
        assert_eq!(rt.protocol, 42);
        assert_eq!(rt.metric, 5);
    }

    #[test]
    fn test_route_structural_equality() {
        let a = Route::new(net("10.0.0.0/24"), 7).fill_defaults();
        let b = a.clone().with_metric(10);
        assert_ne!(a, b);
        assert_eq!(a, a.clone());
    }

    #[test]
    fn test_address_key_keeps_host_bits() {
        let addr = Address::new(net("10.0.0.1/24"));
        assert_eq!(addr.key(), "10.0.0.1/24");
        assert_eq!(addr.family(), Family::V4);
    }

    #[test]
    fn test_name_maps() {
        assert_eq!(table_id("main"), Some(254));
        assert_eq!(table_id("100"), Some(100));
        assert_eq!(table_id("bogus"), None);
        assert_eq!(protocol_id("boot"), Some(3));
        assert_eq!(protocol_id("kernel"), Some(2));
        assert_eq!(protocol_id("77"), Some(77));
        assert_eq!(route_type_id("unicast"), Some(1));
        assert_eq!(route_type_id("local"), Some(2));
    }
}
