use std::fmt;
use std::net::IpAddr;

use ipnet::IpNet;
use wgquick_common::{defaults, DeviceConfig, PeerConfig};

use crate::hooks::HookStage;

/// Declarative description of one tunnel interface.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Config {
    /// Addresses bound to the interface, host bits kept.
    pub address: Vec<IpNet>,
    /// Name servers registered through `resolvconf` on `up`.
    pub dns: Vec<IpAddr>,
    pub mtu: Option<u32>,
    /// Routing table for peer routes; 0 means main.
    pub table: u32,
    /// Ownership tag for peer routes. 0 stamps boot and owns nothing.
    pub route_protocol: u8,
    pub route_metric: u32,
    pub address_label: Option<String>,
    pub pre_up: Option<String>,
    pub post_up: Option<String>,
    pub pre_down: Option<String>,
    pub post_down: Option<String>,
    pub device: DeviceConfig,
}

impl Config {
    pub fn peers(&self) -> &[PeerConfig] {
        &self.device.peers
    }

    /// Routing table peer routes are installed into.
    pub fn effective_table(&self) -> u32 {
        if self.table == 0 {
            defaults::RT_TABLE_MAIN
        } else {
            self.table
        }
    }

    /// Returns the command configured for `stage`, if any.
    pub fn hook(&self, stage: HookStage) -> Option<&str> {
        match stage {
            HookStage::PreUp => self.pre_up.as_deref(),
            HookStage::PostUp => self.post_up.as_deref(),
            HookStage::PreDown => self.pre_down.as_deref(),
            HookStage::PostDown => self.post_down.as_deref(),
        }
    }
}

/// Renders the configuration in the wg-quick file format.
impl fmt::Display for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "[Interface]")?;
        if let Some(key) = &self.device.private_key {
            writeln!(f, "PrivateKey = {}", key)?;
        }
        if let Some(port) = self.device.listen_port {
            writeln!(f, "ListenPort = {}", port)?;
        }
        if let Some(mark) = self.device.fwmark {
            writeln!(f, "FwMark = {}", mark)?;
        }
        if !self.address.is_empty() {
            writeln!(f, "Address = {}", join(&self.address))?;
        }
        if !self.dns.is_empty() {
            writeln!(f, "DNS = {}", join(&self.dns))?;
        }
        if let Some(mtu) = self.mtu {
            writeln!(f, "MTU = {}", mtu)?;
        }
        if self.table != 0 {
            writeln!(f, "Table = {}", self.table)?;
        }
        if self.route_protocol != 0 {
            writeln!(f, "RouteProtocol = {}", self.route_protocol)?;
        }
        if self.route_metric != 0 {
            writeln!(f, "RouteMetric = {}", self.route_metric)?;
        }
        if let Some(label) = &self.address_label {
            writeln!(f, "AddressLabel = {}", label)?;
        }
        for stage in HookStage::ALL {
            if let Some(cmd) = self.hook(stage) {
                for line in cmd.lines() {
                    writeln!(f, "{} = {}", stage.key(), line)?;
                }
            }
        }
        for peer in self.peers() {
            write!(f, "\n{}", peer)?;
        }
        Ok(())
    }
}

fn join<T: ToString>(items: &[T]) -> String {
    items
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}
