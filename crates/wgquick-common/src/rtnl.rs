//! Kernel link, address and route operations.
//!
//! The reconcilers only see the [`Rtnl`] trait. [`IpRtnl`] implements it on
//! top of `ip(8)`: mutations are plain `ip` invocations, queries use the JSON
//! output (`ip -j -d`) decoded with `serde_json`.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use async_trait::async_trait;
use ipnet::IpNet;
use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::error::{CommonError, CommonResult};
use crate::shell::{self, shellquote, IP_CMD};
use crate::types::{
    defaults, protocol_id, route_type_id, table_id, Address, Family, Link, Route,
};

/// Kernel control-plane operations consumed by the reconcilers.
///
/// Implementations must report an address that is already bound as
/// [`CommonError::AlreadyExists`] from [`Rtnl::addr_add`].
#[async_trait]
pub trait Rtnl: Send + Sync {
    /// Looks up a link by name. `Ok(None)` means the link does not exist.
    async fn link_get(&self, name: &str) -> CommonResult<Option<Link>>;

    /// Creates a link of kind `wireguard`.
    async fn link_add_wireguard(&self, name: &str, mtu: Option<u32>) -> CommonResult<()>;

    /// Sets the link administratively up.
    async fn link_set_up(&self, link: &Link) -> CommonResult<()>;

    /// Deletes the link.
    async fn link_del(&self, link: &Link) -> CommonResult<()>;

    /// Lists the addresses of `family` bound to the link.
    async fn addr_list(&self, link: &Link, family: Family) -> CommonResult<Vec<Address>>;

    /// Binds an address to the link.
    async fn addr_add(&self, link: &Link, addr: &Address) -> CommonResult<()>;

    /// Removes an address from the link.
    async fn addr_del(&self, link: &Link, addr: &Address) -> CommonResult<()>;

    /// Lists the routes of `family` through the link, across all tables.
    async fn route_list(&self, link: &Link, family: Family) -> CommonResult<Vec<Route>>;

    /// Replaces the route if one with the same key exists, adds it otherwise.
    async fn route_replace(&self, link: &Link, route: &Route) -> CommonResult<()>;

    /// Deletes the route.
    async fn route_del(&self, link: &Link, route: &Route) -> CommonResult<()>;
}

/// [`Rtnl`] implementation driving `ip(8)`.
#[derive(Debug, Clone, Default)]
pub struct IpRtnl;

impl IpRtnl {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Rtnl for IpRtnl {
    async fn link_get(&self, name: &str) -> CommonResult<Option<Link>> {
        let cmd = commands::link_show(name);
        let result = shell::exec(&cmd).await?;
        if !result.success() && result.combined_output().contains("does not exist") {
            return Ok(None);
        }
        let stdout = result.into_checked(&cmd)?.stdout;
        Ok(parse_links(&cmd, &stdout)?.into_iter().next())
    }

    async fn link_add_wireguard(&self, name: &str, mtu: Option<u32>) -> CommonResult<()> {
        shell::exec_or_throw(&commands::link_add(name, mtu)).await?;
        Ok(())
    }

    async fn link_set_up(&self, link: &Link) -> CommonResult<()> {
        shell::exec_or_throw(&commands::link_set_up(&link.name)).await?;
        Ok(())
    }

    async fn link_del(&self, link: &Link) -> CommonResult<()> {
        shell::exec_or_throw(&commands::link_del(&link.name)).await?;
        Ok(())
    }

    async fn addr_list(&self, link: &Link, family: Family) -> CommonResult<Vec<Address>> {
        let cmd = commands::addr_show(&link.name, family);
        let stdout = shell::exec_or_throw(&cmd).await?;
        parse_addresses(&cmd, &stdout, family)
    }

    async fn addr_add(&self, link: &Link, addr: &Address) -> CommonResult<()> {
        let cmd = commands::addr_add(&link.name, addr);
        let result = shell::exec(&cmd).await?;
        if !result.success() && result.combined_output().contains("File exists") {
            return Err(CommonError::already_exists(format!(
                "address {} on {}",
                addr.net, link.name
            )));
        }
        result.into_checked(&cmd)?;
        Ok(())
    }

    async fn addr_del(&self, link: &Link, addr: &Address) -> CommonResult<()> {
        shell::exec_or_throw(&commands::addr_del(&link.name, addr)).await?;
        Ok(())
    }

    async fn route_list(&self, link: &Link, family: Family) -> CommonResult<Vec<Route>> {
        let cmd = commands::route_show(&link.name, family);
        let stdout = shell::exec_or_throw(&cmd).await?;
        parse_routes(&cmd, &stdout, family, link.index)
    }

    async fn route_replace(&self, link: &Link, route: &Route) -> CommonResult<()> {
        shell::exec_or_throw(&commands::route("replace", &link.name, route)).await?;
        Ok(())
    }

    async fn route_del(&self, link: &Link, route: &Route) -> CommonResult<()> {
        shell::exec_or_throw(&commands::route("del", &link.name, route)).await?;
        Ok(())
    }
}

/// Command line builders for `ip(8)`.
pub mod commands {
    use super::*;

    pub fn link_show(name: &str) -> String {
        format!("{} -j -d link show dev {}", IP_CMD, shellquote(name))
    }

    pub fn link_add(name: &str, mtu: Option<u32>) -> String {
        let mtu = mtu.map(|m| format!(" mtu {}", m)).unwrap_or_default();
        format!(
            "{} link add dev {}{} type {}",
            IP_CMD,
            shellquote(name),
            mtu,
            defaults::WIREGUARD_LINK_KIND
        )
    }

    pub fn link_set_up(name: &str) -> String {
        format!("{} link set dev {} up", IP_CMD, shellquote(name))
    }

    pub fn link_del(name: &str) -> String {
        format!("{} link del dev {}", IP_CMD, shellquote(name))
    }

    pub fn addr_show(name: &str, family: Family) -> String {
        format!(
            "{} -j {} address show dev {}",
            IP_CMD,
            family.ip_flag(),
            shellquote(name)
        )
    }

    pub fn addr_add(name: &str, addr: &Address) -> String {
        let label = addr
            .label
            .as_deref()
            .filter(|l| !l.is_empty())
            .map(|l| format!(" label {}", shellquote(l)))
            .unwrap_or_default();
        format!(
            "{} {} address add {} dev {}{}",
            IP_CMD,
            addr.family().ip_flag(),
            shellquote(&addr.net.to_string()),
            shellquote(name),
            label
        )
    }

    pub fn addr_del(name: &str, addr: &Address) -> String {
        format!(
            "{} {} address del {} dev {}",
            IP_CMD,
            addr.family().ip_flag(),
            shellquote(&addr.net.to_string()),
            shellquote(name)
        )
    }

    pub fn route_show(name: &str, family: Family) -> String {
        format!(
            "{} -j -d {} route show table all dev {}",
            IP_CMD,
            family.ip_flag(),
            shellquote(name)
        )
    }

    /// `ip route <op>` for every attribute of `route`; `op` is `replace` or `del`.
    pub fn route(op: &str, name: &str, route: &Route) -> String {
        format!(
            "{} {} route {} {} {} dev {} table {} proto {} metric {}",
            IP_CMD,
            route.family().ip_flag(),
            op,
            route_type_keyword(route.kind),
            shellquote(&route.dst.to_string()),
            shellquote(name),
            route.table,
            route.protocol,
            route.metric
        )
    }

    fn route_type_keyword(kind: u8) -> String {
        match kind {
            0 | 1 => "unicast".to_string(),
            2 => "local".to_string(),
            3 => "broadcast".to_string(),
            4 => "anycast".to_string(),
            5 => "multicast".to_string(),
            6 => "blackhole".to_string(),
            7 => "unreachable".to_string(),
            8 => "prohibit".to_string(),
            9 => "throw".to_string(),
            10 => "nat".to_string(),
            other => other.to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct LinkJson {
    ifindex: u32,
    ifname: String,
    #[serde(default)]
    mtu: Option<u32>,
    #[serde(default)]
    flags: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct AddrJson {
    #[serde(default)]
    addr_info: Vec<AddrInfoJson>,
}

#[derive(Debug, Deserialize)]
struct AddrInfoJson {
    family: String,
    local: IpAddr,
    prefixlen: u8,
    #[serde(default)]
    label: Option<String>,
}

/// `ip -j` prints well-known ids by name and the rest as numbers.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum NameOrId {
    Id(u32),
    Name(String),
}

impl NameOrId {
    fn as_name(&self) -> String {
        match self {
            NameOrId::Id(id) => id.to_string(),
            NameOrId::Name(name) => name.clone(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct RouteJson {
    dst: String,
    #[serde(default)]
    table: Option<NameOrId>,
    #[serde(default)]
    protocol: Option<NameOrId>,
    #[serde(default)]
    metric: Option<u32>,
    #[serde(default, rename = "type")]
    kind: Option<NameOrId>,
}

fn decode<T: DeserializeOwned>(cmd: &str, json: &str) -> CommonResult<Vec<T>> {
    if json.trim().is_empty() {
        return Ok(Vec::new());
    }
    serde_json::from_str(json).map_err(|e| CommonError::decode(cmd, e.to_string()))
}

/// Decodes `ip -j link show` output.
pub fn parse_links(cmd: &str, json: &str) -> CommonResult<Vec<Link>> {
    Ok(decode::<LinkJson>(cmd, json)?
        .into_iter()
        .map(|l| Link {
            index: l.ifindex,
            name: l.ifname,
            mtu: l.mtu,
            up: l.flags.iter().any(|f| f == "UP"),
        })
        .collect())
}

/// Decodes `ip -j address show` output, keeping entries of `family`.
pub fn parse_addresses(cmd: &str, json: &str, family: Family) -> CommonResult<Vec<Address>> {
    let wanted = match family {
        Family::V4 => "inet",
        Family::V6 => "inet6",
    };
    let mut out = Vec::new();
    for entry in decode::<AddrJson>(cmd, json)? {
        for info in entry.addr_info.into_iter().filter(|i| i.family == wanted) {
            let net = IpNet::new(info.local, info.prefixlen)
                .map_err(|e| CommonError::decode(cmd, e.to_string()))?;
            out.push(Address::new(net).with_label(info.label));
        }
    }
    Ok(out)
}

/// Decodes `ip -j -d route show` output into routes bound to `link_index`.
///
/// Attributes `ip` leaves out take their kernel defaults: main table, boot
/// protocol, unicast type, metric 0.
pub fn parse_routes(
    cmd: &str,
    json: &str,
    family: Family,
    link_index: u32,
) -> CommonResult<Vec<Route>> {
    let mut out = Vec::new();
    for entry in decode::<RouteJson>(cmd, json)? {
        let dst = parse_dst(&entry.dst, family)
            .ok_or_else(|| CommonError::decode(cmd, format!("bad dst '{}'", entry.dst)))?;

        let table = match &entry.table {
            Some(t) => table_id(&t.as_name())
                .ok_or_else(|| CommonError::decode(cmd, format!("unknown table '{:?}'", t)))?,
            None => defaults::RT_TABLE_MAIN,
        };
        let protocol = match &entry.protocol {
            Some(p) => protocol_id(&p.as_name()).ok_or_else(|| {
                CommonError::decode(cmd, format!("unknown protocol '{:?}'", p))
            })?,
            None => defaults::RTPROT_BOOT,
        };
        let kind = match &entry.kind {
            Some(k) => route_type_id(&k.as_name())
                .ok_or_else(|| CommonError::decode(cmd, format!("unknown type '{:?}'", k)))?,
            None => defaults::RTN_UNICAST,
        };

        out.push(Route {
            dst,
            link_index,
            table,
            protocol,
            metric: entry.metric.unwrap_or(0),
            kind,
        });
    }
    Ok(out)
}

fn parse_dst(dst: &str, family: Family) -> Option<IpNet> {
    if dst == "default" {
        let any: IpAddr = match family {
            Family::V4 => Ipv4Addr::UNSPECIFIED.into(),
            Family::V6 => Ipv6Addr::UNSPECIFIED.into(),
        };
        return IpNet::new(any, 0).ok();
    }
    if dst.contains('/') {
        return dst.parse().ok();
    }
    let host: IpAddr = dst.parse().ok()?;
    let max_len = if host.is_ipv4() { 32 } else { 128 };
    IpNet::new(host, max_len).ok()
}
