//! In-memory kernel and device control-plane fakes.
//!
//! [`FakeKernel`] keeps links, addresses and routes the way the kernel
//! would, and journals every call so tests can assert on the exact
//! mutations a reconciliation issued.

use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

use async_trait::async_trait;
use wgquick_common::{
    Address, CommonError, CommonResult, DeviceConfig, Family, Link, Route, Rtnl, WgControl,
};

/// Kind of a kernel call, used to target failure injection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpKind {
    LinkGet,
    LinkAdd,
    LinkSetUp,
    LinkDel,
    AddrList,
    AddrAdd,
    AddrDel,
    RouteList,
    RouteReplace,
    RouteDel,
}

/// One journaled kernel call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KernelOp {
    LinkGet(String),
    LinkAdd { name: String, mtu: Option<u32> },
    /// `changed` is false when the link was already up.
    LinkSetUp { name: String, changed: bool },
    LinkDel(String),
    AddrList(String),
    AddrAdd(String),
    AddrDel(String),
    RouteList(String),
    /// `changed` is false when an identical route was already installed.
    RouteReplace { route: Route, changed: bool },
    RouteDel(Route),
}

impl KernelOp {
    pub fn kind(&self) -> OpKind {
        match self {
            KernelOp::LinkGet(_) => OpKind::LinkGet,
            KernelOp::LinkAdd { .. } => OpKind::LinkAdd,
            KernelOp::LinkSetUp { .. } => OpKind::LinkSetUp,
            KernelOp::LinkDel(_) => OpKind::LinkDel,
            KernelOp::AddrList(_) => OpKind::AddrList,
            KernelOp::AddrAdd(_) => OpKind::AddrAdd,
            KernelOp::AddrDel(_) => OpKind::AddrDel,
            KernelOp::RouteList(_) => OpKind::RouteList,
            KernelOp::RouteReplace { .. } => OpKind::RouteReplace,
            KernelOp::RouteDel(_) => OpKind::RouteDel,
        }
    }

    /// Returns true if the call changed kernel state.
    pub fn is_state_change(&self) -> bool {
        match self {
            KernelOp::LinkGet(_) | KernelOp::AddrList(_) | KernelOp::RouteList(_) => false,
            KernelOp::LinkSetUp { changed, .. } | KernelOp::RouteReplace { changed, .. } => {
                *changed
            }
            KernelOp::LinkAdd { .. }
            | KernelOp::LinkDel(_)
            | KernelOp::AddrAdd(_)
            | KernelOp::AddrDel(_)
            | KernelOp::RouteDel(_) => true,
        }
    }
}

/// Outcome forced onto the next call of a given [`OpKind`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Injected {
    /// Fail with a shell command failure.
    Fail,
    /// Fail with [`CommonError::AlreadyExists`] without touching state.
    AlreadyExists,
}

#[derive(Debug, Default)]
struct KernelState {
    links: BTreeMap<String, Link>,
    addrs: HashMap<u32, Vec<Address>>,
    routes: Vec<Route>,
    next_index: u32,
    journal: Vec<KernelOp>,
    injected: HashMap<OpKind, Injected>,
}

impl KernelState {
    fn take_injected(&mut self, kind: OpKind, what: &str) -> CommonResult<()> {
        let injected = self.injected.remove(&kind);
        if let Some(outcome) = injected {
            tracing::debug!(?kind, ?outcome, what, "Injecting fake kernel result");
        }
        match injected {
            None => Ok(()),
            Some(Injected::AlreadyExists) => Err(CommonError::already_exists(what)),
            Some(Injected::Fail) => Err(CommonError::ShellCommandFailed {
                command: format!("{:?} {}", kind, what),
                exit_code: 2,
                output: "RTNETLINK answers: Operation not permitted".to_string(),
            }),
        }
    }
}

/// Stateful in-memory [`Rtnl`].
#[derive(Debug)]
pub struct FakeKernel {
    state: Mutex<KernelState>,
}

impl Default for FakeKernel {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeKernel {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(KernelState {
                // 1 is taken by lo on a real host.
                next_index: 2,
                ..KernelState::default()
            }),
        }
    }

    fn state(&self) -> std::sync::MutexGuard<'_, KernelState> {
        self.state.lock().expect("fake kernel state poisoned")
    }

    /// Seeds an existing link.
    pub fn with_link(self, name: &str, up: bool) -> Self {
        {
            let mut st = self.state();
            let index = st.next_index;
            st.next_index += 1;
            st.links.insert(
                name.to_string(),
                Link {
                    index,
                    name: name.to_string(),
                    mtu: Some(1420),
                    up,
                },
            );
        }
        self
    }

    /// Seeds an address on an existing link.
    pub fn with_address(self, link: &str, addr: Address) -> Self {
        {
            let mut st = self.state();
            let index = st.links[link].index;
            st.addrs.entry(index).or_default().push(addr);
        }
        self
    }

    /// Seeds a route; `link_index` is overwritten with `link`'s index.
    pub fn with_route(self, link: &str, mut route: Route) -> Self {
        {
            let mut st = self.state();
            route.link_index = st.links[link].index;
            st.routes.push(route);
        }
        self
    }

    /// Forces the next call of `kind` to return `outcome`.
    pub fn inject(&self, kind: OpKind, outcome: Injected) {
        self.state().injected.insert(kind, outcome);
    }

    pub fn link(&self, name: &str) -> Option<Link> {
        self.state().links.get(name).cloned()
    }

    /// Address keys bound to `name`, sorted.
    pub fn address_keys(&self, name: &str) -> Vec<String> {
        let st = self.state();
        let Some(link) = st.links.get(name) else {
            return Vec::new();
        };
        let mut keys: Vec<String> = st
            .addrs
            .get(&link.index)
            .map(|a| a.iter().map(Address::key).collect())
            .unwrap_or_default();
        keys.sort();
        keys
    }

    /// Routes through `name`, in installation order.
    pub fn routes(&self, name: &str) -> Vec<Route> {
        let st = self.state();
        let Some(link) = st.links.get(name) else {
            return Vec::new();
        };
        st.routes
            .iter()
            .filter(|r| r.link_index == link.index)
            .cloned()
            .collect()
    }

    /// Every call made so far.
    pub fn journal(&self) -> Vec<KernelOp> {
        self.state().journal.clone()
    }

    /// Calls that changed kernel state.
    pub fn state_changes(&self) -> Vec<KernelOp> {
        self.journal()
            .into_iter()
            .filter(KernelOp::is_state_change)
            .collect()
    }

    pub fn clear_journal(&self) {
        self.state().journal.clear();
    }
}

#[async_trait]
impl Rtnl for FakeKernel {
    async fn link_get(&self, name: &str) -> CommonResult<Option<Link>> {
        let mut st = self.state();
        st.journal.push(KernelOp::LinkGet(name.to_string()));
        st.take_injected(OpKind::LinkGet, name)?;
        Ok(st.links.get(name).cloned())
    }

    async fn link_add_wireguard(&self, name: &str, mtu: Option<u32>) -> CommonResult<()> {
        let mut st = self.state();
        st.journal.push(KernelOp::LinkAdd {
            name: name.to_string(),
            mtu,
        });
        st.take_injected(OpKind::LinkAdd, name)?;
        if st.links.contains_key(name) {
            return Err(CommonError::already_exists(format!("link {}", name)));
        }
        let index = st.next_index;
        st.next_index += 1;
        st.links.insert(
            name.to_string(),
            Link {
                index,
                name: name.to_string(),
                mtu: Some(mtu.unwrap_or(1420)),
                up: false,
            },
        );
        Ok(())
    }

    async fn link_set_up(&self, link: &Link) -> CommonResult<()> {
        let mut st = self.state();
        st.take_injected(OpKind::LinkSetUp, &link.name)?;
        let entry = st
            .links
            .get_mut(&link.name)
            .ok_or_else(|| CommonError::not_found(format!("link {}", link.name)))?;
        let changed = !entry.up;
        entry.up = true;
        st.journal.push(KernelOp::LinkSetUp {
            name: link.name.clone(),
            changed,
        });
        Ok(())
    }

    async fn link_del(&self, link: &Link) -> CommonResult<()> {
        let mut st = self.state();
        st.journal.push(KernelOp::LinkDel(link.name.clone()));
        st.take_injected(OpKind::LinkDel, &link.name)?;
        let removed = st
            .links
            .remove(&link.name)
            .ok_or_else(|| CommonError::not_found(format!("link {}", link.name)))?;
        st.addrs.remove(&removed.index);
        st.routes.retain(|r| r.link_index != removed.index);
        Ok(())
    }

    async fn addr_list(&self, link: &Link, family: Family) -> CommonResult<Vec<Address>> {
        let mut st = self.state();
        st.journal.push(KernelOp::AddrList(link.name.clone()));
        st.take_injected(OpKind::AddrList, &link.name)?;
        Ok(st
            .addrs
            .get(&link.index)
            .map(|addrs| {
                addrs
                    .iter()
                    .filter(|a| a.family() == family)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn addr_add(&self, link: &Link, addr: &Address) -> CommonResult<()> {
        let mut st = self.state();
        st.journal.push(KernelOp::AddrAdd(addr.key()));
        st.take_injected(OpKind::AddrAdd, &addr.key())?;
        let addrs = st.addrs.entry(link.index).or_default();
        if addrs.iter().any(|a| a.key() == addr.key()) {
            return Err(CommonError::already_exists(format!(
                "address {} on {}",
                addr.net, link.name
            )));
        }
        addrs.push(addr.clone());
        Ok(())
    }

    async fn addr_del(&self, link: &Link, addr: &Address) -> CommonResult<()> {
        let mut st = self.state();
        st.journal.push(KernelOp::AddrDel(addr.key()));
        st.take_injected(OpKind::AddrDel, &addr.key())?;
        let addrs = st.addrs.entry(link.index).or_default();
        let before = addrs.len();
        addrs.retain(|a| a.key() != addr.key());
        if addrs.len() == before {
            return Err(CommonError::not_found(format!("address {}", addr.net)));
        }
        Ok(())
    }

    async fn route_list(&self, link: &Link, family: Family) -> CommonResult<Vec<Route>> {
        let mut st = self.state();
        st.journal.push(KernelOp::RouteList(link.name.clone()));
        st.take_injected(OpKind::RouteList, &link.name)?;
        Ok(st
            .routes
            .iter()
            .filter(|r| r.link_index == link.index && r.family() == family)
            .cloned()
            .collect())
    }

    async fn route_replace(&self, _link: &Link, route: &Route) -> CommonResult<()> {
        let mut st = self.state();
        st.take_injected(OpKind::RouteReplace, &route.key())?;
        // The kernel keys routes by (dst, table, metric).
        let slot = st.routes.iter().position(|r| {
            r.dst == route.dst && r.table == route.table && r.metric == route.metric
        });
        let changed = match slot {
            Some(i) if st.routes[i] == *route => false,
            Some(i) => {
                st.routes[i] = route.clone();
                true
            }
            None => {
                st.routes.push(route.clone());
                true
            }
        };
        st.journal.push(KernelOp::RouteReplace {
            route: route.clone(),
            changed,
        });
        Ok(())
    }

    async fn route_del(&self, _link: &Link, route: &Route) -> CommonResult<()> {
        let mut st = self.state();
        st.journal.push(KernelOp::RouteDel(route.clone()));
        st.take_injected(OpKind::RouteDel, &route.key())?;
        let slot = st
            .routes
            .iter()
            .position(|r| r == route)
            .ok_or_else(|| CommonError::not_found(format!("route {}", route)))?;
        st.routes.remove(slot);
        Ok(())
    }
}

/// [`WgControl`] fake recording each pushed configuration.
#[derive(Debug, Default)]
pub struct FakeWgControl {
    pushes: Mutex<Vec<(String, DeviceConfig)>>,
    fail: Mutex<bool>,
}

impl FakeWgControl {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next push fail.
    pub fn fail_next(&self) {
        *self.fail.lock().expect("fake wg state poisoned") = true;
    }

    pub fn pushes(&self) -> Vec<(String, DeviceConfig)> {
        self.pushes.lock().expect("fake wg state poisoned").clone()
    }
}

#[async_trait]
impl WgControl for FakeWgControl {
    async fn configure_device(&self, iface: &str, config: &DeviceConfig) -> CommonResult<()> {
        let mut fail = self.fail.lock().expect("fake wg state poisoned");
        if std::mem::take(&mut *fail) {
            return Err(CommonError::ShellCommandFailed {
                command: format!("wg setconf {} /dev/stdin", iface),
                exit_code: 1,
                output: "Unable to modify interface: Protocol not supported".to_string(),
            });
        }
        self.pushes
            .lock()
            .expect("fake wg state poisoned")
            .push((iface.to_string(), config.clone()));
        Ok(())
    }
}
