//! WireGuard device configuration and the control-plane seam that applies it.

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use base64::prelude::*;
use ipnet::IpNet;

use crate::error::{CommonError, CommonResult};
use crate::shell::{self, shellquote, WG_CMD};

/// Length of a Curve25519 key in bytes.
pub const KEY_LEN: usize = 32;

/// A WireGuard key (private, public or preshared).
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Key([u8; KEY_LEN]);

impl Key {
    pub fn from_bytes(bytes: [u8; KEY_LEN]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }

    /// Standard base64 encoding, as used by `wg(8)`.
    pub fn to_base64(&self) -> String {
        BASE64_STANDARD.encode(self.0)
    }
}

impl FromStr for Key {
    type Err = CommonError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = BASE64_STANDARD
            .decode(s.trim())
            .map_err(|e| CommonError::InvalidKey {
                message: e.to_string(),
            })?;
        let bytes: [u8; KEY_LEN] =
            bytes
                .try_into()
                .map_err(|b: Vec<u8>| CommonError::InvalidKey {
                    message: format!("expected {} bytes, got {}", KEY_LEN, b.len()),
                })?;
        Ok(Self(bytes))
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_base64())
    }
}

// Keys never show up in logs.
impl fmt::Debug for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Key(<redacted>)")
    }
}

/// Per-peer device configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerConfig {
    pub public_key: Key,
    pub preshared_key: Option<Key>,
    /// `host:port`; host names are resolved by the `wg` tool.
    pub endpoint: Option<String>,
    pub persistent_keepalive: Option<u16>,
    /// Crypto-key routing set; doubles as the route destinations.
    pub allowed_ips: Vec<IpNet>,
}

impl PeerConfig {
    pub fn new(public_key: Key) -> Self {
        Self {
            public_key,
            preshared_key: None,
            endpoint: None,
            persistent_keepalive: None,
            allowed_ips: Vec::new(),
        }
    }

    pub fn with_allowed_ips(mut self, allowed_ips: Vec<IpNet>) -> Self {
        self.allowed_ips = allowed_ips;
        self
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }
}

/// Renders the `[Peer]` section shared by `wg setconf` and wg-quick files.
impl fmt::Display for PeerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "[Peer]")?;
        writeln!(f, "PublicKey = {}", self.public_key)?;
        if let Some(psk) = &self.preshared_key {
            writeln!(f, "PresharedKey = {}", psk)?;
        }
        if let Some(endpoint) = &self.endpoint {
            writeln!(f, "Endpoint = {}", endpoint)?;
        }
        if let Some(keepalive) = self.persistent_keepalive {
            writeln!(f, "PersistentKeepalive = {}", keepalive)?;
        }
        if !self.allowed_ips.is_empty() {
            let ips: Vec<String> = self.allowed_ips.iter().map(|n| n.to_string()).collect();
            writeln!(f, "AllowedIPs = {}", ips.join(", "))?;
        }
        Ok(())
    }
}

/// Full device configuration pushed on every sync.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceConfig {
    pub private_key: Option<Key>,
    pub listen_port: Option<u16>,
    pub fwmark: Option<u32>,
    /// Drop peers missing from `peers`. Always rendered as a full replace.
    pub replace_peers: bool,
    pub peers: Vec<PeerConfig>,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            private_key: None,
            listen_port: None,
            fwmark: None,
            replace_peers: true,
            peers: Vec::new(),
        }
    }
}

/// Renders the configuration in the format read by `wg setconf`.
impl fmt::Display for DeviceConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "[Interface]")?;
        if let Some(key) = &self.private_key {
            writeln!(f, "PrivateKey = {}", key)?;
        }
        if let Some(port) = self.listen_port {
            writeln!(f, "ListenPort = {}", port)?;
        }
        if let Some(mark) = self.fwmark {
            writeln!(f, "FwMark = {}", mark)?;
        }
        for peer in &self.peers {
            write!(f, "\n{}", peer)?;
        }
        Ok(())
    }
}

/// Device control-plane: a single full-replace configure call.
#[async_trait]
pub trait WgControl: Send + Sync {
    async fn configure_device(&self, iface: &str, config: &DeviceConfig) -> CommonResult<()>;
}

/// [`WgControl`] implementation piping the rendered config into `wg setconf`.
///
/// The configuration travels over stdin so keys never appear in a process
/// argument list.
#[derive(Debug, Clone, Default)]
pub struct WgTool;

impl WgTool {
    pub fn new() -> Self {
        Self
    }

    pub fn setconf_cmd(iface: &str) -> String {
        format!("{} setconf {} /dev/stdin", WG_CMD, shellquote(iface))
    }
}

#[async_trait]
impl WgControl for WgTool {
    async fn configure_device(&self, iface: &str, config: &DeviceConfig) -> CommonResult<()> {
        let cmd = Self::setconf_cmd(iface);
        shell::exec_or_throw_with_stdin(&cmd, &config.to_string()).await?;
        Ok(())
    }
}
