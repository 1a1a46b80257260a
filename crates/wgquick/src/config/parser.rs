//! wg-quick configuration file parser.
//!
//! The file is INI formatted: one `[Interface]` section followed by any
//! number of `[Peer]` sections. Keys are matched case-insensitively, list
//! values are comma separated and may also be split over repeated keys.

use std::net::IpAddr;
use std::path::Path;
use std::str::FromStr;

use ini::{Ini, ParseOption, Properties};
use ipnet::IpNet;
use tracing::debug;
use wgquick_common::types::{protocol_id, table_id};
use wgquick_common::{Key, PeerConfig};

use super::Config;
use crate::error::{Result, WgQuickError};

const INTERFACE_SECTION: &str = "Interface";
const PEER_SECTION: &str = "Peer";

impl FromStr for Config {
    type Err = WgQuickError;

    fn from_str(s: &str) -> Result<Self> {
        parse_config(s)
    }
}

/// Reads and parses a configuration file.
pub fn load_config(path: &Path) -> Result<Config> {
    let text = std::fs::read_to_string(path).map_err(|source| WgQuickError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    debug!(path = %path.display(), "Loaded configuration file");
    parse_config(&text)
}

/// Parses configuration text.
pub fn parse_config(text: &str) -> Result<Config> {
    // Hook commands are passed to the shell verbatim.
    let opt = ParseOption {
        enabled_quote: false,
        enabled_escape: false,
        ..ParseOption::default()
    };
    let ini = Ini::load_from_str_opt(text, opt).map_err(|e| WgQuickError::parse(e.to_string()))?;

    let mut cfg = Config::default();
    let mut seen_interface = false;

    for (section, props) in ini.iter() {
        match section {
            None => {
                if let Some((key, _)) = props.iter().next() {
                    return Err(WgQuickError::parse(format!(
                        "key '{}' outside of any section",
                        key
                    )));
                }
            }
            Some(name) if name.eq_ignore_ascii_case(INTERFACE_SECTION) => {
                if seen_interface {
                    return Err(WgQuickError::parse("duplicate [Interface] section"));
                }
                seen_interface = true;
                parse_interface(props, &mut cfg)?;
            }
            Some(name) if name.eq_ignore_ascii_case(PEER_SECTION) => {
                cfg.device.peers.push(parse_peer(props)?);
            }
            Some(name) => {
                return Err(WgQuickError::parse(format!("unknown section [{}]", name)));
            }
        }
    }

    if !seen_interface {
        return Err(WgQuickError::parse("missing [Interface] section"));
    }
    Ok(cfg)
}

fn parse_interface(props: &Properties, cfg: &mut Config) -> Result<()> {
    for (key, value) in props.iter() {
        let value = value.trim();
        match key.trim().to_ascii_lowercase().as_str() {
            "privatekey" => cfg.device.private_key = Some(parse_key(key, value)?),
            "listenport" => cfg.device.listen_port = Some(parse_num(key, value)?),
            "fwmark" => cfg.device.fwmark = parse_fwmark(key, value)?,
            "address" => {
                for item in split_list(value) {
                    cfg.address.push(parse_net(key, item)?);
                }
            }
            "dns" => {
                for item in split_list(value) {
                    let ip: IpAddr = item.parse().map_err(|_| invalid(key, item))?;
                    cfg.dns.push(ip);
                }
            }
            "mtu" => cfg.mtu = Some(parse_num(key, value)?),
            "table" => cfg.table = parse_table(key, value)?,
            "routeprotocol" => {
                cfg.route_protocol = protocol_id(value).ok_or_else(|| invalid(key, value))?
            }
            "routemetric" => cfg.route_metric = parse_num(key, value)?,
            "addresslabel" => cfg.address_label = Some(value.to_string()),
            "preup" => append_hook(&mut cfg.pre_up, value),
            "postup" => append_hook(&mut cfg.post_up, value),
            "predown" => append_hook(&mut cfg.pre_down, value),
            "postdown" => append_hook(&mut cfg.post_down, value),
            "saveconfig" => debug!("Ignoring SaveConfig"),
            _ => {
                return Err(WgQuickError::parse(format!(
                    "unknown key '{}' in [Interface]",
                    key
                )))
            }
        }
    }
    Ok(())
}

fn parse_peer(props: &Properties) -> Result<PeerConfig> {
    let mut public_key = None;
    let mut preshared_key = None;
    let mut endpoint = None;
    let mut persistent_keepalive = None;
    let mut allowed_ips = Vec::new();

    for (key, value) in props.iter() {
        let value = value.trim();
        match key.trim().to_ascii_lowercase().as_str() {
            "publickey" => public_key = Some(parse_key(key, value)?),
            "presharedkey" => preshared_key = Some(parse_key(key, value)?),
            "endpoint" => endpoint = Some(value.to_string()),
            "persistentkeepalive" => {
                persistent_keepalive = if value.eq_ignore_ascii_case("off") {
                    None
                } else {
                    Some(parse_num(key, value)?)
                }
            }
            "allowedips" => {
                for item in split_list(value) {
                    allowed_ips.push(parse_net(key, item)?);
                }
            }
            _ => {
                return Err(WgQuickError::parse(format!(
                    "unknown key '{}' in [Peer]",
                    key
                )))
            }
        }
    }

    let public_key =
        public_key.ok_or_else(|| WgQuickError::parse("[Peer] section without PublicKey"))?;
    Ok(PeerConfig {
        public_key,
        preshared_key,
        endpoint,
        persistent_keepalive,
        allowed_ips,
    })
}

fn invalid(key: &str, value: &str) -> WgQuickError {
    WgQuickError::parse(format!("invalid {} '{}'", key, value))
}

fn split_list(value: &str) -> impl Iterator<Item = &str> {
    value.split(',').map(str::trim).filter(|s| !s.is_empty())
}

fn parse_num<T: FromStr>(key: &str, value: &str) -> Result<T> {
    value.parse().map_err(|_| invalid(key, value))
}

fn parse_key(key: &str, value: &str) -> Result<Key> {
    value
        .parse()
        .map_err(|e| WgQuickError::parse(format!("invalid {}: {}", key, e)))
}

/// Parses a network; a bare address gets a full-length prefix.
fn parse_net(key: &str, value: &str) -> Result<IpNet> {
    if value.contains('/') {
        return value.parse().map_err(|_| invalid(key, value));
    }
    let ip: IpAddr = value.parse().map_err(|_| invalid(key, value))?;
    let prefix = match ip {
        IpAddr::V4(_) => 32,
        IpAddr::V6(_) => 128,
    };
    IpNet::new(ip, prefix).map_err(|_| invalid(key, value))
}

fn parse_fwmark(key: &str, value: &str) -> Result<Option<u32>> {
    if value.eq_ignore_ascii_case("off") {
        return Ok(None);
    }
    let mark = match value.strip_prefix("0x").or_else(|| value.strip_prefix("0X")) {
        Some(hex) => u32::from_str_radix(hex, 16).map_err(|_| invalid(key, value))?,
        None => parse_num(key, value)?,
    };
    Ok(Some(mark))
}

fn parse_table(key: &str, value: &str) -> Result<u32> {
    match value.to_ascii_lowercase().as_str() {
        "auto" => Ok(0),
        "off" => Err(WgQuickError::parse(
            "Table = off is not supported, peer routes are always managed",
        )),
        other => table_id(other).ok_or_else(|| invalid(key, value)),
    }
}

fn append_hook(slot: &mut Option<String>, value: &str) {
    match slot {
        Some(existing) => {
            existing.push('\n');
            existing.push_str(value);
        }
        None => *slot = Some(value.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use wgquick_common::defaults;

    const PRIVATE: &str = "yAnz5TF+lXXJte14tji3zlMNq+hd2rYUIgJBgB3fBmk=";
    const PUBLIC: &str = "xTIBA5rboUvnH4htodjb6e697QjLERt1NAB4mZqp8Dg=";

    fn sample() -> String {
        format!(
            "[Interface]\n\
             PrivateKey = {PRIVATE}\n\
             ListenPort = 51820\n\
             Address = 10.0.0.1/24, 10.0.1.1\n\
             Address = fd00::1/64\n\
             DNS = 1.1.1.1, 9.9.9.9\n\
             MTU = 1420\n\
             Table = 100\n\
             RouteProtocol = static\n\
             RouteMetric = 20\n\
             PostUp = echo up %i\n\
             PostUp = echo again\n\
             \n\
             [Peer]\n\
             PublicKey = {PUBLIC}\n\
             Endpoint = vpn.example.com:51820\n\
             PersistentKeepalive = 25\n\
             AllowedIPs = 10.1.0.0/16, 10.2.0.0/16\n"
        )
    }

    #[test]
    fn test_parse_full_config() {
        let cfg = parse_config(&sample()).unwrap();

        assert_eq!(cfg.device.listen_port, Some(51820));
        assert_eq!(
            cfg.address,
            vec![
                "10.0.0.1/24".parse::<IpNet>().unwrap(),
                "10.0.1.1/32".parse().unwrap(),
                "fd00::1/64".parse().unwrap(),
            ]
        );
        assert_eq!(cfg.dns.len(), 2);
        assert_eq!(cfg.mtu, Some(1420));
        assert_eq!(cfg.table, 100);
        assert_eq!(cfg.route_protocol, 4);
        assert_eq!(cfg.route_metric, 20);
        assert_eq!(cfg.post_up.as_deref(), Some("echo up %i\necho again"));

        let peer = &cfg.peers()[0];
        assert_eq!(peer.public_key.to_string(), PUBLIC);
        assert_eq!(peer.endpoint.as_deref(), Some("vpn.example.com:51820"));
        assert_eq!(peer.persistent_keepalive, Some(25));
        assert_eq!(peer.allowed_ips.len(), 2);
    }

    #[test]
    fn test_keys_are_case_insensitive() {
        let text = format!("[interface]\nprivatekey = {PRIVATE}\nLISTENPORT = 1\n");
        let cfg = parse_config(&text).unwrap();
        assert_eq!(cfg.device.listen_port, Some(1));
    }

    #[test]
    fn test_multiple_peers() {
        let text = format!(
            "[Interface]\nPrivateKey = {PRIVATE}\n\n\
             [Peer]\nPublicKey = {PUBLIC}\nAllowedIPs = 10.1.0.0/16\n\n\
             [Peer]\nPublicKey = {PRIVATE}\nAllowedIPs = 10.2.0.0/16\n"
        );
        let cfg = parse_config(&text).unwrap();
        assert_eq!(cfg.peers().len(), 2);
    }

    #[test]
    fn test_table_values() {
        let parse = |v: &str| parse_config(&format!("[Interface]\nTable = {v}\n"));
        assert_eq!(parse("auto").unwrap().table, 0);
        assert_eq!(parse("main").unwrap().table, defaults::RT_TABLE_MAIN);
        assert_eq!(parse("1234").unwrap().table, 1234);
        assert!(matches!(
            parse("off"),
            Err(WgQuickError::ParseFailed { .. })
        ));
    }

    #[test]
    fn test_fwmark_hex_and_off() {
        let parse = |v: &str| parse_config(&format!("[Interface]\nFwMark = {v}\n"));
        assert_eq!(parse("0xca6c").unwrap().device.fwmark, Some(0xca6c));
        assert_eq!(parse("51820").unwrap().device.fwmark, Some(51820));
        assert_eq!(parse("off").unwrap().device.fwmark, None);
    }

    #[test]
    fn test_rejects_malformed_input() {
        for text in [
            "[Interface]\nAddress = 10.0.0.300/24\n",
            "[Interface]\nListenPort = lots\n",
            "[Interface]\nBogus = 1\n",
            "[Interface]\nDNS = example.com\n",
            "[Peer]\nPublicKey = AAAA\n",
            "[Interface]\n[Peer]\nAllowedIPs = 10.0.0.0/8\n",
            "[Tunnel]\n",
            "",
        ] {
            let err = parse_config(text).unwrap_err();
            assert!(
                matches!(err, WgQuickError::ParseFailed { .. }),
                "expected parse failure for {:?}, got {:?}",
                text,
                err
            );
        }
    }

    #[test]
    fn test_rendered_config_parses_back() {
        let cfg = parse_config(&sample()).unwrap();
        let again = parse_config(&cfg.to_string()).unwrap();
        assert_eq!(again, cfg);
    }

    #[test]
    fn test_hooks_keep_shell_syntax() {
        let text = "[Interface]\nPreUp = iptables -A FORWARD -i %i -j ACCEPT; echo \"done\" # x\n";
        let cfg = parse_config(text).unwrap();
        assert_eq!(
            cfg.pre_up.as_deref(),
            Some("iptables -A FORWARD -i %i -j ACCEPT; echo \"done\" # x")
        );
    }

    #[test]
    fn test_load_config_missing_file() {
        let err = load_config(Path::new("/nonexistent/wg9.conf")).unwrap_err();
        assert!(matches!(err, WgQuickError::Io { .. }));
    }
}
