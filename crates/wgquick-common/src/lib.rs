//! Common infrastructure for the wg-quick crates.
//!
//! This crate holds everything the reconcilers treat as opaque primitives:
//!
//! - [`shell`]: Shell command execution with quoting and optional stdin
//! - [`types`]: Kernel data model (links, addresses, routes) and rtnetlink ids
//! - [`rtnl`]: The [`Rtnl`] trait and its `ip(8)` backed implementation
//! - [`device`]: WireGuard device configuration, the [`WgControl`] trait and
//!   its `wg(8)` backed implementation
//! - [`error`]: Error type for all of the above
//!
//! # Example
//!
//! ```ignore
//! use wgquick_common::{Family, IpRtnl, Rtnl};
//!
//! async fn show(name: &str) -> wgquick_common::CommonResult<()> {
//!     let rtnl = IpRtnl::new();
//!     if let Some(link) = rtnl.link_get(name).await? {
//!         for addr in rtnl.addr_list(&link, Family::V4).await? {
//!             println!("{} {}", link.name, addr);
//!         }
//!     }
//!     Ok(())
//! }
//! ```

pub mod device;
pub mod error;
pub mod rtnl;
pub mod shell;
pub mod types;

// Re-export commonly used items at crate root
pub use device::{DeviceConfig, Key, PeerConfig, WgControl, WgTool};
pub use error::{CommonError, CommonResult};
pub use rtnl::{IpRtnl, Rtnl};
pub use types::{defaults, Address, Family, Link, Route};
