//! wg-quick reconciler
//!
//! Brings a WireGuard interface's kernel state in line with a wg-quick
//! configuration:
//! - Link creation and administrative state
//! - Device configuration (keys, listen port, peers)
//! - Interface addresses
//! - Peer routes, owned through a protocol tag
//! - PreUp/PostUp/PreDown/PostDown hooks and DNS registration

pub mod address;
pub mod cli;
pub mod config;
pub mod device;
pub mod error;
pub mod hooks;
pub mod link;
pub mod route;
pub mod wg_quick;

pub use config::Config;
pub use error::{Result, WgQuickError};
pub use wg_quick::{SyncReport, WgQuick};
