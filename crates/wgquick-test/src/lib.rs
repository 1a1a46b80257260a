//! Test infrastructure for the wg-quick reconcilers
//!
//! Provides:
//! - [`FakeKernel`]: stateful in-memory [`wgquick_common::Rtnl`] with an
//!   operation journal and failure injection
//! - [`FakeWgControl`]: records every device push
//! - Key, peer and kernel-state fixtures
//! - Journal verification helpers

pub mod fake_kernel;
pub mod fixtures;
mod verification;

pub use fake_kernel::{FakeKernel, FakeWgControl, Injected, KernelOp, OpKind};
pub use fixtures::*;
pub use verification::*;
