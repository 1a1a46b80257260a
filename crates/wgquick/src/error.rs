//! Error taxonomy for reconciliation and lifecycle operations.

use std::io;
use std::path::PathBuf;

use thiserror::Error;
use wgquick_common::CommonError;

/// Result type alias for wg-quick operations.
pub type Result<T> = std::result::Result<T, WgQuickError>;

/// Errors returned by the reconcilers and the orchestrator.
///
/// Every operation returns the first error it hits; nothing is aggregated,
/// retried or rolled back.
#[derive(Debug, Error)]
pub enum WgQuickError {
    /// `up` on an interface that already exists.
    #[error("Interface '{iface}' already exists")]
    AlreadyExists {
        /// The interface name.
        iface: String,
    },

    /// Missing interface or configuration file.
    #[error("{what} not found")]
    NotFound {
        /// Description of the missing object.
        what: String,
    },

    /// A link, address, route or device call failed.
    #[error("Kernel operation failed: {operation}: {source}")]
    KernelOperationFailed {
        /// The operation that failed (e.g. "create link").
        operation: String,
        /// The underlying error.
        #[source]
        source: CommonError,
    },

    /// A hook command could not be spawned or exited non-zero.
    #[error("Hook failed: '{command}': {source}")]
    HookFailed {
        /// The command after interface-name substitution.
        command: String,
        /// The underlying error.
        #[source]
        source: CommonError,
    },

    /// Malformed configuration or invocation.
    #[error("Cannot parse configuration: {message}")]
    ParseFailed {
        /// What was wrong.
        message: String,
    },

    /// Reading a configuration file failed.
    #[error("Cannot read {path}: {source}")]
    Io {
        /// The file being read.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: io::Error,
    },
}

impl WgQuickError {
    /// Creates a kernel operation error.
    pub fn kernel(operation: impl Into<String>, source: CommonError) -> Self {
        Self::KernelOperationFailed {
            operation: operation.into(),
            source,
        }
    }

    /// Creates a not-found error.
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound { what: what.into() }
    }

    /// Creates a parse error.
    pub fn parse(message: impl Into<String>) -> Self {
        Self::ParseFailed {
            message: message.into(),
        }
    }
}
