//! Error types for shell, kernel and device operations.
//!
//! All errors implement `std::error::Error` via `thiserror`.

use std::io;
use thiserror::Error;

/// Result type alias for common operations.
pub type CommonResult<T> = Result<T, CommonError>;

/// Errors raised by the primitives in this crate.
#[derive(Debug, Error)]
pub enum CommonError {
    /// Failed to execute a shell command (spawn error).
    #[error("Failed to execute shell command '{command}': {source}")]
    ShellExec {
        /// The command that failed to execute.
        command: String,
        /// The underlying IO error.
        #[source]
        source: io::Error,
    },

    /// Shell command returned non-zero exit code.
    #[error("Shell command failed: '{command}' (exit code {exit_code}): {output}")]
    ShellCommandFailed {
        /// The command that failed.
        command: String,
        /// The exit code.
        exit_code: i32,
        /// Combined stdout/stderr output.
        output: String,
    },

    /// The kernel refused to create an object that is already present.
    #[error("{what} already exists")]
    AlreadyExists {
        /// Description of the object.
        what: String,
    },

    /// The object the operation targets does not exist.
    #[error("{what} not found")]
    NotFound {
        /// Description of the object.
        what: String,
    },

    /// Output of a tool could not be decoded.
    #[error("Cannot decode output of '{command}': {message}")]
    Decode {
        /// The command whose output was decoded.
        command: String,
        /// Error message.
        message: String,
    },

    /// A WireGuard key is not 32 bytes of base64.
    #[error("Invalid key: {message}")]
    InvalidKey {
        /// Error message.
        message: String,
    },
}

impl CommonError {
    /// Creates an already-exists error.
    pub fn already_exists(what: impl Into<String>) -> Self {
        Self::AlreadyExists { what: what.into() }
    }

    /// Creates a not-found error.
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound { what: what.into() }
    }

    /// Creates a decode error.
    pub fn decode(command: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Decode {
            command: command.into(),
            message: message.into(),
        }
    }

    /// Returns true if the kernel reported the object as already present.
    pub fn is_already_exists(&self) -> bool {
        matches!(self, CommonError::AlreadyExists { .. })
    }

    /// Returns true if the target object does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(self, CommonError::NotFound { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = CommonError::already_exists("address 10.0.0.1/24 on wg0");
        assert_eq!(err.to_string(), "address 10.0.0.1/24 on wg0 already exists");

        let err = CommonError::not_found("link wg0");
        assert_eq!(err.to_string(), "link wg0 not found");
    }

    #[test]
    fn test_shell_command_failed() {
        let err = CommonError::ShellCommandFailed {
            command: "ip link set dev wg0 up".to_string(),
            exit_code: 1,
            output: "Cannot find device \"wg0\"".to_string(),
        };
        assert!(err.to_string().contains("ip link set dev"));
        assert!(err.to_string().contains("exit code 1"));
    }

    #[test]
    fn test_classification() {
        assert!(CommonError::already_exists("x").is_already_exists());
        assert!(!CommonError::not_found("x").is_already_exists());
        assert!(CommonError::not_found("x").is_not_found());
        assert!(!CommonError::decode("ip -j link", "eof").is_not_found());
    }
}
