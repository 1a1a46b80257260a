//! Verification helpers for asserting on the fake kernel's journal

use thiserror::Error;

use crate::fake_kernel::{KernelOp, OpKind};

/// Verification error types
#[derive(Error, Debug)]
pub enum VerificationError {
    #[error("Expected a {kind:?} call, journal was {journal:?}")]
    OpMissing { kind: OpKind, journal: Vec<KernelOp> },

    #[error("Unexpected {kind:?} call, journal was {journal:?}")]
    OpUnexpected { kind: OpKind, journal: Vec<KernelOp> },

    #[error("Expected {expected} state changes, found {actual}: {changes:?}")]
    ChangeCountMismatch {
        expected: usize,
        actual: usize,
        changes: Vec<KernelOp>,
    },
}

/// Result type for verification operations
pub type VerifyResult<T> = Result<T, VerificationError>;

/// Journal verifier
pub struct JournalVerifier {
    journal: Vec<KernelOp>,
}

impl JournalVerifier {
    pub fn new(journal: Vec<KernelOp>) -> Self {
        Self { journal }
    }

    /// Verify that at least one call of `kind` was made
    pub fn assert_called(&self, kind: OpKind) -> VerifyResult<()> {
        if self.journal.iter().any(|op| op.kind() == kind) {
            Ok(())
        } else {
            Err(VerificationError::OpMissing {
                kind,
                journal: self.journal.clone(),
            })
        }
    }

    /// Verify that no call of `kind` was made
    pub fn assert_not_called(&self, kind: OpKind) -> VerifyResult<()> {
        if self.journal.iter().any(|op| op.kind() == kind) {
            Err(VerificationError::OpUnexpected {
                kind,
                journal: self.journal.clone(),
            })
        } else {
            Ok(())
        }
    }

    /// Verify the number of calls that changed kernel state
    pub fn assert_state_changes(&self, expected: usize) -> VerifyResult<()> {
        let changes: Vec<KernelOp> = self
            .journal
            .iter()
            .filter(|op| op.is_state_change())
            .cloned()
            .collect();
        if changes.len() != expected {
            return Err(VerificationError::ChangeCountMismatch {
                expected,
                actual: changes.len(),
                changes,
            });
        }
        Ok(())
    }

    /// Verify that nothing but lookups happened
    pub fn assert_read_only(&self) -> VerifyResult<()> {
        for kind in [
            OpKind::LinkAdd,
            OpKind::LinkSetUp,
            OpKind::LinkDel,
            OpKind::AddrAdd,
            OpKind::AddrDel,
            OpKind::RouteReplace,
            OpKind::RouteDel,
        ] {
            self.assert_not_called(kind)?;
        }
        Ok(())
    }

    pub fn journal(&self) -> &[KernelOp] {
        &self.journal
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_journal_verifier() {
        let verifier = JournalVerifier::new(vec![
            KernelOp::LinkGet("wg0".to_string()),
            KernelOp::AddrAdd("10.0.0.1/24".to_string()),
            KernelOp::LinkSetUp {
                name: "wg0".to_string(),
                changed: false,
            },
        ]);

        assert!(verifier.assert_called(OpKind::AddrAdd).is_ok());
        assert!(verifier.assert_not_called(OpKind::RouteDel).is_ok());
        assert!(verifier.assert_state_changes(1).is_ok());

        assert!(verifier.assert_state_changes(2).is_err());
        assert!(verifier.assert_called(OpKind::LinkDel).is_err());
        assert!(verifier.assert_read_only().is_err());
    }

    #[test]
    fn test_read_only_journal() {
        let verifier = JournalVerifier::new(vec![KernelOp::LinkGet("wg0".to_string())]);
        assert!(verifier.assert_read_only().is_ok());
    }
}
