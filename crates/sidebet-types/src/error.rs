//! Error types for the Sidebet settlement engine.
//!
//! All errors use the `SB_ERR_` prefix convention for easy grepping in logs.
//! Error codes are grouped by subsystem:
//! - 1xx: Input validation
//! - 2xx: Lookup (bets, identities)
//! - 3xx: Bet state / cache
//! - 4xx: Ledger gateway
//! - 5xx: Lifecycle operation failures (wrap a ledger cause)
//! - 9xx: General / internal errors

use thiserror::Error;

use crate::{Address, BetId, BetStatus, Operation, OperationId, TxHash, UserHandle};

/// Central error enum for all Sidebet operations.
#[derive(Debug, Error)]
pub enum SidebetError {
    // =================================================================
    // Validation (1xx)
    // =================================================================
    /// Bad input shape or range. Rejected before any external call.
    #[error("SB_ERR_100: Validation failed: {reason}")]
    Validation { reason: String },

    // =================================================================
    // Lookup (2xx)
    // =================================================================
    /// No bet with this id in the cache or on the ledger.
    #[error("SB_ERR_200: Bet not found: {0}")]
    BetNotFound(BetId),

    /// The handle has no ledger address.
    #[error("SB_ERR_201: No address known for {0}")]
    IdentityNotFound(UserHandle),

    /// The handle is already mapped to a different address.
    #[error("SB_ERR_202: {handle} is already mapped to {existing}")]
    IdentityConflict {
        handle: UserHandle,
        existing: Address,
    },

    // =================================================================
    // Bet state / cache (3xx)
    // =================================================================
    /// The operation is not valid for the bet's current status.
    #[error("SB_ERR_300: Illegal transition: cannot {attempted} bet {bet_id} in status {status}")]
    IllegalTransition {
        bet_id: BetId,
        status: BetStatus,
        attempted: Operation,
    },

    /// The registry already holds a bet with this id.
    #[error("SB_ERR_301: Bet already registered: {0}")]
    DuplicateBet(BetId),

    /// This logical operation has already been applied to the cache.
    #[error("SB_ERR_302: Operation already applied: {0}")]
    DuplicateOperation(OperationId),

    /// Ledger state contradicts an immutable cached field.
    #[error("SB_ERR_303: Cache diverged from ledger for bet {bet_id}: {reason}")]
    CacheDiverged { bet_id: BetId, reason: String },

    // =================================================================
    // Ledger gateway (4xx)
    // =================================================================
    /// The ledger could not be reached or refused the submission.
    /// Nothing was confirmed; safe to retry from scratch.
    #[error("SB_ERR_400: Ledger unavailable: {reason}")]
    LedgerUnavailable { reason: String },

    /// Submitted, but confirmation was not observed within the budget.
    /// The outcome is unknown until a reconciling read.
    #[error("SB_ERR_401: Ledger timeout after {waited_ms}ms waiting for {tx_hash} (nonce {nonce})")]
    LedgerTimeout {
        tx_hash: TxHash,
        nonce: u64,
        waited_ms: u64,
    },

    /// The ledger executed the call and rejected it.
    #[error("SB_ERR_402: Call reverted: {reason}")]
    CallReverted { reason: String },

    /// The sender's sequence number did not match the ledger's.
    #[error("SB_ERR_403: Nonce conflict for {sender} at nonce {nonce}")]
    NonceConflict { sender: Address, nonce: u64 },

    /// A ledger response could not be decoded.
    #[error("SB_ERR_404: ABI decode error: {0}")]
    AbiDecode(String),

    /// The submission reached the ledger's front door but its answer was
    /// lost. The transaction may be pooled under `nonce`.
    #[error("SB_ERR_405: Submission outcome unknown for {sender} at nonce {nonce}: {reason}")]
    SubmissionUncertain {
        sender: Address,
        nonce: u64,
        reason: String,
    },

    // =================================================================
    // Lifecycle operations (5xx)
    // =================================================================
    #[error("SB_ERR_500: Join failed for bet {bet_id}: {source}")]
    JoinFailed {
        bet_id: BetId,
        #[source]
        source: Box<SidebetError>,
    },

    #[error("SB_ERR_501: Resolve failed for bet {bet_id}: {source}")]
    ResolveFailed {
        bet_id: BetId,
        #[source]
        source: Box<SidebetError>,
    },

    #[error("SB_ERR_502: Claim failed for bet {bet_id}: {source}")]
    ClaimFailed {
        bet_id: BetId,
        #[source]
        source: Box<SidebetError>,
    },

    // =================================================================
    // General / Internal (9xx)
    // =================================================================
    /// Unrecoverable internal error.
    #[error("SB_ERR_900: Internal error: {0}")]
    Internal(String),

    /// Serialization / deserialization error.
    #[error("SB_ERR_901: Serialization error: {0}")]
    Serialization(String),

    /// Configuration error (missing or malformed settings).
    #[error("SB_ERR_902: Configuration error: {0}")]
    Configuration(String),

    /// I/O error (disk, network).
    #[error("SB_ERR_903: I/O error: {0}")]
    Io(String),
}

impl SidebetError {
    /// Convenience constructor for validation failures.
    pub fn validation(reason: impl Into<String>) -> Self {
        Self::Validation {
            reason: reason.into(),
        }
    }

    /// Convenience constructor for transport failures.
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self::LedgerUnavailable {
            reason: reason.into(),
        }
    }

    /// Wrap a ledger failure as the failure of `op` on `bet_id`.
    /// Create failures are normalized to `LedgerUnavailable`.
    #[must_use]
    pub fn for_operation(self, op: Operation, bet_id: BetId) -> Self {
        let source = Box::new(self);
        match op {
            Operation::Join => Self::JoinFailed { bet_id, source },
            Operation::Resolve => Self::ResolveFailed { bet_id, source },
            Operation::Claim => Self::ClaimFailed { bet_id, source },
            Operation::Create => match *source {
                err @ Self::LedgerUnavailable { .. } => err,
                other => Self::LedgerUnavailable {
                    reason: other.to_string(),
                },
            },
        }
    }

    /// Safe to retry the whole operation: nothing was confirmed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self.root_cause(), Self::LedgerUnavailable { .. })
    }

    /// The effect may or may not have landed; reconcile before retrying.
    #[must_use]
    pub fn is_ambiguous(&self) -> bool {
        matches!(
            self.root_cause(),
            Self::LedgerTimeout { .. }
                | Self::NonceConflict { .. }
                | Self::SubmissionUncertain { .. }
        )
    }

    /// Unwrap lifecycle-operation wrappers to the underlying ledger error.
    #[must_use]
    pub fn root_cause(&self) -> &Self {
        match self {
            Self::JoinFailed { source, .. }
            | Self::ResolveFailed { source, .. }
            | Self::ClaimFailed { source, .. } => source.root_cause(),
            other => other,
        }
    }
}

/// Crate-wide `Result` alias.
pub type Result<T> = std::result::Result<T, SidebetError>;

impl From<std::io::Error> for SidebetError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<serde_json::Error> for SidebetError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_contains_prefix() {
        let err = SidebetError::BetNotFound(Address::ZERO);
        let msg = format!("{err}");
        assert!(msg.starts_with("SB_ERR_200"), "Got: {msg}");
    }

    #[test]
    fn illegal_transition_display() {
        let err = SidebetError::IllegalTransition {
            bet_id: Address::ZERO,
            status: BetStatus::Resolved,
            attempted: Operation::Resolve,
        };
        let msg = format!("{err}");
        assert!(msg.contains("SB_ERR_300"));
        assert!(msg.contains("RESOLVE"));
        assert!(msg.contains("RESOLVED"));
    }

    #[test]
    fn wrapped_errors_expose_root_cause() {
        let err = SidebetError::CallReverted {
            reason: "not a winner".into(),
        }
        .for_operation(Operation::Claim, Address::ZERO);
        assert!(matches!(err, SidebetError::ClaimFailed { .. }));
        assert!(matches!(err.root_cause(), SidebetError::CallReverted { .. }));
        assert!(!err.is_retryable());
        assert!(!err.is_ambiguous());
        assert!(err.to_string().contains("not a winner"));
    }

    #[test]
    fn create_failures_normalize_to_unavailable() {
        let err = SidebetError::LedgerTimeout {
            tx_hash: TxHash([0u8; 32]),
            nonce: 4,
            waited_ms: 10,
        }
        .for_operation(Operation::Create, Address::ZERO);
        assert!(matches!(err, SidebetError::LedgerUnavailable { .. }));
        assert!(err.is_retryable());
    }

    #[test]
    fn timeout_is_ambiguous() {
        let err = SidebetError::LedgerTimeout {
            tx_hash: TxHash([0u8; 32]),
            nonce: 0,
            waited_ms: 1,
        }
        .for_operation(Operation::Join, Address::ZERO);
        assert!(err.is_ambiguous());
        assert!(!err.is_retryable());
    }

    #[test]
    fn lost_submission_is_ambiguous() {
        let err = SidebetError::SubmissionUncertain {
            sender: Address::ZERO,
            nonce: 3,
            reason: "response lost".into(),
        }
        .for_operation(Operation::Resolve, Address::ZERO);
        assert!(err.is_ambiguous());
        assert!(!err.is_retryable());
        assert!(err.to_string().contains("SB_ERR_405"));
    }

    #[test]
    fn all_errors_have_sb_err_prefix() {
        let errors: Vec<Box<dyn std::error::Error>> = vec![
            Box::new(SidebetError::validation("bad")),
            Box::new(SidebetError::unavailable("down")),
            Box::new(SidebetError::DuplicateOperation(OperationId::new())),
            Box::new(SidebetError::Internal("test".into())),
            Box::new(SidebetError::NonceConflict {
                sender: Address::ZERO,
                nonce: 1,
            }),
        ];
        for err in errors {
            let msg = format!("{err}");
            assert!(
                msg.starts_with("SB_ERR_"),
                "Error missing SB_ERR_ prefix: {msg}"
            );
        }
    }
}
