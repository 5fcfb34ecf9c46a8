//! Error types for card reader session operations.
//!
//! [`ReaderError`] is returned to the *caller* of a session operation when the
//! call itself breaks the protocol contract: an answer for the wrong step, a
//! ticket from an earlier transaction, a second transaction while one is
//! running, or an invalid connection transition. Host-visible failures travel
//! separately as [`ErrorRecord`]s through the handler.

use cardlink_core::{ErrorRecord, TransactionId};

/// Result type alias for session operations.
pub type Result<T> = std::result::Result<T, ReaderError>;

/// Errors returned to the caller of a session operation.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ReaderError {
    /// The requested connection transition is not allowed from the current state.
    #[error("Invalid connection transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },

    /// The reader is not connected and ready.
    #[error("Card reader is not connected")]
    NotConnected,

    /// A transaction is already being negotiated.
    #[error("Transaction {transaction_id} is still in progress")]
    NegotiationInProgress { transaction_id: TransactionId },

    /// An answer arrived for a step other than the one awaited.
    #[error("Out-of-order answer: awaiting {expected}, got {got}")]
    HandshakeOutOfOrder { expected: String, got: String },

    /// The ticket belongs to a transaction that is no longer active.
    #[error("Stale callback for transaction {transaction_id}")]
    StaleCallback { transaction_id: TransactionId },

    /// A catalogued failure, such as an invalid reader selection.
    #[error(transparent)]
    Failure(#[from] ErrorRecord),
}

impl ReaderError {
    /// Create a new invalid transition error.
    pub fn invalid_transition(from: impl ToString, to: impl ToString) -> Self {
        Self::InvalidTransition {
            from: from.to_string(),
            to: to.to_string(),
        }
    }

    /// Create a new out-of-order answer error.
    pub fn out_of_order(expected: impl ToString, got: impl ToString) -> Self {
        Self::HandshakeOutOfOrder {
            expected: expected.to_string(),
            got: got.to_string(),
        }
    }

    /// Whether this error is a protocol violation by the host.
    pub fn is_protocol_violation(&self) -> bool {
        matches!(
            self,
            Self::HandshakeOutOfOrder { .. } | Self::StaleCallback { .. }
        )
    }

    /// Catalogued record the host is notified with.
    pub fn to_record(&self) -> ErrorRecord {
        match self {
            Self::NotConnected => ErrorRecord::card_reader_not_connected(),
            Self::Failure(record) => record.clone(),
            other => ErrorRecord::card_reader_status(other.to_string()),
        }
    }
}
