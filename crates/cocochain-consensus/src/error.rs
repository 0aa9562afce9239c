//! Consensus error types.
//!
//! Protocol-expected rejections (failed verification, stale transactions,
//! refused handovers) are ordinary outcome values and never appear here.

use thiserror::Error;

/// Errors that can occur during consensus operations.
#[derive(Debug, Error)]
pub enum ConsensusError {
    /// A concept vector does not have the configured dimensionality.
    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// Configured dimensionality.
        expected: usize,
        /// Length of the offending vector.
        actual: usize,
    },

    /// An operation was applied to a transaction in the wrong state, such as
    /// finalizing an already-terminal or unknown transaction.
    #[error("protocol violation: {0}")]
    ProtocolViolation(String),

    /// Configuration failed validation.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Wire content could not be encoded or decoded.
    #[error("codec error: {0}")]
    Codec(#[from] serde_json::Error),
}

/// Coarse classification of a [`ConsensusError`], used as a log and metric label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Invalid caller input.
    InvalidInput,
    /// Out-of-order or repeated protocol operation.
    ProtocolViolation,
    /// Bad configuration.
    Configuration,
    /// Malformed wire content.
    Codec,
}

impl ConsensusError {
    /// Returns the kind of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            ConsensusError::DimensionMismatch { .. } => ErrorKind::InvalidInput,
            ConsensusError::ProtocolViolation(_) => ErrorKind::ProtocolViolation,
            ConsensusError::InvalidConfig(_) => ErrorKind::Configuration,
            ConsensusError::Codec(_) => ErrorKind::Codec,
        }
    }
}

impl ErrorKind {
    /// Returns the kind as a string for logging.
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::InvalidInput => "invalid_input",
            ErrorKind::ProtocolViolation => "protocol_violation",
            ErrorKind::Configuration => "configuration",
            ErrorKind::Codec => "codec",
        }
    }
}

impl From<validator::ValidationErrors> for ConsensusError {
    fn from(errors: validator::ValidationErrors) -> Self {
        ConsensusError::InvalidConfig(errors.to_string())
    }
}

/// A specialized Result type for consensus operations.
pub type Result<T> = std::result::Result<T, ConsensusError>;
