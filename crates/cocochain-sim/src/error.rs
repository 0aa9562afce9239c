//! Simulator error types.

use cocochain_consensus::ConsensusError;
use cocochain_types::NodeId;
use thiserror::Error;

/// Errors that can occur while building or driving a simulation.
#[derive(Debug, Error)]
pub enum SimError {
    /// The scenario file or environment could not be read.
    #[error("failed to load scenario: {0}")]
    Load(#[from] config::ConfigError),

    /// The scenario failed validation.
    #[error("invalid scenario: {0}")]
    Invalid(#[from] validator::ValidationErrors),

    /// A consensus component rejected its input.
    #[error("consensus error: {0}")]
    Consensus(#[from] ConsensusError),

    /// No node has this id.
    #[error("unknown node {0}")]
    UnknownNode(NodeId),

    /// The operation needs a vehicle.
    #[error("node {0} is not a vehicle")]
    NotAVehicle(NodeId),

    /// The tracing subscriber could not be installed.
    #[error("failed to initialize logging: {0}")]
    Logging(String),
}

/// A specialized Result type for simulator operations.
pub type Result<T> = std::result::Result<T, SimError>;
