//! Error types for the pipeline engine
//!
//! Graph edits never fail with these: a refused mutation is reported with
//! a refusal value (see [`ConnectRefusal`] and [`NodeRefusal`]) and the
//! store is left untouched.

use thiserror::Error;

use crate::types::{NodeId, PinType};

/// Result type alias using PipelineError
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Errors that can occur in the pipeline engine
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Compression error
    #[error("Compression error: {0}")]
    Compression(String),

    /// Composite extraction was rejected
    #[error("Composite extraction failed: {0}")]
    Extract(#[from] ExtractError),

    /// A pipeline definition failed validation
    #[error("Invalid pipeline definition: {0}")]
    InvalidDefinition(String),

    /// Referenced composite is not registered in the store
    #[error("Composite not found: {0}")]
    CompositeNotFound(String),
}

/// Reason an edge was not created
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConnectRefusal {
    #[error("Node '{0}' does not exist")]
    UnknownNode(NodeId),

    #[error("Node '{node_id}' has no pin named '{pin}'")]
    UnknownPin { node_id: NodeId, pin: String },

    #[error("Cannot connect {source_type} to {target_type}")]
    IncompatibleTypes {
        source_type: PinType,
        target_type: PinType,
    },

    #[error("An identical edge already exists")]
    Duplicate,

    #[error("Input '{pin}' on node '{node_id}' is already connected")]
    InputOccupied { node_id: NodeId, pin: String },

    #[error("Edge id '{0}' is already in use")]
    DuplicateEdgeId(String),
}

/// Reason a node was not inserted
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NodeRefusal {
    #[error("Node id '{0}' is already in use")]
    DuplicateId(NodeId),
}

/// Errors raised while turning a selection into a composite
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExtractError {
    #[error("A composite needs at least 2 nodes, got {0}")]
    TooFewNodes(usize),

    #[error("A composite needs a name")]
    EmptyName,

    #[error("'{0}' is not a boundary pin of the selection")]
    NotACandidate(String),

    #[error("Interface name '{0}' is used twice")]
    DuplicateInterfaceName(String),
}
