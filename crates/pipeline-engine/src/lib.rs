//! Pipeline Engine - graph model for editing execution pipelines
//!
//! This crate holds everything about a pipeline graph that does not need a
//! network or a runtime:
//!
//! - Typed pins and the connection compatibility rule
//! - The graph store with undo/redo, clipboard, selection and alignment
//! - Composite extraction from a selection of nodes
//! - Deterministic layered layout
//! - The execution status view fed by engine events
//!
//! # Architecture
//!
//! - `GraphStore`: single owner of nodes, edges and composite definitions
//! - `History`: zstd-compressed snapshots for undo/redo
//! - `EventSink`: change notifications for observers (not tied to any UI)
//!
//! # Example
//!
//! ```ignore
//! use pipeline_engine::{GraphStore, Node, NodeKind, PinType};
//!
//! let mut store = GraphStore::new();
//! store.add_node(Node::new("n1", NodeKind::Variable, "Width").with_output("out", PinType::Number))?;
//! store.add_node(Node::new("n2", NodeKind::Function, "Print").with_input("in", PinType::String))?;
//! store.connect("n1", "out", "n2", "in")?;
//! ```

pub mod composite;
pub mod error;
pub mod events;
pub mod execution;
pub mod history;
pub mod layout;
pub mod store;
pub mod types;
pub mod validation;

// Re-export key types
pub use composite::{
    extract_composite, find_boundary, instance_node, Boundary, CandidatePin, CompositeDraft,
    ConfirmedPin, ExtractionResult, InterfaceSelection,
};
pub use error::{ConnectRefusal, ExtractError, NodeRefusal, PipelineError, Result};
pub use events::{EventError, EventSink, GraphEvent, NullEventSink, VecEventSink};
pub use execution::{DecodeError, ExecutionEvent, ExecutionState, LogLevel, NodeStatus, Progress};
pub use history::History;
pub use layout::{assign_levels, compute_layout, LayoutDirection, LayoutOptions};
pub use store::{AlignEdge, GraphStore, NodeUpdate, SharedGraphStore};
pub use types::{
    is_compatible, Composite, CompositeId, CompositeInput, CompositeMetadata, CompositeOutput,
    CompositePatch, Edge, EdgeId, GraphSnapshot, Node, NodeConfig, NodeId, NodeKind, Pin,
    PinRef, PinType, PipelineDefinition, PipelineMetadata, Position, Subgraph,
};
pub use validation::{
    validate_composite, validate_graph, validate_patch, ValidationError, MIN_COMPOSITE_NODES,
};
