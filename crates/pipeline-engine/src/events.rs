//! Change notifications for graph store observers
//!
//! The store pushes a [`GraphEvent`] to every subscribed [`EventSink`]
//! after each applied mutation. Refused mutations emit nothing.

use serde::{Deserialize, Serialize};

use crate::types::{CompositeId, EdgeId, NodeId};

/// Trait for receiving graph store events
///
/// This abstracts over the consumer (UI bridge, channel, test recorder).
pub trait EventSink: Send + Sync {
    /// Send an event
    ///
    /// Returns an error if the event could not be delivered (e.g., channel closed)
    fn send(&self, event: GraphEvent) -> Result<(), EventError>;
}

/// Error when sending events fails
#[derive(Debug, Clone)]
pub struct EventError {
    pub message: String,
}

impl std::fmt::Display for EventError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Event error: {}", self.message)
    }
}

impl std::error::Error for EventError {}

/// Events emitted by the graph store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum GraphEvent {
    #[serde(rename_all = "camelCase")]
    NodeAdded { node_id: NodeId },

    /// A node and the edges touching it were removed
    #[serde(rename_all = "camelCase")]
    NodeRemoved {
        node_id: NodeId,
        removed_edges: Vec<EdgeId>,
    },

    #[serde(rename_all = "camelCase")]
    NodeUpdated { node_id: NodeId },

    #[serde(rename_all = "camelCase")]
    EdgeAdded { edge_id: EdgeId },

    #[serde(rename_all = "camelCase")]
    EdgeRemoved { edge_id: EdgeId },

    #[serde(rename_all = "camelCase")]
    SelectionChanged { selection: Vec<NodeId> },

    /// Nodes and edges were replaced wholesale (undo, redo, load)
    HistoryRestored,

    #[serde(rename_all = "camelCase")]
    CompositeRegistered { composite_id: CompositeId },

    #[serde(rename_all = "camelCase")]
    CompositeRemoved { composite_id: CompositeId },

    #[serde(rename_all = "camelCase")]
    LayoutApplied { node_count: usize },

    /// Execution status or progress changed
    ExecutionUpdated,
}

/// A no-op event sink that discards all events
pub struct NullEventSink;

impl EventSink for NullEventSink {
    fn send(&self, _event: GraphEvent) -> Result<(), EventError> {
        Ok(())
    }
}

/// A vector-based event sink that collects events
///
/// Useful for testing to verify events were emitted correctly.
pub struct VecEventSink {
    events: parking_lot::Mutex<Vec<GraphEvent>>,
}

impl VecEventSink {
    pub fn new() -> Self {
        Self {
            events: parking_lot::Mutex::new(Vec::new()),
        }
    }

    /// Get all collected events
    pub fn events(&self) -> Vec<GraphEvent> {
        self.events.lock().clone()
    }

    /// Clear all collected events
    pub fn clear(&self) {
        self.events.lock().clear();
    }
}

impl Default for VecEventSink {
    fn default() -> Self {
        Self::new()
    }
}

impl EventSink for VecEventSink {
    fn send(&self, event: GraphEvent) -> Result<(), EventError> {
        self.events.lock().push(event);
        Ok(())
    }
}
