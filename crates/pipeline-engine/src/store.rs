//! The graph store - canonical model of a pipeline being edited
//!
//! All mutations go through named commands on [`GraphStore`]. A refused
//! command leaves the store untouched and reports why; nothing here panics
//! or propagates an error for a local validation failure. Observers
//! subscribe with an [`EventSink`] and receive a [`GraphEvent`] after each
//! applied change.
//!
//! Multi-threaded hosts share the store as a [`SharedGraphStore`]: all
//! writes go through the lock, while layout and extraction can run on a
//! [`GraphSnapshot`] taken under a short read lock.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::composite::{
    extract_composite, find_boundary, instance_node, Boundary, CompositeDraft, ExtractionResult,
    InterfaceSelection,
};
use crate::error::{ConnectRefusal, ExtractError, NodeRefusal, PipelineError, Result};
use crate::events::{EventSink, GraphEvent};
use crate::execution::{ExecutionEvent, ExecutionState};
use crate::history::{History, DEFAULT_HISTORY_DEPTH};
use crate::layout::{compute_layout, LayoutOptions};
use crate::types::{
    Composite, CompositeId, Edge, EdgeId, GraphSnapshot, Node, NodeConfig, NodeId,
    PipelineDefinition, Position,
};
use crate::validation::{validate_composite, validate_graph, ValidationError};

/// Offset applied to pasted nodes relative to the copied originals
pub const PASTE_OFFSET: f64 = 50.0;

/// Store handle shared between the editor and the sync client
pub type SharedGraphStore = Arc<RwLock<GraphStore>>;

/// Side of the selection to align to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlignEdge {
    Left,
    Right,
    Top,
    Bottom,
}

/// User-editable node fields; `None` leaves a field unchanged
///
/// `config` replaces the whole map. Execution status is not editable here.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeUpdate {
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub config: Option<NodeConfig>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub color: Option<String>,
}

impl NodeUpdate {
    pub fn label(label: impl Into<String>) -> Self {
        Self {
            label: Some(label.into()),
            ..Default::default()
        }
    }

    pub fn config(config: NodeConfig) -> Self {
        Self {
            config: Some(config),
            ..Default::default()
        }
    }
}

/// Canonical mutable pipeline graph
pub struct GraphStore {
    nodes: Vec<Node>,
    edges: Vec<Edge>,
    composites: BTreeMap<CompositeId, Composite>,
    selection: Vec<NodeId>,
    history: History,
    clipboard: Option<GraphSnapshot>,
    execution: ExecutionState,
    sinks: Vec<Arc<dyn EventSink>>,
}

impl GraphStore {
    /// Create an empty store with the default history depth
    pub fn new() -> Self {
        Self::with_history_depth(DEFAULT_HISTORY_DEPTH)
    }

    pub fn with_history_depth(depth: usize) -> Self {
        Self {
            nodes: Vec::new(),
            edges: Vec::new(),
            composites: BTreeMap::new(),
            selection: Vec::new(),
            history: History::new(depth),
            clipboard: None,
            execution: ExecutionState::new(),
            sinks: Vec::new(),
        }
    }

    /// Wrap into the shared single-writer handle
    pub fn into_shared(self) -> SharedGraphStore {
        Arc::new(RwLock::new(self))
    }

    /// Register an observer
    pub fn subscribe(&mut self, sink: Arc<dyn EventSink>) {
        self.sinks.push(sink);
    }

    fn emit(&self, event: GraphEvent) {
        for sink in &self.sinks {
            if let Err(e) = sink.send(event.clone()) {
                log::warn!("Failed to deliver graph event: {}", e);
            }
        }
    }

    // =========================================================================
    // Read access
    // =========================================================================

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    pub fn node(&self, id: &str) -> Option<&Node> {
        self.nodes.iter().find(|n| n.id == id)
    }

    pub fn edge(&self, id: &str) -> Option<&Edge> {
        self.edges.iter().find(|e| e.id == id)
    }

    pub fn selection(&self) -> &[NodeId] {
        &self.selection
    }

    pub fn is_selected(&self, id: &str) -> bool {
        self.selection.iter().any(|s| s == id)
    }

    /// Deep copy of the current nodes and edges
    pub fn snapshot(&self) -> GraphSnapshot {
        GraphSnapshot {
            nodes: self.nodes.clone(),
            edges: self.edges.clone(),
        }
    }

    pub fn execution(&self) -> &ExecutionState {
        &self.execution
    }

    pub fn can_undo(&self) -> bool {
        self.history.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.history.can_redo()
    }

    // =========================================================================
    // Nodes and edges
    // =========================================================================

    /// Insert a node; refused if the id is already in use
    pub fn add_node(&mut self, node: Node) -> std::result::Result<(), NodeRefusal> {
        if self.node(&node.id).is_some() {
            log::debug!("Refused node '{}': id already in use", node.id);
            return Err(NodeRefusal::DuplicateId(node.id));
        }
        let node_id = node.id.clone();
        self.nodes.push(node);
        self.emit(GraphEvent::NodeAdded { node_id });
        Ok(())
    }

    /// Remove a node and every edge touching it
    ///
    /// Returns `false` if the node did not exist.
    pub fn remove_node(&mut self, id: &str) -> bool {
        let Some(index) = self.nodes.iter().position(|n| n.id == id) else {
            return false;
        };
        self.nodes.remove(index);

        let mut removed_edges = Vec::new();
        self.edges.retain(|e| {
            if e.touches(id) {
                removed_edges.push(e.id.clone());
                false
            } else {
                true
            }
        });

        let selection_before = self.selection.len();
        self.selection.retain(|s| s != id);

        self.emit(GraphEvent::NodeRemoved {
            node_id: id.to_string(),
            removed_edges,
        });
        if self.selection.len() != selection_before {
            self.emit_selection();
        }
        true
    }

    /// Insert an edge after checking endpoints, pins, types and duplicates
    ///
    /// An empty edge id is replaced with a generated one. Returns the id of
    /// the created edge.
    pub fn add_edge(&mut self, mut edge: Edge) -> std::result::Result<EdgeId, ConnectRefusal> {
        if let Err(refusal) = self.check_edge(&edge) {
            log::debug!(
                "Refused edge {}.{} -> {}.{}: {}",
                edge.source_node_id,
                edge.source_pin,
                edge.target_node_id,
                edge.target_pin,
                refusal
            );
            return Err(refusal);
        }
        if edge.id.is_empty() {
            edge.id = fresh_id("edge");
        }
        let edge_id = edge.id.clone();
        self.edges.push(edge);
        self.emit(GraphEvent::EdgeAdded {
            edge_id: edge_id.clone(),
        });
        Ok(edge_id)
    }

    /// Connect two pins with a generated edge id
    pub fn connect(
        &mut self,
        source_node_id: &str,
        source_pin: &str,
        target_node_id: &str,
        target_pin: &str,
    ) -> std::result::Result<EdgeId, ConnectRefusal> {
        self.add_edge(Edge::new(
            fresh_id("edge"),
            source_node_id,
            source_pin,
            target_node_id,
            target_pin,
        ))
    }

    fn check_edge(&self, edge: &Edge) -> std::result::Result<(), ConnectRefusal> {
        let source = self
            .node(&edge.source_node_id)
            .ok_or_else(|| ConnectRefusal::UnknownNode(edge.source_node_id.clone()))?;
        let target = self
            .node(&edge.target_node_id)
            .ok_or_else(|| ConnectRefusal::UnknownNode(edge.target_node_id.clone()))?;
        let source_pin = source
            .find_output(&edge.source_pin)
            .ok_or_else(|| ConnectRefusal::UnknownPin {
                node_id: source.id.clone(),
                pin: edge.source_pin.clone(),
            })?;
        let target_pin = target
            .find_input(&edge.target_pin)
            .ok_or_else(|| ConnectRefusal::UnknownPin {
                node_id: target.id.clone(),
                pin: edge.target_pin.clone(),
            })?;

        if !source_pin.pin_type.is_compatible_with(&target_pin.pin_type) {
            return Err(ConnectRefusal::IncompatibleTypes {
                source_type: source_pin.pin_type,
                target_type: target_pin.pin_type,
            });
        }
        if self.edges.iter().any(|e| e.same_endpoints(edge)) {
            return Err(ConnectRefusal::Duplicate);
        }
        if self
            .edges
            .iter()
            .any(|e| e.target_node_id == edge.target_node_id && e.target_pin == edge.target_pin)
        {
            return Err(ConnectRefusal::InputOccupied {
                node_id: edge.target_node_id.clone(),
                pin: edge.target_pin.clone(),
            });
        }
        if !edge.id.is_empty() && self.edge(&edge.id).is_some() {
            return Err(ConnectRefusal::DuplicateEdgeId(edge.id.clone()));
        }
        Ok(())
    }

    /// Remove an edge; returns `false` if it did not exist
    pub fn remove_edge(&mut self, id: &str) -> bool {
        let Some(index) = self.edges.iter().position(|e| e.id == id) else {
            return false;
        };
        self.edges.remove(index);
        self.emit(GraphEvent::EdgeRemoved {
            edge_id: id.to_string(),
        });
        true
    }

    /// Shallow-merge user-editable fields into a node
    pub fn update_node_data(&mut self, id: &str, update: NodeUpdate) -> bool {
        let Some(node) = self.nodes.iter_mut().find(|n| n.id == id) else {
            return false;
        };
        if let Some(label) = update.label {
            node.label = label;
        }
        if let Some(config) = update.config {
            node.config = config;
        }
        if let Some(category) = update.category {
            node.category = Some(category);
        }
        if let Some(color) = update.color {
            node.color = Some(color);
        }
        self.emit(GraphEvent::NodeUpdated {
            node_id: id.to_string(),
        });
        true
    }

    /// Set a single configuration value on a node
    pub fn set_config_value(&mut self, id: &str, key: &str, value: serde_json::Value) -> bool {
        let Some(node) = self.nodes.iter_mut().find(|n| n.id == id) else {
            return false;
        };
        node.config.insert(key.to_string(), value);
        self.emit(GraphEvent::NodeUpdated {
            node_id: id.to_string(),
        });
        true
    }

    pub fn move_node(&mut self, id: &str, position: Position) -> bool {
        let Some(node) = self.nodes.iter_mut().find(|n| n.id == id) else {
            return false;
        };
        node.position = position;
        self.emit(GraphEvent::NodeUpdated {
            node_id: id.to_string(),
        });
        true
    }

    // =========================================================================
    // Selection
    // =========================================================================

    fn emit_selection(&self) {
        self.emit(GraphEvent::SelectionChanged {
            selection: self.selection.clone(),
        });
    }

    /// Replace the selection; unknown and repeated ids are dropped
    pub fn set_selection(&mut self, ids: &[NodeId]) {
        let mut seen = HashSet::new();
        self.selection = ids
            .iter()
            .filter(|id| self.node(id).is_some() && seen.insert(id.as_str()))
            .cloned()
            .collect();
        self.emit_selection();
    }

    /// Add or remove one node from the selection
    pub fn toggle_selection(&mut self, id: &str) {
        if let Some(index) = self.selection.iter().position(|s| s == id) {
            self.selection.remove(index);
        } else if self.node(id).is_some() {
            self.selection.push(id.to_string());
        } else {
            return;
        }
        self.emit_selection();
    }

    pub fn clear_selection(&mut self) {
        if self.selection.is_empty() {
            return;
        }
        self.selection.clear();
        self.emit_selection();
    }

    pub fn select_all(&mut self) {
        self.selection = self.nodes.iter().map(|n| n.id.clone()).collect();
        self.emit_selection();
    }

    /// Remove every selected node; returns how many were removed
    pub fn delete_selection(&mut self) -> usize {
        let doomed = std::mem::take(&mut self.selection);
        let removed = doomed.iter().filter(|id| self.remove_node(id)).count();
        self.emit_selection();
        removed
    }

    /// Move selected nodes so they share the extreme coordinate of `edge`
    pub fn align_selection(&mut self, edge: AlignEdge) -> bool {
        let selected: HashSet<&str> = self.selection.iter().map(|s| s.as_str()).collect();
        let values = self
            .nodes
            .iter()
            .filter(|n| selected.contains(n.id.as_str()))
            .map(|n| match edge {
                AlignEdge::Left | AlignEdge::Right => n.position.x,
                AlignEdge::Top | AlignEdge::Bottom => n.position.y,
            });
        let target = match edge {
            AlignEdge::Left | AlignEdge::Top => values.fold(None, |acc: Option<f64>, v| {
                Some(acc.map_or(v, |a| a.min(v)))
            }),
            AlignEdge::Right | AlignEdge::Bottom => values.fold(None, |acc: Option<f64>, v| {
                Some(acc.map_or(v, |a| a.max(v)))
            }),
        };
        let Some(target) = target else {
            return false;
        };

        let mut updated = Vec::new();
        for node in self.nodes.iter_mut() {
            if !selected.contains(node.id.as_str()) {
                continue;
            }
            match edge {
                AlignEdge::Left | AlignEdge::Right => node.position.x = target,
                AlignEdge::Top | AlignEdge::Bottom => node.position.y = target,
            }
            updated.push(node.id.clone());
        }
        for node_id in updated {
            self.emit(GraphEvent::NodeUpdated { node_id });
        }
        true
    }

    // =========================================================================
    // History
    // =========================================================================

    /// Push the current nodes and edges onto the undo stack
    ///
    /// Call immediately before a mutating user action. Clears redo.
    pub fn save_history(&mut self) -> bool {
        let snapshot = self.snapshot();
        match self.history.push(&snapshot) {
            Ok(()) => true,
            Err(e) => {
                log::error!("Failed to record history snapshot: {}", e);
                false
            }
        }
    }

    pub fn undo(&mut self) -> bool {
        let current = self.snapshot();
        match self.history.undo(&current) {
            Some(Ok(snapshot)) => {
                self.restore(snapshot);
                true
            }
            Some(Err(e)) => {
                log::error!("Failed to restore undo snapshot: {}", e);
                false
            }
            None => false,
        }
    }

    pub fn redo(&mut self) -> bool {
        let current = self.snapshot();
        match self.history.redo(&current) {
            Some(Ok(snapshot)) => {
                self.restore(snapshot);
                true
            }
            Some(Err(e)) => {
                log::error!("Failed to restore redo snapshot: {}", e);
                false
            }
            None => false,
        }
    }

    pub fn clear_history(&mut self) {
        self.history.clear();
    }

    fn restore(&mut self, snapshot: GraphSnapshot) {
        self.nodes = snapshot.nodes;
        self.edges = snapshot.edges;
        let before = self.selection.len();
        let nodes = &self.nodes;
        self.selection.retain(|s| nodes.iter().any(|n| &n.id == s));
        self.emit(GraphEvent::HistoryRestored);
        if self.selection.len() != before {
            self.emit_selection();
        }
    }

    // =========================================================================
    // Clipboard
    // =========================================================================

    /// Copy nodes, and the edges between them, to the clipboard
    ///
    /// Returns the number of nodes copied.
    pub fn copy(&mut self, ids: &[NodeId]) -> usize {
        let wanted: HashSet<&str> = ids.iter().map(|s| s.as_str()).collect();
        let nodes: Vec<Node> = self
            .nodes
            .iter()
            .filter(|n| wanted.contains(n.id.as_str()))
            .cloned()
            .collect();
        let inside: HashSet<&str> = nodes.iter().map(|n| n.id.as_str()).collect();
        let edges: Vec<Edge> = self
            .edges
            .iter()
            .filter(|e| {
                inside.contains(e.source_node_id.as_str())
                    && inside.contains(e.target_node_id.as_str())
            })
            .cloned()
            .collect();

        let count = nodes.len();
        self.clipboard = if count == 0 {
            None
        } else {
            Some(GraphSnapshot { nodes, edges })
        };
        count
    }

    pub fn copy_selection(&mut self) -> usize {
        let ids = self.selection.clone();
        self.copy(&ids)
    }

    /// Paste the clipboard with fresh ids, offset from the originals
    ///
    /// Pasted nodes become the selection. Returns the new node ids.
    pub fn paste(&mut self) -> Vec<NodeId> {
        let Some(clipboard) = self.clipboard.clone() else {
            return Vec::new();
        };

        let mut renamed: BTreeMap<String, String> = BTreeMap::new();
        let mut pasted = Vec::with_capacity(clipboard.nodes.len());
        for mut node in clipboard.nodes {
            let new_id = fresh_id("node");
            renamed.insert(node.id.clone(), new_id.clone());
            node.id = new_id.clone();
            node.position = node.position.offset(PASTE_OFFSET, PASTE_OFFSET);
            self.nodes.push(node);
            self.emit(GraphEvent::NodeAdded {
                node_id: new_id.clone(),
            });
            pasted.push(new_id);
        }

        for mut edge in clipboard.edges {
            let (Some(source), Some(target)) = (
                renamed.get(&edge.source_node_id),
                renamed.get(&edge.target_node_id),
            ) else {
                continue;
            };
            edge.id = fresh_id("edge");
            edge.source_node_id = source.clone();
            edge.target_node_id = target.clone();
            let edge_id = edge.id.clone();
            self.edges.push(edge);
            self.emit(GraphEvent::EdgeAdded { edge_id });
        }

        self.selection = pasted.clone();
        self.emit_selection();
        pasted
    }

    // =========================================================================
    // Composites
    // =========================================================================

    /// Candidate interface pins for a selection of the current graph
    pub fn boundary(&self, ids: &[NodeId]) -> std::result::Result<Boundary, ExtractError> {
        find_boundary(ids, &self.nodes, &self.edges)
    }

    /// Extract a composite from the current graph without committing it
    pub fn extract(
        &self,
        ids: &[NodeId],
        draft: &CompositeDraft,
        interface: &InterfaceSelection,
    ) -> std::result::Result<ExtractionResult, ExtractError> {
        extract_composite(ids, &self.nodes, &self.edges, draft, interface)
    }

    /// Commit a composite definition; refused if it does not validate
    pub fn register_composite(
        &mut self,
        composite: Composite,
    ) -> std::result::Result<(), Vec<ValidationError>> {
        let errors = validate_composite(&composite);
        if !errors.is_empty() {
            log::warn!(
                "Refused composite '{}': {} validation errors",
                composite.id,
                errors.len()
            );
            return Err(errors);
        }
        let composite_id = composite.id.clone();
        self.composites.insert(composite_id.clone(), composite);
        self.emit(GraphEvent::CompositeRegistered { composite_id });
        Ok(())
    }

    /// Drop a composite definition; instances keep their dangling reference
    pub fn remove_composite(&mut self, id: &str) -> Option<Composite> {
        let removed = self.composites.remove(id)?;
        self.emit(GraphEvent::CompositeRemoved {
            composite_id: id.to_string(),
        });
        Some(removed)
    }

    pub fn composite(&self, id: &str) -> Option<&Composite> {
        self.composites.get(id)
    }

    pub fn composites(&self) -> impl Iterator<Item = &Composite> {
        self.composites.values()
    }

    /// Place a node that instantiates a registered composite
    pub fn instantiate_composite(&mut self, composite_id: &str, position: Position) -> Result<NodeId> {
        let composite = self
            .composites
            .get(composite_id)
            .ok_or_else(|| PipelineError::CompositeNotFound(composite_id.to_string()))?;
        let node = instance_node(composite, fresh_id("node"), position);
        let node_id = node.id.clone();
        self.nodes.push(node);
        self.emit(GraphEvent::NodeAdded {
            node_id: node_id.clone(),
        });
        Ok(node_id)
    }

    // =========================================================================
    // Layout
    // =========================================================================

    /// Lay out the whole graph; returns the number of nodes moved
    pub fn apply_layout(&mut self, options: &LayoutOptions) -> usize {
        let laid_out = compute_layout(&self.nodes, &self.edges, options);
        self.commit_positions(laid_out)
    }

    /// Lay out only the selected nodes, using the edges among them
    pub fn layout_selection(&mut self, options: &LayoutOptions) -> usize {
        let selected: HashSet<&str> = self.selection.iter().map(|s| s.as_str()).collect();
        let nodes: Vec<Node> = self
            .nodes
            .iter()
            .filter(|n| selected.contains(n.id.as_str()))
            .cloned()
            .collect();
        let edges: Vec<Edge> = self
            .edges
            .iter()
            .filter(|e| {
                selected.contains(e.source_node_id.as_str())
                    && selected.contains(e.target_node_id.as_str())
            })
            .cloned()
            .collect();
        let laid_out = compute_layout(&nodes, &edges, options);
        self.commit_positions(laid_out)
    }

    fn commit_positions(&mut self, laid_out: Vec<Node>) -> usize {
        let positions: BTreeMap<NodeId, Position> =
            laid_out.into_iter().map(|n| (n.id, n.position)).collect();
        let mut moved = 0;
        for node in self.nodes.iter_mut() {
            if let Some(position) = positions.get(&node.id) {
                node.position = *position;
                moved += 1;
            }
        }
        if moved > 0 {
            self.emit(GraphEvent::LayoutApplied { node_count: moved });
        }
        moved
    }

    // =========================================================================
    // Pipeline definitions
    // =========================================================================

    pub fn to_definition(&self, name: impl Into<String>, description: impl Into<String>) -> PipelineDefinition {
        PipelineDefinition {
            id: None,
            name: name.into(),
            description: description.into(),
            nodes: self.nodes.clone(),
            edges: self.edges.clone(),
        }
    }

    /// Replace the graph with a loaded definition
    ///
    /// The definition must validate; history and selection are cleared.
    pub fn load_definition(&mut self, definition: PipelineDefinition) -> Result<()> {
        let errors = validate_graph(&definition.nodes, &definition.edges);
        if let Some(first) = errors.first() {
            return Err(PipelineError::InvalidDefinition(format!(
                "{} ({} problems)",
                first,
                errors.len()
            )));
        }
        self.nodes = definition.nodes;
        self.edges = definition.edges;
        self.selection.clear();
        self.history.clear();
        self.clipboard = None;
        self.emit(GraphEvent::HistoryRestored);
        self.emit_selection();
        Ok(())
    }

    // =========================================================================
    // Execution status
    // =========================================================================

    /// Fold an inbound execution event into the status view
    pub fn apply_execution_event(&mut self, event: &ExecutionEvent) -> bool {
        let changed = self.execution.apply(event);
        if changed {
            self.emit(GraphEvent::ExecutionUpdated);
        }
        changed
    }
}

impl Default for GraphStore {
    fn default() -> Self {
        Self::new()
    }
}

fn fresh_id(prefix: &str) -> String {
    format!("{}-{}", prefix, uuid::Uuid::new_v4())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::VecEventSink;
    use crate::execution::NodeStatus;
    use crate::types::{NodeKind, PinType};

    fn number_source(id: &str) -> Node {
        Node::new(id, NodeKind::Variable, id).with_output("out", PinType::Number)
    }

    fn text_sink(id: &str) -> Node {
        Node::new(id, NodeKind::Function, id)
            .with_input("in", PinType::String)
            .with_output("out", PinType::String)
    }

    fn flag_sink(id: &str) -> Node {
        Node::new(id, NodeKind::Device, id).with_input("enabled", PinType::Boolean)
    }

    fn store_with(nodes: Vec<Node>) -> GraphStore {
        let mut store = GraphStore::new();
        for node in nodes {
            store.add_node(node).unwrap();
        }
        store
    }

    #[test]
    fn test_connect_scenario() {
        let mut store = store_with(vec![number_source("n1"), text_sink("n2"), flag_sink("n3")]);

        assert!(store.connect("n1", "out", "n2", "in").is_ok());
        assert_eq!(store.edges().len(), 1);

        // An input pin cannot act as a source
        let refused = store.connect("n2", "in", "n3", "enabled").unwrap_err();
        assert_eq!(
            refused,
            ConnectRefusal::UnknownPin {
                node_id: "n2".to_string(),
                pin: "in".to_string()
            }
        );
        // Nor may a string feed a boolean
        let refused = store.connect("n2", "out", "n3", "enabled").unwrap_err();
        assert_eq!(
            refused,
            ConnectRefusal::IncompatibleTypes {
                source_type: PinType::String,
                target_type: PinType::Boolean
            }
        );
        assert_eq!(store.edges().len(), 1);
    }

    #[test]
    fn test_edge_refusals() {
        let mut store = store_with(vec![number_source("a"), text_sink("b"), number_source("c")]);
        store.add_edge(Edge::new("e1", "a", "out", "b", "in")).unwrap();

        assert_eq!(
            store.add_edge(Edge::new("e2", "a", "out", "b", "in")).unwrap_err(),
            ConnectRefusal::Duplicate
        );
        assert!(matches!(
            store.add_edge(Edge::new("e3", "c", "out", "b", "in")).unwrap_err(),
            ConnectRefusal::InputOccupied { .. }
        ));
        assert_eq!(
            store.add_edge(Edge::new("e4", "ghost", "out", "b", "in")).unwrap_err(),
            ConnectRefusal::UnknownNode("ghost".to_string())
        );
        assert_eq!(store.edges().len(), 1);
    }

    #[test]
    fn test_duplicate_node_id_refused() {
        let mut store = store_with(vec![number_source("a")]);
        assert_eq!(
            store.add_node(text_sink("a")).unwrap_err(),
            NodeRefusal::DuplicateId("a".to_string())
        );
        assert_eq!(store.nodes().len(), 1);
    }

    #[test]
    fn test_remove_node_cascades_edges() {
        let mut store = store_with(vec![number_source("a"), text_sink("b"), text_sink("c")]);
        store.connect("a", "out", "b", "in").unwrap();
        store.connect("b", "out", "c", "in").unwrap();
        store.set_selection(&["b".to_string(), "c".to_string()]);

        assert!(store.remove_node("b"));
        assert!(store.edges().is_empty());
        assert_eq!(store.selection(), &["c".to_string()]);

        // Idempotent
        assert!(!store.remove_node("b"));
        assert!(!store.remove_edge("missing"));
    }

    #[test]
    fn test_update_node_data() {
        let mut store = store_with(vec![number_source("a")]);
        let mut config = NodeConfig::new();
        config.insert("value".to_string(), serde_json::json!(5));

        assert!(store.update_node_data("a", NodeUpdate::label("Five")));
        assert!(store.update_node_data("a", NodeUpdate::config(config.clone())));
        let node = store.node("a").unwrap();
        assert_eq!(node.label, "Five");
        assert_eq!(node.config, config);

        assert!(!store.update_node_data("ghost", NodeUpdate::label("x")));
    }

    #[test]
    fn test_selection_stays_subset() {
        let mut store = store_with(vec![number_source("a"), number_source("b")]);
        store.set_selection(&["a".to_string(), "ghost".to_string(), "a".to_string()]);
        assert_eq!(store.selection(), &["a".to_string()]);

        store.toggle_selection("b");
        store.toggle_selection("a");
        store.toggle_selection("ghost");
        assert_eq!(store.selection(), &["b".to_string()]);

        store.clear_selection();
        assert!(store.selection().is_empty());
    }

    #[test]
    fn test_undo_redo_round_trip() {
        let mut store = store_with(vec![number_source("a"), text_sink("b")]);
        let original = store.snapshot();

        let mut states = vec![original.clone()];
        for i in 0..4 {
            store.save_history();
            store.add_node(text_sink(&format!("extra{}", i))).unwrap();
            if i == 1 {
                store.connect("a", "out", "b", "in").unwrap();
            }
            states.push(store.snapshot());
        }

        for expected in states.iter().rev().skip(1) {
            assert!(store.undo());
            assert_eq!(&store.snapshot(), expected);
        }
        assert_eq!(store.snapshot(), original);
        assert!(!store.undo());

        let before_redo = store.snapshot();
        assert!(store.redo());
        assert_eq!(store.snapshot(), states[1]);
        assert!(store.undo());
        assert_eq!(store.snapshot(), before_redo);
    }

    #[test]
    fn test_redo_restores_state_before_undo() {
        let mut store = store_with(vec![number_source("a")]);
        store.save_history();
        store.move_node("a", Position::new(10.0, 10.0));
        let before_undo = store.snapshot();

        store.undo();
        assert_eq!(store.node("a").unwrap().position, Position::default());
        store.redo();
        assert_eq!(store.snapshot(), before_undo);
    }

    #[test]
    fn test_history_depth_is_bounded() {
        let mut store = GraphStore::with_history_depth(2);
        for i in 0..5 {
            store.save_history();
            store.add_node(number_source(&format!("n{}", i))).unwrap();
        }
        assert!(store.undo());
        assert!(store.undo());
        assert!(!store.undo());
        assert_eq!(store.nodes().len(), 3);
    }

    #[test]
    fn test_copy_paste() {
        let mut store = store_with(vec![
            number_source("a").at(10.0, 20.0),
            text_sink("b"),
            text_sink("c"),
        ]);
        store.connect("a", "out", "b", "in").unwrap();
        store.connect("b", "out", "c", "in").unwrap();

        assert_eq!(store.copy(&["a".to_string(), "b".to_string()]), 2);
        let pasted = store.paste();

        assert_eq!(pasted.len(), 2);
        assert_eq!(store.nodes().len(), 5);
        // Only the a->b edge is inside the copied set
        assert_eq!(store.edges().len(), 3);
        assert_eq!(store.selection(), pasted.as_slice());

        let copy_of_a = store.node(&pasted[0]).unwrap();
        assert_ne!(copy_of_a.id, "a");
        assert_eq!(copy_of_a.position, Position::new(10.0 + PASTE_OFFSET, 20.0 + PASTE_OFFSET));

        let new_edge = store.edges().last().unwrap();
        assert_eq!(new_edge.source_node_id, pasted[0]);
        assert_eq!(new_edge.target_node_id, pasted[1]);
    }

    #[test]
    fn test_align_selection() {
        let mut store = store_with(vec![
            number_source("a").at(10.0, 5.0),
            number_source("b").at(40.0, -20.0),
            number_source("c").at(0.0, 99.0),
        ]);
        store.set_selection(&["a".to_string(), "b".to_string()]);

        assert!(store.align_selection(AlignEdge::Right));
        assert_eq!(store.node("a").unwrap().position.x, 40.0);
        assert_eq!(store.node("b").unwrap().position.x, 40.0);

        assert!(store.align_selection(AlignEdge::Top));
        assert_eq!(store.node("a").unwrap().position.y, -20.0);
        assert_eq!(store.node("b").unwrap().position.y, -20.0);
        // Unselected nodes stay put
        assert_eq!(store.node("c").unwrap().position, Position::new(0.0, 99.0));

        store.clear_selection();
        assert!(!store.align_selection(AlignEdge::Left));
    }

    #[test]
    fn test_composite_register_and_instantiate() {
        let mut store = store_with(vec![number_source("a"), text_sink("b")]);
        store.connect("a", "out", "b", "in").unwrap();
        let ids = vec!["a".to_string(), "b".to_string()];

        let boundary = store.boundary(&ids).unwrap();
        let result = store
            .extract(&ids, &CompositeDraft::new("Format"), &InterfaceSelection::all(&boundary))
            .unwrap();
        // Extraction does not touch the graph
        assert_eq!(store.nodes().len(), 2);

        let composite_id = result.composite.id.clone();
        store.register_composite(result.composite).unwrap();
        let node_id = store
            .instantiate_composite(&composite_id, Position::new(1.0, 2.0))
            .unwrap();

        let node = store.node(&node_id).unwrap();
        assert_eq!(node.composite_ref.as_deref(), Some(composite_id.as_str()));
        assert_eq!(node.outputs.len(), 1);

        assert!(matches!(
            store.instantiate_composite("missing", Position::default()),
            Err(PipelineError::CompositeNotFound(_))
        ));
    }

    #[test]
    fn test_apply_layout_moves_nodes() {
        let mut store = store_with(vec![number_source("a"), text_sink("b")]);
        store.connect("a", "out", "b", "in").unwrap();

        let moved = store.apply_layout(&LayoutOptions::default().with_anchor(Position::default()));
        assert_eq!(moved, 2);
        let a = store.node("a").unwrap().position;
        let b = store.node("b").unwrap().position;
        assert!(b.x > a.x);
    }

    #[test]
    fn test_load_definition_validates() {
        let mut store = GraphStore::new();
        let bad = PipelineDefinition {
            id: None,
            name: "bad".to_string(),
            description: String::new(),
            nodes: vec![number_source("a")],
            edges: vec![Edge::new("e1", "a", "out", "ghost", "in")],
        };
        assert!(store.load_definition(bad).is_err());
        assert!(store.nodes().is_empty());

        let source = store_with(vec![number_source("a"), text_sink("b")]);
        let mut definition = source.to_definition("good", "");
        definition.edges.push(Edge::new("e1", "a", "out", "b", "in"));
        store.save_history();
        store.load_definition(definition).unwrap();
        assert_eq!(store.nodes().len(), 2);
        assert!(!store.can_undo());
    }

    #[test]
    fn test_observers_see_applied_changes_only() {
        let sink = Arc::new(VecEventSink::new());
        let mut store = GraphStore::new();
        store.subscribe(sink.clone());

        store.add_node(number_source("a")).unwrap();
        store.add_node(flag_sink("b")).unwrap();
        let _ = store.connect("a", "out", "b", "enabled");

        let events = sink.events();
        assert_eq!(events.len(), 2);
        assert!(matches!(events[0], GraphEvent::NodeAdded { .. }));
    }

    #[test]
    fn test_execution_events_reach_status_view() {
        let mut store = store_with(vec![number_source("a")]);
        store.apply_execution_event(&ExecutionEvent::PipelineStarted {
            pipeline_id: "p".to_string(),
            total_nodes: 1,
        });
        store.apply_execution_event(&ExecutionEvent::NodeExecuting {
            node_id: "a".to_string(),
            label: "a".to_string(),
        });
        assert_eq!(store.execution().status("a"), NodeStatus::Executing);
    }

    #[test]
    fn test_shared_store_single_writer() {
        let shared = store_with(vec![number_source("a")]).into_shared();
        let snapshot = shared.read().snapshot();
        shared.write().remove_node("a");
        assert_eq!(snapshot.nodes.len(), 1);
        assert!(shared.read().nodes().is_empty());
    }
}
