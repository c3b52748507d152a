//! Composite extraction - turning a node selection into a reusable unit
//!
//! Extraction runs in two steps over a point-in-time snapshot:
//!
//! 1. [`find_boundary`] partitions the edges into internal and boundary
//!    edges and proposes candidate interface pins.
//! 2. [`extract_composite`] builds the [`Composite`] from the candidates the
//!    caller confirmed.
//!
//! Both are pure functions; nothing here touches the graph store.
//!
//! # Example
//!
//! ```ignore
//! let boundary = find_boundary(&selected, &snapshot.nodes, &snapshot.edges)?;
//! let interface = InterfaceSelection::all(&boundary);
//! let result = extract_composite(&selected, &snapshot.nodes, &snapshot.edges,
//!     &CompositeDraft::new("Scale"), &interface)?;
//! ```

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::error::ExtractError;
use crate::types::{
    Composite, CompositeInput, CompositeOutput, Edge, EdgeId, Node, NodeId, NodeKind, Pin,
    PinRef, PinType, Position, Subgraph,
};
use crate::validation::MIN_COMPOSITE_NODES;

/// Category assigned when the draft does not name one
pub const DEFAULT_CATEGORY: &str = "composites";

/// Color assigned when the draft does not name one
pub const DEFAULT_COLOR: &str = "#6366f1";

/// A pin that could become part of the composite interface
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CandidatePin {
    /// `nodeId.pinName`
    pub key: String,
    pub node_id: NodeId,
    pub pin: String,
    pub pin_type: PinType,
    /// Label of the owning node, for display
    pub node_label: String,
    /// Whether an edge currently crosses the selection boundary at this pin
    pub externally_connected: bool,
}

/// Internal/boundary split of a selection
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Boundary {
    /// Selected nodes that exist in the graph, in graph order
    pub node_ids: Vec<NodeId>,
    pub internal_edge_ids: Vec<EdgeId>,
    pub boundary_edge_ids: Vec<EdgeId>,
    pub inputs: Vec<CandidatePin>,
    pub outputs: Vec<CandidatePin>,
}

impl Boundary {
    pub fn input(&self, key: &str) -> Option<&CandidatePin> {
        self.inputs.iter().find(|c| c.key == key)
    }

    pub fn output(&self, key: &str) -> Option<&CandidatePin> {
        self.outputs.iter().find(|c| c.key == key)
    }
}

/// Name and presentation for a composite being created
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CompositeDraft {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub color: Option<String>,
}

impl CompositeDraft {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }
}

/// A candidate pin the caller chose to expose
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfirmedPin {
    /// Candidate key (`nodeId.pinName`)
    pub key: String,
    /// Interface name; defaults to the pin name
    #[serde(default)]
    pub name: Option<String>,
    /// Default value (inputs only)
    #[serde(default)]
    pub default: Option<serde_json::Value>,
}

impl ConfirmedPin {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            name: None,
            default: None,
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_default(mut self, value: serde_json::Value) -> Self {
        self.default = Some(value);
        self
    }
}

/// The caller-confirmed subset of the boundary candidates
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InterfaceSelection {
    pub inputs: Vec<ConfirmedPin>,
    pub outputs: Vec<ConfirmedPin>,
}

impl InterfaceSelection {
    /// Confirm every candidate
    pub fn all(boundary: &Boundary) -> Self {
        Self {
            inputs: boundary.inputs.iter().map(|c| ConfirmedPin::new(&c.key)).collect(),
            outputs: boundary.outputs.iter().map(|c| ConfirmedPin::new(&c.key)).collect(),
        }
    }

    /// Confirm only the candidates that currently carry a boundary edge
    pub fn connected_only(boundary: &Boundary) -> Self {
        Self {
            inputs: boundary
                .inputs
                .iter()
                .filter(|c| c.externally_connected)
                .map(|c| ConfirmedPin::new(&c.key))
                .collect(),
            outputs: boundary
                .outputs
                .iter()
                .filter(|c| c.externally_connected)
                .map(|c| ConfirmedPin::new(&c.key))
                .collect(),
        }
    }
}

/// Result of extracting a composite from a selection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractionResult {
    pub composite: Composite,
    /// Edges that were copied into the subgraph
    pub internal_edge_ids: Vec<EdgeId>,
    /// Edges crossing the selection boundary
    pub boundary_edge_ids: Vec<EdgeId>,
    /// Centroid of the extracted nodes, for placing an instance
    pub centroid: Position,
}

/// Compute internal edges and candidate interface pins for a selection
///
/// Candidates are decided per pin, not per node: an input pin is a
/// candidate when no internal edge targets it or when an edge from outside
/// the selection targets it; output pins follow the symmetric rule. Each
/// pin appears at most once.
pub fn find_boundary(
    selected: &[NodeId],
    nodes: &[Node],
    edges: &[Edge],
) -> Result<Boundary, ExtractError> {
    let requested: HashSet<&str> = selected.iter().map(|s| s.as_str()).collect();
    let members: Vec<&Node> = nodes
        .iter()
        .filter(|n| requested.contains(n.id.as_str()))
        .collect();

    if members.len() < MIN_COMPOSITE_NODES {
        return Err(ExtractError::TooFewNodes(members.len()));
    }

    let inside: HashSet<&str> = members.iter().map(|n| n.id.as_str()).collect();

    let mut internal_targets: HashSet<(&str, &str)> = HashSet::new();
    let mut internal_sources: HashSet<(&str, &str)> = HashSet::new();
    let mut external_targets: HashSet<(&str, &str)> = HashSet::new();
    let mut external_sources: HashSet<(&str, &str)> = HashSet::new();
    let mut internal_edge_ids = Vec::new();
    let mut boundary_edge_ids = Vec::new();

    for edge in edges {
        let source_inside = inside.contains(edge.source_node_id.as_str());
        let target_inside = inside.contains(edge.target_node_id.as_str());
        let source = (edge.source_node_id.as_str(), edge.source_pin.as_str());
        let target = (edge.target_node_id.as_str(), edge.target_pin.as_str());

        if source_inside && target_inside {
            internal_sources.insert(source);
            internal_targets.insert(target);
            internal_edge_ids.push(edge.id.clone());
        } else if source_inside {
            external_sources.insert(source);
            boundary_edge_ids.push(edge.id.clone());
        } else if target_inside {
            external_targets.insert(target);
            boundary_edge_ids.push(edge.id.clone());
        }
    }

    let mut inputs = Vec::new();
    let mut outputs = Vec::new();
    for node in &members {
        for pin in &node.inputs {
            let at = (node.id.as_str(), pin.name.as_str());
            let external = external_targets.contains(&at);
            if !internal_targets.contains(&at) || external {
                inputs.push(candidate(node, pin, external));
            }
        }
        for pin in &node.outputs {
            let at = (node.id.as_str(), pin.name.as_str());
            let external = external_sources.contains(&at);
            if !internal_sources.contains(&at) || external {
                outputs.push(candidate(node, pin, external));
            }
        }
    }

    Ok(Boundary {
        node_ids: members.iter().map(|n| n.id.clone()).collect(),
        internal_edge_ids,
        boundary_edge_ids,
        inputs,
        outputs,
    })
}

fn candidate(node: &Node, pin: &Pin, externally_connected: bool) -> CandidatePin {
    CandidatePin {
        key: PinRef::new(&node.id, &pin.name).key(),
        node_id: node.id.clone(),
        pin: pin.name.clone(),
        pin_type: pin.pin_type,
        node_label: node.label.clone(),
        externally_connected,
    }
}

/// Build a composite from a selection and the confirmed interface
///
/// The subgraph holds the selected nodes and the edges internal to them.
/// Only confirmed candidates are exposed, each mapped to its key.
pub fn extract_composite(
    selected: &[NodeId],
    nodes: &[Node],
    edges: &[Edge],
    draft: &CompositeDraft,
    interface: &InterfaceSelection,
) -> Result<ExtractionResult, ExtractError> {
    let name = draft.name.trim();
    if name.is_empty() {
        return Err(ExtractError::EmptyName);
    }

    let boundary = find_boundary(selected, nodes, edges)?;

    let mut input_names = HashSet::new();
    let mut inputs = Vec::with_capacity(interface.inputs.len());
    for confirmed in &interface.inputs {
        let candidate = boundary
            .input(&confirmed.key)
            .ok_or_else(|| ExtractError::NotACandidate(confirmed.key.clone()))?;
        let name = interface_name(confirmed, candidate, &boundary.inputs);
        if !input_names.insert(name.clone()) {
            return Err(ExtractError::DuplicateInterfaceName(name));
        }
        inputs.push(CompositeInput {
            name,
            pin_type: candidate.pin_type,
            maps_to: candidate.key.clone(),
            default: confirmed.default.clone(),
        });
    }

    let mut output_names = HashSet::new();
    let mut outputs = Vec::with_capacity(interface.outputs.len());
    for confirmed in &interface.outputs {
        let candidate = boundary
            .output(&confirmed.key)
            .ok_or_else(|| ExtractError::NotACandidate(confirmed.key.clone()))?;
        let name = interface_name(confirmed, candidate, &boundary.outputs);
        if !output_names.insert(name.clone()) {
            return Err(ExtractError::DuplicateInterfaceName(name));
        }
        outputs.push(CompositeOutput {
            name,
            pin_type: candidate.pin_type,
            maps_from: candidate.key.clone(),
        });
    }

    let inside: HashSet<&str> = boundary.node_ids.iter().map(|s| s.as_str()).collect();
    let sub_nodes: Vec<Node> = nodes
        .iter()
        .filter(|n| inside.contains(n.id.as_str()))
        .cloned()
        .collect();
    let internal: HashSet<&str> = boundary.internal_edge_ids.iter().map(|s| s.as_str()).collect();
    let sub_edges: Vec<Edge> = edges
        .iter()
        .filter(|e| internal.contains(e.id.as_str()))
        .cloned()
        .collect();

    let centroid = Position::centroid(sub_nodes.iter().map(|n| &n.position)).unwrap_or_default();

    let composite = Composite {
        id: format!("composite-{}", uuid::Uuid::new_v4()),
        name: name.to_string(),
        description: draft.description.clone(),
        subgraph: Subgraph {
            nodes: sub_nodes,
            edges: sub_edges,
        },
        inputs,
        outputs,
        category: draft
            .category
            .clone()
            .unwrap_or_else(|| DEFAULT_CATEGORY.to_string()),
        color: draft.color.clone().unwrap_or_else(|| DEFAULT_COLOR.to_string()),
        version: 1,
    };

    log::debug!(
        "Extracted composite '{}' with {} nodes, {} inputs, {} outputs",
        composite.name,
        composite.subgraph.nodes.len(),
        composite.inputs.len(),
        composite.outputs.len()
    );

    Ok(ExtractionResult {
        composite,
        internal_edge_ids: boundary.internal_edge_ids,
        boundary_edge_ids: boundary.boundary_edge_ids,
        centroid,
    })
}

/// Pin name unless another candidate on the same side shares it
fn interface_name(confirmed: &ConfirmedPin, candidate: &CandidatePin, side: &[CandidatePin]) -> String {
    if let Some(name) = &confirmed.name {
        return name.clone();
    }
    let shared = side
        .iter()
        .filter(|c| c.pin == candidate.pin)
        .nth(1)
        .is_some();
    if shared {
        format!("{}_{}", candidate.node_id, candidate.pin)
    } else {
        candidate.pin.clone()
    }
}

/// Create a composite-kind node exposing the composite's interface
///
/// The node references the definition; it never owns or mutates it.
pub fn instance_node(composite: &Composite, id: impl Into<String>, position: Position) -> Node {
    let mut node = Node::new(id, NodeKind::Composite, composite.name.clone());
    node.position = position;
    node.inputs = composite
        .inputs
        .iter()
        .map(|i| Pin::new(&i.name, i.pin_type))
        .collect();
    node.outputs = composite
        .outputs
        .iter()
        .map(|o| Pin::new(&o.name, o.pin_type))
        .collect();
    for input in &composite.inputs {
        if let Some(default) = &input.default {
            node.config.insert(input.name.clone(), default.clone());
        }
    }
    node.category = Some(composite.category.clone());
    node.color = Some(composite.color.clone());
    node.composite_ref = Some(composite.id.clone());
    node
}
