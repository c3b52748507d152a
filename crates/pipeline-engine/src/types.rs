//! Core types for pipeline graphs
//!
//! These types define the structure of pipeline graphs: typed pins,
//! nodes, edges, and the composite definitions that package a subgraph
//! behind an inferred interface.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Unique identifier for a node
pub type NodeId = String;

/// Unique identifier for an edge
pub type EdgeId = String;

/// Unique identifier for a composite definition
pub type CompositeId = String;

/// Per-node configuration values
pub type NodeConfig = BTreeMap<String, serde_json::Value>;

/// The data type carried by a pin
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PinType {
    /// Control-flow pulse with no payload
    Trigger,
    /// Numeric value
    Number,
    /// Text string
    String,
    /// Boolean value
    Boolean,
    /// Image data
    Image,
    /// Accepts any type
    Any,
}

impl PinType {
    /// Every pin type, in declaration order
    pub const ALL: [PinType; 6] = [
        PinType::Trigger,
        PinType::Number,
        PinType::String,
        PinType::Boolean,
        PinType::Image,
        PinType::Any,
    ];

    /// Check if an output of this type may feed an input of `target` type
    ///
    /// The relation is asymmetric: numbers widen to strings, strings never
    /// narrow to numbers.
    pub fn is_compatible_with(&self, target: &PinType) -> bool {
        // Any type is compatible with everything
        if matches!(self, PinType::Any) || matches!(target, PinType::Any) {
            return true;
        }

        if matches!(self, PinType::Number) && matches!(target, PinType::String) {
            return true;
        }

        // Exact type match
        self == target
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PinType::Trigger => "trigger",
            PinType::Number => "number",
            PinType::String => "string",
            PinType::Boolean => "boolean",
            PinType::Image => "image",
            PinType::Any => "any",
        }
    }
}

impl fmt::Display for PinType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Free-function form of [`PinType::is_compatible_with`]
pub fn is_compatible(source: PinType, target: PinType) -> bool {
    source.is_compatible_with(&target)
}

/// A typed input or output port on a node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pin {
    pub name: String,
    #[serde(rename = "type")]
    pub pin_type: PinType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl Pin {
    pub fn new(name: impl Into<String>, pin_type: PinType) -> Self {
        Self {
            name: name.into(),
            pin_type,
            description: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// What a node represents on the canvas
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    Function,
    Device,
    Composite,
    ForLoop,
    WhileLoop,
    Variable,
    Comment,
}

/// Canvas coordinates
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

impl Position {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn offset(self, dx: f64, dy: f64) -> Self {
        Self {
            x: self.x + dx,
            y: self.y + dy,
        }
    }

    /// Arithmetic mean of a set of positions, or `None` when empty
    pub fn centroid<'a>(positions: impl IntoIterator<Item = &'a Position>) -> Option<Position> {
        let mut count = 0usize;
        let mut sum_x = 0.0;
        let mut sum_y = 0.0;
        for p in positions {
            count += 1;
            sum_x += p.x;
            sum_y += p.y;
        }
        if count == 0 {
            return None;
        }
        let n = count as f64;
        Some(Position::new(sum_x / n, sum_y / n))
    }
}

/// A node instance in a pipeline graph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Node {
    /// Unique identifier for this node instance
    pub id: NodeId,
    pub kind: NodeKind,
    pub position: Position,
    pub label: String,
    #[serde(default)]
    pub inputs: Vec<Pin>,
    #[serde(default)]
    pub outputs: Vec<Pin>,
    #[serde(default)]
    pub config: NodeConfig,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    /// Definition this node instantiates (composite-kind nodes only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub composite_ref: Option<CompositeId>,
}

impl Node {
    /// Create a node with no pins at the origin
    pub fn new(id: impl Into<String>, kind: NodeKind, label: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind,
            position: Position::default(),
            label: label.into(),
            inputs: Vec::new(),
            outputs: Vec::new(),
            config: NodeConfig::new(),
            category: None,
            color: None,
            composite_ref: None,
        }
    }

    pub fn at(mut self, x: f64, y: f64) -> Self {
        self.position = Position::new(x, y);
        self
    }

    pub fn with_input(mut self, name: impl Into<String>, pin_type: PinType) -> Self {
        self.inputs.push(Pin::new(name, pin_type));
        self
    }

    pub fn with_output(mut self, name: impl Into<String>, pin_type: PinType) -> Self {
        self.outputs.push(Pin::new(name, pin_type));
        self
    }

    pub fn with_config(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.config.insert(key.into(), value);
        self
    }

    pub fn find_input(&self, name: &str) -> Option<&Pin> {
        self.inputs.iter().find(|p| p.name == name)
    }

    pub fn find_output(&self, name: &str) -> Option<&Pin> {
        self.outputs.iter().find(|p| p.name == name)
    }
}

/// A directed connection from an output pin to an input pin
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Edge {
    pub id: EdgeId,
    pub source_node_id: NodeId,
    pub source_pin: String,
    pub target_node_id: NodeId,
    pub target_pin: String,
    /// Rendering hint passed through untouched
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub style_hint: Option<String>,
}

impl Edge {
    pub fn new(
        id: impl Into<String>,
        source_node_id: impl Into<String>,
        source_pin: impl Into<String>,
        target_node_id: impl Into<String>,
        target_pin: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            source_node_id: source_node_id.into(),
            source_pin: source_pin.into(),
            target_node_id: target_node_id.into(),
            target_pin: target_pin.into(),
            style_hint: None,
        }
    }

    /// Check whether two edges join the same pair of pins
    pub fn same_endpoints(&self, other: &Edge) -> bool {
        self.source_node_id == other.source_node_id
            && self.source_pin == other.source_pin
            && self.target_node_id == other.target_node_id
            && self.target_pin == other.target_pin
    }

    pub fn touches(&self, node_id: &str) -> bool {
        self.source_node_id == node_id || self.target_node_id == node_id
    }
}

/// Point-in-time copy of the graph content
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphSnapshot {
    pub nodes: Vec<Node>,
    pub edges: Vec<Edge>,
}

impl GraphSnapshot {
    pub fn find_node(&self, id: &str) -> Option<&Node> {
        self.nodes.iter().find(|n| n.id == id)
    }
}

/// A `nodeId.pinName` reference into a composite subgraph
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PinRef {
    pub node_id: NodeId,
    pub pin: String,
}

impl PinRef {
    pub fn new(node_id: impl Into<String>, pin: impl Into<String>) -> Self {
        Self {
            node_id: node_id.into(),
            pin: pin.into(),
        }
    }

    /// Parse `nodeId.pinName`. The last dot separates the pin name.
    pub fn parse(key: &str) -> Option<Self> {
        let (node_id, pin) = key.rsplit_once('.')?;
        if node_id.is_empty() || pin.is_empty() {
            return None;
        }
        Some(Self::new(node_id, pin))
    }

    pub fn key(&self) -> String {
        format!("{}.{}", self.node_id, self.pin)
    }
}

impl fmt::Display for PinRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.node_id, self.pin)
    }
}

/// Nodes and edges owned by a composite definition
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Subgraph {
    pub nodes: Vec<Node>,
    pub edges: Vec<Edge>,
}

/// An input exposed on a composite's interface
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompositeInput {
    pub name: String,
    #[serde(rename = "type")]
    pub pin_type: PinType,
    /// `nodeId.pinName` inside the subgraph
    pub maps_to: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<serde_json::Value>,
}

/// An output exposed on a composite's interface
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompositeOutput {
    pub name: String,
    #[serde(rename = "type")]
    pub pin_type: PinType,
    /// `nodeId.pinName` inside the subgraph
    pub maps_from: String,
}

/// A named, persisted subgraph usable as a single node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Composite {
    pub id: CompositeId,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub subgraph: Subgraph,
    #[serde(default)]
    pub inputs: Vec<CompositeInput>,
    #[serde(default)]
    pub outputs: Vec<CompositeOutput>,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub color: String,
    #[serde(default = "default_version")]
    pub version: u32,
}

fn default_version() -> u32 {
    1
}

impl Composite {
    pub fn metadata(&self) -> CompositeMetadata {
        CompositeMetadata {
            id: self.id.clone(),
            name: self.name.clone(),
            description: self.description.clone(),
            category: self.category.clone(),
            color: self.color.clone(),
            version: self.version,
            node_count: self.subgraph.nodes.len(),
        }
    }

    /// Apply a partial update in place and bump the version
    pub fn apply_patch(&mut self, patch: &CompositePatch) {
        if let Some(name) = &patch.name {
            self.name = name.clone();
        }
        if let Some(description) = &patch.description {
            self.description = description.clone();
        }
        if let Some(category) = &patch.category {
            self.category = category.clone();
        }
        if let Some(color) = &patch.color {
            self.color = color.clone();
        }
        if let Some(subgraph) = &patch.subgraph {
            self.subgraph = subgraph.clone();
        }
        if let Some(inputs) = &patch.inputs {
            self.inputs = inputs.clone();
        }
        if let Some(outputs) = &patch.outputs {
            self.outputs = outputs.clone();
        }
        self.version += 1;
    }
}

/// Listing entry for a persisted composite
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompositeMetadata {
    pub id: CompositeId,
    pub name: String,
    pub description: String,
    pub category: String,
    pub color: String,
    pub version: u32,
    pub node_count: usize,
}

/// Partial update for a composite definition
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompositePatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subgraph: Option<Subgraph>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inputs: Option<Vec<CompositeInput>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outputs: Option<Vec<CompositeOutput>>,
}

/// A complete, saveable pipeline
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineDefinition {
    /// Assigned by the persistence service on first save
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub nodes: Vec<Node>,
    pub edges: Vec<Edge>,
}

impl PipelineDefinition {
    pub fn metadata(&self, id: impl Into<String>) -> PipelineMetadata {
        PipelineMetadata {
            id: id.into(),
            name: self.name.clone(),
            description: self.description.clone(),
            node_count: self.nodes.len(),
        }
    }
}

/// Listing entry for a persisted pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineMetadata {
    pub id: String,
    pub name: String,
    pub description: String,
    pub node_count: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn expected(source: PinType, target: PinType) -> bool {
        source == PinType::Any
            || target == PinType::Any
            || source == target
            || (source == PinType::Number && target == PinType::String)
    }

    #[test]
    fn test_pin_compatibility_truth_table() {
        for source in PinType::ALL {
            for target in PinType::ALL {
                assert_eq!(
                    is_compatible(source, target),
                    expected(source, target),
                    "{} -> {}",
                    source,
                    target
                );
            }
        }
    }

    #[test]
    fn test_pin_compatibility_is_asymmetric() {
        assert!(is_compatible(PinType::Number, PinType::String));
        assert!(!is_compatible(PinType::String, PinType::Number));
        assert!(is_compatible(PinType::Any, PinType::Boolean));
        assert!(is_compatible(PinType::Image, PinType::Any));
        assert!(!is_compatible(PinType::Trigger, PinType::Boolean));
    }

    #[test]
    fn test_pin_ref_parse() {
        let pin = PinRef::parse("node-1.value").unwrap();
        assert_eq!(pin.node_id, "node-1");
        assert_eq!(pin.pin, "value");
        assert_eq!(pin.key(), "node-1.value");

        let dotted = PinRef::parse("group.inner.out").unwrap();
        assert_eq!(dotted.node_id, "group.inner");
        assert_eq!(dotted.pin, "out");

        assert!(PinRef::parse("no-dot").is_none());
        assert!(PinRef::parse(".pin").is_none());
        assert!(PinRef::parse("node.").is_none());
    }

    #[test]
    fn test_node_wire_format() {
        let node = Node::new("n1", NodeKind::ForLoop, "Loop")
            .at(10.0, 20.0)
            .with_input("count", PinType::Number);
        let json = serde_json::to_value(&node).unwrap();

        assert_eq!(json["kind"], "for_loop");
        assert_eq!(json["inputs"][0]["type"], "number");
        assert_eq!(json["position"]["x"], 10.0);
        assert!(json.get("compositeRef").is_none());
    }

    #[test]
    fn test_composite_patch_bumps_version() {
        let mut composite = Composite {
            id: "c1".to_string(),
            name: "Old".to_string(),
            description: String::new(),
            subgraph: Subgraph::default(),
            inputs: Vec::new(),
            outputs: Vec::new(),
            category: "custom".to_string(),
            color: "#888888".to_string(),
            version: 1,
        };
        composite.apply_patch(&CompositePatch {
            name: Some("New".to_string()),
            ..Default::default()
        });
        assert_eq!(composite.name, "New");
        assert_eq!(composite.category, "custom");
        assert_eq!(composite.version, 2);
    }
}
