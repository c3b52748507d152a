//! Structural validation for pipeline graphs and composite definitions
//!
//! The graph store enforces these rules one mutation at a time; these
//! checks cover data that arrives wholesale (loaded definitions, remote
//! composites).

use std::collections::HashSet;

use crate::types::{Composite, CompositePatch, Edge, Node, PinRef, PinType};

/// Smallest subgraph a composite may wrap
pub const MIN_COMPOSITE_NODES: usize = 2;

/// Validation error with location context
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationError {
    /// Two nodes share an id
    DuplicateNodeId { node_id: String },
    /// An edge references a non-existent node
    UnknownNode { edge_id: String, node_id: String },
    /// An edge references a pin the node does not declare
    UnknownPin {
        edge_id: String,
        node_id: String,
        pin: String,
    },
    /// An edge connects incompatible pin types
    IncompatiblePinTypes {
        edge_id: String,
        source_type: PinType,
        target_type: PinType,
    },
    /// Two edges join the same pair of pins
    DuplicateEdge { edge_id: String },
    /// A composite interface entry does not resolve inside the subgraph
    UnresolvedMapping { name: String, reference: String },
    /// A composite name is empty or whitespace
    EmptyName,
    /// A composite subgraph holds fewer than two nodes
    TooFewNodes { count: usize },
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DuplicateNodeId { node_id } => write!(f, "Duplicate node id '{}'", node_id),
            Self::UnknownNode { edge_id, node_id } => {
                write!(f, "Edge '{}' references unknown node '{}'", edge_id, node_id)
            }
            Self::UnknownPin {
                edge_id,
                node_id,
                pin,
            } => write!(
                f,
                "Edge '{}' references unknown pin '{}' on node '{}'",
                edge_id, pin, node_id
            ),
            Self::IncompatiblePinTypes {
                edge_id,
                source_type,
                target_type,
            } => write!(
                f,
                "Edge '{}' connects incompatible types: {} -> {}",
                edge_id, source_type, target_type
            ),
            Self::DuplicateEdge { edge_id } => {
                write!(f, "Edge '{}' duplicates an existing connection", edge_id)
            }
            Self::UnresolvedMapping { name, reference } => write!(
                f,
                "Interface pin '{}' maps to '{}', which is not in the subgraph",
                name, reference
            ),
            Self::EmptyName => write!(f, "Composite name is empty"),
            Self::TooFewNodes { count } => write!(
                f,
                "Composite needs at least {} nodes, found {}",
                MIN_COMPOSITE_NODES, count
            ),
        }
    }
}

impl std::error::Error for ValidationError {}

/// Validate a node/edge set
///
/// Returns all validation errors found (not just the first).
pub fn validate_graph(nodes: &[Node], edges: &[Edge]) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    let mut seen = HashSet::new();
    for node in nodes {
        if !seen.insert(node.id.as_str()) {
            errors.push(ValidationError::DuplicateNodeId {
                node_id: node.id.clone(),
            });
        }
    }

    validate_edges(nodes, edges, &mut errors);
    errors
}

/// Validate a composite's subgraph and interface mappings
pub fn validate_composite(composite: &Composite) -> Vec<ValidationError> {
    let nodes = &composite.subgraph.nodes;
    let mut errors = Vec::new();
    if composite.name.trim().is_empty() {
        errors.push(ValidationError::EmptyName);
    }
    if nodes.len() < MIN_COMPOSITE_NODES {
        errors.push(ValidationError::TooFewNodes { count: nodes.len() });
    }
    errors.extend(validate_graph(nodes, &composite.subgraph.edges));

    for input in &composite.inputs {
        let resolved = PinRef::parse(&input.maps_to).and_then(|r| {
            nodes
                .iter()
                .find(|n| n.id == r.node_id)
                .and_then(|n| n.find_input(&r.pin))
        });
        if resolved.is_none() {
            errors.push(ValidationError::UnresolvedMapping {
                name: input.name.clone(),
                reference: input.maps_to.clone(),
            });
        }
    }

    for output in &composite.outputs {
        let resolved = PinRef::parse(&output.maps_from).and_then(|r| {
            nodes
                .iter()
                .find(|n| n.id == r.node_id)
                .and_then(|n| n.find_output(&r.pin))
        });
        if resolved.is_none() {
            errors.push(ValidationError::UnresolvedMapping {
                name: output.name.clone(),
                reference: output.maps_from.clone(),
            });
        }
    }

    errors
}

/// Check the fields a patch replaces wholesale
///
/// Interface mappings are resolved against the patched definition, so
/// callers re-run [`validate_composite`] on the result.
pub fn validate_patch(patch: &CompositePatch) -> Vec<ValidationError> {
    let mut errors = Vec::new();
    if patch.name.as_deref().is_some_and(|name| name.trim().is_empty()) {
        errors.push(ValidationError::EmptyName);
    }
    if let Some(subgraph) = &patch.subgraph {
        if subgraph.nodes.len() < MIN_COMPOSITE_NODES {
            errors.push(ValidationError::TooFewNodes {
                count: subgraph.nodes.len(),
            });
        }
        errors.extend(validate_graph(&subgraph.nodes, &subgraph.edges));
    }
    errors
}

fn validate_edges(nodes: &[Node], edges: &[Edge], errors: &mut Vec<ValidationError>) {
    let find = |id: &str| nodes.iter().find(|n| n.id == id);

    for (index, edge) in edges.iter().enumerate() {
        if edges[..index].iter().any(|e| e.same_endpoints(edge)) {
            errors.push(ValidationError::DuplicateEdge {
                edge_id: edge.id.clone(),
            });
        }

        let source = find(&edge.source_node_id);
        let target = find(&edge.target_node_id);
        if source.is_none() {
            errors.push(ValidationError::UnknownNode {
                edge_id: edge.id.clone(),
                node_id: edge.source_node_id.clone(),
            });
        }
        if target.is_none() {
            errors.push(ValidationError::UnknownNode {
                edge_id: edge.id.clone(),
                node_id: edge.target_node_id.clone(),
            });
        }
        let (Some(source), Some(target)) = (source, target) else {
            continue;
        };

        let source_pin = source.find_output(&edge.source_pin);
        let target_pin = target.find_input(&edge.target_pin);
        if source_pin.is_none() {
            errors.push(ValidationError::UnknownPin {
                edge_id: edge.id.clone(),
                node_id: source.id.clone(),
                pin: edge.source_pin.clone(),
            });
        }
        if target_pin.is_none() {
            errors.push(ValidationError::UnknownPin {
                edge_id: edge.id.clone(),
                node_id: target.id.clone(),
                pin: edge.target_pin.clone(),
            });
        }
        if let (Some(s), Some(t)) = (source_pin, target_pin) {
            if !s.pin_type.is_compatible_with(&t.pin_type) {
                errors.push(ValidationError::IncompatiblePinTypes {
                    edge_id: edge.id.clone(),
                    source_type: s.pin_type,
                    target_type: t.pin_type,
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{CompositeInput, CompositeOutput, NodeKind, Subgraph};

    fn nodes() -> Vec<Node> {
        vec![
            Node::new("a", NodeKind::Function, "A").with_output("out", PinType::String),
            Node::new("b", NodeKind::Function, "B").with_input("in", PinType::Number),
            Node::new("c", NodeKind::Function, "C").with_input("in", PinType::Any),
        ]
    }

    #[test]
    fn test_valid_graph() {
        let edges = vec![Edge::new("e1", "a", "out", "c", "in")];
        assert!(validate_graph(&nodes(), &edges).is_empty());
    }

    #[test]
    fn test_reports_every_problem() {
        let edges = vec![
            Edge::new("e1", "a", "out", "b", "in"),
            Edge::new("e2", "a", "missing", "c", "in"),
            Edge::new("e3", "ghost", "out", "c", "in"),
            Edge::new("e4", "a", "out", "b", "in"),
        ];
        let errors = validate_graph(&nodes(), &edges);

        assert!(errors.contains(&ValidationError::IncompatiblePinTypes {
            edge_id: "e1".to_string(),
            source_type: PinType::String,
            target_type: PinType::Number,
        }));
        assert!(errors.contains(&ValidationError::UnknownPin {
            edge_id: "e2".to_string(),
            node_id: "a".to_string(),
            pin: "missing".to_string(),
        }));
        assert!(errors.contains(&ValidationError::UnknownNode {
            edge_id: "e3".to_string(),
            node_id: "ghost".to_string(),
        }));
        assert!(errors.contains(&ValidationError::DuplicateEdge {
            edge_id: "e4".to_string(),
        }));
    }

    #[test]
    fn test_duplicate_node_ids() {
        let mut list = nodes();
        list.push(Node::new("a", NodeKind::Comment, "again"));
        let errors = validate_graph(&list, &[]);
        assert_eq!(
            errors,
            vec![ValidationError::DuplicateNodeId {
                node_id: "a".to_string()
            }]
        );
    }

    #[test]
    fn test_composite_mappings_must_resolve() {
        let composite = Composite {
            id: "c1".to_string(),
            name: "Broken".to_string(),
            description: String::new(),
            subgraph: Subgraph {
                nodes: nodes(),
                edges: Vec::new(),
            },
            inputs: vec![
                CompositeInput {
                    name: "ok".to_string(),
                    pin_type: PinType::Number,
                    maps_to: "b.in".to_string(),
                    default: None,
                },
                CompositeInput {
                    name: "bad".to_string(),
                    pin_type: PinType::Number,
                    maps_to: "a.in".to_string(),
                    default: None,
                },
            ],
            outputs: vec![CompositeOutput {
                name: "out".to_string(),
                pin_type: PinType::String,
                maps_from: "zzz".to_string(),
            }],
            category: String::new(),
            color: String::new(),
            version: 1,
        };

        let errors = validate_composite(&composite);
        assert_eq!(errors.len(), 2);
        assert!(errors.iter().all(|e| matches!(e, ValidationError::UnresolvedMapping { .. })));
    }

    #[test]
    fn test_composite_needs_name_and_two_nodes() {
        let composite = Composite {
            id: "c1".to_string(),
            name: "  ".to_string(),
            description: String::new(),
            subgraph: Subgraph {
                nodes: vec![Node::new("a", NodeKind::Function, "A")],
                edges: Vec::new(),
            },
            inputs: Vec::new(),
            outputs: Vec::new(),
            category: String::new(),
            color: String::new(),
            version: 1,
        };

        assert_eq!(
            validate_composite(&composite),
            vec![
                ValidationError::EmptyName,
                ValidationError::TooFewNodes { count: 1 },
            ]
        );
    }

    #[test]
    fn test_patch_rejects_blank_name_and_small_subgraph() {
        let patch = CompositePatch {
            name: Some(String::new()),
            subgraph: Some(Subgraph {
                nodes: vec![Node::new("a", NodeKind::Function, "A")],
                edges: Vec::new(),
            }),
            ..Default::default()
        };
        assert_eq!(
            validate_patch(&patch),
            vec![
                ValidationError::EmptyName,
                ValidationError::TooFewNodes { count: 1 },
            ]
        );

        let rename = CompositePatch {
            name: Some("Renamed".to_string()),
            ..Default::default()
        };
        assert!(validate_patch(&rename).is_empty());
    }
}
