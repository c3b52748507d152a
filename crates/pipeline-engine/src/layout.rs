//! Layered automatic layout
//!
//! Nodes are assigned levels by a breadth-first relaxation that only
//! re-enqueues a node when its level strictly improves, which yields the
//! longest path from any root for acyclic graphs. Levels become columns
//! (or rows, top-to-bottom) and nodes within a level are stacked centered
//! on zero. The finished layout is translated so its centroid lands on an
//! anchor point.
//!
//! Genuine cycles terminate but their levels carry no meaning beyond a
//! stable ordering.

use std::collections::{BTreeMap, HashMap, VecDeque};

use serde::{Deserialize, Serialize};

use crate::types::{Edge, Node, NodeId, Position};

pub const NODE_WIDTH: f64 = 200.0;
pub const NODE_HEIGHT: f64 = 100.0;
pub const HORIZONTAL_SPACING: f64 = 100.0;
pub const VERTICAL_SPACING: f64 = 50.0;

/// Flow direction of the levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum LayoutDirection {
    /// Levels advance left to right
    #[default]
    #[serde(rename = "LR")]
    LeftToRight,
    /// Levels advance top to bottom
    #[serde(rename = "TB")]
    TopToBottom,
}

/// Layout parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LayoutOptions {
    #[serde(default)]
    pub direction: LayoutDirection,
    pub node_width: f64,
    pub node_height: f64,
    pub horizontal_spacing: f64,
    pub vertical_spacing: f64,
    /// Where the layout centroid lands; defaults to the input centroid
    #[serde(default)]
    pub anchor: Option<Position>,
}

impl Default for LayoutOptions {
    fn default() -> Self {
        Self {
            direction: LayoutDirection::default(),
            node_width: NODE_WIDTH,
            node_height: NODE_HEIGHT,
            horizontal_spacing: HORIZONTAL_SPACING,
            vertical_spacing: VERTICAL_SPACING,
            anchor: None,
        }
    }
}

impl LayoutOptions {
    pub fn with_direction(mut self, direction: LayoutDirection) -> Self {
        self.direction = direction;
        self
    }

    pub fn with_anchor(mut self, anchor: Position) -> Self {
        self.anchor = Some(anchor);
        self
    }
}

/// Adjacency over node indices; edges to unknown ids are ignored
struct Adjacency {
    incoming: Vec<Vec<usize>>,
    outgoing: Vec<Vec<usize>>,
}

impl Adjacency {
    fn build(nodes: &[Node], edges: &[Edge]) -> Self {
        let mut index: HashMap<&str, usize> = HashMap::with_capacity(nodes.len());
        for (i, node) in nodes.iter().enumerate() {
            index.entry(node.id.as_str()).or_insert(i);
        }

        let mut incoming = vec![Vec::new(); nodes.len()];
        let mut outgoing = vec![Vec::new(); nodes.len()];
        for edge in edges {
            let (Some(&s), Some(&t)) = (
                index.get(edge.source_node_id.as_str()),
                index.get(edge.target_node_id.as_str()),
            ) else {
                continue;
            };
            outgoing[s].push(t);
            incoming[t].push(s);
        }

        Self { incoming, outgoing }
    }

    fn is_connected(&self, i: usize) -> bool {
        !self.incoming[i].is_empty() || !self.outgoing[i].is_empty()
    }
}

/// Breadth-first level relaxation from `seeds` at `base`
///
/// A node's level only ever increases and never reaches `cap`, so each
/// node is updated a bounded number of times.
fn relax(
    seeds: &[usize],
    base: usize,
    cap: usize,
    adjacency: &Adjacency,
    levels: &mut [Option<usize>],
) {
    let mut queue: VecDeque<(usize, usize)> = seeds.iter().map(|&s| (s, base)).collect();

    while let Some((node, proposed)) = queue.pop_front() {
        if proposed >= cap {
            continue;
        }
        if levels[node].is_some_and(|current| proposed <= current) {
            continue;
        }
        levels[node] = Some(proposed);
        for &next in &adjacency.outgoing[node] {
            queue.push_back((next, proposed + 1));
        }
    }
}

fn next_level(levels: &[Option<usize>]) -> usize {
    levels.iter().flatten().max().map_or(0, |max| max + 1)
}

/// Level for every node, indexed like `nodes`
fn compute_levels(nodes: &[Node], adjacency: &Adjacency) -> Vec<usize> {
    let n = nodes.len();
    let mut levels: Vec<Option<usize>> = vec![None; n];

    let roots: Vec<usize> = (0..n)
        .filter(|&i| adjacency.incoming[i].is_empty() && !adjacency.outgoing[i].is_empty())
        .collect();
    relax(&roots, 0, n.max(1), adjacency, &mut levels);

    // Components with no root: re-seed past everything placed so far
    loop {
        let unreached: Vec<usize> = (0..n)
            .filter(|&i| adjacency.is_connected(i) && levels[i].is_none())
            .collect();
        let Some(&first) = unreached.first() else {
            break;
        };

        let mut seeds: Vec<usize> = unreached
            .iter()
            .copied()
            .filter(|&i| {
                adjacency.incoming[i]
                    .iter()
                    .all(|p| levels[*p].is_some() || !unreached.contains(p))
            })
            .collect();
        if seeds.is_empty() {
            seeds.push(first);
        }

        let base = next_level(&levels);
        relax(&seeds, base, base + n, adjacency, &mut levels);
    }

    // Fully isolated nodes trail everything else, one level each
    for i in 0..n {
        if levels[i].is_none() {
            levels[i] = Some(next_level(&levels));
        }
    }

    levels.into_iter().map(|l| l.unwrap_or(0)).collect()
}

/// Level assigned to each node id
pub fn assign_levels(nodes: &[Node], edges: &[Edge]) -> HashMap<NodeId, usize> {
    let adjacency = Adjacency::build(nodes, edges);
    let levels = compute_levels(nodes, &adjacency);
    let mut by_id = HashMap::with_capacity(nodes.len());
    for (node, level) in nodes.iter().zip(levels) {
        by_id.entry(node.id.clone()).or_insert(level);
    }
    by_id
}

/// Compute layered positions
///
/// Returns the input nodes in input order with only `position` replaced.
/// Identical inputs always produce identical positions.
pub fn compute_layout(nodes: &[Node], edges: &[Edge], options: &LayoutOptions) -> Vec<Node> {
    if nodes.is_empty() {
        return Vec::new();
    }

    let adjacency = Adjacency::build(nodes, edges);
    let levels = compute_levels(nodes, &adjacency);

    let mut by_level: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
    for (i, &level) in levels.iter().enumerate() {
        by_level.entry(level).or_default().push(i);
    }

    let (primary_step, secondary_step) = match options.direction {
        LayoutDirection::LeftToRight => (
            options.node_width + options.horizontal_spacing,
            options.node_height + options.vertical_spacing,
        ),
        LayoutDirection::TopToBottom => (
            options.node_height + options.vertical_spacing,
            options.node_width + options.horizontal_spacing,
        ),
    };

    let mut positions = vec![Position::default(); nodes.len()];
    for (level_index, members) in by_level.values().enumerate() {
        let primary = level_index as f64 * primary_step;
        let middle = (members.len() as f64 - 1.0) / 2.0;
        for (slot, &i) in members.iter().enumerate() {
            let secondary = (slot as f64 - middle) * secondary_step;
            positions[i] = match options.direction {
                LayoutDirection::LeftToRight => Position::new(primary, secondary),
                LayoutDirection::TopToBottom => Position::new(secondary, primary),
            };
        }
    }

    let produced = Position::centroid(positions.iter()).unwrap_or_default();
    let anchor = options
        .anchor
        .or_else(|| Position::centroid(nodes.iter().map(|n| &n.position)))
        .unwrap_or_default();
    let (dx, dy) = (anchor.x - produced.x, anchor.y - produced.y);

    nodes
        .iter()
        .zip(positions)
        .map(|(node, position)| {
            let mut node = node.clone();
            node.position = position.offset(dx, dy);
            node
        })
        .collect()
}
