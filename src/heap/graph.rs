// Decoded heap graph
//
// Two-pass build: the node walk records each node's first edge position
// from the running edge-count total, then the edge walk uses those explicit
// ranges so every edge carries its owning node. Nothing downstream has to
// re-derive ownership from array order.

use crate::error::{InspectError, Result};
use crate::heap::layout::{lookup, to_usize, EdgeLayout, NodeLayout, RawHeapSnapshot};
use crate::heap::retention::{self, Retainer, RetainingPath, RetentionIndex};
use crate::heap::summary::{HeapTypeSummary, TypeSizeSummary};
use serde::Serialize;
use std::collections::HashMap;
use std::fs;
use std::path::Path;

/// One object/allocation record
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HeapNode {
    /// Position in the node array (not the stable id)
    pub index: usize,
    pub id: u64,
    pub node_type: String,
    pub name: String,
    pub self_size: u64,
    pub edge_count: usize,
    /// Position of this node's first edge in the edge list
    pub first_edge: usize,
    pub trace_node_id: Option<u64>,
}

impl HeapNode {
    /// The synthetic node every retaining path terminates at
    pub fn is_gc_root(&self) -> bool {
        self.node_type == "synthetic" && self.name == "(GC roots)"
    }
}

/// Edge label: a property/variable name, or an element/hidden slot index
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum EdgeName {
    Name(String),
    Index(u64),
}

impl std::fmt::Display for EdgeName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EdgeName::Name(name) => write!(f, "{name}"),
            EdgeName::Index(index) => write!(f, "[{index}]"),
        }
    }
}

/// A directed reference from `from_node` to `to_node` (both node positions)
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HeapEdge {
    pub index: usize,
    pub edge_type: String,
    pub name_or_index: EdgeName,
    pub from_node: usize,
    pub to_node: usize,
}

/// Edge types whose `name_or_index` is a numeric slot rather than a string reference
fn is_indexed_edge(edge_type: &str) -> bool {
    matches!(edge_type, "element" | "hidden")
}

/// Decoder switches
#[derive(Debug, Clone, Copy)]
pub struct DecodeOptions {
    /// Build the reverse index needed by retaining-path queries
    pub build_retention_index: bool,
}

impl Default for DecodeOptions {
    fn default() -> Self {
        Self {
            build_retention_index: true,
        }
    }
}

impl DecodeOptions {
    /// Nodes and edges only; retaining-path queries will fail with `FeatureDisabled`
    pub fn without_retention() -> Self {
        Self {
            build_retention_index: false,
        }
    }
}

/// Immutable decoded heap snapshot
#[derive(Debug)]
pub struct HeapGraph {
    nodes: Vec<HeapNode>,
    edges: Vec<HeapEdge>,
    index_by_id: HashMap<u64, usize>,
    retention: Option<RetentionIndex>,
}

impl HeapGraph {
    /// Decode a heap snapshot JSON payload with the retention index built
    pub fn from_json(payload: &str) -> Result<Self> {
        Self::decode(payload, DecodeOptions::default())
    }

    pub fn decode(payload: &str, options: DecodeOptions) -> Result<Self> {
        let raw: RawHeapSnapshot = serde_json::from_str(payload)?;
        Self::from_raw(&raw, options)
    }

    pub(crate) fn from_raw(raw: &RawHeapSnapshot, options: DecodeOptions) -> Result<Self> {
        let node_layout = NodeLayout::resolve(&raw.snapshot.meta)?;
        let edge_layout = EdgeLayout::resolve(&raw.snapshot.meta)?;

        let nodes = decode_nodes(&raw.nodes, &node_layout, &raw.strings)?;
        let edges = decode_edges(&raw.edges, &edge_layout, &node_layout, &nodes, &raw.strings)?;

        let index_by_id = nodes.iter().map(|n| (n.id, n.index)).collect();
        let retention = options
            .build_retention_index
            .then(|| RetentionIndex::build(nodes.len(), &edges));

        tracing::debug!(
            nodes = nodes.len(),
            edges = edges.len(),
            retention = retention.is_some(),
            "decoded heap snapshot"
        );

        Ok(Self {
            nodes,
            edges,
            index_by_id,
            retention,
        })
    }

    pub fn nodes(&self) -> &[HeapNode] {
        &self.nodes
    }

    pub fn edges(&self) -> &[HeapEdge] {
        &self.edges
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// Node at a position in the node array
    pub fn node(&self, index: usize) -> Option<&HeapNode> {
        self.nodes.get(index)
    }

    pub fn node_by_id(&self, id: u64) -> Option<&HeapNode> {
        self.index_by_id.get(&id).and_then(|&i| self.nodes.get(i))
    }

    /// Outgoing edges of a node, in payload order
    pub fn edges_of(&self, node: &HeapNode) -> &[HeapEdge] {
        let end = node.first_edge + node.edge_count;
        self.edges.get(node.first_edge..end).unwrap_or(&[])
    }

    pub fn nodes_by_type(&self, node_type: &str) -> Vec<&HeapNode> {
        self.nodes.iter().filter(|n| n.node_type == node_type).collect()
    }

    pub fn nodes_by_name(&self, name: &str) -> Vec<&HeapNode> {
        self.nodes.iter().filter(|n| n.name == name).collect()
    }

    /// Count, total and average self size per node type, largest total first
    pub fn size_summary_by_type(&self) -> Vec<TypeSizeSummary> {
        TypeSizeSummary::from_nodes(&self.nodes)
    }

    /// Fresh (type, name) aggregate for comparison across captures
    pub fn type_summary(&self) -> HeapTypeSummary {
        HeapTypeSummary::from_nodes(&self.nodes)
    }

    /// Largest non-empty objects by self size
    pub fn largest_objects(&self, limit: usize) -> Vec<&HeapNode> {
        let mut sized: Vec<&HeapNode> = self.nodes.iter().filter(|n| n.self_size > 0).collect();
        sized.sort_by(|a, b| b.self_size.cmp(&a.self_size).then(a.index.cmp(&b.index)));
        sized.truncate(limit);
        sized
    }

    pub fn has_retention_index(&self) -> bool {
        self.retention.is_some()
    }

    fn retention(&self) -> Result<&RetentionIndex> {
        self.retention
            .as_ref()
            .ok_or(InspectError::FeatureDisabled("retention index was not built"))
    }

    fn index_of(&self, id: u64) -> Result<usize> {
        self.index_by_id
            .get(&id)
            .copied()
            .ok_or(InspectError::UnknownNode(id))
    }

    /// Every (retainer, edge) pair pointing at the node with this id
    pub fn retainers_of(&self, id: u64) -> Result<&[Retainer]> {
        let retention = self.retention()?;
        Ok(retention.retainers(self.index_of(id)?))
    }

    /// Shortest chain of references from `(GC roots)` down to the node
    ///
    /// Breadth-first over retainers, at most `max_depth` hops. `Ok(None)`
    /// means no root is reachable within the bound.
    pub fn find_retaining_path(&self, id: u64, max_depth: usize) -> Result<Option<RetainingPath<'_>>> {
        let retention = self.retention()?;
        let start = self.index_of(id)?;

        Ok(
            retention::shortest_root_path(retention, &self.nodes, start, max_depth).map(|steps| {
                RetainingPath::from_steps(&self.nodes, &self.edges, &steps)
            }),
        )
    }
}

fn decode_nodes(raw: &[u64], layout: &NodeLayout, strings: &[String]) -> Result<Vec<HeapNode>> {
    let count = layout.check_alignment(raw)?;
    let mut nodes = Vec::with_capacity(count);
    let mut first_edge = 0usize;

    for (index, record) in raw.chunks_exact(layout.stride).enumerate() {
        let base = index * layout.stride;
        let field = |f: usize| record[f];

        let node_type = lookup(&layout.types, field(layout.type_field), base, "node type")?;
        let name = lookup(strings, field(layout.name_field), base, "node name string")?;
        let edge_count = to_usize(field(layout.edge_count_field), base, "edge_count")?;

        nodes.push(HeapNode {
            index,
            id: field(layout.id_field),
            node_type: node_type.to_string(),
            name: name.to_string(),
            self_size: field(layout.self_size_field),
            edge_count,
            first_edge,
            trace_node_id: layout.trace_node_id_field.map(field),
        });

        first_edge = first_edge.checked_add(edge_count).ok_or_else(|| {
            InspectError::malformed_snapshot(base, "cumulative edge count overflows")
        })?;
    }

    Ok(nodes)
}

fn decode_edges(
    raw: &[u64],
    layout: &EdgeLayout,
    node_layout: &NodeLayout,
    nodes: &[HeapNode],
    strings: &[String],
) -> Result<Vec<HeapEdge>> {
    let available = layout.check_alignment(raw)?;
    let mut edges = Vec::with_capacity(available);

    for node in nodes {
        let end = node.first_edge + node.edge_count;
        if end > available {
            return Err(InspectError::malformed_snapshot(
                node.index * node_layout.stride,
                format!(
                    "node {} declares edges {}..{} but the edge array holds {}",
                    node.id, node.first_edge, end, available
                ),
            ));
        }

        for position in node.first_edge..end {
            let base = position * layout.stride;
            let record = &raw[base..base + layout.stride];

            let edge_type = lookup(&layout.types, record[layout.type_field], base, "edge type")?;
            let label = record[layout.name_or_index_field];
            let name_or_index = if is_indexed_edge(edge_type) {
                EdgeName::Index(label)
            } else {
                EdgeName::Name(lookup(strings, label, base, "edge name string")?.to_string())
            };

            let target_offset = to_usize(record[layout.to_node_field], base, "to_node")?;
            if target_offset % node_layout.stride != 0 {
                return Err(InspectError::malformed_snapshot(
                    base,
                    format!(
                        "to_node offset {target_offset} is not aligned to node stride {}",
                        node_layout.stride
                    ),
                ));
            }
            let to_node = target_offset / node_layout.stride;
            if to_node >= nodes.len() {
                return Err(InspectError::malformed_snapshot(
                    base,
                    format!("to_node index {to_node} out of range ({} nodes)", nodes.len()),
                ));
            }

            edges.push(HeapEdge {
                index: position,
                edge_type: edge_type.to_string(),
                name_or_index,
                from_node: node.index,
                to_node,
            });
        }
    }

    if edges.len() != available {
        return Err(InspectError::malformed_snapshot(
            edges.len() * layout.stride,
            format!(
                "{} trailing edges are not owned by any node",
                available - edges.len()
            ),
        ));
    }

    Ok(edges)
}

/// Load and decode a `.heapsnapshot` file
pub fn load_snapshot<P: AsRef<Path>>(path: P) -> Result<HeapGraph> {
    let payload = fs::read_to_string(path.as_ref())?;
    HeapGraph::from_json(&payload)
}
