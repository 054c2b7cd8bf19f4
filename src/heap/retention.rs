// Reverse reachability over a decoded heap graph
//
// The retention index inverts every edge once at decode time. Retaining
// paths are then found by walking it backwards from the target until the
// synthetic "(GC roots)" node is reached.

use crate::heap::graph::{HeapEdge, HeapNode};
use serde::Serialize;
use std::collections::{HashMap, HashSet, VecDeque};

/// One incoming reference: the retaining node and the edge it holds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Retainer {
    /// Position of the retaining node
    pub node: usize,
    /// Position of the edge in the edge list
    pub edge: usize,
}

/// Per-node list of retainers, indexed by node position
#[derive(Debug)]
pub(crate) struct RetentionIndex {
    retainers: Vec<Vec<Retainer>>,
}

impl RetentionIndex {
    pub(crate) fn build(node_count: usize, edges: &[HeapEdge]) -> Self {
        let mut retainers = vec![Vec::new(); node_count];
        for edge in edges {
            if let Some(slot) = retainers.get_mut(edge.to_node) {
                slot.push(Retainer {
                    node: edge.from_node,
                    edge: edge.index,
                });
            }
        }
        Self { retainers }
    }

    pub(crate) fn retainers(&self, node: usize) -> &[Retainer] {
        self.retainers.get(node).map(Vec::as_slice).unwrap_or(&[])
    }
}

/// Breadth-first search from `start` back to a GC root
///
/// Returns `(retainer, edge)` position pairs ordered root first, or `None`
/// when no root is reachable within `max_depth` hops. A node is enqueued at
/// most once, so reference cycles cannot loop.
pub(crate) fn shortest_root_path(
    index: &RetentionIndex,
    nodes: &[HeapNode],
    start: usize,
    max_depth: usize,
) -> Option<Vec<(usize, usize)>> {
    let mut visited = HashSet::from([start]);
    // retainer -> (node it retains on the way to `start`, edge used)
    let mut toward_start: HashMap<usize, (usize, usize)> = HashMap::new();
    let mut queue = VecDeque::from([(start, 0usize)]);

    while let Some((current, depth)) = queue.pop_front() {
        if nodes.get(current).is_some_and(HeapNode::is_gc_root) {
            return Some(unwind(current, start, &toward_start));
        }
        if depth >= max_depth {
            continue;
        }

        for retainer in index.retainers(current) {
            if visited.insert(retainer.node) {
                toward_start.insert(retainer.node, (current, retainer.edge));
                queue.push_back((retainer.node, depth + 1));
            }
        }
    }

    None
}

fn unwind(
    root: usize,
    start: usize,
    toward_start: &HashMap<usize, (usize, usize)>,
) -> Vec<(usize, usize)> {
    let mut steps = Vec::new();
    let mut current = root;
    while current != start {
        match toward_start.get(&current) {
            Some(&(next, edge)) => {
                steps.push((current, edge));
                current = next;
            }
            None => break,
        }
    }
    steps
}

/// One hop of a retaining path: `retainer` holds `edge`, which points one
/// step closer to the target
#[derive(Debug, Clone, Serialize)]
pub struct PathStep<'g> {
    pub retainer: &'g HeapNode,
    pub edge: &'g HeapEdge,
}

/// Chain of references from `(GC roots)` to a target node
///
/// Empty when the target is itself the root.
#[derive(Debug, Clone, Serialize)]
pub struct RetainingPath<'g> {
    pub steps: Vec<PathStep<'g>>,
}

impl<'g> RetainingPath<'g> {
    pub(crate) fn from_steps(
        nodes: &'g [HeapNode],
        edges: &'g [HeapEdge],
        steps: &[(usize, usize)],
    ) -> Self {
        let steps = steps
            .iter()
            .filter_map(|&(node, edge)| {
                Some(PathStep {
                    retainer: nodes.get(node)?,
                    edge: edges.get(edge)?,
                })
            })
            .collect();
        Self { steps }
    }

    /// Number of references between the root and the target
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Compact one-line form, e.g. `(GC roots) -[element [3]]-> Window -[property cache]-> ...`
    pub fn to_chain_string(&self) -> String {
        self.steps
            .iter()
            .map(|step| {
                format!(
                    "{} -[{} {}]->",
                    step.retainer.name, step.edge.edge_type, step.edge.name_or_index
                )
            })
            .collect::<Vec<_>>()
            .join(" ")
    }
}
