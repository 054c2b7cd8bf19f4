// Call tree reconstruction
//
// Pass one indexes nodes by id. Pass two resolves every child id to a
// position and records the explicit parent link, so queries never invert
// the child lists again. Inclusive counts are computed once at build time.

use crate::error::{InspectError, Result};
use crate::profile::payload::{script_id_text, RawProfile};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::Path;

/// Source location of a sampled function
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CallFrame {
    pub function_name: String,
    pub script_id: String,
    pub url: String,
    /// Zero-based; -1 when unknown
    pub line_number: i64,
    pub column_number: i64,
}

impl CallFrame {
    /// Function name, with `(anonymous)` for unnamed functions
    pub fn display_name(&self) -> &str {
        if self.function_name.is_empty() {
            "(anonymous)"
        } else {
            &self.function_name
        }
    }

    /// `name:line` label used in hot paths
    pub fn label(&self) -> String {
        format!("{}:{}", self.display_name(), self.line_number)
    }
}

/// One vertex of the call tree
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProfileNode {
    pub id: u64,
    pub call_frame: CallFrame,
    /// Samples attributed directly to this node
    pub self_samples: u64,
    /// Self plus all descendants
    pub inclusive_samples: u64,
    pub parent: Option<u64>,
    pub children: Vec<u64>,
    pub deopt_reason: Option<String>,
    pub bailout_reason: Option<String>,
}

/// Decoded, immutable CPU profile
#[derive(Debug)]
pub struct CpuProfile {
    pub(crate) nodes: Vec<ProfileNode>,
    pub(crate) index_by_id: HashMap<u64, usize>,
    pub(crate) parents: Vec<Option<usize>>,
    pub(crate) children: Vec<Vec<usize>>,
    pub(crate) samples: Vec<u64>,
    pub(crate) time_deltas: Vec<i64>,
    pub(crate) start_time: i64,
    pub(crate) end_time: i64,
}

fn non_empty(reason: Option<String>) -> Option<String> {
    reason.filter(|r| !r.is_empty() && r != "no reason")
}

impl CpuProfile {
    /// Decode a profile JSON payload
    pub fn from_json(payload: &str) -> Result<Self> {
        let raw: RawProfile = serde_json::from_str(payload)?;
        Self::from_raw(raw)
    }

    /// Decode an already-parsed payload (e.g. the `profile` field of a `Profiler.stop` result)
    pub fn from_value(value: serde_json::Value) -> Result<Self> {
        let raw: RawProfile = serde_json::from_value(value)?;
        Self::from_raw(raw)
    }

    pub(crate) fn from_raw(raw: RawProfile) -> Result<Self> {
        let RawProfile {
            nodes: raw_nodes,
            start_time,
            end_time,
            samples,
            time_deltas,
        } = raw;

        // Pass one: positions by id
        let mut index_by_id = HashMap::with_capacity(raw_nodes.len());
        for (position, node) in raw_nodes.iter().enumerate() {
            if index_by_id.insert(node.id, position).is_some() {
                return Err(InspectError::malformed_profile(
                    position,
                    format!("duplicate node id {}", node.id),
                ));
            }
        }

        // Pass two: explicit child and parent links
        let mut children = vec![Vec::new(); raw_nodes.len()];
        let mut parents: Vec<Option<usize>> = vec![None; raw_nodes.len()];
        for (position, node) in raw_nodes.iter().enumerate() {
            for &child_id in &node.children {
                let child = *index_by_id.get(&child_id).ok_or_else(|| {
                    InspectError::malformed_profile(
                        position,
                        format!("node {} lists unknown child {child_id}", node.id),
                    )
                })?;
                children[position].push(child);
                // At most one parent is assumed; the first claim wins.
                parents[child].get_or_insert(position);
            }
        }

        let mut tally: HashMap<u64, u64> = HashMap::new();
        for (position, id) in samples.iter().enumerate() {
            if !index_by_id.contains_key(id) {
                return Err(InspectError::malformed_profile(
                    position,
                    format!("sample references unknown node {id}"),
                ));
            }
            *tally.entry(*id).or_default() += 1;
        }

        if !time_deltas.is_empty() && time_deltas.len() != samples.len() {
            return Err(InspectError::malformed_profile(
                time_deltas.len().min(samples.len()),
                format!(
                    "{} time deltas for {} samples",
                    time_deltas.len(),
                    samples.len()
                ),
            ));
        }

        // Profiles that omit hitCount entirely carry their counts in `samples`.
        let declares_hits = raw_nodes.iter().any(|n| n.hit_count.is_some());
        let self_samples: Vec<u64> = raw_nodes
            .iter()
            .map(|n| {
                if declares_hits {
                    n.hit_count.unwrap_or(0)
                } else {
                    tally.get(&n.id).copied().unwrap_or(0)
                }
            })
            .collect();

        let inclusive: Vec<u64> = (0..raw_nodes.len())
            .map(|position| inclusive_from(position, &children, &self_samples))
            .collect::<Result<_>>()?;

        let ids: Vec<u64> = raw_nodes.iter().map(|n| n.id).collect();
        let nodes: Vec<ProfileNode> = raw_nodes
            .into_iter()
            .enumerate()
            .map(|(position, raw)| ProfileNode {
                id: raw.id,
                call_frame: CallFrame {
                    function_name: raw.call_frame.function_name,
                    script_id: script_id_text(&raw.call_frame.script_id),
                    url: raw.call_frame.url,
                    line_number: raw.call_frame.line_number,
                    column_number: raw.call_frame.column_number,
                },
                self_samples: self_samples[position],
                inclusive_samples: inclusive[position],
                parent: parents[position].map(|p| ids[p]),
                children: raw.children,
                deopt_reason: non_empty(raw.deopt_reason),
                bailout_reason: non_empty(raw.bailout_reason),
            })
            .collect();

        tracing::debug!(
            nodes = nodes.len(),
            samples = samples.len(),
            "decoded cpu profile"
        );

        Ok(Self {
            nodes,
            index_by_id,
            parents,
            children,
            samples,
            time_deltas,
            start_time,
            end_time,
        })
    }

    pub fn nodes(&self) -> &[ProfileNode] {
        &self.nodes
    }

    pub fn node(&self, id: u64) -> Option<&ProfileNode> {
        self.index_by_id.get(&id).map(|&i| &self.nodes[i])
    }

    /// Sample sequence length, the denominator of every percentage
    pub fn total_samples(&self) -> u64 {
        self.samples.len() as u64
    }

    pub fn samples(&self) -> &[u64] {
        &self.samples
    }

    pub fn time_deltas(&self) -> &[i64] {
        &self.time_deltas
    }

    /// Nodes with no parent
    pub fn roots(&self) -> impl Iterator<Item = &ProfileNode> {
        self.nodes
            .iter()
            .zip(&self.parents)
            .filter(|(_, parent)| parent.is_none())
            .map(|(node, _)| node)
    }

    pub fn parent_of(&self, id: u64) -> Option<&ProfileNode> {
        let position = *self.index_by_id.get(&id)?;
        self.parents[position].map(|p| &self.nodes[p])
    }

    pub fn children_of(&self, id: u64) -> Vec<&ProfileNode> {
        self.index_by_id
            .get(&id)
            .map(|&i| self.children[i].iter().map(|&c| &self.nodes[c]).collect())
            .unwrap_or_default()
    }

    pub(crate) fn percent(&self, samples: u64) -> f64 {
        let total = self.total_samples();
        if total == 0 {
            0.0
        } else {
            samples as f64 / total as f64 * 100.0
        }
    }
}

/// Sum of self samples over everything reachable from `start`
///
/// The visited set is per call: a node reachable twice (or through an
/// accidental cycle) contributes once. A sum past `u64::MAX` is malformed.
fn inclusive_from(start: usize, children: &[Vec<usize>], self_samples: &[u64]) -> Result<u64> {
    let mut visited = HashSet::from([start]);
    let mut stack = vec![start];
    let mut total = 0u64;

    while let Some(position) = stack.pop() {
        total = total.checked_add(self_samples[position]).ok_or_else(|| {
            InspectError::malformed_profile(
                position,
                format!("inclusive sample count of node at position {start} overflows"),
            )
        })?;
        for &child in &children[position] {
            if visited.insert(child) {
                stack.push(child);
            }
        }
    }

    Ok(total)
}

/// Load and decode a `.cpuprofile` file
pub fn load_profile<P: AsRef<Path>>(path: P) -> Result<CpuProfile> {
    let payload = fs::read_to_string(path.as_ref())?;
    CpuProfile::from_json(&payload)
}
