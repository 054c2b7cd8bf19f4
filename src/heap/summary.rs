// Heap aggregates: per-type size table and per-(type, name) summaries
//
// `HeapTypeSummary` is the unit the comparison heuristics work on. It can
// be built from a decoded graph or streamed straight from payload text; the
// latter never materializes nodes, edges, or a retention index.

use crate::error::{InspectError, Result};
use crate::heap::graph::HeapNode;
use crate::heap::layout::{lookup, NodeLayout, RawNodeTable};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};

/// Count/total/average self size for one node type
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TypeSizeSummary {
    pub node_type: String,
    pub count: u64,
    pub total_size: u64,
    pub avg_size: f64,
}

impl TypeSizeSummary {
    pub(crate) fn from_nodes(nodes: &[HeapNode]) -> Vec<Self> {
        let mut by_type: HashMap<&str, (u64, u64)> = HashMap::new();
        for node in nodes {
            let entry = by_type.entry(node.node_type.as_str()).or_default();
            entry.0 += 1;
            entry.1 = entry.1.saturating_add(node.self_size);
        }

        let mut rows: Vec<Self> = by_type
            .into_iter()
            .map(|(node_type, (count, total_size))| Self {
                node_type: node_type.to_string(),
                count,
                total_size,
                avg_size: if count > 0 {
                    total_size as f64 / count as f64
                } else {
                    0.0
                },
            })
            .collect();

        rows.sort_by(|a, b| {
            b.total_size
                .cmp(&a.total_size)
                .then_with(|| a.node_type.cmp(&b.node_type))
        });
        rows
    }
}

/// Aggregate key: node type tag plus resolved name
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct SummaryKey {
    pub node_type: String,
    pub name: String,
}

impl SummaryKey {
    pub fn new(node_type: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            node_type: node_type.into(),
            name: name.into(),
        }
    }
}

/// Count and total self size for one key
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TypeStats {
    pub count: u64,
    pub size: u64,
}

/// Flattened summary entry for collaborators
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SummaryRow {
    pub node_type: String,
    pub name: String,
    pub count: u64,
    pub size: u64,
}

/// Per-(type, name) aggregate of one capture
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeapTypeSummary {
    entries: BTreeMap<SummaryKey, TypeStats>,
}

impl HeapTypeSummary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_nodes(nodes: &[HeapNode]) -> Self {
        let mut summary = Self::new();
        for node in nodes {
            summary.add(SummaryKey::new(&node.node_type, &node.name), 1, node.self_size);
        }
        summary
    }

    /// Summarize raw snapshot text without decoding edges
    ///
    /// Aggregates on raw (type, name) string indices first so each distinct
    /// key allocates once regardless of how many nodes share it. A key
    /// whose total self size overflows `u64` is malformed.
    pub fn from_payload(payload: &str) -> Result<Self> {
        let raw: RawNodeTable = serde_json::from_str(payload)?;
        let layout = NodeLayout::resolve(&raw.snapshot.meta)?;
        layout.check_alignment(&raw.nodes)?;

        // (type index, name index) -> (stats, offset of first record with that key)
        let mut by_index: HashMap<(u64, u64), (TypeStats, usize)> = HashMap::new();
        for (i, record) in raw.nodes.chunks_exact(layout.stride).enumerate() {
            let offset = i * layout.stride;
            let (stats, _) = by_index
                .entry((record[layout.type_field], record[layout.name_field]))
                .or_insert((TypeStats::default(), offset));
            stats.count += 1;
            stats.size = stats
                .size
                .checked_add(record[layout.self_size_field])
                .ok_or_else(|| {
                    InspectError::malformed_snapshot(offset, "total self_size for key overflows")
                })?;
        }

        let mut summary = Self::new();
        for ((type_index, name_index), (stats, offset)) in by_index {
            let node_type = lookup(&layout.types, type_index, offset, "node type")?;
            let name = lookup(&raw.strings, name_index, offset, "node name string")?;
            summary.add(SummaryKey::new(node_type, name), stats.count, stats.size);
        }
        Ok(summary)
    }

    /// Build from explicit entries (fixtures, collaborator-supplied data)
    pub fn from_entries<I>(entries: I) -> Self
    where
        I: IntoIterator<Item = (SummaryKey, TypeStats)>,
    {
        let mut summary = Self::new();
        for (key, stats) in entries {
            summary.add(key, stats.count, stats.size);
        }
        summary
    }

    fn add(&mut self, key: SummaryKey, count: u64, size: u64) {
        let entry = self.entries.entry(key).or_default();
        entry.count = entry.count.saturating_add(count);
        entry.size = entry.size.saturating_add(size);
    }

    pub fn get(&self, key: &SummaryKey) -> Option<&TypeStats> {
        self.entries.get(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&SummaryKey, &TypeStats)> {
        self.entries.iter()
    }

    pub fn keys(&self) -> impl Iterator<Item = &SummaryKey> {
        self.entries.keys()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn total_count(&self) -> u64 {
        self.entries.values().fold(0, |acc, s| acc.saturating_add(s.count))
    }

    pub fn total_size(&self) -> u64 {
        self.entries.values().fold(0, |acc, s| acc.saturating_add(s.size))
    }

    pub fn rows(&self) -> Vec<SummaryRow> {
        self.entries
            .iter()
            .map(|(key, stats)| SummaryRow {
                node_type: key.node_type.clone(),
                name: key.name.clone(),
                count: stats.count,
                size: stats.size,
            })
            .collect()
    }
}
