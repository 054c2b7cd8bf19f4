// Heap snapshot payload layout
//
// A V8 heap snapshot describes its own record shape: `snapshot.meta` lists
// the node and edge field names in order, and for enum-typed fields the
// parallel `*_types` entry is the table of variant names. Offsets are
// resolved by name once so the node/edge walks never search again.

use crate::error::{InspectError, Result};
use serde::Deserialize;
use serde_json::Value;

#[derive(Debug, Default, Deserialize)]
pub(crate) struct RawSnapshotMeta {
    #[serde(default)]
    pub node_fields: Vec<String>,
    #[serde(default)]
    pub node_types: Vec<Value>,
    #[serde(default)]
    pub edge_fields: Vec<String>,
    #[serde(default)]
    pub edge_types: Vec<Value>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct RawSnapshotHeader {
    #[serde(default)]
    pub meta: RawSnapshotMeta,
}

/// Full payload as emitted by `HeapProfiler.takeHeapSnapshot`
#[derive(Debug, Deserialize)]
pub(crate) struct RawHeapSnapshot {
    pub snapshot: RawSnapshotHeader,
    #[serde(default)]
    pub nodes: Vec<u64>,
    #[serde(default)]
    pub edges: Vec<u64>,
    #[serde(default)]
    pub strings: Vec<String>,
}

/// Payload subset for summary-only decoding; the edge array is skipped
/// by the deserializer and never allocated
#[derive(Debug, Deserialize)]
pub(crate) struct RawNodeTable {
    pub snapshot: RawSnapshotHeader,
    #[serde(default)]
    pub nodes: Vec<u64>,
    #[serde(default)]
    pub strings: Vec<String>,
}

/// Resolved node record shape
#[derive(Debug, Clone)]
pub(crate) struct NodeLayout {
    pub stride: usize,
    pub type_field: usize,
    pub name_field: usize,
    pub id_field: usize,
    pub self_size_field: usize,
    pub edge_count_field: usize,
    pub trace_node_id_field: Option<usize>,
    pub types: Vec<String>,
}

/// Resolved edge record shape
#[derive(Debug, Clone)]
pub(crate) struct EdgeLayout {
    pub stride: usize,
    pub type_field: usize,
    pub name_or_index_field: usize,
    pub to_node_field: usize,
    pub types: Vec<String>,
}

fn field_position(fields: &[String], name: &str, table: &str) -> Result<usize> {
    fields
        .iter()
        .position(|f| f == name)
        .ok_or_else(|| InspectError::malformed_snapshot(0, format!("{table} missing '{name}'")))
}

/// The enum table for a field is the array at the same position in `*_types`
fn enum_table(types: &[Value], field: usize, table: &str) -> Result<Vec<String>> {
    let values = types
        .get(field)
        .and_then(Value::as_array)
        .ok_or_else(|| {
            InspectError::malformed_snapshot(0, format!("{table}[{field}] is not a type-name table"))
        })?;

    values
        .iter()
        .map(|v| {
            v.as_str().map(str::to_string).ok_or_else(|| {
                InspectError::malformed_snapshot(0, format!("{table}[{field}] has a non-string entry"))
            })
        })
        .collect()
}

impl NodeLayout {
    pub(crate) fn resolve(meta: &RawSnapshotMeta) -> Result<Self> {
        let fields = &meta.node_fields;
        let type_field = field_position(fields, "type", "node_fields")?;

        Ok(Self {
            stride: fields.len(),
            type_field,
            name_field: field_position(fields, "name", "node_fields")?,
            id_field: field_position(fields, "id", "node_fields")?,
            self_size_field: field_position(fields, "self_size", "node_fields")?,
            edge_count_field: field_position(fields, "edge_count", "node_fields")?,
            trace_node_id_field: fields.iter().position(|f| f == "trace_node_id"),
            types: enum_table(&meta.node_types, type_field, "node_types")?,
        })
    }

    /// Check the flat node array is a whole number of records
    pub(crate) fn check_alignment(&self, raw: &[u64]) -> Result<usize> {
        let remainder = raw.len() % self.stride;
        if remainder != 0 {
            return Err(InspectError::malformed_snapshot(
                raw.len() - remainder,
                format!(
                    "node array length {} is not a multiple of node stride {}",
                    raw.len(),
                    self.stride
                ),
            ));
        }
        Ok(raw.len() / self.stride)
    }
}

impl EdgeLayout {
    pub(crate) fn resolve(meta: &RawSnapshotMeta) -> Result<Self> {
        let fields = &meta.edge_fields;
        let type_field = field_position(fields, "type", "edge_fields")?;

        Ok(Self {
            stride: fields.len(),
            type_field,
            name_or_index_field: field_position(fields, "name_or_index", "edge_fields")?,
            to_node_field: field_position(fields, "to_node", "edge_fields")?,
            types: enum_table(&meta.edge_types, type_field, "edge_types")?,
        })
    }

    pub(crate) fn check_alignment(&self, raw: &[u64]) -> Result<usize> {
        let remainder = raw.len() % self.stride;
        if remainder != 0 {
            return Err(InspectError::malformed_snapshot(
                raw.len() - remainder,
                format!(
                    "edge array length {} is not a multiple of edge stride {}",
                    raw.len(),
                    self.stride
                ),
            ));
        }
        Ok(raw.len() / self.stride)
    }
}

/// Resolve a raw numeric reference into a table, failing with the array offset
pub(crate) fn lookup<'t>(
    table: &'t [String],
    raw: u64,
    offset: usize,
    what: &str,
) -> Result<&'t str> {
    usize::try_from(raw)
        .ok()
        .and_then(|i| table.get(i))
        .map(String::as_str)
        .ok_or_else(|| {
            InspectError::malformed_snapshot(
                offset,
                format!("{what} index {raw} out of range (table has {} entries)", table.len()),
            )
        })
}

pub(crate) fn to_usize(raw: u64, offset: usize, what: &str) -> Result<usize> {
    usize::try_from(raw).map_err(|_| {
        InspectError::malformed_snapshot(offset, format!("{what} {raw} does not fit in usize"))
    })
}
