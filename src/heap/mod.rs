// V8 heap snapshot decoding
//
// A snapshot is a flat numeric encoding: node records of `node_fields.len()`
// numbers each, edge records of `edge_fields.len()` numbers each, and a
// shared string table. Nodes own consecutive runs of edges whose lengths are
// the nodes' `edge_count` fields, in node order.
//
// The decoder resolves that positional contract into explicit structures:
// every edge knows its owning node, every node knows its first edge, and an
// optional retention index answers "who keeps this alive".

mod graph;
mod layout;
mod retention;
mod summary;

pub use graph::{load_snapshot, DecodeOptions, EdgeName, HeapEdge, HeapGraph, HeapNode};
pub use retention::{PathStep, Retainer, RetainingPath};
pub use summary::{HeapTypeSummary, SummaryKey, SummaryRow, TypeSizeSummary, TypeStats};
