// Shared fixture builders for integration tests
//
// Produces payloads in V8's real layout (6 node fields, 3 edge fields) so the
// same text would load in DevTools.

#![allow(dead_code)]

use serde_json::{json, Value};

pub const NODE_TYPES: &[&str] = &[
    "hidden", "array", "string", "object", "code", "closure", "regexp", "number", "native",
    "synthetic",
];
pub const EDGE_TYPES: &[&str] = &[
    "context", "element", "property", "internal", "hidden", "shortcut", "weak",
];

const NODE_STRIDE: u64 = 6;

pub fn type_index(name: &str) -> u64 {
    NODE_TYPES.iter().position(|t| *t == name).unwrap_or(0) as u64
}

pub fn edge_type_index(name: &str) -> u64 {
    EDGE_TYPES.iter().position(|t| *t == name).unwrap_or(0) as u64
}

/// Incremental builder for heap snapshot payloads
#[derive(Default)]
pub struct SnapshotBuilder {
    strings: Vec<String>,
    nodes: Vec<(u64, u64, u64, u64)>,
    /// (owner position, edge type, name_or_index, target position)
    edges: Vec<(usize, u64, u64, usize)>,
}

impl SnapshotBuilder {
    pub fn new() -> Self {
        let mut builder = Self::default();
        builder.intern("");
        builder
    }

    fn intern(&mut self, s: &str) -> u64 {
        match self.strings.iter().position(|existing| existing == s) {
            Some(i) => i as u64,
            None => {
                self.strings.push(s.to_string());
                (self.strings.len() - 1) as u64
            }
        }
    }

    /// Add a node and return its position
    pub fn node(&mut self, node_type: &str, name: &str, id: u64, self_size: u64) -> usize {
        let name = self.intern(name);
        self.nodes.push((type_index(node_type), name, id, self_size));
        self.nodes.len() - 1
    }

    pub fn gc_roots(&mut self) -> usize {
        self.node("synthetic", "(GC roots)", 1, 0)
    }

    pub fn property(&mut self, from: usize, name: &str, to: usize) {
        let name = self.intern(name);
        self.edges.push((from, edge_type_index("property"), name, to));
    }

    pub fn element(&mut self, from: usize, index: u64, to: usize) {
        self.edges.push((from, edge_type_index("element"), index, to));
    }

    pub fn build(&self) -> String {
        let mut edges = self.edges.clone();
        // Edge runs must follow node order
        edges.sort_by_key(|e| e.0);

        let mut flat_nodes = Vec::with_capacity(self.nodes.len() * NODE_STRIDE as usize);
        for (position, &(t, name, id, size)) in self.nodes.iter().enumerate() {
            let edge_count = edges.iter().filter(|e| e.0 == position).count() as u64;
            flat_nodes.extend([t, name, id, size, edge_count, 0]);
        }
        let flat_edges: Vec<u64> = edges
            .iter()
            .flat_map(|&(_, t, label, to)| [t, label, to as u64 * NODE_STRIDE])
            .collect();

        json!({
            "snapshot": {
                "meta": meta(),
                "node_count": self.nodes.len(),
                "edge_count": edges.len(),
            },
            "nodes": flat_nodes,
            "edges": flat_edges,
            "strings": self.strings,
        })
        .to_string()
    }
}

pub fn meta() -> Value {
    json!({
        "node_fields": ["type", "name", "id", "self_size", "edge_count", "trace_node_id"],
        "node_types": [NODE_TYPES, "string", "number", "number", "number", "number"],
        "edge_fields": ["type", "name_or_index", "to_node"],
        "edge_types": [EDGE_TYPES, "string_or_number", "node"]
    })
}

/// Heap after `leaked` cache entries have accumulated under a global cache
pub fn leaking_heap(leaked: u64) -> String {
    let mut b = SnapshotBuilder::new();
    let root = b.gc_roots();
    let window = b.node("object", "Window", 3, 128);
    let cache = b.node("object", "SessionCache", 5, 64);
    b.element(root, 0, window);
    b.property(window, "sessionCache", cache);

    for i in 0..leaked {
        let entry = b.node("object", "Session", 100 + i * 2, 512 * 1024);
        b.element(cache, i, entry);
    }
    let scratch = b.node("string", "scratch", 7, 32);
    b.property(window, "scratch", scratch);
    b.build()
}
