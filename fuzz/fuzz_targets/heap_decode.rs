#![no_main]

use libfuzzer_sys::fuzz_target;
use v8scope::heap::{HeapGraph, HeapTypeSummary};

fuzz_target!(|data: &[u8]| {
    if let Ok(input) = std::str::from_utf8(data) {
        // Malformed payloads must come back as errors, never panics
        if let Ok(graph) = HeapGraph::from_json(input) {
            for node in graph.nodes().iter().take(16) {
                let _ = graph.find_retaining_path(node.id, 32);
            }
        }
        let _ = HeapTypeSummary::from_payload(input);
    }
});
