// CPU profile decoding and analysis
//
// A profile is a node list where each node names its children by id, plus a
// sample sequence of node ids. Decoding resolves it into a call tree with
// explicit parent links and precomputed self/inclusive sample counts; every
// query below is read-only over that tree.

mod analysis;
mod heuristics;
mod payload;
mod tree;

pub use analysis::{CallTreeNode, FunctionTiming, HotPath, OptimizationIssue, TimingSummary};
pub use heuristics::{
    AsyncBucket, AsyncPattern, AsyncReport, ComplexityFinding, ComplexitySignal, Severity,
};
pub use tree::{load_profile, CallFrame, CpuProfile, ProfileNode};

#[cfg(test)]
mod tests;
