//! v8scope - V8 inspector client with heap snapshot and CPU profile analysis
//!
//! This library talks the inspector protocol to a running V8 isolate
//! (Node, Deno, Chromium), captures heap snapshots and CPU profiles, and
//! decodes them into explicit graph and call-tree structures for leak and
//! hotspot analysis.

pub mod client;
pub mod comparison;
pub mod config;
pub mod error;
pub mod heap;
pub mod profile;

pub use error::{InspectError, Result};
