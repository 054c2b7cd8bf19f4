// Timing views over a decoded CPU profile

use crate::error::{InspectError, Result};
use crate::profile::tree::{CpuProfile, ProfileNode};
use serde::Serialize;
use std::collections::HashSet;

/// Self and inclusive cost of one call-tree node
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FunctionTiming {
    pub id: u64,
    pub function_name: String,
    pub url: String,
    pub line: i64,
    pub self_samples: u64,
    pub total_samples: u64,
    pub self_percent: f64,
    pub total_percent: f64,
    pub deopt_reason: Option<String>,
    pub bailout_reason: Option<String>,
}

/// Bounded-depth view of the call tree
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CallTreeNode {
    pub id: u64,
    pub function_name: String,
    pub url: String,
    pub line: i64,
    pub self_samples: u64,
    pub total_samples: u64,
    pub children: Vec<CallTreeNode>,
    /// Children existed but were cut off by the depth bound
    pub truncated: bool,
}

/// A node above the hot threshold with its root-to-node call chain
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HotPath {
    pub id: u64,
    pub function_name: String,
    pub url: String,
    pub line: i64,
    pub percent: f64,
    pub samples: u64,
    /// `name:line` labels from the root down to this node
    pub path: Vec<String>,
}

impl HotPath {
    pub fn call_path(&self) -> String {
        self.path.join(" -> ")
    }
}

/// Function that V8 deoptimized or refused to optimize
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OptimizationIssue {
    pub id: u64,
    pub function_name: String,
    pub url: String,
    pub line: i64,
    pub self_samples: u64,
    pub total_samples: u64,
    pub issues: Vec<String>,
}

/// Wall-clock span and sampling rate of the recording
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimingSummary {
    pub total_time_ms: f64,
    pub sample_count: u64,
    pub sample_rate_hz: f64,
    /// Mean of `timeDeltas`, 0 when the payload has none
    pub mean_interval_us: f64,
}

impl CpuProfile {
    fn timing(&self, node: &ProfileNode) -> FunctionTiming {
        FunctionTiming {
            id: node.id,
            function_name: node.call_frame.display_name().to_string(),
            url: node.call_frame.url.clone(),
            line: node.call_frame.line_number,
            self_samples: node.self_samples,
            total_samples: node.inclusive_samples,
            self_percent: self.percent(node.self_samples),
            total_percent: self.percent(node.inclusive_samples),
            deopt_reason: node.deopt_reason.clone(),
            bailout_reason: node.bailout_reason.clone(),
        }
    }

    /// Top `limit` nodes by inclusive samples
    pub fn hot_functions(&self, limit: usize) -> Vec<FunctionTiming> {
        let mut hot: Vec<FunctionTiming> = self
            .nodes
            .iter()
            .filter(|n| n.self_samples > 0 || n.inclusive_samples > 0)
            .map(|n| self.timing(n))
            .collect();

        hot.sort_by(|a, b| b.total_samples.cmp(&a.total_samples).then(a.id.cmp(&b.id)));
        hot.truncate(limit);
        hot
    }

    /// Per-node timings, optionally restricted to URLs containing `url_filter`
    pub fn function_times(&self, url_filter: Option<&str>) -> Vec<FunctionTiming> {
        let mut times: Vec<FunctionTiming> = self
            .nodes
            .iter()
            .filter(|n| url_filter.map_or(true, |f| n.call_frame.url.contains(f)))
            .filter(|n| n.inclusive_samples > 0)
            .map(|n| self.timing(n))
            .collect();

        times.sort_by(|a, b| b.total_samples.cmp(&a.total_samples).then(a.id.cmp(&b.id)));
        times
    }

    /// Call tree from `root_id` (default: the first parentless node), at most
    /// `max_depth` levels below the root
    pub fn call_tree(&self, root_id: Option<u64>, max_depth: usize) -> Result<Option<CallTreeNode>> {
        let root = match root_id {
            Some(id) => *self.index_by_id.get(&id).ok_or(InspectError::UnknownNode(id))?,
            None => match self.parents.iter().position(Option::is_none) {
                Some(position) => position,
                None => return Ok(None),
            },
        };

        let mut ancestors = HashSet::new();
        Ok(Some(self.build_view(root, 0, max_depth, &mut ancestors)))
    }

    fn build_view(
        &self,
        position: usize,
        depth: usize,
        max_depth: usize,
        ancestors: &mut HashSet<usize>,
    ) -> CallTreeNode {
        let node = &self.nodes[position];
        let child_positions = &self.children[position];
        let mut view = CallTreeNode {
            id: node.id,
            function_name: node.call_frame.display_name().to_string(),
            url: node.call_frame.url.clone(),
            line: node.call_frame.line_number,
            self_samples: node.self_samples,
            total_samples: node.inclusive_samples,
            children: Vec::new(),
            truncated: false,
        };

        if depth >= max_depth {
            view.truncated = !child_positions.is_empty();
            return view;
        }

        ancestors.insert(position);
        for &child in child_positions {
            if !ancestors.contains(&child) {
                view.children.push(self.build_view(child, depth + 1, max_depth, ancestors));
            }
        }
        ancestors.remove(&position);

        view
    }

    /// Root-to-node chains of every node at or above `min_percent` inclusive
    pub fn hot_paths(&self, min_percent: f64) -> Vec<HotPath> {
        let mut paths: Vec<HotPath> = self
            .nodes
            .iter()
            .enumerate()
            .filter_map(|(position, node)| {
                let percent = self.percent(node.inclusive_samples);
                (percent >= min_percent).then(|| HotPath {
                    id: node.id,
                    function_name: node.call_frame.display_name().to_string(),
                    url: node.call_frame.url.clone(),
                    line: node.call_frame.line_number,
                    percent,
                    samples: node.inclusive_samples,
                    path: self.path_to(position),
                })
            })
            .collect();

        paths.sort_by(|a, b| b.percent.total_cmp(&a.percent).then(a.id.cmp(&b.id)));
        paths
    }

    fn path_to(&self, position: usize) -> Vec<String> {
        let mut labels = Vec::new();
        let mut seen = HashSet::new();
        let mut current = Some(position);

        while let Some(p) = current {
            if !seen.insert(p) {
                break;
            }
            labels.push(self.nodes[p].call_frame.label());
            current = self.parents[p];
        }

        labels.reverse();
        labels
    }

    /// Nodes carrying deopt or bailout annotations, most expensive first
    pub fn optimization_issues(&self) -> Vec<OptimizationIssue> {
        let mut issues: Vec<OptimizationIssue> = self
            .nodes
            .iter()
            .filter_map(|node| {
                let mut reasons = Vec::new();
                if let Some(reason) = &node.bailout_reason {
                    reasons.push(format!("Bailout: {reason}"));
                }
                if let Some(reason) = &node.deopt_reason {
                    reasons.push(format!("Deopt: {reason}"));
                }
                (!reasons.is_empty()).then(|| OptimizationIssue {
                    id: node.id,
                    function_name: node.call_frame.display_name().to_string(),
                    url: node.call_frame.url.clone(),
                    line: node.call_frame.line_number,
                    self_samples: node.self_samples,
                    total_samples: node.inclusive_samples,
                    issues: reasons,
                })
            })
            .collect();

        issues.sort_by(|a, b| b.total_samples.cmp(&a.total_samples).then(a.id.cmp(&b.id)));
        issues
    }

    pub fn timing_summary(&self) -> TimingSummary {
        // startTime/endTime are microseconds
        let total_time_ms = self.end_time.saturating_sub(self.start_time) as f64 / 1000.0;
        let sample_count = self.total_samples();
        let sample_rate_hz = if total_time_ms > 0.0 {
            sample_count as f64 / (total_time_ms / 1000.0)
        } else {
            0.0
        };
        let mean_interval_us = if self.time_deltas.is_empty() {
            0.0
        } else {
            self.time_deltas.iter().fold(0i64, |acc, d| acc.saturating_add(*d)) as f64
                / self.time_deltas.len() as f64
        };

        TimingSummary {
            total_time_ms,
            sample_count,
            sample_rate_hz,
            mean_interval_us,
        }
    }
}
