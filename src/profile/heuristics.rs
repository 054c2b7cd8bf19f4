// Heuristic profile scans
//
// Both scans are substring and threshold matches over node names and
// locations. Their output is a prioritization signal for where to look
// first; it never establishes what a function's actual cost or complexity is.

use crate::config::{AsyncThresholds, ComplexityThresholds};
use crate::profile::tree::{CpuProfile, ProfileNode};
use serde::Serialize;
use std::fmt;

/// Category of asynchronous machinery a node appears to belong to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AsyncPattern {
    Promise,
    Await,
    Callback,
}

impl AsyncPattern {
    pub const ALL: [AsyncPattern; 3] = [Self::Promise, Self::Await, Self::Callback];

    pub fn matches(self, node: &ProfileNode) -> bool {
        let name = &node.call_frame.function_name;
        match self {
            Self::Promise => {
                name.contains("Promise") || node.call_frame.url.to_lowercase().contains("async")
            }
            Self::Await => name.to_lowercase().contains("await"),
            Self::Callback => name.to_lowercase().contains("callback"),
        }
    }

    fn threshold(self, thresholds: &AsyncThresholds) -> f64 {
        match self {
            Self::Promise => thresholds.promise_percent,
            Self::Await => thresholds.await_percent,
            Self::Callback => thresholds.callback_percent,
        }
    }

    fn flag(self, percent: f64) -> String {
        match self {
            Self::Promise => format!(
                "High Promise overhead ({percent:.1}% of time) - consider reducing async operations"
            ),
            Self::Await => format!(
                "Significant time in await ({percent:.1}%) - check for blocking async operations"
            ),
            Self::Callback => format!(
                "Callback overhead detected ({percent:.1}%) - consider using async/await"
            ),
        }
    }
}

impl fmt::Display for AsyncPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Promise => write!(f, "promise"),
            Self::Await => write!(f, "await"),
            Self::Callback => write!(f, "callback"),
        }
    }
}

/// Inclusive cost attributed to one async pattern
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AsyncBucket {
    pub pattern: AsyncPattern,
    pub node_count: usize,
    pub samples: u64,
    pub percent: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AsyncReport {
    pub buckets: Vec<AsyncBucket>,
    /// One entry per bucket whose share exceeded its threshold
    pub flags: Vec<String>,
}

impl AsyncReport {
    pub fn bucket(&self, pattern: AsyncPattern) -> Option<&AsyncBucket> {
        self.buckets.iter().find(|b| b.pattern == pattern)
    }

    pub fn summary(&self) -> String {
        if self.flags.is_empty() {
            "No significant async performance issues detected".to_string()
        } else {
            self.flags.join("; ")
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

/// Why a function was flagged
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ComplexitySignal {
    HighSelfTime { percent: f64 },
    Keyword { keyword: String },
    DeepNestedWork { gap_percent: f64 },
}

/// Candidate super-linear function; a hint, not a measurement
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComplexityFinding {
    pub id: u64,
    pub function: String,
    pub url: String,
    pub line: i64,
    pub self_percent: f64,
    pub total_percent: f64,
    pub severity: Severity,
    pub signals: Vec<ComplexitySignal>,
}

impl ComplexityFinding {
    pub fn to_report_string(&self) -> String {
        let reasons: Vec<String> = self
            .signals
            .iter()
            .map(|s| match s {
                ComplexitySignal::HighSelfTime { percent } => format!("{percent:.1}% self time"),
                ComplexitySignal::Keyword { keyword } => format!("name suggests '{keyword}'"),
                ComplexitySignal::DeepNestedWork { gap_percent } => {
                    format!("{gap_percent:.1}% spent in callees")
                }
            })
            .collect();
        format!(
            "[{:?}] {} ({}:{}): {}",
            self.severity,
            self.function,
            self.url,
            self.line,
            reasons.join(", ")
        )
    }
}

const SYNTHETIC_FRAMES: &[&str] = &["(root)", "(program)", "(idle)", "(garbage collector)"];

impl CpuProfile {
    /// Bucket nodes by async pattern and flag buckets above their thresholds
    pub fn detect_async_issues(&self, thresholds: &AsyncThresholds) -> AsyncReport {
        let mut buckets = Vec::with_capacity(AsyncPattern::ALL.len());
        let mut flags = Vec::new();

        for pattern in AsyncPattern::ALL {
            let matched: Vec<&ProfileNode> =
                self.nodes.iter().filter(|n| pattern.matches(n)).collect();
            let samples = matched
                .iter()
                .fold(0u64, |acc, n| acc.saturating_add(n.inclusive_samples));
            let percent = self.percent(samples);

            if percent > pattern.threshold(thresholds) {
                flags.push(pattern.flag(percent));
            }
            buckets.push(AsyncBucket {
                pattern,
                node_count: matched.len(),
                samples,
                percent,
            });
        }

        AsyncReport { buckets, flags }
    }

    /// Rank functions that look like candidates for super-linear work
    ///
    /// Self-time tiers decide severity; keyword and nested-work signals
    /// alone only raise an `Info` finding.
    pub fn complexity_heuristics(&self, thresholds: &ComplexityThresholds) -> Vec<ComplexityFinding> {
        let mut findings: Vec<ComplexityFinding> = self
            .nodes
            .iter()
            .filter(|n| !SYNTHETIC_FRAMES.contains(&n.call_frame.function_name.as_str()))
            .filter_map(|node| self.complexity_finding(node, thresholds))
            .collect();

        findings.sort_by(|a, b| {
            b.severity
                .cmp(&a.severity)
                .then(b.self_percent.total_cmp(&a.self_percent))
                .then(a.id.cmp(&b.id))
        });
        findings
    }

    fn complexity_finding(
        &self,
        node: &ProfileNode,
        thresholds: &ComplexityThresholds,
    ) -> Option<ComplexityFinding> {
        let self_percent = self.percent(node.self_samples);
        let total_percent = self.percent(node.inclusive_samples);
        let mut signals = Vec::new();

        let severity = if self_percent >= thresholds.critical_self_percent {
            Some(Severity::Critical)
        } else if self_percent >= thresholds.warning_self_percent {
            Some(Severity::Warning)
        } else {
            None
        };
        if severity.is_some() {
            signals.push(ComplexitySignal::HighSelfTime {
                percent: self_percent,
            });
        }

        if self_percent >= thresholds.keyword_min_self_percent {
            let name = node.call_frame.function_name.to_lowercase();
            if let Some(keyword) = thresholds.keywords.iter().find(|k| name.contains(k.as_str())) {
                signals.push(ComplexitySignal::Keyword {
                    keyword: keyword.clone(),
                });
            }
        }

        let gap_percent = total_percent - self_percent;
        if gap_percent >= thresholds.nested_gap_percent {
            signals.push(ComplexitySignal::DeepNestedWork { gap_percent });
        }

        if signals.is_empty() {
            return None;
        }

        Some(ComplexityFinding {
            id: node.id,
            function: node.call_frame.display_name().to_string(),
            url: node.call_frame.url.clone(),
            line: node.call_frame.line_number,
            self_percent,
            total_percent,
            severity: severity.unwrap_or(Severity::Info),
            signals,
        })
    }
}
