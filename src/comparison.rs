//! Snapshot comparison and leak detection
//!
//! Works purely on [`HeapTypeSummary`] values, so summaries may come from a
//! fully decoded [`crate::heap::HeapGraph`] or from the payload fast path.
//! Keys are `(node type, name)` pairs; a key missing from one side counts
//! as zero objects of zero bytes.

use crate::error::Result;
use crate::heap::{HeapTypeSummary, SummaryKey, TypeStats};
use serde::Serialize;
use std::collections::BTreeSet;

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// Growth of one `(type, name)` key between two snapshots
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GrowthRow {
    pub node_type: String,
    pub name: String,
    pub count_before: u64,
    pub count_after: u64,
    pub count_delta: i64,
    pub size_before: u64,
    pub size_after: u64,
    pub size_delta: i64,
}

/// A key that grew in every interval of a snapshot series
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LeakCandidate {
    pub node_type: String,
    pub name: String,
    pub total_growth_bytes: i64,
    pub total_growth_mb: f64,
    pub growth_per_interval_mb: f64,
    pub intervals_growing: usize,
}

impl LeakCandidate {
    pub fn to_report_string(&self) -> String {
        format!(
            "{} [{}]: +{:.2} MB over {} intervals ({:.2} MB/interval)",
            self.name,
            self.node_type,
            self.total_growth_mb,
            self.intervals_growing,
            self.growth_per_interval_mb
        )
    }
}

fn delta(before: u64, after: u64) -> i64 {
    // Saturate rather than wrap on absurd inputs
    let before = i64::try_from(before).unwrap_or(i64::MAX);
    let after = i64::try_from(after).unwrap_or(i64::MAX);
    after.saturating_sub(before)
}

fn all_keys<'a>(summaries: &[&'a HeapTypeSummary]) -> BTreeSet<&'a SummaryKey> {
    summaries.iter().copied().flat_map(HeapTypeSummary::keys).collect()
}

/// Keys that grew in count or size, largest size growth first
pub fn compare(before: &HeapTypeSummary, after: &HeapTypeSummary) -> Vec<GrowthRow> {
    let mut rows: Vec<GrowthRow> = all_keys(&[before, after])
        .into_iter()
        .filter_map(|key| {
            let b = before.get(key).copied().unwrap_or_default();
            let a = after.get(key).copied().unwrap_or_default();
            let row = growth_row(key, b, a);
            (row.count_delta > 0 || row.size_delta > 0).then_some(row)
        })
        .collect();

    rows.sort_by(|x, y| {
        y.size_delta
            .cmp(&x.size_delta)
            .then_with(|| x.node_type.cmp(&y.node_type))
            .then_with(|| x.name.cmp(&y.name))
    });
    rows
}

fn growth_row(key: &SummaryKey, before: TypeStats, after: TypeStats) -> GrowthRow {
    GrowthRow {
        node_type: key.node_type.clone(),
        name: key.name.clone(),
        count_before: before.count,
        count_after: after.count,
        count_delta: delta(before.count, after.count),
        size_before: before.size,
        size_after: after.size,
        size_delta: delta(before.size, after.size),
    }
}

/// Compare two raw snapshot payloads without decoding edges or building a
/// retention index
///
/// Retaining-path analysis is unavailable on this path; decode with
/// [`crate::heap::HeapGraph`] when paths are needed.
pub fn compare_payloads(before: &str, after: &str) -> Result<Vec<GrowthRow>> {
    let before = HeapTypeSummary::from_payload(before)?;
    let after = HeapTypeSummary::from_payload(after)?;
    Ok(compare(&before, &after))
}

/// Keys whose retained size grew in every consecutive interval and whose
/// cumulative growth exceeds `threshold_mb`
///
/// A key that stays flat or shrinks in any interval is excluded. Transient
/// growth is not reported.
pub fn detect_leaks(summaries: &[HeapTypeSummary], threshold_mb: f64) -> Vec<LeakCandidate> {
    if summaries.len() < 2 {
        return Vec::new();
    }

    let threshold_bytes = threshold_mb * BYTES_PER_MB;
    let refs: Vec<&HeapTypeSummary> = summaries.iter().collect();
    let intervals = summaries.len() - 1;

    let mut leaks: Vec<LeakCandidate> = all_keys(&refs)
        .into_iter()
        .filter_map(|key| {
            let deltas: Vec<i64> = summaries
                .windows(2)
                .map(|pair| {
                    let before = pair[0].get(key).map_or(0, |s| s.size);
                    let after = pair[1].get(key).map_or(0, |s| s.size);
                    delta(before, after)
                })
                .collect();

            if !deltas.iter().all(|&d| d > 0) {
                return None;
            }

            let total = deltas.iter().fold(0i64, |acc, d| acc.saturating_add(*d));
            if (total as f64) <= threshold_bytes {
                return None;
            }

            let total_mb = total as f64 / BYTES_PER_MB;
            Some(LeakCandidate {
                node_type: key.node_type.clone(),
                name: key.name.clone(),
                total_growth_bytes: total,
                total_growth_mb: total_mb,
                growth_per_interval_mb: total_mb / intervals as f64,
                intervals_growing: intervals,
            })
        })
        .collect();

    tracing::debug!(
        snapshots = summaries.len(),
        candidates = leaks.len(),
        "leak detection complete"
    );

    leaks.sort_by(|a, b| {
        b.total_growth_bytes
            .cmp(&a.total_growth_bytes)
            .then_with(|| a.name.cmp(&b.name))
    });
    leaks
}

#[cfg(test)]
mod tests {
    use super::*;

    fn summary(entries: &[(&str, &str, u64, u64)]) -> HeapTypeSummary {
        HeapTypeSummary::from_entries(entries.iter().map(|&(t, n, count, size)| {
            (SummaryKey::new(t, n), TypeStats { count, size })
        }))
    }

    const MB: u64 = 1024 * 1024;

    #[test]
    fn test_compare_identical_is_empty() {
        let s = summary(&[("object", "A", 5, 500), ("string", "", 10, 120)]);
        assert!(compare(&s, &s).is_empty());
    }

    #[test]
    fn test_compare_single_growth() {
        let before = summary(&[("object", "A", 5, 500)]);
        let after = summary(&[("object", "A", 8, 900)]);

        let rows = compare(&before, &after);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].count_delta, 3);
        assert_eq!(rows[0].size_delta, 400);
        assert_eq!(rows[0].size_before, 500);
    }

    #[test]
    fn test_compare_outer_join_and_order() {
        let before = summary(&[("object", "Shrinks", 4, 400), ("object", "Grows", 1, 10)]);
        let after = summary(&[
            ("object", "Shrinks", 2, 200),
            ("object", "Grows", 2, 20),
            ("closure", "New", 3, 300),
        ]);

        let rows = compare(&before, &after);
        let names: Vec<&str> = rows.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["New", "Grows"]);
        assert_eq!(rows[0].count_before, 0);
    }

    #[test]
    fn test_compare_count_growth_without_size_growth() {
        let before = summary(&[("object", "A", 1, 100)]);
        let after = summary(&[("object", "A", 2, 100)]);

        let rows = compare(&before, &after);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].size_delta, 0);
    }

    #[test]
    fn test_detect_leaks_needs_two_snapshots() {
        let s = summary(&[("object", "A", 1, 100)]);
        assert!(detect_leaks(&[], 0.0).is_empty());
        assert!(detect_leaks(&[s], 0.0).is_empty());
    }

    #[test]
    fn test_detect_leaks_monotonic_only() {
        let series = vec![
            summary(&[("object", "Leak", 1, MB), ("object", "Bounce", 1, MB)]),
            summary(&[("object", "Leak", 2, 2 * MB), ("object", "Bounce", 3, 4 * MB)]),
            summary(&[("object", "Leak", 3, 4 * MB), ("object", "Bounce", 1, 2 * MB)]),
            summary(&[("object", "Leak", 4, 5 * MB), ("object", "Bounce", 4, 8 * MB)]),
        ];

        let leaks = detect_leaks(&series, 1.0);
        assert_eq!(leaks.len(), 1);
        assert_eq!(leaks[0].name, "Leak");
        assert_eq!(leaks[0].total_growth_bytes, (4 * MB) as i64);
        assert_eq!(leaks[0].intervals_growing, 3);
        assert!((leaks[0].total_growth_mb - 4.0).abs() < 1e-9);
        assert!((leaks[0].growth_per_interval_mb - 4.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_detect_leaks_threshold() {
        let series = vec![
            summary(&[("object", "Small", 1, 100)]),
            summary(&[("object", "Small", 2, 200)]),
        ];
        assert!(detect_leaks(&series, 1.0).is_empty());
        assert_eq!(detect_leaks(&series, 0.0).len(), 1);
    }

    #[test]
    fn test_detect_leaks_flat_interval_excludes() {
        let series = vec![
            summary(&[("object", "Plateau", 1, MB)]),
            summary(&[("object", "Plateau", 1, MB)]),
            summary(&[("object", "Plateau", 9, 9 * MB)]),
        ];
        assert!(detect_leaks(&series, 1.0).is_empty());
    }

    #[test]
    fn test_leak_report_string() {
        let series = vec![
            summary(&[("object", "Leak", 1, 0)]),
            summary(&[("object", "Leak", 2, 3 * MB)]),
        ];
        let leaks = detect_leaks(&series, 1.0);
        assert_eq!(
            leaks[0].to_report_string(),
            "Leak [object]: +3.00 MB over 1 intervals (3.00 MB/interval)"
        );
    }
}
