// Profile decoder and analysis tests

use super::*;
use crate::config::{AsyncThresholds, ComplexityThresholds};
use crate::error::InspectError;
use serde_json::{json, Value};

fn frame(name: &str, url: &str, line: i64) -> Value {
    json!({ "functionName": name, "scriptId": "42", "url": url, "lineNumber": line, "columnNumber": 0 })
}

/// (root) -> main -> {sortItems, awaitHelper}, (root) -> (idle)
///
/// 100 samples: main 10, sortItems 60, awaitHelper 5, (idle) 25
fn app_profile() -> Value {
    let mut samples = Vec::new();
    samples.extend(std::iter::repeat(2).take(10));
    samples.extend(std::iter::repeat(3).take(60));
    samples.extend(std::iter::repeat(4).take(5));
    samples.extend(std::iter::repeat(5).take(25));

    json!({
        "nodes": [
            { "id": 1, "callFrame": frame("(root)", "", -1), "hitCount": 0, "children": [2, 5] },
            { "id": 2, "callFrame": frame("main", "file:///app/main.js", 0), "hitCount": 10, "children": [3, 4] },
            {
                "id": 3,
                "callFrame": frame("sortItems", "file:///app/main.js", 12),
                "hitCount": 60,
                "deoptReason": "Insufficient type feedback"
            },
            {
                "id": 4,
                "callFrame": frame("awaitHelper", "file:///app/lib.js", 3),
                "hitCount": 5,
                "bailoutReason": "no reason"
            },
            { "id": 5, "callFrame": frame("(idle)", "", -1), "hitCount": 25 }
        ],
        "startTime": 0,
        "endTime": 100_000,
        "samples": samples,
        "timeDeltas": vec![1000; 100],
    })
}

fn decode(value: Value) -> CpuProfile {
    CpuProfile::from_value(value).unwrap()
}

#[test]
fn test_self_and_inclusive_counts() {
    let profile = decode(app_profile());

    assert_eq!(profile.total_samples(), 100);
    assert_eq!(profile.node(3).unwrap().self_samples, 60);
    assert_eq!(profile.node(2).unwrap().inclusive_samples, 75);
    assert_eq!(profile.node(1).unwrap().inclusive_samples, 100);

    for node in profile.nodes() {
        assert!(node.inclusive_samples >= node.self_samples);
    }
}

#[test]
fn test_explicit_parent_links() {
    let profile = decode(app_profile());

    assert_eq!(profile.node(3).unwrap().parent, Some(2));
    assert_eq!(profile.parent_of(2).unwrap().id, 1);
    assert!(profile.parent_of(1).is_none());

    let roots: Vec<u64> = profile.roots().map(|n| n.id).collect();
    assert_eq!(roots, vec![1]);

    let children: Vec<u64> = profile.children_of(2).iter().map(|n| n.id).collect();
    assert_eq!(children, vec![3, 4]);
}

#[test]
fn test_hot_functions_by_inclusive() {
    let profile = decode(app_profile());
    let ids: Vec<u64> = profile.hot_functions(3).iter().map(|f| f.id).collect();
    assert_eq!(ids, vec![1, 2, 3]);

    let sort = &profile.hot_functions(10)[2];
    assert_eq!(sort.function_name, "sortItems");
    assert!((sort.self_percent - 60.0).abs() < 1e-9);
}

#[test]
fn test_call_tree_truncates_at_depth() {
    let profile = decode(app_profile());
    let tree = profile.call_tree(None, 1).unwrap().unwrap();

    assert_eq!(tree.id, 1);
    assert!(!tree.truncated);
    assert_eq!(tree.children.len(), 2);

    let main = &tree.children[0];
    assert_eq!(main.function_name, "main");
    assert!(main.truncated);
    assert!(main.children.is_empty());

    let idle = &tree.children[1];
    assert!(!idle.truncated);
}

#[test]
fn test_call_tree_from_explicit_root() {
    let profile = decode(app_profile());
    let tree = profile.call_tree(Some(2), 5).unwrap().unwrap();
    assert_eq!(tree.children.len(), 2);
    assert_eq!(tree.total_samples, 75);

    assert!(matches!(
        profile.call_tree(Some(99), 5),
        Err(InspectError::UnknownNode(99))
    ));
}

#[test]
fn test_hot_paths_include_root() {
    let profile = decode(app_profile());
    let paths = profile.hot_paths(50.0);

    let ids: Vec<u64> = paths.iter().map(|p| p.id).collect();
    assert_eq!(ids, vec![1, 2, 3]);
    assert_eq!(
        paths[2].call_path(),
        "(root):-1 -> main:0 -> sortItems:12"
    );
    assert_eq!(paths[0].path.len(), 1);
}

#[test]
fn test_cycle_terminates() {
    let profile = decode(json!({
        "nodes": [
            { "id": 1, "callFrame": frame("a", "", 1), "hitCount": 2, "children": [2] },
            { "id": 2, "callFrame": frame("b", "", 2), "hitCount": 3, "children": [1] }
        ],
        "samples": [1, 1, 2, 2, 2]
    }));

    assert_eq!(profile.node(1).unwrap().inclusive_samples, 5);
    assert!(profile.roots().next().is_none());
    assert!(profile.call_tree(None, 10).unwrap().is_none());

    let tree = profile.call_tree(Some(1), 10).unwrap().unwrap();
    assert_eq!(tree.children.len(), 1);
    assert!(tree.children[0].children.is_empty());

    assert_eq!(profile.hot_paths(0.0).len(), 2);
}

#[test]
fn test_async_buckets_below_defaults() {
    let profile = decode(app_profile());
    let report = profile.detect_async_issues(&AsyncThresholds::default());

    let await_bucket = report.bucket(AsyncPattern::Await).unwrap();
    assert_eq!(await_bucket.node_count, 1);
    assert_eq!(await_bucket.samples, 5);
    assert_eq!(report.bucket(AsyncPattern::Promise).unwrap().node_count, 0);
    assert!(report.flags.is_empty());
    assert_eq!(report.summary(), "No significant async performance issues detected");
}

#[test]
fn test_async_flag_above_threshold() {
    let profile = decode(app_profile());
    let thresholds = AsyncThresholds {
        await_percent: 4.0,
        ..AsyncThresholds::default()
    };
    let report = profile.detect_async_issues(&thresholds);

    assert_eq!(report.flags.len(), 1);
    assert!(report.summary().starts_with("Significant time in await (5.0%)"));
}

#[test]
fn test_complexity_findings() {
    let profile = decode(app_profile());
    let findings = profile.complexity_heuristics(&ComplexityThresholds::default());

    let names: Vec<&str> = findings.iter().map(|f| f.function.as_str()).collect();
    assert_eq!(names, vec!["sortItems", "main"]);

    let sort = &findings[0];
    assert_eq!(sort.severity, Severity::Critical);
    assert!(sort
        .signals
        .contains(&ComplexitySignal::Keyword { keyword: "sort".to_string() }));
    assert!(sort.to_report_string().starts_with("[Critical] sortItems"));

    let main = &findings[1];
    assert_eq!(main.severity, Severity::Info);
    assert!(matches!(
        main.signals.as_slice(),
        [ComplexitySignal::DeepNestedWork { .. }]
    ));
}

#[test]
fn test_function_times_url_filter() {
    let profile = decode(app_profile());
    let times = profile.function_times(Some("lib.js"));
    assert_eq!(times.len(), 1);
    assert_eq!(times[0].function_name, "awaitHelper");

    assert_eq!(profile.function_times(None).len(), 5);
}

#[test]
fn test_optimization_issues_skip_placeholder_reasons() {
    let profile = decode(app_profile());
    let issues = profile.optimization_issues();

    assert_eq!(issues.len(), 1);
    assert_eq!(issues[0].id, 3);
    assert_eq!(issues[0].issues, vec!["Deopt: Insufficient type feedback".to_string()]);
}

#[test]
fn test_timing_summary() {
    let summary = decode(app_profile()).timing_summary();
    assert!((summary.total_time_ms - 100.0).abs() < 1e-9);
    assert_eq!(summary.sample_count, 100);
    assert!((summary.sample_rate_hz - 1000.0).abs() < 1e-9);
    assert!((summary.mean_interval_us - 1000.0).abs() < 1e-9);
}

#[test]
fn test_hit_counts_tallied_when_absent() {
    let profile = decode(json!({
        "nodes": [
            { "id": 1, "callFrame": frame("(root)", "", -1), "children": [2, 3] },
            { "id": 2, "callFrame": frame("work", "", 1) },
            { "id": 3, "callFrame": frame("", "", 2) }
        ],
        "samples": [2, 2, 3]
    }));

    assert_eq!(profile.node(2).unwrap().self_samples, 2);
    assert_eq!(profile.node(3).unwrap().self_samples, 1);
    assert_eq!(profile.node(1).unwrap().inclusive_samples, 3);
    assert_eq!(profile.node(3).unwrap().call_frame.display_name(), "(anonymous)");
}

#[test]
fn test_empty_profile_has_zero_percentages() {
    let profile = decode(json!({ "nodes": [{ "id": 1, "callFrame": frame("(root)", "", -1) }] }));
    assert_eq!(profile.total_samples(), 0);
    assert!(profile.hot_paths(0.0).iter().all(|p| p.percent == 0.0));
    assert_eq!(profile.timing_summary().sample_rate_hz, 0.0);
}

#[test]
fn test_duplicate_id_is_malformed() {
    let err = CpuProfile::from_value(json!({
        "nodes": [{ "id": 1 }, { "id": 1 }]
    }))
    .unwrap_err();
    assert!(matches!(err, InspectError::MalformedProfile { offset: 1, .. }));
}

#[test]
fn test_unknown_child_is_malformed() {
    let err = CpuProfile::from_value(json!({
        "nodes": [{ "id": 1, "children": [7] }]
    }))
    .unwrap_err();
    assert!(err.to_string().contains("unknown child 7"));
}

#[test]
fn test_unknown_sample_is_malformed() {
    let err = CpuProfile::from_value(json!({
        "nodes": [{ "id": 1 }],
        "samples": [1, 9]
    }))
    .unwrap_err();
    assert!(matches!(err, InspectError::MalformedProfile { offset: 1, .. }));
}

#[test]
fn test_time_delta_length_mismatch_is_malformed() {
    let err = CpuProfile::from_value(json!({
        "nodes": [{ "id": 1 }],
        "samples": [1, 1],
        "timeDeltas": [5]
    }))
    .unwrap_err();
    assert!(err.to_string().contains("1 time deltas for 2 samples"));
}

#[test]
fn test_inclusive_overflow_is_malformed() {
    let err = CpuProfile::from_value(json!({
        "nodes": [
            { "id": 1, "callFrame": frame("(root)", "", -1), "hitCount": u64::MAX, "children": [2] },
            { "id": 2, "callFrame": frame("work", "", 1), "hitCount": 1 }
        ]
    }))
    .unwrap_err();
    assert!(matches!(err, InspectError::MalformedProfile { offset: 1, .. }));
    assert!(err.to_string().contains("overflows"));
}

#[test]
fn test_timing_summary_saturates_on_extreme_times() {
    let profile = decode(json!({
        "nodes": [{ "id": 1, "callFrame": frame("(root)", "", -1) }],
        "startTime": i64::MIN,
        "endTime": i64::MAX,
        "samples": [1, 1],
        "timeDeltas": [i64::MAX, i64::MAX]
    }));

    let summary = profile.timing_summary();
    assert!((summary.total_time_ms - i64::MAX as f64 / 1000.0).abs() < 1.0);
    assert!((summary.mean_interval_us - i64::MAX as f64 / 2.0).abs() < 1.0);
}

#[test]
fn test_load_profile_from_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("run.cpuprofile");
    std::fs::write(&path, app_profile().to_string()).unwrap();

    let profile = load_profile(&path).unwrap();
    assert_eq!(profile.nodes().len(), 5);
    assert_eq!(profile.node(3).unwrap().call_frame.script_id, "42");
}
