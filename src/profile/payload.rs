// Raw CPU profile payload (`Profiler.stop` result / `.cpuprofile` file)

use serde::Deserialize;
use serde_json::Value;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RawCallFrame {
    #[serde(default)]
    pub function_name: String,
    /// String in the protocol, a number in some older exports
    #[serde(default)]
    pub script_id: Value,
    #[serde(default)]
    pub url: String,
    #[serde(default = "unknown_position")]
    pub line_number: i64,
    #[serde(default = "unknown_position")]
    pub column_number: i64,
}

fn unknown_position() -> i64 {
    -1
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RawProfileNode {
    pub id: u64,
    #[serde(default)]
    pub call_frame: RawCallFrame,
    #[serde(default)]
    pub hit_count: Option<u64>,
    #[serde(default)]
    pub children: Vec<u64>,
    #[serde(default)]
    pub deopt_reason: Option<String>,
    #[serde(default)]
    pub bailout_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RawProfile {
    #[serde(default)]
    pub nodes: Vec<RawProfileNode>,
    #[serde(default)]
    pub start_time: i64,
    #[serde(default)]
    pub end_time: i64,
    #[serde(default)]
    pub samples: Vec<u64>,
    #[serde(default)]
    pub time_deltas: Vec<i64>,
}

pub(crate) fn script_id_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}
