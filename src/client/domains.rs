// Typed wrappers over Debugger, Runtime, HeapProfiler and Profiler commands

use crate::client::InspectorClient;
use crate::error::{InspectError, Result};
use crate::profile::CpuProfile;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::fs;
use std::path::Path;

/// Script position as the Debugger domain reports it (zero-based)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Location {
    pub script_id: String,
    pub line_number: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub column_number: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Breakpoint {
    pub breakpoint_id: String,
    pub actual_location: Location,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PauseOnExceptions {
    #[default]
    None,
    Uncaught,
    All,
}

impl PauseOnExceptions {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Uncaught => "uncaught",
            Self::All => "all",
        }
    }
}

fn field<T: DeserializeOwned>(result: &Value, name: &str) -> Result<T> {
    let value = result.get(name).cloned().unwrap_or(Value::Null);
    Ok(serde_json::from_value(value)?)
}

fn exception_text(details: &Value) -> String {
    details
        .pointer("/exception/description")
        .and_then(Value::as_str)
        .or_else(|| details.get("text").and_then(Value::as_str))
        .map_or_else(|| details.to_string(), str::to_string)
}

impl InspectorClient {
    /// Enable the Debugger and Runtime domains
    pub async fn enable_debugger(&self) -> Result<()> {
        self.send_command("Debugger.enable", None).await?;
        self.send_command("Runtime.enable", None).await?;
        Ok(())
    }

    pub async fn disable_debugger(&self) -> Result<()> {
        self.send_command("Debugger.disable", None).await?;
        Ok(())
    }

    pub async fn set_breakpoint(&self, location: &Location, condition: Option<&str>) -> Result<Breakpoint> {
        let mut params = json!({ "location": location });
        if let Some(condition) = condition {
            params["condition"] = json!(condition);
        }
        let result = self.send_command("Debugger.setBreakpoint", Some(params)).await?;
        Ok(serde_json::from_value(result)?)
    }

    /// Breakpoint on every script whose URL matches `url_regex`, including
    /// scripts not yet loaded; returns the breakpoint id
    pub async fn set_breakpoint_by_url(
        &self,
        url_regex: &str,
        line: i64,
        column: i64,
        condition: Option<&str>,
    ) -> Result<String> {
        let mut params = json!({
            "urlRegex": url_regex,
            "lineNumber": line,
            "columnNumber": column,
        });
        if let Some(condition) = condition {
            params["condition"] = json!(condition);
        }
        let result = self.send_command("Debugger.setBreakpointByUrl", Some(params)).await?;
        field(&result, "breakpointId")
    }

    pub async fn remove_breakpoint(&self, breakpoint_id: &str) -> Result<()> {
        self.send_command(
            "Debugger.removeBreakpoint",
            Some(json!({ "breakpointId": breakpoint_id })),
        )
        .await?;
        Ok(())
    }

    pub async fn pause(&self) -> Result<()> {
        self.send_command("Debugger.pause", None).await?;
        Ok(())
    }

    pub async fn resume(&self) -> Result<()> {
        self.send_command("Debugger.resume", None).await?;
        Ok(())
    }

    pub async fn step_over(&self) -> Result<()> {
        self.send_command("Debugger.stepOver", None).await?;
        Ok(())
    }

    pub async fn step_into(&self) -> Result<()> {
        self.send_command("Debugger.stepInto", None).await?;
        Ok(())
    }

    pub async fn step_out(&self) -> Result<()> {
        self.send_command("Debugger.stepOut", None).await?;
        Ok(())
    }

    pub async fn set_pause_on_exceptions(&self, state: PauseOnExceptions) -> Result<()> {
        self.send_command(
            "Debugger.setPauseOnExceptions",
            Some(json!({ "state": state.as_str() })),
        )
        .await?;
        Ok(())
    }

    /// Evaluate an expression on a paused call frame, or globally
    ///
    /// Returns the remote object. An expression that throws is an
    /// [`InspectError::Evaluation`].
    pub async fn evaluate(
        &self,
        expression: &str,
        call_frame_id: Option<&str>,
        context_id: Option<u64>,
    ) -> Result<Value> {
        let result = match call_frame_id {
            Some(frame) => {
                self.send_command(
                    "Debugger.evaluateOnCallFrame",
                    Some(json!({ "callFrameId": frame, "expression": expression })),
                )
                .await?
            }
            None => {
                let mut params = json!({ "expression": expression });
                if let Some(context) = context_id {
                    params["contextId"] = json!(context);
                }
                self.send_command("Runtime.evaluate", Some(params)).await?
            }
        };

        if let Some(details) = result.get("exceptionDetails") {
            return Err(InspectError::Evaluation(exception_text(details)));
        }
        Ok(result.get("result").cloned().unwrap_or(Value::Null))
    }

    /// Own property descriptors of a remote object
    pub async fn get_properties(&self, object_id: &str) -> Result<Vec<Value>> {
        let result = self
            .send_command(
                "Runtime.getProperties",
                Some(json!({ "objectId": object_id, "ownProperties": true })),
            )
            .await?;
        Ok(result
            .get("result")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default())
    }

    /// Variables visible from a paused call frame, innermost scope first
    ///
    /// Names shadowed by an inner scope keep the inner value. Unknown frame
    /// ids yield an empty map.
    pub async fn get_scope_variables(&self, call_frame_id: &str) -> Result<Map<String, Value>> {
        let frame = self
            .call_frames()
            .into_iter()
            .find(|f| f.get("callFrameId").and_then(Value::as_str) == Some(call_frame_id));
        let Some(frame) = frame else {
            return Ok(Map::new());
        };

        let scope_objects: Vec<String> = frame
            .get("scopeChain")
            .and_then(Value::as_array)
            .map(|chain| {
                chain
                    .iter()
                    .filter_map(|scope| scope.pointer("/object/objectId").and_then(Value::as_str))
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        let mut variables = Map::new();
        for object_id in scope_objects {
            for property in self.get_properties(&object_id).await? {
                let Some(name) = property.get("name").and_then(Value::as_str) else {
                    continue;
                };
                if name.is_empty() || variables.contains_key(name) {
                    continue;
                }
                let value = property.get("value").cloned().unwrap_or(Value::Null);
                variables.insert(name.to_string(), value);
            }
        }
        Ok(variables)
    }

    pub async fn enable_heap_profiler(&self) -> Result<()> {
        self.send_command("HeapProfiler.enable", None).await?;
        Ok(())
    }

    /// Enable the Profiler domain and start sampling
    pub async fn start_profiling(&self) -> Result<()> {
        self.send_command("Profiler.enable", None).await?;
        self.send_command("Profiler.start", None).await?;
        Ok(())
    }

    /// Stop sampling and return the profile payload undecoded
    pub async fn stop_profiling_raw(&self) -> Result<Value> {
        let mut result = self.send_command("Profiler.stop", None).await?;
        result
            .get_mut("profile")
            .map(Value::take)
            .ok_or_else(|| InspectError::malformed_profile(0, "Profiler.stop result has no profile"))
    }

    /// Stop sampling and decode the recorded profile
    pub async fn stop_profiling(&self) -> Result<CpuProfile> {
        CpuProfile::from_value(self.stop_profiling_raw().await?)
    }

    /// Stop sampling, write the payload as a `.cpuprofile` file, and decode it
    ///
    /// The file is written before decoding, so a payload that fails to
    /// decode is still kept for inspection.
    pub async fn stop_profiling_to_file<P: AsRef<Path>>(&self, path: P) -> Result<CpuProfile> {
        let profile = self.stop_profiling_raw().await?;
        fs::write(path.as_ref(), serde_json::to_string(&profile)?)?;
        tracing::debug!(path = %path.as_ref().display(), "cpu profile saved");
        CpuProfile::from_value(profile)
    }
}
