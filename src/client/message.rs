// Protocol envelopes
//
// Outbound: {id, method, params?}
// Inbound:  {id, result? | error?} for responses, {method, params?} for
//           notifications (no id)

use crate::error::{InspectError, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use thiserror::Error;

/// Notification methods the client understands, with a fallback for the rest
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum NotificationKind {
    DebuggerPaused,
    DebuggerResumed,
    ScriptParsed,
    AddHeapSnapshotChunk,
    ReportHeapSnapshotProgress,
    ConsoleApiCalled,
    ExceptionThrown,
    ExecutionContextCreated,
    Unknown(String),
}

impl NotificationKind {
    pub fn from_method(method: &str) -> Self {
        match method {
            "Debugger.paused" => Self::DebuggerPaused,
            "Debugger.resumed" => Self::DebuggerResumed,
            "Debugger.scriptParsed" => Self::ScriptParsed,
            "HeapProfiler.addHeapSnapshotChunk" => Self::AddHeapSnapshotChunk,
            "HeapProfiler.reportHeapSnapshotProgress" => Self::ReportHeapSnapshotProgress,
            "Runtime.consoleAPICalled" => Self::ConsoleApiCalled,
            "Runtime.exceptionThrown" => Self::ExceptionThrown,
            "Runtime.executionContextCreated" => Self::ExecutionContextCreated,
            other => Self::Unknown(other.to_string()),
        }
    }

    pub fn method(&self) -> &str {
        match self {
            Self::DebuggerPaused => "Debugger.paused",
            Self::DebuggerResumed => "Debugger.resumed",
            Self::ScriptParsed => "Debugger.scriptParsed",
            Self::AddHeapSnapshotChunk => "HeapProfiler.addHeapSnapshotChunk",
            Self::ReportHeapSnapshotProgress => "HeapProfiler.reportHeapSnapshotProgress",
            Self::ConsoleApiCalled => "Runtime.consoleAPICalled",
            Self::ExceptionThrown => "Runtime.exceptionThrown",
            Self::ExecutionContextCreated => "Runtime.executionContextCreated",
            Self::Unknown(method) => method,
        }
    }
}

impl fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.method())
    }
}

/// An unsolicited message from the remote
#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    pub kind: NotificationKind,
    /// Always an object; absent params decode as `{}`
    pub params: Value,
}

#[derive(Debug, Serialize)]
pub(crate) struct CommandEnvelope<'a> {
    pub id: u64,
    pub method: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<&'a Value>,
}

#[derive(Debug, Deserialize)]
struct RawInbound {
    id: Option<u64>,
    method: Option<String>,
    #[serde(default)]
    params: Option<Value>,
    result: Option<Value>,
    error: Option<RawRemoteError>,
}

#[derive(Debug, Deserialize)]
struct RawRemoteError {
    #[serde(default)]
    code: i64,
    #[serde(default)]
    message: String,
}

#[derive(Debug)]
pub(crate) enum Inbound {
    Response { id: u64, outcome: Result<Value> },
    Notification(Notification),
}

/// Inbound text that is neither a response nor a notification
#[derive(Error, Debug)]
#[error("malformed inbound message: {0}")]
pub(crate) struct MalformedMessage(String);

pub(crate) fn parse_inbound(text: &str) -> std::result::Result<Inbound, MalformedMessage> {
    let raw: RawInbound =
        serde_json::from_str(text).map_err(|e| MalformedMessage(e.to_string()))?;

    if let Some(id) = raw.id {
        let outcome = match raw.error {
            Some(error) => Err(InspectError::Remote {
                code: error.code,
                message: error.message,
            }),
            None => Ok(raw.result.unwrap_or_else(|| Value::Object(Map::new()))),
        };
        return Ok(Inbound::Response { id, outcome });
    }

    match raw.method {
        Some(method) => Ok(Inbound::Notification(Notification {
            kind: NotificationKind::from_method(&method),
            params: match raw.params {
                Some(Value::Null) | None => Value::Object(Map::new()),
                Some(params) => params,
            },
        })),
        None => Err(MalformedMessage("neither 'id' nor 'method' present".to_string())),
    }
}
