//! Error taxonomy for the inspector client and the snapshot decoders
//!
//! Every fallible operation in the crate returns [`InspectError`]. Transport
//! failures, remote error envelopes, and payload contract violations are kept
//! as distinct variants so callers can decide what is retryable.

use thiserror::Error;

/// Errors raised by the protocol client, decoders, and analysis queries
#[derive(Error, Debug)]
pub enum InspectError {
    /// The channel could not be established (no target, HTTP or websocket failure)
    #[error("Connection failed: {0}")]
    Connection(String),

    /// An established channel closed while commands were outstanding
    #[error("Connection lost")]
    ConnectionLost,

    /// No response arrived within the command budget
    #[error("Command '{method}' (id {id}) timed out after {timeout_ms}ms")]
    Timeout {
        id: u64,
        method: String,
        timeout_ms: u128,
    },

    /// The remote answered with an explicit error envelope
    #[error("Remote error {code}: {message}")]
    Remote { code: i64, message: String },

    /// An evaluated expression threw inside the remote runtime
    #[error("Evaluation error: {0}")]
    Evaluation(String),

    /// Heap snapshot payload violates its field/positional contract
    #[error("Malformed heap snapshot at offset {offset}: {reason}")]
    MalformedSnapshot { offset: usize, reason: String },

    /// CPU profile payload violates its structural contract
    #[error("Malformed profile at offset {offset}: {reason}")]
    MalformedProfile { offset: usize, reason: String },

    /// The query needs a capability this decoded instance was built without
    #[error("Feature disabled: {0}")]
    FeatureDisabled(&'static str),

    /// No node with this id exists in the decoded structure
    #[error("Unknown node id: {0}")]
    UnknownNode(u64),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl InspectError {
    pub(crate) fn malformed_snapshot(offset: usize, reason: impl Into<String>) -> Self {
        Self::MalformedSnapshot {
            offset,
            reason: reason.into(),
        }
    }

    pub(crate) fn malformed_profile(offset: usize, reason: impl Into<String>) -> Self {
        Self::MalformedProfile {
            offset,
            reason: reason.into(),
        }
    }

    /// Whether retrying the same operation could plausibly succeed
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Timeout { .. } | Self::ConnectionLost)
    }
}

/// Result type for inspector operations
pub type Result<T> = std::result::Result<T, InspectError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_malformed_snapshot_message_carries_offset() {
        let err = InspectError::malformed_snapshot(42, "edge target out of range");
        assert_eq!(
            err.to_string(),
            "Malformed heap snapshot at offset 42: edge target out of range"
        );
    }

    #[test]
    fn test_remote_error_verbatim() {
        let err = InspectError::Remote {
            code: -32601,
            message: "'Foo.bar' wasn't found".to_string(),
        };
        assert_eq!(err.to_string(), "Remote error -32601: 'Foo.bar' wasn't found");
    }

    #[test]
    fn test_transient_classification() {
        let timeout = InspectError::Timeout {
            id: 1,
            method: "Runtime.evaluate".to_string(),
            timeout_ms: 50,
        };
        assert!(timeout.is_transient());
        assert!(InspectError::ConnectionLost.is_transient());
        assert!(!InspectError::FeatureDisabled("retention index").is_transient());
    }
}
