// Target discovery over the inspector's HTTP listing (`GET /json`)

use crate::config::{ClientConfig, TargetSelector};
use crate::error::{InspectError, Result};
use serde::{Deserialize, Serialize};

/// One inspectable target from the discovery listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct TargetInfo {
    pub id: String,
    pub title: String,
    pub description: String,
    pub url: String,
    #[serde(rename = "type")]
    pub target_type: String,
    pub web_socket_debugger_url: Option<String>,
}

/// Runtime flavor behind a target, guessed from its title and description
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RuntimeKind {
    Deno,
    Node,
    Unknown,
}

impl RuntimeKind {
    pub fn detect(target: &TargetInfo) -> Self {
        let description = target.description.to_lowercase();
        let title = target.title.to_lowercase();
        if description.contains("deno") || title.contains("deno") {
            Self::Deno
        } else if description.contains("node") || title.contains("node") {
            Self::Node
        } else {
            Self::Unknown
        }
    }
}

/// Fetch the target listing
pub async fn list_targets(config: &ClientConfig) -> Result<Vec<TargetInfo>> {
    let url = config.discovery_url();
    let response = reqwest::get(&url)
        .await
        .map_err(|e| InspectError::Connection(format!("HTTP request to {url} failed: {e}")))?;

    let status = response.status();
    if !status.is_success() {
        return Err(InspectError::Connection(format!(
            "discovery endpoint {url} returned {status}"
        )));
    }

    let body = response
        .text()
        .await
        .map_err(|e| InspectError::Connection(format!("reading {url} failed: {e}")))?;
    parse_targets(&body)
}

pub(crate) fn parse_targets(body: &str) -> Result<Vec<TargetInfo>> {
    serde_json::from_str(body)
        .map_err(|e| InspectError::Connection(format!("invalid discovery listing: {e}")))
}

/// Pick one target per the selector
pub fn select_target<'a>(targets: &'a [TargetInfo], selector: &TargetSelector) -> Result<&'a TargetInfo> {
    let target = match selector {
        TargetSelector::First => targets.first(),
        TargetSelector::Id(id) => targets.iter().find(|t| &t.id == id),
        TargetSelector::Index(index) => targets.get(*index),
    };

    target.ok_or_else(|| {
        if targets.is_empty() {
            InspectError::Connection("No debugger targets found".to_string())
        } else {
            InspectError::Connection(format!(
                "no target matches {selector:?} among {} targets",
                targets.len()
            ))
        }
    })
}
