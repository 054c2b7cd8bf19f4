//! Configuration for the inspector client and the profile heuristics
//!
//! Both structs deserialize from TOML so a debugging session can be tuned
//! without recompiling:
//!
//! ```toml
//! [client]
//! host = "127.0.0.1"
//! port = 9229
//! command_timeout_ms = 10000
//!
//! [analysis.async_thresholds]
//! promise_percent = 20.0
//! ```

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

/// How to pick one target out of the discovery listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TargetSelector {
    /// First target returned by the endpoint (the usual single-isolate case)
    #[default]
    First,
    /// Target whose `id` matches
    Id(String),
    /// Target at this position in the listing
    Index(usize),
}

/// Connection and timing settings for [`crate::client::InspectorClient`]
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Inspector host (the `--inspect` bind address)
    pub host: String,

    /// Inspector port (9229 for `--inspect` without an explicit port)
    pub port: u16,

    /// Which discovered target to attach to
    pub target: TargetSelector,

    /// Budget for a single command's response
    pub command_timeout_ms: u64,

    /// How long to collect snapshot chunks when progress reporting is off
    pub capture_grace_ms: u64,

    /// Upper bound on waiting for the `finished` progress notification
    pub capture_progress_timeout_ms: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 9229,
            target: TargetSelector::First,
            command_timeout_ms: 10_000,
            capture_grace_ms: 5_000,
            capture_progress_timeout_ms: 30_000,
        }
    }
}

impl ClientConfig {
    /// Loopback inspector on a non-default port
    pub fn local(port: u16) -> Self {
        Self {
            port,
            ..Self::default()
        }
    }

    pub fn with_command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout_ms = duration_ms(timeout);
        self
    }

    pub fn with_capture_grace(mut self, grace: Duration) -> Self {
        self.capture_grace_ms = duration_ms(grace);
        self
    }

    pub fn with_progress_timeout(mut self, timeout: Duration) -> Self {
        self.capture_progress_timeout_ms = duration_ms(timeout);
        self
    }

    pub fn with_target(mut self, target: TargetSelector) -> Self {
        self.target = target;
        self
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_millis(self.command_timeout_ms)
    }

    pub fn capture_grace(&self) -> Duration {
        Duration::from_millis(self.capture_grace_ms)
    }

    pub fn capture_progress_timeout(&self) -> Duration {
        Duration::from_millis(self.capture_progress_timeout_ms)
    }

    /// Discovery listing URL (`GET /json`)
    pub fn discovery_url(&self) -> String {
        format!("http://{}:{}/json", self.host, self.port)
    }
}

fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// Share-of-time thresholds (percent of total samples) for async flags
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AsyncThresholds {
    pub promise_percent: f64,
    pub await_percent: f64,
    pub callback_percent: f64,
}

impl Default for AsyncThresholds {
    fn default() -> Self {
        Self {
            promise_percent: 20.0,
            await_percent: 15.0,
            callback_percent: 10.0,
        }
    }
}

/// Signal thresholds for the super-linear function heuristic
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ComplexityThresholds {
    /// Self-time share at or above which a function is flagged critical
    pub critical_self_percent: f64,

    /// Self-time share at or above which a function is flagged as a warning
    pub warning_self_percent: f64,

    /// Minimum self-time share before a name keyword counts as a signal
    pub keyword_min_self_percent: f64,

    /// Inclusive minus self share that suggests deep nested work
    pub nested_gap_percent: f64,

    /// Lowercase substrings suggestive of iteration or comparison
    pub keywords: Vec<String>,
}

impl Default for ComplexityThresholds {
    fn default() -> Self {
        Self {
            critical_self_percent: 50.0,
            warning_self_percent: 20.0,
            keyword_min_self_percent: 5.0,
            nested_gap_percent: 40.0,
            keywords: [
                "sort", "search", "find", "filter", "loop", "iterate", "each", "compare",
                "includes", "indexof", "nested", "match",
            ]
            .iter()
            .map(|k| k.to_string())
            .collect(),
        }
    }
}

/// Tunables for the profile heuristics
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AnalysisConfig {
    pub async_thresholds: AsyncThresholds,
    pub complexity: ComplexityThresholds,
}

impl AnalysisConfig {
    /// Flag only overwhelming hotspots
    pub fn strict() -> Self {
        Self {
            async_thresholds: AsyncThresholds {
                promise_percent: 35.0,
                await_percent: 25.0,
                callback_percent: 20.0,
            },
            complexity: ComplexityThresholds {
                critical_self_percent: 70.0,
                warning_self_percent: 35.0,
                keyword_min_self_percent: 10.0,
                nested_gap_percent: 60.0,
                ..ComplexityThresholds::default()
            },
        }
    }

    /// Surface weaker signals early
    pub fn permissive() -> Self {
        Self {
            async_thresholds: AsyncThresholds {
                promise_percent: 10.0,
                await_percent: 8.0,
                callback_percent: 5.0,
            },
            complexity: ComplexityThresholds {
                critical_self_percent: 30.0,
                warning_self_percent: 10.0,
                keyword_min_self_percent: 2.0,
                nested_gap_percent: 25.0,
                ..ComplexityThresholds::default()
            },
        }
    }
}

/// Combined configuration file layout
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub client: ClientConfig,
    pub analysis: AnalysisConfig,
}

impl Config {
    /// Load configuration from a TOML file; absent sections keep their defaults
    pub fn from_toml<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref()).with_context(|| {
            format!("Failed to read config file: {}", path.as_ref().display())
        })?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Config =
            toml::from_str(content).with_context(|| "Failed to parse TOML configuration")?;

        let complexity = &config.analysis.complexity;
        if complexity.warning_self_percent > complexity.critical_self_percent {
            anyhow::bail!(
                "warning_self_percent ({}) must not exceed critical_self_percent ({})",
                complexity.warning_self_percent,
                complexity.critical_self_percent
            );
        }

        Ok(config)
    }
}
