use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Process-level settings read from `dagflow.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub events_out: EventsOutConfig,

    /// Cluster documents loaded at start-up. The cluster name is the file stem.
    #[serde(default)]
    pub clusters: Vec<PathBuf>,
}

/// Where tracing output goes. Missing keys take the `Default` values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub enabled: bool,
    /// stderr layer.
    pub console: bool,
    /// `dagflow.<pid>.log` under `directory`, or `<tmp>/dagflow` when unset.
    pub file: bool,
    /// EnvFilter directive, e.g. `info` or `dagflow_core=debug`. `$DAGFLOW_LOG` overrides it.
    pub level: String,
    pub directory: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            console: true,
            file: false,
            level: "info".to_string(),
            directory: None,
        }
    }
}

impl LoggingConfig {
    /// Directory for the log file; blank entries fall back to the temp dir.
    pub fn log_dir(&self) -> PathBuf {
        self.directory
            .as_ref()
            .filter(|d| !d.as_os_str().is_empty())
            .cloned()
            .unwrap_or_else(|| std::env::temp_dir().join("dagflow"))
    }
}

/// JSONL sink for execution events. `path = "stdout:"` writes to standard output.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EventsOutConfig {
    pub enabled: bool,
    pub path: String,
    /// Bound of the collector channel; events beyond it are dropped and counted.
    pub channel_capacity: usize,
}

impl Default for EventsOutConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            path: "./dagflow.events.jsonl".to_string(),
            channel_capacity: 2048,
        }
    }
}
