use std::path::Path;

use crate::error::BuildError;

use super::graph::ClusterDef;
use super::types::EngineConfig;

pub const CONFIG_ENV: &str = "DAGFLOW_CONFIG";
pub const LOG_ENV: &str = "DAGFLOW_LOG";

/// Load the engine config.
///
/// Priority: explicit path, then `$DAGFLOW_CONFIG`, then `./dagflow.toml`, then defaults.
/// `$DAGFLOW_LOG` overrides the logging level.
pub fn load_engine_config(path: Option<&Path>) -> anyhow::Result<EngineConfig> {
    let env_path = std::env::var(CONFIG_ENV)
        .ok()
        .filter(|v| !v.trim().is_empty());
    let local = Path::new("dagflow.toml");

    let mut cfg = match (path, env_path) {
        (Some(p), _) => parse_engine_config(&std::fs::read_to_string(p)?)?,
        (None, Some(p)) => parse_engine_config(&std::fs::read_to_string(p)?)?,
        (None, None) if local.exists() => parse_engine_config(&std::fs::read_to_string(local)?)?,
        (None, None) => EngineConfig::default(),
    };

    if let Ok(v) = std::env::var(LOG_ENV) {
        if !v.trim().is_empty() {
            cfg.logging.level = v;
        }
    }

    Ok(cfg)
}

pub fn parse_engine_config(s: &str) -> anyhow::Result<EngineConfig> {
    Ok(toml::from_str::<EngineConfig>(s)?)
}

pub fn parse_cluster(s: &str) -> Result<ClusterDef, BuildError> {
    Ok(toml::from_str::<ClusterDef>(s)?)
}

/// Read a cluster document; the cluster is named after the file stem.
pub fn load_cluster_file(path: &Path) -> Result<(String, ClusterDef), BuildError> {
    let content = std::fs::read_to_string(path)?;
    let def = parse_cluster(&content)?;
    let name = path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();
    Ok((name, def))
}
