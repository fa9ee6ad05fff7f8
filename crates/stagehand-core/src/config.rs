use std::path::{Path, PathBuf};

use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

// Audio DSP nodes negotiate their buffer size inside these bounds.
pub const MIN_QUANTUM_SIZE: u32 = 64;
pub const MAX_QUANTUM_SIZE: u32 = 1024;

/// Default log filter when neither the CLI nor the environment provides one.
pub const DEFAULT_LOG_FILTER: &str = "stagehand=info";

/// Top-level config (stagehand.toml + STAGEHAND_* env overrides).
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct StagehandConfig {
    #[serde(default)]
    pub daemon: DaemonConfig,
    #[serde(default)]
    pub endpoints: EndpointsConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// Application name reported to the media server on connect.
    #[serde(default = "default_daemon_name")]
    pub name: String,
    /// Directories searched by [`StagehandConfig::find_file`], in order.
    #[serde(default = "default_search_paths")]
    pub search_paths: Vec<String>,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            name: default_daemon_name(),
            search_paths: default_search_paths(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointsConfig {
    /// Smallest audio quantum a DSP node may negotiate.
    #[serde(default = "default_min_quantum")]
    pub min_quantum: u32,
    /// Largest audio quantum a DSP node may negotiate.
    #[serde(default = "default_max_quantum")]
    pub max_quantum: u32,
    /// Which factory builds an endpoint for which kind of node.
    #[serde(default)]
    pub rules: Vec<EndpointRule>,
}

impl Default for EndpointsConfig {
    fn default() -> Self {
        Self {
            min_quantum: default_min_quantum(),
            max_quantum: default_max_quantum(),
            rules: Vec::new(),
        }
    }
}

/// One endpoint-creation rule: nodes matching all `match_node` entries are
/// handed to `factory`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointRule {
    /// Name of the registered endpoint factory.
    pub factory: String,
    /// Property match specs; the verb strings follow the constraint verbs of
    /// the event subsystem ("equals", "matches", "in-list", …).
    #[serde(default)]
    pub match_node: Vec<MatchSpec>,
}

/// Raw, serde-facing shape of a single property constraint.
///
/// Kept stringly-typed here so the core crate stays independent of the event
/// subsystem; consumers compile these into real interests.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchSpec {
    pub key: String,
    pub verb: String,
    #[serde(default)]
    pub value: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// EnvFilter directive applied when STAGEHAND_LOG is not set.
    #[serde(default = "default_log_filter")]
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: default_log_filter(),
        }
    }
}

fn default_daemon_name() -> String {
    "stagehand".to_string()
}

fn default_search_paths() -> Vec<String> {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    vec![
        format!("{}/.stagehand", home),
        "/etc/stagehand".to_string(),
    ]
}

fn default_min_quantum() -> u32 {
    MIN_QUANTUM_SIZE
}

fn default_max_quantum() -> u32 {
    MAX_QUANTUM_SIZE
}

fn default_log_filter() -> String {
    DEFAULT_LOG_FILTER.to_string()
}

fn default_config_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.stagehand/stagehand.toml", home)
}

impl StagehandConfig {
    /// Load config from a TOML file with STAGEHAND_* env var overrides.
    ///
    /// Checks in order:
    ///   1. Explicit path argument
    ///   2. ~/.stagehand/stagehand.toml
    pub fn load(config_path: Option<&str>) -> crate::error::Result<Self> {
        let path = config_path
            .map(String::from)
            .unwrap_or_else(default_config_path);

        let config: StagehandConfig = Figment::new()
            .merge(Toml::file(&path))
            .merge(Env::prefixed("STAGEHAND_").split("_"))
            .extract()
            .map_err(|e| crate::error::StagehandError::Config(e.to_string()))?;

        Ok(config)
    }

    /// Locate `filename` in the configured search paths, first hit wins.
    pub fn find_file(&self, filename: &str) -> Option<PathBuf> {
        self.daemon
            .search_paths
            .iter()
            .map(|dir| Path::new(dir).join(filename))
            .find(|candidate| candidate.is_file())
    }
}
