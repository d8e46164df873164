use std::path::PathBuf;

use config::{Config, ConfigError, File};
use serde::Deserialize;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct WikigraphConfig {
    #[serde(default)]
    pub service: ServiceConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub wikipedia: WikipediaConfig,
    #[serde(default)]
    pub http: HttpConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServiceConfig {
    pub socket_path: String,
    pub log_level: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            socket_path: "/tmp/wikigraph.sock".to_string(),
            log_level: "info".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory holding the graph document. `~` and `$VARS` are expanded.
    pub dir: String,
    /// Key (file name) of the graph document inside `dir`.
    pub key: String,
    /// Node-count bound applied on every save.
    pub max_nodes: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            dir: ".".to_string(),
            key: "graph.json".to_string(),
            max_nodes: 50,
        }
    }
}

impl StorageConfig {
    pub fn resolved_dir(&self) -> Result<PathBuf, ConfigError> {
        let expanded = shellexpand::full(&self.dir)
            .map_err(|e| ConfigError::Message(format!("storage.dir: {}", e)))?;
        Ok(PathBuf::from(expanded.into_owned()))
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct WikipediaConfig {
    pub api_url: String,
    pub user_agent: String,
    pub timeout_seconds: u64,
    pub max_retries: usize,
    pub retry_delay_ms: u64,
}

impl Default for WikipediaConfig {
    fn default() -> Self {
        Self {
            api_url: "https://en.wikipedia.org/w/api.php".to_string(),
            user_agent: concat!("wikigraph/", env!("CARGO_PKG_VERSION")).to_string(),
            timeout_seconds: 30,
            max_retries: 3,
            retry_delay_ms: 200,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct HttpConfig {
    pub enabled: bool,
    pub host: String,
    pub port: u16,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            host: "0.0.0.0".to_string(),
            port: 5001,
        }
    }
}

impl WikigraphConfig {
    pub fn load(path: &str) -> Result<Self, ConfigError> {
        let s = Config::builder()
            .add_source(File::with_name(path))
            .build()?;
        s.try_deserialize()
    }
}
