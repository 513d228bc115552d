use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::factory::{BackendEndpoints, ModelOverride};
use crate::gateway::GatewayConfig;

pub const DEFAULT_BIND: &str = "127.0.0.1:3000";

/// Server configuration.
///
/// ```toml
/// bind = "0.0.0.0:3000"
/// data_dir = "/var/lib/chat-relay"
///
/// [endpoints]
/// local_base_url = "http://gpu-box:11434"
///
/// [gateway]
/// decode_error_threshold = 3
///
/// [models."qwen2.5vl:7b"]
/// family = "local"
/// vision = true
/// ```
///
/// Backend credentials are never part of the configuration. They arrive with
/// each request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    pub bind: String,
    /// Directory for conversation documents. Conversations are kept in memory when unset.
    pub data_dir: Option<PathBuf>,
    pub endpoints: BackendEndpoints,
    pub gateway: GatewayConfig,
    pub models: HashMap<String, ModelOverride>,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            bind: DEFAULT_BIND.to_string(),
            data_dir: None,
            endpoints: BackendEndpoints::default(),
            gateway: GatewayConfig::default(),
            models: HashMap::new(),
        }
    }
}

impl RelayConfig {
    /// Load config if the file exists, otherwise return Ok(None).
    pub fn load_optional(path: impl AsRef<Path>) -> anyhow::Result<Option<Self>> {
        let path = path.as_ref();
        let bytes = match std::fs::read(path) {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(anyhow::Error::new(e))
                    .with_context(|| format!("failed to read config: {}", path.display()))
            }
        };

        let s = String::from_utf8(bytes).context("config is not valid UTF-8")?;
        let cfg: RelayConfig = toml::from_str(&s)
            .with_context(|| format!("failed to parse TOML: {}", path.display()))?;
        Ok(Some(cfg))
    }

    /// Apply `CHAT_RELAY_*` and backend base URL overrides from the process environment.
    pub fn apply_env(&mut self) {
        self.apply_vars(|name| std::env::var(name).ok());
    }

    fn apply_vars(&mut self, var: impl Fn(&str) -> Option<String>) {
        let var = |name: &str| var(name).filter(|value| !value.trim().is_empty());

        if let Some(bind) = var("CHAT_RELAY_BIND") {
            self.bind = bind;
        }
        if let Some(dir) = var("CHAT_RELAY_DATA_DIR") {
            self.data_dir = Some(PathBuf::from(dir));
        }
        if let Some(url) = var("OLLAMA_BASE_URL") {
            self.endpoints.local_base_url = url;
        }
        if let Some(url) = var("OPENAI_BASE_URL") {
            self.endpoints.openai_base_url = url;
        }
        if let Some(url) = var("ANTHROPIC_BASE_URL") {
            self.endpoints.anthropic_base_url = url;
        }
    }
}
