//! TOML configuration: provider endpoints, panel policy bounds, history
//! location, and the local user identity. Every field has a default so the
//! playground runs with no config file at all.

use std::collections::HashMap;
use std::env;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ArenaError;
use crate::panels::PanelPolicy;
use crate::providers::{Endpoint, Provider};

pub const DEFAULT_CONFIG_PATH: &str = "model-arena.toml";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ArenaConfig {
    /// Local identity owning saved history (no auth flow in the CLI).
    pub user_id: String,
    /// SQLite file backing the chat history.
    pub history_path: String,
    /// Remote savechat base URL. Saves go to the local history when unset.
    pub save_endpoint: Option<String>,
    pub min_panels: usize,
    pub max_panels: usize,
    pub providers: ProvidersConfig,
}

impl Default for ArenaConfig {
    fn default() -> Self {
        ArenaConfig {
            user_id: "local".to_string(),
            history_path: "model-arena-history.db".to_string(),
            save_endpoint: None,
            min_panels: 1,
            max_panels: 3,
            providers: ProvidersConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProvidersConfig {
    pub groq: EndpointConfig,
    pub openai: EndpointConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EndpointConfig {
    pub base_url: Option<String>,
    pub api_key_env: Option<String>,
}

impl ArenaConfig {
    /// Load from `path`, or from `model-arena.toml` when present, or fall
    /// back to defaults. An explicitly named file must exist.
    pub fn load(path: Option<&Path>) -> Result<Self, ArenaError> {
        match path {
            Some(p) => {
                let raw = std::fs::read_to_string(p)?;
                toml::from_str(&raw).map_err(|e| ArenaError::Config(e.to_string()))
            }
            None => {
                let default = Path::new(DEFAULT_CONFIG_PATH);
                if default.exists() {
                    let raw = std::fs::read_to_string(default)?;
                    toml::from_str(&raw).map_err(|e| ArenaError::Config(e.to_string()))
                } else {
                    Ok(ArenaConfig::default())
                }
            }
        }
    }

    /// Panel bounds with nonsense values clamped into shape.
    pub fn policy(&self) -> PanelPolicy {
        let max_panels = self.max_panels.max(1);
        PanelPolicy {
            min_panels: self.min_panels.min(max_panels),
            max_panels,
        }
    }

    fn endpoint_config(&self, provider: Provider) -> &EndpointConfig {
        match provider {
            Provider::Groq => &self.providers.groq,
            Provider::Openai => &self.providers.openai,
        }
    }

    /// Resolve credentials from the environment. Providers whose key is not
    /// exported are simply absent; the backend reports them if a panel ends
    /// up needing one.
    pub fn resolve_endpoints(&self) -> HashMap<Provider, Endpoint> {
        let mut endpoints = HashMap::new();
        for provider in Provider::ALL {
            let cfg = self.endpoint_config(provider);
            let key_env = cfg.api_key_env.as_deref().unwrap_or(provider.key_env());
            if let Ok(api_key) = env::var(key_env) {
                if api_key.is_empty() {
                    continue;
                }
                let base_url = cfg
                    .base_url
                    .clone()
                    .unwrap_or_else(|| provider.default_base_url().to_string());
                endpoints.insert(provider, Endpoint { base_url, api_key });
            }
        }
        endpoints
    }
}
