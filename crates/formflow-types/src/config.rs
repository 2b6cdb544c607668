//! Configuration types for Formflow.
//!
//! `FormflowConfig` mirrors `{data_dir}/config.toml`. Every field has a
//! default so an empty or missing file yields a working setup.

use serde::{Deserialize, Serialize};

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FormflowConfig {
    /// Overrides the SQLite URL derived from the data directory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database_url: Option<String>,

    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub engine: EngineConfig,
}

/// HTTP listener settings for `formflow serve`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// Execution engine and webhook transport settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Response bodies longer than this are truncated before persistence.
    #[serde(default = "default_max_response_body_bytes")]
    pub max_response_body_bytes: usize,

    /// `User-Agent` sent with every webhook request.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Default `limit` for execution listings.
    #[serde(default = "default_execution_list_limit")]
    pub execution_list_limit: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_response_body_bytes: default_max_response_body_bytes(),
            user_agent: default_user_agent(),
            execution_list_limit: default_execution_list_limit(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3100
}

fn default_max_response_body_bytes() -> usize {
    64 * 1024
}

fn default_user_agent() -> String {
    "formflow-webhooks/0.1".to_string()
}

fn default_execution_list_limit() -> u32 {
    20
}
