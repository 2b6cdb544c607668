//! Configuration loader for Formflow.
//!
//! Reads `config.toml` from the data directory (`~/.formflow/` by default)
//! and deserializes it into [`FormflowConfig`]. Falls back to defaults when
//! the file is missing or malformed.

use std::path::{Path, PathBuf};

use formflow_types::config::FormflowConfig;

use crate::sqlite::pool::database_url_for;

/// Resolve the data directory.
///
/// Priority:
/// 1. `FORMFLOW_DATA_DIR` environment variable
/// 2. `~/.formflow`
/// 3. `.formflow` in the current directory
pub fn resolve_data_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("FORMFLOW_DATA_DIR") {
        return PathBuf::from(dir);
    }

    if let Some(home) = dirs::home_dir() {
        return home.join(".formflow");
    }

    PathBuf::from(".formflow")
}

/// Load configuration from `{data_dir}/config.toml`.
pub async fn load_config(data_dir: &Path) -> FormflowConfig {
    let config_path = data_dir.join("config.toml");

    let content = match tokio::fs::read_to_string(&config_path).await {
        Ok(content) => content,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!("No config.toml found at {}, using defaults", config_path.display());
            return FormflowConfig::default();
        }
        Err(err) => {
            tracing::warn!("Failed to read {}: {err}, using defaults", config_path.display());
            return FormflowConfig::default();
        }
    };

    match toml::from_str::<FormflowConfig>(&content) {
        Ok(config) => config,
        Err(err) => {
            tracing::warn!(
                "Failed to parse {}: {err}, using defaults",
                config_path.display()
            );
            FormflowConfig::default()
        }
    }
}

/// Resolve the database URL.
///
/// Priority:
/// 1. `FORMFLOW_DATABASE_URL` environment variable
/// 2. `database_url` in `config.toml`
/// 3. `{data_dir}/formflow.db`
pub fn resolve_database_url(config: &FormflowConfig, data_dir: &Path) -> String {
    resolve_database_url_with(std::env::var("FORMFLOW_DATABASE_URL").ok(), config, data_dir)
}

fn resolve_database_url_with(
    env_override: Option<String>,
    config: &FormflowConfig,
    data_dir: &Path,
) -> String {
    env_override
        .filter(|url| !url.trim().is_empty())
        .or_else(|| config.database_url.clone())
        .unwrap_or_else(|| database_url_for(data_dir))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn load_config_missing_file_returns_default() {
        let tmp = TempDir::new().unwrap();
        let config = load_config(tmp.path()).await;
        assert_eq!(config.server.port, 3100);
        assert!(config.database_url.is_none());
    }

    #[tokio::test]
    async fn load_config_valid_toml_returns_parsed() {
        let tmp = TempDir::new().unwrap();
        tokio::fs::write(
            tmp.path().join("config.toml"),
            r#"
[server]
host = "0.0.0.0"
port = 9000

[engine]
user_agent = "acme-hooks/2"
"#,
        )
        .await
        .unwrap();

        let config = load_config(tmp.path()).await;
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.engine.user_agent, "acme-hooks/2");
        assert_eq!(config.engine.max_response_body_bytes, 65_536);
    }

    #[tokio::test]
    async fn load_config_invalid_toml_returns_default() {
        let tmp = TempDir::new().unwrap();
        tokio::fs::write(tmp.path().join("config.toml"), "this is not { valid toml !!!")
            .await
            .unwrap();

        let config = load_config(tmp.path()).await;
        assert_eq!(config.server.port, 3100);
    }

    #[test]
    fn database_url_priority() {
        let dir = Path::new("/srv/formflow");
        let mut config = FormflowConfig::default();

        assert_eq!(
            resolve_database_url_with(None, &config, dir),
            "sqlite:///srv/formflow/formflow.db"
        );

        config.database_url = Some("sqlite:///data/ff.db".to_string());
        assert_eq!(resolve_database_url_with(None, &config, dir), "sqlite:///data/ff.db");

        assert_eq!(
            resolve_database_url_with(Some("sqlite::memory:".to_string()), &config, dir),
            "sqlite::memory:"
        );
        assert_eq!(
            resolve_database_url_with(Some("  ".to_string()), &config, dir),
            "sqlite:///data/ff.db"
        );
    }

    #[test]
    fn test_resolve_data_dir_from_env() {
        // SAFETY: This test is single-threaded and restores the env var immediately.
        unsafe {
            std::env::set_var("FORMFLOW_DATA_DIR", "/tmp/test-formflow");
        }
        let dir = resolve_data_dir();
        assert_eq!(dir, PathBuf::from("/tmp/test-formflow"));
        unsafe {
            std::env::remove_var("FORMFLOW_DATA_DIR");
        }
    }
}
