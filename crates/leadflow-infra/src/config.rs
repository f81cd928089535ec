//! Application configuration loader for Leadflow.
//!
//! Reads `config.toml` from the data directory (`~/.leadflow/` in production)
//! and deserializes it into [`AppConfig`]. Falls back to defaults when the file
//! is missing or malformed.

use std::path::{Path, PathBuf};

use leadflow_types::config::AppConfig;

use crate::sqlite::pool::database_url_for;

/// Load configuration from `{data_dir}/config.toml`.
///
/// - If the file does not exist, returns [`AppConfig::default()`].
/// - If the file exists but fails to read or parse, logs a warning and returns the default.
pub async fn load_config(data_dir: &Path) -> AppConfig {
    let config_path = data_dir.join("config.toml");

    let content = match tokio::fs::read_to_string(&config_path).await {
        Ok(content) => content,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!("No config.toml found at {}, using defaults", config_path.display());
            return AppConfig::default();
        }
        Err(err) => {
            tracing::warn!("Failed to read {}: {err}, using defaults", config_path.display());
            return AppConfig::default();
        }
    };

    match toml::from_str::<AppConfig>(&content) {
        Ok(config) => config,
        Err(err) => {
            tracing::warn!(
                "Failed to parse {}: {err}, using defaults",
                config_path.display()
            );
            AppConfig::default()
        }
    }
}

/// Resolve the data directory.
///
/// Priority:
/// 1. `LEADFLOW_DATA_DIR` environment variable
/// 2. `~/.leadflow`
pub fn resolve_data_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("LEADFLOW_DATA_DIR") {
        return PathBuf::from(dir);
    }

    if let Some(home) = dirs::home_dir() {
        return home.join(".leadflow");
    }

    PathBuf::from(".leadflow")
}

/// The configured database URL, or the default file inside `data_dir`.
pub fn database_url(config: &AppConfig, data_dir: &Path) -> String {
    config
        .database_url
        .clone()
        .unwrap_or_else(|| database_url_for(data_dir))
}

#[cfg(test)]
mod tests {
    use super::*;
    use leadflow_types::config::{DeliveryPolicy, EmailTransportKind};
    use tempfile::TempDir;

    #[tokio::test]
    async fn load_config_missing_file_returns_default() {
        let tmp = TempDir::new().unwrap();
        let config = load_config(tmp.path()).await;
        assert!(config.database_url.is_none());
        assert_eq!(config.worker.batch_size, 16);
    }

    #[tokio::test]
    async fn load_config_valid_toml_returns_parsed() {
        let tmp = TempDir::new().unwrap();
        tokio::fs::write(
            tmp.path().join("config.toml"),
            r#"
[email]
kind = "http"
endpoint = "https://mail.example.com/send"
policy = "fatal"

[worker]
batch_size = 4
"#,
        )
        .await
        .unwrap();

        let config = load_config(tmp.path()).await;
        assert_eq!(config.email.kind, EmailTransportKind::Http);
        assert_eq!(config.email.policy, DeliveryPolicy::Fatal);
        assert_eq!(config.worker.batch_size, 4);
        assert_eq!(config.worker.poll_interval_ms, 1000);
    }

    #[tokio::test]
    async fn load_config_invalid_toml_returns_default() {
        let tmp = TempDir::new().unwrap();
        tokio::fs::write(tmp.path().join("config.toml"), "this is not { valid toml !!!")
            .await
            .unwrap();

        let config = load_config(tmp.path()).await;
        assert_eq!(config.email.kind, EmailTransportKind::Log);
    }

    #[test]
    fn database_url_prefers_configured_value() {
        let dir = Path::new("/var/lib/leadflow");
        let mut config = AppConfig::default();
        assert_eq!(database_url(&config, dir), "sqlite:///var/lib/leadflow/leadflow.db");

        config.database_url = Some("sqlite::memory:".to_string());
        assert_eq!(database_url(&config, dir), "sqlite::memory:");
    }
}
