//! Configuration loading for Loanflow.
//!
//! Reads `config.toml` from the data directory (`~/.loanflow/` in production)
//! and deserializes it into [`GlobalConfig`]. Falls back to defaults when the
//! file is missing or malformed.

use std::path::{Path, PathBuf};

use loanflow_types::config::GlobalConfig;

/// Resolve the data directory from environment or platform defaults.
///
/// Priority:
/// 1. `LOANFLOW_DATA_DIR` environment variable
/// 2. `~/.loanflow`
/// 3. `.loanflow` in the current directory
pub fn resolve_data_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("LOANFLOW_DATA_DIR") {
        return PathBuf::from(dir);
    }

    if let Some(home) = dirs::home_dir() {
        return home.join(".loanflow");
    }

    PathBuf::from(".loanflow")
}

/// Create the data directory if it does not exist yet.
pub async fn ensure_data_dir(data_dir: &Path) -> std::io::Result<()> {
    tokio::fs::create_dir_all(data_dir).await
}

/// Load global configuration from `{data_dir}/config.toml`.
///
/// - If the file does not exist, returns [`GlobalConfig::default()`].
/// - If the file exists but fails to parse, logs a warning and returns the default.
pub async fn load_global_config(data_dir: &Path) -> GlobalConfig {
    let config_path = data_dir.join("config.toml");

    let content = match tokio::fs::read_to_string(&config_path).await {
        Ok(content) => content,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!("No config.toml found at {}, using defaults", config_path.display());
            return GlobalConfig::default();
        }
        Err(err) => {
            tracing::warn!("Failed to read {}: {err}, using defaults", config_path.display());
            return GlobalConfig::default();
        }
    };

    match toml::from_str::<GlobalConfig>(&content) {
        Ok(config) => config,
        Err(err) => {
            tracing::warn!(
                "Failed to parse {}: {err}, using defaults",
                config_path.display()
            );
            GlobalConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn load_global_config_missing_file_returns_default() {
        let tmp = TempDir::new().unwrap();
        let config = load_global_config(tmp.path()).await;
        assert_eq!(config.application_name, "loanflow");
        assert_eq!(config.loan.review_threshold, 3000.0);
        assert_eq!(config.engine.recv_poll_interval_ms, 500);
    }

    #[tokio::test]
    async fn load_global_config_valid_toml_returns_parsed() {
        let tmp = TempDir::new().unwrap();
        tokio::fs::write(
            tmp.path().join("config.toml"),
            r#"
application_name = "loans-eu"

[loan]
review_threshold = 10000.0
review_timeout_secs = 3600
"#,
        )
        .await
        .unwrap();

        let config = load_global_config(tmp.path()).await;
        assert_eq!(config.application_name, "loans-eu");
        assert_eq!(config.loan.review_threshold, 10000.0);
        assert_eq!(config.loan.review_timeout_secs, 3600);
        assert_eq!(config.loan.min_credit_score, 60);
    }

    #[tokio::test]
    async fn load_global_config_invalid_toml_returns_default() {
        let tmp = TempDir::new().unwrap();
        tokio::fs::write(tmp.path().join("config.toml"), "this is not { valid toml !!!")
            .await
            .unwrap();

        let config = load_global_config(tmp.path()).await;
        assert_eq!(config.loan.review_timeout_secs, 60);
    }

    #[tokio::test]
    async fn ensure_data_dir_creates_nested_directories() {
        let tmp = TempDir::new().unwrap();
        let nested = tmp.path().join("a").join("b");
        ensure_data_dir(&nested).await.unwrap();
        assert!(nested.is_dir());
    }
}
