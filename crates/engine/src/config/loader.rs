use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;

use courtroom_common::config::SystemConfig;
use courtroom_common::trust::TrustCatalog;

use super::validation;

/// Complete engine configuration loaded from the config directory.
#[derive(Clone, Debug)]
pub struct EngineConfig {
    /// Parsed system.toml.
    pub system: SystemConfig,
    /// Parsed trust_catalog.toml. Read-only after load.
    pub trust_catalog: TrustCatalog,
    pub config_dir: PathBuf,
}

/// Load all configuration from the given config directory.
///
/// Fails loudly with clear error messages if anything is misconfigured;
/// the binary refuses to run on validation failure.
pub fn load_config(config_dir: &Path) -> Result<EngineConfig, ConfigError> {
    tracing::info!(config_dir = %config_dir.display(), "Loading configuration");

    let system: SystemConfig = load_toml(&config_dir.join("system.toml"))?;
    let trust_catalog: TrustCatalog = load_toml(&config_dir.join("trust_catalog.toml"))?;

    let config = EngineConfig {
        system,
        trust_catalog,
        config_dir: config_dir.to_path_buf(),
    };

    validation::validate(&config)?;

    tracing::info!(
        trust_categories = config.trust_catalog.categories.len(),
        fallback_model = config.system.llm.fallback.is_some(),
        "Configuration loaded successfully"
    );

    Ok(config)
}

fn load_toml<T: DeserializeOwned>(path: &Path) -> Result<T, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
        path: path.to_path_buf(),
        source: e,
    })?;

    toml::from_str(&content).map_err(|e| ConfigError::Parse {
        path: path.to_path_buf(),
        detail: e.to_string(),
    })
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse {path}: {detail}")]
    Parse { path: PathBuf, detail: String },

    #[error("Validation failed: {0}")]
    Validation(String),
}

impl From<ConfigError> for courtroom_common::CourtroomError {
    fn from(e: ConfigError) -> Self {
        courtroom_common::CourtroomError::Config(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn repo_config_dir() -> PathBuf {
        PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../../config")
    }

    #[test]
    fn test_load_shipped_config() {
        let config = load_config(&repo_config_dir()).unwrap();
        assert_eq!(config.system.pipeline.consensus_batch_size, 4);
        assert!(config.trust_catalog.categories.contains_key("untrusted"));
        assert_eq!(
            config
                .trust_catalog
                .trust_level("https://www.who.int/news-room/fact-sheets"),
            courtroom_common::types::TrustScore::High
        );
    }

    #[test]
    fn test_missing_dir_is_file_read_error() {
        let err = load_config(Path::new("/nonexistent/courtroom")).unwrap_err();
        assert!(matches!(err, ConfigError::FileRead { .. }));
    }
}
