use crate::PipelineSettings;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Invalid config: {0}")]
    Invalid(String),
}

impl PipelineSettings {
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        let settings: PipelineSettings = toml::from_str(contents)?;
        settings.validate()?;
        Ok(settings)
    }
}

pub fn load(path: &Path) -> Result<PipelineSettings, ConfigError> {
    let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    PipelineSettings::from_toml_str(&contents)
}

/// Loads `path` when given, otherwise returns defaults. A broken config file
/// is reported and replaced by defaults rather than aborting startup.
pub fn load_or_default(path: Option<&Path>) -> PipelineSettings {
    let Some(path) = path else {
        return PipelineSettings::default();
    };

    match load(path) {
        Ok(settings) => {
            tracing::info!("Loaded pipeline config from {}", path.display());
            settings
        }
        Err(err) => {
            tracing::warn!("Using default pipeline config: {err}");
            PipelineSettings::default()
        }
    }
}
