use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Data directory not found; set state_dir or CLOUDSTAGE_STATE_DIR")]
    DataDirNotFound,

    #[error("Config file not found: {} (from CLOUDSTAGE_CONFIG)", .0.display())]
    ConfigFileNotFound(PathBuf),

    #[error("Failed to parse {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        source: serde_yaml::Error,
    },

    #[error("Invalid setting: {0}")]
    Invalid(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ConfigError>;
