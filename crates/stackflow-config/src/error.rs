use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error(
        "No deployment description found. Looked in:\n\
        - the current directory: deploy.local.kdl, .deploy.local.kdl, deploy.kdl, .deploy.kdl\n\
        - ./.stackflow/\n\
        - <config dir>/stackflow/deploy.kdl\n\
        Set STACKFLOW_CONFIG_PATH to point at a file directly"
    )]
    DeployFileNotFound,

    #[error("STACKFLOW_CONFIG_PATH points to a missing file: {0}")]
    ConfigPathNotFound(PathBuf),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ConfigError>;
