use thiserror::Error;

#[derive(Error, Debug)]
pub enum SynthError {
    #[error(transparent)]
    Core(#[from] stackflow_core::CoreError),

    #[error(transparent)]
    Config(#[from] stackflow_config::ConfigError),

    #[error(transparent)]
    Cloud(#[from] stackflow_cloud::CloudError),
}

pub type Result<T> = std::result::Result<T, SynthError>;
