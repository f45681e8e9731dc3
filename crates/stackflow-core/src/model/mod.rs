//! Deployment description model

mod backend;
mod deployment;

pub use backend::{
    ApplicationConfig, AssetConfig, BackendConfig, DatabaseConfig, InstanceConfig, NetworkConfig,
    PackageConfig, StorageConfig,
};
pub use deployment::{CertificateConfig, Deployment, FrontendConfig, StackTarget};
