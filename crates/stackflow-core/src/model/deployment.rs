//! Top-level deployment description

use super::backend::BackendConfig;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Stack name and region of one regional deployment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StackTarget {
    pub stack: String,
    pub region: String,
}

impl StackTarget {
    pub fn new(stack: impl Into<String>, region: impl Into<String>) -> Self {
        Self {
            stack: stack.into(),
            region: region.into(),
        }
    }
}

/// Certificate stack, deployed where the CDN reads certificates from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CertificateConfig {
    pub target: StackTarget,
}

impl Default for CertificateConfig {
    fn default() -> Self {
        Self {
            target: StackTarget::new("UsStack", "us-east-1"),
        }
    }
}

/// Static frontend behind the CDN
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrontendConfig {
    pub target: StackTarget,
    /// Local build output uploaded to the bucket
    pub dist_path: String,
    pub index_document: String,
    /// Paths invalidated on the CDN after an upload
    pub invalidation_paths: Vec<String>,
}

impl Default for FrontendConfig {
    fn default() -> Self {
        Self {
            target: StackTarget::new("FrontendStack", "ap-northeast-1"),
            dist_path: "rese-frontend/dist".to_string(),
            index_document: "index.html".to_string(),
            invalidation_paths: vec!["/*".to_string()],
        }
    }
}

/// Parsed `deploy.kdl`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deployment {
    pub project: String,
    pub certificate: CertificateConfig,
    pub frontend: FrontendConfig,
    pub backend: BackendConfig,
    /// Values from the `variables` block
    pub variables: BTreeMap<String, String>,
}

impl Default for Deployment {
    fn default() -> Self {
        Self {
            project: "rese".to_string(),
            certificate: CertificateConfig::default(),
            frontend: FrontendConfig::default(),
            backend: BackendConfig::default(),
            variables: BTreeMap::new(),
        }
    }
}

impl Deployment {
    /// Stack targets in deployment order
    pub fn targets(&self) -> [&StackTarget; 3] {
        [
            &self.certificate.target,
            &self.frontend.target,
            &self.backend.target,
        ]
    }
}
