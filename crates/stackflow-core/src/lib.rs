//! StackFlow core
//!
//! Deployment description model, `deploy.kdl` parsing with template
//! expansion, and the validated deployment environment.

pub mod env;
pub mod error;
pub mod loader;
pub mod model;
pub mod parser;
pub mod template;

pub use env::{DeploymentEnv, ENV_FILE, SECRET_KEYS, SecretValue};
pub use error::{CoreError, Result};
pub use loader::{load_deployment, load_deployment_str};
pub use model::*;
pub use parser::{parse_deployment_file, parse_deployment_str};
pub use template::{TemplateProcessor, Variables, extract_variables};
