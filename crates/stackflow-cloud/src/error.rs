//! Synthesis error types

use thiserror::Error;

/// Errors raised while building, resolving or planning stacks.
///
/// Every variant is fatal to plan generation; no partial plan is produced.
#[derive(Error, Debug)]
pub enum CloudError {
    #[error("Dependency cycle detected in stack '{stack}': {resources}")]
    CycleDetected { stack: String, resources: String },

    #[error("Edge {producer} -> {consumer} in stack '{stack}' references unknown resource '{missing}'")]
    DanglingReference {
        stack: String,
        producer: String,
        consumer: String,
        missing: String,
    },

    #[error("Export '{name}' is not available from stack '{stack}'")]
    UnresolvedExport { stack: String, name: String },

    #[error("Ordering violation: {0}")]
    OrderingViolation(String),

    #[error("Edge {producer} -> {consumer} ({kind}) declares no port or action")]
    UnscopedEdge {
        producer: String,
        consumer: String,
        kind: String,
    },

    #[error("Resource already exists in stack '{stack}': {id}")]
    DuplicateResource { stack: String, id: String },

    #[error("External input '{0}' is read-only")]
    ReadOnlyInput(String),

    #[error("Export '{name}' would re-export external input '{resource}'")]
    TransitiveExport { name: String, resource: String },

    #[error("No grant covers {kind} edge {producer} -> {consumer}")]
    MissingGrant {
        producer: String,
        consumer: String,
        kind: String,
    },

    #[error("{field} contains forbidden character: {found:?}")]
    UnsafeShellInput { field: String, found: char },

    #[error("Invalid bootstrap sequence: {0}")]
    InvalidBootstrap(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Template error: {0}")]
    Template(String),

    #[error("Plan store error: {0}")]
    StoreError(String),

    #[error("Lock acquisition failed: {0}")]
    LockError(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, CloudError>;
