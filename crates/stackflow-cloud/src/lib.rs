//! StackFlow cloud synthesis
//!
//! Builds per-region resource graphs, passes values between regions through
//! published parameters, derives least-privilege grants from the graph edges
//! and generates the bootstrap sequence of the compute instance.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐  resolve/inject  ┌──────────────┐
//! │ producer     │ ───────────────▶ │ consumer     │
//! │ ResourceGraph│   (parameters)   │ ResourceGraph│
//! └──────┬───────┘                  └──────┬───────┘
//!        │ seal                            │ seal
//!        ▼                                 ▼
//! ┌─────────────────────────────────────────────────┐
//! │ PermissionGrantEngine -> BootstrapScriptGenerator│
//! └──────────────────────┬──────────────────────────┘
//!                        ▼
//!                 DeploymentPlan ──▶ PlanStore
//! ```

pub mod bootstrap;
pub mod error;
pub mod grant;
pub mod graph;
pub mod plan;
pub mod reference;
pub mod resource;
pub mod script;
pub mod store;

// Re-exports
pub use bootstrap::{
    AssetRef, BootstrapScriptGenerator, BootstrapSequence, BootstrapStep, Phase,
    ProvisionProfile, RuntimeInputs, RuntimeValue, ServicePackages, SourceRepository, StepKind,
    WorkerIdentity, validate_shell_input,
};
pub use error::{CloudError, Result};
pub use grant::{Direction, GrantRule, GrantScope, PermissionGrantEngine, Principal};
pub use graph::{
    AccessAction, DependencyEdge, EdgeKind, ExportDecl, ImportBinding, PublicIngress,
    ResourceGraph,
};
pub use plan::{
    BootstrapArtifact, CrossRegionBarrier, DeploymentPlan, OrderingConstraint, PlanSummary,
    PlannedExport, PlannedResource, StackPlan,
};
pub use reference::{CrossRegionReferenceResolver, ExportedReference, PARAMETER_PREFIX};
pub use resource::{AttrRef, AttrValue, Resource, ResourceId, ResourceKind, ResourceOrigin};
pub use script::{LOG_PATH, render_script};
pub use store::{PlanLock, PlanStore, StoredPlan};
