//! # signoff-definition — Workflow Definitions
//!
//! The configuration side of the approval engine: what a workflow is, how its
//! stages are ordered, and who may act at each stage.
//!
//! - [`model`]: `WorkflowDefinition`, `WorkflowStage`, capability and
//!   assignment types, and request/patch inputs.
//! - [`catalog`]: `StageCatalog`, the ordered and position-normalized view the
//!   state machine routes against.
//! - [`registry`]: `WorkflowRegistry`, the definition manager (CRUD, cloning,
//!   reordering, activation, resolution by document type).
//! - [`config`]: YAML workflow configuration files.
//!
//! ## Crate Policy
//!
//! - Topology is a single linear list of stages. There is no branching,
//!   parallelism, or cycles.
//! - Stage positions are always contiguous `1..=N` after any registry mutation.
//! - At most one active workflow applies to a given document type.

pub mod catalog;
pub mod config;
pub mod model;
pub mod registry;

pub use catalog::StageCatalog;
pub use config::{ConfigError, StageSpec, WorkflowConfig, WorkflowSpec};
pub use model::{
    NewStage, NewWorkflow, StageAssignment, StageCapabilities, StagePatch, WorkflowDefinition,
    WorkflowPatch, WorkflowStage,
};
pub use registry::WorkflowRegistry;
