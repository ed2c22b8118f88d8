//! # signoff-cli — Signoff Command-Line Interface
//!
//! ## Subcommands
//!
//! - `validate` — Load a workflow configuration file and check every
//!   definition invariant
//! - `route` — Show the stages a document type would be routed through
//!
//! ## Crate Policy
//!
//! - CLI construction (argument parsing) is separated from business logic.
//! - Handlers write to a caller-supplied writer so they can be tested.
//! - Configuration is applied to a fresh registry through the same
//!   operations the engine uses at runtime.

pub mod route;
pub mod validate;

use std::path::Path;

use anyhow::Context;
use signoff_definition::{WorkflowConfig, WorkflowDefinition, WorkflowRegistry};

/// Load `path` and apply it to a fresh registry.
pub fn load_registry(path: &Path) -> anyhow::Result<(WorkflowRegistry, Vec<WorkflowDefinition>)> {
    let config = WorkflowConfig::load(path)?;
    let registry = WorkflowRegistry::new();
    let workflows = config
        .apply(&registry)
        .with_context(|| format!("invalid workflow configuration {}", path.display()))?;
    Ok((registry, workflows))
}
