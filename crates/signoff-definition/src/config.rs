//! # Workflow Configuration Files
//!
//! Declarative YAML workflow definitions, applied through the same
//! [`WorkflowRegistry`] operations used at runtime so every invariant holds
//! for configured workflows too.
//!
//! ```yaml
//! workflows:
//!   - name: 3-step
//!     description: Standard purchase invoice sign-off
//!     active: true
//!     applicability: [purchase_invoice]
//!     stages:
//!       - name: Manager
//!         capabilities: { can_view: true, can_approve: true, can_reject: true }
//!         assigned_roles: [manager]
//!       - name: Accountant
//!         is_final: true
//!         timeout_days: 3
//!         capabilities: { can_view: true, can_approve: true, can_reject: true }
//!         assigned_users: [carol]
//! ```
//!
//! Workflows are created, given their stages in file order, and only then
//! activated. Activation-time overlap checks therefore apply to config files.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use signoff_core::{DocumentTypeId, RoleCode, SignoffError, UserId};

use crate::model::{NewStage, NewWorkflow, StageAssignment, StageCapabilities, WorkflowDefinition};
use crate::registry::WorkflowRegistry;

/// Errors raised while loading or applying a configuration file.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file does not exist.
    #[error("configuration file not found: {path}")]
    FileNotFound { path: PathBuf },

    /// YAML parsing failed.
    #[error("failed to parse YAML at {path}: {source}")]
    YamlParse {
        path: PathBuf,
        source: serde_yaml::Error,
    },

    /// A workflow in the file violates a definition invariant.
    #[error("workflow '{workflow}': {source}")]
    Definition {
        workflow: String,
        source: SignoffError,
    },

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<ConfigError> for SignoffError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::Definition { source, .. } => source,
            other => SignoffError::Validation(other.to_string()),
        }
    }
}

/// Top-level configuration document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WorkflowConfig {
    /// Workflows to create, in file order.
    #[serde(default)]
    pub workflows: Vec<WorkflowSpec>,
}

/// One workflow as declared in a configuration file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WorkflowSpec {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub active: bool,
    pub applicability: BTreeSet<DocumentTypeId>,
    #[serde(default)]
    pub stages: Vec<StageSpec>,
}

/// One stage as declared in a configuration file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StageSpec {
    pub name: String,
    #[serde(default = "one")]
    pub approval_quorum: u32,
    #[serde(default)]
    pub timeout_days: Option<u32>,
    #[serde(default)]
    pub is_final: bool,
    #[serde(default)]
    pub capabilities: StageCapabilities,
    #[serde(default)]
    pub assigned_roles: BTreeSet<RoleCode>,
    #[serde(default)]
    pub assigned_users: BTreeSet<UserId>,
}

fn one() -> u32 {
    1
}

impl From<StageSpec> for NewStage {
    fn from(spec: StageSpec) -> Self {
        NewStage {
            name: spec.name,
            position: None,
            approval_quorum: spec.approval_quorum,
            timeout_days: spec.timeout_days,
            is_final: spec.is_final,
            capabilities: spec.capabilities,
            assignment: StageAssignment {
                roles: spec.assigned_roles,
                users: spec.assigned_users,
            },
        }
    }
}

impl WorkflowConfig {
    /// Parse a configuration document from a YAML string.
    pub fn from_yaml_str(content: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(content)
    }

    /// Load a configuration file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ConfigError::FileNotFound {
                    path: path.to_path_buf(),
                }
            } else {
                ConfigError::Io(e)
            }
        })?;
        Self::from_yaml_str(&content).map_err(|source| ConfigError::YamlParse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Create every workflow in `registry`, returning the stored definitions.
    ///
    /// Stops at the first invalid workflow. That workflow is removed again;
    /// workflows applied before it remain.
    pub fn apply(&self, registry: &WorkflowRegistry) -> Result<Vec<WorkflowDefinition>, ConfigError> {
        let mut applied = Vec::with_capacity(self.workflows.len());
        for spec in &self.workflows {
            let definition = apply_one(registry, spec).map_err(|source| ConfigError::Definition {
                workflow: spec.name.clone(),
                source,
            })?;
            applied.push(definition);
        }
        tracing::info!(workflows = applied.len(), "workflow configuration applied");
        Ok(applied)
    }
}

fn apply_one(registry: &WorkflowRegistry, spec: &WorkflowSpec) -> Result<WorkflowDefinition, SignoffError> {
    let workflow = registry.create(NewWorkflow {
        name: spec.name.clone(),
        description: spec.description.clone(),
        applicability: spec.applicability.clone(),
        created_by: None,
    })?;
    let built = spec
        .stages
        .iter()
        .try_for_each(|stage| registry.add_stage(workflow.id, stage.clone().into()).map(drop))
        .and_then(|()| {
            if spec.active {
                registry.toggle_active(workflow.id)
            } else {
                registry.get(workflow.id)
            }
        });
    if built.is_err() {
        tracing::warn!(workflow = %spec.name, "discarding partially applied workflow");
        registry.delete(workflow.id)?;
    }
    built
}
