//! # Stage Catalog
//!
//! Ordered, position-normalized view of one workflow's stages at a given
//! revision. The catalog is the only way the state machine learns about stage
//! order: it answers "first stage" and "stage after position p".
//!
//! ## Normalization
//!
//! Positions must be exactly `1..=N`. If the stored positions have gaps or
//! duplicates, the catalog sorts by `(position, id)`, renumbers, and logs a
//! warning. The registry maintains contiguity on every mutation, so
//! renormalization only happens for definitions built outside of it.

use serde::{Deserialize, Serialize};

use signoff_core::{StageId, WorkflowId};

use crate::model::WorkflowStage;

/// An ordered view of a workflow's stages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageCatalog {
    workflow_id: WorkflowId,
    revision: u64,
    stages: Vec<WorkflowStage>,
}

impl StageCatalog {
    /// Build a catalog, normalizing positions to `1..=N`.
    pub fn new(workflow_id: WorkflowId, revision: u64, mut stages: Vec<WorkflowStage>) -> Self {
        if normalize_positions(&mut stages) {
            tracing::warn!(
                workflow_id = %workflow_id,
                revision,
                "stage positions were not contiguous; renormalized to 1..=N"
            );
        }
        Self {
            workflow_id,
            revision,
            stages,
        }
    }

    /// The workflow these stages belong to.
    pub fn workflow_id(&self) -> WorkflowId {
        self.workflow_id
    }

    /// Revision of the workflow this catalog was built from.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// All stages in ascending position order.
    pub fn stages(&self) -> &[WorkflowStage] {
        &self.stages
    }

    /// Consume the catalog, returning its ordered stages.
    pub fn into_stages(self) -> Vec<WorkflowStage> {
        self.stages
    }

    /// Number of stages.
    pub fn len(&self) -> usize {
        self.stages.len()
    }

    /// Whether the workflow has no stages.
    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// The stage at position 1.
    pub fn first(&self) -> Option<&WorkflowStage> {
        self.stages.first()
    }

    /// The stage at position `p + 1`, or `None` when `p` is the last position.
    pub fn after(&self, position: u32) -> Option<&WorkflowStage> {
        self.at(position.checked_add(1)?)
    }

    /// The stage at exactly `position`.
    pub fn at(&self, position: u32) -> Option<&WorkflowStage> {
        let index = usize::try_from(position).ok()?.checked_sub(1)?;
        self.stages.get(index)
    }

    /// Look up a stage by id.
    pub fn get(&self, stage_id: StageId) -> Option<&WorkflowStage> {
        self.stages.iter().find(|s| s.id == stage_id)
    }
}

/// Sort stages by `(position, id)` and renumber them `1..=N`.
///
/// Returns `true` if any position changed.
pub fn normalize_positions(stages: &mut [WorkflowStage]) -> bool {
    stages.sort_by(|a, b| a.position.cmp(&b.position).then(a.id.cmp(&b.id)));
    let mut changed = false;
    for (index, stage) in stages.iter_mut().enumerate() {
        let expected = index as u32 + 1;
        if stage.position != expected {
            stage.position = expected;
            changed = true;
        }
    }
    changed
}

/// Whether positions are exactly `1..=N` in slice order.
pub fn is_contiguous(stages: &[WorkflowStage]) -> bool {
    stages
        .iter()
        .enumerate()
        .all(|(index, stage)| stage.position == index as u32 + 1)
}
