//! # Workflow Registry — Definition Manager
//!
//! CRUD for workflow definitions and their stages, plus resolution of the
//! workflow that applies to a document type.
//!
//! ## Invariants
//!
//! Every mutation runs under a single write lock and leaves the registry in a
//! state where:
//!
//! - each workflow's stage positions are exactly `1..=N`;
//! - at most one stage per workflow is final;
//! - no two **active** workflows share a document type, so resolution is
//!   unambiguous;
//! - an active workflow has at least one stage.
//!
//! Each mutation bumps the workflow's `revision` and the registry-wide
//! `generation`. A [`StageCatalog`] records the revision it was built from;
//! [`WorkflowRegistry::is_current`] reports whether it has gone stale.
//!
//! The lock is `parking_lot` and is never held across an `.await`.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use parking_lot::RwLock;

use signoff_core::{DocumentTypeId, SignoffError, StageId, Timestamp, UserId, WorkflowId};

use crate::catalog::{normalize_positions, StageCatalog};
use crate::model::{
    validated_applicability, validated_name, validated_quorum, NewStage, NewWorkflow, StagePatch,
    WorkflowDefinition, WorkflowPatch, WorkflowStage,
};

#[derive(Debug, Default)]
struct RegistryInner {
    workflows: BTreeMap<WorkflowId, WorkflowDefinition>,
    stage_owner: HashMap<StageId, WorkflowId>,
    generation: u64,
}

impl RegistryInner {
    fn workflow_mut(&mut self, id: WorkflowId) -> Result<&mut WorkflowDefinition, SignoffError> {
        self.workflows
            .get_mut(&id)
            .ok_or_else(|| SignoffError::not_found(format!("workflow {id}")))
    }

    fn owner_of(&self, stage_id: StageId) -> Result<WorkflowId, SignoffError> {
        self.stage_owner
            .get(&stage_id)
            .copied()
            .ok_or_else(|| SignoffError::not_found(format!("stage {stage_id}")))
    }

    /// Reject activation if another active workflow covers any of the same
    /// document types.
    fn check_no_overlap(
        &self,
        id: WorkflowId,
        applicability: &BTreeSet<DocumentTypeId>,
    ) -> Result<(), SignoffError> {
        for other in self.workflows.values() {
            if other.id == id || !other.is_active {
                continue;
            }
            let shared: Vec<&str> = other
                .applicability
                .intersection(applicability)
                .map(DocumentTypeId::as_str)
                .collect();
            if !shared.is_empty() {
                return Err(SignoffError::validation(format!(
                    "active workflow '{}' ({}) already applies to: {}",
                    other.name,
                    other.id,
                    shared.join(", ")
                )));
            }
        }
        Ok(())
    }

    fn resolve(&self, document_type: &DocumentTypeId) -> Result<&WorkflowDefinition, SignoffError> {
        let mut matches = self
            .workflows
            .values()
            .filter(|w| w.is_active && w.applies_to(document_type));
        let first = matches.next().ok_or_else(|| {
            SignoffError::not_found(format!(
                "no active workflow applies to document type '{document_type}'"
            ))
        })?;
        if matches.next().is_some() {
            return Err(SignoffError::Conflict(format!(
                "more than one active workflow applies to document type '{document_type}'"
            )));
        }
        Ok(first)
    }

    fn touch(&mut self, id: WorkflowId) {
        self.generation += 1;
        if let Some(workflow) = self.workflows.get_mut(&id) {
            workflow.revision += 1;
            workflow.updated_at = Timestamp::now();
        }
    }
}

/// Thread-safe, cloneable registry of workflow definitions.
#[derive(Debug, Clone, Default)]
pub struct WorkflowRegistry {
    inner: Arc<RwLock<RegistryInner>>,
}

impl WorkflowRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry-wide mutation counter.
    pub fn generation(&self) -> u64 {
        self.inner.read().generation
    }

    /// All workflows, sorted by name then id.
    pub fn list(&self) -> Vec<WorkflowDefinition> {
        let mut all: Vec<WorkflowDefinition> = self.inner.read().workflows.values().cloned().collect();
        all.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
        all
    }

    /// Fetch one workflow.
    pub fn get(&self, id: WorkflowId) -> Result<WorkflowDefinition, SignoffError> {
        self.inner
            .read()
            .workflows
            .get(&id)
            .cloned()
            .ok_or_else(|| SignoffError::not_found(format!("workflow {id}")))
    }

    /// Fetch one stage.
    pub fn stage(&self, stage_id: StageId) -> Result<WorkflowStage, SignoffError> {
        let inner = self.inner.read();
        let owner = inner.owner_of(stage_id)?;
        inner
            .workflows
            .get(&owner)
            .and_then(|w| w.stage(stage_id))
            .cloned()
            .ok_or_else(|| SignoffError::not_found(format!("stage {stage_id}")))
    }

    /// Create a new, inactive workflow with no stages.
    pub fn create(&self, request: NewWorkflow) -> Result<WorkflowDefinition, SignoffError> {
        let name = validated_name(&request.name, "workflow")?;
        validated_applicability(&request.applicability)?;

        let now = Timestamp::now();
        let workflow = WorkflowDefinition {
            id: WorkflowId::new(),
            name,
            description: request.description.trim().to_string(),
            is_active: false,
            applicability: request.applicability,
            stages: Vec::new(),
            revision: 1,
            created_by: request.created_by,
            cloned_from: None,
            created_at: now,
            updated_at: now,
        };

        let mut inner = self.inner.write();
        inner.generation += 1;
        inner.workflows.insert(workflow.id, workflow.clone());
        tracing::info!(workflow_id = %workflow.id, name = %workflow.name, "workflow created");
        Ok(workflow)
    }

    /// Apply a partial update to a workflow's own fields.
    ///
    /// Activating, or changing the applicability of an active workflow, is
    /// subject to the no-overlap rule and requires at least one stage.
    pub fn update(
        &self,
        id: WorkflowId,
        patch: WorkflowPatch,
    ) -> Result<WorkflowDefinition, SignoffError> {
        let name = patch
            .name
            .as_deref()
            .map(|n| validated_name(n, "workflow"))
            .transpose()?;
        if let Some(applicability) = &patch.applicability {
            validated_applicability(applicability)?;
        }

        let mut inner = self.inner.write();
        let current = inner
            .workflows
            .get(&id)
            .ok_or_else(|| SignoffError::not_found(format!("workflow {id}")))?;

        let will_be_active = patch.is_active.unwrap_or(current.is_active);
        let applicability = patch
            .applicability
            .clone()
            .unwrap_or_else(|| current.applicability.clone());
        if will_be_active {
            if current.stages.is_empty() {
                return Err(SignoffError::validation(format!(
                    "workflow {id} has no stages and cannot be active"
                )));
            }
            inner.check_no_overlap(id, &applicability)?;
        }

        let workflow = inner.workflow_mut(id)?;
        if let Some(name) = name {
            workflow.name = name;
        }
        if let Some(description) = patch.description {
            workflow.description = description.trim().to_string();
        }
        workflow.is_active = will_be_active;
        workflow.applicability = applicability;
        inner.touch(id);

        let updated = inner.workflow_mut(id)?.clone();
        tracing::info!(
            workflow_id = %id,
            revision = updated.revision,
            is_active = updated.is_active,
            "workflow updated"
        );
        Ok(updated)
    }

    /// Flip a workflow's active flag.
    pub fn toggle_active(&self, id: WorkflowId) -> Result<WorkflowDefinition, SignoffError> {
        let is_active = self.get(id)?.is_active;
        self.update(
            id,
            WorkflowPatch {
                is_active: Some(!is_active),
                ..WorkflowPatch::default()
            },
        )
    }

    /// Deep-copy a workflow and its stages under a new name.
    ///
    /// The clone gets fresh ids, keeps stage positions, and starts inactive.
    pub fn clone_workflow(
        &self,
        id: WorkflowId,
        new_name: &str,
        actor: &UserId,
    ) -> Result<WorkflowDefinition, SignoffError> {
        let name = validated_name(new_name, "workflow")?;
        let mut inner = self.inner.write();
        let source = inner
            .workflows
            .get(&id)
            .ok_or_else(|| SignoffError::not_found(format!("workflow {id}")))?
            .clone();

        let new_id = WorkflowId::new();
        let now = Timestamp::now();
        let stages: Vec<WorkflowStage> = source
            .stages
            .iter()
            .map(|s| WorkflowStage {
                id: StageId::new(),
                workflow_id: new_id,
                ..s.clone()
            })
            .collect();
        let clone = WorkflowDefinition {
            id: new_id,
            name,
            description: source.description.clone(),
            is_active: false,
            applicability: source.applicability.clone(),
            stages,
            revision: 1,
            created_by: Some(actor.clone()),
            cloned_from: Some(id),
            created_at: now,
            updated_at: now,
        };

        for stage in &clone.stages {
            inner.stage_owner.insert(stage.id, new_id);
        }
        inner.generation += 1;
        inner.workflows.insert(new_id, clone.clone());
        tracing::info!(
            source = %id,
            workflow_id = %new_id,
            actor = %actor,
            stages = clone.stages.len(),
            "workflow cloned"
        );
        Ok(clone)
    }

    /// Remove a workflow and its stages.
    pub fn delete(&self, id: WorkflowId) -> Result<WorkflowDefinition, SignoffError> {
        self.delete_if(id, |_| Ok(()))
    }

    /// Remove a workflow after `check` approves it, under the same write lock.
    pub fn delete_if(
        &self,
        id: WorkflowId,
        check: impl FnOnce(&WorkflowDefinition) -> Result<(), SignoffError>,
    ) -> Result<WorkflowDefinition, SignoffError> {
        let mut inner = self.inner.write();
        let workflow = inner
            .workflows
            .get(&id)
            .ok_or_else(|| SignoffError::not_found(format!("workflow {id}")))?;
        check(workflow)?;

        let removed = inner
            .workflows
            .remove(&id)
            .ok_or_else(|| SignoffError::not_found(format!("workflow {id}")))?;
        for stage in &removed.stages {
            inner.stage_owner.remove(&stage.id);
        }
        inner.generation += 1;
        tracing::info!(workflow_id = %id, "workflow deleted");
        Ok(removed)
    }

    /// Add a stage, appending or inserting at `position` and shifting later
    /// stages down by one.
    pub fn add_stage(
        &self,
        workflow_id: WorkflowId,
        request: NewStage,
    ) -> Result<WorkflowStage, SignoffError> {
        let name = validated_name(&request.name, "stage")?;
        let approval_quorum = validated_quorum(request.approval_quorum)?;

        let mut inner = self.inner.write();
        let workflow = inner.workflow_mut(workflow_id)?;
        let append_at = workflow.stages.len() as u32 + 1;
        let position = match request.position {
            None => append_at,
            Some(p) if (1..=append_at).contains(&p) => p,
            Some(p) => {
                return Err(SignoffError::validation(format!(
                    "stage position {p} out of range 1..={append_at}"
                )))
            }
        };
        if request.is_final && workflow.final_stage().is_some() {
            return Err(SignoffError::validation(format!(
                "workflow {workflow_id} already has a final stage"
            )));
        }

        for existing in workflow.stages.iter_mut().filter(|s| s.position >= position) {
            existing.position += 1;
        }
        let stage = WorkflowStage {
            id: StageId::new(),
            workflow_id,
            position,
            name,
            approval_quorum,
            timeout_days: request.timeout_days,
            is_final: request.is_final,
            capabilities: request.capabilities,
            assignment: request.assignment,
        };
        workflow.stages.push(stage.clone());
        normalize_positions(&mut workflow.stages);

        inner.stage_owner.insert(stage.id, workflow_id);
        inner.touch(workflow_id);
        tracing::info!(
            workflow_id = %workflow_id,
            stage_id = %stage.id,
            position,
            "stage added"
        );
        Ok(stage)
    }

    /// Apply a partial update to a stage. Setting `is_final` moves the final
    /// marker from any other stage of the same workflow.
    pub fn update_stage(
        &self,
        stage_id: StageId,
        patch: StagePatch,
    ) -> Result<WorkflowStage, SignoffError> {
        let name = patch
            .name
            .as_deref()
            .map(|n| validated_name(n, "stage"))
            .transpose()?;
        let quorum = patch.approval_quorum.map(validated_quorum).transpose()?;

        let mut inner = self.inner.write();
        let workflow_id = inner.owner_of(stage_id)?;
        let workflow = inner.workflow_mut(workflow_id)?;

        if patch.is_final == Some(true) {
            for other in workflow.stages.iter_mut().filter(|s| s.id != stage_id) {
                other.is_final = false;
            }
        }
        let stage = workflow
            .stages
            .iter_mut()
            .find(|s| s.id == stage_id)
            .ok_or_else(|| SignoffError::not_found(format!("stage {stage_id}")))?;
        if let Some(name) = name {
            stage.name = name;
        }
        if let Some(quorum) = quorum {
            stage.approval_quorum = quorum;
        }
        if let Some(timeout_days) = patch.timeout_days {
            stage.timeout_days = timeout_days;
        }
        if let Some(is_final) = patch.is_final {
            stage.is_final = is_final;
        }
        if let Some(capabilities) = patch.capabilities {
            stage.capabilities = capabilities;
        }
        if let Some(assignment) = patch.assignment {
            stage.assignment = assignment;
        }
        let updated = stage.clone();

        inner.touch(workflow_id);
        tracing::info!(workflow_id = %workflow_id, stage_id = %stage_id, "stage updated");
        Ok(updated)
    }

    /// Remove a stage and compact the remaining positions.
    ///
    /// The last stage of an active workflow cannot be removed.
    pub fn delete_stage(&self, stage_id: StageId) -> Result<WorkflowStage, SignoffError> {
        let mut inner = self.inner.write();
        let workflow_id = inner.owner_of(stage_id)?;
        let workflow = inner.workflow_mut(workflow_id)?;
        if workflow.is_active && workflow.stages.len() == 1 {
            return Err(SignoffError::validation(format!(
                "cannot remove the only stage of active workflow {workflow_id}"
            )));
        }

        let index = workflow
            .stages
            .iter()
            .position(|s| s.id == stage_id)
            .ok_or_else(|| SignoffError::not_found(format!("stage {stage_id}")))?;
        let removed = workflow.stages.remove(index);
        normalize_positions(&mut workflow.stages);

        inner.stage_owner.remove(&stage_id);
        inner.touch(workflow_id);
        tracing::info!(workflow_id = %workflow_id, stage_id = %stage_id, "stage deleted");
        Ok(removed)
    }

    /// Rewrite stage positions to match `ordered_ids`.
    ///
    /// `ordered_ids` must contain exactly the workflow's stage ids, each once.
    pub fn reorder_stages(
        &self,
        workflow_id: WorkflowId,
        ordered_ids: &[StageId],
    ) -> Result<Vec<WorkflowStage>, SignoffError> {
        let mut inner = self.inner.write();
        let workflow = inner.workflow_mut(workflow_id)?;

        let requested: BTreeSet<StageId> = ordered_ids.iter().copied().collect();
        let existing: BTreeSet<StageId> = workflow.stages.iter().map(|s| s.id).collect();
        if requested.len() != ordered_ids.len() {
            return Err(SignoffError::validation("reorder list contains duplicate stage ids"));
        }
        if requested != existing {
            return Err(SignoffError::validation(format!(
                "reorder list must contain exactly the {} stages of workflow {workflow_id}",
                existing.len()
            )));
        }

        for stage in workflow.stages.iter_mut() {
            if let Some(index) = ordered_ids.iter().position(|id| *id == stage.id) {
                stage.position = index as u32 + 1;
            }
        }
        normalize_positions(&mut workflow.stages);
        let stages = workflow.stages.clone();

        inner.touch(workflow_id);
        tracing::info!(workflow_id = %workflow_id, stages = stages.len(), "stages reordered");
        Ok(stages)
    }

    /// Ordered stage view of a workflow at its current revision.
    pub fn catalog(&self, workflow_id: WorkflowId) -> Result<StageCatalog, SignoffError> {
        let workflow = self.get(workflow_id)?;
        Ok(StageCatalog::new(workflow.id, workflow.revision, workflow.stages))
    }

    /// Whether `catalog` still reflects the workflow's current revision.
    pub fn is_current(&self, catalog: &StageCatalog) -> bool {
        self.inner
            .read()
            .workflows
            .get(&catalog.workflow_id())
            .is_some_and(|w| w.revision == catalog.revision())
    }

    /// The single active workflow applicable to `document_type`.
    pub fn resolve(&self, document_type: &DocumentTypeId) -> Result<WorkflowDefinition, SignoffError> {
        self.inner.read().resolve(document_type).cloned()
    }

    /// Resolve the workflow for `document_type` and run `f` on it under the
    /// registry read lock. Deletes and definition edits wait until `f`
    /// returns, so whatever `f` records against the workflow cannot outlive
    /// it unnoticed.
    ///
    /// The outer error is the resolution failure. `f` must not call back into
    /// the registry.
    pub fn with_resolved<T>(
        &self,
        document_type: &DocumentTypeId,
        f: impl FnOnce(&WorkflowDefinition) -> T,
    ) -> Result<T, SignoffError> {
        let inner = self.inner.read();
        let workflow = inner.resolve(document_type)?;
        Ok(f(workflow))
    }
}
