//! # Approval Engine
//!
//! The operation surface consumed by host applications. Combines the
//! definition registry, the document gateway, the per-document ledgers, and
//! the transition journal.
//!
//! Every transition follows the same path: fetch document facts, resolve
//! anything that must be read outside the ledger lock (the workflow for a
//! submit), then run the state machine inside [`LedgerStore::transact`].
//! Committed transitions are logged at `info` and counted in
//! `signoff_transitions_total{action}`; refusals are counted in
//! `signoff_transition_rejections_total{reason}`.

use std::collections::BTreeSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use signoff_core::{
    Actor, DocumentRef, InstanceId, SignoffError, StageId, Timestamp, UserId, WorkflowId,
};
use signoff_definition::{
    NewStage, NewWorkflow, StageCatalog, StagePatch, WorkflowDefinition, WorkflowPatch,
    WorkflowRegistry, WorkflowStage,
};
use signoff_state::{
    ActionKind, ApprovalState, ApprovalStatus, AvailableActions, Transition, TransitionError,
    WorkflowInstance,
};

use crate::audit::WorkflowAction;
use crate::gateway::DocumentGateway;
use crate::journal::{NullJournal, TransitionJournal};
use crate::ledger::{LedgerStore, TransitionOutcome};

/// Optional parameters of a transition request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ActionRequest {
    /// Must name the current stage when given.
    pub stage_id: Option<StageId>,
    /// Required for reject and return.
    pub comment: Option<String>,
    /// Must equal the ledger version when given.
    pub expected_version: Option<u64>,
}

impl ActionRequest {
    /// A request carrying only a comment.
    pub fn with_comment(comment: impl Into<String>) -> Self {
        Self {
            comment: Some(comment.into()),
            ..Self::default()
        }
    }

    /// Pin the expected current stage.
    pub fn at_stage(mut self, stage_id: StageId) -> Self {
        self.stage_id = Some(stage_id);
        self
    }

    /// Pin the expected ledger version.
    pub fn at_version(mut self, version: u64) -> Self {
        self.expected_version = Some(version);
        self
    }
}

/// Current workflow position of a document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentStatus {
    pub document: DocumentRef,
    pub status: ApprovalStatus,
    pub workflow_id: Option<WorkflowId>,
    pub instance_id: Option<InstanceId>,
    pub current_stage: Option<WorkflowStage>,
    /// Distinct approvals recorded at the current stage.
    pub approvals: BTreeSet<UserId>,
    pub stage_entered_at: Option<Timestamp>,
    /// Advisory; never enforced.
    pub sla_deadline: Option<Timestamp>,
    pub version: u64,
}

/// The approval workflow engine.
pub struct ApprovalEngine {
    registry: WorkflowRegistry,
    ledgers: LedgerStore,
    documents: Arc<dyn DocumentGateway>,
    journal: Arc<dyn TransitionJournal>,
}

impl std::fmt::Debug for ApprovalEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApprovalEngine")
            .field("workflows", &self.registry.list().len())
            .field("documents", &self.ledgers.len())
            .finish()
    }
}

impl ApprovalEngine {
    /// An engine with an empty registry and a journal that stores nothing.
    pub fn new(documents: Arc<dyn DocumentGateway>) -> Self {
        Self {
            registry: WorkflowRegistry::new(),
            ledgers: LedgerStore::new(),
            documents,
            journal: Arc::new(NullJournal),
        }
    }

    /// Use `registry` for workflow definitions.
    pub fn with_registry(mut self, registry: WorkflowRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Offer every staged transition to `journal` before commit.
    pub fn with_journal(mut self, journal: Arc<dyn TransitionJournal>) -> Self {
        self.journal = journal;
        self
    }

    /// The definition registry.
    pub fn registry(&self) -> &WorkflowRegistry {
        &self.registry
    }

    // ─── Definitions ────────────────────────────────────────────────

    pub fn list_workflows(&self) -> Vec<WorkflowDefinition> {
        self.registry.list()
    }

    pub fn get_workflow(&self, id: WorkflowId) -> Result<WorkflowDefinition, SignoffError> {
        self.registry.get(id)
    }

    pub fn create_workflow(&self, request: NewWorkflow) -> Result<WorkflowDefinition, SignoffError> {
        self.registry.create(request)
    }

    pub fn update_workflow(
        &self,
        id: WorkflowId,
        patch: WorkflowPatch,
    ) -> Result<WorkflowDefinition, SignoffError> {
        self.registry.update(id, patch)
    }

    pub fn clone_workflow(
        &self,
        id: WorkflowId,
        new_name: &str,
        actor: &Actor,
    ) -> Result<WorkflowDefinition, SignoffError> {
        self.registry.clone_workflow(id, new_name, &actor.user_id)
    }

    pub fn toggle_active(&self, id: WorkflowId) -> Result<WorkflowDefinition, SignoffError> {
        self.registry.toggle_active(id)
    }

    /// Delete a workflow. Fails with `Conflict` while any document is routing
    /// against it.
    pub fn delete_workflow(&self, id: WorkflowId) -> Result<WorkflowDefinition, SignoffError> {
        self.registry.delete_if(id, |workflow| {
            if self.ledgers.any_routing(workflow.id) {
                return Err(SignoffError::Conflict(format!(
                    "workflow '{}' has documents pending approval",
                    workflow.name
                )));
            }
            Ok(())
        })
    }

    pub fn add_stage(
        &self,
        workflow_id: WorkflowId,
        request: NewStage,
    ) -> Result<WorkflowStage, SignoffError> {
        self.registry.add_stage(workflow_id, request)
    }

    pub fn update_stage(
        &self,
        stage_id: StageId,
        patch: StagePatch,
    ) -> Result<WorkflowStage, SignoffError> {
        self.registry.update_stage(stage_id, patch)
    }

    pub fn delete_stage(&self, stage_id: StageId) -> Result<WorkflowStage, SignoffError> {
        self.registry.delete_stage(stage_id)
    }

    pub fn reorder_stages(
        &self,
        workflow_id: WorkflowId,
        ordered_ids: &[StageId],
    ) -> Result<Vec<WorkflowStage>, SignoffError> {
        self.registry.reorder_stages(workflow_id, ordered_ids)
    }

    // ─── Transitions ────────────────────────────────────────────────

    /// Route a draft document into the workflow applicable to its type.
    pub fn submit(
        &self,
        document: &DocumentRef,
        actor: &Actor,
        request: ActionRequest,
    ) -> Result<TransitionOutcome, SignoffError> {
        let snapshot = self.documents.fetch(document)?;
        let facts = snapshot.facts();
        self.current_state(document)
            .check_submit(actor, &facts)
            .map_err(|e| self.refused(ActionKind::Submit, document, actor, e))?;

        // Commit under the registry read lock so a concurrent delete either
        // sees this instance routing or runs before resolution.
        self.registry
            .with_resolved(&snapshot.document_type, |workflow| {
                let catalog =
                    StageCatalog::new(workflow.id, workflow.revision, workflow.stages.clone());
                self.commit(ActionKind::Submit, document, actor, request.expected_version, |state, now| {
                    state.submit(
                        actor,
                        &facts,
                        catalog,
                        &workflow.name,
                        request.comment.as_deref(),
                        now,
                    )
                })
            })
            .map_err(|e| {
                metrics::counter!("signoff_transition_rejections_total", "reason" => "no_workflow")
                    .increment(1);
                e
            })?
    }

    /// Approve at the current stage.
    pub fn approve(
        &self,
        document: &DocumentRef,
        actor: &Actor,
        request: ActionRequest,
    ) -> Result<TransitionOutcome, SignoffError> {
        self.documents.fetch(document)?;
        self.commit(ActionKind::Approve, document, actor, request.expected_version, |state, now| {
            state.approve(request.stage_id, actor, request.comment.as_deref(), now)
        })
    }

    /// Reject at the current stage. Requires a comment.
    pub fn reject(
        &self,
        document: &DocumentRef,
        actor: &Actor,
        request: ActionRequest,
    ) -> Result<TransitionOutcome, SignoffError> {
        self.documents.fetch(document)?;
        self.commit(ActionKind::Reject, document, actor, request.expected_version, |state, now| {
            state.reject(request.stage_id, actor, request.comment.as_deref(), now)
        })
    }

    /// Send back to draft for rework. Requires a comment.
    pub fn return_for_rework(
        &self,
        document: &DocumentRef,
        actor: &Actor,
        request: ActionRequest,
    ) -> Result<TransitionOutcome, SignoffError> {
        self.documents.fetch(document)?;
        self.commit(ActionKind::Return, document, actor, request.expected_version, |state, now| {
            state.return_for_rework(request.stage_id, actor, request.comment.as_deref(), now)
        })
    }

    /// Cancel a draft or pending document. Creator only.
    pub fn cancel(
        &self,
        document: &DocumentRef,
        actor: &Actor,
        request: ActionRequest,
    ) -> Result<TransitionOutcome, SignoffError> {
        let facts = self.documents.fetch(document)?.facts();
        self.commit(ActionKind::Cancel, document, actor, request.expected_version, |state, now| {
            state.cancel(actor, &facts, request.comment.as_deref(), now)
        })
    }

    /// Dispatch a transition by kind.
    pub fn perform(
        &self,
        action: ActionKind,
        document: &DocumentRef,
        actor: &Actor,
        request: ActionRequest,
    ) -> Result<TransitionOutcome, SignoffError> {
        match action {
            ActionKind::Submit => self.submit(document, actor, request),
            ActionKind::Approve => self.approve(document, actor, request),
            ActionKind::Reject => self.reject(document, actor, request),
            ActionKind::Return => self.return_for_rework(document, actor, request),
            ActionKind::Cancel => self.cancel(document, actor, request),
        }
    }

    // ─── Queries ────────────────────────────────────────────────────

    /// What `actor` could do to `document` right now.
    pub fn get_available_actions(
        &self,
        document: &DocumentRef,
        actor: &Actor,
    ) -> Result<AvailableActions, SignoffError> {
        let snapshot = self.documents.fetch(document)?;
        let mut available = self
            .current_state(document)
            .available_actions(actor, &snapshot.facts());
        if available.actions.contains(&ActionKind::Submit)
            && self.registry.resolve(&snapshot.document_type).is_err()
        {
            available.actions.remove(&ActionKind::Submit);
        }
        Ok(available)
    }

    /// The document's audit log across all instances, oldest first.
    pub fn get_history(&self, document: &DocumentRef) -> Result<Vec<WorkflowAction>, SignoffError> {
        self.documents.fetch(document)?;
        Ok(self
            .ledgers
            .get(document)
            .map(|ledger| ledger.log.list())
            .unwrap_or_default())
    }

    /// Recompute the document's audit hash chain.
    pub fn verify_history(&self, document: &DocumentRef) -> Result<(), SignoffError> {
        if let Some(ledger) = self.ledgers.get(document) {
            ledger.log.verify()?;
        }
        Ok(())
    }

    /// Where the document is in its workflow.
    pub fn status(&self, document: &DocumentRef) -> Result<DocumentStatus, SignoffError> {
        self.documents.fetch(document)?;
        let (state, version) = self
            .ledgers
            .get(document)
            .map(|ledger| (ledger.state, ledger.version))
            .unwrap_or_default();
        let open = state.open_instance();
        Ok(DocumentStatus {
            document: document.clone(),
            status: state.status,
            workflow_id: open.map(|i| i.workflow_id),
            instance_id: open.map(|i| i.id),
            current_stage: state.current_stage().cloned(),
            approvals: open.map(|i| i.approvals.clone()).unwrap_or_default(),
            stage_entered_at: open.and_then(|i| i.stage_entered_at),
            sla_deadline: open.and_then(WorkflowInstance::sla_deadline),
            version,
        })
    }

    /// Every instance of the document, oldest first.
    pub fn instances(&self, document: &DocumentRef) -> Result<Vec<WorkflowInstance>, SignoffError> {
        self.documents.fetch(document)?;
        Ok(self
            .ledgers
            .get(document)
            .map(|ledger| ledger.state.instances)
            .unwrap_or_default())
    }

    // ─── Internals ──────────────────────────────────────────────────

    fn current_state(&self, document: &DocumentRef) -> ApprovalState {
        self.ledgers
            .get(document)
            .map(|ledger| ledger.state)
            .unwrap_or_default()
    }

    fn commit<F>(
        &self,
        action: ActionKind,
        document: &DocumentRef,
        actor: &Actor,
        expected_version: Option<u64>,
        transition: F,
    ) -> Result<TransitionOutcome, SignoffError>
    where
        F: FnOnce(&mut ApprovalState, Timestamp) -> Result<Transition, TransitionError>,
    {
        let now = Timestamp::now();
        let result = self.ledgers.transact(
            document,
            &actor.user_id,
            expected_version,
            self.journal.as_ref(),
            now,
            |state| {
                transition(state, now).map_err(|e| self.refused(action, document, actor, e))
            },
        );

        match result {
            Ok(outcome) => {
                tracing::info!(
                    document = %document,
                    action = %action,
                    actor = %actor.user_id,
                    from = %outcome.transition.from_status,
                    to = %outcome.status,
                    stage = ?outcome.transition.to_stage,
                    version = outcome.version,
                    "transition committed"
                );
                metrics::counter!("signoff_transitions_total", "action" => action.as_str())
                    .increment(1);
                Ok(outcome)
            }
            Err(SignoffError::Journal(reason)) => {
                tracing::error!(document = %document, action = %action, %reason, "journal rejected transition");
                metrics::counter!("signoff_transition_rejections_total", "reason" => "journal")
                    .increment(1);
                Err(SignoffError::Journal(reason))
            }
            Err(e) => Err(e),
        }
    }

    fn refused(
        &self,
        action: ActionKind,
        document: &DocumentRef,
        actor: &Actor,
        err: TransitionError,
    ) -> SignoffError {
        match &err {
            TransitionError::StageMismatch { requested } => tracing::warn!(
                document = %document,
                action = %action,
                requested = %requested,
                "stale stage token"
            ),
            TransitionError::Permission(_) | TransitionError::NotCreator { .. } => tracing::debug!(
                document = %document,
                action = %action,
                actor = %actor.user_id,
                error = %err,
                "permission denied"
            ),
            _ => tracing::debug!(
                document = %document,
                action = %action,
                error = %err,
                "transition refused"
            ),
        }
        metrics::counter!("signoff_transition_rejections_total", "reason" => err.reason())
            .increment(1);
        err.into()
    }
}
