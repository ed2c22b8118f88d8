//! # Approval State Machine
//!
//! Drives one document through the stages of its workflow.
//!
//! ## States
//!
//! ```text
//!          submit                 approve (quorum met, next stage exists)
//! Draft ──────────▶ Pending(p) ─────────────────────────────▶ Pending(p+1)
//!   ▲  │               │  │ │
//!   │  │ cancel        │  │ └── approve (final stage, or last) ──▶ Approved (terminal)
//!   │  ▼               │  └──── reject ─────────────────────────▶ Rejected (terminal)
//!   │ Cancelled ◀──────┤ cancel
//!   │ (terminal)       │
//!   └──────────────────┘ return (closes the instance; resubmit starts a new one)
//! ```
//!
//! Every submission opens a [`WorkflowInstance`] that pins the resolved
//! workflow's ordered stages. Definition edits made while an instance is
//! routing do not affect it.
//!
//! Transitions are pure: they mutate an [`ApprovalState`] in memory and return
//! a [`Transition`] describing what happened. Persisting the new state and the
//! audit record together is the caller's job.

use std::collections::BTreeSet;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use signoff_core::{Actor, InstanceId, SignoffError, StageId, Timestamp, UserId, WorkflowId};
use signoff_definition::{StageCatalog, WorkflowStage};

use crate::permission::{evaluate, PermissionDenied, StageAction};

// ─── Approval Status ─────────────────────────────────────────────────

/// Workflow status of a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalStatus {
    /// Not submitted, or returned for rework.
    #[default]
    Draft,
    /// Routing through stages.
    Pending,
    /// Final stage approved (terminal).
    Approved,
    /// Rejected at some stage (terminal).
    Rejected,
    /// Cancelled by the creator (terminal).
    Cancelled,
}

impl ApprovalStatus {
    /// Whether no further transition is possible.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Approved | Self::Rejected | Self::Cancelled)
    }

    /// The wire name of this status.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
            Self::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for ApprovalStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ─── Action Kind ─────────────────────────────────────────────────────

/// A document-level transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    Submit,
    Approve,
    Reject,
    Return,
    Cancel,
}

impl ActionKind {
    /// The wire name of this action.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Submit => "submit",
            Self::Approve => "approve",
            Self::Reject => "reject",
            Self::Return => "return",
            Self::Cancel => "cancel",
        }
    }
}

impl std::fmt::Display for ActionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActionKind {
    type Err = SignoffError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "submit" => Ok(Self::Submit),
            "approve" => Ok(Self::Approve),
            "reject" => Ok(Self::Reject),
            "return" => Ok(Self::Return),
            "cancel" => Ok(Self::Cancel),
            other => Err(SignoffError::validation(format!("unknown action {other:?}"))),
        }
    }
}

// ─── Errors ──────────────────────────────────────────────────────────

/// Why a transition was refused.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransitionError {
    /// The document is approved, rejected, or cancelled.
    #[error("document is {status}; {action} is not allowed from a terminal status")]
    Terminal {
        status: ApprovalStatus,
        action: ActionKind,
    },

    /// The action is not legal from the current status.
    #[error("cannot {action} a document that is {status}")]
    InvalidStatus {
        status: ApprovalStatus,
        action: ActionKind,
    },

    /// Submission while an instance is still routing.
    #[error("document already has an active approval instance")]
    ActiveInstance,

    /// The stage named by the caller is not the current stage.
    #[error("stage {requested} is not the current stage")]
    StageMismatch { requested: StageId },

    /// The same user approving the same stage twice.
    #[error("{user} has already approved stage '{stage}'")]
    AlreadyApproved { user: UserId, stage: String },

    /// Submit and cancel are reserved for the document's creator.
    #[error("only the document's creator may {action}")]
    NotCreator { action: ActionKind },

    /// The document was finalized outside the workflow (e.g. already paid).
    #[error("document has been finalized outside the approval workflow")]
    ExternallyFinalized,

    /// Reject and return require a non-blank comment.
    #[error("a comment is required to {action}")]
    CommentRequired { action: ActionKind },

    /// The resolved workflow has no stages.
    #[error("workflow '{workflow}' has no stages")]
    EmptyRoute { workflow: String },

    /// The permission evaluator refused the action.
    #[error(transparent)]
    Permission(#[from] PermissionDenied),
}

impl TransitionError {
    /// Short machine-readable reason, used as a metrics label.
    pub fn reason(&self) -> &'static str {
        match self {
            Self::Terminal { .. } => "terminal",
            Self::InvalidStatus { .. } => "invalid_status",
            Self::ActiveInstance => "active_instance",
            Self::StageMismatch { .. } => "stage_mismatch",
            Self::AlreadyApproved { .. } => "already_approved",
            Self::NotCreator { .. } => "not_creator",
            Self::ExternallyFinalized => "externally_finalized",
            Self::CommentRequired { .. } => "comment_required",
            Self::EmptyRoute { .. } => "empty_route",
            Self::Permission(_) => "permission_denied",
        }
    }
}

impl From<TransitionError> for SignoffError {
    fn from(err: TransitionError) -> Self {
        match err {
            TransitionError::Permission(denied) => denied.into(),
            TransitionError::NotCreator { .. } => SignoffError::PermissionDenied(err.to_string()),
            TransitionError::ActiveInstance => SignoffError::Conflict(err.to_string()),
            TransitionError::CommentRequired { .. } | TransitionError::EmptyRoute { .. } => {
                SignoffError::Validation(err.to_string())
            }
            TransitionError::Terminal { .. }
            | TransitionError::InvalidStatus { .. }
            | TransitionError::StageMismatch { .. }
            | TransitionError::AlreadyApproved { .. }
            | TransitionError::ExternallyFinalized => {
                SignoffError::InvalidStateTransition(err.to_string())
            }
        }
    }
}

// ─── Document Facts ──────────────────────────────────────────────────

/// What the machine needs to know about the underlying document record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentFacts {
    /// The user who created the document.
    pub created_by: UserId,
    /// Whether the document was finalized outside the workflow (e.g. paid).
    pub externally_finalized: bool,
}

// ─── Instance ────────────────────────────────────────────────────────

/// One routing of a document through a workflow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowInstance {
    pub id: InstanceId,
    pub workflow_id: WorkflowId,
    pub workflow_name: String,
    /// Revision of the workflow when the route was pinned.
    pub workflow_revision: u64,
    /// Ordered stages pinned at submission.
    pub route: Vec<WorkflowStage>,
    pub status: ApprovalStatus,
    /// Current stage position; `None` once the instance is closed.
    pub current_stage: Option<u32>,
    /// Distinct users who approved the current stage so far.
    pub approvals: BTreeSet<UserId>,
    pub started_at: Timestamp,
    /// When the current stage was entered.
    pub stage_entered_at: Option<Timestamp>,
    pub completed_at: Option<Timestamp>,
}

impl WorkflowInstance {
    fn start(catalog: StageCatalog, workflow_name: &str, now: Timestamp) -> Result<Self, TransitionError> {
        let workflow_id = catalog.workflow_id();
        let workflow_revision = catalog.revision();
        let route = catalog.into_stages();
        if route.is_empty() {
            return Err(TransitionError::EmptyRoute {
                workflow: workflow_name.to_string(),
            });
        }
        Ok(Self {
            id: InstanceId::new(),
            workflow_id,
            workflow_name: workflow_name.to_string(),
            workflow_revision,
            route,
            status: ApprovalStatus::Pending,
            current_stage: Some(1),
            approvals: BTreeSet::new(),
            started_at: now,
            stage_entered_at: Some(now),
            completed_at: None,
        })
    }

    /// Whether the instance is still routing.
    pub fn is_open(&self) -> bool {
        self.completed_at.is_none()
    }

    /// The stage at `position` in the pinned route.
    pub fn stage_at(&self, position: u32) -> Option<&WorkflowStage> {
        let index = usize::try_from(position).ok()?.checked_sub(1)?;
        self.route.get(index)
    }

    /// The stage the instance is waiting on.
    pub fn current(&self) -> Option<&WorkflowStage> {
        self.current_stage.and_then(|p| self.stage_at(p))
    }

    /// Advisory deadline for the current stage, from its `timeout_days`.
    /// Reporting only; nothing enforces it.
    pub fn sla_deadline(&self) -> Option<Timestamp> {
        let days = self.current()?.timeout_days?;
        Some(self.stage_entered_at?.plus_days(days))
    }

    fn close(&mut self, status: ApprovalStatus, now: Timestamp) {
        self.status = status;
        self.current_stage = None;
        self.approvals.clear();
        self.stage_entered_at = None;
        self.completed_at = Some(now);
    }
}

// ─── Transition ──────────────────────────────────────────────────────

/// Outcome of a successful transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transition {
    pub action: ActionKind,
    /// The instance acted on, if any. Cancelling an unsubmitted draft has none.
    pub instance_id: Option<InstanceId>,
    /// The stage the action was taken at.
    pub stage_id: Option<StageId>,
    pub from_status: ApprovalStatus,
    pub to_status: ApprovalStatus,
    pub from_stage: Option<u32>,
    pub to_stage: Option<u32>,
    /// Further distinct approvals the stage needs before it completes.
    pub approvals_remaining: u32,
    /// Trimmed comment, `None` when absent or blank.
    pub comment: Option<String>,
    /// Whether this transition belongs in the audit log.
    pub audited: bool,
}

/// What an actor may do to a document right now.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AvailableActions {
    pub actions: BTreeSet<ActionKind>,
    pub can_view: bool,
    pub can_edit: bool,
}

// ─── Approval State ──────────────────────────────────────────────────

/// A document's workflow status and all of its instances, oldest first.
///
/// At most one instance is open at a time, and it is always the last one.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ApprovalState {
    pub status: ApprovalStatus,
    pub instances: Vec<WorkflowInstance>,
}

impl ApprovalState {
    /// A new, unsubmitted document.
    pub fn new() -> Self {
        Self::default()
    }

    /// The instance currently routing, if any.
    pub fn open_instance(&self) -> Option<&WorkflowInstance> {
        self.instances.last().filter(|i| i.is_open())
    }

    /// The stage the document is waiting on.
    pub fn current_stage(&self) -> Option<&WorkflowStage> {
        self.open_instance().and_then(WorkflowInstance::current)
    }

    /// Check the preconditions of [`submit`](Self::submit) that do not depend
    /// on the resolved workflow.
    pub fn check_submit(&self, actor: &Actor, facts: &DocumentFacts) -> Result<(), TransitionError> {
        let action = ActionKind::Submit;
        if self.status.is_terminal() {
            return Err(TransitionError::Terminal {
                status: self.status,
                action,
            });
        }
        if self.open_instance().is_some() || self.status != ApprovalStatus::Draft {
            return Err(TransitionError::ActiveInstance);
        }
        if actor.user_id != facts.created_by {
            return Err(TransitionError::NotCreator { action });
        }
        Ok(())
    }

    /// Draft → Pending at the first stage of `catalog`.
    pub fn submit(
        &mut self,
        actor: &Actor,
        facts: &DocumentFacts,
        catalog: StageCatalog,
        workflow_name: &str,
        comment: Option<&str>,
        now: Timestamp,
    ) -> Result<Transition, TransitionError> {
        self.check_submit(actor, facts)?;
        let instance = WorkflowInstance::start(catalog, workflow_name, now)?;
        let first = instance.current().map(|s| (s.id, s.approval_quorum));

        let transition = Transition {
            action: ActionKind::Submit,
            instance_id: Some(instance.id),
            stage_id: first.map(|(id, _)| id),
            from_status: self.status,
            to_status: ApprovalStatus::Pending,
            from_stage: None,
            to_stage: instance.current_stage,
            approvals_remaining: first.map_or(0, |(_, quorum)| quorum),
            comment: normalized(comment),
            audited: true,
        };
        self.status = ApprovalStatus::Pending;
        self.instances.push(instance);
        Ok(transition)
    }

    /// Record an approval at the current stage. Advances, or completes the
    /// workflow, once the stage's quorum of distinct approvers is met.
    ///
    /// `expected_stage`, when given, must name the current stage.
    pub fn approve(
        &mut self,
        expected_stage: Option<StageId>,
        actor: &Actor,
        comment: Option<&str>,
        now: Timestamp,
    ) -> Result<Transition, TransitionError> {
        let action = ActionKind::Approve;
        let (index, stage) = self.checked_stage(expected_stage, action)?;
        evaluate(&stage, actor, StageAction::Approve)?;

        let instance = &mut self.instances[index];
        if instance.approvals.contains(&actor.user_id) {
            return Err(TransitionError::AlreadyApproved {
                user: actor.user_id.clone(),
                stage: stage.name.clone(),
            });
        }
        instance.approvals.insert(actor.user_id.clone());

        let from_status = self.status;
        let approvals = u32::try_from(instance.approvals.len()).unwrap_or(u32::MAX);
        let mut approvals_remaining = stage.approval_quorum.saturating_sub(approvals);
        if approvals_remaining == 0 {
            let next = if stage.is_final {
                None
            } else {
                instance.stage_at(stage.position + 1).map(|s| (s.position, s.approval_quorum))
            };
            match next {
                Some((position, quorum)) => {
                    instance.current_stage = Some(position);
                    instance.approvals.clear();
                    instance.stage_entered_at = Some(now);
                    approvals_remaining = quorum;
                }
                None => {
                    instance.close(ApprovalStatus::Approved, now);
                    self.status = ApprovalStatus::Approved;
                }
            }
        }

        let instance = &self.instances[index];
        Ok(Transition {
            action,
            instance_id: Some(instance.id),
            stage_id: Some(stage.id),
            from_status,
            to_status: self.status,
            from_stage: Some(stage.position),
            to_stage: instance.current_stage,
            approvals_remaining,
            comment: normalized(comment),
            audited: true,
        })
    }

    /// Pending → Rejected. Ends routing permanently.
    pub fn reject(
        &mut self,
        expected_stage: Option<StageId>,
        actor: &Actor,
        comment: Option<&str>,
        now: Timestamp,
    ) -> Result<Transition, TransitionError> {
        self.close_at_stage(expected_stage, actor, comment, now, ActionKind::Reject, ApprovalStatus::Rejected)
    }

    /// Pending → Draft. Closes the instance; a later submit opens a new one.
    pub fn return_for_rework(
        &mut self,
        expected_stage: Option<StageId>,
        actor: &Actor,
        comment: Option<&str>,
        now: Timestamp,
    ) -> Result<Transition, TransitionError> {
        self.close_at_stage(expected_stage, actor, comment, now, ActionKind::Return, ApprovalStatus::Draft)
    }

    /// Check the preconditions of [`cancel`](Self::cancel).
    pub fn check_cancel(&self, actor: &Actor, facts: &DocumentFacts) -> Result<(), TransitionError> {
        let action = ActionKind::Cancel;
        if self.status.is_terminal() {
            return Err(TransitionError::Terminal {
                status: self.status,
                action,
            });
        }
        if actor.user_id != facts.created_by {
            return Err(TransitionError::NotCreator { action });
        }
        if facts.externally_finalized {
            return Err(TransitionError::ExternallyFinalized);
        }
        // The creator bypasses the stage assignment, not its capability set.
        if let Some(stage) = self.current_stage() {
            if !StageAction::Cancel.is_granted_by(stage) {
                return Err(PermissionDenied::CapabilityNotGranted {
                    stage: stage.name.clone(),
                    action: StageAction::Cancel,
                }
                .into());
            }
        }
        Ok(())
    }

    /// Draft or Pending → Cancelled, by the document's creator. A pending
    /// document's current stage must grant `can_cancel`.
    ///
    /// Audited only if the document was ever submitted.
    pub fn cancel(
        &mut self,
        actor: &Actor,
        facts: &DocumentFacts,
        comment: Option<&str>,
        now: Timestamp,
    ) -> Result<Transition, TransitionError> {
        self.check_cancel(actor, facts)?;
        let from_status = self.status;
        let audited = !self.instances.is_empty();

        let (instance_id, stage_id, from_stage) = match self.instances.last_mut().filter(|i| i.is_open()) {
            Some(instance) => {
                let stage_id = instance.current().map(|s| s.id);
                let from_stage = instance.current_stage;
                instance.close(ApprovalStatus::Cancelled, now);
                (Some(instance.id), stage_id, from_stage)
            }
            None => (None, None, None),
        };
        self.status = ApprovalStatus::Cancelled;

        Ok(Transition {
            action: ActionKind::Cancel,
            instance_id,
            stage_id,
            from_status,
            to_status: ApprovalStatus::Cancelled,
            from_stage,
            to_stage: None,
            approvals_remaining: 0,
            comment: normalized(comment),
            audited,
        })
    }

    /// What `actor` could successfully do right now, ignoring workflow
    /// resolution for submit.
    pub fn available_actions(&self, actor: &Actor, facts: &DocumentFacts) -> AvailableActions {
        let mut available = AvailableActions::default();
        if self.check_submit(actor, facts).is_ok() {
            available.actions.insert(ActionKind::Submit);
        }
        if self.check_cancel(actor, facts).is_ok() {
            available.actions.insert(ActionKind::Cancel);
        }

        let is_creator = actor.user_id == facts.created_by;
        match (self.status, self.current_stage(), self.open_instance()) {
            (ApprovalStatus::Pending, Some(stage), Some(instance)) => {
                if evaluate(stage, actor, StageAction::Approve).is_ok()
                    && !instance.approvals.contains(&actor.user_id)
                {
                    available.actions.insert(ActionKind::Approve);
                }
                if evaluate(stage, actor, StageAction::Reject).is_ok() {
                    available.actions.insert(ActionKind::Reject);
                    available.actions.insert(ActionKind::Return);
                }
                available.can_view = is_creator || evaluate(stage, actor, StageAction::View).is_ok();
                available.can_edit = evaluate(stage, actor, StageAction::Edit).is_ok();
            }
            (ApprovalStatus::Draft, _, _) => {
                available.can_view = is_creator;
                available.can_edit = is_creator && !facts.externally_finalized;
            }
            _ => {
                available.can_view = is_creator;
            }
        }
        available
    }

    fn close_at_stage(
        &mut self,
        expected_stage: Option<StageId>,
        actor: &Actor,
        comment: Option<&str>,
        now: Timestamp,
        action: ActionKind,
        to_status: ApprovalStatus,
    ) -> Result<Transition, TransitionError> {
        let (index, stage) = self.checked_stage(expected_stage, action)?;
        let comment = normalized(comment).ok_or(TransitionError::CommentRequired { action })?;
        evaluate(&stage, actor, StageAction::Reject)?;

        let from_status = self.status;
        let instance = &mut self.instances[index];
        instance.close(to_status, now);
        self.status = to_status;

        Ok(Transition {
            action,
            instance_id: Some(instance.id),
            stage_id: Some(stage.id),
            from_status,
            to_status,
            from_stage: Some(stage.position),
            to_stage: None,
            approvals_remaining: 0,
            comment: Some(comment),
            audited: true,
        })
    }

    /// Require a pending document, and that `expected` names the current stage.
    fn checked_stage(
        &self,
        expected: Option<StageId>,
        action: ActionKind,
    ) -> Result<(usize, WorkflowStage), TransitionError> {
        if self.status.is_terminal() {
            return Err(TransitionError::Terminal {
                status: self.status,
                action,
            });
        }
        let invalid = TransitionError::InvalidStatus {
            status: self.status,
            action,
        };
        if self.status != ApprovalStatus::Pending {
            return Err(invalid);
        }
        let index = self
            .instances
            .iter()
            .rposition(WorkflowInstance::is_open)
            .ok_or_else(|| invalid.clone())?;
        let current = self.instances[index].current().ok_or(invalid)?;
        if let Some(requested) = expected.filter(|id| *id != current.id) {
            return Err(TransitionError::StageMismatch { requested });
        }
        Ok((index, current.clone()))
    }
}

fn normalized(comment: Option<&str>) -> Option<String> {
    comment
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .map(str::to_string)
}

// ─── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use signoff_core::RoleCode;
    use signoff_definition::{StageAssignment, StageCapabilities};

    fn role(code: &str) -> RoleCode {
        RoleCode::new(code).unwrap()
    }

    fn user(id: &str) -> UserId {
        UserId::new(id).unwrap()
    }

    fn stage(wf: WorkflowId, position: u32, name: &str, role_code: &str, is_final: bool) -> WorkflowStage {
        WorkflowStage {
            id: StageId::new(),
            workflow_id: wf,
            position,
            name: name.into(),
            approval_quorum: 1,
            timeout_days: None,
            is_final,
            capabilities: StageCapabilities::approver(),
            assignment: StageAssignment::role(role(role_code)),
        }
    }

    /// Manager → Director → Accountant (final).
    fn three_step() -> StageCatalog {
        let wf = WorkflowId::new();
        StageCatalog::new(
            wf,
            1,
            vec![
                stage(wf, 1, "Manager", "manager", false),
                stage(wf, 2, "Director", "director", false),
                stage(wf, 3, "Accountant", "accountant", true),
            ],
        )
    }

    fn creator() -> Actor {
        Actor::new(user("clerk"))
    }

    fn facts() -> DocumentFacts {
        DocumentFacts {
            created_by: user("clerk"),
            externally_finalized: false,
        }
    }

    fn holder(name: &str, role_code: &str) -> Actor {
        Actor::new(user(name)).with_role(role(role_code))
    }

    fn submitted(catalog: StageCatalog) -> ApprovalState {
        let mut state = ApprovalState::new();
        state
            .submit(&creator(), &facts(), catalog, "3-step", None, Timestamp::now())
            .unwrap();
        state
    }

    fn current_id(state: &ApprovalState) -> Option<StageId> {
        Some(state.current_stage().unwrap().id)
    }

    // ── Happy path ──────────────────────────────────────────────────

    #[test]
    fn three_step_approval() {
        let mut state = submitted(three_step());
        assert_eq!(state.status, ApprovalStatus::Pending);
        assert_eq!(state.open_instance().unwrap().current_stage, Some(1));

        let now = Timestamp::now();
        let t = state
            .approve(current_id(&state), &holder("m", "manager"), None, now)
            .unwrap();
        assert_eq!((t.from_stage, t.to_stage), (Some(1), Some(2)));

        state
            .approve(current_id(&state), &holder("d", "director"), None, now)
            .unwrap();
        let t = state
            .approve(current_id(&state), &holder("a", "accountant"), Some("ok"), now)
            .unwrap();

        assert_eq!(t.to_status, ApprovalStatus::Approved);
        assert_eq!(t.to_stage, None);
        assert_eq!(t.comment.as_deref(), Some("ok"));
        assert_eq!(state.status, ApprovalStatus::Approved);
        let instance = state.instances.last().unwrap();
        assert!(!instance.is_open());
        assert_eq!(instance.current_stage, None);
        assert_eq!(instance.status, ApprovalStatus::Approved);
    }

    #[test]
    fn final_stage_completes_regardless_of_position() {
        let wf = WorkflowId::new();
        let catalog = StageCatalog::new(
            wf,
            1,
            vec![
                stage(wf, 1, "Manager", "manager", true),
                stage(wf, 2, "Director", "director", false),
            ],
        );
        let mut state = submitted(catalog);
        state
            .approve(current_id(&state), &holder("m", "manager"), None, Timestamp::now())
            .unwrap();
        assert_eq!(state.status, ApprovalStatus::Approved);
        assert_eq!(state.instances[0].current_stage, None);
    }

    #[test]
    fn last_stage_without_final_marker_completes() {
        let wf = WorkflowId::new();
        let catalog = StageCatalog::new(wf, 1, vec![stage(wf, 1, "Only", "manager", false)]);
        let mut state = submitted(catalog);
        state
            .approve(current_id(&state), &holder("m", "manager"), None, Timestamp::now())
            .unwrap();
        assert_eq!(state.status, ApprovalStatus::Approved);
    }

    // ── Stage token ─────────────────────────────────────────────────

    #[test]
    fn second_approve_with_stale_stage_fails() {
        let mut state = submitted(three_step());
        let first = current_id(&state);
        state
            .approve(first, &holder("m", "manager"), None, Timestamp::now())
            .unwrap();
        let err = state
            .approve(first, &holder("m2", "manager"), None, Timestamp::now())
            .unwrap_err();
        assert!(matches!(err, TransitionError::StageMismatch { .. }));
        assert!(matches!(SignoffError::from(err), SignoffError::InvalidStateTransition(_)));
    }

    // ── Quorum ──────────────────────────────────────────────────────

    #[test]
    fn quorum_requires_distinct_approvers() {
        let wf = WorkflowId::new();
        let mut manager = stage(wf, 1, "Manager", "manager", false);
        manager.approval_quorum = 2;
        let catalog = StageCatalog::new(wf, 1, vec![manager, stage(wf, 2, "CFO", "cfo", true)]);
        let mut state = submitted(catalog);
        let id = current_id(&state);
        let now = Timestamp::now();

        let t = state.approve(id, &holder("m1", "manager"), None, now).unwrap();
        assert_eq!(t.approvals_remaining, 1);
        assert_eq!(t.to_stage, Some(1));

        let err = state.approve(id, &holder("m1", "manager"), None, now).unwrap_err();
        assert!(matches!(err, TransitionError::AlreadyApproved { .. }));

        let t = state.approve(id, &holder("m2", "manager"), None, now).unwrap();
        assert_eq!(t.to_stage, Some(2));
        assert!(state.open_instance().unwrap().approvals.is_empty());
    }

    // ── Permissions ─────────────────────────────────────────────────

    #[test]
    fn approve_requires_assignment() {
        let mut state = submitted(three_step());
        let err = state
            .approve(current_id(&state), &holder("x", "director"), None, Timestamp::now())
            .unwrap_err();
        assert!(matches!(err, TransitionError::Permission(PermissionDenied::NotAssigned { .. })));
        assert_eq!(state.open_instance().unwrap().current_stage, Some(1));
    }

    #[test]
    fn submit_only_by_creator() {
        let mut state = ApprovalState::new();
        let err = state
            .submit(&holder("m", "manager"), &facts(), three_step(), "3-step", None, Timestamp::now())
            .unwrap_err();
        assert_eq!(err, TransitionError::NotCreator { action: ActionKind::Submit });
        assert!(state.instances.is_empty());
    }

    #[test]
    fn submit_twice_conflicts() {
        let mut state = submitted(three_step());
        let err = state
            .submit(&creator(), &facts(), three_step(), "3-step", None, Timestamp::now())
            .unwrap_err();
        assert_eq!(err, TransitionError::ActiveInstance);
        assert!(matches!(SignoffError::from(err), SignoffError::Conflict(_)));
        assert_eq!(state.instances.len(), 1);
    }

    #[test]
    fn submit_with_empty_route_fails() {
        let mut state = ApprovalState::new();
        let empty = StageCatalog::new(WorkflowId::new(), 1, Vec::new());
        let err = state
            .submit(&creator(), &facts(), empty, "bare", None, Timestamp::now())
            .unwrap_err();
        assert!(matches!(err, TransitionError::EmptyRoute { .. }));
        assert_eq!(state.status, ApprovalStatus::Draft);
    }

    // ── Reject / return ─────────────────────────────────────────────

    #[test]
    fn reject_requires_comment_and_is_terminal() {
        let mut state = submitted(three_step());
        let id = current_id(&state);
        let manager = holder("m", "manager");

        let err = state.reject(id, &manager, Some("   "), Timestamp::now()).unwrap_err();
        assert_eq!(err, TransitionError::CommentRequired { action: ActionKind::Reject });
        assert!(matches!(SignoffError::from(err), SignoffError::Validation(_)));

        state
            .reject(id, &manager, Some("budget exceeded"), Timestamp::now())
            .unwrap();
        assert_eq!(state.status, ApprovalStatus::Rejected);

        let err = state.approve(id, &manager, None, Timestamp::now()).unwrap_err();
        assert!(matches!(err, TransitionError::Terminal { .. }));
    }

    #[test]
    fn return_then_resubmit_opens_new_instance() {
        let mut state = submitted(three_step());
        let id = current_id(&state);
        let t = state
            .return_for_rework(id, &holder("m", "manager"), Some("missing PO"), Timestamp::now())
            .unwrap();
        assert_eq!(t.to_status, ApprovalStatus::Draft);
        assert_eq!(state.status, ApprovalStatus::Draft);
        assert!(state.open_instance().is_none());
        assert!(state.instances[0].completed_at.is_some());

        state
            .submit(&creator(), &facts(), three_step(), "3-step", None, Timestamp::now())
            .unwrap();
        assert_eq!(state.instances.len(), 2);
        assert_ne!(state.instances[0].id, state.instances[1].id);
        assert_eq!(state.open_instance().unwrap().current_stage, Some(1));
    }

    #[test]
    fn return_requires_reject_capability() {
        let wf = WorkflowId::new();
        let mut s = stage(wf, 1, "Manager", "manager", true);
        s.capabilities.can_reject = false;
        let mut state = submitted(StageCatalog::new(wf, 1, vec![s]));
        let err = state
            .return_for_rework(current_id(&state), &holder("m", "manager"), Some("x"), Timestamp::now())
            .unwrap_err();
        assert!(matches!(
            err,
            TransitionError::Permission(PermissionDenied::CapabilityNotGranted { .. })
        ));
    }

    // ── Cancel ──────────────────────────────────────────────────────

    #[test]
    fn cancel_from_draft_is_not_audited() {
        let mut state = ApprovalState::new();
        let t = state.cancel(&creator(), &facts(), None, Timestamp::now()).unwrap();
        assert!(!t.audited);
        assert_eq!(state.status, ApprovalStatus::Cancelled);
    }

    #[test]
    fn cancel_from_pending_closes_instance() {
        let mut state = submitted(three_step());
        let t = state
            .cancel(&creator(), &facts(), Some("duplicate"), Timestamp::now())
            .unwrap();
        assert!(t.audited);
        assert_eq!(t.from_stage, Some(1));
        assert_eq!(state.instances[0].status, ApprovalStatus::Cancelled);
        assert!(!state.instances[0].is_open());
    }

    #[test]
    fn cancel_guards() {
        let mut state = submitted(three_step());
        let err = state
            .cancel(&holder("m", "manager"), &facts(), None, Timestamp::now())
            .unwrap_err();
        assert_eq!(err, TransitionError::NotCreator { action: ActionKind::Cancel });

        let paid = DocumentFacts {
            externally_finalized: true,
            ..facts()
        };
        let err = state.cancel(&creator(), &paid, None, Timestamp::now()).unwrap_err();
        assert_eq!(err, TransitionError::ExternallyFinalized);

        state.cancel(&creator(), &facts(), None, Timestamp::now()).unwrap();
        let err = state.cancel(&creator(), &facts(), None, Timestamp::now()).unwrap_err();
        assert!(matches!(err, TransitionError::Terminal { .. }));
    }

    #[test]
    fn pending_cancel_requires_stage_capability() {
        let wf = WorkflowId::new();
        let mut locked = stage(wf, 1, "Treasury", "treasury", true);
        locked.capabilities.can_cancel = false;
        let mut state = submitted(StageCatalog::new(wf, 1, vec![locked]));

        assert!(!state
            .available_actions(&creator(), &facts())
            .actions
            .contains(&ActionKind::Cancel));
        let err = state.cancel(&creator(), &facts(), None, Timestamp::now()).unwrap_err();
        assert!(matches!(
            err,
            TransitionError::Permission(PermissionDenied::CapabilityNotGranted {
                action: StageAction::Cancel,
                ..
            })
        ));
        assert_eq!(state.status, ApprovalStatus::Pending);
        assert!(state.instances[0].is_open());
    }

    #[test]
    fn draft_cancel_ignores_stage_capability() {
        let wf = WorkflowId::new();
        let mut locked = stage(wf, 1, "Treasury", "treasury", true);
        locked.capabilities.can_cancel = false;
        let mut state = submitted(StageCatalog::new(wf, 1, vec![locked]));
        let stage_id = current_id(&state);
        state
            .return_for_rework(stage_id, &holder("t", "treasury"), Some("fix"), Timestamp::now())
            .unwrap();

        let t = state.cancel(&creator(), &facts(), None, Timestamp::now()).unwrap();
        assert!(t.audited);
        assert_eq!(t.instance_id, None);
    }

    // ── Available actions ───────────────────────────────────────────

    #[test]
    fn available_actions_follow_state() {
        let state = ApprovalState::new();
        let draft = state.available_actions(&creator(), &facts());
        assert_eq!(
            draft.actions,
            BTreeSet::from([ActionKind::Submit, ActionKind::Cancel])
        );
        assert!(draft.can_edit);

        let state = submitted(three_step());
        let manager = state.available_actions(&holder("m", "manager"), &facts());
        assert_eq!(
            manager.actions,
            BTreeSet::from([ActionKind::Approve, ActionKind::Reject, ActionKind::Return])
        );
        assert!(manager.can_view);
        assert!(!manager.can_edit);

        let director = state.available_actions(&holder("d", "director"), &facts());
        assert!(director.actions.is_empty());
        assert!(!director.can_view);
    }

    #[test]
    fn sla_deadline_from_timeout() {
        let wf = WorkflowId::new();
        let mut s = stage(wf, 1, "Manager", "manager", true);
        s.timeout_days = Some(2);
        let mut state = ApprovalState::new();
        let start = Timestamp::parse("2026-03-02T08:00:00Z").unwrap();
        state
            .submit(&creator(), &facts(), StageCatalog::new(wf, 1, vec![s]), "sla", None, start)
            .unwrap();
        assert_eq!(
            state.open_instance().unwrap().sla_deadline(),
            Some(start.plus_days(2))
        );
    }

    #[test]
    fn action_kind_parse() {
        assert_eq!("return".parse::<ActionKind>().unwrap(), ActionKind::Return);
        assert!("escalate".parse::<ActionKind>().is_err());
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;
    use signoff_core::RoleCode;
    use signoff_definition::{StageAssignment, StageCapabilities};

    #[derive(Debug, Clone, Copy)]
    enum Step {
        Approve,
        Reject,
        Return,
        Cancel,
        Submit,
    }

    fn step() -> impl Strategy<Value = Step> {
        prop_oneof![
            4 => Just(Step::Approve),
            1 => Just(Step::Reject),
            1 => Just(Step::Return),
            1 => Just(Step::Cancel),
            2 => Just(Step::Submit),
        ]
    }

    proptest! {
        /// At most one open instance, always the last; terminal status is absorbing.
        #[test]
        fn invariants_hold(stages in 1u32..5, steps in prop::collection::vec(step(), 1..30)) {
            let wf = WorkflowId::new();
            let approver = RoleCode::new("approver").unwrap();
            let route: Vec<WorkflowStage> = (1..=stages)
                .map(|p| WorkflowStage {
                    id: StageId::new(),
                    workflow_id: wf,
                    position: p,
                    name: format!("s{p}"),
                    approval_quorum: 1,
                    timeout_days: None,
                    is_final: p == stages,
                    capabilities: StageCapabilities::approver(),
                    assignment: StageAssignment::role(approver.clone()),
                })
                .collect();
            let creator = Actor::new(UserId::new("clerk").unwrap());
            let facts = DocumentFacts { created_by: creator.user_id.clone(), externally_finalized: false };
            let now = Timestamp::now();

            let mut state = ApprovalState::new();
            let mut n = 0u32;
            for step in steps {
                n += 1;
                let approver_actor = Actor::new(UserId::new(format!("u{n}")).unwrap())
                    .with_role(approver.clone());
                let before = state.status;
                let stage_id = state.current_stage().map(|s| s.id);
                let result = match step {
                    Step::Submit => state.submit(
                        &creator, &facts, StageCatalog::new(wf, 1, route.clone()), "p", None, now,
                    ),
                    Step::Approve => state.approve(stage_id, &approver_actor, None, now),
                    Step::Reject => state.reject(stage_id, &approver_actor, Some("no"), now),
                    Step::Return => state.return_for_rework(stage_id, &approver_actor, Some("fix"), now),
                    Step::Cancel => state.cancel(&creator, &facts, None, now),
                };
                if before.is_terminal() {
                    prop_assert!(result.is_err());
                    prop_assert_eq!(state.status, before);
                }
                let open = state.instances.iter().filter(|i| i.is_open()).count();
                prop_assert!(open <= 1);
                if open == 1 {
                    prop_assert!(state.instances.last().unwrap().is_open());
                    prop_assert_eq!(state.status, ApprovalStatus::Pending);
                }
            }
        }
    }
}
