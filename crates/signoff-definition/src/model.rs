//! # Workflow Definition Model
//!
//! A [`WorkflowDefinition`] is a named, linear, ordered list of
//! [`WorkflowStage`]s applicable to a set of document types. Each stage grants
//! a capability set and names the roles and users allowed to act on it.
//!
//! ```text
//! WorkflowDefinition ──1:*──▶ WorkflowStage (position 1..N, contiguous)
//!        │
//!        └── applicability: { purchase_invoice, vendor_payment, ... }
//! ```
//!
//! Request types (`NewWorkflow`, `WorkflowPatch`, `NewStage`, `StagePatch`)
//! carry caller input into the [`crate::registry::WorkflowRegistry`], which
//! owns every invariant.

use std::collections::BTreeSet;

use serde::{Deserialize, Deserializer, Serialize};

use signoff_core::{
    Actor, DocumentTypeId, RoleCode, SignoffError, StageId, Timestamp, UserId, WorkflowId,
};

// ─── Capabilities ────────────────────────────────────────────────────

/// The capabilities a stage grants to the actors assigned to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StageCapabilities {
    /// May view the document while it sits at this stage.
    pub can_view: bool,
    /// May edit the document while it sits at this stage.
    pub can_edit: bool,
    /// May approve at this stage.
    pub can_approve: bool,
    /// May reject, or return for rework, at this stage.
    pub can_reject: bool,
    /// The document's creator may cancel while the document sits at this
    /// stage. Assignment does not apply to cancel; this flag does.
    pub can_cancel: bool,
}

impl StageCapabilities {
    /// The usual grant for an approver stage: view, approve, reject, and
    /// creator cancellation.
    pub fn approver() -> Self {
        Self {
            can_view: true,
            can_approve: true,
            can_reject: true,
            can_cancel: true,
            ..Self::default()
        }
    }
}

// ─── Assignment ──────────────────────────────────────────────────────

/// Role codes and individual users permitted to act on a stage.
///
/// An empty assignment means the stage is unassigned.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StageAssignment {
    /// Role codes whose holders may act.
    pub roles: BTreeSet<RoleCode>,
    /// Individual users who may act.
    pub users: BTreeSet<UserId>,
}

impl StageAssignment {
    /// Assignment to a single role.
    pub fn role(role: RoleCode) -> Self {
        Self {
            roles: BTreeSet::from([role]),
            users: BTreeSet::new(),
        }
    }

    /// Assignment to a single user.
    pub fn user(user: UserId) -> Self {
        Self {
            roles: BTreeSet::new(),
            users: BTreeSet::from([user]),
        }
    }

    /// Whether no role or user is assigned.
    pub fn is_empty(&self) -> bool {
        self.roles.is_empty() && self.users.is_empty()
    }

    /// Whether `actor` matches by user id or by any held role.
    pub fn matches(&self, actor: &Actor) -> bool {
        self.users.contains(&actor.user_id) || actor.roles.iter().any(|r| self.roles.contains(r))
    }
}

// ─── Stage ───────────────────────────────────────────────────────────

/// One step of a workflow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowStage {
    /// Unique stage identifier.
    pub id: StageId,
    /// The owning workflow.
    pub workflow_id: WorkflowId,
    /// 1-based rank within the workflow.
    pub position: u32,
    /// Display name, e.g. "Manager".
    pub name: String,
    /// Minimum number of distinct approvers before the stage completes.
    pub approval_quorum: u32,
    /// Advisory SLA in days. Reported, never enforced.
    pub timeout_days: Option<u32>,
    /// Approving this stage completes the workflow.
    pub is_final: bool,
    /// Capabilities granted at this stage.
    pub capabilities: StageCapabilities,
    /// Who may act at this stage.
    pub assignment: StageAssignment,
}

// ─── Workflow ────────────────────────────────────────────────────────

/// A named approval workflow with its ordered stages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowDefinition {
    /// Unique workflow identifier.
    pub id: WorkflowId,
    /// Display name.
    pub name: String,
    /// Free-form description.
    pub description: String,
    /// Only active workflows are considered when a document is submitted.
    pub is_active: bool,
    /// Document types this workflow routes.
    pub applicability: BTreeSet<DocumentTypeId>,
    /// Stages ordered ascending by position.
    pub stages: Vec<WorkflowStage>,
    /// Incremented on every mutation of this workflow or its stages.
    pub revision: u64,
    /// The user who created this definition, when known.
    pub created_by: Option<UserId>,
    /// The workflow this one was cloned from, if any.
    pub cloned_from: Option<WorkflowId>,
    /// When the definition was created.
    pub created_at: Timestamp,
    /// When the definition was last mutated.
    pub updated_at: Timestamp,
}

impl WorkflowDefinition {
    /// Whether this workflow applies to `document_type`.
    pub fn applies_to(&self, document_type: &DocumentTypeId) -> bool {
        self.applicability.contains(document_type)
    }

    /// The stage marked final, if any.
    pub fn final_stage(&self) -> Option<&WorkflowStage> {
        self.stages.iter().find(|s| s.is_final)
    }

    /// Look up a stage by id.
    pub fn stage(&self, stage_id: StageId) -> Option<&WorkflowStage> {
        self.stages.iter().find(|s| s.id == stage_id)
    }
}

// ─── Requests ────────────────────────────────────────────────────────

/// Input for creating a workflow. New workflows start inactive with no stages.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NewWorkflow {
    /// Display name (required).
    pub name: String,
    /// Free-form description.
    #[serde(default)]
    pub description: String,
    /// Document types the workflow applies to (at least one).
    pub applicability: BTreeSet<DocumentTypeId>,
    /// The creating user.
    #[serde(default)]
    pub created_by: Option<UserId>,
}

/// Partial update of a workflow's own fields. Stages are never patched here.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WorkflowPatch {
    /// New display name.
    pub name: Option<String>,
    /// New description.
    pub description: Option<String>,
    /// Activate or deactivate.
    pub is_active: Option<bool>,
    /// Replace the applicability set.
    pub applicability: Option<BTreeSet<DocumentTypeId>>,
}

/// Input for adding a stage to a workflow.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NewStage {
    /// Display name (required).
    pub name: String,
    /// Insert at this 1-based position, shifting later stages; append when absent.
    #[serde(default)]
    pub position: Option<u32>,
    /// Distinct approvers required; defaults to 1.
    #[serde(default = "default_quorum")]
    pub approval_quorum: u32,
    /// Advisory SLA in days.
    #[serde(default)]
    pub timeout_days: Option<u32>,
    /// Whether approving this stage completes the workflow.
    #[serde(default)]
    pub is_final: bool,
    /// Capabilities granted.
    #[serde(default)]
    pub capabilities: StageCapabilities,
    /// Who may act.
    #[serde(default)]
    pub assignment: StageAssignment,
}

impl NewStage {
    /// An approver stage assigned to one role, appended at the end.
    pub fn approver(name: impl Into<String>, role: RoleCode) -> Self {
        Self {
            name: name.into(),
            position: None,
            approval_quorum: 1,
            timeout_days: None,
            is_final: false,
            capabilities: StageCapabilities::approver(),
            assignment: StageAssignment::role(role),
        }
    }

    /// Mark the stage final.
    pub fn final_stage(mut self) -> Self {
        self.is_final = true;
        self
    }

    /// Insert at an explicit position.
    pub fn at_position(mut self, position: u32) -> Self {
        self.position = Some(position);
        self
    }

    /// Require `quorum` distinct approvers.
    pub fn with_quorum(mut self, quorum: u32) -> Self {
        self.approval_quorum = quorum;
        self
    }
}

fn default_quorum() -> u32 {
    1
}

/// Partial update of a stage. Position changes go through reordering.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StagePatch {
    /// New display name.
    pub name: Option<String>,
    /// New quorum (at least 1).
    pub approval_quorum: Option<u32>,
    /// `Some(None)` clears the SLA; `Some(Some(n))` sets it.
    #[serde(deserialize_with = "double_option")]
    pub timeout_days: Option<Option<u32>>,
    /// Set or clear the final marker.
    pub is_final: Option<bool>,
    /// Replace the capability set.
    pub capabilities: Option<StageCapabilities>,
    /// Replace the assignment.
    pub assignment: Option<StageAssignment>,
}

fn double_option<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Deserialize::deserialize(deserializer).map(Some)
}

// ─── Validation helpers ──────────────────────────────────────────────

/// Trim and require a non-empty name.
pub(crate) fn validated_name(name: &str, what: &str) -> Result<String, SignoffError> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(SignoffError::validation(format!("{what} name must not be empty")));
    }
    Ok(trimmed.to_string())
}

/// Require a non-empty applicability set.
pub(crate) fn validated_applicability(
    applicability: &BTreeSet<DocumentTypeId>,
) -> Result<(), SignoffError> {
    if applicability.is_empty() {
        return Err(SignoffError::validation(
            "workflow applicability must name at least one document type",
        ));
    }
    Ok(())
}

/// Require a quorum of at least one approver.
pub(crate) fn validated_quorum(quorum: u32) -> Result<u32, SignoffError> {
    if quorum == 0 {
        return Err(SignoffError::validation("approval_quorum must be at least 1"));
    }
    Ok(quorum)
}
