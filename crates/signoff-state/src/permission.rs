//! # Permission Evaluator
//!
//! Pure function from `(stage, actor)` to the set of stage actions the actor
//! may perform. Two checks, in order:
//!
//! 1. The stage's capability set must grant the action.
//! 2. The actor must match the stage assignment by user id or role. An
//!    unassigned stage is denied to everyone.
//!
//! Cancellation by a document's creator skips the assignment check; the
//! state machine still requires the current stage to grant `can_cancel`.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use signoff_core::{Actor, SignoffError, UserId};
use signoff_definition::WorkflowStage;

/// An action a stage capability can grant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageAction {
    View,
    Edit,
    Approve,
    /// Covers both reject and return-for-rework.
    Reject,
    Cancel,
}

impl StageAction {
    /// Every stage action, in declaration order.
    pub const ALL: [StageAction; 5] = [
        StageAction::View,
        StageAction::Edit,
        StageAction::Approve,
        StageAction::Reject,
        StageAction::Cancel,
    ];

    /// Whether `stage` grants this action's capability.
    pub fn is_granted_by(&self, stage: &WorkflowStage) -> bool {
        let caps = &stage.capabilities;
        match self {
            Self::View => caps.can_view,
            Self::Edit => caps.can_edit,
            Self::Approve => caps.can_approve,
            Self::Reject => caps.can_reject,
            Self::Cancel => caps.can_cancel,
        }
    }
}

impl std::fmt::Display for StageAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::View => "view",
            Self::Edit => "edit",
            Self::Approve => "approve",
            Self::Reject => "reject",
            Self::Cancel => "cancel",
        };
        f.write_str(s)
    }
}

/// Why the evaluator refused an action.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PermissionDenied {
    /// The stage does not grant the capability.
    #[error("stage '{stage}' does not grant {action}")]
    CapabilityNotGranted { stage: String, action: StageAction },

    /// The stage has no assigned roles or users.
    #[error("stage '{stage}' is unassigned; {action} is denied to everyone")]
    Unassigned { stage: String, action: StageAction },

    /// The actor is not among the stage's assigned roles or users.
    #[error("user {user} is not assigned to stage '{stage}'")]
    NotAssigned { stage: String, user: UserId },
}

impl From<PermissionDenied> for SignoffError {
    fn from(err: PermissionDenied) -> Self {
        SignoffError::PermissionDenied(err.to_string())
    }
}

/// Decide whether `actor` may perform `action` at `stage`.
pub fn evaluate(
    stage: &WorkflowStage,
    actor: &Actor,
    action: StageAction,
) -> Result<(), PermissionDenied> {
    if !action.is_granted_by(stage) {
        return Err(PermissionDenied::CapabilityNotGranted {
            stage: stage.name.clone(),
            action,
        });
    }
    if stage.assignment.is_empty() {
        return Err(PermissionDenied::Unassigned {
            stage: stage.name.clone(),
            action,
        });
    }
    if !stage.assignment.matches(actor) {
        return Err(PermissionDenied::NotAssigned {
            stage: stage.name.clone(),
            user: actor.user_id.clone(),
        });
    }
    Ok(())
}

/// The set of actions `actor` may perform at `stage`.
pub fn allowed_actions(stage: &WorkflowStage, actor: &Actor) -> BTreeSet<StageAction> {
    StageAction::ALL
        .into_iter()
        .filter(|action| evaluate(stage, actor, *action).is_ok())
        .collect()
}
