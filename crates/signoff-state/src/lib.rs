//! # signoff-state — Approval State Machine
//!
//! The runtime side of the approval engine, free of storage and I/O:
//!
//! - **Permission** (`permission.rs`): pure `(stage, actor) → allowed actions`
//!   evaluation from stage capabilities and role/user assignment.
//! - **Machine** (`machine.rs`): document status transitions
//!   (`Draft → Pending → Approved | Rejected | Cancelled`, with return for
//!   rework) over pinned stage routes, including quorum tracking.
//!
//! ## Design
//!
//! Transitions mutate an in-memory [`ApprovalState`] and return a
//! [`Transition`]. They never persist anything, so callers can stage a
//! transition on a copy and commit it together with its audit record, or
//! discard it.

pub mod machine;
pub mod permission;

pub use machine::{
    ActionKind, ApprovalState, ApprovalStatus, AvailableActions, DocumentFacts, Transition,
    TransitionError, WorkflowInstance,
};
pub use permission::{allowed_actions, evaluate, PermissionDenied, StageAction};
