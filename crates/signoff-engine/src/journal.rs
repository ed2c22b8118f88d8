//! # Transition Journal
//!
//! The durability seam of the engine. Every staged transition is offered to a
//! [`TransitionJournal`] before it is committed to the in-memory ledger. If
//! the journal refuses, nothing is committed: instance state and its audit
//! record share one transaction boundary.
//!
//! Implementations must be synchronous and must not block for long; the call
//! runs while the document's ledger entry is locked.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use signoff_core::{DocumentRef, SignoffError};
use signoff_state::ApprovalState;

use crate::audit::WorkflowAction;

/// A staged transition awaiting commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JournalEntry {
    pub document: DocumentRef,
    /// Ledger version after commit.
    pub version: u64,
    /// Document approval state after commit.
    pub state: ApprovalState,
    /// Audit record written with this transition, if any.
    pub action: Option<WorkflowAction>,
}

/// Durable sink for staged transitions.
pub trait TransitionJournal: Send + Sync {
    /// Persist `entry`. An error aborts the transition.
    fn record(&self, entry: &JournalEntry) -> Result<(), SignoffError>;
}

/// Journal that accepts everything and stores nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullJournal;

impl TransitionJournal for NullJournal {
    fn record(&self, _entry: &JournalEntry) -> Result<(), SignoffError> {
        Ok(())
    }
}

/// In-memory journal that keeps every accepted entry and can be told to fail.
#[derive(Debug, Default)]
pub struct MemoryJournal {
    entries: Mutex<Vec<JournalEntry>>,
    failing: Mutex<Option<String>>,
}

impl MemoryJournal {
    /// An empty, accepting journal.
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail every subsequent `record` with `reason`.
    pub fn fail_with(&self, reason: impl Into<String>) {
        *self.failing.lock() = Some(reason.into());
    }

    /// Accept entries again.
    pub fn recover(&self) {
        *self.failing.lock() = None;
    }

    /// Entries accepted so far.
    pub fn entries(&self) -> Vec<JournalEntry> {
        self.entries.lock().clone()
    }

    /// Number of accepted entries.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Whether nothing has been accepted.
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

impl TransitionJournal for MemoryJournal {
    fn record(&self, entry: &JournalEntry) -> Result<(), SignoffError> {
        if let Some(reason) = self.failing.lock().as_ref() {
            return Err(SignoffError::Journal(reason.clone()));
        }
        self.entries.lock().push(entry.clone());
        Ok(())
    }
}
