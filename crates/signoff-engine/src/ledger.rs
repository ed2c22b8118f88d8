//! # Document Ledger Store
//!
//! One [`DocumentLedger`] per document: its approval state (status plus all
//! instances), its audit log, and a version counter.
//!
//! ## Atomicity
//!
//! [`LedgerStore::transact`] runs read-validate-write under the document's
//! `DashMap` entry lock:
//!
//! 1. check the caller's expected version, if any;
//! 2. stage the transition on a copy of the ledger;
//! 3. seal and append the audit record on the copy;
//! 4. offer `(state, action)` to the journal;
//! 5. commit the copy.
//!
//! Any failure before step 5 leaves the stored ledger untouched, so two
//! concurrent approvals of the same stage cannot both advance it, and state
//! and audit record are always written together.

use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use signoff_core::{DocumentRef, InstanceId, SignoffError, Timestamp, UserId, WorkflowId};
use signoff_definition::WorkflowStage;
use signoff_state::{ApprovalState, ApprovalStatus, Transition};

use crate::audit::{ActionDraft, ActionLog, WorkflowAction};
use crate::journal::{JournalEntry, TransitionJournal};

/// Everything the engine stores about one document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentLedger {
    pub document: DocumentRef,
    pub state: ApprovalState,
    pub log: ActionLog,
    /// Incremented on every committed transition.
    pub version: u64,
}

impl DocumentLedger {
    /// An unsubmitted document with no history.
    pub fn new(document: DocumentRef) -> Self {
        Self {
            document,
            state: ApprovalState::new(),
            log: ActionLog::new(),
            version: 0,
        }
    }

    /// Whether an instance is routing against `workflow_id`.
    pub fn is_routing(&self, workflow_id: WorkflowId) -> bool {
        self.state
            .open_instance()
            .is_some_and(|i| i.workflow_id == workflow_id)
    }
}

/// Result of a committed transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionOutcome {
    pub document: DocumentRef,
    pub status: ApprovalStatus,
    /// The stage the document now waits on.
    pub current_stage: Option<WorkflowStage>,
    pub instance_id: Option<InstanceId>,
    /// Ledger version after commit.
    pub version: u64,
    pub transition: Transition,
    /// The audit record written, if the transition was audited.
    pub action: Option<WorkflowAction>,
}

/// Concurrent map of document ledgers.
#[derive(Debug, Default)]
pub struct LedgerStore {
    ledgers: DashMap<DocumentRef, DocumentLedger>,
}

impl LedgerStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of one ledger.
    pub fn get(&self, document: &DocumentRef) -> Option<DocumentLedger> {
        self.ledgers.get(document).map(|r| r.value().clone())
    }

    /// Whether any document is routing against `workflow_id`.
    pub fn any_routing(&self, workflow_id: WorkflowId) -> bool {
        self.ledgers.iter().any(|r| r.value().is_routing(workflow_id))
    }

    /// Number of documents with a ledger.
    pub fn len(&self) -> usize {
        self.ledgers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ledgers.is_empty()
    }

    /// Apply `transition` to `document` atomically.
    ///
    /// `expected_version`, when given, must equal the stored version or the
    /// call fails with `Conflict` and changes nothing.
    pub fn transact<F>(
        &self,
        document: &DocumentRef,
        actor_id: &UserId,
        expected_version: Option<u64>,
        journal: &dyn TransitionJournal,
        now: Timestamp,
        transition: F,
    ) -> Result<TransitionOutcome, SignoffError>
    where
        F: FnOnce(&mut ApprovalState) -> Result<Transition, SignoffError>,
    {
        let mut entry = self
            .ledgers
            .entry(document.clone())
            .or_insert_with(|| DocumentLedger::new(document.clone()));

        let result = stage_and_journal(
            entry.value(),
            actor_id,
            expected_version,
            journal,
            now,
            transition,
        );
        match result {
            Ok((staged, outcome)) => {
                *entry.value_mut() = staged;
                Ok(outcome)
            }
            Err(err) => {
                let fresh = entry.value().version == 0;
                drop(entry);
                if fresh {
                    self.ledgers.remove_if(document, |_, ledger| ledger.version == 0);
                }
                Err(err)
            }
        }
    }
}

fn stage_and_journal<F>(
    current: &DocumentLedger,
    actor_id: &UserId,
    expected_version: Option<u64>,
    journal: &dyn TransitionJournal,
    now: Timestamp,
    transition: F,
) -> Result<(DocumentLedger, TransitionOutcome), SignoffError>
where
    F: FnOnce(&mut ApprovalState) -> Result<Transition, SignoffError>,
{
    if let Some(expected) = expected_version {
        if expected != current.version {
            tracing::warn!(
                document = %current.document,
                expected,
                actual = current.version,
                "stale version token"
            );
            metrics::counter!("signoff_transition_rejections_total", "reason" => "stale_version")
                .increment(1);
            return Err(SignoffError::Conflict(format!(
                "document {} is at version {}, expected {expected}",
                current.document, current.version
            )));
        }
    }

    let mut staged = current.clone();
    let transition = transition(&mut staged.state)?;

    let action = if transition.audited {
        let sealed = staged.log.seal(ActionDraft {
            document: staged.document.clone(),
            instance_id: transition.instance_id,
            stage_id: transition.stage_id,
            actor_id: actor_id.clone(),
            action: transition.action,
            comment: transition.comment.clone(),
            from_status: transition.from_status,
            to_status: transition.to_status,
            created_at: now,
        })?;
        staged.log.append(sealed.clone())?;
        Some(sealed)
    } else {
        None
    };
    staged.version += 1;

    journal.record(&JournalEntry {
        document: staged.document.clone(),
        version: staged.version,
        state: staged.state.clone(),
        action: action.clone(),
    })?;

    let outcome = TransitionOutcome {
        document: staged.document.clone(),
        status: staged.state.status,
        current_stage: staged.state.current_stage().cloned(),
        instance_id: staged.state.instances.last().map(|i| i.id),
        version: staged.version,
        transition,
        action,
    };
    Ok((staged, outcome))
}
