//! # Action Audit Log
//!
//! Append-only, per-document record of every executed transition.
//!
//! Each [`WorkflowAction`] carries a `sequence` (1-based, per document) and a
//! `digest` computed over its canonical body together with the previous
//! record's digest. The first record chains from [`ContentDigest::GENESIS`].
//! Rewriting any historical record breaks every later digest, which
//! [`ActionLog::verify`] detects.
//!
//! ## Security Invariant
//!
//! `append` is the only write. It accepts a record only if its sequence is
//! exactly `len() + 1`, its `previous_digest` equals the current head, and
//! its `digest` recomputes.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use signoff_core::{
    sha256_digest, ActionId, CanonicalBytes, CanonicalizationError, ContentDigest, DocumentRef,
    InstanceId, SignoffError, StageId, Timestamp, UserId,
};
use signoff_state::{ActionKind, ApprovalStatus};

/// Errors raised by the audit log.
#[derive(Error, Debug)]
pub enum AuditError {
    /// Record sequence does not follow the chain.
    #[error("sequence mismatch: expected {expected}, got {actual}")]
    SequenceMismatch { expected: u64, actual: u64 },

    /// Record does not chain from the current head.
    #[error("previous digest mismatch for action #{sequence}: expected {expected}, got {actual}")]
    PreviousDigestMismatch {
        sequence: u64,
        expected: ContentDigest,
        actual: ContentDigest,
    },

    /// Record digest does not match its content.
    #[error("digest mismatch for action #{sequence}")]
    DigestMismatch { sequence: u64 },

    /// The record body could not be canonicalized.
    #[error("canonicalization error: {0}")]
    Canonicalization(#[from] CanonicalizationError),
}

impl From<AuditError> for SignoffError {
    fn from(err: AuditError) -> Self {
        match err {
            AuditError::Canonicalization(e) => SignoffError::Canonicalization(e),
            other => SignoffError::Integrity(other.to_string()),
        }
    }
}

/// One immutable audit record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowAction {
    pub id: ActionId,
    pub document: DocumentRef,
    pub instance_id: Option<InstanceId>,
    pub stage_id: Option<StageId>,
    pub actor_id: UserId,
    pub action: ActionKind,
    pub comment: Option<String>,
    pub from_status: ApprovalStatus,
    pub to_status: ApprovalStatus,
    pub created_at: Timestamp,
    /// 1-based position in the document's log.
    pub sequence: u64,
    /// Digest of the preceding record, or genesis.
    pub previous_digest: ContentDigest,
    /// Digest over this record's body and `previous_digest`.
    pub digest: ContentDigest,
}

/// The hashed portion of a [`WorkflowAction`]: everything except `digest`.
#[derive(Serialize)]
struct ActionBody<'a> {
    id: &'a ActionId,
    document: &'a DocumentRef,
    instance_id: &'a Option<InstanceId>,
    stage_id: &'a Option<StageId>,
    actor_id: &'a UserId,
    action: &'a ActionKind,
    comment: &'a Option<String>,
    from_status: &'a ApprovalStatus,
    to_status: &'a ApprovalStatus,
    created_at: String,
    sequence: u64,
    previous_digest: &'a ContentDigest,
}

impl WorkflowAction {
    /// Recompute the digest from this record's content.
    pub fn compute_digest(&self) -> Result<ContentDigest, CanonicalizationError> {
        let body = ActionBody {
            id: &self.id,
            document: &self.document,
            instance_id: &self.instance_id,
            stage_id: &self.stage_id,
            actor_id: &self.actor_id,
            action: &self.action,
            comment: &self.comment,
            from_status: &self.from_status,
            to_status: &self.to_status,
            created_at: self.created_at.to_iso8601(),
            sequence: self.sequence,
            previous_digest: &self.previous_digest,
        };
        Ok(sha256_digest(&CanonicalBytes::new(&body)?))
    }
}

/// Input for a new audit record; the log assigns chain fields.
#[derive(Debug, Clone)]
pub struct ActionDraft {
    pub document: DocumentRef,
    pub instance_id: Option<InstanceId>,
    pub stage_id: Option<StageId>,
    pub actor_id: UserId,
    pub action: ActionKind,
    pub comment: Option<String>,
    pub from_status: ApprovalStatus,
    pub to_status: ApprovalStatus,
    pub created_at: Timestamp,
}

/// Append-only action log for one document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionLog {
    entries: Vec<WorkflowAction>,
}

impl ActionLog {
    /// An empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the log is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Digest of the latest record, or genesis.
    pub fn head(&self) -> ContentDigest {
        self.entries
            .last()
            .map_or(ContentDigest::GENESIS, |a| a.digest)
    }

    /// Records in append order.
    pub fn entries(&self) -> &[WorkflowAction] {
        &self.entries
    }

    /// Records ascending by `created_at`, ties broken by sequence.
    pub fn list(&self) -> Vec<WorkflowAction> {
        let mut listed = self.entries.clone();
        listed.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then(a.sequence.cmp(&b.sequence))
        });
        listed
    }

    /// Build the next record in the chain without appending it.
    pub fn seal(&self, draft: ActionDraft) -> Result<WorkflowAction, AuditError> {
        let mut action = WorkflowAction {
            id: ActionId::new(),
            document: draft.document,
            instance_id: draft.instance_id,
            stage_id: draft.stage_id,
            actor_id: draft.actor_id,
            action: draft.action,
            comment: draft.comment,
            from_status: draft.from_status,
            to_status: draft.to_status,
            created_at: draft.created_at,
            sequence: self.entries.len() as u64 + 1,
            previous_digest: self.head(),
            digest: ContentDigest::GENESIS,
        };
        action.digest = action.compute_digest()?;
        Ok(action)
    }

    /// Append a sealed record.
    pub fn append(&mut self, action: WorkflowAction) -> Result<(), AuditError> {
        let expected = self.entries.len() as u64 + 1;
        if action.sequence != expected {
            return Err(AuditError::SequenceMismatch {
                expected,
                actual: action.sequence,
            });
        }
        let head = self.head();
        if action.previous_digest != head {
            return Err(AuditError::PreviousDigestMismatch {
                sequence: action.sequence,
                expected: head,
                actual: action.previous_digest,
            });
        }
        if action.compute_digest()? != action.digest {
            return Err(AuditError::DigestMismatch {
                sequence: action.sequence,
            });
        }
        self.entries.push(action);
        Ok(())
    }

    /// Recompute the whole chain.
    pub fn verify(&self) -> Result<(), AuditError> {
        let mut previous = ContentDigest::GENESIS;
        for (index, action) in self.entries.iter().enumerate() {
            let expected = index as u64 + 1;
            if action.sequence != expected {
                return Err(AuditError::SequenceMismatch {
                    expected,
                    actual: action.sequence,
                });
            }
            if action.previous_digest != previous {
                return Err(AuditError::PreviousDigestMismatch {
                    sequence: action.sequence,
                    expected: previous,
                    actual: action.previous_digest,
                });
            }
            if action.compute_digest()? != action.digest {
                return Err(AuditError::DigestMismatch {
                    sequence: action.sequence,
                });
            }
            previous = action.digest;
        }
        Ok(())
    }
}
