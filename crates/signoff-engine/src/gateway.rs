//! # Document Gateway
//!
//! The engine does not own invoice or payment records. It reads the few facts
//! it needs (type, creator, whether the document was finalized elsewhere)
//! through [`DocumentGateway`]. Host applications implement the trait over
//! their own storage; [`MemoryDocumentGateway`] backs tests and the demo API.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use signoff_core::{DocumentRef, DocumentTypeId, SignoffError, UserId};
use signoff_state::DocumentFacts;

/// The facts the engine reads from a document record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentSnapshot {
    pub reference: DocumentRef,
    /// Matched against workflow applicability.
    pub document_type: DocumentTypeId,
    pub created_by: UserId,
    /// Finalized outside the workflow, e.g. already paid.
    #[serde(default)]
    pub externally_finalized: bool,
}

impl DocumentSnapshot {
    /// The subset the state machine consumes.
    pub fn facts(&self) -> DocumentFacts {
        DocumentFacts {
            created_by: self.created_by.clone(),
            externally_finalized: self.externally_finalized,
        }
    }
}

/// Read access to document records.
pub trait DocumentGateway: Send + Sync {
    /// Fetch a document. Unknown documents are `NotFound`.
    fn fetch(&self, reference: &DocumentRef) -> Result<DocumentSnapshot, SignoffError>;
}

/// Thread-safe in-memory document store.
#[derive(Debug, Clone, Default)]
pub struct MemoryDocumentGateway {
    documents: Arc<RwLock<HashMap<DocumentRef, DocumentSnapshot>>>,
}

impl MemoryDocumentGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a document.
    pub fn upsert(&self, snapshot: DocumentSnapshot) -> Option<DocumentSnapshot> {
        self.documents
            .write()
            .insert(snapshot.reference.clone(), snapshot)
    }

    /// Mark a document as finalized outside the workflow.
    pub fn mark_finalized(&self, reference: &DocumentRef) -> Result<(), SignoffError> {
        let mut documents = self.documents.write();
        let snapshot = documents
            .get_mut(reference)
            .ok_or_else(|| SignoffError::not_found(format!("document {reference}")))?;
        snapshot.externally_finalized = true;
        Ok(())
    }
}

impl DocumentGateway for MemoryDocumentGateway {
    fn fetch(&self, reference: &DocumentRef) -> Result<DocumentSnapshot, SignoffError> {
        self.documents
            .read()
            .get(reference)
            .cloned()
            .ok_or_else(|| SignoffError::not_found(format!("document {reference}")))
    }
}
