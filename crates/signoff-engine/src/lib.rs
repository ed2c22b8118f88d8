//! # signoff-engine — Approval Engine
//!
//! Runs approval workflows against financial documents owned by a host
//! application:
//!
//! - **Engine** (`engine.rs`): [`ApprovalEngine`], the operation surface
//!   (definition management, submit/approve/reject/return/cancel, available
//!   actions, status, history).
//! - **Ledger** (`ledger.rs`): per-document state, audit log, and version,
//!   with atomic read-validate-write transitions.
//! - **Audit** (`audit.rs`): the append-only, hash-chained action log.
//! - **Journal** (`journal.rs`): the durability seam staged transitions pass
//!   through before commit.
//! - **Gateway** (`gateway.rs`): read access to document records.
//!
//! ## Crate Policy
//!
//! - A document's state and its audit record are committed together or not
//!   at all.
//! - Concurrent transitions on one document are serialized; on different
//!   documents they run in parallel.
//! - The engine never calls the registry while holding a ledger lock.

pub mod audit;
pub mod engine;
pub mod gateway;
pub mod journal;
pub mod ledger;

pub use audit::{ActionDraft, ActionLog, AuditError, WorkflowAction};
pub use engine::{ActionRequest, ApprovalEngine, DocumentStatus};
pub use gateway::{DocumentGateway, DocumentSnapshot, MemoryDocumentGateway};
pub use journal::{JournalEntry, MemoryJournal, NullJournal, TransitionJournal};
pub use ledger::{DocumentLedger, LedgerStore, TransitionOutcome};
