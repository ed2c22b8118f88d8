//! # signoff-core — Foundational Types for Signoff
//!
//! This crate is the leaf of the Signoff workspace. It defines the primitives
//! shared by the definition manager, the approval state machine, and the
//! engine: identifier newtypes, the acting principal, UTC timestamps,
//! canonical serialization for audit digests, and the error taxonomy every
//! public operation returns.
//!
//! ## Key Design Principles
//!
//! 1. **Newtype wrappers for identifiers.** `WorkflowId`, `StageId`,
//!    `ActionId`, `InstanceId`, `UserId`, `RoleCode`, `DocumentTypeId`.
//!    A `StageId` cannot be passed where a `WorkflowId` is expected.
//!
//! 2. **One error taxonomy.** [`SignoffError`] has exactly the failure classes
//!    callers must handle: validation, not-found, permission, illegal state
//!    transition, conflict. Journal and canonicalization failures are carried
//!    alongside so nothing is swallowed.
//!
//! 3. **`CanonicalBytes` for digests.** Audit-log hash chaining only accepts
//!    bytes produced by [`CanonicalBytes::new()`].
//!
//! ## Crate Policy
//!
//! - No dependencies on other `signoff-*` crates.
//! - No `unsafe` code.
//! - No `panic!()` or `.unwrap()` outside tests.

pub mod canonical;
pub mod digest;
pub mod error;
pub mod identity;
pub mod temporal;

pub use canonical::CanonicalBytes;
pub use digest::{sha256_digest, ContentDigest};
pub use error::{CanonicalizationError, SignoffError};
pub use identity::{
    ActionId, Actor, DocumentRef, DocumentTypeId, EntityType, InstanceId, RoleCode, StageId,
    UserId, WorkflowId,
};
pub use temporal::Timestamp;
