//! # Error Types — Engine Error Taxonomy
//!
//! Every public operation of the engine returns [`SignoffError`] on failure.
//! The five primary variants are the classes a calling application must be
//! able to distinguish: malformed input, missing records, authorization,
//! illegal transitions, and conflicting concurrent work.
//!
//! ## Design
//!
//! - Validation errors name the offending field.
//! - Transition errors include the current state and the attempted action.
//! - No retries happen inside the engine; a `Conflict` is returned to the
//!   caller who decides whether to re-read and retry.

use thiserror::Error;

/// Top-level error type for Signoff.
#[derive(Error, Debug)]
pub enum SignoffError {
    /// Malformed input: empty name, inconsistent reorder set, missing comment.
    #[error("validation error: {0}")]
    Validation(String),

    /// Missing workflow, stage, instance or document, or no active workflow
    /// applies to a document's type.
    #[error("not found: {0}")]
    NotFound(String),

    /// A capability or assignment check failed.
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// The action is illegal from the current status or stage.
    #[error("invalid state transition: {0}")]
    InvalidStateTransition(String),

    /// The document already has an active instance, or a version token is stale.
    #[error("conflict: {0}")]
    Conflict(String),

    /// The durable journal rejected a staged transition; nothing was committed.
    #[error("journal error: {0}")]
    Journal(String),

    /// An audit log hash chain does not verify.
    #[error("audit integrity violation: {0}")]
    Integrity(String),

    /// An audit record could not be canonicalized for digest computation.
    #[error("canonicalization error: {0}")]
    Canonicalization(#[from] CanonicalizationError),
}

impl SignoffError {
    /// Stable machine-readable code for the error class.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::NotFound(_) => "NOT_FOUND",
            Self::PermissionDenied(_) => "PERMISSION_DENIED",
            Self::InvalidStateTransition(_) => "INVALID_STATE_TRANSITION",
            Self::Conflict(_) => "CONFLICT",
            Self::Journal(_) => "JOURNAL_ERROR",
            Self::Integrity(_) => "INTEGRITY_ERROR",
            Self::Canonicalization(_) => "CANONICALIZATION_ERROR",
        }
    }

    /// Shorthand for a validation error.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Shorthand for a not-found error.
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }
}

/// Error during canonical serialization.
#[derive(Error, Debug)]
pub enum CanonicalizationError {
    /// Float values are not permitted in canonical representations.
    #[error("float values are not permitted in canonical representations: {0}")]
    FloatRejected(f64),

    /// JSON serialization failed.
    #[error("serialization failed: {0}")]
    SerializationFailed(#[from] serde_json::Error),
}
