//! # API Route Modules
//!
//! - `workflows` — workflow and stage definition management.
//! - `documents` — document registration, approval transitions, available
//!   actions, history, and status.

pub mod documents;
pub mod workflows;
