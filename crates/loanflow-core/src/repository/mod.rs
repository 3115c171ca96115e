//! Repository trait definitions (ports).
//!
//! These traits define the storage interface that the infrastructure layer
//! (loanflow-infra) implements. The core crate never depends on any
//! specific storage technology.

pub mod loan;
pub mod message;
pub mod workflow;
