//! Shared domain types for Loanflow.
//!
//! This crate contains the records the workflow engine persists (runs, step
//! records, messages), the loan application domain types, configuration, and
//! the repository error type.
//!
//! Zero infrastructure dependencies -- only serde, uuid, chrono, thiserror.

pub mod config;
pub mod error;
pub mod loan;
pub mod message;
pub mod workflow;
