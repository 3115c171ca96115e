//! Durable workflow engine and repository trait definitions for Loanflow.
//!
//! This crate defines the "ports" (repository traits) that the infrastructure
//! layer implements, the workflow engine built on top of them, and the loan
//! approval workflows. It depends only on `loanflow-types` -- never on
//! `loanflow-infra` or any database/IO crate.

pub mod loan;
pub mod repository;
pub mod workflow;

#[cfg(test)]
pub(crate) mod testing;
