//! Loan approval business logic on top of the workflow engine.
//!
//! - `scoring` -- Credit scoring
//! - `steps` -- Side-effecting step bodies (persistence, scoring, notification)
//! - `workflow` -- The `loan-process` and `loan-approval` workflows

pub mod scoring;
pub mod steps;
pub mod workflow;

pub use scoring::{CreditScorer, RuleBasedScorer};
pub use steps::LoanSteps;
pub use workflow::{
    ALREADY_PROCESSED, DOCUMENTS_PENDING, LOAN_APPROVAL, LOAN_APPROVED, LOAN_PROCESS,
    LOAN_REJECTED, REVIEW_TOPIC, register_loan_workflows,
};
