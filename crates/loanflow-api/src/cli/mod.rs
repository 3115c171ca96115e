//! CLI command definitions for the `loanflow` binary.
//!
//! Uses clap derive macros for argument parsing.

pub mod loan;
pub mod run;

use clap::{Parser, Subcommand};
use clap_complete::Shell;
use loanflow_types::loan::LoanPurpose;
use uuid::Uuid;

/// Durable loan approval workflows.
#[derive(Parser)]
#[command(name = "loanflow", version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Output machine-readable JSON instead of styled text.
    #[arg(long, global = true)]
    pub json: bool,

    /// Suppress all output except errors.
    #[arg(long, global = true)]
    pub quiet: bool,

    /// Detailed output (-v for debug, -vv for trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Emit JSON log lines instead of human-readable ones.
    #[arg(long, global = true)]
    pub log_json: bool,

    /// Export tracing spans through OpenTelemetry (stdout exporter).
    #[arg(long, global = true)]
    pub otel: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Submit a loan application and start a `loan-process` run.
    Submit {
        /// Application ID (deduplication key).
        application_id: String,

        /// Applicant's full name.
        #[arg(long)]
        name: String,

        #[arg(long, default_value = "")]
        email: String,

        #[arg(long, default_value = "")]
        phone: String,

        /// Requested amount.
        #[arg(long)]
        amount: f64,

        /// home, auto, or personal.
        #[arg(long, default_value = "personal")]
        purpose: LoanPurpose,

        /// Applicant's annual income.
        #[arg(long)]
        income: f64,

        /// Run under this ID instead of a fresh one.
        #[arg(long)]
        run_id: Option<Uuid>,

        /// Return right after starting instead of waiting for the decision.
        #[arg(long)]
        detach: bool,
    },

    /// Approve a loan that is waiting for manual review.
    Approve {
        /// Run ID of the waiting `loan-process` run.
        run_id: Uuid,
    },

    /// Send a message to a run's mailbox.
    Send {
        run_id: Uuid,

        topic: String,

        /// JSON payload; anything that is not valid JSON is sent as a string.
        payload: String,
    },

    /// Wait for a run's result.
    Result {
        run_id: Uuid,

        /// Give up after this many seconds.
        #[arg(long, default_value = "60")]
        timeout_secs: u64,
    },

    /// Show a run's status.
    Status { run_id: Uuid },

    /// List a run's checkpointed steps.
    Steps { run_id: Uuid },

    /// List recent runs.
    Runs {
        #[arg(long, default_value = "20")]
        limit: u32,
    },

    /// Show a stored loan application.
    Loan { application_id: String },

    /// Drive every incomplete run until it finishes or the timeout passes.
    Resume {
        #[arg(long, default_value = "60")]
        timeout_secs: u64,
    },

    /// Start the REST API server (resumes incomplete runs first).
    Serve {
        /// Port to listen on.
        #[arg(short, long, default_value = "3000")]
        port: u16,

        /// Host to bind to.
        #[arg(long, default_value = "127.0.0.1")]
        host: String,
    },

    /// Generate shell completions.
    Completions {
        /// Shell to generate completions for.
        shell: Shell,
    },
}

/// Parse a payload argument as JSON, falling back to a JSON string.
pub fn parse_payload(raw: &str) -> serde_json::Value {
    serde_json::from_str(raw).unwrap_or_else(|_| serde_json::Value::String(raw.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn submit_parses_purpose_and_amounts() {
        let cli = Cli::try_parse_from([
            "loanflow", "submit", "APP-1", "--name", "Ada", "--amount", "3500", "--income",
            "50000", "--purpose", "auto",
        ])
        .unwrap();
        match cli.command {
            Commands::Submit {
                purpose, amount, detach, ..
            } => {
                assert_eq!(purpose, LoanPurpose::Auto);
                assert_eq!(amount, 3500.0);
                assert!(!detach);
            }
            _ => panic!("expected submit"),
        }
    }

    #[test]
    fn payload_falls_back_to_string() {
        assert_eq!(parse_payload("\"APPROVED\""), serde_json::json!("APPROVED"));
        assert_eq!(parse_payload("APPROVED"), serde_json::json!("APPROVED"));
        assert_eq!(parse_payload("{\"ok\":true}"), serde_json::json!({"ok": true}));
    }
}
