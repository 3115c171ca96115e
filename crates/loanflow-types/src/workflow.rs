//! Workflow execution types for Loanflow.
//!
//! Defines the durable records the engine persists for every run: the run
//! itself (`WorkflowRun`), the checkpointed result of each completed step
//! (`StepRecord`), and the wait state of a run suspended in a receive
//! (`Suspension`).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Run Status
// ---------------------------------------------------------------------------

/// Overall status of a workflow run.
///
/// Runs only move forward:
/// `Pending -> Running -> (SuspendedOnRecv <-> Running)* -> Succeeded | Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Pending,
    Running,
    SuspendedOnRecv,
    Succeeded,
    Failed,
}

impl RunStatus {
    /// Whether the run has reached a final status.
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunStatus::Succeeded | RunStatus::Failed)
    }

    /// Whether moving from `self` to `next` respects the run state machine.
    ///
    /// Re-asserting the current non-terminal status is allowed so that a
    /// resumed attempt can mark an already-running run as running again.
    /// `Pending -> Failed` covers runs that cannot be started at all.
    pub fn can_transition_to(&self, next: RunStatus) -> bool {
        use RunStatus::*;
        match (self, next) {
            (Succeeded | Failed, _) => false,
            (Pending, Pending | Running | Failed) => true,
            (Running, Running | SuspendedOnRecv | Succeeded | Failed) => true,
            (SuspendedOnRecv, SuspendedOnRecv | Running) => true,
            _ => false,
        }
    }

    /// The canonical storage string (`"suspended_on_recv"`, ...).
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Pending => "pending",
            RunStatus::Running => "running",
            RunStatus::SuspendedOnRecv => "suspended_on_recv",
            RunStatus::Succeeded => "succeeded",
            RunStatus::Failed => "failed",
        }
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for RunStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(RunStatus::Pending),
            "running" => Ok(RunStatus::Running),
            "suspended_on_recv" => Ok(RunStatus::SuspendedOnRecv),
            "succeeded" => Ok(RunStatus::Succeeded),
            "failed" => Ok(RunStatus::Failed),
            other => Err(format!("invalid run status: '{other}'")),
        }
    }
}

// ---------------------------------------------------------------------------
// Workflow Run
// ---------------------------------------------------------------------------

/// A single execution instance of a registered workflow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowRun {
    /// Run ID (UUIDv7 unless supplied by the caller). Immutable.
    pub id: Uuid,
    /// Name of the registered workflow function driving this run.
    pub workflow_name: String,
    /// Current run status.
    pub status: RunStatus,
    /// JSON input supplied at start. Immutable after creation.
    pub input: serde_json::Value,
    /// JSON output, set exactly once when the run succeeds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<serde_json::Value>,
    /// Error message when the run failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Wait state while the run is blocked in a receive.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suspension: Option<Suspension>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl WorkflowRun {
    /// Build a fresh `Pending` run record.
    pub fn new(id: Uuid, workflow_name: impl Into<String>, input: serde_json::Value) -> Self {
        let now = Utc::now();
        Self {
            id,
            workflow_name: workflow_name.into(),
            status: RunStatus::Pending,
            input,
            output: None,
            error: None,
            suspension: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Persisted state of an in-progress receive.
///
/// Kept on the run until the receive completes, so a restarted process
/// re-enters the same wait with the original deadline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Suspension {
    /// Sequence number of the receive call within the run.
    pub seq: u32,
    /// Topic being waited on.
    pub topic: String,
    /// When the receive gives up and reports a timeout.
    pub deadline: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Step Records
// ---------------------------------------------------------------------------

/// Identifies one step invocation within a run.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StepKey {
    pub run_id: Uuid,
    pub step_name: String,
    /// Position of the call in the run's step counter (0-based).
    pub seq: u32,
}

impl StepKey {
    pub fn new(run_id: Uuid, step_name: impl Into<String>, seq: u32) -> Self {
        Self {
            run_id,
            step_name: step_name.into(),
            seq,
        }
    }
}

impl std::fmt::Display for StepKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}#{}", self.run_id, self.step_name, self.seq)
    }
}

/// Checkpointed result of a completed step. Written at most once per key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepRecord {
    pub run_id: Uuid,
    pub step_name: String,
    pub seq: u32,
    /// JSON output of the step function.
    pub output: serde_json::Value,
    pub completed_at: DateTime<Utc>,
}

impl StepRecord {
    pub fn new(key: &StepKey, output: serde_json::Value) -> Self {
        Self {
            run_id: key.run_id,
            step_name: key.step_name.clone(),
            seq: key.seq,
            output,
            completed_at: Utc::now(),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn run_status_serializes_snake_case() {
        let s = serde_json::to_string(&RunStatus::SuspendedOnRecv).unwrap();
        assert_eq!(s, "\"suspended_on_recv\"");
        let parsed: RunStatus = "suspended_on_recv".parse().unwrap();
        assert_eq!(parsed, RunStatus::SuspendedOnRecv);
        assert!("sleeping".parse::<RunStatus>().is_err());
    }

    #[test]
    fn run_status_moves_forward_only() {
        use RunStatus::*;
        assert!(Pending.can_transition_to(Running));
        assert!(Running.can_transition_to(SuspendedOnRecv));
        assert!(SuspendedOnRecv.can_transition_to(Running));
        assert!(Running.can_transition_to(Succeeded));
        assert!(Running.can_transition_to(Failed));

        assert!(!SuspendedOnRecv.can_transition_to(Succeeded));
        assert!(!Running.can_transition_to(Pending));
        assert!(!Succeeded.can_transition_to(Running));
        assert!(!Failed.can_transition_to(Failed));
    }

    #[test]
    fn terminal_statuses() {
        assert!(RunStatus::Succeeded.is_terminal());
        assert!(RunStatus::Failed.is_terminal());
        assert!(!RunStatus::SuspendedOnRecv.is_terminal());
    }

    #[test]
    fn new_run_is_pending_without_output() {
        let run = WorkflowRun::new(Uuid::now_v7(), "loan-process", json!({"a": 1}));
        assert_eq!(run.status, RunStatus::Pending);
        assert!(run.output.is_none());

        let json_str = serde_json::to_string(&run).unwrap();
        assert!(!json_str.contains("suspension"));
        assert!(json_str.contains("\"status\":\"pending\""));
    }

    #[test]
    fn step_record_carries_its_key() {
        let key = StepKey::new(Uuid::nil(), "creditCheck", 2);
        let record = StepRecord::new(&key, json!({"credit_score": 72}));
        assert_eq!(
            (record.run_id, record.step_name.as_str(), record.seq),
            (key.run_id, "creditCheck", 2)
        );
        assert!(key.to_string().ends_with("/creditCheck#2"));
    }
}
