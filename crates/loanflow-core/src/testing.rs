//! In-memory repository fakes for engine and loan workflow tests.
//!
//! Clones share state, so two runtimes built from clones of the same fake
//! behave like two processes (or a restarted process) over one database.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use loanflow_types::error::RepositoryError;
use loanflow_types::loan::{ApplicationStatus, LoanApplication, LoanApplicationRecord};
use loanflow_types::message::Message;
use loanflow_types::workflow::{RunStatus, StepRecord, Suspension, WorkflowRun};
use uuid::Uuid;

use crate::repository::loan::LoanRepository;
use crate::repository::message::MessageRepository;
use crate::repository::workflow::{CreateRunOutcome, WorkflowRepository};

#[derive(Default)]
struct WorkflowState {
    runs: HashMap<Uuid, WorkflowRun>,
    steps: HashMap<(Uuid, String, u32), StepRecord>,
}

#[derive(Clone, Default)]
pub struct InMemoryWorkflowRepository {
    state: Arc<Mutex<WorkflowState>>,
}

fn non_terminal<'a>(
    runs: &'a mut HashMap<Uuid, WorkflowRun>,
    run_id: &Uuid,
) -> Result<&'a mut WorkflowRun, RepositoryError> {
    let run = runs.get_mut(run_id).ok_or(RepositoryError::NotFound)?;
    if run.status.is_terminal() {
        return Err(RepositoryError::InvalidTransition(format!(
            "run {run_id} is {}",
            run.status
        )));
    }
    Ok(run)
}

impl WorkflowRepository for InMemoryWorkflowRepository {
    async fn create_run(&self, run: &WorkflowRun) -> Result<CreateRunOutcome, RepositoryError> {
        let mut state = self.state.lock().unwrap();
        if let Some(existing) = state.runs.get(&run.id) {
            return Ok(CreateRunOutcome::Existing(existing.clone()));
        }
        state.runs.insert(run.id, run.clone());
        Ok(CreateRunOutcome::Created)
    }

    async fn get_run(&self, run_id: &Uuid) -> Result<Option<WorkflowRun>, RepositoryError> {
        Ok(self.state.lock().unwrap().runs.get(run_id).cloned())
    }

    async fn update_run_status(
        &self,
        run_id: &Uuid,
        status: RunStatus,
        output: Option<&serde_json::Value>,
        error: Option<&str>,
    ) -> Result<(), RepositoryError> {
        let mut state = self.state.lock().unwrap();
        let run = non_terminal(&mut state.runs, run_id)?;
        run.status = status;
        if let Some(output) = output {
            run.output = Some(output.clone());
        }
        if let Some(error) = error {
            run.error = Some(error.to_string());
        }
        if status.is_terminal() {
            run.suspension = None;
        }
        run.updated_at = Utc::now();
        Ok(())
    }

    async fn suspend_run(
        &self,
        run_id: &Uuid,
        suspension: &Suspension,
    ) -> Result<(), RepositoryError> {
        let mut state = self.state.lock().unwrap();
        let run = non_terminal(&mut state.runs, run_id)?;
        run.status = RunStatus::SuspendedOnRecv;
        run.suspension = Some(suspension.clone());
        run.updated_at = Utc::now();
        Ok(())
    }

    async fn clear_suspension(&self, run_id: &Uuid) -> Result<(), RepositoryError> {
        let mut state = self.state.lock().unwrap();
        let run = non_terminal(&mut state.runs, run_id)?;
        run.status = RunStatus::Running;
        run.suspension = None;
        run.updated_at = Utc::now();
        Ok(())
    }

    async fn list_incomplete_runs(&self) -> Result<Vec<WorkflowRun>, RepositoryError> {
        let state = self.state.lock().unwrap();
        let mut runs: Vec<WorkflowRun> = state
            .runs
            .values()
            .filter(|r| !r.status.is_terminal())
            .cloned()
            .collect();
        runs.sort_by_key(|r| r.created_at);
        Ok(runs)
    }

    async fn list_runs(&self, limit: u32) -> Result<Vec<WorkflowRun>, RepositoryError> {
        let state = self.state.lock().unwrap();
        let mut runs: Vec<WorkflowRun> = state.runs.values().cloned().collect();
        runs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        runs.truncate(limit as usize);
        Ok(runs)
    }

    async fn put_step_result(&self, record: &StepRecord) -> Result<StepRecord, RepositoryError> {
        let mut state = self.state.lock().unwrap();
        let key = (record.run_id, record.step_name.clone(), record.seq);
        Ok(state.steps.entry(key).or_insert_with(|| record.clone()).clone())
    }

    async fn get_step_result(
        &self,
        run_id: &Uuid,
        step_name: &str,
        seq: u32,
    ) -> Result<Option<StepRecord>, RepositoryError> {
        let state = self.state.lock().unwrap();
        Ok(state
            .steps
            .get(&(*run_id, step_name.to_string(), seq))
            .cloned())
    }

    async fn list_step_records(&self, run_id: &Uuid) -> Result<Vec<StepRecord>, RepositoryError> {
        let state = self.state.lock().unwrap();
        let mut records: Vec<StepRecord> = state
            .steps
            .values()
            .filter(|r| r.run_id == *run_id)
            .cloned()
            .collect();
        records.sort_by_key(|r| r.seq);
        Ok(records)
    }
}

/// Messages kept in enqueue order; the vector index is the FIFO sequence.
#[derive(Clone, Default)]
pub struct InMemoryMessageRepository {
    messages: Arc<Mutex<Vec<Message>>>,
}

impl MessageRepository for InMemoryMessageRepository {
    async fn enqueue(&self, message: &Message) -> Result<(), RepositoryError> {
        self.messages.lock().unwrap().push(message.clone());
        Ok(())
    }

    async fn consume_next(
        &self,
        destination_run_id: &Uuid,
        topic: &str,
        seq: u32,
    ) -> Result<Option<Message>, RepositoryError> {
        let mut messages = self.messages.lock().unwrap();
        let bound = messages.iter().any(|m| {
            m.destination_run_id == *destination_run_id
                && m.topic == topic
                && m.consumed_by_seq == Some(seq)
        });
        if bound {
            return Ok(None);
        }
        let next = messages.iter_mut().find(|m| {
            !m.consumed && m.destination_run_id == *destination_run_id && m.topic == topic
        });
        Ok(next.map(|m| {
            m.consumed = true;
            m.consumed_at = Some(Utc::now());
            m.consumed_by_seq = Some(seq);
            m.clone()
        }))
    }

    async fn find_consumed(
        &self,
        destination_run_id: &Uuid,
        topic: &str,
        seq: u32,
    ) -> Result<Option<Message>, RepositoryError> {
        let messages = self.messages.lock().unwrap();
        Ok(messages
            .iter()
            .find(|m| {
                m.destination_run_id == *destination_run_id
                    && m.topic == topic
                    && m.consumed_by_seq == Some(seq)
            })
            .cloned())
    }

    async fn list_messages(&self, destination_run_id: &Uuid) -> Result<Vec<Message>, RepositoryError> {
        let messages = self.messages.lock().unwrap();
        Ok(messages
            .iter()
            .filter(|m| m.destination_run_id == *destination_run_id)
            .cloned()
            .collect())
    }
}

#[derive(Clone, Default)]
pub struct InMemoryLoanRepository {
    applications: Arc<Mutex<HashMap<String, LoanApplicationRecord>>>,
}

impl InMemoryLoanRepository {
    pub fn count(&self) -> usize {
        self.applications.lock().unwrap().len()
    }
}

impl LoanRepository for InMemoryLoanRepository {
    async fn find_application(
        &self,
        application_id: &str,
    ) -> Result<Option<LoanApplicationRecord>, RepositoryError> {
        Ok(self.applications.lock().unwrap().get(application_id).cloned())
    }

    async fn insert_application(
        &self,
        application: &LoanApplication,
        owner_run_id: Uuid,
    ) -> Result<(), RepositoryError> {
        let mut applications = self.applications.lock().unwrap();
        if applications.contains_key(&application.application_id) {
            return Err(RepositoryError::Conflict(format!(
                "application_id {}",
                application.application_id
            )));
        }
        applications.insert(
            application.application_id.clone(),
            LoanApplicationRecord {
                application: application.clone(),
                status: ApplicationStatus::Submitted,
                decided_at: None,
                owner_run_id: Some(owner_run_id),
            },
        );
        Ok(())
    }

    async fn update_status(
        &self,
        application_id: &str,
        status: ApplicationStatus,
        decided_at: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        let mut applications = self.applications.lock().unwrap();
        let record = applications
            .get_mut(application_id)
            .ok_or(RepositoryError::NotFound)?;
        record.status = status;
        record.decided_at = Some(decided_at);
        Ok(())
    }
}
