//! BoxWorkflowRepository / BoxMessageRepository -- object-safe wrappers for
//! the engine's storage ports.
//!
//! Blanket-impl pattern:
//! 1. Define an object-safe `*Dyn` trait with boxed futures
//! 2. Blanket-impl it for every implementor of the RPITIT port
//! 3. A `Box*` struct wraps `Box<dyn *Dyn>` and delegates
//!
//! `WorkflowContext` and `WorkflowRuntime` hold these instead of storage
//! generics, so registered workflow functions have one concrete signature.

use std::future::Future;
use std::pin::Pin;

use loanflow_types::error::RepositoryError;
use loanflow_types::message::Message;
use loanflow_types::workflow::{RunStatus, StepRecord, Suspension, WorkflowRun};
use serde_json::Value;
use uuid::Uuid;

use crate::repository::message::MessageRepository;
use crate::repository::workflow::{CreateRunOutcome, WorkflowRepository};

type BoxFut<'a, T> = Pin<Box<dyn Future<Output = Result<T, RepositoryError>> + Send + 'a>>;

// ---------------------------------------------------------------------------
// Workflow repository
// ---------------------------------------------------------------------------

/// Object-safe version of [`WorkflowRepository`] with boxed futures.
pub trait WorkflowRepositoryDyn: Send + Sync {
    fn create_run_boxed<'a>(&'a self, run: &'a WorkflowRun) -> BoxFut<'a, CreateRunOutcome>;
    fn get_run_boxed<'a>(&'a self, run_id: &'a Uuid) -> BoxFut<'a, Option<WorkflowRun>>;
    fn update_run_status_boxed<'a>(
        &'a self,
        run_id: &'a Uuid,
        status: RunStatus,
        output: Option<&'a Value>,
        error: Option<&'a str>,
    ) -> BoxFut<'a, ()>;
    fn suspend_run_boxed<'a>(
        &'a self,
        run_id: &'a Uuid,
        suspension: &'a Suspension,
    ) -> BoxFut<'a, ()>;
    fn clear_suspension_boxed<'a>(&'a self, run_id: &'a Uuid) -> BoxFut<'a, ()>;
    fn list_incomplete_runs_boxed(&self) -> BoxFut<'_, Vec<WorkflowRun>>;
    fn list_runs_boxed(&self, limit: u32) -> BoxFut<'_, Vec<WorkflowRun>>;
    fn put_step_result_boxed<'a>(&'a self, record: &'a StepRecord) -> BoxFut<'a, StepRecord>;
    fn get_step_result_boxed<'a>(
        &'a self,
        run_id: &'a Uuid,
        step_name: &'a str,
        seq: u32,
    ) -> BoxFut<'a, Option<StepRecord>>;
    fn list_step_records_boxed<'a>(&'a self, run_id: &'a Uuid) -> BoxFut<'a, Vec<StepRecord>>;
}

impl<T: WorkflowRepository> WorkflowRepositoryDyn for T {
    fn create_run_boxed<'a>(&'a self, run: &'a WorkflowRun) -> BoxFut<'a, CreateRunOutcome> {
        Box::pin(self.create_run(run))
    }

    fn get_run_boxed<'a>(&'a self, run_id: &'a Uuid) -> BoxFut<'a, Option<WorkflowRun>> {
        Box::pin(self.get_run(run_id))
    }

    fn update_run_status_boxed<'a>(
        &'a self,
        run_id: &'a Uuid,
        status: RunStatus,
        output: Option<&'a Value>,
        error: Option<&'a str>,
    ) -> BoxFut<'a, ()> {
        Box::pin(self.update_run_status(run_id, status, output, error))
    }

    fn suspend_run_boxed<'a>(
        &'a self,
        run_id: &'a Uuid,
        suspension: &'a Suspension,
    ) -> BoxFut<'a, ()> {
        Box::pin(self.suspend_run(run_id, suspension))
    }

    fn clear_suspension_boxed<'a>(&'a self, run_id: &'a Uuid) -> BoxFut<'a, ()> {
        Box::pin(self.clear_suspension(run_id))
    }

    fn list_incomplete_runs_boxed(&self) -> BoxFut<'_, Vec<WorkflowRun>> {
        Box::pin(self.list_incomplete_runs())
    }

    fn list_runs_boxed(&self, limit: u32) -> BoxFut<'_, Vec<WorkflowRun>> {
        Box::pin(self.list_runs(limit))
    }

    fn put_step_result_boxed<'a>(&'a self, record: &'a StepRecord) -> BoxFut<'a, StepRecord> {
        Box::pin(self.put_step_result(record))
    }

    fn get_step_result_boxed<'a>(
        &'a self,
        run_id: &'a Uuid,
        step_name: &'a str,
        seq: u32,
    ) -> BoxFut<'a, Option<StepRecord>> {
        Box::pin(self.get_step_result(run_id, step_name, seq))
    }

    fn list_step_records_boxed<'a>(&'a self, run_id: &'a Uuid) -> BoxFut<'a, Vec<StepRecord>> {
        Box::pin(self.list_step_records(run_id))
    }
}

/// Type-erased workflow repository.
///
/// Since `WorkflowRepository` uses RPITIT, it cannot be used as a trait
/// object directly. `BoxWorkflowRepository` provides equivalent methods that
/// delegate to the inner `WorkflowRepositoryDyn` trait object.
pub struct BoxWorkflowRepository {
    inner: Box<dyn WorkflowRepositoryDyn + Send + Sync>,
}

impl BoxWorkflowRepository {
    pub fn new<T: WorkflowRepository + 'static>(repo: T) -> Self {
        Self {
            inner: Box::new(repo),
        }
    }

    pub async fn create_run(&self, run: &WorkflowRun) -> Result<CreateRunOutcome, RepositoryError> {
        self.inner.create_run_boxed(run).await
    }

    pub async fn get_run(&self, run_id: &Uuid) -> Result<Option<WorkflowRun>, RepositoryError> {
        self.inner.get_run_boxed(run_id).await
    }

    pub async fn update_run_status(
        &self,
        run_id: &Uuid,
        status: RunStatus,
        output: Option<&Value>,
        error: Option<&str>,
    ) -> Result<(), RepositoryError> {
        self.inner
            .update_run_status_boxed(run_id, status, output, error)
            .await
    }

    pub async fn suspend_run(
        &self,
        run_id: &Uuid,
        suspension: &Suspension,
    ) -> Result<(), RepositoryError> {
        self.inner.suspend_run_boxed(run_id, suspension).await
    }

    pub async fn clear_suspension(&self, run_id: &Uuid) -> Result<(), RepositoryError> {
        self.inner.clear_suspension_boxed(run_id).await
    }

    pub async fn list_incomplete_runs(&self) -> Result<Vec<WorkflowRun>, RepositoryError> {
        self.inner.list_incomplete_runs_boxed().await
    }

    pub async fn list_runs(&self, limit: u32) -> Result<Vec<WorkflowRun>, RepositoryError> {
        self.inner.list_runs_boxed(limit).await
    }

    pub async fn put_step_result(&self, record: &StepRecord) -> Result<StepRecord, RepositoryError> {
        self.inner.put_step_result_boxed(record).await
    }

    pub async fn get_step_result(
        &self,
        run_id: &Uuid,
        step_name: &str,
        seq: u32,
    ) -> Result<Option<StepRecord>, RepositoryError> {
        self.inner.get_step_result_boxed(run_id, step_name, seq).await
    }

    pub async fn list_step_records(&self, run_id: &Uuid) -> Result<Vec<StepRecord>, RepositoryError> {
        self.inner.list_step_records_boxed(run_id).await
    }
}

// ---------------------------------------------------------------------------
// Message repository
// ---------------------------------------------------------------------------

/// Object-safe version of [`MessageRepository`] with boxed futures.
pub trait MessageRepositoryDyn: Send + Sync {
    fn enqueue_boxed<'a>(&'a self, message: &'a Message) -> BoxFut<'a, ()>;
    fn consume_next_boxed<'a>(
        &'a self,
        destination_run_id: &'a Uuid,
        topic: &'a str,
        seq: u32,
    ) -> BoxFut<'a, Option<Message>>;
    fn find_consumed_boxed<'a>(
        &'a self,
        destination_run_id: &'a Uuid,
        topic: &'a str,
        seq: u32,
    ) -> BoxFut<'a, Option<Message>>;
    fn list_messages_boxed<'a>(&'a self, destination_run_id: &'a Uuid) -> BoxFut<'a, Vec<Message>>;
}

impl<T: MessageRepository> MessageRepositoryDyn for T {
    fn enqueue_boxed<'a>(&'a self, message: &'a Message) -> BoxFut<'a, ()> {
        Box::pin(self.enqueue(message))
    }

    fn consume_next_boxed<'a>(
        &'a self,
        destination_run_id: &'a Uuid,
        topic: &'a str,
        seq: u32,
    ) -> BoxFut<'a, Option<Message>> {
        Box::pin(self.consume_next(destination_run_id, topic, seq))
    }

    fn find_consumed_boxed<'a>(
        &'a self,
        destination_run_id: &'a Uuid,
        topic: &'a str,
        seq: u32,
    ) -> BoxFut<'a, Option<Message>> {
        Box::pin(self.find_consumed(destination_run_id, topic, seq))
    }

    fn list_messages_boxed<'a>(&'a self, destination_run_id: &'a Uuid) -> BoxFut<'a, Vec<Message>> {
        Box::pin(self.list_messages(destination_run_id))
    }
}

/// Type-erased message repository.
pub struct BoxMessageRepository {
    inner: Box<dyn MessageRepositoryDyn + Send + Sync>,
}

impl BoxMessageRepository {
    pub fn new<T: MessageRepository + 'static>(repo: T) -> Self {
        Self {
            inner: Box::new(repo),
        }
    }

    pub async fn enqueue(&self, message: &Message) -> Result<(), RepositoryError> {
        self.inner.enqueue_boxed(message).await
    }

    pub async fn consume_next(
        &self,
        destination_run_id: &Uuid,
        topic: &str,
        seq: u32,
    ) -> Result<Option<Message>, RepositoryError> {
        self.inner
            .consume_next_boxed(destination_run_id, topic, seq)
            .await
    }

    pub async fn find_consumed(
        &self,
        destination_run_id: &Uuid,
        topic: &str,
        seq: u32,
    ) -> Result<Option<Message>, RepositoryError> {
        self.inner
            .find_consumed_boxed(destination_run_id, topic, seq)
            .await
    }

    pub async fn list_messages(&self, destination_run_id: &Uuid) -> Result<Vec<Message>, RepositoryError> {
        self.inner.list_messages_boxed(destination_run_id).await
    }
}
