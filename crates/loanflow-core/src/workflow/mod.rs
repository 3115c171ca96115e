//! Durable workflow engine.
//!
//! - `checkpoint` -- Run transitions and step records over the workflow repository
//! - `step` -- At-most-once step execution with replay
//! - `retry` -- Bounded retry policy for steps
//! - `mailbox` -- Durable topic-addressed messages with receive-with-timeout
//! - `context` -- Per-run context passed to workflow functions
//! - `registry` -- Name to workflow function table
//! - `runtime` -- Start, resume, and drive runs on tokio tasks
//! - `handle` -- Result handles for runs
//! - `events` -- Broadcast bus for run lifecycle events
//! - `store` -- Object-safe wrappers for the storage ports

pub mod checkpoint;
pub mod context;
pub mod error;
pub mod events;
pub mod handle;
pub mod mailbox;
pub mod registry;
pub mod retry;
pub mod runtime;
pub mod step;
pub mod store;

pub use context::{Received, WorkflowContext};
pub use error::{StepError, WorkflowError};
pub use handle::WorkflowHandle;
pub use registry::WorkflowRegistry;
pub use retry::RetryPolicy;
pub use runtime::{RuntimeOptions, WorkflowRuntime};
