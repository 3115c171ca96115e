//! Registration table mapping workflow names to type-erased functions.
//!
//! Built once at process start and handed to the runtime. Typed workflow
//! functions are wrapped so that input and output cross the engine as JSON.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use super::context::WorkflowContext;
use super::error::WorkflowError;

/// A registered workflow with its input and output erased to JSON.
pub type ErasedWorkflow = Arc<
    dyn Fn(WorkflowContext, Value) -> BoxFuture<'static, Result<Value, WorkflowError>> + Send + Sync,
>;

#[derive(Default)]
pub struct WorkflowRegistry {
    workflows: HashMap<String, ErasedWorkflow>,
}

impl WorkflowRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `f` under `name`.
    ///
    /// The input is deserialized from the run's stored JSON on every attempt;
    /// a malformed input fails the run with `WorkflowError::Serialization`.
    pub fn register<I, O, F, Fut>(
        &mut self,
        name: impl Into<String>,
        f: F,
    ) -> Result<(), WorkflowError>
    where
        I: DeserializeOwned + Send + 'static,
        O: Serialize + Send + 'static,
        F: Fn(WorkflowContext, I) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<O, WorkflowError>> + Send + 'static,
    {
        let name = name.into();
        if self.workflows.contains_key(&name) {
            return Err(WorkflowError::AlreadyRegistered(name));
        }

        let erased: ErasedWorkflow = Arc::new(move |ctx: WorkflowContext, input: Value| {
            match serde_json::from_value::<I>(input) {
                Ok(input) => {
                    let fut = f(ctx, input);
                    async move {
                        let output = fut.await?;
                        Ok::<_, WorkflowError>(serde_json::to_value(output)?)
                    }
                    .boxed()
                }
                Err(err) => async move {
                    Err::<Value, _>(WorkflowError::Serialization(format!(
                        "invalid workflow input: {err}"
                    )))
                }
                .boxed(),
            }
        });

        tracing::debug!(workflow = %name, "registered workflow");
        self.workflows.insert(name, erased);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<ErasedWorkflow> {
        self.workflows.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.workflows.contains_key(name)
    }

    /// Registered workflow names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.workflows.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl std::fmt::Debug for WorkflowRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkflowRegistry")
            .field("workflows", &self.names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_names_are_rejected() {
        let mut registry = WorkflowRegistry::new();
        registry
            .register("echo", |_ctx, input: String| async move { Ok(input) })
            .unwrap();

        let err = registry
            .register("echo", |_ctx, input: u32| async move { Ok(input) })
            .unwrap_err();
        assert!(matches!(err, WorkflowError::AlreadyRegistered(name) if name == "echo"));
        assert_eq!(registry.names(), vec!["echo"]);
    }
}
