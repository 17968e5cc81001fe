//! Caller-side runner that drives one instance through its task body.
//!
//! The runner is a client of [`WorkflowEngine`], not part of it:
//! 1. Starts the instance (the pending guard refuses double runs).
//! 2. Invokes the registered [`TaskBody`] with the stored config.
//! 3. Finalizes with `complete_workflow` or `fail_workflow`.
//!
//! Bodies keep their own step list inside `WorkflowResult::metrics`; the
//! runner never opens persisted steps on their behalf.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::json;
use tasks::TaskBody;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::{
    models::{LogLevel, WorkflowInstance, WorkflowStatus, WorkflowType},
    EngineError, WorkflowEngine,
};

/// Maps each workflow type to the body that runs it.
pub type TaskRegistry = HashMap<WorkflowType, Arc<dyn TaskBody>>;

/// How a call to [`TaskRunner::run`] ended.
#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    /// No instance with that id.
    NotFound,
    /// The instance was not `pending`; nothing was executed.
    NotPending(WorkflowStatus),
    /// No body is registered for the instance's type; nothing was executed.
    NoTaskBody(WorkflowType),
    Completed(WorkflowInstance),
    Failed(WorkflowInstance),
}

pub struct TaskRunner {
    engine: WorkflowEngine,
    registry: TaskRegistry,
}

impl TaskRunner {
    pub fn new(engine: WorkflowEngine) -> Self {
        Self {
            engine,
            registry: TaskRegistry::new(),
        }
    }

    /// Register (or replace) the body for `workflow_type`.
    pub fn register(mut self, workflow_type: WorkflowType, body: Arc<dyn TaskBody>) -> Self {
        self.registry.insert(workflow_type, body);
        self
    }

    pub fn engine(&self) -> &WorkflowEngine {
        &self.engine
    }

    #[instrument(skip(self), fields(workflow_id = %id))]
    pub async fn run(&self, id: Uuid) -> Result<RunOutcome, EngineError> {
        let Some(instance) = self.engine.get_workflow(id).await? else {
            return Ok(RunOutcome::NotFound);
        };
        let Some(body) = self.registry.get(&instance.workflow_type).cloned() else {
            warn!(workflow_type = %instance.workflow_type, "no task body registered");
            return Ok(RunOutcome::NoTaskBody(instance.workflow_type));
        };

        let Some(running) = self.engine.start_workflow(id).await? else {
            // Either raced with another starter or was never pending.
            let status = self
                .engine
                .get_workflow(id)
                .await?
                .map_or(instance.status, |i| i.status);
            return Ok(RunOutcome::NotPending(status));
        };

        self.engine
            .add_log(id, LogLevel::Info, format!("running {} task", body.name()), None, None)
            .await?;

        let result = body.execute(&running.config).await;

        let data = json!({
            "duration_ms": result.metrics.duration_ms,
            "steps_completed": result.metrics.steps_completed,
            "steps_failed": result.metrics.steps_failed,
            "warnings": result.warnings,
        });

        if result.success {
            self.engine
                .add_log(id, LogLevel::Info, "task finished", Some(data), None)
                .await?;
            info!(task = body.name(), "task finished");
            return Ok(match self.engine.complete_workflow(id, result).await? {
                Some(done) => RunOutcome::Completed(done),
                None => RunOutcome::NotFound,
            });
        }

        let summary = result.error_summary();
        self.engine
            .add_log(id, LogLevel::Error, summary.clone(), Some(data), None)
            .await?;
        warn!(task = body.name(), error = %summary, "task failed");
        Ok(match self.engine.fail_workflow(id, summary).await? {
            Some(failed) => RunOutcome::Failed(failed),
            None => RunOutcome::NotFound,
        })
    }
}
