//! Step and execution bookkeeping.
//!
//! A step and its execution are always created together and completed
//! together.  Nothing here retries: `retry_count` stays at 0.
//!
//! Opening a step bumps the instance `version`, so a checked update prepared
//! before the step was opened reports a conflict instead of rewinding
//! `current_step`.

use chrono::Utc;
use db::{
    models::{WorkflowExecutionRow, WorkflowStepRow},
    StepCompletion,
};
use serde_json::Value;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::{
    convert::convert_all,
    models::{StepHandle, StepStatus, WorkflowExecution, WorkflowStep},
    EngineError, WorkflowEngine,
};

impl WorkflowEngine {
    /// Open a `running` step plus its execution under `instance_id` and point
    /// the instance's `current_step` at it.
    ///
    /// Returns `None` when the instance does not exist.
    #[instrument(skip(self, config), fields(workflow_id = %instance_id, step = %name))]
    pub async fn execute_step(
        &self,
        instance_id: Uuid,
        name: &str,
        config: Option<Value>,
    ) -> Result<Option<StepHandle>, EngineError> {
        let now = Utc::now();
        let step = WorkflowStep {
            id: Uuid::new_v4(),
            workflow_instance_id: instance_id,
            name: name.to_string(),
            status: StepStatus::Running,
            config,
            started_at: Some(now),
            completed_at: None,
            error: None,
            result: None,
            retry_count: 0,
            max_retries: self.config.default_max_retries,
        };
        let execution = WorkflowExecution {
            id: Uuid::new_v4(),
            workflow_instance_id: instance_id,
            step_id: step.id,
            status: StepStatus::Running,
            started_at: Some(now),
            completed_at: None,
            error: None,
            result: None,
            retry_count: 0,
            execution_time_ms: None,
        };

        let inserted = self
            .store
            .insert_step_with_execution(
                &WorkflowStepRow::try_from(&step)?,
                &WorkflowExecutionRow::try_from(&execution)?,
            )
            .await;
        match inserted {
            Ok(()) => {}
            Err(e) if e.is_missing_parent() => {
                debug!("step not opened: workflow does not exist");
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        }

        // Only the pointer is written, so a concurrent complete or fail keeps
        // its status.
        if !self.store.set_current_step(instance_id, name, now).await? {
            debug!("workflow deleted after its step was opened");
        }

        info!(step_id = %step.id, "step started");
        Ok(Some(StepHandle { step, execution }))
    }

    /// Close a step and its execution.  A non-empty `error` marks both
    /// `failed`; otherwise both become `completed`.
    ///
    /// Returns `false` when no such step exists.
    #[instrument(skip(self, step_id, result, error), fields(step_id = %step_id))]
    pub async fn complete_step(
        &self,
        step_id: Uuid,
        result: Option<Value>,
        error: Option<String>,
    ) -> Result<bool, EngineError> {
        let error = error.filter(|e| !e.is_empty());
        let status = if error.is_some() {
            StepStatus::Failed
        } else {
            StepStatus::Completed
        };

        let completion = StepCompletion {
            step_id,
            status: status.to_string(),
            completed_at: Utc::now(),
            result: result.as_ref().map(|r| serde_json::to_string(r)).transpose()?,
            error,
        };
        let updated = self.store.complete_step(&completion).await?;

        match (updated, status) {
            (0, _) => debug!("no such step"),
            (_, StepStatus::Failed) => warn!(error = ?completion.error, "step failed"),
            _ => info!("step completed"),
        }
        Ok(updated > 0)
    }

    /// Every step of an instance, oldest first.
    pub async fn get_steps(&self, instance_id: Uuid) -> Result<Vec<WorkflowStep>, EngineError> {
        convert_all(self.store.steps_for_instance(instance_id).await?)
    }

    /// Every execution of an instance, oldest first.
    pub async fn get_executions(
        &self,
        instance_id: Uuid,
    ) -> Result<Vec<WorkflowExecution>, EngineError> {
        convert_all(self.store.executions_for_instance(instance_id).await?)
    }

    /// The executions paired with one step.
    pub async fn get_step_executions(
        &self,
        step_id: Uuid,
    ) -> Result<Vec<WorkflowExecution>, EngineError> {
        convert_all(self.store.executions_for_step(step_id).await?)
    }

    pub async fn get_step(&self, step_id: Uuid) -> Result<Option<WorkflowStep>, EngineError> {
        self.store
            .get_step(step_id)
            .await?
            .map(WorkflowStep::try_from)
            .transpose()
    }
}
