//! `StepLog`: the ad hoc, in-memory step list a task body keeps for its own
//! metrics.
//!
//! It is not connected to the engine's persisted step API:
//! bodies self-report through [`WorkflowMetrics`], and the caller owns the
//! persisted instance.

use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

use crate::{WorkflowMetrics, WorkflowResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStepStatus {
    Running,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Serialize)]
pub struct TaskStep {
    pub name: String,
    pub status: TaskStepStatus,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
}

/// Ordered list of named steps plus resource counter for one run.
#[derive(Debug)]
pub struct StepLog {
    started: Instant,
    steps: Vec<TaskStep>,
    resources_used: u32,
}

impl Default for StepLog {
    fn default() -> Self {
        Self::new()
    }
}

impl StepLog {
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
            steps: Vec::new(),
            resources_used: 0,
        }
    }

    /// Open a step and return its index.
    pub fn begin(&mut self, name: impl Into<String>) -> usize {
        self.steps.push(TaskStep {
            name: name.into(),
            status: TaskStepStatus::Running,
            started_at: Utc::now(),
            completed_at: None,
            error: None,
        });
        self.steps.len() - 1
    }

    pub fn succeed(&mut self, index: usize) {
        self.close(index, TaskStepStatus::Completed, None);
    }

    pub fn fail(&mut self, index: usize, error: impl Into<String>) {
        self.close(index, TaskStepStatus::Failed, Some(error.into()));
    }

    fn close(&mut self, index: usize, status: TaskStepStatus, error: Option<String>) {
        if let Some(step) = self.steps.get_mut(index) {
            step.status = status;
            step.completed_at = Some(Utc::now());
            step.error = error;
        }
    }

    pub fn use_resources(&mut self, count: u32) {
        self.resources_used += count;
    }

    pub fn steps(&self) -> &[TaskStep] {
        &self.steps
    }

    pub fn metrics(&self) -> WorkflowMetrics {
        let count = |status: TaskStepStatus| {
            self.steps.iter().filter(|s| s.status == status).count() as u32
        };
        WorkflowMetrics {
            duration_ms: self.started.elapsed().as_millis() as u64,
            steps_completed: count(TaskStepStatus::Completed),
            steps_failed: count(TaskStepStatus::Failed),
            resources_used: self.resources_used,
        }
    }

    /// Build the final result.  `success` is the caller's verdict; metrics are
    /// taken from the recorded steps.
    pub fn finish(
        self,
        success: bool,
        data: Option<Value>,
        errors: Vec<String>,
        warnings: Vec<String>,
    ) -> WorkflowResult {
        WorkflowResult {
            success,
            data,
            errors,
            warnings,
            metrics: self.metrics(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metrics_count_closed_steps_only() {
        let mut log = StepLog::new();
        let a = log.begin("load");
        let b = log.begin("diff");
        let _c = log.begin("analyze");
        log.succeed(a);
        log.fail(b, "boom");
        log.use_resources(3);

        let metrics = log.metrics();
        assert_eq!(metrics.steps_completed, 1);
        assert_eq!(metrics.steps_failed, 1);
        assert_eq!(metrics.resources_used, 3);
        assert_eq!(log.steps()[1].error.as_deref(), Some("boom"));
        assert_eq!(log.steps()[2].status, TaskStepStatus::Running);
    }
}
