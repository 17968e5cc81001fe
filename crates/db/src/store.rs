//! The `WorkflowStore` trait: every query shape the engine needs.
//!
//! Implementations must be thread-safe.  Writes are single-row (or, for the
//! paired step/execution operations, single-transaction); no other locking
//! discipline is assumed.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::{
    models::{WorkflowExecutionRow, WorkflowInstanceRow, WorkflowLogRow, WorkflowStepRow},
    DbError,
};

/// Equality filters for instance listing.  `None` matches everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstanceFilter {
    pub workflow_type: Option<String>,
    pub status: Option<String>,
}

impl InstanceFilter {
    pub fn matches(&self, row: &WorkflowInstanceRow) -> bool {
        self.workflow_type
            .as_deref()
            .map_or(true, |t| t == row.workflow_type)
            && self.status.as_deref().map_or(true, |s| s == row.status)
    }
}

/// Filters for log queries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogFilter {
    pub workflow_instance_id: Uuid,
    pub step_id: Option<Uuid>,
    pub level: Option<String>,
}

impl LogFilter {
    pub fn matches(&self, row: &WorkflowLogRow) -> bool {
        row.workflow_instance_id == self.workflow_instance_id
            && self.step_id.map_or(true, |id| row.step_id == Some(id))
            && self.level.as_deref().map_or(true, |l| l == row.level)
    }
}

/// Terminal outcome written to a step and every execution paired with it.
#[derive(Debug, Clone, PartialEq)]
pub struct StepCompletion {
    pub step_id: Uuid,
    pub status: String,
    pub completed_at: DateTime<Utc>,
    pub result: Option<String>,
    pub error: Option<String>,
}

#[async_trait]
pub trait WorkflowStore: Send + Sync {
    // ------ instances ------

    async fn insert_instance(&self, row: &WorkflowInstanceRow) -> Result<(), DbError>;

    async fn get_instance(&self, id: Uuid) -> Result<Option<WorkflowInstanceRow>, DbError>;

    /// Overwrite every column of an existing row.  Returns `false` when no
    /// row with `row.id` exists.
    async fn replace_instance(&self, row: &WorkflowInstanceRow) -> Result<bool, DbError>;

    /// Like [`WorkflowStore::replace_instance`] but only writes when the
    /// stored `version` equals `expected_version`.
    async fn replace_instance_if_version(
        &self,
        row: &WorkflowInstanceRow,
        expected_version: i64,
    ) -> Result<bool, DbError>;

    /// Point `current_step` at `step_name`, stamp `updated_at` and bump
    /// `version`, leaving every other column untouched.  Returns `false` when
    /// no row with `id` exists.
    async fn set_current_step(
        &self,
        id: Uuid,
        step_name: &str,
        updated_at: DateTime<Utc>,
    ) -> Result<bool, DbError>;

    /// One page of matching rows (newest first) plus the total match count,
    /// computed independently of `limit`/`offset`.
    async fn list_instances(
        &self,
        filter: &InstanceFilter,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<WorkflowInstanceRow>, i64), DbError>;

    /// Rows whose `created_at` lies in `[start, end]`.
    async fn instances_created_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<WorkflowInstanceRow>, DbError>;

    /// Delete `completed`/`failed` rows finished before `cutoff`, together with
    /// their steps and executions.  Returns the number of instances removed.
    async fn delete_finished_instances_before(&self, cutoff: DateTime<Utc>)
        -> Result<u64, DbError>;

    // ------ steps & executions ------

    /// Insert a step and its execution atomically.  Fails with an error for
    /// which [`DbError::is_missing_parent`] holds when the owning instance
    /// does not exist.
    async fn insert_step_with_execution(
        &self,
        step: &WorkflowStepRow,
        execution: &WorkflowExecutionRow,
    ) -> Result<(), DbError>;

    async fn get_step(&self, id: Uuid) -> Result<Option<WorkflowStepRow>, DbError>;

    async fn executions_for_step(&self, step_id: Uuid)
        -> Result<Vec<WorkflowExecutionRow>, DbError>;

    async fn steps_for_instance(&self, instance_id: Uuid)
        -> Result<Vec<WorkflowStepRow>, DbError>;

    async fn executions_for_instance(
        &self,
        instance_id: Uuid,
    ) -> Result<Vec<WorkflowExecutionRow>, DbError>;

    /// Apply `completion` to the step and to every execution whose `step_id`
    /// matches, in one unit.  Returns the number of step rows updated.
    async fn complete_step(&self, completion: &StepCompletion) -> Result<u64, DbError>;

    // ------ logs ------

    async fn insert_log(&self, row: &WorkflowLogRow) -> Result<(), DbError>;

    /// One page of matching logs (newest first) plus the total match count.
    async fn list_logs(
        &self,
        filter: &LogFilter,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<WorkflowLogRow>, i64), DbError>;

    /// Delete every log older than `cutoff`, regardless of instance status.
    async fn delete_logs_before(&self, cutoff: DateTime<Utc>) -> Result<u64, DbError>;
}
