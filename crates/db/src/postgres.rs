//! Postgres-backed `WorkflowStore`, delegating to the repository functions.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::{
    models::{WorkflowExecutionRow, WorkflowInstanceRow, WorkflowLogRow, WorkflowStepRow},
    pool::DbPool,
    repository::{instances, logs, steps},
    store::{InstanceFilter, LogFilter, StepCompletion, WorkflowStore},
    DbError,
};

/// Store backed by a shared Postgres pool.
#[derive(Clone)]
pub struct PgStore {
    pool: DbPool,
}

impl PgStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }
}

#[async_trait]
impl WorkflowStore for PgStore {
    async fn insert_instance(&self, row: &WorkflowInstanceRow) -> Result<(), DbError> {
        instances::insert_instance(&self.pool, row).await
    }

    async fn get_instance(&self, id: Uuid) -> Result<Option<WorkflowInstanceRow>, DbError> {
        instances::get_instance(&self.pool, id).await
    }

    async fn replace_instance(&self, row: &WorkflowInstanceRow) -> Result<bool, DbError> {
        instances::replace_instance(&self.pool, row, None).await
    }

    async fn replace_instance_if_version(
        &self,
        row: &WorkflowInstanceRow,
        expected_version: i64,
    ) -> Result<bool, DbError> {
        instances::replace_instance(&self.pool, row, Some(expected_version)).await
    }

    async fn set_current_step(
        &self,
        id: Uuid,
        step_name: &str,
        updated_at: DateTime<Utc>,
    ) -> Result<bool, DbError> {
        instances::set_current_step(&self.pool, id, step_name, updated_at).await
    }

    async fn list_instances(
        &self,
        filter: &InstanceFilter,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<WorkflowInstanceRow>, i64), DbError> {
        instances::list_instances(&self.pool, filter, limit, offset).await
    }

    async fn instances_created_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<WorkflowInstanceRow>, DbError> {
        instances::instances_created_between(&self.pool, start, end).await
    }

    async fn delete_finished_instances_before(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<u64, DbError> {
        instances::delete_finished_before(&self.pool, cutoff).await
    }

    async fn insert_step_with_execution(
        &self,
        step: &WorkflowStepRow,
        execution: &WorkflowExecutionRow,
    ) -> Result<(), DbError> {
        steps::insert_step_with_execution(&self.pool, step, execution).await
    }

    async fn get_step(&self, id: Uuid) -> Result<Option<WorkflowStepRow>, DbError> {
        steps::get_step(&self.pool, id).await
    }

    async fn executions_for_step(
        &self,
        step_id: Uuid,
    ) -> Result<Vec<WorkflowExecutionRow>, DbError> {
        steps::executions_for_step(&self.pool, step_id).await
    }

    async fn steps_for_instance(
        &self,
        instance_id: Uuid,
    ) -> Result<Vec<WorkflowStepRow>, DbError> {
        steps::steps_for_instance(&self.pool, instance_id).await
    }

    async fn executions_for_instance(
        &self,
        instance_id: Uuid,
    ) -> Result<Vec<WorkflowExecutionRow>, DbError> {
        steps::executions_for_instance(&self.pool, instance_id).await
    }

    async fn complete_step(&self, completion: &StepCompletion) -> Result<u64, DbError> {
        steps::complete_step(&self.pool, completion).await
    }

    async fn insert_log(&self, row: &WorkflowLogRow) -> Result<(), DbError> {
        logs::insert_log(&self.pool, row).await
    }

    async fn list_logs(
        &self,
        filter: &LogFilter,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<WorkflowLogRow>, i64), DbError> {
        logs::list_logs(&self.pool, filter, limit, offset).await
    }

    async fn delete_logs_before(&self, cutoff: DateTime<Utc>) -> Result<u64, DbError> {
        logs::delete_logs_before(&self.pool, cutoff).await
    }
}
