//! In-memory `WorkflowStore` backend.
//!
//! All four tables sit behind a single `RwLock` so the paired step/execution
//! operations are atomic, matching the transactional behaviour of
//! [`crate::PgStore`].  Only suitable for tests and single-process use.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::{
    models::{WorkflowExecutionRow, WorkflowInstanceRow, WorkflowLogRow, WorkflowStepRow},
    store::{InstanceFilter, LogFilter, StepCompletion, WorkflowStore},
    DbError,
};

#[derive(Default)]
struct Tables {
    instances: HashMap<Uuid, WorkflowInstanceRow>,
    steps: HashMap<Uuid, WorkflowStepRow>,
    executions: HashMap<Uuid, WorkflowExecutionRow>,
    /// Insertion order is kept so newest-first ties resolve deterministically.
    logs: Vec<WorkflowLogRow>,
}

/// Process-local store used by tests and when no database is configured.
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn page<T: Clone>(rows: &[T], limit: i64, offset: i64) -> Vec<T> {
    let offset = usize::try_from(offset).unwrap_or(0);
    let limit = usize::try_from(limit).unwrap_or(0);
    rows.iter().skip(offset).take(limit).cloned().collect()
}

#[async_trait]
impl WorkflowStore for MemoryStore {
    async fn insert_instance(&self, row: &WorkflowInstanceRow) -> Result<(), DbError> {
        self.tables.write().await.instances.insert(row.id, row.clone());
        Ok(())
    }

    async fn get_instance(&self, id: Uuid) -> Result<Option<WorkflowInstanceRow>, DbError> {
        Ok(self.tables.read().await.instances.get(&id).cloned())
    }

    async fn replace_instance(&self, row: &WorkflowInstanceRow) -> Result<bool, DbError> {
        let mut tables = self.tables.write().await;
        match tables.instances.get_mut(&row.id) {
            Some(existing) => {
                *existing = row.clone();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn replace_instance_if_version(
        &self,
        row: &WorkflowInstanceRow,
        expected_version: i64,
    ) -> Result<bool, DbError> {
        let mut tables = self.tables.write().await;
        match tables.instances.get_mut(&row.id) {
            Some(existing) if existing.version == expected_version => {
                *existing = row.clone();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn set_current_step(
        &self,
        id: Uuid,
        step_name: &str,
        updated_at: DateTime<Utc>,
    ) -> Result<bool, DbError> {
        let mut tables = self.tables.write().await;
        let Some(existing) = tables.instances.get_mut(&id) else {
            return Ok(false);
        };
        existing.current_step = Some(step_name.to_string());
        existing.updated_at = updated_at;
        existing.version += 1;
        Ok(true)
    }

    async fn list_instances(
        &self,
        filter: &InstanceFilter,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<WorkflowInstanceRow>, i64), DbError> {
        let tables = self.tables.read().await;
        let mut matching: Vec<&WorkflowInstanceRow> = tables
            .instances
            .values()
            .filter(|row| filter.matches(row))
            .collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));

        let total = matching.len() as i64;
        let rows: Vec<WorkflowInstanceRow> = matching.into_iter().cloned().collect();
        Ok((page(&rows, limit, offset), total))
    }

    async fn instances_created_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<WorkflowInstanceRow>, DbError> {
        Ok(self
            .tables
            .read()
            .await
            .instances
            .values()
            .filter(|row| row.created_at >= start && row.created_at <= end)
            .cloned()
            .collect())
    }

    async fn delete_finished_instances_before(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<u64, DbError> {
        let mut tables = self.tables.write().await;
        let doomed: Vec<Uuid> = tables
            .instances
            .values()
            .filter(|row| {
                (row.status == "completed" || row.status == "failed")
                    && row.completed_at.map_or(false, |at| at < cutoff)
            })
            .map(|row| row.id)
            .collect();

        for id in &doomed {
            tables.instances.remove(id);
        }
        tables
            .steps
            .retain(|_, step| !doomed.contains(&step.workflow_instance_id));
        tables
            .executions
            .retain(|_, exec| !doomed.contains(&exec.workflow_instance_id));

        Ok(doomed.len() as u64)
    }

    async fn insert_step_with_execution(
        &self,
        step: &WorkflowStepRow,
        execution: &WorkflowExecutionRow,
    ) -> Result<(), DbError> {
        let mut tables = self.tables.write().await;
        if !tables.instances.contains_key(&step.workflow_instance_id) {
            return Err(DbError::MissingParent {
                table: "workflow_instances",
                id: step.workflow_instance_id,
            });
        }
        tables.steps.insert(step.id, step.clone());
        tables.executions.insert(execution.id, execution.clone());
        Ok(())
    }

    async fn get_step(&self, id: Uuid) -> Result<Option<WorkflowStepRow>, DbError> {
        Ok(self.tables.read().await.steps.get(&id).cloned())
    }

    async fn executions_for_step(
        &self,
        step_id: Uuid,
    ) -> Result<Vec<WorkflowExecutionRow>, DbError> {
        let tables = self.tables.read().await;
        let mut rows: Vec<WorkflowExecutionRow> = tables
            .executions
            .values()
            .filter(|exec| exec.step_id == step_id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| a.started_at.cmp(&b.started_at));
        Ok(rows)
    }

    async fn steps_for_instance(
        &self,
        instance_id: Uuid,
    ) -> Result<Vec<WorkflowStepRow>, DbError> {
        let tables = self.tables.read().await;
        let mut rows: Vec<WorkflowStepRow> = tables
            .steps
            .values()
            .filter(|step| step.workflow_instance_id == instance_id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| a.started_at.cmp(&b.started_at));
        Ok(rows)
    }

    async fn executions_for_instance(
        &self,
        instance_id: Uuid,
    ) -> Result<Vec<WorkflowExecutionRow>, DbError> {
        let tables = self.tables.read().await;
        let mut rows: Vec<WorkflowExecutionRow> = tables
            .executions
            .values()
            .filter(|exec| exec.workflow_instance_id == instance_id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| a.started_at.cmp(&b.started_at));
        Ok(rows)
    }

    async fn complete_step(&self, completion: &StepCompletion) -> Result<u64, DbError> {
        let mut tables = self.tables.write().await;

        let updated = match tables.steps.get_mut(&completion.step_id) {
            Some(step) => {
                step.status = completion.status.clone();
                step.completed_at = Some(completion.completed_at);
                step.result = completion.result.clone();
                step.error = completion.error.clone();
                1
            }
            None => 0,
        };

        for exec in tables
            .executions
            .values_mut()
            .filter(|exec| exec.step_id == completion.step_id)
        {
            exec.status = completion.status.clone();
            exec.completed_at = Some(completion.completed_at);
            exec.result = completion.result.clone();
            exec.error = completion.error.clone();
            exec.execution_time_ms = exec
                .started_at
                .map(|started| (completion.completed_at - started).num_milliseconds());
        }

        Ok(updated)
    }

    async fn insert_log(&self, row: &WorkflowLogRow) -> Result<(), DbError> {
        self.tables.write().await.logs.push(row.clone());
        Ok(())
    }

    async fn list_logs(
        &self,
        filter: &LogFilter,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<WorkflowLogRow>, i64), DbError> {
        let tables = self.tables.read().await;
        // Reverse first so that, among equal timestamps, later inserts come first.
        let mut matching: Vec<WorkflowLogRow> = tables
            .logs
            .iter()
            .rev()
            .filter(|row| filter.matches(row))
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));

        let total = matching.len() as i64;
        Ok((page(&matching, limit, offset), total))
    }

    async fn delete_logs_before(&self, cutoff: DateTime<Utc>) -> Result<u64, DbError> {
        let mut tables = self.tables.write().await;
        let before = tables.logs.len();
        tables.logs.retain(|row| row.timestamp >= cutoff);
        Ok((before - tables.logs.len()) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn instance(
        workflow_type: &str,
        status: &str,
        created_at: DateTime<Utc>,
    ) -> WorkflowInstanceRow {
        WorkflowInstanceRow {
            id: Uuid::new_v4(),
            workflow_type: workflow_type.into(),
            status: status.into(),
            site_id: None,
            job_id: None,
            config: "{}".into(),
            current_step: None,
            progress: 0,
            started_at: None,
            completed_at: None,
            created_at,
            updated_at: created_at,
            error: None,
            result: None,
            version: 1,
        }
    }

    fn log(instance_id: Uuid, level: &str, timestamp: DateTime<Utc>) -> WorkflowLogRow {
        WorkflowLogRow {
            id: Uuid::new_v4(),
            workflow_instance_id: instance_id,
            step_id: None,
            level: level.into(),
            message: format!("{level} message"),
            data: None,
            timestamp,
        }
    }

    #[tokio::test]
    async fn list_pages_newest_first_with_full_total() {
        let store = MemoryStore::new();
        let now = Utc::now();
        for i in 0..5 {
            let row = instance("discovery", "pending", now - Duration::minutes(i));
            store.insert_instance(&row).await.unwrap();
        }
        store
            .insert_instance(&instance("job_monitor", "pending", now))
            .await
            .unwrap();

        let filter = InstanceFilter {
            workflow_type: Some("discovery".into()),
            status: None,
        };
        let (rows, total) = store.list_instances(&filter, 2, 0).await.unwrap();

        assert_eq!(total, 5);
        assert_eq!(rows.len(), 2);
        assert!(rows[0].created_at >= rows[1].created_at);
        assert!(rows.iter().all(|r| r.workflow_type == "discovery"));

        let (tail, _) = store.list_instances(&filter, 2, 4).await.unwrap();
        assert_eq!(tail.len(), 1);
    }

    #[tokio::test]
    async fn versioned_replace_rejects_stale_writer() {
        let store = MemoryStore::new();
        let row = instance("discovery", "pending", Utc::now());
        store.insert_instance(&row).await.unwrap();

        let mut next = row.clone();
        next.version = 2;
        next.status = "running".into();
        assert!(store.replace_instance_if_version(&next, 1).await.unwrap());

        let mut stale = row.clone();
        stale.version = 2;
        stale.status = "failed".into();
        assert!(!store.replace_instance_if_version(&stale, 1).await.unwrap());

        let stored = store.get_instance(row.id).await.unwrap().unwrap();
        assert_eq!(stored.status, "running");
    }

    #[tokio::test]
    async fn replace_missing_row_reports_false() {
        let store = MemoryStore::new();
        let row = instance("discovery", "pending", Utc::now());
        assert!(!store.replace_instance(&row).await.unwrap());
    }

    #[tokio::test]
    async fn current_step_write_leaves_other_columns_alone() {
        let store = MemoryStore::new();
        let mut row = instance("job_monitor", "completed", Utc::now());
        row.progress = 100;
        store.insert_instance(&row).await.unwrap();

        let at = Utc::now();
        assert!(store.set_current_step(row.id, "fetch", at).await.unwrap());
        assert!(!store.set_current_step(Uuid::new_v4(), "fetch", at).await.unwrap());

        let stored = store.get_instance(row.id).await.unwrap().unwrap();
        assert_eq!(stored.current_step.as_deref(), Some("fetch"));
        assert_eq!(stored.updated_at, at);
        assert_eq!(stored.version, row.version + 1);
        assert_eq!(stored.status, "completed");
        assert_eq!(stored.progress, 100);
    }

    #[tokio::test]
    async fn complete_step_updates_paired_execution() {
        let store = MemoryStore::new();
        let parent = instance("job_monitor", "running", Utc::now());
        store.insert_instance(&parent).await.unwrap();
        let instance_id = parent.id;
        let step_id = Uuid::new_v4();
        let started = Utc::now() - Duration::milliseconds(250);

        let step = WorkflowStepRow {
            id: step_id,
            workflow_instance_id: instance_id,
            name: "fetch".into(),
            status: "running".into(),
            config: None,
            started_at: Some(started),
            completed_at: None,
            error: None,
            result: None,
            retry_count: 0,
            max_retries: 3,
        };
        let exec = WorkflowExecutionRow {
            id: Uuid::new_v4(),
            workflow_instance_id: instance_id,
            step_id,
            status: "running".into(),
            started_at: Some(started),
            completed_at: None,
            error: None,
            result: None,
            retry_count: 0,
            execution_time_ms: None,
        };
        store.insert_step_with_execution(&step, &exec).await.unwrap();

        let completed_at = started + Duration::milliseconds(250);
        let updated = store
            .complete_step(&StepCompletion {
                step_id,
                status: "failed".into(),
                completed_at,
                result: None,
                error: Some("timeout".into()),
            })
            .await
            .unwrap();
        assert_eq!(updated, 1);

        let execs = store.executions_for_step(step_id).await.unwrap();
        assert_eq!(execs.len(), 1);
        assert_eq!(execs[0].status, "failed");
        assert_eq!(execs[0].error.as_deref(), Some("timeout"));
        assert_eq!(execs[0].execution_time_ms, Some(250));
    }

    #[tokio::test]
    async fn step_under_missing_instance_is_rejected() {
        let store = MemoryStore::new();
        let orphan = Uuid::new_v4();
        let step = WorkflowStepRow {
            id: Uuid::new_v4(),
            workflow_instance_id: orphan,
            name: "fetch".into(),
            status: "running".into(),
            config: None,
            started_at: Some(Utc::now()),
            completed_at: None,
            error: None,
            result: None,
            retry_count: 0,
            max_retries: 3,
        };
        let exec = WorkflowExecutionRow {
            id: Uuid::new_v4(),
            workflow_instance_id: orphan,
            step_id: step.id,
            status: "running".into(),
            started_at: step.started_at,
            completed_at: None,
            error: None,
            result: None,
            retry_count: 0,
            execution_time_ms: None,
        };

        let err = store.insert_step_with_execution(&step, &exec).await.unwrap_err();
        assert!(err.is_missing_parent());
        assert!(store.get_step(step.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn logs_filter_and_prune_by_age() {
        let store = MemoryStore::new();
        let id = Uuid::new_v4();
        let now = Utc::now();

        store.insert_log(&log(id, "info", now - Duration::days(40))).await.unwrap();
        store.insert_log(&log(id, "error", now - Duration::days(1))).await.unwrap();
        store.insert_log(&log(id, "info", now)).await.unwrap();
        store.insert_log(&log(Uuid::new_v4(), "info", now)).await.unwrap();

        let filter = LogFilter {
            workflow_instance_id: id,
            step_id: None,
            level: Some("info".into()),
        };
        let (rows, total) = store.list_logs(&filter, 10, 0).await.unwrap();
        assert_eq!(total, 2);
        assert!(rows[0].timestamp > rows[1].timestamp);

        let removed = store.delete_logs_before(now - Duration::days(30)).await.unwrap();
        assert_eq!(removed, 1);
        let (_, total) = store.list_logs(&filter, 10, 0).await.unwrap();
        assert_eq!(total, 1);
    }
}
