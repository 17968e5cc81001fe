//! `WorkflowEngine`: the orchestration façade over a [`WorkflowStore`].
//!
//! Every operation is a short, independent unit of work; all state lives in
//! the store.  Instance lifecycle:
//!
//! ```text
//! create ─▶ pending ──start──▶ running ──complete──▶ completed
//!                                    └────fail─────▶ failed
//! ```
//!
//! Only `start_workflow` guards on the current status.  `complete_workflow`
//! and `fail_workflow` apply from any state, and plain updates are
//! last-write-wins read-modify-write.  Callers that need stronger guarantees
//! use [`WorkflowEngine::update_workflow_checked`].
//!
//! Step/execution bookkeeping lives in `steps.rs`, the log stream in
//! `logs.rs`, and rollups in `stats.rs`.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use db::{models::WorkflowInstanceRow, InstanceFilter, WorkflowStore};
use serde_json::Value;
use tasks::WorkflowResult;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::{
    config::EngineConfig,
    convert::convert_all,
    models::{
        CleanupReport, ListWorkflowsQuery, WorkflowInstance, WorkflowPage, WorkflowStatus,
        WorkflowType, WorkflowUpdate,
    },
    EngineError,
};

/// `days` days before `end`, floored at the Unix epoch.  Spans too large for
/// chrono saturate to the floor.
pub(crate) fn days_before(end: DateTime<Utc>, days: u32) -> DateTime<Utc> {
    let floor = DateTime::<Utc>::UNIX_EPOCH;
    Duration::try_days(i64::from(days))
        .and_then(|span| end.checked_sub_signed(span))
        .map_or(floor, |start| start.max(floor))
}

/// Stateless orchestrator over a shared store.
///
/// Cheap to clone; construct one per process and share it.
#[derive(Clone)]
pub struct WorkflowEngine {
    pub(crate) store: Arc<dyn WorkflowStore>,
    pub(crate) config: EngineConfig,
}

impl WorkflowEngine {
    pub fn new(store: Arc<dyn WorkflowStore>, config: EngineConfig) -> Self {
        Self { store, config }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    // -----------------------------------------------------------------------
    // Create / read
    // -----------------------------------------------------------------------

    /// Persist a new `pending` instance with `progress = 0`.
    #[instrument(skip(self, workflow_type, config), fields(workflow_type = %workflow_type))]
    pub async fn create_workflow(
        &self,
        workflow_type: WorkflowType,
        site_id: Option<String>,
        job_id: Option<String>,
        config: Value,
    ) -> Result<WorkflowInstance, EngineError> {
        let now = Utc::now();
        let instance = WorkflowInstance {
            id: Uuid::new_v4(),
            workflow_type,
            status: WorkflowStatus::Pending,
            site_id,
            job_id,
            config,
            current_step: None,
            progress: 0,
            started_at: None,
            completed_at: None,
            created_at: now,
            updated_at: now,
            error: None,
            result: None,
            version: 1,
        };

        self.store
            .insert_instance(&WorkflowInstanceRow::try_from(&instance)?)
            .await?;

        info!(workflow_id = %instance.id, "workflow created");
        Ok(instance)
    }

    pub async fn get_workflow(&self, id: Uuid) -> Result<Option<WorkflowInstance>, EngineError> {
        self.store
            .get_instance(id)
            .await?
            .map(WorkflowInstance::try_from)
            .transpose()
    }

    // -----------------------------------------------------------------------
    // Low-level mutators
    // -----------------------------------------------------------------------

    /// Merge `update` over the stored instance and stamp `updated_at`.
    ///
    /// Plain read-modify-write: concurrent writers race and the last write
    /// wins.  Returns `None` if the instance does not exist.
    #[instrument(skip(self, update), fields(workflow_id = %id))]
    pub async fn update_workflow(
        &self,
        id: Uuid,
        update: WorkflowUpdate,
    ) -> Result<Option<WorkflowInstance>, EngineError> {
        let Some(current) = self.get_workflow(id).await? else {
            return Ok(None);
        };
        self.write(current, update, None).await
    }

    /// Like [`Self::update_workflow`] but refuses to write unless the stored
    /// `version` equals `expected_version`.
    #[instrument(skip(self, update), fields(workflow_id = %id))]
    pub async fn update_workflow_checked(
        &self,
        id: Uuid,
        expected_version: i64,
        update: WorkflowUpdate,
    ) -> Result<Option<WorkflowInstance>, EngineError> {
        let Some(current) = self.get_workflow(id).await? else {
            return Ok(None);
        };
        if current.version != expected_version {
            return Err(EngineError::VersionConflict {
                id,
                expected: expected_version,
                actual: current.version,
            });
        }
        self.write(current, update, Some(expected_version)).await
    }

    async fn write(
        &self,
        mut instance: WorkflowInstance,
        update: WorkflowUpdate,
        expected_version: Option<i64>,
    ) -> Result<Option<WorkflowInstance>, EngineError> {
        if let Some(progress) = update.progress {
            if progress > 100 {
                return Err(EngineError::InvalidArgument(format!(
                    "progress must be within 0..=100, got {progress}"
                )));
            }
        }

        let previous_version = instance.version;
        update.apply(&mut instance);
        instance.updated_at = Utc::now();
        instance.version = previous_version + 1;

        let row = WorkflowInstanceRow::try_from(&instance)?;
        let written = match expected_version {
            None => self.store.replace_instance(&row).await?,
            Some(expected) => {
                if !self.store.replace_instance_if_version(&row, expected).await? {
                    let actual = self
                        .store
                        .get_instance(instance.id)
                        .await?
                        .map_or(expected, |r| r.version);
                    return Err(EngineError::VersionConflict {
                        id: instance.id,
                        expected,
                        actual,
                    });
                }
                true
            }
        };

        // Deleted between the read and the write.
        if !written {
            return Ok(None);
        }
        Ok(Some(instance))
    }

    // -----------------------------------------------------------------------
    // Transitions
    // -----------------------------------------------------------------------

    /// `pending → running`.  Returns `None`, without writing, if the instance
    /// is missing or not `pending`; this is the only double-start guard.
    #[instrument(skip(self), fields(workflow_id = %id))]
    pub async fn start_workflow(&self, id: Uuid) -> Result<Option<WorkflowInstance>, EngineError> {
        let Some(current) = self.get_workflow(id).await? else {
            return Ok(None);
        };
        if current.status != WorkflowStatus::Pending {
            debug!(status = %current.status, "start ignored: workflow is not pending");
            return Ok(None);
        }

        let update = WorkflowUpdate {
            status: Some(WorkflowStatus::Running),
            started_at: Some(Utc::now()),
            ..WorkflowUpdate::default()
        };
        let started = self.write(current, update, None).await?;
        if started.is_some() {
            info!("workflow started");
        }
        Ok(started)
    }

    /// Mark completed with `progress = 100`, from any prior state.
    #[instrument(skip(self, result), fields(workflow_id = %id))]
    pub async fn complete_workflow(
        &self,
        id: Uuid,
        result: WorkflowResult,
    ) -> Result<Option<WorkflowInstance>, EngineError> {
        let update = WorkflowUpdate {
            status: Some(WorkflowStatus::Completed),
            completed_at: Some(Utc::now()),
            progress: Some(100),
            result: Some(result),
            ..WorkflowUpdate::default()
        };
        let completed = self.update_workflow(id, update).await?;
        if completed.is_some() {
            info!("workflow completed");
        }
        Ok(completed)
    }

    /// Mark failed with `error`, from any prior state.
    #[instrument(skip(self, error), fields(workflow_id = %id))]
    pub async fn fail_workflow(
        &self,
        id: Uuid,
        error: impl Into<String>,
    ) -> Result<Option<WorkflowInstance>, EngineError> {
        let error = error.into();
        let update = WorkflowUpdate {
            status: Some(WorkflowStatus::Failed),
            completed_at: Some(Utc::now()),
            error: Some(error.clone()),
            ..WorkflowUpdate::default()
        };
        let failed = self.update_workflow(id, update).await?;
        if failed.is_some() {
            warn!(error = %error, "workflow failed");
        }
        Ok(failed)
    }

    /// Report intermediate progress.
    pub async fn set_progress(
        &self,
        id: Uuid,
        progress: u8,
        current_step: Option<String>,
    ) -> Result<Option<WorkflowInstance>, EngineError> {
        let update = WorkflowUpdate {
            progress: Some(progress),
            current_step,
            ..WorkflowUpdate::default()
        };
        self.update_workflow(id, update).await
    }

    // -----------------------------------------------------------------------
    // Listing
    // -----------------------------------------------------------------------

    /// One page of instances, newest first.  `total` counts every match, so
    /// `has_more` is exact.
    pub async fn list_workflows(
        &self,
        query: ListWorkflowsQuery,
    ) -> Result<WorkflowPage, EngineError> {
        let page = query.page.unwrap_or(1).max(1);
        let limit = query
            .limit
            .unwrap_or(self.config.default_page_size)
            .clamp(1, self.config.max_page_size.max(1));
        let offset = i64::from(page - 1) * i64::from(limit);

        let filter = InstanceFilter {
            workflow_type: query.workflow_type.map(|t| t.to_string()),
            status: query.status.map(|s| s.to_string()),
        };
        let (rows, total) = self
            .store
            .list_instances(&filter, i64::from(limit), offset)
            .await?;

        let total = u64::try_from(total).unwrap_or(0);
        let workflows: Vec<WorkflowInstance> = convert_all(rows)?;
        let has_more = (offset as u64) + (workflows.len() as u64) < total;

        Ok(WorkflowPage {
            workflows,
            total,
            page,
            limit,
            has_more,
        })
    }

    // -----------------------------------------------------------------------
    // Retention
    // -----------------------------------------------------------------------

    /// Delete terminal instances finished more than `older_than_days` ago and
    /// every log older than that, regardless of its instance's state.
    #[instrument(skip(self))]
    pub async fn cleanup_old_data(
        &self,
        older_than_days: Option<u32>,
    ) -> Result<CleanupReport, EngineError> {
        let days = older_than_days.unwrap_or(self.config.default_retention_days);
        let cutoff = days_before(Utc::now(), days);

        let instances_deleted = self.store.delete_finished_instances_before(cutoff).await?;
        let logs_deleted = self.store.delete_logs_before(cutoff).await?;

        info!(%cutoff, instances_deleted, logs_deleted, "old workflow data cleaned up");
        Ok(CleanupReport {
            cutoff,
            instances_deleted,
            logs_deleted,
        })
    }
}
