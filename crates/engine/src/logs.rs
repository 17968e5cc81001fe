//! Per-instance structured log stream.
//!
//! These rows are part of the workflow's record and are queried by callers.
//! Operational diagnostics go through `tracing` instead.

use chrono::Utc;
use db::{models::WorkflowLogRow, LogFilter};
use serde_json::Value;
use uuid::Uuid;

use crate::{
    convert::convert_all,
    models::{LogLevel, LogPage, LogQuery, WorkflowLog},
    EngineError, WorkflowEngine,
};

impl WorkflowEngine {
    /// Append one entry to an instance's log stream.
    ///
    /// The instance is not checked for existence; logs carry no foreign key.
    pub async fn add_log(
        &self,
        workflow_instance_id: Uuid,
        level: LogLevel,
        message: impl Into<String>,
        data: Option<Value>,
        step_id: Option<Uuid>,
    ) -> Result<WorkflowLog, EngineError> {
        let log = WorkflowLog {
            id: Uuid::new_v4(),
            workflow_instance_id,
            step_id,
            level,
            message: message.into(),
            data,
            timestamp: Utc::now(),
        };
        self.store.insert_log(&WorkflowLogRow::try_from(&log)?).await?;
        Ok(log)
    }

    /// Newest-first page of an instance's logs.
    pub async fn get_logs(&self, query: LogQuery) -> Result<LogPage, EngineError> {
        let limit = query
            .limit
            .unwrap_or(self.config.default_log_limit)
            .clamp(1, self.config.max_log_limit.max(1));
        let offset = query.offset.unwrap_or(0);

        let filter = LogFilter {
            workflow_instance_id: query.workflow_instance_id,
            step_id: query.step_id,
            level: query.level.map(|l| l.to_string()),
        };
        let (rows, total) = self
            .store
            .list_logs(&filter, i64::from(limit), i64::from(offset))
            .await?;

        let total = u64::try_from(total).unwrap_or(0);
        let logs: Vec<WorkflowLog> = convert_all(rows)?;
        let has_more = u64::from(offset) + (logs.len() as u64) < total;

        Ok(LogPage {
            logs,
            total,
            has_more,
        })
    }
}
