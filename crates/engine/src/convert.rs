//! Conversions between `db` row structs and domain models.
//!
//! Opaque payloads are stored as JSON text; enum columns as their
//! snake_case names.  Anything that fails to parse surfaces as
//! [`EngineError::CorruptRow`] or [`EngineError::Serialization`].

use std::str::FromStr;

use db::models::{WorkflowExecutionRow, WorkflowInstanceRow, WorkflowLogRow, WorkflowStepRow};
use serde::{de::DeserializeOwned, Serialize};

use crate::{
    models::{WorkflowExecution, WorkflowInstance, WorkflowLog, WorkflowStep},
    EngineError,
};

fn parse_enum<T: FromStr>(column: &'static str, value: &str) -> Result<T, EngineError> {
    value.parse().map_err(|_| EngineError::CorruptRow {
        column,
        value: value.to_string(),
    })
}

fn parse_count<T: TryFrom<i32>>(column: &'static str, value: i32) -> Result<T, EngineError> {
    T::try_from(value).map_err(|_| EngineError::CorruptRow {
        column,
        value: value.to_string(),
    })
}

fn decode<T: DeserializeOwned>(text: Option<&str>) -> Result<Option<T>, EngineError> {
    text.map(|t| serde_json::from_str::<T>(t)).transpose().map_err(Into::into)
}

fn encode<T: Serialize>(value: Option<&T>) -> Result<Option<String>, EngineError> {
    value.map(|v| serde_json::to_string(v)).transpose().map_err(Into::into)
}

// ---------------------------------------------------------------------------
// Instances
// ---------------------------------------------------------------------------

impl TryFrom<WorkflowInstanceRow> for WorkflowInstance {
    type Error = EngineError;

    fn try_from(row: WorkflowInstanceRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id,
            workflow_type: parse_enum("workflow_type", &row.workflow_type)?,
            status: parse_enum("status", &row.status)?,
            site_id: row.site_id,
            job_id: row.job_id,
            config: serde_json::from_str(&row.config)?,
            current_step: row.current_step,
            progress: parse_count("progress", row.progress)?,
            started_at: row.started_at,
            completed_at: row.completed_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
            error: row.error,
            result: decode(row.result.as_deref())?,
            version: row.version,
        })
    }
}

impl TryFrom<&WorkflowInstance> for WorkflowInstanceRow {
    type Error = EngineError;

    fn try_from(instance: &WorkflowInstance) -> Result<Self, Self::Error> {
        Ok(Self {
            id: instance.id,
            workflow_type: instance.workflow_type.to_string(),
            status: instance.status.to_string(),
            site_id: instance.site_id.clone(),
            job_id: instance.job_id.clone(),
            config: serde_json::to_string(&instance.config)?,
            current_step: instance.current_step.clone(),
            progress: i32::from(instance.progress),
            started_at: instance.started_at,
            completed_at: instance.completed_at,
            created_at: instance.created_at,
            updated_at: instance.updated_at,
            error: instance.error.clone(),
            result: encode(instance.result.as_ref())?,
            version: instance.version,
        })
    }
}

// ---------------------------------------------------------------------------
// Steps & executions
// ---------------------------------------------------------------------------

impl TryFrom<WorkflowStepRow> for WorkflowStep {
    type Error = EngineError;

    fn try_from(row: WorkflowStepRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id,
            workflow_instance_id: row.workflow_instance_id,
            name: row.name,
            status: parse_enum("status", &row.status)?,
            config: decode(row.config.as_deref())?,
            started_at: row.started_at,
            completed_at: row.completed_at,
            error: row.error,
            result: decode(row.result.as_deref())?,
            retry_count: parse_count("retry_count", row.retry_count)?,
            max_retries: parse_count("max_retries", row.max_retries)?,
        })
    }
}

impl TryFrom<&WorkflowStep> for WorkflowStepRow {
    type Error = EngineError;

    fn try_from(step: &WorkflowStep) -> Result<Self, Self::Error> {
        Ok(Self {
            id: step.id,
            workflow_instance_id: step.workflow_instance_id,
            name: step.name.clone(),
            status: step.status.to_string(),
            config: encode(step.config.as_ref())?,
            started_at: step.started_at,
            completed_at: step.completed_at,
            error: step.error.clone(),
            result: encode(step.result.as_ref())?,
            retry_count: i32::try_from(step.retry_count).unwrap_or(i32::MAX),
            max_retries: i32::try_from(step.max_retries).unwrap_or(i32::MAX),
        })
    }
}

impl TryFrom<WorkflowExecutionRow> for WorkflowExecution {
    type Error = EngineError;

    fn try_from(row: WorkflowExecutionRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id,
            workflow_instance_id: row.workflow_instance_id,
            step_id: row.step_id,
            status: parse_enum("status", &row.status)?,
            started_at: row.started_at,
            completed_at: row.completed_at,
            error: row.error,
            result: decode(row.result.as_deref())?,
            retry_count: parse_count("retry_count", row.retry_count)?,
            execution_time_ms: row.execution_time_ms,
        })
    }
}

impl TryFrom<&WorkflowExecution> for WorkflowExecutionRow {
    type Error = EngineError;

    fn try_from(execution: &WorkflowExecution) -> Result<Self, Self::Error> {
        Ok(Self {
            id: execution.id,
            workflow_instance_id: execution.workflow_instance_id,
            step_id: execution.step_id,
            status: execution.status.to_string(),
            started_at: execution.started_at,
            completed_at: execution.completed_at,
            error: execution.error.clone(),
            result: encode(execution.result.as_ref())?,
            retry_count: i32::try_from(execution.retry_count).unwrap_or(i32::MAX),
            execution_time_ms: execution.execution_time_ms,
        })
    }
}

// ---------------------------------------------------------------------------
// Logs
// ---------------------------------------------------------------------------

impl TryFrom<WorkflowLogRow> for WorkflowLog {
    type Error = EngineError;

    fn try_from(row: WorkflowLogRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id,
            workflow_instance_id: row.workflow_instance_id,
            step_id: row.step_id,
            level: parse_enum("level", &row.level)?,
            message: row.message,
            data: decode(row.data.as_deref())?,
            timestamp: row.timestamp,
        })
    }
}

impl TryFrom<&WorkflowLog> for WorkflowLogRow {
    type Error = EngineError;

    fn try_from(log: &WorkflowLog) -> Result<Self, Self::Error> {
        Ok(Self {
            id: log.id,
            workflow_instance_id: log.workflow_instance_id,
            step_id: log.step_id,
            level: log.level.to_string(),
            message: log.message.clone(),
            data: encode(log.data.as_ref())?,
            timestamp: log.timestamp,
        })
    }
}

/// Convert a batch of rows, failing on the first corrupt one.
pub(crate) fn convert_all<R, T>(rows: Vec<R>) -> Result<Vec<T>, EngineError>
where
    T: TryFrom<R, Error = EngineError>,
{
    rows.into_iter().map(T::try_from).collect()
}
