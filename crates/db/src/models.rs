//! Row structs that map 1-to-1 onto database tables.
//!
//! These are *persistence* models: they carry no domain behaviour.
//! Enum-like columns (`workflow_type`, `status`, `level`) are plain text and
//! opaque payloads (`config`, `result`, `data`) are serialised JSON text so
//! they round-trip byte-for-byte.  Domain types live in the `engine` crate.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// workflow_instances
// ---------------------------------------------------------------------------

/// A persisted workflow instance row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct WorkflowInstanceRow {
    pub id: Uuid,
    pub workflow_type: String,
    pub status: String,
    pub site_id: Option<String>,
    pub job_id: Option<String>,
    /// Serialised JSON configuration, stored verbatim.
    pub config: String,
    pub current_step: Option<String>,
    pub progress: i32,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub error: Option<String>,
    /// Serialised JSON `WorkflowResult`.
    pub result: Option<String>,
    /// Bumped on every write.
    pub version: i64,
}

// ---------------------------------------------------------------------------
// workflow_steps
// ---------------------------------------------------------------------------

/// A persisted workflow step row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct WorkflowStepRow {
    pub id: Uuid,
    pub workflow_instance_id: Uuid,
    pub name: String,
    pub status: String,
    pub config: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
    pub result: Option<String>,
    pub retry_count: i32,
    pub max_retries: i32,
}

// ---------------------------------------------------------------------------
// workflow_executions
// ---------------------------------------------------------------------------

/// A persisted step execution row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct WorkflowExecutionRow {
    pub id: Uuid,
    pub workflow_instance_id: Uuid,
    pub step_id: Uuid,
    pub status: String,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
    pub result: Option<String>,
    pub retry_count: i32,
    pub execution_time_ms: Option<i64>,
}

// ---------------------------------------------------------------------------
// workflow_logs
// ---------------------------------------------------------------------------

/// A persisted log row.  Never updated after insert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct WorkflowLogRow {
    pub id: Uuid,
    pub workflow_instance_id: Uuid,
    pub step_id: Option<Uuid>,
    pub level: String,
    pub message: String,
    pub data: Option<String>,
    pub timestamp: DateTime<Utc>,
}
