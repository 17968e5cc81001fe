//! Core domain models for the workflow engine.
//!
//! These types are the source of truth for what a workflow instance, step,
//! execution and log entry look like in memory.  They convert to/from the
//! row structs of the `db` crate in [`crate::convert`].

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tasks::WorkflowResult;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Enumerations
// ---------------------------------------------------------------------------

/// Which task body produces/consumes an instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowType {
    Discovery,
    JobMonitor,
    ChangeAnalysis,
}

impl WorkflowType {
    pub const ALL: [WorkflowType; 3] = [Self::Discovery, Self::JobMonitor, Self::ChangeAnalysis];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Discovery => "discovery",
            Self::JobMonitor => "job_monitor",
            Self::ChangeAnalysis => "change_analysis",
        }
    }
}

impl std::fmt::Display for WorkflowType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for WorkflowType {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "discovery"       => Ok(Self::Discovery),
            "job_monitor"     => Ok(Self::JobMonitor),
            "change_analysis" => Ok(Self::ChangeAnalysis),
            other             => Err(format!("unknown workflow type: {other}")),
        }
    }
}

/// Lifecycle state of an instance.
///
/// `Cancelled` is part of the schema but no engine transition sets it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl WorkflowStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    /// `completed` and `failed`: the states cleanup may prune.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl std::fmt::Display for WorkflowStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for WorkflowStatus {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending"   => Ok(Self::Pending),
            "running"   => Ok(Self::Running),
            "completed" => Ok(Self::Completed),
            "failed"    => Ok(Self::Failed),
            "cancelled" => Ok(Self::Cancelled),
            other       => Err(format!("unknown workflow status: {other}")),
        }
    }
}

/// State of a step or execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Skipped,
}

impl StepStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
        }
    }
}

impl std::fmt::Display for StepStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for StepStatus {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending"   => Ok(Self::Pending),
            "running"   => Ok(Self::Running),
            "completed" => Ok(Self::Completed),
            "failed"    => Ok(Self::Failed),
            "skipped"   => Ok(Self::Skipped),
            other       => Err(format!("unknown step status: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for LogLevel {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "debug" => Ok(Self::Debug),
            "info"  => Ok(Self::Info),
            "warn"  => Ok(Self::Warn),
            "error" => Ok(Self::Error),
            other   => Err(format!("unknown log level: {other}")),
        }
    }
}

// ---------------------------------------------------------------------------
// WorkflowInstance
// ---------------------------------------------------------------------------

/// One long-running job and its accumulated outcome.
///
/// Invariants maintained by the engine's transitions:
/// - `Pending`: `progress == 0`, no `started_at`/`completed_at`.
/// - `Completed`: `progress == 100`, `completed_at` set.
/// - `Failed`: `error` and `completed_at` set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowInstance {
    pub id: Uuid,
    #[serde(rename = "type")]
    pub workflow_type: WorkflowType,
    pub status: WorkflowStatus,
    pub site_id: Option<String>,
    pub job_id: Option<String>,
    /// Type-specific parameters, stored verbatim.
    pub config: Value,
    pub current_step: Option<String>,
    /// 0–100.
    pub progress: u8,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub error: Option<String>,
    pub result: Option<WorkflowResult>,
    /// Bumped on every write; see [`crate::WorkflowEngine::update_workflow_checked`].
    pub version: i64,
}

/// Partial update merged over an instance.  `None` leaves a field untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkflowUpdate {
    pub status: Option<WorkflowStatus>,
    pub site_id: Option<String>,
    pub job_id: Option<String>,
    pub config: Option<Value>,
    pub current_step: Option<String>,
    pub progress: Option<u8>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
    pub result: Option<WorkflowResult>,
}

impl WorkflowUpdate {
    pub(crate) fn apply(self, instance: &mut WorkflowInstance) {
        if let Some(v) = self.status {
            instance.status = v;
        }
        if let Some(v) = self.site_id {
            instance.site_id = Some(v);
        }
        if let Some(v) = self.job_id {
            instance.job_id = Some(v);
        }
        if let Some(v) = self.config {
            instance.config = v;
        }
        if let Some(v) = self.current_step {
            instance.current_step = Some(v);
        }
        if let Some(v) = self.progress {
            instance.progress = v;
        }
        if let Some(v) = self.started_at {
            instance.started_at = Some(v);
        }
        if let Some(v) = self.completed_at {
            instance.completed_at = Some(v);
        }
        if let Some(v) = self.error {
            instance.error = Some(v);
        }
        if let Some(v) = self.result {
            instance.result = Some(v);
        }
    }
}

/// Query for `list_workflows`.  `page` is 1-based.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ListWorkflowsQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
    pub workflow_type: Option<WorkflowType>,
    pub status: Option<WorkflowStatus>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowPage {
    pub workflows: Vec<WorkflowInstance>,
    pub total: u64,
    pub page: u32,
    pub limit: u32,
    pub has_more: bool,
}

// ---------------------------------------------------------------------------
// Steps & executions
// ---------------------------------------------------------------------------

/// A named unit of work inside an instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowStep {
    pub id: Uuid,
    pub workflow_instance_id: Uuid,
    pub name: String,
    pub status: StepStatus,
    pub config: Option<Value>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
    pub result: Option<Value>,
    /// Schema only: nothing in the engine increments this.
    pub retry_count: u32,
    pub max_retries: u32,
}

/// One attempt to run a step.  Currently always 1:1 with its step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowExecution {
    pub id: Uuid,
    pub workflow_instance_id: Uuid,
    pub step_id: Uuid,
    pub status: StepStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
    pub result: Option<Value>,
    pub retry_count: u32,
    pub execution_time_ms: Option<i64>,
}

/// What `execute_step` hands back: the paired records it created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepHandle {
    pub step: WorkflowStep,
    pub execution: WorkflowExecution,
}

// ---------------------------------------------------------------------------
// Logs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowLog {
    pub id: Uuid,
    pub workflow_instance_id: Uuid,
    pub step_id: Option<Uuid>,
    pub level: LogLevel,
    pub message: String,
    pub data: Option<Value>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogQuery {
    pub workflow_instance_id: Uuid,
    pub step_id: Option<Uuid>,
    pub level: Option<LogLevel>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

impl LogQuery {
    pub fn for_instance(workflow_instance_id: Uuid) -> Self {
        Self {
            workflow_instance_id,
            step_id: None,
            level: None,
            limit: None,
            offset: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogPage {
    pub logs: Vec<WorkflowLog>,
    pub total: u64,
    pub has_more: bool,
}

// ---------------------------------------------------------------------------
// Stats & retention
// ---------------------------------------------------------------------------

/// Rollup over a set of instances.  Percentages are raw, unrounded ratios.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StatsBucket {
    pub total_workflows: u64,
    pub running_workflows: u64,
    pub completed_workflows: u64,
    pub failed_workflows: u64,
    pub average_duration_ms: f64,
    pub success_rate_percentage: f64,
    pub error_rate_percentage: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkflowStats {
    #[serde(flatten)]
    pub overall: StatsBucket,
    pub by_type: BTreeMap<WorkflowType, StatsBucket>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatsPeriod {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatsReport {
    pub stats: WorkflowStats,
    pub period: StatsPeriod,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CleanupReport {
    pub cutoff: DateTime<Utc>,
    pub instances_deleted: u64,
    pub logs_deleted: u64,
}
