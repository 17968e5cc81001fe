//! `engine` crate: the workflow state machine and its query surface.
//!
//! [`WorkflowEngine`] persists instances, steps, executions and logs through
//! any [`db::WorkflowStore`] and exposes lifecycle transitions, stats and
//! retention.  [`runner::TaskRunner`] is the caller-side bridge that runs a
//! task body against a persisted instance.

pub mod config;
pub mod convert;
pub mod error;
pub mod logs;
pub mod models;
pub mod runner;
pub mod service;
pub mod stats;
pub mod steps;

pub use config::EngineConfig;
pub use error::EngineError;
pub use models::{
    CleanupReport, ListWorkflowsQuery, LogLevel, LogPage, LogQuery, StatsBucket, StatsPeriod,
    StatsReport, StepHandle, StepStatus, WorkflowExecution, WorkflowInstance, WorkflowLog,
    WorkflowPage, WorkflowStats, WorkflowStatus, WorkflowStep, WorkflowType, WorkflowUpdate,
};
pub use runner::{RunOutcome, TaskRunner};
pub use service::WorkflowEngine;

#[cfg(test)]
mod service_tests;
