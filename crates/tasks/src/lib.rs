//! `tasks` crate: the `TaskBody` contract and the built-in workflow bodies.
//!
//! Every body (discovery, job monitor, change analysis, and test doubles)
//! implements [`TaskBody`]: it consumes an opaque config and returns a
//! [`WorkflowResult`].  Bodies reach external services only through the
//! capability traits in [`capabilities`].

pub mod capabilities;
pub mod change_analysis;
pub mod discovery;
pub mod error;
pub mod job_monitor;
pub mod mock;
pub mod result;
pub mod tracker;
pub mod traits;

pub use capabilities::{
    ChangeAnalysisRequest, ChangeAnalyzer, ChangeVerdict, ContentDiff, FetchedPage, JobRecord,
    JobRepository, PageFetcher, SnapshotStore,
};
pub use change_analysis::ChangeAnalysisTask;
pub use discovery::DiscoveryTask;
pub use error::TaskError;
pub use job_monitor::JobMonitorTask;
pub use result::{WorkflowMetrics, WorkflowResult};
pub use tracker::StepLog;
pub use traits::TaskBody;
