//! Capability traits for the external collaborators task bodies consume.
//!
//! Each collaborator is a managed service outside this workspace (headless
//! browser, relational store, object store, AI endpoint).  Bodies only see
//! these narrow interfaces, so tests substitute in-process fakes.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::TaskError;

// ---------------------------------------------------------------------------
// Page fetching (headless browser)
// ---------------------------------------------------------------------------

/// A fetched page.  `status` is the HTTP status code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedPage {
    pub url: String,
    pub status: u16,
    pub body: String,
}

impl FetchedPage {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// 404 and 410 mean the posting has been taken down.
    pub fn is_gone(&self) -> bool {
        self.status == 404 || self.status == 410
    }
}

#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<FetchedPage, TaskError>;
}

// ---------------------------------------------------------------------------
// Job postings (relational store owned by the jobs subsystem)
// ---------------------------------------------------------------------------

/// The slice of a job posting the monitor needs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobRecord {
    pub id: String,
    pub url: String,
    /// Hex SHA-256 of the last observed page body.
    pub content_hash: Option<String>,
    pub closed: bool,
}

#[async_trait]
pub trait JobRepository: Send + Sync {
    async fn get_job(&self, job_id: &str) -> Result<Option<JobRecord>, TaskError>;

    async fn record_snapshot(
        &self,
        job_id: &str,
        content_hash: &str,
        observed_at: DateTime<Utc>,
    ) -> Result<(), TaskError>;

    async fn mark_closed(&self, job_id: &str, observed_at: DateTime<Utc>) -> Result<(), TaskError>;
}

// ---------------------------------------------------------------------------
// Content snapshots (object store)
// ---------------------------------------------------------------------------

#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Load the text content of a snapshot, `None` if it does not exist.
    async fn load_snapshot(&self, snapshot_id: &str) -> Result<Option<String>, TaskError>;
}

// ---------------------------------------------------------------------------
// Change analysis (AI inference returning structured output)
// ---------------------------------------------------------------------------

/// Line-level summary of what changed between two snapshots.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContentDiff {
    pub added_lines: Vec<String>,
    pub removed_lines: Vec<String>,
    pub added_count: usize,
    pub removed_count: usize,
    /// Changed lines over total lines on both sides, in `0.0..=1.0`.
    pub change_ratio: f64,
}

impl ContentDiff {
    pub fn is_empty(&self) -> bool {
        self.added_count == 0 && self.removed_count == 0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChangeAnalysisRequest<'a> {
    pub job_id: &'a str,
    pub previous: &'a str,
    pub current: &'a str,
    pub diff: &'a ContentDiff,
}

/// Structured verdict returned by the analyzer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeVerdict {
    pub significant: bool,
    pub summary: String,
    #[serde(default)]
    pub changed_fields: Vec<String>,
}

#[async_trait]
pub trait ChangeAnalyzer: Send + Sync {
    async fn analyze(&self, request: ChangeAnalysisRequest<'_>) -> Result<ChangeVerdict, TaskError>;
}
