//! Job monitoring: re-fetch tracked job postings and detect content changes
//! or closures.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use tracing::{info, warn};

use crate::{JobRepository, PageFetcher, StepLog, TaskBody, TaskError, WorkflowResult};

#[derive(Debug, Clone, Deserialize)]
pub struct JobMonitorConfig {
    pub job_ids: Vec<String>,
    #[serde(default)]
    pub site_id: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobCheckStatus {
    Changed,
    Unchanged,
    Closed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobCheck {
    pub job_id: String,
    pub status: JobCheckStatus,
    #[serde(rename = "hasChanges")]
    pub has_changes: bool,
    pub content_hash: Option<String>,
}

/// Hex SHA-256 of a page body.
pub fn content_hash(body: &str) -> String {
    hex::encode(Sha256::digest(body.as_bytes()))
}

pub struct JobMonitorTask {
    fetcher: Arc<dyn PageFetcher>,
    jobs: Arc<dyn JobRepository>,
}

impl JobMonitorTask {
    pub fn new(fetcher: Arc<dyn PageFetcher>, jobs: Arc<dyn JobRepository>) -> Self {
        Self { fetcher, jobs }
    }

    async fn check_job(&self, job_id: &str, log: &mut StepLog) -> Result<JobCheck, TaskError> {
        let job = self
            .jobs
            .get_job(job_id)
            .await?
            .ok_or_else(|| {
                TaskError::capability("job repository", format!("job '{job_id}' not found"))
            })?;
        log.use_resources(1);

        let page = self.fetcher.fetch(&job.url).await?;
        log.use_resources(1);
        let observed_at = Utc::now();

        if page.is_gone() {
            if !job.closed {
                self.jobs.mark_closed(job_id, observed_at).await?;
            }
            return Ok(JobCheck {
                job_id: job_id.to_string(),
                status: JobCheckStatus::Closed,
                has_changes: !job.closed,
                content_hash: job.content_hash,
            });
        }
        if !page.is_success() {
            return Err(TaskError::capability(
                "browser",
                format!("{} returned HTTP {}", job.url, page.status),
            ));
        }

        let hash = content_hash(&page.body);
        let changed = job.content_hash.as_deref() != Some(hash.as_str());
        if changed {
            self.jobs.record_snapshot(job_id, &hash, observed_at).await?;
        }

        Ok(JobCheck {
            job_id: job_id.to_string(),
            status: if changed {
                JobCheckStatus::Changed
            } else {
                JobCheckStatus::Unchanged
            },
            has_changes: changed,
            content_hash: Some(hash),
        })
    }
}

#[async_trait]
impl TaskBody for JobMonitorTask {
    fn name(&self) -> &'static str {
        "job_monitor"
    }

    async fn execute(&self, config: &Value) -> WorkflowResult {
        let mut log = StepLog::new();

        let config: JobMonitorConfig = match serde_json::from_value(config.clone()) {
            Ok(c) => c,
            Err(e) => {
                let error = format!("invalid job monitor config: {e}");
                return log.finish(false, None, vec![error], vec![]);
            }
        };
        if config.job_ids.is_empty() {
            let error = "job monitor config lists no job_ids".to_string();
            return log.finish(false, None, vec![error], vec![]);
        }

        info!(jobs = config.job_ids.len(), site_id = ?config.site_id, "checking job postings");

        let mut checks = Vec::with_capacity(config.job_ids.len());
        let mut warnings = Vec::new();

        for job_id in &config.job_ids {
            let step = log.begin(format!("check_job:{job_id}"));
            match self.check_job(job_id, &mut log).await {
                Ok(check) => {
                    log.succeed(step);
                    checks.push(check);
                }
                Err(e) => {
                    warn!(job_id = %job_id, error = %e, "job check failed");
                    log.fail(step, e.to_string());
                    warnings.push(format!("job {job_id}: {e}"));
                }
            }
        }

        let ids_with = |status: JobCheckStatus| -> Vec<&str> {
            checks
                .iter()
                .filter(|c| c.status == status)
                .map(|c| c.job_id.as_str())
                .collect()
        };
        let data = json!({
            "site_id": config.site_id,
            "checked": checks.len(),
            "changed": ids_with(JobCheckStatus::Changed),
            "unchanged": ids_with(JobCheckStatus::Unchanged),
            "closed": ids_with(JobCheckStatus::Closed),
            "results": checks,
        });

        // Partial failure is a warning; only a run where nothing could be
        // checked is a failure.
        if checks.is_empty() {
            let errors = std::mem::take(&mut warnings);
            return log.finish(false, Some(data), errors, vec![]);
        }
        log.finish(true, Some(data), vec![], warnings)
    }
}
