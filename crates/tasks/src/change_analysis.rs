//! Change analysis: compare two content snapshots of a job posting and ask
//! the AI endpoint whether the change matters.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::{
    ChangeAnalysisRequest, ChangeAnalyzer, ContentDiff, SnapshotStore, StepLog, TaskBody,
    TaskError, WorkflowResult,
};

/// Lines kept per side in the diff sent to the analyzer.
const MAX_DIFF_LINES: usize = 50;

#[derive(Debug, Clone, Deserialize)]
pub struct ChangeAnalysisConfig {
    pub job_id: String,
    pub previous_snapshot_id: String,
    pub current_snapshot_id: String,
}

/// Set-based line diff; blank lines and surrounding whitespace are ignored.
pub fn diff_lines(previous: &str, current: &str) -> ContentDiff {
    let lines = |text: &str| -> Vec<String> {
        text.lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect()
    };
    let before = lines(previous);
    let after = lines(current);
    let before_set: HashSet<&str> = before.iter().map(String::as_str).collect();
    let after_set: HashSet<&str> = after.iter().map(String::as_str).collect();

    let added: Vec<String> = after
        .iter()
        .filter(|l| !before_set.contains(l.as_str()))
        .cloned()
        .collect();
    let removed: Vec<String> = before
        .iter()
        .filter(|l| !after_set.contains(l.as_str()))
        .cloned()
        .collect();

    let total = (before.len() + after.len()).max(1);
    ContentDiff {
        added_count: added.len(),
        removed_count: removed.len(),
        change_ratio: (added.len() + removed.len()) as f64 / total as f64,
        added_lines: added.into_iter().take(MAX_DIFF_LINES).collect(),
        removed_lines: removed.into_iter().take(MAX_DIFF_LINES).collect(),
    }
}

pub struct ChangeAnalysisTask {
    snapshots: Arc<dyn SnapshotStore>,
    analyzer: Arc<dyn ChangeAnalyzer>,
}

impl ChangeAnalysisTask {
    pub fn new(snapshots: Arc<dyn SnapshotStore>, analyzer: Arc<dyn ChangeAnalyzer>) -> Self {
        Self { snapshots, analyzer }
    }

    async fn load(&self, id: &str) -> Result<String, TaskError> {
        self.snapshots
            .load_snapshot(id)
            .await?
            .ok_or_else(|| TaskError::MissingSnapshot(id.to_string()))
    }
}

#[async_trait]
impl TaskBody for ChangeAnalysisTask {
    fn name(&self) -> &'static str {
        "change_analysis"
    }

    async fn execute(&self, config: &Value) -> WorkflowResult {
        let mut log = StepLog::new();

        let config: ChangeAnalysisConfig = match serde_json::from_value(config.clone()) {
            Ok(c) => c,
            Err(e) => {
                let error = format!("invalid change analysis config: {e}");
                return log.finish(false, None, vec![error], vec![]);
            }
        };

        // ------------------------------------------------------------------
        // Load both snapshots.
        // ------------------------------------------------------------------
        let load = log.begin("load_snapshots");
        log.use_resources(2);
        let (previous, current) = match (
            self.load(&config.previous_snapshot_id).await,
            self.load(&config.current_snapshot_id).await,
        ) {
            (Ok(p), Ok(c)) => (p, c),
            (Err(e), _) | (_, Err(e)) => {
                log.fail(load, e.to_string());
                return log.finish(false, None, vec![e.to_string()], vec![]);
            }
        };
        log.succeed(load);

        // ------------------------------------------------------------------
        // Local diff.
        // ------------------------------------------------------------------
        let diff_step = log.begin("diff_content");
        let diff = diff_lines(&previous, &current);
        log.succeed(diff_step);

        if diff.is_empty() {
            info!(job_id = %config.job_id, "snapshots are identical; skipping analysis");
            let data = json!({
                "job_id": config.job_id,
                "has_changes": false,
                "significant": false,
                "summary": "no content changes",
                "diff": diff,
            });
            return log.finish(true, Some(data), vec![], vec![]);
        }

        // ------------------------------------------------------------------
        // AI verdict; on failure fall back to the local diff.
        // ------------------------------------------------------------------
        let analyze = log.begin("analyze_changes");
        log.use_resources(1);
        let request = ChangeAnalysisRequest {
            job_id: &config.job_id,
            previous: &previous,
            current: &current,
            diff: &diff,
        };
        let mut warnings = Vec::new();
        let verdict = match self.analyzer.analyze(request).await {
            Ok(v) => {
                log.succeed(analyze);
                Some(v)
            }
            Err(e) => {
                warn!(job_id = %config.job_id, error = %e, "change analyzer unavailable");
                log.fail(analyze, e.to_string());
                warnings.push(format!("analysis degraded to line diff: {e}"));
                None
            }
        };

        info!(
            job_id = %config.job_id,
            added = diff.added_count,
            removed = diff.removed_count,
            significant = ?verdict.as_ref().map(|v| v.significant),
            "change analysis finished"
        );

        let data = json!({
            "job_id": config.job_id,
            "has_changes": true,
            "significant": verdict.as_ref().map(|v| v.significant),
            "summary": verdict.as_ref().map(|v| v.summary.clone()),
            "changed_fields": verdict.map(|v| v.changed_fields).unwrap_or_default(),
            "diff": diff,
        });
        log.finish(true, Some(data), vec![], warnings)
    }
}
