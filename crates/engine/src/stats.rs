//! Rollups over a window of instances, overall and per workflow type.

use chrono::Utc;
use tracing::instrument;

use crate::{
    convert::convert_all,
    models::{
        StatsBucket, StatsPeriod, StatsReport, WorkflowInstance, WorkflowStats, WorkflowStatus,
        WorkflowType,
    },
    service::days_before,
    EngineError, WorkflowEngine,
};

fn percentage(part: u64, total: u64) -> f64 {
    if total == 0 {
        0.0
    } else {
        part as f64 / total as f64 * 100.0
    }
}

/// Wall-clock duration of a finished instance.  Instances that never went
/// through `start_workflow` are measured from creation.
fn duration_ms(instance: &WorkflowInstance) -> Option<i64> {
    let completed = instance.completed_at?;
    let started = instance.started_at.unwrap_or(instance.created_at);
    Some((completed - started).num_milliseconds())
}

fn bucket<'a>(instances: impl IntoIterator<Item = &'a WorkflowInstance>) -> StatsBucket {
    let mut bucket = StatsBucket::default();
    let mut durations_total = 0i64;
    let mut durations_seen = 0u64;

    for instance in instances {
        bucket.total_workflows += 1;
        match instance.status {
            WorkflowStatus::Running => bucket.running_workflows += 1,
            WorkflowStatus::Completed => bucket.completed_workflows += 1,
            WorkflowStatus::Failed => bucket.failed_workflows += 1,
            WorkflowStatus::Pending | WorkflowStatus::Cancelled => {}
        }
        if let Some(ms) = duration_ms(instance) {
            durations_total += ms;
            durations_seen += 1;
        }
    }

    if durations_seen > 0 {
        bucket.average_duration_ms = durations_total as f64 / durations_seen as f64;
    }
    bucket.success_rate_percentage = percentage(bucket.completed_workflows, bucket.total_workflows);
    bucket.error_rate_percentage = percentage(bucket.failed_workflows, bucket.total_workflows);
    bucket
}

/// Aggregate `instances` into overall and per-type buckets.  Every workflow
/// type gets a bucket, empty or not.
pub fn aggregate(instances: &[WorkflowInstance]) -> WorkflowStats {
    let by_type = WorkflowType::ALL
        .into_iter()
        .map(|t| (t, bucket(instances.iter().filter(|i| i.workflow_type == t))))
        .collect();

    WorkflowStats {
        overall: bucket(instances),
        by_type,
    }
}

impl WorkflowEngine {
    /// Stats over instances created within the last `period_days` days.
    #[instrument(skip(self))]
    pub async fn get_stats(&self, period_days: Option<u32>) -> Result<StatsReport, EngineError> {
        let days = period_days.unwrap_or(self.config.default_stats_period_days);
        let end = Utc::now();
        let start = days_before(end, days);

        let rows = self.store.instances_created_between(start, end).await?;
        let instances: Vec<WorkflowInstance> = convert_all(rows)?;

        Ok(StatsReport {
            stats: aggregate(&instances),
            period: StatsPeriod { start, end },
        })
    }
}
