//! End-to-end tests for `WorkflowEngine` over the in-memory store.
//!
//! Every test builds its own engine, so no shared state and no Postgres.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use db::{models::WorkflowLogRow, MemoryStore};
use serde_json::{json, Value};
use tasks::WorkflowResult;
use uuid::Uuid;

use crate::{
    EngineConfig, EngineError, ListWorkflowsQuery, LogLevel, LogQuery, StepStatus,
    WorkflowEngine, WorkflowStatus, WorkflowType, WorkflowUpdate,
};

fn engine() -> WorkflowEngine {
    WorkflowEngine::new(Arc::new(MemoryStore::new()), EngineConfig::default())
}

async fn create(engine: &WorkflowEngine, workflow_type: WorkflowType) -> Uuid {
    engine
        .create_workflow(workflow_type, None, None, json!({}))
        .await
        .unwrap()
        .id
}

/// Rewrite a stored instance's timestamps directly, bypassing the engine.
async fn backdate(
    engine: &WorkflowEngine,
    id: Uuid,
    created_days_ago: i64,
    completed_days_ago: Option<i64>,
) {
    let now = Utc::now();
    let mut row = engine.store.get_instance(id).await.unwrap().unwrap();
    row.created_at = now - Duration::days(created_days_ago);
    row.completed_at = completed_days_ago.map(|d| now - Duration::days(d));
    assert!(engine.store.replace_instance(&row).await.unwrap());
}

// ============================================================
// Create / get
// ============================================================

#[tokio::test]
async fn created_instance_is_pending_and_config_round_trips() {
    let engine = engine();
    let config_text = r#"{"site_id":"s1","z":[3,2,1],"a":{"nested":true,"b":null},"ratio":0.25}"#;
    let config: Value = serde_json::from_str(config_text).unwrap();

    let created = engine
        .create_workflow(WorkflowType::Discovery, Some("s1".into()), None, config)
        .await
        .unwrap();

    assert_eq!(created.status, WorkflowStatus::Pending);
    assert_eq!(created.progress, 0);
    assert!(created.started_at.is_none());
    assert!(created.completed_at.is_none());
    assert_eq!(created.created_at, created.updated_at);

    let fetched = engine.get_workflow(created.id).await.unwrap().unwrap();
    assert_eq!(serde_json::to_string(&fetched.config).unwrap(), config_text);
    assert_eq!(fetched, created);
}

#[tokio::test]
async fn unknown_id_is_not_found_everywhere() {
    let engine = engine();
    let id = Uuid::new_v4();

    assert!(engine.get_workflow(id).await.unwrap().is_none());
    assert!(engine.start_workflow(id).await.unwrap().is_none());
    assert!(engine
        .complete_workflow(id, WorkflowResult::ok(json!({})))
        .await
        .unwrap()
        .is_none());
    assert!(engine.fail_workflow(id, "boom").await.unwrap().is_none());
    assert!(engine
        .update_workflow(id, WorkflowUpdate::default())
        .await
        .unwrap()
        .is_none());
}

// ============================================================
// Transitions
// ============================================================

#[tokio::test]
async fn start_is_guarded_to_exactly_once() {
    let engine = engine();
    let id = create(&engine, WorkflowType::JobMonitor).await;

    let started = engine.start_workflow(id).await.unwrap().unwrap();
    assert_eq!(started.status, WorkflowStatus::Running);
    assert!(started.started_at.is_some());

    assert!(engine.start_workflow(id).await.unwrap().is_none());
    let stored = engine.get_workflow(id).await.unwrap().unwrap();
    assert_eq!(stored.status, WorkflowStatus::Running);
    assert_eq!(stored.started_at, started.started_at);
    assert_eq!(stored.version, started.version);
}

#[tokio::test]
async fn complete_applies_from_any_prior_state() {
    let engine = engine();
    let result = WorkflowResult::ok(json!({ "checked": 2 }));

    let pending = create(&engine, WorkflowType::Discovery).await;
    let failed = create(&engine, WorkflowType::Discovery).await;
    engine.fail_workflow(failed, "earlier failure").await.unwrap();

    for id in [pending, failed] {
        let done = engine
            .complete_workflow(id, result.clone())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(done.status, WorkflowStatus::Completed);
        assert_eq!(done.progress, 100);
        assert!(done.completed_at.is_some());
        assert_eq!(done.result.as_ref(), Some(&result));
    }
}

#[tokio::test]
async fn fail_records_error_and_completion_time() {
    let engine = engine();
    let id = create(&engine, WorkflowType::ChangeAnalysis).await;
    engine.start_workflow(id).await.unwrap();

    let failed = engine.fail_workflow(id, "boom").await.unwrap().unwrap();
    assert_eq!(failed.status, WorkflowStatus::Failed);
    assert_eq!(failed.error.as_deref(), Some("boom"));
    assert!(failed.completed_at.is_some());
}

#[tokio::test]
async fn progress_above_one_hundred_is_rejected() {
    let engine = engine();
    let id = create(&engine, WorkflowType::Discovery).await;

    let err = engine.set_progress(id, 101, None).await.unwrap_err();
    assert!(matches!(err, EngineError::InvalidArgument(_)));

    let updated = engine
        .set_progress(id, 40, Some("crawl_site".into()))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(updated.progress, 40);
    assert_eq!(updated.current_step.as_deref(), Some("crawl_site"));
    assert!(updated.updated_at >= updated.created_at);
}

// ============================================================
// Concurrency semantics
// ============================================================

#[tokio::test]
async fn unchecked_terminal_writes_are_last_write_wins() {
    let engine = engine();
    let id = create(&engine, WorkflowType::JobMonitor).await;
    engine.start_workflow(id).await.unwrap();

    engine
        .complete_workflow(id, WorkflowResult::ok(json!({})))
        .await
        .unwrap();
    engine.fail_workflow(id, "late failure").await.unwrap();

    let stored = engine.get_workflow(id).await.unwrap().unwrap();
    assert_eq!(stored.status, WorkflowStatus::Failed);
    assert_eq!(stored.error.as_deref(), Some("late failure"));
}

#[tokio::test]
async fn checked_update_rejects_a_stale_version() {
    let engine = engine();
    let id = create(&engine, WorkflowType::Discovery).await;
    let seen = engine.get_workflow(id).await.unwrap().unwrap();

    // Another writer gets in first.
    engine.set_progress(id, 10, None).await.unwrap();

    let err = engine
        .update_workflow_checked(
            id,
            seen.version,
            WorkflowUpdate {
                progress: Some(50),
                ..WorkflowUpdate::default()
            },
        )
        .await
        .unwrap_err();
    match err {
        EngineError::VersionConflict { expected, actual, .. } => {
            assert_eq!(expected, seen.version);
            assert_eq!(actual, seen.version + 1);
        }
        other => panic!("expected a version conflict, got {other:?}"),
    }

    let current = engine.get_workflow(id).await.unwrap().unwrap();
    let written = engine
        .update_workflow_checked(
            id,
            current.version,
            WorkflowUpdate {
                progress: Some(50),
                ..WorkflowUpdate::default()
            },
        )
        .await
        .unwrap()
        .unwrap();
    assert_eq!(written.progress, 50);
    assert_eq!(written.version, current.version + 1);
}

// ============================================================
// Listing
// ============================================================

#[tokio::test]
async fn list_filters_by_type_and_counts_the_full_match_set() {
    let engine = engine();
    for _ in 0..5 {
        create(&engine, WorkflowType::Discovery).await;
    }
    for _ in 0..2 {
        create(&engine, WorkflowType::JobMonitor).await;
    }

    let first = engine
        .list_workflows(ListWorkflowsQuery {
            page: Some(1),
            limit: Some(2),
            workflow_type: Some(WorkflowType::Discovery),
            status: None,
        })
        .await
        .unwrap();
    assert_eq!(first.total, 5);
    assert_eq!(first.workflows.len(), 2);
    assert!(first.has_more);
    assert!(first
        .workflows
        .iter()
        .all(|w| w.workflow_type == WorkflowType::Discovery));

    let last = engine
        .list_workflows(ListWorkflowsQuery {
            page: Some(3),
            limit: Some(2),
            workflow_type: Some(WorkflowType::Discovery),
            status: None,
        })
        .await
        .unwrap();
    assert_eq!(last.workflows.len(), 1);
    assert!(!last.has_more);
}

#[tokio::test]
async fn list_normalises_page_and_limit() {
    let engine = engine();
    for _ in 0..3 {
        create(&engine, WorkflowType::Discovery).await;
    }
    let running = create(&engine, WorkflowType::Discovery).await;
    engine.start_workflow(running).await.unwrap();

    let page = engine
        .list_workflows(ListWorkflowsQuery {
            page: Some(0),
            limit: Some(0),
            ..ListWorkflowsQuery::default()
        })
        .await
        .unwrap();
    assert_eq!(page.page, 1);
    assert_eq!(page.limit, 1);
    assert_eq!(page.workflows.len(), 1);

    let capped = engine
        .list_workflows(ListWorkflowsQuery {
            limit: Some(10_000),
            ..ListWorkflowsQuery::default()
        })
        .await
        .unwrap();
    assert_eq!(capped.limit, EngineConfig::default().max_page_size);

    let by_status = engine
        .list_workflows(ListWorkflowsQuery {
            status: Some(WorkflowStatus::Running),
            ..ListWorkflowsQuery::default()
        })
        .await
        .unwrap();
    assert_eq!(by_status.total, 1);
    assert_eq!(by_status.workflows[0].id, running);
}

// ============================================================
// Steps & executions
// ============================================================

#[tokio::test]
async fn execute_step_opens_paired_running_records() {
    let engine = engine();
    let id = create(&engine, WorkflowType::Discovery).await;

    let handle = engine
        .execute_step(id, "crawl_site", Some(json!({ "depth": 2 })))
        .await
        .unwrap()
        .unwrap();

    assert_eq!(handle.step.status, StepStatus::Running);
    assert_eq!(handle.execution.status, StepStatus::Running);
    assert_eq!(handle.execution.step_id, handle.step.id);
    assert_eq!(handle.step.retry_count, 0);
    assert_eq!(handle.step.max_retries, 3);
    assert!(handle.step.started_at.is_some());

    let instance = engine.get_workflow(id).await.unwrap().unwrap();
    assert_eq!(instance.current_step.as_deref(), Some("crawl_site"));

    assert_eq!(engine.get_steps(id).await.unwrap(), vec![handle.step.clone()]);
    assert_eq!(engine.get_executions(id).await.unwrap(), vec![handle.execution]);
}

#[tokio::test]
async fn execute_step_on_missing_instance_returns_none() {
    let engine = engine();
    assert!(engine
        .execute_step(Uuid::new_v4(), "crawl_site", None)
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn opening_a_step_only_moves_the_step_pointer() {
    let engine = engine();
    let id = create(&engine, WorkflowType::JobMonitor).await;
    engine.start_workflow(id).await.unwrap();
    let done = engine
        .complete_workflow(id, WorkflowResult::default())
        .await
        .unwrap()
        .unwrap();

    engine.execute_step(id, "late_step", None).await.unwrap().unwrap();

    let after = engine.get_workflow(id).await.unwrap().unwrap();
    assert_eq!(after.status, WorkflowStatus::Completed);
    assert_eq!(after.progress, 100);
    assert_eq!(after.completed_at, done.completed_at);
    assert_eq!(after.current_step.as_deref(), Some("late_step"));
    assert_eq!(after.version, done.version + 1);

    let stale = engine
        .update_workflow_checked(
            id,
            done.version,
            WorkflowUpdate {
                current_step: Some("rewound".into()),
                ..WorkflowUpdate::default()
            },
        )
        .await;
    assert!(matches!(stale, Err(EngineError::VersionConflict { .. })));
    assert_eq!(
        engine.get_workflow(id).await.unwrap().unwrap().current_step.as_deref(),
        Some("late_step")
    );
}

#[tokio::test]
async fn complete_step_marks_step_and_execution_together() {
    let engine = engine();
    let id = create(&engine, WorkflowType::ChangeAnalysis).await;
    let ok = engine.execute_step(id, "diff_content", None).await.unwrap().unwrap();
    let bad = engine.execute_step(id, "analyze_changes", None).await.unwrap().unwrap();
    let blank = engine.execute_step(id, "load_snapshots", None).await.unwrap().unwrap();

    assert!(engine
        .complete_step(ok.step.id, Some(json!({ "added": 3 })), None)
        .await
        .unwrap());
    assert!(engine
        .complete_step(bad.step.id, None, Some("rate limited".into()))
        .await
        .unwrap());
    assert!(engine
        .complete_step(blank.step.id, None, Some(String::new()))
        .await
        .unwrap());

    let step = engine.get_step(ok.step.id).await.unwrap().unwrap();
    assert_eq!(step.status, StepStatus::Completed);
    assert_eq!(step.result, Some(json!({ "added": 3 })));
    assert!(step.completed_at.is_some());

    let executions = engine.get_step_executions(bad.step.id).await.unwrap();
    assert_eq!(executions.len(), 1);
    assert_eq!(executions[0].status, StepStatus::Failed);
    assert_eq!(executions[0].error.as_deref(), Some("rate limited"));
    assert!(executions[0].execution_time_ms.is_some());

    let blank_step = engine.get_step(blank.step.id).await.unwrap().unwrap();
    assert_eq!(blank_step.status, StepStatus::Completed);

    assert!(!engine.complete_step(Uuid::new_v4(), None, None).await.unwrap());
}

// ============================================================
// Logs
// ============================================================

#[tokio::test]
async fn logs_are_filtered_and_returned_newest_first() {
    let engine = engine();
    let id = create(&engine, WorkflowType::JobMonitor).await;
    let step = engine.execute_step(id, "check_job:j1", None).await.unwrap().unwrap();

    engine.add_log(id, LogLevel::Info, "started", None, None).await.unwrap();
    engine
        .add_log(id, LogLevel::Warn, "slow fetch", Some(json!({ "ms": 950 })), Some(step.step.id))
        .await
        .unwrap();
    engine.add_log(id, LogLevel::Info, "finished", None, None).await.unwrap();
    engine
        .add_log(Uuid::new_v4(), LogLevel::Info, "other instance", None, None)
        .await
        .unwrap();

    let all = engine.get_logs(LogQuery::for_instance(id)).await.unwrap();
    assert_eq!(all.total, 3);
    assert!(!all.has_more);
    assert!(all.logs.windows(2).all(|w| w[0].timestamp >= w[1].timestamp));

    let info = engine
        .get_logs(LogQuery {
            level: Some(LogLevel::Info),
            limit: Some(1),
            ..LogQuery::for_instance(id)
        })
        .await
        .unwrap();
    assert_eq!(info.total, 2);
    assert_eq!(info.logs.len(), 1);
    assert!(info.has_more);

    let for_step = engine
        .get_logs(LogQuery {
            step_id: Some(step.step.id),
            ..LogQuery::for_instance(id)
        })
        .await
        .unwrap();
    assert_eq!(for_step.total, 1);
    assert_eq!(for_step.logs[0].data, Some(json!({ "ms": 950 })));
}

// ============================================================
// Stats
// ============================================================

#[tokio::test]
async fn stats_over_a_mixed_fixture() {
    let engine = engine();
    let types = [WorkflowType::Discovery, WorkflowType::JobMonitor, WorkflowType::ChangeAnalysis];

    for i in 0..10 {
        let id = create(&engine, types[i % types.len()]).await;
        engine.start_workflow(id).await.unwrap();
        match i {
            0..=5 => {
                engine
                    .complete_workflow(id, WorkflowResult::ok(json!({})))
                    .await
                    .unwrap();
            }
            6..=8 => {
                engine.fail_workflow(id, "boom").await.unwrap();
            }
            _ => {}
        }
    }

    let report = engine.get_stats(Some(7)).await.unwrap();
    let overall = &report.stats.overall;
    assert_eq!(overall.total_workflows, 10);
    assert_eq!(overall.completed_workflows, 6);
    assert_eq!(overall.failed_workflows, 3);
    assert_eq!(overall.running_workflows, 1);
    assert_eq!(overall.success_rate_percentage, 60.0);
    assert_eq!(overall.error_rate_percentage, 30.0);
    assert!(overall.average_duration_ms >= 0.0);

    let sum: u64 = report.stats.by_type.values().map(|b| b.total_workflows).sum();
    assert_eq!(sum, 10);
    assert_eq!(report.period.end - report.period.start, Duration::days(7));
}

#[tokio::test]
async fn stats_window_excludes_old_instances() {
    let engine = engine();
    let old = create(&engine, WorkflowType::Discovery).await;
    backdate(&engine, old, 10, None).await;
    create(&engine, WorkflowType::Discovery).await;

    let report = engine.get_stats(Some(7)).await.unwrap();
    assert_eq!(report.stats.overall.total_workflows, 1);
}

#[tokio::test]
async fn stats_window_beyond_the_calendar_counts_everything() {
    let engine = engine();
    let old = create(&engine, WorkflowType::Discovery).await;
    backdate(&engine, old, 4000, None).await;
    create(&engine, WorkflowType::ChangeAnalysis).await;

    let report = engine.get_stats(Some(u32::MAX)).await.unwrap();
    assert_eq!(report.stats.overall.total_workflows, 2);
    assert_eq!(report.period.start, DateTime::<Utc>::UNIX_EPOCH);
}

// ============================================================
// Retention
// ============================================================

#[tokio::test]
async fn cleanup_with_an_oversized_window_deletes_nothing() {
    let engine = engine();
    let id = create(&engine, WorkflowType::JobMonitor).await;
    engine.fail_workflow(id, "boom").await.unwrap();
    backdate(&engine, id, 400, Some(400)).await;

    let report = engine.cleanup_old_data(Some(u32::MAX)).await.unwrap();
    assert_eq!(report.cutoff, DateTime::<Utc>::UNIX_EPOCH);
    assert_eq!(report.instances_deleted, 0);
    assert_eq!(report.logs_deleted, 0);
    assert!(engine.get_workflow(id).await.unwrap().is_some());
}

#[tokio::test]
async fn cleanup_prunes_only_old_terminal_instances_and_old_logs() {
    let engine = engine();

    let old_done = create(&engine, WorkflowType::JobMonitor).await;
    engine
        .complete_workflow(old_done, WorkflowResult::ok(json!({})))
        .await
        .unwrap();
    engine.execute_step(old_done, "check_job:j1", None).await.unwrap();
    backdate(&engine, old_done, 41, Some(40)).await;

    let old_running = create(&engine, WorkflowType::JobMonitor).await;
    engine.start_workflow(old_running).await.unwrap();
    backdate(&engine, old_running, 40, None).await;

    let recent_done = create(&engine, WorkflowType::JobMonitor).await;
    engine
        .complete_workflow(recent_done, WorkflowResult::ok(json!({})))
        .await
        .unwrap();
    backdate(&engine, recent_done, 6, Some(5)).await;

    // An aged log on a surviving instance is still pruned by age.
    engine
        .store
        .insert_log(&WorkflowLogRow {
            id: Uuid::new_v4(),
            workflow_instance_id: old_running,
            step_id: None,
            level: "info".into(),
            message: "queued".into(),
            data: None,
            timestamp: Utc::now() - Duration::days(40),
        })
        .await
        .unwrap();
    engine
        .add_log(old_running, LogLevel::Info, "still going", None, None)
        .await
        .unwrap();

    let report = engine.cleanup_old_data(Some(30)).await.unwrap();
    assert_eq!(report.instances_deleted, 1);
    assert_eq!(report.logs_deleted, 1);

    assert!(engine.get_workflow(old_done).await.unwrap().is_none());
    assert!(engine.get_steps(old_done).await.unwrap().is_empty());
    assert!(engine.get_workflow(old_running).await.unwrap().is_some());
    assert!(engine.get_workflow(recent_done).await.unwrap().is_some());

    let logs = engine.get_logs(LogQuery::for_instance(old_running)).await.unwrap();
    assert_eq!(logs.total, 1);
    assert_eq!(logs.logs[0].message, "still going");
}

// ============================================================
// Scenario
// ============================================================

#[tokio::test]
async fn job_monitor_run_through_the_step_api() {
    let engine = engine();

    let x = engine
        .create_workflow(
            WorkflowType::JobMonitor,
            None,
            Some("j1".into()),
            json!({ "job_ids": ["j1"] }),
        )
        .await
        .unwrap();

    let running = engine.start_workflow(x.id).await.unwrap().unwrap();
    assert_eq!(running.status, WorkflowStatus::Running);

    let s = engine
        .execute_step(x.id, "checkJobChanges", None)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(s.step.status, StepStatus::Running);

    assert!(engine
        .complete_step(s.step.id, Some(json!({ "hasChanges": false })), None)
        .await
        .unwrap());
    let step = engine.get_step(s.step.id).await.unwrap().unwrap();
    assert_eq!(step.status, StepStatus::Completed);

    let done = engine
        .complete_workflow(x.id, WorkflowResult::ok(json!({ "checked": 1 })))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(done.status, WorkflowStatus::Completed);
    assert_eq!(done.progress, 100);
    assert!(done.result.unwrap().success);
}
