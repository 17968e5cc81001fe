//! `workflow_instances` operations.

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::{models::WorkflowInstanceRow, store::InstanceFilter, DbError};

const COLUMNS: &str = "id, workflow_type, status, site_id, job_id, config, current_step, \
    progress, started_at, completed_at, created_at, updated_at, error, result, version";

/// Insert a freshly created instance.
pub async fn insert_instance(pool: &PgPool, row: &WorkflowInstanceRow) -> Result<(), DbError> {
    sqlx::query(
        r#"
        INSERT INTO workflow_instances
            (id, workflow_type, status, site_id, job_id, config, current_step, progress,
             started_at, completed_at, created_at, updated_at, error, result, version)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
        "#,
    )
    .bind(row.id)
    .bind(&row.workflow_type)
    .bind(&row.status)
    .bind(&row.site_id)
    .bind(&row.job_id)
    .bind(&row.config)
    .bind(&row.current_step)
    .bind(row.progress)
    .bind(row.started_at)
    .bind(row.completed_at)
    .bind(row.created_at)
    .bind(row.updated_at)
    .bind(&row.error)
    .bind(&row.result)
    .bind(row.version)
    .execute(pool)
    .await?;

    Ok(())
}

/// Fetch a single instance by its primary key.
pub async fn get_instance(pool: &PgPool, id: Uuid) -> Result<Option<WorkflowInstanceRow>, DbError> {
    let row = sqlx::query_as::<_, WorkflowInstanceRow>(&format!(
        "SELECT {COLUMNS} FROM workflow_instances WHERE id = $1"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?;

    Ok(row)
}

/// Overwrite every mutable column.  When `expected_version` is set the write
/// only lands if the stored version still matches.
///
/// Returns `true` if a row was updated.
pub async fn replace_instance(
    pool: &PgPool,
    row: &WorkflowInstanceRow,
    expected_version: Option<i64>,
) -> Result<bool, DbError> {
    let result = sqlx::query(
        r#"
        UPDATE workflow_instances
        SET workflow_type = $2, status = $3, site_id = $4, job_id = $5, config = $6,
            current_step = $7, progress = $8, started_at = $9, completed_at = $10,
            created_at = $11, updated_at = $12, error = $13, result = $14, version = $15
        WHERE id = $1 AND ($16::BIGINT IS NULL OR version = $16)
        "#,
    )
    .bind(row.id)
    .bind(&row.workflow_type)
    .bind(&row.status)
    .bind(&row.site_id)
    .bind(&row.job_id)
    .bind(&row.config)
    .bind(&row.current_step)
    .bind(row.progress)
    .bind(row.started_at)
    .bind(row.completed_at)
    .bind(row.created_at)
    .bind(row.updated_at)
    .bind(&row.error)
    .bind(&row.result)
    .bind(row.version)
    .bind(expected_version)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Targeted pointer write; the other columns keep whatever a concurrent
/// writer stored.
pub async fn set_current_step(
    pool: &PgPool,
    id: Uuid,
    step_name: &str,
    updated_at: DateTime<Utc>,
) -> Result<bool, DbError> {
    let result = sqlx::query(
        r#"
        UPDATE workflow_instances
        SET current_step = $2, updated_at = $3, version = version + 1
        WHERE id = $1
        "#,
    )
    .bind(id)
    .bind(step_name)
    .bind(updated_at)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Return one page of matching instances (newest first) and the total count.
pub async fn list_instances(
    pool: &PgPool,
    filter: &InstanceFilter,
    limit: i64,
    offset: i64,
) -> Result<(Vec<WorkflowInstanceRow>, i64), DbError> {
    let (total,): (i64,) = sqlx::query_as(
        r#"
        SELECT COUNT(*) FROM workflow_instances
        WHERE ($1::TEXT IS NULL OR workflow_type = $1)
          AND ($2::TEXT IS NULL OR status = $2)
        "#,
    )
    .bind(&filter.workflow_type)
    .bind(&filter.status)
    .fetch_one(pool)
    .await?;

    let rows = sqlx::query_as::<_, WorkflowInstanceRow>(&format!(
        r#"
        SELECT {COLUMNS} FROM workflow_instances
        WHERE ($1::TEXT IS NULL OR workflow_type = $1)
          AND ($2::TEXT IS NULL OR status = $2)
        ORDER BY created_at DESC, id DESC
        LIMIT $3 OFFSET $4
        "#
    ))
    .bind(&filter.workflow_type)
    .bind(&filter.status)
    .bind(limit)
    .bind(offset)
    .fetch_all(pool)
    .await?;

    Ok((rows, total))
}

/// Return every instance created inside `[start, end]`.
pub async fn instances_created_between(
    pool: &PgPool,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> Result<Vec<WorkflowInstanceRow>, DbError> {
    let rows = sqlx::query_as::<_, WorkflowInstanceRow>(&format!(
        "SELECT {COLUMNS} FROM workflow_instances WHERE created_at >= $1 AND created_at <= $2"
    ))
    .bind(start)
    .bind(end)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Delete terminal instances finished before `cutoff`.  Steps and executions
/// go with them through `ON DELETE CASCADE`.
pub async fn delete_finished_before(pool: &PgPool, cutoff: DateTime<Utc>) -> Result<u64, DbError> {
    let result = sqlx::query(
        r#"
        DELETE FROM workflow_instances
        WHERE status IN ('completed', 'failed') AND completed_at < $1
        "#,
    )
    .bind(cutoff)
    .execute(pool)
    .await?;

    Ok(result.rows_affected())
}
