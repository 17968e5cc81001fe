//! `workflow_logs` operations.  Rows are append-only.

use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::{models::WorkflowLogRow, store::LogFilter, DbError};

pub async fn insert_log(pool: &PgPool, row: &WorkflowLogRow) -> Result<(), DbError> {
    sqlx::query(
        r#"
        INSERT INTO workflow_logs
            (id, workflow_instance_id, step_id, level, message, data, timestamp)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        "#,
    )
    .bind(row.id)
    .bind(row.workflow_instance_id)
    .bind(row.step_id)
    .bind(&row.level)
    .bind(&row.message)
    .bind(&row.data)
    .bind(row.timestamp)
    .execute(pool)
    .await?;

    Ok(())
}

/// Return one page of matching logs (newest first) and the total count.
pub async fn list_logs(
    pool: &PgPool,
    filter: &LogFilter,
    limit: i64,
    offset: i64,
) -> Result<(Vec<WorkflowLogRow>, i64), DbError> {
    let (total,): (i64,) = sqlx::query_as(
        r#"
        SELECT COUNT(*) FROM workflow_logs
        WHERE workflow_instance_id = $1
          AND ($2::UUID IS NULL OR step_id = $2)
          AND ($3::TEXT IS NULL OR level = $3)
        "#,
    )
    .bind(filter.workflow_instance_id)
    .bind(filter.step_id)
    .bind(&filter.level)
    .fetch_one(pool)
    .await?;

    let rows = sqlx::query_as::<_, WorkflowLogRow>(
        r#"
        SELECT id, workflow_instance_id, step_id, level, message, data, timestamp
        FROM workflow_logs
        WHERE workflow_instance_id = $1
          AND ($2::UUID IS NULL OR step_id = $2)
          AND ($3::TEXT IS NULL OR level = $3)
        ORDER BY timestamp DESC
        LIMIT $4 OFFSET $5
        "#,
    )
    .bind(filter.workflow_instance_id)
    .bind(filter.step_id)
    .bind(&filter.level)
    .bind(limit)
    .bind(offset)
    .fetch_all(pool)
    .await?;

    Ok((rows, total))
}

/// Delete every log older than `cutoff`.
pub async fn delete_logs_before(pool: &PgPool, cutoff: DateTime<Utc>) -> Result<u64, DbError> {
    let result = sqlx::query("DELETE FROM workflow_logs WHERE timestamp < $1")
        .bind(cutoff)
        .execute(pool)
        .await?;

    Ok(result.rows_affected())
}
