//! `workflow_steps` and `workflow_executions` operations.
//!
//! A step and its execution are always written together inside one
//! transaction.

use sqlx::PgPool;
use uuid::Uuid;

use crate::{
    models::{WorkflowExecutionRow, WorkflowStepRow},
    store::StepCompletion,
    DbError,
};

const STEP_COLUMNS: &str = "id, workflow_instance_id, name, status, config, started_at, \
    completed_at, error, result, retry_count, max_retries";

const EXECUTION_COLUMNS: &str = "id, workflow_instance_id, step_id, status, started_at, \
    completed_at, error, result, retry_count, execution_time_ms";

/// Insert a step and its paired execution atomically.
pub async fn insert_step_with_execution(
    pool: &PgPool,
    step: &WorkflowStepRow,
    execution: &WorkflowExecutionRow,
) -> Result<(), DbError> {
    let mut tx = pool.begin().await?;

    sqlx::query(
        r#"
        INSERT INTO workflow_steps
            (id, workflow_instance_id, name, status, config, started_at, completed_at,
             error, result, retry_count, max_retries)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
        "#,
    )
    .bind(step.id)
    .bind(step.workflow_instance_id)
    .bind(&step.name)
    .bind(&step.status)
    .bind(&step.config)
    .bind(step.started_at)
    .bind(step.completed_at)
    .bind(&step.error)
    .bind(&step.result)
    .bind(step.retry_count)
    .bind(step.max_retries)
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        r#"
        INSERT INTO workflow_executions
            (id, workflow_instance_id, step_id, status, started_at, completed_at,
             error, result, retry_count, execution_time_ms)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
        "#,
    )
    .bind(execution.id)
    .bind(execution.workflow_instance_id)
    .bind(execution.step_id)
    .bind(&execution.status)
    .bind(execution.started_at)
    .bind(execution.completed_at)
    .bind(&execution.error)
    .bind(&execution.result)
    .bind(execution.retry_count)
    .bind(execution.execution_time_ms)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(())
}

/// Fetch a single step by its primary key.
pub async fn get_step(pool: &PgPool, id: Uuid) -> Result<Option<WorkflowStepRow>, DbError> {
    let row = sqlx::query_as::<_, WorkflowStepRow>(&format!(
        "SELECT {STEP_COLUMNS} FROM workflow_steps WHERE id = $1"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?;

    Ok(row)
}

pub async fn executions_for_step(
    pool: &PgPool,
    step_id: Uuid,
) -> Result<Vec<WorkflowExecutionRow>, DbError> {
    let rows = sqlx::query_as::<_, WorkflowExecutionRow>(&format!(
        "SELECT {EXECUTION_COLUMNS} FROM workflow_executions WHERE step_id = $1 ORDER BY started_at"
    ))
    .bind(step_id)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

pub async fn steps_for_instance(
    pool: &PgPool,
    instance_id: Uuid,
) -> Result<Vec<WorkflowStepRow>, DbError> {
    let rows = sqlx::query_as::<_, WorkflowStepRow>(&format!(
        "SELECT {STEP_COLUMNS} FROM workflow_steps \
         WHERE workflow_instance_id = $1 ORDER BY started_at"
    ))
    .bind(instance_id)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

pub async fn executions_for_instance(
    pool: &PgPool,
    instance_id: Uuid,
) -> Result<Vec<WorkflowExecutionRow>, DbError> {
    let rows = sqlx::query_as::<_, WorkflowExecutionRow>(&format!(
        "SELECT {EXECUTION_COLUMNS} FROM workflow_executions \
         WHERE workflow_instance_id = $1 ORDER BY started_at"
    ))
    .bind(instance_id)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Write the terminal outcome to the step and every execution that
/// references it.  Returns the number of step rows updated.
pub async fn complete_step(pool: &PgPool, completion: &StepCompletion) -> Result<u64, DbError> {
    let mut tx = pool.begin().await?;

    let step = sqlx::query(
        r#"
        UPDATE workflow_steps
        SET status = $2, completed_at = $3, result = $4, error = $5
        WHERE id = $1
        "#,
    )
    .bind(completion.step_id)
    .bind(&completion.status)
    .bind(completion.completed_at)
    .bind(&completion.result)
    .bind(&completion.error)
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        r#"
        UPDATE workflow_executions
        SET status = $2, completed_at = $3, result = $4, error = $5,
            execution_time_ms = (EXTRACT(EPOCH FROM ($3 - started_at)) * 1000)::BIGINT
        WHERE step_id = $1
        "#,
    )
    .bind(completion.step_id)
    .bind(&completion.status)
    .bind(completion.completed_at)
    .bind(&completion.result)
    .bind(&completion.error)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(step.rows_affected())
}
