use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use std::str::FromStr;
use uuid::Uuid;

use crate::models::job::{DayRange, JobRecord, JobStatus};

const JOB_COLUMNS: &str =
    "job_id, user_id, status, name, action, created_at, artifact_key, completed_at, error";

fn job_from_row(row: &PgRow) -> Result<JobRecord, sqlx::Error> {
    let status_str: String = row.try_get("status")?;
    let status = JobStatus::from_str(&status_str).map_err(|e| sqlx::Error::ColumnDecode {
        index: "status".to_string(),
        source: Box::new(e),
    })?;

    Ok(JobRecord {
        job_id: row.try_get("job_id")?,
        user_id: row.try_get("user_id")?,
        status,
        name: row.try_get("name")?,
        action: row.try_get("action")?,
        created_at: row.try_get("created_at")?,
        artifact_key: row.try_get("artifact_key")?,
        completed_at: row.try_get("completed_at")?,
        error: row.try_get("error")?,
    })
}

/// Insert a new pending job together with its outbox row, atomically.
pub async fn create_job_with_outbox(
    pool: &PgPool,
    job: &JobRecord,
    payload: &str,
) -> Result<(), sqlx::Error> {
    let mut tx = pool.begin().await?;

    sqlx::query(
        r#"
        INSERT INTO jobs (job_id, user_id, status, name, action, created_at)
        VALUES ($1, $2, $3, $4, $5, $6)
        "#,
    )
    .bind(job.job_id)
    .bind(&job.user_id)
    .bind(job.status.to_string())
    .bind(&job.name)
    .bind(&job.action)
    .bind(job.created_at)
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        r#"
        INSERT INTO job_outbox (job_id, payload, created_at)
        VALUES ($1, $2, $3)
        "#,
    )
    .bind(job.job_id)
    .bind(payload)
    .bind(job.created_at)
    .execute(&mut *tx)
    .await?;

    tx.commit().await
}

/// Remove the outbox row once its message has been published.
pub async fn delete_outbox(pool: &PgPool, job_id: Uuid) -> Result<(), sqlx::Error> {
    sqlx::query("DELETE FROM job_outbox WHERE job_id = $1")
        .bind(job_id)
        .execute(pool)
        .await?;
    Ok(())
}

/// Get a job by ID
pub async fn get_job(pool: &PgPool, job_id: Uuid) -> Result<Option<JobRecord>, sqlx::Error> {
    let row = sqlx::query(&format!("SELECT {JOB_COLUMNS} FROM jobs WHERE job_id = $1"))
        .bind(job_id)
        .fetch_optional(pool)
        .await?;

    row.as_ref().map(job_from_row).transpose()
}

/// Jobs owned by `user_id` created within `range`, newest first.
pub async fn list_jobs_for_user(
    pool: &PgPool,
    user_id: &str,
    range: &DayRange,
) -> Result<Vec<JobRecord>, sqlx::Error> {
    let rows = sqlx::query(&format!(
        r#"
        SELECT {JOB_COLUMNS}
        FROM jobs
        WHERE user_id = $1
          AND created_at >= $2
          AND created_at < $3
        ORDER BY created_at DESC, job_id DESC
        "#
    ))
    .bind(user_id)
    .bind(range.start)
    .bind(range.end)
    .fetch_all(pool)
    .await?;

    rows.iter().map(job_from_row).collect()
}

/// Move a pending job to COMPLETE. Returns false when the row was not pending.
pub async fn complete_job(
    pool: &PgPool,
    job_id: Uuid,
    artifact_key: &str,
    completed_at: DateTime<Utc>,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        r#"
        UPDATE jobs
        SET status = 'COMPLETE',
            artifact_key = $2,
            completed_at = $3
        WHERE job_id = $1
          AND status = 'PENDING'
        "#,
    )
    .bind(job_id)
    .bind(artifact_key)
    .bind(completed_at)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() == 1)
}

/// Move a pending job to FAILED. Returns false when the row was not pending.
pub async fn fail_job(
    pool: &PgPool,
    job_id: Uuid,
    error: &str,
    failed_at: DateTime<Utc>,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        r#"
        UPDATE jobs
        SET status = 'FAILED',
            error = $2,
            completed_at = $3
        WHERE job_id = $1
          AND status = 'PENDING'
        "#,
    )
    .bind(job_id)
    .bind(error)
    .bind(failed_at)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() == 1)
}

/// Current status of a job, if it exists.
pub async fn get_job_status(pool: &PgPool, job_id: Uuid) -> Result<Option<JobStatus>, sqlx::Error> {
    let row = sqlx::query("SELECT status FROM jobs WHERE job_id = $1")
        .bind(job_id)
        .fetch_optional(pool)
        .await?;

    match row {
        Some(r) => {
            let status_str: String = r.try_get("status")?;
            JobStatus::from_str(&status_str)
                .map(Some)
                .map_err(|e| sqlx::Error::ColumnDecode {
                    index: "status".to_string(),
                    source: Box::new(e),
                })
        }
        None => Ok(None),
    }
}

/// Outbox rows created before `older_than`, oldest first, with their job's status.
pub async fn get_stale_outbox(
    pool: &PgPool,
    older_than: DateTime<Utc>,
    limit: i64,
) -> Result<Vec<(Uuid, String, String)>, sqlx::Error> {
    let rows = sqlx::query(
        r#"
        SELECT o.job_id, o.payload, j.status
        FROM job_outbox o
        JOIN jobs j ON j.job_id = o.job_id
        WHERE o.created_at < $1
        ORDER BY o.created_at ASC
        LIMIT $2
        "#,
    )
    .bind(older_than)
    .bind(limit)
    .fetch_all(pool)
    .await?;

    rows.into_iter()
        .map(|r| -> Result<(Uuid, String, String), sqlx::Error> {
            Ok((r.try_get("job_id")?, r.try_get("payload")?, r.try_get("status")?))
        })
        .collect()
}
