use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use std::collections::HashMap;
use std::str::FromStr;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::db::queries;
use crate::models::job::{DayRange, JobRecord, JobStatus};

/// Outcome of a conditional status transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// This call moved the job out of `Pending`.
    Applied,
    /// The job had already reached a terminal status; nothing changed.
    AlreadyTerminal(JobStatus),
    /// No record exists for the job.
    Missing,
}

/// An outbox row that has not been cleared yet.
#[derive(Debug, Clone, PartialEq)]
pub struct OutboxEntry {
    pub job_id: Uuid,
    pub payload: String,
    pub status: JobStatus,
}

/// Durable, keyed job records with a per-user creation-time index.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Insert a pending record and its outbox payload in one atomic write.
    async fn create(&self, job: &JobRecord, payload: &str) -> Result<(), StateError>;

    async fn clear_outbox(&self, job_id: Uuid) -> Result<(), StateError>;

    async fn get(&self, job_id: Uuid) -> Result<Option<JobRecord>, StateError>;

    /// Jobs of `user_id` created within `range`, newest first.
    async fn list_for_user(
        &self,
        user_id: &str,
        range: &DayRange,
    ) -> Result<Vec<JobRecord>, StateError>;

    /// `Pending -> Complete`, setting the artifact key. Compare-and-set.
    async fn complete(
        &self,
        job_id: Uuid,
        artifact_key: &str,
        at: DateTime<Utc>,
    ) -> Result<Transition, StateError>;

    /// `Pending -> Failed`. Compare-and-set.
    async fn fail(
        &self,
        job_id: Uuid,
        error: &str,
        at: DateTime<Utc>,
    ) -> Result<Transition, StateError>;

    /// Outbox rows written before `older_than`, oldest first.
    async fn stale_outbox(
        &self,
        older_than: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<OutboxEntry>, StateError>;

    async fn health_check(&self) -> Result<(), StateError>;
}

#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Job {0} already exists")]
    Duplicate(Uuid),

    #[error("Corrupt record: {0}")]
    Corrupt(String),
}

/// Postgres-backed job store.
#[derive(Clone)]
pub struct PgJobStore {
    pool: PgPool,
}

impl PgJobStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn settle(&self, job_id: Uuid, applied: bool) -> Result<Transition, StateError> {
        if applied {
            return Ok(Transition::Applied);
        }
        Ok(match queries::get_job_status(&self.pool, job_id).await? {
            Some(status) => Transition::AlreadyTerminal(status),
            None => Transition::Missing,
        })
    }
}

#[async_trait]
impl JobStore for PgJobStore {
    async fn create(&self, job: &JobRecord, payload: &str) -> Result<(), StateError> {
        queries::create_job_with_outbox(&self.pool, job, payload)
            .await
            .map_err(|e| match e {
                sqlx::Error::Database(ref db) if db.is_unique_violation() => {
                    StateError::Duplicate(job.job_id)
                }
                other => StateError::Database(other),
            })
    }

    async fn clear_outbox(&self, job_id: Uuid) -> Result<(), StateError> {
        Ok(queries::delete_outbox(&self.pool, job_id).await?)
    }

    async fn get(&self, job_id: Uuid) -> Result<Option<JobRecord>, StateError> {
        Ok(queries::get_job(&self.pool, job_id).await?)
    }

    async fn list_for_user(
        &self,
        user_id: &str,
        range: &DayRange,
    ) -> Result<Vec<JobRecord>, StateError> {
        Ok(queries::list_jobs_for_user(&self.pool, user_id, range).await?)
    }

    async fn complete(
        &self,
        job_id: Uuid,
        artifact_key: &str,
        at: DateTime<Utc>,
    ) -> Result<Transition, StateError> {
        let applied = queries::complete_job(&self.pool, job_id, artifact_key, at).await?;
        self.settle(job_id, applied).await
    }

    async fn fail(
        &self,
        job_id: Uuid,
        error: &str,
        at: DateTime<Utc>,
    ) -> Result<Transition, StateError> {
        let applied = queries::fail_job(&self.pool, job_id, error, at).await?;
        self.settle(job_id, applied).await
    }

    async fn stale_outbox(
        &self,
        older_than: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<OutboxEntry>, StateError> {
        queries::get_stale_outbox(&self.pool, older_than, limit)
            .await?
            .into_iter()
            .map(|(job_id, payload, status)| -> Result<OutboxEntry, StateError> {
                let status = JobStatus::from_str(&status)
                    .map_err(|_| StateError::Corrupt(format!("unknown status {status:?}")))?;
                Ok(OutboxEntry {
                    job_id,
                    payload,
                    status,
                })
            })
            .collect()
    }

    async fn health_check(&self) -> Result<(), StateError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

/// In-process job store. Intended for tests and local runs.
#[derive(Default)]
pub struct MemoryJobStore {
    inner: Mutex<MemoryTables>,
}

#[derive(Default)]
struct MemoryTables {
    jobs: HashMap<Uuid, JobRecord>,
    outbox: HashMap<Uuid, (String, DateTime<Utc>)>,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a record without an outbox row.
    pub async fn insert(&self, job: JobRecord) {
        self.inner.lock().await.jobs.insert(job.job_id, job);
    }

    pub async fn outbox_len(&self) -> usize {
        self.inner.lock().await.outbox.len()
    }

    pub async fn job_count(&self) -> usize {
        self.inner.lock().await.jobs.len()
    }

    async fn transition(
        &self,
        job_id: Uuid,
        next: JobStatus,
        apply: impl FnOnce(&mut JobRecord) + Send,
    ) -> Transition {
        let mut tables = self.inner.lock().await;
        match tables.jobs.get_mut(&job_id) {
            None => Transition::Missing,
            Some(job) if !job.status.can_transition_to(next) => {
                Transition::AlreadyTerminal(job.status)
            }
            Some(job) => {
                job.status = next;
                apply(job);
                Transition::Applied
            }
        }
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn create(&self, job: &JobRecord, payload: &str) -> Result<(), StateError> {
        let mut tables = self.inner.lock().await;
        if tables.jobs.contains_key(&job.job_id) {
            return Err(StateError::Duplicate(job.job_id));
        }
        tables.jobs.insert(job.job_id, job.clone());
        tables
            .outbox
            .insert(job.job_id, (payload.to_string(), job.created_at));
        Ok(())
    }

    async fn clear_outbox(&self, job_id: Uuid) -> Result<(), StateError> {
        self.inner.lock().await.outbox.remove(&job_id);
        Ok(())
    }

    async fn get(&self, job_id: Uuid) -> Result<Option<JobRecord>, StateError> {
        Ok(self.inner.lock().await.jobs.get(&job_id).cloned())
    }

    async fn list_for_user(
        &self,
        user_id: &str,
        range: &DayRange,
    ) -> Result<Vec<JobRecord>, StateError> {
        let tables = self.inner.lock().await;
        let mut jobs: Vec<JobRecord> = tables
            .jobs
            .values()
            .filter(|j| j.user_id == user_id && range.contains(j.created_at))
            .cloned()
            .collect();
        jobs.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| b.job_id.cmp(&a.job_id))
        });
        Ok(jobs)
    }

    async fn complete(
        &self,
        job_id: Uuid,
        artifact_key: &str,
        at: DateTime<Utc>,
    ) -> Result<Transition, StateError> {
        let key = artifact_key.to_string();
        Ok(self
            .transition(job_id, JobStatus::Complete, move |job| {
                job.artifact_key = Some(key);
                job.completed_at = Some(at);
            })
            .await)
    }

    async fn fail(
        &self,
        job_id: Uuid,
        error: &str,
        at: DateTime<Utc>,
    ) -> Result<Transition, StateError> {
        let error = error.to_string();
        Ok(self
            .transition(job_id, JobStatus::Failed, move |job| {
                job.error = Some(error);
                job.completed_at = Some(at);
            })
            .await)
    }

    async fn stale_outbox(
        &self,
        older_than: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<OutboxEntry>, StateError> {
        let tables = self.inner.lock().await;
        let mut rows: Vec<(DateTime<Utc>, OutboxEntry)> = tables
            .outbox
            .iter()
            .filter(|(_, (_, created_at))| *created_at < older_than)
            .filter_map(|(job_id, (payload, created_at))| {
                tables.jobs.get(job_id).map(|job| {
                    (
                        *created_at,
                        OutboxEntry {
                            job_id: *job_id,
                            payload: payload.clone(),
                            status: job.status,
                        },
                    )
                })
            })
            .collect();
        rows.sort_by_key(|(created_at, _)| *created_at);
        Ok(rows
            .into_iter()
            .take(usize::try_from(limit).unwrap_or(0))
            .map(|(_, entry)| entry)
            .collect())
    }

    async fn health_check(&self) -> Result<(), StateError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, NaiveDate, TimeZone};

    fn at(h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, h, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn test_complete_is_compare_and_set() {
        let store = MemoryJobStore::new();
        let job = JobRecord::pending(Uuid::new_v4(), "u1", "T", "run", at(9));
        store.create(&job, "{}").await.unwrap();

        let first = store.complete(job.job_id, "u1/2024-05-01/x", at(10)).await.unwrap();
        let second = store.complete(job.job_id, "other", at(11)).await.unwrap();

        assert_eq!(first, Transition::Applied);
        assert_eq!(second, Transition::AlreadyTerminal(JobStatus::Complete));

        let stored = store.get(job.job_id).await.unwrap().unwrap();
        assert_eq!(stored.artifact_key.as_deref(), Some("u1/2024-05-01/x"));
        assert_eq!(stored.completed_at, Some(at(10)));
    }

    #[tokio::test]
    async fn test_fail_never_overrides_complete() {
        let store = MemoryJobStore::new();
        let job = JobRecord::pending(Uuid::new_v4(), "u1", "T", "run", at(9));
        store.create(&job, "{}").await.unwrap();
        store.complete(job.job_id, "k", at(10)).await.unwrap();

        let outcome = store.fail(job.job_id, "boom", at(11)).await.unwrap();
        assert_eq!(outcome, Transition::AlreadyTerminal(JobStatus::Complete));
        let stored = store.get(job.job_id).await.unwrap().unwrap();
        assert_eq!(stored.status, JobStatus::Complete);
        assert_eq!(stored.error, None);
    }

    #[tokio::test]
    async fn test_transition_on_missing_record() {
        let store = MemoryJobStore::new();
        let outcome = store.complete(Uuid::new_v4(), "k", at(10)).await.unwrap();
        assert_eq!(outcome, Transition::Missing);
    }

    #[tokio::test]
    async fn test_create_rejects_duplicate_id() {
        let store = MemoryJobStore::new();
        let job = JobRecord::pending(Uuid::new_v4(), "u1", "T", "run", at(9));
        store.create(&job, "{}").await.unwrap();
        assert!(matches!(
            store.create(&job, "{}").await,
            Err(StateError::Duplicate(id)) if id == job.job_id
        ));
    }

    #[tokio::test]
    async fn test_list_scopes_user_and_day_newest_first() {
        let store = MemoryJobStore::new();
        let early = JobRecord::pending(Uuid::new_v4(), "u1", "a", "run", at(1));
        let late = JobRecord::pending(Uuid::new_v4(), "u1", "b", "run", at(20));
        let yesterday =
            JobRecord::pending(Uuid::new_v4(), "u1", "c", "run", at(1) - Duration::hours(2));
        let other_user = JobRecord::pending(Uuid::new_v4(), "u2", "d", "run", at(5));
        for job in [&early, &late, &yesterday, &other_user] {
            store.create(job, "{}").await.unwrap();
        }

        let day = DayRange::utc(NaiveDate::from_ymd_opt(2024, 5, 1).unwrap());
        let listed = store.list_for_user("u1", &day).await.unwrap();
        let ids: Vec<Uuid> = listed.iter().map(|j| j.job_id).collect();
        assert_eq!(ids, vec![late.job_id, early.job_id]);
    }

    #[tokio::test]
    async fn test_stale_outbox_respects_age_and_limit() {
        let store = MemoryJobStore::new();
        let old = JobRecord::pending(Uuid::new_v4(), "u1", "a", "run", at(1));
        let older = JobRecord::pending(Uuid::new_v4(), "u1", "b", "run", at(0));
        let fresh = JobRecord::pending(Uuid::new_v4(), "u1", "c", "run", at(12));
        for job in [&old, &older, &fresh] {
            store.create(job, &job.name).await.unwrap();
        }

        let stale = store.stale_outbox(at(6), 10).await.unwrap();
        let ids: Vec<Uuid> = stale.iter().map(|e| e.job_id).collect();
        assert_eq!(ids, vec![older.job_id, old.job_id]);
        assert_eq!(stale[0].payload, "b");

        let limited = store.stale_outbox(at(6), 1).await.unwrap();
        assert_eq!(limited.len(), 1);

        store.clear_outbox(older.job_id).await.unwrap();
        assert_eq!(store.outbox_len().await, 2);
    }
}
