//! sqlx/Postgres adapters — the production storage backend.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::PgPool;

use super::{JobStore, ReferenceStore};
use crate::backoff::RetryPolicy;
use crate::errors::StoreError;
use crate::schema::{CastJob, DriverVote, JobStatus, NewCastJob, Race};

/// Run the embedded migrations: the `cast_jobs` table and its indexes.
///
/// The race and vote tables are owned by the surrounding application and are
/// only read here; they are not part of these migrations.
pub async fn setup_database(pool: &PgPool) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("./migrations").run(pool).await
}

/// [`JobStore`] over the Postgres `cast_jobs` table.
///
/// Claiming is a single conditional update on `id AND status = 'pending'`, so
/// exclusivity holds across any number of concurrent invokers without a held
/// transaction or advisory lock.
#[derive(Debug, Clone)]
pub struct PgJobStore {
    pool: PgPool,
    retry: RetryPolicy,
}

impl PgJobStore {
    /// New adapter with the default retry policy.
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            retry: RetryPolicy::default(),
        }
    }

    /// Override the retry policy.
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}

#[async_trait]
impl JobStore for PgJobStore {
    async fn find_by_key(
        &self,
        job_key: &str,
        status: Option<JobStatus>,
    ) -> Result<Option<CastJob>, StoreError> {
        let job = match status {
            Some(status) => {
                sqlx::query_as::<_, CastJob>(
                    r"
                    SELECT * FROM cast_jobs
                    WHERE job_key = $1 AND status = $2
                    ORDER BY id DESC
                    LIMIT 1
                    ",
                )
                .bind(job_key)
                .bind(status.as_str())
                .fetch_optional(&self.pool)
                .await?
            }
            None => {
                sqlx::query_as::<_, CastJob>(
                    "SELECT * FROM cast_jobs WHERE job_key = $1 ORDER BY id DESC LIMIT 1",
                )
                .bind(job_key)
                .fetch_optional(&self.pool)
                .await?
            }
        };

        Ok(job)
    }

    async fn insert(&self, new: NewCastJob) -> Result<CastJob, StoreError> {
        let result = sqlx::query_as::<_, CastJob>(
            r"
            INSERT INTO cast_jobs (template, payload_args, job_key, status, scheduled_for, channel_id)
            VALUES ($1, $2, $3, 'pending', $4, $5)
            RETURNING *
            ",
        )
        .bind(new.template.as_str())
        .bind(&new.payload_args)
        .bind(&new.job_key)
        .bind(new.scheduled_for)
        .bind(&new.channel_id)
        .fetch_one(&self.pool)
        .await;

        match result {
            Ok(job) => Ok(job),
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
                Err(StoreError::Conflict {
                    job_key: new.job_key,
                })
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn reschedule(
        &self,
        id: i64,
        scheduled_for: DateTime<Utc>,
        channel_id: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<Option<CastJob>, StoreError> {
        let job = sqlx::query_as::<_, CastJob>(
            r"
            UPDATE cast_jobs
            SET scheduled_for = $2,
                channel_id = $3,
                last_error = CASE WHEN status = 'failed' THEN NULL ELSE last_error END,
                status = CASE WHEN status = 'failed' THEN 'pending' ELSE status END,
                updated_at = $4
            WHERE id = $1 AND status <> 'completed'
            RETURNING *
            ",
        )
        .bind(id)
        .bind(scheduled_for)
        .bind(channel_id)
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;

        Ok(job)
    }

    async fn fetch_due(
        &self,
        now: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<CastJob>, StoreError> {
        let jobs = sqlx::query_as::<_, CastJob>(
            r"
            SELECT * FROM cast_jobs
            WHERE status = 'pending' AND scheduled_for <= $1
            ORDER BY scheduled_for ASC
            LIMIT $2
            ",
        )
        .bind(now)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(jobs)
    }

    async fn claim(&self, id: i64, now: DateTime<Utc>) -> Result<Option<CastJob>, StoreError> {
        let job = sqlx::query_as::<_, CastJob>(
            r"
            UPDATE cast_jobs
            SET status = 'processing',
                attempt_count = attempt_count + 1,
                last_attempt_at = $2,
                updated_at = $2
            WHERE id = $1 AND status = 'pending'
            RETURNING *
            ",
        )
        .bind(id)
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;

        Ok(job)
    }

    async fn mark_completed(
        &self,
        id: i64,
        response: &Value,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r"
            UPDATE cast_jobs
            SET status = 'completed',
                completed_at = $2,
                response_body = $3,
                last_error = NULL,
                updated_at = $2
            WHERE id = $1
            ",
        )
        .bind(id)
        .bind(now)
        .bind(response)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn mark_failure(
        &self,
        id: i64,
        attempt_count: i32,
        error: &str,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        if self.retry.is_exhausted(attempt_count) {
            sqlx::query(
                "UPDATE cast_jobs SET status = 'failed', last_error = $2, updated_at = $3 WHERE id = $1",
            )
            .bind(id)
            .bind(error)
            .bind(now)
            .execute(&self.pool)
            .await?;
        } else {
            let retry_at = now + self.retry.delay(attempt_count);
            sqlx::query(
                r"
                UPDATE cast_jobs
                SET status = 'pending',
                    scheduled_for = $2,
                    last_error = $3,
                    updated_at = $4
                WHERE id = $1
                ",
            )
            .bind(id)
            .bind(retry_at)
            .bind(error)
            .bind(now)
            .execute(&self.pool)
            .await?;
        }

        Ok(())
    }
}

/// [`ReferenceStore`] over the application's `races` and `driver_of_day_votes`
/// tables.
#[derive(Debug, Clone)]
pub struct PgReferenceStore {
    pool: PgPool,
}

impl PgReferenceStore {
    /// New adapter over the application database.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

const RACE_COLUMNS: &str = "id, name, circuit, race_date, lock_time, status, season, round";

#[async_trait]
impl ReferenceStore for PgReferenceStore {
    async fn race_by_id(&self, race_id: &str) -> Result<Option<Race>, StoreError> {
        let race = sqlx::query_as::<_, Race>(&format!(
            "SELECT {RACE_COLUMNS} FROM races WHERE id = $1"
        ))
        .bind(race_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(race)
    }

    async fn races_with_upcoming_locks(
        &self,
        from: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<Vec<Race>, StoreError> {
        let races = sqlx::query_as::<_, Race>(&format!(
            r"
            SELECT {RACE_COLUMNS} FROM races
            WHERE status IN ('upcoming', 'locked')
              AND lock_time >= $1 AND lock_time <= $2
            ORDER BY lock_time ASC
            "
        ))
        .bind(from)
        .bind(until)
        .fetch_all(&self.pool)
        .await?;

        Ok(races)
    }

    async fn recently_completed_races(&self, limit: i64) -> Result<Vec<Race>, StoreError> {
        let races = sqlx::query_as::<_, Race>(&format!(
            r"
            SELECT {RACE_COLUMNS} FROM races
            WHERE status = 'completed'
            ORDER BY race_date DESC NULLS LAST
            LIMIT $1
            "
        ))
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(races)
    }

    async fn votes_for_race(&self, race_id: &str) -> Result<Vec<DriverVote>, StoreError> {
        let votes = sqlx::query_as::<_, DriverVote>(
            r"
            SELECT race_id, voter_fid, driver_number, driver_name, team
            FROM driver_of_day_votes
            WHERE race_id = $1
            ",
        )
        .bind(race_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(votes)
    }
}
