//! Storage seams for the cast-job pipeline.
//!
//! Every operation goes straight to the backing store; nothing is cached in
//! process. The queue has to survive restarts and tolerate overlapping
//! invocations, and the only cross-invocation coordination point is
//! [`JobStore::claim`].

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::errors::StoreError;
use crate::schema::{CastJob, DriverVote, JobStatus, NewCastJob, Race};

/// Durable storage for [`CastJob`] rows.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Latest job matching `job_key`, optionally filtered by status.
    async fn find_by_key(
        &self,
        job_key: &str,
        status: Option<JobStatus>,
    ) -> Result<Option<CastJob>, StoreError>;

    /// Insert a new `pending` job.
    ///
    /// Returns [`StoreError::Conflict`] when a live (non-completed) job with
    /// the same key already exists.
    async fn insert(&self, new: NewCastJob) -> Result<CastJob, StoreError>;

    /// Move an existing job to a fresh `scheduled_for` and `channel_id`.
    ///
    /// A `failed` job is re-armed to `pending` with its `last_error` cleared.
    /// `completed` jobs are never touched. Returns the updated row, or `None`
    /// when the job no longer exists or is `completed`.
    async fn reschedule(
        &self,
        id: i64,
        scheduled_for: DateTime<Utc>,
        channel_id: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<Option<CastJob>, StoreError>;

    /// Pending jobs whose `scheduled_for` has passed, oldest first, capped at
    /// `limit`.
    async fn fetch_due(
        &self,
        now: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<CastJob>, StoreError>;

    /// Atomically claim a pending job: `pending -> processing`, conditional on
    /// the row still being `pending`. Bumps `attempt_count` and stamps
    /// `last_attempt_at`.
    ///
    /// Returns `None` when another invoker won the race — not an error.
    async fn claim(&self, id: i64, now: DateTime<Utc>) -> Result<Option<CastJob>, StoreError>;

    /// Record a successful dispatch: `completed`, with the transport response
    /// captured and `last_error` cleared. Terminal.
    async fn mark_completed(
        &self,
        id: i64,
        response: &Value,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    /// Record a failed dispatch attempt: re-queue `pending` with a
    /// backoff-delayed `scheduled_for` while attempts remain, otherwise mark
    /// the job terminally `failed`.
    async fn mark_failure(
        &self,
        id: i64,
        attempt_count: i32,
        error: &str,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError>;
}

/// Read-only access to the race and vote reference data owned by the
/// surrounding application.
#[async_trait]
pub trait ReferenceStore: Send + Sync {
    /// Look up one race.
    async fn race_by_id(&self, race_id: &str) -> Result<Option<Race>, StoreError>;

    /// Upcoming or locked races whose lock time falls inside the window.
    async fn races_with_upcoming_locks(
        &self,
        from: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<Vec<Race>, StoreError>;

    /// Most recently completed races, newest first.
    async fn recently_completed_races(&self, limit: i64) -> Result<Vec<Race>, StoreError>;

    /// All Driver of the Day votes for a race, one row per vote.
    async fn votes_for_race(&self, race_id: &str) -> Result<Vec<DriverVote>, StoreError>;
}
