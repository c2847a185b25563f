//! In-memory adapters for development and tests.
//!
//! These mirror the observable behaviour of the Postgres adapters; the
//! integration tests drive the scheduler and dispatcher through them without
//! needing a database.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use tokio::sync::Mutex;

use super::{JobStore, ReferenceStore};
use crate::backoff::RetryPolicy;
use crate::errors::StoreError;
use crate::schema::{CastJob, DriverVote, JobStatus, NewCastJob, Race, RaceStatus};

struct MemoryJobState {
    jobs: HashMap<i64, CastJob>,
    next_id: i64,
}

/// [`JobStore`] backed by a map behind a mutex.
///
/// All state checks happen under one lock, so [`JobStore::claim`] stays atomic
/// exactly like the conditional update in the Postgres adapter.
pub struct MemoryJobStore {
    state: Mutex<MemoryJobState>,
    retry: RetryPolicy,
}

impl MemoryJobStore {
    /// New empty store with the default retry policy.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MemoryJobState {
                jobs: HashMap::new(),
                next_id: 1,
            }),
            retry: RetryPolicy::default(),
        }
    }

    /// Override the retry policy.
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Snapshot of one job, for inspection.
    pub async fn get(&self, id: i64) -> Option<CastJob> {
        self.state.lock().await.jobs.get(&id).cloned()
    }

    /// Snapshot of all jobs, ordered by id, for inspection.
    pub async fn all(&self) -> Vec<CastJob> {
        let state = self.state.lock().await;
        let mut jobs: Vec<CastJob> = state.jobs.values().cloned().collect();
        jobs.sort_by_key(|job| job.id);
        jobs
    }
}

impl Default for MemoryJobStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn find_by_key(
        &self,
        job_key: &str,
        status: Option<JobStatus>,
    ) -> Result<Option<CastJob>, StoreError> {
        let state = self.state.lock().await;
        let job = state
            .jobs
            .values()
            .filter(|job| job.job_key == job_key)
            .filter(|job| status.is_none_or(|wanted| job.status == wanted))
            .max_by_key(|job| job.id)
            .cloned();

        Ok(job)
    }

    async fn insert(&self, new: NewCastJob) -> Result<CastJob, StoreError> {
        let mut state = self.state.lock().await;

        let live_duplicate = state
            .jobs
            .values()
            .any(|job| job.job_key == new.job_key && job.status != JobStatus::Completed);
        if live_duplicate {
            return Err(StoreError::Conflict {
                job_key: new.job_key,
            });
        }

        let id = state.next_id;
        state.next_id += 1;

        let now = Utc::now();
        let job = CastJob {
            id,
            template: new.template,
            payload_args: new.payload_args,
            job_key: new.job_key,
            status: JobStatus::Pending,
            scheduled_for: new.scheduled_for,
            attempt_count: 0,
            last_attempt_at: None,
            completed_at: None,
            channel_id: new.channel_id,
            last_error: None,
            response_body: None,
            created_at: now,
            updated_at: now,
        };
        state.jobs.insert(id, job.clone());

        Ok(job)
    }

    async fn reschedule(
        &self,
        id: i64,
        scheduled_for: DateTime<Utc>,
        channel_id: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<Option<CastJob>, StoreError> {
        let mut state = self.state.lock().await;
        let Some(job) = state.jobs.get_mut(&id) else {
            return Ok(None);
        };
        if job.status == JobStatus::Completed {
            return Ok(None);
        }

        if job.status == JobStatus::Failed {
            job.status = JobStatus::Pending;
            job.last_error = None;
        }
        job.scheduled_for = scheduled_for;
        job.channel_id = channel_id.map(str::to_owned);
        job.updated_at = now;

        Ok(Some(job.clone()))
    }

    async fn fetch_due(
        &self,
        now: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<CastJob>, StoreError> {
        let state = self.state.lock().await;
        let mut due: Vec<CastJob> = state
            .jobs
            .values()
            .filter(|job| job.status == JobStatus::Pending && job.scheduled_for <= now)
            .cloned()
            .collect();
        due.sort_by_key(|job| job.scheduled_for);
        due.truncate(usize::try_from(limit).unwrap_or(0));

        Ok(due)
    }

    async fn claim(&self, id: i64, now: DateTime<Utc>) -> Result<Option<CastJob>, StoreError> {
        let mut state = self.state.lock().await;
        let Some(job) = state.jobs.get_mut(&id) else {
            return Ok(None);
        };
        if job.status != JobStatus::Pending {
            return Ok(None);
        }

        job.status = JobStatus::Processing;
        job.attempt_count += 1;
        job.last_attempt_at = Some(now);
        job.updated_at = now;

        Ok(Some(job.clone()))
    }

    async fn mark_completed(
        &self,
        id: i64,
        response: &Value,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        if let Some(job) = state.jobs.get_mut(&id) {
            job.status = JobStatus::Completed;
            job.completed_at = Some(now);
            job.response_body = Some(response.clone());
            job.last_error = None;
            job.updated_at = now;
        }

        Ok(())
    }

    async fn mark_failure(
        &self,
        id: i64,
        attempt_count: i32,
        error: &str,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        if let Some(job) = state.jobs.get_mut(&id) {
            if self.retry.is_exhausted(attempt_count) {
                job.status = JobStatus::Failed;
            } else {
                job.status = JobStatus::Pending;
                job.scheduled_for = now + self.retry.delay(attempt_count);
            }
            job.last_error = Some(error.to_owned());
            job.updated_at = now;
        }

        Ok(())
    }
}

struct MemoryReferenceState {
    races: Vec<Race>,
    votes: HashMap<String, Vec<DriverVote>>,
}

/// [`ReferenceStore`] backed by vectors; populate it in tests with
/// [`MemoryReferenceStore::add_race`] and [`MemoryReferenceStore::add_vote`].
pub struct MemoryReferenceStore {
    state: Mutex<MemoryReferenceState>,
}

impl MemoryReferenceStore {
    /// New empty store.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MemoryReferenceState {
                races: Vec::new(),
                votes: HashMap::new(),
            }),
        }
    }

    /// Add a race row.
    pub async fn add_race(&self, race: Race) {
        self.state.lock().await.races.push(race);
    }

    /// Add one vote row.
    pub async fn add_vote(&self, vote: DriverVote) {
        self.state
            .lock()
            .await
            .votes
            .entry(vote.race_id.clone())
            .or_default()
            .push(vote);
    }
}

impl Default for MemoryReferenceStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ReferenceStore for MemoryReferenceStore {
    async fn race_by_id(&self, race_id: &str) -> Result<Option<Race>, StoreError> {
        let state = self.state.lock().await;
        Ok(state.races.iter().find(|race| race.id == race_id).cloned())
    }

    async fn races_with_upcoming_locks(
        &self,
        from: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<Vec<Race>, StoreError> {
        let state = self.state.lock().await;
        let mut races: Vec<Race> = state
            .races
            .iter()
            .filter(|race| {
                matches!(race.status, RaceStatus::Upcoming | RaceStatus::Locked)
                    && race
                        .lock_time
                        .is_some_and(|lock| lock >= from && lock <= until)
            })
            .cloned()
            .collect();
        races.sort_by_key(|race| race.lock_time);

        Ok(races)
    }

    async fn recently_completed_races(&self, limit: i64) -> Result<Vec<Race>, StoreError> {
        let state = self.state.lock().await;
        let mut races: Vec<Race> = state
            .races
            .iter()
            .filter(|race| race.status == RaceStatus::Completed)
            .cloned()
            .collect();
        races.sort_by_key(|race| std::cmp::Reverse(race.race_date));
        races.truncate(usize::try_from(limit).unwrap_or(0));

        Ok(races)
    }

    async fn votes_for_race(&self, race_id: &str) -> Result<Vec<DriverVote>, StoreError> {
        let state = self.state.lock().await;
        Ok(state.votes.get(race_id).cloned().unwrap_or_default())
    }
}
