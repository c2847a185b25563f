//! Row and domain types for the cast-job pipeline.
//!
//! [`CastJob`] is the one durable entity this crate owns. [`Race`] and
//! [`DriverVote`] are read-only reference rows owned by the surrounding
//! application; only the fields the pipeline depends on appear here.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::FromRow;
use std::fmt;

use crate::errors::UnknownVariant;
use crate::job_key::job_key;

/// Lifecycle state of a [`CastJob`].
///
/// `completed` is terminal; `failed` is terminal only once retries are
/// exhausted (the scheduler can re-arm a failed job when its inputs change).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    /// Waiting for its `scheduled_for` instant.
    Pending,
    /// Exclusively claimed by a dispatcher.
    Processing,
    /// Sent successfully.
    Completed,
    /// Out of retries.
    Failed,
}

impl JobStatus {
    /// The value stored in the `status` column.
    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<String> for JobStatus {
    type Error = UnknownVariant;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.as_str() {
            "pending" => Ok(JobStatus::Pending),
            "processing" => Ok(JobStatus::Processing),
            "completed" => Ok(JobStatus::Completed),
            "failed" => Ok(JobStatus::Failed),
            _ => Err(UnknownVariant {
                what: "job status",
                value,
            }),
        }
    }
}

/// Which builder produces a job's payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CastTemplate {
    /// Reminder that predictions for a race lock soon.
    RaceLockReminder,
    /// Driver of the Day vote summary for a completed race.
    DriverOfDaySummary,
    /// A pre-written cast scheduled as-is.
    Custom,
}

impl CastTemplate {
    /// The value stored in the `template` column and used as the key prefix.
    pub fn as_str(self) -> &'static str {
        match self {
            CastTemplate::RaceLockReminder => "race-lock-reminder",
            CastTemplate::DriverOfDaySummary => "driver-of-day-summary",
            CastTemplate::Custom => "custom",
        }
    }
}

impl fmt::Display for CastTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<String> for CastTemplate {
    type Error = UnknownVariant;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.as_str() {
            "race-lock-reminder" => Ok(CastTemplate::RaceLockReminder),
            "driver-of-day-summary" => Ok(CastTemplate::DriverOfDaySummary),
            "custom" => Ok(CastTemplate::Custom),
            _ => Err(UnknownVariant {
                what: "cast template",
                value,
            }),
        }
    }
}

/// One scheduled (or already processed) attempt to publish a cast.
#[derive(Debug, Clone, FromRow)]
pub struct CastJob {
    /// Unique identifier, assigned on insert.
    pub id: i64,
    /// Which builder produces this job's payload.
    #[sqlx(try_from = "String")]
    pub template: CastTemplate,
    /// Template-specific parameters.
    pub payload_args: Value,
    /// Natural idempotency key derived from `(template, payload_args)`.
    pub job_key: String,
    /// Lifecycle state.
    #[sqlx(try_from = "String")]
    pub status: JobStatus,
    /// Instant after which the job becomes eligible for dispatch.
    pub scheduled_for: DateTime<Utc>,
    /// Claim attempts made so far.
    pub attempt_count: i32,
    /// When the job was last claimed.
    pub last_attempt_at: Option<DateTime<Utc>>,
    /// When the job completed.
    pub completed_at: Option<DateTime<Utc>>,
    /// Optional destination-channel override.
    pub channel_id: Option<String>,
    /// Last failure message; cleared on success or re-arm.
    pub last_error: Option<String>,
    /// Transport response captured for completed jobs.
    pub response_body: Option<Value>,
    /// Row creation time.
    pub created_at: DateTime<Utc>,
    /// Last row update time.
    pub updated_at: DateTime<Utc>,
}

/// The fields callers supply when creating a job; everything else is assigned
/// by the store.
#[derive(Debug, Clone)]
pub struct NewCastJob {
    /// Which builder produces the payload.
    pub template: CastTemplate,
    /// Template-specific parameters.
    pub payload_args: Value,
    /// Natural idempotency key; derive it with [`NewCastJob::new`].
    pub job_key: String,
    /// When the job should fire.
    pub scheduled_for: DateTime<Utc>,
    /// Optional destination-channel override.
    pub channel_id: Option<String>,
}

impl NewCastJob {
    /// Build a new pending job, deriving its natural key.
    pub fn new(
        template: CastTemplate,
        payload_args: Value,
        scheduled_for: DateTime<Utc>,
        channel_id: Option<String>,
    ) -> Self {
        let job_key = job_key(template, &payload_args);
        Self {
            template,
            payload_args,
            job_key,
            scheduled_for,
            channel_id,
        }
    }
}

/// Status of a [`Race`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RaceStatus {
    /// Predictions still open.
    Upcoming,
    /// Predictions locked, race not yet run.
    Locked,
    /// Race finished.
    Completed,
}

impl RaceStatus {
    /// The value stored in the `status` column.
    pub fn as_str(self) -> &'static str {
        match self {
            RaceStatus::Upcoming => "upcoming",
            RaceStatus::Locked => "locked",
            RaceStatus::Completed => "completed",
        }
    }
}

impl TryFrom<String> for RaceStatus {
    type Error = UnknownVariant;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.as_str() {
            "upcoming" => Ok(RaceStatus::Upcoming),
            "locked" => Ok(RaceStatus::Locked),
            "completed" => Ok(RaceStatus::Completed),
            _ => Err(UnknownVariant {
                what: "race status",
                value,
            }),
        }
    }
}

/// A race, as the pipeline sees it. Read-only reference data.
#[derive(Debug, Clone, FromRow)]
pub struct Race {
    /// Race identifier (slug).
    pub id: String,
    /// Display name, e.g. "Monaco Grand Prix".
    pub name: String,
    /// Circuit name, when known.
    pub circuit: Option<String>,
    /// When the race is run.
    pub race_date: Option<DateTime<Utc>>,
    /// Deadline after which predictions can no longer be submitted.
    pub lock_time: Option<DateTime<Utc>>,
    /// Race lifecycle status.
    #[sqlx(try_from = "String")]
    pub status: RaceStatus,
    /// Season year, when known.
    pub season: Option<i32>,
    /// Round number within the season, when known.
    pub round: Option<i32>,
}

/// One Driver of the Day vote. Read-only reference data.
#[derive(Debug, Clone, FromRow)]
pub struct DriverVote {
    /// Race the vote belongs to.
    pub race_id: String,
    /// Farcaster id of the voter.
    pub voter_fid: i64,
    /// Car number of the voted driver.
    pub driver_number: i32,
    /// Driver display name.
    pub driver_name: String,
    /// Team display name.
    pub team: String,
}
