//! Job scheduling: make sure the right cast jobs exist, without ever
//! duplicating them.
//!
//! The scheduler is stateless on purpose — every invocation re-derives all of
//! its work from the store, so overlapping or delayed runs converge on the
//! same set of jobs.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tracing::{debug, warn};

use crate::errors::{BuildError, StoreError};
use crate::job_key::job_key;
use crate::schema::{CastTemplate, JobStatus, NewCastJob, Race};
use crate::store::{JobStore, ReferenceStore};
use crate::templates::{DriverOfDayArgs, LockReminderArgs, driver_of_day};

/// Seconds a past-due trigger is pushed into the future so a delayed run
/// still fires it instead of silently skipping it.
const PAST_TRIGGER_GRACE_SECONDS: i64 = 5;

/// Tunables for the scheduling scan.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Lead times, in minutes before the lock, at which reminders fire.
    pub lock_reminder_offsets: Vec<i64>,
    /// Maximum due jobs dispatched per cycle.
    pub dispatch_limit: i64,
    /// How far back the lock scan reaches for races whose lock just passed.
    pub scan_lookback: Duration,
    /// How far ahead the lock scan looks for upcoming races.
    pub scan_lookahead: Duration,
    /// How many recently completed races get Driver of the Day jobs.
    pub completed_scan_limit: i64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            lock_reminder_offsets: vec![1440, 60],
            dispatch_limit: 10,
            scan_lookback: Duration::days(1),
            scan_lookahead: Duration::days(7),
            completed_scan_limit: 5,
        }
    }
}

/// What the ensure-primitive did for one key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnsureOutcome {
    /// A new pending job was created.
    Created,
    /// An existing live or failed job was moved onto the fresh schedule.
    Rescheduled,
    /// The job already ran to completion and was left untouched.
    AlreadyCompleted,
}

/// Idempotent "make sure this job exists" primitive.
///
/// Repeated calls with the same template and args collapse onto one job:
/// completed jobs are frozen, failed jobs are re-armed to `pending` with
/// their error cleared, and live jobs are moved onto the freshly computed
/// schedule.
pub async fn ensure_scheduled_job<J>(
    jobs: &J,
    template: CastTemplate,
    payload_args: serde_json::Value,
    scheduled_for: DateTime<Utc>,
    channel_id: Option<&str>,
    now: DateTime<Utc>,
) -> Result<EnsureOutcome, StoreError>
where
    J: JobStore + ?Sized,
{
    let key = job_key(template, &payload_args);

    match jobs.find_by_key(&key, None).await? {
        Some(existing) if existing.status == JobStatus::Completed => {
            debug!(job.key = %key, "Job already completed, leaving untouched");
            Ok(EnsureOutcome::AlreadyCompleted)
        }
        Some(existing) => {
            jobs.reschedule(existing.id, scheduled_for, channel_id, now)
                .await?;
            debug!(job.id = existing.id, job.key = %key, "Moved existing job onto fresh schedule");
            Ok(EnsureOutcome::Rescheduled)
        }
        None => {
            let new = NewCastJob::new(
                template,
                payload_args,
                scheduled_for,
                channel_id.map(str::to_owned),
            );
            match jobs.insert(new).await {
                Ok(job) => {
                    debug!(job.id = job.id, job.key = %key, "Scheduled new cast job");
                    Ok(EnsureOutcome::Created)
                }
                // A concurrent ensure for the same key got there first; its
                // freshly computed schedule stands.
                Err(StoreError::Conflict { .. }) => Ok(EnsureOutcome::Rescheduled),
                Err(e) => Err(e),
            }
        }
    }
}

/// Ensure one reminder job exists per lead offset for `race`.
///
/// A trigger already in the past is clamped to just ahead of `now`, so a
/// reminder scheduled late (or a race locking imminently) still fires.
pub async fn ensure_lock_reminder_jobs<J>(
    jobs: &J,
    race: &Race,
    offsets: &[i64],
    channel_id: Option<&str>,
    now: DateTime<Utc>,
) -> anyhow::Result<Vec<EnsureOutcome>>
where
    J: JobStore + ?Sized,
{
    let lock_time = race
        .lock_time
        .ok_or_else(|| BuildError::MissingLockTime(race.id.clone()))?;

    let mut outcomes = Vec::with_capacity(offsets.len());
    for &lead_minutes in offsets {
        let trigger_at = lock_time - Duration::minutes(lead_minutes);
        let scheduled_for = if trigger_at <= now {
            now + Duration::seconds(PAST_TRIGGER_GRACE_SECONDS)
        } else {
            trigger_at
        };

        let args = serde_json::to_value(LockReminderArgs {
            race_id: race.id.clone(),
            lead_minutes,
        })?;
        outcomes.push(
            ensure_scheduled_job(
                jobs,
                CastTemplate::RaceLockReminder,
                args,
                scheduled_for,
                channel_id,
                now,
            )
            .await?,
        );
    }

    Ok(outcomes)
}

/// Ensure the Driver of the Day summary job exists for `race`.
///
/// Without an explicit `publish_at`, the default publish instant is computed
/// from the race (see [`driver_of_day::default_publish_at`]).
pub async fn ensure_driver_of_day_job<J>(
    jobs: &J,
    race: &Race,
    publish_at: Option<DateTime<Utc>>,
    channel_id: Option<&str>,
    now: DateTime<Utc>,
) -> anyhow::Result<EnsureOutcome>
where
    J: JobStore + ?Sized,
{
    let scheduled_for = publish_at.unwrap_or_else(|| driver_of_day::default_publish_at(race, now));
    let args = serde_json::to_value(DriverOfDayArgs {
        race_id: race.id.clone(),
    })?;

    Ok(ensure_scheduled_job(
        jobs,
        CastTemplate::DriverOfDaySummary,
        args,
        scheduled_for,
        channel_id,
        now,
    )
    .await?)
}

/// Per-section scan results.
#[derive(Debug, Default, Serialize)]
pub struct ScanSection {
    /// Races this section processed.
    pub races_processed: usize,
    /// Per-race errors; one race failing never aborts the others.
    pub errors: Vec<String>,
}

/// Results of one scheduling scan.
#[derive(Debug, Default, Serialize)]
pub struct ScanReport {
    /// Lock-reminder scheduling over upcoming and locked races.
    pub lock_reminders: ScanSection,
    /// Driver of the Day scheduling over recently completed races.
    pub driver_of_day: ScanSection,
}

/// Scan the reference data and ensure every cast job that should exist, does.
///
/// Never fails: per-race errors are collected into the report.
pub async fn schedule_pending_casts<J, R>(
    jobs: &J,
    refs: &R,
    config: &SchedulerConfig,
    now: DateTime<Utc>,
) -> ScanReport
where
    J: JobStore + ?Sized,
    R: ReferenceStore + ?Sized,
{
    let mut report = ScanReport::default();

    match refs
        .races_with_upcoming_locks(now - config.scan_lookback, now + config.scan_lookahead)
        .await
    {
        Ok(races) => {
            for race in &races {
                report.lock_reminders.races_processed += 1;
                if let Err(error) = ensure_lock_reminder_jobs(
                    jobs,
                    race,
                    &config.lock_reminder_offsets,
                    None,
                    now,
                )
                .await
                {
                    warn!(race.id = %race.id, %error, "Failed to schedule lock reminders");
                    report
                        .lock_reminders
                        .errors
                        .push(format!("{}: {error:#}", race.id));
                }
            }
        }
        Err(error) => {
            warn!(%error, "Failed to scan races for lock reminders");
            report
                .lock_reminders
                .errors
                .push(format!("race scan failed: {error}"));
        }
    }

    match refs.recently_completed_races(config.completed_scan_limit).await {
        Ok(races) => {
            for race in &races {
                report.driver_of_day.races_processed += 1;
                if let Err(error) =
                    ensure_driver_of_day_job(jobs, race, None, None, now).await
                {
                    warn!(race.id = %race.id, %error, "Failed to schedule Driver of the Day summary");
                    report
                        .driver_of_day
                        .errors
                        .push(format!("{}: {error:#}", race.id));
                }
            }
        }
        Err(error) => {
            warn!(%error, "Failed to scan completed races");
            report
                .driver_of_day
                .errors
                .push(format!("race scan failed: {error}"));
        }
    }

    report
}
