//! Due-job dispatch: claim, build, send, record.
//!
//! Jobs run serially within one invocation — one in-flight call to the cast
//! API at a time, oldest `scheduled_for` first. Concurrency across
//! invocations is handled entirely by the store's atomic claim; losing that
//! race is a silent skip, not an error.

use std::panic::AssertUnwindSafe;

use chrono::{DateTime, Utc};
use futures_util::FutureExt;
use serde::Serialize;
use serde_json::Value;
use tracing::{Instrument, debug, info_span, warn};

use crate::errors::BuildError;
use crate::schema::{CastJob, Race};
use crate::store::{JobStore, ReferenceStore};
use crate::templates::{self, CastPayload, TemplateArgs, driver_of_day, lock_reminder};
use crate::transport::CastClient;
use crate::util::try_to_extract_panic_info;

/// Counts for one dispatch pass.
#[derive(Debug, Default, PartialEq, Eq, Serialize)]
pub struct DispatchSummary {
    /// Jobs dispatched successfully.
    pub sent: usize,
    /// Jobs that failed and were queued for retry (or gave up).
    pub failed: usize,
    /// Jobs that were not ready yet, or lost the claim race.
    pub skipped: usize,
    /// Due jobs this pass looked at.
    pub jobs_considered: usize,
}

/// What a single job's dispatch attempt produced.
enum Dispatch {
    /// Sent; the captured receipt to store.
    Sent(Value),
    /// Valid but not ready; retry later via backoff.
    NotReady(&'static str),
}

/// A built payload plus the vote total, when the template has one.
pub(crate) struct BuiltCast {
    pub(crate) payload: CastPayload,
    pub(crate) vote_total: Option<u32>,
}

/// Fetch reference data for `args` and render the cast.
pub(crate) async fn build_cast<R>(
    refs: &R,
    args: &TemplateArgs,
    base_url: &str,
) -> anyhow::Result<BuiltCast>
where
    R: ReferenceStore + ?Sized,
{
    match args {
        TemplateArgs::LockReminder(args) => {
            let race = require_race(refs, &args.race_id).await?;
            Ok(BuiltCast {
                payload: lock_reminder::render(&race, args.lead_minutes, base_url, None)?,
                vote_total: None,
            })
        }
        TemplateArgs::DriverOfDay(args) => {
            let race = require_race(refs, &args.race_id).await?;
            let votes = refs.votes_for_race(&args.race_id).await?;
            let summary = driver_of_day::render(&race, &votes, base_url, None);
            Ok(BuiltCast {
                payload: summary.payload,
                vote_total: Some(summary.total_votes),
            })
        }
        TemplateArgs::Custom(args) => Ok(BuiltCast {
            payload: templates::custom_payload(args),
            vote_total: None,
        }),
    }
}

async fn require_race<R>(refs: &R, race_id: &str) -> anyhow::Result<Race>
where
    R: ReferenceStore + ?Sized,
{
    Ok(refs
        .race_by_id(race_id)
        .await?
        .ok_or_else(|| BuildError::RaceNotFound(race_id.to_owned()))?)
}

/// Build the payload for one claimed job and send it.
async fn process_job<R>(
    job: &CastJob,
    refs: &R,
    casts: &CastClient,
    base_url: &str,
) -> anyhow::Result<Dispatch>
where
    R: ReferenceStore + ?Sized,
{
    let args = TemplateArgs::from_job(job)?;
    let built = build_cast(refs, &args, base_url).await?;

    // A vote-less summary is not an error but is not ready either; backoff
    // re-checks it once votes have accumulated.
    if built.vote_total == Some(0) {
        return Ok(Dispatch::NotReady("no votes yet"));
    }

    let mut payload = built.payload;
    if payload.channel_id.is_none() {
        payload.channel_id = job.channel_id.clone();
    }

    let receipt = casts.post(&payload).await?;
    Ok(Dispatch::Sent(serde_json::to_value(&receipt)?))
}

enum JobOutcome {
    Sent,
    Failed,
    Skipped,
    NotClaimed,
}

async fn dispatch_job<J, R>(
    job: &CastJob,
    jobs: &J,
    refs: &R,
    casts: &CastClient,
    base_url: &str,
    now: DateTime<Utc>,
) -> JobOutcome
where
    J: JobStore + ?Sized,
    R: ReferenceStore + ?Sized,
{
    let claimed = match jobs.claim(job.id, now).await {
        Ok(Some(claimed)) => claimed,
        Ok(None) => {
            debug!("Job already claimed by another invoker, skipping");
            return JobOutcome::NotClaimed;
        }
        Err(error) => {
            warn!(%error, "Failed to claim job");
            return JobOutcome::NotClaimed;
        }
    };

    debug!("Dispatching job…");

    let result = AssertUnwindSafe(process_job(&claimed, refs, casts, base_url))
        .catch_unwind()
        .await
        .map_err(|e| try_to_extract_panic_info(&*e))
        .and_then(std::convert::identity);

    match result {
        Ok(Dispatch::Sent(response)) => {
            debug!("Job sent, marking completed");
            if let Err(error) = jobs.mark_completed(claimed.id, &response, now).await {
                warn!(%error, "Failed to record completed job");
            }
            JobOutcome::Sent
        }
        Ok(Dispatch::NotReady(reason)) => {
            debug!(reason, "Job not ready yet, leaving it to backoff");
            if let Err(error) = jobs
                .mark_failure(claimed.id, claimed.attempt_count, reason, now)
                .await
            {
                warn!(%error, "Failed to record not-ready job");
            }
            JobOutcome::Skipped
        }
        Err(error) => {
            warn!("Failed to dispatch job: {error:#}");
            if let Err(store_error) = jobs
                .mark_failure(claimed.id, claimed.attempt_count, &format!("{error:#}"), now)
                .await
            {
                warn!(%store_error, "Failed to record failed job");
            }
            JobOutcome::Failed
        }
    }
}

/// Dispatch up to `limit` due jobs, serially, oldest first.
pub async fn dispatch_due_jobs<J, R>(
    jobs: &J,
    refs: &R,
    casts: &CastClient,
    base_url: &str,
    limit: i64,
    now: DateTime<Utc>,
) -> DispatchSummary
where
    J: JobStore + ?Sized,
    R: ReferenceStore + ?Sized,
{
    let mut summary = DispatchSummary::default();

    let due = match jobs.fetch_due(now, limit).await {
        Ok(due) => due,
        Err(error) => {
            warn!(%error, "Failed to fetch due jobs");
            return summary;
        }
    };

    for job in due {
        summary.jobs_considered += 1;

        let span = info_span!("job", job.id = job.id, job.template = %job.template);
        let outcome = dispatch_job(&job, jobs, refs, casts, base_url, now)
            .instrument(span)
            .await;

        match outcome {
            JobOutcome::Sent => summary.sent += 1,
            JobOutcome::Failed => summary.failed += 1,
            JobOutcome::Skipped => summary.skipped += 1,
            JobOutcome::NotClaimed => {}
        }
    }

    summary
}
