//! The externally triggered pipeline entry point, plus admin one-off sends.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;

use crate::dispatcher::{self, DispatchSummary};
use crate::scheduler::{self, EnsureOutcome, ScanReport, SchedulerConfig};
use crate::schema::CastTemplate;
use crate::store::{JobStore, ReferenceStore};
use crate::templates::{CustomArgs, TemplateArgs};
use crate::transport::{
    CastClient, CastReceipt, NotificationClient, NotificationContent, NotificationFilters,
    NotificationReceipt,
};

/// Default public page the casts link back to.
const DEFAULT_BASE_URL: &str = "https://gridcast.xyz";

/// Everything one scheduler trigger did.
#[derive(Debug, Serialize)]
pub struct CycleSummary {
    /// Jobs ensured by the scheduling scan.
    pub scheduled: ScanReport,
    /// Due jobs dispatched this cycle.
    pub dispatched: DispatchSummary,
}

/// Wires stores, transports and configuration into the cast pipeline.
///
/// One call to [`Runner::run_cycle`] handles one external trigger. No state
/// carries over between cycles — every invocation re-derives its work from
/// the store, so overlapping triggers are safe.
pub struct Runner<J, R> {
    jobs: J,
    refs: R,
    casts: CastClient,
    notifications: Option<NotificationClient>,
    config: SchedulerConfig,
    base_url: String,
}

impl<J, R> Runner<J, R>
where
    J: JobStore,
    R: ReferenceStore,
{
    /// Create a runner with default configuration.
    pub fn new(jobs: J, refs: R, casts: CastClient) -> Self {
        Self {
            jobs,
            refs,
            casts,
            notifications: None,
            config: SchedulerConfig::default(),
            base_url: DEFAULT_BASE_URL.to_owned(),
        }
    }

    /// Attach a notification client for admin pushes.
    pub fn with_notifications(mut self, notifications: NotificationClient) -> Self {
        self.notifications = Some(notifications);
        self
    }

    /// Override the scheduling tunables.
    pub fn with_config(mut self, config: SchedulerConfig) -> Self {
        self.config = config;
        self
    }

    /// Override the public base URL casts link back to.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Run one full cycle: ensure lock-reminder and Driver of the Day jobs,
    /// then dispatch due jobs up to the per-run cap.
    ///
    /// Partial failures are collected into the summary, never raised.
    pub async fn run_cycle(&self) -> CycleSummary {
        self.run_cycle_at(Utc::now()).await
    }

    /// As [`Runner::run_cycle`], evaluated at an explicit instant.
    pub async fn run_cycle_at(&self, now: DateTime<Utc>) -> CycleSummary {
        let scheduled =
            scheduler::schedule_pending_casts(&self.jobs, &self.refs, &self.config, now).await;
        let dispatched = dispatcher::dispatch_due_jobs(
            &self.jobs,
            &self.refs,
            &self.casts,
            &self.base_url,
            self.config.dispatch_limit,
            now,
        )
        .await;

        info!(
            sent = dispatched.sent,
            failed = dispatched.failed,
            skipped = dispatched.skipped,
            "Cast cycle finished"
        );

        CycleSummary {
            scheduled,
            dispatched,
        }
    }

    /// Schedule a pre-written cast through the normal job queue.
    ///
    /// Deduplicated by the same natural key as scheduler-created jobs, so
    /// submitting the same text twice yields one job.
    pub async fn schedule_custom_cast(
        &self,
        args: CustomArgs,
        scheduled_for: DateTime<Utc>,
    ) -> anyhow::Result<EnsureOutcome> {
        let channel_id = args.channel_id.clone();
        let payload_args = serde_json::to_value(&args)?;

        Ok(scheduler::ensure_scheduled_job(
            &self.jobs,
            CastTemplate::Custom,
            payload_args,
            scheduled_for,
            channel_id.as_deref(),
            Utc::now(),
        )
        .await?)
    }

    /// Build a cast and send it immediately, bypassing the job queue.
    ///
    /// Admin path: errors propagate to the caller instead of entering the
    /// backoff cycle — the admin can simply resubmit.
    pub async fn send_cast_now(
        &self,
        args: TemplateArgs,
        channel_id: Option<&str>,
    ) -> anyhow::Result<CastReceipt> {
        let built = dispatcher::build_cast(&self.refs, &args, &self.base_url).await?;

        let mut payload = built.payload;
        if payload.channel_id.is_none() {
            payload.channel_id = channel_id.map(str::to_owned);
        }

        Ok(self.casts.post(&payload).await?)
    }

    /// Send a push notification immediately.
    pub async fn send_notification_now(
        &self,
        content: &NotificationContent,
        target_fids: Option<&[u64]>,
        filters: Option<&NotificationFilters>,
        campaign_id: Option<&str>,
    ) -> anyhow::Result<NotificationReceipt> {
        let Some(notifications) = &self.notifications else {
            anyhow::bail!("no notification client configured");
        };

        Ok(notifications
            .publish(content, target_fids, filters, campaign_id)
            .await?)
    }
}
