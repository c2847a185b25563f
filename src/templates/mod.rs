//! Cast payload assembly.
//!
//! Builders are split fetch/render: callers pull race and vote rows through a
//! [`ReferenceStore`](crate::store::ReferenceStore), and the render functions
//! here are pure. The whole assembled text is truncated last — structure is
//! never dropped piecemeal.

pub mod driver_of_day;
pub mod lock_reminder;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::BuildError;
use crate::schema::{CastJob, CastTemplate};

/// Maximum characters per cast; the network rejects longer texts.
pub const MAX_CAST_CHARS: usize = 320;

/// A ready-to-send cast.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CastPayload {
    /// Cast text, at most [`MAX_CAST_CHARS`] characters.
    pub text: String,
    /// Optional link embed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embed_url: Option<String>,
    /// Optional destination channel.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel_id: Option<String>,
}

/// Hard-cut `text` to [`MAX_CAST_CHARS`] characters, ellipsis included, when
/// it would otherwise exceed the limit.
pub fn truncate_cast(text: &str) -> String {
    if text.chars().count() <= MAX_CAST_CHARS {
        return text.to_owned();
    }
    let mut out: String = text.chars().take(MAX_CAST_CHARS - 1).collect();
    out.push('…');
    out
}

/// Arguments for a `race-lock-reminder` job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockReminderArgs {
    /// Race the reminder is about.
    pub race_id: String,
    /// Minutes of warning before the lock.
    pub lead_minutes: i64,
}

/// Arguments for a `driver-of-day-summary` job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriverOfDayArgs {
    /// Race the summary is about.
    pub race_id: String,
}

/// Arguments for a `custom` job: a pre-written cast.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CustomArgs {
    /// Cast text; truncated to the cast limit on build.
    pub text: String,
    /// Optional link embed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embed_url: Option<String>,
    /// Optional destination channel.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel_id: Option<String>,
}

/// Template arguments, validated against the job's template tag.
///
/// Keeping the coercion in one place means a malformed `payload_args` map is
/// caught here, before any reference data is fetched.
#[derive(Debug, Clone)]
pub enum TemplateArgs {
    /// `race-lock-reminder`
    LockReminder(LockReminderArgs),
    /// `driver-of-day-summary`
    DriverOfDay(DriverOfDayArgs),
    /// `custom`
    Custom(CustomArgs),
}

impl TemplateArgs {
    /// Parse a job's `payload_args` against its template tag.
    pub fn from_job(job: &CastJob) -> Result<Self, BuildError> {
        Self::from_parts(job.template, &job.payload_args)
    }

    /// As [`TemplateArgs::from_job`], from the raw parts.
    pub fn from_parts(template: CastTemplate, payload_args: &Value) -> Result<Self, BuildError> {
        match template {
            CastTemplate::RaceLockReminder => serde_json::from_value(payload_args.clone())
                .map(Self::LockReminder)
                .map_err(|source| BuildError::InvalidArgs {
                    template: template.as_str(),
                    source,
                }),
            CastTemplate::DriverOfDaySummary => serde_json::from_value(payload_args.clone())
                .map(Self::DriverOfDay)
                .map_err(|source| BuildError::InvalidArgs {
                    template: template.as_str(),
                    source,
                }),
            CastTemplate::Custom => serde_json::from_value(payload_args.clone())
                .map(Self::Custom)
                .map_err(|source| BuildError::InvalidArgs {
                    template: template.as_str(),
                    source,
                }),
        }
    }
}

/// Build the payload for a pre-written `custom` cast.
pub fn custom_payload(args: &CustomArgs) -> CastPayload {
    CastPayload {
        text: truncate_cast(&args.text),
        embed_url: args.embed_url.clone(),
        channel_id: args.channel_id.clone(),
    }
}
