//! Driver of the Day summary casts.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use super::lock_reminder::race_url;
use super::{CastPayload, truncate_cast};
use crate::schema::{DriverVote, Race};

/// Fixed footer appended to every summary.
const HASHTAG_FOOTER: &str = "#F1 #DriverOfTheDay";

/// How many ranked drivers the summary shows.
const TOP_N: usize = 3;

/// Days after the lock (or race date) at which the summary publishes.
const PUBLISH_DELAY_DAYS: i64 = 4;

/// UTC hour at which the summary publishes.
const PUBLISH_HOUR_UTC: u32 = 18;

/// One ranked driver in a tally.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TallyEntry {
    /// Car number.
    pub driver_number: i32,
    /// Driver display name.
    pub driver_name: String,
    /// Team display name.
    pub team: String,
    /// Votes received.
    pub votes: u32,
    /// Share of the total, rounded to a whole percent; 0 when there are no
    /// votes at all.
    pub percentage: u32,
}

/// Ranked Driver of the Day votes for one race.
#[derive(Debug, Clone, Default, Serialize)]
pub struct VoteTally {
    /// Entries sorted by votes descending (car number breaks ties).
    pub entries: Vec<TallyEntry>,
    /// Total votes cast.
    pub total: u32,
}

/// Tally raw vote rows into a ranked list.
pub fn tally_votes(votes: &[DriverVote]) -> VoteTally {
    let mut grouped: HashMap<i32, TallyEntry> = HashMap::new();
    for vote in votes {
        grouped
            .entry(vote.driver_number)
            .or_insert_with(|| TallyEntry {
                driver_number: vote.driver_number,
                driver_name: vote.driver_name.clone(),
                team: vote.team.clone(),
                votes: 0,
                percentage: 0,
            })
            .votes += 1;
    }

    let total = votes.len() as u32;
    let mut entries: Vec<TallyEntry> = grouped.into_values().collect();
    for entry in &mut entries {
        entry.percentage = if total == 0 {
            0
        } else {
            (f64::from(entry.votes) * 100.0 / f64::from(total)).round() as u32
        };
    }
    entries.sort_by(|a, b| {
        b.votes
            .cmp(&a.votes)
            .then(a.driver_number.cmp(&b.driver_number))
    });

    VoteTally { entries, total }
}

/// A rendered summary plus the raw vote total the dispatcher inspects.
#[derive(Debug, Clone)]
pub struct DriverOfDaySummary {
    /// The cast to send.
    pub payload: CastPayload,
    /// Votes behind the summary; 0 means "not ready yet".
    pub total_votes: u32,
}

/// Render the summary for `race` from raw vote rows.
pub fn render(
    race: &Race,
    votes: &[DriverVote],
    base_url: &str,
    channel_id: Option<&str>,
) -> DriverOfDaySummary {
    let tally = tally_votes(votes);

    let mut text = format!("🏆 Driver of the Day — {}\n", race.name);
    if tally.entries.is_empty() {
        text.push_str("No votes yet\n");
    } else {
        for (i, entry) in tally.entries.iter().take(TOP_N).enumerate() {
            text.push_str(&format!(
                "{}. #{} {} ({}) - {}% ({})\n",
                i + 1,
                entry.driver_number,
                entry.driver_name,
                entry.team,
                entry.percentage,
                entry.votes,
            ));
        }
    }
    text.push_str(&format!("{} votes cast\n{HASHTAG_FOOTER}", tally.total));

    DriverOfDaySummary {
        payload: CastPayload {
            text: truncate_cast(&text),
            embed_url: Some(race_url(base_url, &race.id)),
            channel_id: channel_id.map(str::to_owned),
        },
        total_votes: tally.total,
    }
}

/// Default publish instant for a race's summary: four days after the lock
/// (falling back to the race date) at 18:00 UTC, or two days from `now` when
/// the race has neither timestamp.
pub fn default_publish_at(race: &Race, now: DateTime<Utc>) -> DateTime<Utc> {
    let date = match race.lock_time.or(race.race_date) {
        Some(base) => (base + Duration::days(PUBLISH_DELAY_DAYS)).date_naive(),
        None => (now + Duration::days(2)).date_naive(),
    };

    date.and_hms_opt(PUBLISH_HOUR_UTC, 0, 0)
        .map(|at| at.and_utc())
        .unwrap_or(now + Duration::days(2))
}
