//! Race lock reminder casts.

use chrono::{DateTime, Utc};

use super::{CastPayload, truncate_cast};
use crate::errors::BuildError;
use crate::schema::Race;

/// Render the lock reminder for `race`.
///
/// Fails when the race has no lock time to announce.
pub fn render(
    race: &Race,
    lead_minutes: i64,
    base_url: &str,
    channel_id: Option<&str>,
) -> Result<CastPayload, BuildError> {
    let lock_time = race
        .lock_time
        .ok_or_else(|| BuildError::MissingLockTime(race.id.clone()))?;

    let mut text = format!(
        "⏰ Predictions for {} lock in {}!\nLock time: {}",
        race.name,
        format_lead(lead_minutes),
        format_lock_instant(lock_time),
    );
    if let Some(context) = context_line(race) {
        text.push('\n');
        text.push_str(&context);
    }
    text.push_str("\nMake your picks before the deadline 🏁");

    Ok(CastPayload {
        text: truncate_cast(&text),
        embed_url: Some(race_url(base_url, &race.id)),
        channel_id: channel_id.map(str::to_owned),
    })
}

/// `"24h"`, `"1.5h"` or `"45m"`.
fn format_lead(minutes: i64) -> String {
    if minutes >= 60 {
        if minutes % 60 == 0 {
            format!("{}h", minutes / 60)
        } else {
            format!("{:.1}h", minutes as f64 / 60.0)
        }
    } else {
        format!("{minutes}m")
    }
}

/// `"6:05 PM UTC"`.
fn format_lock_instant(at: DateTime<Utc>) -> String {
    at.format("%-I:%M %p UTC").to_string()
}

/// `"Season 2026, Round 7 · Circuit de Monaco"` — only the parts that exist.
fn context_line(race: &Race) -> Option<String> {
    let mut parts = Vec::new();
    if let Some(season) = race.season {
        parts.push(format!("Season {season}"));
    }
    if let Some(round) = race.round {
        parts.push(format!("Round {round}"));
    }
    let mut line = parts.join(", ");
    if let Some(circuit) = &race.circuit {
        if line.is_empty() {
            line = circuit.clone();
        } else {
            line = format!("{line} · {circuit}");
        }
    }

    if line.is_empty() { None } else { Some(line) }
}

/// Public page for a race.
pub(crate) fn race_url(base_url: &str, race_id: &str) -> String {
    format!("{}/races/{}", base_url.trim_end_matches('/'), race_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::RaceStatus;
    use chrono::TimeZone;

    fn monaco() -> Race {
        Race {
            id: "monaco-2026".to_owned(),
            name: "Monaco Grand Prix".to_owned(),
            circuit: Some("Circuit de Monaco".to_owned()),
            race_date: Some(Utc.with_ymd_and_hms(2026, 5, 24, 13, 0, 0).unwrap()),
            lock_time: Some(Utc.with_ymd_and_hms(2026, 5, 24, 12, 30, 0).unwrap()),
            status: RaceStatus::Upcoming,
            season: Some(2026),
            round: Some(7),
        }
    }

    #[test]
    fn renders_lead_lock_instant_and_context() {
        let payload = render(&monaco(), 60, "https://gridcast.xyz", None).unwrap();
        assert!(payload.text.contains("Monaco Grand Prix lock in 1h!"));
        assert!(payload.text.contains("Lock time: 12:30 PM UTC"));
        assert!(
            payload
                .text
                .contains("Season 2026, Round 7 · Circuit de Monaco")
        );
        assert_eq!(
            payload.embed_url.as_deref(),
            Some("https://gridcast.xyz/races/monaco-2026")
        );
    }

    #[test]
    fn context_line_is_dropped_when_nothing_is_known() {
        let mut race = monaco();
        race.circuit = None;
        race.season = None;
        race.round = None;
        let payload = render(&race, 60, "https://gridcast.xyz", None).unwrap();
        assert!(!payload.text.contains("Season"));
        assert!(!payload.text.contains("·"));
    }

    #[test]
    fn missing_lock_time_is_an_error() {
        let mut race = monaco();
        race.lock_time = None;
        let err = render(&race, 60, "https://gridcast.xyz", None).unwrap_err();
        assert!(err.to_string().contains("no lock time"));
    }

    #[test]
    fn channel_is_passed_through() {
        let payload = render(&monaco(), 60, "https://gridcast.xyz", Some("racing")).unwrap();
        assert_eq!(payload.channel_id.as_deref(), Some("racing"));
    }

    #[test]
    fn lead_formats_hours_and_minutes() {
        assert_eq!(format_lead(1440), "24h");
        assert_eq!(format_lead(90), "1.5h");
        assert_eq!(format_lead(60), "1h");
        assert_eq!(format_lead(45), "45m");
    }

    #[test]
    fn lock_instant_is_twelve_hour_utc() {
        let morning = Utc.with_ymd_and_hms(2026, 5, 24, 9, 5, 0).unwrap();
        assert_eq!(format_lock_instant(morning), "9:05 AM UTC");
        let evening = Utc.with_ymd_and_hms(2026, 5, 24, 18, 0, 0).unwrap();
        assert_eq!(format_lock_instant(evening), "6:00 PM UTC");
    }
}
