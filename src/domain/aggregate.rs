use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, TimeZone, Utc};

use crate::domain::models::{AccessLogEntry, Keyed, LogAction, Session, SessionStatus};

/// Number of distinct calendar days kept in the daily energy series.
pub const DAILY_ENERGY_DAYS: usize = 7;

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SessionTotals {
    pub count: usize,
    pub active_count: usize,
    pub total_energy_wh: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LogTotals {
    pub login: usize,
    pub logout: usize,
    pub denied: usize,
    pub auto_poweroff: usize,
    pub other: usize,
}

impl LogTotals {
    pub fn total(&self) -> usize {
        self.login + self.logout + self.denied + self.auto_poweroff + self.other
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DailyEnergy {
    pub day: NaiveDate,
    pub total_energy_wh: f64,
}

/// Category side of the AND-combined record filter: the `all` sentinel
/// matches everything, anything else is an exact label match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CategoryFilter {
    All,
    Only(String),
}

impl CategoryFilter {
    pub fn from_raw(raw: &str) -> Self {
        if raw.trim().eq_ignore_ascii_case("all") || raw.trim().is_empty() {
            Self::All
        } else {
            Self::Only(raw.trim().to_string())
        }
    }

    fn matches(&self, label: &str) -> bool {
        match self {
            Self::All => true,
            Self::Only(wanted) => wanted == label,
        }
    }
}

/// Canonical recency ordering for sessions: start time descending, ties
/// broken by the numeric session id descending. The historical id-only
/// ordering of one dashboard variant is intentionally not preserved.
pub fn sort_sessions_by_recency(sessions: &[Keyed<Session>]) -> Vec<Keyed<Session>> {
    let mut sorted = sessions.to_vec();
    sorted.sort_by(|a, b| {
        b.record
            .start_time_ms
            .cmp(&a.record.start_time_ms)
            .then_with(|| numeric_id(&b.id).cmp(&numeric_id(&a.id)))
    });
    sorted
}

pub fn sort_logs_by_recency(logs: &[Keyed<AccessLogEntry>]) -> Vec<Keyed<AccessLogEntry>> {
    let mut sorted = logs.to_vec();
    sorted.sort_by(|a, b| b.record.timestamp_ms.cmp(&a.record.timestamp_ms));
    sorted
}

pub fn session_totals(sessions: &[Keyed<Session>]) -> SessionTotals {
    let mut totals = SessionTotals::default();

    for keyed in sessions {
        totals.count += 1;
        if keyed.record.status == SessionStatus::Active {
            totals.active_count += 1;
        }
        totals.total_energy_wh += keyed.record.energy_wh.unwrap_or(0.0).max(0.0);
    }

    totals
}

pub fn log_totals(logs: &[Keyed<AccessLogEntry>]) -> LogTotals {
    let mut totals = LogTotals::default();

    for keyed in logs {
        match keyed.record.action {
            LogAction::Login => totals.login += 1,
            LogAction::Logout => totals.logout += 1,
            LogAction::Denied => totals.denied += 1,
            LogAction::AutoPoweroff => totals.auto_poweroff += 1,
            LogAction::Other(_) => totals.other += 1,
        }
    }

    totals
}

pub fn filter_sessions(
    sessions: &[Keyed<Session>],
    search: &str,
    category: &CategoryFilter,
) -> Vec<Keyed<Session>> {
    let needle = search.trim().to_lowercase();

    sessions
        .iter()
        .filter(|keyed| category.matches(keyed.record.status.label()))
        .filter(|keyed| {
            needle.is_empty() || keyed.record.user_name.to_lowercase().contains(&needle)
        })
        .cloned()
        .collect()
}

pub fn filter_logs(
    logs: &[Keyed<AccessLogEntry>],
    search: &str,
    category: &CategoryFilter,
) -> Vec<Keyed<AccessLogEntry>> {
    let needle = search.trim().to_lowercase();

    logs.iter()
        .filter(|keyed| category.matches(keyed.record.action.label()))
        .filter(|keyed| {
            needle.is_empty()
                || keyed.record.user_name.to_lowercase().contains(&needle)
                || keyed.record.action.label().to_lowercase().contains(&needle)
        })
        .cloned()
        .collect()
}

/// Sums session energy per calendar day of the session start, keeping at
/// most the most recent [`DAILY_ENERGY_DAYS`] distinct days in chronological
/// order. Days without sessions are not synthesized.
pub fn bucket_energy_by_day<Tz: TimeZone>(
    sessions: &[Keyed<Session>],
    zone: &Tz,
) -> Vec<DailyEnergy> {
    let mut by_day: BTreeMap<NaiveDate, f64> = BTreeMap::new();

    for keyed in sessions {
        let day = DateTime::<Utc>::from_timestamp_millis(keyed.record.start_time_ms)
            .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
            .with_timezone(zone)
            .date_naive();
        *by_day.entry(day).or_insert(0.0) += keyed.record.energy_wh.unwrap_or(0.0).max(0.0);
    }

    let skip = by_day.len().saturating_sub(DAILY_ENERGY_DAYS);
    by_day
        .into_iter()
        .skip(skip)
        .map(|(day, total_energy_wh)| DailyEnergy {
            day,
            total_energy_wh,
        })
        .collect()
}

/// Counts completed-session end reasons. Sessions without a reason are left
/// out entirely rather than bucketed under an unknown label.
pub fn group_by_end_reason(sessions: &[Keyed<Session>]) -> BTreeMap<String, usize> {
    let mut reasons = BTreeMap::new();

    for keyed in sessions {
        if let Some(reason) = &keyed.record.end_reason {
            *reasons.entry(reason.clone()).or_insert(0) += 1;
        }
    }

    reasons
}

/// Human label for elapsed time since a timestamp. A zero or negative
/// timestamp reads as never updated.
pub fn relative_age(timestamp_ms: i64, now_ms: i64) -> String {
    if timestamp_ms <= 0 {
        return "Never".to_string();
    }

    let elapsed_secs = (now_ms - timestamp_ms).max(0) / 1000;

    if elapsed_secs < 60 {
        format!("{elapsed_secs}s ago")
    } else if elapsed_secs < 3600 {
        format!("{}m ago", elapsed_secs / 60)
    } else {
        format!("{}h {}m ago", elapsed_secs / 3600, (elapsed_secs % 3600) / 60)
    }
}

pub fn format_duration(duration_secs: i64) -> String {
    let clamped = duration_secs.max(0);
    format!("{}m {}s", clamped / 60, clamped % 60)
}

fn numeric_id(id: &str) -> i64 {
    id.trim().parse::<i64>().unwrap_or(0)
}
