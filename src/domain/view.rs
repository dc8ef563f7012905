use std::collections::BTreeMap;

use chrono::FixedOffset;
use serde_json::Value;

use crate::domain::aggregate::{
    DailyEnergy, LogTotals, SessionTotals, bucket_energy_by_day, group_by_end_reason, log_totals,
    session_totals, sort_logs_by_recency, sort_sessions_by_recency,
};
use crate::domain::models::{AccessLogEntry, CurrentStatus, Keyed, Session};
use crate::domain::normalize::{normalize_collection, normalize_status};
use crate::domain::telemetry::{TelemetrySample, TelemetryWindow};

pub trait Clock {
    fn now_ms(&self) -> i64;
}

/// Combined headline figures for the overview screen.
#[derive(Debug, Clone, PartialEq)]
pub struct DashboardOverview {
    pub total_sessions: usize,
    pub active_sessions: usize,
    pub total_energy_wh: f64,
    pub current_amps: f64,
    pub power_w: f64,
    pub last_activity_ms: i64,
    pub latest_session: Option<Keyed<Session>>,
}

/// The one owned mutable accumulator of the dashboard: the latest normalized
/// record lists plus every display aggregate, recomputed in full on each
/// applied snapshot. Each subscribed path carries its own monotonically
/// increasing revision; an event at or below the last applied revision is a
/// superseded in-flight snapshot and is discarded, never merged.
#[derive(Debug, Clone)]
pub struct DashboardState {
    zone: FixedOffset,
    sessions: Vec<Keyed<Session>>,
    access_log: Vec<Keyed<AccessLogEntry>>,
    current_status: Option<CurrentStatus>,
    window: TelemetryWindow,
    session_totals: SessionTotals,
    log_totals: LogTotals,
    daily_energy: Vec<DailyEnergy>,
    end_reasons: BTreeMap<String, usize>,
    sessions_rev: u64,
    access_log_rev: u64,
    status_rev: u64,
}

impl DashboardState {
    pub fn new(window_capacity: usize, zone: FixedOffset) -> Self {
        Self {
            zone,
            sessions: Vec::new(),
            access_log: Vec::new(),
            current_status: None,
            window: TelemetryWindow::new(window_capacity),
            session_totals: SessionTotals::default(),
            log_totals: LogTotals::default(),
            daily_energy: Vec::new(),
            end_reasons: BTreeMap::new(),
            sessions_rev: 0,
            access_log_rev: 0,
            status_rev: 0,
        }
    }

    /// Replaces the session list from a pushed snapshot. Returns false when
    /// the event is stale. A null snapshot empties the list; the store sends
    /// null for a subtree with no data.
    pub fn apply_sessions(&mut self, revision: u64, snapshot: Option<&Value>) -> bool {
        if revision <= self.sessions_rev {
            return false;
        }
        self.sessions_rev = revision;

        let normalized = normalize_collection::<Session>(snapshot);
        self.sessions = sort_sessions_by_recency(&normalized);
        self.session_totals = session_totals(&self.sessions);
        self.daily_energy = bucket_energy_by_day(&self.sessions, &self.zone);
        self.end_reasons = group_by_end_reason(&self.sessions);
        true
    }

    pub fn apply_access_log(&mut self, revision: u64, snapshot: Option<&Value>) -> bool {
        if revision <= self.access_log_rev {
            return false;
        }
        self.access_log_rev = revision;

        let normalized = normalize_collection::<AccessLogEntry>(snapshot);
        self.access_log = sort_logs_by_recency(&normalized);
        self.log_totals = log_totals(&self.access_log);
        true
    }

    /// Replaces the status singleton and, when data is present, appends one
    /// telemetry sample stamped with the receipt clock. Session and log
    /// state is untouched either way.
    pub fn apply_status(&mut self, revision: u64, snapshot: Option<&Value>, now_ms: i64) -> bool {
        if revision <= self.status_rev {
            return false;
        }
        self.status_rev = revision;

        self.current_status = normalize_status(snapshot);
        if let Some(status) = &self.current_status {
            self.window.push(TelemetrySample {
                time_ms: now_ms,
                current_amps: status.current_amps,
                power_w: status.power_w,
            });
        }
        true
    }

    pub fn sessions(&self) -> &[Keyed<Session>] {
        &self.sessions
    }

    pub fn access_log(&self) -> &[Keyed<AccessLogEntry>] {
        &self.access_log
    }

    pub fn current_status(&self) -> Option<&CurrentStatus> {
        self.current_status.as_ref()
    }

    pub fn window(&self) -> &TelemetryWindow {
        &self.window
    }

    pub fn session_totals(&self) -> SessionTotals {
        self.session_totals
    }

    pub fn log_totals(&self) -> LogTotals {
        self.log_totals
    }

    pub fn daily_energy(&self) -> &[DailyEnergy] {
        &self.daily_energy
    }

    pub fn end_reasons(&self) -> &BTreeMap<String, usize> {
        &self.end_reasons
    }

    pub fn overview(&self) -> DashboardOverview {
        let latest_session = self.sessions.first().cloned();
        let last_activity_ms = self
            .current_status
            .as_ref()
            .map(|status| status.last_update_ms)
            .filter(|ms| *ms > 0)
            .or_else(|| latest_session.as_ref().map(|keyed| keyed.record.start_time_ms))
            .unwrap_or(0);

        DashboardOverview {
            total_sessions: self.session_totals.count,
            active_sessions: self.session_totals.active_count,
            total_energy_wh: self.session_totals.total_energy_wh,
            current_amps: self
                .current_status
                .as_ref()
                .map_or(0.0, |status| status.current_amps),
            power_w: self
                .current_status
                .as_ref()
                .map_or(0.0, |status| status.power_w),
            last_activity_ms,
            latest_session,
        }
    }
}
