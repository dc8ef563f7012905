use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use serde_json::Value;
use thiserror::Error;

use crate::domain::aggregate::{
    CategoryFilter, DailyEnergy, LogTotals, SessionTotals, filter_logs, filter_sessions,
};
use crate::domain::models::{AccessLogEntry, CurrentStatus, Keyed, Session};
use crate::domain::telemetry::TelemetrySample;
use crate::domain::view::{DashboardOverview, DashboardState};

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("dashboard state lock poisoned")]
    StateLockPoisoned,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SessionsView {
    pub totals: SessionTotals,
    pub sessions: Vec<Keyed<Session>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AccessLogView {
    pub totals: LogTotals,
    pub events: Vec<Keyed<AccessLogEntry>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MonitorView {
    pub status: Option<CurrentStatus>,
    pub samples: Vec<TelemetrySample>,
}

/// Read side of the dashboard, consumed by the HTTP layer. Filter and search
/// state is caller-owned and passed per query; the service itself holds only
/// the latest snapshot-derived state.
pub trait DashboardQueryHandler {
    fn overview(&self) -> Result<DashboardOverview, ServiceError>;
    fn sessions(&self, search: &str, category: &CategoryFilter)
    -> Result<SessionsView, ServiceError>;
    fn access_log(
        &self,
        search: &str,
        category: &CategoryFilter,
    ) -> Result<AccessLogView, ServiceError>;
    fn monitor(&self) -> Result<MonitorView, ServiceError>;
    fn daily_energy(&self) -> Result<Vec<DailyEnergy>, ServiceError>;
    fn end_reasons(&self) -> Result<BTreeMap<String, usize>, ServiceError>;
}

/// Shared handle around the one mutable [`DashboardState`]. Snapshot
/// handlers mutate it through the `apply_*` methods; HTTP handlers read
/// cloned view models.
#[derive(Clone)]
pub struct DashboardService {
    state: Arc<Mutex<DashboardState>>,
}

impl DashboardService {
    pub fn new(state: DashboardState) -> Self {
        Self {
            state: Arc::new(Mutex::new(state)),
        }
    }

    fn with_state<T>(
        &self,
        op: impl FnOnce(&mut DashboardState) -> T,
    ) -> Result<T, ServiceError> {
        let mut state = self
            .state
            .lock()
            .map_err(|_| ServiceError::StateLockPoisoned)?;
        Ok(op(&mut state))
    }

    pub fn apply_sessions(
        &self,
        revision: u64,
        snapshot: Option<&Value>,
    ) -> Result<bool, ServiceError> {
        let applied = self.with_state(|state| state.apply_sessions(revision, snapshot))?;
        if applied {
            tracing::debug!(revision, "sessions snapshot applied");
        } else {
            tracing::debug!(revision, "stale sessions snapshot discarded");
        }
        Ok(applied)
    }

    pub fn apply_access_log(
        &self,
        revision: u64,
        snapshot: Option<&Value>,
    ) -> Result<bool, ServiceError> {
        let applied = self.with_state(|state| state.apply_access_log(revision, snapshot))?;
        if applied {
            tracing::debug!(revision, "access log snapshot applied");
        }
        Ok(applied)
    }

    pub fn apply_status(
        &self,
        revision: u64,
        snapshot: Option<&Value>,
        now_ms: i64,
    ) -> Result<bool, ServiceError> {
        let applied = self.with_state(|state| state.apply_status(revision, snapshot, now_ms))?;
        if applied {
            tracing::debug!(revision, "status snapshot applied");
        }
        Ok(applied)
    }
}

impl DashboardQueryHandler for DashboardService {
    fn overview(&self) -> Result<DashboardOverview, ServiceError> {
        self.with_state(|state| state.overview())
    }

    fn sessions(
        &self,
        search: &str,
        category: &CategoryFilter,
    ) -> Result<SessionsView, ServiceError> {
        self.with_state(|state| SessionsView {
            totals: state.session_totals(),
            sessions: filter_sessions(state.sessions(), search, category),
        })
    }

    fn access_log(
        &self,
        search: &str,
        category: &CategoryFilter,
    ) -> Result<AccessLogView, ServiceError> {
        self.with_state(|state| AccessLogView {
            totals: state.log_totals(),
            events: filter_logs(state.access_log(), search, category),
        })
    }

    fn monitor(&self) -> Result<MonitorView, ServiceError> {
        self.with_state(|state| MonitorView {
            status: state.current_status().cloned(),
            samples: state.window().samples().copied().collect(),
        })
    }

    fn daily_energy(&self) -> Result<Vec<DailyEnergy>, ServiceError> {
        self.with_state(|state| state.daily_energy().to_vec())
    }

    fn end_reasons(&self) -> Result<BTreeMap<String, usize>, ServiceError> {
        self.with_state(|state| state.end_reasons().clone())
    }
}
