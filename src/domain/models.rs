use serde_json::Value;

/// A record tagged with its opaque snapshot key. Key order carries no
/// meaning until the aggregator re-sorts.
#[derive(Debug, Clone, PartialEq)]
pub struct Keyed<T> {
    pub id: String,
    pub record: T,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogAction {
    Login,
    Logout,
    Denied,
    AutoPoweroff,
    Other(String),
}

impl LogAction {
    pub fn from_raw(raw: &str) -> Self {
        match raw {
            "LOGIN" => Self::Login,
            "LOGOUT" => Self::Logout,
            "DENIED" => Self::Denied,
            "AUTO_POWEROFF" => Self::AutoPoweroff,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn label(&self) -> &str {
        match self {
            Self::Login => "LOGIN",
            Self::Logout => "LOGOUT",
            Self::Denied => "DENIED",
            Self::AutoPoweroff => "AUTO_POWEROFF",
            Self::Other(raw) => raw,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionStatus {
    Active,
    Completed,
    Other(String),
}

impl SessionStatus {
    pub fn from_raw(raw: &str) -> Self {
        match raw {
            "active" => Self::Active,
            "completed" => Self::Completed,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn label(&self) -> &str {
        match self {
            Self::Active => "active",
            Self::Completed => "completed",
            Self::Other(raw) => raw,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AccessLogEntry {
    pub action: LogAction,
    pub timestamp_ms: i64,
    pub user_name: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    pub start_time_ms: i64,
    pub end_time_ms: Option<i64>,
    pub duration_secs: Option<i64>,
    pub user_name: String,
    pub energy_wh: Option<f64>,
    pub status: SessionStatus,
    pub end_reason: Option<String>,
}

/// Instantaneous device telemetry. Entirely replaced on each push; no
/// history is retained upstream.
#[derive(Debug, Clone, PartialEq)]
pub struct CurrentStatus {
    pub current_amps: f64,
    pub power_w: f64,
    pub status: String,
    pub last_update_ms: i64,
}

/// Decodes one record out of a subtree snapshot. Implementations must be
/// total: missing or malformed fields are substituted with defaults so a
/// single bad record never drops out of the aggregates.
pub trait FromSnapshot {
    fn from_snapshot(value: &Value) -> Self;
}

impl FromSnapshot for AccessLogEntry {
    fn from_snapshot(value: &Value) -> Self {
        Self {
            action: LogAction::from_raw(&read_string(value, "action")),
            timestamp_ms: read_i64(value, "timestamp"),
            user_name: read_string(value, "userName"),
        }
    }
}

impl FromSnapshot for Session {
    fn from_snapshot(value: &Value) -> Self {
        Self {
            start_time_ms: read_i64(value, "startTime"),
            end_time_ms: read_opt_i64(value, "endTime"),
            duration_secs: read_opt_i64(value, "duration"),
            user_name: read_string(value, "userName"),
            energy_wh: read_opt_f64(value, "energyUsed"),
            status: SessionStatus::from_raw(&read_string(value, "status")),
            end_reason: read_opt_string(value, "endReason"),
        }
    }
}

impl FromSnapshot for CurrentStatus {
    fn from_snapshot(value: &Value) -> Self {
        Self {
            current_amps: read_opt_f64(value, "current").unwrap_or(0.0),
            power_w: read_opt_f64(value, "power").unwrap_or(0.0),
            status: read_string(value, "status"),
            last_update_ms: read_i64(value, "lastUpdate"),
        }
    }
}

fn read_string(value: &Value, field: &str) -> String {
    read_opt_string(value, field).unwrap_or_default()
}

fn read_opt_string(value: &Value, field: &str) -> Option<String> {
    value
        .get(field)
        .and_then(Value::as_str)
        .map(ToString::to_string)
}

fn read_i64(value: &Value, field: &str) -> i64 {
    read_opt_i64(value, field).unwrap_or(0)
}

fn read_opt_i64(value: &Value, field: &str) -> Option<i64> {
    read_opt_f64(value, field).map(|number| number as i64)
}

// The store delivers numbers both as JSON numbers and as numeric strings
// (log timestamps in particular). Anything unparseable reads as absent.
fn read_opt_f64(value: &Value, field: &str) -> Option<f64> {
    match value.get(field)? {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => text.trim().parse::<f64>().ok(),
        _ => None,
    }
}
