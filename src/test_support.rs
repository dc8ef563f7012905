use serde_json::{Value, json};

use crate::domain::models::{AccessLogEntry, Keyed, LogAction, Session, SessionStatus};

pub fn keyed_session(
    id: &str,
    start_time_ms: i64,
    energy_wh: Option<f64>,
    status: SessionStatus,
) -> Keyed<Session> {
    Keyed {
        id: id.to_string(),
        record: Session {
            start_time_ms,
            end_time_ms: None,
            duration_secs: None,
            user_name: "alice".to_string(),
            energy_wh,
            status,
            end_reason: None,
        },
    }
}

pub fn keyed_log(id: &str, action: &str, timestamp_ms: i64, user_name: &str) -> Keyed<AccessLogEntry> {
    Keyed {
        id: id.to_string(),
        record: AccessLogEntry {
            action: LogAction::from_raw(action),
            timestamp_ms,
            user_name: user_name.to_string(),
        },
    }
}

pub fn session_value(start_time_ms: i64, energy_wh: f64, status: &str) -> Value {
    json!({
        "startTime": start_time_ms,
        "userName": "alice",
        "energyUsed": energy_wh,
        "status": status,
    })
}

pub fn log_value(action: &str, timestamp_ms: i64, user_name: &str) -> Value {
    json!({
        "action": action,
        "timestamp": timestamp_ms.to_string(),
        "userName": user_name,
    })
}

pub fn status_value(current_amps: f64, power_w: f64, status: &str, last_update_ms: i64) -> Value {
    json!({
        "current": current_amps,
        "power": power_w,
        "status": status,
        "lastUpdate": last_update_ms,
    })
}
