use serde_json::Value;

use crate::domain::models::{CurrentStatus, FromSnapshot, Keyed};

/// Turns one subtree snapshot (opaque key -> record object) into an ordered
/// list of keyed records. An absent or null snapshot normalizes to an empty
/// list, never an error, and records are never dropped: malformed fields are
/// defaulted inside the `FromSnapshot` impls so totals do not silently
/// undercount.
pub fn normalize_collection<T: FromSnapshot>(snapshot: Option<&Value>) -> Vec<Keyed<T>> {
    let Some(Value::Object(entries)) = snapshot else {
        return Vec::new();
    };

    entries
        .iter()
        .map(|(id, value)| Keyed {
            id: id.clone(),
            record: T::from_snapshot(value),
        })
        .collect()
}

/// The current-status subtree is a singleton object, not a collection.
pub fn normalize_status(snapshot: Option<&Value>) -> Option<CurrentStatus> {
    match snapshot {
        Some(value @ Value::Object(_)) => Some(CurrentStatus::from_snapshot(value)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use serde_json::{Value, json};

    use crate::domain::models::{AccessLogEntry, Session, SessionStatus};

    use super::{normalize_collection, normalize_status};

    #[test]
    fn output_length_matches_key_count() {
        let snapshot = json!({
            "1": { "startTime": 100, "status": "completed" },
            "2": { "startTime": 200, "status": "active" },
            "3": { "startTime": 300, "status": "completed" }
        });

        let sessions = normalize_collection::<Session>(Some(&snapshot));

        assert_eq!(sessions.len(), 3);
    }

    #[test]
    fn absent_snapshot_normalizes_to_empty_list() {
        assert!(normalize_collection::<Session>(None).is_empty());
        assert!(normalize_collection::<Session>(Some(&Value::Null)).is_empty());
    }

    #[test]
    fn non_object_snapshot_normalizes_to_empty_list() {
        let snapshot = json!([1, 2, 3]);

        assert!(normalize_collection::<AccessLogEntry>(Some(&snapshot)).is_empty());
    }

    #[test]
    fn malformed_records_are_kept_with_defaults() {
        let snapshot = json!({
            "a": { "startTime": 100, "status": "active" },
            "b": {}
        });

        let sessions = normalize_collection::<Session>(Some(&snapshot));

        assert_eq!(sessions.len(), 2);
        let degenerate = sessions
            .iter()
            .find(|keyed| keyed.id == "b")
            .expect("record b should survive normalization");
        assert_eq!(degenerate.record.start_time_ms, 0);
        assert_eq!(degenerate.record.status, SessionStatus::Other(String::new()));
    }

    #[test]
    fn records_carry_their_snapshot_key() {
        let snapshot = json!({
            "1717": { "action": "LOGIN", "timestamp": "100", "userName": "alice" }
        });

        let logs = normalize_collection::<AccessLogEntry>(Some(&snapshot));

        assert_eq!(logs[0].id, "1717");
    }

    #[test]
    fn status_singleton_normalizes_to_none_when_absent() {
        assert_eq!(normalize_status(None), None);
        assert_eq!(normalize_status(Some(&Value::Null)), None);
    }

    #[test]
    fn status_singleton_decodes_object() {
        let snapshot = json!({ "current": 1.25, "power": 287.5, "status": "active", "lastUpdate": 42 });

        let status = normalize_status(Some(&snapshot)).expect("status should decode");

        assert_eq!(status.current_amps, 1.25);
        assert_eq!(status.power_w, 287.5);
        assert_eq!(status.status, "active");
        assert_eq!(status.last_update_ms, 42);
    }
}
