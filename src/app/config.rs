use crate::app::AppError;

/// Which snapshot source the runtime wires up. `Rtdb` streams from the
/// hosted realtime store, `Replay` feeds scripted frames from a local file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceMode {
    Rtdb,
    Replay,
}

impl SourceMode {
    fn from_raw(raw: &str) -> Result<Self, AppError> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "rtdb" => Ok(Self::Rtdb),
            "replay" => Ok(Self::Replay),
            other => Err(AppError::config(format!(
                "SOURCE_MODE must be 'rtdb' or 'replay', got '{other}'"
            ))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub device_id: String,
    pub source_mode: SourceMode,
    pub rtdb_base_url: String,
    pub replay_script: String,
    pub replay_interval_ms: u64,
    pub http_bind: String,
    pub telemetry_window: usize,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, AppError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> Result<Self, AppError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let device_id = lookup("DEVICE_ID")
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .ok_or_else(|| AppError::config("DEVICE_ID is required"))?;

        let source_mode = match lookup("SOURCE_MODE") {
            Some(raw) => SourceMode::from_raw(&raw)?,
            None => SourceMode::Rtdb,
        };

        let rtdb_base_url = lookup("RTDB_BASE_URL")
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .unwrap_or_default();
        if source_mode == SourceMode::Rtdb && rtdb_base_url.is_empty() {
            return Err(AppError::config("RTDB_BASE_URL is required in rtdb mode"));
        }

        let replay_script = lookup("REPLAY_SCRIPT")
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .unwrap_or_default();
        if source_mode == SourceMode::Replay && replay_script.is_empty() {
            return Err(AppError::config("REPLAY_SCRIPT is required in replay mode"));
        }

        Ok(Self {
            device_id,
            source_mode,
            rtdb_base_url,
            replay_script,
            replay_interval_ms: parse_or_default(&lookup, "REPLAY_INTERVAL_MS", 1000_u64)?,
            http_bind: lookup("HTTP_BIND")
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .unwrap_or_else(|| "0.0.0.0:8080".to_string()),
            telemetry_window: parse_or_default(
                &lookup,
                "TELEMETRY_WINDOW",
                crate::domain::telemetry::DEFAULT_WINDOW_CAPACITY,
            )?,
        })
    }
}

fn parse_or_default<T, F>(lookup: &F, key: &str, default: T) -> Result<T, AppError>
where
    T: std::str::FromStr + Copy,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|_| AppError::config(format!("{key} must be a valid number"))),
        None => Ok(default),
    }
}
