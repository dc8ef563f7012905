mod config;
mod error;
mod logging;
mod runtime;
pub mod services;

pub use error::AppError;

pub fn run() -> Result<(), AppError> {
    dotenvy::dotenv().ok();
    logging::init()?;

    let config = config::AppConfig::from_env()?;

    tracing::info!(
        device_id = %config.device_id,
        source_mode = ?config.source_mode,
        http_bind = %config.http_bind,
        telemetry_window = config.telemetry_window,
        "application bootstrap initialized"
    );

    runtime::run(config)
}
