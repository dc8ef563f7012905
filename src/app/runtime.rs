use std::time::Duration;

use actix_cors::Cors;
use actix_web::{App, HttpServer, web};
use chrono::{Local, Offset, Utc};

use crate::adapters::api::{ApiState, configure_routes};
use crate::adapters::replay::ReplaySource;
use crate::adapters::rtdb::RtdbSource;
use crate::adapters::source::{SnapshotSource, Subscription, TreePath};
use crate::app::config::{AppConfig, SourceMode};
use crate::app::error::AppError;
use crate::app::services::DashboardService;
use crate::domain::view::{Clock, DashboardState};

#[derive(Debug, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> i64 {
        Utc::now().timestamp_millis()
    }
}

enum RuntimeSource {
    Rtdb(RtdbSource),
    Replay(ReplaySource),
}

impl RuntimeSource {
    fn build(config: &AppConfig) -> Result<Self, AppError> {
        match config.source_mode {
            SourceMode::Rtdb => Ok(Self::Rtdb(RtdbSource::new(
                &config.rtdb_base_url,
                &config.device_id,
            ))),
            SourceMode::Replay => {
                let interval = Duration::from_millis(config.replay_interval_ms);
                ReplaySource::start(&config.replay_script, interval)
                    .map(Self::Replay)
                    .map_err(AppError::runtime)
            }
        }
    }

    fn as_source(&self) -> &dyn SnapshotSource {
        match self {
            Self::Rtdb(source) => source,
            Self::Replay(source) => source,
        }
    }

    fn stop(&self) {
        match self {
            Self::Rtdb(source) => source.stop(),
            Self::Replay(source) => source.stop(),
        }
    }
}

fn subscribe_dashboard(
    source: &dyn SnapshotSource,
    dashboard: &DashboardService,
) -> Result<Vec<Subscription>, AppError> {
    let mut subscriptions = Vec::with_capacity(TreePath::ALL.len());

    for path in TreePath::ALL {
        let handler_service = dashboard.clone();
        let subscription = source
            .subscribe(
                path,
                Box::new(move |event| {
                    let result = match path {
                        TreePath::Sessions => {
                            handler_service.apply_sessions(event.revision, event.value.as_ref())
                        }
                        TreePath::AccessLog => {
                            handler_service.apply_access_log(event.revision, event.value.as_ref())
                        }
                        TreePath::CurrentStatus => handler_service.apply_status(
                            event.revision,
                            event.value.as_ref(),
                            SystemClock.now_ms(),
                        ),
                    };
                    if let Err(error) = result {
                        tracing::error!(error = %error, path = path.segment(), "snapshot apply failed");
                    }
                }),
            )
            .map_err(AppError::runtime)?;
        subscriptions.push(subscription);
    }

    Ok(subscriptions)
}

pub fn run(config: AppConfig) -> Result<(), AppError> {
    let zone = Local::now().offset().fix();
    let dashboard = DashboardService::new(DashboardState::new(config.telemetry_window, zone));

    let source = RuntimeSource::build(&config)?;
    let mut subscriptions = subscribe_dashboard(source.as_source(), &dashboard)?;

    let api_state = ApiState {
        dashboard: dashboard.clone(),
    };

    tracing::info!(bind = %config.http_bind, "http server starting");

    let server_result = actix_web::rt::System::new().block_on(async move {
        HttpServer::new(move || {
            App::new()
                .wrap(Cors::permissive())
                .app_data(web::Data::new(api_state.clone()))
                .configure(configure_routes)
        })
        .bind(&config.http_bind)?
        .run()
        .await
    });

    for subscription in &mut subscriptions {
        subscription.unsubscribe();
    }
    source.stop();

    server_result.map_err(AppError::runtime)
}
