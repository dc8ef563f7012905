use actix_web::{HttpResponse, Responder, get, web};
use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::app::services::{DashboardQueryHandler, DashboardService, ServiceError};
use crate::domain::aggregate::{CategoryFilter, format_duration, relative_age};
use crate::domain::models::{AccessLogEntry, Keyed, Session};

#[derive(Clone)]
pub struct ApiState {
    pub dashboard: DashboardService,
}

#[derive(Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SessionResponse {
    pub id: String,
    pub user_name: String,
    pub start_time_ms: i64,
    pub end_time_ms: Option<i64>,
    pub duration_secs: Option<i64>,
    pub duration_label: Option<String>,
    pub energy_wh: f64,
    pub status: String,
    pub end_reason: Option<String>,
}

impl SessionResponse {
    fn from_keyed(keyed: Keyed<Session>) -> Self {
        let session = keyed.record;
        Self {
            id: keyed.id,
            user_name: session.user_name,
            start_time_ms: session.start_time_ms,
            end_time_ms: session.end_time_ms,
            duration_secs: session.duration_secs,
            duration_label: session.duration_secs.map(format_duration),
            energy_wh: session.energy_wh.unwrap_or(0.0),
            status: session.status.label().to_string(),
            end_reason: session.end_reason,
        }
    }
}

#[derive(Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SessionTotalsResponse {
    pub count: usize,
    pub active_count: usize,
    pub total_energy_wh: f64,
}

#[derive(Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SessionsResponse {
    pub totals: SessionTotalsResponse,
    pub sessions: Vec<SessionResponse>,
}

#[derive(Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OverviewResponse {
    pub total_sessions: usize,
    pub active_sessions: usize,
    pub total_energy_wh: f64,
    pub current_amps: f64,
    pub power_w: f64,
    pub last_activity_ms: i64,
    pub latest_session: Option<SessionResponse>,
}

#[derive(Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LogTotalsResponse {
    pub login: usize,
    pub logout: usize,
    pub denied: usize,
    pub auto_poweroff: usize,
    pub other: usize,
}

#[derive(Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LogEventResponse {
    pub id: String,
    pub action: String,
    pub timestamp_ms: i64,
    pub user_name: String,
}

impl LogEventResponse {
    fn from_keyed(keyed: Keyed<AccessLogEntry>) -> Self {
        let entry = keyed.record;
        Self {
            id: keyed.id,
            action: entry.action.label().to_string(),
            timestamp_ms: entry.timestamp_ms,
            user_name: entry.user_name,
        }
    }
}

#[derive(Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AccessLogResponse {
    pub totals: LogTotalsResponse,
    pub events: Vec<LogEventResponse>,
}

#[derive(Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TelemetrySampleResponse {
    pub time_ms: i64,
    pub current_amps: f64,
    pub power_w: f64,
}

#[derive(Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MonitorResponse {
    pub status: Option<String>,
    pub current_amps: f64,
    pub power_w: f64,
    pub last_update_ms: i64,
    pub last_update_age: String,
    pub samples: Vec<TelemetrySampleResponse>,
}

#[derive(Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DailyEnergyResponse {
    pub day: String,
    pub total_energy_wh: f64,
}

#[derive(Debug, Deserialize)]
pub struct SessionListQuery {
    pub search: Option<String>,
    pub status: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LogListQuery {
    pub search: Option<String>,
    pub action: Option<String>,
}

pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(health)
        .service(get_overview_endpoint)
        .service(list_sessions_endpoint)
        .service(list_end_reasons_endpoint)
        .service(list_access_log_endpoint)
        .service(get_monitor_endpoint)
        .service(list_daily_energy_endpoint);
}

#[get("/health")]
async fn health() -> impl Responder {
    HttpResponse::Ok().json(serde_json::json!({ "status": "ok" }))
}

#[get("/overview")]
async fn get_overview_endpoint(state: web::Data<ApiState>) -> impl Responder {
    match state.dashboard.overview() {
        Ok(overview) => HttpResponse::Ok().json(OverviewResponse {
            total_sessions: overview.total_sessions,
            active_sessions: overview.active_sessions,
            total_energy_wh: overview.total_energy_wh,
            current_amps: overview.current_amps,
            power_w: overview.power_w,
            last_activity_ms: overview.last_activity_ms,
            latest_session: overview.latest_session.map(SessionResponse::from_keyed),
        }),
        Err(error) => service_error_response(error),
    }
}

#[get("/sessions")]
async fn list_sessions_endpoint(
    state: web::Data<ApiState>,
    query: web::Query<SessionListQuery>,
) -> impl Responder {
    let search = query.search.as_deref().unwrap_or("");
    let category = CategoryFilter::from_raw(query.status.as_deref().unwrap_or("all"));

    match state.dashboard.sessions(search, &category) {
        Ok(view) => HttpResponse::Ok().json(SessionsResponse {
            totals: SessionTotalsResponse {
                count: view.totals.count,
                active_count: view.totals.active_count,
                total_energy_wh: view.totals.total_energy_wh,
            },
            sessions: view
                .sessions
                .into_iter()
                .map(SessionResponse::from_keyed)
                .collect(),
        }),
        Err(error) => service_error_response(error),
    }
}

#[get("/sessions/end-reasons")]
async fn list_end_reasons_endpoint(state: web::Data<ApiState>) -> impl Responder {
    match state.dashboard.end_reasons() {
        Ok(reasons) => HttpResponse::Ok().json(reasons),
        Err(error) => service_error_response(error),
    }
}

#[get("/access-log")]
async fn list_access_log_endpoint(
    state: web::Data<ApiState>,
    query: web::Query<LogListQuery>,
) -> impl Responder {
    let search = query.search.as_deref().unwrap_or("");
    let category = CategoryFilter::from_raw(query.action.as_deref().unwrap_or("all"));

    match state.dashboard.access_log(search, &category) {
        Ok(view) => HttpResponse::Ok().json(AccessLogResponse {
            totals: LogTotalsResponse {
                login: view.totals.login,
                logout: view.totals.logout,
                denied: view.totals.denied,
                auto_poweroff: view.totals.auto_poweroff,
                other: view.totals.other,
            },
            events: view
                .events
                .into_iter()
                .map(LogEventResponse::from_keyed)
                .collect(),
        }),
        Err(error) => service_error_response(error),
    }
}

#[get("/monitor")]
async fn get_monitor_endpoint(state: web::Data<ApiState>) -> impl Responder {
    match state.dashboard.monitor() {
        Ok(view) => {
            let now_ms = Utc::now().timestamp_millis();
            let last_update_ms = view
                .status
                .as_ref()
                .map_or(0, |status| status.last_update_ms);

            HttpResponse::Ok().json(MonitorResponse {
                status: view.status.as_ref().map(|status| status.status.clone()),
                current_amps: view.status.as_ref().map_or(0.0, |s| s.current_amps),
                power_w: view.status.as_ref().map_or(0.0, |s| s.power_w),
                last_update_ms,
                last_update_age: relative_age(last_update_ms, now_ms),
                samples: view
                    .samples
                    .into_iter()
                    .map(|sample| TelemetrySampleResponse {
                        time_ms: sample.time_ms,
                        current_amps: sample.current_amps,
                        power_w: sample.power_w,
                    })
                    .collect(),
            })
        }
        Err(error) => service_error_response(error),
    }
}

#[get("/energy/daily")]
async fn list_daily_energy_endpoint(state: web::Data<ApiState>) -> impl Responder {
    match state.dashboard.daily_energy() {
        Ok(buckets) => {
            let mapped: Vec<DailyEnergyResponse> = buckets
                .into_iter()
                .map(|bucket| DailyEnergyResponse {
                    day: bucket.day.format("%Y-%m-%d").to_string(),
                    total_energy_wh: bucket.total_energy_wh,
                })
                .collect();
            HttpResponse::Ok().json(mapped)
        }
        Err(error) => service_error_response(error),
    }
}

fn service_error_response(error: ServiceError) -> HttpResponse {
    match error {
        ServiceError::StateLockPoisoned => {
            HttpResponse::InternalServerError().json(serde_json::json!({
                "error": "dashboard state lock poisoned"
            }))
        }
    }
}

#[cfg(test)]
mod tests {
    use actix_web::{App, body::to_bytes, http::StatusCode, test, web};
    use chrono::FixedOffset;
    use serde_json::json;

    use crate::app::services::DashboardService;
    use crate::domain::view::DashboardState;
    use crate::test_support::{log_value, session_value, status_value};

    use super::{ApiState, configure_routes};

    fn build_state() -> ApiState {
        let zone = FixedOffset::east_opt(0).expect("zero offset is valid");
        ApiState {
            dashboard: DashboardService::new(DashboardState::new(20, zone)),
        }
    }

    fn seeded_state() -> ApiState {
        let state = build_state();
        state
            .dashboard
            .apply_sessions(
                1,
                Some(&json!({
                    "3": session_value(300, 5.0, "completed"),
                    "1": session_value(100, 2.0, "active"),
                })),
            )
            .expect("sessions apply should succeed");
        state
            .dashboard
            .apply_access_log(
                1,
                Some(&json!({
                    "a": log_value("LOGIN", 100, "alice"),
                    "b": log_value("DENIED", 300, "mallory"),
                    "c": log_value("DENIED", 200, "mallory"),
                })),
            )
            .expect("access log apply should succeed");
        state
            .dashboard
            .apply_status(1, Some(&status_value(1.25, 287.5, "active", 42_000)), 43_000)
            .expect("status apply should succeed");
        state
    }

    #[actix_web::test]
    async fn health_endpoint_returns_ok() {
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(build_state()))
                .configure(configure_routes),
        )
        .await;

        let req = test::TestRequest::get().uri("/health").to_request();
        let resp = test::call_service(&app, req).await;

        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[actix_web::test]
    async fn overview_reports_totals_and_latest_session() {
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(seeded_state()))
                .configure(configure_routes),
        )
        .await;

        let req = test::TestRequest::get().uri("/overview").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);

        let body = to_bytes(resp.into_body())
            .await
            .expect("body should be readable");
        let json: serde_json::Value = serde_json::from_slice(&body).expect("body should be json");

        assert_eq!(json["totalSessions"], 2);
        assert_eq!(json["activeSessions"], 1);
        assert_eq!(json["totalEnergyWh"], 7.0);
        assert_eq!(json["currentAmps"], 1.25);
        assert_eq!(json["powerW"], 287.5);
        assert_eq!(json["latestSession"]["id"], "3");
    }

    #[actix_web::test]
    async fn overview_on_empty_state_is_all_zero() {
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(build_state()))
                .configure(configure_routes),
        )
        .await;

        let req = test::TestRequest::get().uri("/overview").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);

        let body = to_bytes(resp.into_body())
            .await
            .expect("body should be readable");
        let json: serde_json::Value = serde_json::from_slice(&body).expect("body should be json");

        assert_eq!(json["totalSessions"], 0);
        assert_eq!(json["latestSession"], serde_json::Value::Null);
    }

    #[actix_web::test]
    async fn sessions_endpoint_sorts_by_recency() {
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(seeded_state()))
                .configure(configure_routes),
        )
        .await;

        let req = test::TestRequest::get().uri("/sessions").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);

        let body = to_bytes(resp.into_body())
            .await
            .expect("body should be readable");
        let json: serde_json::Value = serde_json::from_slice(&body).expect("body should be json");

        assert_eq!(json["totals"]["count"], 2);
        assert_eq!(json["sessions"][0]["id"], "3");
        assert_eq!(json["sessions"][1]["id"], "1");
    }

    #[actix_web::test]
    async fn sessions_endpoint_applies_status_filter() {
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(seeded_state()))
                .configure(configure_routes),
        )
        .await;

        let req = test::TestRequest::get()
            .uri("/sessions?status=active")
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);

        let body = to_bytes(resp.into_body())
            .await
            .expect("body should be readable");
        let json: serde_json::Value = serde_json::from_slice(&body).expect("body should be json");
        let sessions = json["sessions"].as_array().expect("sessions array");

        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0]["id"], "1");
        assert_eq!(sessions[0]["status"], "active");
    }

    #[actix_web::test]
    async fn access_log_endpoint_reports_action_buckets() {
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(seeded_state()))
                .configure(configure_routes),
        )
        .await;

        let req = test::TestRequest::get().uri("/access-log").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);

        let body = to_bytes(resp.into_body())
            .await
            .expect("body should be readable");
        let json: serde_json::Value = serde_json::from_slice(&body).expect("body should be json");

        assert_eq!(json["totals"]["login"], 1);
        assert_eq!(json["totals"]["denied"], 2);
        // Most recent first.
        assert_eq!(json["events"][0]["id"], "b");
    }

    #[actix_web::test]
    async fn access_log_endpoint_combines_search_and_action() {
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(seeded_state()))
                .configure(configure_routes),
        )
        .await;

        let req = test::TestRequest::get()
            .uri("/access-log?search=mallory&action=DENIED")
            .to_request();
        let resp = test::call_service(&app, req).await;

        let body = to_bytes(resp.into_body())
            .await
            .expect("body should be readable");
        let json: serde_json::Value = serde_json::from_slice(&body).expect("body should be json");
        let events = json["events"].as_array().expect("events array");

        assert_eq!(events.len(), 2);
        assert!(events.iter().all(|event| event["action"] == "DENIED"));
    }

    #[actix_web::test]
    async fn monitor_endpoint_returns_status_and_samples() {
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(seeded_state()))
                .configure(configure_routes),
        )
        .await;

        let req = test::TestRequest::get().uri("/monitor").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);

        let body = to_bytes(resp.into_body())
            .await
            .expect("body should be readable");
        let json: serde_json::Value = serde_json::from_slice(&body).expect("body should be json");

        assert_eq!(json["status"], "active");
        assert_eq!(json["powerW"], 287.5);
        assert_eq!(json["samples"].as_array().expect("samples array").len(), 1);
    }

    #[actix_web::test]
    async fn monitor_without_status_reads_never() {
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(build_state()))
                .configure(configure_routes),
        )
        .await;

        let req = test::TestRequest::get().uri("/monitor").to_request();
        let resp = test::call_service(&app, req).await;

        let body = to_bytes(resp.into_body())
            .await
            .expect("body should be readable");
        let json: serde_json::Value = serde_json::from_slice(&body).expect("body should be json");

        assert_eq!(json["status"], serde_json::Value::Null);
        assert_eq!(json["lastUpdateAge"], "Never");
    }

    #[actix_web::test]
    async fn daily_energy_endpoint_renders_dates() {
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(seeded_state()))
                .configure(configure_routes),
        )
        .await;

        let req = test::TestRequest::get().uri("/energy/daily").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);

        let body = to_bytes(resp.into_body())
            .await
            .expect("body should be readable");
        let json: serde_json::Value = serde_json::from_slice(&body).expect("body should be json");
        let buckets = json.as_array().expect("buckets array");

        assert_eq!(buckets.len(), 1);
        assert_eq!(buckets[0]["day"], "1970-01-01");
        assert_eq!(buckets[0]["totalEnergyWh"], 7.0);
    }

    #[actix_web::test]
    async fn end_reasons_endpoint_counts_by_reason() {
        let state = build_state();
        state
            .dashboard
            .apply_sessions(
                1,
                Some(&json!({
                    "1": {
                        "startTime": 100,
                        "userName": "alice",
                        "status": "completed",
                        "endReason": "manual_logout"
                    },
                    "2": {
                        "startTime": 200,
                        "userName": "alice",
                        "status": "active"
                    }
                })),
            )
            .expect("apply should succeed");

        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(state))
                .configure(configure_routes),
        )
        .await;

        let req = test::TestRequest::get()
            .uri("/sessions/end-reasons")
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);

        let body = to_bytes(resp.into_body())
            .await
            .expect("body should be readable");
        let json: serde_json::Value = serde_json::from_slice(&body).expect("body should be json");

        assert_eq!(json["manual_logout"], 1);
        assert_eq!(json.as_object().expect("object").len(), 1);
    }
}
