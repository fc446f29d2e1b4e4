//! REST API endpoints for the streetlight service.
//!
//! # Lock Acquisition
//!
//! Handlers acquire at most one lock at a time where possible. When more
//! than one is needed they follow the control loop's order:
//! 1. `config`
//! 2. `control`
//! 3. `store`
//!
//! ## Error Handling
//!
//! All endpoints return structured JSON errors via [`AppError`]. Store errors
//! return HTTP 500; invalid input returns 400; a sync that is already running
//! returns 409.
//!
//! # Example
//!
//! ```ignore
//! use axum::Router;
//! use streetlight_service::api;
//!
//! let app = api::router().with_state(state);
//! ```

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Query, State},
    http::{StatusCode, header},
    response::IntoResponse,
    routing::{get, post, put},
};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use streetlight_store::{ReadingQuery, StoredReading};
use streetlight_types::timestamp::from_unix_millis;
use streetlight_types::{
    DeviceState, DeviceStatePatch, RuleThresholds, Statistics, ThresholdsPatch, ValueError,
};

use crate::config::MAX_LOG_LIMIT;
use crate::controller::Controller;
use crate::state::{AppState, Snapshot};
use crate::sync::SyncOutcome;

/// Create the API router.
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        // Health and status
        .route("/api/health", get(health))
        .route("/api/status", get(get_status))
        .route("/api/statistics", get(get_statistics))
        // Controller lifecycle
        .route("/api/controller/start", post(controller_start))
        .route("/api/controller/stop", post(controller_stop))
        // Control
        .route("/api/thresholds", get(get_thresholds).put(update_thresholds))
        .route("/api/mode", put(set_mode))
        .route("/api/offline", put(set_offline))
        .route("/api/device", get(get_device).post(update_device))
        .route("/api/sync", post(sync_now))
        // Data
        .route("/api/logs", get(get_logs))
        .route("/api/readings", get(get_readings).delete(clear_readings))
        .route("/api/readings/export", get(export_readings))
}

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
}

/// Health check endpoint.
async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        timestamp: OffsetDateTime::now_utc(),
    })
}

// ==========================================================================
// Service Status and Controller Control
// ==========================================================================

/// Service status response.
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    /// Service version.
    pub version: &'static str,
    /// Current timestamp.
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
    /// Control loop status.
    pub controller: ControllerStatus,
    /// Which collaborators are configured.
    pub links: LinksStatus,
    /// Local store counters.
    pub store: StoreStatus,
    /// Full control state.
    pub snapshot: Snapshot,
}

/// Control loop status.
#[derive(Debug, Serialize)]
pub struct ControllerStatus {
    /// Whether the loop is running.
    pub running: bool,
    /// When the loop was started (if running).
    #[serde(with = "time::serde::rfc3339::option")]
    pub started_at: Option<OffsetDateTime>,
    /// How long the loop has been running (in seconds).
    pub uptime_seconds: Option<u64>,
    /// Completed ticks.
    pub ticks: u64,
    /// Ticks skipped because the previous one was still running.
    pub skipped_ticks: u64,
    #[serde(with = "time::serde::rfc3339::option")]
    pub last_tick_at: Option<OffsetDateTime>,
    /// Current streak of failed remote sensor reads.
    pub consecutive_remote_failures: u32,
}

/// Configured collaborators.
#[derive(Debug, Serialize)]
pub struct LinksStatus {
    pub remote_sensor: bool,
    pub device_link: bool,
    pub cloud_sync: bool,
    /// Whether a sync is in flight right now.
    pub syncing: bool,
}

/// Local store counters.
#[derive(Debug, Serialize)]
pub struct StoreStatus {
    pub readings: u64,
    pub unsynced: u64,
}

/// Get service status including controller state and the full snapshot.
async fn get_status(State(state): State<Arc<AppState>>) -> Result<Json<StatusResponse>, AppError> {
    let running = state.controller.is_running();
    let started_at = if running {
        state.controller.started_at()
    } else {
        None
    };
    let uptime_seconds = started_at.map(|s| {
        let now = OffsetDateTime::now_utc();
        (now - s).whole_seconds().max(0) as u64
    });

    let snapshot = state.snapshot().await;
    let store = {
        let store = state.store.lock().await;
        StoreStatus {
            readings: store.count_readings()?,
            unsynced: store.count_unsynced()?,
        }
    };

    Ok(Json(StatusResponse {
        version: env!("CARGO_PKG_VERSION"),
        timestamp: OffsetDateTime::now_utc(),
        controller: ControllerStatus {
            running,
            started_at,
            uptime_seconds,
            ticks: state.controller.tick_count(),
            skipped_ticks: state.controller.skipped_ticks(),
            last_tick_at: state.controller.last_tick_at(),
            consecutive_remote_failures: state.controller.consecutive_remote_failures(),
        },
        links: LinksStatus {
            remote_sensor: state.links.sensor.is_some(),
            device_link: state.links.device.is_some(),
            cloud_sync: state.links.sync.is_some(),
            syncing: state.links.sync.as_ref().is_some_and(|s| s.is_syncing()),
        },
        store,
        snapshot,
    }))
}

/// Statistics over the current history window.
async fn get_statistics(State(state): State<Arc<AppState>>) -> Json<Statistics> {
    Json(state.control.read().await.statistics)
}

/// Response for controller control actions.
#[derive(Debug, Serialize)]
pub struct ControllerActionResponse {
    pub success: bool,
    pub message: String,
    pub running: bool,
}

/// Start the control loop.
async fn controller_start(State(state): State<Arc<AppState>>) -> Json<ControllerActionResponse> {
    let controller = Controller::new(Arc::clone(&state));
    if !controller.start().await {
        return Json(ControllerActionResponse {
            success: false,
            message: "Controller is already running".to_string(),
            running: true,
        });
    }

    Json(ControllerActionResponse {
        success: true,
        message: "Controller started".to_string(),
        running: true,
    })
}

/// Stop the control loop.
async fn controller_stop(State(state): State<Arc<AppState>>) -> Json<ControllerActionResponse> {
    let controller = Controller::new(Arc::clone(&state));
    if !controller.stop() {
        return Json(ControllerActionResponse {
            success: false,
            message: "Controller is not running".to_string(),
            running: false,
        });
    }

    Json(ControllerActionResponse {
        success: true,
        message: "Controller stopped".to_string(),
        running: false,
    })
}

// ==========================================================================
// Control Endpoints
// ==========================================================================

async fn get_thresholds(State(state): State<Arc<AppState>>) -> Json<RuleThresholds> {
    Json(state.control.read().await.thresholds)
}

/// Apply a partial threshold update.
async fn update_thresholds(
    State(state): State<Arc<AppState>>,
    Json(patch): Json<ThresholdsPatch>,
) -> Result<Json<RuleThresholds>, AppError> {
    let updated = Controller::new(state).update_thresholds(&patch).await?;
    Ok(Json(updated))
}

/// Request body for `PUT /api/mode`.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ModeRequest {
    pub auto: bool,
}

/// Request body for `PUT /api/offline`.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OfflineRequest {
    pub offline: bool,
}

/// Mode flags after a change.
#[derive(Debug, Serialize)]
pub struct ModeResponse {
    pub auto: bool,
    pub offline: bool,
    pub online: bool,
}

async fn mode_response(state: &AppState) -> Json<ModeResponse> {
    let control = state.control.read().await;
    Json(ModeResponse {
        auto: control.auto_mode,
        offline: control.forced_offline,
        online: control.online,
    })
}

/// Switch between automatic and manual control.
async fn set_mode(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ModeRequest>,
) -> Json<ModeResponse> {
    Controller::new(Arc::clone(&state))
        .set_auto_mode(request.auto)
        .await;
    mode_response(&state).await
}

/// Force the controller offline, or bring it back.
async fn set_offline(
    State(state): State<Arc<AppState>>,
    Json(request): Json<OfflineRequest>,
) -> Json<ModeResponse> {
    Controller::new(Arc::clone(&state))
        .set_forced_offline(request.offline)
        .await;
    mode_response(&state).await
}

async fn get_device(State(state): State<Arc<AppState>>) -> Json<DeviceState> {
    Json(state.control.read().await.device)
}

/// Manual device update. Unknown fields are rejected by the extractor.
async fn update_device(
    State(state): State<Arc<AppState>>,
    Json(patch): Json<DeviceStatePatch>,
) -> Result<Json<DeviceState>, AppError> {
    if patch.is_empty() {
        return Err(AppError::BadRequest(
            "Patch must set ledBrightness or fogLights".to_string(),
        ));
    }
    let device = Controller::new(state).apply_manual(&patch).await?;
    Ok(Json(device))
}

/// Run a sync now.
async fn sync_now(State(state): State<Arc<AppState>>) -> Result<Json<SyncOutcome>, AppError> {
    match Controller::new(state).sync_now().await {
        None => Err(AppError::NotFound(
            "Cloud sync is not configured".to_string(),
        )),
        Some(SyncOutcome::Busy) => Err(AppError::Conflict(
            "A sync is already in progress".to_string(),
        )),
        Some(outcome) => Ok(Json(outcome)),
    }
}

// ==========================================================================
// Data Endpoints
// ==========================================================================

/// Query parameters for `GET /api/logs`.
#[derive(Debug, Deserialize)]
pub struct LogsQuery {
    pub limit: Option<u32>,
}

/// Most recent stored readings, newest first.
async fn get_logs(
    State(state): State<Arc<AppState>>,
    Query(params): Query<LogsQuery>,
) -> Result<Json<Vec<StoredReading>>, AppError> {
    let limit = match params.limit {
        Some(limit) => limit,
        None => state.config.read().await.controller.log_limit,
    };
    if limit == 0 || limit > MAX_LOG_LIMIT {
        return Err(AppError::BadRequest(format!(
            "limit must be between 1 and {}",
            MAX_LOG_LIMIT
        )));
    }

    let store = state.store.lock().await;
    Ok(Json(store.query_recent(limit)?))
}

/// Query parameters for reading endpoints. Times are Unix milliseconds.
#[derive(Debug, Default, Deserialize)]
pub struct ReadingsQuery {
    pub since: Option<i64>,
    pub until: Option<i64>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

impl ReadingsQuery {
    /// Validate the query parameters.
    /// Returns an error if `since > until`.
    pub fn validate(&self) -> Result<(), AppError> {
        if let (Some(since), Some(until)) = (self.since, self.until)
            && since > until
        {
            return Err(AppError::BadRequest(format!(
                "Invalid time range: 'since' ({}) must be less than or equal to 'until' ({})",
                since, until
            )));
        }
        Ok(())
    }

    /// Time filters as a store query, oldest first.
    fn to_store_query(&self) -> Result<ReadingQuery, AppError> {
        let mut query = ReadingQuery::new().oldest_first();
        if let Some(since) = self.since {
            query = query.since(parse_millis("since", since)?);
        }
        if let Some(until) = self.until {
            query = query.until(parse_millis("until", until)?);
        }
        Ok(query)
    }
}

fn parse_millis(name: &str, millis: i64) -> Result<OffsetDateTime, AppError> {
    from_unix_millis(millis)
        .ok_or_else(|| AppError::BadRequest(format!("Invalid '{}' timestamp: {}", name, millis)))
}

/// Paginated response wrapper with metadata.
#[derive(Debug, Serialize)]
pub struct PaginatedResponse<T> {
    /// The data items.
    pub data: Vec<T>,
    /// Pagination metadata.
    pub pagination: PaginationMeta,
}

/// Pagination metadata.
#[derive(Debug, Serialize)]
pub struct PaginationMeta {
    /// Number of items returned.
    pub count: usize,
    /// Offset from the beginning.
    pub offset: u32,
    /// Maximum items requested (if specified).
    pub limit: Option<u32>,
    /// Whether there are more items available.
    pub has_more: bool,
}

/// Stored readings in a time range, oldest first.
///
/// # Query Parameters
///
/// - `since`: Unix milliseconds, inclusive
/// - `until`: Unix milliseconds, inclusive
/// - `limit`: maximum items to return
/// - `offset`: items to skip
async fn get_readings(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ReadingsQuery>,
) -> Result<Json<PaginatedResponse<StoredReading>>, AppError> {
    params.validate()?;
    let mut query = params.to_store_query()?;

    // Request one extra item to determine if there are more
    if let Some(limit) = params.limit {
        query = query.limit(limit.saturating_add(1));
    }
    if let Some(offset) = params.offset {
        query = query.offset(offset);
    }

    let store = state.store.lock().await;
    let mut readings = store.query_readings(&query)?;

    let has_more = params.limit.is_some_and(|l| readings.len() > l as usize);
    if has_more {
        readings.pop();
    }

    Ok(Json(PaginatedResponse {
        pagination: PaginationMeta {
            count: readings.len(),
            offset: params.offset.unwrap_or(0),
            limit: params.limit,
            has_more,
        },
        data: readings,
    }))
}

/// Stored readings in a time range as CSV.
async fn export_readings(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ReadingsQuery>,
) -> Result<impl IntoResponse, AppError> {
    params.validate()?;
    let mut query = params.to_store_query()?;
    if let Some(limit) = params.limit {
        query = query.limit(limit);
    }
    if let Some(offset) = params.offset {
        query = query.offset(offset);
    }

    let mut body = Vec::new();
    state.store.lock().await.export_csv(&query, &mut body)?;

    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8"),
            (
                header::CONTENT_DISPOSITION,
                "attachment; filename=\"readings.csv\"",
            ),
        ],
        body,
    ))
}

/// Query parameters for `DELETE /api/readings`.
#[derive(Debug, Deserialize)]
pub struct ClearQuery {
    #[serde(default)]
    pub confirm: bool,
}

/// Response for `DELETE /api/readings`.
#[derive(Debug, Serialize)]
pub struct ClearResponse {
    pub deleted: usize,
}

/// Delete all stored readings. Requires `?confirm=true`.
async fn clear_readings(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ClearQuery>,
) -> Result<Json<ClearResponse>, AppError> {
    if !params.confirm {
        return Err(AppError::BadRequest(
            "Clearing history deletes every stored reading; pass confirm=true".to_string(),
        ));
    }
    let deleted = Controller::new(state).clear_history().await?;
    Ok(Json(ClearResponse { deleted }))
}

/// Application error type.
#[derive(Debug)]
pub enum AppError {
    NotFound(String),
    BadRequest(String),
    Conflict(String),
    Store(streetlight_store::Error),
    Internal(String),
}

impl From<streetlight_store::Error> for AppError {
    fn from(e: streetlight_store::Error) -> Self {
        AppError::Store(e)
    }
}

impl From<ValueError> for AppError {
    fn from(e: ValueError) -> Self {
        AppError::BadRequest(e.to_string())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let (status, message) = match self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            AppError::Store(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
            AppError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        let body = serde_json::json!({
            "error": message,
        });

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use axum::{
        body::Body,
        http::{Method, Request, StatusCode},
    };
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    use streetlight_core::{MockCloudSink, MockReachability};
    use streetlight_store::Store;
    use streetlight_types::SensorReading;

    use super::*;
    use crate::config::Config;
    use crate::state::Links;
    use crate::sync::SyncCoordinator;

    fn create_test_state() -> Arc<AppState> {
        let store = Store::open_in_memory().unwrap();
        AppState::new(store, Config::default())
    }

    async fn response_body(response: axum::response::Response) -> String {
        let body = response.into_body();
        let bytes = body.collect().await.unwrap().to_bytes();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    async fn send(
        state: &Arc<AppState>,
        method: Method,
        uri: &str,
        body: Option<&str>,
    ) -> (StatusCode, String) {
        let builder = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(json) => builder
                .header("content-type", "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        let response = router()
            .with_state(Arc::clone(state))
            .oneshot(request)
            .await
            .unwrap();
        let status = response.status();
        (status, response_body(response).await)
    }

    async fn get_json(state: &Arc<AppState>, uri: &str) -> (StatusCode, serde_json::Value) {
        let (status, body) = send(state, Method::GET, uri, None).await;
        (status, serde_json::from_str(&body).unwrap())
    }

    async fn run_ticks(state: &Arc<AppState>, count: usize) {
        let controller = Controller::new(Arc::clone(state));
        for _ in 0..count {
            controller.tick().await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_health_endpoint() {
        let state = create_test_state();
        let app = router().with_state(state);

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/health")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);

        let body = response_body(response).await;
        let json: serde_json::Value = serde_json::from_str(&body).unwrap();

        assert_eq!(json["status"], "ok");
        assert!(json["version"].is_string());
        assert!(json["timestamp"].is_string());
    }

    #[tokio::test]
    async fn test_status_endpoint() {
        let state = create_test_state();
        run_ticks(&state, 2).await;

        let (status, json) = get_json(&state, "/api/status").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["controller"]["running"], false);
        assert_eq!(json["controller"]["ticks"], 2);
        assert_eq!(json["links"]["remote_sensor"], false);
        assert_eq!(json["links"]["cloud_sync"], false);
        assert_eq!(json["store"]["readings"], 2);
        assert_eq!(json["store"]["unsynced"], 2);
        assert_eq!(json["snapshot"]["history"].as_array().unwrap().len(), 2);
        assert_eq!(json["snapshot"]["isAutoMode"], true);
    }

    #[tokio::test]
    async fn test_statistics_endpoint() {
        let state = create_test_state();
        let (status, json) = get_json(&state, "/api/statistics").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["count"], 0);
        assert_eq!(json["trend"], "STABLE");

        run_ticks(&state, 3).await;
        let (_, json) = get_json(&state, "/api/statistics").await;
        assert_eq!(json["count"], 3);
    }

    #[tokio::test]
    async fn test_controller_start_stop() {
        let state = create_test_state();

        let (status, body) = send(&state, Method::POST, "/api/controller/stop", None).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("\"success\":false"));

        let (_, body) = send(&state, Method::POST, "/api/controller/start", None).await;
        assert!(body.contains("\"success\":true"));
        assert!(state.controller.is_running());

        let (_, body) = send(&state, Method::POST, "/api/controller/start", None).await;
        assert!(body.contains("already running"));

        let (_, body) = send(&state, Method::POST, "/api/controller/stop", None).await;
        assert!(body.contains("\"success\":true"));
        assert!(!state.controller.is_running());
    }

    #[tokio::test]
    async fn test_thresholds_get_and_partial_update() {
        let state = create_test_state();

        let (status, json) = get_json(&state, "/api/thresholds").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["luxTarget"], 10_000.0);

        let (status, body) = send(
            &state,
            Method::PUT,
            "/api/thresholds",
            Some(r#"{"luxTarget": 5000, "motionTimeoutMs": 8000}"#),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let json: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(json["luxTarget"], 5000.0);
        assert_eq!(json["visibilityLimit"], 30.0);
        assert_eq!(json["motionTimeoutMs"], 8000);

        let thresholds = state.control.read().await.thresholds;
        assert_eq!(thresholds.motion_timeout(), Duration::from_secs(8));
    }

    #[tokio::test]
    async fn test_thresholds_invalid_update() {
        let state = create_test_state();

        let (status, body) = send(
            &state,
            Method::PUT,
            "/api/thresholds",
            Some(r#"{"visibilityLimit": 150}"#),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body.contains("visibility limit"));
        assert_eq!(
            state.control.read().await.thresholds,
            RuleThresholds::default()
        );

        let (status, _) = send(
            &state,
            Method::PUT,
            "/api/thresholds",
            Some(r#"{"luxLimit": 10}"#),
        )
        .await;
        assert!(status.is_client_error());
    }

    #[tokio::test]
    async fn test_mode_and_offline() {
        let state = create_test_state();

        let (status, body) = send(&state, Method::PUT, "/api/mode", Some(r#"{"auto": false}"#)).await;
        assert_eq!(status, StatusCode::OK);
        let json: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(json["auto"], false);
        assert!(!state.control.read().await.auto_mode);

        let (_, body) = send(&state, Method::PUT, "/api/offline", Some(r#"{"offline": true}"#)).await;
        let json: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(json["offline"], true);
        assert_eq!(json["online"], false);
        assert!(state.control.read().await.forced_offline);
    }

    #[tokio::test]
    async fn test_device_get_and_manual_update() {
        let state = create_test_state();

        let (_, json) = get_json(&state, "/api/device").await;
        assert_eq!(json["ledBrightness"], 0);
        assert_eq!(json["fogLights"], false);

        let (status, body) = send(
            &state,
            Method::POST,
            "/api/device",
            Some(r#"{"ledBrightness": 60}"#),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, r#"{"ledBrightness":60,"fogLights":false}"#);

        let (_, body) = send(&state, Method::POST, "/api/device", Some(r#"{"fogLights": true}"#)).await;
        assert_eq!(body, r#"{"ledBrightness":60,"fogLights":true}"#);
    }

    #[tokio::test]
    async fn test_device_update_rejects_bad_input() {
        let state = create_test_state();

        let (status, body) = send(
            &state,
            Method::POST,
            "/api/device",
            Some(r#"{"ledBrightness": 101}"#),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body.contains("exceeds 100%"));

        let (status, _) = send(
            &state,
            Method::POST,
            "/api/device",
            Some(r#"{"ledBrightness": 10, "color": "red"}"#),
        )
        .await;
        assert!(status.is_client_error());

        let (status, _) = send(&state, Method::POST, "/api/device", Some("{}")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        assert_eq!(state.control.read().await.device, DeviceState::default());
    }

    #[tokio::test]
    async fn test_sync_not_configured() {
        let state = create_test_state();
        let (status, body) = send(&state, Method::POST, "/api/sync", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(body.contains("not configured"));
    }

    #[tokio::test]
    async fn test_sync_now() {
        let sink = Arc::new(MockCloudSink::new());
        let reachability = Arc::new(MockReachability::new(false));
        let links = Links::simulated(Default::default())
            .with_sync(SyncCoordinator::new(sink.clone(), reachability.clone()));
        let store = Store::open_in_memory().unwrap();
        for lux in [1000.0, 2000.0] {
            let reading = SensorReading::clamped(OffsetDateTime::now_utc(), lux, 50.0, false);
            store.insert_reading(&reading).unwrap();
        }
        let state = AppState::with_links(store, Config::default(), links);

        let (status, body) = send(&state, Method::POST, "/api/sync", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, r#"{"status":"offline"}"#);

        reachability.set_reachable(true);
        let (_, body) = send(&state, Method::POST, "/api/sync", None).await;
        let json: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(json["status"], "completed");
        assert_eq!(json["pushed"], 2);
        assert_eq!(state.store.lock().await.count_unsynced().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_logs_endpoint() {
        let state = create_test_state();
        run_ticks(&state, 5).await;

        let (status, json) = get_json(&state, "/api/logs?limit=3").await;
        assert_eq!(status, StatusCode::OK);
        let logs = json.as_array().unwrap();
        assert_eq!(logs.len(), 3);
        assert!(logs[0]["id"].as_i64() > logs[1]["id"].as_i64());

        let (_, json) = get_json(&state, "/api/logs").await;
        assert_eq!(json.as_array().unwrap().len(), 5);

        let (status, _) = get_json(&state, "/api/logs?limit=501").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let (status, _) = get_json(&state, "/api/logs?limit=0").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_readings_pagination() {
        let state = create_test_state();
        run_ticks(&state, 5).await;

        let (status, json) = get_json(&state, "/api/readings?limit=2").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["data"].as_array().unwrap().len(), 2);
        assert_eq!(json["pagination"]["count"], 2);
        assert_eq!(json["pagination"]["has_more"], true);
        // Oldest first
        assert!(json["data"][0]["id"].as_i64() < json["data"][1]["id"].as_i64());

        let (_, json) = get_json(&state, "/api/readings?limit=2&offset=4").await;
        assert_eq!(json["pagination"]["count"], 1);
        assert_eq!(json["pagination"]["offset"], 4);
        assert_eq!(json["pagination"]["has_more"], false);

        let (_, json) = get_json(&state, "/api/readings").await;
        assert_eq!(json["pagination"]["count"], 5);
        assert!(json["pagination"]["limit"].is_null());
    }

    #[tokio::test]
    async fn test_readings_time_range() {
        let state = create_test_state();
        run_ticks(&state, 2).await;

        let (_, json) = get_json(&state, "/api/readings?until=0").await;
        assert_eq!(json["pagination"]["count"], 0);

        let (_, json) = get_json(&state, "/api/readings?since=0").await;
        assert_eq!(json["pagination"]["count"], 2);

        let (status, json) = get_json(&state, "/api/readings?since=200&until=100").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(json["error"].as_str().unwrap().contains("Invalid time range"));
    }

    #[tokio::test]
    async fn test_export_csv() {
        let state = create_test_state();
        run_ticks(&state, 3).await;

        let response = router()
            .with_state(Arc::clone(&state))
            .oneshot(
                Request::builder()
                    .uri("/api/readings/export")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "text/csv; charset=utf-8"
        );

        let body = response_body(response).await;
        let lines: Vec<&str> = body.lines().collect();
        assert_eq!(lines.len(), 4);
        assert!(lines[0].starts_with("id,timestamp,timestamp_ms"));
    }

    #[tokio::test]
    async fn test_clear_requires_confirm() {
        let state = create_test_state();
        run_ticks(&state, 3).await;

        let (status, body) = send(&state, Method::DELETE, "/api/readings", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body.contains("confirm=true"));
        assert_eq!(state.store.lock().await.count_readings().unwrap(), 3);

        let (status, body) = send(&state, Method::DELETE, "/api/readings?confirm=true", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, r#"{"deleted":3}"#);
        assert_eq!(state.store.lock().await.count_readings().unwrap(), 0);
        assert!(state.control.read().await.history.is_empty());
    }

    #[test]
    fn test_readings_query_validate() {
        let ok = ReadingsQuery {
            since: Some(100),
            until: Some(100),
            ..Default::default()
        };
        assert!(ok.validate().is_ok());

        let bad = ReadingsQuery {
            since: Some(200),
            until: Some(100),
            ..Default::default()
        };
        assert!(matches!(bad.validate(), Err(AppError::BadRequest(_))));
    }

    #[tokio::test]
    async fn test_app_error_response() {
        let response = AppError::Conflict("busy".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::CONFLICT);
        assert_eq!(response_body(response).await, r#"{"error":"busy"}"#);

        let response = AppError::from(ValueError::Brightness(150)).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
