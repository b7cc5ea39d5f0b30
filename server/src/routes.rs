//! HTTP route handlers for the OBEX alert server.
//!
//! This module provides the HTTP API endpoints:
//!
//! - `POST /alerts` - Ingest alerts from edge devices
//! - `GET /alerts` - List all persisted alerts, newest first
//! - `GET /analytics/alerts/*` - Cached analytics queries
//! - `GET /analytics/devices/{device_id}/statistics` - Per-device stats
//! - `GET /ws/alerts` - WebSocket subscription for live alerts
//! - `GET /ws/info` - WebSocket connection metadata
//! - `GET /health` - Health check endpoint
//!
//! # Architecture
//!
//! All routes share application state through [`AppState`], which contains:
//! - Configuration
//! - The ingestion pipeline (persist + broadcast)
//! - The analytics query service and its read-through cache
//! - The WebSocket connection registry
//! - Server start time for uptime reporting

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{DefaultBodyLimit, Path, Query, State, WebSocketUpgrade},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::time::Instant;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, trace, warn};

use crate::cache::QueryCache;
use crate::config::Config;
use crate::error::Result;
use crate::pipeline::{AlertPipeline, IngestSource};
use crate::query::AlertQueryService;
use crate::registry::ConnectionRegistry;
use crate::store::AlertStore;
use crate::types::{Alert, AlertType, NewAlert, ServerMessage};

// ============================================================================
// Constants
// ============================================================================

/// Maximum body size for alert ingestion (1 MB).
const MAX_BODY_SIZE: usize = 1024 * 1024;

/// TTL for cached device statistics; shorter than the default because
/// `last_seen` goes stale quickly.
const DEVICE_STATS_TTL: Duration = Duration::from_secs(300);

// ============================================================================
// Application State
// ============================================================================

/// Shared application state for all route handlers.
///
/// Cheap to clone; every component is a handle to shared resources.
#[derive(Clone)]
pub struct AppState {
    /// Server configuration.
    pub config: Arc<Config>,

    /// Alert persistence store.
    pub store: AlertStore,

    /// Ingestion pipeline (validate, persist, broadcast).
    pub pipeline: AlertPipeline,

    /// Analytics query service.
    pub queries: AlertQueryService,

    /// Read-through cache for analytics responses.
    pub cache: QueryCache,

    /// Registry of live WebSocket connections.
    pub registry: ConnectionRegistry,

    /// Server start time for uptime calculation.
    pub start_time: Instant,
}

impl AppState {
    /// Creates application state around an opened store.
    #[must_use]
    pub fn new(config: Config, store: AlertStore) -> Self {
        let registry = ConnectionRegistry::new();
        let pipeline = AlertPipeline::new(store.clone(), registry.clone());
        let queries = AlertQueryService::new(store.clone());
        let cache = QueryCache::new(
            config.cache_prefix.clone(),
            Duration::from_secs(config.cache_ttl_secs),
        );

        Self {
            config: Arc::new(config),
            store,
            pipeline,
            queries,
            cache,
            registry,
            start_time: Instant::now(),
        }
    }
}

// ============================================================================
// Router
// ============================================================================

/// Creates the application router with all routes configured.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/alerts", post(post_alert).get(get_alerts))
        .layer(DefaultBodyLimit::max(MAX_BODY_SIZE))
        .route("/analytics/alerts/timeframe", get(get_alerts_by_timeframe))
        .route("/analytics/alerts/location", get(get_alerts_by_location))
        .route("/analytics/alerts/counts", get(get_alert_counts))
        .route("/analytics/alerts/trends", get(get_alert_trends))
        .route(
            "/analytics/devices/{device_id}/statistics",
            get(get_device_statistics),
        )
        .route("/ws/alerts", get(get_ws))
        .route("/ws/info", get(get_ws_info))
        .route("/health", get(get_health))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Cache key fragment for an optional value.
fn key_part<T: ToString>(value: &Option<T>) -> String {
    value
        .as_ref()
        .map_or_else(|| "none".to_string(), ToString::to_string)
}

/// Timestamp fragment for cache keys. Full microsecond precision, so
/// windows differing only in the sub-second part never share a key.
fn iso(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

// ============================================================================
// POST /alerts + GET /alerts
// ============================================================================

/// POST /alerts - Ingest one alert from an edge device.
///
/// The alert id is assigned by the server; the body must not carry one.
///
/// # Responses
///
/// - `201 Created` - Alert persisted and broadcast; body is the record
/// - `422 Unprocessable Entity` - Malformed or invalid alert
async fn post_alert(
    State(state): State<AppState>,
    Json(new_alert): Json<NewAlert>,
) -> Result<(StatusCode, Json<Alert>)> {
    let alert = state.pipeline.process(new_alert, IngestSource::Http).await?;
    Ok((StatusCode::CREATED, Json(alert)))
}

/// GET /alerts - All persisted alerts, newest first.
async fn get_alerts(State(state): State<AppState>) -> Result<Json<Vec<Alert>>> {
    let alerts = state.store.all_alerts().await?;
    Ok(Json(alerts))
}

// ============================================================================
// Analytics endpoints
// ============================================================================

#[derive(Debug, Deserialize)]
struct TimeframeParams {
    start_time: DateTime<Utc>,
    end_time: DateTime<Utc>,
    alert_type: Option<AlertType>,
    device_id: Option<String>,
}

/// GET /analytics/alerts/timeframe - Alerts in a time window.
async fn get_alerts_by_timeframe(
    State(state): State<AppState>,
    Query(params): Query<TimeframeParams>,
) -> Result<Json<serde_json::Value>> {
    let key = state.cache.key([
        "timeframe".to_string(),
        iso(params.start_time),
        iso(params.end_time),
        key_part(&params.alert_type),
        key_part(&params.device_id),
    ]);

    let value = state
        .cache
        .get_or_compute(key, None, async {
            let alerts = state
                .queries
                .alerts_by_timeframe(
                    params.start_time,
                    params.end_time,
                    params.alert_type,
                    params.device_id.clone(),
                )
                .await?;
            Ok(serde_json::to_value(alerts)?)
        })
        .await?;

    Ok(Json(value.as_ref().clone()))
}

fn default_radius_km() -> f64 {
    1.0
}

#[derive(Debug, Deserialize)]
struct LocationParams {
    lat: f64,
    lon: f64,
    #[serde(default = "default_radius_km")]
    radius_km: f64,
}

/// GET /analytics/alerts/location - Alerts near a point.
async fn get_alerts_by_location(
    State(state): State<AppState>,
    Query(params): Query<LocationParams>,
) -> Result<Json<serde_json::Value>> {
    let key = state.cache.key([
        "location".to_string(),
        format!("{:.4}", params.lat),
        format!("{:.4}", params.lon),
        format!("{:.1}", params.radius_km),
    ]);

    let value = state
        .cache
        .get_or_compute(key, None, async {
            let alerts = state
                .queries
                .alerts_by_location(params.lat, params.lon, params.radius_km)
                .await?;
            Ok(serde_json::to_value(alerts)?)
        })
        .await?;

    Ok(Json(value.as_ref().clone()))
}

#[derive(Debug, Deserialize)]
struct CountsParams {
    start_time: Option<DateTime<Utc>>,
    end_time: Option<DateTime<Utc>>,
}

/// GET /analytics/alerts/counts - Alert counts grouped by category.
async fn get_alert_counts(
    State(state): State<AppState>,
    Query(params): Query<CountsParams>,
) -> Result<Json<serde_json::Value>> {
    let key = state.cache.key([
        "counts".to_string(),
        params.start_time.map_or_else(|| "all".to_string(), iso),
        params.end_time.map_or_else(|| "all".to_string(), iso),
    ]);

    let value = state
        .cache
        .get_or_compute(key, None, async {
            let counts = state
                .queries
                .alert_counts(params.start_time, params.end_time)
                .await?;
            Ok(serde_json::to_value(counts)?)
        })
        .await?;

    Ok(Json(value.as_ref().clone()))
}

fn default_trend_days() -> u32 {
    7
}

fn default_interval_hours() -> u32 {
    24
}

#[derive(Debug, Deserialize)]
struct TrendsParams {
    #[serde(default = "default_trend_days")]
    days: u32,
    #[serde(default = "default_interval_hours")]
    interval_hours: u32,
}

/// GET /analytics/alerts/trends - Per-category trend lines.
async fn get_alert_trends(
    State(state): State<AppState>,
    Query(params): Query<TrendsParams>,
) -> Result<Json<serde_json::Value>> {
    let key = state.cache.key([
        "trends".to_string(),
        params.days.to_string(),
        params.interval_hours.to_string(),
    ]);

    let value = state
        .cache
        .get_or_compute(key, None, async {
            let trends = state
                .queries
                .alert_trends(params.days, params.interval_hours)
                .await?;
            Ok(serde_json::to_value(trends)?)
        })
        .await?;

    Ok(Json(value.as_ref().clone()))
}

/// GET /analytics/devices/{device_id}/statistics - Per-device stats.
///
/// Cached with a short TTL so `last_seen` stays reasonably fresh.
async fn get_device_statistics(
    State(state): State<AppState>,
    Path(device_id): Path<String>,
) -> Result<Json<serde_json::Value>> {
    let key = state
        .cache
        .key(["device".to_string(), device_id.clone(), "stats".to_string()]);

    let value = state
        .cache
        .get_or_compute(key, Some(DEVICE_STATS_TTL), async {
            let stats = state.queries.device_statistics(device_id).await?;
            Ok(serde_json::to_value(stats)?)
        })
        .await?;

    Ok(Json(value.as_ref().clone()))
}

// ============================================================================
// GET /ws/alerts - WebSocket subscription
// ============================================================================

/// GET /ws/alerts - WebSocket subscription endpoint.
///
/// # WebSocket Protocol
///
/// On connect the server sends a `system` confirmation message. Every
/// ingested alert is pushed as a `new_alert` message. Any text frame
/// from the client is treated as a keep-alive and answered with `pong`.
async fn get_ws(State(state): State<AppState>, ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(move |socket| handle_websocket(socket, state.registry.clone()))
}

/// Handles an established WebSocket connection.
async fn handle_websocket(socket: axum::extract::ws::WebSocket, registry: ConnectionRegistry) {
    use axum::extract::ws::Message;
    use futures_util::{SinkExt, StreamExt};

    let (mut sender, mut receiver) = socket.split();
    let (connection_id, mut alert_rx) = registry.connect();

    // Confirmation frame first, before any broadcast can reach us.
    match ServerMessage::hello().to_json() {
        Ok(hello) => {
            if let Err(err) = sender.send(Message::Text(hello.into())).await {
                debug!(connection_id = %connection_id, error = %err, "failed to send hello");
                registry.disconnect(connection_id);
                return;
            }
        }
        Err(err) => {
            warn!(error = %err, "failed to encode hello message");
        }
    }

    // Forward broadcast and per-connection messages to the client.
    let forward_task = tokio::spawn(async move {
        while let Some(message) = alert_rx.recv().await {
            trace!(connection_id = %connection_id, "sending message to websocket client");
            if let Err(err) = sender.send(Message::Text(message.into())).await {
                debug!(connection_id = %connection_id, error = %err, "failed to send to websocket client");
                break;
            }
        }
    });

    // Drain client frames; any text frame is a keep-alive.
    while let Some(msg) = receiver.next().await {
        match msg {
            Ok(Message::Close(_)) => {
                debug!(connection_id = %connection_id, "websocket client sent close frame");
                break;
            }
            Ok(Message::Text(_)) => match ServerMessage::pong().to_json() {
                Ok(pong) => {
                    registry.send_to(connection_id, pong);
                }
                Err(err) => {
                    warn!(error = %err, "failed to encode pong message");
                }
            },
            Ok(Message::Ping(data)) => {
                // axum answers low-level pings automatically.
                trace!(data_len = data.len(), "received ping");
            }
            Ok(_) => {}
            Err(err) => {
                debug!(connection_id = %connection_id, error = %err, "websocket error");
                break;
            }
        }
    }

    registry.disconnect(connection_id);
    forward_task.abort();
    info!(connection_id = %connection_id, "websocket session ended");
}

/// GET /ws/info - WebSocket connection metadata.
async fn get_ws_info(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({
        "websocket_endpoint": "/ws/alerts",
        "active_connections": state.registry.connection_count(),
        "connection_url": format!("ws://localhost:{}/ws/alerts", state.config.port),
        "status": "operational",
        "supported_events": {
            "incoming": ["ping", "message"],
            "outgoing": ["system", "pong", "new_alert"]
        }
    }))
}

// ============================================================================
// GET /health - Health Check
// ============================================================================

/// Response body for health check endpoint.
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Server status (always "ok" if responding).
    pub status: String,

    /// Number of active WebSocket connections.
    pub connections: usize,

    /// Server uptime in seconds.
    pub uptime_seconds: u64,
}

/// GET /health - Health check endpoint. No authentication required.
async fn get_health(State(state): State<AppState>) -> Json<HealthResponse> {
    let uptime = state.start_time.elapsed();

    Json(HealthResponse {
        status: "ok".to_string(),
        connections: state.registry.connection_count(),
        uptime_seconds: uptime.as_secs(),
    })
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use serde_json::Value;
    use tower::ServiceExt;

    use crate::config::MqttSettings;

    fn test_config() -> Config {
        Config {
            port: 8080,
            database_path: ":memory:".to_string(),
            mqtt: MqttSettings {
                host: "localhost".to_string(),
                port: 1883,
                username: None,
                password: None,
                topic: "obex/alerts".to_string(),
                disabled: true,
            },
            cache_prefix: "obex".to_string(),
            cache_ttl_secs: 3600,
        }
    }

    async fn test_state() -> AppState {
        let store = AlertStore::open_in_memory().await.expect("in-memory store");
        AppState::new(test_config(), store)
    }

    fn alert_body(device: &str, timestamp: &str) -> String {
        json!({
            "device_id": device,
            "timestamp": timestamp,
            "alert_type": "weapon_detection",
            "location_lat": 6.5244,
            "location_lon": 3.3792,
            "payload": {"confidence": 0.97}
        })
        .to_string()
    }

    async fn send_json(app: &Router, method: &str, uri: &str, body: Option<String>) -> Response {
        let mut builder = Request::builder().method(method).uri(uri);
        let body = match body {
            Some(body) => {
                builder = builder.header("Content-Type", "application/json");
                Body::from(body)
            }
            None => Body::empty(),
        };
        app.clone()
            .oneshot(builder.body(body).unwrap())
            .await
            .unwrap()
    }

    async fn json_body(response: Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    // ========================================================================
    // Health endpoint tests
    // ========================================================================

    #[tokio::test]
    async fn health_returns_ok_status() {
        let state = test_state().await;
        let app = create_router(state);

        let response = send_json(&app, "GET", "/health", None).await;
        assert_eq!(response.status(), StatusCode::OK);

        let health = json_body(response).await;
        assert_eq!(health["status"], "ok");
        assert_eq!(health["connections"], 0);
    }

    #[tokio::test]
    async fn health_reports_connection_count() {
        let state = test_state().await;
        let (_id, _rx) = state.registry.connect();
        let app = create_router(state);

        let health = json_body(send_json(&app, "GET", "/health", None).await).await;
        assert_eq!(health["connections"], 1);
    }

    // ========================================================================
    // POST /alerts tests
    // ========================================================================

    #[tokio::test]
    async fn post_alert_persists_and_returns_record() {
        let state = test_state().await;
        let app = create_router(state.clone());

        let response = send_json(
            &app,
            "POST",
            "/alerts",
            Some(alert_body("bus-7", "2024-06-01T12:00:00Z")),
        )
        .await;
        assert_eq!(response.status(), StatusCode::CREATED);

        let alert = json_body(response).await;
        assert_eq!(alert["device_id"], "bus-7");
        assert_eq!(alert["alert_type"], "weapon_detection");
        assert!(alert["id"].is_string());

        let stored = state.store.all_alerts().await.unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].id.to_string(), alert["id"]);
    }

    #[tokio::test]
    async fn post_alert_broadcasts_to_connected_clients() {
        let state = test_state().await;
        let (_id, mut rx) = state.registry.connect();
        let app = create_router(state);

        send_json(
            &app,
            "POST",
            "/alerts",
            Some(alert_body("bus-7", "2024-06-01T12:00:00Z")),
        )
        .await;

        let frame: Value = serde_json::from_str(&rx.recv().await.unwrap()).unwrap();
        assert_eq!(frame["type"], "new_alert");
        assert_eq!(frame["alert"]["device_id"], "bus-7");
    }

    #[tokio::test]
    async fn post_alert_rejects_unknown_alert_type() {
        let state = test_state().await;
        let app = create_router(state);

        let body = json!({
            "device_id": "bus-7",
            "timestamp": "2024-06-01T12:00:00Z",
            "alert_type": "jaywalking"
        })
        .to_string();

        let response = send_json(&app, "POST", "/alerts", Some(body)).await;
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn post_alert_rejects_out_of_range_latitude() {
        let state = test_state().await;
        let app = create_router(state.clone());

        let body = json!({
            "device_id": "bus-7",
            "timestamp": "2024-06-01T12:00:00Z",
            "alert_type": "weapon_detection",
            "location_lat": 94.5
        })
        .to_string();

        let response = send_json(&app, "POST", "/alerts", Some(body)).await;
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert!(state.store.all_alerts().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn get_alerts_newest_first() {
        let state = test_state().await;
        let app = create_router(state);

        send_json(
            &app,
            "POST",
            "/alerts",
            Some(alert_body("older", "2024-06-01T10:00:00Z")),
        )
        .await;
        send_json(
            &app,
            "POST",
            "/alerts",
            Some(alert_body("newer", "2024-06-01T11:00:00Z")),
        )
        .await;

        let alerts = json_body(send_json(&app, "GET", "/alerts", None).await).await;
        assert_eq!(alerts[0]["device_id"], "newer");
        assert_eq!(alerts[1]["device_id"], "older");
    }

    // ========================================================================
    // Analytics endpoint tests
    // ========================================================================

    #[tokio::test]
    async fn timeframe_endpoint_filters_by_window() {
        let state = test_state().await;
        let app = create_router(state);

        send_json(
            &app,
            "POST",
            "/alerts",
            Some(alert_body("bus-7", "2024-06-01T10:00:00Z")),
        )
        .await;
        send_json(
            &app,
            "POST",
            "/alerts",
            Some(alert_body("bus-7", "2024-06-02T10:00:00Z")),
        )
        .await;

        let response = send_json(
            &app,
            "GET",
            "/analytics/alerts/timeframe?start_time=2024-06-01T00:00:00Z&end_time=2024-06-01T23:59:59Z",
            None,
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);

        let alerts = json_body(response).await;
        assert_eq!(alerts.as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn timeframe_endpoint_rejects_inverted_window() {
        let state = test_state().await;
        let app = create_router(state);

        let response = send_json(
            &app,
            "GET",
            "/analytics/alerts/timeframe?start_time=2024-06-02T00:00:00Z&end_time=2024-06-01T00:00:00Z",
            None,
        )
        .await;
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

        let body = json_body(response).await;
        assert!(body["error"].as_str().unwrap().contains("end_time"));
    }

    #[tokio::test]
    async fn location_endpoint_rejects_zero_radius() {
        let state = test_state().await;
        let app = create_router(state);

        let response = send_json(
            &app,
            "GET",
            "/analytics/alerts/location?lat=6.5244&lon=3.3792&radius_km=0",
            None,
        )
        .await;
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn location_endpoint_returns_nearby_alerts() {
        let state = test_state().await;
        let app = create_router(state);

        send_json(
            &app,
            "POST",
            "/alerts",
            Some(alert_body("bus-7", "2024-06-01T10:00:00Z")),
        )
        .await;

        let response = send_json(
            &app,
            "GET",
            "/analytics/alerts/location?lat=6.5244&lon=3.3792",
            None,
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        let alerts = json_body(response).await;
        assert_eq!(alerts.as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn counts_endpoint_groups_by_type() {
        let state = test_state().await;
        let app = create_router(state);

        send_json(
            &app,
            "POST",
            "/alerts",
            Some(alert_body("bus-7", "2024-06-01T10:00:00Z")),
        )
        .await;
        send_json(
            &app,
            "POST",
            "/alerts",
            Some(alert_body("bus-8", "2024-06-01T11:00:00Z")),
        )
        .await;

        let counts = json_body(send_json(&app, "GET", "/analytics/alerts/counts", None).await).await;
        assert_eq!(counts["weapon_detection"], 2);
    }

    #[tokio::test]
    async fn counts_endpoint_serves_cached_response() {
        let state = test_state().await;
        let app = create_router(state);

        send_json(
            &app,
            "POST",
            "/alerts",
            Some(alert_body("bus-7", "2024-06-01T10:00:00Z")),
        )
        .await;

        let first = json_body(send_json(&app, "GET", "/analytics/alerts/counts", None).await).await;
        assert_eq!(first["weapon_detection"], 1);

        // A later write is invisible until the cached entry expires.
        send_json(
            &app,
            "POST",
            "/alerts",
            Some(alert_body("bus-8", "2024-06-01T11:00:00Z")),
        )
        .await;

        let second = json_body(send_json(&app, "GET", "/analytics/alerts/counts", None).await).await;
        assert_eq!(second["weapon_detection"], 1);
    }

    #[tokio::test]
    async fn timeframe_windows_differing_in_subseconds_are_cached_separately() {
        let state = test_state().await;
        let app = create_router(state);

        send_json(
            &app,
            "POST",
            "/alerts",
            Some(alert_body("bus-7", "2024-06-01T12:00:00.500Z")),
        )
        .await;

        // A window that ends just before the alert is empty.
        let narrow = json_body(
            send_json(
                &app,
                "GET",
                "/analytics/alerts/timeframe?start_time=2024-06-01T12:00:00.000Z&end_time=2024-06-01T12:00:00.400Z",
                None,
            )
            .await,
        )
        .await;
        assert_eq!(narrow.as_array().unwrap().len(), 0);

        // Widening only the sub-second part must miss the cache and
        // pick up the alert.
        let wide = json_body(
            send_json(
                &app,
                "GET",
                "/analytics/alerts/timeframe?start_time=2024-06-01T12:00:00.000Z&end_time=2024-06-01T12:00:00.900Z",
                None,
            )
            .await,
        )
        .await;
        assert_eq!(wide.as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn trends_endpoint_uses_daily_buckets_by_default() {
        let state = test_state().await;
        let app = create_router(state);

        let now = Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true);
        send_json(&app, "POST", "/alerts", Some(alert_body("bus-7", &now))).await;

        let trends = json_body(send_json(&app, "GET", "/analytics/alerts/trends", None).await).await;
        let points = trends["weapon_detection"].as_array().unwrap();
        assert_eq!(points.len(), 1);
        assert_eq!(points[0]["count"], 1);
    }

    #[tokio::test]
    async fn device_statistics_endpoint_aggregates() {
        let state = test_state().await;
        let app = create_router(state);

        send_json(
            &app,
            "POST",
            "/alerts",
            Some(alert_body("bus-7", "2024-06-01T10:00:00Z")),
        )
        .await;

        let stats = json_body(
            send_json(&app, "GET", "/analytics/devices/bus-7/statistics", None).await,
        )
        .await;
        assert_eq!(stats["total_alerts"], 1);
        assert_eq!(stats["alerts_by_type"]["weapon_detection"], 1);
        assert_eq!(stats["last_seen"], "2024-06-01T10:00:00Z");
    }

    #[tokio::test]
    async fn device_statistics_for_unknown_device_is_empty() {
        let state = test_state().await;
        let app = create_router(state);

        let stats = json_body(
            send_json(&app, "GET", "/analytics/devices/ghost/statistics", None).await,
        )
        .await;
        assert_eq!(stats["total_alerts"], 0);
        assert!(stats["last_seen"].is_null());
    }

    // ========================================================================
    // WebSocket info tests
    // ========================================================================

    #[tokio::test]
    async fn ws_info_reports_endpoint_and_connections() {
        let state = test_state().await;
        let (_id, _rx) = state.registry.connect();
        let app = create_router(state);

        let info = json_body(send_json(&app, "GET", "/ws/info", None).await).await;
        assert_eq!(info["websocket_endpoint"], "/ws/alerts");
        assert_eq!(info["active_connections"], 1);
        assert_eq!(info["status"], "operational");
    }
}
