//! HTTP API for ingestion, entity queries, health checks and Prometheus metrics

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use prometheus::{Encoder, TextEncoder};
use sentinel_lib::{
    anomaly::{AlertmanagerPayload, Alerter},
    health::{components, ComponentStatus, HealthRegistry},
    monitor::{CheckStatus, IngestOutcome, Monitor},
    observability::SentinelMetrics,
    DetectorError, Discord, EntitySnapshot,
};
use serde::{Deserialize, Serialize};
use tracing::{error, info};

/// Default number of discords returned by the discords endpoint
const DEFAULT_DISCORDS: usize = 3;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub monitor: Arc<Monitor>,
    pub health_registry: HealthRegistry,
    pub metrics: SentinelMetrics,
    pub alerter: Alerter,
}

impl AppState {
    pub fn new(
        monitor: Arc<Monitor>,
        health_registry: HealthRegistry,
        metrics: SentinelMetrics,
        alerter: Alerter,
    ) -> Self {
        Self {
            monitor,
            health_registry,
            metrics,
            alerter,
        }
    }
}

/// One row of channel values for an entity
#[derive(Debug, Deserialize)]
pub struct SampleRequest {
    pub timestamp: i64,
    pub values: BTreeMap<String, f64>,
}

/// One raw measurement row, shaped by the measurement schema
#[derive(Debug, Deserialize)]
pub struct MeasurementRequest {
    pub timestamp: i64,
    pub fields: HashMap<String, f64>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct IngestResponse {
    pub entity: String,
    pub anomaly_status: CheckStatus,
    pub prediction_status: CheckStatus,
    pub alerts: AlertmanagerPayload,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct EntitiesResponse {
    pub entities: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DiscordsResponse {
    pub entity: String,
    pub discords: Vec<Discord>,
}

#[derive(Debug, Deserialize)]
pub struct DiscordsQuery {
    pub k: Option<usize>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    /// Whether the same request may succeed later without changes
    pub retryable: bool,
}

/// Error returned by the API handlers
#[derive(Debug)]
pub enum ApiError {
    Detector(DetectorError),
    Internal(String),
}

impl From<DetectorError> for ApiError {
    fn from(err: DetectorError) -> Self {
        ApiError::Detector(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message, retryable) = match self {
            ApiError::Detector(err) => {
                let status = match &err {
                    DetectorError::UnknownEntity(_) => StatusCode::NOT_FOUND,
                    DetectorError::InsufficientHistory { .. } => StatusCode::CONFLICT,
                    DetectorError::ComputeTimeout { .. } => StatusCode::SERVICE_UNAVAILABLE,
                    DetectorError::StatePoisoned(_) => StatusCode::INTERNAL_SERVER_ERROR,
                    DetectorError::InvalidArgument(_)
                    | DetectorError::MalformedSample { .. }
                    | DetectorError::DimensionMismatch { .. } => StatusCode::BAD_REQUEST,
                };
                (status, err.to_string(), err.is_transient())
            }
            ApiError::Internal(message) => {
                error!(error = %message, "Request handler failed");
                (StatusCode::INTERNAL_SERVER_ERROR, message, false)
            }
        };

        let body = ErrorResponse {
            error: message,
            retryable,
        };
        (status, Json(body)).into_response()
    }
}

/// Health check response - returns 200 if healthy, 503 if unhealthy
async fn healthz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let health = state.health_registry.health().await;

    let status_code = match health.status {
        ComponentStatus::Healthy => StatusCode::OK,
        ComponentStatus::Degraded => StatusCode::OK, // Still operational
        ComponentStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    (status_code, Json(health))
}

/// Readiness check response - returns 200 if ready, 503 if not ready
async fn readyz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let readiness = state.health_registry.readiness().await;

    let status_code = if readiness.ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status_code, Json(readiness))
}

/// Prometheus metrics endpoint
async fn metrics() -> Result<impl IntoResponse, ApiError> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| ApiError::Internal(format!("failed to encode metrics: {}", e)))?;

    Ok((
        StatusCode::OK,
        [("content-type", "text/plain; charset=utf-8")],
        buffer,
    ))
}

async fn ingest_samples(
    State(state): State<Arc<AppState>>,
    Path(entity): Path<String>,
    Json(request): Json<SampleRequest>,
) -> Result<Json<IngestResponse>, ApiError> {
    let monitor = Arc::clone(&state.monitor);
    let entity_id = entity.clone();
    let outcome = tokio::task::spawn_blocking(move || {
        monitor.ingest(&entity_id, request.timestamp, &request.values)
    })
    .await
    .map_err(|e| ApiError::Internal(format!("ingestion task failed: {}", e)))?;

    report_engine(&state, &outcome).await;
    Ok(Json(respond(&state, entity, outcome?).await))
}

async fn ingest_measurement(
    State(state): State<Arc<AppState>>,
    Path((host, measurement)): Path<(String, String)>,
    Json(request): Json<MeasurementRequest>,
) -> Result<Json<IngestResponse>, ApiError> {
    let monitor = Arc::clone(&state.monitor);
    let entity = sentinel_lib::monitor::entity_id(&host, &measurement);
    let outcome = tokio::task::spawn_blocking(move || {
        monitor.ingest_measurement(&host, &measurement, request.timestamp, &request.fields)
    })
    .await
    .map_err(|e| ApiError::Internal(format!("ingestion task failed: {}", e)))?;

    report_engine(&state, &outcome).await;
    Ok(Json(respond(&state, entity, outcome?).await))
}

/// Reflect an ingestion result in engine health.
///
/// Rejected rows say nothing about the engine and leave it untouched.
async fn report_engine(state: &AppState, result: &Result<IngestOutcome, DetectorError>) {
    let registry = &state.health_registry;
    match result {
        Err(DetectorError::StatePoisoned(entity)) => {
            registry
                .set_unhealthy(
                    components::ENGINE,
                    format!("state of entity '{}' is poisoned", entity),
                )
                .await;
        }
        Err(_) => {}
        Ok(outcome) => match &outcome.anomaly_status {
            CheckStatus::Skipped { reason } => {
                registry.set_degraded(components::ENGINE, reason.clone()).await;
            }
            CheckStatus::Clear | CheckStatus::Alerted => {
                registry.set_healthy(components::ENGINE).await;
            }
            _ => {}
        },
    }
}

/// Reflect the prediction outcome in forecaster health and format alerts
async fn respond(state: &AppState, entity: String, outcome: IngestOutcome) -> IngestResponse {
    match &outcome.prediction_status {
        CheckStatus::Failed { reason } => {
            state
                .health_registry
                .set_degraded(components::FORECASTER, reason.clone())
                .await;
        }
        CheckStatus::Clear | CheckStatus::Alerted => {
            state.health_registry.set_healthy(components::FORECASTER).await;
        }
        _ => {}
    }

    state
        .metrics
        .set_entities_monitored(state.monitor.len() as i64);

    IngestResponse {
        entity,
        anomaly_status: outcome.anomaly_status,
        prediction_status: outcome.prediction_status,
        alerts: state.alerter.payload(&outcome.alerts),
    }
}

async fn list_entities(State(state): State<Arc<AppState>>) -> Json<EntitiesResponse> {
    Json(EntitiesResponse {
        entities: state.monitor.entity_ids(),
    })
}

async fn get_entity(
    State(state): State<Arc<AppState>>,
    Path(entity): Path<String>,
) -> Result<Json<EntitySnapshot>, ApiError> {
    Ok(Json(state.monitor.snapshot(&entity)?))
}

async fn get_discords(
    State(state): State<Arc<AppState>>,
    Path(entity): Path<String>,
    Query(query): Query<DiscordsQuery>,
) -> Result<Json<DiscordsResponse>, ApiError> {
    let k = query.k.unwrap_or(DEFAULT_DISCORDS);
    let discords = state.monitor.top_discords(&entity, k)?;
    Ok(Json(DiscordsResponse { entity, discords }))
}

async fn evict_entity(
    State(state): State<Arc<AppState>>,
    Path(entity): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.monitor.evict(&entity)?;
    state
        .metrics
        .set_entities_monitored(state.monitor.len() as i64);
    info!(entity = %entity, "Entity evicted");
    Ok(StatusCode::NO_CONTENT)
}

/// Create the API router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics))
        .route("/v1/entities", get(list_entities))
        .route("/v1/entities/:entity", get(get_entity).delete(evict_entity))
        .route("/v1/entities/:entity/samples", post(ingest_samples))
        .route("/v1/entities/:entity/discords", get(get_discords))
        .route(
            "/v1/hosts/:host/measurements/:measurement",
            post(ingest_measurement),
        )
        .with_state(state)
}

/// Start the API server
pub async fn serve(port: u16, state: Arc<AppState>) -> anyhow::Result<()> {
    let app = create_router(state);

    let addr = format!("0.0.0.0:{}", port);
    info!(addr = %addr, "Starting API server");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use sentinel_lib::monitor::MonitorConfig;

    async fn state() -> AppState {
        let health_registry = HealthRegistry::new();
        health_registry.register(components::ENGINE).await;
        AppState::new(
            Arc::new(Monitor::new(MonitorConfig::default()).unwrap()),
            health_registry,
            SentinelMetrics::new(),
            Alerter::new("test-node"),
        )
    }

    fn outcome(anomaly_status: CheckStatus) -> IngestOutcome {
        IngestOutcome {
            alerts: Vec::new(),
            anomaly_status,
            prediction_status: CheckStatus::Clear,
        }
    }

    async fn engine_status(state: &AppState) -> ComponentStatus {
        state.health_registry.health().await.components[components::ENGINE].status
    }

    #[tokio::test]
    async fn test_engine_health_follows_ingestion() {
        let state = state().await;

        let skipped = outcome(CheckStatus::Skipped {
            reason: "matrix profile computation exceeded its budget".to_string(),
        });
        report_engine(&state, &Ok(skipped)).await;
        assert_eq!(engine_status(&state).await, ComponentStatus::Degraded);

        report_engine(&state, &Ok(outcome(CheckStatus::Clear))).await;
        assert_eq!(engine_status(&state).await, ComponentStatus::Healthy);

        let poisoned = Err(DetectorError::StatePoisoned("host1/cpu".to_string()));
        report_engine(&state, &poisoned).await;
        assert_eq!(engine_status(&state).await, ComponentStatus::Unhealthy);

        state.health_registry.set_ready(true).await;
        assert!(!state.health_registry.readiness().await.ready);
    }

    #[tokio::test]
    async fn test_rejected_rows_leave_engine_healthy() {
        let state = state().await;
        let rejected = Err(DetectorError::invalid("row carries no channel values"));
        report_engine(&state, &rejected).await;
        report_engine(&state, &Ok(outcome(CheckStatus::WarmingUp { have: 1, need: 80 }))).await;
        assert_eq!(engine_status(&state).await, ComponentStatus::Healthy);
    }
}
