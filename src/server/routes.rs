//! HTTP handlers

use crate::buffer::BufferKey;
use crate::error::Error;
use crate::ingest::IngestResponse;
use crate::sensors::{Sample, SensorType, Timestamp};
use crate::server::state::AppState;
use crate::spectral::SpectralError;
use crate::storage::TableStats;
use axum::{
    body::{to_bytes, Body},
    extract::{ConnectInfo, DefaultBodyLimit, Json, Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Router,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::time::Duration;
use tracing::warn;

/// Ingestion route. The body cap is enforced by the handler so an oversized
/// batch still gets a status object.
pub fn ingest_router() -> Router<AppState> {
    Router::new().route("/data", post(ingest).layer(DefaultBodyLimit::disable()))
}

/// Create the sensor API router
pub fn create_router() -> Router<AppState> {
    Router::new()
        .route("/stats", get(stats))
        .route("/export", get(export_clients))
        .route("/clients", get(active_clients))
        .route("/clients/:client_id/samples", get(client_samples))
        .route("/clients/:client_id/latest", get(client_latest))
        .route("/clients/:client_id/features", get(client_features))
        .route("/clients/:client_id/export", get(client_export))
        .route("/tags", get(list_tags))
        .route("/tags/:client_id", put(set_tag))
}

/// Maps crate errors onto HTTP statuses.
pub struct ApiError(Error);

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        ApiError(err)
    }
}

impl From<SpectralError> for ApiError {
    fn from(err: SpectralError) -> Self {
        ApiError(Error::Analysis(err))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            Error::Validation(_) => StatusCode::BAD_REQUEST,
            Error::Analysis(SpectralError::InsufficientSamples { .. }) => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            Error::Analysis(_) => StatusCode::BAD_REQUEST,
            Error::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            warn!("request failed: {}", self.0);
        }
        (
            status,
            Json(serde_json::json!({ "error": self.0.to_string() })),
        )
            .into_response()
    }
}

type ApiResult<T> = std::result::Result<T, ApiError>;

fn require_supported(state: &AppState, sensor: SensorType) -> ApiResult<()> {
    if state.supports(sensor) {
        Ok(())
    } else {
        Err(Error::Validation(format!("Sensor {} is not enabled", sensor)).into())
    }
}

/// Ingest one batch. Always answers 200; failures are in the body.
async fn ingest(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    body: Body,
) -> Json<IngestResponse> {
    let limit = state.config.server.max_body_bytes;
    match to_bytes(body, limit).await {
        Ok(bytes) => Json(state.gateway.ingest(&bytes, peer).await),
        Err(e) => Json(state.gateway.reject(
            peer,
            format!("Failed to read batch (limit {} bytes): {}", limit, e),
        )),
    }
}

#[derive(Debug, Deserialize)]
struct StatsQuery {
    sensor: Option<SensorType>,
}

#[derive(Debug, Serialize)]
struct StatsResponse {
    tables: BTreeMap<String, TableStats>,
    ingest: crate::ingest::IngestStatsSnapshot,
    live_streams: usize,
}

async fn stats(
    State(state): State<AppState>,
    Query(query): Query<StatsQuery>,
) -> ApiResult<Json<StatsResponse>> {
    let sensors = match query.sensor {
        Some(sensor) => {
            require_supported(&state, sensor)?;
            vec![sensor]
        }
        None => state.config.sensors.supported.clone(),
    };
    let mut tables = BTreeMap::new();
    for sensor in sensors {
        tables.insert(sensor.table_name(), state.store.stats(sensor).await?);
    }
    Ok(Json(StatsResponse {
        tables,
        ingest: state.gateway.stats(),
        live_streams: state.gateway.buffer().keys().len(),
    }))
}

#[derive(Debug, Deserialize)]
struct ClientsQuery {
    sensor: Option<SensorType>,
    lookback_secs: Option<u64>,
}

#[derive(Debug, Serialize)]
struct ClientEntry {
    client_id: String,
    tag: Option<String>,
}

/// Clients that sent data within the lookback window, with their tags.
async fn active_clients(
    State(state): State<AppState>,
    Query(query): Query<ClientsQuery>,
) -> ApiResult<Json<Vec<ClientEntry>>> {
    let sensor = query.sensor.unwrap_or(SensorType::Accelerometer);
    require_supported(&state, sensor)?;
    let lookback = query
        .lookback_secs
        .unwrap_or(state.config.analysis.active_lookback_secs);
    let since = Timestamp::now().saturating_sub(Duration::from_secs(lookback));

    let clients = state.store.distinct_clients(sensor, since).await?;
    let mut tags = state.registry.get_all().await?;
    Ok(Json(
        clients
            .into_iter()
            .map(|client_id| ClientEntry {
                tag: tags.remove(&client_id),
                client_id,
            })
            .collect(),
    ))
}

#[derive(Debug, Deserialize)]
struct RangeQuery {
    sensor: Option<SensorType>,
    seconds: Option<u64>,
}

impl RangeQuery {
    fn window(&self) -> (Timestamp, Timestamp) {
        let end = Timestamp::now();
        let seconds = self.seconds.unwrap_or(10);
        (end.saturating_sub(Duration::from_secs(seconds)), end)
    }
}

/// Durable samples of one client over the last `seconds` (default 10).
async fn client_samples(
    State(state): State<AppState>,
    Path(client_id): Path<String>,
    Query(query): Query<RangeQuery>,
) -> ApiResult<Json<Vec<Sample>>> {
    let sensor = query.sensor.unwrap_or(SensorType::Accelerometer);
    require_supported(&state, sensor)?;
    let (start, end) = query.window();
    Ok(Json(
        state
            .store
            .query_range(sensor, &client_id, start, end)
            .await?,
    ))
}

#[derive(Debug, Deserialize)]
struct LatestQuery {
    sensor: Option<SensorType>,
}

/// Most recent sample of one client; defaults to its location fix.
async fn client_latest(
    State(state): State<AppState>,
    Path(client_id): Path<String>,
    Query(query): Query<LatestQuery>,
) -> ApiResult<Response> {
    let sensor = query.sensor.unwrap_or(SensorType::Location);
    require_supported(&state, sensor)?;
    Ok(match state.store.latest(sensor, &client_id).await? {
        Some(sample) => Json(sample).into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({
                "error": format!("No {} data for client {}", sensor, client_id)
            })),
        )
            .into_response(),
    })
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
enum FeatureSource {
    #[default]
    Live,
    Store,
}

#[derive(Debug, Deserialize)]
struct FeaturesQuery {
    sensor: Option<SensorType>,
    #[serde(default)]
    source: FeatureSource,
    seconds: Option<u64>,
}

/// Spectral features of one client's motion, from the live window or from
/// durable history.
async fn client_features(
    State(state): State<AppState>,
    Path(client_id): Path<String>,
    Query(query): Query<FeaturesQuery>,
) -> ApiResult<Json<crate::analysis::MotionFeatures>> {
    let sensor = query.sensor.unwrap_or(SensorType::Accelerometer);
    require_supported(&state, sensor)?;
    if !sensor.is_motion() {
        return Err(Error::Validation(format!("{} has no axes to analyse", sensor)).into());
    }

    let features = match query.source {
        FeatureSource::Live => {
            let window = state
                .gateway
                .buffer()
                .snapshot(&BufferKey::new(client_id, sensor));
            state.extractor.from_window(&window)?
        }
        FeatureSource::Store => {
            let range = RangeQuery {
                sensor: Some(sensor),
                seconds: query.seconds.or(Some(state.config.buffer.window_secs.ceil() as u64)),
            };
            let (start, end) = range.window();
            let samples = state
                .store
                .query_range(sensor, &client_id, start, end)
                .await?;
            state.extractor.from_samples(&samples)?
        }
    };
    Ok(Json(features))
}

/// Every client with stored data in any supported table, regardless of age.
async fn export_clients(State(state): State<AppState>) -> ApiResult<Json<Vec<ClientEntry>>> {
    let clients = state
        .store
        .all_clients(&state.config.sensors.supported)
        .await?;
    let mut tags = state.registry.get_all().await?;
    Ok(Json(
        clients
            .into_iter()
            .map(|client_id| ClientEntry {
                tag: tags.remove(&client_id),
                client_id,
            })
            .collect(),
    ))
}

#[derive(Debug, Serialize)]
struct ClientExport {
    client_id: String,
    tag: Option<String>,
    /// Ordered rows per table name; tables without rows for the client are
    /// left out.
    tables: BTreeMap<String, Vec<Sample>>,
}

/// Full stored history of one client across all supported tables.
async fn client_export(
    State(state): State<AppState>,
    Path(client_id): Path<String>,
) -> ApiResult<Response> {
    let mut tables = BTreeMap::new();
    for sensor in &state.config.sensors.supported {
        let rows = state.store.client_history(*sensor, &client_id).await?;
        if !rows.is_empty() {
            tables.insert(sensor.table_name(), rows);
        }
    }
    if tables.is_empty() {
        return Ok((
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({
                "error": format!("No stored data for client {}", client_id)
            })),
        )
            .into_response());
    }
    let tag = state.registry.tag_of(&client_id).await?;
    Ok(Json(ClientExport {
        client_id,
        tag,
        tables,
    })
    .into_response())
}

async fn list_tags(State(state): State<AppState>) -> ApiResult<Json<BTreeMap<String, String>>> {
    Ok(Json(state.registry.get_all().await?))
}

#[derive(Debug, Deserialize)]
struct TagRequest {
    tag: String,
}

async fn set_tag(
    State(state): State<AppState>,
    Path(client_id): Path<String>,
    Json(request): Json<TagRequest>,
) -> ApiResult<Json<serde_json::Value>> {
    state.registry.upsert(&client_id, &request.tag).await?;
    Ok(Json(serde_json::json!({
        "client_id": client_id.trim(),
        "tag": request.tag.trim(),
    })))
}
