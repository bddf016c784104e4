use std::{path::PathBuf, sync::Arc};

use anyhow::Context;
use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info, warn};

use crate::{
    section::{LineId, SectionError, Segment, Station, StationId},
    service::LineService,
    store::memory::MemoryStore,
};

pub struct AppState {
    // One lock for every line: writes are fully serialised.
    service: Mutex<LineService<MemoryStore>>,
    snapshot: PathBuf,
}

impl AppState {
    pub fn new(service: LineService<MemoryStore>, snapshot: PathBuf) -> Self {
        Self {
            service: Mutex::new(service),
            snapshot,
        }
    }

    /// Runs `apply` against a copy of the current state and writes that copy to
    /// the snapshot. The copy only replaces the live state once the write went
    /// through, so a failed request never shows up in later reads.
    async fn commit<T>(
        &self,
        apply: impl FnOnce(&mut LineService<MemoryStore>) -> anyhow::Result<T>,
    ) -> anyhow::Result<T> {
        let mut service = self.service.lock().await;
        let mut draft = service.clone();
        let value = apply(&mut draft)?;

        let bytes = draft.store().to_bytes()?;
        tokio::fs::write(&self.snapshot, bytes)
            .await
            .with_context(|| format!("writing {:?}", self.snapshot))?;

        *service = draft;
        Ok(value)
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct LineRequest {
    name: String,
    color: String,
    up_station_id: u64,
    down_station_id: u64,
    distance: u32,
}

#[derive(Deserialize)]
struct LineUpdateRequest {
    name: String,
    color: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SectionRequest {
    up_station_id: u64,
    down_station_id: u64,
    distance: u32,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RemoveSectionQuery {
    station_id: u64,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct LineResponse {
    id: LineId,
    name: String,
    color: String,
    stations: Vec<Station>,
}

pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/lines", get(list_lines).post(create_line))
        .route(
            "/lines/{line_id}",
            get(show_line).put(update_line).delete(delete_line),
        )
        .route("/lines/{line_id}/stations", get(line_stations))
        .route(
            "/lines/{line_id}/sections",
            post(add_section).delete(remove_section),
        )
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

pub async fn serve(address: &str, state: AppState) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(address)
        .await
        .with_context(|| format!("binding {address}"))?;
    info!(address = %listener.local_addr()?, "Listening");

    axum::serve(listener, create_router(Arc::new(state))).await?;
    Ok(())
}

async fn health() -> &'static str {
    "OK"
}

async fn list_lines(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<LineResponse>>, ApiError> {
    let service = state.service.lock().await;
    let ids: Vec<LineId> = service.store().lines().map(|(id, _)| id).collect();

    let lines: Vec<LineResponse> = ids
        .into_iter()
        .map(|id| -> anyhow::Result<LineResponse> {
            let stations = service.stations(id)?;
            Ok(line_response(&service, id, stations)?)
        })
        .collect::<anyhow::Result<_>>()?;
    Ok(Json(lines))
}

async fn create_line(
    State(state): State<Arc<AppState>>,
    Json(request): Json<LineRequest>,
) -> Result<(StatusCode, Json<LineResponse>), ApiError> {
    let response = state
        .commit(|service| {
            let first = Segment::new(
                StationId::new(request.up_station_id),
                StationId::new(request.down_station_id),
                request.distance,
            )?;
            let line = service
                .store_mut()
                .create_line(request.name, request.color, first)?;
            let stations = service.stations(line)?;
            Ok(line_response(service, line, stations)?)
        })
        .await?;

    info!(line = %response.id, name = %response.name, "Created line");
    Ok((StatusCode::CREATED, Json(response)))
}

async fn show_line(
    state: State<Arc<AppState>>,
    line_id: Path<u64>,
) -> Result<Json<LineResponse>, ApiError> {
    line_stations(state, line_id).await
}

async fn update_line(
    State(state): State<Arc<AppState>>,
    Path(line_id): Path<u64>,
    Json(request): Json<LineUpdateRequest>,
) -> Result<Json<LineResponse>, ApiError> {
    let line = LineId::new(line_id);
    let response = state
        .commit(|service| {
            service
                .store_mut()
                .update_line(line, request.name, request.color)?;
            let stations = service.stations(line)?;
            Ok(line_response(service, line, stations)?)
        })
        .await?;

    info!(%line, name = %response.name, color = %response.color, "Updated line");
    Ok(Json(response))
}

async fn delete_line(
    State(state): State<Arc<AppState>>,
    Path(line_id): Path<u64>,
) -> Result<StatusCode, ApiError> {
    let line = LineId::new(line_id);
    let record = state
        .commit(|service| Ok(service.store_mut().delete_line(line)?))
        .await?;

    info!(%line, name = %record.name, "Deleted line");
    Ok(StatusCode::NO_CONTENT)
}

async fn line_stations(
    State(state): State<Arc<AppState>>,
    Path(line_id): Path<u64>,
) -> Result<Json<LineResponse>, ApiError> {
    let line = LineId::new(line_id);
    let service = state.service.lock().await;
    let stations = service.stations(line)?;

    Ok(Json(line_response(&service, line, stations)?))
}

async fn add_section(
    State(state): State<Arc<AppState>>,
    Path(line_id): Path<u64>,
    Json(request): Json<SectionRequest>,
) -> Result<Json<LineResponse>, ApiError> {
    let line = LineId::new(line_id);
    let response = state
        .commit(|service| {
            let stations = service.add_section(
                line,
                StationId::new(request.up_station_id),
                StationId::new(request.down_station_id),
                request.distance,
            )?;
            Ok(line_response(service, line, stations)?)
        })
        .await?;

    Ok(Json(response))
}

async fn remove_section(
    State(state): State<Arc<AppState>>,
    Path(line_id): Path<u64>,
    Query(query): Query<RemoveSectionQuery>,
) -> Result<Json<LineResponse>, ApiError> {
    let line = LineId::new(line_id);
    let response = state
        .commit(|service| {
            let stations = service.remove_section(line, StationId::new(query.station_id))?;
            Ok(line_response(service, line, stations)?)
        })
        .await?;

    Ok(Json(response))
}

fn line_response(
    service: &LineService<MemoryStore>,
    line: LineId,
    stations: Vec<Station>,
) -> Result<LineResponse, SectionError> {
    let record = service.store().line(line)?;
    Ok(LineResponse {
        id: line,
        name: record.name.clone(),
        color: record.color.clone(),
        stations,
    })
}

pub struct ApiError(anyhow::Error);

impl<E> From<E> for ApiError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = status_for(&self.0);
        if status.is_server_error() {
            error!(error = %self.0, "Request failed");
        } else {
            warn!(error = %self.0, "Rejected request");
        }

        let body = serde_json::json!({ "message": self.0.to_string() });
        (status, Json(body)).into_response()
    }
}

fn status_for(err: &anyhow::Error) -> StatusCode {
    match err.downcast_ref::<SectionError>() {
        Some(e) if e.is_not_found() => StatusCode::NOT_FOUND,
        // Stored rows no longer form a path; not the caller's fault
        Some(SectionError::BrokenChain(_)) => StatusCode::INTERNAL_SERVER_ERROR,
        Some(_) => StatusCode::BAD_REQUEST,
        None => StatusCode::INTERNAL_SERVER_ERROR,
    }
}
