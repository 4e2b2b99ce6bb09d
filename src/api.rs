use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tower_http::cors::CorsLayer;

use crate::channel::{ChannelControl, ChannelSnapshot};
use crate::classifier::DynClassifier;
use crate::error::TransportError;
use crate::ingest::{IngestOutcome, IngestPath, Ingestor};
use crate::record::{Category, RecordId};
use crate::store::{Boards, StoreHealth};

#[derive(Clone)]
pub struct AppState {
    pub ingestor: Arc<Ingestor>,
    pub classifier: DynClassifier,
    /// Absent when no live feed is configured.
    pub channel: Option<ChannelControl>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "OK" }))
        .route("/submit", post(submit))
        .route("/ingest", post(ingest))
        .route("/records", get(records))
        .route("/records/{category}/{id}", delete(delete_record))
        .route("/reset", post(reset))
        .route("/channel", get(channel_status))
        .route("/channel/reconnect", post(channel_reconnect))
        .route("/stats", get(stats))
        .layer(CorsLayer::very_permissive())
        .with_state(state)
}

/// JSON error body: `{"error": "..."}`.
struct ApiError(StatusCode, String);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.0, Json(json!({ "error": self.1 }))).into_response()
    }
}

#[derive(Deserialize)]
struct SubmitReq {
    text: String,
}

async fn submit(
    State(state): State<AppState>,
    Json(body): Json<SubmitReq>,
) -> Result<Json<IngestOutcome>, ApiError> {
    let raw = match state.classifier.classify(&body.text).await {
        Ok(v) => v,
        Err(TransportError::EmptyInput) => {
            return Err(ApiError(StatusCode::BAD_REQUEST, "Message text is empty.".into()))
        }
        Err(e) => {
            tracing::warn!(target: "api", classifier = state.classifier.name(), error = %e, "classification failed");
            return Err(ApiError(
                StatusCode::BAD_GATEWAY,
                "Classification service is unavailable. Please try again.".into(),
            ));
        }
    };

    state
        .ingestor
        .ingest_value(&raw, IngestPath::Manual)
        .map(Json)
        .map_err(|e| {
            ApiError(
                StatusCode::BAD_GATEWAY,
                format!("Classification service returned an unusable response: {e}"),
            )
        })
}

async fn ingest(State(state): State<AppState>, body: Bytes) -> Result<Json<IngestOutcome>, ApiError> {
    state
        .ingestor
        .ingest_bytes(&body, IngestPath::Direct)
        .map(Json)
        .map_err(|e| ApiError(StatusCode::UNPROCESSABLE_ENTITY, e.to_string()))
}

async fn records(State(state): State<AppState>) -> Json<Boards> {
    Json(state.ingestor.store().snapshot())
}

async fn delete_record(
    State(state): State<AppState>,
    Path((category, id)): Path<(String, u64)>,
) -> Result<StatusCode, ApiError> {
    let category: Category = category
        .parse()
        .map_err(|e: String| ApiError(StatusCode::BAD_REQUEST, e))?;
    if state.ingestor.store().delete(RecordId(id), category) {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError(StatusCode::NOT_FOUND, format!("no record {id} in {category}")))
    }
}

async fn reset(State(state): State<AppState>) -> StatusCode {
    state.ingestor.store().reset();
    StatusCode::NO_CONTENT
}

async fn channel_status(State(state): State<AppState>) -> Result<Json<ChannelSnapshot>, ApiError> {
    match &state.channel {
        Some(ch) => Ok(Json(ch.snapshot())),
        None => Err(ApiError(StatusCode::NOT_FOUND, "live feed is not configured".into())),
    }
}

async fn channel_reconnect(State(state): State<AppState>) -> Result<StatusCode, ApiError> {
    let Some(ch) = &state.channel else {
        return Err(ApiError(StatusCode::NOT_FOUND, "live feed is not configured".into()));
    };
    let status = ch.snapshot().status;
    if !status.accepts_retrigger() {
        return Err(ApiError(
            StatusCode::CONFLICT,
            format!("live feed is already {}", status.as_str()),
        ));
    }
    if ch.reconnect().await {
        Ok(StatusCode::ACCEPTED)
    } else {
        Err(ApiError(StatusCode::SERVICE_UNAVAILABLE, "channel manager has stopped".into()))
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct StatsOut {
    cargo_seeking_transport: usize,
    transport_seeking_cargo: usize,
    quarantined: u64,
    persistence: StoreHealth,
}

async fn stats(State(state): State<AppState>) -> Json<StatsOut> {
    let store = state.ingestor.store();
    Json(StatsOut {
        cargo_seeking_transport: store.len(Category::CargoSeekingTransport),
        transport_seeking_cargo: store.len(Category::TransportSeekingCargo),
        quarantined: store.quarantined(),
        persistence: store.health(),
    })
}
