// =============================================================================
// FEDREC CORE — api.rs
// Coordinator HTTP API — client registration and run status
// =============================================================================

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use crate::client::{ClientId, ClientInfo, ClientRegistry, HttpClientSession};
use crate::constants::{SERVICE_NAME, VERSION};
use crate::coordinator::{CoordinatorState, RoundRecord, StatusHandle};

#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<ClientRegistry>,
    pub status: StatusHandle,
    pub client_timeout: Duration,
}

pub struct ApiError(StatusCode, String);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.0, Json(serde_json::json!({ "error": self.1 }))).into_response()
    }
}

#[derive(Serialize)]
pub struct StatusResponse {
    pub service: String,
    pub version: String,
    #[serde(flatten)]
    pub state: CoordinatorState,
    pub finished: bool,
    pub num_rounds: u32,
    pub rounds_completed: u32,
    pub registered_clients: usize,
    pub parameter_shapes: Vec<Vec<usize>>,
    pub timestamp: String,
}

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub client_id: Option<ClientId>,
    pub endpoint: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RegisterResponse {
    pub client_id: ClientId,
    pub replaced: bool,
}

pub async fn status_handler(State(app): State<AppState>) -> Json<StatusResponse> {
    let status = app.status.read().await.clone();
    Json(StatusResponse {
        service: SERVICE_NAME.to_string(),
        version: VERSION.to_string(),
        finished: status.state.is_terminal(),
        state: status.state,
        num_rounds: status.num_rounds,
        rounds_completed: status.rounds_completed,
        registered_clients: app.registry.len().await,
        parameter_shapes: status.parameter_shapes,
        timestamp: chrono::Utc::now().to_rfc3339(),
    })
}

async fn list_clients(State(app): State<AppState>) -> Json<Vec<ClientInfo>> {
    Json(app.registry.list().await)
}

async fn register_client(State(app): State<AppState>, Json(req): Json<RegisterRequest>)
    -> Result<(StatusCode, Json<RegisterResponse>), ApiError> {
    let endpoint = req.endpoint.trim();
    if !(endpoint.starts_with("http://") || endpoint.starts_with("https://")) {
        return Err(ApiError(StatusCode::BAD_REQUEST,
            format!("endpoint must be an http(s) URL, got `{}`", endpoint)));
    }
    let client_id = req.client_id.unwrap_or_else(ClientId::generate);
    let session = HttpClientSession::new(client_id.clone(), endpoint, app.client_timeout)
        .map_err(|e| ApiError(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;
    let endpoint = session.endpoint().to_string();
    let replaced = app.registry.register(Arc::new(session), Some(endpoint)).await;
    Ok((StatusCode::CREATED, Json(RegisterResponse { client_id, replaced })))
}

async fn deregister_client(State(app): State<AppState>, Path(id): Path<String>) -> StatusCode {
    if app.registry.deregister(&ClientId::new(id)).await {
        StatusCode::NO_CONTENT
    } else {
        StatusCode::NOT_FOUND
    }
}

async fn rounds_handler(State(app): State<AppState>) -> Json<Vec<RoundRecord>> {
    Json(app.status.read().await.history.clone())
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/v1/status", get(status_handler))
        .route("/v1/clients", get(list_clients).post(register_client))
        .route("/v1/clients/:id", delete(deregister_client))
        .route("/v1/rounds", get(rounds_handler))
        .with_state(state)
}
