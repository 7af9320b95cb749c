// =============================================================================
// FEDREC CORE — client_api.rs
// HTTP face of a ClientSession — the server side of HttpClientSession
// =============================================================================
//
//   GET  /v1/parameters  → GlobalParameters
//   POST /v1/fit         → ClientUpdate       (body: Instruction)
//   POST /v1/evaluate    → EvaluateOutcome    (body: Instruction)
// =============================================================================

use crate::client::{ClientId, ClientSession, ClientUpdate, EvaluateOutcome, Instruction};
use crate::error::ClientCallFailure;
use crate::params::GlobalParameters;
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

impl IntoResponse for ClientCallFailure {
    fn into_response(self) -> Response {
        let status = match &self {
            ClientCallFailure::Timeout => StatusCode::GATEWAY_TIMEOUT,
            ClientCallFailure::Transport(_) => StatusCode::BAD_GATEWAY,
            ClientCallFailure::Rejected(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ClientCallFailure::Cancelled => StatusCode::SERVICE_UNAVAILABLE,
        };
        (status, Json(serde_json::json!({ "error": self.to_string() }))).into_response()
    }
}

type Session = Arc<dyn ClientSession>;

async fn parameters_handler(State(session): State<Session>)
    -> Result<Json<GlobalParameters>, ClientCallFailure> {
    session.get_parameters().await.map(Json)
}

async fn fit_handler(State(session): State<Session>, Json(ins): Json<Instruction>)
    -> Result<Json<ClientUpdate>, ClientCallFailure> {
    log::info!("🏋️ [{}] fit requested: {}", session.id(), ins.config);
    let update = session.fit(Arc::new(ins.parameters), ins.config).await?;
    log::info!("📤 [{}] returning update ({} examples)", session.id(), update.num_examples);
    Ok(Json(update))
}

async fn evaluate_handler(State(session): State<Session>, Json(ins): Json<Instruction>)
    -> Result<Json<EvaluateOutcome>, ClientCallFailure> {
    let outcome = session.evaluate(Arc::new(ins.parameters), ins.config).await?;
    log::info!("📊 [{}] evaluate: loss={:.4} on {} examples",
        session.id(), outcome.loss, outcome.num_examples);
    Ok(Json(outcome))
}

pub fn router(session: Session) -> Router {
    Router::new()
        .route("/v1/parameters", get(parameters_handler))
        .route("/v1/fit", post(fit_handler))
        .route("/v1/evaluate", post(evaluate_handler))
        .with_state(session)
}

pub async fn serve(session: Session, addr: SocketAddr) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    log::info!("📡 Client [{}] listening on {}", session.id(), listener.local_addr()?);
    axum::serve(listener, router(session)).await
}

// -----------------------------------------------------------------------------
// Announcing a client to a coordinator
// -----------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct Announce<'a> {
    client_id: &'a ClientId,
    endpoint: &'a str,
}

/// POST the client's public endpoint to `{coordinator}/v1/clients`.
pub async fn announce(coordinator: &str, id: &ClientId, endpoint: &str, timeout: Duration)
    -> Result<(), ClientCallFailure> {
    let http = reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| ClientCallFailure::Transport(e.to_string()))?;
    let url = format!("{}/v1/clients", coordinator.trim_end_matches('/'));
    let resp = http.post(&url)
        .json(&Announce { client_id: id, endpoint })
        .send()
        .await
        .map_err(|e| if e.is_timeout() {
            ClientCallFailure::Timeout
        } else {
            ClientCallFailure::Transport(e.to_string())
        })?;
    if !resp.status().is_success() {
        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();
        return Err(ClientCallFailure::Rejected(format!("{}: {}", status, body)));
    }
    log::info!("🤝 [{}] announced to {} as {}", id, coordinator, endpoint);
    Ok(())
}
