// =============================================================================
// FEDREC CORE — client.rs
// ClientSession — the coordinator's view of one participating client
// =============================================================================
//
// Provides:
//   1. ClientSession      — fit / evaluate / get_parameters capability
//   2. ClientUpdate       — what a client returns after local training
//   3. HttpClientSession  — remote client reached over JSON/HTTP
//   4. ClientRegistry     — the addressable set of available clients
//
// Local training stays on the client. The coordinator only ever sends a
// copy of the global parameters and receives an updated copy back.
// =============================================================================

use crate::error::ClientCallFailure;
use crate::params::GlobalParameters;
use crate::schedule::RoundConfig;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

pub type Metrics = BTreeMap<String, f64>;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClientId(pub String);

impl ClientId {
    pub fn new(id: impl Into<String>) -> Self { ClientId(id.into()) }

    pub fn generate() -> Self { ClientId(format!("client-{}", uuid::Uuid::new_v4())) }
}

impl std::fmt::Display for ClientId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientUpdate {
    pub parameters: GlobalParameters,
    pub num_examples: u64,
    #[serde(default)]
    pub metrics: Metrics,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluateOutcome {
    pub loss: f64,
    pub num_examples: u64,
    #[serde(default)]
    pub metrics: Metrics,
}

#[async_trait]
pub trait ClientSession: Send + Sync {
    fn id(&self) -> &ClientId;

    /// Current local parameters; used to seed a run without initial weights.
    async fn get_parameters(&self) -> Result<GlobalParameters, ClientCallFailure>;

    async fn fit(&self, parameters: Arc<GlobalParameters>, config: RoundConfig)
        -> Result<ClientUpdate, ClientCallFailure>;

    async fn evaluate(&self, parameters: Arc<GlobalParameters>, config: RoundConfig)
        -> Result<EvaluateOutcome, ClientCallFailure>;
}

// -----------------------------------------------------------------------------
// Wire messages
// -----------------------------------------------------------------------------

#[derive(Debug, Serialize)]
pub struct InstructionRef<'a> {
    pub parameters: &'a GlobalParameters,
    pub config: RoundConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Instruction {
    pub parameters: GlobalParameters,
    pub config: RoundConfig,
}

// -----------------------------------------------------------------------------
// HttpClientSession
// -----------------------------------------------------------------------------

pub struct HttpClientSession {
    id: ClientId,
    endpoint: String,
    http: reqwest::Client,
}

impl HttpClientSession {
    pub fn new(id: ClientId, endpoint: &str, timeout: Duration) -> Result<Self, ClientCallFailure> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ClientCallFailure::Transport(e.to_string()))?;
        Ok(HttpClientSession {
            id,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            http,
        })
    }

    pub fn endpoint(&self) -> &str { &self.endpoint }

    fn url(&self, path: &str) -> String { format!("{}{}", self.endpoint, path) }

    async fn decode<T: serde::de::DeserializeOwned>(resp: reqwest::Response)
        -> Result<T, ClientCallFailure> {
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ClientCallFailure::Rejected(format!("{}: {}", status, body)));
        }
        resp.json::<T>().await.map_err(|e| ClientCallFailure::Transport(e.to_string()))
    }

    async fn post<T: serde::de::DeserializeOwned>(&self, path: &str,
        parameters: &GlobalParameters, config: RoundConfig) -> Result<T, ClientCallFailure> {
        let resp = self.http.post(self.url(path))
            .json(&InstructionRef { parameters, config })
            .send()
            .await
            .map_err(transport_failure)?;
        Self::decode(resp).await
    }
}

fn transport_failure(e: reqwest::Error) -> ClientCallFailure {
    if e.is_timeout() { ClientCallFailure::Timeout } else { ClientCallFailure::Transport(e.to_string()) }
}

#[async_trait]
impl ClientSession for HttpClientSession {
    fn id(&self) -> &ClientId { &self.id }

    async fn get_parameters(&self) -> Result<GlobalParameters, ClientCallFailure> {
        let resp = self.http.get(self.url("/v1/parameters"))
            .send()
            .await
            .map_err(transport_failure)?;
        Self::decode(resp).await
    }

    async fn fit(&self, parameters: Arc<GlobalParameters>, config: RoundConfig)
        -> Result<ClientUpdate, ClientCallFailure> {
        self.post("/v1/fit", &parameters, config).await
    }

    async fn evaluate(&self, parameters: Arc<GlobalParameters>, config: RoundConfig)
        -> Result<EvaluateOutcome, ClientCallFailure> {
        self.post("/v1/evaluate", &parameters, config).await
    }
}

// -----------------------------------------------------------------------------
// ClientRegistry
// -----------------------------------------------------------------------------

struct RegisteredClient {
    session: Arc<dyn ClientSession>,
    endpoint: Option<String>,
    registered_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientInfo {
    pub client_id: ClientId,
    pub endpoint: Option<String>,
    pub registered_at: DateTime<Utc>,
}

/// Clients currently reachable by the coordinator. Membership may change
/// between rounds; each round works on a snapshot.
#[derive(Default)]
pub struct ClientRegistry {
    clients: RwLock<HashMap<ClientId, RegisteredClient>>,
}

impl ClientRegistry {
    pub fn new() -> Arc<Self> { Arc::new(Self::default()) }

    /// Returns true when an existing registration was replaced.
    pub async fn register(&self, session: Arc<dyn ClientSession>, endpoint: Option<String>) -> bool {
        let id = session.id().clone();
        let entry = RegisteredClient { session, endpoint, registered_at: Utc::now() };
        let replaced = self.clients.write().await.insert(id.clone(), entry).is_some();
        log::info!("🤝 Client [{}] registered{}", id, if replaced { " (replaced)" } else { "" });
        replaced
    }

    pub async fn deregister(&self, id: &ClientId) -> bool {
        let removed = self.clients.write().await.remove(id).is_some();
        if removed {
            log::info!("👋 Client [{}] deregistered", id);
        }
        removed
    }

    /// Snapshot of available sessions, ordered by client id.
    pub async fn available(&self) -> Vec<Arc<dyn ClientSession>> {
        let guard = self.clients.read().await;
        let mut ids: Vec<&ClientId> = guard.keys().collect();
        ids.sort();
        ids.into_iter().map(|id| guard[id].session.clone()).collect()
    }

    pub async fn list(&self) -> Vec<ClientInfo> {
        let guard = self.clients.read().await;
        let mut out: Vec<ClientInfo> = guard.iter().map(|(id, c)| ClientInfo {
            client_id: id.clone(),
            endpoint: c.endpoint.clone(),
            registered_at: c.registered_at,
        }).collect();
        out.sort_by(|a, b| a.client_id.cmp(&b.client_id));
        out
    }

    pub async fn len(&self) -> usize { self.clients.read().await.len() }

    /// Wait until at least `min` clients are registered or `deadline` passes.
    pub async fn wait_for(&self, min: usize, deadline: Duration) -> usize {
        let started = tokio::time::Instant::now();
        let mut tick = tokio::time::interval(Duration::from_millis(250));
        loop {
            tick.tick().await;
            let n = self.len().await;
            if n >= min || started.elapsed() >= deadline {
                return n;
            }
        }
    }
}
