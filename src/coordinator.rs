// =============================================================================
// FEDREC CORE — coordinator.rs
// Coordinator — drives the fixed number of federated rounds end-to-end
// =============================================================================
//
// Idle → Running(0..N-1) → Completed
//                        ↘ Aborted  (availability / quorum failure)
//
// The coordinator is the only writer of GlobalParameters. Each round
// produces a fresh parameter set that replaces the previous one after the
// aggregation barrier; an aborted round leaves the last good set in place.
// =============================================================================

use crate::client::{ClientId, ClientRegistry, ClientUpdate, Metrics};
use crate::config::RunConfig;
use crate::error::FederationError;
use crate::params::GlobalParameters;
use crate::schedule::RoundConfig;
use crate::strategy::{EvaluateSummary, FedAvgStrategy, StrategyConfig};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

pub const EVENT_BUFFER: usize = 256;

// -----------------------------------------------------------------------------
// State, events, history
// -----------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum CoordinatorState {
    Idle,
    Running { round_index: u32 },
    Completed { rounds: u32 },
    Aborted { reason: String, last_completed_round: Option<u32> },
}

impl CoordinatorState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, CoordinatorState::Completed { .. } | CoordinatorState::Aborted { .. })
    }
}

/// Progress notifications for external observers. Not part of the
/// aggregation contract; dropped when nobody listens.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum RoundEvent {
    RoundStarted {
        round_index: u32,
        config: RoundConfig,
        at: DateTime<Utc>,
    },
    FitCompleted {
        round_index: u32,
        participants: Vec<ClientId>,
        failures: Vec<ClientId>,
        metrics: Metrics,
        at: DateTime<Utc>,
    },
    EvaluateCompleted {
        round_index: u32,
        participants: Vec<ClientId>,
        failures: Vec<ClientId>,
        summary: Option<EvaluateSummary>,
        at: DateTime<Utc>,
    },
    RunCompleted {
        rounds: u32,
        at: DateTime<Utc>,
    },
    RunAborted {
        reason: String,
        last_completed_round: Option<u32>,
        at: DateTime<Utc>,
    },
}

#[derive(Debug, Clone, Serialize)]
pub struct RoundRecord {
    pub round_index: u32,
    pub fit_config: RoundConfig,
    pub participants: Vec<ClientId>,
    pub failures: Vec<ClientId>,
    pub total_examples: u64,
    pub fit_metrics: Metrics,
    pub evaluation: Option<EvaluateSummary>,
    pub evaluate_participants: Vec<ClientId>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

/// Read-only view shared with the HTTP API while a run is in progress.
#[derive(Debug, Clone, Serialize)]
pub struct RunStatus {
    pub state: CoordinatorState,
    pub num_rounds: u32,
    pub rounds_completed: u32,
    pub parameter_shapes: Vec<Vec<usize>>,
    pub history: Vec<RoundRecord>,
}

impl RunStatus {
    fn new(num_rounds: u32) -> Self {
        RunStatus {
            state: CoordinatorState::Idle,
            num_rounds,
            rounds_completed: 0,
            parameter_shapes: vec![],
            history: vec![],
        }
    }
}

pub type StatusHandle = Arc<RwLock<RunStatus>>;

// -----------------------------------------------------------------------------
// Coordinator
// -----------------------------------------------------------------------------

pub struct Coordinator {
    config: RunConfig,
    strategy: FedAvgStrategy,
    registry: Arc<ClientRegistry>,
    state: CoordinatorState,
    parameters: Option<Arc<GlobalParameters>>,
    history: Vec<RoundRecord>,
    events: broadcast::Sender<RoundEvent>,
    status: StatusHandle,
    cancel: CancellationToken,
}

impl Coordinator {
    pub fn new(config: RunConfig, registry: Arc<ClientRegistry>,
               initial: Option<GlobalParameters>) -> Self {
        let strategy = FedAvgStrategy::new(StrategyConfig::from(&config));
        let (events, _) = broadcast::channel(EVENT_BUFFER);
        let status = Arc::new(RwLock::new(RunStatus::new(config.num_rounds)));
        Coordinator {
            config,
            strategy,
            registry,
            state: CoordinatorState::Idle,
            parameters: initial.map(Arc::new),
            history: vec![],
            events,
            status,
            cancel: CancellationToken::new(),
        }
    }

    pub fn state(&self) -> &CoordinatorState { &self.state }

    /// Last good parameters (the final model once Completed).
    pub fn parameters(&self) -> Option<&GlobalParameters> { self.parameters.as_deref() }

    pub fn history(&self) -> &[RoundRecord] { &self.history }

    pub fn subscribe(&self) -> broadcast::Receiver<RoundEvent> { self.events.subscribe() }

    pub fn status_handle(&self) -> StatusHandle { self.status.clone() }

    /// Point-in-time copy of the status served by the HTTP API.
    pub async fn snapshot(&self) -> RunStatus { self.status.read().await.clone() }

    /// Token that aborts the run when cancelled; in-flight calls are abandoned.
    pub fn cancel_token(&self) -> CancellationToken { self.cancel.clone() }

    pub fn last_completed_round(&self) -> Option<u32> {
        self.history.last().map(|r| r.round_index)
    }

    pub async fn run(&mut self) -> Result<GlobalParameters, FederationError> {
        if self.state != CoordinatorState::Idle {
            return Err(FederationError::InvalidState("run() may only be called once"));
        }
        log::info!("🚀 Federated run starting: {}", self.config);

        match self.run_rounds().await {
            Ok(final_params) => {
                let rounds = self.config.num_rounds;
                self.set_state(CoordinatorState::Completed { rounds }).await;
                self.emit(RoundEvent::RunCompleted { rounds, at: Utc::now() });
                Ok(final_params)
            }
            Err(cause) => {
                let last = self.last_completed_round();
                let reason = cause.to_string();
                self.set_state(CoordinatorState::Aborted {
                    reason: reason.clone(),
                    last_completed_round: last,
                }).await;
                self.emit(RoundEvent::RunAborted { reason, last_completed_round: last, at: Utc::now() });
                Err(FederationError::Aborted { last_completed_round: last, source: Box::new(cause) })
            }
        }
    }

    async fn run_rounds(&mut self) -> Result<GlobalParameters, FederationError> {
        let mut current = match self.parameters.clone() {
            Some(p) => p,
            None => {
                let p = Arc::new(self.initial_parameters().await?);
                self.parameters = Some(p.clone());
                p
            }
        };
        self.status.write().await.parameter_shapes = current.shapes();

        for round_index in 0..self.config.num_rounds {
            self.set_state(CoordinatorState::Running { round_index }).await;
            let (next, record) = self.run_round(round_index, current.clone()).await?;
            current = next;
            self.parameters = Some(current.clone());
            self.history.push(record.clone());
            let mut status = self.status.write().await;
            status.rounds_completed = round_index + 1;
            status.history.push(record);
        }
        Ok((*current).clone())
    }

    /// Seed a run without initial weights from the first client that answers.
    async fn initial_parameters(&self) -> Result<GlobalParameters, FederationError> {
        let available = self.registry.available().await;
        if available.is_empty() {
            return Err(FederationError::InitialParameters("no clients registered".into()));
        }
        let timeout = self.config.client_timeout();
        for client in &available {
            match tokio::time::timeout(timeout, client.get_parameters()).await {
                Ok(Ok(p)) if !p.is_empty() => {
                    log::info!("📥 Initial parameters from [{}]: {}", client.id(), p);
                    return Ok(p);
                }
                Ok(Ok(_)) => log::warn!("⚠️ [{}] returned empty parameters", client.id()),
                Ok(Err(e)) => log::warn!("⚠️ [{}] get_parameters failed: {}", client.id(), e),
                Err(_) => log::warn!("⚠️ [{}] get_parameters timed out", client.id()),
            }
        }
        Err(FederationError::InitialParameters(format!("none of {} clients answered", available.len())))
    }

    async fn run_round(&mut self, round_index: u32, current: Arc<GlobalParameters>)
        -> Result<(Arc<GlobalParameters>, RoundRecord), FederationError> {
        let started_at = Utc::now();
        let token = self.cancel.child_token();

        // fit
        let fit_config = self.strategy.configure_fit(round_index);
        self.emit(RoundEvent::RoundStarted { round_index, config: fit_config, at: started_at });

        let available = self.registry.available().await;
        let selected = self.strategy.select_fit_clients(round_index, &available)?;
        let fit = self.strategy
            .dispatch_fit(round_index, &selected, current.clone(), fit_config, &token)
            .await;

        let participants = fit.participants();
        let failures = fit.failed();
        let updates: Vec<ClientUpdate> = fit.successes.into_iter().map(|(_, u)| u).collect();
        let aggregated = match self.strategy.aggregate(round_index, &updates) {
            Ok(p) => p,
            Err(e) => {
                token.cancel();
                return Err(e);
            }
        };
        let fit_metrics = self.strategy.aggregate_fit_metrics(&updates);
        let total_examples = updates.iter().fold(0u64, |acc, u| acc.saturating_add(u.num_examples));

        self.emit(RoundEvent::FitCompleted {
            round_index,
            participants: participants.clone(),
            failures: failures.clone(),
            metrics: fit_metrics.clone(),
            at: Utc::now(),
        });
        let next = Arc::new(aggregated);

        // evaluate: reporting only, never fatal
        let eval_config = self.strategy.configure_evaluate(round_index);
        let available = self.registry.available().await;
        let (evaluation, eval_participants, eval_failures) =
            match self.strategy.select_evaluate_clients(round_index, &available) {
                Ok(selected) => {
                    let ev = self.strategy
                        .dispatch_evaluate(round_index, &selected, next.clone(), eval_config, &token)
                        .await;
                    let parts = ev.participants();
                    let fails = ev.failed();
                    let min = self.strategy.config().min_evaluate_clients;
                    if ev.successes.len() < min {
                        log::warn!("⚠️ Round {}: evaluation skipped ({} of {} required results)",
                            round_index + 1, ev.successes.len(), min);
                        (None, parts, fails)
                    } else {
                        let outcomes: Vec<_> = ev.successes.into_iter().map(|(_, o)| o).collect();
                        (self.strategy.aggregate_evaluate(&outcomes), parts, fails)
                    }
                }
                Err(e) => {
                    log::warn!("⚠️ Round {}: evaluation skipped: {}", round_index + 1, e);
                    (None, vec![], vec![])
                }
            };

        self.emit(RoundEvent::EvaluateCompleted {
            round_index,
            participants: eval_participants.clone(),
            failures: eval_failures,
            summary: evaluation.clone(),
            at: Utc::now(),
        });

        let record = RoundRecord {
            round_index,
            fit_config,
            participants,
            failures,
            total_examples,
            fit_metrics,
            evaluation,
            evaluate_participants: eval_participants,
            started_at,
            finished_at: Utc::now(),
        };
        Ok((next, record))
    }

    async fn set_state(&mut self, state: CoordinatorState) {
        self.status.write().await.state = state.clone();
        self.state = state;
    }

    fn emit(&self, event: RoundEvent) {
        let _ = self.events.send(event);
    }
}

// -----------------------------------------------------------------------------
// Event logging
// -----------------------------------------------------------------------------

pub fn log_event(event: &RoundEvent) {
    match event {
        RoundEvent::RoundStarted { round_index, config, .. } => {
            log::info!("🔄 Round {}: {}", round_index + 1, config);
        }
        RoundEvent::FitCompleted { round_index, participants, failures, metrics, .. } => {
            log::info!("🧮 Round {}: aggregated {} updates ({} failed) metrics={:?}",
                round_index + 1, participants.len(), failures.len(), metrics);
            if !failures.is_empty() {
                log::warn!("⚠️ Round {}: excluded {:?}", round_index + 1, failures);
            }
        }
        RoundEvent::EvaluateCompleted { round_index, participants, summary, .. } => match summary {
            Some(s) => log::info!("📊 Round {}: eval loss={:.4} over {} examples from {} clients metrics={:?}",
                round_index + 1, s.loss, s.num_examples, participants.len(), s.metrics),
            None => log::info!("📊 Round {}: no evaluation result", round_index + 1),
        },
        RoundEvent::RunCompleted { rounds, .. } => {
            log::info!("✅ Run completed after {} rounds", rounds);
        }
        RoundEvent::RunAborted { reason, last_completed_round, .. } => {
            log::error!("❌ Run aborted: {} (last completed round: {})", reason,
                last_completed_round.map(|r| (r + 1).to_string()).unwrap_or_else(|| "none".into()));
        }
    }
}

/// Forward every event to the `log` facade until the coordinator is dropped.
pub fn spawn_event_logger(mut rx: broadcast::Receiver<RoundEvent>) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(event) => log_event(&event),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    log::warn!("event logger lagged, {} events dropped", n);
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}
