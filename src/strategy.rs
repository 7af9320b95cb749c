// =============================================================================
// FEDREC CORE — strategy.rs
// FedAvgStrategy — client selection, fan-out/fan-in and weighted aggregation
// =============================================================================
//
// One round, as seen by the strategy:
//   1. configure   — RoundScheduler produces the round's RoundConfig
//   2. select      — sample clients, enforce availability minimum
//   3. dispatch    — concurrent calls, per-call timeout, join barrier
//   4. aggregate   — W_global = Σ n_k * W_k / Σ n_k, quorum enforced
//
// Per-client failures never leave this module; they only matter through
// the quorum check.
// =============================================================================

use crate::client::{ClientId, ClientSession, ClientUpdate, EvaluateOutcome, Metrics};
use crate::config::RunConfig;
use crate::error::{ClientCallFailure, FederationError};
use crate::params::GlobalParameters;
use crate::schedule::{RoundConfig, RoundMode, RoundScheduler};
use ndarray::ArrayD;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

// -----------------------------------------------------------------------------
// StrategyConfig
// -----------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct StrategyConfig {
    pub fraction_fit: f64,
    pub fraction_evaluate: f64,
    pub min_fit_clients: usize,
    pub min_evaluate_clients: usize,
    pub min_available_clients: usize,
    pub client_timeout: Duration,
}

impl From<&RunConfig> for StrategyConfig {
    fn from(cfg: &RunConfig) -> Self {
        StrategyConfig {
            fraction_fit: cfg.fraction_fit,
            fraction_evaluate: cfg.fraction_evaluate,
            min_fit_clients: cfg.min_fit_clients,
            min_evaluate_clients: cfg.min_evaluate_clients,
            min_available_clients: cfg.min_available_clients,
            client_timeout: cfg.client_timeout(),
        }
    }
}

impl Default for StrategyConfig {
    fn default() -> Self { StrategyConfig::from(&RunConfig::default()) }
}

// -----------------------------------------------------------------------------
// Collections returned by the barrier
// -----------------------------------------------------------------------------

/// Everything known about a dispatch once the barrier is passed.
/// Both lists are ordered by client id.
#[derive(Debug, Clone)]
pub struct Collection<T> {
    pub successes: Vec<(ClientId, T)>,
    pub failures: Vec<(ClientId, ClientCallFailure)>,
}

impl<T> Collection<T> {
    pub fn participants(&self) -> Vec<ClientId> {
        self.successes.iter().map(|(id, _)| id.clone()).collect()
    }

    pub fn failed(&self) -> Vec<ClientId> {
        self.failures.iter().map(|(id, _)| id.clone()).collect()
    }
}

pub type FitCollection = Collection<ClientUpdate>;
pub type EvaluateCollection = Collection<EvaluateOutcome>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluateSummary {
    pub loss: f64,
    pub num_examples: u64,
    pub metrics: Metrics,
}

// -----------------------------------------------------------------------------
// FedAvgStrategy
// -----------------------------------------------------------------------------

pub struct FedAvgStrategy {
    cfg: StrategyConfig,
    scheduler: RoundScheduler,
}

impl FedAvgStrategy {
    pub fn new(cfg: StrategyConfig) -> Self {
        FedAvgStrategy { cfg, scheduler: RoundScheduler::new() }
    }

    pub fn config(&self) -> &StrategyConfig { &self.cfg }

    pub fn configure_fit(&self, round_index: u32) -> RoundConfig {
        self.scheduler.config(round_index, RoundMode::Fit)
    }

    pub fn configure_evaluate(&self, round_index: u32) -> RoundConfig {
        self.scheduler.config(round_index, RoundMode::Evaluate)
    }

    /// Sample `max(ceil(fraction * n), min_clients)` clients (capped at n).
    /// Refuses to select anything below the availability minimum.
    pub fn select_clients(
        &self,
        round_index: u32,
        available: &[Arc<dyn ClientSession>],
        fraction: f64,
        min_clients: usize,
    ) -> Result<Vec<Arc<dyn ClientSession>>, FederationError> {
        let n = available.len();
        let required = self.cfg.min_available_clients.max(min_clients);
        if n < required {
            return Err(FederationError::InsufficientClients { round_index, available: n, required });
        }
        // clamp to [0, 1]; NaN selects only the minimum
        let fraction = if fraction.is_nan() { 0.0 } else { fraction.clamp(0.0, 1.0) };
        let wanted = ((fraction * n as f64).ceil() as usize).max(min_clients).min(n);
        let mut picked: Vec<Arc<dyn ClientSession>> = available
            .choose_multiple(&mut rand::thread_rng(), wanted)
            .cloned()
            .collect();
        picked.sort_by(|a, b| a.id().cmp(b.id()));
        Ok(picked)
    }

    pub fn select_fit_clients(&self, round_index: u32, available: &[Arc<dyn ClientSession>])
        -> Result<Vec<Arc<dyn ClientSession>>, FederationError> {
        self.select_clients(round_index, available, self.cfg.fraction_fit, self.cfg.min_fit_clients)
    }

    pub fn select_evaluate_clients(&self, round_index: u32, available: &[Arc<dyn ClientSession>])
        -> Result<Vec<Arc<dyn ClientSession>>, FederationError> {
        self.select_clients(round_index, available, self.cfg.fraction_evaluate, self.cfg.min_evaluate_clients)
    }

    /// Send current parameters + fit config to every selected client at once
    /// and wait for all of them to answer, fail or time out. Updates whose
    /// tensor shapes differ from the global shapes count as failures.
    pub async fn dispatch_fit(
        &self,
        round_index: u32,
        selected: &[Arc<dyn ClientSession>],
        params: Arc<GlobalParameters>,
        config: RoundConfig,
        cancel: &CancellationToken,
    ) -> FitCollection {
        let shared = params.clone();
        let mut collection = self.fan_out(round_index, "fit", selected, cancel, move |session| {
            let p = shared.clone();
            async move { session.fit(p, config).await }
        }).await;

        let mut accepted = Vec::with_capacity(collection.successes.len());
        for (id, update) in collection.successes.drain(..) {
            if update.parameters.same_shapes(&params) {
                accepted.push((id, update));
            } else {
                log::warn!("⚠️ Round {}: client [{}] returned shapes {:?}, expected {:?}",
                    round_index + 1, id, update.parameters.shapes(), params.shapes());
                collection.failures.push((id, ClientCallFailure::Rejected("tensor shape mismatch".into())));
            }
        }
        collection.successes = accepted;
        collection.failures.sort_by(|a, b| a.0.cmp(&b.0));
        collection
    }

    /// Read-only pass: clients score the parameters on local test data.
    pub async fn dispatch_evaluate(
        &self,
        round_index: u32,
        selected: &[Arc<dyn ClientSession>],
        params: Arc<GlobalParameters>,
        config: RoundConfig,
        cancel: &CancellationToken,
    ) -> EvaluateCollection {
        self.fan_out(round_index, "evaluate", selected, cancel, move |session| {
            let p = params.clone();
            async move { session.evaluate(p, config).await }
        }).await
    }

    async fn fan_out<T, F, Fut>(
        &self,
        round_index: u32,
        phase: &'static str,
        selected: &[Arc<dyn ClientSession>],
        cancel: &CancellationToken,
        call: F,
    ) -> Collection<T>
    where
        T: Send + 'static,
        F: Fn(Arc<dyn ClientSession>) -> Fut,
        Fut: Future<Output = Result<T, ClientCallFailure>> + Send + 'static,
    {
        let mut tasks = JoinSet::new();
        let mut pending: BTreeSet<ClientId> = BTreeSet::new();

        for session in selected {
            let id = session.id().clone();
            pending.insert(id.clone());
            let fut = call(session.clone());
            let token = cancel.clone();
            let timeout = self.cfg.client_timeout;
            tasks.spawn(async move {
                let outcome = tokio::select! {
                    biased;
                    _ = token.cancelled() => Err(ClientCallFailure::Cancelled),
                    res = tokio::time::timeout(timeout, fut) => match res {
                        Ok(r) => r,
                        Err(_) => Err(ClientCallFailure::Timeout),
                    },
                };
                (id, outcome)
            });
        }

        let mut successes = Vec::new();
        let mut failures = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((id, Ok(value))) => {
                    pending.remove(&id);
                    successes.push((id, value));
                }
                Ok((id, Err(failure))) => {
                    pending.remove(&id);
                    log::warn!("⚠️ Round {}: {} failed on [{}]: {}", round_index + 1, phase, id, failure);
                    failures.push((id, failure));
                }
                Err(e) => log::error!("❌ Round {}: {} task crashed: {}", round_index + 1, phase, e),
            }
        }
        // tasks that panicked never reported back
        for id in pending {
            failures.push((id, ClientCallFailure::Transport("client task crashed".into())));
        }

        successes.sort_by(|a, b| a.0.cmp(&b.0));
        failures.sort_by(|a, b| a.0.cmp(&b.0));
        Collection { successes, failures }
    }

    /// FedAvg: W_global[i] = Σ_c n_c * W_c[i] / N, N = Σ_c n_c.
    pub fn aggregate(&self, round_index: u32, updates: &[ClientUpdate])
        -> Result<GlobalParameters, FederationError> {
        if updates.len() < self.cfg.min_fit_clients {
            return Err(FederationError::QuorumNotMet {
                round_index,
                successes: updates.len(),
                required: self.cfg.min_fit_clients,
            });
        }
        weighted_average(round_index, updates)
    }

    /// Example-weighted mean of every metric key reported during fit.
    pub fn aggregate_fit_metrics(&self, updates: &[ClientUpdate]) -> Metrics {
        weighted_metrics(updates.iter().map(|u| (u.num_examples, &u.metrics)))
    }

    /// Weighted loss + metrics, or None if nobody evaluated any examples.
    pub fn aggregate_evaluate(&self, outcomes: &[EvaluateOutcome]) -> Option<EvaluateSummary> {
        let total: u128 = outcomes.iter().map(|o| o.num_examples as u128).sum();
        if total == 0 {
            return None;
        }
        let loss = outcomes.iter()
            .map(|o| o.loss * o.num_examples as f64)
            .sum::<f64>() / total as f64;
        Some(EvaluateSummary {
            loss,
            num_examples: u64::try_from(total).unwrap_or(u64::MAX),
            metrics: weighted_metrics(outcomes.iter().map(|o| (o.num_examples, &o.metrics))),
        })
    }
}

/// Shape-checked weighted average without any quorum rule.
pub fn weighted_average(round_index: u32, updates: &[ClientUpdate])
    -> Result<GlobalParameters, FederationError> {
    let first = match updates.first() {
        Some(u) => &u.parameters,
        None => return Err(FederationError::QuorumNotMet { round_index, successes: 0, required: 1 }),
    };
    for (i, u) in updates.iter().enumerate().skip(1) {
        if !u.parameters.same_shapes(first) {
            return Err(FederationError::ShapeMismatch {
                update: i,
                expected: first.shapes(),
                actual: u.parameters.shapes(),
            });
        }
    }

    // summed in u128 so client-reported counts cannot overflow
    let total: u128 = updates.iter().map(|u| u.num_examples as u128).sum();
    if total == 0 {
        return Err(FederationError::NoTrainingExamples { round_index });
    }
    if let [only] = updates {
        return Ok(only.parameters.clone());
    }

    let mut tensors: Vec<ArrayD<f64>> = first.tensors.iter()
        .map(|t| ArrayD::zeros(t.raw_dim()))
        .collect();
    for u in updates.iter().filter(|u| u.num_examples > 0) {
        let n = u.num_examples as f64;
        for (acc, t) in tensors.iter_mut().zip(u.parameters.tensors.iter()) {
            acc.scaled_add(n, t);
        }
    }
    let total = total as f64;
    for acc in tensors.iter_mut() {
        *acc /= total;
    }
    Ok(GlobalParameters::new(tensors))
}

/// Per-key weighted mean; keys are averaged over the clients reporting them.
pub fn weighted_metrics<'a, I>(items: I) -> Metrics
where
    I: IntoIterator<Item = (u64, &'a Metrics)>,
{
    let mut sums: BTreeMap<String, (f64, u128)> = BTreeMap::new();
    for (n, metrics) in items {
        for (key, value) in metrics {
            let e = sums.entry(key.clone()).or_insert((0.0, 0));
            e.0 += value * n as f64;
            e.1 += n as u128;
        }
    }
    sums.into_iter()
        .filter(|(_, (_, n))| *n > 0)
        .map(|(k, (s, n))| (k, s / n as f64))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    fn update(p: f64, n: u64) -> ClientUpdate {
        ClientUpdate { parameters: GlobalParameters::scalar(p), num_examples: n, metrics: Metrics::new() }
    }

    fn scalar_of(params: &GlobalParameters) -> f64 { params.flat(0).unwrap()[0] }

    fn strategy(min_fit: usize) -> FedAvgStrategy {
        FedAvgStrategy::new(StrategyConfig {
            min_fit_clients: min_fit,
            client_timeout: Duration::from_millis(200),
            ..StrategyConfig::default()
        })
    }

    enum Behavior { Echo(f64, u64), Fail, Hang, BadShape }

    struct Scripted { id: ClientId, behavior: Behavior }

    #[async_trait]
    impl ClientSession for Scripted {
        fn id(&self) -> &ClientId { &self.id }
        async fn get_parameters(&self) -> Result<GlobalParameters, ClientCallFailure> {
            Ok(GlobalParameters::scalar(0.0))
        }
        async fn fit(&self, _p: Arc<GlobalParameters>, _c: RoundConfig)
            -> Result<ClientUpdate, ClientCallFailure> {
            match self.behavior {
                Behavior::Echo(p, n) => Ok(update(p, n)),
                Behavior::Fail => Err(ClientCallFailure::Transport("connection reset".into())),
                Behavior::Hang => {
                    tokio::time::sleep(Duration::from_secs(30)).await;
                    Ok(update(0.0, 1))
                }
                Behavior::BadShape => Ok(ClientUpdate {
                    parameters: GlobalParameters::from_vecs(vec![vec![1.0, 2.0]]),
                    num_examples: 5,
                    metrics: Metrics::new(),
                }),
            }
        }
        async fn evaluate(&self, _p: Arc<GlobalParameters>, _c: RoundConfig)
            -> Result<EvaluateOutcome, ClientCallFailure> {
            match self.behavior {
                Behavior::Echo(p, n) => Ok(EvaluateOutcome {
                    loss: p, num_examples: n,
                    metrics: Metrics::from([("mae".to_string(), p / 2.0)]),
                }),
                _ => Err(ClientCallFailure::Timeout),
            }
        }
    }

    fn session(id: &str, behavior: Behavior) -> Arc<dyn ClientSession> {
        Arc::new(Scripted { id: ClientId::new(id), behavior })
    }

    #[test]
    fn test_weighted_average_identical_weights() {
        let s = strategy(2);
        let out = s.aggregate(0, &[update(1.0, 10), update(1.0, 20), update(1.0, 30)]).unwrap();
        assert_eq!(scalar_of(&out), 1.0);
        let ten: Vec<ClientUpdate> = (0..10).map(|_| update(1.0, 1)).collect();
        assert_eq!(scalar_of(&s.aggregate(0, &ten).unwrap()), 1.0);
    }

    #[test]
    fn test_weighted_average_equal_counts() {
        let s = strategy(2);
        let out = s.aggregate(0, &[update(0.0, 10), update(1.0, 10), update(2.0, 10)]).unwrap();
        assert_eq!(scalar_of(&out), 1.0);
    }

    #[test]
    fn test_weighted_average_formula() {
        // (0.1*10 + 0.2*30) / 40 = 0.175
        let s = strategy(2);
        let out = s.aggregate(0, &[update(0.1, 10), update(0.2, 30)]).unwrap();
        assert!((scalar_of(&out) - 0.175).abs() < 1e-12);
    }

    #[test]
    fn test_single_update_returned_exactly() {
        let s = strategy(1);
        for p in [0.1, -3.7, 1e-9, 12345.678] {
            let out = s.aggregate(0, &[update(p, 7)]).unwrap();
            assert_eq!(scalar_of(&out), p);
        }
    }

    #[test]
    fn test_order_invariance() {
        let s = strategy(2);
        let a = [update(0.3, 4), update(1.9, 11), update(-0.5, 2)];
        let b = [update(-0.5, 2), update(0.3, 4), update(1.9, 11)];
        let x = scalar_of(&s.aggregate(0, &a).unwrap());
        let y = scalar_of(&s.aggregate(0, &b).unwrap());
        assert!((x - y).abs() < 1e-12);
    }

    #[test]
    fn test_multi_tensor_elementwise() {
        let s = strategy(2);
        let a = ClientUpdate {
            parameters: GlobalParameters::from_vecs(vec![vec![1.0, 2.0], vec![10.0]]),
            num_examples: 1, metrics: Metrics::new(),
        };
        let b = ClientUpdate {
            parameters: GlobalParameters::from_vecs(vec![vec![3.0, 6.0], vec![20.0]]),
            num_examples: 3, metrics: Metrics::new(),
        };
        let out = s.aggregate(0, &[a, b]).unwrap();
        assert_eq!(out.flat(0).unwrap(), vec![2.5, 5.0]);
        assert_eq!(out.flat(1).unwrap(), vec![17.5]);
    }

    #[test]
    fn test_quorum_not_met() {
        let s = strategy(2);
        match s.aggregate(4, &[update(1.0, 10)]) {
            Err(FederationError::QuorumNotMet { round_index, successes, required }) => {
                assert_eq!((round_index, successes, required), (4, 1, 2));
            }
            other => panic!("expected QuorumNotMet, got {:?}", other),
        }
    }

    #[test]
    fn test_zero_examples_rejected() {
        let s = strategy(2);
        assert!(matches!(s.aggregate(0, &[update(1.0, 0), update(2.0, 0)]),
            Err(FederationError::NoTrainingExamples { round_index: 0 })));
    }

    #[test]
    fn test_huge_example_counts_do_not_overflow() {
        let s = strategy(2);
        let out = s.aggregate(0, &[update(1.0, u64::MAX), update(3.0, 2)]).unwrap();
        let v = scalar_of(&out);
        assert!(v.is_finite());
        assert!((v - 1.0).abs() < 1e-9);

        let both_max = s.aggregate(0, &[update(1.0, u64::MAX), update(3.0, u64::MAX)]).unwrap();
        assert!((scalar_of(&both_max) - 2.0).abs() < 1e-12);

        let outcomes = [
            EvaluateOutcome { loss: 1.0, num_examples: u64::MAX, metrics: Metrics::new() },
            EvaluateOutcome { loss: 1.0, num_examples: u64::MAX, metrics: Metrics::new() },
        ];
        let summary = s.aggregate_evaluate(&outcomes).unwrap();
        assert_eq!(summary.num_examples, u64::MAX);
        assert!((summary.loss - 1.0).abs() < 1e-12);

        let m = Metrics::from([("loss".to_string(), 2.0)]);
        let merged = weighted_metrics(vec![(u64::MAX, &m), (u64::MAX, &m)]);
        assert!((merged["loss"] - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_shape_mismatch_rejected() {
        let bad = ClientUpdate {
            parameters: GlobalParameters::from_vecs(vec![vec![1.0, 2.0]]),
            num_examples: 1, metrics: Metrics::new(),
        };
        assert!(matches!(weighted_average(0, &[update(1.0, 1), bad]),
            Err(FederationError::ShapeMismatch { update: 1, .. })));
    }

    #[test]
    fn test_select_respects_minimums() {
        let s = strategy(2);
        let avail: Vec<_> = (0..5).map(|i| session(&format!("c{}", i), Behavior::Fail)).collect();
        // ceil(0.1 * 5) = 1, raised to min_clients
        assert_eq!(s.select_clients(0, &avail, 0.1, 2).unwrap().len(), 2);
        assert_eq!(s.select_clients(0, &avail, 0.5, 2).unwrap().len(), 3);
        assert_eq!(s.select_clients(0, &avail, 1.0, 2).unwrap().len(), 5);
        let picked = s.select_clients(0, &avail, 0.6, 2).unwrap();
        let ids: Vec<&ClientId> = picked.iter().map(|c| c.id()).collect();
        let mut sorted = ids.clone();
        sorted.sort();
        assert_eq!(ids, sorted);
    }

    #[test]
    fn test_select_clamps_fraction() {
        let s = strategy(2);
        let avail: Vec<_> = (0..5).map(|i| session(&format!("c{}", i), Behavior::Fail)).collect();
        assert_eq!(s.select_clients(0, &avail, 7.5, 2).unwrap().len(), 5);
        assert_eq!(s.select_clients(0, &avail, f64::INFINITY, 2).unwrap().len(), 5);
        assert_eq!(s.select_clients(0, &avail, -1.0, 2).unwrap().len(), 2);
        assert_eq!(s.select_clients(0, &avail, 0.0, 2).unwrap().len(), 2);
        assert_eq!(s.select_clients(0, &avail, f64::NAN, 3).unwrap().len(), 3);
    }

    #[test]
    fn test_select_insufficient_clients() {
        let s = strategy(2);
        let avail = vec![session("only", Behavior::Fail)];
        assert!(matches!(s.select_fit_clients(3, &avail),
            Err(FederationError::InsufficientClients { round_index: 3, available: 1, required: 2 })));
        let three: Vec<_> = (0..3).map(|i| session(&format!("c{}", i), Behavior::Fail)).collect();
        assert!(matches!(s.select_clients(0, &three, 1.0, 4),
            Err(FederationError::InsufficientClients { required: 4, .. })));
    }

    #[tokio::test]
    async fn test_dispatch_fit_excludes_failures() {
        let s = strategy(2);
        let selected = vec![
            session("a", Behavior::Echo(1.0, 10)),
            session("b", Behavior::Fail),
            session("c", Behavior::Hang),
            session("d", Behavior::BadShape),
            session("e", Behavior::Echo(3.0, 30)),
        ];
        let params = Arc::new(GlobalParameters::scalar(0.0));
        let cfg = s.configure_fit(0);
        let got = s.dispatch_fit(0, &selected, params, cfg, &CancellationToken::new()).await;
        assert_eq!(got.participants(), vec![ClientId::new("a"), ClientId::new("e")]);
        assert_eq!(got.failed(), vec![ClientId::new("b"), ClientId::new("c"), ClientId::new("d")]);
        assert_eq!(got.failures[1].1, ClientCallFailure::Timeout);
        let updates: Vec<ClientUpdate> = got.successes.into_iter().map(|(_, u)| u).collect();
        let out = s.aggregate(0, &updates).unwrap();
        assert!((scalar_of(&out) - 2.5).abs() < 1e-12);
    }

    #[tokio::test]
    async fn test_dispatch_cancelled() {
        let s = FedAvgStrategy::new(StrategyConfig {
            client_timeout: Duration::from_secs(60),
            ..StrategyConfig::default()
        });
        let token = CancellationToken::new();
        token.cancel();
        let selected = vec![session("a", Behavior::Hang)];
        let got = s.dispatch_fit(0, &selected, Arc::new(GlobalParameters::scalar(0.0)),
            s.configure_fit(0), &token).await;
        assert!(got.successes.is_empty());
        assert_eq!(got.failures[0].1, ClientCallFailure::Cancelled);
    }

    #[tokio::test]
    async fn test_dispatch_evaluate_weighted_summary() {
        let s = strategy(2);
        let selected = vec![
            session("a", Behavior::Echo(1.0, 10)),
            session("b", Behavior::Echo(4.0, 30)),
            session("c", Behavior::Fail),
        ];
        let got = s.dispatch_evaluate(0, &selected, Arc::new(GlobalParameters::scalar(0.0)),
            s.configure_evaluate(0), &CancellationToken::new()).await;
        assert_eq!(got.successes.len(), 2);
        assert_eq!(got.failures.len(), 1);
        let outcomes: Vec<EvaluateOutcome> = got.successes.into_iter().map(|(_, o)| o).collect();
        let summary = s.aggregate_evaluate(&outcomes).unwrap();
        // (1*10 + 4*30) / 40 = 3.25
        assert!((summary.loss - 3.25).abs() < 1e-12);
        assert!((summary.metrics["mae"] - 1.625).abs() < 1e-12);
        assert_eq!(summary.num_examples, 40);
    }

    #[test]
    fn test_weighted_metrics_partial_keys() {
        let a = Metrics::from([("loss".to_string(), 1.0), ("mae".to_string(), 0.5)]);
        let b = Metrics::from([("loss".to_string(), 3.0)]);
        let m = weighted_metrics(vec![(1, &a), (1, &b)]);
        assert_eq!(m["loss"], 2.0);
        assert_eq!(m["mae"], 0.5);
        assert!(strategy(2).aggregate_evaluate(&[]).is_none());
    }
}
