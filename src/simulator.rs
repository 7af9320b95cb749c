// =============================================================================
// FEDREC CORE — simulator.rs
// In-process federation with synthetic rating clients
// =============================================================================
//
// Each SyntheticClient owns a seeded dataset shaped like the on-device one:
// 100 training and 25 test samples of the 10-feature vector, with a rating
// target driven by the five usage features plus noise. Local training is
// mini-batch SGD on a linear model [weights (10), bias (1)].
//
// Nothing here talks to the network. The same Coordinator, strategy and
// registry used by `serve` drive the rounds.
// =============================================================================

use crate::codec::FeatureVector;
use crate::client::{ClientId, ClientRegistry, ClientSession, ClientUpdate, EvaluateOutcome, Metrics};
use crate::config::RunConfig;
use crate::constants::{FEATURE_COUNT, RATING_MAX, RATING_MIN};
use crate::coordinator::{spawn_event_logger, Coordinator, RoundRecord};
use crate::error::{ClientCallFailure, FederationError};
use crate::inference::{LinearRatingModel, RatingModel};
use crate::params::GlobalParameters;
use crate::schedule::RoundConfig;
use async_trait::async_trait;
use rand::{rngs::StdRng, Rng, SeedableRng};
use std::sync::Arc;

pub const TRAIN_SAMPLES: usize = 100;
pub const TEST_SAMPLES: usize = 25;
pub const FALLBACK_LEARNING_RATE: f64 = 0.001;

// -----------------------------------------------------------------------------
// Synthetic data
// -----------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub features: FeatureVector,
    pub rating: f64,
}

/// Categorical ids are drawn from small ranges; continuous features from
/// [0, 1). The rating weights the five usage features.
pub fn synthetic_samples(rng: &mut StdRng, n: usize) -> Vec<Sample> {
    (0..n).map(|_| {
        let mut x = [0.0; FEATURE_COUNT];
        x[0] = rng.gen_range(0..5) as f64;
        x[1] = rng.gen_range(0..2) as f64;
        x[2] = rng.gen_range(0..2) as f64;
        for v in x.iter_mut().take(9).skip(3) {
            *v = rng.gen::<f64>();
        }
        x[9] = rng.gen_range(0..5) as f64;

        let signal = 0.25 * x[4] + 0.20 * x[5] + 0.15 * x[6] + 0.15 * x[7] + 0.25 * x[8];
        let noise = (rng.gen::<f64>() - 0.5) * 0.5;
        let rating = (RATING_MAX * signal + noise).clamp(RATING_MIN, RATING_MAX);
        Sample { features: FeatureVector(x), rating }
    }).collect()
}

// -----------------------------------------------------------------------------
// SyntheticClient
// -----------------------------------------------------------------------------

pub struct SyntheticClient {
    id: ClientId,
    train: Vec<Sample>,
    test: Vec<Sample>,
}

impl SyntheticClient {
    pub fn new(id: ClientId, seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let train = synthetic_samples(&mut rng, TRAIN_SAMPLES);
        let test = synthetic_samples(&mut rng, TEST_SAMPLES);
        SyntheticClient { id, train, test }
    }

    fn model(parameters: &GlobalParameters) -> Result<LinearRatingModel, ClientCallFailure> {
        LinearRatingModel::from_parameters(parameters)
            .map_err(|e| ClientCallFailure::Rejected(e.to_string()))
    }

    /// Mini-batch SGD on squared error of the unclamped score.
    pub fn train(&self, model: &mut LinearRatingModel, config: &RoundConfig) -> f64 {
        let lr = config.learning_rate.unwrap_or(FALLBACK_LEARNING_RATE);
        let batch = (config.batch_size as usize).max(1);
        for _ in 0..config.local_epochs {
            for chunk in self.train.chunks(batch) {
                let mut grad_w = [0.0; FEATURE_COUNT];
                let mut grad_b = 0.0;
                for s in chunk {
                    let err = model.raw_score(&s.features) - s.rating;
                    for (g, x) in grad_w.iter_mut().zip(s.features.0.iter()) {
                        *g += 2.0 * err * x;
                    }
                    grad_b += 2.0 * err;
                }
                let n = chunk.len() as f64;
                for (w, g) in model.weights.iter_mut().zip(grad_w.iter()) {
                    *w -= lr * g / n;
                }
                model.bias -= lr * grad_b / n;
            }
        }
        let sq: f64 = self.train.iter()
            .map(|s| (model.raw_score(&s.features) - s.rating).powi(2))
            .sum();
        sq / self.train.len().max(1) as f64
    }

    /// (mse, mae) of clamped predictions over the test split.
    pub fn score(&self, model: &LinearRatingModel) -> Result<(f64, f64), ClientCallFailure> {
        let mut sq = 0.0;
        let mut abs = 0.0;
        for s in &self.test {
            let predicted = model.predict(&s.features)
                .map_err(|e| ClientCallFailure::Rejected(e.to_string()))?;
            let err = predicted - s.rating;
            sq += err * err;
            abs += err.abs();
        }
        let n = self.test.len().max(1) as f64;
        Ok((sq / n, abs / n))
    }
}

fn to_parameters(model: &LinearRatingModel) -> GlobalParameters {
    GlobalParameters::from_vecs(vec![model.weights.to_vec(), vec![model.bias]])
}

#[async_trait]
impl ClientSession for SyntheticClient {
    fn id(&self) -> &ClientId { &self.id }

    async fn get_parameters(&self) -> Result<GlobalParameters, ClientCallFailure> {
        Ok(GlobalParameters::from_vecs(vec![vec![0.0; FEATURE_COUNT], vec![0.0]]))
    }

    async fn fit(&self, parameters: Arc<GlobalParameters>, config: RoundConfig)
        -> Result<ClientUpdate, ClientCallFailure> {
        let mut model = Self::model(&parameters)?;
        let loss = self.train(&mut model, &config);
        log::debug!("[{}] local fit: {} → train mse {:.4}", self.id, config, loss);
        Ok(ClientUpdate {
            parameters: to_parameters(&model),
            num_examples: self.train.len() as u64,
            metrics: Metrics::from([("loss".to_string(), loss)]),
        })
    }

    async fn evaluate(&self, parameters: Arc<GlobalParameters>, _config: RoundConfig)
        -> Result<EvaluateOutcome, ClientCallFailure> {
        let model = Self::model(&parameters)?;
        let (mse, mae) = self.score(&model)?;
        Ok(EvaluateOutcome {
            loss: mse,
            num_examples: self.test.len() as u64,
            metrics: Metrics::from([("mae".to_string(), mae)]),
        })
    }
}

/// `n` clients named `sim-0..n`, seeded from `seed + i`.
pub fn synthetic_fleet(n: usize, seed: u64) -> Vec<Arc<dyn ClientSession>> {
    (0..n).map(|i| {
        let client = SyntheticClient::new(ClientId::new(format!("sim-{}", i)), seed.wrapping_add(i as u64));
        Arc::new(client) as Arc<dyn ClientSession>
    }).collect()
}

// -----------------------------------------------------------------------------
// Full run
// -----------------------------------------------------------------------------

pub struct SimulationReport {
    pub num_clients: usize,
    /// Final model, or the one from the last completed round if the run aborted.
    pub parameters: Option<GlobalParameters>,
    pub history: Vec<RoundRecord>,
    pub aborted: Option<FederationError>,
}

impl SimulationReport {
    pub fn first_loss(&self) -> Option<f64> {
        self.history.iter().find_map(|r| r.evaluation.as_ref().map(|e| e.loss))
    }

    pub fn final_loss(&self) -> Option<f64> {
        self.history.iter().rev().find_map(|r| r.evaluation.as_ref().map(|e| e.loss))
    }
}

impl std::fmt::Display for SimulationReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let fmt_loss = |l: Option<f64>| l.map(|v| format!("{:.4}", v)).unwrap_or_else(|| "n/a".into());
        writeln!(f, "┌─ Simulation ───────────────────────────────")?;
        writeln!(f, "│ clients        : {}", self.num_clients)?;
        writeln!(f, "│ rounds         : {}", self.history.len())?;
        writeln!(f, "│ first eval loss: {}", fmt_loss(self.first_loss()))?;
        writeln!(f, "│ final eval loss: {}", fmt_loss(self.final_loss()))?;
        match &self.parameters {
            Some(p) => writeln!(f, "│ parameters     : {}", p)?,
            None => writeln!(f, "│ parameters     : none")?,
        }
        if let Some(err) = &self.aborted {
            writeln!(f, "│ aborted        : {}", err.root())?;
        }
        write!(f, "└────────────────────────────────────────────")
    }
}

pub async fn run_simulation(config: RunConfig, num_clients: usize, seed: u64)
    -> Result<SimulationReport, FederationError> {
    run_with_clients(config, synthetic_fleet(num_clients, seed)).await
}

/// Drive a full run over `clients`. Only configuration errors are returned
/// as `Err`; an aborted run still yields a report with the last good model.
pub async fn run_with_clients(config: RunConfig, clients: Vec<Arc<dyn ClientSession>>)
    -> Result<SimulationReport, FederationError> {
    config.validate()?;
    let num_clients = clients.len();
    let registry = ClientRegistry::new();
    for client in clients {
        registry.register(client, None).await;
    }

    let mut coordinator = Coordinator::new(config, registry, None);
    let logger = spawn_event_logger(coordinator.subscribe());
    let result = coordinator.run().await;
    let history = coordinator.history().to_vec();
    let (parameters, aborted) = match result {
        Ok(params) => (Some(params), None),
        Err(err) => (coordinator.parameters().cloned(), Some(err)),
    };
    drop(coordinator);
    let _ = logger.await;

    Ok(SimulationReport { num_clients, parameters, history, aborted })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dataset_shape_and_range() {
        let c = SyntheticClient::new(ClientId::new("a"), 7);
        assert_eq!(c.train.len(), TRAIN_SAMPLES);
        assert_eq!(c.test.len(), TEST_SAMPLES);
        for s in &c.train {
            assert!(s.rating >= 0.0 && s.rating <= 5.0);
            assert!(s.features.0[0] < 5.0 && s.features.0[1] < 2.0);
            assert_eq!(s.features.0[9].fract(), 0.0);
        }
    }

    #[test]
    fn test_same_seed_same_data() {
        let a = SyntheticClient::new(ClientId::new("a"), 42);
        let b = SyntheticClient::new(ClientId::new("b"), 42);
        assert_eq!(a.train, b.train);
        let c = SyntheticClient::new(ClientId::new("c"), 43);
        assert_ne!(a.train, c.train);
    }

    #[tokio::test]
    async fn test_fit_reduces_training_loss() {
        let c = SyntheticClient::new(ClientId::new("a"), 1);
        let start = Arc::new(c.get_parameters().await.unwrap());
        let cfg = RoundConfig { batch_size: 16, local_epochs: 5, learning_rate: Some(0.01) };
        let first = c.fit(start.clone(), cfg).await.unwrap();
        assert_eq!(first.num_examples, 100);
        assert_eq!(first.parameters.shapes(), vec![vec![10], vec![1]]);
        let second = c.fit(Arc::new(first.parameters), cfg).await.unwrap();
        assert!(second.metrics["loss"] < first.metrics["loss"]);
    }

    #[tokio::test]
    async fn test_evaluate_reports_mse_and_mae() {
        let c = SyntheticClient::new(ClientId::new("a"), 3);
        let cfg = RoundConfig { batch_size: 16, local_epochs: 1, learning_rate: None };
        let zeros = Arc::new(c.get_parameters().await.unwrap());
        let out = c.evaluate(zeros, cfg).await.unwrap();
        assert_eq!(out.num_examples, 25);
        assert!(out.loss > 0.0);
        assert!(out.metrics["mae"] > 0.0);
        assert!(out.metrics["mae"] * out.metrics["mae"] <= out.loss + 1e-12);
    }

    #[tokio::test]
    async fn test_fit_rejects_wrong_layout() {
        let c = SyntheticClient::new(ClientId::new("a"), 3);
        let cfg = RoundConfig { batch_size: 16, local_epochs: 1, learning_rate: None };
        let bad = Arc::new(GlobalParameters::scalar(1.0));
        assert!(matches!(c.fit(bad, cfg).await, Err(ClientCallFailure::Rejected(_))));
    }

    #[tokio::test]
    async fn test_full_simulation_improves_on_zero_model() {
        let config = RunConfig { num_rounds: 10, ..Default::default() };
        let report = run_simulation(config, 3, 2024).await.unwrap();
        assert!(report.aborted.is_none());
        assert_eq!(report.history.len(), 10);
        assert!(report.history.iter().all(|r| r.participants.len() == 3));

        let zero = LinearRatingModel { weights: [0.0; 10], bias: 0.0 };
        let holdout = SyntheticClient::new(ClientId::new("holdout"), 2024);
        let (baseline, _) = holdout.score(&zero).unwrap();
        let trained = LinearRatingModel::from_parameters(report.parameters.as_ref().unwrap()).unwrap();
        let (after, _) = holdout.score(&trained).unwrap();
        assert!(after < baseline, "{} !< {}", after, baseline);
    }

    #[tokio::test]
    async fn test_simulation_below_quorum_aborts() {
        let config = RunConfig { num_rounds: 2, ..Default::default() };
        let report = run_simulation(config, 1, 5).await.unwrap();
        let err = report.aborted.as_ref().unwrap();
        assert!(matches!(err.root(), FederationError::InsufficientClients { .. }));
        assert!(report.history.is_empty());
        // the initial model is still the best known one
        assert_eq!(report.parameters.unwrap().shapes(), vec![vec![10], vec![1]]);
    }

    /// Synthetic client that stops answering fits after `ok_fits` calls.
    struct DropsOut {
        inner: SyntheticClient,
        ok_fits: u32,
        fits: std::sync::atomic::AtomicU32,
    }

    #[async_trait]
    impl ClientSession for DropsOut {
        fn id(&self) -> &ClientId { self.inner.id() }
        async fn get_parameters(&self) -> Result<GlobalParameters, ClientCallFailure> {
            self.inner.get_parameters().await
        }
        async fn fit(&self, parameters: Arc<GlobalParameters>, config: RoundConfig)
            -> Result<ClientUpdate, ClientCallFailure> {
            if self.fits.fetch_add(1, std::sync::atomic::Ordering::SeqCst) >= self.ok_fits {
                return Err(ClientCallFailure::Transport("device went offline".into()));
            }
            self.inner.fit(parameters, config).await
        }
        async fn evaluate(&self, parameters: Arc<GlobalParameters>, config: RoundConfig)
            -> Result<EvaluateOutcome, ClientCallFailure> {
            self.inner.evaluate(parameters, config).await
        }
    }

    #[tokio::test]
    async fn test_mid_run_abort_keeps_last_completed_model() {
        let steady: Arc<dyn ClientSession> = Arc::new(SyntheticClient::new(ClientId::new("sim-0"), 11));
        let flaky: Arc<dyn ClientSession> = Arc::new(DropsOut {
            inner: SyntheticClient::new(ClientId::new("sim-1"), 12),
            ok_fits: 2,
            fits: std::sync::atomic::AtomicU32::new(0),
        });
        let config = RunConfig { num_rounds: 5, ..Default::default() };
        let report = run_with_clients(config, vec![steady, flaky]).await.unwrap();

        let err = report.aborted.as_ref().unwrap();
        assert!(matches!(err, FederationError::Aborted { last_completed_round: Some(1), .. }));
        assert!(matches!(err.root(), FederationError::QuorumNotMet { round_index: 2, .. }));
        assert_eq!(report.history.len(), 2);

        let kept = report.parameters.as_ref().unwrap();
        assert_eq!(kept.shapes(), vec![vec![10], vec![1]]);
        assert!(kept.flat(0).unwrap().iter().any(|w| *w != 0.0));
        assert!(report.to_string().contains("aborted"));
    }
}
