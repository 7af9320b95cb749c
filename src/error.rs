// =============================================================================
// FEDREC CORE — error.rs
// =============================================================================
//
// Error taxonomy:
//   1. FederationError   — run-level failures (abort the coordinator)
//   2. ClientCallFailure — one client, one call; absorbed by the strategy
//   3. CodecError        — one encode/predict request
// =============================================================================

use thiserror::Error;

#[derive(Debug, Error)]
pub enum FederationError {
    #[error("round {round_index}: {available} clients available, {required} required")]
    InsufficientClients {
        round_index: u32,
        available: usize,
        required: usize,
    },

    #[error("round {round_index}: quorum not met ({successes} successful updates, {required} required)")]
    QuorumNotMet {
        round_index: u32,
        successes: usize,
        required: usize,
    },

    #[error("round {round_index}: successful updates report zero training examples")]
    NoTrainingExamples { round_index: u32 },

    #[error("update #{update}: tensor shapes {actual:?} do not match {expected:?}")]
    ShapeMismatch {
        update: usize,
        expected: Vec<Vec<usize>>,
        actual: Vec<Vec<usize>>,
    },

    #[error("could not obtain initial parameters: {0}")]
    InitialParameters(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("coordinator is not idle: {0}")]
    InvalidState(&'static str),

    #[error("run aborted (last completed round: {last_completed_round:?}): {source}")]
    Aborted {
        last_completed_round: Option<u32>,
        #[source]
        source: Box<FederationError>,
    },
}

impl FederationError {
    /// The underlying cause when wrapped in `Aborted`.
    pub fn root(&self) -> &FederationError {
        match self {
            FederationError::Aborted { source, .. } => source.root(),
            other => other,
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum ClientCallFailure {
    #[error("call timed out")]
    Timeout,
    #[error("transport error: {0}")]
    Transport(String),
    #[error("client rejected request: {0}")]
    Rejected(String),
    #[error("call abandoned")]
    Cancelled,
}

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("required attribute `{0}` is missing")]
    UnknownField(&'static str),
    #[error("invalid feature mapping: {0}")]
    InvalidMapping(String),
    #[error("prediction failed: {0}")]
    Prediction(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}
