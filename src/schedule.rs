// =============================================================================
// FEDREC CORE — schedule.rs
// Per-round hyperparameters
// =============================================================================
//
// Round indices are zero-based throughout the core. Logs print
// `round_index + 1` as the human round number.
//
//   r < 2       — 3 epochs, lr 1e-3   (exploration)
//   2 <= r < 6  — 5 epochs, lr 5e-4   (standard training)
//   r >= 6      — 2 epochs, lr 1e-4   (fine-tuning)
// =============================================================================

use crate::constants::{BATCH_SIZE, FINAL_PHASE_START, MIDDLE_PHASE_START};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoundMode {
    Fit,
    Evaluate,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RoundConfig {
    pub batch_size: u32,
    pub local_epochs: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub learning_rate: Option<f64>,
}

impl std::fmt::Display for RoundConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.learning_rate {
            Some(lr) => write!(f, "batch_size={}, local_epochs={}, lr={}",
                self.batch_size, self.local_epochs, lr),
            None => write!(f, "batch_size={}, local_epochs={}",
                self.batch_size, self.local_epochs),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RoundScheduler;

impl RoundScheduler {
    pub fn new() -> Self { RoundScheduler }

    pub fn config(&self, round_index: u32, mode: RoundMode) -> RoundConfig {
        match mode {
            RoundMode::Fit => Self::fit_config(round_index),
            RoundMode::Evaluate => Self::evaluate_config(round_index),
        }
    }

    fn fit_config(round_index: u32) -> RoundConfig {
        let (local_epochs, learning_rate) = if round_index < MIDDLE_PHASE_START {
            (3, 0.001)
        } else if round_index < FINAL_PHASE_START {
            (5, 0.0005)
        } else {
            (2, 0.0001)
        };
        RoundConfig { batch_size: BATCH_SIZE, local_epochs, learning_rate: Some(learning_rate) }
    }

    fn evaluate_config(_round_index: u32) -> RoundConfig {
        RoundConfig { batch_size: BATCH_SIZE, local_epochs: 1, learning_rate: None }
    }
}
