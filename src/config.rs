// =============================================================================
// FEDREC CORE — config.rs
// RunConfig — one immutable record of process-wide run parameters
// =============================================================================
//
// Sources, later wins:
//   1. built-in defaults (constants.rs)
//   2. JSON file named by FEDREC_CONFIG
//   3. FEDREC_* environment variables
// =============================================================================

use crate::constants::*;
use crate::error::FederationError;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    pub num_rounds: u32,
    pub min_available_clients: usize,
    pub min_fit_clients: usize,
    pub min_evaluate_clients: usize,
    pub fraction_fit: f64,
    pub fraction_evaluate: f64,
    pub bind_addr: SocketAddr,
    pub client_timeout_secs: u64,
    pub wait_for_clients_secs: u64,
}

impl Default for RunConfig {
    fn default() -> Self {
        RunConfig {
            num_rounds: DEFAULT_NUM_ROUNDS,
            min_available_clients: DEFAULT_MIN_AVAILABLE_CLIENTS,
            min_fit_clients: DEFAULT_MIN_FIT_CLIENTS,
            min_evaluate_clients: DEFAULT_MIN_EVALUATE_CLIENTS,
            fraction_fit: DEFAULT_FRACTION_FIT,
            fraction_evaluate: DEFAULT_FRACTION_EVALUATE,
            bind_addr: SocketAddr::from(DEFAULT_BIND_ADDR),
            client_timeout_secs: DEFAULT_CLIENT_TIMEOUT_SECS,
            wait_for_clients_secs: DEFAULT_WAIT_FOR_CLIENTS_SECS,
        }
    }
}

fn env_override<T: FromStr>(key: &str, slot: &mut T) -> Result<(), FederationError>
where
    T::Err: std::fmt::Display,
{
    if let Ok(raw) = std::env::var(key) {
        let raw = raw.trim();
        if raw.is_empty() {
            return Ok(());
        }
        *slot = raw.parse::<T>()
            .map_err(|e| FederationError::Config(format!("{}={}: {}", key, raw, e)))?;
    }
    Ok(())
}

impl RunConfig {
    pub fn from_json(text: &str) -> Result<Self, FederationError> {
        serde_json::from_str(text).map_err(|e| FederationError::Config(e.to_string()))
    }

    /// Defaults, then FEDREC_CONFIG file, then FEDREC_* variables. Validated.
    pub fn from_env() -> Result<Self, FederationError> {
        let mut cfg = match std::env::var("FEDREC_CONFIG") {
            Ok(path) if !path.trim().is_empty() => {
                let text = std::fs::read_to_string(path.trim())
                    .map_err(|e| FederationError::Config(format!("{}: {}", path, e)))?;
                Self::from_json(&text)?
            }
            _ => RunConfig::default(),
        };
        env_override("FEDREC_NUM_ROUNDS", &mut cfg.num_rounds)?;
        env_override("FEDREC_MIN_AVAILABLE_CLIENTS", &mut cfg.min_available_clients)?;
        env_override("FEDREC_MIN_FIT_CLIENTS", &mut cfg.min_fit_clients)?;
        env_override("FEDREC_MIN_EVALUATE_CLIENTS", &mut cfg.min_evaluate_clients)?;
        env_override("FEDREC_FRACTION_FIT", &mut cfg.fraction_fit)?;
        env_override("FEDREC_FRACTION_EVALUATE", &mut cfg.fraction_evaluate)?;
        env_override("FEDREC_BIND_ADDR", &mut cfg.bind_addr)?;
        env_override("FEDREC_CLIENT_TIMEOUT_SECS", &mut cfg.client_timeout_secs)?;
        env_override("FEDREC_WAIT_FOR_CLIENTS_SECS", &mut cfg.wait_for_clients_secs)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), FederationError> {
        let fail = |msg: String| Err(FederationError::Config(msg));
        if self.num_rounds == 0 {
            return fail("num_rounds must be > 0".into());
        }
        if self.min_available_clients < 2 {
            return fail(format!("min_available_clients must be >= 2 (got {})", self.min_available_clients));
        }
        if self.min_fit_clients == 0 || self.min_fit_clients > self.min_available_clients {
            return fail(format!("min_fit_clients must be in 1..={} (got {})",
                self.min_available_clients, self.min_fit_clients));
        }
        if self.min_evaluate_clients == 0 {
            return fail("min_evaluate_clients must be > 0".into());
        }
        for (name, f) in [("fraction_fit", self.fraction_fit), ("fraction_evaluate", self.fraction_evaluate)] {
            if !(f > 0.0 && f <= 1.0) {
                return fail(format!("{} must be in (0, 1] (got {})", name, f));
            }
        }
        if self.client_timeout_secs == 0 {
            return fail("client_timeout_secs must be > 0".into());
        }
        Ok(())
    }

    pub fn client_timeout(&self) -> Duration { Duration::from_secs(self.client_timeout_secs) }

    pub fn wait_for_clients(&self) -> Duration { Duration::from_secs(self.wait_for_clients_secs) }
}

impl std::fmt::Display for RunConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f,
            "rounds={} min_available={} min_fit={} min_evaluate={} \
             fraction_fit={} fraction_evaluate={} bind={} timeout={}s",
            self.num_rounds, self.min_available_clients, self.min_fit_clients,
            self.min_evaluate_clients, self.fraction_fit, self.fraction_evaluate,
            self.bind_addr, self.client_timeout_secs)
    }
}
