//! Run-wide defaults and fixed contracts for the federated recommender.
//!
//! The feature-order constants here are shared by training and inference;
//! changing them silently corrupts every prediction made with an already
//! trained model.

/// Service name used in banners and status responses
pub const SERVICE_NAME: &str = "fedrec-core";

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Project tagline
pub const TAGLINE: &str = "Round-based federated training for on-device rating models";

// ═══════════════════════════════════════════════════════════════
// Run parameters
// ═══════════════════════════════════════════════════════════════

/// Number of federated rounds in a run
pub const DEFAULT_NUM_ROUNDS: u32 = 10;

/// Minimum registered clients before a round may start
pub const DEFAULT_MIN_AVAILABLE_CLIENTS: usize = 2;

/// Minimum successful fit responses to accept a round
pub const DEFAULT_MIN_FIT_CLIENTS: usize = 2;

/// Minimum successful evaluate responses to report a round
pub const DEFAULT_MIN_EVALUATE_CLIENTS: usize = 2;

/// Share of available clients sampled for fit
pub const DEFAULT_FRACTION_FIT: f64 = 1.0;

/// Share of available clients sampled for evaluate
pub const DEFAULT_FRACTION_EVALUATE: f64 = 1.0;

/// Coordinator HTTP bind address
pub const DEFAULT_BIND_ADDR: ([u8; 4], u16) = ([0, 0, 0, 0], 8080);

/// Upper bound on a single fit/evaluate call
pub const DEFAULT_CLIENT_TIMEOUT_SECS: u64 = 120;

/// How long `serve` waits for registrations before round 0
pub const DEFAULT_WAIT_FOR_CLIENTS_SECS: u64 = 60;

// ═══════════════════════════════════════════════════════════════
// Round schedule
// ═══════════════════════════════════════════════════════════════

pub const BATCH_SIZE: u32 = 16;

/// Zero-based round index where the middle phase begins
pub const MIDDLE_PHASE_START: u32 = 2;

/// Zero-based round index where fine-tuning begins
pub const FINAL_PHASE_START: u32 = 6;

// ═══════════════════════════════════════════════════════════════
// Feature layout
// ═══════════════════════════════════════════════════════════════

/// Length of the encoded feature vector
pub const FEATURE_COUNT: usize = 10;

/// Numeric fields in the order the min-max scaler was fitted
pub const SCALED_FIELDS: [&str; 6] = [
    "app_usage_time",
    "screen_time",
    "battery_drain",
    "apps_installed",
    "data_usage",
    "age",
];

/// Encoded vector layout, index by index
pub const FEATURE_ORDER: [&str; FEATURE_COUNT] = [
    "device_id",
    "os_id",
    "gender_id",
    "age",
    "scaled_app_usage_time",
    "scaled_screen_time",
    "scaled_battery_drain",
    "scaled_apps_installed",
    "scaled_data_usage",
    "behavior_class",
];

/// Id returned for categories missing from a lookup table
pub const UNKNOWN_CATEGORY_ID: u32 = 0;

/// Ratings live on a 0–5 scale
pub const RATING_MIN: f64 = 0.0;
pub const RATING_MAX: f64 = 5.0;

// ═══════════════════════════════════════════════════════════════
// Display functions
// ═══════════════════════════════════════════════════════════════

/// Print the startup banner
pub fn print_banner() {
    println!("╔════════════════════════════════════════════════════════════╗");
    println!("║        FEDREC CORE — RECOMMENDATION MODEL FEDERATION       ║");
    println!("╚════════════════════════════════════════════════════════════╝");
    println!();
    println!("  {} v{}", TAGLINE, VERSION);
    println!();
}
