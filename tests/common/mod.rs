//! Shared test fixtures for integration tests.

use bess_sim::battery::{BessModel, ModelOptions};
use bess_sim::catalog::Catalog;
use bess_sim::sim::profile::canonical_profile;

/// Built-in technology and topology tables.
pub fn catalog() -> Catalog {
    Catalog::builtin()
}

/// Lenient options with hourly steps.
pub fn options() -> ModelOptions {
    ModelOptions::default()
}

/// AC-coupled battery of the given size and chemistry.
pub fn model(power_mw: f64, duration_hours: f64, technology: &str) -> BessModel {
    BessModel::new(
        power_mw,
        duration_hours,
        technology,
        "ac_coupled",
        &catalog(),
        options(),
    )
    .unwrap()
}

/// Default battery (2 MW / 4 h LFP, AC-coupled).
pub fn default_model() -> BessModel {
    model(2.0, 4.0, "lfp")
}

/// `n` hourly samples of constant solar power.
pub fn constant_profile(mw: f64, n: usize) -> Vec<f64> {
    vec![mw; n]
}

/// Hourly June profile of a 5 MWp plant over `days` days.
pub fn sunny_days(days: usize) -> Vec<f64> {
    canonical_profile(5.0, Some(6), 24, days).unwrap()
}

/// Asserts two floats agree within `tol`.
pub fn assert_close(actual: f64, expected: f64, tol: f64) {
    assert!(
        (actual - expected).abs() <= tol,
        "expected {expected}, got {actual} (tolerance {tol})"
    );
}
