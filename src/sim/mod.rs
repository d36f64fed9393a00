/// Post-simulation energy balance validation.
pub mod balance;
/// Externally controlled episodes.
pub mod dynamic;
pub mod engine;
/// Canonical solar profile generation.
pub mod profile;
pub mod report;
/// Parallel sizing sweeps.
pub mod sweep;

pub use engine::{SimulationReport, SimulationRequest, run_simulation};
pub use sweep::{Objective, SweepOutcome, SweepSpec, run_sweep};
