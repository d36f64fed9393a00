//! Battery model: plant sizing, runtime state, and charge/discharge physics.

/// Stateful model, stateless transition, and strategy entry points.
pub mod model;
/// Cumulative counters and state of charge.
pub mod state;
pub mod types;

pub use model::{BessModel, validate_profile};
pub use state::BatteryState;
pub use types::{
    BessConfig, DEFAULT_BALANCE_TOLERANCE, DEFAULT_NOISE_FLOOR_MWH, LimitingConstraint,
    ModelOptions, NextState, StepResult,
};
