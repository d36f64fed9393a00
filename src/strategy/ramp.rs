use crate::battery::BessModel;
use crate::error::Result;
use crate::sim::balance::BalanceMode;

use super::{StrategyOutput, StrategyParams, absorb, discharged_mw, require_positive};

/// Default ramp limit as a share of peak solar per hour.
pub const DEFAULT_RAMP_PEAK_FRACTION: f64 = 0.1;

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct RampLimitParams {
    /// Largest allowed grid change (MW/h); 10 % of peak solar when `None`.
    pub max_ramp_mw_per_hour: Option<f64>,
}

impl RampLimitParams {
    pub(crate) fn from_params(p: &StrategyParams) -> Self {
        Self {
            max_ramp_mw_per_hour: p.max_ramp_mw_per_hour,
        }
    }
}

/// Bounds the step-to-step grid change by moving the difference into or out
/// of the battery.
///
/// A rise the battery cannot absorb is curtailed; a fall it cannot cover
/// passes through.
pub fn ramp_limit(
    model: &mut BessModel,
    solar: &[f64],
    params: &RampLimitParams,
) -> Result<StrategyOutput> {
    let ramp = match params.max_ramp_mw_per_hour {
        Some(r) => require_positive("max_ramp_mw_per_hour", r)?,
        None => DEFAULT_RAMP_PEAK_FRACTION * solar.iter().copied().fold(0.0, f64::max),
    };
    let dt = model.dt();
    let max_delta = ramp * dt;
    let mut out = StrategyOutput::with_capacity(solar.len(), BalanceMode::Full);

    let mut prev = solar.first().copied().unwrap_or(0.0);
    for &s in solar {
        let (hi, lo) = (prev + max_delta, prev - max_delta);
        let grid = if s > hi {
            let (step, curtailed) = absorb(model, s - hi, dt)?;
            out.record(hi, &step, curtailed);
            hi
        } else if s < lo {
            let step = model.step(lo - s, dt)?;
            let grid = s + discharged_mw(&step);
            out.record(grid, &step, 0.0);
            grid
        } else {
            let step = model.step(0.0, dt)?;
            out.record(s, &step, 0.0);
            s
        };
        prev = grid;
    }
    Ok(out)
}
