use crate::battery::{BessModel, StepResult};
use crate::error::{BessError, Result};
use crate::sim::balance::BalanceMode;

use super::{
    StrategyOutput, StrategyParams, absorb, charged_mw, discharged_mw, hour_of_day, percentile,
    require_fraction, require_non_negative,
};

/// Fraction of peak solar used when no cap is given.
pub const DEFAULT_CAP_PEAK_FRACTION: f64 = 0.7;

/// How a grid export cap is chosen.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CapTarget {
    /// Fixed cap (MW).
    Mw(f64),
    /// Percentile (0..=100) of the positive solar samples.
    Percentile(f64),
    /// Fraction of peak solar.
    PeakFraction(f64),
}

impl Default for CapTarget {
    fn default() -> Self {
        CapTarget::PeakFraction(DEFAULT_CAP_PEAK_FRACTION)
    }
}

impl CapTarget {
    fn from_params(p: &StrategyParams) -> Self {
        match (p.cap_mw, p.percentile) {
            (Some(mw), _) => CapTarget::Mw(mw),
            (None, Some(pct)) => CapTarget::Percentile(pct),
            (None, None) => CapTarget::default(),
        }
    }

    /// Cap in MW for this profile.
    ///
    /// # Errors
    ///
    /// Returns `Configuration` for a negative cap or an out-of-range
    /// percentile or fraction.
    pub fn resolve(&self, solar: &[f64]) -> Result<f64> {
        match *self {
            CapTarget::Mw(mw) => require_non_negative("cap_mw", mw),
            CapTarget::Percentile(pct) => {
                if !(pct.is_finite() && (0.0..=100.0).contains(&pct)) {
                    return Err(BessError::config(format!(
                        "percentile must be in [0, 100], got {pct}"
                    )));
                }
                let positive: Vec<f64> = solar.iter().copied().filter(|s| *s > 0.0).collect();
                Ok(percentile(&positive, pct))
            }
            CapTarget::PeakFraction(f) => {
                let f = require_fraction("cap peak fraction", f)?;
                Ok(f * solar.iter().copied().fold(0.0, f64::max))
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct CapShavingParams {
    pub cap: CapTarget,
    /// Discharge gently below half the cap.
    pub soft_discharge: bool,
}

impl CapShavingParams {
    pub(crate) fn from_params(p: &StrategyParams) -> Self {
        Self {
            cap: CapTarget::from_params(p),
            soft_discharge: p.soft_discharge.unwrap_or(false),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BalancedParams {
    pub cap: CapTarget,
    /// Hour of day from which stored energy is spread over the evening.
    pub discharge_start_hour: f64,
}

impl Default for BalancedParams {
    fn default() -> Self {
        Self {
            cap: CapTarget::default(),
            discharge_start_hour: 16.0,
        }
    }
}

impl BalancedParams {
    pub(crate) fn from_params(p: &StrategyParams) -> Self {
        let d = Self::default();
        Self {
            cap: CapTarget::from_params(p),
            discharge_start_hour: p.discharge_start_hour.unwrap_or(d.discharge_start_hour),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SoftCapParams {
    pub cap: CapTarget,
}

impl SoftCapParams {
    pub(crate) fn from_params(p: &StrategyParams) -> Self {
        Self {
            cap: CapTarget::from_params(p),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PeakShavingParams {
    /// Percentile of positive solar used as the cap.
    pub percentile: f64,
    pub soft_discharge: bool,
}

impl Default for PeakShavingParams {
    fn default() -> Self {
        Self {
            percentile: 90.0,
            soft_discharge: false,
        }
    }
}

impl PeakShavingParams {
    pub(crate) fn from_params(p: &StrategyParams) -> Self {
        let d = Self::default();
        Self {
            percentile: p.percentile.unwrap_or(d.percentile),
            soft_discharge: p.soft_discharge.unwrap_or(d.soft_discharge),
        }
    }
}

/// Soft discharge runs below this share of the cap.
const SOFT_DISCHARGE_SOLAR_SHARE: f64 = 0.5;
/// Soft discharge needs at least this SOC.
const SOFT_DISCHARGE_MIN_SOC: f64 = 0.30;
/// Soft discharge power as a share of effective power.
const SOFT_DISCHARGE_POWER_SHARE: f64 = 0.25;

/// Charges with the excess over `cap`; returns the step, grid export and
/// curtailment.
fn charge_excess(
    model: &mut BessModel,
    solar_mw: f64,
    cap_mw: f64,
    dt: f64,
) -> Result<(StepResult, f64, f64)> {
    let (step, curtailed) = absorb(model, solar_mw - cap_mw, dt)?;
    Ok((step, cap_mw, curtailed))
}

/// Discharges up to `request_mw` on top of solar.
fn top_up(model: &mut BessModel, solar_mw: f64, request_mw: f64, dt: f64) -> Result<(StepResult, f64)> {
    let step = model.step(request_mw.max(0.0), dt)?;
    Ok((step, solar_mw + discharged_mw(&step)))
}

fn run_cap(
    model: &mut BessModel,
    solar: &[f64],
    cap_mw: f64,
    soft_discharge: bool,
) -> Result<StrategyOutput> {
    let dt = model.dt();
    let soft_power = SOFT_DISCHARGE_POWER_SHARE * model.config().effective_power_mw;
    let mut out = StrategyOutput::with_capacity(solar.len(), BalanceMode::Full);

    for &s in solar {
        if s > cap_mw {
            let (step, grid, curtailed) = charge_excess(model, s, cap_mw, dt)?;
            out.record(grid, &step, curtailed);
        } else if soft_discharge
            && s < SOFT_DISCHARGE_SOLAR_SHARE * cap_mw
            && model.soc() > SOFT_DISCHARGE_MIN_SOC
        {
            let (step, grid) = top_up(model, s, soft_power.min(cap_mw - s), dt)?;
            out.record(grid, &step, 0.0);
        } else {
            let step = model.step(0.0, dt)?;
            out.record(s, &step, 0.0);
        }
    }
    Ok(out)
}

/// Hard cap: store what exceeds the cap, curtail what the battery refuses.
pub fn cap_shaving(
    model: &mut BessModel,
    solar: &[f64],
    params: &CapShavingParams,
) -> Result<StrategyOutput> {
    let cap_mw = params.cap.resolve(solar)?;
    run_cap(model, solar, cap_mw, params.soft_discharge)
}

/// Cap at a solar percentile, then hard cap shaving.
pub fn peak_shaving(
    model: &mut BessModel,
    solar: &[f64],
    params: &PeakShavingParams,
) -> Result<StrategyOutput> {
    let cap_mw = CapTarget::Percentile(params.percentile).resolve(solar)?;
    run_cap(model, solar, cap_mw, params.soft_discharge)
}

/// Hard cap charging, then stored energy spread evenly to the end of each day.
pub fn cap_shaving_balanced(
    model: &mut BessModel,
    solar: &[f64],
    params: &BalancedParams,
) -> Result<StrategyOutput> {
    let start = params.discharge_start_hour;
    if !(start.is_finite() && (0.0..24.0).contains(&start)) {
        return Err(BessError::config(format!(
            "discharge_start_hour must be in [0, 24), got {start}"
        )));
    }
    let cap_mw = params.cap.resolve(solar)?;
    let dt = model.dt();
    let mut out = StrategyOutput::with_capacity(solar.len(), BalanceMode::Full);

    for (i, &s) in solar.iter().enumerate() {
        let hour = hour_of_day(i, dt);
        if s > cap_mw {
            let (step, grid, curtailed) = charge_excess(model, s, cap_mw, dt)?;
            out.record(grid, &step, curtailed);
        } else if hour >= start {
            let remaining_h = 24.0 - hour;
            let deliverable = model.config().deliverable_energy_at(model.soc());
            let rate = deliverable / remaining_h;
            let (step, grid) = top_up(model, s, rate.min(cap_mw - s), dt)?;
            out.record(grid, &step, 0.0);
        } else {
            let step = model.step(0.0, dt)?;
            out.record(s, &step, 0.0);
        }
    }
    Ok(out)
}

/// Same charging as the hard cap, but curtailment is reported only.
///
/// Grid export is `solar - charge`, so the recorded curtailment is not part
/// of the balance equation.
pub fn soft_cap_shaving(
    model: &mut BessModel,
    solar: &[f64],
    params: &SoftCapParams,
) -> Result<StrategyOutput> {
    let cap_mw = params.cap.resolve(solar)?;
    let dt = model.dt();
    let mut out = StrategyOutput::with_capacity(solar.len(), BalanceMode::ExcludeCurtailment);

    for &s in solar {
        if s > cap_mw {
            let (step, curtailed) = absorb(model, s - cap_mw, dt)?;
            out.record(s - charged_mw(&step), &step, curtailed);
        } else {
            let step = model.step(0.0, dt)?;
            out.record(s, &step, 0.0);
        }
    }
    Ok(out)
}
