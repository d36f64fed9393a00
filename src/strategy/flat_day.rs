use crate::battery::BessModel;
use crate::error::{BessError, Result};
use crate::sim::balance::BalanceMode;

use super::{
    StrategyOutput, StrategyParams, absorb, charged_mw, day_count, day_index, discharged_mw,
    hour_of_day, require_non_negative,
};

/// Share of the mean window solar used as the automatic target.
pub const AUTO_TARGET_SHARE: f64 = 0.95;

/// Flat delivery target.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum FlatTarget {
    /// Fixed export level (MW).
    Mw(f64),
    /// 0.95 x mean window solar, recomputed per day.
    #[default]
    Auto,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FlatDayParams {
    pub target: FlatTarget,
    pub start_hour: f64,
    pub end_hour: f64,
}

impl Default for FlatDayParams {
    fn default() -> Self {
        Self {
            target: FlatTarget::Auto,
            start_hour: 8.0,
            end_hour: 18.0,
        }
    }
}

impl FlatDayParams {
    pub(crate) fn from_params(p: &StrategyParams) -> Self {
        let d = Self::default();
        Self {
            target: p.flat_mw.map_or(FlatTarget::Auto, FlatTarget::Mw),
            start_hour: p.start_hour.unwrap_or(d.start_hour),
            end_hour: p.end_hour.unwrap_or(d.end_hour),
        }
    }

    fn validate(&self) -> Result<()> {
        let (s, e) = (self.start_hour, self.end_hour);
        if !(s.is_finite() && e.is_finite() && 0.0 <= s && s < e && e <= 24.0) {
            return Err(BessError::config(format!(
                "flat_day window must satisfy 0 <= start < end <= 24, got {s}..{e}"
            )));
        }
        if let FlatTarget::Mw(mw) = self.target {
            require_non_negative("flat_mw", mw)?;
        }
        Ok(())
    }

    fn in_window(&self, hour: f64) -> bool {
        hour >= self.start_hour && hour < self.end_hour
    }
}

/// Export target for every day covered by the profile.
pub fn daily_targets(solar: &[f64], params: &FlatDayParams, dt: f64) -> Vec<f64> {
    let days = day_count(solar.len(), dt);
    match params.target {
        FlatTarget::Mw(mw) => vec![mw; days],
        FlatTarget::Auto => {
            let window_h = params.end_hour - params.start_hour;
            let mut energy = vec![0.0; days];
            for (i, &s) in solar.iter().enumerate() {
                if params.in_window(hour_of_day(i, dt)) {
                    energy[day_index(i, dt)] += s * dt;
                }
            }
            energy
                .into_iter()
                .map(|e| AUTO_TARGET_SHARE * e / window_h)
                .collect()
        }
    }
}

/// Window deficit (MWh) from step `i` to the end of its day.
fn remaining_deficits(solar: &[f64], params: &FlatDayParams, targets: &[f64], dt: f64) -> Vec<f64> {
    let mut out = vec![0.0; solar.len()];
    let mut acc = 0.0;
    for i in (0..solar.len()).rev() {
        if i + 1 < solar.len() && day_index(i + 1, dt) != day_index(i, dt) {
            acc = 0.0;
        }
        if params.in_window(hour_of_day(i, dt)) {
            acc += (targets[day_index(i, dt)] - solar[i]).max(0.0) * dt;
        }
        out[i] = acc;
    }
    out
}

/// Flat export inside a daily window, solar passed through outside it.
///
/// Inside the window the excess over the target is stored (curtailed when the
/// battery is full) and shortfalls are covered from storage. Before the
/// window, solar pre-charges the battery when the rest of the day's window
/// deficit exceeds what is already stored.
pub fn flat_day(
    model: &mut BessModel,
    solar: &[f64],
    params: &FlatDayParams,
) -> Result<StrategyOutput> {
    params.validate()?;
    let dt = model.dt();
    let targets = daily_targets(solar, params, dt);
    let deficits = remaining_deficits(solar, params, &targets, dt);
    let roundtrip = model.config().roundtrip_efficiency();
    let mut out = StrategyOutput::with_capacity(solar.len(), BalanceMode::Full);

    for (i, &s) in solar.iter().enumerate() {
        let target = targets[day_index(i, dt)];
        if params.in_window(hour_of_day(i, dt)) {
            if s > target {
                let (step, curtailed) = absorb(model, s - target, dt)?;
                out.record(target, &step, curtailed);
            } else {
                let step = model.step(target - s, dt)?;
                out.record(s + discharged_mw(&step), &step, 0.0);
            }
            continue;
        }

        let stored = model.config().deliverable_energy_at(model.soc());
        let shortfall = deficits[i] - stored;
        if s > 0.0 && shortfall > 0.0 {
            let need_mw = shortfall / (roundtrip * dt);
            let step = model.step(-s.min(need_mw), dt)?;
            out.record(s - charged_mw(&step), &step, 0.0);
        } else {
            let step = model.step(0.0, dt)?;
            out.record(s, &step, 0.0);
        }
    }
    Ok(out)
}
