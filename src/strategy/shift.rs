use crate::battery::BessModel;
use crate::error::{BessError, Result};
use crate::sim::balance::BalanceMode;

use super::{
    StrategyOutput, StrategyParams, charged_mw, day_index, discharged_mw, hour_of_day,
    require_fraction, require_non_negative,
};

/// Half-open daily hour range `[start, end)`; wraps midnight when `start > end`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HourWindow {
    pub start: f64,
    pub end: f64,
}

impl HourWindow {
    pub const fn new(start: f64, end: f64) -> Self {
        Self { start, end }
    }

    pub fn contains(&self, hour: f64) -> bool {
        if self.start <= self.end {
            hour >= self.start && hour < self.end
        } else {
            hour >= self.start || hour < self.end
        }
    }

    fn validate(&self, name: &str) -> Result<()> {
        let ok = |h: f64| h.is_finite() && (0.0..=24.0).contains(&h);
        if !(ok(self.start) && ok(self.end)) || self.start == self.end {
            return Err(BessError::config(format!(
                "{name} must be a non-empty range within 0..24, got {}..{}",
                self.start, self.end
            )));
        }
        Ok(())
    }
}

impl From<[f64; 2]> for HourWindow {
    fn from(h: [f64; 2]) -> Self {
        Self::new(h[0], h[1])
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NightShiftParams {
    pub charge: HourWindow,
    pub discharge: HourWindow,
    /// Daily charging cap (MWh); usable capacity when `None`.
    pub energy_cap_mwh: Option<f64>,
    /// Evening discharge power as a share of effective power.
    pub discharge_fraction: f64,
}

impl Default for NightShiftParams {
    fn default() -> Self {
        Self {
            charge: HourWindow::new(10.0, 14.0),
            discharge: HourWindow::new(18.0, 22.0),
            energy_cap_mwh: None,
            discharge_fraction: 0.6,
        }
    }
}

impl NightShiftParams {
    pub(crate) fn from_params(p: &StrategyParams) -> Self {
        let d = Self::default();
        Self {
            charge: p.charge_hours.map_or(d.charge, HourWindow::from),
            discharge: p.discharge_hours.map_or(d.discharge, HourWindow::from),
            energy_cap_mwh: p.energy_cap_mwh,
            discharge_fraction: p.power_fraction.unwrap_or(d.discharge_fraction),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimeShiftParams {
    pub charge: HourWindow,
    pub discharge: HourWindow,
}

impl Default for TimeShiftParams {
    fn default() -> Self {
        Self {
            charge: HourWindow::new(9.0, 15.0),
            discharge: HourWindow::new(17.0, 23.0),
        }
    }
}

impl TimeShiftParams {
    pub(crate) fn from_params(p: &StrategyParams) -> Self {
        let d = Self::default();
        Self {
            charge: p.charge_hours.map_or(d.charge, HourWindow::from),
            discharge: p.discharge_hours.map_or(d.discharge, HourWindow::from),
        }
    }
}

/// Midday charging up to a daily energy cap, evening discharge at a fixed
/// share of effective power. Never curtails.
pub fn night_shift(
    model: &mut BessModel,
    solar: &[f64],
    params: &NightShiftParams,
) -> Result<StrategyOutput> {
    params.charge.validate("charge_hours")?;
    params.discharge.validate("discharge_hours")?;
    let fraction = require_fraction("power_fraction", params.discharge_fraction)?;
    let energy_cap = match params.energy_cap_mwh {
        Some(cap) => require_non_negative("energy_cap_mwh", cap)?,
        None => model.config().usable_capacity_mwh,
    };
    let dt = model.dt();
    let discharge_mw = fraction * model.config().effective_power_mw;
    let mut out = StrategyOutput::with_capacity(solar.len(), BalanceMode::Full);

    let mut day = 0;
    let mut charged_today = 0.0;
    for (i, &s) in solar.iter().enumerate() {
        if day_index(i, dt) != day {
            day = day_index(i, dt);
            charged_today = 0.0;
        }
        let hour = hour_of_day(i, dt);
        if params.charge.contains(hour) {
            let room_mw = ((energy_cap - charged_today) / dt).max(0.0);
            let step = model.step(-s.min(room_mw), dt)?;
            charged_today += charged_mw(&step) * dt;
            out.record(s - charged_mw(&step), &step, 0.0);
        } else if params.discharge.contains(hour) {
            let step = model.step(discharge_mw, dt)?;
            out.record(s + discharged_mw(&step), &step, 0.0);
        } else {
            let step = model.step(0.0, dt)?;
            out.record(s, &step, 0.0);
        }
    }
    Ok(out)
}

/// Charge at the full limit from solar, discharge at the full limit in the
/// evening.
pub fn time_shift_aggressive(
    model: &mut BessModel,
    solar: &[f64],
    params: &TimeShiftParams,
) -> Result<StrategyOutput> {
    params.charge.validate("charge_hours")?;
    params.discharge.validate("discharge_hours")?;
    let dt = model.dt();
    let full_mw = model.config().effective_power_mw;
    let mut out = StrategyOutput::with_capacity(solar.len(), BalanceMode::Full);

    for (i, &s) in solar.iter().enumerate() {
        let hour = hour_of_day(i, dt);
        if params.charge.contains(hour) {
            let step = model.step(-s, dt)?;
            out.record(s - charged_mw(&step), &step, 0.0);
        } else if params.discharge.contains(hour) {
            let step = model.step(full_mw, dt)?;
            out.record(s + discharged_mw(&step), &step, 0.0);
        } else {
            let step = model.step(0.0, dt)?;
            out.record(s, &step, 0.0);
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::battery::ModelOptions;
    use crate::catalog::Catalog;
    use crate::strategy::Strategy;

    fn model() -> BessModel {
        BessModel::new(1.0, 4.0, "lfp", "ac_coupled", &Catalog::builtin(), ModelOptions::default())
            .unwrap()
    }

    fn days(n: usize) -> Vec<f64> {
        (0..24 * n)
            .map(|i| {
                let x = ((i % 24) as f64 - 12.5) / 8.0;
                if x.abs() < 1.0 { 3.0 * (1.0 - x * x) } else { 0.0 }
            })
            .collect()
    }

    #[test]
    fn window_wraps_midnight() {
        let w = HourWindow::new(22.0, 2.0);
        assert!(w.contains(23.0));
        assert!(w.contains(1.0));
        assert!(!w.contains(12.0));
        assert!(HourWindow::new(5.0, 5.0).validate("w").is_err());
    }

    #[test]
    fn night_shift_respects_windows_and_cap() {
        let mut m = model();
        let params = NightShiftParams {
            energy_cap_mwh: Some(1.5),
            ..NightShiftParams::default()
        };
        let r = m
            .simulate(&days(2), &Strategy::NightShift(params))
            .unwrap()
            .validated()
            .unwrap();
        assert!(r.solar_curtailed.iter().all(|c| *c == 0.0));
        for (i, b) in r.battery_power.iter().enumerate() {
            let h = i % 24;
            if *b < 0.0 {
                assert!((10..14).contains(&h), "charged at hour {h}");
            }
            if *b > 0.0 {
                assert!((18..22).contains(&h), "discharged at hour {h}");
                assert!(*b <= 0.6 + 1e-12);
            }
        }
        for d in 0..2 {
            let charged: f64 = r.battery_power[d * 24..(d + 1) * 24]
                .iter()
                .map(|b| (-b).max(0.0))
                .sum();
            assert!(charged <= 1.5 + 1e-12);
            assert!(charged > 1.4);
        }
    }

    #[test]
    fn time_shift_runs_at_full_power() {
        let mut m = model();
        let r = m
            .simulate(&days(1), &Strategy::TimeShiftAggressive(TimeShiftParams::default()))
            .unwrap()
            .validated()
            .unwrap();
        assert_eq!(r.battery_power[9], -1.0);
        assert_eq!(r.battery_power[17], 1.0);
        assert!(r.solar_curtailed.iter().all(|c| *c == 0.0));
        assert!(r.total_cycles > 0.5);
    }
}
