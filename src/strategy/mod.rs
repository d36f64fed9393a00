//! Dispatch strategies: how the battery answers a solar profile.
//!
//! Every strategy walks the profile once, calls [`BessModel::step`] exactly
//! once per sample, and records the same set of output series. Strategies
//! never import from the grid: charging power is bounded by available solar.

/// Cap-based shaving family (hard, balanced, soft, percentile).
pub mod cap;
/// Flat delivery inside a daily window.
pub mod flat_day;
/// Forced-utilization strategies that exercise the battery on purpose.
pub mod forced;
/// Ramp-rate limiting.
pub mod ramp;
pub mod result;
/// Fixed-window time shifting.
pub mod shift;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::battery::{BessModel, StepResult};
use crate::catalog::{Fallback, FallbackKind, Leniency, Resolved};
use crate::error::{BessError, Result};
use crate::sim::balance::BalanceMode;

pub use cap::{BalancedParams, CapShavingParams, CapTarget, PeakShavingParams, SoftCapParams};
pub use flat_day::{FlatDayParams, FlatTarget};
pub use forced::{ArbitrageParams, CyclingParams, RegulationParams, SmoothingParams};
pub use ramp::RampLimitParams;
pub use result::{StrategyMetrics, StrategyResult};
pub use shift::{HourWindow, NightShiftParams, TimeShiftParams};

/// Registered strategy identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    PassThrough,
    CapShaving,
    CapShavingBalanced,
    SoftCapShaving,
    FlatDay,
    NightShift,
    RampLimit,
    PeakShaving,
    TimeShiftAggressive,
    SolarSmoothing,
    CyclingDemo,
    FrequencyRegulation,
    PriceArbitrage,
}

impl StrategyKind {
    /// Lookup table of every registered strategy.
    pub const ALL: [StrategyKind; 13] = [
        StrategyKind::PassThrough,
        StrategyKind::CapShaving,
        StrategyKind::CapShavingBalanced,
        StrategyKind::SoftCapShaving,
        StrategyKind::FlatDay,
        StrategyKind::NightShift,
        StrategyKind::RampLimit,
        StrategyKind::PeakShaving,
        StrategyKind::TimeShiftAggressive,
        StrategyKind::SolarSmoothing,
        StrategyKind::CyclingDemo,
        StrategyKind::FrequencyRegulation,
        StrategyKind::PriceArbitrage,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            StrategyKind::PassThrough => "pass_through",
            StrategyKind::CapShaving => "cap_shaving",
            StrategyKind::CapShavingBalanced => "cap_shaving_balanced",
            StrategyKind::SoftCapShaving => "soft_cap_shaving",
            StrategyKind::FlatDay => "flat_day",
            StrategyKind::NightShift => "night_shift",
            StrategyKind::RampLimit => "ramp_limit",
            StrategyKind::PeakShaving => "peak_shaving",
            StrategyKind::TimeShiftAggressive => "time_shift_aggressive",
            StrategyKind::SolarSmoothing => "solar_smoothing",
            StrategyKind::CyclingDemo => "cycling_demo",
            StrategyKind::FrequencyRegulation => "frequency_regulation",
            StrategyKind::PriceArbitrage => "price_arbitrage",
        }
    }

    /// Whether the strategy deliberately cycles the battery beyond need.
    pub fn is_forced_utilization(self) -> bool {
        matches!(
            self,
            StrategyKind::TimeShiftAggressive
                | StrategyKind::SolarSmoothing
                | StrategyKind::CyclingDemo
                | StrategyKind::FrequencyRegulation
                | StrategyKind::PriceArbitrage
        )
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StrategyKind {
    type Err = BessError;

    fn from_str(s: &str) -> Result<Self> {
        let norm = s.trim().to_ascii_lowercase().replace(['-', ' '], "_");
        StrategyKind::ALL
            .into_iter()
            .find(|k| k.as_str() == norm)
            .ok_or_else(|| BessError::UnknownStrategy(s.to_string()))
    }
}

/// Loosely-typed strategy parameters, as found in scenario files.
///
/// Each strategy reads the fields it understands and applies its own
/// defaults to the rest.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StrategyParams {
    pub cap_mw: Option<f64>,
    pub percentile: Option<f64>,
    pub soft_discharge: Option<bool>,
    pub discharge_start_hour: Option<f64>,
    pub flat_mw: Option<f64>,
    pub start_hour: Option<f64>,
    pub end_hour: Option<f64>,
    pub charge_hours: Option<[f64; 2]>,
    pub discharge_hours: Option<[f64; 2]>,
    pub energy_cap_mwh: Option<f64>,
    pub max_ramp_mw_per_hour: Option<f64>,
    pub smoothing_fraction: Option<f64>,
    pub smoothing_window: Option<usize>,
    pub soc_low: Option<f64>,
    pub soc_high: Option<f64>,
    pub power_fraction: Option<f64>,
    pub band_fraction: Option<f64>,
    pub recenter_hours: Option<f64>,
    pub seed: Option<u64>,
    pub prices: Option<Vec<f64>>,
    pub low_percentile: Option<f64>,
    pub high_percentile: Option<f64>,
}

/// A strategy together with its typed parameters.
#[derive(Debug, Clone, PartialEq)]
pub enum Strategy {
    /// Battery idle, grid = solar.
    PassThrough,
    CapShaving(CapShavingParams),
    CapShavingBalanced(BalancedParams),
    SoftCapShaving(SoftCapParams),
    FlatDay(FlatDayParams),
    NightShift(NightShiftParams),
    RampLimit(RampLimitParams),
    PeakShaving(PeakShavingParams),
    TimeShiftAggressive(TimeShiftParams),
    SolarSmoothing(SmoothingParams),
    CyclingDemo(CyclingParams),
    FrequencyRegulation(RegulationParams),
    PriceArbitrage(ArbitrageParams),
}

impl Strategy {
    pub fn kind(&self) -> StrategyKind {
        match self {
            Strategy::PassThrough => StrategyKind::PassThrough,
            Strategy::CapShaving(_) => StrategyKind::CapShaving,
            Strategy::CapShavingBalanced(_) => StrategyKind::CapShavingBalanced,
            Strategy::SoftCapShaving(_) => StrategyKind::SoftCapShaving,
            Strategy::FlatDay(_) => StrategyKind::FlatDay,
            Strategy::NightShift(_) => StrategyKind::NightShift,
            Strategy::RampLimit(_) => StrategyKind::RampLimit,
            Strategy::PeakShaving(_) => StrategyKind::PeakShaving,
            Strategy::TimeShiftAggressive(_) => StrategyKind::TimeShiftAggressive,
            Strategy::SolarSmoothing(_) => StrategyKind::SolarSmoothing,
            Strategy::CyclingDemo(_) => StrategyKind::CyclingDemo,
            Strategy::FrequencyRegulation(_) => StrategyKind::FrequencyRegulation,
            Strategy::PriceArbitrage(_) => StrategyKind::PriceArbitrage,
        }
    }

    /// Builds the typed variant for `kind` from loose parameters.
    pub fn from_params(kind: StrategyKind, p: &StrategyParams) -> Self {
        match kind {
            StrategyKind::PassThrough => Strategy::PassThrough,
            StrategyKind::CapShaving => Strategy::CapShaving(CapShavingParams::from_params(p)),
            StrategyKind::CapShavingBalanced => {
                Strategy::CapShavingBalanced(BalancedParams::from_params(p))
            }
            StrategyKind::SoftCapShaving => Strategy::SoftCapShaving(SoftCapParams::from_params(p)),
            StrategyKind::FlatDay => Strategy::FlatDay(FlatDayParams::from_params(p)),
            StrategyKind::NightShift => Strategy::NightShift(NightShiftParams::from_params(p)),
            StrategyKind::RampLimit => Strategy::RampLimit(RampLimitParams::from_params(p)),
            StrategyKind::PeakShaving => Strategy::PeakShaving(PeakShavingParams::from_params(p)),
            StrategyKind::TimeShiftAggressive => {
                Strategy::TimeShiftAggressive(TimeShiftParams::from_params(p))
            }
            StrategyKind::SolarSmoothing => {
                Strategy::SolarSmoothing(SmoothingParams::from_params(p))
            }
            StrategyKind::CyclingDemo => Strategy::CyclingDemo(CyclingParams::from_params(p)),
            StrategyKind::FrequencyRegulation => {
                Strategy::FrequencyRegulation(RegulationParams::from_params(p))
            }
            StrategyKind::PriceArbitrage => {
                Strategy::PriceArbitrage(ArbitrageParams::from_params(p))
            }
        }
    }

    /// Resolves a string id, substituting pass-through for unknown ids when lenient.
    ///
    /// # Errors
    ///
    /// Returns `UnknownStrategy` for an unknown id in strict mode.
    pub fn resolve(id: &str, params: &StrategyParams, leniency: Leniency) -> Result<Resolved<Self>> {
        match id.parse::<StrategyKind>() {
            Ok(kind) => Ok(Resolved::exact(Self::from_params(kind, params))),
            Err(e) if leniency == Leniency::Strict => Err(e),
            Err(_) => {
                warn!(requested = id, "unknown strategy, running pass-through");
                Ok(Resolved {
                    value: Strategy::PassThrough,
                    fallback: Some(Fallback {
                        kind: FallbackKind::Strategy,
                        requested: id.to_string(),
                        substituted: StrategyKind::PassThrough.as_str().to_string(),
                    }),
                })
            }
        }
    }

    /// Runs the strategy against a freshly reset model.
    ///
    /// # Errors
    ///
    /// Returns `Configuration` for invalid parameters and propagates model errors.
    pub fn run(&self, model: &mut BessModel, solar: &[f64]) -> Result<StrategyOutput> {
        match self {
            Strategy::PassThrough => pass_through(model, solar),
            Strategy::CapShaving(p) => cap::cap_shaving(model, solar, p),
            Strategy::CapShavingBalanced(p) => cap::cap_shaving_balanced(model, solar, p),
            Strategy::SoftCapShaving(p) => cap::soft_cap_shaving(model, solar, p),
            Strategy::FlatDay(p) => flat_day::flat_day(model, solar, p),
            Strategy::NightShift(p) => shift::night_shift(model, solar, p),
            Strategy::RampLimit(p) => ramp::ramp_limit(model, solar, p),
            Strategy::PeakShaving(p) => cap::peak_shaving(model, solar, p),
            Strategy::TimeShiftAggressive(p) => shift::time_shift_aggressive(model, solar, p),
            Strategy::SolarSmoothing(p) => forced::solar_smoothing(model, solar, p),
            Strategy::CyclingDemo(p) => forced::cycling_demo(model, solar, p),
            Strategy::FrequencyRegulation(p) => forced::frequency_regulation(model, solar, p),
            Strategy::PriceArbitrage(p) => forced::price_arbitrage(model, solar, p),
        }
    }
}

/// Parallel per-step series produced by one strategy run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StrategyOutput {
    /// Power exported to the grid (MW).
    pub grid_power: Vec<f64>,
    /// Battery power (MW); positive = discharge.
    pub battery_power: Vec<f64>,
    /// SOC after each step.
    pub soc: Vec<f64>,
    /// Generation thrown away (MW).
    pub solar_curtailed: Vec<f64>,
    /// Conversion losses (MWh per step).
    pub energy_losses: Vec<f64>,
    /// Grid export coming straight from solar (MW).
    pub solar_delivered: Vec<f64>,
    pub balance_mode: BalanceMode,
}

impl StrategyOutput {
    pub(crate) fn with_capacity(n: usize, balance_mode: BalanceMode) -> Self {
        Self {
            grid_power: Vec::with_capacity(n),
            battery_power: Vec::with_capacity(n),
            soc: Vec::with_capacity(n),
            solar_curtailed: Vec::with_capacity(n),
            energy_losses: Vec::with_capacity(n),
            solar_delivered: Vec::with_capacity(n),
            balance_mode,
        }
    }

    pub(crate) fn record(&mut self, grid_mw: f64, step: &StepResult, curtailed_mw: f64) {
        let battery = step.actual_power_mw;
        self.grid_power.push(grid_mw);
        self.battery_power.push(battery);
        self.soc.push(step.new_soc);
        self.solar_curtailed.push(curtailed_mw);
        self.energy_losses.push(step.energy_loss_mwh);
        self.solar_delivered.push(grid_mw - battery.max(0.0));
    }

    pub fn len(&self) -> usize {
        self.grid_power.len()
    }

    pub fn is_empty(&self) -> bool {
        self.grid_power.is_empty()
    }
}

fn pass_through(model: &mut BessModel, solar: &[f64]) -> Result<StrategyOutput> {
    let dt = model.dt();
    let mut out = StrategyOutput::with_capacity(solar.len(), BalanceMode::Full);
    for &s in solar {
        let step = model.step(0.0, dt)?;
        out.record(s, &step, 0.0);
    }
    Ok(out)
}

/// Pushes up to `excess_mw` into the battery; returns the step and the
/// unabsorbed remainder.
pub(crate) fn absorb(model: &mut BessModel, excess_mw: f64, dt: f64) -> Result<(StepResult, f64)> {
    let step = model.step(-excess_mw, dt)?;
    let charged = -step.actual_power_mw;
    Ok((step, (excess_mw - charged).max(0.0)))
}

/// Charge power (MW) absorbed in a step, zero when discharging.
pub(crate) fn charged_mw(step: &StepResult) -> f64 {
    (-step.actual_power_mw).max(0.0)
}

/// Discharge power (MW) delivered in a step, zero when charging.
pub(crate) fn discharged_mw(step: &StepResult) -> f64 {
    step.actual_power_mw.max(0.0)
}

/// Hour of day (0..24) at the start of sample `i`.
pub(crate) fn hour_of_day(i: usize, dt: f64) -> f64 {
    (i as f64 * dt).rem_euclid(24.0)
}

/// Zero-based day index of sample `i`.
pub(crate) fn day_index(i: usize, dt: f64) -> usize {
    (i as f64 * dt / 24.0 + 1e-9).floor() as usize
}

/// Number of (possibly partial) days spanned by `n` samples.
pub(crate) fn day_count(n: usize, dt: f64) -> usize {
    if n == 0 { 0 } else { day_index(n - 1, dt) + 1 }
}

/// Linear-interpolation percentile (`p` in 0..=100) of `values`.
///
/// Returns 0.0 for an empty slice.
pub fn percentile(values: &[f64], p: f64) -> f64 {
    let mut sorted: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    if sorted.is_empty() {
        return 0.0;
    }
    sorted.sort_by(f64::total_cmp);
    let rank = (p.clamp(0.0, 100.0) / 100.0) * (sorted.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    let frac = rank - lo as f64;
    sorted[lo] + (sorted[hi] - sorted[lo]) * frac
}

pub(crate) fn require_fraction(name: &str, v: f64) -> Result<f64> {
    if !(v.is_finite() && (0.0..=1.0).contains(&v)) {
        return Err(BessError::config(format!("{name} must be in [0, 1], got {v}")));
    }
    Ok(v)
}

pub(crate) fn require_positive(name: &str, v: f64) -> Result<f64> {
    if !(v.is_finite() && v > 0.0) {
        return Err(BessError::config(format!("{name} must be > 0, got {v}")));
    }
    Ok(v)
}

pub(crate) fn require_non_negative(name: &str, v: f64) -> Result<f64> {
    if !(v.is_finite() && v >= 0.0) {
        return Err(BessError::config(format!("{name} must be >= 0, got {v}")));
    }
    Ok(v)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_kind_roundtrips_through_its_id() {
        for kind in StrategyKind::ALL {
            assert_eq!(kind.as_str().parse::<StrategyKind>(), Ok(kind));
            let strategy = Strategy::from_params(kind, &StrategyParams::default());
            assert_eq!(strategy.kind(), kind);
        }
    }

    #[test]
    fn unknown_id_lenient_is_pass_through() {
        let r = Strategy::resolve("moon_shot", &StrategyParams::default(), Leniency::Lenient)
            .unwrap();
        assert_eq!(r.value, Strategy::PassThrough);
        assert_eq!(r.fallback.unwrap().kind, FallbackKind::Strategy);
    }

    #[test]
    fn unknown_id_strict_is_error() {
        let r = Strategy::resolve("moon_shot", &StrategyParams::default(), Leniency::Strict);
        assert_eq!(r, Err(BessError::UnknownStrategy("moon_shot".to_string())));
    }

    #[test]
    fn percentile_interpolates() {
        let v = [1.0, 2.0, 3.0, 4.0, 5.0];
        assert_eq!(percentile(&v, 0.0), 1.0);
        assert_eq!(percentile(&v, 50.0), 3.0);
        assert_eq!(percentile(&v, 100.0), 5.0);
        assert!((percentile(&v, 90.0) - 4.6).abs() < 1e-12);
        assert_eq!(percentile(&[], 50.0), 0.0);
    }

    #[test]
    fn time_helpers() {
        assert_eq!(hour_of_day(25, 1.0), 1.0);
        assert_eq!(hour_of_day(6, 0.25), 1.5);
        assert_eq!(day_index(23, 1.0), 0);
        assert_eq!(day_index(24, 1.0), 1);
        assert_eq!(day_count(48, 1.0), 2);
        assert_eq!(day_count(49, 1.0), 3);
    }

    #[test]
    fn params_parse_from_toml() {
        let p: StrategyParams = toml::from_str(
            r#"
cap_mw = 3.5
soft_discharge = true
charge_hours = [10.0, 14.0]
"#,
        )
        .unwrap();
        assert_eq!(p.cap_mw, Some(3.5));
        assert_eq!(p.soft_discharge, Some(true));
        assert_eq!(p.charge_hours, Some([10.0, 14.0]));
        assert!(toml::from_str::<StrategyParams>("bogus = 1").is_err());
    }
}
