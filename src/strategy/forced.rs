//! Forced-utilization strategies.
//!
//! These cycle the battery on purpose (smoothing, demos, ancillary services,
//! price spreads) rather than only when solar would otherwise be lost. They
//! share the output contract of the other strategies and still never import
//! from the grid.

use rand::{Rng, SeedableRng, rngs::StdRng};

use crate::battery::{BessModel, StepResult};
use crate::error::{BessError, Result};
use crate::sim::balance::BalanceMode;

use super::{
    StrategyOutput, StrategyParams, charged_mw, day_count, day_index, discharged_mw, hour_of_day,
    percentile, require_fraction, require_positive,
};

/// Autoregressive coefficient of the regulation signal.
const SIGNAL_ALPHA: f64 = 0.8;
/// Innovation standard deviation of the regulation signal.
const SIGNAL_NOISE_STD: f64 = 0.3;
/// Default regulation signal seed.
pub const DEFAULT_SEED: u64 = 42;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SmoothingParams {
    /// Share of the deviation from the trailing mean taken out by the battery.
    pub fraction: f64,
    /// Trailing mean length in samples, current sample included.
    pub window: usize,
}

impl Default for SmoothingParams {
    fn default() -> Self {
        Self {
            fraction: 0.5,
            window: 3,
        }
    }
}

impl SmoothingParams {
    pub(crate) fn from_params(p: &StrategyParams) -> Self {
        let d = Self::default();
        Self {
            fraction: p.smoothing_fraction.unwrap_or(d.fraction),
            window: p.smoothing_window.unwrap_or(d.window),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CyclingParams {
    pub soc_low: f64,
    pub soc_high: f64,
    /// Charge and discharge power as a share of effective power.
    pub power_fraction: f64,
}

impl Default for CyclingParams {
    fn default() -> Self {
        Self {
            soc_low: 0.3,
            soc_high: 0.8,
            power_fraction: 0.5,
        }
    }
}

impl CyclingParams {
    pub(crate) fn from_params(p: &StrategyParams) -> Self {
        let d = Self::default();
        Self {
            soc_low: p.soc_low.unwrap_or(d.soc_low),
            soc_high: p.soc_high.unwrap_or(d.soc_high),
            power_fraction: p.power_fraction.unwrap_or(d.power_fraction),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RegulationParams {
    /// Regulation band as a share of effective power.
    pub band_fraction: f64,
    /// Interval between SOC recentering steps (h).
    pub recenter_hours: f64,
    pub seed: u64,
}

impl Default for RegulationParams {
    fn default() -> Self {
        Self {
            band_fraction: 0.2,
            recenter_hours: 4.0,
            seed: DEFAULT_SEED,
        }
    }
}

impl RegulationParams {
    pub(crate) fn from_params(p: &StrategyParams) -> Self {
        let d = Self::default();
        Self {
            band_fraction: p.band_fraction.unwrap_or(d.band_fraction),
            recenter_hours: p.recenter_hours.unwrap_or(d.recenter_hours),
            seed: p.seed.unwrap_or(d.seed),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ArbitrageParams {
    /// One price per solar sample; a synthetic duck curve when `None`.
    pub prices: Option<Vec<f64>>,
    pub low_percentile: f64,
    pub high_percentile: f64,
}

impl Default for ArbitrageParams {
    fn default() -> Self {
        Self {
            prices: None,
            low_percentile: 33.0,
            high_percentile: 67.0,
        }
    }
}

impl ArbitrageParams {
    pub(crate) fn from_params(p: &StrategyParams) -> Self {
        let d = Self::default();
        Self {
            prices: p.prices.clone(),
            low_percentile: p.low_percentile.unwrap_or(d.low_percentile),
            high_percentile: p.high_percentile.unwrap_or(d.high_percentile),
        }
    }
}

/// Gaussian noise using the Box-Muller transform.
///
/// # Arguments
///
/// * `rng` - Random number generator
/// * `std_dev` - Standard deviation of the noise
///
/// # Returns
///
/// A sample with mean 0 and the given standard deviation; 0.0 when
/// `std_dev <= 0`.
pub fn gaussian_noise(rng: &mut StdRng, std_dev: f64) -> f64 {
    if std_dev <= 0.0 {
        return 0.0;
    }
    let u1: f64 = rng.random::<f64>().clamp(1e-12, 1.0);
    let u2: f64 = rng.random::<f64>();
    let z0 = (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos();
    z0 * std_dev
}

/// Seeded AR(1) regulation signal in `[-1, 1]`; positive asks for discharge.
pub fn regulation_signal(n: usize, seed: u64) -> Vec<f64> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut x = 0.0_f64;
    (0..n)
        .map(|_| {
            x = (SIGNAL_ALPHA * x + gaussian_noise(&mut rng, SIGNAL_NOISE_STD)).clamp(-1.0, 1.0);
            x
        })
        .collect()
}

/// Duck-curve price shape: midday solar dip, evening peak.
pub fn synthetic_prices(n: usize, dt: f64) -> Vec<f64> {
    let bump = |h: f64, center: f64, width: f64| (-((h - center) / width).powi(2)).exp();
    (0..n)
        .map(|i| {
            let h = hour_of_day(i, dt);
            50.0 + 40.0 * bump(h, 19.0, 2.0) + 15.0 * bump(h, 8.0, 1.5)
                - 30.0 * bump(h, 13.0, 2.5)
        })
        .collect()
}

/// Charge from solar only (`request_mw <= 0`) or discharge (`> 0`); returns
/// the step and the resulting grid export.
fn dispatch(model: &mut BessModel, solar_mw: f64, request_mw: f64, dt: f64) -> Result<(StepResult, f64)> {
    let request = request_mw.max(-solar_mw);
    let step = model.step(request, dt)?;
    Ok((step, solar_mw - charged_mw(&step) + discharged_mw(&step)))
}

/// Battery takes out part of the deviation from a trailing mean.
pub fn solar_smoothing(
    model: &mut BessModel,
    solar: &[f64],
    params: &SmoothingParams,
) -> Result<StrategyOutput> {
    let fraction = require_fraction("smoothing_fraction", params.fraction)?;
    if params.window == 0 {
        return Err(BessError::config("smoothing_window must be >= 1"));
    }
    let dt = model.dt();
    let mut out = StrategyOutput::with_capacity(solar.len(), BalanceMode::Full);

    for (i, &s) in solar.iter().enumerate() {
        let from = (i + 1).saturating_sub(params.window);
        let trailing = &solar[from..=i];
        let mean = trailing.iter().sum::<f64>() / trailing.len() as f64;
        let target = s - fraction * (s - mean);
        let (step, grid) = dispatch(model, s, target - s, dt)?;
        out.record(grid, &step, 0.0);
    }
    Ok(out)
}

/// Hysteresis between two SOC levels, charging from solar only.
pub fn cycling_demo(
    model: &mut BessModel,
    solar: &[f64],
    params: &CyclingParams,
) -> Result<StrategyOutput> {
    let low = require_fraction("soc_low", params.soc_low)?;
    let high = require_fraction("soc_high", params.soc_high)?;
    if low >= high {
        return Err(BessError::config(format!(
            "soc_low ({low}) must be below soc_high ({high})"
        )));
    }
    let power = require_fraction("power_fraction", params.power_fraction)?
        * model.config().effective_power_mw;
    let dt = model.dt();
    let mut out = StrategyOutput::with_capacity(solar.len(), BalanceMode::Full);

    let mut charging = true;
    for &s in solar {
        if model.soc() >= high {
            charging = false;
        } else if model.soc() <= low {
            charging = true;
        }
        let request = if charging { -power } else { power };
        let (step, grid) = dispatch(model, s, request, dt)?;
        out.record(grid, &step, 0.0);
    }
    Ok(out)
}

/// Follows a seeded regulation signal within a power band and periodically
/// steers SOC back to the middle of its range.
pub fn frequency_regulation(
    model: &mut BessModel,
    solar: &[f64],
    params: &RegulationParams,
) -> Result<StrategyOutput> {
    let band = require_fraction("band_fraction", params.band_fraction)?
        * model.config().effective_power_mw;
    let dt = model.dt();
    let recenter_every =
        ((require_positive("recenter_hours", params.recenter_hours)? / dt).round() as usize).max(1);
    let signal = regulation_signal(solar.len(), params.seed);
    let (mid, capacity, eta_c, eta_d) = {
        let c = model.config();
        (
            0.5 * (c.soc_min + c.soc_max),
            c.capacity_mwh,
            c.charge_efficiency,
            c.discharge_efficiency,
        )
    };
    let mut out = StrategyOutput::with_capacity(solar.len(), BalanceMode::Full);

    for (i, &s) in solar.iter().enumerate() {
        let request = if (i + 1) % recenter_every == 0 {
            let gap_mwh = (mid - model.soc()) * capacity;
            if gap_mwh > 0.0 {
                -gap_mwh / (eta_c * dt)
            } else {
                -gap_mwh * eta_d / dt
            }
        } else {
            signal[i] * band
        };
        let (step, grid) = dispatch(model, s, request, dt)?;
        out.record(grid, &step, 0.0);
    }
    Ok(out)
}

/// Charges from solar in cheap hours and discharges in expensive ones, using
/// per-day price percentiles.
pub fn price_arbitrage(
    model: &mut BessModel,
    solar: &[f64],
    params: &ArbitrageParams,
) -> Result<StrategyOutput> {
    let (lo_pct, hi_pct) = (params.low_percentile, params.high_percentile);
    if !(lo_pct.is_finite() && hi_pct.is_finite() && 0.0 <= lo_pct && lo_pct < hi_pct && hi_pct <= 100.0)
    {
        return Err(BessError::config(format!(
            "price percentiles must satisfy 0 <= low < high <= 100, got {lo_pct} / {hi_pct}"
        )));
    }
    let dt = model.dt();
    let prices = match &params.prices {
        Some(p) if p.len() != solar.len() => {
            return Err(BessError::config(format!(
                "prices has {} samples, solar has {}",
                p.len(),
                solar.len()
            )));
        }
        Some(p) if p.iter().any(|x| !x.is_finite()) => {
            return Err(BessError::config("prices must be finite"));
        }
        Some(p) => p.clone(),
        None => synthetic_prices(solar.len(), dt),
    };

    let mut daily: Vec<Vec<f64>> = vec![Vec::new(); day_count(solar.len(), dt)];
    for (i, &p) in prices.iter().enumerate() {
        daily[day_index(i, dt)].push(p);
    }
    let thresholds: Vec<(f64, f64)> = daily
        .iter()
        .map(|d| (percentile(d, lo_pct), percentile(d, hi_pct)))
        .collect();

    let full_mw = model.config().effective_power_mw;
    let mut out = StrategyOutput::with_capacity(solar.len(), BalanceMode::Full);
    for (i, &s) in solar.iter().enumerate() {
        let (low, high) = thresholds[day_index(i, dt)];
        let request = if prices[i] <= low {
            -s
        } else if prices[i] >= high {
            full_mw
        } else {
            0.0
        };
        let (step, grid) = dispatch(model, s, request, dt)?;
        out.record(grid, &step, 0.0);
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
    fn gaussian_noise_zero_std() {
        let mut rng = StdRng::seed_from_u64(1);
        assert_eq!(gaussian_noise(&mut rng, 0.0), 0.0);
    }

    #[test]
    fn regulation_signal_is_seeded_and_bounded() {
        let a = regulation_signal(200, 7);
        let b = regulation_signal(200, 7);
        let c = regulation_signal(200, 8);
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(a.iter().all(|x| (-1.0..=1.0).contains(x)));
    }

    #[test]
    fn smoothing_keeps_grid_between_solar_and_target() {
        let mut m = model();
        let solar = days(2);
        let r = m
            .simulate(&solar, &Strategy::SolarSmoothing(SmoothingParams::default()))
            .unwrap()
            .validated()
            .unwrap();
        for i in 0..solar.len() {
            let from = (i + 1).saturating_sub(3);
            let mean = solar[from..=i].iter().sum::<f64>() / (i + 1 - from) as f64;
            let target = solar[i] - 0.5 * (solar[i] - mean);
            let (lo, hi) = if target < solar[i] { (target, solar[i]) } else { (solar[i], target) };
            assert!(r.grid_power[i] >= lo - 1e-9 && r.grid_power[i] <= hi + 1e-9, "step {i}");
        }
    }

    #[test]
    fn cycling_demo_reaches_upper_band() {
        let mut m = model();
        let r = m
            .simulate(&days(4), &Strategy::CyclingDemo(CyclingParams::default()))
            .unwrap()
            .validated()
            .unwrap();
        assert!(r.metrics.max_soc >= 0.8 - 1e-9);
        assert!(r.metrics.total_discharged_mwh > 0.0);
        assert!(r.grid_power.iter().all(|g| *g >= 0.0));
    }

    #[test]
    fn regulation_is_reproducible() {
        let solar = days(2);
        let strategy = Strategy::FrequencyRegulation(RegulationParams::default());
        let a = model().simulate(&solar, &strategy).unwrap();
        let b = model().simulate(&solar, &strategy).unwrap();
        assert!(a.validation.valid, "{:?}", a.validation.reason);
        assert_eq!(a.battery_power, b.battery_power);
        assert!(a.battery_power.iter().all(|p| *p <= 1.0 + 1e-12));
    }

    #[test]
    fn arbitrage_follows_prices() {
        let mut m = model();
        let solar = vec![2.0; 6];
        let params = ArbitrageParams {
            prices: Some(vec![10.0, 10.0, 50.0, 50.0, 90.0, 90.0]),
            ..ArbitrageParams::default()
        };
        let r = m
            .simulate(&solar, &Strategy::PriceArbitrage(params))
            .unwrap()
            .validated()
            .unwrap();
        assert!(r.battery_power[0] < 0.0);
        assert_eq!(r.battery_power[2], 0.0);
        assert!(r.battery_power[4] > 0.0);
    }

    #[test]
    fn arbitrage_rejects_mismatched_prices() {
        let mut m = model();
        let params = ArbitrageParams {
            prices: Some(vec![1.0; 3]),
            ..ArbitrageParams::default()
        };
        assert!(matches!(
            m.simulate(&[1.0; 4], &Strategy::PriceArbitrage(params)),
            Err(BessError::Configuration(_))
        ));
    }

    #[test]
    fn synthetic_prices_peak_in_the_evening() {
        let p = synthetic_prices(24, 1.0);
        let evening = p[19];
        assert!(p[13] < evening);
        assert!(p.iter().all(|x| *x <= evening + 1e-12));
    }
}
