//! Strategy run results and aggregate metrics.

use std::fmt;

use serde::Serialize;

use crate::catalog::Fallback;
use crate::error::{BessError, Result};
use crate::sim::balance::BalanceReport;

use super::{StrategyKind, StrategyOutput};

/// Aggregate energy figures of one strategy run.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct StrategyMetrics {
    pub total_solar_mwh: f64,
    pub total_grid_mwh: f64,
    pub total_curtailed_mwh: f64,
    pub total_losses_mwh: f64,
    pub total_charged_mwh: f64,
    pub total_discharged_mwh: f64,
    /// Grid energy over solar energy.
    pub energy_efficiency: f64,
    /// Curtailed energy over solar energy.
    pub curtailment_ratio: f64,
    /// Losses over solar energy.
    pub loss_ratio: f64,
    pub peak_grid_mw: f64,
    /// Largest step-to-step grid change (MW/h).
    pub max_ramp_mw_per_hour: f64,
    pub min_soc: f64,
    pub max_soc: f64,
}

impl StrategyMetrics {
    /// Sums the output series. Ratios are zero for a dark profile.
    pub fn compute(solar: &[f64], output: &StrategyOutput, dt: f64) -> Self {
        let total_solar_mwh: f64 = solar.iter().sum::<f64>() * dt;
        let total_grid_mwh: f64 = output.grid_power.iter().sum::<f64>() * dt;
        let total_curtailed_mwh: f64 = output.solar_curtailed.iter().sum::<f64>() * dt;
        let total_losses_mwh: f64 = output.energy_losses.iter().sum();
        let total_charged_mwh: f64 =
            output.battery_power.iter().map(|b| (-b).max(0.0)).sum::<f64>() * dt;
        let total_discharged_mwh: f64 =
            output.battery_power.iter().map(|b| b.max(0.0)).sum::<f64>() * dt;

        let ratio = |x: f64| {
            if total_solar_mwh > 0.0 {
                x / total_solar_mwh
            } else {
                0.0
            }
        };

        let peak_grid_mw = output.grid_power.iter().copied().fold(0.0, f64::max);
        let max_ramp_mw_per_hour = output
            .grid_power
            .windows(2)
            .map(|w| (w[1] - w[0]).abs() / dt)
            .fold(0.0, f64::max);
        let min_soc = output.soc.iter().copied().fold(f64::INFINITY, f64::min);
        let max_soc = output.soc.iter().copied().fold(f64::NEG_INFINITY, f64::max);

        Self {
            total_solar_mwh,
            total_grid_mwh,
            total_curtailed_mwh,
            total_losses_mwh,
            total_charged_mwh,
            total_discharged_mwh,
            energy_efficiency: ratio(total_grid_mwh),
            curtailment_ratio: ratio(total_curtailed_mwh),
            loss_ratio: ratio(total_losses_mwh),
            peak_grid_mw,
            max_ramp_mw_per_hour,
            min_soc: if min_soc.is_finite() { min_soc } else { 0.0 },
            max_soc: if max_soc.is_finite() { max_soc } else { 0.0 },
        }
    }
}

/// Series, metrics, and validation outcome of one strategy run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StrategyResult {
    pub strategy: StrategyKind,
    pub grid_power: Vec<f64>,
    pub battery_power: Vec<f64>,
    pub soc: Vec<f64>,
    pub solar_curtailed: Vec<f64>,
    pub energy_losses: Vec<f64>,
    pub solar_delivered: Vec<f64>,
    /// Equivalent full cycles over the run.
    pub total_cycles: f64,
    pub daily_cycles: f64,
    pub validation: BalanceReport,
    pub metrics: StrategyMetrics,
    /// Set when an unknown strategy id ran as pass-through.
    pub fallback: Option<Fallback>,
}

impl StrategyResult {
    /// Promotes a raw result to a validated one.
    ///
    /// # Errors
    ///
    /// Returns `EnergyBalanceViolation` if the balance check failed.
    pub fn validated(self) -> Result<Self> {
        if self.validation.valid {
            Ok(self)
        } else {
            Err(BessError::EnergyBalanceViolation(
                self.validation.reason.clone().unwrap_or_default(),
            ))
        }
    }

    pub fn len(&self) -> usize {
        self.grid_power.len()
    }

    pub fn is_empty(&self) -> bool {
        self.grid_power.is_empty()
    }
}

impl fmt::Display for StrategyResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let m = &self.metrics;
        writeln!(f, "=== {} ({} steps) ===", self.strategy, self.len())?;
        writeln!(f, "Solar:       {:>10.3} MWh", m.total_solar_mwh)?;
        writeln!(
            f,
            "Grid:        {:>10.3} MWh ({:.1}%)",
            m.total_grid_mwh,
            m.energy_efficiency * 100.0
        )?;
        writeln!(
            f,
            "Curtailed:   {:>10.3} MWh ({:.1}%)",
            m.total_curtailed_mwh,
            m.curtailment_ratio * 100.0
        )?;
        writeln!(f, "Losses:      {:>10.3} MWh", m.total_losses_mwh)?;
        writeln!(
            f,
            "Cycles:      {:>10.3} total, {:.3}/day",
            self.total_cycles, self.daily_cycles
        )?;
        writeln!(f, "SoC range:   {:.1}% .. {:.1}%", m.min_soc * 100.0, m.max_soc * 100.0)?;
        write!(
            f,
            "Balance:     {} (quality {})",
            if self.validation.valid { "ok" } else { "FAILED" },
            self.validation.quality
        )?;
        if let Some(fb) = &self.fallback {
            write!(f, "\nFallback:    {fb}")?;
        }
        Ok(())
    }
}
