//! Post-hoc report metrics and hourly rows derived from a strategy run.

use std::fmt;

use serde::Serialize;

use crate::strategy::StrategyResult;

/// Aggregate indicators of one simulation.
///
/// Computed from the finished [`StrategyResult`] so the reported figures
/// always agree with the step series.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct SimulationMetrics {
    /// Solar energy available (MWh).
    pub solar_mwh: f64,
    /// Energy exported to the grid (MWh).
    pub grid_mwh: f64,
    pub curtailed_mwh: f64,
    pub losses_mwh: f64,
    /// Grid energy as a percentage of solar energy.
    pub grid_pct: f64,
    pub curtailed_pct: f64,
    pub losses_pct: f64,
    /// Energy absorbed by the battery (MWh).
    pub charged_mwh: f64,
    /// Energy delivered by the battery (MWh).
    pub discharged_mwh: f64,
    /// `charged + discharged` (MWh).
    pub battery_throughput_mwh: f64,
    /// Realized roundtrip efficiency, when anything was charged.
    pub realized_efficiency: Option<f64>,
    pub total_cycles: f64,
    pub daily_cycles: f64,
    pub soc_min: f64,
    pub soc_max: f64,
    /// Peak grid export (MW).
    pub peak_grid_mw: f64,
}

impl SimulationMetrics {
    pub fn from_result(result: &StrategyResult) -> Self {
        let m = &result.metrics;
        let pct = |x: f64| {
            if m.total_solar_mwh > 0.0 {
                100.0 * x / m.total_solar_mwh
            } else {
                0.0
            }
        };
        Self {
            solar_mwh: m.total_solar_mwh,
            grid_mwh: m.total_grid_mwh,
            curtailed_mwh: m.total_curtailed_mwh,
            losses_mwh: m.total_losses_mwh,
            grid_pct: pct(m.total_grid_mwh),
            curtailed_pct: pct(m.total_curtailed_mwh),
            losses_pct: pct(m.total_losses_mwh),
            charged_mwh: m.total_charged_mwh,
            discharged_mwh: m.total_discharged_mwh,
            battery_throughput_mwh: m.total_charged_mwh + m.total_discharged_mwh,
            realized_efficiency: result.validation.realized_efficiency,
            total_cycles: result.total_cycles,
            daily_cycles: result.daily_cycles,
            soc_min: m.min_soc,
            soc_max: m.max_soc,
            peak_grid_mw: m.peak_grid_mw,
        }
    }
}

impl fmt::Display for SimulationMetrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "--- Energy Report ---")?;
        writeln!(f, "Solar:                 {:.3} MWh", self.solar_mwh)?;
        writeln!(f, "Delivered to grid:     {:.3} MWh ({:.1}%)", self.grid_mwh, self.grid_pct)?;
        writeln!(
            f,
            "Curtailed:             {:.3} MWh ({:.1}%)",
            self.curtailed_mwh, self.curtailed_pct
        )?;
        writeln!(f, "Losses:                {:.3} MWh ({:.1}%)", self.losses_mwh, self.losses_pct)?;
        writeln!(
            f,
            "Battery throughput:    {:.3} MWh ({:.2} cycles, {:.2}/day)",
            self.battery_throughput_mwh, self.total_cycles, self.daily_cycles
        )?;
        match self.realized_efficiency {
            Some(eta) => writeln!(f, "Realized efficiency:   {:.1}%", eta * 100.0)?,
            None => writeln!(f, "Realized efficiency:   n/a")?,
        }
        writeln!(f, "Peak grid export:      {:.3} MW", self.peak_grid_mw)?;
        write!(
            f,
            "SoC range:             {:.1}% .. {:.1}%",
            self.soc_min * 100.0,
            self.soc_max * 100.0
        )
    }
}

/// One timestep of a simulation report.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct HourlyRow {
    pub step: usize,
    /// Hours since the start of the profile.
    pub time_h: f64,
    pub solar_mw: f64,
    pub grid_mw: f64,
    /// Positive = discharge.
    pub battery_mw: f64,
    pub soc: f64,
    pub curtailed_mw: f64,
    pub losses_mwh: f64,
    pub solar_delivered_mw: f64,
}

impl HourlyRow {
    /// Zips a result with the solar profile it was run on.
    pub fn from_result(solar: &[f64], result: &StrategyResult, dt: f64) -> Vec<Self> {
        solar
            .iter()
            .enumerate()
            .take(result.len())
            .map(|(i, &s)| Self {
                step: i,
                time_h: i as f64 * dt,
                solar_mw: s,
                grid_mw: result.grid_power[i],
                battery_mw: result.battery_power[i],
                soc: result.soc[i],
                curtailed_mw: result.solar_curtailed[i],
                losses_mwh: result.energy_losses[i],
                solar_delivered_mw: result.solar_delivered[i],
            })
            .collect()
    }
}
