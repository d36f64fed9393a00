//! One-shot simulation facade: profile, model, strategy, report.

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::battery::{BessModel, ModelOptions};
use crate::catalog::{Catalog, Fallback};
use crate::error::{BessError, Result};
use crate::sim::balance::BalanceReport;
use crate::strategy::{StrategyKind, StrategyParams, StrategyResult};

use super::profile::canonical_profile;
use super::report::{HourlyRow, SimulationMetrics};

/// Everything needed to run one plant against one strategy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SimulationRequest {
    /// Installed PV capacity (MWp); used for the canonical profile.
    pub psfv_mw: f64,
    pub bess_mw: f64,
    pub bess_hours: f64,
    pub technology: String,
    pub topology: String,
    pub strategy: String,
    pub params: StrategyParams,
    /// Calendar month of the canonical profile; annual mean when `None`.
    pub month: Option<u8>,
    pub steps_per_day: usize,
    pub days: usize,
    /// Explicit solar samples (MW); replaces the canonical profile.
    pub profile: Option<Vec<f64>>,
}

impl Default for SimulationRequest {
    fn default() -> Self {
        Self {
            psfv_mw: 5.0,
            bess_mw: 2.0,
            bess_hours: 4.0,
            technology: "lfp".to_string(),
            topology: "ac_coupled".to_string(),
            strategy: StrategyKind::CapShaving.as_str().to_string(),
            params: StrategyParams::default(),
            month: None,
            steps_per_day: 24,
            days: 1,
            profile: None,
        }
    }
}

impl SimulationRequest {
    /// Timestep implied by the request: `24 / steps_per_day` for canonical
    /// profiles, `options.dt_hours` for explicit ones.
    pub fn dt_hours(&self, options: &ModelOptions) -> f64 {
        match self.profile {
            Some(_) => options.dt_hours,
            None => 24.0 / self.steps_per_day.max(1) as f64,
        }
    }

    /// Options with the timestep adjusted to the request's profile.
    pub fn effective_options(&self, options: &ModelOptions) -> ModelOptions {
        ModelOptions {
            dt_hours: self.dt_hours(options),
            ..*options
        }
    }

    /// The solar samples this request runs on.
    ///
    /// # Errors
    ///
    /// Returns `Configuration` for invalid profile settings.
    pub fn solar_profile(&self) -> Result<Vec<f64>> {
        match &self.profile {
            Some(p) => Ok(p.clone()),
            None => canonical_profile(self.psfv_mw, self.month, self.steps_per_day, self.days),
        }
    }
}

/// Plant and run settings as actually simulated.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportConfig {
    pub psfv_mw: f64,
    pub bess_mw: f64,
    pub bess_hours: f64,
    pub capacity_mwh: f64,
    pub usable_capacity_mwh: f64,
    pub technology: String,
    pub topology: String,
    pub strategy: StrategyKind,
    pub roundtrip_efficiency: f64,
    pub dt_hours: f64,
    pub steps: usize,
}

/// Full outcome of [`run_simulation`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SimulationReport {
    pub config: ReportConfig,
    pub hourly: Vec<HourlyRow>,
    pub metrics: SimulationMetrics,
    pub balance: BalanceReport,
    /// One-line human summary.
    pub summary: String,
    /// Lenient substitutions made along the way.
    pub fallbacks: Vec<Fallback>,
}

impl SimulationReport {
    /// Pretty-printed JSON rendering of the whole report.
    ///
    /// # Errors
    ///
    /// Returns a `serde_json::Error` if serialization fails.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

impl fmt::Display for SimulationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.summary)?;
        writeln!(f, "{}", self.metrics)?;
        write!(
            f,
            "Energy balance:        {} (error {:.2e} MWh, quality {})",
            if self.balance.valid { "ok" } else { "FAILED" },
            self.balance.aggregate_error_mwh,
            self.balance.quality
        )?;
        for fb in &self.fallbacks {
            write!(f, "\nFallback:              {fb}")?;
        }
        Ok(())
    }
}

/// Builds the profile and model, runs the strategy, and assembles a report.
///
/// With a canonical profile the timestep is `24 / steps_per_day` hours and
/// overrides `options.dt_hours`.
///
/// # Errors
///
/// Any error of [`BessModel::new`] or [`BessModel::simulate_strategy`], and
/// `Configuration` for invalid profile settings.
pub fn run_simulation(
    request: &SimulationRequest,
    catalog: &Catalog,
    options: &ModelOptions,
) -> Result<SimulationReport> {
    if request.profile.is_none() && request.steps_per_day == 0 {
        return Err(BessError::config("steps_per_day must be > 0"));
    }
    let options = request.effective_options(options);
    let solar = request.solar_profile()?;
    let mut model = BessModel::new(
        request.bess_mw,
        request.bess_hours,
        &request.technology,
        &request.topology,
        catalog,
        options,
    )?;
    let result = model.simulate_strategy(&solar, &request.strategy, &request.params)?;
    debug!(
        strategy = result.strategy.as_str(),
        grid_mwh = result.metrics.total_grid_mwh,
        valid = result.validation.valid,
        "simulation finished"
    );
    Ok(assemble(request, &model, &solar, result))
}

fn assemble(
    request: &SimulationRequest,
    model: &BessModel,
    solar: &[f64],
    result: StrategyResult,
) -> SimulationReport {
    let c = model.config();
    let dt = model.dt();
    let config = ReportConfig {
        psfv_mw: request.psfv_mw,
        bess_mw: c.power_mw,
        bess_hours: c.duration_hours,
        capacity_mwh: c.capacity_mwh,
        usable_capacity_mwh: c.usable_capacity_mwh,
        technology: c.technology.label.clone(),
        topology: c.topology.label.clone(),
        strategy: result.strategy,
        roundtrip_efficiency: c.roundtrip_efficiency(),
        dt_hours: dt,
        steps: solar.len(),
    };
    let metrics = SimulationMetrics::from_result(&result);
    let summary = format!(
        "{} on {:.1} MW / {:.1} h {} ({}): {:.1}% delivered, {:.1}% curtailed, {:.1}% lost, {:.2} cycles/day",
        config.strategy,
        config.bess_mw,
        config.bess_hours,
        config.technology,
        config.topology,
        metrics.grid_pct,
        metrics.curtailed_pct,
        metrics.losses_pct,
        metrics.daily_cycles,
    );
    let mut fallbacks = model.fallbacks().to_vec();
    fallbacks.extend(result.fallback.clone());

    SimulationReport {
        hourly: HourlyRow::from_result(solar, &result, dt),
        config,
        metrics,
        balance: result.validation,
        summary,
        fallbacks,
    }
}
