//! The stateful BESS model and its stateless transition twin.

use rayon::prelude::*;
use tracing::{debug, warn};

use crate::catalog::{Catalog, Fallback, TechnologySpec, TopologySpec};
use crate::error::{BessError, Result};
use crate::sim::balance::{BalanceContext, EnergyBalanceValidator};
use crate::strategy::{Strategy, StrategyMetrics, StrategyParams, StrategyResult};

use super::state::BatteryState;
use super::types::{BessConfig, LimitingConstraint, ModelOptions, NextState, StepResult, transition};

/// A battery energy storage system with one exclusive runtime state.
///
/// Power sign convention: positive = discharge (export), negative = charge.
///
/// # Examples
///
/// ```
/// use bess_sim::battery::{BessModel, ModelOptions};
/// use bess_sim::catalog::Catalog;
///
/// let mut model = BessModel::new(1.0, 4.0, "lfp", "ac_coupled", &Catalog::builtin(),
///     ModelOptions::default()).unwrap();
/// let step = model.step(-0.5, 1.0).unwrap();
/// assert_eq!(step.actual_power_mw, -0.5);
/// assert!(model.soc() > model.config().soc_min);
/// ```
#[derive(Debug, Clone)]
pub struct BessModel {
    config: BessConfig,
    options: ModelOptions,
    state: BatteryState,
    fallbacks: Vec<Fallback>,
}

impl BessModel {
    /// Builds a model from catalog ids.
    ///
    /// Unknown ids fall back to the catalog defaults in lenient mode; the
    /// substitutions are available through [`BessModel::fallbacks`].
    ///
    /// # Errors
    ///
    /// * `Configuration` for non-positive power or duration, or invalid options
    /// * `UnknownTechnology` / `UnknownTopology` in strict mode
    pub fn new(
        power_mw: f64,
        duration_hours: f64,
        technology_id: &str,
        topology_id: &str,
        catalog: &Catalog,
        options: ModelOptions,
    ) -> Result<Self> {
        let technology = catalog.resolve_technology(technology_id, options.leniency)?;
        let topology = catalog.resolve_topology(topology_id, options.leniency)?;
        let mut model = Self::from_specs(
            power_mw,
            duration_hours,
            technology.value,
            topology.value,
            options,
        )?;
        model.fallbacks = [technology.fallback, topology.fallback]
            .into_iter()
            .flatten()
            .collect();
        Ok(model)
    }

    /// Builds a model from explicit parameter rows.
    ///
    /// # Errors
    ///
    /// Returns `Configuration` for non-positive power or duration, implausible
    /// rows, or invalid options.
    pub fn from_specs(
        power_mw: f64,
        duration_hours: f64,
        technology: TechnologySpec,
        topology: TopologySpec,
        options: ModelOptions,
    ) -> Result<Self> {
        options.validate()?;
        let config = BessConfig::new(power_mw, duration_hours, technology, topology)?;
        let state = BatteryState::new(config.soc_min, config.capacity_mwh);
        Ok(Self {
            config,
            options,
            state,
            fallbacks: Vec::new(),
        })
    }

    pub fn config(&self) -> &BessConfig {
        &self.config
    }

    pub fn options(&self) -> &ModelOptions {
        &self.options
    }

    pub fn state(&self) -> &BatteryState {
        &self.state
    }

    /// Current state of charge.
    pub fn soc(&self) -> f64 {
        self.state.soc
    }

    /// Profile timestep (hours) used by strategy runs.
    pub fn dt(&self) -> f64 {
        self.options.dt_hours
    }

    /// Default substitutions made while constructing this model.
    pub fn fallbacks(&self) -> &[Fallback] {
        &self.fallbacks
    }

    /// Reinitializes SOC (`soc_min` when `None`) and zeroes all counters.
    ///
    /// # Errors
    ///
    /// Returns `NumericalDomain` if `initial_soc` is not finite or lies outside
    /// `[soc_min, soc_max]`.
    pub fn reset(&mut self, initial_soc: Option<f64>) -> Result<()> {
        let soc = match initial_soc {
            Some(x) => {
                self.check_soc(x)?;
                x
            }
            None => self.config.soc_min,
        };
        self.state = BatteryState::new(soc, self.config.capacity_mwh);
        Ok(())
    }

    /// Maximum charging power for the next `dt` hours (MW, positive).
    pub fn charge_limit(&self, dt: f64) -> f64 {
        self.config.charge_limit_at(self.state.soc, dt).0
    }

    /// Maximum discharging power for the next `dt` hours (MW, positive).
    pub fn discharge_limit(&self, dt: f64) -> f64 {
        self.config.discharge_limit_at(self.state.soc, dt).0
    }

    /// Charge ceiling plus the constraint that sets it.
    pub fn charge_limit_detail(&self, dt: f64) -> (f64, LimitingConstraint) {
        self.config.charge_limit_at(self.state.soc, dt)
    }

    /// Discharge ceiling plus the constraint that sets it.
    pub fn discharge_limit_detail(&self, dt: f64) -> (f64, LimitingConstraint) {
        self.config.discharge_limit_at(self.state.soc, dt)
    }

    /// Applies a power request for `dt` hours and commits the new state.
    ///
    /// The request is clipped to the current limits; the returned
    /// `actual_power_mw` is what the battery really did.
    ///
    /// # Errors
    ///
    /// Returns `NumericalDomain` for a non-finite request or non-positive `dt`.
    pub fn step(&mut self, power_request_mw: f64, dt: f64) -> Result<StepResult> {
        check_request(power_request_mw, dt)?;
        let t = transition(&self.config, self.state.soc, power_request_mw, dt);
        self.state.apply(
            &t,
            self.config.capacity_mwh,
            self.config.usable_capacity_mwh,
            self.options.noise_floor_mwh,
        );
        Ok(StepResult {
            actual_power_mw: t.actual_power_mw,
            energy_loss_mwh: t.energy_loss_mwh,
            new_soc: t.new_soc,
            limiting_constraint: t.limiting,
        })
    }

    /// Stateless equivalent of [`BessModel::step`] starting from `soc`.
    ///
    /// Produces bit-identical output to `step` after `reset(Some(soc))`.
    ///
    /// # Errors
    ///
    /// Returns `NumericalDomain` for an out-of-range `soc`, a non-finite
    /// request, or non-positive `dt`.
    pub fn next_state(&self, soc: f64, power_request_mw: f64, dt: f64) -> Result<NextState> {
        self.check_soc(soc)?;
        check_request(power_request_mw, dt)?;
        let t = transition(&self.config, soc, power_request_mw, dt);
        Ok(NextState {
            new_soc: t.new_soc,
            actual_power_mw: t.actual_power_mw,
            energy_loss_mwh: t.energy_loss_mwh,
        })
    }

    /// Evaluates many independent `(soc, request)` pairs in parallel.
    ///
    /// # Errors
    ///
    /// Returns `NumericalDomain` if the slices differ in length or any pair
    /// is invalid.
    pub fn next_state_batch(
        &self,
        socs: &[f64],
        requests: &[f64],
        dt: f64,
    ) -> Result<Vec<NextState>> {
        if socs.len() != requests.len() {
            return Err(BessError::domain(format!(
                "batch length mismatch: {} socs, {} requests",
                socs.len(),
                requests.len()
            )));
        }
        socs.par_iter()
            .zip(requests.par_iter())
            .map(|(&soc, &request)| self.next_state(soc, request, dt))
            .collect()
    }

    /// Runs a strategy looked up by id.
    ///
    /// An unknown id runs pass-through in lenient mode (reported in
    /// `StrategyResult::fallback`) and fails in strict mode.
    ///
    /// # Errors
    ///
    /// * `UnknownStrategy` in strict mode
    /// * any error of [`BessModel::simulate`]
    pub fn simulate_strategy(
        &mut self,
        solar_profile: &[f64],
        strategy_id: &str,
        params: &StrategyParams,
    ) -> Result<StrategyResult> {
        let resolved = Strategy::resolve(strategy_id, params, self.options.leniency)?;
        let mut result = self.simulate(solar_profile, &resolved.value)?;
        result.fallback = resolved.fallback;
        Ok(result)
    }

    /// Resets the battery, runs `strategy` over the profile, validates the
    /// energy balance, and attaches aggregate metrics.
    ///
    /// # Errors
    ///
    /// * `NumericalDomain` for an empty, non-finite, or negative profile
    /// * `Configuration` for invalid strategy parameters
    /// * `EnergyBalanceViolation` if validation fails and
    ///   `fail_on_imbalance` is set
    pub fn simulate(&mut self, solar_profile: &[f64], strategy: &Strategy) -> Result<StrategyResult> {
        validate_profile(solar_profile)?;
        self.reset(None)?;
        let initial_soc = self.state.soc;

        debug!(
            strategy = strategy.kind().as_str(),
            steps = solar_profile.len(),
            power_mw = self.config.power_mw,
            duration_h = self.config.duration_hours,
            "running strategy"
        );
        let output = strategy.run(self, solar_profile)?;

        let validator = EnergyBalanceValidator::new(self.options.balance_tolerance);
        let context = BalanceContext::for_model(self, initial_soc);
        let validation = validator.validate(solar_profile, &output, &context);
        if !validation.valid {
            let reason = validation.reason.clone().unwrap_or_default();
            warn!(strategy = strategy.kind().as_str(), %reason, "energy balance check failed");
            if self.options.fail_on_imbalance {
                return Err(BessError::EnergyBalanceViolation(reason));
            }
        }

        let dt = self.options.dt_hours;
        let metrics = StrategyMetrics::compute(solar_profile, &output, dt);
        let days = solar_profile.len() as f64 * dt / 24.0;
        let total_cycles = self.state.cycle_count;

        Ok(StrategyResult {
            strategy: strategy.kind(),
            grid_power: output.grid_power,
            battery_power: output.battery_power,
            soc: output.soc,
            solar_curtailed: output.solar_curtailed,
            energy_losses: output.energy_losses,
            solar_delivered: output.solar_delivered,
            total_cycles,
            daily_cycles: total_cycles / days,
            validation,
            metrics,
            fallback: None,
        })
    }

    fn check_soc(&self, soc: f64) -> Result<()> {
        if !soc.is_finite() || soc < self.config.soc_min || soc > self.config.soc_max {
            return Err(BessError::domain(format!(
                "soc {soc} outside [{}, {}]",
                self.config.soc_min, self.config.soc_max
            )));
        }
        Ok(())
    }
}

fn check_request(power_request_mw: f64, dt: f64) -> Result<()> {
    if !power_request_mw.is_finite() {
        return Err(BessError::domain(format!(
            "power request must be finite, got {power_request_mw}"
        )));
    }
    if !(dt.is_finite() && dt > 0.0) {
        return Err(BessError::domain(format!("dt must be > 0, got {dt}")));
    }
    Ok(())
}

/// Rejects empty, non-finite, or negative solar input before any loop runs.
///
/// # Errors
///
/// Returns `NumericalDomain` naming the first offending sample.
pub fn validate_profile(solar_profile: &[f64]) -> Result<()> {
    if solar_profile.is_empty() {
        return Err(BessError::domain("solar profile is empty"));
    }
    if let Some((i, v)) = solar_profile
        .iter()
        .enumerate()
        .find(|(_, v)| !v.is_finite() || **v < 0.0)
    {
        return Err(BessError::domain(format!(
            "solar sample {i} is {v}; samples must be finite and >= 0"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{FallbackKind, Leniency};

    fn model() -> BessModel {
        BessModel::new(
            1.0,
            4.0,
            "lfp",
            "ac_coupled",
            &Catalog::builtin(),
            ModelOptions::default(),
        )
        .unwrap()
    }

    #[test]
    fn starts_empty() {
        let m = model();
        assert_eq!(m.soc(), m.config().soc_min);
        assert_eq!(m.state().cycle_count, 0.0);
        assert!(m.fallbacks().is_empty());
    }

    #[test]
    fn zero_power_is_configuration_error() {
        let catalog = Catalog::builtin();
        let r = BessModel::new(0.0, 4.0, "lfp", "ac_coupled", &catalog, ModelOptions::default());
        assert!(matches!(r, Err(BessError::Configuration(_))));
        let r = BessModel::new(1.0, 0.0, "lfp", "ac_coupled", &catalog, ModelOptions::default());
        assert!(matches!(r, Err(BessError::Configuration(_))));
    }

    #[test]
    fn unknown_ids_recorded_as_fallbacks() {
        let m = BessModel::new(
            1.0,
            2.0,
            "zinc_air",
            "mesh",
            &Catalog::builtin(),
            ModelOptions::default(),
        )
        .unwrap();
        let kinds: Vec<FallbackKind> = m.fallbacks().iter().map(|f| f.kind).collect();
        assert_eq!(kinds, vec![FallbackKind::Technology, FallbackKind::Topology]);
    }

    #[test]
    fn unknown_technology_strict_fails() {
        let options = ModelOptions {
            leniency: Leniency::Strict,
            ..ModelOptions::default()
        };
        let r = BessModel::new(1.0, 2.0, "zinc_air", "ac_coupled", &Catalog::builtin(), options);
        assert!(matches!(r, Err(BessError::UnknownTechnology(_))));
    }

    #[test]
    fn reset_semantics() {
        let mut m = model();
        m.step(-1.0, 1.0).unwrap();
        assert!(m.state().cycle_count > 0.0);

        m.reset(None).unwrap();
        assert_eq!(m.soc(), m.config().soc_min);
        assert_eq!(m.state().cycle_count, 0.0);

        m.reset(Some(0.4321)).unwrap();
        assert_eq!(m.soc(), 0.4321);

        assert!(m.reset(Some(0.99)).is_err());
        assert!(m.reset(Some(f64::NAN)).is_err());
    }

    #[test]
    fn step_rejects_nan_and_bad_dt() {
        let mut m = model();
        assert!(matches!(m.step(f64::NAN, 1.0), Err(BessError::NumericalDomain(_))));
        assert!(matches!(m.step(0.5, 0.0), Err(BessError::NumericalDomain(_))));
    }

    #[test]
    fn step_and_next_state_agree_exactly() {
        let mut m = model();
        for &(soc, request, dt) in &[
            (0.05, -0.7, 1.0),
            (0.5, 0.3, 0.25),
            (0.93, -2.0, 1.0),
            (0.06, 5.0, 0.5),
            (0.5, 0.0, 1.0),
        ] {
            let pure = m.next_state(soc, request, dt).unwrap();
            m.reset(Some(soc)).unwrap();
            let step = m.step(request, dt).unwrap();
            assert_eq!(pure.new_soc, step.new_soc);
            assert_eq!(pure.actual_power_mw, step.actual_power_mw);
            assert_eq!(pure.energy_loss_mwh, step.energy_loss_mwh);
        }
    }

    #[test]
    fn next_state_batch_matches_scalar_calls() {
        let m = model();
        let socs = [0.05, 0.2, 0.5, 0.8, 0.95];
        let requests = [-1.0, 0.5, -0.25, 1.0, -0.1];
        let batch = m.next_state_batch(&socs, &requests, 1.0).unwrap();
        for (i, ns) in batch.iter().enumerate() {
            assert_eq!(*ns, m.next_state(socs[i], requests[i], 1.0).unwrap());
        }
        assert!(m.next_state_batch(&socs, &requests[..2], 1.0).is_err());
    }

    #[test]
    fn next_state_does_not_touch_state() {
        let m = model();
        let before = m.state().clone();
        m.next_state(0.5, 0.8, 1.0).unwrap();
        assert_eq!(*m.state(), before);
    }

    #[test]
    fn profile_validation() {
        assert!(validate_profile(&[]).is_err());
        assert!(validate_profile(&[0.0, -0.1]).is_err());
        assert!(validate_profile(&[0.0, f64::NAN]).is_err());
        assert!(validate_profile(&[0.0, 1.0]).is_ok());
    }
}
