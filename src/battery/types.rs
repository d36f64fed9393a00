//! Plant configuration, step records, and engine options.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::catalog::{Leniency, TechnologySpec, TopologySpec};
use crate::error::{BessError, Result};

/// Default noise floor below which a step's energy is not counted as cycling (MWh).
pub const DEFAULT_NOISE_FLOOR_MWH: f64 = 0.01;

/// Default relative tolerance for the energy balance check.
pub const DEFAULT_BALANCE_TOLERANCE: f64 = 1e-6;

/// Engine-wide knobs shared by the model, strategies, and validator.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ModelOptions {
    /// Treatment of unknown technology, topology, and strategy ids.
    pub leniency: Leniency,
    /// Per-step energy (MWh) below which cumulative counters are not updated.
    pub noise_floor_mwh: f64,
    /// Duration of one profile sample (hours).
    pub dt_hours: f64,
    /// Relative tolerance of the energy balance check.
    pub balance_tolerance: f64,
    /// Turn a failed balance check into `BessError::EnergyBalanceViolation`.
    pub fail_on_imbalance: bool,
}

impl Default for ModelOptions {
    fn default() -> Self {
        Self {
            leniency: Leniency::Lenient,
            noise_floor_mwh: DEFAULT_NOISE_FLOOR_MWH,
            dt_hours: 1.0,
            balance_tolerance: DEFAULT_BALANCE_TOLERANCE,
            fail_on_imbalance: false,
        }
    }
}

impl ModelOptions {
    /// Strict lookups and fatal balance violations.
    pub fn strict() -> Self {
        Self {
            leniency: Leniency::Strict,
            fail_on_imbalance: true,
            ..Self::default()
        }
    }

    /// # Errors
    ///
    /// Returns `BessError::Configuration` for a non-positive timestep, a
    /// negative noise floor, or a non-positive tolerance.
    pub fn validate(&self) -> Result<()> {
        if !(self.dt_hours.is_finite() && self.dt_hours > 0.0) {
            return Err(BessError::config("dt_hours must be > 0"));
        }
        if !(self.noise_floor_mwh.is_finite() && self.noise_floor_mwh >= 0.0) {
            return Err(BessError::config("noise_floor_mwh must be >= 0"));
        }
        if !(self.balance_tolerance.is_finite() && self.balance_tolerance > 0.0) {
            return Err(BessError::config("balance_tolerance must be > 0"));
        }
        Ok(())
    }
}

/// Sized plant with the derived, topology-adjusted quantities.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BessConfig {
    /// Nameplate power (MW).
    pub power_mw: f64,
    /// Storage duration at nameplate power (h).
    pub duration_hours: f64,
    /// `power_mw * duration_hours` (MWh).
    pub capacity_mwh: f64,
    /// Nameplate power after the topology penalty (MW).
    pub effective_power_mw: f64,
    /// Technology charge efficiency after the topology penalty.
    pub charge_efficiency: f64,
    /// Technology discharge efficiency after the topology penalty.
    pub discharge_efficiency: f64,
    pub soc_min: f64,
    pub soc_max: f64,
    pub c_rate_max: f64,
    /// `capacity_mwh * (soc_max - soc_min)` (MWh).
    pub usable_capacity_mwh: f64,
    pub technology: TechnologySpec,
    pub topology: TopologySpec,
}

impl BessConfig {
    /// Sizes a plant and derives effective power and efficiencies.
    ///
    /// # Errors
    ///
    /// Returns `BessError::Configuration` if power or duration is not a
    /// positive finite number, or a parameter row is implausible.
    pub fn new(
        power_mw: f64,
        duration_hours: f64,
        technology: TechnologySpec,
        topology: TopologySpec,
    ) -> Result<Self> {
        if !(power_mw.is_finite() && power_mw > 0.0) {
            return Err(BessError::config(format!(
                "power_mw must be > 0, got {power_mw}"
            )));
        }
        if !(duration_hours.is_finite() && duration_hours > 0.0) {
            return Err(BessError::config(format!(
                "duration_hours must be > 0, got {duration_hours}"
            )));
        }
        technology.validate()?;
        topology.validate()?;

        let capacity_mwh = power_mw * duration_hours;
        let usable_capacity_mwh = capacity_mwh * (technology.soc_max - technology.soc_min);
        if !(capacity_mwh > 0.0 && usable_capacity_mwh > 0.0) {
            return Err(BessError::config("usable capacity must be > 0"));
        }
        let derate = 1.0 - topology.efficiency_penalty;

        Ok(Self {
            power_mw,
            duration_hours,
            capacity_mwh,
            effective_power_mw: power_mw * derate,
            charge_efficiency: technology.charge_efficiency * derate,
            discharge_efficiency: technology.discharge_efficiency * derate,
            soc_min: technology.soc_min,
            soc_max: technology.soc_max,
            c_rate_max: technology.c_rate_max,
            usable_capacity_mwh,
            technology,
            topology,
        })
    }

    /// Effective roundtrip efficiency including the topology penalty.
    pub fn roundtrip_efficiency(&self) -> f64 {
        self.charge_efficiency * self.discharge_efficiency
    }

    /// C-rate power ceiling (MW).
    pub fn c_rate_limit_mw(&self) -> f64 {
        self.c_rate_max * self.capacity_mwh
    }

    /// Grid-side charge ceiling at `soc` and the constraint that sets it.
    pub fn charge_limit_at(&self, soc: f64, dt: f64) -> (f64, LimitingConstraint) {
        let headroom_mwh = ((self.soc_max - soc) * self.capacity_mwh).max(0.0);
        let soc_cap = headroom_mwh / (self.charge_efficiency * dt);
        binding_limit(soc_cap, self.c_rate_limit_mw(), self.effective_power_mw)
    }

    /// Grid-side discharge ceiling at `soc` and the constraint that sets it.
    pub fn discharge_limit_at(&self, soc: f64, dt: f64) -> (f64, LimitingConstraint) {
        let available_mwh = ((soc - self.soc_min) * self.capacity_mwh).max(0.0);
        let soc_cap = available_mwh * self.discharge_efficiency / dt;
        binding_limit(soc_cap, self.c_rate_limit_mw(), self.effective_power_mw)
    }

    /// Energy the battery could still deliver at `soc` (MWh, terminal side).
    pub fn deliverable_energy_at(&self, soc: f64) -> f64 {
        ((soc - self.soc_min) * self.capacity_mwh).max(0.0) * self.discharge_efficiency
    }
}

/// Ties resolve in the order SOC, C-rate, power.
fn binding_limit(soc_cap: f64, c_rate_cap: f64, power_cap: f64) -> (f64, LimitingConstraint) {
    let mut best = (soc_cap, LimitingConstraint::Soc);
    if c_rate_cap < best.0 {
        best = (c_rate_cap, LimitingConstraint::CRate);
    }
    if power_cap < best.0 {
        best = (power_cap, LimitingConstraint::Power);
    }
    best
}

/// Constraint that clipped a power request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LimitingConstraint {
    /// Request honored in full.
    #[default]
    None,
    /// State-of-charge headroom or available energy.
    Soc,
    /// C-rate ceiling.
    CRate,
    /// Effective inverter power.
    Power,
}

/// Outcome of one stateful `step` call.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct StepResult {
    /// Delivered power (MW); negative while charging.
    pub actual_power_mw: f64,
    /// Conversion loss in this step (MWh, >= 0).
    pub energy_loss_mwh: f64,
    /// State of charge after the step.
    pub new_soc: f64,
    pub limiting_constraint: LimitingConstraint,
}

impl StepResult {
    /// Energy drawn from the source while charging (MWh).
    pub fn charged_mwh(&self, dt: f64) -> f64 {
        (-self.actual_power_mw).max(0.0) * dt
    }

    /// Energy delivered while discharging (MWh).
    pub fn discharged_mwh(&self, dt: f64) -> f64 {
        self.actual_power_mw.max(0.0) * dt
    }
}

impl fmt::Display for StepResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "power={:>8.4} MW  loss={:.4} MWh  SoC={:.1}%  limit={:?}",
            self.actual_power_mw,
            self.energy_loss_mwh,
            self.new_soc * 100.0,
            self.limiting_constraint,
        )
    }
}

/// Outcome of the stateless `next_state` transition.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct NextState {
    pub new_soc: f64,
    pub actual_power_mw: f64,
    pub energy_loss_mwh: f64,
}

/// Full transition record shared by `step` and `next_state`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct Transition {
    pub new_soc: f64,
    pub actual_power_mw: f64,
    pub energy_loss_mwh: f64,
    /// Source-side energy absorbed (MWh).
    pub charged_mwh: f64,
    /// Terminal-side energy delivered (MWh).
    pub discharged_mwh: f64,
    pub limiting: LimitingConstraint,
}

impl Transition {
    fn idle(soc: f64) -> Self {
        Self {
            new_soc: soc,
            actual_power_mw: 0.0,
            energy_loss_mwh: 0.0,
            charged_mwh: 0.0,
            discharged_mwh: 0.0,
            limiting: LimitingConstraint::None,
        }
    }
}

/// Applies one power request to `soc`.
///
/// Order: clip to limits, apply efficiency, clip SOC. Callers must have
/// validated `request` and `dt`.
pub(crate) fn transition(config: &BessConfig, soc: f64, request: f64, dt: f64) -> Transition {
    if request < 0.0 {
        let (limit, constraint) = config.charge_limit_at(soc, dt);
        let wanted = -request;
        let (power, limiting) = if wanted > limit {
            (limit, constraint)
        } else {
            (wanted, LimitingConstraint::None)
        };
        if power <= 0.0 {
            return Transition {
                limiting,
                ..Transition::idle(soc)
            };
        }
        let energy_in = power * dt;
        let stored = energy_in * config.charge_efficiency;
        let new_soc =
            (soc + stored / config.capacity_mwh).clamp(config.soc_min, config.soc_max);
        Transition {
            new_soc,
            actual_power_mw: -power,
            energy_loss_mwh: energy_in - stored,
            charged_mwh: energy_in,
            discharged_mwh: 0.0,
            limiting,
        }
    } else if request > 0.0 {
        let (limit, constraint) = config.discharge_limit_at(soc, dt);
        let (power, limiting) = if request > limit {
            (limit, constraint)
        } else {
            (request, LimitingConstraint::None)
        };
        if power <= 0.0 {
            return Transition {
                limiting,
                ..Transition::idle(soc)
            };
        }
        let delivered = power * dt;
        let drawn = delivered / config.discharge_efficiency;
        let new_soc =
            (soc - drawn / config.capacity_mwh).clamp(config.soc_min, config.soc_max);
        Transition {
            new_soc,
            actual_power_mw: power,
            energy_loss_mwh: drawn - delivered,
            charged_mwh: 0.0,
            discharged_mwh: delivered,
            limiting,
        }
    } else {
        Transition::idle(soc)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{FlexibilityClass, TechnologySpec, TopologySpec};

    fn plant(penalty: f64) -> BessConfig {
        BessConfig::new(
            2.0,
            2.0,
            TechnologySpec::new(0.9, 0.8, 0.1, 0.9, 1.0, "test"),
            TopologySpec::new(penalty, FlexibilityClass::High, "test"),
        )
        .unwrap()
    }

    #[test]
    fn derived_quantities() {
        let c = plant(0.1);
        assert_eq!(c.capacity_mwh, 4.0);
        assert!((c.usable_capacity_mwh - 3.2).abs() < 1e-12);
        assert!((c.effective_power_mw - 1.8).abs() < 1e-12);
        assert!((c.charge_efficiency - 0.81).abs() < 1e-12);
        assert!((c.discharge_efficiency - 0.72).abs() < 1e-12);
    }

    #[test]
    fn zero_power_or_duration_rejected() {
        let tech = TechnologySpec::new(0.9, 0.9, 0.1, 0.9, 1.0, "t");
        let topo = TopologySpec::new(0.0, FlexibilityClass::High, "t");
        assert!(BessConfig::new(0.0, 2.0, tech.clone(), topo.clone()).is_err());
        assert!(BessConfig::new(1.0, 0.0, tech.clone(), topo.clone()).is_err());
        assert!(BessConfig::new(f64::NAN, 2.0, tech, topo).is_err());
    }

    #[test]
    fn charge_limit_names_binding_constraint() {
        let c = plant(0.0);
        // Empty battery: headroom is large, C-rate 4 MW, power 2 MW.
        let (limit, which) = c.charge_limit_at(0.1, 1.0);
        assert_eq!(limit, 2.0);
        assert_eq!(which, LimitingConstraint::Power);

        // Nearly full: SOC headroom binds.
        let (limit, which) = c.charge_limit_at(0.85, 1.0);
        assert!((limit - 0.05 * 4.0 / 0.9).abs() < 1e-12);
        assert_eq!(which, LimitingConstraint::Soc);
    }

    #[test]
    fn transition_charge_at_limit_lands_on_soc_max() {
        let c = plant(0.0);
        let t = transition(&c, 0.85, -10.0, 1.0);
        assert_eq!(t.limiting, LimitingConstraint::Soc);
        assert!((t.new_soc - 0.9).abs() < 1e-12);
        assert!(t.energy_loss_mwh >= 0.0);
    }

    #[test]
    fn transition_discharge_applies_efficiency() {
        let c = plant(0.0);
        let t = transition(&c, 0.5, 0.4, 1.0);
        // 0.4 MWh delivered needs 0.5 MWh drawn at 80 %.
        assert_eq!(t.actual_power_mw, 0.4);
        assert!((t.energy_loss_mwh - 0.1).abs() < 1e-12);
        assert!((t.new_soc - (0.5 - 0.5 / 4.0)).abs() < 1e-12);
    }

    #[test]
    fn transition_at_bound_is_idle() {
        let c = plant(0.0);
        let t = transition(&c, 0.1, 1.0, 1.0);
        assert_eq!(t.actual_power_mw, 0.0);
        assert_eq!(t.new_soc, 0.1);
        assert_eq!(t.limiting, LimitingConstraint::Soc);
    }

    #[test]
    fn options_validate() {
        assert!(ModelOptions::default().validate().is_ok());
        let bad = ModelOptions {
            dt_hours: 0.0,
            ..ModelOptions::default()
        };
        assert!(bad.validate().is_err());
    }
}
