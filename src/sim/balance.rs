//! Post-simulation energy balance validation.
//!
//! Sign convention of the series under test (MW):
//! - `grid_power`: export to the grid (negative would be import)
//! - `battery_power`: positive = discharge, negative = charge
//! - `solar_curtailed`: generation thrown away (>= 0)
//!
//! Balance per step: `solar = grid + curtailed + charge - discharge`.

use std::fmt;

use serde::Serialize;

use crate::battery::BessModel;
use crate::strategy::StrategyOutput;

/// Which terms take part in the balance equation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BalanceMode {
    /// `solar = grid + curtailed + charge - discharge`.
    #[default]
    Full,
    /// `solar = grid + charge - discharge`; curtailment is reporting-only.
    ExcludeCurtailment,
}

/// Non-fatal comparison of realized and nameplate roundtrip efficiency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum QualityTag {
    Good,
    Moderate,
    Poor,
}

impl fmt::Display for QualityTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            QualityTag::Good => "good",
            QualityTag::Moderate => "moderate",
            QualityTag::Poor => "poor",
        };
        f.write_str(s)
    }
}

/// Energy sums over one run (MWh).
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct EnergyTotals {
    pub solar_mwh: f64,
    pub grid_mwh: f64,
    pub curtailed_mwh: f64,
    pub losses_mwh: f64,
    /// Energy absorbed by the battery.
    pub charged_mwh: f64,
    /// Energy delivered by the battery.
    pub discharged_mwh: f64,
}

impl EnergyTotals {
    pub fn from_series(solar: &[f64], output: &StrategyOutput, dt: f64) -> Self {
        let mut t = Self::default();
        for &s in solar {
            t.solar_mwh += s * dt;
        }
        for &g in &output.grid_power {
            t.grid_mwh += g * dt;
        }
        for &c in &output.solar_curtailed {
            t.curtailed_mwh += c * dt;
        }
        for &l in &output.energy_losses {
            t.losses_mwh += l;
        }
        for &b in &output.battery_power {
            t.charged_mwh += (-b).max(0.0) * dt;
            t.discharged_mwh += b.max(0.0) * dt;
        }
        t
    }
}

/// Plant facts the validator needs beyond the series themselves.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BalanceContext {
    pub dt_hours: f64,
    /// SOC before the first step.
    pub initial_soc: f64,
    pub soc_min: f64,
    pub soc_max: f64,
    pub capacity_mwh: f64,
    /// Effective discharge efficiency, used to value energy left in storage.
    pub discharge_efficiency: f64,
    /// Effective nameplate roundtrip efficiency.
    pub expected_roundtrip: f64,
}

impl BalanceContext {
    pub fn for_model(model: &BessModel, initial_soc: f64) -> Self {
        let c = model.config();
        Self {
            dt_hours: model.dt(),
            initial_soc,
            soc_min: c.soc_min,
            soc_max: c.soc_max,
            capacity_mwh: c.capacity_mwh,
            discharge_efficiency: c.discharge_efficiency,
            expected_roundtrip: c.roundtrip_efficiency(),
        }
    }
}

/// Outcome of one validation pass.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BalanceReport {
    pub valid: bool,
    /// Every failed check, joined; `None` when valid.
    pub reason: Option<String>,
    /// Per-step residual `solar - (grid + curtailed + charge - discharge)` (MW).
    pub balance_errors: Vec<f64>,
    /// Absolute aggregate residual (MWh).
    pub aggregate_error_mwh: f64,
    pub mode: BalanceMode,
    pub totals: EnergyTotals,
    /// `(discharged + stored_delta * eta_d) / charged`; `None` without charging.
    pub realized_efficiency: Option<f64>,
    pub quality: QualityTag,
}

/// Checks conservation of energy over a strategy run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EnergyBalanceValidator {
    tolerance: f64,
}

impl Default for EnergyBalanceValidator {
    fn default() -> Self {
        Self::new(crate::battery::DEFAULT_BALANCE_TOLERANCE)
    }
}

impl EnergyBalanceValidator {
    /// `tolerance` is relative to total solar energy.
    pub fn new(tolerance: f64) -> Self {
        Self { tolerance }
    }

    pub fn tolerance(&self) -> f64 {
        self.tolerance
    }

    /// Validates `output` against `solar`.
    ///
    /// Never fails: problems are reported through `valid` and `reason`.
    pub fn validate(
        &self,
        solar: &[f64],
        output: &StrategyOutput,
        context: &BalanceContext,
    ) -> BalanceReport {
        let dt = context.dt_hours;
        let mode = output.balance_mode;
        let totals = EnergyTotals::from_series(solar, output, dt);
        let mut problems: Vec<String> = Vec::new();

        let n = solar.len();
        let lengths = [
            ("grid_power", output.grid_power.len()),
            ("battery_power", output.battery_power.len()),
            ("soc", output.soc.len()),
            ("solar_curtailed", output.solar_curtailed.len()),
            ("energy_losses", output.energy_losses.len()),
        ];
        for (name, len) in lengths {
            if len != n {
                problems.push(format!("{name} has {len} samples, solar has {n}"));
            }
        }
        if !problems.is_empty() {
            return BalanceReport {
                valid: false,
                reason: Some(problems.join("; ")),
                balance_errors: Vec::new(),
                aggregate_error_mwh: f64::NAN,
                mode,
                totals,
                realized_efficiency: None,
                quality: QualityTag::Poor,
            };
        }

        let curtail_weight = match mode {
            BalanceMode::Full => 1.0,
            BalanceMode::ExcludeCurtailment => 0.0,
        };
        let mut balance_errors = Vec::with_capacity(n);
        let mut residual_sum = 0.0_f64;
        let mut peak_solar = 0.0_f64;
        for i in 0..n {
            let b = output.battery_power[i];
            let charge = (-b).max(0.0);
            let discharge = b.max(0.0);
            let accounted = output.grid_power[i]
                + curtail_weight * output.solar_curtailed[i]
                + charge
                - discharge;
            let err = solar[i] - accounted;
            residual_sum += err * dt;
            peak_solar = peak_solar.max(solar[i]);
            balance_errors.push(err);
        }

        let aggregate_error_mwh = residual_sum.abs();
        let scale = totals.solar_mwh.max(1.0);
        if !(aggregate_error_mwh <= self.tolerance * scale) {
            problems.push(format!(
                "aggregate residual {aggregate_error_mwh:.3e} MWh exceeds {:.1e} x {scale:.4} MWh",
                self.tolerance
            ));
        }
        let worst = balance_errors.iter().fold(0.0_f64, |m, e| m.max(e.abs()));
        if !(worst <= self.tolerance * peak_solar.max(1.0)) {
            problems.push(format!("per-step residual up to {worst:.3e} MW"));
        }

        if let Some((i, soc)) = output
            .soc
            .iter()
            .enumerate()
            .find(|(_, s)| !(context.soc_min..=context.soc_max).contains(*s))
        {
            problems.push(format!(
                "soc {soc} at step {i} outside [{}, {}]",
                context.soc_min, context.soc_max
            ));
        }
        if let Some((i, loss)) = output
            .energy_losses
            .iter()
            .enumerate()
            .find(|(_, l)| !(l.is_finite() && **l >= 0.0))
        {
            problems.push(format!("loss {loss} at step {i} is negative or non-finite"));
        }

        let final_soc = output.soc.last().copied().unwrap_or(context.initial_soc);
        let stored_delta_mwh = (final_soc - context.initial_soc) * context.capacity_mwh;
        let realized_efficiency = (totals.charged_mwh > 0.0).then(|| {
            (totals.discharged_mwh + stored_delta_mwh * context.discharge_efficiency)
                / totals.charged_mwh
        });
        let quality = quality_tag(realized_efficiency, context.expected_roundtrip);

        let valid = problems.is_empty();
        BalanceReport {
            valid,
            reason: (!valid).then(|| problems.join("; ")),
            balance_errors,
            aggregate_error_mwh,
            mode,
            totals,
            realized_efficiency,
            quality,
        }
    }
}

fn quality_tag(realized: Option<f64>, expected: f64) -> QualityTag {
    let Some(realized) = realized else {
        return QualityTag::Good;
    };
    let ratio = realized / expected;
    if ratio >= 0.98 {
        QualityTag::Good
    } else if ratio >= 0.90 {
        QualityTag::Moderate
    } else {
        QualityTag::Poor
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context() -> BalanceContext {
        BalanceContext {
            dt_hours: 1.0,
            initial_soc: 0.1,
            soc_min: 0.1,
            soc_max: 0.9,
            capacity_mwh: 4.0,
            discharge_efficiency: 0.9,
            expected_roundtrip: 0.81,
        }
    }

    fn output(grid: &[f64], battery: &[f64], curtailed: &[f64], soc: &[f64]) -> StrategyOutput {
        StrategyOutput {
            grid_power: grid.to_vec(),
            battery_power: battery.to_vec(),
            soc: soc.to_vec(),
            solar_curtailed: curtailed.to_vec(),
            energy_losses: vec![0.0; grid.len()],
            solar_delivered: grid.to_vec(),
            balance_mode: BalanceMode::Full,
        }
    }

    #[test]
    fn balanced_run_is_valid() {
        let solar = [0.0, 2.0, 3.0, 0.0];
        // step1: charge 1, step2: charge 1 + curtail 0.5, step3: discharge 0.8
        let out = output(
            &[0.0, 1.0, 1.5, 0.8],
            &[0.0, -1.0, -1.0, 0.8],
            &[0.0, 0.0, 0.5, 0.0],
            &[0.1, 0.325, 0.55, 0.3278],
        );
        let report = EnergyBalanceValidator::default().validate(&solar, &out, &context());
        assert!(report.valid, "{:?}", report.reason);
        assert!((report.totals.charged_mwh - 2.0).abs() < 1e-12);
        assert!((report.totals.discharged_mwh - 0.8).abs() < 1e-12);
        assert_eq!(report.balance_errors.len(), 4);
    }

    #[test]
    fn missing_energy_is_flagged() {
        let solar = [2.0, 2.0];
        let out = output(&[1.0, 2.0], &[0.0, 0.0], &[0.0, 0.0], &[0.1, 0.1]);
        let report = EnergyBalanceValidator::default().validate(&solar, &out, &context());
        assert!(!report.valid);
        assert!(report.reason.unwrap().contains("aggregate residual"));
        assert!((report.balance_errors[0] - 1.0).abs() < 1e-12);
    }

    #[test]
    fn exclude_curtailment_mode_ignores_curtailed_term() {
        let solar = [3.0];
        let mut out = output(&[2.0], &[-1.0], &[0.5], &[0.3]);
        out.balance_mode = BalanceMode::ExcludeCurtailment;
        let report = EnergyBalanceValidator::default().validate(&solar, &out, &context());
        assert!(report.valid, "{:?}", report.reason);

        out.balance_mode = BalanceMode::Full;
        let report = EnergyBalanceValidator::default().validate(&solar, &out, &context());
        assert!(!report.valid);
    }

    #[test]
    fn soc_out_of_bounds_is_flagged() {
        let solar = [0.0];
        let out = output(&[0.0], &[0.0], &[0.0], &[0.95]);
        let report = EnergyBalanceValidator::default().validate(&solar, &out, &context());
        assert!(!report.valid);
        assert!(report.reason.unwrap().contains("soc"));
    }

    #[test]
    fn length_mismatch_is_flagged() {
        let solar = [1.0, 1.0];
        let out = output(&[1.0], &[0.0], &[0.0], &[0.1]);
        let report = EnergyBalanceValidator::default().validate(&solar, &out, &context());
        assert!(!report.valid);
    }

    #[test]
    fn quality_thresholds() {
        assert_eq!(quality_tag(None, 0.9), QualityTag::Good);
        assert_eq!(quality_tag(Some(0.89), 0.9), QualityTag::Good);
        assert_eq!(quality_tag(Some(0.85), 0.9), QualityTag::Moderate);
        assert_eq!(quality_tag(Some(0.5), 0.9), QualityTag::Poor);
    }
}
