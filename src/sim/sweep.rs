//! Parallel sizing sweeps over power, duration, and technology.
//!
//! Every configuration gets its own [`BessModel`]; workers share nothing but
//! the read-only inputs and the caller's cancellation flag. A failing
//! configuration is recorded and the sweep carries on.

use std::cmp::Ordering;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};

use rayon::ThreadPoolBuilder;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::battery::{BessModel, ModelOptions, validate_profile};
use crate::catalog::Catalog;
use crate::error::{BessError, Result};

use super::engine::SimulationRequest;
use super::report::SimulationMetrics;

/// Ranking criterion of a sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Objective {
    /// Grid energy over solar energy; higher is better.
    #[default]
    EnergyEfficiency,
    /// Curtailed energy over solar energy; lower is better.
    CurtailmentRatio,
    /// Conversion losses; lower is better.
    Losses,
    /// Equivalent full cycles per day; lower is better.
    DailyCycles,
}

impl Objective {
    /// Raw objective value of a configuration.
    pub fn score(self, m: &SimulationMetrics) -> f64 {
        match self {
            Objective::EnergyEfficiency => m.grid_pct / 100.0,
            Objective::CurtailmentRatio => m.curtailed_pct / 100.0,
            Objective::Losses => m.losses_mwh,
            Objective::DailyCycles => m.daily_cycles,
        }
    }

    pub fn higher_is_better(self) -> bool {
        matches!(self, Objective::EnergyEfficiency)
    }

    /// Orders two scores best first.
    fn compare(self, a: f64, b: f64) -> Ordering {
        if self.higher_is_better() {
            b.total_cmp(&a)
        } else {
            a.total_cmp(&b)
        }
    }
}

impl fmt::Display for Objective {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Objective::EnergyEfficiency => "energy_efficiency",
            Objective::CurtailmentRatio => "curtailment_ratio",
            Objective::Losses => "losses",
            Objective::DailyCycles => "daily_cycles",
        };
        f.write_str(s)
    }
}

/// Grid of configurations to evaluate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SweepSpec {
    pub powers_mw: Vec<f64>,
    pub durations_h: Vec<f64>,
    /// Technology ids; the request's technology when empty.
    pub technologies: Vec<String>,
    pub objective: Objective,
    /// Worker threads; 0 lets rayon decide.
    pub threads: usize,
}

impl Default for SweepSpec {
    fn default() -> Self {
        Self {
            powers_mw: vec![1.0, 2.0, 4.0],
            durations_h: vec![1.0, 2.0, 4.0],
            technologies: Vec::new(),
            objective: Objective::default(),
            threads: 0,
        }
    }
}

impl SweepSpec {
    /// # Errors
    ///
    /// Returns `Configuration` for an empty power or duration list.
    pub fn validate(&self) -> Result<()> {
        if self.powers_mw.is_empty() {
            return Err(BessError::config("sweep.powers_mw must not be empty"));
        }
        if self.durations_h.is_empty() {
            return Err(BessError::config("sweep.durations_h must not be empty"));
        }
        Ok(())
    }

    /// Number of configurations in the grid.
    pub fn len(&self, request: &SimulationRequest) -> usize {
        self.powers_mw.len() * self.durations_h.len() * self.technologies(request).len()
    }

    fn technologies<'a>(&'a self, request: &'a SimulationRequest) -> Vec<&'a str> {
        if self.technologies.is_empty() {
            vec![request.technology.as_str()]
        } else {
            self.technologies.iter().map(String::as_str).collect()
        }
    }
}

/// One evaluated configuration.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SweepPoint {
    pub power_mw: f64,
    pub duration_h: f64,
    pub technology: String,
    pub score: f64,
    /// Whether the energy balance check passed.
    pub valid: bool,
    pub metrics: SimulationMetrics,
}

/// A configuration that could not be evaluated.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SweepFailure {
    pub power_mw: f64,
    pub duration_h: f64,
    pub technology: String,
    pub error: String,
}

/// Ranked points, best first, plus the failures.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SweepOutcome {
    pub objective: Objective,
    pub ranked: Vec<SweepPoint>,
    pub failures: Vec<SweepFailure>,
    /// Set when the cancellation flag stopped the sweep early.
    pub cancelled: bool,
}

impl SweepOutcome {
    pub fn best(&self) -> Option<&SweepPoint> {
        self.ranked.first()
    }

    /// Pretty-printed JSON rendering of the outcome.
    ///
    /// # Errors
    ///
    /// Returns a `serde_json::Error` if serialization fails.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

impl fmt::Display for SweepOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "--- Sweep ({} ranked, {} failed{}) by {} ---",
            self.ranked.len(),
            self.failures.len(),
            if self.cancelled { ", cancelled" } else { "" },
            self.objective
        )?;
        for (rank, p) in self.ranked.iter().enumerate() {
            writeln!(
                f,
                "{:>3}. {:>6.2} MW x {:>5.2} h {:<14} score {:.4}{}",
                rank + 1,
                p.power_mw,
                p.duration_h,
                p.technology,
                p.score,
                if p.valid { "" } else { "  (imbalance)" }
            )?;
        }
        for fail in &self.failures {
            writeln!(
                f,
                "  !  {:>6.2} MW x {:>5.2} h {:<14} {}",
                fail.power_mw, fail.duration_h, fail.technology, fail.error
            )?;
        }
        Ok(())
    }
}

struct Job<'a> {
    power_mw: f64,
    duration_h: f64,
    technology: &'a str,
}

enum JobOutcome {
    Done(SweepPoint),
    Failed(SweepFailure),
    Skipped,
}

/// Evaluates every configuration of `spec` on a rayon pool.
///
/// The solar profile is built once from `request` and shared read-only. When
/// `cancel` becomes true, configurations not yet started are skipped and the
/// outcome is marked cancelled.
///
/// # Errors
///
/// Returns `Configuration` for an invalid spec, profile, or thread pool;
/// per-configuration errors land in [`SweepOutcome::failures`].
pub fn run_sweep(
    request: &SimulationRequest,
    spec: &SweepSpec,
    catalog: &Catalog,
    options: &ModelOptions,
    cancel: Option<&AtomicBool>,
) -> Result<SweepOutcome> {
    spec.validate()?;
    let options = request.effective_options(options);
    let solar = request.solar_profile()?;
    validate_profile(&solar)?;

    let jobs: Vec<Job<'_>> = spec
        .technologies(request)
        .into_iter()
        .flat_map(|technology| {
            spec.powers_mw.iter().flat_map(move |&power_mw| {
                spec.durations_h.iter().map(move |&duration_h| Job {
                    power_mw,
                    duration_h,
                    technology,
                })
            })
        })
        .collect();
    info!(configs = jobs.len(), objective = %spec.objective, "starting sweep");

    let pool = ThreadPoolBuilder::new()
        .num_threads(spec.threads)
        .build()
        .map_err(|e| BessError::config(format!("building sweep thread pool: {e}")))?;

    let outcomes: Vec<JobOutcome> = pool.install(|| {
        jobs.par_iter()
            .map(|job| {
                if cancel.is_some_and(|c| c.load(AtomicOrdering::Relaxed)) {
                    return JobOutcome::Skipped;
                }
                run_job(job, request, &solar, catalog, &options, spec.objective)
            })
            .collect()
    });

    let mut ranked = Vec::new();
    let mut failures = Vec::new();
    let mut skipped = 0_usize;
    for outcome in outcomes {
        match outcome {
            JobOutcome::Done(p) => ranked.push(p),
            JobOutcome::Failed(f) => failures.push(f),
            JobOutcome::Skipped => skipped += 1,
        }
    }
    ranked.sort_by(|a, b| spec.objective.compare(a.score, b.score));
    info!(
        ranked = ranked.len(),
        failed = failures.len(),
        skipped,
        "sweep finished"
    );

    Ok(SweepOutcome {
        objective: spec.objective,
        ranked,
        failures,
        cancelled: skipped > 0,
    })
}

fn run_job(
    job: &Job<'_>,
    request: &SimulationRequest,
    solar: &[f64],
    catalog: &Catalog,
    options: &ModelOptions,
    objective: Objective,
) -> JobOutcome {
    let runner = || -> Result<SweepPoint> {
        let mut model = BessModel::new(
            job.power_mw,
            job.duration_h,
            job.technology,
            &request.topology,
            catalog,
            *options,
        )?;
        let result = model.simulate_strategy(solar, &request.strategy, &request.params)?;
        let metrics = SimulationMetrics::from_result(&result);
        Ok(SweepPoint {
            power_mw: job.power_mw,
            duration_h: job.duration_h,
            technology: model.config().technology.label.clone(),
            score: objective.score(&metrics),
            valid: result.validation.valid,
            metrics,
        })
    };
    match runner() {
        Ok(point) => JobOutcome::Done(point),
        Err(err) => {
            warn!(
                power_mw = job.power_mw,
                duration_h = job.duration_h,
                technology = job.technology,
                %err,
                "sweep configuration failed"
            );
            JobOutcome::Failed(SweepFailure {
                power_mw: job.power_mw,
                duration_h: job.duration_h,
                technology: job.technology.to_string(),
                error: err.to_string(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> SimulationRequest {
        SimulationRequest {
            psfv_mw: 4.0,
            month: Some(6),
            ..SimulationRequest::default()
        }
    }

    #[test]
    fn grid_is_fully_evaluated_and_ranked() {
        let spec = SweepSpec {
            powers_mw: vec![0.5, 1.0, 2.0],
            durations_h: vec![1.0, 4.0],
            objective: Objective::CurtailmentRatio,
            threads: 2,
            ..SweepSpec::default()
        };
        let out = run_sweep(
            &request(),
            &spec,
            &Catalog::builtin(),
            &ModelOptions::default(),
            None,
        )
        .unwrap();
        assert_eq!(out.ranked.len(), 6);
        assert!(out.failures.is_empty());
        assert!(!out.cancelled);
        for w in out.ranked.windows(2) {
            assert!(w[0].score <= w[1].score);
        }
        // A 4 h battery of at least 1 MW absorbs the whole clipped peak.
        let best = out.best().unwrap();
        assert_eq!(best.duration_h, 4.0);
        assert_eq!(best.score, 0.0);
        let worst = out.ranked.last().unwrap();
        assert!(worst.score > 0.0);
    }

    #[test]
    fn bad_configurations_are_collected() {
        let spec = SweepSpec {
            powers_mw: vec![0.0, 1.0],
            durations_h: vec![2.0],
            ..SweepSpec::default()
        };
        let out = run_sweep(
            &request(),
            &spec,
            &Catalog::builtin(),
            &ModelOptions::default(),
            None,
        )
        .unwrap();
        assert_eq!(out.ranked.len(), 1);
        assert_eq!(out.failures.len(), 1);
        assert_eq!(out.failures[0].power_mw, 0.0);
        assert!(out.failures[0].error.contains("configuration"));
    }

    #[test]
    fn preset_cancel_flag_skips_everything() {
        let flag = AtomicBool::new(true);
        let out = run_sweep(
            &request(),
            &SweepSpec::default(),
            &Catalog::builtin(),
            &ModelOptions::default(),
            Some(&flag),
        )
        .unwrap();
        assert!(out.cancelled);
        assert!(out.ranked.is_empty());
    }

    #[test]
    fn technologies_multiply_the_grid() {
        let spec = SweepSpec {
            powers_mw: vec![1.0],
            durations_h: vec![2.0],
            technologies: vec!["lfp".into(), "nmc".into(), "vanadium_flow".into()],
            objective: Objective::Losses,
            threads: 0,
        };
        assert_eq!(spec.len(&request()), 3);
        let out = run_sweep(
            &request(),
            &spec,
            &Catalog::builtin(),
            &ModelOptions::default(),
            None,
        )
        .unwrap();
        assert_eq!(out.ranked.len(), 3);
        assert!(out.to_string().contains("losses"));
    }

    #[test]
    fn empty_grid_rejected() {
        let spec = SweepSpec {
            powers_mw: Vec::new(),
            ..SweepSpec::default()
        };
        assert!(
            run_sweep(
                &request(),
                &spec,
                &Catalog::builtin(),
                &ModelOptions::default(),
                None
            )
            .is_err()
        );
    }
}
