//! Externally controlled episodes driven through the stateless transition.
//!
//! The caller owns dispatch policy (an optimizer, an RL agent, a replayed
//! schedule) and feeds one power request per step. Unlike the built-in
//! strategies, charging here may exceed solar and import from the grid.

use serde::Serialize;

use crate::battery::{BessModel, validate_profile};
use crate::error::{BessError, Result};

/// Record of one episode step.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct EpisodeStep {
    pub step: usize,
    pub solar_mw: f64,
    pub request_mw: f64,
    /// What the battery actually did; positive = discharge.
    pub actual_power_mw: f64,
    pub new_soc: f64,
    pub energy_loss_mwh: f64,
    /// Net export; negative means import.
    pub grid_mw: f64,
}

/// Per-step series collected over an episode.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EpisodeTrace {
    pub soc: Vec<f64>,
    pub power: Vec<f64>,
    pub losses: Vec<f64>,
    pub grid: Vec<f64>,
}

impl EpisodeTrace {
    pub fn len(&self) -> usize {
        self.soc.len()
    }

    pub fn is_empty(&self) -> bool {
        self.soc.is_empty()
    }

    /// Energy drawn from the grid (MWh).
    pub fn grid_import_mwh(&self, dt: f64) -> f64 {
        self.grid.iter().map(|g| (-g).max(0.0)).sum::<f64>() * dt
    }

    /// Energy exported to the grid (MWh).
    pub fn grid_export_mwh(&self, dt: f64) -> f64 {
        self.grid.iter().map(|g| g.max(0.0)).sum::<f64>() * dt
    }
}

/// A solar profile stepped one external request at a time.
#[derive(Debug, Clone)]
pub struct ControlEpisode {
    model: BessModel,
    solar: Vec<f64>,
    soc: f64,
    position: usize,
    trace: EpisodeTrace,
}

impl ControlEpisode {
    /// Starts an episode at `initial_soc` (`soc_min` when `None`).
    ///
    /// The model's own state is never touched; every step goes through
    /// [`BessModel::next_state`].
    ///
    /// # Errors
    ///
    /// Returns `NumericalDomain` for an invalid profile or starting SOC.
    pub fn new(model: BessModel, solar: Vec<f64>, initial_soc: Option<f64>) -> Result<Self> {
        validate_profile(&solar)?;
        let c = model.config();
        let soc = initial_soc.unwrap_or(c.soc_min);
        if !(soc.is_finite() && (c.soc_min..=c.soc_max).contains(&soc)) {
            return Err(BessError::domain(format!(
                "initial soc {soc} outside [{}, {}]",
                c.soc_min, c.soc_max
            )));
        }
        let n = solar.len();
        Ok(Self {
            model,
            solar,
            soc,
            position: 0,
            trace: EpisodeTrace {
                soc: Vec::with_capacity(n),
                power: Vec::with_capacity(n),
                losses: Vec::with_capacity(n),
                grid: Vec::with_capacity(n),
            },
        })
    }

    pub fn soc(&self) -> f64 {
        self.soc
    }

    /// Index of the next step.
    pub fn position(&self) -> usize {
        self.position
    }

    pub fn is_done(&self) -> bool {
        self.position >= self.solar.len()
    }

    pub fn trace(&self) -> &EpisodeTrace {
        &self.trace
    }

    pub fn into_trace(self) -> EpisodeTrace {
        self.trace
    }

    pub fn model(&self) -> &BessModel {
        &self.model
    }

    /// Applies one request to the current step.
    ///
    /// # Errors
    ///
    /// Returns `NumericalDomain` past the end of the profile or for a
    /// non-finite request.
    pub fn advance(&mut self, request_mw: f64) -> Result<EpisodeStep> {
        let Some(&solar_mw) = self.solar.get(self.position) else {
            return Err(BessError::domain(format!(
                "episode finished after {} steps",
                self.solar.len()
            )));
        };
        let ns = self.model.next_state(self.soc, request_mw, self.model.dt())?;
        let grid_mw = solar_mw + ns.actual_power_mw;
        let step = EpisodeStep {
            step: self.position,
            solar_mw,
            request_mw,
            actual_power_mw: ns.actual_power_mw,
            new_soc: ns.new_soc,
            energy_loss_mwh: ns.energy_loss_mwh,
            grid_mw,
        };
        self.trace.soc.push(ns.new_soc);
        self.trace.power.push(ns.actual_power_mw);
        self.trace.losses.push(ns.energy_loss_mwh);
        self.trace.grid.push(grid_mw);
        self.soc = ns.new_soc;
        self.position += 1;
        Ok(step)
    }

    /// Feeds a whole request sequence, stopping at the first error.
    ///
    /// # Errors
    ///
    /// As [`ControlEpisode::advance`].
    pub fn replay(&mut self, requests: &[f64]) -> Result<&EpisodeTrace> {
        for &r in requests {
            self.advance(r)?;
        }
        Ok(&self.trace)
    }
}
