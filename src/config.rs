//! TOML-based scenario configuration and preset definitions.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::battery::ModelOptions;
use crate::catalog::{Leniency, TechnologyId, TopologyId};
use crate::sim::engine::SimulationRequest;
use crate::sim::sweep::{Objective, SweepSpec};
use crate::strategy::{StrategyKind, StrategyParams};

/// Top-level scenario configuration parsed from TOML.
///
/// All sections have defaults matching the baseline scenario. Parse with
/// [`ScenarioConfig::from_toml_str`] or use [`ScenarioConfig::baseline`].
///
/// ```toml
/// [plant]
/// psfv_mw = 8.0
/// bess_mw = 2.0
/// bess_hours = 4.0
/// month = 6
///
/// [strategy]
/// id = "cap_shaving"
///
/// [strategy.params]
/// cap_mw = 4.0
///
/// [engine]
/// leniency = "strict"
/// ```
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScenarioConfig {
    /// PV plant, battery sizing, and profile shape.
    #[serde(default)]
    pub plant: PlantConfig,
    /// Strategy id and its parameters.
    #[serde(default)]
    pub strategy: StrategyConfig,
    /// Engine options shared by model, strategies, and validator.
    #[serde(default)]
    pub engine: ModelOptions,
    /// Optional sizing sweep around the plant.
    #[serde(default)]
    pub sweep: Option<SweepSpec>,
}

/// PV plant, battery sizing, and canonical profile parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PlantConfig {
    /// Installed PV capacity (MWp).
    pub psfv_mw: f64,
    /// Battery power (MW).
    pub bess_mw: f64,
    /// Battery duration (h).
    pub bess_hours: f64,
    pub technology: String,
    pub topology: String,
    /// Calendar month 1..=12; annual-average day when absent.
    pub month: Option<u8>,
    /// Samples per simulated day (must be > 0).
    pub steps_per_day: usize,
    /// Number of days to simulate (must be > 0).
    pub days: usize,
}

impl Default for PlantConfig {
    fn default() -> Self {
        Self {
            psfv_mw: 5.0,
            bess_mw: 2.0,
            bess_hours: 4.0,
            technology: TechnologyId::Lfp.as_str().to_string(),
            topology: TopologyId::AcCoupled.as_str().to_string(),
            month: None,
            steps_per_day: 24,
            days: 1,
        }
    }
}

/// Strategy selection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StrategyConfig {
    /// Registered strategy id, e.g. `"night_shift"`.
    pub id: String,
    pub params: StrategyParams,
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self {
            id: StrategyKind::CapShaving.as_str().to_string(),
            params: StrategyParams::default(),
        }
    }
}

/// Configuration error with field path and constraint description.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("config error: {field}: {message}")]
pub struct ConfigError {
    /// Dotted field path (e.g., `"plant.steps_per_day"`).
    pub field: String,
    /// Human-readable constraint description.
    pub message: String,
}

impl ConfigError {
    fn new(field: &str, message: impl Into<String>) -> Self {
        Self {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

impl ScenarioConfig {
    /// Returns the baseline scenario: 5 MWp of PV, 2 MW / 4 h LFP, hard cap shaving.
    pub fn baseline() -> Self {
        Self::default()
    }

    /// Returns the evening-shift preset: summer midday energy moved to the evening peak.
    pub fn evening_shift() -> Self {
        Self {
            plant: PlantConfig {
                psfv_mw: 8.0,
                bess_mw: 2.5,
                month: Some(7),
                days: 3,
                ..PlantConfig::default()
            },
            strategy: StrategyConfig {
                id: StrategyKind::NightShift.as_str().to_string(),
                params: StrategyParams {
                    charge_hours: Some([10.0, 15.0]),
                    discharge_hours: Some([18.0, 23.0]),
                    ..StrategyParams::default()
                },
            },
            ..Self::default()
        }
    }

    /// Returns the grid-friendly preset: quarter-hour flat delivery with a sizing sweep.
    pub fn grid_friendly() -> Self {
        Self {
            plant: PlantConfig {
                psfv_mw: 10.0,
                bess_mw: 3.0,
                technology: TechnologyId::Nmc.as_str().to_string(),
                topology: TopologyId::DcCoupled.as_str().to_string(),
                month: Some(5),
                steps_per_day: 96,
                ..PlantConfig::default()
            },
            strategy: StrategyConfig {
                id: StrategyKind::FlatDay.as_str().to_string(),
                params: StrategyParams::default(),
            },
            engine: ModelOptions::default(),
            sweep: Some(SweepSpec {
                powers_mw: vec![1.0, 2.0, 3.0, 4.0],
                durations_h: vec![2.0, 4.0],
                objective: Objective::CurtailmentRatio,
                ..SweepSpec::default()
            }),
        }
    }

    /// Available preset names.
    pub const PRESETS: &[&str] = &["baseline", "evening_shift", "grid_friendly"];

    /// Loads a scenario from a named preset.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if the preset name is unknown.
    pub fn from_preset(name: &str) -> Result<Self, ConfigError> {
        match name {
            "baseline" => Ok(Self::baseline()),
            "evening_shift" => Ok(Self::evening_shift()),
            "grid_friendly" => Ok(Self::grid_friendly()),
            _ => Err(ConfigError::new(
                "preset",
                format!(
                    "unknown preset \"{name}\", available: {}",
                    Self::PRESETS.join(", ")
                ),
            )),
        }
    }

    /// Parses a scenario from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if the TOML is invalid or contains unknown fields.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        toml::from_str(s).map_err(|e| ConfigError::new("toml", e.to_string()))
    }

    /// The simulation request described by this scenario.
    pub fn to_request(&self) -> SimulationRequest {
        let p = &self.plant;
        SimulationRequest {
            psfv_mw: p.psfv_mw,
            bess_mw: p.bess_mw,
            bess_hours: p.bess_hours,
            technology: p.technology.clone(),
            topology: p.topology.clone(),
            strategy: self.strategy.id.clone(),
            params: self.strategy.params.clone(),
            month: p.month,
            steps_per_day: p.steps_per_day,
            days: p.days,
            profile: None,
        }
    }

    /// Validates all fields and returns a list of errors.
    ///
    /// Unknown technology, topology, and strategy ids are only errors under
    /// strict leniency; otherwise they fall back at run time. Returns an
    /// empty vector if configuration is valid.
    pub fn validate(&self) -> Vec<ConfigError> {
        let mut errors = Vec::new();
        let positive = |errors: &mut Vec<ConfigError>, field: &str, v: f64| {
            if !(v.is_finite() && v > 0.0) {
                errors.push(ConfigError::new(field, format!("must be > 0, got {v}")));
            }
        };

        let p = &self.plant;
        positive(&mut errors, "plant.psfv_mw", p.psfv_mw);
        positive(&mut errors, "plant.bess_mw", p.bess_mw);
        positive(&mut errors, "plant.bess_hours", p.bess_hours);
        if let Some(m) = p.month.filter(|m| !(1..=12).contains(m)) {
            errors.push(ConfigError::new("plant.month", format!("must be in 1..=12, got {m}")));
        }
        if p.steps_per_day == 0 {
            errors.push(ConfigError::new("plant.steps_per_day", "must be > 0"));
        }
        if p.days == 0 {
            errors.push(ConfigError::new("plant.days", "must be > 0"));
        }

        if self.engine.leniency == Leniency::Strict {
            if p.technology.parse::<TechnologyId>().is_err() {
                errors.push(ConfigError::new(
                    "plant.technology",
                    format!("unknown technology \"{}\"", p.technology),
                ));
            }
            if p.topology.parse::<TopologyId>().is_err() {
                errors.push(ConfigError::new(
                    "plant.topology",
                    format!("unknown topology \"{}\"", p.topology),
                ));
            }
            if self.strategy.id.parse::<StrategyKind>().is_err() {
                errors.push(ConfigError::new(
                    "strategy.id",
                    format!("unknown strategy \"{}\"", self.strategy.id),
                ));
            }
        }

        let sp = &self.strategy.params;
        for (field, value) in [
            ("strategy.params.percentile", sp.percentile),
            ("strategy.params.low_percentile", sp.low_percentile),
            ("strategy.params.high_percentile", sp.high_percentile),
        ] {
            if let Some(v) = value.filter(|v| !(0.0..=100.0).contains(v)) {
                errors.push(ConfigError::new(field, format!("must be in [0, 100], got {v}")));
            }
        }
        if sp.smoothing_window == Some(0) {
            errors.push(ConfigError::new("strategy.params.smoothing_window", "must be >= 1"));
        }

        if let Err(e) = self.engine.validate() {
            errors.push(ConfigError::new("engine", e.to_string()));
        }

        if let Some(sweep) = &self.sweep {
            if let Err(e) = sweep.validate() {
                errors.push(ConfigError::new("sweep", e.to_string()));
            }
            for &v in sweep.powers_mw.iter().chain(&sweep.durations_h) {
                positive(&mut errors, "sweep", v);
            }
        }

        errors
    }
}
