//! Plant topology parameter rows.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{BessError, Result};

/// Identifier of a plant coupling topology.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TopologyId {
    /// Battery on its own inverter at the AC bus (default).
    AcCoupled,
    /// Battery shares the PV inverter on the DC bus.
    DcCoupled,
    HybridInverter,
    /// Many small units behind separate connection points.
    Distributed,
}

impl TopologyId {
    pub const ALL: [TopologyId; 4] = [
        TopologyId::AcCoupled,
        TopologyId::DcCoupled,
        TopologyId::HybridInverter,
        TopologyId::Distributed,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            TopologyId::AcCoupled => "ac_coupled",
            TopologyId::DcCoupled => "dc_coupled",
            TopologyId::HybridInverter => "hybrid_inverter",
            TopologyId::Distributed => "distributed",
        }
    }
}

impl fmt::Display for TopologyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TopologyId {
    type Err = BessError;

    fn from_str(s: &str) -> Result<Self> {
        let norm = s.trim().to_ascii_lowercase().replace(['-', ' '], "_");
        TopologyId::ALL
            .into_iter()
            .find(|id| id.as_str() == norm)
            .ok_or_else(|| BessError::UnknownTopology(s.to_string()))
    }
}

/// How freely the battery can be dispatched independently of the PV array.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlexibilityClass {
    High,
    Medium,
    Low,
}

/// Immutable conversion-loss and flexibility envelope of a topology.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopologySpec {
    /// Fractional derating applied to both power and one-way efficiencies.
    pub efficiency_penalty: f64,
    pub flexibility_class: FlexibilityClass,
    pub label: String,
}

impl TopologySpec {
    pub fn new(efficiency_penalty: f64, flexibility_class: FlexibilityClass, label: &str) -> Self {
        Self {
            efficiency_penalty,
            flexibility_class,
            label: label.to_string(),
        }
    }

    /// Checks that the penalty lies in `[0, 1)`.
    ///
    /// # Errors
    ///
    /// Returns `BessError::Configuration` if the penalty is out of range.
    pub fn validate(&self) -> Result<()> {
        if !(self.efficiency_penalty.is_finite() && (0.0..1.0).contains(&self.efficiency_penalty))
        {
            return Err(BessError::config(format!(
                "{}: efficiency_penalty must be in [0, 1)",
                self.label
            )));
        }
        Ok(())
    }
}

pub(crate) fn builtin_rows() -> Vec<(TopologyId, TopologySpec)> {
    vec![
        (
            TopologyId::AcCoupled,
            TopologySpec::new(0.0, FlexibilityClass::High, "AC-coupled"),
        ),
        (
            TopologyId::DcCoupled,
            TopologySpec::new(0.01, FlexibilityClass::Medium, "DC-coupled"),
        ),
        (
            TopologyId::HybridInverter,
            TopologySpec::new(0.02, FlexibilityClass::Medium, "Hybrid inverter"),
        ),
        (
            TopologyId::Distributed,
            TopologySpec::new(0.03, FlexibilityClass::Low, "Distributed"),
        ),
    ]
}
