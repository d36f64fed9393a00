//! Battery chemistry parameter rows.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{BessError, Result};

/// Identifier of a battery chemistry in the technology table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TechnologyId {
    /// Lithium iron phosphate (default).
    Lfp,
    /// Lithium nickel manganese cobalt oxide.
    Nmc,
    /// Lithium titanate.
    Lto,
    SodiumIon,
    VanadiumFlow,
    LeadAcid,
}

impl TechnologyId {
    /// All identifiers in table order.
    pub const ALL: [TechnologyId; 6] = [
        TechnologyId::Lfp,
        TechnologyId::Nmc,
        TechnologyId::Lto,
        TechnologyId::SodiumIon,
        TechnologyId::VanadiumFlow,
        TechnologyId::LeadAcid,
    ];

    /// Snake-case id used in configuration files.
    pub fn as_str(self) -> &'static str {
        match self {
            TechnologyId::Lfp => "lfp",
            TechnologyId::Nmc => "nmc",
            TechnologyId::Lto => "lto",
            TechnologyId::SodiumIon => "sodium_ion",
            TechnologyId::VanadiumFlow => "vanadium_flow",
            TechnologyId::LeadAcid => "lead_acid",
        }
    }
}

impl fmt::Display for TechnologyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TechnologyId {
    type Err = BessError;

    /// Parses an id case-insensitively; `-` and spaces are accepted in place of `_`.
    fn from_str(s: &str) -> Result<Self> {
        let norm = s.trim().to_ascii_lowercase().replace(['-', ' '], "_");
        TechnologyId::ALL
            .into_iter()
            .find(|id| id.as_str() == norm)
            .ok_or_else(|| BessError::UnknownTechnology(s.to_string()))
    }
}

/// Immutable performance envelope of one battery chemistry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TechnologySpec {
    /// Fraction of input energy that reaches storage while charging.
    pub charge_efficiency: f64,
    /// Fraction of drawn energy that reaches the terminals while discharging.
    pub discharge_efficiency: f64,
    /// Nameplate roundtrip efficiency (`charge_efficiency * discharge_efficiency`).
    pub roundtrip_efficiency: f64,
    /// Lowest allowed state of charge (fraction of capacity).
    pub soc_min: f64,
    /// Highest allowed state of charge (fraction of capacity).
    pub soc_max: f64,
    /// Maximum charge/discharge power as a multiple of capacity (1/h).
    pub c_rate_max: f64,
    /// Human-readable name.
    pub label: String,
}

impl TechnologySpec {
    /// Builds a row with the roundtrip efficiency derived from the one-way efficiencies.
    pub fn new(
        charge_efficiency: f64,
        discharge_efficiency: f64,
        soc_min: f64,
        soc_max: f64,
        c_rate_max: f64,
        label: &str,
    ) -> Self {
        Self {
            charge_efficiency,
            discharge_efficiency,
            roundtrip_efficiency: charge_efficiency * discharge_efficiency,
            soc_min,
            soc_max,
            c_rate_max,
            label: label.to_string(),
        }
    }

    /// Checks physical plausibility of the row.
    ///
    /// # Errors
    ///
    /// Returns `BessError::Configuration` naming the first offending field.
    pub fn validate(&self) -> Result<()> {
        let in_unit = |v: f64| v.is_finite() && v > 0.0 && v <= 1.0;
        if !in_unit(self.charge_efficiency) {
            return Err(BessError::config(format!(
                "{}: charge_efficiency must be in (0, 1]",
                self.label
            )));
        }
        if !in_unit(self.discharge_efficiency) {
            return Err(BessError::config(format!(
                "{}: discharge_efficiency must be in (0, 1]",
                self.label
            )));
        }
        if !(self.soc_min.is_finite() && self.soc_max.is_finite())
            || self.soc_min < 0.0
            || self.soc_max > 1.0
            || self.soc_min >= self.soc_max
        {
            return Err(BessError::config(format!(
                "{}: requires 0 <= soc_min < soc_max <= 1",
                self.label
            )));
        }
        if !(self.c_rate_max.is_finite() && self.c_rate_max > 0.0) {
            return Err(BessError::config(format!(
                "{}: c_rate_max must be > 0",
                self.label
            )));
        }
        Ok(())
    }
}

/// Built-in chemistry rows.
pub(crate) fn builtin_rows() -> Vec<(TechnologyId, TechnologySpec)> {
    vec![
        (
            TechnologyId::Lfp,
            TechnologySpec::new(0.964, 0.964, 0.05, 0.95, 1.0, "Lithium Iron Phosphate (LFP)"),
        ),
        (
            TechnologyId::Nmc,
            TechnologySpec::new(0.97, 0.97, 0.10, 0.90, 1.5, "Lithium NMC"),
        ),
        (
            TechnologyId::Lto,
            TechnologySpec::new(0.98, 0.98, 0.05, 0.95, 4.0, "Lithium Titanate (LTO)"),
        ),
        (
            TechnologyId::SodiumIon,
            TechnologySpec::new(0.95, 0.95, 0.10, 0.90, 1.0, "Sodium-ion"),
        ),
        (
            TechnologyId::VanadiumFlow,
            TechnologySpec::new(0.87, 0.87, 0.15, 0.85, 0.25, "Vanadium Redox Flow"),
        ),
        (
            TechnologyId::LeadAcid,
            TechnologySpec::new(0.90, 0.90, 0.20, 0.90, 0.2, "Advanced Lead-Acid"),
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_accepts_variants() {
        assert_eq!("LFP".parse::<TechnologyId>(), Ok(TechnologyId::Lfp));
        assert_eq!(
            "vanadium-flow".parse::<TechnologyId>(),
            Ok(TechnologyId::VanadiumFlow)
        );
        assert!("unobtainium".parse::<TechnologyId>().is_err());
    }

    #[test]
    fn builtin_rows_are_valid() {
        for (id, spec) in builtin_rows() {
            assert!(spec.validate().is_ok(), "{id} should be valid");
            let rt = spec.charge_efficiency * spec.discharge_efficiency;
            assert!((spec.roundtrip_efficiency - rt).abs() < 1e-12);
        }
    }

    #[test]
    fn validate_rejects_inverted_soc_window() {
        let spec = TechnologySpec::new(0.95, 0.95, 0.9, 0.1, 1.0, "broken");
        assert!(spec.validate().is_err());
    }

    #[test]
    fn validate_rejects_efficiency_above_one() {
        let spec = TechnologySpec::new(1.2, 0.95, 0.1, 0.9, 1.0, "broken");
        assert!(spec.validate().is_err());
    }
}
