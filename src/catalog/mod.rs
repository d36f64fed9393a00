//! Injectable technology and topology parameter tables.
//!
//! The simulation core never reaches for a global table: callers build a
//! [`Catalog`] (usually [`Catalog::builtin`]) and pass it to the model.

/// Battery chemistry rows.
pub mod technology;
/// Plant coupling topology rows.
pub mod topology;

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{BessError, Result};

pub use technology::{TechnologyId, TechnologySpec};
pub use topology::{FlexibilityClass, TopologyId, TopologySpec};

/// How unknown identifiers are handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Leniency {
    /// Substitute a documented default and report a [`Fallback`].
    #[default]
    Lenient,
    /// Return a typed error.
    Strict,
}

/// Which lookup fell back to a default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackKind {
    Technology,
    Topology,
    Strategy,
}

/// Record of a lenient default substitution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Fallback {
    pub kind: FallbackKind,
    /// Identifier the caller asked for.
    pub requested: String,
    /// Identifier actually used.
    pub substituted: String,
}

impl fmt::Display for Fallback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:?} \"{}\" unknown, using \"{}\"",
            self.kind, self.requested, self.substituted
        )
    }
}

/// A looked-up value plus the substitution made to obtain it, if any.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolved<T> {
    pub value: T,
    pub fallback: Option<Fallback>,
}

impl<T> Resolved<T> {
    pub(crate) fn exact(value: T) -> Self {
        Self {
            value,
            fallback: None,
        }
    }

    /// Whether a default was substituted.
    pub fn fell_back(&self) -> bool {
        self.fallback.is_some()
    }
}

/// Technology and topology tables with their lenient defaults.
#[derive(Debug, Clone)]
pub struct Catalog {
    technologies: BTreeMap<TechnologyId, TechnologySpec>,
    topologies: BTreeMap<TopologyId, TopologySpec>,
    default_technology: TechnologyId,
    default_topology: TopologyId,
}

/// TOML layout accepted by [`Catalog::from_toml_str`].
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct CatalogFile {
    #[serde(default)]
    default_technology: Option<TechnologyId>,
    #[serde(default)]
    default_topology: Option<TopologyId>,
    #[serde(default)]
    technology: Vec<TechnologyRow>,
    #[serde(default)]
    topology: Vec<TopologyRow>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct TechnologyRow {
    id: TechnologyId,
    charge_efficiency: f64,
    discharge_efficiency: f64,
    soc_min: f64,
    soc_max: f64,
    c_rate_max: f64,
    label: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct TopologyRow {
    id: TopologyId,
    efficiency_penalty: f64,
    flexibility_class: FlexibilityClass,
    label: String,
}

impl Catalog {
    /// Built-in tables: LFP and AC-coupled are the lenient defaults.
    pub fn builtin() -> Self {
        Self {
            technologies: technology::builtin_rows().into_iter().collect(),
            topologies: topology::builtin_rows().into_iter().collect(),
            default_technology: TechnologyId::Lfp,
            default_topology: TopologyId::AcCoupled,
        }
    }

    /// Starts from the built-in tables and overrides rows found in `s`.
    ///
    /// ```
    /// use bess_sim::catalog::{Catalog, TechnologyId};
    ///
    /// let catalog = Catalog::from_toml_str(r#"
    /// [[technology]]
    /// id = "lfp"
    /// charge_efficiency = 0.95
    /// discharge_efficiency = 0.95
    /// soc_min = 0.1
    /// soc_max = 0.9
    /// c_rate_max = 0.5
    /// label = "Site LFP"
    /// "#).unwrap();
    /// assert_eq!(catalog.technology(TechnologyId::Lfp).unwrap().c_rate_max, 0.5);
    /// ```
    ///
    /// # Errors
    ///
    /// Returns `BessError::Configuration` on invalid TOML or implausible rows.
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let file: CatalogFile =
            toml::from_str(s).map_err(|e| BessError::config(format!("catalog: {e}")))?;
        let mut catalog = Self::builtin();
        for row in file.technology {
            let spec = TechnologySpec::new(
                row.charge_efficiency,
                row.discharge_efficiency,
                row.soc_min,
                row.soc_max,
                row.c_rate_max,
                &row.label,
            );
            catalog.insert_technology(row.id, spec)?;
        }
        for row in file.topology {
            let spec = TopologySpec::new(row.efficiency_penalty, row.flexibility_class, &row.label);
            catalog.insert_topology(row.id, spec)?;
        }
        if let Some(id) = file.default_technology {
            catalog.default_technology = id;
        }
        if let Some(id) = file.default_topology {
            catalog.default_topology = id;
        }
        Ok(catalog)
    }

    /// Adds or replaces a technology row after validating it.
    ///
    /// # Errors
    ///
    /// Returns `BessError::Configuration` if the row is implausible.
    pub fn insert_technology(&mut self, id: TechnologyId, spec: TechnologySpec) -> Result<()> {
        spec.validate()?;
        self.technologies.insert(id, spec);
        Ok(())
    }

    /// Adds or replaces a topology row after validating it.
    ///
    /// # Errors
    ///
    /// Returns `BessError::Configuration` if the row is implausible.
    pub fn insert_topology(&mut self, id: TopologyId, spec: TopologySpec) -> Result<()> {
        spec.validate()?;
        self.topologies.insert(id, spec);
        Ok(())
    }

    pub fn technology(&self, id: TechnologyId) -> Option<&TechnologySpec> {
        self.technologies.get(&id)
    }

    pub fn topology(&self, id: TopologyId) -> Option<&TopologySpec> {
        self.topologies.get(&id)
    }

    pub fn default_technology(&self) -> TechnologyId {
        self.default_technology
    }

    pub fn default_topology(&self) -> TopologyId {
        self.default_topology
    }

    /// Looks up a technology by its string id.
    ///
    /// # Errors
    ///
    /// In strict mode returns `UnknownTechnology`; in either mode returns
    /// `Configuration` if the default row itself is missing.
    pub fn resolve_technology(
        &self,
        id: &str,
        leniency: Leniency,
    ) -> Result<Resolved<TechnologySpec>> {
        if let Some(spec) = id.parse::<TechnologyId>().ok().and_then(|tid| self.technology(tid)) {
            return Ok(Resolved::exact(spec.clone()));
        }
        if leniency == Leniency::Strict {
            return Err(BessError::UnknownTechnology(id.to_string()));
        }
        let default = self.default_technology;
        let spec = self.technology(default).ok_or_else(|| {
            BessError::config(format!("default technology \"{default}\" missing from catalog"))
        })?;
        warn!(requested = id, substituted = %default, "unknown technology, using default");
        Ok(Resolved {
            value: spec.clone(),
            fallback: Some(Fallback {
                kind: FallbackKind::Technology,
                requested: id.to_string(),
                substituted: default.to_string(),
            }),
        })
    }

    /// Looks up a topology by its string id.
    ///
    /// # Errors
    ///
    /// In strict mode returns `UnknownTopology`; in either mode returns
    /// `Configuration` if the default row itself is missing.
    pub fn resolve_topology(&self, id: &str, leniency: Leniency) -> Result<Resolved<TopologySpec>> {
        if let Some(spec) = id.parse::<TopologyId>().ok().and_then(|tid| self.topology(tid)) {
            return Ok(Resolved::exact(spec.clone()));
        }
        if leniency == Leniency::Strict {
            return Err(BessError::UnknownTopology(id.to_string()));
        }
        let default = self.default_topology;
        let spec = self.topology(default).ok_or_else(|| {
            BessError::config(format!("default topology \"{default}\" missing from catalog"))
        })?;
        warn!(requested = id, substituted = %default, "unknown topology, using default");
        Ok(Resolved {
            value: spec.clone(),
            fallback: Some(Fallback {
                kind: FallbackKind::Topology,
                requested: id.to_string(),
                substituted: default.to_string(),
            }),
        })
    }
}

impl Default for Catalog {
    fn default() -> Self {
        Self::builtin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_ids_resolve_exactly() {
        let catalog = Catalog::builtin();
        let r = catalog.resolve_technology("nmc", Leniency::Strict).unwrap();
        assert!(!r.fell_back());
        assert_eq!(r.value.soc_min, 0.10);

        let r = catalog.resolve_topology("dc_coupled", Leniency::Strict).unwrap();
        assert_eq!(r.value.efficiency_penalty, 0.01);
    }

    #[test]
    fn unknown_technology_falls_back_when_lenient() {
        let catalog = Catalog::builtin();
        let r = catalog
            .resolve_technology("flux_capacitor", Leniency::Lenient)
            .unwrap();
        assert_eq!(r.value.label, "Lithium Iron Phosphate (LFP)");
        let fb = r.fallback.unwrap();
        assert_eq!(fb.kind, FallbackKind::Technology);
        assert_eq!(fb.substituted, "lfp");
    }

    #[test]
    fn unknown_ids_fail_when_strict() {
        let catalog = Catalog::builtin();
        assert_eq!(
            catalog.resolve_technology("flux_capacitor", Leniency::Strict),
            Err(BessError::UnknownTechnology("flux_capacitor".to_string()))
        );
        assert_eq!(
            catalog.resolve_topology("mesh", Leniency::Strict),
            Err(BessError::UnknownTopology("mesh".to_string()))
        );
    }

    #[test]
    fn toml_overrides_rows_and_default() {
        let catalog = Catalog::from_toml_str(
            r#"
default_topology = "dc_coupled"

[[topology]]
id = "dc_coupled"
efficiency_penalty = 0.05
flexibility_class = "low"
label = "Site DC"
"#,
        )
        .unwrap();
        assert_eq!(catalog.default_topology(), TopologyId::DcCoupled);
        let spec = catalog.topology(TopologyId::DcCoupled).unwrap();
        assert_eq!(spec.efficiency_penalty, 0.05);
        assert_eq!(spec.flexibility_class, FlexibilityClass::Low);
    }

    #[test]
    fn toml_rejects_implausible_rows() {
        let result = Catalog::from_toml_str(
            r#"
[[technology]]
id = "nmc"
charge_efficiency = 1.5
discharge_efficiency = 0.9
soc_min = 0.1
soc_max = 0.9
c_rate_max = 1.0
label = "bad"
"#,
        );
        assert!(result.is_err());
    }
}
