//! Error types shared by the model, strategies, and facade.

use thiserror::Error;

/// Errors produced by the BESS simulation core.
///
/// Every variant is returned as a value so that a caller iterating over many
/// configurations can skip a failing case and continue.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum BessError {
    /// Invalid plant or strategy parameters (non-positive power, zero capacity, ...).
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Technology id not present in the catalog (strict mode only).
    #[error("unknown technology \"{0}\"")]
    UnknownTechnology(String),

    /// Topology id not present in the catalog (strict mode only).
    #[error("unknown topology \"{0}\"")]
    UnknownTopology(String),

    /// Strategy id not registered (strict mode only).
    #[error("unknown strategy \"{0}\"")]
    UnknownStrategy(String),

    /// Energy balance check failed and the caller asked for it to be fatal.
    #[error("energy balance violated: {0}")]
    EnergyBalanceViolation(String),

    /// NaN, infinite, negative, or empty numeric input.
    #[error("numerical domain error: {0}")]
    NumericalDomain(String),
}

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, BessError>;

impl BessError {
    pub(crate) fn config(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    pub(crate) fn domain(message: impl Into<String>) -> Self {
        Self::NumericalDomain(message.into())
    }
}
