//! Battery energy storage simulation for PV-coupled plants.
//!
//! A [`battery::BessModel`] steps a single battery through a solar profile
//! under one of the dispatch strategies in [`strategy`]; every run is checked
//! for energy conservation by [`sim::balance`]. The [`sim`] facade adds
//! canonical profiles, one-shot reports, parallel sizing sweeps, and
//! externally controlled episodes.

pub mod battery;
/// Injectable technology and topology tables.
pub mod catalog;
pub mod config;
pub mod error;
pub mod io;
/// Profile generation, reports, sweeps, and energy balance checks.
pub mod sim;
pub mod strategy;

pub use error::{BessError, Result};
