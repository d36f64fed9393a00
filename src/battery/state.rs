//! Mutable runtime state of one battery.

use serde::Serialize;

use super::types::Transition;

/// State of charge plus cumulative energy counters.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatteryState {
    /// State of charge as a fraction of capacity.
    pub soc: f64,
    /// `soc * capacity_mwh`.
    pub energy_stored_mwh: f64,
    /// Source-side energy absorbed while charging (MWh).
    pub cumulative_charged_mwh: f64,
    /// Terminal-side energy delivered while discharging (MWh).
    pub cumulative_discharged_mwh: f64,
    /// Conversion losses (MWh).
    pub cumulative_losses_mwh: f64,
    /// Equivalent full cycles against usable capacity.
    pub cycle_count: f64,
}

impl BatteryState {
    pub(crate) fn new(soc: f64, capacity_mwh: f64) -> Self {
        Self {
            soc,
            energy_stored_mwh: soc * capacity_mwh,
            cumulative_charged_mwh: 0.0,
            cumulative_discharged_mwh: 0.0,
            cumulative_losses_mwh: 0.0,
            cycle_count: 0.0,
        }
    }

    /// Commits a transition. Flows at or below `noise_floor_mwh` move the SOC
    /// but are not counted toward throughput, losses, or cycles.
    pub(crate) fn apply(
        &mut self,
        t: &Transition,
        capacity_mwh: f64,
        usable_capacity_mwh: f64,
        noise_floor_mwh: f64,
    ) {
        self.soc = t.new_soc;
        self.energy_stored_mwh = self.soc * capacity_mwh;

        if t.charged_mwh > noise_floor_mwh {
            self.cumulative_charged_mwh += t.charged_mwh;
            self.cumulative_losses_mwh += t.energy_loss_mwh;
        }
        if t.discharged_mwh > noise_floor_mwh {
            self.cumulative_discharged_mwh += t.discharged_mwh;
            self.cumulative_losses_mwh += t.energy_loss_mwh;
        }
        self.cycle_count = (self.cumulative_charged_mwh + self.cumulative_discharged_mwh)
            / (2.0 * usable_capacity_mwh);
    }
}
