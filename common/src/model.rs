//! First-order thermal lag with a linear humidity correction.

use crate::{config::ModelConfig, types::ProcessState};

#[derive(Debug, Clone, PartialEq)]
pub struct PhysicalModel {
    config: ModelConfig,
}

impl PhysicalModel {
    pub fn new(config: ModelConfig) -> Self {
        Self { config }
    }

    /// Advances one room by `dt_s` seconds. The heater state is taken from
    /// `state` and carried through unchanged.
    pub fn advance(&self, state: &ProcessState, setpoint_c: f64, dt_s: f64) -> ProcessState {
        let cfg = &self.config;
        let (target, tau) = if state.heater_on {
            (setpoint_c, cfg.tau_heat_s)
        } else {
            (cfg.ambient_c, cfg.tau_cool_s)
        };

        let temp_c = finite_or(
            state.temp_c + (target - state.temp_c) / tau * dt_s,
            state.temp_c,
        );

        let hum_pct = state.hum_pct
            + (-cfg.humidity_temp_coeff * (temp_c - cfg.ambient_c)) * cfg.humidity_gain
            + cfg.humidity_drift_pct;

        ProcessState {
            temp_c,
            hum_pct: finite_or(hum_pct, state.hum_pct).clamp(0.0, 100.0),
            heater_on: state.heater_on,
        }
    }
}

/// A non-finite step holds the previous value; a non-finite previous value
/// collapses to zero so the clamp still bounds it.
fn finite_or(next: f64, previous: f64) -> f64 {
    if next.is_finite() {
        next
    } else if previous.is_finite() {
        previous
    } else {
        0.0
    }
}

impl Default for PhysicalModel {
    fn default() -> Self {
        Self::new(ModelConfig::default())
    }
}
