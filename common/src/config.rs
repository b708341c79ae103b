use serde::{Deserialize, Serialize};

use crate::types::{Profile, DURATION_MAX_S, DURATION_MIN_S, SETPOINT_MAX_C, SETPOINT_MIN_C};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ModelConfig {
    pub ambient_c: f64,
    pub tau_heat_s: f64,
    pub tau_cool_s: f64,
    pub humidity_temp_coeff: f64,
    pub humidity_gain: f64,
    /// Added to humidity every step; deployments tune this between 0.01 and 0.05.
    pub humidity_drift_pct: f64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            ambient_c: 30.0,
            tau_heat_s: 40.0,
            tau_cool_s: 80.0,
            humidity_temp_coeff: 0.08,
            humidity_gain: 0.02,
            humidity_drift_pct: 0.05,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ControlConfig {
    pub min_on_s: f64,
    pub min_off_s: f64,
    pub hysteresis_c: f64,
    pub allow_restart: bool,
    pub event_log_capacity: usize,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            min_on_s: 15.0,
            min_off_s: 15.0,
            hysteresis_c: 2.0,
            allow_restart: false,
            event_log_capacity: 256,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SimulationConfig {
    pub room_count: u16,
    pub tick_interval_ms: u64,
    pub dt_s: f64,
    pub initial_temp_c: f64,
    pub initial_hum_pct: f64,
    pub default_profile: Profile,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            room_count: 4,
            tick_interval_ms: 1_000,
            dt_s: 1.0,
            initial_temp_c: 30.0,
            initial_hum_pct: 60.0,
            default_profile: Profile::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BridgeConfig {
    pub poll_interval_ms: u64,
    pub publish_timeout_ms: u64,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 1_000,
            publish_timeout_ms: 3_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct NetworkConfig {
    pub mqtt_host: String,
    pub mqtt_port: u16,
    pub mqtt_user: String,
    pub mqtt_pass: String,
    pub client_id: String,
    pub connect_timeout_ms: u64,
    pub http_port: u16,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            mqtt_host: "127.0.0.1".to_string(),
            mqtt_port: 1883,
            mqtt_user: String::new(),
            mqtt_pass: String::new(),
            client_id: "dryer-controller".to_string(),
            connect_timeout_ms: 10_000,
            http_port: 8000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RuntimeConfig {
    pub model: ModelConfig,
    pub control: ControlConfig,
    pub simulation: SimulationConfig,
    pub bridge: BridgeConfig,
    pub network: NetworkConfig,
    pub timezone: String,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            model: ModelConfig::default(),
            control: ControlConfig::default(),
            simulation: SimulationConfig::default(),
            bridge: BridgeConfig::default(),
            network: NetworkConfig::default(),
            timezone: "UTC".to_string(),
        }
    }
}

impl RuntimeConfig {
    pub fn sanitize(&mut self) {
        self.model.sanitize();
        self.control.sanitize();
        self.simulation.sanitize();
        self.bridge.sanitize();

        // Explicit steps longer than the fastest time constant overshoot and diverge.
        let fastest_tau = self.model.tau_heat_s.min(self.model.tau_cool_s);
        self.simulation.dt_s = self.simulation.dt_s.min(fastest_tau);

        if self.timezone.parse::<chrono_tz::Tz>().is_err() {
            self.timezone = "UTC".to_string();
        }
        if self.network.client_id.trim().is_empty() {
            self.network.client_id = NetworkConfig::default().client_id;
        }
    }
}

impl ModelConfig {
    pub fn sanitize(&mut self) {
        let defaults = Self::default();
        if !self.tau_heat_s.is_finite() || self.tau_heat_s < 1.0 {
            self.tau_heat_s = defaults.tau_heat_s;
        }
        if !self.tau_cool_s.is_finite() || self.tau_cool_s < 1.0 {
            self.tau_cool_s = defaults.tau_cool_s;
        }
        if !self.ambient_c.is_finite() {
            self.ambient_c = defaults.ambient_c;
        }
        if !self.humidity_temp_coeff.is_finite() {
            self.humidity_temp_coeff = defaults.humidity_temp_coeff;
        }
        if !self.humidity_gain.is_finite() {
            self.humidity_gain = defaults.humidity_gain;
        }
        if !self.humidity_drift_pct.is_finite() {
            self.humidity_drift_pct = defaults.humidity_drift_pct;
        }
    }
}

impl ControlConfig {
    pub fn sanitize(&mut self) {
        self.min_on_s = finite_or(self.min_on_s, 15.0).clamp(0.0, 3_600.0);
        self.min_off_s = finite_or(self.min_off_s, 15.0).clamp(0.0, 3_600.0);
        self.hysteresis_c = finite_or(self.hysteresis_c, 2.0).clamp(0.0, 20.0);
        self.event_log_capacity = self.event_log_capacity.clamp(16, 65_536);
    }
}

impl SimulationConfig {
    pub fn sanitize(&mut self) {
        self.room_count = self.room_count.clamp(1, 64);
        self.tick_interval_ms = self.tick_interval_ms.clamp(10, 60_000);
        self.dt_s = finite_or(self.dt_s, 1.0).clamp(0.001, 60.0);
        self.initial_temp_c = finite_or(self.initial_temp_c, 30.0);
        self.initial_hum_pct = finite_or(self.initial_hum_pct, 60.0).clamp(0.0, 100.0);

        let profile = &mut self.default_profile;
        profile.setpoint_c =
            finite_or(profile.setpoint_c, 50.0).clamp(SETPOINT_MIN_C, SETPOINT_MAX_C);
        profile.duration_s = profile.duration_s.clamp(DURATION_MIN_S, DURATION_MAX_S);
    }
}

impl BridgeConfig {
    pub fn sanitize(&mut self) {
        self.poll_interval_ms = self.poll_interval_ms.clamp(50, 60_000);
        self.publish_timeout_ms = self.publish_timeout_ms.clamp(100, 30_000);
    }
}

fn finite_or(value: f64, fallback: f64) -> f64 {
    if value.is_finite() {
        value
    } else {
        fallback
    }
}
