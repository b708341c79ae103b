use std::{collections::BTreeMap, fmt};

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

pub type Timestamp = DateTime<FixedOffset>;

pub const SETPOINT_MIN_C: f64 = 0.0;
pub const SETPOINT_MAX_C: f64 = 120.0;
pub const DURATION_MIN_S: i64 = 1;
pub const DURATION_MAX_S: i64 = 24 * 3600;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoomId(pub u16);

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u16> for RoomId {
    fn from(value: u16) -> Self {
        Self(value)
    }
}

/// Target setpoint and duration for the next or current cycle.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub setpoint_c: f64,
    pub duration_s: i64,
}

impl Profile {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if !self.setpoint_c.is_finite()
            || !(SETPOINT_MIN_C..=SETPOINT_MAX_C).contains(&self.setpoint_c)
        {
            return Err(ValidationError::SetpointOutOfRange(self.setpoint_c));
        }
        if !(DURATION_MIN_S..=DURATION_MAX_S).contains(&self.duration_s) {
            return Err(ValidationError::DurationOutOfRange(self.duration_s));
        }
        Ok(())
    }
}

impl Default for Profile {
    fn default() -> Self {
        Self {
            setpoint_c: 50.0,
            duration_s: 1800,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProcessState {
    pub temp_c: f64,
    pub hum_pct: f64,
    pub heater_on: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CycleStatus {
    Idle,
    Running,
    Completed,
    Stopped,
}

impl CycleStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "IDLE",
            Self::Running => "RUNNING",
            Self::Completed => "COMPLETED",
            Self::Stopped => "STOPPED",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Mode {
    Idle,
    Running,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CycleResult {
    Success,
    Done,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CycleReason {
    DurationReached,
    StoppedByCommand,
    Superseded,
}

/// Authoritative cycle bookkeeping for one room.
///
/// `started_at`, `ends_at` and `cmd_id` are only populated while the status
/// is `Running`. Terminal statuses keep their `result`/`reason` for reporting
/// until the next `start`.
#[derive(Debug, Clone, PartialEq)]
pub struct CycleState {
    pub status: CycleStatus,
    pub cmd_id: Option<String>,
    pub started_at: Option<Timestamp>,
    pub ends_at: Option<Timestamp>,
    pub last_switch: Timestamp,
    pub result: Option<CycleResult>,
    pub reason: Option<CycleReason>,
}

impl CycleState {
    pub fn idle(now: Timestamp) -> Self {
        Self {
            status: CycleStatus::Idle,
            cmd_id: None,
            started_at: None,
            ends_at: None,
            last_switch: now,
            result: None,
            reason: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.status == CycleStatus::Running
    }

    pub fn view(&self) -> CycleView {
        CycleView {
            status: self.status,
            result: self.result,
            reason: self.reason,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CycleView {
    pub status: CycleStatus,
    pub result: Option<CycleResult>,
    pub reason: Option<CycleReason>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryPayload {
    pub ts: Timestamp,
    pub temp_c: f64,
    pub hum_pct: f64,
    #[serde(rename = "dryer_on")]
    pub heater_on: bool,
    pub setpoint_c: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatePayload {
    pub ts: Timestamp,
    pub cmd_id: Option<String>,
    pub mode: Mode,
    #[serde(rename = "dryer_on")]
    pub heater_on: bool,
    pub cycle: CycleView,
}

impl StatePayload {
    pub fn signature(&self) -> StateSignature {
        StateSignature {
            cmd_id: self.cmd_id.clone(),
            mode: self.mode,
            heater_on: self.heater_on,
            status: self.cycle.status,
            result: self.cycle.result,
            reason: self.cycle.reason,
        }
    }
}

/// Timestamp-free fingerprint of a [`StatePayload`]; two snapshots with equal
/// signatures carry the same retained state.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StateSignature {
    pub cmd_id: Option<String>,
    pub mode: Mode,
    pub heater_on: bool,
    pub status: CycleStatus,
    pub result: Option<CycleResult>,
    pub reason: Option<CycleReason>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AckStatus {
    Accepted,
    Done,
    Rejected,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ack {
    pub ts: Timestamp,
    pub cmd_id: String,
    pub status: AckStatus,
    pub detail: Option<String>,
}

/// PLC-style view of a room: `D` data registers and `M` bits.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RegisterMap {
    pub ts: Timestamp,
    #[serde(rename = "D")]
    pub data: BTreeMap<u16, f64>,
    #[serde(rename = "M")]
    pub bits: BTreeMap<u16, u8>,
}

pub const REG_TEMP: u16 = 1000;
pub const REG_HUMIDITY: u16 = 1001;
pub const REG_RUNNING: u16 = 1002;
pub const REG_SETPOINT: u16 = 1100;
pub const REG_DURATION: u16 = 1101;
pub const BIT_RUN: u16 = 1200;

pub(crate) fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
