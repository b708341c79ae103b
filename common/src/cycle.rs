use std::collections::BTreeMap;

use chrono::Duration;

use crate::{
    config::ControlConfig,
    error::{validate_cmd_id, RoomError},
    events::{Drained, Event, EventKind, EventLog},
    model::PhysicalModel,
    types::{
        round2, CycleReason, CycleResult, CycleState, CycleStatus, Mode, ProcessState, Profile,
        RegisterMap, RoomId, StatePayload, TelemetryPayload, Timestamp, BIT_RUN, REG_DURATION,
        REG_HUMIDITY, REG_RUNNING, REG_SETPOINT, REG_TEMP,
    },
};

/// Authoritative state of one dryer room: profile, process, cycle and the
/// one-shot event log.
#[derive(Debug, Clone)]
pub struct CycleController {
    room: RoomId,
    config: ControlConfig,
    model: PhysicalModel,
    profile: Profile,
    process: ProcessState,
    cycle: CycleState,
    events: EventLog,
}

impl CycleController {
    pub fn new(
        room: RoomId,
        config: ControlConfig,
        model: PhysicalModel,
        profile: Profile,
        process: ProcessState,
        now: Timestamp,
    ) -> Self {
        let events = EventLog::with_capacity(config.event_log_capacity);
        Self {
            room,
            config,
            model,
            profile,
            process: ProcessState {
                heater_on: false,
                ..process
            },
            cycle: CycleState::idle(now),
            events,
        }
    }

    pub fn room(&self) -> RoomId {
        self.room
    }

    pub fn profile(&self) -> &Profile {
        &self.profile
    }

    pub fn process(&self) -> &ProcessState {
        &self.process
    }

    pub fn cycle(&self) -> &CycleState {
        &self.cycle
    }

    pub fn is_heater_on(&self) -> bool {
        self.process.heater_on
    }

    pub fn set_profile(&mut self, profile: Profile, now: Timestamp) -> Result<(), RoomError> {
        profile.validate()?;
        self.apply_profile(profile, now);
        Ok(())
    }

    /// Starts a cycle. `ends_at` is fixed from the duration in effect now;
    /// later profile edits only move the setpoint.
    pub fn start(
        &mut self,
        cmd_id: &str,
        profile: Option<Profile>,
        now: Timestamp,
    ) -> Result<(), RoomError> {
        validate_cmd_id(cmd_id)?;
        if let Some(profile) = &profile {
            profile.validate()?;
        }

        if self.cycle.is_running() {
            if !self.config.allow_restart {
                return Err(RoomError::CycleActive);
            }
            self.end_cycle(
                now,
                CycleStatus::Stopped,
                CycleResult::Done,
                CycleReason::Superseded,
                Some(cmd_id),
            );
        }

        if let Some(profile) = profile {
            self.apply_profile(profile, now);
        }

        let ends_at = now + Duration::seconds(self.profile.duration_s);
        self.cycle = CycleState {
            status: CycleStatus::Running,
            cmd_id: Some(cmd_id.to_string()),
            started_at: Some(now),
            ends_at: Some(ends_at),
            last_switch: now,
            result: None,
            reason: None,
        };
        self.process.heater_on = true;

        self.events.append(Event {
            ts: now,
            kind: EventKind::CycleStarted {
                cmd_id: cmd_id.to_string(),
                started_at: now,
                ends_at,
                profile: self.profile,
            },
        });
        Ok(())
    }

    pub fn stop(&mut self, cmd_id: &str, now: Timestamp) -> Result<(), RoomError> {
        validate_cmd_id(cmd_id)?;
        if !self.cycle.is_running() {
            return Err(RoomError::NoActiveCycle);
        }

        self.end_cycle(
            now,
            CycleStatus::Stopped,
            CycleResult::Done,
            CycleReason::StoppedByCommand,
            Some(cmd_id),
        );
        Ok(())
    }

    pub fn tick(&mut self, now: Timestamp, dt_s: f64) {
        self.process = self
            .model
            .advance(&self.process, self.profile.setpoint_c, dt_s);

        if !self.cycle.is_running() {
            return;
        }

        // Duration expiry wins over hysteresis in the same tick.
        if self.cycle.ends_at.is_some_and(|ends_at| now >= ends_at) {
            self.end_cycle(
                now,
                CycleStatus::Completed,
                CycleResult::Success,
                CycleReason::DurationReached,
                None,
            );
            return;
        }

        self.evaluate_heater(now);
    }

    pub fn telemetry(&self, now: Timestamp) -> TelemetryPayload {
        TelemetryPayload {
            ts: now,
            temp_c: round2(self.process.temp_c),
            hum_pct: round2(self.process.hum_pct),
            heater_on: self.process.heater_on,
            setpoint_c: self.profile.setpoint_c,
        }
    }

    pub fn state(&self, now: Timestamp) -> StatePayload {
        StatePayload {
            ts: now,
            cmd_id: self.cycle.cmd_id.clone(),
            mode: if self.cycle.is_running() {
                Mode::Running
            } else {
                Mode::Idle
            },
            heater_on: self.process.heater_on,
            cycle: self.cycle.view(),
        }
    }

    pub fn registers(&self, now: Timestamp) -> RegisterMap {
        let running = self.cycle.is_running();
        let data = BTreeMap::from([
            (REG_TEMP, round2(self.process.temp_c)),
            (REG_HUMIDITY, round2(self.process.hum_pct)),
            (REG_RUNNING, if running { 1.0 } else { 0.0 }),
            (REG_SETPOINT, self.profile.setpoint_c),
            (REG_DURATION, self.profile.duration_s as f64),
        ]);
        let bits = BTreeMap::from([(BIT_RUN, u8::from(running))]);

        RegisterMap { ts: now, data, bits }
    }

    pub fn drain_events(&mut self) -> Drained {
        self.events.drain()
    }

    pub fn pending_events(&self) -> Vec<Event> {
        self.events.pending().cloned().collect()
    }

    fn apply_profile(&mut self, profile: Profile, now: Timestamp) {
        self.profile = profile;
        self.events.append(Event {
            ts: now,
            kind: EventKind::ProfileUpdated { profile },
        });
    }

    fn evaluate_heater(&mut self, now: Timestamp) {
        let since_s = seconds_between(self.cycle.last_switch, now);
        let temp_c = self.process.temp_c;
        let setpoint_c = self.profile.setpoint_c;

        if self.process.heater_on {
            if temp_c >= setpoint_c && since_s >= self.config.min_on_s {
                self.switch_heater(false, now);
            }
        } else if temp_c <= setpoint_c - self.config.hysteresis_c
            && since_s >= self.config.min_off_s
        {
            self.switch_heater(true, now);
        }
    }

    fn switch_heater(&mut self, on: bool, now: Timestamp) {
        self.process.heater_on = on;
        self.cycle.last_switch = now;
    }

    fn end_cycle(
        &mut self,
        now: Timestamp,
        status: CycleStatus,
        result: CycleResult,
        reason: CycleReason,
        stopped_by: Option<&str>,
    ) {
        let cmd_id = self.cycle.cmd_id.take();
        self.cycle.status = status;
        self.cycle.started_at = None;
        self.cycle.ends_at = None;
        self.cycle.result = Some(result);
        self.cycle.reason = Some(reason);
        self.switch_heater(false, now);

        let kind = match status {
            CycleStatus::Completed => EventKind::CycleComplete {
                cmd_id,
                result,
                reason,
            },
            _ => EventKind::CycleStopped {
                cmd_id,
                stopped_by: stopped_by.map(str::to_string),
                result,
                reason,
            },
        };
        self.events.append(Event { ts: now, kind });
    }
}

fn seconds_between(earlier: Timestamp, later: Timestamp) -> f64 {
    (later - earlier).num_milliseconds() as f64 / 1_000.0
}
