use std::collections::BTreeMap;

use parking_lot::Mutex;

use crate::{
    config::RuntimeConfig,
    cycle::CycleController,
    error::RoomError,
    events::{Drained, Event},
    model::PhysicalModel,
    types::{
        ProcessState, Profile, RegisterMap, RoomId, StatePayload, TelemetryPayload, Timestamp,
    },
};

/// Everything the bridge reads from a room in one poll, taken under a
/// single lock so the drain lines up with the snapshot.
#[derive(Debug, Clone)]
pub struct RoomSnapshot {
    pub telemetry: TelemetryPayload,
    pub state: StatePayload,
    pub drained: Drained,
}

/// The fixed set of rooms for this process. Each room sits behind its own
/// lock; ticks and commands for one room never interleave, while rooms stay
/// independent of each other.
#[derive(Debug)]
pub struct RoomRegistry {
    rooms: BTreeMap<RoomId, Mutex<CycleController>>,
}

impl RoomRegistry {
    pub fn new(config: &RuntimeConfig, now: Timestamp) -> Self {
        let sim = &config.simulation;
        let rooms = (1..=sim.room_count).map(|id| {
            CycleController::new(
                RoomId(id),
                config.control.clone(),
                PhysicalModel::new(config.model.clone()),
                sim.default_profile,
                ProcessState {
                    temp_c: sim.initial_temp_c,
                    hum_pct: sim.initial_hum_pct,
                    heater_on: false,
                },
                now,
            )
        });
        Self::from_rooms(rooms)
    }

    pub fn from_rooms(rooms: impl IntoIterator<Item = CycleController>) -> Self {
        Self {
            rooms: rooms
                .into_iter()
                .map(|room| (room.room(), Mutex::new(room)))
                .collect(),
        }
    }

    pub fn room_ids(&self) -> Vec<RoomId> {
        self.rooms.keys().copied().collect()
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    /// Runs `f` with exclusive access to one room.
    pub fn with_room<R>(
        &self,
        room: RoomId,
        f: impl FnOnce(&mut CycleController) -> R,
    ) -> Result<R, RoomError> {
        let slot = self.rooms.get(&room).ok_or(RoomError::NotFound(room))?;
        let mut controller = slot.lock();
        Ok(f(&mut controller))
    }

    pub fn tick_all(&self, now: Timestamp, dt_s: f64) {
        for slot in self.rooms.values() {
            slot.lock().tick(now, dt_s);
        }
    }

    pub fn set_profile(
        &self,
        room: RoomId,
        profile: Profile,
        now: Timestamp,
    ) -> Result<(), RoomError> {
        self.with_room(room, |c| c.set_profile(profile, now))?
    }

    pub fn start(
        &self,
        room: RoomId,
        cmd_id: &str,
        profile: Option<Profile>,
        now: Timestamp,
    ) -> Result<(), RoomError> {
        self.with_room(room, |c| c.start(cmd_id, profile, now))?
    }

    pub fn stop(&self, room: RoomId, cmd_id: &str, now: Timestamp) -> Result<(), RoomError> {
        self.with_room(room, |c| c.stop(cmd_id, now))?
    }

    pub fn telemetry(&self, room: RoomId, now: Timestamp) -> Result<TelemetryPayload, RoomError> {
        self.with_room(room, |c| c.telemetry(now))
    }

    pub fn state(&self, room: RoomId, now: Timestamp) -> Result<StatePayload, RoomError> {
        self.with_room(room, |c| c.state(now))
    }

    pub fn registers(&self, room: RoomId, now: Timestamp) -> Result<RegisterMap, RoomError> {
        self.with_room(room, |c| c.registers(now))
    }

    pub fn profile(&self, room: RoomId) -> Result<Profile, RoomError> {
        self.with_room(room, |c| *c.profile())
    }

    pub fn pending_events(&self, room: RoomId) -> Result<Vec<Event>, RoomError> {
        self.with_room(room, |c| c.pending_events())
    }

    pub fn drain_events(&self, room: RoomId) -> Result<Drained, RoomError> {
        self.with_room(room, CycleController::drain_events)
    }

    pub fn snapshot_and_drain(
        &self,
        room: RoomId,
        now: Timestamp,
    ) -> Result<RoomSnapshot, RoomError> {
        self.with_room(room, |c| RoomSnapshot {
            telemetry: c.telemetry(now),
            state: c.state(now),
            drained: c.drain_events(),
        })
    }
}
