use std::{collections::HashMap, sync::Arc};

use crate::{
    error::RoomError,
    events::Event,
    registry::RoomRegistry,
    types::{RoomId, StatePayload, StateSignature, TelemetryPayload, Timestamp},
};

/// A state snapshot the bridge wants published as retained.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingState {
    pub payload: StatePayload,
    pub signature: StateSignature,
}

/// Output of polling one room.
#[derive(Debug, Clone)]
pub struct RoomPoll {
    pub room: RoomId,
    /// Always published.
    pub telemetry: TelemetryPayload,
    pub events: Vec<Event>,
    pub dropped_events: u64,
    /// Present only when the retained state must be republished.
    pub state: Option<PendingState>,
}

#[derive(Debug, Default)]
struct PublishTrack {
    last: Option<StateSignature>,
    force_pending: bool,
}

/// Turns pollable room snapshots into telemetry heartbeats and deduplicated
/// retained state. Holds only the last published signature per room.
///
/// A forced publish stays pending until [`StateBridge::mark_published`] is
/// called, so a transport failure does not swallow a transition.
#[derive(Debug)]
pub struct StateBridge {
    registry: Arc<RoomRegistry>,
    tracks: HashMap<RoomId, PublishTrack>,
}

impl StateBridge {
    pub fn new(registry: Arc<RoomRegistry>) -> Self {
        Self {
            registry,
            tracks: HashMap::new(),
        }
    }

    pub fn room_ids(&self) -> Vec<RoomId> {
        self.registry.room_ids()
    }

    pub fn poll_room(&mut self, room: RoomId, now: Timestamp) -> Result<RoomPoll, RoomError> {
        let snapshot = self.registry.snapshot_and_drain(room, now)?;
        let track = self.tracks.entry(room).or_default();

        if snapshot
            .drained
            .events
            .iter()
            .any(|event| event.kind.forces_state_publish())
        {
            track.force_pending = true;
        }

        let signature = snapshot.state.signature();
        let changed = track.last.as_ref() != Some(&signature);
        let state = (track.force_pending || changed).then(|| PendingState {
            payload: snapshot.state,
            signature,
        });

        Ok(RoomPoll {
            room,
            telemetry: snapshot.telemetry,
            events: snapshot.drained.events,
            dropped_events: snapshot.drained.dropped,
            state,
        })
    }

    /// Records a successful retained publish for `room`.
    pub fn mark_published(&mut self, room: RoomId, signature: StateSignature) {
        let track = self.tracks.entry(room).or_default();
        track.last = Some(signature);
        track.force_pending = false;
    }

    pub fn last_published(&self, room: RoomId) -> Option<&StateSignature> {
        self.tracks.get(&room).and_then(|track| track.last.as_ref())
    }
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, Duration};
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::{
        config::RuntimeConfig,
        events::EventKind,
        types::{CycleReason, CycleResult, CycleStatus, Mode, Profile},
    };

    fn at(secs: i64) -> Timestamp {
        let base = DateTime::parse_from_rfc3339("2026-01-05T08:00:00+07:00").unwrap();
        base + Duration::seconds(secs)
    }

    fn bridge() -> (StateBridge, Arc<RoomRegistry>) {
        let registry = Arc::new(RoomRegistry::new(&RuntimeConfig::default(), at(0)));
        (StateBridge::new(Arc::clone(&registry)), registry)
    }

    /// Polls like the host loop does, acknowledging every state publish.
    fn poll_and_publish(bridge: &mut StateBridge, room: RoomId, now: Timestamp) -> RoomPoll {
        let poll = bridge.poll_room(room, now).unwrap();
        if let Some(state) = &poll.state {
            bridge.mark_published(room, state.signature.clone());
        }
        poll
    }

    #[test]
    fn unchanged_state_publishes_once_but_telemetry_every_poll() {
        let (mut bridge, _) = bridge();
        let room = RoomId(1);

        let polls: Vec<_> = (0..5)
            .map(|n| poll_and_publish(&mut bridge, room, at(n)))
            .collect();

        let state_publishes = polls.iter().filter(|poll| poll.state.is_some()).count();
        assert_eq!(state_publishes, 1);
        assert!(polls[0].state.is_some());
        assert_eq!(polls.len(), 5);
        assert_eq!(polls[4].telemetry.ts, at(4));
    }

    #[test]
    fn profile_update_forces_publish_with_same_signature() {
        let (mut bridge, registry) = bridge();
        let room = RoomId(1);
        poll_and_publish(&mut bridge, room, at(0));

        registry
            .set_profile(
                room,
                Profile {
                    setpoint_c: 60.0,
                    duration_s: 60,
                },
                at(1),
            )
            .unwrap();

        let poll = poll_and_publish(&mut bridge, room, at(1));
        assert_eq!(poll.events.len(), 1);
        let state = poll.state.unwrap();
        assert_eq!(Some(&state.signature), bridge.last_published(room));

        assert!(poll_and_publish(&mut bridge, room, at(2)).state.is_none());
    }

    #[test]
    fn forced_publish_survives_failed_delivery() {
        let (mut bridge, registry) = bridge();
        let room = RoomId(2);
        poll_and_publish(&mut bridge, room, at(0));

        registry
            .set_profile(room, Profile::default(), at(1))
            .unwrap();

        // Delivery fails: nothing is marked.
        assert!(bridge.poll_room(room, at(1)).unwrap().state.is_some());

        let retry = bridge.poll_room(room, at(2)).unwrap();
        assert!(retry.events.is_empty());
        assert!(retry.state.is_some());
    }

    #[test]
    fn cycle_runs_to_completion_with_retained_state() {
        let (mut bridge, registry) = bridge();
        let room = RoomId(1);
        poll_and_publish(&mut bridge, room, at(0));

        registry
            .start(
                room,
                "abc12345",
                Some(Profile {
                    setpoint_c: 50.0,
                    duration_s: 5,
                }),
                at(0),
            )
            .unwrap();

        let started = poll_and_publish(&mut bridge, room, at(0));
        let state = started.state.unwrap().payload;
        assert_eq!(state.mode, Mode::Running);
        assert_eq!(state.cmd_id.as_deref(), Some("abc12345"));

        for n in 1..=5 {
            registry.tick_all(at(n), 1.0);
        }

        let finished = poll_and_publish(&mut bridge, room, at(5));
        assert!(finished.events.iter().any(|event| matches!(
            event.kind,
            EventKind::CycleComplete {
                result: CycleResult::Success,
                reason: CycleReason::DurationReached,
                ..
            }
        )));

        let state = finished.state.unwrap().payload;
        assert_eq!(state.mode, Mode::Idle);
        assert!(!state.heater_on);
        assert_eq!(state.cycle.status, CycleStatus::Completed);
        assert_eq!(state.cycle.result, Some(CycleResult::Success));
        assert_eq!(state.cycle.reason, Some(CycleReason::DurationReached));

        assert!(poll_and_publish(&mut bridge, room, at(6)).state.is_none());
    }

    #[test]
    fn heater_switch_republishes_without_events() {
        let mut config = RuntimeConfig::default();
        config.control.min_on_s = 1.0;
        let registry = Arc::new(RoomRegistry::new(&config, at(0)));
        let mut bridge = StateBridge::new(Arc::clone(&registry));
        let room = RoomId(1);

        registry
            .start(
                room,
                "abc12345",
                Some(Profile {
                    setpoint_c: 30.0,
                    duration_s: 600,
                }),
                at(0),
            )
            .unwrap();
        poll_and_publish(&mut bridge, room, at(0));

        // Already at setpoint: the heater drops after the minimum on-time.
        registry.tick_all(at(1), 1.0);
        let poll = poll_and_publish(&mut bridge, room, at(1));

        assert!(poll.events.is_empty());
        let state = poll.state.unwrap().payload;
        assert_eq!(state.mode, Mode::Running);
        assert!(!state.heater_on);
    }

    #[test]
    fn unknown_room_is_an_error() {
        let (mut bridge, _) = bridge();
        assert_eq!(
            bridge.poll_room(RoomId(99), at(0)).unwrap_err(),
            RoomError::NotFound(RoomId(99))
        );
    }
}
