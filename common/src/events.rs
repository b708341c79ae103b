use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::types::{CycleReason, CycleResult, Profile, Timestamp};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum EventKind {
    ProfileUpdated {
        profile: Profile,
    },
    CycleStarted {
        cmd_id: String,
        started_at: Timestamp,
        ends_at: Timestamp,
        profile: Profile,
    },
    CycleStopped {
        cmd_id: Option<String>,
        stopped_by: Option<String>,
        result: CycleResult,
        reason: CycleReason,
    },
    CycleComplete {
        cmd_id: Option<String>,
        result: CycleResult,
        reason: CycleReason,
    },
}

impl EventKind {
    pub fn name(&self) -> &'static str {
        match self {
            Self::ProfileUpdated { .. } => "profile_updated",
            Self::CycleStarted { .. } => "cycle_started",
            Self::CycleStopped { .. } => "cycle_stopped",
            Self::CycleComplete { .. } => "cycle_complete",
        }
    }

    /// Whether this event must produce a retained state publish even if the
    /// state signature did not change.
    pub fn forces_state_publish(&self) -> bool {
        matches!(
            self,
            Self::ProfileUpdated { .. }
                | Self::CycleStarted { .. }
                | Self::CycleStopped { .. }
                | Self::CycleComplete { .. }
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub ts: Timestamp,
    #[serde(flatten)]
    pub kind: EventKind,
}

/// Result of draining an [`EventLog`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Drained {
    pub events: Vec<Event>,
    /// Events evicted for capacity since the previous drain.
    pub dropped: u64,
}

/// One-shot FIFO of room events with a single consumer.
///
/// Growth is bounded by `capacity`; when an active poller keeps up the bound
/// is never reached. On overflow the oldest event is evicted and counted.
#[derive(Debug, Clone)]
pub struct EventLog {
    queue: VecDeque<Event>,
    capacity: usize,
    dropped: u64,
}

impl EventLog {
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            queue: VecDeque::with_capacity(capacity.min(64)),
            capacity,
            dropped: 0,
        }
    }

    pub fn append(&mut self, event: Event) {
        if self.queue.len() >= self.capacity {
            self.queue.pop_front();
            self.dropped = self.dropped.saturating_add(1);
        }
        self.queue.push_back(event);
    }

    pub fn drain(&mut self) -> Drained {
        Drained {
            events: self.queue.drain(..).collect(),
            dropped: std::mem::take(&mut self.dropped),
        }
    }

    pub fn pending(&self) -> impl Iterator<Item = &Event> {
        self.queue.iter()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use chrono::DateTime;
    use pretty_assertions::assert_eq;

    use super::*;

    fn ts(secs: i64) -> Timestamp {
        DateTime::from_timestamp(1_767_600_000 + secs, 0)
            .unwrap()
            .fixed_offset()
    }

    fn profile_event(secs: i64, setpoint_c: f64) -> Event {
        Event {
            ts: ts(secs),
            kind: EventKind::ProfileUpdated {
                profile: Profile {
                    setpoint_c,
                    duration_s: 60,
                },
            },
        }
    }

    #[test]
    fn drain_returns_in_order_and_clears() {
        let mut log = EventLog::with_capacity(8);
        log.append(profile_event(0, 40.0));
        log.append(profile_event(1, 45.0));

        let drained = log.drain();
        assert_eq!(
            drained.events,
            vec![profile_event(0, 40.0), profile_event(1, 45.0)]
        );
        assert_eq!(drained.dropped, 0);
        assert!(log.is_empty());
        assert!(log.drain().events.is_empty());
    }

    #[test]
    fn overflow_evicts_oldest_and_counts() {
        let mut log = EventLog::with_capacity(2);
        log.append(profile_event(0, 40.0));
        log.append(profile_event(1, 41.0));
        log.append(profile_event(2, 42.0));

        assert_eq!(log.len(), 2);
        let drained = log.drain();
        assert_eq!(drained.dropped, 1);
        assert_eq!(drained.events[0], profile_event(1, 41.0));

        assert_eq!(log.drain().dropped, 0);
    }

    #[test]
    fn pending_does_not_consume() {
        let mut log = EventLog::with_capacity(4);
        log.append(profile_event(0, 40.0));
        assert_eq!(log.pending().count(), 1);
        assert_eq!(log.drain().events.len(), 1);
    }

    #[test]
    fn serializes_with_type_and_payload() {
        let event = Event {
            ts: ts(0),
            kind: EventKind::CycleComplete {
                cmd_id: Some("abc12345".to_string()),
                result: CycleResult::Success,
                reason: CycleReason::DurationReached,
            },
        };

        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], "cycle_complete");
        assert_eq!(value["payload"]["result"], "success");
        assert_eq!(value["payload"]["reason"], "duration_reached");
        assert!(value["ts"].is_string());
    }
}
