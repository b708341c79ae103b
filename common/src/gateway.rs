use std::sync::Arc;

use serde::Deserialize;
use serde_json::Value;

use crate::{
    error::{CommandError, RoomError, ValidationError},
    registry::RoomRegistry,
    types::{Ack, AckStatus, Profile, RoomId, Timestamp},
};

/// Inbound command as it arrives on `dryer/room{ID}/cmd`. Fields are loose so
/// that a well-formed JSON object with missing or bad fields still gets a
/// rejected ack instead of being dropped.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CommandMessage {
    #[serde(default)]
    pub cmd_id: Option<String>,
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub profile: Option<Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandKind {
    SetProfile,
    Start,
    Stop,
}

impl CommandKind {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "set_profile" => Some(Self::SetProfile),
            "start" => Some(Self::Start),
            "stop" => Some(Self::Stop),
            _ => None,
        }
    }
}

/// Applies remote commands to the room registry. Every well-formed command
/// yields exactly one [`Ack`].
#[derive(Debug, Clone)]
pub struct CommandGateway {
    registry: Arc<RoomRegistry>,
}

impl CommandGateway {
    pub fn new(registry: Arc<RoomRegistry>) -> Self {
        Self { registry }
    }

    pub fn handle_payload(
        &self,
        room: RoomId,
        payload: &[u8],
        now: Timestamp,
    ) -> Result<Ack, CommandError> {
        let command = serde_json::from_slice::<CommandMessage>(payload)?;
        Ok(self.handle(room, command, now))
    }

    pub fn handle(&self, room: RoomId, command: CommandMessage, now: Timestamp) -> Ack {
        let cmd_id = command.cmd_id.filter(|id| !id.is_empty());
        let kind = command.kind.filter(|kind| !kind.is_empty());

        let (Some(cmd_id), Some(kind)) = (cmd_id.clone(), kind) else {
            return ack(
                now,
                cmd_id.unwrap_or_default(),
                AckStatus::Rejected,
                "missing cmd_id or type".to_string(),
            );
        };

        let Some(kind_parsed) = CommandKind::parse(&kind) else {
            return ack(
                now,
                cmd_id,
                AckStatus::Rejected,
                format!("unknown type={kind}"),
            );
        };

        match self.apply(room, kind_parsed, &cmd_id, command.profile, now) {
            Ok((status, detail)) => ack(now, cmd_id, status, detail.to_string()),
            Err(err) => ack(now, cmd_id, AckStatus::Rejected, err.to_string()),
        }
    }

    fn apply(
        &self,
        room: RoomId,
        kind: CommandKind,
        cmd_id: &str,
        profile: Option<Value>,
        now: Timestamp,
    ) -> Result<(AckStatus, &'static str), RoomError> {
        match kind {
            CommandKind::SetProfile => {
                let profile = parse_profile(profile)?.ok_or(ValidationError::MissingProfile)?;
                self.registry.set_profile(room, profile, now)?;
                Ok((AckStatus::Done, "profile updated"))
            }
            CommandKind::Start => {
                let profile = parse_profile(profile.filter(|value| !is_empty_object(value)))?;
                self.registry.start(room, cmd_id, profile, now)?;
                Ok((AckStatus::Accepted, "start issued"))
            }
            CommandKind::Stop => {
                self.registry.stop(room, cmd_id, now)?;
                Ok((AckStatus::Accepted, "stop issued"))
            }
        }
    }
}

fn parse_profile(value: Option<Value>) -> Result<Option<Profile>, ValidationError> {
    value
        .map(|value| {
            serde_json::from_value::<Profile>(value)
                .map_err(|err| ValidationError::InvalidProfile(err.to_string()))
        })
        .transpose()
}

fn is_empty_object(value: &Value) -> bool {
    value.as_object().is_some_and(|map| map.is_empty())
}

fn ack(ts: Timestamp, cmd_id: String, status: AckStatus, detail: String) -> Ack {
    Ack {
        ts,
        cmd_id,
        status,
        detail: Some(detail),
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
        types::{CycleStatus, Profile},
    };

    fn at(secs: i64) -> Timestamp {
        let base = DateTime::parse_from_rfc3339("2026-01-05T08:00:00+07:00").unwrap();
        base + Duration::seconds(secs)
    }

    fn gateway() -> (CommandGateway, Arc<RoomRegistry>) {
        let registry = Arc::new(RoomRegistry::new(&RuntimeConfig::default(), at(0)));
        (CommandGateway::new(Arc::clone(&registry)), registry)
    }

    fn send(gateway: &CommandGateway, room: u16, json: &str) -> Ack {
        gateway
            .handle_payload(RoomId(room), json.as_bytes(), at(1))
            .unwrap()
    }

    #[test]
    fn set_profile_is_done() {
        let (gateway, registry) = gateway();
        let ack = send(
            &gateway,
            1,
            r#"{"cmd_id":"prof0001","type":"set_profile","profile":{"setpoint_c":65,"duration_s":600}}"#,
        );

        assert_eq!(
            ack,
            Ack {
                ts: at(1),
                cmd_id: "prof0001".to_string(),
                status: AckStatus::Done,
                detail: Some("profile updated".to_string()),
            }
        );
        assert_eq!(
            registry.profile(RoomId(1)).unwrap(),
            Profile {
                setpoint_c: 65.0,
                duration_s: 600,
            }
        );
    }

    #[test]
    fn out_of_range_profile_is_rejected_without_change() {
        let (gateway, registry) = gateway();
        let ack = send(
            &gateway,
            1,
            r#"{"cmd_id":"prof0001","type":"set_profile","profile":{"setpoint_c":150,"duration_s":10}}"#,
        );

        assert_eq!(ack.status, AckStatus::Rejected);
        assert!(ack.detail.unwrap().contains("[0, 120]"));
        assert_eq!(registry.profile(RoomId(1)).unwrap(), Profile::default());
        assert!(registry.pending_events(RoomId(1)).unwrap().is_empty());
    }

    #[test]
    fn set_profile_without_profile_is_rejected() {
        let (gateway, _) = gateway();
        let ack = send(&gateway, 1, r#"{"cmd_id":"prof0001","type":"set_profile"}"#);
        assert_eq!(ack.status, AckStatus::Rejected);
        assert_eq!(ack.detail.as_deref(), Some("missing profile"));

        let ack = send(
            &gateway,
            1,
            r#"{"cmd_id":"prof0001","type":"set_profile","profile":{}}"#,
        );
        assert_eq!(ack.status, AckStatus::Rejected);
        assert!(ack.detail.unwrap().starts_with("invalid profile"));
    }

    #[test]
    fn start_is_accepted_and_applies_profile_first() {
        let (gateway, registry) = gateway();
        let ack = send(
            &gateway,
            2,
            r#"{"cmd_id":"abc12345","type":"start","profile":{"setpoint_c":50,"duration_s":5}}"#,
        );

        assert_eq!(ack.status, AckStatus::Accepted);
        assert_eq!(ack.detail.as_deref(), Some("start issued"));

        let state = registry.state(RoomId(2), at(1)).unwrap();
        assert_eq!(state.cycle.status, CycleStatus::Running);
        assert_eq!(state.cmd_id.as_deref(), Some("abc12345"));

        let names: Vec<_> = registry
            .pending_events(RoomId(2))
            .unwrap()
            .iter()
            .map(|event| event.kind.name())
            .collect();
        assert_eq!(names, vec!["profile_updated", "cycle_started"]);
    }

    #[test]
    fn start_with_empty_profile_keeps_current_one() {
        let (gateway, registry) = gateway();
        let ack = send(
            &gateway,
            1,
            r#"{"cmd_id":"abc12345","type":"start","profile":{}}"#,
        );

        assert_eq!(ack.status, AckStatus::Accepted);
        let events = registry.pending_events(RoomId(1)).unwrap();
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0].kind, EventKind::CycleStarted { .. }));
    }

    #[test]
    fn stop_is_accepted_while_running() {
        let (gateway, registry) = gateway();
        send(&gateway, 3, r#"{"cmd_id":"abc12345","type":"start"}"#);
        let ack = send(&gateway, 3, r#"{"cmd_id":"stop0001","type":"stop"}"#);

        assert_eq!(ack.status, AckStatus::Accepted);
        assert_eq!(ack.detail.as_deref(), Some("stop issued"));
        assert_eq!(
            registry.state(RoomId(3), at(2)).unwrap().cycle.status,
            CycleStatus::Stopped
        );
    }

    #[test]
    fn stop_while_idle_is_rejected() {
        let (gateway, _) = gateway();
        let ack = send(&gateway, 3, r#"{"cmd_id":"stop0001","type":"stop"}"#);
        assert_eq!(ack.status, AckStatus::Rejected);
        assert_eq!(ack.detail.as_deref(), Some("no cycle is running"));
    }

    #[test]
    fn unknown_type_is_rejected_by_name() {
        let (gateway, registry) = gateway();
        let ack = send(&gateway, 1, r#"{"cmd_id":"abc12345","type":"bogus"}"#);

        assert_eq!(ack.status, AckStatus::Rejected);
        assert!(ack.detail.unwrap().contains("bogus"));
        assert!(registry.pending_events(RoomId(1)).unwrap().is_empty());
    }

    #[test]
    fn missing_fields_are_rejected() {
        let (gateway, _) = gateway();

        let ack = send(&gateway, 1, r#"{"type":"start"}"#);
        assert_eq!(ack.status, AckStatus::Rejected);
        assert_eq!(ack.cmd_id, "");
        assert_eq!(ack.detail.as_deref(), Some("missing cmd_id or type"));

        let ack = send(&gateway, 1, r#"{"cmd_id":"abc12345"}"#);
        assert_eq!(ack.cmd_id, "abc12345");
        assert_eq!(ack.detail.as_deref(), Some("missing cmd_id or type"));

        let ack = send(&gateway, 1, r#"{"cmd_id":"","type":"start"}"#);
        assert_eq!(ack.detail.as_deref(), Some("missing cmd_id or type"));
    }

    #[test]
    fn unknown_room_is_rejected() {
        let (gateway, _) = gateway();
        let ack = send(&gateway, 7, r#"{"cmd_id":"abc12345","type":"start"}"#);
        assert_eq!(ack.status, AckStatus::Rejected);
        assert_eq!(ack.detail.as_deref(), Some("room 7 not found"));
    }

    #[test]
    fn short_cmd_id_is_rejected_on_start() {
        let (gateway, registry) = gateway();
        let ack = send(&gateway, 1, r#"{"cmd_id":"abc","type":"start"}"#);
        assert_eq!(ack.status, AckStatus::Rejected);
        assert_eq!(
            registry.state(RoomId(1), at(1)).unwrap().cycle.status,
            CycleStatus::Idle
        );
    }

    #[test]
    fn unparseable_payload_is_malformed() {
        let (gateway, _) = gateway();
        for payload in ["not json", "[1,2]", "null", r#"{"cmd_id": 5, "type": "start"}"#] {
            let result = gateway.handle_payload(RoomId(1), payload.as_bytes(), at(1));
            assert!(
                matches!(result, Err(CommandError::Malformed(_))),
                "{payload}"
            );
        }
    }
}
