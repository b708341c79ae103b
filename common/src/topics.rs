use crate::types::RoomId;

pub const TOPIC_ROOT: &str = "dryer";
pub const TOPIC_CMD_WILDCARD: &str = "dryer/+/cmd";

pub const KIND_CMD: &str = "cmd";
pub const KIND_ACK: &str = "ack";
pub const KIND_TELEMETRY: &str = "telemetry";
pub const KIND_STATE: &str = "state";

pub fn room_topic(room: RoomId, kind: &str) -> String {
    format!("{TOPIC_ROOT}/room{room}/{kind}")
}

pub fn ack_topic(room: RoomId) -> String {
    room_topic(room, KIND_ACK)
}

pub fn telemetry_topic(room: RoomId) -> String {
    room_topic(room, KIND_TELEMETRY)
}

pub fn state_topic(room: RoomId) -> String {
    room_topic(room, KIND_STATE)
}

/// Extracts the room from `dryer/room{ID}/cmd`.
pub fn parse_cmd_topic(topic: &str) -> Option<RoomId> {
    let mut parts = topic.split('/');
    let root = parts.next()?;
    let room = parts.next()?;
    let kind = parts.next()?;
    if root != TOPIC_ROOT || kind != KIND_CMD || parts.next().is_some() {
        return None;
    }

    let digits = room.strip_prefix("room")?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse::<u16>().ok().map(RoomId)
}
