use std::{future::Future, time::Duration};

use rumqttc::{AsyncClient, ClientError, QoS};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use dryer_common::{
    ack_topic, parse_cmd_topic, state_topic, telemetry_topic, Ack, AckStatus, Clock,
    CommandGateway, CommandMessage, RoomId, RoomPoll, StateBridge, Timestamp,
};

pub const MAX_MQTT_PAYLOAD_BYTES: usize = 1024;
pub const QUEUE_FULL_DETAIL: &str = "command queue full";

#[derive(Debug, Error)]
pub enum PublishError {
    #[error("mqtt client error: {0}")]
    Client(#[from] ClientError),
    #[error("publish timed out after {0:?}")]
    Timeout(Duration),
    #[error("payload serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Outbound side of the bus. All publishes are QoS 1.
pub trait Publisher: Clone + Send + Sync + 'static {
    fn publish(
        &self,
        topic: String,
        retain: bool,
        payload: Vec<u8>,
    ) -> impl Future<Output = Result<(), PublishError>> + Send;
}

#[derive(Clone)]
pub struct MqttPublisher {
    client: AsyncClient,
    timeout: Duration,
}

impl MqttPublisher {
    pub fn new(client: AsyncClient, timeout: Duration) -> Self {
        Self { client, timeout }
    }
}

impl Publisher for MqttPublisher {
    fn publish(
        &self,
        topic: String,
        retain: bool,
        payload: Vec<u8>,
    ) -> impl Future<Output = Result<(), PublishError>> + Send {
        let client = self.client.clone();
        let timeout = self.timeout;
        async move {
            tokio::time::timeout(
                timeout,
                client.publish(topic, QoS::AtLeastOnce, retain, payload),
            )
            .await
            .map_err(|_| PublishError::Timeout(timeout))??;
            Ok(())
        }
    }
}

pub async fn publish_json<P: Publisher, T: Serialize>(
    publisher: &P,
    topic: String,
    retain: bool,
    payload: &T,
) -> Result<(), PublishError> {
    let body = serde_json::to_vec(payload)?;
    publisher.publish(topic, retain, body).await
}

/// Publishes one bridge poll: telemetry always, retained state when pending.
/// Returns whether a state publish went out.
pub async fn publish_room_poll<P: Publisher>(
    publisher: &P,
    bridge: &mut StateBridge,
    poll: RoomPoll,
) -> bool {
    let room = poll.room;

    if poll.dropped_events > 0 {
        warn!(
            "room{room}: {} events evicted before the bridge drained them",
            poll.dropped_events
        );
    }
    for event in &poll.events {
        info!("room{room}: {}", event.kind.name());
    }

    if let Err(err) = publish_json(publisher, telemetry_topic(room), false, &poll.telemetry).await
    {
        warn!("room{room} telemetry publish failed: {err}");
    }

    let Some(state) = poll.state else {
        return false;
    };

    match publish_json(publisher, state_topic(room), true, &state.payload).await {
        Ok(()) => {
            debug!(
                "room{room} state published: {}",
                state.payload.cycle.status.as_str()
            );
            bridge.mark_published(room, state.signature);
            true
        }
        Err(err) => {
            warn!("room{room} state publish failed: {err}");
            false
        }
    }
}

/// A command taken off the bus, waiting for the command worker.
#[derive(Debug, Clone, PartialEq)]
pub struct InboundCommand {
    pub room: RoomId,
    pub payload: Vec<u8>,
}

/// Filters an incoming publish down to a command the worker should apply.
pub fn route_incoming(topic: &str, payload: &[u8]) -> Option<InboundCommand> {
    let Some(room) = parse_cmd_topic(topic) else {
        debug!("ignoring publish on {topic}");
        return None;
    };

    if payload.len() > MAX_MQTT_PAYLOAD_BYTES {
        warn!(
            "dropping oversized MQTT payload on topic {} ({} bytes)",
            topic,
            payload.len()
        );
        return None;
    }

    Some(InboundCommand {
        room,
        payload: payload.to_vec(),
    })
}

/// Applies one command and publishes its ack. Undecodable payloads are logged
/// and dropped without an ack.
pub async fn handle_command<P: Publisher>(
    publisher: &P,
    gateway: &CommandGateway,
    clock: &Clock,
    command: InboundCommand,
) {
    let room = command.room;
    let ack = match gateway.handle_payload(room, &command.payload, clock.now()) {
        Ok(ack) => ack,
        Err(err) => {
            warn!("room{room} command dropped: {err}");
            return;
        }
    };

    info!(
        "room{room} cmd {} -> {:?} ({})",
        ack.cmd_id,
        ack.status,
        ack.detail.as_deref().unwrap_or_default()
    );

    if let Err(err) = publish_json(publisher, ack_topic(room), false, &ack).await {
        warn!("room{room} ack publish failed for {}: {err}", ack.cmd_id);
    }
}

/// Rejection for a command the worker never received. Payloads that do not
/// decode get no ack, the same as in [`handle_command`].
pub fn overflow_ack(command: &InboundCommand, now: Timestamp) -> Option<Ack> {
    let message = serde_json::from_slice::<CommandMessage>(&command.payload).ok()?;
    Some(Ack {
        ts: now,
        cmd_id: message.cmd_id.unwrap_or_default(),
        status: AckStatus::Rejected,
        detail: Some(QUEUE_FULL_DETAIL.to_string()),
    })
}
