use std::{
    io::ErrorKind,
    net::SocketAddr,
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use anyhow::{bail, Context};
use rumqttc::{AsyncClient, Event, EventLoop, Incoming, MqttOptions, QoS};
use tokio::{
    net::TcpListener,
    sync::mpsc::{self, error::TrySendError},
    time::{Interval, MissedTickBehavior},
};
use tracing::{info, warn};

use dryer_common::{
    ack_topic, Ack, Clock, CommandGateway, RoomId, RoomRegistry, RuntimeConfig, StateBridge,
    Timestamp, TOPIC_CMD_WILDCARD,
};

use crate::{
    api::{self, AppState},
    bus::{self, InboundCommand, MqttPublisher, Publisher},
};

const COMMAND_QUEUE_DEPTH: usize = 64;
const MQTT_KEEP_ALIVE: Duration = Duration::from_secs(30);

pub async fn run() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config_path = std::env::var("DRYER_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("./dryer.json"));
    let mut config = load_runtime_config(&config_path)
        .await
        .with_context(|| format!("failed to load config from {}", config_path.display()))?;
    apply_env_overrides(&mut config, |key| std::env::var(key).ok());
    config.sanitize();

    let clock = Clock::from_name(&config.timezone);
    let registry = Arc::new(RoomRegistry::new(&config, clock.now()));

    let network = &config.network;
    let mut mqtt_options = MqttOptions::new(
        network.client_id.clone(),
        network.mqtt_host.clone(),
        network.mqtt_port,
    );
    mqtt_options.set_keep_alive(MQTT_KEEP_ALIVE);
    if !network.mqtt_user.is_empty() {
        mqtt_options.set_credentials(network.mqtt_user.clone(), network.mqtt_pass.clone());
    }

    let (mqtt, mut eventloop) = AsyncClient::new(mqtt_options, 64);
    let connect_timeout = Duration::from_millis(network.connect_timeout_ms);
    wait_for_connack(&mut eventloop, connect_timeout)
        .await
        .with_context(|| {
            format!(
                "mqtt broker {}:{} unreachable",
                network.mqtt_host, network.mqtt_port
            )
        })?;
    mqtt.subscribe(TOPIC_CMD_WILDCARD, QoS::AtLeastOnce)
        .await
        .context("failed to subscribe to command topics")?;
    info!(
        "mqtt connected to {}:{}",
        network.mqtt_host, network.mqtt_port
    );

    let publisher = MqttPublisher::new(
        mqtt.clone(),
        Duration::from_millis(config.bridge.publish_timeout_ms),
    );
    let (command_tx, command_rx) = mpsc::channel(COMMAND_QUEUE_DEPTH);

    spawn_mqtt_loop(mqtt, eventloop, command_tx, clock);
    spawn_command_worker(
        command_rx,
        CommandGateway::new(Arc::clone(&registry)),
        publisher.clone(),
        clock,
    );
    spawn_tick_loop(
        Arc::clone(&registry),
        clock,
        Duration::from_millis(config.simulation.tick_interval_ms),
        config.simulation.dt_s,
    );
    spawn_bridge_loop(
        StateBridge::new(Arc::clone(&registry)),
        publisher,
        clock,
        Duration::from_millis(config.bridge.poll_interval_ms),
    );

    let app = api::router(AppState {
        registry: Arc::clone(&registry),
        clock,
    });

    let addr = SocketAddr::from(([0, 0, 0, 0], config.network.http_port));
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind room api at {addr}"))?;

    info!(
        "dryer controller serving {} rooms on http://{addr} (tz {})",
        registry.room_count(),
        clock.timezone().name()
    );
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    info!("dryer controller stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!("failed to listen for shutdown signal: {err}");
        std::future::pending::<()>().await;
    }
}

async fn load_runtime_config(path: &Path) -> anyhow::Result<RuntimeConfig> {
    match tokio::fs::read(path).await {
        Ok(raw) => Ok(serde_json::from_slice::<RuntimeConfig>(&raw)?),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(RuntimeConfig::default()),
        Err(err) => Err(err.into()),
    }
}

fn apply_env_overrides(config: &mut RuntimeConfig, lookup: impl Fn(&str) -> Option<String>) {
    let network = &mut config.network;
    if let Some(host) = lookup("MQTT_HOST") {
        network.mqtt_host = host;
    }
    if let Some(port) = lookup("MQTT_PORT").and_then(|value| value.parse::<u16>().ok()) {
        network.mqtt_port = port;
    }
    if let Some(user) = lookup("MQTT_USER") {
        network.mqtt_user = user;
    }
    if let Some(pass) = lookup("MQTT_PASS") {
        network.mqtt_pass = pass;
    }
    if let Some(port) = lookup("DRYER_HTTP_PORT").and_then(|value| value.parse::<u16>().ok()) {
        network.http_port = port;
    }
    if let Some(secs) = lookup("POLL_INTERVAL_SEC")
        .and_then(|value| value.parse::<f64>().ok())
        .filter(|secs| secs.is_finite() && *secs > 0.0)
    {
        config.bridge.poll_interval_ms = (secs * 1_000.0).round() as u64;
    }
    if let Some(timezone) = lookup("DRYER_TIMEZONE") {
        config.timezone = timezone;
    }
}

async fn wait_for_connack(eventloop: &mut EventLoop, timeout: Duration) -> anyhow::Result<()> {
    let connect = async {
        loop {
            match eventloop.poll().await {
                Ok(Event::Incoming(Incoming::ConnAck(_))) => return Ok(()),
                Ok(_) => {}
                Err(err) => bail!("mqtt connection failed: {err}"),
            }
        }
    };

    tokio::time::timeout(timeout, connect)
        .await
        .with_context(|| format!("no ConnAck within {timeout:?}"))?
}

fn spawn_mqtt_loop(
    mqtt: AsyncClient,
    mut eventloop: EventLoop,
    commands: mpsc::Sender<InboundCommand>,
    clock: Clock,
) {
    tokio::spawn(async move {
        loop {
            match eventloop.poll().await {
                Ok(Event::Incoming(Incoming::Publish(message))) => {
                    let Some(command) = bus::route_incoming(&message.topic, &message.payload)
                    else {
                        continue;
                    };
                    if let Some((room, ack)) = enqueue_command(&commands, command, clock.now()) {
                        publish_overflow_ack(&mqtt, room, &ack);
                    }
                }
                Ok(Event::Incoming(Incoming::ConnAck(_))) => {
                    info!("mqtt reconnected");
                    if let Err(err) = mqtt.try_subscribe(TOPIC_CMD_WILDCARD, QoS::AtLeastOnce) {
                        warn!("mqtt resubscribe failed: {err}");
                    }
                }
                Ok(_) => {}
                Err(err) => {
                    warn!("mqtt poll error: {err}");
                    tokio::time::sleep(Duration::from_secs(2)).await;
                }
            }
        }
    });
}

/// Hands a command to the worker without blocking the event loop. A full queue
/// answers the command on the spot with a rejected ack for the caller to send.
fn enqueue_command(
    commands: &mpsc::Sender<InboundCommand>,
    command: InboundCommand,
    now: Timestamp,
) -> Option<(RoomId, Ack)> {
    match commands.try_send(command) {
        Ok(()) => None,
        Err(TrySendError::Full(command)) => {
            let room = command.room;
            let ack = bus::overflow_ack(&command, now);
            if ack.is_none() {
                warn!("room{room} command queue full, undecodable command dropped");
            }
            ack.map(|ack| (room, ack))
        }
        Err(TrySendError::Closed(command)) => {
            warn!("room{} command dropped: worker stopped", command.room);
            None
        }
    }
}

fn publish_overflow_ack(mqtt: &AsyncClient, room: RoomId, ack: &Ack) {
    warn!("room{room} command queue full, rejecting {}", ack.cmd_id);
    let body = match serde_json::to_vec(ack) {
        Ok(body) => body,
        Err(err) => {
            warn!("room{room} ack encode failed for {}: {err}", ack.cmd_id);
            return;
        }
    };
    if let Err(err) = mqtt.try_publish(ack_topic(room), QoS::AtLeastOnce, false, body) {
        warn!("room{room} ack publish failed for {}: {err}", ack.cmd_id);
    }
}

fn spawn_command_worker<P: Publisher>(
    mut commands: mpsc::Receiver<InboundCommand>,
    gateway: CommandGateway,
    publisher: P,
    clock: Clock,
) {
    tokio::spawn(async move {
        while let Some(command) = commands.recv().await {
            bus::handle_command(&publisher, &gateway, &clock, command).await;
        }
        warn!("command worker stopped: queue closed");
    });
}

/// Fixed-period timer shared by the tick and bridge loops. Ticks missed during
/// a stall are skipped, not replayed in a burst.
fn periodic(period: Duration) -> Interval {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval
}

fn spawn_tick_loop(registry: Arc<RoomRegistry>, clock: Clock, period: Duration, dt_s: f64) {
    tokio::spawn(async move {
        let mut interval = periodic(period);
        loop {
            interval.tick().await;
            registry.tick_all(clock.now(), dt_s);
        }
    });
}

fn spawn_bridge_loop<P: Publisher>(
    mut bridge: StateBridge,
    publisher: P,
    clock: Clock,
    period: Duration,
) {
    tokio::spawn(async move {
        let mut interval = periodic(period);
        loop {
            interval.tick().await;
            bridge_pass(&mut bridge, &publisher, &clock).await;
        }
    });
}

/// One bridge interval over every room. A failing room is logged and skipped.
async fn bridge_pass<P: Publisher>(bridge: &mut StateBridge, publisher: &P, clock: &Clock) {
    for room in bridge.room_ids() {
        match bridge.poll_room(room, clock.now()) {
            Ok(poll) => {
                bus::publish_room_poll(publisher, bridge, poll).await;
            }
            Err(err) => warn!("room{room} poll error: {err}"),
        }
    }
}
