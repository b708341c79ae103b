pub mod bridge;
pub mod clock;
pub mod config;
pub mod cycle;
pub mod error;
pub mod events;
pub mod gateway;
pub mod model;
pub mod registry;
pub mod topics;
pub mod types;

pub use bridge::{PendingState, RoomPoll, StateBridge};
pub use clock::Clock;
pub use config::{
    BridgeConfig, ControlConfig, ModelConfig, NetworkConfig, RuntimeConfig, SimulationConfig,
};
pub use cycle::CycleController;
pub use error::{CommandError, RoomError, ValidationError};
pub use events::{Drained, Event, EventKind, EventLog};
pub use gateway::{CommandGateway, CommandKind, CommandMessage};
pub use model::PhysicalModel;
pub use registry::{RoomRegistry, RoomSnapshot};
pub use topics::*;
pub use types::{
    Ack, AckStatus, CycleReason, CycleResult, CycleState, CycleStatus, CycleView, Mode,
    ProcessState, Profile, RegisterMap, RoomId, StatePayload, StateSignature, TelemetryPayload,
    Timestamp,
};
