use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tower_http::trace::TraceLayer;
use tracing::info;

use dryer_common::{Clock, CycleView, Mode, Profile, RoomError, RoomId, RoomRegistry};

#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<RoomRegistry>,
    pub clock: Clock,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

#[derive(Debug, Serialize)]
struct RoomSummary {
    room: RoomId,
    mode: Mode,
    dryer_on: bool,
    cycle: CycleView,
}

#[derive(Debug, Deserialize)]
struct StartRequest {
    cmd_id: String,
    #[serde(default)]
    profile: Option<Profile>,
}

#[derive(Debug, Deserialize)]
struct StopRequest {
    cmd_id: String,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(handle_healthz))
        .route("/rooms", get(handle_list_rooms))
        .route("/rooms/{id}/telemetry", get(handle_get_telemetry))
        .route("/rooms/{id}/state", get(handle_get_state))
        .route("/rooms/{id}/events", get(handle_get_events))
        .route("/rooms/{id}/profile", put(handle_put_profile))
        .route("/rooms/{id}/cmd/start", post(handle_start))
        .route("/rooms/{id}/cmd/stop", post(handle_stop))
        .route("/rooms/{id}/memory", get(handle_get_memory))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn handle_healthz() -> impl IntoResponse {
    Json(json!({ "ok": true }))
}

async fn handle_list_rooms(State(state): State<AppState>) -> Response {
    let now = state.clock.now();
    let mut rooms = Vec::with_capacity(state.registry.room_count());
    for room in state.registry.room_ids() {
        match state.registry.state(room, now) {
            Ok(snapshot) => rooms.push(RoomSummary {
                room,
                mode: snapshot.mode,
                dryer_on: snapshot.heater_on,
                cycle: snapshot.cycle,
            }),
            Err(err) => return room_error_response(err),
        }
    }
    Json(rooms).into_response()
}

async fn handle_get_telemetry(State(state): State<AppState>, Path(id): Path<u16>) -> Response {
    match state.registry.telemetry(RoomId(id), state.clock.now()) {
        Ok(telemetry) => Json(telemetry).into_response(),
        Err(err) => room_error_response(err),
    }
}

async fn handle_get_state(State(state): State<AppState>, Path(id): Path<u16>) -> Response {
    match state.registry.state(RoomId(id), state.clock.now()) {
        Ok(snapshot) => Json(snapshot).into_response(),
        Err(err) => room_error_response(err),
    }
}

/// Read-only view of undelivered events; the bridge remains the only drainer.
async fn handle_get_events(State(state): State<AppState>, Path(id): Path<u16>) -> Response {
    match state.registry.pending_events(RoomId(id)) {
        Ok(events) => Json(json!({ "events": events })).into_response(),
        Err(err) => room_error_response(err),
    }
}

async fn handle_put_profile(
    State(state): State<AppState>,
    Path(id): Path<u16>,
    body: Result<Json<Profile>, JsonRejection>,
) -> Response {
    let Json(profile) = match body {
        Ok(body) => body,
        Err(rejection) => return rejection_response(rejection),
    };
    let room = RoomId(id);
    let now = state.clock.now();
    if let Err(err) = state.registry.set_profile(room, profile, now) {
        return room_error_response(err);
    }

    info!(
        "room{room} profile set via http: {}C for {}s",
        profile.setpoint_c, profile.duration_s
    );
    Json(json!({ "ok": true, "ts": now, "room": room, "profile": profile })).into_response()
}

async fn handle_start(
    State(state): State<AppState>,
    Path(id): Path<u16>,
    body: Result<Json<StartRequest>, JsonRejection>,
) -> Response {
    let Json(request) = match body {
        Ok(body) => body,
        Err(rejection) => return rejection_response(rejection),
    };
    let room = RoomId(id);
    let now = state.clock.now();
    if let Err(err) = state
        .registry
        .start(room, &request.cmd_id, request.profile, now)
    {
        return room_error_response(err);
    }

    info!("room{room} cycle started via http: {}", request.cmd_id);
    Json(json!({ "ok": true, "ts": now, "room": room, "cmd_id": request.cmd_id })).into_response()
}

async fn handle_stop(
    State(state): State<AppState>,
    Path(id): Path<u16>,
    body: Result<Json<StopRequest>, JsonRejection>,
) -> Response {
    let Json(request) = match body {
        Ok(body) => body,
        Err(rejection) => return rejection_response(rejection),
    };
    let room = RoomId(id);
    let now = state.clock.now();
    if let Err(err) = state.registry.stop(room, &request.cmd_id, now) {
        return room_error_response(err);
    }

    info!("room{room} cycle stopped via http: {}", request.cmd_id);
    Json(json!({ "ok": true, "ts": now, "room": room, "cmd_id": request.cmd_id })).into_response()
}

async fn handle_get_memory(State(state): State<AppState>, Path(id): Path<u16>) -> Response {
    match state.registry.registers(RoomId(id), state.clock.now()) {
        Ok(registers) => Json(registers).into_response(),
        Err(err) => room_error_response(err),
    }
}

fn room_error_response(err: RoomError) -> Response {
    let status = match &err {
        RoomError::NotFound(_) => StatusCode::NOT_FOUND,
        RoomError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
        RoomError::CycleActive | RoomError::NoActiveCycle => StatusCode::CONFLICT,
    };
    error_response(status, &err.to_string())
}

fn rejection_response(rejection: JsonRejection) -> Response {
    error_response(StatusCode::UNPROCESSABLE_ENTITY, &rejection.body_text())
}

fn error_response(status: StatusCode, message: &str) -> Response {
    (
        status,
        Json(ErrorBody {
            error: message.to_string(),
        }),
    )
        .into_response()
}
