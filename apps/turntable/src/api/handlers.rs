//! # API Endpoint Handlers
//!
//! Controller calls block (serial I/O, homing polls), so every handler that
//! touches the stage hops onto tokio's blocking pool.

use super::{
    AppState,
    error::ApiError,
    panel,
    types::{ActionResponse, HealthResponse, SpeedForm, StatusResponse, TurnsForm},
};
use axum::{
    Form, Json,
    extract::State,
    http::StatusCode,
    response::{Html, IntoResponse, Redirect, Response},
};
use turntable_core::{CommandOutcome, StageController, StageError};
use turntable_core::primitives::{COARSE_STEP, FINE_STEP};

/// Run a controller operation on the blocking pool.
async fn run_blocking<T, F>(state: &AppState, op: F) -> Result<T, ApiError>
where
    T: Send + 'static,
    F: FnOnce(&StageController) -> Result<T, StageError> + Send + 'static,
{
    let controller = state.controller.clone();
    tokio::task::spawn_blocking(move || op(&controller))
        .await
        .map_err(|e| ApiError::internal(format!("Controller task failed: {}", e)))?
        .map_err(ApiError::from)
}

/// Run a motion command and send the browser back to the panel.
async fn motion<F>(state: &AppState, action: &'static str, op: F) -> Response
where
    F: FnOnce(&StageController) -> Result<CommandOutcome, StageError> + Send + 'static,
{
    match run_blocking(state, op).await {
        Ok(outcome) => {
            tracing::debug!(action, ?outcome, "Control action handled");
            Redirect::to("/").into_response()
        }
        Err(e) => e.into_response(),
    }
}

// =============================================================================
// READ-ONLY HANDLERS
// =============================================================================

/// Health check endpoint.
pub async fn health_handler() -> impl IntoResponse {
    Json(HealthResponse::default())
}

/// The control panel.
pub async fn index_handler(State(state): State<AppState>) -> Response {
    let title = state.title.clone();
    let static_assets = state.static_dir.is_some();
    match run_blocking(&state, |c| Ok(c.status())).await {
        Ok(status) => Html(panel::render(&title, &status, static_assets)).into_response(),
        Err(e) => e.into_response(),
    }
}

/// Stage status snapshot.
pub async fn status_handler(State(state): State<AppState>) -> Response {
    match run_blocking(&state, |c| Ok(c.status())).await {
        Ok(status) => (StatusCode::OK, Json(StatusResponse::from(status))).into_response(),
        Err(e) => e.into_response(),
    }
}

/// Raw encoder position as plain text, `unknown` when not known.
pub async fn position_handler(State(state): State<AppState>) -> Response {
    match run_blocking(&state, StageController::position).await {
        Ok(position) => position.to_string().into_response(),
        Err(e) => e.into_response(),
    }
}

// =============================================================================
// MOTION HANDLERS
// =============================================================================

pub async fn home_handler(State(state): State<AppState>) -> Response {
    motion(&state, "home", StageController::home).await
}

/// Turn by the configured increment.
pub async fn turn_left_handler(State(state): State<AppState>) -> Response {
    motion(&state, "turn", StageController::turn).await
}

/// Turn by the configured increment, reversed.
pub async fn turn_right_handler(State(state): State<AppState>) -> Response {
    motion(&state, "turn_reverse", StageController::turn_reverse).await
}

pub async fn step_left_handler(State(state): State<AppState>) -> Response {
    motion(&state, "step_left", |c| c.turn_by(-FINE_STEP)).await
}

pub async fn step_right_handler(State(state): State<AppState>) -> Response {
    motion(&state, "step_right", |c| c.turn_by(FINE_STEP)).await
}

pub async fn big_step_left_handler(State(state): State<AppState>) -> Response {
    motion(&state, "big_step_left", |c| c.turn_by(-COARSE_STEP)).await
}

pub async fn big_step_right_handler(State(state): State<AppState>) -> Response {
    motion(&state, "big_step_right", |c| c.turn_by(COARSE_STEP)).await
}

pub async fn stop_handler(State(state): State<AppState>) -> Response {
    motion(&state, "stop", StageController::stop).await
}

// =============================================================================
// CONFIGURATION HANDLERS
// =============================================================================

/// Set the velocity limit. Malformed input applies the default speed.
pub async fn set_speed_handler(
    State(state): State<AppState>,
    Form(form): Form<SpeedForm>,
) -> Response {
    motion(&state, "set_speed", move |c| c.set_speed(form.speed.as_deref())).await
}

/// Set the turn increment. Never touches the device.
pub async fn set_turns_handler(
    State(state): State<AppState>,
    Form(form): Form<TurnsForm>,
) -> Response {
    let turns = state.controller.set_turns(form.turns.as_deref());
    tracing::debug!(turns, "Turn increment updated");
    Redirect::to("/").into_response()
}

/// Record the current position as home.
pub async fn set_home_handler(State(state): State<AppState>) -> Response {
    motion(&state, "set_home", StageController::set_home).await
}

/// Start anti-cogging calibration in the background.
///
/// Answers 202 once started; `not_ready` (200) before initialization and
/// 400 on links without closed-loop control.
pub async fn calibrate_handler(State(state): State<AppState>) -> Response {
    let controller = state.controller.clone();
    if !controller.is_ready() {
        return (
            StatusCode::OK,
            Json(ActionResponse::from(CommandOutcome::NotReady)),
        )
            .into_response();
    }
    if !controller.closed_loop() {
        return ApiError::from(StageError::Unsupported {
            link: controller.link_kind(),
            operation: "calibrate_anticogging",
        })
        .into_response();
    }

    tokio::task::spawn_blocking(move || match controller.calibrate_anticogging() {
        Ok(outcome) => tracing::info!(?outcome, "Anti-cogging calibration finished"),
        Err(e) => tracing::error!(error = %e, "Anti-cogging calibration failed"),
    });

    (StatusCode::ACCEPTED, Json(ActionResponse::started())).into_response()
}
