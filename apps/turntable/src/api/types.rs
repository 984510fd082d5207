//! # API Request/Response Types
//!
//! JSON bodies and form payloads of the control surface.

use serde::{Deserialize, Serialize};
use turntable_core::{CommandOutcome, StageStatus};

// =============================================================================
// HEALTH RESPONSE
// =============================================================================

/// Health check response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

impl Default for HealthResponse {
    fn default() -> Self {
        Self {
            status: "ok".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

// =============================================================================
// STATUS RESPONSE
// =============================================================================

/// Stage status snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResponse {
    pub ready: bool,
    pub phase: String,
    pub error: Option<String>,
    pub link: String,
    pub closed_loop: bool,
    /// Encoder ticks, `None` while unknown.
    pub position: Option<i64>,
    pub speed_limit: f64,
    pub turn_increment: f64,
    pub home_offset: i64,
    pub ticks_per_revolution: i64,
}

impl From<StageStatus> for StatusResponse {
    fn from(status: StageStatus) -> Self {
        Self {
            ready: status.state.ready,
            phase: status.state.phase.name().to_string(),
            error: status.state.phase.error().map(str::to_string),
            link: status.link.name().to_string(),
            closed_loop: status.closed_loop,
            position: status.position.ticks(),
            speed_limit: status.state.speed_limit,
            turn_increment: status.state.turn_increment,
            home_offset: status.state.home_offset,
            ticks_per_revolution: status.ticks_per_revolution,
        }
    }
}

// =============================================================================
// FORMS
// =============================================================================

/// `POST /setspeed` body. Missing or malformed values fall back to the default speed.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SpeedForm {
    pub speed: Option<String>,
}

/// `POST /setturns` body.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TurnsForm {
    pub turns: Option<String>,
}

// =============================================================================
// ACTION RESPONSES
// =============================================================================

/// Result of a control action that does not redirect.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionResponse {
    pub success: bool,
    /// `"sent"`, `"started"` or `"not_ready"`.
    pub outcome: String,
    pub error: Option<String>,
}

impl ActionResponse {
    #[must_use]
    pub fn started() -> Self {
        Self {
            success: true,
            outcome: "started".to_string(),
            error: None,
        }
    }

    #[must_use]
    pub fn error(message: String) -> Self {
        Self {
            success: false,
            outcome: "failed".to_string(),
            error: Some(message),
        }
    }
}

impl From<CommandOutcome> for ActionResponse {
    fn from(outcome: CommandOutcome) -> Self {
        let outcome = match outcome {
            CommandOutcome::Sent => "sent",
            CommandOutcome::NotReady => "not_ready",
        };
        Self {
            success: true,
            outcome: outcome.to_string(),
            error: None,
        }
    }
}
