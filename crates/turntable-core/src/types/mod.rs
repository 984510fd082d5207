//! # Core Type Definitions
//!
//! This module contains the shared vocabulary of the turntable core:
//! - Device commands (`Command`, `AxisState`, `ControlMode`, `Gains`)
//! - Feedback (`Position`, `CalibrationState`, `HomingReport`)
//! - Controller outcomes and lifecycle (`CommandOutcome`, `InitPhase`, `LinkKind`)
//! - Error types (`StageError`)

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

// =============================================================================
// LINK KIND
// =============================================================================

/// Which transport an actuator link drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LinkKind {
    /// Stepper controller speaking text verbs over a serial port.
    Serial,
    /// Closed-loop motion controller addressed through property writes.
    MotionController,
    /// In-process model of a closed-loop axis.
    Simulated,
}

impl LinkKind {
    /// Stable name used in logs, configuration and the HTTP status.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            LinkKind::Serial => "serial",
            LinkKind::MotionController => "motion-controller",
            LinkKind::Simulated => "simulated",
        }
    }
}

impl fmt::Display for LinkKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// =============================================================================
// MOTION CONTROLLER VOCABULARY
// =============================================================================

/// Axis operating states understood by the motion controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AxisState {
    Idle,
    FullCalibrationSequence,
    ClosedLoopControl,
}

impl AxisState {
    /// Numeric code written to `requested_state`.
    #[must_use]
    pub const fn code(self) -> u8 {
        match self {
            AxisState::Idle => 1,
            AxisState::FullCalibrationSequence => 3,
            AxisState::ClosedLoopControl => 8,
        }
    }
}

/// Controller input mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ControlMode {
    Position,
}

impl ControlMode {
    /// Numeric code written to `control_mode`.
    #[must_use]
    pub const fn code(self) -> u8 {
        match self {
            ControlMode::Position => 3,
        }
    }
}

/// Position/velocity loop gains of the motion controller.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Gains {
    pub pos_gain: f64,
    pub vel_gain: f64,
    pub vel_integrator_gain: f64,
}

// =============================================================================
// COMMANDS
// =============================================================================

/// A discrete instruction for the actuator link.
///
/// The first five map onto the stepper's text verbs; the rest only exist
/// on closed-loop devices. A link that cannot express a command answers
/// [`StageError::Unsupported`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Command {
    /// Velocity limit (`rpm` on the stepper).
    SetVelocityLimit(f64),
    /// Record the present position as the device's own zero (`fix`).
    SetHome,
    /// Return to the device's own zero (`hom`).
    GoHome,
    /// Relative move in revolutions (`rev`).
    TurnRevolutions(f64),
    /// Relative move in degrees (`deg`).
    TurnDegrees(f64),
    RequestState(AxisState),
    SetControlMode(ControlMode),
    /// Absolute position setpoint in encoder ticks.
    SetPositionSetpoint(i64),
    SetGains(Gains),
    StartAnticogging,
}

impl Command {
    /// Short name for logs.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Command::SetVelocityLimit(_) => "set_velocity_limit",
            Command::SetHome => "set_home",
            Command::GoHome => "go_home",
            Command::TurnRevolutions(_) => "turn_revolutions",
            Command::TurnDegrees(_) => "turn_degrees",
            Command::RequestState(_) => "request_state",
            Command::SetControlMode(_) => "set_control_mode",
            Command::SetPositionSetpoint(_) => "set_position_setpoint",
            Command::SetGains(_) => "set_gains",
            Command::StartAnticogging => "start_anticogging",
        }
    }
}

// =============================================================================
// FEEDBACK
// =============================================================================

/// Whether the device's own calibration sequence has finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CalibrationState {
    Idle,
    Calibrating,
}

/// Encoder position as reported to callers.
///
/// `Unknown` covers both "not ready yet" and "this link has no feedback",
/// so it can never be confused with a real zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Position {
    Known(i64),
    Unknown,
}

impl Position {
    #[must_use]
    pub fn ticks(&self) -> Option<i64> {
        match self {
            Position::Known(ticks) => Some(*ticks),
            Position::Unknown => None,
        }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Position::Known(ticks) => write!(f, "{}", ticks),
            Position::Unknown => f.write_str("unknown"),
        }
    }
}

/// Result of a completed homing run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HomingReport {
    /// Absolute target in encoder ticks.
    pub target: i64,
    /// Encoder position at the poll that satisfied the tolerance.
    pub position: i64,
}

// =============================================================================
// CONTROLLER OUTCOMES
// =============================================================================

/// What happened to a gated command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandOutcome {
    /// The command reached the link (or was applied locally).
    Sent,
    /// The stage is not ready; nothing was written or changed.
    NotReady,
}

impl CommandOutcome {
    #[must_use]
    pub fn is_sent(&self) -> bool {
        matches!(self, CommandOutcome::Sent)
    }
}

/// Progress of the one-time initialization sequence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InitPhase {
    Pending,
    Connecting,
    Calibrating,
    Homing,
    Ready,
    Failed(String),
}

impl InitPhase {
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            InitPhase::Pending => "pending",
            InitPhase::Connecting => "connecting",
            InitPhase::Calibrating => "calibrating",
            InitPhase::Homing => "homing",
            InitPhase::Ready => "ready",
            InitPhase::Failed(_) => "failed",
        }
    }

    /// Failure message, if initialization failed.
    #[must_use]
    pub fn error(&self) -> Option<&str> {
        match self {
            InitPhase::Failed(msg) => Some(msg),
            _ => None,
        }
    }
}

// =============================================================================
// ERROR TYPES
// =============================================================================

/// Errors that can occur in the turntable system.
///
/// Not-ready and malformed input are deliberately absent: the controller
/// answers those with [`CommandOutcome::NotReady`] and parse defaults.
#[derive(Debug, Error)]
pub enum StageError {
    /// The device path never appeared within the configured connect timeout.
    #[error("Device unavailable: {0}")]
    DeviceUnavailable(String),

    /// A write or read on the link failed, or the reply was unusable.
    #[error("Transport error: {0}")]
    Transport(String),

    /// The link cannot express the requested command.
    #[error("Unsupported on {link} link: {operation}")]
    Unsupported {
        link: LinkKind,
        operation: &'static str,
    },

    /// Homing did not reach tolerance within the configured bound.
    #[error("Homing timed out: target {target}, last position {position}")]
    HomingTimeout { target: i64, position: i64 },

    /// The device calibration did not finish within the configured bound.
    #[error("Calibration timed out after {0} ms")]
    CalibrationTimeout(u64),

    /// The initialization sequence has already been started once.
    #[error("Stage already initialized")]
    AlreadyInitialized,

    /// Invalid configuration values or file.
    #[error("Configuration error: {0}")]
    Config(String),

    /// An application-level I/O error occurred.
    #[error("I/O error: {0}")]
    Io(String),
}

impl StageError {
    /// True when the error means the device could not be reached.
    #[must_use]
    pub fn is_device_fault(&self) -> bool {
        matches!(
            self,
            StageError::DeviceUnavailable(_) | StageError::Transport(_)
        )
    }
}

impl From<serialport::Error> for StageError {
    fn from(e: serialport::Error) -> Self {
        StageError::Transport(e.to_string())
    }
}

impl From<std::io::Error> for StageError {
    fn from(e: std::io::Error) -> Self {
        StageError::Transport(e.to_string())
    }
}

// =============================================================================
// TESTS
// =============================================================================
