//! # turntable-core
//!
//! Motor/stage control core for a panoramic-photography turntable - THE LOGIC.
//!
//! This crate owns the actuator's state and turns high-level intents
//! ("go home", "turn N revolutions", "set speed") into device commands.
//!
//! ## Components (leaves first)
//!
//! - `link` - the [`ActuatorLink`] trait and its transports (serial stepper,
//!   closed-loop motion controller, simulation)
//! - `controller` - [`StageController`]: readiness gating, turns, homing,
//!   stop, anti-cogging calibration
//! - `init` - [`Sequencer`]: the one-time connect/calibrate/home sequence
//!
//! ## Architectural Constraints
//!
//! - No async runtime: blocking loops poll at fixed intervals
//! - The controller is the only mutator of stage state and the only caller
//!   of the link
//! - Motion commands before readiness are ignored, never queued

// =============================================================================
// MODULES
// =============================================================================

pub mod config;
pub mod controller;
pub mod init;
pub mod input;
pub mod link;
pub mod primitives;
pub mod types;

// =============================================================================
// RE-EXPORTS: Core Types (from types module)
// =============================================================================

pub use types::{
    AxisState, CalibrationState, Command, CommandOutcome, ControlMode, Gains, HomingReport,
    InitPhase, LinkKind, Position, StageError,
};

// =============================================================================
// RE-EXPORTS: Control
// =============================================================================

pub use config::StageConfig;
pub use controller::{StageController, StageState, StageStatus, homing_target};
pub use init::Sequencer;
pub use link::{
    ActuatorLink, MotionControllerLink, SerialLink, SimHandle, SimulatedLink, open_link,
};
