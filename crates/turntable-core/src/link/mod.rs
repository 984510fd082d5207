//! # Actuator Links
//!
//! Transport-level access to the physical device. The [`ActuatorLink`] trait
//! is the single seam between the stage controller and the hardware:
//!
//! - [`SerialLink`]: stepper controller, text verbs, no feedback
//! - [`MotionControllerLink`]: closed-loop axis, ASCII property protocol
//! - [`SimulatedLink`]: in-process closed-loop model for tests and bench runs
//!
//! Writes are fire-and-forget: nothing is batched, retried or acknowledged.
//! Transport failures surface as [`StageError::Transport`].

mod motion_controller;
mod port;
mod serial;
pub mod sim;

pub use motion_controller::MotionControllerLink;
pub use serial::SerialLink;
pub use sim::{SimHandle, SimulatedLink};

use crate::{CalibrationState, Command, Gains, LinkKind, StageConfig, StageError};

// =============================================================================
// LINK TRAIT
// =============================================================================

/// A transport that carries commands to the device and feedback back.
///
/// Implementations own their transport handle exclusively. The stage
/// controller serializes access, so methods take `&mut self`.
pub trait ActuatorLink: Send {
    /// Which transport this is.
    fn kind(&self) -> LinkKind;

    /// Whether the device closes the loop on an encoder.
    ///
    /// Selects the controller's semantics for home, set-home and stop.
    fn closed_loop(&self) -> bool;

    /// Block until the device is present, then open it.
    fn connect(&mut self) -> Result<(), StageError>;

    /// Close the link if open and open it again.
    fn reconnect(&mut self) -> Result<(), StageError>;

    /// Write one command without waiting for acknowledgement.
    fn send_command(&mut self, command: &Command) -> Result<(), StageError>;

    /// Raw accumulated encoder position in ticks.
    fn read_position(&mut self) -> Result<i64, StageError>;

    /// Whether the device's startup calibration has finished.
    fn read_calibration_state(&mut self) -> Result<CalibrationState, StageError>;

    /// Current loop gains.
    fn read_gains(&mut self) -> Result<Gains, StageError> {
        Err(StageError::Unsupported {
            link: self.kind(),
            operation: "read_gains",
        })
    }

    /// Whether the device-side anti-cogging routine is still running.
    fn anticogging_in_progress(&mut self) -> Result<bool, StageError> {
        Err(StageError::Unsupported {
            link: self.kind(),
            operation: "anticogging_in_progress",
        })
    }
}

// =============================================================================
// LINK SELECTION
// =============================================================================

/// Build the link named by `config.transport`.
///
/// Nothing is opened here; the initialization sequencer calls `connect`.
pub fn open_link(config: &StageConfig) -> Box<dyn ActuatorLink> {
    match config.transport {
        LinkKind::Serial => Box::new(SerialLink::new(config)),
        LinkKind::MotionController => Box::new(MotionControllerLink::new(config)),
        LinkKind::Simulated => Box::new(SimulatedLink::closed_loop()),
    }
}
