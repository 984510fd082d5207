//! # Initialization Sequencer
//!
//! Brings a freshly built controller to `ready`, exactly once:
//!
//! ```text
//! connect ─► full calibration ─► wait idle ─► closed loop + position mode
//!         ─► apply speed limit ─► home ─► ready
//! ```
//!
//! The calibration steps only apply to closed-loop links. `run` blocks for
//! the whole sequence; callers that want to keep serving requests run it on
//! a worker thread. There is no cancellation: abandoning the sequence
//! half-way would leave an axis calibrating or homing with nobody watching.

use crate::{
    AxisState, CalibrationState, Command, ControlMode, InitPhase, StageController, StageError,
};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

pub struct Sequencer {
    controller: Arc<StageController>,
}

impl Sequencer {
    pub fn new(controller: Arc<StageController>) -> Self {
        Self { controller }
    }

    /// Run the sequence. Fails with `AlreadyInitialized` on a second call.
    ///
    /// On failure the controller stays not-ready and its phase records the
    /// error.
    pub fn run(&self) -> Result<(), StageError> {
        if !self.controller.claim_initialization() {
            return Err(StageError::AlreadyInitialized);
        }
        tracing::info!(link = %self.controller.link_kind(), "Initializing stage");
        match self.sequence() {
            Ok(()) => {
                self.controller.mark_ready();
                tracing::info!("Stage ready");
                Ok(())
            }
            Err(e) => {
                tracing::error!(error = %e, "Stage initialization failed");
                self.controller.set_phase(InitPhase::Failed(e.to_string()));
                Err(e)
            }
        }
    }

    fn sequence(&self) -> Result<(), StageError> {
        let controller = &self.controller;

        controller.set_phase(InitPhase::Connecting);
        controller.with_link(|link| link.connect())?;

        if controller.closed_loop() {
            controller.set_phase(InitPhase::Calibrating);
            controller.send(Command::RequestState(AxisState::FullCalibrationSequence))?;
            self.await_calibration()?;
            controller.send(Command::RequestState(AxisState::ClosedLoopControl))?;
            controller.send(Command::SetControlMode(ControlMode::Position))?;
        }

        let speed = controller.state().speed_limit;
        controller.send(Command::SetVelocityLimit(speed))?;

        if controller.config().home_on_startup {
            controller.set_phase(InitPhase::Homing);
            controller.home_unchecked()?;
        }
        Ok(())
    }

    fn await_calibration(&self) -> Result<(), StageError> {
        let config = self.controller.config();
        let started = Instant::now();
        loop {
            let state = self
                .controller
                .with_link(|link| link.read_calibration_state())?;
            if state == CalibrationState::Idle {
                tracing::info!(
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Device calibration complete"
                );
                return Ok(());
            }
            if let Some(limit_ms) = config.calibration_timeout_ms
                && started.elapsed() >= Duration::from_millis(limit_ms)
            {
                return Err(StageError::CalibrationTimeout(limit_ms));
            }
            thread::sleep(config.poll_interval());
        }
    }
}
