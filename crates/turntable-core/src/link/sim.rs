//! In-process actuator model.
//!
//! `SimulatedLink` stands in for hardware on a bench without a device and in
//! tests. The closed-loop flavour moves its encoder a bounded number of ticks
//! towards the setpoint on every position read, so polling loops behave as
//! they would against a real axis. The stepper flavour only records frames.
//!
//! A [`SimHandle`] shares the model's state so callers can inspect written
//! commands or inject faults while the link itself is owned by a controller.

use super::ActuatorLink;
use crate::{AxisState, CalibrationState, Command, Gains, LinkKind, StageError};
use std::sync::{Arc, Mutex, MutexGuard};

/// Default encoder travel per position read.
const DEFAULT_STEP: i64 = 2048;

/// Default number of polls a device-side calibration stays busy.
const DEFAULT_BUSY_POLLS: u32 = 3;

#[derive(Debug)]
struct SimState {
    closed_loop: bool,
    position: i64,
    setpoint: Option<i64>,
    step_per_read: i64,
    stalled: bool,
    axis_state: AxisState,
    calibration_polls: u32,
    calibration_remaining: u32,
    anticogging_polls: u32,
    anticogging_remaining: u32,
    gains: Gains,
    velocity_limit: Option<f64>,
    commands: Vec<Command>,
    connects: u32,
    reconnects: u32,
    fail_transport: bool,
}

impl SimState {
    fn check_transport(&self) -> Result<(), StageError> {
        if self.fail_transport {
            return Err(StageError::Transport("simulated transport fault".into()));
        }
        Ok(())
    }
}

/// Shared view of a simulated device.
#[derive(Debug, Clone)]
pub struct SimHandle(Arc<Mutex<SimState>>);

impl SimHandle {
    fn lock(&self) -> MutexGuard<'_, SimState> {
        self.0.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Every command written so far, in order.
    pub fn commands(&self) -> Vec<Command> {
        self.lock().commands.clone()
    }

    pub fn clear_commands(&self) {
        self.lock().commands.clear();
    }

    pub fn position(&self) -> i64 {
        self.lock().position
    }

    /// Teleport the encoder, as if the stage were pushed by hand.
    pub fn set_position(&self, ticks: i64) {
        let mut state = self.lock();
        state.position = ticks;
        state.setpoint = None;
    }

    pub fn setpoint(&self) -> Option<i64> {
        self.lock().setpoint
    }

    pub fn axis_state(&self) -> AxisState {
        self.lock().axis_state
    }

    pub fn velocity_limit(&self) -> Option<f64> {
        self.lock().velocity_limit
    }

    pub fn gains(&self) -> Gains {
        self.lock().gains
    }

    pub fn connects(&self) -> u32 {
        self.lock().connects
    }

    pub fn reconnects(&self) -> u32 {
        self.lock().reconnects
    }

    /// Make every subsequent link operation fail with a transport error.
    pub fn set_fail_transport(&self, fail: bool) {
        self.lock().fail_transport = fail;
    }

    /// Stop the encoder from following the setpoint.
    pub fn set_stalled(&self, stalled: bool) {
        self.lock().stalled = stalled;
    }
}

/// Simulated actuator; see the module docs.
#[derive(Debug)]
pub struct SimulatedLink {
    handle: SimHandle,
}

impl SimulatedLink {
    fn with_loop(closed_loop: bool) -> Self {
        let state = SimState {
            closed_loop,
            position: 0,
            setpoint: None,
            step_per_read: DEFAULT_STEP,
            stalled: false,
            axis_state: AxisState::Idle,
            calibration_polls: DEFAULT_BUSY_POLLS,
            calibration_remaining: 0,
            anticogging_polls: DEFAULT_BUSY_POLLS,
            anticogging_remaining: 0,
            gains: Gains {
                pos_gain: 20.0,
                vel_gain: 0.0005,
                vel_integrator_gain: 0.001,
            },
            velocity_limit: None,
            commands: Vec::new(),
            connects: 0,
            reconnects: 0,
            fail_transport: false,
        };
        Self {
            handle: SimHandle(Arc::new(Mutex::new(state))),
        }
    }

    /// A closed-loop axis with encoder feedback.
    #[must_use]
    pub fn closed_loop() -> Self {
        Self::with_loop(true)
    }

    /// A stepper controller: text verbs, no feedback.
    #[must_use]
    pub fn stepper() -> Self {
        Self::with_loop(false)
    }

    /// Start the encoder at `ticks`.
    #[must_use]
    pub fn with_position(self, ticks: i64) -> Self {
        self.handle.lock().position = ticks;
        self
    }

    /// Encoder travel per position read.
    #[must_use]
    pub fn with_step(self, ticks: i64) -> Self {
        self.handle.lock().step_per_read = ticks.max(1);
        self
    }

    /// Polls the startup and anti-cogging calibrations stay busy for.
    #[must_use]
    pub fn with_busy_polls(self, polls: u32) -> Self {
        {
            let mut state = self.handle.lock();
            state.calibration_polls = polls;
            state.anticogging_polls = polls;
        }
        self
    }

    #[must_use]
    pub fn handle(&self) -> SimHandle {
        self.handle.clone()
    }
}

fn is_stepper_command(command: &Command) -> bool {
    matches!(
        command,
        Command::SetVelocityLimit(_)
            | Command::SetHome
            | Command::GoHome
            | Command::TurnRevolutions(_)
            | Command::TurnDegrees(_)
    )
}

impl ActuatorLink for SimulatedLink {
    fn kind(&self) -> LinkKind {
        LinkKind::Simulated
    }

    fn closed_loop(&self) -> bool {
        self.handle.lock().closed_loop
    }

    fn connect(&mut self) -> Result<(), StageError> {
        let mut state = self.handle.lock();
        state.check_transport()?;
        state.connects += 1;
        Ok(())
    }

    fn reconnect(&mut self) -> Result<(), StageError> {
        let mut state = self.handle.lock();
        state.check_transport()?;
        state.reconnects += 1;
        Ok(())
    }

    fn send_command(&mut self, command: &Command) -> Result<(), StageError> {
        let mut state = self.handle.lock();
        state.check_transport()?;

        let supported = if state.closed_loop {
            matches!(command, Command::SetVelocityLimit(_)) || !is_stepper_command(command)
        } else {
            is_stepper_command(command)
        };
        if !supported {
            return Err(StageError::Unsupported {
                link: LinkKind::Simulated,
                operation: command.name(),
            });
        }

        match command {
            Command::SetVelocityLimit(limit) => state.velocity_limit = Some(*limit),
            Command::RequestState(requested) => {
                state.axis_state = *requested;
                match requested {
                    AxisState::FullCalibrationSequence => {
                        state.calibration_remaining = state.calibration_polls;
                    }
                    AxisState::ClosedLoopControl => {
                        // Entering closed loop holds the present position.
                        state.setpoint = Some(state.position);
                    }
                    AxisState::Idle => state.setpoint = None,
                }
            }
            Command::SetPositionSetpoint(ticks) => state.setpoint = Some(*ticks),
            Command::SetGains(gains) => state.gains = *gains,
            Command::StartAnticogging => state.anticogging_remaining = state.anticogging_polls,
            _ => {}
        }
        state.commands.push(*command);
        Ok(())
    }

    fn read_position(&mut self) -> Result<i64, StageError> {
        let mut state = self.handle.lock();
        state.check_transport()?;
        if !state.closed_loop {
            return Err(StageError::Unsupported {
                link: LinkKind::Simulated,
                operation: "read_position",
            });
        }

        if let Some(target) = state.setpoint
            && state.axis_state == AxisState::ClosedLoopControl
            && !state.stalled
        {
            let diff = target - state.position;
            let step = diff.clamp(-state.step_per_read, state.step_per_read);
            state.position += step;
        }
        Ok(state.position)
    }

    fn read_calibration_state(&mut self) -> Result<CalibrationState, StageError> {
        let mut state = self.handle.lock();
        state.check_transport()?;
        if state.axis_state != AxisState::FullCalibrationSequence {
            return Ok(CalibrationState::Idle);
        }
        if state.calibration_remaining == 0 {
            state.axis_state = AxisState::Idle;
            return Ok(CalibrationState::Idle);
        }
        state.calibration_remaining -= 1;
        Ok(CalibrationState::Calibrating)
    }

    fn read_gains(&mut self) -> Result<Gains, StageError> {
        let state = self.handle.lock();
        state.check_transport()?;
        if !state.closed_loop {
            return Err(StageError::Unsupported {
                link: LinkKind::Simulated,
                operation: "read_gains",
            });
        }
        Ok(state.gains)
    }

    fn anticogging_in_progress(&mut self) -> Result<bool, StageError> {
        let mut state = self.handle.lock();
        state.check_transport()?;
        if state.anticogging_remaining == 0 {
            return Ok(false);
        }
        state.anticogging_remaining -= 1;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encoder_follows_setpoint_in_steps() {
        let mut link = SimulatedLink::closed_loop().with_step(100);
        let handle = link.handle();
        assert!(link.send_command(&Command::RequestState(AxisState::ClosedLoopControl)).is_ok());
        assert!(link.send_command(&Command::SetPositionSetpoint(250)).is_ok());

        assert_eq!(link.read_position().ok(), Some(100));
        assert_eq!(link.read_position().ok(), Some(200));
        assert_eq!(link.read_position().ok(), Some(250));
        assert_eq!(link.read_position().ok(), Some(250));
        assert_eq!(handle.setpoint(), Some(250));
    }

    #[test]
    fn idle_axis_does_not_move() {
        let mut link = SimulatedLink::closed_loop();
        assert!(link.send_command(&Command::SetPositionSetpoint(5000)).is_ok());
        assert_eq!(link.read_position().ok(), Some(0));
    }

    #[test]
    fn calibration_counts_down() {
        let mut link = SimulatedLink::closed_loop().with_busy_polls(2);
        assert!(
            link.send_command(&Command::RequestState(AxisState::FullCalibrationSequence))
                .is_ok()
        );
        assert_eq!(link.read_calibration_state().ok(), Some(CalibrationState::Calibrating));
        assert_eq!(link.read_calibration_state().ok(), Some(CalibrationState::Calibrating));
        assert_eq!(link.read_calibration_state().ok(), Some(CalibrationState::Idle));
        assert_eq!(link.handle().axis_state(), AxisState::Idle);
    }

    #[test]
    fn stepper_rejects_setpoints_and_feedback() {
        let mut link = SimulatedLink::stepper();
        assert!(link.send_command(&Command::TurnRevolutions(1.0)).is_ok());
        assert!(link.send_command(&Command::SetPositionSetpoint(1)).is_err());
        assert!(link.read_position().is_err());
    }

    #[test]
    fn injected_fault_fails_every_call() {
        let mut link = SimulatedLink::closed_loop();
        link.handle().set_fail_transport(true);
        assert!(matches!(
            link.send_command(&Command::StartAnticogging),
            Err(StageError::Transport(_))
        ));
        assert!(link.read_position().is_err());
        assert!(link.connect().is_err());
    }
}
