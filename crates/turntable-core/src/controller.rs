//! # Stage Controller
//!
//! The policy layer between the control surface and the actuator link.
//!
//! `StageController` is the only owner of [`StageState`] and the only caller
//! of the link. It is shared as `Arc<StageController>`; every method takes
//! `&self` and synchronizes internally:
//!
//! - `motion` serializes whole motion operations (a homing run and a turn
//!   never interleave)
//! - `state` guards the logical state
//! - `link` guards the transport handle
//!
//! `state` and `link` are never held at the same time. Motion commands
//! arriving before initialization completes are ignored and answered with
//! [`CommandOutcome::NotReady`].

use crate::input::{clamp_speed, parse_speed, parse_turns};
use crate::link::{ActuatorLink, open_link};
use crate::{
    AxisState, Command, CommandOutcome, HomingReport, InitPhase, LinkKind, Position,
    StageConfig, StageError,
};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::thread;
use std::time::{Duration, Instant};

/// Recover the guard from a poisoned lock; the protected data stays usable.
fn lock<T: ?Sized>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

/// Nearest home at or below `position`: the revolution floor plus the offset.
#[must_use]
pub fn homing_target(position: i64, ticks_per_revolution: i64, home_offset: i64) -> i64 {
    position.div_euclid(ticks_per_revolution) * ticks_per_revolution + home_offset
}

// =============================================================================
// STATE
// =============================================================================

/// Logical state of the stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageState {
    /// Velocity limit, always within `[0, max_speed]`.
    pub speed_limit: f64,
    /// Revolutions per `turn()`.
    pub turn_increment: f64,
    /// Encoder ticks counted as logical zero, within `[0, ticks_per_revolution)`.
    pub home_offset: i64,
    /// Gate for every motion command.
    pub ready: bool,
    pub phase: InitPhase,
}

/// Snapshot for the control surface.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageStatus {
    pub state: StageState,
    pub link: LinkKind,
    pub closed_loop: bool,
    pub ticks_per_revolution: i64,
    pub position: Position,
}

// =============================================================================
// CONTROLLER
// =============================================================================

pub struct StageController {
    config: StageConfig,
    link_kind: LinkKind,
    closed_loop: bool,
    state: Mutex<StageState>,
    link: Mutex<Box<dyn ActuatorLink>>,
    motion: Mutex<()>,
    init_claimed: AtomicBool,
}

impl std::fmt::Debug for StageController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StageController")
            .field("link", &self.link_kind)
            .field("state", &*lock(&self.state))
            .finish()
    }
}

impl StageController {
    /// Create a controller around an unopened link.
    pub fn new(link: Box<dyn ActuatorLink>, config: StageConfig) -> Result<Self, StageError> {
        config.validate()?;
        let state = StageState {
            speed_limit: clamp_speed(config.initial_speed, config.max_speed),
            turn_increment: config.initial_turns,
            home_offset: 0,
            ready: false,
            phase: InitPhase::Pending,
        };
        Ok(Self {
            link_kind: link.kind(),
            closed_loop: link.closed_loop(),
            config,
            state: Mutex::new(state),
            link: Mutex::new(link),
            motion: Mutex::new(()),
            init_claimed: AtomicBool::new(false),
        })
    }

    /// Create a controller with the link named by `config.transport`.
    pub fn from_config(config: StageConfig) -> Result<Self, StageError> {
        let link = open_link(&config);
        Self::new(link, config)
    }

    #[must_use]
    pub fn config(&self) -> &StageConfig {
        &self.config
    }

    #[must_use]
    pub fn link_kind(&self) -> LinkKind {
        self.link_kind
    }

    #[must_use]
    pub fn closed_loop(&self) -> bool {
        self.closed_loop
    }

    #[must_use]
    pub fn is_ready(&self) -> bool {
        lock(&self.state).ready
    }

    /// Copy of the logical state.
    #[must_use]
    pub fn state(&self) -> StageState {
        lock(&self.state).clone()
    }

    /// State, link and position in one snapshot.
    ///
    /// A failed position read is logged and reported as unknown.
    pub fn status(&self) -> StageStatus {
        let position = self.position().unwrap_or_else(|e| {
            tracing::warn!(error = %e, "Position read failed during status");
            Position::Unknown
        });
        StageStatus {
            state: self.state(),
            link: self.link_kind,
            closed_loop: self.closed_loop,
            ticks_per_revolution: self.config.ticks_per_revolution,
            position,
        }
    }

    // =========================================================================
    // CONFIGURATION OPERATIONS
    // =========================================================================

    /// Parse a loosely-typed speed and apply it as the velocity limit.
    pub fn set_speed(&self, raw: Option<&str>) -> Result<CommandOutcome, StageError> {
        self.apply_speed(parse_speed(raw, self.config.max_speed))
    }

    /// Apply a numeric speed, clamped to `[0, max_speed]`.
    pub fn set_speed_value(&self, value: f64) -> Result<CommandOutcome, StageError> {
        self.apply_speed(clamp_speed(value, self.config.max_speed))
    }

    fn apply_speed(&self, speed: f64) -> Result<CommandOutcome, StageError> {
        let _motion = lock(&self.motion);
        if !self.is_ready() {
            return Ok(self.not_ready("set_speed"));
        }
        self.send(Command::SetVelocityLimit(speed))?;
        lock(&self.state).speed_limit = speed;
        tracing::info!(speed, "Speed limit set");
        Ok(CommandOutcome::Sent)
    }

    /// Store the turn increment. Local only; applies even when not ready.
    pub fn set_turns(&self, raw: Option<&str>) -> f64 {
        let turns = parse_turns(raw);
        lock(&self.state).turn_increment = turns;
        tracing::info!(turns, "Turn increment set");
        turns
    }

    /// Record the present position as home.
    ///
    /// Stepper: the firmware stores its own zero (`fix`). Closed loop: the
    /// offset within the current revolution is kept locally; nothing moves.
    pub fn set_home(&self) -> Result<CommandOutcome, StageError> {
        let _motion = lock(&self.motion);
        if !self.is_ready() {
            return Ok(self.not_ready("set_home"));
        }
        if !self.closed_loop {
            self.send(Command::SetHome)?;
            return Ok(CommandOutcome::Sent);
        }
        let position = self.read_position()?;
        let offset = position.rem_euclid(self.config.ticks_per_revolution);
        lock(&self.state).home_offset = offset;
        tracing::info!(position, offset, "Home offset recorded");
        Ok(CommandOutcome::Sent)
    }

    // =========================================================================
    // MOTION OPERATIONS
    // =========================================================================

    /// Move by the configured turn increment.
    pub fn turn(&self) -> Result<CommandOutcome, StageError> {
        let turns = lock(&self.state).turn_increment;
        self.turn_by(turns)
    }

    /// Move by the turn increment in the opposite direction.
    pub fn turn_reverse(&self) -> Result<CommandOutcome, StageError> {
        let turns = lock(&self.state).turn_increment;
        self.turn_by(-turns)
    }

    /// Relative move of `revolutions`, leaving the turn increment untouched.
    ///
    /// Closed loop: the setpoint is issued and the call returns without
    /// waiting for arrival.
    pub fn turn_by(&self, revolutions: f64) -> Result<CommandOutcome, StageError> {
        let _motion = lock(&self.motion);
        if !self.is_ready() {
            return Ok(self.not_ready("turn"));
        }
        if !self.closed_loop {
            self.send(Command::TurnRevolutions(revolutions))?;
            return Ok(CommandOutcome::Sent);
        }
        let ticks = (revolutions * self.config.ticks_per_revolution as f64).round() as i64;
        self.relative_setpoint(ticks)
    }

    /// Relative move by an angle.
    pub fn turn_degrees(&self, degrees: f64) -> Result<CommandOutcome, StageError> {
        let _motion = lock(&self.motion);
        if !self.is_ready() {
            return Ok(self.not_ready("turn_degrees"));
        }
        if !self.closed_loop {
            self.send(Command::TurnDegrees(degrees))?;
            return Ok(CommandOutcome::Sent);
        }
        let ticks = (degrees / 360.0 * self.config.ticks_per_revolution as f64).round() as i64;
        self.relative_setpoint(ticks)
    }

    fn relative_setpoint(&self, ticks: i64) -> Result<CommandOutcome, StageError> {
        let position = self.read_position()?;
        let target = position.saturating_add(ticks);
        self.send(Command::SetPositionSetpoint(target))?;
        tracing::info!(position, target, "Relative move");
        Ok(CommandOutcome::Sent)
    }

    /// Go to the nearest home.
    ///
    /// Stepper: the firmware homes itself (`hom`). Closed loop: runs the
    /// homing loop and blocks until the encoder is within tolerance.
    pub fn home(&self) -> Result<CommandOutcome, StageError> {
        let _motion = lock(&self.motion);
        if !self.is_ready() {
            return Ok(self.not_ready("home"));
        }
        self.home_unchecked()?;
        Ok(CommandOutcome::Sent)
    }

    /// Home without the readiness gate or the motion lock.
    pub(crate) fn home_unchecked(&self) -> Result<Option<HomingReport>, StageError> {
        if !self.closed_loop {
            self.send(Command::GoHome)?;
            return Ok(None);
        }
        self.run_homing().map(Some)
    }

    fn run_homing(&self) -> Result<HomingReport, StageError> {
        let (home_offset, speed_limit) = {
            let state = lock(&self.state);
            (state.home_offset, state.speed_limit)
        };
        let position = self.read_position()?;
        let target = homing_target(position, self.config.ticks_per_revolution, home_offset);
        tracing::info!(position, target, "Homing");

        self.send(Command::SetVelocityLimit(self.config.homing_speed))?;
        let arrival = self.await_arrival(target);
        let restore = self.send(Command::SetVelocityLimit(speed_limit));

        let report = arrival?;
        restore?;
        tracing::info!(target, position = report.position, "Homing complete");
        Ok(report)
    }

    fn await_arrival(&self, target: i64) -> Result<HomingReport, StageError> {
        self.send(Command::SetPositionSetpoint(target))?;
        let started = Instant::now();
        let limit = self.config.homing_timeout_ms.map(Duration::from_millis);
        loop {
            let position = self.read_position()?;
            if (position - target).abs() <= self.config.homing_tolerance {
                return Ok(HomingReport { target, position });
            }
            if let Some(limit) = limit
                && started.elapsed() >= limit
            {
                tracing::warn!(target, position, "Homing timed out");
                return Err(StageError::HomingTimeout { target, position });
            }
            thread::sleep(self.config.poll_interval());
        }
    }

    /// Interrupt and resync.
    ///
    /// Stepper: the serial link is reopened. Closed loop: the axis leaves
    /// closed-loop control and re-enters it after the settle delay, which
    /// drops any pending setpoint.
    pub fn stop(&self) -> Result<CommandOutcome, StageError> {
        let _motion = lock(&self.motion);
        if !self.is_ready() {
            return Ok(self.not_ready("stop"));
        }
        if !self.closed_loop {
            lock(&self.link).reconnect()?;
            tracing::info!("Link reconnected on stop");
            return Ok(CommandOutcome::Sent);
        }
        self.send(Command::RequestState(AxisState::Idle))?;
        thread::sleep(self.config.stop_settle());
        self.send(Command::RequestState(AxisState::ClosedLoopControl))?;
        tracing::info!("Axis re-entered closed-loop control");
        Ok(CommandOutcome::Sent)
    }

    /// Raw encoder position, or `Unknown` before readiness or without feedback.
    pub fn position(&self) -> Result<Position, StageError> {
        if !self.is_ready() {
            return Ok(Position::Unknown);
        }
        match self.read_position() {
            Ok(ticks) => Ok(Position::Known(ticks)),
            Err(StageError::Unsupported { .. }) => Ok(Position::Unknown),
            Err(e) => Err(e),
        }
    }

    /// Run the device's anti-cogging calibration.
    ///
    /// Lowers the loop gains to the configured calibration values and starts
    /// the routine. With `restore_gains_after_anticogging` the call blocks
    /// until the device reports completion and then writes the previous
    /// gains back; otherwise it returns as soon as the routine is started.
    pub fn calibrate_anticogging(&self) -> Result<CommandOutcome, StageError> {
        let _motion = lock(&self.motion);
        if !self.is_ready() {
            return Ok(self.not_ready("calibrate_anticogging"));
        }
        if !self.closed_loop {
            return Err(StageError::Unsupported {
                link: self.link_kind,
                operation: "calibrate_anticogging",
            });
        }

        let saved = if self.config.restore_gains_after_anticogging {
            Some(lock(&self.link).read_gains()?)
        } else {
            None
        };

        self.send(Command::SetGains(self.config.anticogging_gains))?;
        self.send(Command::StartAnticogging)?;
        tracing::info!("Anti-cogging calibration started");

        if let Some(gains) = saved {
            let waited = self.await_anticogging();
            let restore = self.send(Command::SetGains(gains));
            waited?;
            restore?;
            tracing::info!(?gains, "Anti-cogging complete, gains restored");
        }
        Ok(CommandOutcome::Sent)
    }

    fn await_anticogging(&self) -> Result<(), StageError> {
        let started = Instant::now();
        while lock(&self.link).anticogging_in_progress()? {
            if let Some(limit_ms) = self.config.calibration_timeout_ms
                && started.elapsed() >= Duration::from_millis(limit_ms)
            {
                return Err(StageError::CalibrationTimeout(limit_ms));
            }
            thread::sleep(self.config.poll_interval());
        }
        Ok(())
    }

    // =========================================================================
    // LINK ACCESS
    // =========================================================================

    pub(crate) fn send(&self, command: Command) -> Result<(), StageError> {
        tracing::debug!(command = command.name(), "Sending command");
        lock(&self.link).send_command(&command)
    }

    pub(crate) fn read_position(&self) -> Result<i64, StageError> {
        lock(&self.link).read_position()
    }

    pub(crate) fn with_link<R>(
        &self,
        f: impl FnOnce(&mut dyn ActuatorLink) -> Result<R, StageError>,
    ) -> Result<R, StageError> {
        let mut link = lock(&self.link);
        f(link.as_mut())
    }

    fn not_ready(&self, operation: &str) -> CommandOutcome {
        tracing::debug!(operation, "Ignored: stage not ready");
        CommandOutcome::NotReady
    }

    // =========================================================================
    // INITIALIZATION HOOKS
    // =========================================================================

    /// Claim the one initialization this controller gets. True exactly once.
    pub(crate) fn claim_initialization(&self) -> bool {
        !self.init_claimed.swap(true, Ordering::SeqCst)
    }

    pub(crate) fn set_phase(&self, phase: InitPhase) {
        tracing::debug!(phase = phase.name(), "Initialization phase");
        lock(&self.state).phase = phase;
    }

    pub(crate) fn mark_ready(&self) {
        let mut state = lock(&self.state);
        state.ready = true;
        state.phase = InitPhase::Ready;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::link::SimulatedLink;

    #[test]
    fn homing_target_floors_to_revolution() {
        assert_eq!(homing_target(20480, 8192, 0), 16384);
        assert_eq!(homing_target(20480, 8192, 100), 16484);
        assert_eq!(homing_target(-1, 8192, 0), -8192);
        assert_eq!(homing_target(8192, 8192, 0), 8192);
    }

    #[test]
    fn initial_speed_is_clamped() {
        let config = StageConfig {
            initial_speed: 400.0,
            ..StageConfig::default()
        };
        let controller =
            StageController::new(Box::new(SimulatedLink::closed_loop()), config).ok();
        let speed = controller.map(|c| c.state().speed_limit);
        assert_eq!(speed, Some(100.0));
    }

    #[test]
    fn initialization_claimed_once() {
        let controller =
            StageController::new(Box::new(SimulatedLink::closed_loop()), StageConfig::default());
        let Ok(controller) = controller else {
            unreachable!("default config is valid");
        };
        assert!(controller.claim_initialization());
        assert!(!controller.claim_initialization());
    }

    #[test]
    fn invalid_config_rejected() {
        let config = StageConfig {
            ticks_per_revolution: -5,
            ..StageConfig::default()
        };
        assert!(StageController::new(Box::new(SimulatedLink::closed_loop()), config).is_err());
    }
}
