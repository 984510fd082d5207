//! # Controller Scenarios
//!
//! End-to-end behaviour of the stage controller and initialization sequencer
//! against the simulated link.

// Allow unwrap and panic in tests - these are standard for test code
#![allow(clippy::unwrap_used, clippy::panic)]

use std::sync::Arc;
use turntable_core::{
    AxisState, Command, CommandOutcome, ControlMode, Gains, InitPhase, Position, Sequencer,
    SimHandle, SimulatedLink, StageConfig, StageController, StageError,
};

// =============================================================================
// HELPERS
// =============================================================================

fn fast_config() -> StageConfig {
    StageConfig {
        poll_interval_ms: 1,
        stop_settle_ms: 1,
        ..StageConfig::default()
    }
}

fn controller_with(link: SimulatedLink, config: StageConfig) -> (Arc<StageController>, SimHandle) {
    let handle = link.handle();
    let controller = StageController::new(Box::new(link), config).unwrap();
    (Arc::new(controller), handle)
}

fn ready_with(link: SimulatedLink, config: StageConfig) -> (Arc<StageController>, SimHandle) {
    let (controller, handle) = controller_with(link, config);
    Sequencer::new(controller.clone()).run().unwrap();
    handle.clear_commands();
    (controller, handle)
}

fn ready_closed_loop() -> (Arc<StageController>, SimHandle) {
    ready_with(SimulatedLink::closed_loop(), fast_config())
}

fn ready_stepper() -> (Arc<StageController>, SimHandle) {
    ready_with(SimulatedLink::stepper(), fast_config())
}

// =============================================================================
// INITIALIZATION
// =============================================================================

#[test]
fn sequencer_calibrates_homes_and_flips_ready() {
    let (controller, handle) =
        controller_with(SimulatedLink::closed_loop().with_position(20480), fast_config());
    assert!(!controller.is_ready());
    assert_eq!(controller.state().phase, InitPhase::Pending);

    Sequencer::new(controller.clone()).run().unwrap();

    assert!(controller.is_ready());
    assert_eq!(controller.state().phase, InitPhase::Ready);
    assert_eq!(handle.connects(), 1);
    assert_eq!(
        handle.commands(),
        vec![
            Command::RequestState(AxisState::FullCalibrationSequence),
            Command::RequestState(AxisState::ClosedLoopControl),
            Command::SetControlMode(ControlMode::Position),
            Command::SetVelocityLimit(8.5),
            Command::SetVelocityLimit(25.0),
            Command::SetPositionSetpoint(16384),
            Command::SetVelocityLimit(8.5),
        ]
    );
    assert_eq!(handle.position(), 16384);
}

#[test]
fn stepper_initialization_sets_speed_and_homes() {
    let (controller, handle) = controller_with(SimulatedLink::stepper(), fast_config());
    Sequencer::new(controller.clone()).run().unwrap();

    assert!(controller.is_ready());
    assert_eq!(
        handle.commands(),
        vec![Command::SetVelocityLimit(8.5), Command::GoHome]
    );
}

#[test]
fn startup_home_can_be_disabled() {
    let config = StageConfig {
        home_on_startup: false,
        ..fast_config()
    };
    let (controller, handle) = controller_with(SimulatedLink::stepper(), config);
    Sequencer::new(controller.clone()).run().unwrap();
    assert_eq!(handle.commands(), vec![Command::SetVelocityLimit(8.5)]);
}

#[test]
fn second_initialization_rejected() {
    let (controller, _handle) = ready_closed_loop();
    let again = Sequencer::new(controller.clone()).run();
    assert!(matches!(again, Err(StageError::AlreadyInitialized)));
    assert!(controller.is_ready());
}

// =============================================================================
// READINESS GATING
// =============================================================================

#[test]
fn motion_ignored_before_ready() {
    let (controller, handle) = controller_with(SimulatedLink::closed_loop(), fast_config());
    let before = controller.state();

    assert_eq!(controller.set_speed(Some("50")).unwrap(), CommandOutcome::NotReady);
    assert_eq!(controller.turn().unwrap(), CommandOutcome::NotReady);
    assert_eq!(controller.turn_reverse().unwrap(), CommandOutcome::NotReady);
    assert_eq!(controller.home().unwrap(), CommandOutcome::NotReady);
    assert_eq!(controller.stop().unwrap(), CommandOutcome::NotReady);
    assert_eq!(controller.set_home().unwrap(), CommandOutcome::NotReady);
    assert_eq!(
        controller.calibrate_anticogging().unwrap(),
        CommandOutcome::NotReady
    );

    assert!(handle.commands().is_empty());
    assert_eq!(controller.state(), before);
}

#[test]
fn position_unknown_before_ready() {
    let (controller, _handle) =
        controller_with(SimulatedLink::closed_loop().with_position(0), fast_config());
    assert_eq!(controller.position().unwrap(), Position::Unknown);
    assert_eq!(controller.status().position, Position::Unknown);
}

#[test]
fn set_turns_applies_before_ready() {
    let (controller, handle) = controller_with(SimulatedLink::closed_loop(), fast_config());
    assert_eq!(controller.set_turns(Some("3")), 3.0);
    assert_eq!(controller.state().turn_increment, 3.0);
    assert!(handle.commands().is_empty());
}

// =============================================================================
// SPEED & TURNS
// =============================================================================

#[test]
fn speed_is_clamped_and_forwarded() {
    let (controller, handle) = ready_closed_loop();

    assert_eq!(controller.set_speed(Some("150")).unwrap(), CommandOutcome::Sent);
    assert_eq!(controller.state().speed_limit, 100.0);
    assert_eq!(handle.commands(), vec![Command::SetVelocityLimit(100.0)]);
}

#[test]
fn startup_speed_is_not_the_input_fallback() {
    let (controller, handle) = ready_stepper();
    assert_eq!(controller.state().speed_limit, 8.5);

    controller.set_speed(Some("")).unwrap();
    assert_eq!(controller.state().speed_limit, 1.0);
    assert_eq!(handle.commands(), vec![Command::SetVelocityLimit(1.0)]);
}

#[test]
fn malformed_speed_defaults_to_one() {
    let (controller, _handle) = ready_closed_loop();
    controller.set_speed(Some("40")).unwrap();
    controller.set_speed(Some("quick")).unwrap();
    assert_eq!(controller.state().speed_limit, 1.0);
    controller.set_speed(None).unwrap();
    assert_eq!(controller.state().speed_limit, 1.0);
}

#[test]
fn empty_turns_default_to_one() {
    let (controller, _handle) = ready_closed_loop();
    controller.set_turns(Some("4"));
    assert_eq!(controller.set_turns(Some("")), 1.0);
    assert_eq!(controller.state().turn_increment, 1.0);
}

// =============================================================================
// TURNS
// =============================================================================

#[test]
fn closed_loop_turn_offsets_setpoint() {
    let (controller, handle) = ready_closed_loop();
    handle.set_position(1000);
    controller.set_turns(Some("2.5"));

    controller.turn().unwrap();
    assert_eq!(handle.setpoint(), Some(1000 + 20480));

    handle.set_position(1000);
    controller.turn_reverse().unwrap();
    assert_eq!(handle.setpoint(), Some(1000 - 20480));
    assert_eq!(controller.state().turn_increment, 2.5);
}

#[test]
fn closed_loop_turn_by_and_degrees() {
    let (controller, handle) = ready_closed_loop();
    handle.set_position(0);

    controller.turn_by(-0.05).unwrap();
    assert_eq!(handle.setpoint(), Some(-410));

    handle.set_position(0);
    controller.turn_degrees(90.0).unwrap();
    assert_eq!(handle.setpoint(), Some(2048));
}

#[test]
fn stepper_turn_emits_one_rev() {
    let (controller, handle) = ready_stepper();
    controller.set_turns(Some("0.5"));
    controller.turn().unwrap();
    controller.turn_reverse().unwrap();
    controller.turn_degrees(45.0).unwrap();

    assert_eq!(
        handle.commands(),
        vec![
            Command::TurnRevolutions(0.5),
            Command::TurnRevolutions(-0.5),
            Command::TurnDegrees(45.0),
        ]
    );
}

// =============================================================================
// HOMING
// =============================================================================

#[test]
fn home_goes_to_revolution_floor() {
    let (controller, handle) = ready_closed_loop();
    handle.set_position(20480);

    assert_eq!(controller.home().unwrap(), CommandOutcome::Sent);
    assert!((handle.position() - 16384).abs() <= 10);
    assert_eq!(
        handle.commands(),
        vec![
            Command::SetVelocityLimit(25.0),
            Command::SetPositionSetpoint(16384),
            Command::SetVelocityLimit(8.5),
        ]
    );
}

#[test]
fn homing_restores_configured_speed() {
    let (controller, handle) = ready_closed_loop();
    controller.set_speed(Some("60")).unwrap();
    handle.set_position(9000);

    controller.home().unwrap();
    assert_eq!(handle.velocity_limit(), Some(60.0));
}

#[test]
fn set_home_then_home_is_idempotent() {
    let (controller, handle) = ready_closed_loop();
    handle.set_position(8192 * 3 + 500);
    controller.set_home().unwrap();
    assert_eq!(controller.state().home_offset, 500);

    handle.set_position(8192 * 5 + 7000);
    controller.home().unwrap();
    let first = handle.position();
    assert!((first - (8192 * 5 + 500)).abs() <= 10);

    controller.home().unwrap();
    controller.home().unwrap();
    assert_eq!(handle.position(), first);
}

#[test]
fn negative_position_home_offset_is_positive() {
    let (controller, handle) = ready_closed_loop();
    handle.set_position(-100);
    controller.set_home().unwrap();
    assert_eq!(controller.state().home_offset, 8092);
}

#[test]
fn stalled_homing_times_out_and_restores_speed() {
    let config = StageConfig {
        homing_timeout_ms: Some(20),
        ..fast_config()
    };
    let (controller, handle) = ready_with(SimulatedLink::closed_loop(), config);
    handle.set_position(5000);
    handle.set_stalled(true);

    let result = controller.home();
    assert!(matches!(
        result,
        Err(StageError::HomingTimeout { target: 0, position: 5000 })
    ));
    assert_eq!(handle.velocity_limit(), Some(8.5));
}

#[test]
fn stepper_home_and_set_home_use_firmware() {
    let (controller, handle) = ready_stepper();
    controller.set_home().unwrap();
    controller.home().unwrap();
    assert_eq!(handle.commands(), vec![Command::SetHome, Command::GoHome]);
    assert_eq!(controller.position().unwrap(), Position::Unknown);
}

// =============================================================================
// STOP
// =============================================================================

#[test]
fn closed_loop_stop_cycles_axis_state() {
    let (controller, handle) = ready_closed_loop();
    controller.stop().unwrap();
    assert_eq!(
        handle.commands(),
        vec![
            Command::RequestState(AxisState::Idle),
            Command::RequestState(AxisState::ClosedLoopControl),
        ]
    );
    assert_eq!(handle.axis_state(), AxisState::ClosedLoopControl);
}

#[test]
fn stepper_stop_reconnects() {
    let (controller, handle) = ready_stepper();
    controller.stop().unwrap();
    assert_eq!(handle.reconnects(), 1);
    assert!(handle.commands().is_empty());
}

// =============================================================================
// ANTI-COGGING
// =============================================================================

#[test]
fn anticogging_restores_previous_gains() {
    let (controller, handle) = ready_closed_loop();
    let original = handle.gains();
    let calibration = controller.config().anticogging_gains;

    controller.calibrate_anticogging().unwrap();

    assert_eq!(
        handle.commands(),
        vec![
            Command::SetGains(calibration),
            Command::StartAnticogging,
            Command::SetGains(original),
        ]
    );
    assert_eq!(handle.gains(), original);
}

#[test]
fn anticogging_without_restore_keeps_calibration_gains() {
    let calibration = Gains {
        pos_gain: 80.0,
        vel_gain: 0.0002,
        vel_integrator_gain: 0.0,
    };
    let config = StageConfig {
        restore_gains_after_anticogging: false,
        anticogging_gains: calibration,
        ..fast_config()
    };
    let (controller, handle) = ready_with(SimulatedLink::closed_loop(), config);

    controller.calibrate_anticogging().unwrap();
    assert_eq!(handle.gains(), calibration);
    assert_eq!(handle.commands().last(), Some(&Command::StartAnticogging));
}

#[test]
fn anticogging_unsupported_on_stepper() {
    let (controller, handle) = ready_stepper();
    let result = controller.calibrate_anticogging();
    assert!(matches!(result, Err(StageError::Unsupported { .. })));
    assert!(handle.commands().is_empty());
}

// =============================================================================
// TRANSPORT FAULTS
// =============================================================================

#[test]
fn transport_fault_is_returned_not_panicked() {
    let (controller, handle) = ready_closed_loop();
    handle.set_fail_transport(true);

    assert!(matches!(controller.turn(), Err(StageError::Transport(_))));
    assert!(matches!(controller.set_speed(Some("5")), Err(StageError::Transport(_))));
    assert!(controller.position().is_err());
    assert_eq!(controller.status().position, Position::Unknown);
    // The failed write must not have been recorded as the new speed.
    assert_eq!(controller.state().speed_limit, 8.5);

    handle.set_fail_transport(false);
    assert!(controller.turn().is_ok());
}
