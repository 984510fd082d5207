//! # Stage Primitives
//!
//! Compiled-in defaults for the turntable core.
//!
//! Every value here can be overridden through [`StageConfig`](crate::StageConfig);
//! these constants are what a freshly constructed configuration starts from.

/// Encoder counts per full revolution of the stage.
///
/// Defines the modulus for homing targets and home offsets.
pub const TICKS_PER_REVOLUTION: i64 = 8192;

/// Upper bound for the configured speed limit.
pub const MAX_SPEED: f64 = 100.0;

/// Speed limit in effect from startup until the first speed change.
pub const INITIAL_SPEED: f64 = 8.5;

/// Speed applied when a speed input is absent or malformed.
pub const DEFAULT_SPEED: f64 = 1.0;

/// Revolutions per "turn" when a turns input is absent or malformed.
pub const DEFAULT_TURN_INCREMENT: f64 = 1.0;

/// Velocity limit used while homing.
pub const HOMING_SPEED: f64 = 25.0;

/// Homing is complete once the encoder is within this many ticks of the target.
pub const HOMING_TOLERANCE: i64 = 10;

/// Interval between position or calibration polls.
pub const POLL_INTERVAL_MS: u64 = 100;

/// Interval between checks for the device path while connecting.
pub const CONNECT_RETRY_MS: u64 = 1000;

/// Settle delay between leaving and re-entering closed-loop control on stop.
pub const STOP_SETTLE_MS: u64 = 250;

/// Baud rate of the stepper controller's serial link.
pub const SERIAL_BAUD: u32 = 56_000;

/// Baud rate of the motion controller's ASCII interface.
pub const MOTION_CONTROLLER_BAUD: u32 = 115_200;

/// Read timeout for motion-controller property replies.
pub const REPLY_TIMEOUT_MS: u64 = 500;

/// Default device path of the stage controller.
pub const DEFAULT_DEVICE_PATH: &str = "/dev/ttyACM0";

// =============================================================================
// PANEL STEP SIZES
// =============================================================================

/// Revolutions moved by the panel's fine step buttons.
pub const FINE_STEP: f64 = 0.01;

/// Revolutions moved by the panel's coarse step buttons.
pub const COARSE_STEP: f64 = 0.05;

// =============================================================================
// ANTI-COGGING CALIBRATION GAINS
// =============================================================================

/// Position gain while the anti-cogging map is recorded.
pub const ANTICOGGING_POS_GAIN: f64 = 150.0;

/// Velocity gain while the anti-cogging map is recorded.
pub const ANTICOGGING_VEL_GAIN: f64 = 0.0005;

/// Velocity integrator gain while the anti-cogging map is recorded.
pub const ANTICOGGING_VEL_INTEGRATOR_GAIN: f64 = 0.0;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_within_speed_bounds() {
        assert!(DEFAULT_SPEED >= 0.0 && DEFAULT_SPEED <= MAX_SPEED);
        assert!(INITIAL_SPEED >= 0.0 && INITIAL_SPEED <= MAX_SPEED);
        assert!(HOMING_SPEED >= 0.0 && HOMING_SPEED <= MAX_SPEED);
    }

    #[test]
    fn tolerance_smaller_than_revolution() {
        assert!(HOMING_TOLERANCE > 0 && HOMING_TOLERANCE < TICKS_PER_REVOLUTION);
    }
}
