//! # Stage Configuration
//!
//! `StageConfig` carries every tunable of the core. It deserializes from the
//! `[stage]` table of the application's TOML file; missing keys fall back to
//! the constants in [`primitives`](crate::primitives).

use crate::primitives::{
    ANTICOGGING_POS_GAIN, ANTICOGGING_VEL_GAIN, ANTICOGGING_VEL_INTEGRATOR_GAIN, CONNECT_RETRY_MS,
    DEFAULT_DEVICE_PATH, DEFAULT_TURN_INCREMENT, HOMING_SPEED, HOMING_TOLERANCE, INITIAL_SPEED,
    MAX_SPEED, MOTION_CONTROLLER_BAUD, POLL_INTERVAL_MS, REPLY_TIMEOUT_MS, SERIAL_BAUD,
    STOP_SETTLE_MS, TICKS_PER_REVOLUTION,
};
use crate::{Gains, LinkKind, StageError};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Tunables for the link, controller and initialization sequencer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StageConfig {
    /// Which actuator link to open.
    pub transport: LinkKind,
    /// Serial device path.
    pub device_path: String,
    /// Baud rate; `None` picks the transport's default.
    pub baud_rate: Option<u32>,
    /// Motion-controller axis index.
    pub axis: u8,

    pub ticks_per_revolution: i64,
    pub max_speed: f64,
    /// Speed limit in effect before the first `set_speed`.
    pub initial_speed: f64,
    /// Turn increment in effect before the first `set_turns`.
    pub initial_turns: f64,

    pub homing_speed: f64,
    pub homing_tolerance: i64,
    pub home_on_startup: bool,

    pub poll_interval_ms: u64,
    pub connect_retry_ms: u64,
    pub stop_settle_ms: u64,
    pub reply_timeout_ms: u64,

    /// Give up connecting after this long. `None` waits forever.
    pub connect_timeout_ms: Option<u64>,
    /// Give up homing after this long. `None` polls until arrival.
    pub homing_timeout_ms: Option<u64>,
    /// Give up waiting for device calibration after this long.
    pub calibration_timeout_ms: Option<u64>,

    /// Gains applied while the anti-cogging map is recorded.
    pub anticogging_gains: Gains,
    /// Put the previous gains back once anti-cogging calibration completes.
    pub restore_gains_after_anticogging: bool,
}

impl Default for StageConfig {
    fn default() -> Self {
        Self {
            transport: LinkKind::Serial,
            device_path: DEFAULT_DEVICE_PATH.to_string(),
            baud_rate: None,
            axis: 0,
            ticks_per_revolution: TICKS_PER_REVOLUTION,
            max_speed: MAX_SPEED,
            initial_speed: INITIAL_SPEED,
            initial_turns: DEFAULT_TURN_INCREMENT,
            homing_speed: HOMING_SPEED,
            homing_tolerance: HOMING_TOLERANCE,
            home_on_startup: true,
            poll_interval_ms: POLL_INTERVAL_MS,
            connect_retry_ms: CONNECT_RETRY_MS,
            stop_settle_ms: STOP_SETTLE_MS,
            reply_timeout_ms: REPLY_TIMEOUT_MS,
            connect_timeout_ms: None,
            homing_timeout_ms: None,
            calibration_timeout_ms: None,
            anticogging_gains: Gains {
                pos_gain: ANTICOGGING_POS_GAIN,
                vel_gain: ANTICOGGING_VEL_GAIN,
                vel_integrator_gain: ANTICOGGING_VEL_INTEGRATOR_GAIN,
            },
            restore_gains_after_anticogging: true,
        }
    }
}

impl StageConfig {
    /// Reject values the controller cannot work with.
    pub fn validate(&self) -> Result<(), StageError> {
        if self.ticks_per_revolution <= 0 {
            return Err(StageError::Config(format!(
                "ticks_per_revolution must be positive, got {}",
                self.ticks_per_revolution
            )));
        }
        if !self.max_speed.is_finite() || self.max_speed < 0.0 {
            return Err(StageError::Config(format!(
                "max_speed must be a non-negative number, got {}",
                self.max_speed
            )));
        }
        if !self.homing_speed.is_finite() || self.homing_speed < 0.0 {
            return Err(StageError::Config(format!(
                "homing_speed must be a non-negative number, got {}",
                self.homing_speed
            )));
        }
        if !self.initial_turns.is_finite() {
            return Err(StageError::Config("initial_turns must be finite".into()));
        }
        if self.homing_tolerance < 0 {
            return Err(StageError::Config(format!(
                "homing_tolerance must not be negative, got {}",
                self.homing_tolerance
            )));
        }
        if self.poll_interval_ms == 0 || self.connect_retry_ms == 0 {
            return Err(StageError::Config(
                "poll_interval_ms and connect_retry_ms must be at least 1".into(),
            ));
        }
        if self.device_path.is_empty() && self.transport != LinkKind::Simulated {
            return Err(StageError::Config("device_path must not be empty".into()));
        }
        Ok(())
    }

    /// Baud rate for the configured transport.
    #[must_use]
    pub fn effective_baud_rate(&self) -> u32 {
        self.baud_rate.unwrap_or(match self.transport {
            LinkKind::MotionController => MOTION_CONTROLLER_BAUD,
            LinkKind::Serial | LinkKind::Simulated => SERIAL_BAUD,
        })
    }

    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    #[must_use]
    pub fn connect_retry(&self) -> Duration {
        Duration::from_millis(self.connect_retry_ms)
    }

    #[must_use]
    pub fn stop_settle(&self) -> Duration {
        Duration::from_millis(self.stop_settle_ms)
    }

    #[must_use]
    pub fn reply_timeout(&self) -> Duration {
        Duration::from_millis(self.reply_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_valid() {
        let config = StageConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.ticks_per_revolution, 8192);
        assert_eq!(config.effective_baud_rate(), 56_000);
    }

    #[test]
    fn motion_controller_baud_default() {
        let config = StageConfig {
            transport: LinkKind::MotionController,
            ..StageConfig::default()
        };
        assert_eq!(config.effective_baud_rate(), 115_200);
    }

    #[test]
    fn rejects_zero_ticks() {
        let config = StageConfig {
            ticks_per_revolution: 0,
            ..StageConfig::default()
        };
        assert!(matches!(config.validate(), Err(StageError::Config(_))));
    }

    #[test]
    fn rejects_zero_poll_interval() {
        let config = StageConfig {
            poll_interval_ms: 0,
            ..StageConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
