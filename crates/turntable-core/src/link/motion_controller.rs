//! Closed-loop motion controller link.
//!
//! The controller exposes its configuration as a property tree reachable
//! over an ASCII line protocol:
//!
//! ```text
//! w axis0.controller.config.vel_limit 25      (write, no reply)
//! r axis0.encoder.pos_estimate                (read, one reply line)
//! ```

use super::ActuatorLink;
use super::port::Port;
use crate::{AxisState, CalibrationState, Command, Gains, LinkKind, StageConfig, StageError};

/// Link to a motion controller running its own position loop.
pub struct MotionControllerLink {
    port: Port,
    axis: u8,
}

impl MotionControllerLink {
    pub fn new(config: &StageConfig) -> Self {
        Self {
            port: Port::new(config),
            axis: config.axis,
        }
    }

    fn read_property(&mut self, property: &str) -> Result<String, StageError> {
        let path = format!("axis{}.{}", self.axis, property);
        self.port.request(format!("r {}\n", path).as_bytes())
    }

    fn read_real(&mut self, property: &str) -> Result<f64, StageError> {
        let reply = self.read_property(property)?;
        parse_real(&reply, property)
    }
}

impl ActuatorLink for MotionControllerLink {
    fn kind(&self) -> LinkKind {
        LinkKind::MotionController
    }

    fn closed_loop(&self) -> bool {
        true
    }

    fn connect(&mut self) -> Result<(), StageError> {
        self.port.connect()
    }

    fn reconnect(&mut self) -> Result<(), StageError> {
        self.port.reconnect()
    }

    fn send_command(&mut self, command: &Command) -> Result<(), StageError> {
        for (property, value) in property_writes(self.axis, command)? {
            tracing::debug!(property = %property, value = %value, "Property write");
            self.port
                .write(format!("w {} {}\n", property, value).as_bytes())?;
        }
        Ok(())
    }

    fn read_position(&mut self) -> Result<i64, StageError> {
        let estimate = self.read_real("encoder.pos_estimate")?;
        Ok(estimate.round() as i64)
    }

    fn read_calibration_state(&mut self) -> Result<CalibrationState, StageError> {
        let state = self.read_real("current_state")?;
        if state as u8 == AxisState::Idle.code() {
            Ok(CalibrationState::Idle)
        } else {
            Ok(CalibrationState::Calibrating)
        }
    }

    fn read_gains(&mut self) -> Result<Gains, StageError> {
        Ok(Gains {
            pos_gain: self.read_real("controller.config.pos_gain")?,
            vel_gain: self.read_real("controller.config.vel_gain")?,
            vel_integrator_gain: self.read_real("controller.config.vel_integrator_gain")?,
        })
    }

    fn anticogging_in_progress(&mut self) -> Result<bool, StageError> {
        let reply = self.read_property("controller.config.anticogging.calib_anticogging")?;
        parse_flag(&reply)
    }
}

/// Translate a command into `(property path, value)` writes.
pub fn property_writes(axis: u8, command: &Command) -> Result<Vec<(String, String)>, StageError> {
    let prop = |name: &str| format!("axis{}.{}", axis, name);
    let writes = match command {
        Command::SetVelocityLimit(limit) => {
            vec![(prop("controller.config.vel_limit"), limit.to_string())]
        }
        Command::RequestState(state) => {
            vec![(prop("requested_state"), state.code().to_string())]
        }
        Command::SetControlMode(mode) => {
            vec![(prop("controller.config.control_mode"), mode.code().to_string())]
        }
        Command::SetPositionSetpoint(ticks) => {
            vec![(prop("controller.pos_setpoint"), ticks.to_string())]
        }
        Command::SetGains(gains) => vec![
            (prop("controller.config.pos_gain"), gains.pos_gain.to_string()),
            (prop("controller.config.vel_gain"), gains.vel_gain.to_string()),
            (
                prop("controller.config.vel_integrator_gain"),
                gains.vel_integrator_gain.to_string(),
            ),
        ],
        Command::StartAnticogging => vec![(
            prop("controller.config.anticogging.calib_anticogging"),
            "1".to_string(),
        )],
        other => {
            return Err(StageError::Unsupported {
                link: LinkKind::MotionController,
                operation: other.name(),
            });
        }
    };
    Ok(writes)
}

fn parse_real(reply: &str, property: &str) -> Result<f64, StageError> {
    reply
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| StageError::Transport(format!("unexpected reply for {}: {:?}", property, reply)))
}

fn parse_flag(reply: &str) -> Result<bool, StageError> {
    match reply.trim() {
        "1" | "True" | "true" => Ok(true),
        "0" | "False" | "false" => Ok(false),
        other => Err(StageError::Transport(format!(
            "unexpected anti-cogging flag: {:?}",
            other
        ))),
    }
}
