//! Stepper controller link: plain-text command frames over a serial port.
//!
//! A frame is `<verb><parameter?>`, UTF-8, with no terminator, checksum or
//! acknowledgement. Verbs: `rpm`, `fix`, `hom`, `rev`, `deg`.

use super::ActuatorLink;
use super::port::Port;
use crate::{CalibrationState, Command, LinkKind, StageConfig, StageError};

/// Link to a stepper controller that executes moves on its own.
pub struct SerialLink {
    port: Port,
}

impl SerialLink {
    pub fn new(config: &StageConfig) -> Self {
        Self {
            port: Port::new(config),
        }
    }
}

impl ActuatorLink for SerialLink {
    fn kind(&self) -> LinkKind {
        LinkKind::Serial
    }

    fn closed_loop(&self) -> bool {
        false
    }

    fn connect(&mut self) -> Result<(), StageError> {
        self.port.connect()
    }

    fn reconnect(&mut self) -> Result<(), StageError> {
        self.port.reconnect()
    }

    fn send_command(&mut self, command: &Command) -> Result<(), StageError> {
        let frame = frame(command)?;
        tracing::debug!(frame = %frame, "Serial write");
        self.port.write(frame.as_bytes())
    }

    fn read_position(&mut self) -> Result<i64, StageError> {
        Err(StageError::Unsupported {
            link: LinkKind::Serial,
            operation: "read_position",
        })
    }

    /// The stepper has no calibration of its own; it is ready once open.
    fn read_calibration_state(&mut self) -> Result<CalibrationState, StageError> {
        Ok(CalibrationState::Idle)
    }
}

/// Encode a command as a stepper text frame.
pub fn frame(command: &Command) -> Result<String, StageError> {
    let (verb, parameter) = match command {
        Command::SetVelocityLimit(rpm) => ("rpm", Some(*rpm)),
        Command::SetHome => ("fix", None),
        Command::GoHome => ("hom", None),
        Command::TurnRevolutions(turns) => ("rev", Some(*turns)),
        Command::TurnDegrees(degrees) => ("deg", Some(*degrees)),
        other => {
            return Err(StageError::Unsupported {
                link: LinkKind::Serial,
                operation: other.name(),
            });
        }
    };
    let mut frame = verb.to_string();
    if let Some(text) = parameter.and_then(format_parameter) {
        frame.push_str(&text);
    }
    Ok(frame)
}

/// Render a parameter the way the firmware expects it.
///
/// Zero is omitted entirely; integral values keep one decimal place.
fn format_parameter(value: f64) -> Option<String> {
    if value == 0.0 {
        return None;
    }
    if value.fract() == 0.0 && value.abs() < 1e15 {
        Some(format!("{:.1}", value))
    } else {
        Some(format!("{}", value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::AxisState;

    #[test]
    fn frames_match_firmware_verbs() {
        assert_eq!(frame(&Command::SetVelocityLimit(8.5)).ok(), Some("rpm8.5".into()));
        assert_eq!(frame(&Command::SetHome).ok(), Some("fix".into()));
        assert_eq!(frame(&Command::GoHome).ok(), Some("hom".into()));
        assert_eq!(frame(&Command::TurnRevolutions(1.0)).ok(), Some("rev1.0".into()));
        assert_eq!(frame(&Command::TurnRevolutions(-0.05)).ok(), Some("rev-0.05".into()));
        assert_eq!(frame(&Command::TurnDegrees(90.0)).ok(), Some("deg90.0".into()));
        assert_eq!(frame(&Command::SetVelocityLimit(100.0)).ok(), Some("rpm100.0".into()));
    }

    #[test]
    fn zero_parameter_is_omitted() {
        assert_eq!(frame(&Command::TurnRevolutions(0.0)).ok(), Some("rev".into()));
    }

    #[test]
    fn closed_loop_commands_rejected() {
        let err = frame(&Command::RequestState(AxisState::Idle));
        assert!(matches!(err, Err(StageError::Unsupported { .. })));
        assert!(frame(&Command::SetPositionSetpoint(10)).is_err());
    }

    fn absent_device() -> StageConfig {
        StageConfig {
            device_path: "/nonexistent/ttyX".to_string(),
            connect_retry_ms: 5,
            connect_timeout_ms: Some(30),
            ..StageConfig::default()
        }
    }

    #[test]
    fn connect_gives_up_on_absent_device() {
        let mut link = SerialLink::new(&absent_device());
        assert!(matches!(link.connect(), Err(StageError::DeviceUnavailable(_))));
        assert!(matches!(link.reconnect(), Err(StageError::Transport(_))));
    }

    #[test]
    fn send_before_connect_is_transport_error() {
        let mut link = SerialLink::new(&absent_device());
        assert!(matches!(
            link.send_command(&Command::GoHome),
            Err(StageError::Transport(_))
        ));
        // Framing errors win over the missing port.
        assert!(matches!(
            link.send_command(&Command::StartAnticogging),
            Err(StageError::Unsupported { .. })
        ));
    }
}
