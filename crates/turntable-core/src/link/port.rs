//! Serial port handle shared by the stepper and motion-controller links.

use crate::{StageConfig, StageError};
use serialport::{ClearBuffer, SerialPort};
use std::io::{BufRead, BufReader, Write};
use std::path::Path;
use std::thread;
use std::time::{Duration, Instant};

pub(crate) struct Port {
    path: String,
    baud_rate: u32,
    retry: Duration,
    connect_timeout: Option<Duration>,
    reply_timeout: Duration,
    reader: Option<BufReader<Box<dyn SerialPort>>>,
}

impl Port {
    pub(crate) fn new(config: &StageConfig) -> Self {
        Self {
            path: config.device_path.clone(),
            baud_rate: config.effective_baud_rate(),
            retry: config.connect_retry(),
            connect_timeout: config.connect_timeout_ms.map(Duration::from_millis),
            reply_timeout: config.reply_timeout(),
            reader: None,
        }
    }

    /// Wait for the device node to appear, then open it.
    pub(crate) fn connect(&mut self) -> Result<(), StageError> {
        let started = Instant::now();
        while !Path::new(&self.path).exists() {
            if let Some(limit) = self.connect_timeout
                && started.elapsed() >= limit
            {
                return Err(StageError::DeviceUnavailable(format!(
                    "{} did not appear within {} ms",
                    self.path,
                    limit.as_millis()
                )));
            }
            tracing::info!(device = %self.path, "Waiting for motor");
            thread::sleep(self.retry);
        }
        self.open()
    }

    /// Drop the open handle (closing it) and open the device again.
    pub(crate) fn reconnect(&mut self) -> Result<(), StageError> {
        if self.reader.take().is_some() {
            tracing::debug!(device = %self.path, "Closed serial port");
        }
        self.open()
    }

    fn open(&mut self) -> Result<(), StageError> {
        let port = serialport::new(self.path.as_str(), self.baud_rate)
            .timeout(self.reply_timeout)
            .open()?;
        tracing::info!(device = %self.path, baud = self.baud_rate, "Opened serial port");
        self.reader = Some(BufReader::new(port));
        Ok(())
    }

    fn handle(&mut self) -> Result<&mut BufReader<Box<dyn SerialPort>>, StageError> {
        self.reader
            .as_mut()
            .ok_or_else(|| StageError::Transport(format!("{} is not open", self.path)))
    }

    pub(crate) fn write(&mut self, bytes: &[u8]) -> Result<(), StageError> {
        let port = self.handle()?.get_mut();
        port.write_all(bytes)?;
        port.flush()?;
        Ok(())
    }

    /// Discard stale input, write a request and read one reply line.
    pub(crate) fn request(&mut self, bytes: &[u8]) -> Result<String, StageError> {
        let reader = self.handle()?;
        // Drop anything buffered from earlier replies before asking again.
        if let Err(e) = reader.get_mut().clear(ClearBuffer::Input) {
            tracing::debug!(error = %e, "Input buffer clear failed");
        }
        let stale = reader.buffer().len();
        reader.consume(stale);

        let port = reader.get_mut();
        port.write_all(bytes)?;
        port.flush()?;

        let mut line = String::new();
        reader.read_line(&mut line)?;
        let reply = line.trim();
        if reply.is_empty() {
            return Err(StageError::Transport("empty reply from device".into()));
        }
        Ok(reply.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_for(path: &Path, connect_timeout_ms: Option<u64>) -> StageConfig {
        StageConfig {
            device_path: path.display().to_string(),
            connect_retry_ms: 5,
            connect_timeout_ms,
            ..StageConfig::default()
        }
    }

    #[test]
    fn missing_device_times_out() {
        let Ok(dir) = tempfile::tempdir() else {
            unreachable!("temp dir");
        };
        let mut port = Port::new(&config_for(&dir.path().join("ttyX"), Some(30)));

        let started = Instant::now();
        let result = port.connect();
        assert!(matches!(result, Err(StageError::DeviceUnavailable(_))));
        assert!(started.elapsed() >= Duration::from_millis(30));
    }

    #[test]
    fn unopened_port_rejects_io() {
        let mut port = Port::new(&config_for(Path::new("/nonexistent/ttyX"), Some(0)));
        assert!(matches!(port.write(b"hom"), Err(StageError::Transport(_))));
        assert!(matches!(port.request(b"r x\n"), Err(StageError::Transport(_))));
    }

    #[test]
    fn failed_connect_leaves_port_closed() {
        let mut port = Port::new(&config_for(Path::new("/nonexistent/ttyX"), Some(10)));
        assert!(port.connect().is_err());
        assert!(matches!(port.write(b"fix"), Err(StageError::Transport(_))));
    }

    #[test]
    fn reconnect_to_missing_device_is_transport_error() {
        let mut port = Port::new(&config_for(Path::new("/nonexistent/ttyX"), None));
        assert!(matches!(port.reconnect(), Err(StageError::Transport(_))));
    }

    #[test]
    fn wait_ends_when_device_appears() {
        let Ok(dir) = tempfile::tempdir() else {
            unreachable!("temp dir");
        };
        let path = dir.path().join("ttyACM0");
        let mut port = Port::new(&config_for(&path, Some(5_000)));

        let late = path.clone();
        let creator = thread::spawn(move || {
            thread::sleep(Duration::from_millis(40));
            std::fs::write(late, b"").is_ok()
        });

        let started = Instant::now();
        // A regular file is not a tty, so opening it may still fail; the wait
        // itself must end well before the timeout.
        let result = port.connect();
        assert!(!matches!(result, Err(StageError::DeviceUnavailable(_))));
        assert!(started.elapsed() < Duration::from_millis(5_000));
        assert!(matches!(creator.join(), Ok(true)));
    }
}
