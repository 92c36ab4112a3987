//! Byte-oriented link to the board.

use std::io::{self, Read, Write};
use std::thread;
use std::time::Duration;

use serialport::SerialPort;

use crate::config::SessionConfig;
use crate::error::{Error, Result};

/// Blocking timeout applied to the serial port itself. Framed reads only
/// ask for bytes the port reports as available, so this is a backstop.
const PORT_TIMEOUT: Duration = Duration::from_secs(1);

/// A serial-like connection to a board.
pub trait Transport {
    /// Writes all of `data`.
    fn write_all(&mut self, data: &[u8]) -> io::Result<()>;

    /// Number of bytes that can be read without blocking.
    fn bytes_available(&mut self) -> io::Result<usize>;

    /// Reads exactly `buf.len()` bytes.
    fn read_exact(&mut self, buf: &mut [u8]) -> io::Result<()>;

    /// Closes the connection. Further calls fail.
    fn close(&mut self) -> io::Result<()>;
}

/// [`Transport`] over a local serial port.
pub struct SerialTransport {
    /// Device path, kept for log messages.
    device: String,
    /// Open port; `None` once closed.
    port: Option<Box<dyn SerialPort>>,
}

impl std::fmt::Debug for SerialTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerialTransport")
            .field("device", &self.device)
            .field("open", &self.port.is_some())
            .finish()
    }
}

impl SerialTransport {
    /// Opens `config.device`, retrying `config.open_retries` extra times.
    pub fn open(config: &SessionConfig) -> Result<Self> {
        let attempts = config.open_retries.saturating_add(1);
        let mut reason = String::new();
        for attempt in 1..=attempts {
            match serialport::new(config.device.as_str(), config.baud_rate)
                .timeout(PORT_TIMEOUT)
                .open()
            {
                Ok(port) => {
                    tracing::debug!(device = %config.device, baud = config.baud_rate, attempt, "serial port open");
                    return Ok(Self {
                        device: config.device.clone(),
                        port: Some(port),
                    });
                }
                Err(e) => {
                    tracing::warn!(device = %config.device, attempt, error = %e, "serial port open failed");
                    reason = e.to_string();
                    if attempt < attempts {
                        thread::sleep(config.open_retry_delay);
                    }
                }
            }
        }
        Err(Error::Connection {
            device: config.device.clone(),
            attempts,
            reason,
        })
    }

    /// Device path this transport was opened on.
    pub fn device(&self) -> &str {
        &self.device
    }

    /// The open port, or `NotConnected` after [`close`](Transport::close).
    fn port(&mut self) -> io::Result<&mut Box<dyn SerialPort>> {
        self.port
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "serial port closed"))
    }
}

impl Transport for SerialTransport {
    fn write_all(&mut self, data: &[u8]) -> io::Result<()> {
        let port = self.port()?;
        port.write_all(data)?;
        port.flush()
    }

    fn bytes_available(&mut self) -> io::Result<usize> {
        let n = self.port()?.bytes_to_read()?;
        Ok(usize::try_from(n).unwrap_or(usize::MAX))
    }

    fn read_exact(&mut self, buf: &mut [u8]) -> io::Result<()> {
        Read::read_exact(self.port()?, buf)
    }

    fn close(&mut self) -> io::Result<()> {
        if self.port.take().is_some() {
            tracing::debug!(device = %self.device, "serial port closed");
        }
        Ok(())
    }
}
