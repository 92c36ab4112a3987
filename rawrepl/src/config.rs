//! Session configuration: device, serial settings, chunking, and timing.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Lower bound applied to [`Timing::poll_interval`].
pub const MIN_POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Delays and budgets used while talking to the board.
///
/// Defaults match what real boards need after a port open. Use
/// [`Timing::immediate`] for simulated devices.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
#[non_exhaustive]
pub struct Timing {
    /// Sleep between polls when no input is available.
    pub poll_interval: Duration,
    /// Budget for each banner and prompt wait.
    pub banner_timeout: Duration,
    /// Pause after each interrupt when halting a running program.
    pub interrupt_delay: Duration,
    /// Pause between failed raw-mode requests.
    pub raw_retry_delay: Duration,
    /// Pause after the soft reboot before interrupting `main.py`.
    pub reboot_settle: Duration,
    /// Gap between the two post-reboot interrupts.
    pub reboot_interrupt_gap: Duration,
    /// Gap between the two interrupts sent before a hard reset.
    pub reset_gap: Duration,
    /// Interrupts sent after a hard reset to regain control.
    pub reset_interrupt_count: u32,
    /// Pause between those interrupts.
    pub reset_interrupt_delay: Duration,
}

impl Default for Timing {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(20),
            banner_timeout: Duration::from_secs(10),
            interrupt_delay: Duration::from_secs(1),
            raw_retry_delay: Duration::from_millis(200),
            reboot_settle: Duration::from_millis(500),
            reboot_interrupt_gap: Duration::from_millis(100),
            reset_gap: Duration::from_millis(300),
            reset_interrupt_count: 20,
            reset_interrupt_delay: Duration::from_millis(200),
        }
    }
}

impl Timing {
    /// No settle delays, 1 ms polling, and a 50 ms banner budget.
    pub fn immediate() -> Self {
        Self {
            poll_interval: MIN_POLL_INTERVAL,
            banner_timeout: Duration::from_millis(50),
            interrupt_delay: Duration::ZERO,
            raw_retry_delay: Duration::ZERO,
            reboot_settle: Duration::ZERO,
            reboot_interrupt_gap: Duration::ZERO,
            reset_gap: Duration::ZERO,
            reset_interrupt_delay: Duration::ZERO,
            ..Self::default()
        }
    }

    /// Poll interval clamped to [`MIN_POLL_INTERVAL`].
    pub fn poll(&self) -> Duration {
        self.poll_interval.max(MIN_POLL_INTERVAL)
    }
}

/// Configuration consumed by [`Session`](crate::Session).
///
/// Defaults: `/dev/ttyACM0` at 115200 baud, one open attempt, 10 s
/// execute timeout, 256-byte command writes, 1 KiB file chunks.
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use rawrepl::SessionConfig;
///
/// let config = SessionConfig::new("/dev/ttyUSB0")
///     .baud_rate(921_600)
///     .open_retries(5, Duration::from_secs(1))
///     .raw_delay(Duration::from_millis(500));
/// assert_eq!(config.command_chunk_size, 256);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
#[non_exhaustive]
pub struct SessionConfig {
    /// Serial device path (e.g. `/dev/ttyUSB0`, `COM3`).
    pub device: String,
    /// Baud rate.
    pub baud_rate: u32,
    /// Extra open attempts after the first one fails.
    pub open_retries: u32,
    /// Pause between open attempts.
    pub open_retry_delay: Duration,
    /// Settle time before the first raw-mode attempt.
    pub raw_delay: Option<Duration>,
    /// Per-execute output timeout. `None` waits indefinitely.
    pub exec_timeout: Option<Duration>,
    /// Maximum bytes per write while sending a command.
    pub command_chunk_size: usize,
    /// Pause after each command write.
    pub command_chunk_delay: Duration,
    /// Maximum file bytes per remote write call.
    pub file_chunk_size: usize,
    /// Protocol delays and budgets.
    pub timing: Timing,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            device: "/dev/ttyACM0".to_owned(),
            baud_rate: 115_200,
            open_retries: 0,
            open_retry_delay: Duration::from_secs(1),
            raw_delay: None,
            exec_timeout: Some(Duration::from_secs(10)),
            command_chunk_size: 256,
            command_chunk_delay: Duration::from_millis(10),
            file_chunk_size: 1024,
            timing: Timing::default(),
        }
    }
}

impl SessionConfig {
    /// Default configuration for `device`.
    pub fn new(device: impl Into<String>) -> Self {
        Self {
            device: device.into(),
            ..Self::default()
        }
    }

    /// Loads a configuration from a JSON file. Missing fields take defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let data = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&data)?)
    }

    /// Sets the baud rate (default: 115200).
    #[must_use]
    pub const fn baud_rate(mut self, baud: u32) -> Self {
        self.baud_rate = baud;
        self
    }

    /// Sets the open retry budget and the pause between attempts.
    #[must_use]
    pub const fn open_retries(mut self, retries: u32, delay: Duration) -> Self {
        self.open_retries = retries;
        self.open_retry_delay = delay;
        self
    }

    /// Waits `delay` before the first raw-mode attempt.
    #[must_use]
    pub const fn raw_delay(mut self, delay: Duration) -> Self {
        self.raw_delay = Some(delay);
        self
    }

    /// Sets the per-execute timeout (`None` waits indefinitely).
    #[must_use]
    pub const fn exec_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.exec_timeout = timeout;
        self
    }

    /// Sets the file data chunk size (default: 1024).
    #[must_use]
    pub const fn file_chunk_size(mut self, size: usize) -> Self {
        self.file_chunk_size = size;
        self
    }

    /// Replaces the protocol timing.
    #[must_use]
    pub fn timing(mut self, timing: Timing) -> Self {
        self.timing = timing;
        self
    }
}
