//! Polling "read until terminator" primitive.
//!
//! A serial stream offers no blocking wait with a deadline, so reads poll
//! the transport's available-byte count. Timeouts count idle polls only:
//! any byte that arrives resets the budget.

use std::thread;
use std::time::Duration;

use crate::cancel::CancelToken;
use crate::error::{Error, Result};
use crate::transport::Transport;

/// Idle-time accounting for one framed read.
#[derive(Debug, Clone, Copy)]
struct IdleBudget {
    /// Consecutive polls that found no input.
    polls: u32,
    /// Sleep per idle poll.
    interval: Duration,
    /// Allowed idle time; `None` is unbounded.
    timeout: Option<Duration>,
}

impl IdleBudget {
    /// Fresh budget.
    const fn new(interval: Duration, timeout: Option<Duration>) -> Self {
        Self {
            polls: 0,
            interval,
            timeout,
        }
    }

    /// Idle time accumulated so far: `polls × interval`.
    fn idle(&self) -> Duration {
        self.interval.saturating_mul(self.polls)
    }

    /// `true` once the idle time has reached the timeout.
    fn exhausted(&self) -> bool {
        self.timeout.is_some_and(|t| self.idle() >= t)
    }

    /// Records one idle poll.
    const fn tick(&mut self) {
        self.polls = self.polls.saturating_add(1);
    }

    /// Input arrived.
    const fn reset(&mut self) {
        self.polls = 0;
    }
}

/// Reads framed data from a [`Transport`] by polling.
#[derive(Debug, Clone)]
pub struct FramedReader {
    /// Sleep between polls while no input is available.
    poll_interval: Duration,
    /// Checked once per poll.
    cancel: CancelToken,
}

impl FramedReader {
    /// Creates a reader polling every `poll_interval`.
    pub const fn new(poll_interval: Duration, cancel: CancelToken) -> Self {
        Self {
            poll_interval,
            cancel,
        }
    }

    /// Poll interval in use.
    pub const fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// Reads until at least `min_bytes` have arrived and the buffer ends
    /// with `terminator`.
    ///
    /// Bytes are read one at a time so nothing past the terminator is
    /// consumed; each is also passed to `on_chunk`. Returns the whole
    /// buffer including the terminator. Fails with [`Error::Timeout`]
    /// (carrying the bytes read so far) once `timeout` of idle polling has
    /// passed, or [`Error::Cancelled`].
    pub fn read_until<T: Transport + ?Sized>(
        &self,
        transport: &mut T,
        min_bytes: usize,
        terminator: &[u8],
        timeout: Option<Duration>,
        mut on_chunk: Option<&mut dyn FnMut(&[u8])>,
    ) -> Result<Vec<u8>> {
        let mut data = Vec::new();
        let mut idle = IdleBudget::new(self.poll_interval, timeout);
        loop {
            if data.len() >= min_bytes && data.ends_with(terminator) {
                return Ok(data);
            }
            self.cancel.check()?;
            if transport.bytes_available()? > 0 {
                let mut byte = [0u8; 1];
                transport.read_exact(&mut byte)?;
                data.push(byte[0]);
                if let Some(sink) = on_chunk.as_mut() {
                    sink(&byte);
                }
                idle.reset();
            } else {
                if idle.exhausted() {
                    return Err(Error::Timeout {
                        expected: terminator.escape_ascii().to_string(),
                        waited: idle.idle(),
                        received: data,
                    });
                }
                idle.tick();
                thread::sleep(self.poll_interval);
            }
        }
    }

    /// Reads exactly `n` bytes, polling like [`read_until`](Self::read_until).
    pub fn read_exact<T: Transport + ?Sized>(
        &self,
        transport: &mut T,
        n: usize,
        timeout: Option<Duration>,
    ) -> Result<Vec<u8>> {
        let mut data = Vec::with_capacity(n);
        let mut idle = IdleBudget::new(self.poll_interval, timeout);
        while data.len() < n {
            self.cancel.check()?;
            let available = transport.bytes_available()?;
            if available > 0 {
                let start = data.len();
                data.resize(start + available.min(n - start), 0);
                transport.read_exact(&mut data[start..])?;
                idle.reset();
            } else {
                if idle.exhausted() {
                    return Err(Error::Timeout {
                        expected: format!("{n} bytes"),
                        waited: idle.idle(),
                        received: data,
                    });
                }
                idle.tick();
                thread::sleep(self.poll_interval);
            }
        }
        Ok(data)
    }

    /// Discards whatever input is immediately available. Returns the
    /// number of bytes dropped.
    pub fn drain<T: Transport + ?Sized>(&self, transport: &mut T) -> Result<usize> {
        let mut dropped = 0;
        let mut buf = Vec::new();
        loop {
            let n = transport.bytes_available()?;
            if n == 0 {
                return Ok(dropped);
            }
            buf.resize(n, 0);
            transport.read_exact(&mut buf)?;
            dropped += n;
        }
    }
}
