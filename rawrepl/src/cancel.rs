//! Cooperative cancellation for blocking session operations.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use crate::error::{Error, Result};

/// Shared flag that aborts a session's waits at poll granularity.
///
/// Clones share the same flag. Checked by every framed read, every
/// [`sleep`](Self::sleep), and between upload steps; never in the middle
/// of writing a command.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    /// Creates a token that is not cancelled.
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Returns `true` once [`cancel`](Self::cancel) has been called.
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Fails with [`Error::Cancelled`] if cancellation was requested.
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(Error::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Sleeps for `duration` in slices of at most `slice`, checking the
    /// flag before each one.
    pub fn sleep(&self, duration: Duration, slice: Duration) -> Result<()> {
        let deadline = Instant::now() + duration;
        loop {
            self.check()?;
            let now = Instant::now();
            if now >= deadline {
                return Ok(());
            }
            thread::sleep((deadline - now).min(slice));
        }
    }

    /// Cancels this token when the process receives `SIGINT`.
    #[cfg(unix)]
    pub fn on_interrupt_signal(&self) -> std::io::Result<signal_hook::SigId> {
        signal_hook::flag::register(signal_hook::consts::SIGINT, Arc::clone(&self.0))
    }
}
