//! Raw REPL session: enter/exit raw mode and execute commands.
//!
//! A session owns its [`Transport`] exclusively. Raw mode is entered
//! explicitly with [`Session::enter_raw`]; [`Session::execute`] is only
//! valid while raw mode is active.

use std::fmt;
use std::path::Path;
use std::thread;
use std::time::Duration;

use rawrepl_proto::{
    END_OF_INPUT, ENTER_RAW_SEQ, EXEC_ACK, EXIT_RAW_SEQ, INTERRUPT, INTERRUPT_SEQ, PROMPT,
    RAW_BANNER, RAW_BANNER_LINE, RESET_COMMAND, SOFT_REBOOT_BANNER, snippet,
};

use crate::cancel::CancelToken;
use crate::config::SessionConfig;
use crate::error::{Error, Result};
use crate::reader::FramedReader;
use crate::transport::{SerialTransport, Transport};

/// Number of raw-mode requests before giving up.
pub const RAW_ENTRY_ATTEMPTS: u32 = 5;

/// Protocol state of a [`Session`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum SessionState {
    /// Friendly REPL (initial).
    Interactive,
    /// Raw-mode entry in progress.
    EnteringRaw,
    /// Raw mode active; commands may be executed.
    RawActive,
    /// A command is running.
    Executing,
    /// Transport closed.
    Closed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Interactive => "interactive",
            Self::EnteringRaw => "entering raw mode",
            Self::RawActive => "in raw mode",
            Self::Executing => "executing",
            Self::Closed => "closed",
        })
    }
}

/// Output captured from one raw-mode execution.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[non_exhaustive]
pub struct ExecOutput {
    /// Normal output, terminator stripped.
    pub stdout: Vec<u8>,
    /// Error output, terminator stripped. Non-empty means the remote
    /// code raised.
    pub stderr: Vec<u8>,
}

impl ExecOutput {
    /// Returns `true` if the remote code raised an exception.
    pub fn is_error(&self) -> bool {
        !self.stderr.is_empty()
    }

    /// Converts a non-empty error stream into [`Error::Remote`].
    pub fn into_result(self) -> Result<Vec<u8>> {
        if self.is_error() {
            Err(Error::Remote {
                stdout: self.stdout,
                stderr: self.stderr,
            })
        } else {
            Ok(self.stdout)
        }
    }
}

/// A raw REPL session with one board.
#[derive(Debug)]
pub struct Session<T: Transport> {
    /// Exclusively owned link to the board.
    transport: T,
    /// Framed reads over `transport`.
    reader: FramedReader,
    /// Settings fixed at construction.
    config: SessionConfig,
    /// Current protocol state.
    state: SessionState,
    /// Aborts waits when triggered.
    cancel: CancelToken,
}

impl Session<SerialTransport> {
    /// Opens the serial device named in `config` and wraps it in a session.
    pub fn open(config: &SessionConfig) -> Result<Self> {
        Ok(Self::new(SerialTransport::open(config)?, config.clone()))
    }
}

impl<T: Transport> Session<T> {
    /// Wraps an open transport. The session starts `Interactive`.
    pub fn new(transport: T, config: SessionConfig) -> Self {
        let cancel = CancelToken::new();
        Self {
            transport,
            reader: FramedReader::new(config.timing.poll(), cancel.clone()),
            config,
            state: SessionState::Interactive,
            cancel,
        }
    }

    /// Current protocol state.
    pub const fn state(&self) -> SessionState {
        self.state
    }

    /// Configuration this session was built with.
    pub const fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// A handle that cancels this session's waits.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Fails with [`Error::Cancelled`] if cancellation was requested.
    pub fn check_cancelled(&self) -> Result<()> {
        self.cancel.check()
    }

    /// Hard-resets a board in an unknown state: two interrupts, then
    /// `machine.reset()` typed into the friendly REPL.
    ///
    /// Only valid while `Interactive`; in raw mode the command would sit
    /// in the input buffer unexecuted.
    pub fn soft_reset(&mut self) -> Result<()> {
        if self.state != SessionState::Interactive {
            return Err(Error::InvalidState {
                op: "soft reset",
                state: self.state,
            });
        }
        self.reset_board()
    }

    /// Sends the reset sequence without a state check.
    fn reset_board(&mut self) -> Result<()> {
        let timing = self.config.timing.clone();
        self.transport.write_all(&[INTERRUPT])?;
        self.pause(timing.reset_gap)?;
        self.transport.write_all(&[INTERRUPT])?;
        self.pause(timing.interrupt_delay)?;
        self.transport.write_all(RESET_COMMAND)?;
        tracing::debug!("reset command sent");
        Ok(())
    }

    /// Puts the board into raw mode.
    ///
    /// With `soft_reset`, the board is hard-reset first and then flooded
    /// with interrupts to regain control. Fails with [`Error::Protocol`]
    /// if the raw banner is not seen after [`RAW_ENTRY_ATTEMPTS`] requests
    /// or a later banner is missing.
    pub fn enter_raw(&mut self, soft_reset: bool) -> Result<()> {
        if self.state != SessionState::Interactive {
            return Err(Error::InvalidState {
                op: "enter raw mode",
                state: self.state,
            });
        }
        self.state = SessionState::EnteringRaw;
        match self.enter_raw_steps(soft_reset) {
            Ok(()) => {
                self.state = SessionState::RawActive;
                tracing::debug!("raw REPL active");
                Ok(())
            }
            Err(Error::Cancelled) => {
                self.abandon();
                Err(Error::Cancelled)
            }
            Err(e) => {
                self.state = SessionState::Interactive;
                Err(e)
            }
        }
    }

    /// The raw-mode entry sequence proper.
    fn enter_raw_steps(&mut self, soft_reset: bool) -> Result<()> {
        let timing = self.config.timing.clone();
        if let Some(delay) = self.config.raw_delay {
            self.pause(delay)?;
        }

        if soft_reset {
            self.reset_board()?;
            for _ in 0..timing.reset_interrupt_count {
                self.transport.write_all(INTERRUPT_SEQ)?;
                self.pause(timing.reset_interrupt_delay)?;
            }
            self.pause(timing.interrupt_delay)?;
            self.transport.write_all(INTERRUPT_SEQ)?;
        }

        // Halt any running program.
        self.transport.write_all(INTERRUPT_SEQ)?;
        self.pause(timing.interrupt_delay)?;
        self.transport.write_all(INTERRUPT_SEQ)?;
        self.pause(timing.interrupt_delay)?;

        let dropped = self.reader.drain(&mut self.transport)?;
        tracing::debug!(dropped, "drained pending input");

        self.request_raw(timing.banner_timeout, timing.raw_retry_delay)?;

        // Ctrl-D on an empty raw line restarts the interpreter.
        self.transport.write_all(&[END_OF_INPUT])?;
        self.expect(SOFT_REBOOT_BANNER, timing.banner_timeout)?;

        // Interrupt main.py if the reboot started it.
        self.pause(timing.reboot_settle)?;
        self.transport.write_all(&[INTERRUPT])?;
        self.pause(timing.reboot_interrupt_gap)?;
        self.transport.write_all(&[INTERRUPT])?;

        // Leaves the trailing prompt for the next execute.
        self.expect(RAW_BANNER_LINE, timing.banner_timeout)
    }

    /// Sends raw-mode requests until the banner appears.
    fn request_raw(&mut self, timeout: Duration, retry_delay: Duration) -> Result<()> {
        for attempt in 1..=RAW_ENTRY_ATTEMPTS {
            self.transport.write_all(ENTER_RAW_SEQ)?;
            match self
                .reader
                .read_until(&mut self.transport, 1, RAW_BANNER, Some(timeout), None)
            {
                Ok(_) => return Ok(()),
                Err(Error::Timeout { received, .. }) => {
                    tracing::warn!(
                        attempt,
                        received = %received.escape_ascii(),
                        "raw REPL banner not seen"
                    );
                    if attempt < RAW_ENTRY_ATTEMPTS {
                        self.pause(retry_delay)?;
                    }
                }
                Err(e) => return Err(e),
            }
        }
        Err(Error::Protocol("could not enter raw repl".to_owned()))
    }

    /// Waits for `banner`, turning a timeout into a protocol error.
    fn expect(&mut self, banner: &[u8], timeout: Duration) -> Result<()> {
        match self
            .reader
            .read_until(&mut self.transport, 1, banner, Some(timeout), None)
        {
            Ok(_) => Ok(()),
            Err(Error::Timeout { received, .. }) => {
                tracing::debug!(
                    expected = %banner.escape_ascii(),
                    received = %received.escape_ascii(),
                    "banner mismatch"
                );
                Err(Error::Protocol("could not enter raw repl".to_owned()))
            }
            Err(e) => Err(e),
        }
    }

    /// Leaves raw mode. No acknowledgement is expected.
    pub fn exit_raw(&mut self) -> Result<()> {
        self.require_open("exit raw mode")?;
        self.transport.write_all(EXIT_RAW_SEQ)?;
        self.state = SessionState::Interactive;
        Ok(())
    }

    /// Executes `command` and collects both output streams.
    ///
    /// `timeout` bounds the idle time while waiting for each stream
    /// (`None` waits indefinitely). `sink` receives normal output as it
    /// arrives, with terminators removed. A non-empty
    /// [`ExecOutput::stderr`] is returned as-is; see [`exec_text`](Self::exec_text)
    /// for the checked variant.
    pub fn execute(
        &mut self,
        command: &[u8],
        timeout: Option<Duration>,
        sink: Option<&mut dyn FnMut(&[u8])>,
    ) -> Result<ExecOutput> {
        if self.state != SessionState::RawActive {
            return Err(Error::InvalidState {
                op: "execute",
                state: self.state,
            });
        }
        self.state = SessionState::Executing;
        let result = self.submit(command).and_then(|()| self.follow(timeout, sink));
        self.state = SessionState::RawActive;
        if let Err(Error::Cancelled) = result {
            self.abandon();
        }
        result
    }

    /// Sends one command and checks the acknowledgement.
    fn submit(&mut self, command: &[u8]) -> Result<()> {
        let banner_timeout = self.config.timing.banner_timeout;
        match self
            .reader
            .read_until(&mut self.transport, 1, PROMPT, Some(banner_timeout), None)
        {
            Ok(_) => {}
            Err(Error::Timeout { .. }) => {
                return Err(Error::Protocol("could not enter raw repl".to_owned()));
            }
            Err(e) => return Err(e),
        }

        tracing::debug!(bytes = command.len(), "submitting command");
        for chunk in command.chunks(self.config.command_chunk_size.max(1)) {
            self.transport.write_all(chunk)?;
            thread::sleep(self.config.command_chunk_delay);
        }
        self.transport.write_all(&[END_OF_INPUT])?;

        let ack = match self
            .reader
            .read_exact(&mut self.transport, EXEC_ACK.len(), Some(banner_timeout))
        {
            Ok(ack) => ack,
            Err(Error::Timeout { received, .. }) => received,
            Err(e) => return Err(e),
        };
        if ack != EXEC_ACK {
            return Err(Error::Exec { received: ack });
        }
        Ok(())
    }

    /// Collects the normal and error streams of a submitted command.
    fn follow(
        &mut self,
        timeout: Option<Duration>,
        sink: Option<&mut dyn FnMut(&[u8])>,
    ) -> Result<ExecOutput> {
        let mut forward = sink.map(|s| {
            move |chunk: &[u8]| {
                if chunk != [END_OF_INPUT].as_slice() {
                    s(chunk);
                }
            }
        });
        let mut stdout = self.reader.read_until(
            &mut self.transport,
            1,
            &[END_OF_INPUT],
            timeout,
            forward.as_mut().map(|f| f as &mut dyn FnMut(&[u8])),
        )?;
        stdout.pop();

        let mut stderr =
            self.reader
                .read_until(&mut self.transport, 1, &[END_OF_INPUT], timeout, None)?;
        stderr.pop();

        Ok(ExecOutput { stdout, stderr })
    }

    /// Executes `command` with the configured timeout and returns its
    /// output as text. Error output becomes [`Error::Remote`].
    pub fn exec_text(&mut self, command: &str) -> Result<String> {
        let timeout = self.config.exec_timeout;
        let stdout = self.execute(command.as_bytes(), timeout, None)?.into_result()?;
        Ok(String::from_utf8_lossy(&stdout).into_owned())
    }

    /// Evaluates a Python expression and returns its printed value.
    pub fn eval(&mut self, expression: &str) -> Result<String> {
        let out = self.exec_text(&snippet::print_expr(expression))?;
        Ok(out.trim().to_owned())
    }

    /// Runs a local script file on the board. The file is sent as-is;
    /// output is decoded lossily.
    pub fn exec_file(&mut self, path: impl AsRef<Path>) -> Result<String> {
        let script = std::fs::read(path)?;
        let timeout = self.config.exec_timeout;
        let stdout = self.execute(&script, timeout, None)?.into_result()?;
        Ok(String::from_utf8_lossy(&stdout).into_owned())
    }

    /// Leaves raw mode if needed and closes the transport.
    pub fn close(&mut self) -> Result<()> {
        if self.state == SessionState::Closed {
            return Ok(());
        }
        if matches!(
            self.state,
            SessionState::RawActive | SessionState::Executing | SessionState::EnteringRaw
        ) && let Err(e) = self.exit_raw()
        {
            tracing::warn!(error = %e, "failed to leave raw mode before closing");
        }
        self.state = SessionState::Closed;
        self.transport.close()?;
        Ok(())
    }

    /// Cancellation is terminal: leave raw mode and close the transport.
    fn abandon(&mut self) {
        tracing::warn!(state = %self.state, "cancelled; closing session");
        if let Err(e) = self.close() {
            tracing::warn!(error = %e, "failed to close transport after cancellation");
        }
    }

    /// Sleeps, honoring cancellation.
    fn pause(&self, duration: Duration) -> Result<()> {
        self.cancel.sleep(duration, self.reader.poll_interval())
    }

    /// Rejects operations on a closed session.
    fn require_open(&self, op: &'static str) -> Result<()> {
        if self.state == SessionState::Closed {
            Err(Error::InvalidState {
                op,
                state: self.state,
            })
        } else {
            Ok(())
        }
    }
}
