//! Control bytes and banners exchanged with the raw REPL.

/// Ctrl-A: request raw REPL mode.
pub const ENTER_RAW: u8 = 0x01;

/// Ctrl-B: return to the friendly REPL.
pub const EXIT_RAW: u8 = 0x02;

/// Ctrl-C: halt the running program.
pub const INTERRUPT: u8 = 0x03;

/// Ctrl-D: end of command input, soft reboot on an empty line, and the
/// terminator the board emits after each captured output stream.
pub const END_OF_INPUT: u8 = 0x04;

/// Interrupt preceded by a carriage return to flush a partial line.
pub const INTERRUPT_SEQ: &[u8] = b"\r\x03";

/// Raw-mode request preceded by a carriage return.
pub const ENTER_RAW_SEQ: &[u8] = b"\r\x01";

/// Raw-mode exit preceded by a carriage return.
pub const EXIT_RAW_SEQ: &[u8] = b"\r\x02";

/// Banner printed on entering raw mode, including the first prompt.
pub const RAW_BANNER: &[u8] = b"raw REPL; CTRL-B to exit\r\n>";

/// The raw-mode banner line without its trailing prompt.
pub const RAW_BANNER_LINE: &[u8] = b"raw REPL; CTRL-B to exit\r\n";

/// Printed once the interpreter has restarted after Ctrl-D.
pub const SOFT_REBOOT_BANNER: &[u8] = b"soft reboot\r\n";

/// Raw-mode input prompt.
pub const PROMPT: &[u8] = b">";

/// Acknowledgement sent after the board accepts a command.
pub const EXEC_ACK: &[u8; 2] = b"OK";

/// Typed into the friendly REPL to hard-reset a board in an unknown state.
pub const RESET_COMMAND: &[u8] = b"import machine\r\nmachine.reset()\r\n";

/// Error text MicroPython prints when `os.mkdir` hits an existing path.
pub const ALREADY_EXISTS_PHRASE: &str = "OSError: [Errno 17] EEXIST";

/// Returns `true` if a traceback reports that the target path already exists.
///
/// The error channel is untyped text, so this is a substring match on
/// [`ALREADY_EXISTS_PHRASE`].
pub fn is_already_exists(stderr: &[u8]) -> bool {
    String::from_utf8_lossy(stderr).contains(ALREADY_EXISTS_PHRASE)
}
