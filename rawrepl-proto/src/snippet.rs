//! Python snippets the host executes on the board.
//!
//! File writes go through a handle bound to [`HANDLE`] in the board's
//! global namespace, so an upload is open / write... / close as separate
//! commands.

use crate::{encode_bytes_literal, quote_str};

/// Name of the remote variable holding the open file.
pub const HANDLE: &str = "f";

/// Creates one directory, importing `uos` on ports without `os`.
pub fn mkdir(path: &str) -> String {
    format!(
        "try:\n    import os\nexcept ImportError:\n    import uos as os\nos.mkdir({})\n",
        quote_str(path)
    )
}

/// Opens `path` for binary write and binds it to [`HANDLE`].
pub fn open_write(path: &str) -> String {
    format!("{HANDLE} = open({}, 'wb')", quote_str(path))
}

/// Writes one chunk of data to [`HANDLE`].
pub fn write_chunk(chunk: &[u8]) -> String {
    format!("{HANDLE}.write({})", encode_bytes_literal(chunk))
}

/// Closes [`HANDLE`].
pub fn close() -> String {
    format!("{HANDLE}.close()")
}

/// Prints the `repr()` of a whole remote file.
pub fn read_file(path: &str) -> String {
    format!(
        "{HANDLE} = open({}, 'rb')\nprint(repr({HANDLE}.read()))\n{HANDLE}.close()\n",
        quote_str(path)
    )
}

/// Prints the value of a Python expression.
pub fn print_expr(expr: &str) -> String {
    format!("print({expr})")
}
