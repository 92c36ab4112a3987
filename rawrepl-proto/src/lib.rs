//! Wire vocabulary for driving a MicroPython raw REPL.
//!
//! The raw REPL has no framing of its own beyond a handful of control
//! bytes and fixed banners. Everything the host asks the board to do is
//! a Python snippet, so this crate also owns the snippet text and the
//! byte-literal encoding used to ship binary file data inside it.

mod literal;
pub mod snippet;
mod wire;

pub use literal::{LiteralError, decode_bytes_literal, encode_bytes_literal, quote_str};
pub use wire::{
    ALREADY_EXISTS_PHRASE, END_OF_INPUT, ENTER_RAW, ENTER_RAW_SEQ, EXEC_ACK, EXIT_RAW,
    EXIT_RAW_SEQ, INTERRUPT, INTERRUPT_SEQ, PROMPT, RAW_BANNER, RAW_BANNER_LINE, RESET_COMMAND,
    SOFT_REBOOT_BANNER, is_already_exists,
};
