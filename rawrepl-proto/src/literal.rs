//! Python byte-literal encoding for shipping binary data inside snippets.
//!
//! Encoded form: `b'...'` where printable ASCII passes through, `\` and `'`
//! are backslash-escaped, and every other byte is written as `\xNN`. The
//! decoder also accepts what MicroPython's `repr()` produces (double
//! quotes, `\n`, `\r`, `\t`), so it can parse read-back output.

use std::fmt::Write as _;

/// Errors from [`decode_bytes_literal`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum LiteralError {
    /// The text does not start with `b`.
    #[error("byte literal must start with `b`")]
    MissingPrefix,

    /// No matching closing quote.
    #[error("byte literal is not terminated")]
    Unterminated,

    /// A backslash at the very end of the literal body.
    #[error("dangling `\\` at end of byte literal")]
    DanglingEscape,

    /// A backslash escape this decoder does not understand.
    #[error("unknown escape `\\{0}` in byte literal")]
    UnknownEscape(char),

    /// `\x` not followed by two hex digits.
    #[error("malformed `\\x` escape in byte literal")]
    BadHex,

    /// The quote character appears unescaped inside the body.
    #[error("unescaped quote inside byte literal")]
    UnescapedQuote,

    /// A raw byte outside printable ASCII.
    #[error("unexpected byte 0x{0:02x} inside byte literal")]
    NotPrintable(u8),
}

/// Encodes `data` as a single-quoted Python bytes literal.
pub fn encode_bytes_literal(data: &[u8]) -> String {
    let mut out = String::with_capacity(data.len() * 4 + 3);
    out.push_str("b'");
    for &b in data {
        match b {
            b'\\' => out.push_str("\\\\"),
            b'\'' => out.push_str("\\'"),
            0x20..=0x7e => out.push(char::from(b)),
            _ => {
                let _ = write!(out, "\\x{b:02x}");
            }
        }
    }
    out.push('\'');
    out
}

/// Decodes a Python bytes literal back into raw bytes.
///
/// Surrounding whitespace is ignored.
pub fn decode_bytes_literal(text: &str) -> Result<Vec<u8>, LiteralError> {
    let body = text.trim().strip_prefix('b').ok_or(LiteralError::MissingPrefix)?;
    let quote = match body.as_bytes().first() {
        Some(&q @ (b'\'' | b'"')) => q,
        _ => return Err(LiteralError::Unterminated),
    };
    let inner = body[1..]
        .strip_suffix(char::from(quote))
        .ok_or(LiteralError::Unterminated)?;

    let mut out = Vec::with_capacity(inner.len());
    let mut bytes = inner.bytes();
    while let Some(b) = bytes.next() {
        match b {
            b'\\' => {
                let esc = bytes.next().ok_or(LiteralError::DanglingEscape)?;
                out.push(match esc {
                    b'\\' => b'\\',
                    b'\'' => b'\'',
                    b'"' => b'"',
                    b'n' => b'\n',
                    b'r' => b'\r',
                    b't' => b'\t',
                    b'0' => 0,
                    b'x' => {
                        let hi = bytes.next().and_then(hex_digit).ok_or(LiteralError::BadHex)?;
                        let lo = bytes.next().and_then(hex_digit).ok_or(LiteralError::BadHex)?;
                        (hi << 4) | lo
                    }
                    other => return Err(LiteralError::UnknownEscape(char::from(other))),
                });
            }
            _ if b == quote => return Err(LiteralError::UnescapedQuote),
            0x20..=0x7e => out.push(b),
            other => return Err(LiteralError::NotPrintable(other)),
        }
    }
    Ok(out)
}

/// Quotes `s` as a single-quoted Python string literal.
pub fn quote_str(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('\'');
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\'' => out.push_str("\\'"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c.is_control() => {
                let _ = write!(out, "\\x{:02x}", u32::from(c));
            }
            c => out.push(c),
        }
    }
    out.push('\'');
    out
}

/// Value of a single ASCII hex digit.
fn hex_digit(c: u8) -> Option<u8> {
    char::from(c)
        .to_digit(16)
        .and_then(|d| u8::try_from(d).ok())
}
