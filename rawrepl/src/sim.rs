//! Simulated MicroPython board for tests.
//!
//! Reacts to input bytes the way a real friendly/raw REPL does and runs a
//! tiny interpreter for the snippets the engine sends, backed by an
//! in-memory filesystem. Output is produced synchronously on write.

#![allow(clippy::missing_docs_in_private_items)]

use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::fmt::Write as _;
use std::io;
use std::rc::Rc;

use rawrepl_proto::{
    END_OF_INPUT, ENTER_RAW, EXIT_RAW, INTERRUPT, RAW_BANNER, decode_bytes_literal,
};

use crate::transport::Transport;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Friendly,
    Raw,
}

#[derive(Debug)]
enum Handle {
    Write(String),
    Read(String),
}

#[derive(Debug)]
struct Board {
    mode: Mode,
    silent: bool,
    fail_next_ack: bool,
    hang_next_exec: bool,
    reboot_banner: bool,
    banner_after_reboot: bool,
    line: Vec<u8>,
    output: VecDeque<u8>,
    dirs: BTreeSet<String>,
    files: BTreeMap<String, Vec<u8>>,
    handle: Option<Handle>,
    raw_requests: usize,
    soft_reboots: usize,
    hard_resets: usize,
    closes: usize,
    writes: Vec<Vec<u8>>,
    executed: Vec<String>,
}

impl Board {
    fn emit(&mut self, bytes: &[u8]) {
        if !self.silent {
            self.output.extend(bytes);
        }
    }

    fn feed(&mut self, byte: u8) {
        if byte == ENTER_RAW {
            self.raw_requests += 1;
        }
        match (self.mode, byte) {
            (Mode::Friendly, ENTER_RAW) => {
                self.mode = Mode::Raw;
                self.line.clear();
                self.emit(RAW_BANNER);
            }
            (Mode::Friendly, INTERRUPT) => {
                self.line.clear();
                self.emit(b"\r\nKeyboardInterrupt: \r\n>>> ");
            }
            (Mode::Friendly, END_OF_INPUT) => {
                self.soft_reboots += 1;
                self.handle = None;
                self.emit(b"MPY: soft reboot\r\n>>> ");
            }
            (Mode::Friendly, b'\r' | b'\n') => {
                let line = std::mem::take(&mut self.line);
                if line.trim_ascii() == b"machine.reset()" {
                    self.hard_resets += 1;
                    self.handle = None;
                    self.emit(b"\r\nets Jul 29 2019 12:21:46\r\nrst:0xc (SW_CPU_RESET)\r\n>>> ");
                }
            }
            (Mode::Friendly, EXIT_RAW) => {}
            (Mode::Friendly, b) => {
                self.line.push(b);
                self.emit(&[b]);
            }
            (Mode::Raw, ENTER_RAW) => {
                self.line.clear();
                self.emit(RAW_BANNER);
            }
            (Mode::Raw, EXIT_RAW) => {
                self.mode = Mode::Friendly;
                self.line.clear();
                self.emit(b"\r\n>>> ");
            }
            (Mode::Raw, INTERRUPT) => self.line.clear(),
            (Mode::Raw, END_OF_INPUT) => {
                if self.line.is_empty() {
                    self.soft_reboots += 1;
                    self.handle = None;
                    self.emit(b"OK\r\n");
                    if self.reboot_banner {
                        self.emit(b"MPY: soft reboot\r\n");
                    }
                    if self.banner_after_reboot {
                        self.emit(RAW_BANNER);
                    }
                    return;
                }
                let program = String::from_utf8_lossy(&std::mem::take(&mut self.line)).into_owned();
                if std::mem::take(&mut self.fail_next_ack) {
                    self.emit(b"??");
                } else if std::mem::take(&mut self.hang_next_exec) {
                    self.executed.push(program);
                    self.emit(b"OKpartial");
                    return;
                } else {
                    self.emit(b"OK");
                    let (out, err) = self.run(&program);
                    self.emit(&out);
                    self.emit(&[END_OF_INPUT]);
                    self.emit(&err);
                    self.emit(&[END_OF_INPUT]);
                }
                self.emit(b">");
            }
            (Mode::Raw, b) => self.line.push(b),
        }
    }

    fn run(&mut self, program: &str) -> (Vec<u8>, Vec<u8>) {
        self.executed.push(program.to_owned());
        let mut out = Vec::new();
        for line in program.lines().map(str::trim) {
            if let Err(exc) = self.statement(line, &mut out) {
                let tb = format!(
                    "Traceback (most recent call last):\r\n  File \"<stdin>\", line 1, in <module>\r\n{exc}\r\n"
                );
                return (out, tb.into_bytes());
            }
        }
        (out, Vec::new())
    }

    fn statement(&mut self, line: &str, out: &mut Vec<u8>) -> Result<(), String> {
        match line {
            "" | "try:" | "import os" | "except ImportError:" | "import uos as os" => Ok(()),
            _ if line.starts_with('#') => Ok(()),
            "f.close()" => self
                .handle
                .take()
                .map(drop)
                .ok_or_else(|| "NameError: name 'f' isn't defined".to_owned()),
            "print(repr(f.read()))" => match &self.handle {
                Some(Handle::Read(path)) => {
                    let data = self.files.get(path).cloned().unwrap_or_default();
                    out.extend(python_repr(&data).into_bytes());
                    out.extend(b"\r\n");
                    Ok(())
                }
                _ => Err("OSError: [Errno 9] EBADF".to_owned()),
            },
            _ => {
                if let Some(arg) = call_arg(line, "os.mkdir(") {
                    self.mkdir(&parse_str(arg)?)
                } else if let Some(args) = call_arg(line, "f = open(") {
                    let (path, mode) = args
                        .rsplit_once(", ")
                        .ok_or_else(|| "TypeError: bad open".to_owned())?;
                    self.open(&parse_str(path)?, &parse_str(mode)?)
                } else if let Some(arg) = call_arg(line, "f.write(") {
                    let data = decode_bytes_literal(arg).map_err(|e| format!("SyntaxError: {e}"))?;
                    match &self.handle {
                        Some(Handle::Write(path)) => {
                            self.files.entry(path.clone()).or_default().extend(data);
                            Ok(())
                        }
                        _ => Err("OSError: [Errno 9] EBADF".to_owned()),
                    }
                } else if let Some(arg) = call_arg(line, "print(") {
                    out.extend(parse_str(arg)?.into_bytes());
                    out.extend(b"\r\n");
                    Ok(())
                } else if let Some(arg) = line.strip_prefix("raise ") {
                    Err(arg.to_owned())
                } else {
                    Err("SyntaxError: invalid syntax".to_owned())
                }
            }
        }
    }

    fn mkdir(&mut self, path: &str) -> Result<(), String> {
        let path = absolute(path);
        if self.dirs.contains(&path) || self.files.contains_key(&path) {
            return Err("OSError: [Errno 17] EEXIST".to_owned());
        }
        if !self.dirs.contains(&parent(&path)) {
            return Err("OSError: [Errno 2] ENOENT".to_owned());
        }
        self.dirs.insert(path);
        Ok(())
    }

    fn open(&mut self, path: &str, mode: &str) -> Result<(), String> {
        let path = absolute(path);
        match mode {
            "wb" => {
                if !self.dirs.contains(&parent(&path)) || self.dirs.contains(&path) {
                    return Err("OSError: [Errno 2] ENOENT".to_owned());
                }
                self.files.insert(path.clone(), Vec::new());
                self.handle = Some(Handle::Write(path));
            }
            "rb" => {
                if !self.files.contains_key(&path) {
                    return Err("OSError: [Errno 2] ENOENT".to_owned());
                }
                self.handle = Some(Handle::Read(path));
            }
            other => return Err(format!("ValueError: mode {other}")),
        }
        Ok(())
    }
}

fn call_arg<'a>(line: &'a str, prefix: &str) -> Option<&'a str> {
    line.strip_prefix(prefix)?.strip_suffix(')')
}

/// Parses a quoted Python `str` literal by reusing the bytes decoder.
fn parse_str(lit: &str) -> Result<String, String> {
    let bytes = decode_bytes_literal(&format!("b{lit}")).map_err(|e| format!("SyntaxError: {e}"))?;
    String::from_utf8(bytes).map_err(|e| format!("UnicodeError: {e}"))
}

fn absolute(path: &str) -> String {
    let trimmed = path.trim_start_matches("./").trim_end_matches('/');
    if trimmed.is_empty() || trimmed == "." {
        "/".to_owned()
    } else if trimmed.starts_with('/') {
        trimmed.to_owned()
    } else {
        format!("/{trimmed}")
    }
}

fn parent(path: &str) -> String {
    match path.rsplit_once('/') {
        Some(("", _)) | None => "/".to_owned(),
        Some((p, _)) => p.to_owned(),
    }
}

/// MicroPython-style `repr()` of a bytes object.
fn python_repr(data: &[u8]) -> String {
    let quote = if data.contains(&b'\'') && !data.contains(&b'"') {
        '"'
    } else {
        '\''
    };
    let mut s = format!("b{quote}");
    for &b in data {
        match b {
            b'\\' => s.push_str("\\\\"),
            b'\n' => s.push_str("\\n"),
            b'\r' => s.push_str("\\r"),
            b'\t' => s.push_str("\\t"),
            _ if char::from(b) == quote => {
                s.push('\\');
                s.push(quote);
            }
            0x20..=0x7e => s.push(char::from(b)),
            _ => {
                let _ = write!(s, "\\x{b:02x}");
            }
        }
    }
    s.push(quote);
    s
}

/// Handle to a simulated board; clones share the same device.
#[derive(Debug, Clone)]
pub(crate) struct SimBoard(Rc<RefCell<Board>>);

impl SimBoard {
    /// A responsive board with an empty root filesystem.
    pub(crate) fn new() -> Self {
        Self(Rc::new(RefCell::new(Board {
            mode: Mode::Friendly,
            silent: false,
            fail_next_ack: false,
            hang_next_exec: false,
            reboot_banner: true,
            banner_after_reboot: true,
            line: Vec::new(),
            output: VecDeque::new(),
            dirs: BTreeSet::from(["/".to_owned()]),
            files: BTreeMap::new(),
            handle: None,
            raw_requests: 0,
            soft_reboots: 0,
            hard_resets: 0,
            closes: 0,
            writes: Vec::new(),
            executed: Vec::new(),
        })))
    }

    /// A board that never produces any output.
    pub(crate) fn silent() -> Self {
        let board = Self::new();
        board.0.borrow_mut().silent = true;
        board
    }

    /// Opens a new connection to this board.
    pub(crate) fn port(&self) -> SimPort {
        SimPort {
            board: Rc::clone(&self.0),
            open: true,
        }
    }

    /// Queues unsolicited output.
    pub(crate) fn preload(&self, bytes: &[u8]) {
        self.0.borrow_mut().output.extend(bytes);
    }

    /// Drops any pending output, desynchronizing the host.
    pub(crate) fn clear_output(&self) {
        self.0.borrow_mut().output.clear();
    }

    /// Answers the next command with garbage instead of `OK`.
    pub(crate) fn fail_next_ack(&self) {
        self.0.borrow_mut().fail_next_ack = true;
    }

    /// Acknowledges the next command, prints `partial`, then stalls
    /// without ever terminating its output.
    pub(crate) fn hang_next_exec(&self) {
        self.0.borrow_mut().hang_next_exec = true;
    }

    /// Soft reboots in raw mode omit the `soft reboot` line.
    pub(crate) fn skip_reboot_banner(&self) {
        self.0.borrow_mut().reboot_banner = false;
    }

    /// Soft reboots in raw mode do not reprint the raw banner.
    pub(crate) fn skip_banner_after_reboot(&self) {
        self.0.borrow_mut().banner_after_reboot = false;
    }

    pub(crate) fn is_raw(&self) -> bool {
        self.0.borrow().mode == Mode::Raw
    }

    pub(crate) fn file(&self, path: &str) -> Option<Vec<u8>> {
        self.0.borrow().files.get(path).cloned()
    }

    pub(crate) fn has_dir(&self, path: &str) -> bool {
        self.0.borrow().dirs.contains(path)
    }

    pub(crate) fn raw_requests(&self) -> usize {
        self.0.borrow().raw_requests
    }

    pub(crate) fn soft_reboots(&self) -> usize {
        self.0.borrow().soft_reboots
    }

    pub(crate) fn hard_resets(&self) -> usize {
        self.0.borrow().hard_resets
    }

    /// Number of connections closed by the host.
    pub(crate) fn closes(&self) -> usize {
        self.0.borrow().closes
    }

    /// Every write the host made, in order.
    pub(crate) fn writes(&self) -> Vec<Vec<u8>> {
        self.0.borrow().writes.clone()
    }

    /// Every program the board executed, in order.
    pub(crate) fn executed(&self) -> Vec<String> {
        self.0.borrow().executed.clone()
    }
}

/// One connection to a [`SimBoard`].
#[derive(Debug)]
pub(crate) struct SimPort {
    board: Rc<RefCell<Board>>,
    open: bool,
}

impl SimPort {
    fn ensure_open(&self) -> io::Result<()> {
        if self.open {
            Ok(())
        } else {
            Err(io::Error::new(io::ErrorKind::NotConnected, "port closed"))
        }
    }
}

impl Transport for SimPort {
    fn write_all(&mut self, data: &[u8]) -> io::Result<()> {
        self.ensure_open()?;
        let mut board = self.board.borrow_mut();
        board.writes.push(data.to_vec());
        for &b in data {
            board.feed(b);
        }
        Ok(())
    }

    fn bytes_available(&mut self) -> io::Result<usize> {
        self.ensure_open()?;
        Ok(self.board.borrow().output.len())
    }

    fn read_exact(&mut self, buf: &mut [u8]) -> io::Result<()> {
        self.ensure_open()?;
        let mut board = self.board.borrow_mut();
        if board.output.len() < buf.len() {
            return Err(io::Error::new(io::ErrorKind::TimedOut, "no data"));
        }
        for slot in buf.iter_mut() {
            *slot = board.output.pop_front().unwrap_or_default();
        }
        Ok(())
    }

    fn close(&mut self) -> io::Result<()> {
        if std::mem::replace(&mut self.open, false) {
            self.board.borrow_mut().closes += 1;
        }
        Ok(())
    }
}
