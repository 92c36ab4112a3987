//! Drive a MicroPython board's raw REPL over a serial link.
//!
//! `rawrepl` puts a board into raw mode, runs Python on it, and transfers
//! files, all over a plain serial [`Transport`]. Every wait is a polled,
//! idle-bounded read that can be cancelled from another thread.
//!
//! # Quick start: run code
//!
//! ```no_run
//! use rawrepl::{Session, SessionConfig};
//!
//! let mut session = Session::open(&SessionConfig::new("/dev/ttyACM0"))?;
//! session.enter_raw(false)?;
//! println!("{}", session.eval("1 + 1")?);
//! session.close()?;
//! # Ok::<(), rawrepl::Error>(())
//! ```
//!
//! # Install a directory tree
//!
//! ```no_run
//! use rawrepl::{FileTransferClient, Session, SessionConfig, UploadPlan};
//!
//! let plan = UploadPlan::from_dir("build/firmware", "/")?;
//! let mut session = Session::open(&SessionConfig::new("/dev/ttyACM0"))?;
//! let mut client = FileTransferClient::new(&mut session);
//! client.ensure_directories(plan.directories.paths(), |_, _| {})?;
//! client.upload(&plan.files, |p| {
//!     eprintln!("[{}/{}] {} {}/{}", p.file_index, p.file_count, p.path, p.bytes_written, p.total_bytes);
//! })?;
//! # Ok::<(), rawrepl::Error>(())
//! ```

mod cancel;
mod config;
mod error;
mod files;
mod plan;
mod reader;
mod session;
#[cfg(test)]
mod sim;
mod transport;

pub use cancel::CancelToken;
pub use config::{MIN_POLL_INTERVAL, SessionConfig, Timing};
pub use error::{Error, Result};
pub use files::{
    FileTransferClient, MkdirOutcome, Progress, RawScope, TransferOptions, classify_mkdir,
};
pub use plan::{DirectoryPlan, FileManifest, UploadPlan};
pub use rawrepl_proto as proto;
pub use reader::FramedReader;
pub use session::{ExecOutput, RAW_ENTRY_ATTEMPTS, Session, SessionState};
pub use transport::{SerialTransport, Transport};
