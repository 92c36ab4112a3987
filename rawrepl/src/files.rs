//! Remote directory creation and chunked file upload over raw REPL.
//!
//! Every batch runs inside a [`RawScope`], so raw mode is left on every
//! exit path, including errors and cancellation.

use std::ops::{Deref, DerefMut};

use rawrepl_proto::{decode_bytes_literal, is_already_exists, snippet};

use crate::error::{Error, Result};
use crate::plan::FileManifest;
use crate::session::{ExecOutput, Session, SessionState};
use crate::transport::Transport;

/// Result of creating one remote directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum MkdirOutcome {
    /// The directory was created.
    Created,
    /// The directory was already there.
    AlreadyExists,
}

/// Classifies the output of a mkdir snippet.
///
/// An "already exists" traceback is an expected outcome, not an error.
/// Any other error output becomes [`Error::Remote`].
pub fn classify_mkdir(output: ExecOutput) -> Result<MkdirOutcome> {
    if !output.is_error() {
        Ok(MkdirOutcome::Created)
    } else if is_already_exists(&output.stderr) {
        Ok(MkdirOutcome::AlreadyExists)
    } else {
        Err(Error::Remote {
            stdout: output.stdout,
            stderr: output.stderr,
        })
    }
}

/// Upload progress for one file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub struct Progress<'a> {
    /// 1-based index of the file in the batch.
    pub file_index: usize,
    /// Number of files in the batch.
    pub file_count: usize,
    /// Remote path being written.
    pub path: &'a str,
    /// Bytes of this file written so far.
    pub bytes_written: usize,
    /// Size of this file.
    pub total_bytes: usize,
}

/// Options for a [`FileTransferClient`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub struct TransferOptions {
    /// Maximum file bytes per remote write.
    pub chunk_size: usize,
    /// Treat existing directories as success.
    pub exists_ok: bool,
}

impl Default for TransferOptions {
    fn default() -> Self {
        Self {
            chunk_size: 1024,
            exists_ok: true,
        }
    }
}

impl TransferOptions {
    /// Sets the chunk size (clamped to at least one byte).
    #[must_use]
    pub fn chunk_size(mut self, size: usize) -> Self {
        self.chunk_size = size.max(1);
        self
    }

    /// Sets whether existing directories count as success.
    #[must_use]
    pub const fn exists_ok(mut self, ok: bool) -> Self {
        self.exists_ok = ok;
        self
    }
}

/// Raw mode held for the lifetime of the value.
///
/// Dereferences to the session. Dropping the scope sends the exit
/// sequence; use [`exit`](Self::exit) to observe its result.
#[derive(Debug)]
pub struct RawScope<'s, T: Transport> {
    /// The session in raw mode.
    session: &'s mut Session<T>,
    /// Cleared once raw mode has been exited explicitly.
    active: bool,
}

impl<'s, T: Transport> RawScope<'s, T> {
    /// Enters raw mode. If entry fails, the exit sequence is still sent.
    pub fn enter(session: &'s mut Session<T>) -> Result<Self> {
        let scope = Self {
            session,
            active: true,
        };
        scope.session.enter_raw(false)?;
        Ok(scope)
    }

    /// Leaves raw mode.
    pub fn exit(mut self) -> Result<()> {
        self.active = false;
        self.session.exit_raw()
    }
}

impl<T: Transport> Deref for RawScope<'_, T> {
    type Target = Session<T>;

    fn deref(&self) -> &Self::Target {
        self.session
    }
}

impl<T: Transport> DerefMut for RawScope<'_, T> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.session
    }
}

impl<T: Transport> Drop for RawScope<'_, T> {
    fn drop(&mut self) {
        if self.active
            && self.session.state() != SessionState::Closed
            && let Err(e) = self.session.exit_raw()
        {
            tracing::warn!(error = %e, "failed to leave raw mode");
        }
    }
}

/// Creates directories and uploads files through a [`Session`].
///
/// Each operation enters and exits raw mode around its own batch, so the
/// session must be interactive when a call starts.
#[derive(Debug)]
pub struct FileTransferClient<'a, T: Transport> {
    /// Session used for every batch.
    session: &'a mut Session<T>,
    /// Chunking and mkdir policy.
    options: TransferOptions,
}

impl<'a, T: Transport> FileTransferClient<'a, T> {
    /// Client using the session's configured file chunk size.
    pub fn new(session: &'a mut Session<T>) -> Self {
        let options = TransferOptions::default().chunk_size(session.config().file_chunk_size);
        Self { session, options }
    }

    /// Client with explicit options.
    pub const fn with_options(session: &'a mut Session<T>, options: TransferOptions) -> Self {
        Self { session, options }
    }

    /// Options in use.
    pub const fn options(&self) -> TransferOptions {
        self.options
    }

    /// Ensures every path exists, in order.
    ///
    /// Paths must be ordered parent-before-child. `on_dir` is told whether
    /// each one was created or verified. Any remote fault other than
    /// "already exists" aborts the batch.
    pub fn ensure_directories<S: AsRef<str>>(
        &mut self,
        paths: &[S],
        mut on_dir: impl FnMut(&str, MkdirOutcome),
    ) -> Result<Vec<MkdirOutcome>> {
        let result = self.mkdir_batch(paths, &mut on_dir);
        self.close_if_cancelled(result)
    }

    /// Directory batch body; raw mode is scoped to this call.
    fn mkdir_batch<S: AsRef<str>>(
        &mut self,
        paths: &[S],
        on_dir: &mut impl FnMut(&str, MkdirOutcome),
    ) -> Result<Vec<MkdirOutcome>> {
        let exists_ok = self.options.exists_ok;
        let timeout = self.session.config().exec_timeout;
        let mut raw = RawScope::enter(&mut *self.session)?;
        let mut outcomes = Vec::with_capacity(paths.len());
        for path in paths.iter().map(AsRef::as_ref) {
            raw.check_cancelled()?;
            let output = raw.execute(snippet::mkdir(path).as_bytes(), timeout, None)?;
            let outcome = classify_mkdir(output)?;
            match outcome {
                MkdirOutcome::Created => tracing::info!(path, "directory created"),
                MkdirOutcome::AlreadyExists if exists_ok => {
                    tracing::info!(path, "directory already exists, verified");
                }
                MkdirOutcome::AlreadyExists => return Err(Error::DirectoryExists(path.to_owned())),
            }
            on_dir(path, outcome);
            outcomes.push(outcome);
        }
        raw.exit()?;
        Ok(outcomes)
    }

    /// Uploads every file in `files`, in manifest order.
    ///
    /// `on_progress` fires once when each file is opened and after every
    /// chunk. A remote fault aborts the batch and leaves the current file
    /// partially written. On cancellation the transport is closed as well
    /// and [`Error::Cancelled`] is returned.
    pub fn upload(
        &mut self,
        files: &FileManifest,
        mut on_progress: impl FnMut(&Progress<'_>),
    ) -> Result<()> {
        let result = self.upload_batch(files, &mut on_progress);
        self.close_if_cancelled(result)
    }

    /// Closes the session when `result` is a cancellation.
    fn close_if_cancelled<R>(&mut self, result: Result<R>) -> Result<R> {
        if let Err(Error::Cancelled) = result {
            tracing::warn!("transfer cancelled; remote state may be incomplete");
            if let Err(e) = self.session.close() {
                tracing::warn!(error = %e, "failed to close transport after cancellation");
            }
        }
        result
    }

    /// Upload body; raw mode is scoped to this call.
    fn upload_batch(
        &mut self,
        files: &FileManifest,
        on_progress: &mut impl FnMut(&Progress<'_>),
    ) -> Result<()> {
        let chunk_size = self.options.chunk_size.max(1);
        let mut raw = RawScope::enter(&mut *self.session)?;
        let file_count = files.len();
        for (i, (path, data)) in files.iter().enumerate() {
            raw.check_cancelled()?;
            raw.exec_text(&snippet::open_write(path))?;

            let mut progress = Progress {
                file_index: i + 1,
                file_count,
                path,
                bytes_written: 0,
                total_bytes: data.len(),
            };
            on_progress(&progress);

            for chunk in data.chunks(chunk_size) {
                raw.check_cancelled()?;
                raw.exec_text(&snippet::write_chunk(chunk))?;
                progress.bytes_written += chunk.len();
                on_progress(&progress);
            }

            raw.exec_text(&snippet::close())?;
            tracing::info!(path, bytes = data.len(), "file uploaded");
        }
        raw.exit()
    }

    /// Reads a whole remote file back.
    pub fn read_file(&mut self, path: &str) -> Result<Vec<u8>> {
        let mut raw = RawScope::enter(&mut *self.session)?;
        let text = raw.exec_text(&snippet::read_file(path))?;
        raw.exit()?;
        Ok(decode_bytes_literal(&text)?)
    }
}
