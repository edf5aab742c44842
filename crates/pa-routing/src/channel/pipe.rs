//! Channel over anonymous pipe ends.

use std::fs::File;
use std::io;
use std::os::fd::{AsFd, OwnedFd};
use std::process::{ChildStdin, ChildStdout};
use std::sync::Arc;

use tracing::debug;

use super::{CHANNEL_TARGET, Channel, WriteBacklog, read_available, set_nonblocking};
use crate::error::EndpointError;

/// Channel over a read end, a write end, or both ends of OS pipes.
///
/// Each end is switched to non-blocking mode on construction. A channel with
/// no read end yields no bytes; writing to a channel with no write end is an
/// I/O error.
#[derive(Debug)]
pub struct PipeChannel {
    reader: Option<File>,
    writer: Option<File>,
    backlog: WriteBacklog,
    closed: bool,
}

impl PipeChannel {
    /// Wraps the given pipe ends.
    ///
    /// # Errors
    ///
    /// Returns the OS error when an end cannot be made non-blocking.
    pub fn new(reader: Option<OwnedFd>, writer: Option<OwnedFd>) -> io::Result<Self> {
        let reader = reader.map(File::from);
        let writer = writer.map(File::from);
        for end in reader.iter().chain(writer.iter()) {
            set_nonblocking(end.as_fd())?;
        }
        Ok(Self {
            reader,
            writer,
            backlog: WriteBacklog::default(),
            closed: false,
        })
    }

    /// Wraps a read-only end.
    ///
    /// # Errors
    ///
    /// See [`PipeChannel::new`].
    pub fn reading(reader: impl Into<OwnedFd>) -> io::Result<Self> {
        Self::new(Some(reader.into()), None)
    }

    /// Wraps a write-only end.
    ///
    /// # Errors
    ///
    /// See [`PipeChannel::new`].
    pub fn writing(writer: impl Into<OwnedFd>) -> io::Result<Self> {
        Self::new(None, Some(writer.into()))
    }

    /// Wraps a child's standard output and input.
    ///
    /// # Errors
    ///
    /// See [`PipeChannel::new`].
    pub fn from_child(stdout: ChildStdout, stdin: ChildStdin) -> io::Result<Self> {
        Self::new(Some(stdout.into()), Some(stdin.into()))
    }

    /// Number of written bytes the peer has not accepted yet.
    #[must_use]
    pub fn pending_bytes(&self) -> usize {
        self.backlog.len()
    }

    fn ensure_open(&self) -> Result<(), EndpointError> {
        if self.closed {
            return Err(EndpointError::closed("channel closed"));
        }
        Ok(())
    }
}

impl Channel for PipeChannel {
    fn read(&mut self) -> Result<Vec<u8>, EndpointError> {
        self.ensure_open()?;
        match self.reader.as_mut() {
            Some(reader) => read_available(reader),
            None => Ok(Vec::new()),
        }
    }

    fn write(&mut self, bytes: &[u8]) -> Result<(), EndpointError> {
        self.ensure_open()?;
        let writer = self.writer.as_mut().ok_or_else(no_write_end)?;
        self.backlog.write(writer, bytes)
    }

    fn flush(&mut self) -> Result<(), EndpointError> {
        self.ensure_open()?;
        match self.writer.as_mut() {
            Some(writer) => self.backlog.flush(writer),
            None => Ok(()),
        }
    }

    fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        if self.backlog.len() > 0 {
            debug!(
                target: CHANNEL_TARGET,
                discarded = self.backlog.len(),
                "closing pipe channel with unsent bytes"
            );
        }
        self.backlog.clear();
        self.reader = None;
        self.writer = None;
    }

    fn is_closed(&self) -> bool {
        self.closed
    }
}

fn no_write_end() -> EndpointError {
    EndpointError::Io {
        source: Arc::new(io::Error::new(
            io::ErrorKind::Unsupported,
            "pipe channel has no write end",
        )),
    }
}
