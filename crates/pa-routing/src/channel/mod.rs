//! Non-blocking byte transports.
//!
//! A [`Channel`] moves raw bytes to and from one peer process. Reads return
//! whatever is available right now (possibly nothing) and writes never wait
//! for the peer: bytes the kernel cannot take immediately are parked in a
//! bounded backlog and retried on the next write or [`Channel::flush`].
//! Closure of the peer surfaces as [`EndpointError::Closed`], which lets the
//! router tell a vanished process apart from a transient I/O failure.

mod pipe;
mod socket;

use std::io::{self, Read, Write};
use std::os::fd::{AsRawFd, BorrowedFd};
use std::sync::Arc;

use nix::fcntl::{FcntlArg, OFlag, fcntl};
use tracing::trace;

use crate::error::EndpointError;

pub use self::pipe::PipeChannel;
pub use self::socket::SocketChannel;

/// Tracing target for channel operations.
const CHANNEL_TARGET: &str = "pa_routing::channel";

/// Size of each read performed while draining a descriptor.
const READ_CHUNK: usize = 4096;

/// Most bytes a channel will hold for a peer that is not reading.
pub const WRITE_BACKLOG_LIMIT: usize = 1024 * 1024;

/// Byte-level transport to a peer process.
///
/// Implementations never block. Both [`PipeChannel`] and [`SocketChannel`]
/// expose the same behaviour, so framing code is written once against this
/// trait.
#[cfg_attr(test, mockall::automock)]
pub trait Channel: Send {
    /// Returns every byte currently available, or an empty buffer when the
    /// peer has sent nothing new.
    ///
    /// # Errors
    ///
    /// Returns [`EndpointError::Closed`] at end of stream or after
    /// [`Channel::close`], and [`EndpointError::Io`] for other failures.
    fn read(&mut self) -> Result<Vec<u8>, EndpointError>;

    /// Queues `bytes` for the peer and writes as much as the kernel accepts.
    ///
    /// # Errors
    ///
    /// Returns [`EndpointError::Closed`] when the peer has gone away, and
    /// [`EndpointError::Io`] when the backlog limit would be exceeded.
    fn write(&mut self, bytes: &[u8]) -> Result<(), EndpointError>;

    /// Retries any bytes left over from earlier writes.
    ///
    /// # Errors
    ///
    /// Same as [`Channel::write`].
    fn flush(&mut self) -> Result<(), EndpointError>;

    /// Releases the underlying descriptors. Calling it twice is harmless.
    fn close(&mut self);

    /// Returns `true` once [`Channel::close`] has been called.
    fn is_closed(&self) -> bool;
}

/// Puts a descriptor into non-blocking mode.
pub(crate) fn set_nonblocking(fd: BorrowedFd<'_>) -> io::Result<()> {
    let raw = fd.as_raw_fd();
    let flags = OFlag::from_bits_truncate(fcntl(raw, FcntlArg::F_GETFL)?);
    if flags.contains(OFlag::O_NONBLOCK) {
        return Ok(());
    }
    fcntl(raw, FcntlArg::F_SETFL(flags | OFlag::O_NONBLOCK))?;
    Ok(())
}

/// Drains a non-blocking reader.
///
/// Bytes received before end of stream are returned first; the following
/// call then observes the end of stream again and reports closure.
pub(crate) fn read_available<R: Read>(reader: &mut R) -> Result<Vec<u8>, EndpointError> {
    let mut collected = Vec::new();
    let mut chunk = [0_u8; READ_CHUNK];
    loop {
        match reader.read(&mut chunk) {
            Ok(0) if collected.is_empty() => {
                return Err(EndpointError::closed("end of stream"));
            }
            Ok(0) => return Ok(collected),
            Ok(count) => {
                let received = chunk.get(..count).unwrap_or_default();
                collected.extend_from_slice(received);
            }
            Err(error) if error.kind() == io::ErrorKind::WouldBlock => return Ok(collected),
            Err(error) if error.kind() == io::ErrorKind::Interrupted => {}
            Err(error) => return Err(EndpointError::from_io(error)),
        }
    }
}

/// Bytes accepted by [`Channel::write`] but not yet taken by the kernel.
#[derive(Debug, Default)]
pub(crate) struct WriteBacklog {
    pending: Vec<u8>,
}

impl WriteBacklog {
    /// Appends `bytes` behind anything already pending and flushes.
    pub(crate) fn write<W: Write>(
        &mut self,
        writer: &mut W,
        bytes: &[u8],
    ) -> Result<(), EndpointError> {
        self.flush(writer)?;
        if self.pending.len().saturating_add(bytes.len()) > WRITE_BACKLOG_LIMIT {
            return Err(EndpointError::Io {
                source: Arc::new(io::Error::new(
                    io::ErrorKind::OutOfMemory,
                    format!(
                        "write backlog of {} bytes would exceed {WRITE_BACKLOG_LIMIT} bytes",
                        self.pending.len()
                    ),
                )),
            });
        }
        self.pending.extend_from_slice(bytes);
        self.flush(writer)
    }

    /// Writes pending bytes until the kernel stops accepting them.
    pub(crate) fn flush<W: Write>(&mut self, writer: &mut W) -> Result<(), EndpointError> {
        while !self.pending.is_empty() {
            match writer.write(&self.pending) {
                Ok(0) => return Err(EndpointError::closed("peer accepted no bytes")),
                Ok(count) => {
                    self.pending.drain(..count.min(self.pending.len()));
                }
                Err(error) if error.kind() == io::ErrorKind::WouldBlock => {
                    trace!(
                        target: CHANNEL_TARGET,
                        pending = self.pending.len(),
                        "peer is not reading, keeping backlog"
                    );
                    return Ok(());
                }
                Err(error) if error.kind() == io::ErrorKind::Interrupted => {}
                Err(error) => return Err(EndpointError::from_io(error)),
            }
        }
        Ok(())
    }

    /// Number of bytes still waiting.
    pub(crate) fn len(&self) -> usize {
        self.pending.len()
    }

    /// Forgets pending bytes.
    pub(crate) fn clear(&mut self) {
        self.pending.clear();
    }
}
