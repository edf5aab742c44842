//! Channel over a connected Unix domain stream socket.

use std::io;
use std::os::unix::net::UnixStream;

use tracing::debug;

use super::{CHANNEL_TARGET, Channel, WriteBacklog, read_available};
use crate::error::EndpointError;

/// Channel over a connected Unix domain stream socket.
///
/// The stream is switched to non-blocking mode on construction. Use
/// [`SocketChannel::try_clone`] to give a reader and a writer their own
/// handle on the same connection.
#[derive(Debug)]
pub struct SocketChannel {
    stream: Option<UnixStream>,
    backlog: WriteBacklog,
}

impl SocketChannel {
    /// Wraps a connected stream.
    ///
    /// # Errors
    ///
    /// Returns the OS error when the stream cannot be made non-blocking.
    pub fn new(stream: UnixStream) -> io::Result<Self> {
        stream.set_nonblocking(true)?;
        Ok(Self {
            stream: Some(stream),
            backlog: WriteBacklog::default(),
        })
    }

    /// Opens a second channel on the same connection with its own backlog.
    ///
    /// # Errors
    ///
    /// Returns [`io::ErrorKind::NotConnected`] when this channel is closed,
    /// or the OS error from duplicating the descriptor.
    pub fn try_clone(&self) -> io::Result<Self> {
        let stream = self
            .stream
            .as_ref()
            .ok_or_else(|| io::Error::from(io::ErrorKind::NotConnected))?;
        Self::new(stream.try_clone()?)
    }

    /// Number of written bytes the peer has not accepted yet.
    #[must_use]
    pub fn pending_bytes(&self) -> usize {
        self.backlog.len()
    }
}

impl Channel for SocketChannel {
    fn read(&mut self) -> Result<Vec<u8>, EndpointError> {
        let stream = self
            .stream
            .as_mut()
            .ok_or_else(|| EndpointError::closed("channel closed"))?;
        read_available(stream)
    }

    fn write(&mut self, bytes: &[u8]) -> Result<(), EndpointError> {
        let stream = self
            .stream
            .as_mut()
            .ok_or_else(|| EndpointError::closed("channel closed"))?;
        self.backlog.write(stream, bytes)
    }

    fn flush(&mut self) -> Result<(), EndpointError> {
        let stream = self
            .stream
            .as_mut()
            .ok_or_else(|| EndpointError::closed("channel closed"))?;
        self.backlog.flush(stream)
    }

    fn close(&mut self) {
        let Some(stream) = self.stream.take() else {
            return;
        };
        if self.backlog.len() > 0 {
            debug!(
                target: CHANNEL_TARGET,
                discarded = self.backlog.len(),
                "closing socket channel with unsent bytes"
            );
        }
        self.backlog.clear();
        drop(stream);
    }

    fn is_closed(&self) -> bool {
        self.stream.is_none()
    }
}
