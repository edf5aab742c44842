//! Message-level endpoints and the shared handles the router stores.
//!
//! A [`Faucet`] produces decoded messages and a [`Sink`] consumes them. The
//! router and the [`crate::Runner`] both need to refer to the same endpoint,
//! so endpoints are registered through cloneable [`FaucetHandle`] and
//! [`SinkHandle`] values. A handle's lock is held only for the duration of a
//! single read or write. Handle equality is identity: two handles are the
//! same endpoint when they were cloned from one another.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::error::EndpointError;
use crate::message::Message;

/// Source of decoded messages.
pub trait Faucet: Send {
    /// Returns the next complete message, or `None` when none is buffered.
    ///
    /// # Errors
    ///
    /// Returns [`EndpointError::Malformed`] for a single undecodable line
    /// (the faucet stays usable) and [`EndpointError::Closed`] once the peer
    /// has gone away.
    fn read(&mut self) -> Result<Option<Message>, EndpointError>;

    /// Releases the underlying transport.
    fn close(&mut self);
}

/// Destination for messages.
pub trait Sink: Send {
    /// Delivers one message.
    ///
    /// # Errors
    ///
    /// Returns [`EndpointError::Closed`] once the peer has gone away,
    /// [`EndpointError::Encode`] when the message cannot be serialised and
    /// [`EndpointError::Io`] for other transport failures.
    fn write(&mut self, message: &Message) -> Result<(), EndpointError>;

    /// Releases the underlying transport.
    fn close(&mut self);
}

fn lock<T: ?Sized>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Shared, cloneable reference to a [`Faucet`].
#[derive(Clone)]
pub struct FaucetHandle {
    inner: Arc<Mutex<dyn Faucet>>,
}

impl FaucetHandle {
    /// Wraps a faucet so it can be shared.
    pub fn new(faucet: impl Faucet + 'static) -> Self {
        Self {
            inner: Arc::new(Mutex::new(faucet)),
        }
    }

    /// Reads the next message. See [`Faucet::read`].
    ///
    /// # Errors
    ///
    /// Propagates the faucet's error.
    pub fn read(&self) -> Result<Option<Message>, EndpointError> {
        lock(&self.inner).read()
    }

    /// Closes the faucet.
    pub fn close(&self) {
        lock(&self.inner).close();
    }

    /// Returns `true` when both handles refer to the same faucet.
    #[must_use]
    pub fn same_as(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for FaucetHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FaucetHandle")
            .field("ptr", &Arc::as_ptr(&self.inner).cast::<()>())
            .finish()
    }
}

/// Shared, cloneable reference to a [`Sink`].
#[derive(Clone)]
pub struct SinkHandle {
    inner: Arc<Mutex<dyn Sink>>,
}

impl SinkHandle {
    /// Wraps a sink so it can be shared.
    pub fn new(sink: impl Sink + 'static) -> Self {
        Self {
            inner: Arc::new(Mutex::new(sink)),
        }
    }

    /// Writes one message. See [`Sink::write`].
    ///
    /// # Errors
    ///
    /// Propagates the sink's error.
    pub fn write(&self, message: &Message) -> Result<(), EndpointError> {
        lock(&self.inner).write(message)
    }

    /// Closes the sink.
    pub fn close(&self) {
        lock(&self.inner).close();
    }

    /// Returns `true` when both handles refer to the same sink.
    #[must_use]
    pub fn same_as(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for SinkHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SinkHandle")
            .field("ptr", &Arc::as_ptr(&self.inner).cast::<()>())
            .finish()
    }
}
