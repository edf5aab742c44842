//! Fallback sink that records unroutable messages in the log.

use pa_routing::{EndpointError, Message, Sink};
use tracing::info;

/// Tracing target for messages no application claimed.
pub(crate) const UNROUTED_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::unrouted");

/// Default sink used when no application is configured to receive
/// unroutable messages.
#[derive(Debug, Default)]
pub struct LogSink {
    logged: u64,
}

impl LogSink {
    /// Creates a sink that has logged nothing.
    #[must_use]
    pub const fn new() -> Self {
        Self { logged: 0 }
    }

    /// Number of messages logged so far.
    #[must_use]
    pub const fn logged(&self) -> u64 {
        self.logged
    }
}

impl Sink for LogSink {
    fn write(&mut self, message: &Message) -> Result<(), EndpointError> {
        let line = serde_json::to_string(message).map_err(EndpointError::Encode)?;
        self.logged = self.logged.saturating_add(1);
        info!(
            target: UNROUTED_TARGET,
            destination = message.destination(),
            message = %line,
            "no route for message"
        );
        Ok(())
    }

    fn close(&mut self) {}
}
