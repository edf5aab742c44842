//! Newline-delimited JSON framing over a [`Channel`].
//!
//! Peers may deliver a message in several pieces or several messages in one
//! piece. [`ChannelFaucet`] accumulates bytes and hands out one complete line
//! at a time; [`ChannelSink`] writes each message as a single line.

use serde_json::Value;
use tracing::trace;

use crate::channel::Channel;
use crate::endpoint::{Faucet, Sink};
use crate::error::EndpointError;
use crate::message::Message;

/// Tracing target for framing operations.
const FRAMING_TARGET: &str = "pa_routing::framing";

/// Largest fragment buffered while waiting for a line terminator.
pub const MAX_UNTERMINATED_LINE: usize = 1024 * 1024;

/// Faucet decoding one JSON object per line from a channel.
#[derive(Debug)]
pub struct ChannelFaucet<C> {
    channel: C,
    buffer: Vec<u8>,
}

impl<C: Channel> ChannelFaucet<C> {
    /// Wraps `channel` with an empty accumulator.
    pub const fn new(channel: C) -> Self {
        Self {
            channel,
            buffer: Vec::new(),
        }
    }

    /// Number of bytes received but not yet returned as messages.
    #[must_use]
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Pops the first complete non-blank line and decodes it.
    fn next_message(&mut self) -> Result<Option<Message>, EndpointError> {
        while let Some(end) = self.buffer.iter().position(|byte| *byte == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=end).collect();
            let content = line.trim_ascii();
            if content.is_empty() {
                continue;
            }
            return decode_line(content).map(Some);
        }
        Ok(None)
    }
}

fn decode_line(line: &[u8]) -> Result<Message, EndpointError> {
    match serde_json::from_slice::<Value>(line) {
        Ok(Value::Object(fields)) => Ok(Message::from(fields)),
        Ok(_) => Err(EndpointError::malformed(line, "expected a JSON object")),
        Err(error) => Err(EndpointError::malformed(line, error.to_string())),
    }
}

impl<C: Channel> Faucet for ChannelFaucet<C> {
    fn read(&mut self) -> Result<Option<Message>, EndpointError> {
        if let Some(message) = self.next_message()? {
            return Ok(Some(message));
        }

        let received = self.channel.read()?;
        if !received.is_empty() {
            trace!(
                target: FRAMING_TARGET,
                bytes = received.len(),
                buffered = self.buffer.len(),
                "received bytes"
            );
            self.buffer.extend_from_slice(&received);
        }
        if let Some(message) = self.next_message()? {
            return Ok(Some(message));
        }

        if self.buffer.len() > MAX_UNTERMINATED_LINE {
            let fragment = std::mem::take(&mut self.buffer);
            return Err(EndpointError::malformed(
                &fragment,
                format!(
                    "{} bytes without a line terminator exceeds the {MAX_UNTERMINATED_LINE} byte limit",
                    fragment.len()
                ),
            ));
        }
        Ok(None)
    }

    fn close(&mut self) {
        self.buffer.clear();
        self.channel.close();
    }
}

/// Sink encoding each message as one JSON line.
#[derive(Debug)]
pub struct ChannelSink<C> {
    channel: C,
}

impl<C: Channel> ChannelSink<C> {
    /// Wraps `channel`.
    pub const fn new(channel: C) -> Self {
        Self { channel }
    }
}

impl<C: Channel> Sink for ChannelSink<C> {
    fn write(&mut self, message: &Message) -> Result<(), EndpointError> {
        let mut line = serde_json::to_vec(message).map_err(EndpointError::Encode)?;
        line.push(b'\n');
        self.channel.write(&line)
    }

    fn close(&mut self) {
        self.channel.close();
    }
}

#[cfg(test)]
mod tests;
