//! In-process message routing between supervised applications.
//!
//! The `pa-routing` crate bridges independent processes (a chat front-end, a
//! "brain" backend and auxiliary tools) through a single dispatcher. Each
//! process is reached through a non-blocking byte [`Channel`] (an anonymous
//! pipe or a Unix domain socket) carrying newline-delimited JSON objects.
//!
//! # Architecture
//!
//! - [`ChannelFaucet`] and [`ChannelSink`] frame JSON lines on top of a
//!   channel, tolerating partial deliveries.
//! - [`Rule`] selects a destination from a message's `from` attributes, with
//!   more specific rules taking priority.
//! - [`Router`] owns the registered faucets and sinks and drains every faucet
//!   on each [`Router::tick`], delivering each message to the sink named by
//!   its `to` field, by the first matching rule, or to the default sink.
//! - [`Runner`] spawns [`App`] templates as [`Proc`] instances and exposes
//!   their faucet and sink for registration with the router.
//!
//! # Example
//!
//! ```rust,no_run
//! use camino::Utf8Path;
//! use pa_config::RunnerConfig;
//! use pa_routing::{Router, Rule, Runner, StartOverrides};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = RunnerConfig::load(Utf8Path::new("router.yaml"))?;
//! let mut runner = Runner::new();
//! runner.update_config(&config)?;
//! runner.ensure_running("brain", None, &[], &StartOverrides::default())?;
//! runner.ensure_running("telegram", Some("tg"), &[], &StartOverrides::default())?;
//!
//! let mut router = Router::new(runner.get_sink("brain")?);
//! router.add_faucet("tg", runner.get_faucet("tg")?);
//! router.add_faucet("brain", runner.get_faucet("brain")?);
//! router.add_sink("tg", runner.get_sink("tg")?);
//! router.add_rule(Rule::new("tg", [("media", "telegram")])?, "brain");
//!
//! loop {
//!     router.tick()?;
//!     std::thread::sleep(std::time::Duration::from_millis(50));
//! }
//! # }
//! ```

pub mod channel;
pub mod endpoint;
pub mod error;
pub mod framing;
pub mod message;
pub mod router;
pub mod rule;
pub mod runner;

#[cfg(test)]
mod tests;

pub use self::channel::{Channel, PipeChannel, SocketChannel};
pub use self::endpoint::{Faucet, FaucetHandle, Sink, SinkHandle};
pub use self::error::{EndpointError, RouterError, RuleError, RunnerError};
pub use self::framing::{ChannelFaucet, ChannelSink};
pub use self::message::Message;
pub use self::router::{Route, Router, SinkFactory, TickReport};
pub use self::rule::{Clauses, Rule};
pub use self::runner::{App, Proc, Runner, StartOverrides};
