//! Shared configuration for the PA message router.
//!
//! The router supervises a set of external applications (a chat front-end, a
//! "brain" backend and any auxiliary tools). Each application is described by
//! an [`AppConfig`] entry in a YAML document keyed by application name:
//!
//! ```yaml
//! telegram:
//!   command: tg-frontend --socket /run/pa/tg.sock
//!   type: socket
//!   socket: /run/pa/tg.sock
//! brain:
//!   command: [python3, -m, brain]
//!   type: stdio
//!   cwd: /srv/brain
//! ```
//!
//! [`RunnerConfig`] holds the whole document. Loading and validation live here
//! so the daemon binary and the supervisor agree on one schema.

mod apps;
mod defaults;
mod logging;

pub use apps::{AppConfig, CommandLine, ConfigError, RunnerConfig, TransportKind};
pub use defaults::{
    DEFAULT_CONFIG_FILE, DEFAULT_CONNECT_TIMEOUT_MS, DEFAULT_LOG_FILTER, DEFAULT_TICK_INTERVAL_MS,
    default_connect_timeout, default_tick_interval,
};
pub use logging::LogFormat;
