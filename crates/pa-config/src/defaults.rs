use std::time::Duration;

/// Log filter used when none is supplied.
pub const DEFAULT_LOG_FILTER: &str = "info";

/// Configuration file read by the daemon when `--config` is omitted.
pub const DEFAULT_CONFIG_FILE: &str = "router.yaml";

/// How long a socket application gets to create and accept on its socket.
pub const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 10_000;

/// Pause between two dispatch passes of the daemon loop.
pub const DEFAULT_TICK_INTERVAL_MS: u64 = 50;

/// Default bound on waiting for an application's socket.
#[must_use]
pub const fn default_connect_timeout() -> Duration {
    Duration::from_millis(DEFAULT_CONNECT_TIMEOUT_MS)
}

/// Default pause between dispatch passes.
#[must_use]
pub const fn default_tick_interval() -> Duration {
    Duration::from_millis(DEFAULT_TICK_INTERVAL_MS)
}
