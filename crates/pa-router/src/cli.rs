//! Command-line arguments of the router daemon.

use std::time::Duration;

use camino::Utf8PathBuf;
use clap::Parser;
use pa_config::{DEFAULT_CONFIG_FILE, DEFAULT_LOG_FILTER, DEFAULT_TICK_INTERVAL_MS, LogFormat};
use pa_routing::Rule;

use crate::daemon::DaemonOptions;

/// Routes JSON-line messages between supervised applications.
#[derive(Parser, Debug)]
#[command(name = "pa-router", version)]
pub(crate) struct Cli {
    /// YAML file declaring the applications to start.
    #[arg(long, value_name = "PATH", default_value = DEFAULT_CONFIG_FILE)]
    pub(crate) config: Utf8PathBuf,
    /// `tracing` filter expression, for example `info,pa_routing=debug`.
    #[arg(long, value_name = "FILTER", default_value = DEFAULT_LOG_FILTER)]
    pub(crate) log_filter: String,
    /// Log output format: `json` or `compact`.
    #[arg(long, value_name = "FORMAT", default_value_t = LogFormat::Json)]
    pub(crate) log_format: LogFormat,
    /// Pause in milliseconds after a pass that moved no messages.
    #[arg(long, value_name = "MS", default_value_t = DEFAULT_TICK_INTERVAL_MS)]
    pub(crate) tick_interval_ms: u64,
    /// Application alias receiving messages nothing else claims. Such
    /// messages are logged when omitted.
    #[arg(long, value_name = "ALIAS")]
    pub(crate) default_sink: Option<String>,
    /// Routing rule `FAUCET:TARGET[:KEY=VALUE,...]`; may be repeated.
    #[arg(long = "route", value_name = "RULE", value_parser = parse_route)]
    pub(crate) routes: Vec<RouteArg>,
}

impl Cli {
    /// Converts the parsed flags into daemon settings.
    pub(crate) fn daemon_options(&self) -> DaemonOptions {
        DaemonOptions {
            tick_interval: Duration::from_millis(self.tick_interval_ms),
            default_sink: self.default_sink.clone(),
            routes: self
                .routes
                .iter()
                .map(|route| (route.faucet.clone(), route.rule.clone()))
                .collect(),
        }
    }
}

/// A `--route` flag: a rule and the faucet it applies to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct RouteArg {
    pub(crate) faucet: String,
    pub(crate) rule: Rule,
}

fn parse_route(raw: &str) -> Result<RouteArg, String> {
    let mut parts = raw.splitn(3, ':');
    let faucet = parts.next().unwrap_or_default().trim();
    let target = parts
        .next()
        .ok_or_else(|| format!("route '{raw}' must have the form FAUCET:TARGET[:KEY=VALUE,...]"))?
        .trim();
    if faucet.is_empty() {
        return Err(format!("route '{raw}' names no faucet"));
    }

    let clauses = parts
        .next()
        .map(parse_clauses)
        .transpose()?
        .unwrap_or_default();
    let rule = Rule::new(target, clauses).map_err(|error| format!("route '{raw}': {error}"))?;
    Ok(RouteArg {
        faucet: faucet.to_owned(),
        rule,
    })
}

fn parse_clauses(raw: &str) -> Result<Vec<(String, String)>, String> {
    raw.split(',')
        .filter(|pair| !pair.trim().is_empty())
        .map(|pair| {
            pair.split_once('=')
                .map(|(key, value)| (key.trim().to_owned(), value.trim().to_owned()))
                .ok_or_else(|| format!("clause '{pair}' must have the form KEY=VALUE"))
        })
        .collect()
}
