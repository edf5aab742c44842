//! Message dispatch between registered faucets and sinks.
//!
//! The [`Router`] keeps three registries: faucets and sinks keyed by name,
//! and per-faucet rule lists sorted by descending specificity. Each call to
//! [`Router::tick`] drains every faucet and delivers each message to exactly
//! one sink:
//!
//! 1. the sink named by the message's `to` field, when present;
//! 2. otherwise the destination of the first matching rule for the faucet;
//! 3. otherwise the default sink.
//!
//! When the chosen name has no sink bound, the optional sink factory is
//! called once to create it. Anything still unbound goes to the default
//! sink, so no message is dropped silently.

use std::borrow::Cow;
use std::cmp::Reverse;
use std::collections::{BTreeMap, HashMap};
use std::fmt;

use tracing::{debug, trace, warn};

use crate::endpoint::{FaucetHandle, SinkHandle};
use crate::error::RouterError;
use crate::message::Message;
use crate::rule::Rule;

/// Tracing target for dispatch operations.
const ROUTER_TARGET: &str = "pa_routing::router";

/// Callback creating a sink on demand for a destination name.
///
/// The factory receives the router and the unbound destination and is
/// expected to call [`Router::add_sink`] (and usually [`Router::add_faucet`])
/// before returning.
pub type SinkFactory = Box<dyn FnMut(&mut Router, &str) + Send>;

/// Sink a message was delivered to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Route {
    /// A sink registered under this name.
    Named(String),
    /// The router's default sink.
    Default,
}

impl Route {
    /// Returns the sink name, or `None` for the default sink.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        match self {
            Self::Named(name) => Some(name.as_str()),
            Self::Default => None,
        }
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Named(name) => write!(f, "'{name}'"),
            Self::Default => f.write_str("default"),
        }
    }
}

/// Outcome of one [`Router::tick`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Messages written to a sink.
    pub delivered: usize,
    /// Undecodable lines that were skipped.
    pub malformed: usize,
}

impl TickReport {
    /// Returns `true` when nothing happened.
    #[must_use]
    pub const fn is_idle(&self) -> bool {
        self.delivered == 0 && self.malformed == 0
    }
}

/// Dispatcher owning the endpoint and rule registries.
pub struct Router {
    faucets: BTreeMap<String, FaucetHandle>,
    sinks: BTreeMap<String, SinkHandle>,
    default_sink: SinkHandle,
    rules: HashMap<String, Vec<Rule>>,
    sink_factory: Option<SinkFactory>,
}

impl Router {
    /// Creates a router delivering unroutable messages to `default_sink`.
    #[must_use]
    pub fn new(default_sink: SinkHandle) -> Self {
        Self {
            faucets: BTreeMap::new(),
            sinks: BTreeMap::new(),
            default_sink,
            rules: HashMap::new(),
            sink_factory: None,
        }
    }

    /// Registers `faucet` under `name`, replacing any previous binding.
    pub fn add_faucet(&mut self, name: impl Into<String>, faucet: FaucetHandle) {
        let key = name.into();
        debug!(target: ROUTER_TARGET, faucet = %key, "faucet registered");
        self.faucets.insert(key, faucet);
    }

    /// Registers `sink` under `name`, replacing any previous binding.
    pub fn add_sink(&mut self, name: impl Into<String>, sink: SinkHandle) {
        let key = name.into();
        debug!(target: ROUTER_TARGET, sink = %key, "sink registered");
        self.sinks.insert(key, sink);
    }

    /// Appends `rule` to the rules of `faucet_name`.
    ///
    /// Rules are kept in descending specificity; among rules of equal
    /// specificity the earlier registration is tried first. The faucet does
    /// not need to be registered yet.
    pub fn add_rule(&mut self, rule: Rule, faucet_name: impl Into<String>) {
        let rules = self.rules.entry(faucet_name.into()).or_default();
        rules.push(rule);
        rules.sort_by_key(|candidate| Reverse(candidate.specificity()));
    }

    /// Installs the callback used to create sinks on demand, replacing any
    /// previous one.
    pub fn add_sink_factory<F>(&mut self, factory: F)
    where
        F: FnMut(&mut Self, &str) + Send + 'static,
    {
        self.sink_factory = Some(Box::new(factory));
    }

    /// Swaps the default sink, returning the previous one.
    pub fn replace_default_sink(&mut self, sink: SinkHandle) -> SinkHandle {
        std::mem::replace(&mut self.default_sink, sink)
    }

    /// Returns the default sink.
    #[must_use]
    pub const fn default_sink(&self) -> &SinkHandle {
        &self.default_sink
    }

    /// Deregisters the faucet called `name`, returning it.
    pub fn remove_faucet_by_name(&mut self, name: &str) -> Option<FaucetHandle> {
        let removed = self.faucets.remove(name);
        if removed.is_some() {
            debug!(target: ROUTER_TARGET, faucet = name, "faucet removed");
        }
        removed
    }

    /// Deregisters every binding of `faucet`, returning the first name it
    /// was registered under.
    pub fn remove_faucet_by_reference(&mut self, faucet: &FaucetHandle) -> Option<String> {
        let names: Vec<String> = self
            .faucets
            .iter()
            .filter(|(_, candidate)| candidate.same_as(faucet))
            .map(|(name, _)| name.clone())
            .collect();
        for name in &names {
            self.remove_faucet_by_name(name);
        }
        names.into_iter().next()
    }

    /// Deregisters the sink called `name`, returning it. The default sink is
    /// not reachable through this call.
    pub fn remove_sink_by_name(&mut self, name: &str) -> Option<SinkHandle> {
        let removed = self.sinks.remove(name);
        if removed.is_some() {
            debug!(target: ROUTER_TARGET, sink = name, "sink removed");
        }
        removed
    }

    /// Deregisters every named binding of `sink`, returning the first name
    /// it was registered under. The default sink is never removed.
    pub fn remove_sink_by_reference(&mut self, sink: &SinkHandle) -> Option<String> {
        let names: Vec<String> = self
            .sinks
            .iter()
            .filter(|(_, candidate)| candidate.same_as(sink))
            .map(|(name, _)| name.clone())
            .collect();
        for name in &names {
            self.remove_sink_by_name(name);
        }
        names.into_iter().next()
    }

    /// Returns `true` when a faucet is registered under `name`.
    #[must_use]
    pub fn has_faucet(&self, name: &str) -> bool {
        self.faucets.contains_key(name)
    }

    /// Returns `true` when a sink is registered under `name`.
    #[must_use]
    pub fn has_sink(&self, name: &str) -> bool {
        self.sinks.contains_key(name)
    }

    /// Registered faucet names in order.
    pub fn faucet_names(&self) -> impl Iterator<Item = &str> {
        self.faucets.keys().map(String::as_str)
    }

    /// Registered sink names in order, excluding the default sink.
    pub fn sink_names(&self) -> impl Iterator<Item = &str> {
        self.sinks.keys().map(String::as_str)
    }

    /// Rules of `faucet_name` in the order they are tried.
    #[must_use]
    pub fn rules_for(&self, faucet_name: &str) -> &[Rule] {
        self.rules.get(faucet_name).map_or(&[], Vec::as_slice)
    }

    /// Resolves where a message from `faucet_name` would be delivered now,
    /// without calling the sink factory.
    #[must_use]
    pub fn route(&self, faucet_name: &str, message: &Message) -> Route {
        match self.destination_for(faucet_name, message) {
            Some(destination) if self.sinks.contains_key(destination.as_ref()) => {
                Route::Named(destination.into_owned())
            }
            _ => Route::Default,
        }
    }

    /// Drains every faucet registered at the start of the call and delivers
    /// each message.
    ///
    /// Undecodable lines are logged, counted and skipped.
    ///
    /// # Errors
    ///
    /// Stops at the first faucet read failure or sink write failure and
    /// returns it tagged with the endpoint involved. Messages already
    /// delivered stay delivered; the next tick resumes where this one
    /// stopped.
    pub fn tick(&mut self) -> Result<TickReport, RouterError> {
        let snapshot: Vec<(String, FaucetHandle)> = self
            .faucets
            .iter()
            .map(|(name, faucet)| (name.clone(), faucet.clone()))
            .collect();
        let mut report = TickReport::default();

        for (name, faucet) in snapshot {
            loop {
                let message = match faucet.read() {
                    Ok(Some(next)) => next,
                    Ok(None) => break,
                    Err(error) if error.is_malformed() => {
                        warn!(
                            target: ROUTER_TARGET,
                            faucet = %name,
                            %error,
                            "skipping malformed message"
                        );
                        report.malformed = report.malformed.saturating_add(1);
                        continue;
                    }
                    Err(source) => return Err(RouterError::Faucet { name, source }),
                };
                self.dispatch(&name, &message)?;
                report.delivered = report.delivered.saturating_add(1);
            }
        }

        if !report.is_idle() {
            trace!(
                target: ROUTER_TARGET,
                delivered = report.delivered,
                malformed = report.malformed,
                "tick complete"
            );
        }
        Ok(report)
    }

    /// Delivers one message as if it had been read from `faucet_name`.
    ///
    /// # Errors
    ///
    /// Returns [`RouterError::Sink`] when the resolved sink rejects the
    /// message.
    pub fn dispatch(&mut self, faucet_name: &str, message: &Message) -> Result<Route, RouterError> {
        let route = self.resolve(faucet_name, message);
        let sink = match &route {
            Route::Named(name) => self.sinks.get(name).unwrap_or(&self.default_sink),
            Route::Default => &self.default_sink,
        }
        .clone();
        match sink.write(message) {
            Ok(()) => {
                trace!(
                    target: ROUTER_TARGET,
                    faucet = faucet_name,
                    %route,
                    "message delivered"
                );
                Ok(route)
            }
            Err(source) => Err(RouterError::Sink { route, source }),
        }
    }

    /// Resolves the sink for a message, creating it through the factory when
    /// needed.
    fn resolve(&mut self, faucet_name: &str, message: &Message) -> Route {
        let Some(destination) = self
            .destination_for(faucet_name, message)
            .map(Cow::into_owned)
        else {
            return Route::Default;
        };
        if self.sinks.contains_key(&destination) {
            return Route::Named(destination);
        }

        if let Some(mut factory) = self.sink_factory.take() {
            debug!(
                target: ROUTER_TARGET,
                destination = %destination,
                "creating sink on demand"
            );
            factory(self, &destination);
            if self.sink_factory.is_none() {
                self.sink_factory = Some(factory);
            }
        }

        if self.sinks.contains_key(&destination) {
            Route::Named(destination)
        } else {
            debug!(
                target: ROUTER_TARGET,
                destination = %destination,
                "no sink bound, using default"
            );
            Route::Default
        }
    }

    /// Explicit destination, or the first rule target for the faucet.
    fn destination_for<'a>(
        &'a self,
        faucet_name: &str,
        message: &'a Message,
    ) -> Option<Cow<'a, str>> {
        if let Some(explicit) = message.destination() {
            return Some(Cow::Borrowed(explicit));
        }
        self.rules_for(faucet_name)
            .iter()
            .find_map(|rule| rule.target_for(message))
    }
}

impl fmt::Debug for Router {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Router")
            .field("faucets", &self.faucets.keys().collect::<Vec<_>>())
            .field("sinks", &self.sinks.keys().collect::<Vec<_>>())
            .field("rules", &self.rules)
            .field("has_sink_factory", &self.sink_factory.is_some())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests;
