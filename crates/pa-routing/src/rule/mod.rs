//! Routing rules matched against a message's sender attributes.
//!
//! A rule holds a set of [`Clauses`], each an exact `key = value` requirement
//! on the message's `from` mapping, and a way of naming the destination.
//! Rules with more clauses are more specific and are tried first; a rule
//! with no clauses matches every message.

use std::borrow::Cow;
use std::collections::BTreeMap;

use crate::error::RuleError;
use crate::message::Message;

/// Validated clause set of a [`Rule`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Clauses {
    entries: BTreeMap<String, String>,
}

impl Clauses {
    /// Builds a clause set from `(key, value)` pairs.
    ///
    /// # Errors
    ///
    /// Returns [`RuleError::EmptyClauseKey`] for an empty key and
    /// [`RuleError::DuplicateClause`] when a key repeats.
    pub fn new<I, K, V>(pairs: I) -> Result<Self, RuleError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut entries = BTreeMap::new();
        for (raw_key, value) in pairs {
            let key: String = raw_key.into();
            if key.is_empty() {
                return Err(RuleError::EmptyClauseKey);
            }
            if entries.contains_key(&key) {
                return Err(RuleError::DuplicateClause { key });
            }
            entries.insert(key, value.into());
        }
        Ok(Self { entries })
    }

    /// Returns `true` when every clause equals the matching `from`
    /// attribute of `message`.
    #[must_use]
    pub fn matches(&self, message: &Message) -> bool {
        self.entries.iter().all(|(key, expected)| {
            message
                .origin_attribute(key)
                .is_some_and(|actual| actual == expected.as_str())
        })
    }

    /// Number of clauses.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` for the match-everything clause set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates over clauses in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries
            .iter()
            .map(|(key, value)| (key.as_str(), value.as_str()))
    }
}

/// Destination selector attached to a faucet.
///
/// # Example
///
/// ```
/// use pa_routing::{Message, Rule};
///
/// let rule = Rule::new("tg", [("media", "telegram")])?;
/// let message = Message::new().with_origin([("media", "telegram")]);
/// assert_eq!(rule.target_for(&message).as_deref(), Some("tg"));
///
/// let per_user = Rule::computed("tg:", "user", [("media", "telegram")])?;
/// let message = Message::new().with_origin([("media", "telegram"), ("user", "42")]);
/// assert_eq!(per_user.target_for(&message).as_deref(), Some("tg:42"));
/// # Ok::<(), pa_routing::RuleError>(())
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rule {
    /// Routes matching messages to a fixed destination.
    Clause {
        /// Destination name.
        target: String,
        /// Requirements on the `from` mapping.
        clauses: Clauses,
    },
    /// Routes matching messages to `prefix` followed by the value of one
    /// `from` attribute.
    Computed {
        /// Fixed leading part of the destination name.
        prefix: String,
        /// Sender attribute appended to the prefix.
        attribute: String,
        /// Requirements on the `from` mapping.
        clauses: Clauses,
    },
}

impl Rule {
    /// Builds a fixed-destination rule.
    ///
    /// # Errors
    ///
    /// Returns [`RuleError::EmptyTarget`] for an empty target, plus the
    /// errors of [`Clauses::new`].
    pub fn new<I, K, V>(target: impl Into<String>, clauses: I) -> Result<Self, RuleError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let destination: String = target.into();
        if destination.is_empty() {
            return Err(RuleError::EmptyTarget);
        }
        Ok(Self::Clause {
            target: destination,
            clauses: Clauses::new(clauses)?,
        })
    }

    /// Builds a rule that matches every message.
    ///
    /// # Errors
    ///
    /// Returns [`RuleError::EmptyTarget`] for an empty target.
    pub fn catch_all(target: impl Into<String>) -> Result<Self, RuleError> {
        Self::new(target, std::iter::empty::<(String, String)>())
    }

    /// Builds a computed-destination rule.
    ///
    /// Matching messages lacking `attribute` yield no destination, so the
    /// next rule in priority order is tried.
    ///
    /// # Errors
    ///
    /// Returns [`RuleError::EmptyTarget`] for an empty prefix,
    /// [`RuleError::EmptyAttribute`] for an empty attribute, plus the errors
    /// of [`Clauses::new`].
    pub fn computed<I, K, V>(
        prefix: impl Into<String>,
        attribute: impl Into<String>,
        clauses: I,
    ) -> Result<Self, RuleError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let fixed: String = prefix.into();
        let key: String = attribute.into();
        if fixed.is_empty() {
            return Err(RuleError::EmptyTarget);
        }
        if key.is_empty() {
            return Err(RuleError::EmptyAttribute);
        }
        Ok(Self::Computed {
            prefix: fixed,
            attribute: key,
            clauses: Clauses::new(clauses)?,
        })
    }

    /// Returns the clause set.
    #[must_use]
    pub const fn clauses(&self) -> &Clauses {
        match self {
            Self::Clause { clauses, .. } | Self::Computed { clauses, .. } => clauses,
        }
    }

    /// Priority of the rule: its clause count.
    #[must_use]
    pub fn specificity(&self) -> usize {
        self.clauses().len()
    }

    /// Returns the destination for `message`, or `None` when the rule does
    /// not apply.
    #[must_use]
    pub fn target_for(&self, message: &Message) -> Option<Cow<'_, str>> {
        if !self.clauses().matches(message) {
            return None;
        }
        match self {
            Self::Clause { target, .. } => Some(Cow::Borrowed(target.as_str())),
            Self::Computed {
                prefix, attribute, ..
            } => {
                let value = message.origin_attribute(attribute)?;
                Some(Cow::Owned(format!("{prefix}{value}")))
            }
        }
    }
}

#[cfg(test)]
mod tests;
