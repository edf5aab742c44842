//! Messages exchanged between endpoints.
//!
//! A [`Message`] is a JSON object. The router only looks at two fields:
//! `from`, a flat mapping of sender attributes matched by [`crate::Rule`]s,
//! and `to`, an explicit destination that bypasses rule evaluation. Every
//! other field is payload and passes through untouched.

use std::borrow::Cow;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Field holding the sender attributes.
pub const ORIGIN_FIELD: &str = "from";

/// Field holding the explicit destination.
pub const DESTINATION_FIELD: &str = "to";

/// A decoded JSON-line message.
///
/// # Example
///
/// ```
/// use pa_routing::Message;
///
/// let message = Message::new()
///     .with_origin([("media", "telegram"), ("user", "123456")])
///     .with_field("text", "hello");
/// assert_eq!(message.origin_attribute("media").as_deref(), Some("telegram"));
/// assert_eq!(message.destination(), None);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Message {
    fields: Map<String, Value>,
}

impl Message {
    /// Creates an empty message.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the `from` mapping with the given attributes.
    #[must_use]
    pub fn with_origin<I, K, V>(mut self, attributes: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        let origin: Map<String, Value> = attributes
            .into_iter()
            .map(|(key, value)| (key.into(), value.into()))
            .collect();
        self.fields
            .insert(ORIGIN_FIELD.to_owned(), Value::Object(origin));
        self
    }

    /// Sets the explicit destination.
    #[must_use]
    pub fn with_destination(mut self, destination: impl Into<String>) -> Self {
        self.fields.insert(
            DESTINATION_FIELD.to_owned(),
            Value::String(destination.into()),
        );
        self
    }

    /// Sets an arbitrary field.
    #[must_use]
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    /// Returns the explicit destination when `to` is a non-empty string.
    #[must_use]
    pub fn destination(&self) -> Option<&str> {
        self.fields
            .get(DESTINATION_FIELD)
            .and_then(Value::as_str)
            .filter(|destination| !destination.is_empty())
    }

    /// Returns the `from` mapping when present and an object.
    #[must_use]
    pub fn origin(&self) -> Option<&Map<String, Value>> {
        self.fields.get(ORIGIN_FIELD).and_then(Value::as_object)
    }

    /// Returns one sender attribute as text.
    ///
    /// Strings are returned as-is; numbers and booleans by their JSON text,
    /// so a numeric `user` id still matches a clause written as a string.
    /// Nulls, arrays and objects never match and yield `None`.
    #[must_use]
    pub fn origin_attribute(&self, key: &str) -> Option<Cow<'_, str>> {
        match self.origin()?.get(key)? {
            Value::String(text) => Some(Cow::Borrowed(text.as_str())),
            Value::Number(number) => Some(Cow::Owned(number.to_string())),
            Value::Bool(flag) => Some(Cow::Owned(flag.to_string())),
            Value::Null | Value::Array(_) | Value::Object(_) => None,
        }
    }

    /// Returns a field by name.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    /// Returns all fields.
    #[must_use]
    pub const fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }
}

impl From<Map<String, Value>> for Message {
    fn from(fields: Map<String, Value>) -> Self {
        Self { fields }
    }
}
