//! The routing envelope.
//!
//! Every boundary in the shell speaks the same `{id, data}` shape. The flat
//! `id` uses a colon-delimited namespace:
//! - `ping`, `init` - bare control verbs, handled locally
//! - `req:name` - a request, answered with `re:name` or a domain response
//! - `re:name` - an acknowledgement or response
//! - `info:name` - a one-way notification
//! - `py:name` (any other `origin:`) - provenance from the backend link

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

/// Prefix stamped on events that arrive over the backend link.
pub const BACKEND_ORIGIN: &str = "py";

/// A message in the `{id, data}` envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    #[serde(default = "empty_object")]
    pub data: Value,
}

fn empty_object() -> Value {
    Value::Object(Map::new())
}

impl Message {
    /// Create a new message.
    pub fn new(id: impl Into<String>, data: Value) -> Self {
        Self {
            id: id.into(),
            data,
        }
    }

    /// Create a message with an empty `data` object.
    pub fn bare(id: impl Into<String>) -> Self {
        Self::new(id, empty_object())
    }

    /// Accept an untyped value at a trust boundary.
    ///
    /// Only the envelope is checked; the payload is never interpreted.
    pub fn from_value(value: Value) -> Result<Self, EnvelopeError> {
        let Value::Object(mut fields) = value else {
            return Err(EnvelopeError::NotAnObject);
        };

        let id = match fields.remove("id") {
            Some(Value::String(id)) if !id.is_empty() => id,
            Some(Value::String(_)) => return Err(EnvelopeError::EmptyId),
            Some(_) => return Err(EnvelopeError::IdNotString),
            None => return Err(EnvelopeError::MissingId),
        };

        let data = match fields.remove("data") {
            None | Some(Value::Null) => empty_object(),
            Some(data) => data,
        };

        Ok(Self { id, data })
    }

    /// Parse the flat id into its tagged form.
    pub fn parse_id(&self) -> Result<MessageId, IdParseError> {
        self.id.parse()
    }

    /// Build the `re:<id>` acknowledgement for this message.
    pub fn ack(&self, data: Value) -> Message {
        Message::new(format!("re:{}", self.id), data)
    }
}

/// What a message id says about intent or provenance.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum IdKind {
    /// Bare verb, no prefix.
    Control,
    /// `req:`
    Request,
    /// `re:`
    Response,
    /// `info:`
    Info,
    /// Any other prefix, naming where the message came from.
    Origin(String),
}

impl IdKind {
    fn prefix(&self) -> Option<&str> {
        match self {
            IdKind::Control => None,
            IdKind::Request => Some("req"),
            IdKind::Response => Some("re"),
            IdKind::Info => Some("info"),
            IdKind::Origin(origin) => Some(origin),
        }
    }
}

/// A message id parsed once at the routing boundary.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MessageId {
    kind: IdKind,
    name: String,
}

impl MessageId {
    pub fn new(kind: IdKind, name: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
        }
    }

    /// Id for an event that arrived from the backend link.
    pub fn from_backend(name: impl Into<String>) -> Self {
        Self::new(IdKind::Origin(BACKEND_ORIGIN.to_string()), name)
    }

    pub fn kind(&self) -> &IdKind {
        &self.kind
    }

    /// The part after the prefix (the whole id for control verbs).
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_from_backend(&self) -> bool {
        matches!(&self.kind, IdKind::Origin(o) if o == BACKEND_ORIGIN)
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind.prefix() {
            Some(prefix) => write!(f, "{}:{}", prefix, self.name),
            None => f.write_str(&self.name),
        }
    }
}

impl FromStr for MessageId {
    type Err = IdParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(IdParseError::Empty);
        }

        let Some((prefix, name)) = s.split_once(':') else {
            return Ok(Self::new(IdKind::Control, s));
        };

        if prefix.is_empty() {
            return Err(IdParseError::EmptyPrefix(s.to_string()));
        }
        if name.is_empty() {
            return Err(IdParseError::EmptyName(s.to_string()));
        }

        let kind = match prefix {
            "req" => IdKind::Request,
            "re" => IdKind::Response,
            "info" => IdKind::Info,
            other => IdKind::Origin(other.to_string()),
        };

        Ok(Self::new(kind, name))
    }
}

impl From<MessageId> for String {
    fn from(id: MessageId) -> Self {
        id.to_string()
    }
}

/// Error accepting an untyped value as an envelope.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EnvelopeError {
    #[error("message must be a JSON object")]
    NotAnObject,
    #[error("message has no `id` field")]
    MissingId,
    #[error("message `id` must be a string")]
    IdNotString,
    #[error("message `id` cannot be empty")]
    EmptyId,
}

/// Error parsing a flat message id.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IdParseError {
    #[error("message id cannot be empty")]
    Empty,
    #[error("message id prefix cannot be empty, got: {0}")]
    EmptyPrefix(String),
    #[error("message id name cannot be empty, got: {0}")]
    EmptyName(String),
}
