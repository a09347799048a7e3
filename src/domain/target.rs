use super::message::Message;
use regex::Regex;
use serde::Serialize;
use std::fmt;
use std::sync::LazyLock;

static TOPIC_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-zA-Z0-9\-_.~%]+$").expect("topic pattern must compile"));

/// Where a message is delivered. Serializes as the single addressing key the
/// provider expects (`token`, `topic` or `condition`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Target {
    Token(String),
    Topic(String),
    Condition(String),
}

impl Target {
    /// Returns true if `topic` is a well-formed topic name.
    #[must_use]
    pub fn is_valid_topic(topic: &str) -> bool {
        TOPIC_PATTERN.is_match(topic)
    }

    /// Checks that the target can be addressed: a non-empty value, and a
    /// well-formed name for topics. Returns the reason it cannot.
    ///
    /// # Errors
    /// Returns a user-facing message describing the malformed target.
    pub fn validate(&self) -> Result<(), &'static str> {
        match self {
            Self::Token(t) if t.is_empty() => Err("Token is required"),
            Self::Topic(t) if t.is_empty() => Err("Topic is required"),
            Self::Topic(t) if !Self::is_valid_topic(t) => Err("Invalid topic format"),
            Self::Condition(c) if c.is_empty() => Err("Condition is required"),
            _ => Ok(()),
        }
    }

    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Token(_) => "token",
            Self::Topic(_) => "topic",
            Self::Condition(_) => "condition",
        }
    }

    #[must_use]
    pub fn value(&self) -> &str {
        match self {
            Self::Token(v) | Self::Topic(v) | Self::Condition(v) => v,
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Condition(c) => write!(f, "condition \"{c}\""),
            other => write!(f, "{} {}", other.kind(), other.value()),
        }
    }
}

/// A message paired with its target, borrowed from the caller so the
/// caller's value is never cloned or mutated.
#[derive(Debug, Serialize)]
pub struct AddressedMessage<'a> {
    #[serde(flatten)]
    pub target: &'a Target,
    #[serde(flatten)]
    pub message: &'a Message,
}

/// Request envelope for the messaging endpoint: `{ "message": { ... } }`.
#[derive(Debug, Serialize)]
pub struct SendRequest<'a> {
    pub message: AddressedMessage<'a>,
}

impl<'a> SendRequest<'a> {
    #[must_use]
    pub const fn new(target: &'a Target, message: &'a Message) -> Self {
        Self { message: AddressedMessage { target, message } }
    }
}
