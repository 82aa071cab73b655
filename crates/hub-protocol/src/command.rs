//! Outbound command envelopes and inbound command responses

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ParseError;

/// JSON envelope sent from the client to the hub
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "camelCase")]
pub enum Command {
    /// Sent once right after the socket opens
    UserGreet { pathway: String },
    /// A user-issued control action
    UserMessage { pathway: String, payload: String },
}

impl Command {
    pub fn greet(pathway: impl Into<String>) -> Self {
        Command::UserGreet {
            pathway: pathway.into(),
        }
    }

    pub fn message(pathway: impl Into<String>, payload: impl Into<String>) -> Self {
        Command::UserMessage {
            pathway: pathway.into(),
            payload: payload.into(),
        }
    }

    /// Serialize to the JSON text sent over the socket
    pub fn to_json(&self) -> String {
        // Serializing a plain enum of strings cannot fail
        serde_json::to_string(self).unwrap_or_default()
    }

    /// Parse a JSON envelope (used by simulated hubs)
    pub fn from_json(text: &str) -> Result<Self, ParseError> {
        Ok(serde_json::from_str(text)?)
    }
}

/// Whether the hub accepted a command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResponseKind {
    Ack,
    Nak,
}

impl ResponseKind {
    /// Leading sigil on the wire
    pub fn sigil(&self) -> char {
        match self {
            ResponseKind::Ack => 'A',
            ResponseKind::Nak => 'N',
        }
    }

    /// Emoji the UI prefixes a toast with
    pub fn emoji(&self) -> &'static str {
        match self {
            ResponseKind::Ack => "👍",
            ResponseKind::Nak => "👎",
        }
    }
}

/// Decoded `Response` frame
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Response {
    pub kind: ResponseKind,
    /// Text after the sigil, leading whitespace trimmed
    pub text: String,
}

impl Response {
    /// Parse the text of a `Response` frame
    ///
    /// Anything that does not start with `A` is treated as a rejection.
    pub fn parse(text: &str) -> Self {
        let mut chars = text.chars();
        let kind = match chars.next() {
            Some('A') => ResponseKind::Ack,
            _ => ResponseKind::Nak,
        };
        Self {
            kind,
            text: chars.as_str().trim_start().to_string(),
        }
    }

    pub fn ack(text: impl Into<String>) -> Self {
        Self {
            kind: ResponseKind::Ack,
            text: text.into(),
        }
    }

    pub fn nak(text: impl Into<String>) -> Self {
        Self {
            kind: ResponseKind::Nak,
            text: text.into(),
        }
    }

    pub fn is_ack(&self) -> bool {
        self.kind == ResponseKind::Ack
    }

    /// Wire text: sigil, space, text
    pub fn to_wire(&self) -> String {
        format!("{} {}", self.kind.sigil(), self.text)
    }
}

impl fmt::Display for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.kind.emoji(), self.text)
    }
}
