use std::fmt;

use serde::{Deserialize, Serialize};

/// Opaque delivery target id (a chat id or `@channel` for Telegram).
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DestinationId(pub String);

impl DestinationId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DestinationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DestinationId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// A registered destination and its display label ("credit").
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Destination {
    pub id: DestinationId,
    pub label: String,
}

/// Operator user id on the command transport.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct UserId(pub i64);

/// One record as received from the source, with fields normalized to text.
///
/// Only `timestamp`, `subject`, `platform` and the extracted code take part in
/// the fingerprint; the remaining fields exist for rendering.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RawRecord {
    pub timestamp: String,
    pub subject: String,
    pub platform: String,
    pub raw_code: String,
    pub date: String,
    pub country: String,
    pub flag: String,
    pub message: String,
}

/// Digits extracted from a record's code text, hyphens removed.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct CanonicalCode(pub String);

impl CanonicalCode {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Hex SHA-256 digest identifying one delivered code.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(pub String);

impl Fingerprint {
    /// Short prefix for log lines.
    pub fn short(&self) -> &str {
        let end = self.0.len().min(12);
        &self.0[..end]
    }
}
