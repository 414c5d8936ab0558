//! Identifiers used throughout EscrowDesk.
//!
//! Deal and order IDs use UUIDv7 so they are time-derived and sort in
//! creation order. User handles are normalised chat usernames.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::EscrowError;

// ---------------------------------------------------------------------------
// DealId
// ---------------------------------------------------------------------------

/// Globally unique, time-derived deal identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct DealId(pub Uuid);

impl DealId {
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Extract the embedded creation timestamp (milliseconds since UNIX epoch).
    #[must_use]
    pub fn timestamp_ms(&self) -> u64 {
        let bytes = self.0.as_bytes();
        u64::from_be_bytes([
            0, 0, bytes[0], bytes[1], bytes[2], bytes[3], bytes[4], bytes[5],
        ])
    }
}

impl Default for DealId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for DealId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for DealId {
    type Err = EscrowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s.trim())
            .map(Self)
            .map_err(|_| EscrowError::InvalidDealId(s.to_string()))
    }
}

// ---------------------------------------------------------------------------
// OrderId
// ---------------------------------------------------------------------------

/// Unique order identifier. Uses UUIDv7 so book iteration follows insertion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct OrderId(pub Uuid);

impl OrderId {
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for OrderId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Handle
// ---------------------------------------------------------------------------

/// A chat user handle, normalised to lowercase without the leading `@`.
///
/// `Handle::new("@Alice")` and `Handle::new("alice")` compare equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Handle(String);

impl Handle {
    #[must_use]
    pub fn new(raw: impl AsRef<str>) -> Self {
        let trimmed = raw.as_ref().trim();
        Self(trimmed.trim_start_matches('@').to_lowercase())
    }

    /// The normalised name, without `@`.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "@{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// ChannelId
// ---------------------------------------------------------------------------

/// Identifier of a chat channel (group or direct conversation).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChannelId(pub i64);

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "chan:{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// TransferReference
// ---------------------------------------------------------------------------

/// Reference to a ledger transaction (e.g. an EVM transaction hash).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransferReference(pub String);

impl fmt::Display for TransferReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deal_id_uniqueness() {
        let a = DealId::new();
        let b = DealId::new();
        assert_ne!(a, b);
    }

    #[test]
    fn deal_id_ordering() {
        let a = DealId::new();
        let b = DealId::new();
        assert!(a < b);
    }

    #[test]
    #[allow(clippy::cast_possible_truncation)]
    fn deal_id_timestamp_extraction() {
        let before = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_millis() as u64;
        let id = DealId::new();
        let after = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_millis() as u64;
        let ts = id.timestamp_ms();
        assert!(
            ts >= before && ts <= after,
            "ts={ts}, before={before}, after={after}"
        );
    }

    #[test]
    fn deal_id_parses_from_display() {
        let id = DealId::new();
        let back: DealId = id.to_string().parse().unwrap();
        assert_eq!(id, back);
        assert!(matches!(
            "1754213457".parse::<DealId>(),
            Err(EscrowError::InvalidDealId(_))
        ));
    }

    #[test]
    fn handle_normalisation() {
        assert_eq!(Handle::new("@Alice"), Handle::new("alice"));
        assert_eq!(Handle::new("  @bob "), Handle::new("BOB"));
        assert_eq!(Handle::new("@carol").to_string(), "@carol");
        assert!(Handle::new("@").is_empty());
    }

    #[test]
    fn handle_serializes_as_plain_string() {
        let json = serde_json::to_string(&Handle::new("@Dave")).unwrap();
        assert_eq!(json, "\"dave\"");
    }
}
