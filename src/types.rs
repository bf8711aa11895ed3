//! Identifier types shared across the simulation and the wire protocol
//!
//! ## Table of Contents
//! - **PlayerId**: Client-supplied player identity
//! - **StoneId / TowerId / CloudId**: Monotonic numeric entity ids
//! - **ConnectionId**: Per-socket identity, assigned before join

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Identity of a player session.
///
/// Supplied by the client on `player_join` and never reused across
/// reconnects; the server treats it as an opaque string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PlayerId(String);

impl PlayerId {
    /// Wrap a client-supplied identity
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the identity as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for PlayerId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Unique identifier for a stone
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StoneId(u64);

impl StoneId {
    /// Create a StoneId from its numeric value
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Get the inner value
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for StoneId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "stone-{}", self.0)
    }
}

/// Unique identifier for a tower
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TowerId(u64);

impl TowerId {
    /// Create a TowerId from its numeric value
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Get the inner value
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for TowerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tower-{}", self.0)
    }
}

/// Unique identifier for a cloud
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CloudId(u64);

impl CloudId {
    /// Create a CloudId from its numeric value
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Get the inner value
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for CloudId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cloud-{}", self.0)
    }
}

/// Identity of one WebSocket connection.
///
/// Assigned at accept time, before any `player_join` arrives, so the
/// fan-out registry can address sockets that have not bound a player yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    /// Create a new random ConnectionId
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", &self.0.to_string()[..8])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_player_id_roundtrip() {
        let id = PlayerId::new("alice");
        assert_eq!(id.as_str(), "alice");
        assert_eq!(format!("{}", id), "alice");
    }

    #[test]
    fn test_numeric_id_display() {
        assert_eq!(StoneId::new(7).to_string(), "stone-7");
        assert_eq!(TowerId::new(2).to_string(), "tower-2");
        assert_eq!(CloudId::new(0).to_string(), "cloud-0");
    }

    #[test]
    fn test_numeric_id_serde_is_transparent() {
        let json = serde_json::to_string(&StoneId::new(42)).unwrap();
        assert_eq!(json, "42");
        let back: StoneId = serde_json::from_str("42").unwrap();
        assert_eq!(back, StoneId::new(42));
    }

    #[test]
    fn test_connection_id_display() {
        let id = ConnectionId::new();
        assert!(id.to_string().starts_with("conn-"));
    }
}
