//! Identifiers: account addresses, content identifiers and event kinds

use serde::{Deserialize, Serialize};
use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

/// Account address as reported by the chain client
///
/// Kept as the client renders it (checksummed or not); equality is textual.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Address(String);

impl Address {
    /// Wrap an address string
    #[inline]
    #[must_use]
    pub fn new(address: impl Into<String>) -> Self {
        Self(address.into())
    }

    /// Borrow the address text
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for Address {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Address {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Content identifier naming an off-chain metadata document
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentId(String);

impl ContentId {
    /// Wrap a content identifier string
    #[inline]
    #[must_use]
    pub fn new(cid: impl Into<String>) -> Self {
        Self(cid.into())
    }

    /// Borrow the identifier text
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for ContentId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ContentId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// The contract events the feed understands
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum EventKind {
    /// An organizer registered a profile
    OrganizerRegistered,
    /// An organizer created a ticketed event
    EventCreated,
    /// A buyer purchased tickets
    TicketPurchased,
}

impl EventKind {
    /// Every kind, in listener registration order
    pub const ALL: [EventKind; 3] = [
        EventKind::OrganizerRegistered,
        EventKind::EventCreated,
        EventKind::TicketPurchased,
    ];

    /// Contract event name
    #[inline]
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::OrganizerRegistered => "OrganizerRegistered",
            Self::EventCreated => "EventCreated",
            Self::TicketPurchased => "TicketPurchased",
        }
    }

    /// Human-readable report title
    #[inline]
    #[must_use]
    pub const fn title(self) -> &'static str {
        match self {
            Self::OrganizerRegistered => "Organizer Registered",
            Self::EventCreated => "Event Created",
            Self::TicketPurchased => "Ticket Purchased",
        }
    }
}

impl Display for EventKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventKind {
    type Err = UnknownEventKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| UnknownEventKind(s.to_string()))
    }
}

/// An event name outside [`EventKind::ALL`]
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unrecognized event kind: {0}")]
pub struct UnknownEventKind(pub String);
