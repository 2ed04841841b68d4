//! Ticketed-event records and purchaser tickets

use crate::ids::{Address, ContentId};
use crate::raw::{OnChainEvent, RawTicket};
use crate::report::{Details, EventMetadata};
use serde::{Deserialize, Serialize};

/// A ticketed event merged with its off-chain metadata
///
/// `price` and `remaining_tickets` are on-chain counters and follow later
/// passes; every other field keeps the value from first observation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventRecord {
    /// Sequential index assigned at first observation
    pub index: usize,
    pub organizer: Address,
    pub name: String,
    /// Ticket price in wei
    pub price: u128,
    pub remaining_tickets: u64,
    pub location: String,
    pub date: String,
    pub time: String,
    pub event_cid: ContentId,
    pub metadata: Details<EventMetadata>,
}

impl EventRecord {
    /// Build a record from its on-chain fields and resolved metadata
    #[must_use]
    pub fn from_chain(index: usize, event: OnChainEvent, metadata: Details<EventMetadata>) -> Self {
        Self {
            index,
            organizer: event.organizer,
            name: event.name,
            price: event.price,
            remaining_tickets: event.remaining_tickets,
            location: event.location,
            date: event.date,
            time: event.time,
            event_cid: event.event_cid,
            metadata,
        }
    }

    /// Take the mutable counters from a later observation
    ///
    /// Returns whether anything changed.
    pub fn refresh_counters(&mut self, latest: &EventRecord) -> bool {
        let changed =
            self.price != latest.price || self.remaining_tickets != latest.remaining_tickets;
        self.price = latest.price;
        self.remaining_tickets = latest.remaining_tickets;
        if self.metadata.is_unresolved() && !latest.metadata.is_unresolved() {
            self.metadata = latest.metadata.clone();
            return true;
        }
        changed
    }

    /// Event id as used by the contract (1-based)
    #[inline]
    #[must_use]
    pub fn event_id(&self) -> u64 {
        self.index as u64 + 1
    }
}

/// A purchaser-held ticket with its event details resolved
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ticket {
    pub event_id: u64,
    pub tickets_bought: u64,
    pub event: Details<EventMetadata>,
}

impl Ticket {
    /// Attach resolved details to a raw ticket
    #[must_use]
    pub fn from_raw(raw: &RawTicket, event: Details<EventMetadata>) -> Self {
        Self {
            event_id: raw.event_id,
            tickets_bought: raw.tickets_bought,
            event,
        }
    }

    /// Resolved event name, if any
    #[must_use]
    pub fn event_name(&self) -> Option<&str> {
        self.event.resolved().and_then(|meta| meta.event_name.as_deref())
    }
}
