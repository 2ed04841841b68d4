//! Normalized reports and their off-chain details

use crate::hash::TxHash;
use crate::ids::{Address, EventKind};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Resolved off-chain metadata, or the unresolved sentinel
///
/// A record whose content identifier could not be fetched (or whose document
/// did not match the expected shape) still enters the feed as `Unresolved`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "metadata", rename_all = "lowercase")]
pub enum Details<T> {
    Resolved(T),
    Unresolved,
}

impl<T> Details<T> {
    /// Sentinel for details that could not be resolved
    pub const UNRESOLVED: Self = Details::Unresolved;

    /// Whether this is the unresolved sentinel
    #[inline]
    #[must_use]
    pub fn is_unresolved(&self) -> bool {
        matches!(self, Self::Unresolved)
    }

    /// Borrow resolved metadata
    #[inline]
    #[must_use]
    pub fn resolved(&self) -> Option<&T> {
        match self {
            Self::Resolved(value) => Some(value),
            Self::Unresolved => None,
        }
    }
}

impl<T> From<Option<T>> for Details<T> {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Unresolved, Self::Resolved)
    }
}

/// An off-chain metadata document
///
/// Documents are decoded leniently, so a document of another shape decodes
/// to one with every field empty. Such a document carries nothing for this
/// kind and counts as unresolved.
pub trait MetadataDocument: serde::de::DeserializeOwned {
    /// Whether no recognized field is set
    fn is_empty(&self) -> bool;
}

/// Organizer profile document
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OrganizerProfile {
    pub name: Option<String>,
    pub organization_name: Option<String>,
    pub organization_type: Option<String>,
    pub organization_location: Option<String>,
    pub organization_email: Option<String>,
}

/// Ticketed-event document
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EventMetadata {
    pub event_name: Option<String>,
    pub description: Option<String>,
    pub date: Option<String>,
    pub time: Option<String>,
    pub location: Option<String>,
}

impl MetadataDocument for OrganizerProfile {
    fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}

impl MetadataDocument for EventMetadata {
    fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}

impl EventMetadata {
    /// Metadata carrying only an event name
    #[must_use]
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            event_name: Some(name.into()),
            ..Self::default()
        }
    }
}

/// Kind-specific part of a report, tagged by `eventType`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "eventType", rename_all_fields = "camelCase")]
pub enum ReportBody {
    OrganizerRegistered {
        organizer_address: Address,
        details: Details<OrganizerProfile>,
    },
    EventCreated {
        organizer: Address,
        event_id: u64,
        details: Details<EventMetadata>,
    },
    TicketPurchased {
        buyer: Address,
        event_id: u64,
        tickets_bought: u64,
        details: Details<EventMetadata>,
    },
}

/// A normalized, append-only feed entry derived from one contract log
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Report {
    /// Position in the report sequence; also the audit-log key
    pub index: usize,
    pub creation_time: DateTime<Utc>,
    pub transaction_hash: TxHash,
    #[serde(flatten)]
    pub body: ReportBody,
}

impl Report {
    /// Event kind this report was derived from
    #[must_use]
    pub fn kind(&self) -> EventKind {
        match self.body {
            ReportBody::OrganizerRegistered { .. } => EventKind::OrganizerRegistered,
            ReportBody::EventCreated { .. } => EventKind::EventCreated,
            ReportBody::TicketPurchased { .. } => EventKind::TicketPurchased,
        }
    }

    /// Display name of the report
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.kind().title()
    }

    /// Ticketed-event id, for kinds that carry one
    #[must_use]
    pub fn event_id(&self) -> Option<u64> {
        match self.body {
            ReportBody::OrganizerRegistered { .. } => None,
            ReportBody::EventCreated { event_id, .. }
            | ReportBody::TicketPurchased { event_id, .. } => Some(event_id),
        }
    }

    /// Whether the off-chain details are the unresolved sentinel
    #[must_use]
    pub fn is_unresolved(&self) -> bool {
        match &self.body {
            ReportBody::OrganizerRegistered { details, .. } => details.is_unresolved(),
            ReportBody::EventCreated { details, .. }
            | ReportBody::TicketPurchased { details, .. } => details.is_unresolved(),
        }
    }
}
