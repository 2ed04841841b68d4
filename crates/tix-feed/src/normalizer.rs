//! Event normalizer
//!
//! Pure conversion from a contract log plus its resolved metadata into a
//! [`Report`]. Dispatch is on the log's event name; names outside the three
//! known kinds are rejected rather than dropped.

use crate::error::NormalizeError;
use chrono::{DateTime, Utc};
use tix_types::{DecodedEvent, Details, EventKind, MetadataDocument, RawEvent, Report, ReportBody};

/// Decode a log's arguments according to its event name
///
/// # Errors
/// - `NormalizeError::UnrecognizedEventKind` for names outside the known kinds
/// - `NormalizeError::MalformedArgs` if the arguments do not match the kind
pub fn decode(raw: &RawEvent) -> Result<DecodedEvent, NormalizeError> {
    let kind: EventKind = raw
        .kind
        .parse()
        .map_err(|_| NormalizeError::UnrecognizedEventKind(raw.kind.clone()))?;

    let malformed = |source| NormalizeError::MalformedArgs { kind, source };
    let args = raw.args.clone();

    Ok(match kind {
        EventKind::OrganizerRegistered => {
            DecodedEvent::OrganizerRegistered(serde_json::from_value(args).map_err(malformed)?)
        }
        EventKind::EventCreated => {
            DecodedEvent::EventCreated(serde_json::from_value(args).map_err(malformed)?)
        }
        EventKind::TicketPurchased => {
            DecodedEvent::TicketPurchased(serde_json::from_value(args).map_err(malformed)?)
        }
    })
}

/// Normalize a contract log into the report at `index`
///
/// `metadata` is the resolved off-chain document, or `None` when resolution
/// failed. `observed_at` stands in for the creation time when the log carries
/// no block timestamp.
///
/// # Errors
/// Same as [`decode`]
pub fn normalize(
    index: usize,
    raw: &RawEvent,
    metadata: Option<&serde_json::Value>,
    observed_at: DateTime<Utc>,
) -> Result<Report, NormalizeError> {
    let decoded = decode(raw)?;
    Ok(build_report(index, raw, decoded, metadata, observed_at))
}

/// Assemble a report from an already decoded log
pub(crate) fn build_report(
    index: usize,
    raw: &RawEvent,
    decoded: DecodedEvent,
    metadata: Option<&serde_json::Value>,
    observed_at: DateTime<Utc>,
) -> Report {
    let body = match decoded {
        DecodedEvent::OrganizerRegistered(args) => ReportBody::OrganizerRegistered {
            organizer_address: args.organizer,
            details: details_from(metadata),
        },
        DecodedEvent::EventCreated(args) => ReportBody::EventCreated {
            organizer: args.organizer,
            event_id: args.event_id,
            details: details_from(metadata),
        },
        DecodedEvent::TicketPurchased(args) => ReportBody::TicketPurchased {
            buyer: args.buyer,
            event_id: args.event_id,
            tickets_bought: args.tickets_bought,
            details: details_from(metadata),
        },
    };

    Report {
        index,
        creation_time: raw.timestamp.unwrap_or(observed_at),
        transaction_hash: raw.transaction_hash,
        body,
    }
}

/// Type a metadata document for its kind; mismatched shapes are unresolved
pub(crate) fn details_from<T: MetadataDocument>(metadata: Option<&serde_json::Value>) -> Details<T> {
    metadata
        .filter(|value| value.is_object())
        .and_then(|value| serde_json::from_value::<T>(value.clone()).ok())
        .filter(|document| !document.is_empty())
        .into()
}
