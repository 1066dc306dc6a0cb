//! Routing of decoded push events toward the store and reconciler.
//!
//! Events are matched to the active conversation by phone before anything
//! touches the store; the comparison uses the same normalization rules
//! that produced the subscription topics. Routing is pure — the session
//! applies the resulting [`EventRoute`].

use threadline_proto::contact::{ContactKey, NormalizationRules};
use threadline_proto::event::{MessageEventPayload, WireEvent};
use threadline_proto::message::{DeliveryStatus, Direction, LocalId, ServerId, TransportId};

use crate::identity::MessageKeys;
use crate::store::TimelineEntry;

/// Where a decoded event should be applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventRoute {
    /// Insert-or-merge a message into the timeline.
    Insert {
        /// The candidate entry.
        entry: TimelineEntry,
        /// Whether the echo heuristic may be used when no identifier
        /// matches (`message:sent` events only).
        echo: bool,
    },
    /// Apply a delivery-status change.
    Receipt {
        /// Client identifier candidate.
        local: Option<LocalId>,
        /// Server identifier candidate.
        server: Option<ServerId>,
        /// Transport identifier candidate.
        transport: Option<TransportId>,
        /// The new status.
        status: DeliveryStatus,
        /// Failure detail, when the status is `failed`.
        detail: Option<String>,
    },
    /// The event does not belong to the active conversation.
    Discard(DiscardReason),
}

/// Why an event was not routed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscardReason {
    /// The event's phone does not match the active contact.
    OtherConversation,
}

/// Decides how a decoded event applies to the active conversation.
pub fn route_event(
    event: &WireEvent,
    active: &ContactKey,
    rules: &NormalizationRules,
) -> EventRoute {
    if !rules.same_contact(event.phone(), active) {
        return EventRoute::Discard(DiscardReason::OtherConversation);
    }

    match event {
        WireEvent::Received(payload) => EventRoute::Insert {
            entry: entry_from_payload(payload, Direction::Incoming, DeliveryStatus::Delivered),
            echo: false,
        },
        WireEvent::Sent(payload) => EventRoute::Insert {
            entry: entry_from_payload(payload, Direction::Outgoing, DeliveryStatus::Sent),
            echo: true,
        },
        WireEvent::Status(payload) => EventRoute::Receipt {
            local: payload.local_id.clone(),
            server: payload.server_id.clone(),
            transport: payload.transport_id.clone(),
            status: payload.status,
            detail: payload.error.clone(),
        },
    }
}

fn entry_from_payload(
    payload: &MessageEventPayload,
    direction: Direction,
    status: DeliveryStatus,
) -> TimelineEntry {
    TimelineEntry {
        keys: MessageKeys::from_remote(payload.server_id.clone(), payload.transport_id.clone()),
        direction,
        body: payload.body.clone(),
        attachment: payload.attachment.clone(),
        timestamp: payload.timestamp,
        status,
        error_detail: None,
    }
}
