//! Push-channel event types.
//!
//! The live channel delivers JSON frames tagged with a `type`
//! discriminator. Message-arrival events (`message:received`,
//! `message:sent`) and delivery-receipt events (`message:status`) share a
//! phone field used to route them to the active conversation; identifier
//! fields are individually optional because different gateway versions
//! populate different subsets.

use serde::{Deserialize, Serialize};

use crate::contact::ContactKey;
use crate::message::{AttachmentRef, DeliveryStatus, LocalId, ServerId, Timestamp, TransportId};

/// A push-channel topic name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Topic(String);

impl Topic {
    /// Creates a topic from its string representation.
    pub fn new(topic: impl Into<String>) -> Self {
        Self(topic.into())
    }

    /// Returns the topic string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Topic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The topics carrying live traffic for one conversation.
///
/// Always derived from the canonical [`ContactKey`], so the subscribed
/// names agree with the representation events are matched against.
#[must_use]
pub fn topics_for(contact: &ContactKey) -> Vec<Topic> {
    vec![
        Topic::new(format!("conversation/{contact}/messages")),
        Topic::new(format!("conversation/{contact}/receipts")),
    ]
}

/// Payload of a message-arrival event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageEventPayload {
    /// The peer's phone in the gateway's representation.
    pub phone: String,
    /// Server-assigned identifier, when the gateway knows it.
    #[serde(default)]
    pub server_id: Option<ServerId>,
    /// Transport identifier, when the gateway knows it.
    #[serde(default)]
    pub transport_id: Option<TransportId>,
    /// Text body, if any.
    #[serde(default)]
    pub body: Option<String>,
    /// Attachment reference, if any.
    #[serde(default)]
    pub attachment: Option<AttachmentRef>,
    /// When the message was created or received.
    pub timestamp: Timestamp,
}

/// Payload of a delivery-receipt event.
///
/// Carries every identifier the gateway has for the target message; the
/// reconciler tries each of them against each entry's known id fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusEventPayload {
    /// The peer's phone in the gateway's representation.
    pub phone: String,
    /// Server-assigned identifier candidate.
    #[serde(default)]
    pub server_id: Option<ServerId>,
    /// Transport identifier candidate.
    #[serde(default)]
    pub transport_id: Option<TransportId>,
    /// Client identifier candidate, echoed back by gateways that keep it.
    #[serde(default)]
    pub local_id: Option<LocalId>,
    /// The new delivery status.
    pub status: DeliveryStatus,
    /// Failure detail, populated when `status` is `failed`.
    #[serde(default)]
    pub error: Option<String>,
}

/// A decoded push-channel event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum WireEvent {
    /// A message arrived from the peer.
    #[serde(rename = "message:received")]
    Received(MessageEventPayload),
    /// An outgoing send was observed by the gateway — possibly an echo of
    /// a send this client just issued from another code path.
    #[serde(rename = "message:sent")]
    Sent(MessageEventPayload),
    /// A delivery-status change for an already-known message.
    #[serde(rename = "message:status")]
    Status(StatusEventPayload),
}

impl WireEvent {
    /// The phone field used to route this event to a conversation.
    #[must_use]
    pub fn phone(&self) -> &str {
        match self {
            Self::Received(payload) | Self::Sent(payload) => &payload.phone,
            Self::Status(payload) => &payload.phone,
        }
    }
}
