//! Core message types for the Threadline engine.
//!
//! A message in a conversation timeline may be known by up to three
//! identifiers depending on where it came from: a client-generated
//! [`LocalId`] (assigned before the server has seen the message), a
//! [`ServerId`] (authoritative, assigned on acceptance), and a
//! [`TransportId`] (attached by the push channel). The identifier newtypes
//! here keep those three namespaces from being compared by accident.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Maximum allowed message body size in bytes (64 KB).
pub const MAX_BODY_SIZE: usize = 64 * 1024;

/// Client-generated provisional message identifier, based on UUID v7 for
/// time-ordering.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LocalId(Uuid);

impl LocalId {
    /// Creates a new time-ordered local identifier (UUID v7).
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Creates a `LocalId` from an existing UUID.
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the inner UUID value.
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for LocalId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for LocalId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Server-assigned authoritative message identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ServerId(String);

impl ServerId {
    /// Creates a server identifier from its string representation.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the string representation of this identifier.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ServerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier attached to a message by the push-channel broker.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TransportId(String);

impl TransportId {
    /// Creates a transport identifier from its string representation.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the string representation of this identifier.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for TransportId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Millisecond-precision UTC timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp(u64);

impl Timestamp {
    /// Creates a timestamp for the current instant.
    #[must_use]
    pub fn now() -> Self {
        let millis = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis();
        Self(u64::try_from(millis).unwrap_or(u64::MAX))
    }

    /// Creates a timestamp from milliseconds since the UNIX epoch.
    #[must_use]
    pub const fn from_millis(millis: u64) -> Self {
        Self(millis)
    }

    /// Returns the timestamp as milliseconds since the UNIX epoch.
    #[must_use]
    pub const fn as_millis(&self) -> u64 {
        self.0
    }

    /// Absolute difference between two timestamps in milliseconds.
    #[must_use]
    pub const fn abs_diff(&self, other: Self) -> u64 {
        self.0.abs_diff(other.0)
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}ms", self.0)
    }
}

/// Whether a message was received from the peer or sent by the local user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Received from the conversation peer.
    Incoming,
    /// Sent by the local user.
    Outgoing,
}

/// Delivery lifecycle of an outgoing message.
///
/// Status moves forward only: `Sending → Sent → Delivered → Read`, or
/// terminates at `Failed`. Incoming messages materialize as `Delivered`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryStatus {
    /// Created locally, send request not yet confirmed.
    Sending,
    /// Accepted by the server.
    Sent,
    /// Delivered to the peer's device.
    Delivered,
    /// Read by the peer.
    Read,
    /// The send failed; terminal.
    Failed,
}

impl DeliveryStatus {
    const fn rank(self) -> u8 {
        match self {
            Self::Sending => 0,
            Self::Sent => 1,
            Self::Delivered => 2,
            Self::Read => 3,
            Self::Failed => 4,
        }
    }

    /// Whether transitioning from `self` to `next` is a legal forward move.
    ///
    /// `Failed` accepts no further transitions and is reachable only from
    /// `Sending` or `Sent`. Repeating the current status is not an advance,
    /// so applying the same status twice is a no-op for callers that gate
    /// on this predicate.
    #[must_use]
    pub const fn can_advance_to(self, next: Self) -> bool {
        match (self, next) {
            (Self::Failed, _) => false,
            (Self::Sending | Self::Sent, Self::Failed) => true,
            (_, Self::Failed) => false,
            _ => next.rank() > self.rank(),
        }
    }

    /// Whether this status admits no further transitions.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Read | Self::Failed)
    }
}

impl std::fmt::Display for DeliveryStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Sending => "sending",
            Self::Sent => "sent",
            Self::Delivered => "delivered",
            Self::Read => "read",
            Self::Failed => "failed",
        };
        write!(f, "{name}")
    }
}

/// Reference to a stored media attachment (image identifier or similar).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AttachmentRef(String);

impl AttachmentRef {
    /// Creates an attachment reference from a media identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the media identifier.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for AttachmentRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A message as returned by the historical store.
///
/// Identifier fields are individually optional — old records may predate
/// the transport id, and some gateways only return one of the two.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteMessage {
    /// Server-assigned identifier, when known.
    #[serde(default)]
    pub server_id: Option<ServerId>,
    /// Transport identifier, when known.
    #[serde(default)]
    pub transport_id: Option<TransportId>,
    /// The peer's phone in whatever representation the store kept.
    pub phone: String,
    /// Message direction relative to the local user.
    pub direction: Direction,
    /// Text body, if any.
    #[serde(default)]
    pub body: Option<String>,
    /// Attachment reference, if any.
    #[serde(default)]
    pub attachment: Option<AttachmentRef>,
    /// When the message was created or received.
    pub timestamp: Timestamp,
    /// Recorded delivery status; absent for stores that do not track it.
    #[serde(default)]
    pub status: Option<DeliveryStatus>,
}

/// Error returned when a draft fails validation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    /// The draft carries neither text nor an attachment.
    #[error("draft has no body and no attachment")]
    Empty,
    /// The body exceeds the maximum allowed size.
    #[error("body too large ({size} bytes, max {max} bytes)")]
    TooLarge {
        /// Actual size of the body in bytes.
        size: usize,
        /// Maximum allowed size in bytes.
        max: usize,
    },
}

/// User-composed message content awaiting submission.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Draft {
    /// Text body, if any.
    pub body: Option<String>,
    /// Attachment reference, if any.
    pub attachment: Option<AttachmentRef>,
}

impl Draft {
    /// Creates a text-only draft.
    pub fn text(body: impl Into<String>) -> Self {
        Self {
            body: Some(body.into()),
            attachment: None,
        }
    }

    /// Validates this draft for sending.
    ///
    /// A draft must carry text or an attachment, and the body (when
    /// present) must not exceed [`MAX_BODY_SIZE`].
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::Empty`] if both parts are missing (or the
    /// body is an empty string with no attachment), or
    /// [`ValidationError::TooLarge`] if the body exceeds the limit.
    pub fn validate(&self) -> Result<(), ValidationError> {
        let body_len = self.body.as_deref().map_or(0, str::len);
        if body_len == 0 && self.attachment.is_none() {
            return Err(ValidationError::Empty);
        }
        if body_len > MAX_BODY_SIZE {
            return Err(ValidationError::TooLarge {
                size: body_len,
                max: MAX_BODY_SIZE,
            });
        }
        Ok(())
    }
}
