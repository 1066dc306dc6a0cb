//! Backend seams consumed by the engine.
//!
//! Defines the three collaborator traits the session is generic over:
//! - [`HistoryBackend`]: paginated reads over the message archive
//! - [`MessageGateway`]: the send write path
//! - [`EventChannel`]: topic subscription on the push channel
//!
//! Concrete implementations live with the host application; the
//! [`memory::InMemoryBackend`] here is the in-process implementation used
//! for testing.

pub mod memory;

use tokio::sync::mpsc;

use threadline_proto::contact::ContactKey;
use threadline_proto::event::Topic;
use threadline_proto::message::{
    AttachmentRef, DeliveryStatus, LocalId, RemoteMessage, ServerId, Timestamp,
};

/// Errors surfaced by backend collaborators.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    /// The backend could not be reached or is temporarily down.
    #[error("backend unavailable: {0}")]
    Unavailable(String),

    /// The backend understood the request and refused it.
    #[error("request rejected: {0}")]
    Rejected(String),

    /// The operation timed out before completing.
    #[error("request timed out")]
    Timeout,

    /// The push channel is gone.
    #[error("event channel closed")]
    ChannelClosed,
}

/// Parameters of one history fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HistoryQuery {
    /// Maximum number of messages to return.
    pub limit: usize,
    /// Return only messages strictly older than this timestamp; `None`
    /// fetches the newest page.
    pub before: Option<Timestamp>,
}

/// One page of historical messages.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct HistoryPage {
    /// Messages in the page, ordered oldest → newest.
    pub messages: Vec<RemoteMessage>,
    /// Whether older messages exist beyond this page.
    pub has_more: bool,
    /// Oldest timestamp in the page, when the backend reports it.
    pub oldest_timestamp: Option<Timestamp>,
}

/// Successful result of a send request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendReceipt {
    /// The authoritative identifier the server assigned.
    pub server_id: ServerId,
    /// Status the server reports for the accepted message.
    pub status: DeliveryStatus,
}

/// An outgoing message as handed to the gateway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingMessage {
    /// Client identifier, so the gateway can echo it back where supported.
    pub local_id: LocalId,
    /// Text body, if any.
    pub body: Option<String>,
    /// Attachment reference, if any.
    pub attachment: Option<AttachmentRef>,
}

/// Paginated reads over the historical message store.
pub trait HistoryBackend: Send + Sync {
    /// Fetches up to `query.limit` messages for `contact`, newest first
    /// within the window, returned oldest → newest.
    fn fetch_history(
        &self,
        contact: &ContactKey,
        query: HistoryQuery,
    ) -> impl std::future::Future<Output = Result<HistoryPage, BackendError>> + Send;
}

/// The send write path.
pub trait MessageGateway: Send + Sync {
    /// Submits a message for delivery and returns the server's receipt.
    ///
    /// Returning `Ok` means the server accepted the message, not that it
    /// was delivered; delivery progress arrives as push receipts.
    fn send_message(
        &self,
        contact: &ContactKey,
        message: &OutgoingMessage,
    ) -> impl std::future::Future<Output = Result<SendReceipt, BackendError>> + Send;
}

/// Raw frames for one active subscription.
///
/// Frames are delivered undecoded; the engine decodes them so a malformed
/// frame is a droppable event rather than a channel failure. The feed ends
/// (`recv` returns `None`) when the subscription is torn down.
#[derive(Debug)]
pub struct EventFeed {
    rx: mpsc::Receiver<Vec<u8>>,
}

impl EventFeed {
    /// Wraps a frame receiver; the sending side is owned by the channel
    /// implementation.
    #[must_use]
    pub const fn new(rx: mpsc::Receiver<Vec<u8>>) -> Self {
        Self { rx }
    }

    /// Waits for the next frame; `None` when the subscription is gone.
    pub async fn recv(&mut self) -> Option<Vec<u8>> {
        self.rx.recv().await
    }
}

/// Topic subscription on the push channel.
///
/// The engine owns exactly one subscription at a time, scoped to the
/// active conversation; connection management and redelivery behavior are
/// the implementation's concern.
pub trait EventChannel: Send + Sync {
    /// Declares interest in the given topics and returns their feed.
    fn subscribe(
        &self,
        topics: &[Topic],
    ) -> impl std::future::Future<Output = Result<EventFeed, BackendError>> + Send;

    /// Withdraws interest in the given topics, closing their feed.
    fn unsubscribe(
        &self,
        topics: &[Topic],
    ) -> impl std::future::Future<Output = Result<(), BackendError>> + Send;
}
