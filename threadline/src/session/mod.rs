//! The conversation session facade.
//!
//! [`ConversationSession`] owns the timeline for the single active
//! conversation and is the only writer to it. Four producers funnel
//! through here (initial history load, older-page loads, live push
//! events, and optimistic sends), interleaved on one cooperative
//! scheduler, so correctness relies on the store's identity resolution
//! and the generation counter rather than on arrival order.
//!
//! Switching conversations bumps the generation counter; any in-flight
//! fetch, send completion, or push event compares its captured generation
//! at completion time and discards itself when stale. No true network
//! cancellation is attempted.

mod events;
mod paging;
mod send;

pub use events::{DropReason, PumpOutcome};

use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::{Mutex, mpsc};

use threadline_proto::contact::ContactKey;
use threadline_proto::event::{Topic, topics_for};
use threadline_proto::message::{DeliveryStatus, LocalId, ValidationError};

use crate::backend::{BackendError, EventChannel, EventFeed, HistoryBackend, MessageGateway};
use crate::config::TimelineConfig;
use crate::identity::MessageKey;
use crate::pager::{PageCursor, PagerState};
use crate::store::{TimelineEntry, TimelineStore};

/// Errors surfaced by session entry points.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// No conversation is active.
    #[error("no active conversation")]
    NoConversation,

    /// The contact string contained no digits.
    #[error("contact has no digits: {0:?}")]
    InvalidContact(String),

    /// The draft failed validation.
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),

    /// A backend call failed; session state is unchanged and the call may
    /// be retried.
    #[error("backend error: {0}")]
    Backend(#[from] BackendError),

    /// No entry carries the given local id.
    #[error("no message with local id {0}")]
    UnknownMessage(LocalId),

    /// The entry exists but is not in a failed state.
    #[error("message {0} is not in a failed state")]
    NotRetryable(LocalId),
}

/// Notifications emitted toward the UI layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TimelineEvent {
    /// A new entry appeared in the timeline.
    EntryInserted {
        /// Key of the new entry.
        key: MessageKey,
    },
    /// An existing entry gained identifiers, content, or status.
    EntryUpdated {
        /// Key of the updated entry.
        key: MessageKey,
    },
    /// An entry's delivery status changed.
    StatusChanged {
        /// Key of the entry.
        key: MessageKey,
        /// The new status.
        status: DeliveryStatus,
    },
    /// A history page was applied.
    HistoryLoaded {
        /// Entries actually added.
        added: usize,
        /// Whether older pages remain.
        has_more: bool,
    },
    /// The active conversation changed and the timeline was reset.
    ConversationReset {
        /// The new active contact.
        contact: ContactKey,
    },
}

/// Result of one paging entry point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    /// A page was fetched and applied.
    Loaded {
        /// Entries actually added to the store.
        added: usize,
        /// Whether older pages remain.
        has_more: bool,
    },
    /// A previous `load_older` is still in flight; nothing was done.
    AlreadyInFlight,
    /// The archive is exhausted; nothing was done.
    EndOfHistory,
    /// `load_older` was called before any initial page; nothing was done.
    NotLoaded,
    /// The response arrived after a conversation switch and was discarded.
    Stale,
}

/// Result of a send entry point.
///
/// A gateway failure is not a session error: it is terminal for that
/// message only, reported here as `Failed` with the entry kept visible.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendOutcome {
    /// The provisional entry's local id.
    pub local_id: LocalId,
    /// Status recorded on the entry after reconciliation.
    pub status: DeliveryStatus,
}

struct ActiveContext {
    contact: ContactKey,
    topics: Vec<Topic>,
}

struct FeedSlot {
    feed: EventFeed,
    generation: u64,
}

/// Timeline engine for the single active conversation.
pub struct ConversationSession<H: HistoryBackend, G: MessageGateway, E: EventChannel> {
    history: H,
    gateway: G,
    channel: E,
    config: TimelineConfig,
    store: Mutex<TimelineStore>,
    pager: Mutex<PagerState>,
    context: Mutex<Option<ActiveContext>>,
    feed: Mutex<Option<FeedSlot>>,
    generation: AtomicU64,
    event_tx: mpsc::Sender<TimelineEvent>,
}

impl<H: HistoryBackend, G: MessageGateway, E: EventChannel> ConversationSession<H, G, E> {
    /// Creates a session with no active conversation.
    ///
    /// Returns the session and a receiver for [`TimelineEvent`]s that the
    /// UI layer should consume.
    pub fn new(
        history: H,
        gateway: G,
        channel: E,
        config: TimelineConfig,
    ) -> (Self, mpsc::Receiver<TimelineEvent>) {
        let (event_tx, event_rx) = mpsc::channel(config.event_buffer);
        let session = Self {
            history,
            gateway,
            channel,
            config,
            store: Mutex::new(TimelineStore::new()),
            pager: Mutex::new(PagerState::default()),
            context: Mutex::new(None),
            feed: Mutex::new(None),
            generation: AtomicU64::new(0),
            event_tx,
        };
        (session, event_rx)
    }

    /// Switches the active conversation, atomically resetting state.
    ///
    /// The previous subscription is torn down, the store and pager are
    /// cleared, and a fresh subscription is established for the new
    /// contact. Results of the old conversation's in-flight work are
    /// discarded when they complete.
    ///
    /// The switch takes effect even when the new subscription fails: the
    /// history entry points stay usable and calling `switch_conversation`
    /// again re-subscribes.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::InvalidContact`] if `raw_contact` contains
    /// no digits, or [`SessionError::Backend`] if subscribing fails.
    pub async fn switch_conversation(&self, raw_contact: &str) -> Result<ContactKey, SessionError> {
        let contact = self.config.normalization.canonicalize(raw_contact);
        if contact.is_empty() {
            return Err(SessionError::InvalidContact(raw_contact.to_owned()));
        }

        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        tracing::info!(contact = %contact, generation, "switching conversation");

        // Unsubscribe before touching the feed slot: a pending pump_one
        // holds the slot until its feed closes.
        let previous = self.context.lock().await.take();
        if let Some(previous) = previous {
            if let Err(error) = self.channel.unsubscribe(&previous.topics).await {
                tracing::warn!(
                    contact = %previous.contact,
                    error = %error,
                    "unsubscribe failed during conversation switch"
                );
            }
        }
        *self.feed.lock().await = None;

        self.store.lock().await.clear();
        *self.pager.lock().await = PagerState::default();

        let topics = topics_for(&contact);
        *self.context.lock().await = Some(ActiveContext {
            contact: contact.clone(),
            topics: topics.clone(),
        });
        self.emit(TimelineEvent::ConversationReset {
            contact: contact.clone(),
        });

        let feed = self.channel.subscribe(&topics).await?;
        *self.feed.lock().await = Some(FeedSlot { feed, generation });

        Ok(contact)
    }

    /// The timeline as a read-only ordered snapshot, oldest first.
    pub async fn snapshot(&self) -> Vec<TimelineEntry> {
        self.store.lock().await.entries().to_vec()
    }

    /// Current pagination boundary.
    pub async fn page_state(&self) -> PageCursor {
        self.pager.lock().await.cursor
    }

    /// The active contact, if a conversation is open.
    pub async fn active_contact(&self) -> Option<ContactKey> {
        self.context
            .lock()
            .await
            .as_ref()
            .map(|active| active.contact.clone())
    }

    /// Clones the active contact and captures the current generation.
    pub(crate) async fn require_context(&self) -> Result<(ContactKey, u64), SessionError> {
        let context = self.context.lock().await;
        context.as_ref().map_or(Err(SessionError::NoConversation), |active| {
            Ok((
                active.contact.clone(),
                self.generation.load(Ordering::SeqCst),
            ))
        })
    }

    /// Whether a captured generation still belongs to the active
    /// conversation.
    pub(crate) fn is_current(&self, generation: u64) -> bool {
        self.generation.load(Ordering::SeqCst) == generation
    }

    /// Best-effort notification; a full channel drops the event.
    pub(crate) fn emit(&self, event: TimelineEvent) {
        let _ = self.event_tx.try_send(event);
    }
}
