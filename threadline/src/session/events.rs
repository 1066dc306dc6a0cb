//! Live-event consumption for [`ConversationSession`].
//!
//! Frames are decoded here so that a malformed frame is a droppable,
//! logged event rather than a transport failure, and routed through the
//! subscriber's pure routing before touching the store.

use threadline_proto::codec;
use threadline_proto::event::WireEvent;

use crate::backend::{EventChannel, HistoryBackend, MessageGateway};
use crate::reconciler::{self, StatusOutcome};
use crate::store::MergeOutcome;
use crate::subscriber::{self, EventRoute};

use super::{ConversationSession, TimelineEvent};

/// Result of consuming one push frame.
#[derive(Debug, PartialEq, Eq)]
pub enum PumpOutcome {
    /// The event belonged to the active conversation and was applied.
    Applied(WireEvent),
    /// The frame was consumed but not applied.
    Dropped(DropReason),
    /// No active feed, or the feed closed.
    Closed,
}

/// Why a consumed frame was not applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    /// The frame did not decode into a known event.
    Malformed,
    /// The frame came from a subscription that was torn down.
    StaleSubscription,
    /// The event belongs to a different conversation.
    OtherConversation,
}

impl<H: HistoryBackend, G: MessageGateway, E: EventChannel> ConversationSession<H, G, E> {
    /// Waits for the next push frame and applies it.
    ///
    /// Returns [`PumpOutcome::Closed`] when no subscription is active or
    /// the feed ended (e.g. the channel unsubscribed it mid-wait).
    pub async fn pump_one(&self) -> PumpOutcome {
        let (frame, feed_generation) = {
            let mut slot = self.feed.lock().await;
            let Some(active) = slot.as_mut() else {
                return PumpOutcome::Closed;
            };
            match active.feed.recv().await {
                Some(frame) => (frame, active.generation),
                None => {
                    *slot = None;
                    return PumpOutcome::Closed;
                }
            }
        };

        if !self.is_current(feed_generation) {
            tracing::debug!("dropping event from a torn-down subscription");
            return PumpOutcome::Dropped(DropReason::StaleSubscription);
        }

        match codec::decode_event(&frame) {
            Ok(event) => self.handle_event(event).await,
            Err(error) => {
                tracing::warn!(%error, "dropping malformed push frame");
                PumpOutcome::Dropped(DropReason::Malformed)
            }
        }
    }

    /// Applies one already-decoded event to the active conversation.
    ///
    /// Message events insert-or-merge through identity resolution (echoes
    /// may fall back to the bounded timestamp heuristic); status events go
    /// to the reconciler. Events for other conversations are dropped.
    pub async fn handle_event(&self, event: WireEvent) -> PumpOutcome {
        let contact = {
            self.context
                .lock()
                .await
                .as_ref()
                .map(|active| active.contact.clone())
        };
        let Some(contact) = contact else {
            tracing::debug!("dropping event: no active conversation");
            return PumpOutcome::Dropped(DropReason::StaleSubscription);
        };

        match subscriber::route_event(&event, &contact, &self.config.normalization) {
            EventRoute::Insert { entry, echo } => {
                let window = echo.then_some(self.config.echo_window_ms);
                let outcome = self.store.lock().await.insert_or_merge(entry, window);
                match outcome {
                    MergeOutcome::Inserted(key) => {
                        self.emit(TimelineEvent::EntryInserted { key });
                    }
                    MergeOutcome::Merged(key) => {
                        self.emit(TimelineEvent::EntryUpdated { key });
                    }
                    MergeOutcome::Unchanged(key) => {
                        tracing::debug!(%key, "duplicate message event ignored");
                    }
                }
                PumpOutcome::Applied(event)
            }
            EventRoute::Receipt {
                local,
                server,
                transport,
                status,
                detail,
            } => {
                let outcome = reconciler::apply_status(
                    &mut *self.store.lock().await,
                    local.as_ref(),
                    server.as_ref(),
                    transport.as_ref(),
                    status,
                    detail.as_deref(),
                );
                match outcome {
                    StatusOutcome::Applied { key, status } => {
                        self.emit(TimelineEvent::StatusChanged { key, status });
                    }
                    StatusOutcome::Ignored { key, current } => {
                        tracing::debug!(%key, %current, incoming = %status, "stale status update ignored");
                    }
                    StatusOutcome::NoMatch => {
                        tracing::debug!(%status, "status update matched no timeline entry");
                    }
                }
                PumpOutcome::Applied(event)
            }
            EventRoute::Discard(_) => {
                tracing::debug!(phone = event.phone(), "event is not for the active conversation");
                PumpOutcome::Dropped(DropReason::OtherConversation)
            }
        }
    }
}
