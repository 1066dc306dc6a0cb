//! Optimistic send entry points for [`ConversationSession`].
//!
//! A send inserts a provisional entry immediately, so the UI never waits
//! on the gateway. The provisional entry is reconciled in place with the
//! server receipt (or marked failed) when the request completes; it is
//! never removed and re-inserted, which would lose its position and
//! duplicate it if a push echo raced ahead of the receipt.

use threadline_proto::message::{DeliveryStatus, Draft, LocalId, Timestamp};

use crate::backend::{EventChannel, HistoryBackend, MessageGateway, OutgoingMessage};
use crate::identity::MessageKey;
use crate::store::TimelineEntry;

use super::{ConversationSession, SendOutcome, SessionError, TimelineEvent};

impl<H: HistoryBackend, G: MessageGateway, E: EventChannel> ConversationSession<H, G, E> {
    /// Sends a draft to the active contact.
    ///
    /// The provisional entry appears at the end of the timeline before the
    /// gateway is called. On success the server id is recorded as an
    /// additional identifier of the same entry and the status advances to
    /// the receipt's. On gateway failure the entry is marked `Failed` with
    /// the error detail and keeps its local identity permanently; no
    /// automatic retry is attempted, and the failure is reported in the
    /// returned [`SendOutcome`], not as an `Err`.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Validation`] for an unsendable draft or
    /// [`SessionError::NoConversation`] when no conversation is active.
    pub async fn send(&self, draft: Draft) -> Result<SendOutcome, SessionError> {
        draft.validate()?;
        let (contact, generation) = self.require_context().await?;

        let local = LocalId::new();
        let entry = TimelineEntry::provisional(local.clone(), &draft, Timestamp::now());
        self.store.lock().await.push_provisional(entry);
        self.emit(TimelineEvent::EntryInserted {
            key: MessageKey::Local(local.clone()),
        });

        let outgoing = OutgoingMessage {
            local_id: local.clone(),
            body: draft.body,
            attachment: draft.attachment,
        };

        match self.gateway.send_message(&contact, &outgoing).await {
            Ok(receipt) => {
                if !self.is_current(generation) {
                    tracing::debug!(local_id = %local, "send receipt for a stale conversation, discarding");
                    return Ok(SendOutcome {
                        local_id: local,
                        status: receipt.status,
                    });
                }

                let status = {
                    let mut store = self.store.lock().await;
                    store.confirm_send(&local, receipt.server_id.clone(), receipt.status);
                    store
                        .find_by_local(&local)
                        .map_or(receipt.status, |entry| entry.status)
                };

                tracing::debug!(local_id = %local, server_id = %receipt.server_id, %status, "send confirmed");
                self.emit(TimelineEvent::StatusChanged {
                    key: MessageKey::Server(receipt.server_id),
                    status,
                });
                Ok(SendOutcome {
                    local_id: local,
                    status,
                })
            }
            Err(error) => {
                tracing::warn!(contact = %contact, local_id = %local, %error, "send failed");
                let status = if self.is_current(generation) {
                    let mut store = self.store.lock().await;
                    let marked = store.fail_send(&local, error.to_string());
                    let status = store
                        .find_by_local(&local)
                        .map_or(DeliveryStatus::Failed, |entry| entry.status);
                    drop(store);
                    if marked {
                        self.emit(TimelineEvent::StatusChanged {
                            key: MessageKey::Local(local.clone()),
                            status: DeliveryStatus::Failed,
                        });
                    }
                    status
                } else {
                    DeliveryStatus::Failed
                };
                Ok(SendOutcome {
                    local_id: local,
                    status,
                })
            }
        }
    }

    /// Re-sends a failed entry's content as a fresh message.
    ///
    /// The failed entry stays in place; only its content travels again,
    /// under a new local id. This is the manual counterpart to the
    /// deliberate absence of automatic send retries.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::UnknownMessage`] when no entry carries
    /// `local_id`, or [`SessionError::NotRetryable`] when the entry is not
    /// `Failed`.
    pub async fn resend(&self, local_id: &LocalId) -> Result<SendOutcome, SessionError> {
        let draft = {
            let store = self.store.lock().await;
            let Some(entry) = store.find_by_local(local_id) else {
                return Err(SessionError::UnknownMessage(local_id.clone()));
            };
            if entry.status != DeliveryStatus::Failed {
                return Err(SessionError::NotRetryable(local_id.clone()));
            }
            Draft {
                body: entry.body.clone(),
                attachment: entry.attachment.clone(),
            }
        };
        self.send(draft).await
    }
}
