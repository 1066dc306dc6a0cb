//! History paging entry points for [`ConversationSession`].
//!
//! `load_initial` replaces the whole timeline with the newest page;
//! `load_older` prepends strictly-older pages on demand. Both capture the
//! generation before suspending and discard their response if the
//! conversation changed while the fetch was in flight.

use crate::backend::{EventChannel, HistoryBackend, HistoryQuery, MessageGateway};
use crate::pager;
use crate::store::TimelineEntry;

use super::{ConversationSession, LoadOutcome, SessionError, TimelineEvent};

impl<H: HistoryBackend, G: MessageGateway, E: EventChannel> ConversationSession<H, G, E> {
    /// Fetches the newest page and replaces the timeline with it.
    ///
    /// Also the manual-refresh path: re-running it fully repairs a stale
    /// or incomplete timeline, which is why a failed fetch leaves all
    /// state untouched.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::NoConversation`] when no conversation is
    /// active, or [`SessionError::Backend`] when the fetch fails (state
    /// unchanged, safe to retry).
    pub async fn load_initial(&self) -> Result<LoadOutcome, SessionError> {
        let (contact, generation) = self.require_context().await?;
        let query = HistoryQuery {
            limit: self.config.page_size,
            before: None,
        };

        let page = self.history.fetch_history(&contact, query).await?;
        if !self.is_current(generation) {
            tracing::debug!(contact = %contact, "initial page for a stale conversation, discarding");
            return Ok(LoadOutcome::Stale);
        }

        let cursor = pager::cursor_after_initial(&page);
        let entries: Vec<TimelineEntry> = page
            .messages
            .into_iter()
            .map(TimelineEntry::from_remote)
            .collect();
        let added = entries.len();

        self.store.lock().await.replace_all(entries);
        {
            let mut pager_state = self.pager.lock().await;
            pager_state.cursor = cursor;
            pager_state.fetch_in_flight = false;
        }

        tracing::debug!(contact = %contact, added, has_more = cursor.has_more, "initial history loaded");
        self.emit(TimelineEvent::HistoryLoaded {
            added,
            has_more: cursor.has_more,
        });
        Ok(LoadOutcome::Loaded {
            added,
            has_more: cursor.has_more,
        })
    }

    /// Fetches the next older page and prepends it.
    ///
    /// Re-entrant calls are no-ops while a previous `load_older` is still
    /// in flight — concurrent fetches would race on the cursor and could
    /// duplicate or skip a page. An empty response forces `has_more` to
    /// `false` even if the server previously claimed more.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::NoConversation`] when no conversation is
    /// active, or [`SessionError::Backend`] when the fetch fails (cursor
    /// and `has_more` unchanged, safe to retry).
    pub async fn load_older(&self) -> Result<LoadOutcome, SessionError> {
        let (contact, generation) = self.require_context().await?;

        let before = {
            let mut pager_state = self.pager.lock().await;
            if pager_state.fetch_in_flight {
                tracing::debug!(contact = %contact, "load_older already in flight, ignoring");
                return Ok(LoadOutcome::AlreadyInFlight);
            }
            let Some(oldest) = pager_state.cursor.oldest_seen else {
                tracing::debug!(contact = %contact, "load_older before initial load, ignoring");
                return Ok(LoadOutcome::NotLoaded);
            };
            if !pager_state.cursor.has_more {
                return Ok(LoadOutcome::EndOfHistory);
            }
            pager_state.fetch_in_flight = true;
            oldest
        };

        let query = HistoryQuery {
            limit: self.config.page_size,
            before: Some(before),
        };
        let result = self.history.fetch_history(&contact, query).await;

        if !self.is_current(generation) {
            // The switch already reset the pager; leave the new state be.
            tracing::debug!(contact = %contact, "older page for a stale conversation, discarding");
            return Ok(LoadOutcome::Stale);
        }

        let page = match result {
            Ok(page) => page,
            Err(error) => {
                self.pager.lock().await.fetch_in_flight = false;
                return Err(error.into());
            }
        };

        let entries: Vec<TimelineEntry> = page
            .messages
            .iter()
            .cloned()
            .map(TimelineEntry::from_remote)
            .collect();
        let added = self.store.lock().await.prepend_older(entries);

        let cursor = {
            let mut pager_state = self.pager.lock().await;
            pager_state.cursor = pager::cursor_after_older(pager_state.cursor, &page);
            pager_state.fetch_in_flight = false;
            pager_state.cursor
        };

        tracing::debug!(contact = %contact, added, has_more = cursor.has_more, "older history loaded");
        self.emit(TimelineEvent::HistoryLoaded {
            added,
            has_more: cursor.has_more,
        });
        Ok(LoadOutcome::Loaded {
            added,
            has_more: cursor.has_more,
        })
    }
}
