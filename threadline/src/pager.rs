//! Cursor bookkeeping for backward history pagination.
//!
//! The pager walks the archive from "now" toward older messages. The
//! cursor tracks the oldest timestamp seen so far and whether the server
//! claims more pages; applying a page is pure so the update rules are
//! testable without a backend.

use threadline_proto::message::Timestamp;

use crate::backend::HistoryPage;

/// Pagination boundary for "load older" requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PageCursor {
    /// Oldest timestamp currently loaded; `None` before the initial page.
    pub oldest_seen: Option<Timestamp>,
    /// Whether the server claims older messages exist.
    pub has_more: bool,
}

/// Pager state owned by the session; reset on conversation switch.
#[derive(Debug, Default)]
pub(crate) struct PagerState {
    pub cursor: PageCursor,
    /// Guards against re-entrant "load older" calls racing on the cursor.
    pub fetch_in_flight: bool,
}

/// Cursor after the initial (newest) page replaced the store.
#[must_use]
pub fn cursor_after_initial(page: &HistoryPage) -> PageCursor {
    PageCursor {
        oldest_seen: oldest_of(page),
        has_more: page.has_more,
    }
}

/// Cursor after an older page was prepended.
///
/// An empty page forces `has_more = false` regardless of what the server
/// claimed before — inconsistent archive state must not produce an
/// infinite "load more" loop.
#[must_use]
pub fn cursor_after_older(previous: PageCursor, page: &HistoryPage) -> PageCursor {
    if page.messages.is_empty() {
        return PageCursor {
            oldest_seen: previous.oldest_seen,
            has_more: false,
        };
    }
    PageCursor {
        oldest_seen: oldest_of(page).or(previous.oldest_seen),
        has_more: page.has_more,
    }
}

fn oldest_of(page: &HistoryPage) -> Option<Timestamp> {
    page.oldest_timestamp
        .or_else(|| page.messages.iter().map(|m| m.timestamp).min())
}
