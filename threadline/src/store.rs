//! The ordered message collection for the active conversation.
//!
//! [`TimelineStore`] is the single source of truth the UI renders from.
//! Three producers push candidate mutations into it (the history pager,
//! the live-event path, and the optimistic send path) and every insert is
//! resolved through [`MessageKeys`] so that at most one live entry exists
//! per message identity.
//!
//! Ordering invariant: entries are kept oldest → newest by timestamp, with
//! one deliberate exception: an entry merged with later data (send
//! receipt or push echo) keeps its original position even when the
//! authoritative timestamp would reorder it, so a just-confirmed message
//! does not jump around on screen.

use threadline_proto::message::{
    AttachmentRef, DeliveryStatus, Direction, Draft, LocalId, RemoteMessage, ServerId, Timestamp,
    TransportId,
};

use crate::identity::{MessageKey, MessageKeys};

/// One message in the timeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimelineEntry {
    /// Every identifier known for this message.
    pub keys: MessageKeys,
    /// Message direction relative to the local user.
    pub direction: Direction,
    /// Text body, if any.
    pub body: Option<String>,
    /// Attachment reference, if any.
    pub attachment: Option<AttachmentRef>,
    /// Ordering timestamp.
    pub timestamp: Timestamp,
    /// Delivery status; incoming entries materialize as `Delivered`.
    pub status: DeliveryStatus,
    /// Failure detail, set only when `status` is `Failed`.
    pub error_detail: Option<String>,
}

impl TimelineEntry {
    /// A provisional outgoing entry, inserted before the server has
    /// confirmed anything.
    #[must_use]
    pub fn provisional(local: LocalId, draft: &Draft, timestamp: Timestamp) -> Self {
        Self {
            keys: MessageKeys::local_only(local),
            direction: Direction::Outgoing,
            body: draft.body.clone(),
            attachment: draft.attachment.clone(),
            timestamp,
            status: DeliveryStatus::Sending,
            error_detail: None,
        }
    }

    /// An already-final entry built from historical data.
    ///
    /// Records without a stored status default by direction: incoming
    /// messages were delivered by definition, outgoing ones were at least
    /// accepted by the server or they would not be in the archive.
    #[must_use]
    pub fn from_remote(message: RemoteMessage) -> Self {
        let status = message.status.unwrap_or(match message.direction {
            Direction::Incoming => DeliveryStatus::Delivered,
            Direction::Outgoing => DeliveryStatus::Sent,
        });
        Self {
            keys: MessageKeys::from_remote(message.server_id, message.transport_id),
            direction: message.direction,
            body: message.body,
            attachment: message.attachment,
            timestamp: message.timestamp,
            status,
            error_detail: None,
        }
    }

    /// The entry's primary key.
    #[must_use]
    pub fn key(&self) -> MessageKey {
        self.keys.primary()
    }
}

/// Result of an insert-or-merge against the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergeOutcome {
    /// The message was new; an entry was appended or spliced in by
    /// timestamp.
    Inserted(MessageKey),
    /// The message matched an existing entry and contributed something new
    /// (an identifier, a status advance, or missing content).
    Merged(MessageKey),
    /// The message matched an existing entry and carried nothing new.
    Unchanged(MessageKey),
}

impl MergeOutcome {
    /// The key of the affected entry.
    #[must_use]
    pub const fn key(&self) -> &MessageKey {
        match self {
            Self::Inserted(key) | Self::Merged(key) | Self::Unchanged(key) => key,
        }
    }
}

/// Ordered message collection for one conversation.
#[derive(Debug, Default)]
pub struct TimelineStore {
    entries: Vec<TimelineEntry>,
}

impl TimelineStore {
    /// Creates an empty store.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Current entries in display order (oldest first).
    #[must_use]
    pub fn entries(&self) -> &[TimelineEntry] {
        &self.entries
    }

    /// Number of live entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the store holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Removes every entry (conversation switch).
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Index of the entry sharing any identifier with `keys`.
    #[must_use]
    pub fn position_matching(&self, keys: &MessageKeys) -> Option<usize> {
        self.entries.iter().position(|e| e.keys.intersects(keys))
    }

    /// The entry matching any of the given candidate identifiers.
    #[must_use]
    pub fn find_by(
        &self,
        local: Option<&LocalId>,
        server: Option<&ServerId>,
        transport: Option<&TransportId>,
    ) -> Option<&TimelineEntry> {
        self.entries
            .iter()
            .find(|e| e.keys.matches_any(local, server, transport))
    }

    /// The entry carrying the given local id.
    #[must_use]
    pub fn find_by_local(&self, local: &LocalId) -> Option<&TimelineEntry> {
        self.find_by(Some(local), None, None)
    }

    /// The entry carrying the given server id.
    #[must_use]
    pub fn find_by_server(&self, server: &ServerId) -> Option<&TimelineEntry> {
        self.find_by(None, Some(server), None)
    }

    /// Mutable access for the status reconciler.
    pub(crate) fn entry_mut_by(
        &mut self,
        local: Option<&LocalId>,
        server: Option<&ServerId>,
        transport: Option<&TransportId>,
    ) -> Option<&mut TimelineEntry> {
        self.entries
            .iter_mut()
            .find(|e| e.keys.matches_any(local, server, transport))
    }

    /// Inserts a message, merging into an existing entry when any
    /// identifier matches.
    ///
    /// When `echo_window_ms` is set and no identifier matches, an outgoing
    /// message additionally tries the echo heuristic: merge into the
    /// newest provisional (`Sending`) entry whose timestamp is within the
    /// window. This is the one best-effort path in identity resolution;
    /// two rapid-fire identical sends can in theory collapse, which is
    /// accepted over showing the same message twice.
    pub fn insert_or_merge(
        &mut self,
        entry: TimelineEntry,
        echo_window_ms: Option<u64>,
    ) -> MergeOutcome {
        if let Some(index) = self.position_matching(&entry.keys) {
            return self.merge_at(index, &entry);
        }

        if entry.direction == Direction::Outgoing {
            if let Some(window) = echo_window_ms {
                if let Some(index) = self.echo_position(&entry, window) {
                    return self.merge_at(index, &entry);
                }
            }
        }

        let index = self.insert_sorted(entry);
        MergeOutcome::Inserted(self.entries[index].key())
    }

    /// Appends a provisional entry at the end of the timeline.
    ///
    /// Optimistic sends are ordered by "now" rather than by a fetched
    /// timestamp; this is the only insert path that skips timestamp
    /// ordering.
    pub fn push_provisional(&mut self, entry: TimelineEntry) -> MessageKey {
        let key = entry.key();
        self.entries.push(entry);
        key
    }

    /// Prepends an older history page, skipping messages already present.
    ///
    /// `page` must be ordered oldest → newest. Entries already in the
    /// store (typically the overlap between a stale page boundary and
    /// live traffic) are dropped rather than duplicated or moved, and
    /// existing entries never move relative to each other. The page is
    /// woven in by timestamp, which in the common case (every page entry
    /// older than everything loaded) reduces to a plain prepend but also
    /// keeps ordering when a live event already delivered something from
    /// inside the page's window. Returns the number of entries inserted.
    pub fn prepend_older(&mut self, page: Vec<TimelineEntry>) -> usize {
        let fresh: Vec<TimelineEntry> = page
            .into_iter()
            .filter(|entry| self.position_matching(&entry.keys).is_none())
            .collect();
        let added = fresh.len();
        if added == 0 {
            return 0;
        }

        let existing = std::mem::take(&mut self.entries);
        let mut merged = Vec::with_capacity(existing.len() + added);
        let mut fresh = fresh.into_iter().peekable();
        for entry in existing {
            while fresh
                .peek()
                .is_some_and(|page_entry| page_entry.timestamp < entry.timestamp)
            {
                if let Some(page_entry) = fresh.next() {
                    merged.push(page_entry);
                }
            }
            merged.push(entry);
        }
        merged.extend(fresh);
        self.entries = merged;
        added
    }

    /// Replaces the whole timeline with a freshly-fetched page.
    pub fn replace_all(&mut self, mut entries: Vec<TimelineEntry>) {
        entries.sort_by_key(|e| e.timestamp);
        self.entries = entries;
    }

    /// Records a send receipt on the provisional entry, in place.
    ///
    /// The server id becomes an additional known identifier of the same
    /// entry — the entry is never removed and re-inserted, so it keeps
    /// its position and a racing push echo still finds it. The receipt
    /// status is applied only when it is a forward move; an echo may
    /// already have advanced the entry further.
    ///
    /// Returns `false` when no entry carries `local` (stale completion).
    pub fn confirm_send(
        &mut self,
        local: &LocalId,
        server: ServerId,
        status: DeliveryStatus,
    ) -> bool {
        let Some(entry) = self.entry_mut_by(Some(local), None, None) else {
            return false;
        };
        entry.keys.attach_server(server);
        if entry.status.can_advance_to(status) {
            entry.status = status;
        }
        true
    }

    /// Marks the provisional entry failed, in place.
    ///
    /// The entry stays visible under its local id; no retry is attempted
    /// here. Returns `false` when no entry carries `local` or its status
    /// does not admit failure any more (a racing echo already confirmed
    /// delivery).
    pub fn fail_send(&mut self, local: &LocalId, detail: impl Into<String>) -> bool {
        let Some(entry) = self.entry_mut_by(Some(local), None, None) else {
            return false;
        };
        if !entry.status.can_advance_to(DeliveryStatus::Failed) {
            return false;
        }
        entry.status = DeliveryStatus::Failed;
        entry.error_detail = Some(detail.into());
        true
    }

    fn merge_at(&mut self, index: usize, incoming: &TimelineEntry) -> MergeOutcome {
        let changed = Self::merge_into(&mut self.entries[index], incoming);
        let key = self.entries[index].key();
        if changed {
            MergeOutcome::Merged(key)
        } else {
            MergeOutcome::Unchanged(key)
        }
    }

    /// Folds `incoming` into `existing` without moving it.
    ///
    /// Identifiers are unioned, missing content is filled in, and status
    /// only moves forward. The existing timestamp is kept: position
    /// stability on reconciliation beats strict server ordering here.
    fn merge_into(existing: &mut TimelineEntry, incoming: &TimelineEntry) -> bool {
        let mut changed = existing.keys.absorb(&incoming.keys);
        if existing.body.is_none() && incoming.body.is_some() {
            existing.body.clone_from(&incoming.body);
            changed = true;
        }
        if existing.attachment.is_none() && incoming.attachment.is_some() {
            existing.attachment.clone_from(&incoming.attachment);
            changed = true;
        }
        if existing.status.can_advance_to(incoming.status) {
            existing.status = incoming.status;
            changed = true;
        }
        if existing.error_detail.is_none() && incoming.error_detail.is_some() {
            existing.error_detail.clone_from(&incoming.error_detail);
            changed = true;
        }
        changed
    }

    /// Newest provisional outgoing entry within the echo window, if any.
    fn echo_position(&self, incoming: &TimelineEntry, window_ms: u64) -> Option<usize> {
        self.entries.iter().rposition(|e| {
            e.direction == Direction::Outgoing
                && e.status == DeliveryStatus::Sending
                && e.timestamp.abs_diff(incoming.timestamp) <= window_ms
        })
    }

    /// Inserts keeping timestamps non-decreasing; equal timestamps keep
    /// arrival order.
    fn insert_sorted(&mut self, entry: TimelineEntry) -> usize {
        let index = self
            .entries
            .partition_point(|e| e.timestamp <= entry.timestamp);
        self.entries.insert(index, entry);
        index
    }
}
