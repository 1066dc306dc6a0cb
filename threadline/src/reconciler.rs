//! Applies delivery-receipt updates to timeline entries.
//!
//! A status event carries whatever identifiers the gateway had; the
//! reconciler tries each candidate against each entry's known id fields
//! and applies the new status only when it is a forward move. Applying the
//! same status twice, or an older status after a newer one, is a no-op —
//! receipts arrive duplicated and out of order and both must be safe.

use threadline_proto::message::{DeliveryStatus, LocalId, ServerId, TransportId};

use crate::identity::MessageKey;
use crate::store::TimelineStore;

/// Result of applying one status update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusOutcome {
    /// The status advanced on the matched entry.
    Applied {
        /// Key of the updated entry.
        key: MessageKey,
        /// The status now recorded.
        status: DeliveryStatus,
    },
    /// An entry matched but the update was stale or repeated.
    Ignored {
        /// Key of the matched entry.
        key: MessageKey,
        /// The status the entry keeps.
        current: DeliveryStatus,
    },
    /// No entry matched any candidate identifier.
    NoMatch,
}

/// Applies a status update to the entry matching any candidate identifier.
///
/// `detail` is recorded as the entry's error detail when the update moves
/// it to `Failed`.
pub fn apply_status(
    store: &mut TimelineStore,
    local: Option<&LocalId>,
    server: Option<&ServerId>,
    transport: Option<&TransportId>,
    status: DeliveryStatus,
    detail: Option<&str>,
) -> StatusOutcome {
    let Some(entry) = store.entry_mut_by(local, server, transport) else {
        return StatusOutcome::NoMatch;
    };

    if !entry.status.can_advance_to(status) {
        return StatusOutcome::Ignored {
            key: entry.key(),
            current: entry.status,
        };
    }

    entry.status = status;
    if status == DeliveryStatus::Failed {
        entry.error_detail = detail.map(str::to_owned);
    }
    StatusOutcome::Applied {
        key: entry.key(),
        status,
    }
}
