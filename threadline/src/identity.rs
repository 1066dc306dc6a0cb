//! Identity resolution across the three message identifier namespaces.
//!
//! A timeline entry may be known by a client-generated [`LocalId`], a
//! server-assigned [`ServerId`], and a broker-assigned [`TransportId`] —
//! usually some subset, rarely all three. Resolution always terminates in
//! either "matches an existing entry" or "new": there is no ambiguous
//! state. All comparisons live here rather than inline at call sites.

use threadline_proto::message::{LocalId, ServerId, TransportId};

/// The resolved, stable key used to address a message.
///
/// Precedence when several identifiers are known: server, then transport,
/// then local.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MessageKey {
    /// Client-generated provisional identifier.
    Local(LocalId),
    /// Server-assigned identifier.
    Server(ServerId),
    /// Broker-assigned identifier.
    Transport(TransportId),
}

impl std::fmt::Display for MessageKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Local(id) => write!(f, "local:{id}"),
            Self::Server(id) => write!(f, "server:{id}"),
            Self::Transport(id) => write!(f, "transport:{id}"),
        }
    }
}

/// Every identifier known for one message.
///
/// The local id is always present: entries built from remote data that
/// carried no client id get a synthesized one, so every entry has a usable
/// key even when the server supplied nothing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageKeys {
    /// Client identifier, generated locally or synthesized on ingest.
    pub local: LocalId,
    /// Server identifier, once known.
    pub server: Option<ServerId>,
    /// Transport identifier, once known.
    pub transport: Option<TransportId>,
}

impl MessageKeys {
    /// Keys for a locally-originated message that the server has not seen
    /// yet.
    #[must_use]
    pub const fn local_only(local: LocalId) -> Self {
        Self {
            local,
            server: None,
            transport: None,
        }
    }

    /// Keys for a message described by remote data.
    ///
    /// A fresh local id is synthesized; it matches nothing until another
    /// source learns it, which is exactly the dedup behavior wanted for
    /// remote-only messages.
    #[must_use]
    pub fn from_remote(server: Option<ServerId>, transport: Option<TransportId>) -> Self {
        Self {
            local: LocalId::new(),
            server,
            transport,
        }
    }

    /// The primary key for store lookups: server id first, then transport
    /// id, then the local id.
    #[must_use]
    pub fn primary(&self) -> MessageKey {
        if let Some(server) = &self.server {
            MessageKey::Server(server.clone())
        } else if let Some(transport) = &self.transport {
            MessageKey::Transport(transport.clone())
        } else {
            MessageKey::Local(self.local.clone())
        }
    }

    /// Whether any identifier field is shared with `other`.
    ///
    /// Used on insert to decide "new entry" vs. "merge": an event carrying
    /// only a server id still matches an optimistic entry that learned the
    /// same server id from its send receipt.
    #[must_use]
    pub fn intersects(&self, other: &Self) -> bool {
        self.local == other.local
            || matches!((&self.server, &other.server), (Some(a), Some(b)) if a == b)
            || matches!((&self.transport, &other.transport), (Some(a), Some(b)) if a == b)
    }

    /// Whether any of the given candidate identifiers matches this set.
    #[must_use]
    pub fn matches_any(
        &self,
        local: Option<&LocalId>,
        server: Option<&ServerId>,
        transport: Option<&TransportId>,
    ) -> bool {
        local == Some(&self.local)
            || (server.is_some() && server == self.server.as_ref())
            || (transport.is_some() && transport == self.transport.as_ref())
    }

    /// Copies identifiers from `other` into fields not yet known here.
    ///
    /// Existing values are never overwritten. Returns `true` when a field
    /// was filled in.
    pub fn absorb(&mut self, other: &Self) -> bool {
        let mut changed = false;
        if self.server.is_none() && other.server.is_some() {
            self.server.clone_from(&other.server);
            changed = true;
        }
        if self.transport.is_none() && other.transport.is_some() {
            self.transport.clone_from(&other.transport);
            changed = true;
        }
        changed
    }

    /// Records a server identifier learned from a send receipt.
    ///
    /// Returns `false` if a server id was already recorded (it is kept).
    pub fn attach_server(&mut self, server: ServerId) -> bool {
        if self.server.is_some() {
            return false;
        }
        self.server = Some(server);
        true
    }
}
