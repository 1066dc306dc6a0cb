//! In-memory backend for testing.
//!
//! Implements all three backend seams over in-process state: a seeded
//! message archive with limit/before slicing, a scriptable send gateway,
//! and a topic-keyed push channel fed by [`publish`](InMemoryBackend::publish).
//! Gates ([`hold_fetches`](InMemoryBackend::hold_fetches),
//! [`hold_sends`](InMemoryBackend::hold_sends)) park requests until
//! released so tests can interleave completions deterministically.
//!
//! The backend is cheaply cloneable and clones share state, so a test can
//! keep a handle while the session owns its own.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use tokio::sync::{Mutex, mpsc, watch};

use threadline_proto::codec;
use threadline_proto::contact::ContactKey;
use threadline_proto::event::{Topic, WireEvent};
use threadline_proto::message::{DeliveryStatus, RemoteMessage, ServerId};

use super::{
    BackendError, EventChannel, EventFeed, HistoryBackend, HistoryPage, HistoryQuery,
    MessageGateway, OutgoingMessage, SendReceipt,
};

/// Channel capacity for each subscription feed.
const FEED_BUFFER: usize = 64;

struct FeedHandle {
    topics: Vec<Topic>,
    tx: mpsc::Sender<Vec<u8>>,
}

struct Inner {
    /// Full archive per contact, ordered oldest → newest.
    archive: Mutex<HashMap<ContactKey, Vec<RemoteMessage>>>,
    fail_next_fetch: AtomicBool,
    fetch_gate: watch::Sender<bool>,
    send_gate: watch::Sender<bool>,
    /// Scripted send results; empty means auto-assign a server id.
    send_results: Mutex<VecDeque<Result<SendReceipt, BackendError>>>,
    sent: Mutex<Vec<(ContactKey, OutgoingMessage)>>,
    send_seq: AtomicU64,
    feeds: Mutex<Vec<FeedHandle>>,
}

/// Shared-state in-memory implementation of every backend seam.
#[derive(Clone)]
pub struct InMemoryBackend {
    inner: Arc<Inner>,
}

impl InMemoryBackend {
    /// Creates an empty backend with open gates.
    #[must_use]
    pub fn new() -> Self {
        let (fetch_gate, _) = watch::channel(true);
        let (send_gate, _) = watch::channel(true);
        Self {
            inner: Arc::new(Inner {
                archive: Mutex::new(HashMap::new()),
                fail_next_fetch: AtomicBool::new(false),
                fetch_gate,
                send_gate,
                send_results: Mutex::new(VecDeque::new()),
                sent: Mutex::new(Vec::new()),
                send_seq: AtomicU64::new(0),
                feeds: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Seeds the archive for a contact; messages are kept oldest → newest.
    pub async fn seed_history(&self, contact: &ContactKey, mut messages: Vec<RemoteMessage>) {
        messages.sort_by_key(|m| m.timestamp);
        self.inner
            .archive
            .lock()
            .await
            .insert(contact.clone(), messages);
    }

    /// Makes the next `fetch_history` call fail.
    pub fn fail_next_fetch(&self) {
        self.inner.fail_next_fetch.store(true, Ordering::SeqCst);
    }

    /// Parks fetches until [`release_fetches`](Self::release_fetches).
    pub fn hold_fetches(&self) {
        self.inner.fetch_gate.send_replace(false);
    }

    /// Lets parked fetches proceed.
    pub fn release_fetches(&self) {
        self.inner.fetch_gate.send_replace(true);
    }

    /// Parks sends until [`release_sends`](Self::release_sends).
    pub fn hold_sends(&self) {
        self.inner.send_gate.send_replace(false);
    }

    /// Lets parked sends proceed.
    pub fn release_sends(&self) {
        self.inner.send_gate.send_replace(true);
    }

    /// Queues a result for an upcoming `send_message` call.
    pub async fn script_send_result(&self, result: Result<SendReceipt, BackendError>) {
        self.inner.send_results.lock().await.push_back(result);
    }

    /// Every message handed to the gateway so far.
    pub async fn sent(&self) -> Vec<(ContactKey, OutgoingMessage)> {
        self.inner.sent.lock().await.clone()
    }

    /// Topics with an active subscription.
    pub async fn active_topics(&self) -> Vec<Topic> {
        let feeds = self.inner.feeds.lock().await;
        feeds
            .iter()
            .filter(|f| !f.tx.is_closed())
            .flat_map(|f| f.topics.iter().cloned())
            .collect()
    }

    /// Publishes a decoded event on a topic; subscribed feeds receive the
    /// encoded frame.
    pub async fn publish(&self, topic: &Topic, event: &WireEvent) {
        match codec::encode_event(event) {
            Ok(frame) => self.publish_raw(topic, frame).await,
            Err(error) => tracing::warn!(%error, "failed to encode test event"),
        }
    }

    /// Publishes a raw frame on a topic, bypassing the codec.
    pub async fn publish_raw(&self, topic: &Topic, frame: Vec<u8>) {
        let feeds = self.inner.feeds.lock().await;
        for feed in feeds.iter().filter(|f| f.topics.contains(topic)) {
            let _ = feed.tx.send(frame.clone()).await;
        }
    }

    async fn wait_open(gate: &watch::Sender<bool>) {
        let mut rx = gate.subscribe();
        // A dropped gate means teardown; treat it as open.
        let _ = rx.wait_for(|open| *open).await;
    }
}

impl Default for InMemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl HistoryBackend for InMemoryBackend {
    async fn fetch_history(
        &self,
        contact: &ContactKey,
        query: HistoryQuery,
    ) -> Result<HistoryPage, BackendError> {
        Self::wait_open(&self.inner.fetch_gate).await;

        if self.inner.fail_next_fetch.swap(false, Ordering::SeqCst) {
            return Err(BackendError::Unavailable("scripted fetch failure".into()));
        }

        let archive = self.inner.archive.lock().await;
        let Some(messages) = archive.get(contact) else {
            return Ok(HistoryPage::default());
        };

        let eligible: Vec<RemoteMessage> = messages
            .iter()
            .filter(|m| query.before.is_none_or(|before| m.timestamp < before))
            .cloned()
            .collect();

        let start = eligible.len().saturating_sub(query.limit);
        let page: Vec<RemoteMessage> = eligible[start..].to_vec();
        Ok(HistoryPage {
            oldest_timestamp: page.iter().map(|m| m.timestamp).min(),
            has_more: start > 0,
            messages: page,
        })
    }
}

impl MessageGateway for InMemoryBackend {
    async fn send_message(
        &self,
        contact: &ContactKey,
        message: &OutgoingMessage,
    ) -> Result<SendReceipt, BackendError> {
        Self::wait_open(&self.inner.send_gate).await;

        self.inner
            .sent
            .lock()
            .await
            .push((contact.clone(), message.clone()));

        if let Some(scripted) = self.inner.send_results.lock().await.pop_front() {
            return scripted;
        }

        let seq = self.inner.send_seq.fetch_add(1, Ordering::SeqCst);
        Ok(SendReceipt {
            server_id: ServerId::new(format!("srv-{seq}")),
            status: DeliveryStatus::Sent,
        })
    }
}

impl EventChannel for InMemoryBackend {
    async fn subscribe(&self, topics: &[Topic]) -> Result<EventFeed, BackendError> {
        let (tx, rx) = mpsc::channel(FEED_BUFFER);
        self.inner.feeds.lock().await.push(FeedHandle {
            topics: topics.to_vec(),
            tx,
        });
        Ok(EventFeed::new(rx))
    }

    async fn unsubscribe(&self, topics: &[Topic]) -> Result<(), BackendError> {
        self.inner
            .feeds
            .lock()
            .await
            .retain(|feed| !feed.topics.iter().any(|t| topics.contains(t)));
        Ok(())
    }
}
