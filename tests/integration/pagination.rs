//! Integration tests for backward history pagination.
//!
//! Covers the paging properties the engine guarantees:
//! - the initial load replaces the store with the newest page
//! - older pages prepend without overlap or duplication
//! - an empty older page terminates pagination defensively
//! - a failed fetch leaves the cursor untouched and is retryable
//! - `load_older` is not re-entrant while a fetch is in flight

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use threadline::backend::memory::InMemoryBackend;
use threadline::config::TimelineConfig;
use threadline::session::{ConversationSession, LoadOutcome, SessionError, TimelineEvent};
use threadline_proto::message::{Direction, RemoteMessage, ServerId, Timestamp};

type MemorySession = ConversationSession<InMemoryBackend, InMemoryBackend, InMemoryBackend>;

fn new_session(backend: &InMemoryBackend) -> (MemorySession, mpsc::Receiver<TimelineEvent>) {
    ConversationSession::new(
        backend.clone(),
        backend.clone(),
        backend.clone(),
        TimelineConfig::default(),
    )
}

fn remote(server: &str, ts: u64) -> RemoteMessage {
    RemoteMessage {
        server_id: Some(ServerId::new(server)),
        transport_id: None,
        phone: "15550102030".into(),
        direction: Direction::Incoming,
        body: Some(format!("message {server}")),
        attachment: None,
        timestamp: Timestamp::from_millis(ts),
        status: None,
    }
}

/// Fifty archived messages at timestamps 100, 200, ... 5000.
fn archive_of_fifty() -> Vec<RemoteMessage> {
    (1..=50u64)
        .map(|i| remote(&format!("m{i}"), i * 100))
        .collect()
}

async fn open_conversation(session: &MemorySession) {
    let contact = session.switch_conversation("5550102030").await.unwrap();
    // Seeding is keyed by the canonical contact.
    assert_eq!(contact.as_str(), "15550102030");
}

#[tokio::test]
async fn initial_load_replaces_store_with_newest_page() {
    let backend = InMemoryBackend::new();
    let (session, _events) = new_session(&backend);
    open_conversation(&session).await;
    backend
        .seed_history(&session.active_contact().await.unwrap(), archive_of_fifty())
        .await;

    let outcome = session.load_initial().await.unwrap();
    assert_eq!(
        outcome,
        LoadOutcome::Loaded {
            added: 30,
            has_more: true
        }
    );

    let entries = session.snapshot().await;
    assert_eq!(entries.len(), 30);
    // Newest 30 of 50, oldest first.
    assert_eq!(entries[0].timestamp, Timestamp::from_millis(2_100));
    assert_eq!(entries[29].timestamp, Timestamp::from_millis(5_000));
    for window in entries.windows(2) {
        assert!(window[0].timestamp <= window[1].timestamp);
    }

    let cursor = session.page_state().await;
    assert_eq!(cursor.oldest_seen, Some(Timestamp::from_millis(2_100)));
    assert!(cursor.has_more);
}

#[tokio::test]
async fn load_older_prepends_each_message_exactly_once() {
    let backend = InMemoryBackend::new();
    let (session, _events) = new_session(&backend);
    open_conversation(&session).await;
    backend
        .seed_history(&session.active_contact().await.unwrap(), archive_of_fifty())
        .await;

    session.load_initial().await.unwrap();
    let outcome = session.load_older().await.unwrap();
    assert_eq!(
        outcome,
        LoadOutcome::Loaded {
            added: 20,
            has_more: false
        }
    );

    let entries = session.snapshot().await;
    assert_eq!(entries.len(), 50, "P1 and P2 merged with no gap");

    // Each message exactly once, ordered oldest to newest.
    let mut server_ids: Vec<String> = entries
        .iter()
        .map(|e| e.keys.server.clone().unwrap().to_string())
        .collect();
    for window in entries.windows(2) {
        assert!(window[0].timestamp <= window[1].timestamp);
    }
    server_ids.sort();
    server_ids.dedup();
    assert_eq!(server_ids.len(), 50, "no duplicates across pages");

    assert_eq!(session.load_older().await.unwrap(), LoadOutcome::EndOfHistory);
}

#[tokio::test]
async fn empty_older_page_forces_has_more_false() {
    let backend = InMemoryBackend::new();
    let (session, _events) = new_session(&backend);
    open_conversation(&session).await;

    // The one message left beyond the initial page shares the page's
    // oldest timestamp, so the "strictly older" fetch comes back empty
    // even though the backend reported has_more.
    let mut archive = vec![remote("m1", 100), remote("m2", 100)];
    archive.extend((3..=31u64).map(|i| remote(&format!("m{i}"), 100 + i)));
    backend
        .seed_history(&session.active_contact().await.unwrap(), archive)
        .await;

    session.load_initial().await.unwrap();
    assert!(session.page_state().await.has_more);

    let outcome = session.load_older().await.unwrap();
    assert_eq!(
        outcome,
        LoadOutcome::Loaded {
            added: 0,
            has_more: false
        }
    );
    assert!(
        !session.page_state().await.has_more,
        "empty page must terminate pagination"
    );
    assert_eq!(session.load_older().await.unwrap(), LoadOutcome::EndOfHistory);
}

#[tokio::test]
async fn failed_fetch_leaves_cursor_intact_and_is_retryable() {
    let backend = InMemoryBackend::new();
    let (session, _events) = new_session(&backend);
    open_conversation(&session).await;
    backend
        .seed_history(&session.active_contact().await.unwrap(), archive_of_fifty())
        .await;

    session.load_initial().await.unwrap();
    let cursor_before = session.page_state().await;

    backend.fail_next_fetch();
    let result = session.load_older().await;
    assert!(matches!(result, Err(SessionError::Backend(_))));
    assert_eq!(
        session.page_state().await,
        cursor_before,
        "failure must not move the cursor or clear has_more"
    );
    assert_eq!(session.snapshot().await.len(), 30);

    // User-initiated retry succeeds.
    let outcome = session.load_older().await.unwrap();
    assert_eq!(
        outcome,
        LoadOutcome::Loaded {
            added: 20,
            has_more: false
        }
    );
}

#[tokio::test]
async fn load_older_is_a_noop_while_one_is_in_flight() {
    let backend = InMemoryBackend::new();
    let (session, _events) = new_session(&backend);
    let session = Arc::new(session);
    open_conversation(&session).await;
    backend
        .seed_history(&session.active_contact().await.unwrap(), archive_of_fifty())
        .await;

    session.load_initial().await.unwrap();

    backend.hold_fetches();
    let first = {
        let session = Arc::clone(&session);
        tokio::spawn(async move { session.load_older().await })
    };
    tokio::time::sleep(Duration::from_millis(10)).await;

    // The second call must not race the cursor.
    assert_eq!(
        session.load_older().await.unwrap(),
        LoadOutcome::AlreadyInFlight
    );

    backend.release_fetches();
    let outcome = first.await.unwrap().unwrap();
    assert_eq!(
        outcome,
        LoadOutcome::Loaded {
            added: 20,
            has_more: false
        }
    );
    assert_eq!(session.snapshot().await.len(), 50);
}

#[tokio::test]
async fn load_older_before_initial_load_is_a_noop() {
    let backend = InMemoryBackend::new();
    let (session, _events) = new_session(&backend);
    open_conversation(&session).await;

    assert_eq!(session.load_older().await.unwrap(), LoadOutcome::NotLoaded);
    assert!(session.snapshot().await.is_empty());
}

#[tokio::test]
async fn manual_refresh_fully_repairs_the_timeline() {
    let backend = InMemoryBackend::new();
    let (session, _events) = new_session(&backend);
    open_conversation(&session).await;
    let contact = session.active_contact().await.unwrap();

    backend
        .seed_history(&contact, vec![remote("m1", 100)])
        .await;
    session.load_initial().await.unwrap();
    assert_eq!(session.snapshot().await.len(), 1);

    // The archive moved on; a refresh replaces the stale view entirely.
    backend
        .seed_history(&contact, vec![remote("m1", 100), remote("m2", 200)])
        .await;
    session.load_initial().await.unwrap();

    let entries = session.snapshot().await;
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[1].keys.server, Some(ServerId::new("m2")));
}

#[tokio::test]
async fn paging_without_a_conversation_is_an_error() {
    let backend = InMemoryBackend::new();
    let (session, _events) = new_session(&backend);

    assert!(matches!(
        session.load_initial().await,
        Err(SessionError::NoConversation)
    ));
    assert!(matches!(
        session.load_older().await,
        Err(SessionError::NoConversation)
    ));
}
