//! Integration tests for live push-event consumption.
//!
//! Covers idempotent insert, forward-only status reconciliation, phone
//! routing, malformed-frame handling, and ordering of late-arriving
//! events relative to already-loaded history.

use tokio::sync::mpsc;

use threadline::backend::memory::InMemoryBackend;
use threadline::config::TimelineConfig;
use threadline::session::{
    ConversationSession, DropReason, PumpOutcome, TimelineEvent,
};
use threadline_proto::contact::ContactKey;
use threadline_proto::event::{
    MessageEventPayload, StatusEventPayload, Topic, WireEvent, topics_for,
};
use threadline_proto::message::{
    DeliveryStatus, Direction, RemoteMessage, ServerId, Timestamp, TransportId,
};

type MemorySession = ConversationSession<InMemoryBackend, InMemoryBackend, InMemoryBackend>;

fn new_session(backend: &InMemoryBackend) -> (MemorySession, mpsc::Receiver<TimelineEvent>) {
    ConversationSession::new(
        backend.clone(),
        backend.clone(),
        backend.clone(),
        TimelineConfig::default(),
    )
}

fn received(phone: &str, server: &str, ts: u64, body: &str) -> WireEvent {
    WireEvent::Received(MessageEventPayload {
        phone: phone.to_owned(),
        server_id: Some(ServerId::new(server)),
        transport_id: Some(TransportId::new(format!("b-{server}"))),
        body: Some(body.to_owned()),
        attachment: None,
        timestamp: Timestamp::from_millis(ts),
    })
}

fn receipt(phone: &str, server: &str, status: DeliveryStatus) -> WireEvent {
    WireEvent::Status(StatusEventPayload {
        phone: phone.to_owned(),
        server_id: Some(ServerId::new(server)),
        transport_id: None,
        local_id: None,
        status,
        error: None,
    })
}

fn message_topic(contact: &ContactKey) -> Topic {
    topics_for(contact).remove(0)
}

fn receipt_topic(contact: &ContactKey) -> Topic {
    topics_for(contact).remove(1)
}

fn outgoing_remote(server: &str, ts: u64) -> RemoteMessage {
    RemoteMessage {
        server_id: Some(ServerId::new(server)),
        transport_id: None,
        phone: "15550102030".into(),
        direction: Direction::Outgoing,
        body: Some("from me".into()),
        attachment: None,
        timestamp: Timestamp::from_millis(ts),
        status: Some(DeliveryStatus::Sent),
    }
}

async fn open(session: &MemorySession) -> ContactKey {
    let contact = session.switch_conversation("5550102030").await.unwrap();
    session.load_initial().await.unwrap();
    contact
}

#[tokio::test]
async fn incoming_event_appends_a_delivered_entry() {
    let backend = InMemoryBackend::new();
    let (session, mut events) = new_session(&backend);
    let contact = open(&session).await;

    backend
        .publish(
            &message_topic(&contact),
            &received("15550102030", "m1", 1_000, "hello"),
        )
        .await;
    assert!(matches!(session.pump_one().await, PumpOutcome::Applied(_)));

    let entries = session.snapshot().await;
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].direction, Direction::Incoming);
    assert_eq!(
        entries[0].status,
        DeliveryStatus::Delivered,
        "incoming messages are implicitly delivered on arrival"
    );
    assert_eq!(entries[0].body.as_deref(), Some("hello"));

    // Drain the switch/load notifications; the insert must be last.
    let mut last = None;
    while let Ok(event) = events.try_recv() {
        last = Some(event);
    }
    assert!(matches!(last, Some(TimelineEvent::EntryInserted { .. })));
}

#[tokio::test]
async fn duplicate_delivery_keeps_one_entry() {
    let backend = InMemoryBackend::new();
    let (session, _events) = new_session(&backend);
    let contact = open(&session).await;

    let event = received("15550102030", "m1", 1_000, "hello");
    backend.publish(&message_topic(&contact), &event).await;
    backend.publish(&message_topic(&contact), &event).await;

    assert!(matches!(session.pump_one().await, PumpOutcome::Applied(_)));
    assert!(matches!(session.pump_one().await, PumpOutcome::Applied(_)));

    assert_eq!(session.snapshot().await.len(), 1, "idempotent insert");
}

#[tokio::test]
async fn status_updates_advance_but_never_regress() {
    let backend = InMemoryBackend::new();
    let (session, _events) = new_session(&backend);
    let contact = session.switch_conversation("5550102030").await.unwrap();
    backend
        .seed_history(&contact, vec![outgoing_remote("m1", 1_000)])
        .await;
    session.load_initial().await.unwrap();

    // Sent -> Delivered -> Read, then a stale Delivered.
    for status in [
        DeliveryStatus::Delivered,
        DeliveryStatus::Read,
        DeliveryStatus::Delivered,
    ] {
        backend
            .publish(&receipt_topic(&contact), &receipt("5550102030", "m1", status))
            .await;
        session.pump_one().await;
    }

    let entries = session.snapshot().await;
    assert_eq!(
        entries[0].status,
        DeliveryStatus::Read,
        "a stale receipt must not regress the status"
    );
}

#[tokio::test]
async fn repeated_receipt_is_a_noop() {
    let backend = InMemoryBackend::new();
    let (session, _events) = new_session(&backend);
    let contact = session.switch_conversation("5550102030").await.unwrap();
    backend
        .seed_history(&contact, vec![outgoing_remote("m1", 1_000)])
        .await;
    session.load_initial().await.unwrap();

    for _ in 0..2 {
        backend
            .publish(
                &receipt_topic(&contact),
                &receipt("5550102030", "m1", DeliveryStatus::Delivered),
            )
            .await;
        assert!(matches!(session.pump_one().await, PumpOutcome::Applied(_)));
    }

    let entries = session.snapshot().await;
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].status, DeliveryStatus::Delivered);
}

#[tokio::test]
async fn receipt_for_unknown_message_changes_nothing() {
    let backend = InMemoryBackend::new();
    let (session, _events) = new_session(&backend);
    let contact = open(&session).await;

    backend
        .publish(
            &receipt_topic(&contact),
            &receipt("5550102030", "never-seen", DeliveryStatus::Read),
        )
        .await;
    assert!(matches!(session.pump_one().await, PumpOutcome::Applied(_)));
    assert!(session.snapshot().await.is_empty());
}

#[tokio::test]
async fn event_for_another_conversation_is_dropped() {
    let backend = InMemoryBackend::new();
    let (session, _events) = new_session(&backend);
    let contact = open(&session).await;

    // Delivered on the subscribed topic, but the payload's phone belongs
    // to someone else (coarse-grained brokers do this).
    backend
        .publish(
            &message_topic(&contact),
            &received("15550109999", "m1", 1_000, "wrong chat"),
        )
        .await;

    assert_eq!(
        session.pump_one().await,
        PumpOutcome::Dropped(DropReason::OtherConversation)
    );
    assert!(session.snapshot().await.is_empty());
}

#[tokio::test]
async fn malformed_frame_is_dropped_and_store_untouched() {
    let backend = InMemoryBackend::new();
    let (session, _events) = new_session(&backend);
    let contact = open(&session).await;

    backend
        .publish_raw(&message_topic(&contact), b"{definitely not an event".to_vec())
        .await;

    assert_eq!(
        session.pump_one().await,
        PumpOutcome::Dropped(DropReason::Malformed)
    );
    assert!(session.snapshot().await.is_empty());

    // The feed is still alive afterwards.
    backend
        .publish(
            &message_topic(&contact),
            &received("15550102030", "m1", 1_000, "still works"),
        )
        .await;
    assert!(matches!(session.pump_one().await, PumpOutcome::Applied(_)));
    assert_eq!(session.snapshot().await.len(), 1);
}

#[tokio::test]
async fn late_event_with_older_timestamp_keeps_order() {
    let backend = InMemoryBackend::new();
    let (session, _events) = new_session(&backend);
    let contact = session.switch_conversation("5550102030").await.unwrap();
    backend
        .seed_history(
            &contact,
            vec![
                RemoteMessage {
                    direction: Direction::Incoming,
                    status: None,
                    ..outgoing_remote("m1", 1_000)
                },
                RemoteMessage {
                    direction: Direction::Incoming,
                    status: None,
                    ..outgoing_remote("m3", 3_000)
                },
            ],
        )
        .await;
    session.load_initial().await.unwrap();

    backend
        .publish(
            &message_topic(&contact),
            &received("15550102030", "m2", 2_000, "in between"),
        )
        .await;
    session.pump_one().await;

    let timestamps: Vec<u64> = session
        .snapshot()
        .await
        .iter()
        .map(|e| e.timestamp.as_millis())
        .collect();
    assert_eq!(timestamps, [1_000, 2_000, 3_000]);
}

#[tokio::test]
async fn history_page_never_duplicates_a_live_entry() {
    let backend = InMemoryBackend::new();
    let (session, _events) = new_session(&backend);
    let contact = session.switch_conversation("5550102030").await.unwrap();

    // Archive big enough for two pages; m20 sits in the older page.
    let archive: Vec<RemoteMessage> = (1..=40u64)
        .map(|i| RemoteMessage {
            direction: Direction::Incoming,
            status: None,
            ..outgoing_remote(&format!("m{i}"), i * 100)
        })
        .collect();
    backend.seed_history(&contact, archive).await;
    session.load_initial().await.unwrap();
    assert_eq!(session.snapshot().await.len(), 30);

    // The same message arrives over the push channel before the older
    // page is requested.
    backend
        .publish(
            &message_topic(&contact),
            &received("15550102030", "m5", 500, "early copy"),
        )
        .await;
    session.pump_one().await;
    assert_eq!(session.snapshot().await.len(), 31);

    session.load_older().await.unwrap();

    let entries = session.snapshot().await;
    assert_eq!(entries.len(), 40, "live entry must not be duplicated");
    let m5_count = entries
        .iter()
        .filter(|e| e.keys.server == Some(ServerId::new("m5")))
        .count();
    assert_eq!(m5_count, 1);
    for window in entries.windows(2) {
        assert!(window[0].timestamp <= window[1].timestamp);
    }
}
