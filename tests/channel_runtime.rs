// tests/channel_runtime.rs
//
// Channel manager runtime against the in-memory transport, on paused time so
// heartbeat, liveness and backoff timers fire deterministically.

use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};

mod common;

use common::{MemoryConnector, MemoryPeer};
use freight_board::channel::state::ConnectionStatus;
use freight_board::channel::{ChannelHandle, ChannelManager};
use freight_board::config::ChannelConfig;
use freight_board::{Category, Ingestor, RecordStore};

fn cfg(max_retries: Option<u32>) -> ChannelConfig {
    ChannelConfig {
        url: Some("memory".into()),
        jitter_ms: 0,
        max_retries,
        ..Default::default()
    }
}

fn start(
    script: Vec<bool>,
    max_retries: Option<u32>,
) -> (
    ChannelHandle,
    MemoryConnector,
    tokio::sync::mpsc::UnboundedReceiver<MemoryPeer>,
    Arc<RecordStore>,
) {
    let (connector, peers) = MemoryConnector::new(script);
    let store = Arc::new(RecordStore::in_memory());
    let ingestor = Arc::new(Ingestor::new(Arc::clone(&store)));
    let handle = ChannelManager::new(Arc::new(connector.clone()), ingestor, &cfg(max_retries)).spawn();
    (handle, connector, peers, store)
}

async fn wait_for_status(handle: &ChannelHandle, want: ConnectionStatus) {
    let mut rx = handle.subscribe();
    tokio::time::timeout(Duration::from_secs(600), rx.wait_for(|s| s.status == want))
        .await
        .expect("status not reached in time")
        .expect("channel task gone");
}

async fn eventually(mut cond: impl FnMut() -> bool) {
    for _ in 0..200 {
        if cond() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("condition not met");
}

#[tokio::test(start_paused = true)]
async fn classification_frames_reach_the_store_in_order() {
    let (handle, _conn, mut peers, store) = start(vec![true], None);
    let peer = peers.recv().await.unwrap();
    wait_for_status(&handle, ConnectionStatus::Connected).await;

    let frame = |id: u64, loading: &str| {
        json!({
            "type": "new_classification",
            "classification": format!("Mesaj Tipi: TRANSPORT_SEEKING_CARGO\nYükleme Yeri: {loading}"),
            "timestamp": "2024-02-02T12:00:00Z",
            "id": id
        })
        .to_string()
    };

    peer.to_client.send(frame(7, "Izmir")).unwrap();
    // redelivery of the same event with corrected content
    peer.to_client.send(frame(7, "Manisa")).unwrap();
    // noise that must not disturb the channel
    peer.to_client.send(r#"{"type":"presence","users":4}"#.into()).unwrap();
    peer.to_client.send("definitely not json".into()).unwrap();
    peer.to_client
        .send(json!({"type": "new_classification", "classification": "Merhaba"}).to_string())
        .unwrap();

    eventually(|| handle.snapshot().frames_received == 5).await;

    assert_eq!(store.len(Category::TransportSeekingCargo), 1);
    let snap = store.snapshot();
    assert_eq!(snap.transport_seeking_cargo[0].loading_location, "Manisa");
    assert_eq!(store.quarantined(), 1);
    assert_eq!(handle.snapshot().status, ConnectionStatus::Connected);

    handle.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn peer_close_triggers_backoff_reconnect() {
    let (handle, conn, mut peers, _store) = start(vec![true, true], None);
    let first = peers.recv().await.unwrap();
    wait_for_status(&handle, ConnectionStatus::Connected).await;

    drop(first);
    let _second = peers.recv().await.unwrap();
    wait_for_status(&handle, ConnectionStatus::Connected).await;

    assert_eq!(conn.attempts(), 2);
    assert_eq!(handle.snapshot().retry_count, 0);

    handle.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn exhausting_retries_fails_until_manual_retrigger() {
    let (handle, conn, mut peers, _store) = start(vec![], Some(2));

    wait_for_status(&handle, ConnectionStatus::Failed).await;
    // initial attempt + two retries
    assert_eq!(conn.attempts(), 3);
    assert!(handle.snapshot().last_error.is_some());

    // stays failed: no automatic retries
    tokio::time::sleep(Duration::from_secs(120)).await;
    assert_eq!(conn.attempts(), 3);

    conn.push_script(true).await;
    assert!(handle.reconnect().await);
    let _peer = peers.recv().await.unwrap();
    wait_for_status(&handle, ConnectionStatus::Connected).await;
    assert_eq!(conn.attempts(), 4);

    handle.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn missing_liveness_ack_forces_reconnect() {
    let (handle, conn, mut peers, _store) = start(vec![true, true], None);
    let mut first = peers.recv().await.unwrap();
    wait_for_status(&handle, ConnectionStatus::Connected).await;

    let probe: Value = serde_json::from_str(&first.from_client.recv().await.unwrap()).unwrap();
    assert_eq!(probe["type"], "ping");

    // never answer; the manager must give up on this socket by itself
    let _second = peers.recv().await.unwrap();
    wait_for_status(&handle, ConnectionStatus::Connected).await;
    assert_eq!(conn.attempts(), 2);

    handle.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn answered_probes_keep_the_connection() {
    let (handle, conn, mut peers, _store) = start(vec![true], None);
    let mut peer = peers.recv().await.unwrap();
    wait_for_status(&handle, ConnectionStatus::Connected).await;

    let responder = tokio::spawn(async move {
        while let Some(msg) = peer.from_client.recv().await {
            if msg.contains("ping") {
                let _ = peer.to_client.send(r#"{"type":"pong"}"#.to_string());
            }
        }
    });

    tokio::time::sleep(Duration::from_secs(300)).await;
    assert_eq!(conn.attempts(), 1);
    let snap = handle.snapshot();
    assert_eq!(snap.status, ConnectionStatus::Connected);
    assert!(snap.last_ack_at.is_some());

    handle.shutdown().await;
    responder.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn shutdown_cancels_pending_reconnect() {
    let (handle, conn, _peers, _store) = start(vec![], None);
    wait_for_status(&handle, ConnectionStatus::Disconnected).await;
    let attempts = conn.attempts();

    handle.shutdown().await;
    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(conn.attempts(), attempts);
}
