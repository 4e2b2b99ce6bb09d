// tests/api_http.rs
//
// HTTP-level tests for the public API Router without opening sockets.
// We exercise the router directly via tower::ServiceExt::oneshot.

use std::sync::Arc;

use axum::{
    body::{self, Body},
    Router,
};
use http::{header, Method, Request, StatusCode};
use serde_json::{json, Value as Json};
use tower::ServiceExt as _; // for `oneshot`

mod common;

use common::MemoryConnector;
use freight_board::channel::state::ConnectionStatus;
use freight_board::channel::ChannelManager;
use freight_board::classifier::{DisabledClassifier, DynClassifier, MockClassifier};
use freight_board::config::ChannelConfig;
use freight_board::{router, AppState, Category, Ingestor, RecordStore};

const BODY_LIMIT: usize = 1024 * 1024;

fn app_with(classifier: DynClassifier) -> (Router, Arc<RecordStore>) {
    let store = Arc::new(RecordStore::in_memory());
    let state = AppState {
        ingestor: Arc::new(Ingestor::new(Arc::clone(&store))),
        classifier,
        channel: None,
    };
    (router(state), store)
}

fn mock_app() -> (Router, Arc<RecordStore>) {
    app_with(Arc::new(MockClassifier::new(json!({
        "data": ["1. Mesaj Tipi: CARGO_SEEKING_TRANSPORT\n2. Yükleme Yeri: Gebze\n3. Yük Tipi: Palet"]
    }))))
}

async fn send(app: &Router, req: Request<Body>) -> (StatusCode, Vec<u8>) {
    let resp = app.clone().oneshot(req).await.expect("oneshot");
    let status = resp.status();
    let bytes = body::to_bytes(resp.into_body(), BODY_LIMIT)
        .await
        .expect("read body")
        .to_vec();
    (status, bytes)
}

fn post_json(uri: &str, v: Json) -> Request<Body> {
    Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(v.to_string()))
        .expect("build request")
}

#[tokio::test]
async fn health_returns_ok() {
    let (app, _) = mock_app();
    let (status, body) = send(&app, Request::get("/health").body(Body::empty()).unwrap()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(String::from_utf8(body).unwrap().trim(), "OK");
}

#[tokio::test]
async fn submit_classifies_and_merges() {
    let (app, store) = mock_app();
    let (status, body) = send(&app, post_json("/submit", json!({ "text": "Gebze'den palet yük var" }))).await;
    assert_eq!(status, StatusCode::OK);

    let v: Json = serde_json::from_slice(&body).unwrap();
    assert_eq!(v["merge"]["outcome"], "inserted");
    assert_eq!(v["record"]["category"], "CARGO_SEEKING_TRANSPORT");
    assert_eq!(v["record"]["loadingLocation"], "Gebze");
    assert_eq!(v["record"]["unloadingLocation"], "UNSPECIFIED");
    assert_eq!(store.len(Category::CargoSeekingTransport), 1);
}

#[tokio::test]
async fn submit_with_empty_text_is_bad_request() {
    let (app, _) = mock_app();
    let (status, _) = send(&app, post_json("/submit", json!({ "text": "  " }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn submit_transport_failure_is_bad_gateway() {
    let (app, store) = app_with(Arc::new(DisabledClassifier));
    let (status, body) = send(&app, post_json("/submit", json!({ "text": "hello" }))).await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    let v: Json = serde_json::from_slice(&body).unwrap();
    assert!(v["error"].as_str().unwrap().contains("unavailable"));
    assert!(store.snapshot().is_empty());
}

#[tokio::test]
async fn ingest_accepts_envelopes_and_plain_text() {
    let (app, store) = mock_app();

    let (status, _) = send(
        &app,
        post_json(
            "/ingest",
            json!({ "response": "Mesaj Tipi: TRANSPORT_SEEKING_CARGO\nAraç Tipi: Kamyon", "id": 99 }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let plain = Request::builder()
        .method(Method::POST)
        .uri("/ingest")
        .header(header::CONTENT_TYPE, "text/plain")
        .body(Body::from("Mesaj Tipi: CARGO_SEEKING_TRANSPORT\nFiyat: 12000 TL"))
        .unwrap();
    let (status, body) = send(&app, plain).await;
    assert_eq!(status, StatusCode::OK);
    let v: Json = serde_json::from_slice(&body).unwrap();
    assert_eq!(v["record"]["price"], "12000 TL");

    assert_eq!(store.len(Category::TransportSeekingCargo), 1);
    assert_eq!(store.len(Category::CargoSeekingTransport), 1);
}

#[tokio::test]
async fn ingest_rejects_non_text() {
    let (app, _) = mock_app();
    let (status, _) = send(&app, post_json("/ingest", json!(null))).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    let (status, _) = send(&app, post_json("/ingest", json!({ "score": 1 }))).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn records_delete_reset_and_stats() {
    let (app, _) = mock_app();
    send(
        &app,
        post_json("/ingest", json!({ "classification": "Mesaj Tipi: CARGO_SEEKING_TRANSPORT", "id": 5 })),
    )
    .await;
    send(&app, post_json("/ingest", json!("Merhaba, nasılsınız?"))).await;

    let (_, body) = send(&app, Request::get("/records").body(Body::empty()).unwrap()).await;
    let v: Json = serde_json::from_slice(&body).unwrap();
    assert_eq!(v["cargoSeekingTransport"][0]["id"], 5);
    assert_eq!(v["transportSeekingCargo"].as_array().unwrap().len(), 0);

    let (_, body) = send(&app, Request::get("/stats").body(Body::empty()).unwrap()).await;
    let stats: Json = serde_json::from_slice(&body).unwrap();
    assert_eq!(stats["cargoSeekingTransport"], 1);
    assert_eq!(stats["quarantined"], 1);
    assert_eq!(stats["persistence"]["failed_writes"], 0);

    let del = |uri: &str| {
        Request::builder()
            .method(Method::DELETE)
            .uri(uri)
            .body(Body::empty())
            .unwrap()
    };
    let (status, _) = send(&app, del("/records/transport-seeking-cargo/5")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = send(&app, del("/records/bogus/5")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let (status, _) = send(&app, del("/records/cargo-seeking-transport/5")).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    send(&app, post_json("/ingest", json!("Mesaj Tipi: CARGO_SEEKING_TRANSPORT"))).await;
    let (status, _) = send(
        &app,
        Request::builder().method(Method::POST).uri("/reset").body(Body::empty()).unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (_, body) = send(&app, Request::get("/records").body(Body::empty()).unwrap()).await;
    let v: Json = serde_json::from_slice(&body).unwrap();
    assert_eq!(v["cargoSeekingTransport"].as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn channel_routes_without_live_feed_are_not_found() {
    let (app, _) = mock_app();
    let (status, _) = send(&app, Request::get("/channel").body(Body::empty()).unwrap()).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = send(
        &app,
        Request::builder()
            .method(Method::POST)
            .uri("/channel/reconnect")
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn channel_status_and_manual_reconnect() {
    let store = Arc::new(RecordStore::in_memory());
    let ingestor = Arc::new(Ingestor::new(Arc::clone(&store)));
    let (connector, _peers) = MemoryConnector::new([]);
    let cfg = ChannelConfig {
        max_retries: Some(0),
        ..Default::default()
    };
    let handle = ChannelManager::new(Arc::new(connector), Arc::clone(&ingestor), &cfg).spawn();
    let mut rx = handle.subscribe();
    rx.wait_for(|s| s.status == ConnectionStatus::Failed).await.unwrap();

    let app = router(AppState {
        ingestor,
        classifier: Arc::new(MockClassifier::default()),
        channel: Some(handle.control()),
    });

    let (status, body) = send(&app, Request::get("/channel").body(Body::empty()).unwrap()).await;
    assert_eq!(status, StatusCode::OK);
    let v: Json = serde_json::from_slice(&body).unwrap();
    assert_eq!(v["status"], "FAILED");
    assert_eq!(v["endpoint"], "memory");

    let (status, _) = send(
        &app,
        Request::builder()
            .method(Method::POST)
            .uri("/channel/reconnect")
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);

    handle.shutdown().await;
}

#[tokio::test]
async fn reconnect_while_connected_is_a_conflict() {
    let store = Arc::new(RecordStore::in_memory());
    let ingestor = Arc::new(Ingestor::new(Arc::clone(&store)));
    let (connector, mut peers) = MemoryConnector::new([true]);
    let handle = ChannelManager::new(Arc::new(connector.clone()), Arc::clone(&ingestor), &ChannelConfig::default()).spawn();
    let _peer = peers.recv().await.unwrap();
    let mut rx = handle.subscribe();
    rx.wait_for(|s| s.status == ConnectionStatus::Connected).await.unwrap();

    let app = router(AppState {
        ingestor,
        classifier: Arc::new(MockClassifier::default()),
        channel: Some(handle.control()),
    });

    let (status, body) = send(
        &app,
        Request::builder()
            .method(Method::POST)
            .uri("/channel/reconnect")
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    let v: Json = serde_json::from_slice(&body).unwrap();
    assert_eq!(v["error"], "live feed is already CONNECTED");
    assert_eq!(connector.attempts(), 1);
    assert_eq!(handle.snapshot().status, ConnectionStatus::Connected);

    handle.shutdown().await;
}
