use std::time::Duration;

use lib_common::engine::PresentationState;
use project_tests::{next_of_kind, send_json, send_raw, TestServer};
use serde_json::json;

const QUIET: Duration = Duration::from_secs(3600);

#[tokio::test]
async fn next_is_pushed_to_every_client() {
    let server = TestServer::start(PresentationState::new(2, 9), QUIET).await;
    let mut a = server.connect("a").await;
    let mut b = server.connect("b").await;

    for client in [&mut a, &mut b] {
        let handshake = next_of_kind(client, "handshake").await;
        assert_eq!(handshake["state"], json!({"index": 2, "max": 9}));
    }

    send_json(&mut a, json!({"kind": "next"})).await;

    for client in [&mut a, &mut b] {
        let push = next_of_kind(client, "push").await;
        assert_eq!(push["state"], json!({"index": 3, "max": 9}));
    }
    assert_eq!(server.cell.read(), PresentationState::new(3, 9));

    server.shutdown().await;
}

#[tokio::test]
async fn unmatched_event_gets_reply_without_broadcast() {
    let server = TestServer::start(PresentationState::new(2, 9), QUIET).await;
    let mut a = server.connect("a").await;
    let mut b = server.connect("b").await;
    next_of_kind(&mut a, "handshake").await;
    next_of_kind(&mut b, "handshake").await;

    send_json(&mut a, json!({"kind": "foo", "payload": {"x": 1}, "cbId": 7})).await;
    let reply = next_of_kind(&mut a, "reply").await;
    assert_eq!(reply["cbId"], 7);
    assert_eq!(reply["payload"], json!({"unmatchedEvent": "foo"}));
    assert_eq!(server.cell.read(), PresentationState::new(2, 9));

    // Any push caused by `foo` would have been queued for `b` ahead of this one.
    send_json(&mut b, json!({"kind": "prev"})).await;
    let push = next_of_kind(&mut b, "push").await;
    assert_eq!(push["state"], json!({"index": 1, "max": 9}));

    server.shutdown().await;
}

#[tokio::test]
async fn malformed_frames_are_dropped() {
    let server = TestServer::start(PresentationState::new(0, 4), QUIET).await;
    let mut a = server.connect("a").await;
    next_of_kind(&mut a, "handshake").await;

    send_raw(&mut a, "definitely not json").await;
    send_json(&mut a, json!({"kind": "ping", "cbId": 1})).await;
    send_json(&mut a, json!({"kind": "next"})).await;

    let push = next_of_kind(&mut a, "push").await;
    assert_eq!(push["state"], json!({"index": 1, "max": 4}));

    server.shutdown().await;
}

#[tokio::test]
async fn heartbeat_resyncs_with_increasing_terms() {
    let server = TestServer::start(PresentationState::new(5, 9), Duration::from_millis(50)).await;
    let mut a = server.connect("a").await;
    next_of_kind(&mut a, "handshake").await;

    let first = next_of_kind(&mut a, "sync").await;
    let second = next_of_kind(&mut a, "sync").await;
    assert_eq!(first["state"], json!({"index": 5, "max": 9}));
    assert!(second["term"].as_u64() > first["term"].as_u64());

    server.shutdown().await;
}

#[tokio::test]
async fn closing_a_socket_deregisters_the_client() {
    let server = TestServer::start(PresentationState::new(0, 0), QUIET).await;
    let mut a = server.connect("a").await;
    let _b = server.connect("b").await;
    server.wait_for_clients(2).await;

    a.close(None).await.expect("close sent");
    server.wait_for_clients(1).await;
    assert!(server.gateway.is_connected("b"));
    assert!(!server.gateway.is_connected("a"));

    server.shutdown().await;
}

#[tokio::test]
async fn http_routes_report_health_and_state() {
    let server = TestServer::start(PresentationState::new(3, 7), QUIET).await;

    let health = reqwest::get(server.http_url("/health")).await.unwrap();
    assert!(health.status().is_success());
    assert_eq!(health.text().await.unwrap(), "OK");

    let state: serde_json::Value = reqwest::get(server.http_url("/state"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(state, json!({"index": 3, "max": 7}));

    server.shutdown().await;
}
