//! Heartbeat gating by connection state

mod helpers;

use erfx_common::config::{HeartbeatConfig, MqttConfig};
use erfx_ingest::connection::ConnectionManager;
use erfx_ingest::coordinator::DedupCoordinator;
use erfx_ingest::dispatch::Dispatcher;
use helpers::{FakeTransport, MemoryGateway, RecordingBroadcaster};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;

const INTERVAL_MS: u64 = 30_000;

fn manager(transport: &FakeTransport, heartbeat: HeartbeatConfig) -> Arc<ConnectionManager> {
    let broadcaster = Arc::new(RecordingBroadcaster::new());
    let dispatcher = Arc::new(Dispatcher::new(
        Arc::new(DedupCoordinator::new(Arc::new(MemoryGateway::new()))),
        broadcaster.clone(),
    ));
    ConnectionManager::new(
        MqttConfig::default(),
        heartbeat,
        Arc::new(transport.clone()),
        dispatcher,
        broadcaster,
    )
}

/// First tick one full interval after connecting
fn interval_only() -> HeartbeatConfig {
    HeartbeatConfig {
        interval_ms: INTERVAL_MS,
        initial_delay_ms: INTERVAL_MS,
        ..Default::default()
    }
}

#[tokio::test(start_paused = true)]
async fn test_one_heartbeat_per_interval_after_reconnect_and_none_while_down() {
    let transport = FakeTransport::new();
    let manager = manager(&transport, interval_only());
    manager.start().await.unwrap();

    sleep(Duration::from_millis(29_900)).await;
    assert_eq!(transport.publish_count(), 0);
    sleep(Duration::from_millis(200)).await; // t = 30.1s
    assert_eq!(transport.publish_count(), 1);

    // Broker goes away and stays away; reconnect attempts at 35.1s .. 90.1s fail
    transport.set_failing(true);
    transport.drop_session();
    sleep(Duration::from_millis(62_000)).await; // t = 92.1s
    assert!(!manager.is_connected());
    assert_eq!(transport.publish_count(), 1);

    // Reconnect at 95.1s; next heartbeat due at 125.1s
    transport.set_failing(false);
    sleep(Duration::from_millis(32_900)).await; // t = 125.0s
    assert!(manager.is_connected());
    assert_eq!(transport.publish_count(), 1);
    sleep(Duration::from_millis(200)).await; // t = 125.2s
    assert_eq!(transport.publish_count(), 2);

    manager.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_heartbeat_payload_and_topic() {
    let transport = FakeTransport::new();
    let manager = manager(&transport, HeartbeatConfig::default());
    manager.start().await.unwrap();

    // Default schedule: first tick 1s after connect
    sleep(Duration::from_millis(1_100)).await;
    let publishes = transport.publishes();
    assert_eq!(publishes.len(), 1);

    let (topic, body) = &publishes[0];
    assert_eq!(topic, "erfx/webserver/status");
    let json: serde_json::Value = serde_json::from_slice(body).unwrap();
    assert_eq!(json["source"], "WebServer");
    assert_eq!(json["type"], "webserver_status");
    assert_eq!(json["payload"]["running"], true);
    assert_eq!(json["payload"]["connected"], true);
    assert_eq!(json["payload"]["version"], "1.0");
    assert!(json["payload"]["uptime"].as_f64().unwrap() >= 1.0);

    manager.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_no_heartbeat_after_stop() {
    let transport = FakeTransport::new();
    let manager = manager(&transport, HeartbeatConfig::default());
    manager.start().await.unwrap();
    sleep(Duration::from_millis(1_100)).await;
    assert_eq!(transport.publish_count(), 1);

    manager.stop().await;
    sleep(Duration::from_secs(300)).await;
    assert_eq!(transport.publish_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_disabled_heartbeat_never_publishes() {
    let transport = FakeTransport::new();
    let manager = manager(
        &transport,
        HeartbeatConfig {
            enabled: false,
            ..Default::default()
        },
    );
    manager.start().await.unwrap();

    sleep(Duration::from_secs(120)).await;
    assert!(manager.is_connected());
    assert_eq!(transport.publish_count(), 0);

    manager.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_never_connected_means_no_heartbeat() {
    let transport = FakeTransport::failing();
    let manager = manager(&transport, HeartbeatConfig::default());
    manager.start().await.unwrap();

    sleep(Duration::from_secs(120)).await;
    assert_eq!(transport.publish_count(), 0);

    manager.stop().await;
}
