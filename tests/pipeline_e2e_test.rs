//! End-to-end tests: trigger calls through the boundary, queue, pool and
//! signed sessions to a mock pub/sub service.

#![allow(clippy::expect_used)]
#![allow(clippy::unwrap_used)]

use std::{sync::Arc, time::Duration};

use pubrelay_api::{dispatch_call, Config, TriggerCall};
use pubrelay_core::RealClock;
use pubrelay_delivery::RelayService;
use pubrelay_testing::{
    fixtures::{PUBLISH_KEY, SECRET_KEY, SUBSCRIBE_KEY},
    init_test_tracing, MockPubSub,
};

fn config_for(mock: &MockPubSub) -> Config {
    Config {
        publish_key: PUBLISH_KEY.to_string(),
        subscribe_key: SUBSCRIBE_KEY.to_string(),
        secret_key: SECRET_KEY.to_string(),
        origin: mock.uri(),
        session_pool_size: 3,
        drain_interval_ms: 10,
        retry_backoff_ms: 10,
        ..Config::default()
    }
}

fn service_for(config: &Config) -> RelayService {
    RelayService::with_agents(
        config.to_delivery_config(),
        config.to_agent_config(),
        Arc::new(RealClock::new()),
    )
    .expect("service should start")
}

fn call(line: &str) -> TriggerCall {
    serde_json::from_str(line).expect("valid trigger call")
}

#[tokio::test]
async fn trigger_calls_reach_remote_service() {
    init_test_tracing();
    let mock = MockPubSub::start().await;
    mock.accept_publishes().await;
    mock.accept_grants().await;
    let mut service = service_for(&config_for(&mock));
    service.start();

    dispatch_call(&service, &call(r#"{"call":"publish","args":["orders","{\"id\":7}","h"]}"#))
        .unwrap();
    dispatch_call(&service, &call(r#"{"call":"grant","args":["orders","token","rw","60"]}"#))
        .unwrap();
    dispatch_call(&service, &call(r#"{"call":"revoke","args":["orders","token"]}"#)).unwrap();
    assert!(dispatch_call(&service, &call(r#"{"call":"publish","args":["bad name","{}"]}"#))
        .is_err());

    service.flush().await;
    let stats = service.stats();
    service.shutdown_graceful(Duration::from_secs(5)).await.unwrap();

    assert_eq!(stats.delivered, 3);
    let publishes = mock.calls_to("/publish/").await;
    assert_eq!(publishes.len(), 1);
    assert!(publishes[0].path.contains("/orders/0/"));
    assert_eq!(publishes[0].param("timestamp").map(str::len), Some(10));

    let grants = mock.calls_to("/v1/auth/grant/").await;
    assert_eq!(grants.len(), 2);
    assert!(grants.iter().any(|g| g.query.contains("&r=1&") && g.query.contains("&ttl=60&")));
    assert!(grants.iter().any(|g| g.query.contains("&r=0&") && !g.query.contains("ttl=")));
}

#[tokio::test]
async fn rejected_publish_is_sent_once() {
    let mock = MockPubSub::start().await;
    mock.reject_publishes(403, "Forbidden").await;
    let service = service_for(&config_for(&mock));

    dispatch_call(&service, &call(r#"{"call":"publish","args":["locked","{}"]}"#)).unwrap();
    service.flush().await;

    let stats = service.stats();
    assert_eq!(stats.rejected, 1);
    assert_eq!(stats.retries, 0);
    assert_eq!(mock.calls_to("/publish/").await.len(), 1);

    service.shutdown_graceful(Duration::from_secs(5)).await.unwrap();
}

#[tokio::test]
async fn publish_service_error_is_not_retried() {
    let mock = MockPubSub::start().await;
    mock.reject_publishes(400, "Invalid Key").await;
    let service = service_for(&config_for(&mock));

    dispatch_call(&service, &call(r#"{"call":"publish","args":["chat","{}"]}"#)).unwrap();
    service.flush().await;

    let stats = service.stats();
    assert_eq!(stats.unaccepted, 1);
    assert_eq!(stats.retries, 0);
    assert_eq!(mock.calls_to("/publish/").await.len(), 1);

    service.shutdown_graceful(Duration::from_secs(5)).await.unwrap();
}

#[tokio::test]
async fn undecodable_publish_answer_is_retried() {
    let mock = MockPubSub::start().await;
    mock.fail_publishes_times(502, 2).await;
    mock.accept_publishes().await;
    let service = service_for(&config_for(&mock));

    dispatch_call(&service, &call(r#"{"call":"publish","args":["chat","{}"]}"#)).unwrap();
    service.flush().await;

    let stats = service.stats();
    assert_eq!(stats.delivered, 1);
    assert_eq!(stats.retries, 2);
    assert_eq!(mock.calls_to("/publish/").await.len(), 3);

    service.shutdown_graceful(Duration::from_secs(5)).await.unwrap();
}

#[tokio::test]
async fn failing_grant_is_retried_until_accepted() {
    let mock = MockPubSub::start().await;
    mock.fail_grants_times(403, 2).await;
    mock.accept_grants().await;
    let service = service_for(&config_for(&mock));

    dispatch_call(&service, &call(r#"{"call":"grant","args":["chat","token","r","5"]}"#)).unwrap();
    service.flush().await;

    let stats = service.stats();
    assert_eq!(stats.delivered, 1);
    assert_eq!(stats.retries, 2);
    assert_eq!(mock.calls_to("/v1/auth/grant/").await.len(), 3);

    service.shutdown_graceful(Duration::from_secs(5)).await.unwrap();
}

#[tokio::test]
async fn shutdown_delivers_calls_accepted_before_it() {
    let mock = MockPubSub::start().await;
    mock.accept_publishes().await;
    let config = Config { drain_interval_ms: 60_000, ..config_for(&mock) };
    let mut service = service_for(&config);
    service.start();

    for n in 0..4 {
        let line = format!(r#"{{"call":"publish","args":["feed","{{\"n\":{n}}}"]}}"#);
        dispatch_call(&service, &call(&line)).unwrap();
    }
    let stats = service.shutdown_graceful(Duration::from_secs(5)).await.unwrap();

    assert_eq!(stats.delivered, 4);
    assert_eq!(mock.calls_to("/publish/").await.len(), 4);
}
