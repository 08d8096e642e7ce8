//! HTTP Backend Integration Tests
//!
//! Runs the `reqwest` backend against a `wiremock` server to check request
//! shape, error mapping, and the scheduler-control round trip.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use serde_json::{Value, json};
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use dashboard_sync::{
    CacheKey, ChannelNotificationSink, ControlError, EngineConfig, Endpoint, FetchError,
    Fetcher, HttpBackend, NotificationKind, RemoteActions, SchedulerAction, SchedulerControl,
    SchedulerStatus, SyncEngine, Widget,
};

fn backend(server: &MockServer) -> HttpBackend {
    HttpBackend::with_client(reqwest::Client::new(), &format!("{}/", server.uri()))
}

async fn fetch(backend: &HttpBackend, key: &CacheKey) -> Result<Value, FetchError> {
    Fetcher::<Value>::fetch(backend, key).await
}

// =============================================================================
// Fetching
// =============================================================================

#[tokio::test]
async fn key_parameters_become_query_parameters() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/balance/order-resv-list"))
        .and(query_param("ovrs_excg_cd", "NASD"))
        .and(query_param("inqr_strt_dt", "20240311"))
        .and(query_param("inqr_end_dt", "20240311"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"pdno": "AAPL"}])))
        .expect(1)
        .mount(&server)
        .await;

    let today = NaiveDate::from_ymd_opt(2024, 3, 11).unwrap();
    let key = Widget::ReservedOrders.key("NASD", today);
    let value = fetch(&backend(&server), &key).await.unwrap();

    assert_eq!(value, json!([{"pdno": "AAPL"}]));
}

#[tokio::test]
async fn detail_field_becomes_the_error_message() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/balance/overseas"))
        .respond_with(
            ResponseTemplate::new(500).set_body_json(json!({"detail": "KIS token expired"})),
        )
        .mount(&server)
        .await;

    let error = fetch(&backend(&server), &Endpoint::OverseasBalance.key())
        .await
        .unwrap_err();

    assert_eq!(
        error,
        FetchError::Protocol {
            status: 500,
            message: "KIS token expired".into(),
        }
    );
}

#[tokio::test]
async fn message_field_is_used_without_detail() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/balance/deposit"))
        .respond_with(
            ResponseTemplate::new(409).set_body_json(json!({"message": "market closed"})),
        )
        .mount(&server)
        .await;

    let error = fetch(&backend(&server), &Endpoint::Deposit.key())
        .await
        .unwrap_err();

    assert_eq!(error.message(), "market closed");
}

#[tokio::test]
async fn status_reason_is_used_for_an_empty_error_body() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/balance/deposit"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let error = fetch(&backend(&server), &Endpoint::Deposit.key())
        .await
        .unwrap_err();

    assert_eq!(
        error,
        FetchError::Protocol {
            status: 503,
            message: "Service Unavailable".into(),
        }
    );
}

#[tokio::test]
async fn malformed_body_is_a_decode_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/stocks/recommendations/scheduler/status"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>"))
        .mount(&server)
        .await;

    let error = fetch(&backend(&server), &Endpoint::SchedulerStatus.key())
        .await
        .unwrap_err();

    assert!(matches!(error, FetchError::Decode(_)));
}

#[tokio::test]
async fn unreachable_backend_is_a_transport_error() {
    let port = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };
    let backend = HttpBackend::with_client(reqwest::Client::new(), &format!("http://127.0.0.1:{port}"));

    let error = fetch(&backend, &Endpoint::Deposit.key()).await.unwrap_err();

    assert!(matches!(error, FetchError::Transport(_)));
}

// =============================================================================
// Actions
// =============================================================================

#[tokio::test]
async fn actions_post_to_their_paths() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/stocks/recommendations/sell/scheduler/stop"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "stopped"})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/stocks/recommendations/purchase/trigger"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let backend = backend(&server);
    backend.perform(SchedulerAction::StopSell).await.unwrap();
    backend.perform(SchedulerAction::BuyNow).await.unwrap();
}

#[tokio::test]
async fn scheduler_start_refreshes_status_and_notifies() {
    let server = MockServer::start().await;
    let status_path = Endpoint::SchedulerStatus.path();
    Mock::given(method("GET"))
        .and(path(status_path))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "buy_running": false,
            "sell_running": false,
        })))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(status_path))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "buy_running": true,
            "sell_running": false,
            "buy_next_run_time": "2024-03-11T09:30:00",
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/stocks/recommendations/purchase/scheduler/start"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(1)
        .mount(&server)
        .await;

    let http = Arc::new(backend(&server));
    let engine = SyncEngine::<Value>::new(http.clone(), EngineConfig::default());
    let status_key = Endpoint::SchedulerStatus.key();
    let resource = engine.use_cached_resource(status_key.clone(), Duration::from_secs(60));
    engine.revalidate(&status_key).await.unwrap();

    let (sink, mut notifications) = ChannelNotificationSink::new();
    let control = SchedulerControl::new(engine, http, Arc::new(sink), status_key);
    control.run(SchedulerAction::StartBuy).await.unwrap();

    let status = SchedulerStatus::from_value(&resource.state().value.unwrap()).unwrap();
    assert!(status.buy_running);
    assert!(status.already_applied(SchedulerAction::StartBuy));

    let notification = notifications.recv().await.unwrap();
    assert_eq!(notification.kind, NotificationKind::Success);
    assert_eq!(notification.text, SchedulerAction::StartBuy.success_message());
}

#[tokio::test]
async fn failed_action_surfaces_the_backend_message() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/stocks/recommendations/sell/trigger"))
        .respond_with(
            ResponseTemplate::new(400).set_body_json(json!({"detail": "no sell candidates"})),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(Endpoint::SchedulerStatus.path()))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .mount(&server)
        .await;

    let http = Arc::new(backend(&server));
    let engine = SyncEngine::<Value>::new(http.clone(), EngineConfig::default());
    let (sink, mut notifications) = ChannelNotificationSink::new();
    let control = SchedulerControl::new(
        engine,
        http,
        Arc::new(sink),
        Endpoint::SchedulerStatus.key(),
    );

    let error = control.run(SchedulerAction::SellNow).await.unwrap_err();
    assert_eq!(
        error,
        ControlError::Action(FetchError::Protocol {
            status: 400,
            message: "no sell candidates".into(),
        })
    );

    let notification = notifications.recv().await.unwrap();
    assert_eq!(notification.kind, NotificationKind::Error);
    assert_eq!(notification.detail.as_deref(), Some("no sell candidates"));
}
