/*
[INPUT]:  Mock HTTP responses
[OUTPUT]: Test results for the REST snapshot collaborator
[POS]:    Integration tests - HTTP snapshot endpoints
[UPDATE]: When snapshot requests, signing or status mapping change
*/

mod common;

use common::{setup_mock_server, test_credentials};
use serde_json::json;
use tokio_test::assert_ok;
use wirebook_adapter::ws::Payload;
use wirebook_adapter::{
    ChannelKind, ClientConfig, ExchangeErrorKind, GenericVenue, RestClient, SnapshotFetcher,
    SnapshotRequest, Venue, WirebookError,
};
use wiremock::matchers::{header, header_exists, method, path, query_param};
use wiremock::{Mock, ResponseTemplate};

#[test]
fn test_client_creation() {
    let _client = assert_ok!(RestClient::new("https://api.example.com"));
    let _client = assert_ok!(RestClient::with_config(
        "https://api.example.com",
        ClientConfig::default()
    ));
    assert!(RestClient::new("not a url").is_err());
}

#[test]
fn test_client_credentials_roundtrip() {
    let mut client = assert_ok!(RestClient::new("https://api.example.com"));
    assert!(client.credentials().is_none());
    client.set_credentials(test_credentials());
    let stored = client.credentials().expect("credentials should be set");
    assert_eq!(stored.api_key, "test-key");
}

#[tokio::test]
async fn test_signed_fetch_sends_hmac_headers_and_query() {
    let server = setup_mock_server().await;
    Mock::given(method("GET"))
        .and(path("/v1/account/balance"))
        .and(query_param("currency", "USDT"))
        .and(header("X-API-KEY", "test-key"))
        .and(header_exists("X-TIMESTAMP"))
        .and(header_exists("X-SIGNATURE"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [{"currency": "USDT", "free": "10", "total": "12"}],
            "ts": 42,
        })))
        .expect(1)
        .mount(&server)
        .await;

    let mut client = assert_ok!(RestClient::new(&server.uri()));
    client.set_credentials(test_credentials());
    let request = SnapshotRequest::signed("/v1/account/balance")
        .with_params(json!({"currency": "USDT", "cursor": null}));
    let value = assert_ok!(client.fetch(&request).await);

    let payload = assert_ok!(GenericVenue::default().parse_bootstrap(ChannelKind::Balance, value));
    match payload {
        Payload::Balance(balances) => {
            assert_eq!(balances.timestamp, Some(42));
            assert!(balances.get("USDT").is_some());
        }
        other => panic!("unexpected payload {other:?}"),
    }
}

#[tokio::test]
async fn test_signed_fetch_without_credentials_never_sends() {
    let server = setup_mock_server().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let client = assert_ok!(RestClient::new(&server.uri()));
    let err = client
        .fetch(&SnapshotRequest::signed("/v1/account/positions"))
        .await
        .unwrap_err();
    assert!(err.is_auth_error());
}

#[tokio::test]
async fn test_public_fetch_returns_raw_json() {
    let server = setup_mock_server().await;
    Mock::given(method("GET"))
        .and(path("/v1/markets"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "ok"})))
        .mount(&server)
        .await;

    let client = assert_ok!(RestClient::new(&server.uri()));
    let value = assert_ok!(client.fetch(&SnapshotRequest::public("/v1/markets")).await);
    assert_eq!(value["status"], "ok");
}

#[tokio::test]
async fn test_rate_limit_maps_to_exchange_error() {
    let server = setup_mock_server().await;
    Mock::given(method("GET"))
        .and(path("/v1/markets"))
        .respond_with(
            ResponseTemplate::new(429).set_body_json(json!({"code": 42900, "msg": "too many requests"})),
        )
        .mount(&server)
        .await;

    let client = assert_ok!(RestClient::new(&server.uri()));
    let err = client
        .fetch(&SnapshotRequest::public("/v1/markets"))
        .await
        .unwrap_err();
    match &err {
        WirebookError::Exchange { kind, message, .. } => {
            assert_eq!(*kind, ExchangeErrorKind::RateLimitExceeded);
            assert!(message.contains("too many requests"));
        }
        other => panic!("unexpected error {other:?}"),
    }
    assert_eq!(err.retry_delay(), Some(5));
}

#[tokio::test]
async fn test_unauthorized_maps_to_authentication_error() {
    let server = setup_mock_server().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(401).set_body_string("invalid api key"))
        .mount(&server)
        .await;

    let mut client = assert_ok!(RestClient::new(&server.uri()));
    client.set_credentials(test_credentials());
    let err = client
        .fetch(&SnapshotRequest::signed("/v1/account/balance"))
        .await
        .unwrap_err();
    assert_eq!(err, WirebookError::authentication("invalid api key"));
}

#[tokio::test]
async fn test_server_error_is_retryable() {
    let server = setup_mock_server().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let client = assert_ok!(RestClient::new(&server.uri()));
    let err = client
        .fetch(&SnapshotRequest::public("/v1/markets"))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        WirebookError::Exchange {
            kind: ExchangeErrorKind::ExchangeNotAvailable,
            ..
        }
    ));
    assert!(err.is_retryable());
}
