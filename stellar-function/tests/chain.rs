use std::collections::BTreeMap;
use std::time::Duration;

use reqwest::StatusCode;
use stellar_api::proto::InvokeChainRequest;
use stellar_api::proto::producer_consumer_client::ProducerConsumerClient;
use stellar_api::response::{InvokePayload, InvokeReply};
use stellar_api::{ProducerConsumerResponse, TimestampChain, wire};
use stellar_function::storage::InMemoryStore;
use stellar_function::chain::ChainRequest;
use stellar_function::hop::{HopError, HttpHop, NextHop};
use stellar_test::function::TestFunction;
use stellar_test::mock::MockEndpoint;

async fn invoke_http(function: &TestFunction, query: &[(&str, &str)]) -> reqwest::Response {
    reqwest::Client::new()
        .get(function.url("/"))
        .query(query)
        .send()
        .await
        .unwrap()
}

fn assert_chain_ordered(chain: &[String]) {
    let chain = TimestampChain::from_strings(chain).unwrap();
    assert!(chain.as_millis().windows(2).all(|pair| pair[0] <= pair[1]));
}

#[tokio::test]
async fn health() {
    stellar_test::tracing::init();
    let function = TestFunction::new().await;

    let response = reqwest::get(function.url("/health")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.text().await.unwrap(), "OK");
}

#[tokio::test]
async fn first_hop_returns_one_timestamp() {
    stellar_test::tracing::init();
    let function = TestFunction::new().await;

    let response = reqwest::Client::new()
        .get(function.url("/benchmark"))
        .header("x-request-id", "req-1")
        .query(&[
            ("IncrementLimit", "1000"),
            ("PayloadLengthBytes", "64"),
            ("DataTransferChainIDs", "[]"),
        ])
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body: ProducerConsumerResponse = response.json().await.unwrap();
    assert_eq!(body.request_id, "req-1");
    assert_eq!(body.timestamp_chain.len(), 1);
}

#[tokio::test]
async fn relay_hop_appends_to_chain() {
    stellar_test::tracing::init();
    let function = TestFunction::new().await;

    let response = invoke_http(
        &function,
        &[
            ("IncrementLimit", "0"),
            ("DataTransferChainIDs", "[]"),
            ("TimestampChain", "[1 2 3]"),
            ("TransferPayload", "abc"),
        ],
    )
    .await;

    let body: ProducerConsumerResponse = response.json().await.unwrap();
    assert_eq!(body.timestamp_chain.len(), 4);
    assert_eq!(body.timestamp_chain[..3], ["1", "2", "3"]);
    assert!(!body.request_id.is_empty());
}

#[tokio::test]
async fn chained_http_hops() {
    stellar_test::tracing::init();
    let first = TestFunction::new().await;
    let second = TestFunction::new().await;
    let third = TestFunction::new().await;

    let chain_ids = wire::encode_list([second.http_id(), third.http_id()]);
    let response = invoke_http(
        &first,
        &[
            ("IncrementLimit", "100"),
            ("PayloadLengthBytes", "2048"),
            ("DataTransferChainIDs", chain_ids.as_str()),
        ],
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);

    let body: ProducerConsumerResponse = response.json().await.unwrap();
    assert_eq!(body.timestamp_chain.len(), 3);
    assert_chain_ordered(&body.timestamp_chain);
}

#[tokio::test]
async fn chained_hops_relay_through_storage() {
    stellar_test::tracing::init();
    let store = InMemoryStore::new();
    let first = TestFunction::with_store(store.clone()).await;
    let second = TestFunction::with_store(store.clone()).await;

    let chain_ids = wire::encode_list([second.http_id()]);
    let response = invoke_http(
        &first,
        &[
            ("IncrementLimit", "0"),
            ("PayloadLengthBytes", "512"),
            ("DataTransferChainIDs", chain_ids.as_str()),
            ("Bucket", "payloads"),
            ("StorageTransfer", "true"),
        ],
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);

    let body: ProducerConsumerResponse = response.json().await.unwrap();
    assert_eq!(body.timestamp_chain.len(), 2);

    // Only the first hop stores, the last hop has nobody to relay to.
    let keys = store.keys("payloads");
    assert_eq!(keys.len(), 1);
    assert!(keys[0].starts_with("transfer-payload-512bytes-"));
}

#[tokio::test]
async fn failing_next_hop_fails_chain() {
    stellar_test::tracing::init();
    let function = TestFunction::new().await;

    let response = invoke_http(
        &function,
        &[
            ("IncrementLimit", "0"),
            ("PayloadLengthBytes", "0"),
            ("DataTransferChainIDs", "[http://127.0.0.1:1/]"),
        ],
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
}

#[tokio::test]
async fn next_hop_redirect_is_an_error() {
    stellar_test::tracing::init();
    let endpoint = MockEndpoint::with_statuses(vec![StatusCode::FOUND]).await;

    let hop = HttpHop::new(Duration::from_secs(10)).unwrap();
    let result = hop.invoke(&endpoint.url(), &ChainRequest::default()).await;

    assert!(matches!(result, Err(HopError::Status(status)) if status == StatusCode::FOUND));
    assert_eq!(endpoint.requests(), 1);
}

#[tokio::test]
async fn rejects_missing_parameters() {
    stellar_test::tracing::init();
    let function = TestFunction::new().await;

    let response = invoke_http(&function, &[("PayloadLengthBytes", "10")]).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn lambda_envelope() {
    stellar_test::tracing::init();
    let function = TestFunction::new().await;

    let payload = InvokePayload {
        query_string_parameters: BTreeMap::from([
            ("IncrementLimit".to_owned(), "10".to_owned()),
            ("DataTransferChainIDs".to_owned(), "[]".to_owned()),
            ("TimestampChain".to_owned(), "[5]".to_owned()),
        ]),
    };

    let reply: InvokeReply = reqwest::Client::new()
        .post(function.url("/invoke"))
        .json(&payload)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(reply.status_code, 200);

    let body: ProducerConsumerResponse = serde_json::from_str(&reply.body).unwrap();
    assert_eq!(body.timestamp_chain.len(), 2);
    assert_eq!(body.timestamp_chain[0], "5");
}

#[tokio::test]
async fn lambda_envelope_reports_errors() {
    stellar_test::tracing::init();
    let function = TestFunction::new().await;

    let reply: InvokeReply = reqwest::Client::new()
        .post(function.url("/invoke"))
        .json(&InvokePayload::default())
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert_eq!(reply.status_code, 400);
    assert!(reply.body.contains("IncrementLimit"));
}

#[tokio::test]
async fn chained_grpc_hops() {
    stellar_test::tracing::init();
    let first = TestFunction::new().await;
    let second = TestFunction::new().await;

    let mut client = ProducerConsumerClient::connect(format!("http://{}", first.grpc_id()))
        .await
        .unwrap();
    let reply = client
        .invoke_next(InvokeChainRequest {
            increment_limit: "100".into(),
            data_transfer_chain_ids: wire::encode_list([second.grpc_id()]),
            payload_length_bytes: "128".into(),
            ..Default::default()
        })
        .await
        .unwrap();

    let chain = TimestampChain::decode(&reply.into_inner().timestamp_chain).unwrap();
    assert_eq!(chain.len(), 2);
}

#[tokio::test]
async fn grpc_rejects_invalid_request() {
    stellar_test::tracing::init();
    let function = TestFunction::new().await;

    let mut client = ProducerConsumerClient::connect(format!("http://{}", function.grpc_id()))
        .await
        .unwrap();
    let status = client
        .invoke_next(InvokeChainRequest {
            increment_limit: "lots".into(),
            ..Default::default()
        })
        .await
        .unwrap_err();

    assert_eq!(status.code(), tonic::Code::InvalidArgument);
}
