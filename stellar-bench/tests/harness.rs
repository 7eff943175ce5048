use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use reqwest::StatusCode;
use stellar_bench::dispatcher::{Dispatch, GrpcDispatcher, HttpDispatcher};
use stellar_bench::experiment::{EndpointInfo, IatType, Provider, SubExperiment};
use stellar_bench::recorder::{DATA_TRANSFERS_FILE, LATENCIES_FILE};
use stellar_bench::run::{directory_name, run_sub_experiment};
use stellar_bench::scheduler::ScheduleError;
use stellar_test::function::TestFunction;
use stellar_test::mock::MockEndpoint;

fn provider() -> Provider {
    Provider::External("localhost".into())
}

fn http_dispatcher() -> Arc<dyn Dispatch> {
    Arc::new(
        HttpDispatcher::new(provider(), "us-west-1", None, "bucket", Duration::from_secs(10))
            .unwrap(),
    )
}

fn experiment(endpoint: EndpointInfo, bursts: usize, burst_size: usize) -> SubExperiment {
    SubExperiment {
        id: 0,
        title: "it".into(),
        bursts,
        burst_sizes: vec![burst_size],
        payload_length_bytes: 0,
        iat_seconds: 0.0,
        iat_type: IatType::Deterministic,
        iat_step_start_seconds: None,
        busy_spin_increments: vec![10],
        data_transfer_chain_length: 1,
        storage_transfer: false,
        endpoints: vec![endpoint],
        routes: Vec::new(),
    }
}

fn read_rows(path: &Path) -> Vec<csv::StringRecord> {
    csv::ReaderBuilder::new()
        .flexible(true)
        .from_path(path)
        .unwrap()
        .records()
        .map(Result::unwrap)
        .collect()
}

#[tokio::test]
async fn records_every_successful_request() {
    stellar_test::tracing::init();
    let endpoint = MockEndpoint::new().await;
    let output = tempfile::tempdir().unwrap();

    let experiment = experiment(EndpointInfo::new(endpoint.url()), 4, 3);
    let directory = output.path().join(directory_name(&experiment));

    let summary = run_sub_experiment(experiment, &provider(), output.path(), http_dispatcher())
        .await
        .unwrap();

    assert_eq!(summary.requests, 12);
    assert_eq!(summary.failures, 0);
    assert_eq!(endpoint.requests(), 12);

    let rows = read_rows(&directory.join(LATENCIES_FILE));
    assert_eq!(rows.len(), 12);
    for row in &rows {
        assert!(row[0].starts_with("mock-"));
        assert_eq!(&row[1], "127.0.0.1");
        assert!(row[4].parse::<i64>().unwrap() >= 0);
    }

    assert!(!directory.join(DATA_TRANSFERS_FILE).exists());

    let query = &endpoint.queries()[0];
    assert_eq!(query["IncrementLimit"], "10");
    assert_eq!(query["PayloadLengthBytes"], "0");
    assert_eq!(query["DataTransferChainIDs"], "[]");
}

#[tokio::test]
async fn failed_requests_are_skipped() {
    stellar_test::tracing::init();
    // 30 requests with a threshold of 3, three of them fail.
    let mut statuses = vec![StatusCode::OK; 30];
    for index in [0, 4, 8] {
        statuses[index] = StatusCode::BAD_GATEWAY;
    }
    let endpoint = MockEndpoint::with_statuses(statuses).await;
    let output = tempfile::tempdir().unwrap();

    let experiment = experiment(EndpointInfo::new(endpoint.url()), 10, 3);
    let directory = output.path().join(directory_name(&experiment));

    let summary = run_sub_experiment(experiment, &provider(), output.path(), http_dispatcher())
        .await
        .unwrap();

    assert_eq!(summary.requests, 30);
    assert_eq!(summary.failures, 3);

    let rows = read_rows(&directory.join(LATENCIES_FILE));
    assert_eq!(rows.len(), 27);
}

#[tokio::test]
async fn redirects_count_as_failures() {
    stellar_test::tracing::init();
    // The redirect points back at the endpoint, following it would succeed.
    let mut statuses = vec![StatusCode::OK; 10];
    statuses[0] = StatusCode::FOUND;
    let endpoint = MockEndpoint::with_statuses(statuses).await;
    let output = tempfile::tempdir().unwrap();

    let experiment = experiment(EndpointInfo::new(endpoint.url()), 10, 1);
    let directory = output.path().join(directory_name(&experiment));

    let summary = run_sub_experiment(experiment, &provider(), output.path(), http_dispatcher())
        .await
        .unwrap();

    assert_eq!(summary.failures, 1);
    assert_eq!(endpoint.requests(), 10);
    assert_eq!(read_rows(&directory.join(LATENCIES_FILE)).len(), 9);
}

#[tokio::test]
async fn exceeding_budget_stops_bursts() {
    stellar_test::tracing::init();
    // Threshold of 10 * 1 / 10 = 1, exceeded by the second failure.
    let endpoint = MockEndpoint::with_statuses(vec![StatusCode::INTERNAL_SERVER_ERROR; 10]).await;
    let output = tempfile::tempdir().unwrap();

    let experiment = experiment(EndpointInfo::new(endpoint.url()), 10, 1);
    let directory = output.path().join(directory_name(&experiment));

    let error = run_sub_experiment(experiment, &provider(), output.path(), http_dispatcher())
        .await
        .unwrap_err();

    assert!(matches!(
        error.downcast_ref::<ScheduleError>(),
        Some(ScheduleError::BudgetExceeded {
            failures: 2,
            threshold: 1,
            ..
        })
    ));
    assert_eq!(endpoint.requests(), 2);

    // The header survives the abort.
    let rows = read_rows(&directory.join(LATENCIES_FILE));
    assert!(rows.is_empty());
}

#[tokio::test]
async fn invalid_sub_experiment_sends_nothing() {
    stellar_test::tracing::init();
    let endpoint = MockEndpoint::new().await;
    let output = tempfile::tempdir().unwrap();

    let mut experiment = experiment(EndpointInfo::new(endpoint.url()), 5, 1);
    experiment.iat_type = IatType::Stochastic;
    experiment.iat_seconds = 0.5;

    let result =
        run_sub_experiment(experiment, &provider(), output.path(), http_dispatcher()).await;

    assert!(result.is_err());
    assert_eq!(endpoint.requests(), 0);
}

#[tokio::test]
async fn chained_http_run_records_data_transfers() {
    stellar_test::tracing::init();
    let first = TestFunction::new().await;
    let second = TestFunction::new().await;
    let output = tempfile::tempdir().unwrap();

    let endpoint = EndpointInfo {
        id: first.http_id(),
        data_transfer_chain_ids: vec![second.http_id()],
    };
    let mut experiment = experiment(endpoint, 3, 2);
    experiment.data_transfer_chain_length = 2;
    experiment.payload_length_bytes = 4096;
    let directory = output.path().join(directory_name(&experiment));

    run_sub_experiment(experiment, &provider(), output.path(), http_dispatcher())
        .await
        .unwrap();

    assert_eq!(read_rows(&directory.join(LATENCIES_FILE)).len(), 6);

    let transfers = read_rows(&directory.join(DATA_TRANSFERS_FILE));
    assert_eq!(transfers.len(), 6);
    for row in &transfers {
        // request ID, host, burst ID, one timestamp per hop
        assert_eq!(row.len(), 5);
        let first_hop: u64 = row[3].parse().unwrap();
        let second_hop: u64 = row[4].parse().unwrap();
        assert!(first_hop <= second_hop);
    }
}

#[tokio::test]
async fn chained_grpc_run_records_data_transfers() {
    stellar_test::tracing::init();
    let first = TestFunction::new().await;
    let second = TestFunction::new().await;
    let output = tempfile::tempdir().unwrap();

    let endpoint = EndpointInfo {
        id: first.grpc_id(),
        data_transfer_chain_ids: vec![second.grpc_id()],
    };
    let mut experiment = experiment(endpoint, 2, 2);
    experiment.data_transfer_chain_length = 2;
    let directory = output.path().join(directory_name(&experiment));

    let dispatcher = Arc::new(GrpcDispatcher::new(Duration::from_secs(10), "mybucket"));
    run_sub_experiment(experiment, &Provider::Vhive, output.path(), dispatcher)
        .await
        .unwrap();

    let latencies = read_rows(&directory.join(LATENCIES_FILE));
    assert_eq!(latencies.len(), 4);
    assert!(latencies.iter().all(|row| &row[0] == "N/A"));

    let transfers = read_rows(&directory.join(DATA_TRANSFERS_FILE));
    assert_eq!(transfers.len(), 4);
    assert!(transfers.iter().all(|row| row.len() == 5));
}
