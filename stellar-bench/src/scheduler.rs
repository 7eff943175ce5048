//! Wall-clock pacing and concurrent dispatch of bursts.
//!
//! The scheduler walks the IAT schedule of a sub-experiment. At every tick it sleeps for the next
//! delay, then sends one burst to each endpoint in turn until all bursts are used up. Requests
//! within a burst run concurrently, and the scheduler waits for all of them before it sends the
//! next burst. Bursts never overlap.

use std::io;
use std::sync::Arc;
use std::time::Duration;

use crate::budget::ErrorBudget;
use crate::dispatcher::{Dispatch, InvocationParams};
use crate::experiment::SubExperiment;
use crate::recorder::{DataTransferRecord, LatencyRecord, Recorders};

/// Errors that end a sub-experiment run early.
#[derive(Debug, thiserror::Error)]
pub enum ScheduleError {
    /// More requests failed than the error budget allows.
    #[error(
        "sub-experiment {id} aborted after {failures} failed requests (threshold {threshold})"
    )]
    BudgetExceeded {
        /// The sub-experiment ID.
        id: usize,
        /// Failed requests at the time of the abort.
        failures: usize,
        /// The error threshold of the run.
        threshold: usize,
    },

    /// Recorded rows could not be written to disk.
    #[error("failed to flush recorders")]
    Flush(#[from] io::Error),
}

/// Counters of a completed run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Number of bursts sent.
    pub bursts: usize,
    /// Number of requests sent.
    pub requests: usize,
    /// Number of failed requests.
    pub failures: usize,
}

/// Drives the bursts of one sub-experiment.
#[derive(Debug)]
pub struct BurstScheduler {
    dispatcher: Arc<dyn Dispatch>,
    recorders: Arc<Recorders>,
    budget: Arc<ErrorBudget>,
}

impl BurstScheduler {
    /// Creates a scheduler for one run.
    ///
    /// The budget must be fresh, it is shared by all requests of this run.
    pub fn new(
        dispatcher: Arc<dyn Dispatch>,
        recorders: Arc<Recorders>,
        budget: Arc<ErrorBudget>,
    ) -> Self {
        Self {
            dispatcher,
            recorders,
            budget,
        }
    }

    /// Sends all bursts of `experiment`, pacing ticks with `delays`.
    ///
    /// The budget is checked after every burst. Once it is exceeded, the recorders are flushed and
    /// no further bursts are sent. Requests already in flight are always awaited.
    pub async fn run(
        &self,
        experiment: &SubExperiment,
        delays: &[Duration],
    ) -> Result<RunSummary, ScheduleError> {
        let mut summary = RunSummary::default();
        let mut burst_id = 0;
        let mut delta_index = 0;

        while burst_id < experiment.bursts {
            let delay = delays.get(delta_index).copied().unwrap_or_default();
            tokio::time::sleep(delay).await;

            for (endpoint_index, endpoint) in experiment.endpoints.iter().enumerate() {
                if burst_id >= experiment.bursts {
                    break;
                }

                let params = Arc::new(InvocationParams {
                    endpoint: endpoint.clone(),
                    route: experiment.route(endpoint_index).map(str::to_owned),
                    increment_limit: experiment.busy_spin_increment(delta_index),
                    payload_length_bytes: experiment.payload_length_bytes,
                    storage_transfer: experiment.storage_transfer,
                });
                let burst_size = experiment.burst_size(delta_index);

                tracing::info!(
                    sub_experiment = experiment.id,
                    burst_id,
                    burst_size,
                    increment_limit = params.increment_limit,
                    endpoint = %endpoint.id,
                    "Starting burst"
                );

                self.send_burst(params, burst_id, burst_size).await;
                summary.bursts += 1;
                summary.requests += burst_size;

                tracing::info!(
                    sub_experiment = experiment.id,
                    burst_id,
                    "Received all responses for burst"
                );

                if self.budget.is_exceeded() {
                    self.recorders.flush()?;
                    return Err(ScheduleError::BudgetExceeded {
                        id: experiment.id,
                        failures: self.budget.count(),
                        threshold: self.budget.threshold(),
                    });
                }

                burst_id += 1;
            }

            delta_index += 1;
            tracing::debug!(
                sub_experiment = experiment.id,
                ?delay,
                "All endpoints used for this tick, flushing"
            );
            self.recorders.flush()?;
        }

        summary.failures = self.budget.count();
        Ok(summary)
    }

    /// Sends `burst_size` concurrent requests and waits for all of them.
    async fn send_burst(&self, params: Arc<InvocationParams>, burst_id: usize, burst_size: usize) {
        let tasks: Vec<_> = (0..burst_size)
            .map(|_| {
                let dispatcher = Arc::clone(&self.dispatcher);
                let recorders = Arc::clone(&self.recorders);
                let budget = Arc::clone(&self.budget);
                let params = Arc::clone(&params);
                tokio::spawn(async move {
                    execute_request(dispatcher.as_ref(), &recorders, &budget, &params, burst_id)
                        .await
                })
            })
            .collect();

        for result in futures::future::join_all(tasks).await {
            if let Err(error) = result {
                tracing::error!(
                    error = &error as &dyn std::error::Error,
                    burst_id,
                    "Request task failed"
                );
                self.budget.record_failure();
            }
        }
    }
}

/// Executes one request and records its outcome.
///
/// Successful requests produce a latency row, plus a data transfer row when the recorders have a
/// data transfer writer. Failed requests only count against the budget.
pub async fn execute_request(
    dispatcher: &dyn Dispatch,
    recorders: &Recorders,
    budget: &ErrorBudget,
    params: &InvocationParams,
    burst_id: usize,
) {
    let invocation = match dispatcher.invoke(params).await {
        Ok(invocation) => invocation,
        Err(error) => {
            let failures = budget.record_failure();
            tracing::error!(
                error = &error as &dyn std::error::Error,
                endpoint = %params.endpoint.id,
                burst_id,
                failures,
                "Request failed, skipping"
            );
            return;
        }
    };

    if let Some(data_transfers) = &recorders.data_transfers {
        let record = DataTransferRecord {
            request_id: invocation.request_id.clone(),
            host: invocation.host.clone(),
            burst_id,
            timestamp_chain: invocation.timestamp_chain,
        };
        if let Err(error) = data_transfers.write(&record) {
            tracing::error!(
                error = &error as &dyn std::error::Error,
                "Could not write data transfer row"
            );
        }
    }

    let record = LatencyRecord {
        request_id: invocation.request_id,
        host: invocation.host,
        sent_at: invocation.sent_at,
        received_at: invocation.received_at,
        burst_id,
    };
    tracing::debug!(latency_ms = record.latency_ms(), "Received response");

    if let Err(error) = recorders.latencies.write(&record) {
        tracing::error!(
            error = &error as &dyn std::error::Error,
            "Could not write latency row"
        );
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use chrono::Utc;

    use super::*;
    use crate::dispatcher::{Invocation, TransportError};
    use crate::experiment::EndpointInfo;
    use crate::experiment::tests::sub_experiment;
    use crate::recorder::LatencyWriter;

    /// Answers every request, failing the ones whose sequence number is listed.
    #[derive(Debug, Default)]
    struct FakeDispatcher {
        calls: AtomicUsize,
        fail: Vec<usize>,
        seen: Mutex<Vec<InvocationParams>>,
    }

    #[async_trait]
    impl Dispatch for FakeDispatcher {
        async fn invoke(&self, params: &InvocationParams) -> Result<Invocation, TransportError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            self.seen.lock().unwrap().push(params.clone());

            if self.fail.contains(&call) {
                return Err(TransportError::Status(reqwest::StatusCode::BAD_GATEWAY));
            }

            let now = Utc::now();
            Ok(Invocation {
                request_id: format!("req-{call}"),
                host: params.endpoint.id.clone(),
                sent_at: now,
                received_at: now,
                timestamp_chain: vec![],
            })
        }
    }

    fn recorders() -> Arc<Recorders> {
        Arc::new(Recorders {
            latencies: LatencyWriter::new(io::sink()).unwrap(),
            data_transfers: None,
        })
    }

    #[tokio::test(start_paused = true)]
    async fn sends_all_bursts_round_robin() {
        let dispatcher = Arc::new(FakeDispatcher::default());
        let mut experiment = sub_experiment();
        experiment.bursts = 5;
        experiment.burst_sizes = vec![1, 2];
        experiment.busy_spin_increments = vec![10, 20, 30];
        experiment.endpoints = vec![EndpointInfo::new("a"), EndpointInfo::new("b")];
        experiment.routes = vec!["/first".into()];

        let scheduler = BurstScheduler::new(
            dispatcher.clone(),
            recorders(),
            Arc::new(ErrorBudget::new(5, 1)),
        );
        let delays = vec![Duration::from_secs(1); 5];
        let summary = scheduler.run(&experiment, &delays).await.unwrap();

        // ticks: [a, b] with size 1, [a, b] with size 2, [a] with size 2
        assert_eq!(summary.bursts, 5);
        assert_eq!(summary.requests, 1 + 1 + 2 + 2 + 2);
        assert_eq!(summary.failures, 0);

        let seen = dispatcher.seen.lock().unwrap();
        let ids: Vec<_> = seen.iter().map(|p| p.endpoint.id.as_str()).collect();
        assert_eq!(ids, ["a", "b", "a", "a", "b", "b", "a", "a"]);

        let spins: Vec<_> = seen.iter().map(|p| p.increment_limit).collect();
        assert_eq!(spins, [10, 10, 20, 20, 20, 20, 30, 30]);

        assert_eq!(seen[0].route.as_deref(), Some("/first"));
        assert_eq!(seen[1].route, None);
    }

    #[tokio::test(start_paused = true)]
    async fn sleeps_before_every_tick() {
        let dispatcher = Arc::new(FakeDispatcher::default());
        let mut experiment = sub_experiment();
        experiment.bursts = 3;

        let scheduler = BurstScheduler::new(
            dispatcher,
            recorders(),
            Arc::new(ErrorBudget::new(3, 2)),
        );
        let delays = vec![Duration::from_secs(10); 3];

        let start = tokio::time::Instant::now();
        scheduler.run(&experiment, &delays).await.unwrap();

        assert_eq!(start.elapsed(), Duration::from_secs(30));
    }

    #[tokio::test(start_paused = true)]
    async fn aborts_once_budget_exceeded() {
        let dispatcher = Arc::new(FakeDispatcher {
            fail: (0..100).collect(),
            ..Default::default()
        });
        let mut experiment = sub_experiment();
        experiment.bursts = 10;
        experiment.burst_sizes = vec![2];

        // threshold = 10 * 2 / 10 = 2, exceeded during the second burst
        let scheduler = BurstScheduler::new(
            dispatcher.clone(),
            recorders(),
            Arc::new(ErrorBudget::new(10, 2)),
        );
        let delays = vec![Duration::ZERO; 10];

        let result = scheduler.run(&experiment, &delays).await;
        assert!(matches!(
            result,
            Err(ScheduleError::BudgetExceeded {
                failures: 4,
                threshold: 2,
                ..
            })
        ));
        assert_eq!(dispatcher.calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn failures_count_against_budget() {
        let dispatcher = FakeDispatcher {
            fail: vec![1],
            ..Default::default()
        };
        let recorders = recorders();
        let budget = ErrorBudget::with_threshold(10);
        let params = InvocationParams {
            endpoint: EndpointInfo::new("a"),
            route: None,
            increment_limit: 0,
            payload_length_bytes: 0,
            storage_transfer: false,
        };

        for _ in 0..3 {
            execute_request(&dispatcher, &recorders, &budget, &params, 0).await;
        }

        assert_eq!(budget.count(), 1);
    }
}
