//! Execution of all configured sub-experiments.
//!
//! Every sub-experiment gets its own output directory below the configured `output_dir`, named
//! after its title and main parameters, e.g. `warm-IAT10s-burst5-payload0KB`. The directory holds
//! `latencies.csv` and, for chained sub-experiments, `data-transfers.csv`. Files are left on disk
//! when a run aborts.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};

use crate::budget::ErrorBudget;
use crate::config::Config;
use crate::dispatcher::Dispatch;
use crate::experiment::{Provider, SubExperiment};
use crate::iat;
use crate::recorder::{
    DATA_TRANSFERS_FILE, DataTransferWriter, LATENCIES_FILE, LatencyWriter, Recorders,
};
use crate::scheduler::{BurstScheduler, RunSummary};

/// Runs sub-experiments against a shared dispatcher.
#[derive(Debug)]
pub struct Runner {
    provider: Provider,
    output_dir: PathBuf,
    sequential: bool,
    dispatcher: Arc<dyn Dispatch>,
}

impl Runner {
    /// Creates a runner for the configured provider and output directory.
    pub fn new(config: &Config, dispatcher: Arc<dyn Dispatch>) -> Self {
        Self {
            provider: config.provider.clone(),
            output_dir: config.output_dir.clone(),
            sequential: config.sequential,
            dispatcher,
        }
    }

    /// Runs the given sub-experiments, or only the one at index `only`.
    ///
    /// Sub-experiment IDs are their index in `experiments`. In sequential mode the first failing
    /// sub-experiment stops the run, otherwise all run concurrently to completion. Returns an
    /// error if any sub-experiment failed.
    pub async fn run(&self, experiments: Vec<SubExperiment>, only: Option<usize>) -> Result<()> {
        let total = experiments.len();
        let mut selected: Vec<_> = experiments
            .into_iter()
            .enumerate()
            .map(|(id, mut experiment)| {
                experiment.id = id;
                experiment
            })
            .collect();

        if let Some(index) = only {
            anyhow::ensure!(
                index < total,
                "sub-experiment {index} does not exist, {total} configured"
            );
            selected = vec![selected.swap_remove(index)];
        }

        if self.sequential {
            for experiment in selected {
                let id = experiment.id;
                self.run_one(experiment)
                    .await
                    .with_context(|| format!("sub-experiment {id} failed"))?;
            }
            return Ok(());
        }

        let tasks: Vec<_> = selected
            .into_iter()
            .map(|experiment| {
                let provider = self.provider.clone();
                let output_dir = self.output_dir.clone();
                let dispatcher = Arc::clone(&self.dispatcher);
                let id = experiment.id;
                let task = tokio::spawn(async move {
                    run_sub_experiment(experiment, &provider, &output_dir, dispatcher).await
                });
                (id, task)
            })
            .collect();

        let mut failed = Vec::new();
        for (id, task) in tasks {
            match task.await {
                Ok(Ok(_)) => {}
                Ok(Err(error)) => {
                    tracing::error!(sub_experiment = id, "{error:#}");
                    failed.push(id);
                }
                Err(error) => {
                    tracing::error!(
                        sub_experiment = id,
                        error = &error as &dyn std::error::Error,
                        "Sub-experiment task failed"
                    );
                    failed.push(id);
                }
            }
        }

        anyhow::ensure!(failed.is_empty(), "sub-experiments {failed:?} failed");
        Ok(())
    }

    async fn run_one(&self, experiment: SubExperiment) -> Result<RunSummary> {
        run_sub_experiment(
            experiment,
            &self.provider,
            &self.output_dir,
            Arc::clone(&self.dispatcher),
        )
        .await
    }
}

/// Returns the output directory name of a sub-experiment.
pub fn directory_name(experiment: &SubExperiment) -> String {
    format!(
        "{}-IAT{}s-burst{}-payload{}KB",
        experiment.title,
        experiment.iat_seconds,
        experiment.burst_sizes.first().copied().unwrap_or_default(),
        experiment.payload_length_bytes / 1024,
    )
}

/// Validates and runs one sub-experiment, writing its results below `output_dir`.
pub async fn run_sub_experiment(
    mut experiment: SubExperiment,
    provider: &Provider,
    output_dir: &Path,
    dispatcher: Arc<dyn Dispatch>,
) -> Result<RunSummary> {
    experiment.prepare(provider)?;
    tracing::info!(sub_experiment = experiment.id, "Starting sub-experiment");

    let directory = output_dir.join(directory_name(&experiment));
    tokio::fs::create_dir_all(&directory)
        .await
        .with_context(|| format!("failed to create {}", directory.display()))?;
    tracing::info!(
        sub_experiment = experiment.id,
        directory = %directory.display(),
        "Created output directory"
    );

    let latencies_path = directory.join(LATENCIES_FILE);
    let latencies = LatencyWriter::create(&latencies_path)
        .with_context(|| format!("failed to create {}", latencies_path.display()))?;

    let data_transfers = if experiment.data_transfer_chain_length > 1 {
        let path = directory.join(DATA_TRANSFERS_FILE);
        let writer = DataTransferWriter::create(&path, experiment.data_transfer_chain_length)
            .with_context(|| format!("failed to create {}", path.display()))?;
        Some(writer)
    } else {
        None
    };

    let recorders = Arc::new(Recorders {
        latencies,
        data_transfers,
    });

    let delays = iat::generate(experiment.bursts, &experiment.iat_spec(), &mut rand::rng())?;

    let first_burst_size = experiment.burst_size(0);
    let budget = Arc::new(ErrorBudget::new(experiment.bursts, first_burst_size));

    tracing::info!(
        sub_experiment = experiment.id,
        bursts = experiment.bursts,
        iat_seconds = experiment.iat_seconds,
        endpoints = experiment.endpoints.len(),
        error_threshold = budget.threshold(),
        "Started benchmarking"
    );

    let scheduler = BurstScheduler::new(dispatcher, Arc::clone(&recorders), budget);
    let result = scheduler.run(&experiment, &delays).await;

    // Rows of an aborted run stay on disk.
    recorders.flush()?;
    let summary = result?;

    tracing::info!(
        sub_experiment = experiment.id,
        requests = summary.requests,
        failures = summary.failures,
        "Successfully finished"
    );

    Ok(summary)
}
