//! Command line entry point of the `stellar` binary.

use std::path::PathBuf;

use anyhow::Result;
use argh::FromArgs;

use crate::config::Config;
use crate::run::Runner;
use crate::{dispatcher, observability};

/// Benchmark serverless functions with controlled bursts of requests.
#[derive(Debug, FromArgs)]
struct Args {
    /// path to the YAML configuration file
    #[argh(option, short = 'c')]
    config: Option<PathBuf>,

    /// directory to write results to, overrides the configuration
    #[argh(option, short = 'o')]
    output: Option<PathBuf>,

    /// run only the sub-experiment with this index
    #[argh(option, short = 'e')]
    experiment: Option<usize>,
}

/// Loads the configuration, bootstraps the runtime and runs all sub-experiments.
pub fn execute() -> Result<()> {
    let args: Args = argh::from_env();

    let mut config = Config::load(args.config.as_deref())?;
    if let Some(output) = args.output {
        config.output_dir = output;
    }

    // Sentry should be initialized before creating the async runtime.
    let _sentry_guard = observability::init_sentry(&config);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .thread_name("stellar-rt")
        .enable_all()
        .build()?;
    let _runtime_guard = runtime.enter();

    observability::init_tracing(&config);
    tracing::debug!(?config);

    let dispatcher = dispatcher::from_config(&config)?;
    let runner = Runner::new(&config, dispatcher);
    let experiments = std::mem::take(&mut config.sub_experiments);

    tracing::info!(
        provider = %config.provider,
        sub_experiments = experiments.len(),
        "Starting benchmark"
    );

    runtime.block_on(runner.run(experiments, args.experiment))
}
