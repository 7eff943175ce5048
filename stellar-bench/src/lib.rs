//! The benchmarking harness.
//!
//! The harness drives bursts of requests against already-deployed serverless functions and records
//! the client-side latency of every request, plus the per-hop timestamps of chained invocations.
//!
//! A run is organized in [sub-experiments](experiment::SubExperiment). For each of them the
//! [`iat`] module generates the delays between bursts, the [`scheduler`] paces the bursts and fans
//! them out through a [`dispatcher`], and the [`recorder`]s write the results to CSV files. The
//! [`budget`] aborts a sub-experiment once too many requests fail.
#![warn(missing_docs)]
#![warn(missing_debug_implementations)]

pub mod budget;
pub mod cli;
pub mod config;
pub mod dispatcher;
pub mod experiment;
pub mod iat;
pub mod observability;
pub mod recorder;
pub mod run;
pub mod scheduler;
