//! A producer-consumer function for chained-invocation benchmarks.
//!
//! Every hop records a timestamp, simulates work and invokes the next hop of the chain, relaying a
//! payload inline or through object storage. The first hop answers with the timestamps of all
//! hops. The function serves the same protocol over HTTP ([`web`]) and gRPC ([`grpc`]); the
//! protocol itself lives in [`chain`].
#![warn(missing_docs)]
#![warn(missing_debug_implementations)]

pub mod chain;
pub mod cli;
pub mod config;
pub mod endpoints;
pub mod error;
pub mod grpc;
pub mod hop;
pub mod observability;
pub mod payload;
pub mod server;
pub mod state;
pub mod storage;
pub mod web;
pub mod workload;
